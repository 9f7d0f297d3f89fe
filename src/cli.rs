use std::path::PathBuf;

use clap::{Parser, Subcommand};

use gambas_gear::labels::LabelKind;
use gambas_gear::model::ModelKind;

fn parse_label_kind(s: &str) -> Result<LabelKind, String> {
    LabelKind::parse(s).ok_or_else(|| "must be one of project, subject, session".to_string())
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Import the destination's hierarchy, process every session and publish results
    Run {
        /// Gear base directory (config.json, manifest.json, work/, app/)
        #[arg(long = "base-dir")]
        base_dir: Option<PathBuf>,
        /// Import and process, but do not download, publish or delete
        #[arg(long)]
        dry_run: bool,
        /// Force a model instead of choosing from GPU availability
        #[arg(long, value_enum)]
        model: Option<ModelKind>,
    },

    /// Run diagnostics to check environment and configuration
    Doctor {
        /// Gear base directory to inspect
        #[arg(long = "base-dir")]
        base_dir: Option<PathBuf>,
    },

    /// Print resolved labels for raw names, deduplicated within one scope
    Labels {
        /// project, subject or session
        #[arg(value_parser = parse_label_kind)]
        kind: LabelKind,
        /// Raw labels, in encounter order
        #[arg(required = true)]
        labels: Vec<String>,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "gambas-gear",
    version,
    about = "Super-resolve T2-weighted scans per subject/session and publish the results.",
    after_long_help = "Examples:\n  gambas-gear run\n  gambas-gear run --base-dir ./v0 --dry-run\n  gambas-gear labels session \"Visit 1\" Visit-1\n\n"
)]
pub(crate) struct Cli {
    /// Colorize output: auto|always|never
    #[arg(long = "color", value_enum, global = true)]
    pub(crate) color: Option<gambas_gear::ColorMode>,

    #[command(subcommand)]
    pub(crate) command: Command,
}
