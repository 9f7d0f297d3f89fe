use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use gambas_gear::config::{ConverterKind, GearContext, GearPaths};
use gambas_gear::dataset::{build_dataset, setup_bids_directories, Converter, Dcm2BidsConverter, NativeConverter};
use gambas_gear::importer::Importer;
use gambas_gear::labels::LabelScope;
use gambas_gear::model::{detect_gpu, ModelKind, ScriptModelFactory};
use gambas_gear::platform::{HttpPlatform, Platform};
use gambas_gear::processor::UnitProcessor;
use gambas_gear::registration::AntsRegistrar;
use gambas_gear::supervisor::RunSupervisor;
use gambas_gear::util::ExecService;
use gambas_gear::{
    color_enabled_stderr, exit_code_for_gear_error, log_error_stderr, log_info_stderr,
    log_warn_stderr, GearError,
};

mod cli;

use cli::{Cli, Command};

fn step(use_color: bool, n: u32, msg: &str) {
    log_info_stderr(use_color, &format!("Step {n}: {msg}"));
}

fn run_gear(base_dir: Option<PathBuf>, dry_run: bool, forced: Option<ModelKind>) -> Result<(), GearError> {
    let use_color = color_enabled_stderr();
    let paths = GearPaths::resolve(base_dir.as_deref());
    let context = GearContext::load(paths)?;
    gambas_gear::telemetry_init(context.config.debug);
    tracing::debug!(
        "configuration loaded from {}: {:?}",
        context.paths.base_dir.display(),
        context.config
    );

    let exec = ExecService::new(context.config.tool_timeout());
    let kind = match forced {
        Some(k) => k,
        None => ModelKind::for_hardware(detect_gpu(&exec)),
    };
    log_info_stderr(use_color, &format!("Using {} model", kind.display_name()));

    let api_key = context
        .api_key
        .as_deref()
        .ok_or_else(|| GearError::config("no API key (inputs.api-key.key or GAMBAS_GEAR_API_KEY)"))?;
    let destination = context
        .destination_id
        .as_deref()
        .ok_or_else(|| GearError::config("config.json has no destination.id"))?;
    let platform = HttpPlatform::new(api_key)?;

    step(use_color, 1, "Importing data");
    let root = platform.analysis_parent(destination)?;
    let layout = setup_bids_directories(&context.paths.work_dir)?;
    let dataset = Importer::new(&platform, layout.sourcedata_root())
        .dry_run(dry_run)
        .import(&root)?;
    for e in &dataset.errors {
        log_warn_stderr(use_color, &format!("import: {e}"));
    }

    step(use_color, 2, "Building BIDS dataset");
    let converter: Box<dyn Converter> = match context.config.converter {
        ConverterKind::Dcm2bids => Box::new(
            Dcm2BidsConverter::new(exec.clone(), &context.paths.bids_config_file)
                .skip_dcm2niix(context.config.skip_dcm2niix),
        ),
        ConverterKind::Native => Box::new(NativeConverter),
    };
    let built = build_dataset(&dataset, &layout, converter.as_ref());

    step(use_color, 3, "Processing each subject");
    let registrar = AntsRegistrar::new(
        exec.clone(),
        &context.paths.ants_bin,
        context.paths.work_dir.join("registration"),
    );
    let models = ScriptModelFactory::new(exec, &context.paths.app_dir);
    let processor = UnitProcessor::new(&layout, &context, kind, &registrar, &models);
    let summary = RunSupervisor::new(&platform as &dyn Platform, &processor, &context)
        .dry_run(dry_run)
        .run(&built);

    summary.print(use_color);
    Ok(())
}

fn print_labels(kind: gambas_gear::labels::LabelKind, labels: &[String]) -> ExitCode {
    let mut scope = LabelScope::new();
    for raw in labels {
        match scope.resolve(raw, kind) {
            Ok(l) => println!("{raw}\t{l}"),
            Err(e) => {
                log_error_stderr(color_enabled_stderr(), &e.to_string());
                return ExitCode::from(exit_code_for_gear_error(&e));
            }
        }
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(mode) = cli.color {
        gambas_gear::set_color_mode(mode);
    }

    match cli.command {
        Command::Doctor { base_dir } => {
            gambas_gear::run_doctor(&GearPaths::resolve(base_dir.as_deref()));
            ExitCode::SUCCESS
        }
        Command::Labels { kind, labels } => print_labels(kind, &labels),
        Command::Run {
            base_dir,
            dry_run,
            model,
        } => match run_gear(base_dir, dry_run, model) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log_error_stderr(color_enabled_stderr(), &format!("gambas-gear: {e}"));
                ExitCode::from(exit_code_for_gear_error(&e))
            }
        },
    }
}
