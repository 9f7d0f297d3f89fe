use std::path::Path;

use crate::config::GearPaths;
use crate::model::{detect_gpu, ModelKind};
use crate::registration::AntsRegistrar;
use crate::util::ExecService;

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn show_path(label: &str, p: &Path) {
    let state = if p.exists() { "present" } else { "missing" };
    eprintln!("  {label:<18} {} ({state})", p.display());
}

/// Print environment diagnostics. Always succeeds; missing tools are reported, not fatal.
pub fn run_doctor(paths: &GearPaths) {
    let use_color = crate::color_enabled_stderr();
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("gambas-gear doctor");
    eprintln!();
    eprintln!("  version: v{version}");
    eprintln!(
        "  host:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    eprintln!(
        "  build:   {} {} ({}, {})",
        option_env!("GAMBAS_GEAR_BUILD_DATE").unwrap_or("unknown"),
        option_env!("GAMBAS_GEAR_BUILD_TARGET").unwrap_or("unknown"),
        option_env!("GAMBAS_GEAR_BUILD_PROFILE").unwrap_or("unknown"),
        option_env!("GAMBAS_GEAR_BUILD_RUSTC").unwrap_or("unknown"),
    );
    eprintln!();

    let exec = ExecService::default().with_path_prefix([paths.ants_bin.clone()]);
    let gpu = detect_gpu(&exec);
    let kind = ModelKind::for_hardware(gpu);
    let gpu_val = crate::paint(use_color, "\x1b[34;1m", yes_no(gpu));
    eprintln!("  gpu available:     {gpu_val}");
    eprintln!("  model selected:    {}", kind.display_name());
    eprintln!();

    for tool in ["dcm2bids", AntsRegistrar::SCRIPT, "python3", "nvidia-smi"] {
        match exec.locate(tool) {
            Some(p) => eprintln!("  {tool:<30} {}", p.display()),
            None => {
                let msg = format!("  {tool:<30} not found");
                crate::log_warn_stderr(use_color, &msg);
            }
        }
    }
    eprintln!();

    show_path("base dir:", &paths.base_dir);
    show_path("conversion config:", &paths.bids_config_file);
    show_path("reference:", &paths.reference);
    show_path("checkpoints:", &paths.checkpoints_dir);
    show_path("ants bin:", &paths.ants_bin);
    eprintln!();
    eprintln!("doctor: completed diagnostics.");
}
