//! Per-candidate model options.

use std::path::{Path, PathBuf};

use crate::config::{GearConfig, GearPaths};
use crate::errors::GearError;
use crate::layout::Layout;
use crate::model::ModelKind;
use crate::util::fs::{ensure_dir, file_name_lossy, nifti_files_in};

pub const DEFAULT_PATCH_SIZE: [u32; 3] = [128, 128, 64];
pub const DEFAULT_NEW_RESOLUTION: [f32; 3] = [0.5, 0.5, 0.5];

#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    pub which_model: ModelKind,
    pub gpu_ids: String,
    pub name: String,
    pub net_g: String,
    pub model: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub image: PathBuf,
    pub reference: PathBuf,
    pub result_sr: PathBuf,
    pub phase: String,
    pub which_epoch: String,
    pub stride_inplane: u32,
    pub stride_layer: u32,
    pub patch_size: [u32; 3],
    pub resample: bool,
    pub new_resolution: [f32; 3],
    pub checkpoints_dir: PathBuf,
}

/// Result file name: the first `*.nii.gz` in `input_dir` (by name), with the
/// model suffix inserted before the extension.
///
/// No `.nii.gz` but some other NIfTI variant (`.nii`) is an unsupported file
/// type; nothing at all is a missing-input error.
pub fn output_basename(input_dir: &Path, kind: ModelKind) -> Result<String, GearError> {
    if let Some(first) = nifti_files_in(input_dir)?.first() {
        let name = file_name_lossy(first);
        let stem = name.strip_suffix(".nii.gz").unwrap_or(&name);
        return Ok(format!("{stem}{}.nii.gz", kind.output_suffix()));
    }
    let mut other: Vec<String> = match std::fs::read_dir(input_dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .map(|e| file_name_lossy(&e.path()))
            .filter(|n| n.contains(".nii"))
            .collect(),
        Err(_) => Vec::new(),
    };
    other.sort();
    match other.first() {
        Some(name) => Err(GearError::config(format!("unsupported file type: {name}"))),
        None => Err(GearError::config(format!(
            "no NIfTI file found in {}",
            input_dir.display()
        ))),
    }
}

pub fn resolve_options(
    layout: &Layout,
    paths: &GearPaths,
    config: &GearConfig,
    kind: ModelKind,
    subject: &str,
    session: &str,
    image: &Path,
) -> Result<ModelOptions, GearError> {
    let input_dir = layout.anat_dir(subject, session);
    let output_dir = layout.derivative_anat_dir(subject, session);
    let basename = output_basename(&input_dir, kind)?;
    ensure_dir(&output_dir)?;

    Ok(ModelOptions {
        which_model: kind,
        gpu_ids: kind.gpu_ids().to_string(),
        name: kind.run_name().to_string(),
        net_g: kind.net_g().to_string(),
        model: "test".to_string(),
        result_sr: output_dir.join(basename),
        input_dir,
        output_dir,
        image: image.to_path_buf(),
        reference: paths.reference.clone(),
        phase: config.phase.clone(),
        which_epoch: config.which_epoch.clone(),
        stride_inplane: config.stride_inplane,
        stride_layer: config.stride_layer,
        patch_size: DEFAULT_PATCH_SIZE,
        resample: false,
        new_resolution: DEFAULT_NEW_RESOLUTION,
        checkpoints_dir: paths.checkpoints_dir.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(p: &Path) {
        std::fs::create_dir_all(p.parent().expect("parent")).expect("mkdir");
        std::fs::write(p, b"").expect("write");
    }

    #[test]
    fn test_basename_uses_first_sorted() {
        let td = tempfile::tempdir().expect("tmpdir");
        touch(&td.path().join("sub-01_ses-1_T2w_sag.nii.gz"));
        touch(&td.path().join("sub-01_ses-1_T2w_axi.nii.gz"));
        touch(&td.path().join("sub-01_ses-1_T2w_axi.json"));
        assert_eq!(
            output_basename(td.path(), ModelKind::Gambas).expect("name"),
            "sub-01_ses-1_T2w_axi_gambas.nii.gz"
        );
    }

    #[test]
    fn test_basename_errors() {
        let td = tempfile::tempdir().expect("tmpdir");
        let err = output_basename(td.path(), ModelKind::ResCnn).expect_err("empty");
        assert!(err.is_config());
        assert!(err.to_string().contains("no NIfTI"));

        touch(&td.path().join("sub-01_ses-1_T2w_axi.nii"));
        let err = output_basename(td.path(), ModelKind::ResCnn).expect_err("plain nii");
        assert!(err.to_string().contains("unsupported file type"));
    }

    #[test]
    fn test_resolve_creates_output_dir() {
        let td = tempfile::tempdir().expect("tmpdir");
        let layout = Layout::new(td.path());
        let img = layout.anat_dir("01", "1").join("sub-01_ses-1_T2w_axi.nii.gz");
        touch(&img);
        let paths = GearPaths::new(td.path());
        let opts = resolve_options(
            &layout,
            &paths,
            &GearConfig::default(),
            ModelKind::ResCnn,
            "01",
            "1",
            &img,
        )
        .expect("options");
        assert!(opts.output_dir.is_dir());
        assert_eq!((opts.gpu_ids.as_str(), opts.name.as_str()), ("-1", "cpu"));
        assert_eq!(
            opts.result_sr,
            layout
                .derivative_anat_dir("01", "1")
                .join("sub-01_ses-1_T2w_axi_ResCNN.nii.gz")
        );
    }
}
