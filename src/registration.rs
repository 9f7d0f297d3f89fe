//! Rigid registration of a candidate image onto the reference template.

use std::path::{Path, PathBuf};

use crate::errors::GearError;
use crate::util::fs::{ensure_dir, file_name_lossy};
use crate::util::{ExecRequest, ExecService};

/// An image already resampled into reference space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredImage {
    pub path: PathBuf,
}

pub trait Registrar {
    /// `Ok(None)` means the registration ran but produced no usable image.
    fn register(
        &self,
        image: &Path,
        reference: &Path,
        subject: &str,
        session: &str,
    ) -> Result<Option<RegisteredImage>, GearError>;
}

/// `antsRegistrationSyNQuick.sh` with a rigid transform.
pub struct AntsRegistrar {
    exec: ExecService,
    out_dir: PathBuf,
}

impl AntsRegistrar {
    pub const SCRIPT: &'static str = "antsRegistrationSyNQuick.sh";

    /// `ants_bin` goes in front of PATH; outputs land under `out_dir`.
    pub fn new(exec: ExecService, ants_bin: &Path, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            exec: exec.with_path_prefix([ants_bin.to_path_buf()]),
            out_dir: out_dir.into(),
        }
    }

    pub fn output_prefix(&self, image: &Path, subject: &str, session: &str) -> PathBuf {
        let name = file_name_lossy(image);
        let stem = name.strip_suffix(".nii.gz").unwrap_or(&name);
        let stem = stem
            .strip_prefix(&format!("sub-{subject}_ses-{session}_"))
            .unwrap_or(stem);
        self.out_dir
            .join(format!("sub-{subject}_ses-{session}_{stem}_"))
    }

    pub fn request(&self, image: &Path, reference: &Path, prefix: &Path) -> ExecRequest {
        ExecRequest::new(Self::SCRIPT)
            .args(["-d", "3"])
            .arg("-f")
            .path_arg(reference)
            .arg("-m")
            .path_arg(image)
            .arg("-o")
            .path_arg(prefix)
            .args(["-t", "r"])
            .timeout(self.exec.default_timeout())
    }
}

impl Registrar for AntsRegistrar {
    fn register(
        &self,
        image: &Path,
        reference: &Path,
        subject: &str,
        session: &str,
    ) -> Result<Option<RegisteredImage>, GearError> {
        if !reference.is_file() {
            return Err(GearError::config(format!(
                "reference template {} not found",
                reference.display()
            )));
        }
        ensure_dir(&self.out_dir)?;
        let prefix = self.output_prefix(image, subject, session);
        tracing::info!("Registering {} to {}", image.display(), reference.display());
        let out = self.exec.run(self.request(image, reference, &prefix))?;
        if !out.success() {
            tracing::error!(
                "{} exited with {} for {}: {}",
                Self::SCRIPT,
                out.status,
                image.display(),
                out.stderr_tail()
            );
            return Ok(None);
        }
        let warped = PathBuf::from(format!("{}Warped.nii.gz", prefix.display()));
        if !warped.is_file() {
            tracing::error!("registration produced no {}", warped.display());
            return Ok(None);
        }
        Ok(Some(RegisteredImage { path: warped }))
    }
}
