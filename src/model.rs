//! Model collaborator: construction, setup and patch-wise inference.
//!
//! The numerical work happens in an external inference script; this module
//! only resolves which network to run and passes the options through.

use std::path::{Path, PathBuf};

use crate::errors::GearError;
use crate::options::ModelOptions;
use crate::registration::RegisteredImage;
use crate::util::{ExecRequest, ExecService};

/// Network family, chosen from hardware availability.
#[derive(Copy, Clone, PartialEq, Eq, Debug, clap::ValueEnum)]
pub enum ModelKind {
    /// Mamba-based GAN, needs a GPU.
    #[value(name = "gambas")]
    Gambas,
    /// Residual CNN, runs on CPU.
    #[value(name = "rescnn")]
    ResCnn,
}

impl ModelKind {
    pub fn for_hardware(gpu_available: bool) -> Self {
        if gpu_available {
            ModelKind::Gambas
        } else {
            ModelKind::ResCnn
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Gambas => "GAMBAS",
            ModelKind::ResCnn => "ResCNN",
        }
    }

    /// Inserted before `.nii.gz` in the output name.
    pub fn output_suffix(&self) -> &'static str {
        match self {
            ModelKind::Gambas => "_gambas",
            ModelKind::ResCnn => "_ResCNN",
        }
    }

    pub fn gpu_ids(&self) -> &'static str {
        match self {
            ModelKind::Gambas => "0",
            ModelKind::ResCnn => "-1",
        }
    }

    /// Run name; also the checkpoint subdirectory.
    pub fn run_name(&self) -> &'static str {
        match self {
            ModelKind::Gambas => "gpu",
            ModelKind::ResCnn => "cpu",
        }
    }

    pub fn net_g(&self) -> &'static str {
        match self {
            ModelKind::Gambas => "i2i_mamba",
            ModelKind::ResCnn => "res_cnn",
        }
    }
}

/// True when `nvidia-smi` runs and exits successfully.
pub fn detect_gpu(exec: &ExecService) -> bool {
    if exec.locate("nvidia-smi").is_none() {
        return false;
    }
    match exec.run(ExecRequest::new("nvidia-smi").arg("-L").capture_output(false)) {
        Ok(out) => out.success(),
        Err(e) => {
            tracing::debug!("nvidia-smi probe failed: {e:#}");
            false
        }
    }
}

/// Everything one inference call needs besides the model itself.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub image: RegisteredImage,
    pub output: PathBuf,
    pub resample: bool,
    pub new_resolution: [f32; 3],
    pub patch_size: [u32; 3],
    pub stride_inplane: u32,
    pub stride_layer: u32,
    pub batch_size: u32,
}

impl InferenceRequest {
    pub fn from_options(opts: &ModelOptions, image: RegisteredImage) -> Self {
        Self {
            image,
            output: opts.result_sr.clone(),
            resample: opts.resample,
            new_resolution: opts.new_resolution,
            patch_size: opts.patch_size,
            stride_inplane: opts.stride_inplane,
            stride_layer: opts.stride_layer,
            batch_size: 1,
        }
    }
}

pub trait SrModel {
    fn setup(&mut self, opts: &ModelOptions) -> Result<(), GearError>;

    /// `Ok(None)` is the inference failure sentinel: ran, produced nothing.
    fn infer(&mut self, request: &InferenceRequest) -> Result<Option<PathBuf>, GearError>;
}

pub trait ModelFactory {
    fn create(&self, opts: &ModelOptions) -> Result<Box<dyn SrModel>, GearError>;
}

/// Drives the bundled Python inference entry point.
pub struct ScriptModelFactory {
    exec: ExecService,
    python: PathBuf,
    script: PathBuf,
}

impl ScriptModelFactory {
    pub fn new(exec: ExecService, app_dir: &Path) -> Self {
        Self {
            exec,
            python: PathBuf::from("python3"),
            script: app_dir.join("inference.py"),
        }
    }

}

impl ModelFactory for ScriptModelFactory {
    fn create(&self, opts: &ModelOptions) -> Result<Box<dyn SrModel>, GearError> {
        if !self.script.is_file() {
            return Err(GearError::config(format!(
                "inference entry point {} not found",
                self.script.display()
            )));
        }
        Ok(Box::new(ScriptModel {
            exec: self.exec.clone(),
            python: self.python.clone(),
            script: self.script.clone(),
            opts: opts.clone(),
            ready: false,
        }))
    }
}

pub struct ScriptModel {
    exec: ExecService,
    python: PathBuf,
    script: PathBuf,
    opts: ModelOptions,
    ready: bool,
}

impl ScriptModel {
    /// Weights file the script will load: `<checkpoints>/<name>/<epoch>_net_G.pth`.
    pub fn weights_path(opts: &ModelOptions) -> PathBuf {
        opts.checkpoints_dir
            .join(&opts.name)
            .join(format!("{}_net_G.pth", opts.which_epoch))
    }

    pub fn request(&self, req: &InferenceRequest) -> ExecRequest {
        let o = &self.opts;
        let mut cmd = ExecRequest::new(self.python.as_os_str())
            .env("PYTHONUNBUFFERED", "1")
            .path_arg(&self.script)
            .args(["--model", o.model.as_str()])
            .args(["--name", o.name.as_str()])
            .args(["--netG", o.net_g.as_str()])
            .args(["--gpu_ids", o.gpu_ids.as_str()])
            .args(["--phase", o.phase.as_str()])
            .args(["--which_epoch", o.which_epoch.as_str()])
            .arg("--checkpoints_dir")
            .path_arg(&o.checkpoints_dir)
            .arg("--image")
            .path_arg(&req.image.path)
            .arg("--result_sr")
            .path_arg(&req.output)
            .arg("--patch_size")
            .args(req.patch_size.iter().map(|p| p.to_string()))
            .args(["--stride_inplane".to_string(), req.stride_inplane.to_string()])
            .args(["--stride_layer".to_string(), req.stride_layer.to_string()])
            .args(["--batch_size".to_string(), req.batch_size.to_string()]);
        if req.resample {
            cmd = cmd
                .arg("--resample")
                .arg("--new_resolution")
                .args(req.new_resolution.iter().map(|r| r.to_string()));
        }
        if let Some(app_dir) = self.script.parent() {
            cmd = cmd.cwd(app_dir);
        }
        cmd
    }
}

impl SrModel for ScriptModel {
    fn setup(&mut self, opts: &ModelOptions) -> Result<(), GearError> {
        let weights = Self::weights_path(opts);
        if !weights.is_file() {
            return Err(GearError::config(format!(
                "model weights {} not found",
                weights.display()
            )));
        }
        self.opts = opts.clone();
        self.ready = true;
        Ok(())
    }

    fn infer(&mut self, request: &InferenceRequest) -> Result<Option<PathBuf>, GearError> {
        if !self.ready {
            return Err(GearError::Message("model used before setup".to_string()));
        }
        let out = self.exec.run(self.request(request))?;
        if !out.success() {
            tracing::error!(
                "inference script exited with {}: {}",
                out.status,
                out.stderr_tail()
            );
            return Ok(None);
        }
        if request.output.is_file() {
            Ok(Some(request.output.clone()))
        } else {
            tracing::error!(
                "inference reported success but {} is missing",
                request.output.display()
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_hardware() {
        assert_eq!(ModelKind::for_hardware(true), ModelKind::Gambas);
        assert_eq!(ModelKind::for_hardware(false), ModelKind::ResCnn);
    }

    #[test]
    fn test_kind_settings() {
        let g = ModelKind::Gambas;
        assert_eq!((g.gpu_ids(), g.run_name(), g.net_g()), ("0", "gpu", "i2i_mamba"));
        let r = ModelKind::ResCnn;
        assert_eq!((r.gpu_ids(), r.run_name(), r.net_g()), ("-1", "cpu", "res_cnn"));
        assert_eq!(r.output_suffix(), "_ResCNN");
    }
}
