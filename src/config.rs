//! Gear configuration: `config.json` and `manifest.json` under the base dir,
//! read once at startup into typed structs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::errors::GearError;

pub const DEFAULT_BASE_DIR: &str = match option_env!("GAMBAS_GEAR_BAKED_BASE_DIR") {
    Some(dir) => dir,
    None => "/flywheel/v0",
};

pub const DEFAULT_ANTS_BIN: &str = "/opt/ants-2.5.4/bin";

/// Well-known locations under the gear base dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GearPaths {
    pub base_dir: PathBuf,
    pub input_dir: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub app_dir: PathBuf,
    pub bids_config_file: PathBuf,
    pub reference: PathBuf,
    pub checkpoints_dir: PathBuf,
    pub ants_bin: PathBuf,
}

impl GearPaths {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let app_dir = base_dir.join("app");
        Self {
            input_dir: base_dir.join("input"),
            work_dir: base_dir.join("work"),
            output_dir: base_dir.join("output"),
            bids_config_file: base_dir.join("utils").join("dcm2bids_config.json"),
            reference: app_dir.join("TemplateKhula.nii"),
            checkpoints_dir: app_dir.join("checkpoints"),
            ants_bin: PathBuf::from(DEFAULT_ANTS_BIN),
            app_dir,
            base_dir,
        }
    }

    /// Base dir from `--base-dir`, then GAMBAS_GEAR_BASE_DIR, then the default.
    pub fn resolve(cli: Option<&Path>) -> Self {
        if let Some(p) = cli {
            return Self::new(p);
        }
        match std::env::var("GAMBAS_GEAR_BASE_DIR") {
            Ok(s) if !s.trim().is_empty() => Self::new(s.trim()),
            _ => Self::new(DEFAULT_BASE_DIR),
        }
    }
}

/// Which conversion collaborator builds the raw tree.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    Dcm2bids,
    Native,
}

fn default_phase() -> String {
    "test".to_string()
}

fn default_epoch() -> String {
    "latest".to_string()
}

fn default_stride() -> u32 {
    32
}

/// Accept `32` or `"32"`; the config UI sends numbers as strings sometimes.
fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    use serde::de::Error;
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| D::Error::custom(format!("expected a non-negative integer, got {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| D::Error::custom(format!("expected an integer, got {s:?}"))),
        other => Err(D::Error::custom(format!("expected an integer, got {other}"))),
    }
}

/// The `config` block of config.json, with documented defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GearConfig {
    #[serde(default = "default_phase")]
    pub phase: String,
    #[serde(default = "default_epoch")]
    pub which_epoch: String,
    #[serde(default = "default_stride", deserialize_with = "lenient_u32")]
    pub stride_inplane: u32,
    #[serde(default = "default_stride", deserialize_with = "lenient_u32")]
    pub stride_layer: u32,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_converter")]
    pub converter: ConverterKind,
    /// Inputs are already NIfTI; dcm2bids skips its dcm2niix pass.
    #[serde(default = "default_true")]
    pub skip_dcm2niix: bool,
    /// Per-invocation limit for external tools; 0 waits forever.
    #[serde(default)]
    pub tool_timeout_secs: u64,
}

fn default_converter() -> ConverterKind {
    ConverterKind::Dcm2bids
}

fn default_true() -> bool {
    true
}

impl Default for GearConfig {
    fn default() -> Self {
        Self {
            phase: default_phase(),
            which_epoch: default_epoch(),
            stride_inplane: default_stride(),
            stride_layer: default_stride(),
            debug: false,
            converter: default_converter(),
            skip_dcm2niix: true,
            tool_timeout_secs: 0,
        }
    }
}

impl GearConfig {
    pub fn from_value(v: &Value) -> Result<Self, GearError> {
        let cfg: GearConfig = serde_json::from_value(v.clone())
            .map_err(|e| GearError::config(format!("config.json 'config': {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), GearError> {
        if self.stride_inplane == 0 || self.stride_layer == 0 {
            return Err(GearError::config("stride_inplane and stride_layer must be positive"));
        }
        if self.phase.trim().is_empty() {
            return Err(GearError::config("phase must not be empty"));
        }
        if self.which_epoch.trim().is_empty() {
            return Err(GearError::config("which_epoch must not be empty"));
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// The parts of manifest.json recorded on each analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub image: String,
}

#[derive(Deserialize)]
struct ManifestDoc {
    name: String,
    version: String,
    #[serde(default)]
    custom: Value,
}

impl Manifest {
    pub fn from_value(v: Value) -> Result<Self, GearError> {
        let doc: ManifestDoc = serde_json::from_value(v)
            .map_err(|e| GearError::config(format!("manifest.json: {e}")))?;
        let image = doc
            .custom
            .pointer("/gear-builder/image")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            name: doc.name,
            version: doc.version,
            image,
        })
    }
}

/// Everything read at startup.
#[derive(Debug, Clone)]
pub struct GearContext {
    pub paths: GearPaths,
    pub config: GearConfig,
    /// The `config` block as given, extended with the resolved directories.
    pub snapshot: Map<String, Value>,
    pub manifest: Manifest,
    pub destination_id: Option<String>,
    pub api_key: Option<String>,
}

impl GearContext {
    pub fn load(paths: GearPaths) -> Result<Self, GearError> {
        let config_doc = read_json(&paths.base_dir.join("config.json"))?;
        let manifest_doc = read_json(&paths.base_dir.join("manifest.json"))?;
        Self::from_documents(paths, config_doc, manifest_doc)
    }

    pub fn from_documents(
        paths: GearPaths,
        config_doc: Value,
        manifest_doc: Value,
    ) -> Result<Self, GearError> {
        let block = config_doc
            .get("config")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        if !block.is_object() {
            return Err(GearError::config("config.json 'config' must be an object"));
        }
        let config = GearConfig::from_value(&block)?;

        let mut snapshot = block.as_object().cloned().unwrap_or_default();
        for (key, dir) in [
            ("input_dir", &paths.input_dir),
            ("work_dir", &paths.work_dir),
            ("output_dir", &paths.output_dir),
            ("bids_config_file", &paths.bids_config_file),
        ] {
            snapshot.insert(key.to_string(), Value::String(dir.display().to_string()));
        }

        let destination_id = config_doc
            .pointer("/destination/id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let api_key = std::env::var("GAMBAS_GEAR_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                config_doc
                    .pointer("/inputs/api-key/key")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });

        Ok(Self {
            paths,
            config,
            snapshot,
            manifest: Manifest::from_value(manifest_doc)?,
            destination_id,
            api_key,
        })
    }
}

fn read_json(path: &Path) -> Result<Value, GearError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| GearError::config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| GearError::config(format!("{} is not valid JSON: {e}", path.display())))
}
