//! Dataset Builder: turn each imported session folder into the BIDS raw tree.

use std::path::{Path, PathBuf};
use std::time::Duration;

use walkdir::WalkDir;

use crate::errors::GearError;
use crate::importer::{ImportedDataset, SessionRecord};
use crate::layout::{Layout, Orientation};
use crate::util::fs::{ensure_dir, file_name_lossy};
use crate::util::{ExecRequest, ExecService};

/// Conversion collaborator: populate `rawdata/sub-<s>/ses-<t>/` from one source folder.
pub trait Converter {
    fn name(&self) -> &str;

    fn convert(
        &self,
        source: &Path,
        subject: &str,
        session: &str,
        layout: &Layout,
    ) -> Result<(), GearError>;
}

/// Runs the external `dcm2bids` tool with the gear's conversion config.
pub struct Dcm2BidsConverter {
    exec: ExecService,
    config_file: PathBuf,
    /// Inputs are already NIfTI; skip the vendor-format extraction pass.
    skip_dcm2niix: bool,
    timeout: Duration,
}

impl Dcm2BidsConverter {
    pub fn new(exec: ExecService, config_file: impl Into<PathBuf>) -> Self {
        let timeout = exec.default_timeout();
        Self {
            exec,
            config_file: config_file.into(),
            skip_dcm2niix: true,
            timeout,
        }
    }

    pub fn skip_dcm2niix(mut self, skip: bool) -> Self {
        self.skip_dcm2niix = skip;
        self
    }

    pub fn request(&self, source: &Path, subject: &str, session: &str, layout: &Layout) -> ExecRequest {
        let mut req = ExecRequest::new("dcm2bids")
            .arg("-d")
            .path_arg(source)
            .arg("-p")
            .arg(subject)
            .arg("-s")
            .arg(session)
            .arg("-c")
            .path_arg(&self.config_file)
            .arg("-o")
            .path_arg(layout.raw_root())
            .timeout(self.timeout);
        if self.skip_dcm2niix {
            req = req.arg("--skip_dcm2niix");
        }
        req
    }
}

impl Converter for Dcm2BidsConverter {
    fn name(&self) -> &str {
        "dcm2bids"
    }

    fn convert(
        &self,
        source: &Path,
        subject: &str,
        session: &str,
        layout: &Layout,
    ) -> Result<(), GearError> {
        let out = self.exec.run(self.request(source, subject, session, layout))?;
        if !out.success() {
            return Err(GearError::tool(format!(
                "dcm2bids exited with {} for sub-{subject}/ses-{session}: {}",
                out.status,
                out.stderr_tail()
            )));
        }
        Ok(())
    }
}

/// Copies NIfTI inputs straight into BIDS names, for data that needs no conversion.
///
/// Target: `sub-<s>_ses-<t>_T2w_<orient>.nii.gz`, with `_run-<n>` from the
/// second image of an orientation on. Images with no recognizable orientation
/// are skipped. Only the top level of the source folder is read.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeConverter;

impl Converter for NativeConverter {
    fn name(&self) -> &str {
        "native"
    }

    fn convert(
        &self,
        source: &Path,
        subject: &str,
        session: &str,
        layout: &Layout,
    ) -> Result<(), GearError> {
        if !source.is_dir() {
            return Ok(());
        }
        let anat = layout.anat_dir(subject, session);
        let mut counts = [0usize; 3];
        for entry in WalkDir::new(source).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = file_name_lossy(entry.path());
            if !name.ends_with(".nii.gz") || name.starts_with(".partial-") {
                continue;
            }
            let Some(orientation) = Orientation::detect(&name) else {
                tracing::warn!("no orientation in {}; not converted", name);
                continue;
            };
            let idx = Orientation::ALL
                .iter()
                .position(|o| *o == orientation)
                .unwrap_or(0);
            counts[idx] += 1;
            let run = if counts[idx] > 1 {
                format!("_run-{:02}", counts[idx])
            } else {
                String::new()
            };
            let target = anat.join(format!(
                "sub-{subject}_ses-{session}_T2w_{}{run}.nii.gz",
                orientation.token()
            ));
            ensure_dir(&anat)?;
            std::fs::copy(entry.path(), &target)?;
            tracing::debug!("{} -> {}", entry.path().display(), target.display());
        }
        Ok(())
    }
}

/// Result of converting one imported session.
#[derive(Debug, Clone)]
pub struct BuiltSession {
    pub record: SessionRecord,
    pub error: Option<String>,
}

impl BuiltSession {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Create `rawdata/`, `derivatives/` and `sourcedata/` with BIDS dataset descriptions.
pub fn setup_bids_directories(work_dir: &Path) -> Result<Layout, GearError> {
    let layout = Layout::new(work_dir);
    ensure_dir(layout.raw_root())?;
    ensure_dir(layout.derivatives_root())?;
    ensure_dir(&layout.sourcedata_root())?;

    write_description(layout.raw_root(), serde_json::json!({
        "Name": "gambas-gear import",
        "BIDSVersion": "1.8.0",
        "DatasetType": "raw",
    }))?;
    write_description(layout.derivatives_root(), serde_json::json!({
        "Name": "gambas-gear derivatives",
        "BIDSVersion": "1.8.0",
        "DatasetType": "derivative",
        "GeneratedBy": [{ "Name": "gambas-gear", "Version": env!("CARGO_PKG_VERSION") }],
    }))?;
    Ok(layout)
}

fn write_description(dir: &Path, doc: serde_json::Value) -> Result<(), GearError> {
    let path = dir.join("dataset_description.json");
    if path.exists() {
        return Ok(());
    }
    std::fs::write(&path, serde_json::to_vec_pretty(&doc)?)?;
    Ok(())
}

/// Convert every imported session, in import order. One failure never stops the rest.
pub fn build_dataset(
    dataset: &ImportedDataset,
    layout: &Layout,
    converter: &dyn Converter,
) -> Vec<BuiltSession> {
    dataset
        .sessions()
        .map(|record| {
            tracing::info!(
                "Importing {} {} with {}...",
                record.subject,
                record.session,
                converter.name()
            );
            let error = converter
                .convert(&record.folder, &record.subject, &record.session, layout)
                .err()
                .map(|e| {
                    tracing::error!(
                        "conversion failed for {}/{}: {}",
                        record.subject,
                        record.session,
                        e
                    );
                    e.to_string()
                });
            BuiltSession {
                record: record.clone(),
                error,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dcm2bids_request_args() {
        let conv = Dcm2BidsConverter::new(ExecService::default(), "/cfg/dcm2bids.json");
        let layout = Layout::new(Path::new("/work"));
        let req = conv.request(Path::new("/work/sourcedata/p/01/1"), "01", "1", &layout);
        let args: Vec<String> = req
            .arg_list()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(req.program(), std::ffi::OsStr::new("dcm2bids"));
        assert_eq!(
            args,
            vec![
                "-d",
                "/work/sourcedata/p/01/1",
                "-p",
                "01",
                "-s",
                "1",
                "-c",
                "/cfg/dcm2bids.json",
                "-o",
                "/work/rawdata",
                "--skip_dcm2niix"
            ]
        );
    }

    #[test]
    fn test_dcm2bids_runs_extraction_when_asked() {
        let conv = Dcm2BidsConverter::new(ExecService::default(), "/cfg/dcm2bids.json")
            .skip_dcm2niix(false);
        let layout = Layout::new(Path::new("/work"));
        let req = conv.request(Path::new("/src"), "01", "1", &layout);
        assert!(!req.arg_list().iter().any(|a| a == "--skip_dcm2niix"));
    }

    #[test]
    fn test_setup_is_repeatable() {
        let td = tempfile::tempdir().expect("tmpdir");
        setup_bids_directories(td.path()).expect("first");
        let desc = td.path().join("rawdata/dataset_description.json");
        std::fs::write(&desc, b"{\"Name\":\"kept\"}").expect("overwrite");
        setup_bids_directories(td.path()).expect("second");
        assert_eq!(std::fs::read(&desc).expect("read"), b"{\"Name\":\"kept\"}");
        assert!(td.path().join("sourcedata").is_dir());
    }
}
