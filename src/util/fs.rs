use std::io;
use std::path::{Path, PathBuf};

/// Create a directory (and parents) right before something is written into it.
pub fn ensure_dir(p: &Path) -> io::Result<()> {
    if !p.is_dir() {
        std::fs::create_dir_all(p)?;
    }
    Ok(())
}

/// Outcome of removing one file, kept for the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub path: PathBuf,
    pub error: Option<String>,
}

impl Deletion {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Remove a file and report the outcome instead of failing.
pub fn remove_file_reported(p: &Path) -> Deletion {
    match std::fs::remove_file(p) {
        Ok(()) => Deletion {
            path: p.to_path_buf(),
            error: None,
        },
        Err(e) => Deletion {
            path: p.to_path_buf(),
            error: Some(e.to_string()),
        },
    }
}

/// File name as a lossy string; empty when the path has no final component.
pub fn file_name_lossy(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Sorted `*.nii.gz` files directly inside `dir`. A missing dir yields an empty list.
pub fn nifti_files_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let rd = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut out = Vec::new();
    for entry in rd {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && file_name_lossy(&path).ends_with(".nii.gz") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
