//! Standardized (BIDS) layout: `rawdata/` and `derivatives/` under the work dir.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::util::fs::file_name_lossy;

/// Acquisition orientations, in processing order.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Orientation {
    Axial,
    Sagittal,
    Coronal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Sagittal,
        Orientation::Coronal,
    ];

    /// Token used in file names (`..._T2w_axi.nii.gz`, `acq-axi`).
    pub fn token(&self) -> &'static str {
        match self {
            Orientation::Axial => "axi",
            Orientation::Sagittal => "sag",
            Orientation::Coronal => "cor",
        }
    }

    /// Guess the orientation from a free-form source file name.
    pub fn detect(name: &str) -> Option<Orientation> {
        let lower = name.to_lowercase();
        Orientation::ALL
            .into_iter()
            .find(|o| lower.contains(o.token()))
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    raw: PathBuf,
    derivatives: PathBuf,
}

impl Layout {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            root: work_dir.to_path_buf(),
            raw: work_dir.join("rawdata"),
            derivatives: work_dir.join("derivatives"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_root(&self) -> &Path {
        &self.raw
    }

    pub fn derivatives_root(&self) -> &Path {
        &self.derivatives
    }

    pub fn sourcedata_root(&self) -> PathBuf {
        self.root.join("sourcedata")
    }

    pub fn anat_dir(&self, subject: &str, session: &str) -> PathBuf {
        self.raw
            .join(format!("sub-{subject}"))
            .join(format!("ses-{session}"))
            .join("anat")
    }

    pub fn derivative_anat_dir(&self, subject: &str, session: &str) -> PathBuf {
        self.derivatives
            .join(format!("sub-{subject}"))
            .join(format!("ses-{session}"))
            .join("anat")
    }

    /// T2-weighted images for one subject/session/orientation, sorted by name.
    ///
    /// A missing subject or session directory is an empty result.
    pub fn t2w_images(
        &self,
        subject: &str,
        session: &str,
        orientation: Orientation,
    ) -> io::Result<Vec<PathBuf>> {
        let dir = self.anat_dir(subject, session);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let prefix = format!("sub-{subject}_ses-{session}_");
        let mut out = Vec::new();
        for entry in WalkDir::new(&dir).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = file_name_lossy(entry.path());
            if name.starts_with(&prefix) && is_t2w_of(&name, orientation) {
                out.push(entry.into_path());
            }
        }
        Ok(out)
    }

    /// Candidate set for a session: axial, then sagittal, then coronal.
    pub fn t2w_candidates(&self, subject: &str, session: &str) -> io::Result<Vec<PathBuf>> {
        let mut all = Vec::new();
        for o in Orientation::ALL {
            all.extend(self.t2w_images(subject, session, o)?);
        }
        Ok(all)
    }
}

fn is_t2w_of(name: &str, orientation: Orientation) -> bool {
    let Some(stem) = name.strip_suffix(".nii.gz") else {
        return false;
    };
    let tokens: Vec<&str> = stem.split(|c| c == '_' || c == '-').collect();
    tokens.contains(&"T2w") && tokens.contains(&orientation.token())
}
