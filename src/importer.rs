//! Hierarchical import: walk a project/subject/session tree and materialize
//! the T2-weighted axial source files under `sourcedata/`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::errors::GearError;
use crate::labels::{resolve_label, LabelKind, LabelScope};
use crate::platform::{ContainerKind, ContainerNode, FileNode, Platform};
use crate::util::fs::ensure_dir;

/// Declared content types eligible for import.
pub const ALLOWED_TYPES: &[&str] = &["source code", "nifti"];

/// Lower-cased name fragments that mark derived/auxiliary images.
pub const EXCLUDED_MARKERS: &[&str] = &["mapping", "align", "brain"];

/// Inclusion filter: T2-weighted axial source images only.
pub fn should_import(file: &FileNode) -> bool {
    if !ALLOWED_TYPES.contains(&file.file_type.as_str()) {
        return false;
    }
    let lower = file.name.to_lowercase();
    if !file.name.contains("T2") || !lower.contains("axi") {
        return false;
    }
    !EXCLUDED_MARKERS.iter().any(|m| lower.contains(m))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Rejected by the inclusion filter.
    Filtered,
    /// Target path already existed; not fetched again.
    AlreadyPresent,
    Downloaded,
    /// Dry run: would have been downloaded.
    Planned,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ImportedFile {
    pub source_name: String,
    pub target: PathBuf,
    pub outcome: FileOutcome,
}

/// One imported session: resolved labels plus where its files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub subject: String,
    pub session: String,
    pub folder: PathBuf,
    pub session_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportedSubject {
    pub label: String,
    pub sessions: Vec<SessionRecord>,
    scope: LabelScope,
}

impl ImportedSubject {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            sessions: Vec::new(),
            scope: LabelScope::new(),
        }
    }
}

/// Ordered subject → session mapping produced by one import.
#[derive(Debug, Clone, Default)]
pub struct ImportedDataset {
    pub project: String,
    pub subjects: Vec<ImportedSubject>,
    pub files: Vec<ImportedFile>,
    /// Sessions (or subtrees) that could not be imported, with the reason.
    pub errors: Vec<String>,
    /// Dry-run targets already reported as `Planned`.
    planned: HashSet<PathBuf>,
}

impl ImportedDataset {
    /// All sessions in traversal order.
    pub fn sessions(&self) -> impl Iterator<Item = &SessionRecord> {
        self.subjects.iter().flat_map(|s| s.sessions.iter())
    }

    pub fn session(&self, subject: &str, session: &str) -> Option<&SessionRecord> {
        self.sessions()
            .find(|r| r.subject == subject && r.session == session)
    }

    pub fn count(&self, pick: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pick(&f.outcome)).count()
    }

    fn subject_mut(&mut self, label: &str) -> &mut ImportedSubject {
        if let Some(idx) = self.subjects.iter().position(|s| s.label == label) {
            return &mut self.subjects[idx];
        }
        self.subjects.push(ImportedSubject::new(label));
        let last = self.subjects.len() - 1;
        &mut self.subjects[last]
    }
}

pub struct Importer<'a> {
    platform: &'a dyn Platform,
    sourcedata: PathBuf,
    dry_run: bool,
}

impl<'a> Importer<'a> {
    pub fn new(platform: &'a dyn Platform, sourcedata: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            sourcedata: sourcedata.into(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Import everything below `root` (a project, subject or session).
    ///
    /// Only failures to read the root itself (or its parents) are returned as
    /// errors; everything below is isolated per session / per file.
    pub fn import(&self, root: &ContainerNode) -> Result<ImportedDataset, GearError> {
        tracing::info!("Downloading {} ({})", root.label, root.kind.as_str());
        let mut out = ImportedDataset::default();
        match root.kind {
            ContainerKind::Project => {
                out.project = resolve_label(&root.label, LabelKind::Project);
                if let Some(stats) = root.stats {
                    tracing::info!(
                        "project {}: {} subjects, {} sessions, {} acquisitions",
                        root.label,
                        stats.subjects,
                        stats.sessions,
                        stats.acquisitions
                    );
                }
                let project_dir = self.sourcedata.join(&out.project);
                for subject in self.platform.children(root)? {
                    self.import_subject(&subject, &project_dir, &mut out);
                }
            }
            ContainerKind::Subject => {
                out.project = self.parent_label(root, ContainerKind::Project)?;
                let project_dir = self.sourcedata.join(&out.project);
                self.import_subject(root, &project_dir, &mut out);
            }
            ContainerKind::Session => {
                out.project = self.parent_label(root, ContainerKind::Project)?;
                let subject = self.parent_label(root, ContainerKind::Subject)?;
                let subject_dir = self.sourcedata.join(&out.project).join(&subject);
                self.import_session(root, &subject, &subject_dir, &mut out);
            }
            other => {
                return Err(GearError::config(format!(
                    "cannot import from a {} container; expected project, subject or session",
                    other.as_str()
                )))
            }
        }
        tracing::info!(
            "import finished: {} downloaded, {} already present, {} failed",
            out.count(|o| *o == FileOutcome::Downloaded),
            out.count(|o| *o == FileOutcome::AlreadyPresent),
            out.count(|o| matches!(o, FileOutcome::Failed(_)))
        );
        Ok(out)
    }

    fn parent_label(&self, node: &ContainerNode, kind: ContainerKind) -> Result<String, GearError> {
        let (id, label_kind) = match kind {
            ContainerKind::Project => (node.parents.project.as_deref(), LabelKind::Project),
            ContainerKind::Subject => (node.parents.subject.as_deref(), LabelKind::Subject),
            _ => (None, LabelKind::Project),
        };
        let id = id.ok_or_else(|| {
            GearError::platform(format!(
                "{} {} has no parent {}",
                node.kind.as_str(),
                node.id,
                kind.as_str()
            ))
        })?;
        let parent = self.platform.container(id)?;
        let label = resolve_label(&parent.label, label_kind);
        if label.is_empty() && label_kind == LabelKind::Subject {
            return Err(GearError::config(format!(
                "subject label {:?} resolves to an empty name",
                parent.label
            )));
        }
        Ok(label)
    }

    fn import_subject(&self, subject: &ContainerNode, project_dir: &Path, out: &mut ImportedDataset) {
        let label = resolve_label(&subject.label, LabelKind::Subject);
        if label.is_empty() {
            tracing::error!("skipping subject {:?}: label resolves to an empty name", subject.label);
            out.errors
                .push(format!("subject {:?}: label resolves to an empty name", subject.label));
            return;
        }
        tracing::info!("--- subject {} -> {} ---", subject.label, label);
        let subject_dir = project_dir.join(&label);
        let sessions = match self.platform.children(subject) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("could not list sessions of subject {}: {}", subject.label, e);
                out.errors
                    .push(format!("subject {}: listing sessions failed: {e}", subject.label));
                return;
            }
        };
        // Register the subject even when it has no sessions so callers see it.
        out.subject_mut(&label);
        for session in &sessions {
            self.import_session(session, &label, &subject_dir, out);
        }
    }

    fn import_session(
        &self,
        session: &ContainerNode,
        subject: &str,
        subject_dir: &Path,
        out: &mut ImportedDataset,
    ) {
        let claimed = out.subject_mut(subject).scope.resolve(&session.label, LabelKind::Session);
        let label = match claimed {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("skipping session {} of {}: {}", session.label, subject, e);
                out.errors
                    .push(format!("{subject}/{}: {e}", session.label));
                return;
            }
        };
        let session_dir = subject_dir.join(&label);
        tracing::info!(
            "session {} -> {} (saving into {})",
            session.label,
            label,
            session_dir.display()
        );

        match self.platform.children(session) {
            Ok(acquisitions) => {
                for acq in &acquisitions {
                    self.import_acquisition(acq, &session_dir, out);
                }
            }
            Err(e) => {
                tracing::error!("could not list acquisitions of {}/{}: {}", subject, label, e);
                out.errors
                    .push(format!("{subject}/{label}: listing acquisitions failed: {e}"));
            }
        }

        out.subject_mut(subject).sessions.push(SessionRecord {
            subject: subject.to_string(),
            session: label,
            folder: session_dir,
            session_id: session.id.clone(),
        });
    }

    fn import_acquisition(&self, acq: &ContainerNode, session_dir: &Path, out: &mut ImportedDataset) {
        let files = match self.platform.files(acq) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!("could not list files of acquisition {}: {}", acq.label, e);
                out.errors
                    .push(format!("acquisition {}: listing files failed: {e}", acq.label));
                return;
            }
        };
        for file in &files {
            let imported = self.import_file(file, session_dir, &mut out.planned);
            out.files.push(imported);
        }
    }

    /// Apply the filter to one file and fetch it unless it is already on disk.
    fn import_file(
        &self,
        file: &FileNode,
        session_dir: &Path,
        planned: &mut HashSet<PathBuf>,
    ) -> ImportedFile {
        let local_name = Path::new(&file.name).file_name();
        let target = session_dir.join(local_name.unwrap_or_default());
        let outcome = if !should_import(file) {
            tracing::debug!("skipping file {}", file.name);
            FileOutcome::Filtered
        } else if local_name.is_none() {
            tracing::error!("refusing file with no usable name: {:?}", file.name);
            FileOutcome::Failed(format!("file name {:?} has no final component", file.name))
        } else if target.exists() || planned.contains(&target) {
            tracing::info!("file already downloaded: {}", target.display());
            FileOutcome::AlreadyPresent
        } else if self.dry_run {
            tracing::info!("[DRY RUN] would have downloaded: {}", file.name);
            planned.insert(target.clone());
            FileOutcome::Planned
        } else {
            match self.fetch(file, session_dir, &target) {
                Ok(()) => {
                    tracing::info!("downloaded file: {}", file.name);
                    FileOutcome::Downloaded
                }
                Err(e) => {
                    tracing::error!("error downloading {}: {}", file.name, e);
                    FileOutcome::Failed(e.to_string())
                }
            }
        };
        ImportedFile {
            source_name: file.name.clone(),
            target,
            outcome,
        }
    }

    fn fetch(&self, file: &FileNode, session_dir: &Path, target: &Path) -> Result<(), GearError> {
        ensure_dir(session_dir)?;
        // Download next to the target and rename, so a crash never leaves a
        // partial file that a rerun would take as already imported.
        let tmp = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(session_dir)?;
        self.platform.download(file, tmp.path())?;
        tmp.persist(target).map_err(|e| GearError::Io(e.error))?;
        Ok(())
    }
}
