//! Upstream platform collaborator: read-only hierarchy traversal plus
//! write-only analysis creation and output upload.

pub mod http;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::GearError;

pub use http::HttpPlatform;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Project,
    Subject,
    Session,
    Acquisition,
    File,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Project => "project",
            ContainerKind::Subject => "subject",
            ContainerKind::Session => "session",
            ContainerKind::Acquisition => "acquisition",
            ContainerKind::File => "file",
        }
    }

    /// Kind of the containers listed directly below this one.
    pub fn child(&self) -> Option<ContainerKind> {
        match self {
            ContainerKind::Project => Some(ContainerKind::Subject),
            ContainerKind::Subject => Some(ContainerKind::Session),
            ContainerKind::Session => Some(ContainerKind::Acquisition),
            ContainerKind::Acquisition => Some(ContainerKind::File),
            ContainerKind::File => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "project" => Some(ContainerKind::Project),
            "subject" => Some(ContainerKind::Subject),
            "session" => Some(ContainerKind::Session),
            "acquisition" => Some(ContainerKind::Acquisition),
            "file" => Some(ContainerKind::File),
            _ => None,
        }
    }
}

/// Ids of the containers above a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parents {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
}

/// Project-level counts, used only for progress output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub subjects: u64,
    pub sessions: u64,
    pub acquisitions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNode {
    pub id: String,
    pub kind: ContainerKind,
    pub label: String,
    pub parents: Parents,
    pub stats: Option<Stats>,
}

impl ContainerNode {
    pub fn new(id: impl Into<String>, kind: ContainerKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            parents: Parents::default(),
            stats: None,
        }
    }
}

/// A file attached to an acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    pub name: String,
    /// Declared content type, e.g. `nifti`, `dicom`, `source code`.
    pub file_type: String,
    pub acquisition_id: String,
}

/// Handle for a created analysis container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisHandle {
    pub id: String,
    pub session_id: String,
}

pub trait Platform {
    fn container(&self, id: &str) -> Result<ContainerNode, GearError>;

    /// The container an analysis was launched from (the gear's input container).
    fn analysis_parent(&self, analysis_id: &str) -> Result<ContainerNode, GearError>;

    /// Direct children of a project, subject or session, in platform order.
    fn children(&self, node: &ContainerNode) -> Result<Vec<ContainerNode>, GearError>;

    fn files(&self, acquisition: &ContainerNode) -> Result<Vec<FileNode>, GearError>;

    /// Write the file's content to `dest` (the caller owns atomic placement).
    fn download(&self, file: &FileNode, dest: &Path) -> Result<(), GearError>;

    fn create_analysis(
        &self,
        session_id: &str,
        label: &str,
        info: &serde_json::Value,
    ) -> Result<AnalysisHandle, GearError>;

    fn upload_output(&self, analysis: &AnalysisHandle, path: &Path) -> Result<(), GearError>;
}
