#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use gambas_gear::config::{GearContext, GearPaths};
use gambas_gear::model::{InferenceRequest, ModelFactory, SrModel};
use gambas_gear::options::ModelOptions;
use gambas_gear::platform::{AnalysisHandle, ContainerKind, ContainerNode, FileNode, Platform};
use gambas_gear::registration::{RegisteredImage, Registrar};
use gambas_gear::GearError;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct CreatedAnalysis {
    pub id: String,
    pub session_id: String,
    pub label: String,
    pub info: Value,
}

/// In-memory container tree with a download counter and recorded publishes.
#[derive(Default)]
pub struct FakePlatform {
    nodes: HashMap<String, ContainerNode>,
    kids: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<FileNode>>,
    pub failing_downloads: HashSet<String>,
    pub failing_sessions: RefCell<HashSet<String>>,
    pub downloads: Cell<usize>,
    pub analyses: RefCell<Vec<CreatedAnalysis>>,
    pub uploads: RefCell<Vec<(String, PathBuf)>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, node: ContainerNode, parent: Option<&str>) -> &mut Self {
        if let Some(p) = parent {
            self.kids.entry(p.to_string()).or_default().push(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
        self
    }

    pub fn project(&mut self, id: &str, label: &str) -> &mut Self {
        self.add(ContainerNode::new(id, ContainerKind::Project, label), None)
    }

    pub fn subject(&mut self, id: &str, label: &str, project: &str) -> &mut Self {
        let mut node = ContainerNode::new(id, ContainerKind::Subject, label);
        node.parents.project = Some(project.to_string());
        self.add(node, Some(project))
    }

    pub fn session(&mut self, id: &str, label: &str, subject: &str) -> &mut Self {
        let project = self.nodes.get(subject).and_then(|s| s.parents.project.clone());
        let mut node = ContainerNode::new(id, ContainerKind::Session, label);
        node.parents.project = project;
        node.parents.subject = Some(subject.to_string());
        self.add(node, Some(subject))
    }

    pub fn acquisition(&mut self, id: &str, label: &str, session: &str) -> &mut Self {
        let node = ContainerNode::new(id, ContainerKind::Acquisition, label);
        self.add(node, Some(session))
    }

    pub fn file(&mut self, acquisition: &str, name: &str, file_type: &str) -> &mut Self {
        self.files
            .entry(acquisition.to_string())
            .or_default()
            .push(FileNode {
                name: name.to_string(),
                file_type: file_type.to_string(),
                acquisition_id: acquisition.to_string(),
            });
        self
    }

    pub fn node(&self, id: &str) -> ContainerNode {
        self.nodes.get(id).cloned().expect("known node")
    }

    pub fn uploads_for(&self, analysis_id: &str) -> Vec<PathBuf> {
        self.uploads
            .borrow()
            .iter()
            .filter(|(id, _)| id == analysis_id)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl Platform for FakePlatform {
    fn container(&self, id: &str) -> Result<ContainerNode, GearError> {
        self.nodes
            .get(id)
            .cloned()
            .ok_or_else(|| GearError::platform(format!("no container {id}")))
    }

    fn analysis_parent(&self, analysis_id: &str) -> Result<ContainerNode, GearError> {
        self.container(analysis_id)
    }

    fn children(&self, node: &ContainerNode) -> Result<Vec<ContainerNode>, GearError> {
        Ok(self
            .kids
            .get(&node.id)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    fn files(&self, acquisition: &ContainerNode) -> Result<Vec<FileNode>, GearError> {
        Ok(self.files.get(&acquisition.id).cloned().unwrap_or_default())
    }

    fn download(&self, file: &FileNode, dest: &Path) -> Result<(), GearError> {
        if self.failing_downloads.contains(&file.name) {
            return Err(GearError::platform(format!("HTTP 500 for {}", file.name)));
        }
        self.downloads.set(self.downloads.get() + 1);
        std::fs::write(dest, format!("content of {}", file.name))?;
        Ok(())
    }

    fn create_analysis(
        &self,
        session_id: &str,
        label: &str,
        info: &Value,
    ) -> Result<AnalysisHandle, GearError> {
        if self.failing_sessions.borrow().contains(session_id) {
            return Err(GearError::platform(format!("HTTP 403 for session {session_id}")));
        }
        let mut analyses = self.analyses.borrow_mut();
        let id = format!("analysis-{}", analyses.len() + 1);
        analyses.push(CreatedAnalysis {
            id: id.clone(),
            session_id: session_id.to_string(),
            label: label.to_string(),
            info: info.clone(),
        });
        Ok(AnalysisHandle {
            id,
            session_id: session_id.to_string(),
        })
    }

    fn upload_output(&self, analysis: &AnalysisHandle, path: &Path) -> Result<(), GearError> {
        self.uploads
            .borrow_mut()
            .push((analysis.id.clone(), path.to_path_buf()));
        Ok(())
    }
}

/// Registers every image by returning it unchanged, except names containing
/// one of `fail_on`.
#[derive(Default)]
pub struct FakeRegistrar {
    pub fail_on: Vec<String>,
    pub calls: RefCell<Vec<PathBuf>>,
}

impl FakeRegistrar {
    pub fn failing_all() -> Self {
        Self {
            fail_on: vec![String::new()],
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl Registrar for FakeRegistrar {
    fn register(
        &self,
        image: &Path,
        _reference: &Path,
        _subject: &str,
        _session: &str,
    ) -> Result<Option<RegisteredImage>, GearError> {
        self.calls.borrow_mut().push(image.to_path_buf());
        let name = image.to_string_lossy();
        if self.fail_on.iter().any(|f| name.contains(f.as_str())) {
            tracing::warn!("fake registration rejects {}", name);
            return Ok(None);
        }
        Ok(Some(RegisteredImage {
            path: image.to_path_buf(),
        }))
    }
}

/// Writes a small file at the requested output path, or produces nothing
/// when `produce` is false.
pub struct FakeModelFactory {
    pub produce: bool,
    pub seen: Rc<RefCell<Vec<ModelOptions>>>,
}

impl FakeModelFactory {
    pub fn new(produce: bool) -> Self {
        Self {
            produce,
            seen: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

struct FakeModel {
    produce: bool,
    seen: Rc<RefCell<Vec<ModelOptions>>>,
}

impl ModelFactory for FakeModelFactory {
    fn create(&self, _opts: &ModelOptions) -> Result<Box<dyn SrModel>, GearError> {
        Ok(Box::new(FakeModel {
            produce: self.produce,
            seen: Rc::clone(&self.seen),
        }))
    }
}

impl SrModel for FakeModel {
    fn setup(&mut self, opts: &ModelOptions) -> Result<(), GearError> {
        self.seen.borrow_mut().push(opts.clone());
        Ok(())
    }

    fn infer(&mut self, request: &InferenceRequest) -> Result<Option<PathBuf>, GearError> {
        if !self.produce {
            return Ok(None);
        }
        std::fs::write(&request.output, b"sr")?;
        Ok(Some(request.output.clone()))
    }
}

pub fn test_context(base: &Path) -> GearContext {
    GearContext::from_documents(
        GearPaths::new(base),
        json!({
            "config": {"phase": "test", "stride_inplane": 32, "stride_layer": 32, "debug": false},
            "destination": {"id": "analysis-dest"},
            "inputs": {"api-key": {"key": "fw.example.org:secret"}}
        }),
        json!({
            "name": "gambas",
            "version": "0.3.2",
            "custom": {"gear-builder": {"image": "khula/gambas:0.3.2"}}
        }),
    )
    .expect("context")
}

/// Create an empty file (and its parents).
pub fn touch(p: &Path) {
    std::fs::create_dir_all(p.parent().expect("parent")).expect("mkdir");
    std::fs::write(p, b"nifti").expect("write");
}
