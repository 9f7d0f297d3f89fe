//! Unit Processor: register and super-resolve every T2w candidate of one
//! subject/session.
//!
//! Each candidate walks
//! `Discovered → Registering → (RegistrationFailed | Registered) → ModelReady → (InferenceFailed | Completed)`
//! and lands in `Errored` if any step raises. Candidates are independent: a
//! failure is logged with its path and the next candidate runs.

use std::path::{Path, PathBuf};

use crate::config::GearContext;
use crate::errors::GearError;
use crate::layout::Layout;
use crate::model::{InferenceRequest, ModelFactory, ModelKind};
use crate::options::resolve_options;
use crate::registration::Registrar;
use crate::session_log::SessionLog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateState {
    Discovered,
    Registering,
    RegistrationFailed,
    Registered,
    ModelReady,
    InferenceFailed,
    Completed(PathBuf),
    Errored(String),
}

impl CandidateState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CandidateState::RegistrationFailed
                | CandidateState::InferenceFailed
                | CandidateState::Completed(_)
                | CandidateState::Errored(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReport {
    pub image: PathBuf,
    pub state: CandidateState,
}

/// Files produced for one subject/session, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingResult {
    pub raw_files: Vec<PathBuf>,
    pub derivative_files: Vec<PathBuf>,
    pub log_files: Vec<PathBuf>,
    pub candidates: Vec<CandidateReport>,
}

impl ProcessingResult {
    pub fn has_candidates(&self) -> bool {
        !self.raw_files.is_empty()
    }

    pub fn has_derivatives(&self) -> bool {
        !self.derivative_files.is_empty()
    }
}

pub struct UnitProcessor<'a> {
    layout: &'a Layout,
    context: &'a GearContext,
    kind: ModelKind,
    registrar: &'a dyn Registrar,
    models: &'a dyn ModelFactory,
    mirror_stderr: bool,
}

impl<'a> UnitProcessor<'a> {
    pub fn new(
        layout: &'a Layout,
        context: &'a GearContext,
        kind: ModelKind,
        registrar: &'a dyn Registrar,
        models: &'a dyn ModelFactory,
    ) -> Self {
        Self {
            layout,
            context,
            kind,
            registrar,
            models,
            mirror_stderr: true,
        }
    }

    /// Echo captured session events to stderr as well (on by default).
    pub fn mirror_stderr(mut self, mirror: bool) -> Self {
        self.mirror_stderr = mirror;
        self
    }

    pub fn layout(&self) -> &Layout {
        self.layout
    }

    pub fn process(&self, subject: &str, session: &str) -> ProcessingResult {
        let log = SessionLog::begin(self.layout.root(), subject, session, self.mirror_stderr);
        let mut result = ProcessingResult::default();

        tracing::info!(
            "Processing sub-{subject} ses-{session} with {}",
            self.kind.display_name()
        );
        match self.layout.t2w_candidates(subject, session) {
            Ok(found) => result.raw_files = found,
            Err(e) => tracing::error!("cannot list T2w images for {}: {e}", log.unit()),
        }
        if result.raw_files.is_empty() {
            tracing::info!("no T2w candidates for {}", log.unit());
        }

        for image in result.raw_files.clone() {
            let state = match self.process_candidate(&log, &image) {
                Ok(state) => state,
                Err(e) => {
                    tracing::error!(
                        "error processing {} for {}: {e}",
                        image.display(),
                        log.unit()
                    );
                    CandidateState::Errored(e.to_string())
                }
            };
            if let CandidateState::Completed(ref out) = state {
                result.derivative_files.push(out.clone());
            }
            result.candidates.push(CandidateReport { image, state });
        }

        let unit = log.unit();
        match log.finish() {
            Ok(path) => result.log_files.push(path),
            Err(e) => tracing::error!("cannot write session log for {unit}: {e}"),
        }
        result
    }

    fn process_candidate(&self, log: &SessionLog, image: &Path) -> Result<CandidateState, GearError> {
        let mut state = CandidateState::Discovered;
        tracing::debug!("{} {:?}", image.display(), state);

        let opts = resolve_options(
            self.layout,
            &self.context.paths,
            &self.context.config,
            self.kind,
            log.subject(),
            log.session(),
            image,
        )?;

        state = CandidateState::Registering;
        tracing::debug!("{} {:?}", image.display(), state);
        let Some(registered) =
            self.registrar
                .register(image, &opts.reference, log.subject(), log.session())?
        else {
            tracing::warn!(
                "registration failed for {} ({}); skipping",
                image.display(),
                log.unit()
            );
            return Ok(CandidateState::RegistrationFailed);
        };
        state = CandidateState::Registered;
        tracing::debug!("{} {:?}", image.display(), state);

        let mut model = self.models.create(&opts)?;
        model.setup(&opts)?;
        state = CandidateState::ModelReady;
        tracing::debug!("{} {:?}", image.display(), state);

        let request = InferenceRequest::from_options(&opts, registered);
        match model.infer(&request)? {
            Some(out) => {
                tracing::info!("Super-resolved {} -> {}", image.display(), out.display());
                Ok(CandidateState::Completed(out))
            }
            None => {
                tracing::error!(
                    "inference produced no output for {} ({})",
                    image.display(),
                    log.unit()
                );
                Ok(CandidateState::InferenceFailed)
            }
        }
    }
}
