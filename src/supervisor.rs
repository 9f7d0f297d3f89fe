//! Run Supervisor: process every built session in import order, then clean
//! up or publish according to what the processor produced.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::color::{log_error_stderr, log_info_stderr, log_warn_stderr};
use crate::config::GearContext;
use crate::dataset::BuiltSession;
use crate::platform::Platform;
use crate::processor::{ProcessingResult, UnitProcessor};
use crate::util::fs::{remove_file_reported, Deletion};
use crate::util::{analysis_timestamp, now_local};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RecordStatus {
    Success,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Success => "success",
            RecordStatus::Failed => "failed",
        }
    }
}

pub const NOTE_NO_DERIVATIVES: &str = "No derived outputs, processing may have failed.";

/// What gets published for one session. Built once, never changed.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub label: String,
    pub gear: String,
    pub version: String,
    pub image: String,
    pub date: String,
    pub status: RecordStatus,
    pub note: String,
    pub config: Map<String, Value>,
}

impl AnalysisRecord {
    pub fn new(context: &GearContext, date: String, status: RecordStatus, note: impl Into<String>) -> Self {
        let m = &context.manifest;
        Self {
            label: format!("{}/{} {}", m.name, m.version, date),
            gear: m.name.clone(),
            version: m.version.clone(),
            image: m.image.clone(),
            date,
            status,
            note: note.into(),
            config: context.snapshot.clone(),
        }
    }

    /// Metadata map stored on the analysis: the configuration snapshot,
    /// overlaid with the record fields.
    pub fn info(&self) -> Value {
        let mut info = self.config.clone();
        for (key, value) in [
            ("gear", &self.gear),
            ("version", &self.version),
            ("image", &self.image),
            ("Date", &self.date),
            ("note", &self.note),
        ] {
            info.insert(key.to_string(), Value::String(value.clone()));
        }
        info.insert("status".to_string(), Value::String(self.status.as_str().to_string()));
        Value::Object(info)
    }
}

/// Result of publishing one record and its files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub analysis_id: Option<String>,
    pub uploaded: Vec<PathBuf>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// No candidates: nothing published, nothing deleted.
    Skipped,
    /// Conversion failed: whatever raw files it left are removed.
    BuildFailed { error: String, deletions: Vec<Deletion> },
    Failed { deletions: Vec<Deletion> },
    Succeeded,
}

impl SessionOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            SessionOutcome::Skipped => "skipped",
            SessionOutcome::BuildFailed { .. } => "build failed",
            SessionOutcome::Failed { .. } => "failed",
            SessionOutcome::Succeeded => "succeeded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub subject: String,
    pub session: String,
    pub outcome: SessionOutcome,
    pub record: Option<AnalysisRecord>,
    pub publish: Option<PublishReport>,
    pub result: Option<ProcessingResult>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sessions: Vec<SessionSummary>,
}

impl RunSummary {
    pub fn count(&self, pick: impl Fn(&SessionOutcome) -> bool) -> usize {
        self.sessions.iter().filter(|s| pick(&s.outcome)).count()
    }

    pub fn publish_errors(&self) -> usize {
        self.sessions
            .iter()
            .filter_map(|s| s.publish.as_ref())
            .map(|p| p.errors.len())
            .sum()
    }

    pub fn print(&self, use_color: bool) {
        log_info_stderr(use_color, "Run summary:");
        for s in &self.sessions {
            let line = format!("  sub-{} ses-{}: {}", s.subject, s.session, s.outcome.name());
            match s.outcome {
                SessionOutcome::Succeeded => log_info_stderr(use_color, &line),
                SessionOutcome::Skipped => log_warn_stderr(use_color, &line),
                _ => log_error_stderr(use_color, &line),
            }
            if let Some(ref p) = s.publish {
                for e in &p.errors {
                    log_error_stderr(use_color, &format!("    publish error: {e}"));
                }
            }
            if let SessionOutcome::Failed { ref deletions }
            | SessionOutcome::BuildFailed { ref deletions, .. } = s.outcome
            {
                for d in deletions.iter().filter(|d| !d.ok()) {
                    log_warn_stderr(
                        use_color,
                        &format!(
                            "    could not delete {}: {}",
                            d.path.display(),
                            d.error.as_deref().unwrap_or_default()
                        ),
                    );
                }
            }
        }
        log_info_stderr(
            use_color,
            &format!(
                "{} succeeded, {} failed, {} skipped",
                self.count(|o| matches!(o, SessionOutcome::Succeeded)),
                self.count(|o| matches!(o, SessionOutcome::Failed { .. } | SessionOutcome::BuildFailed { .. })),
                self.count(|o| matches!(o, SessionOutcome::Skipped)),
            ),
        );
    }
}

pub struct RunSupervisor<'a> {
    platform: &'a dyn Platform,
    processor: &'a UnitProcessor<'a>,
    context: &'a GearContext,
    dry_run: bool,
}

impl<'a> RunSupervisor<'a> {
    pub fn new(
        platform: &'a dyn Platform,
        processor: &'a UnitProcessor<'a>,
        context: &'a GearContext,
    ) -> Self {
        Self {
            platform,
            processor,
            context,
            dry_run: false,
        }
    }

    /// Process sessions but neither publish nor delete.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn run(&self, built: &[BuiltSession]) -> RunSummary {
        let mut summary = RunSummary::default();
        for b in built {
            summary.sessions.push(self.supervise(b));
        }
        summary
    }

    fn supervise(&self, built: &BuiltSession) -> SessionSummary {
        let rec = &built.record;
        let (sub, ses) = (rec.subject.as_str(), rec.session.as_str());
        let mut summary = SessionSummary {
            subject: sub.to_string(),
            session: ses.to_string(),
            outcome: SessionOutcome::Skipped,
            record: None,
            publish: None,
            result: None,
        };

        if let Some(ref error) = built.error {
            tracing::error!("[ERROR] Dataset build failed for {sub}/{ses}: {error}");
            let leftovers = match self.processor.layout().t2w_candidates(sub, ses) {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!("cannot list raw files of {sub}/{ses}: {e}");
                    Vec::new()
                }
            };
            let deletions = self.delete_raw(&leftovers);
            let record = self.record(RecordStatus::Failed, format!("Dataset build failed: {error}"));
            summary.publish = self.publish(&rec.session_id, &record, &[]);
            summary.record = Some(record);
            summary.outcome = SessionOutcome::BuildFailed {
                error: error.clone(),
                deletions,
            };
            return summary;
        }

        let result = self.processor.process(sub, ses);

        if !result.has_candidates() {
            tracing::info!("[SKIPPING] No input files for {sub}/{ses}.");
            summary.result = Some(result);
            return summary;
        }

        if !result.has_derivatives() {
            tracing::error!("[ERROR] Processing failed for {sub}/{ses}: No derived output.");
            let deletions = self.delete_raw(&result.raw_files);
            let record = self.record(RecordStatus::Failed, NOTE_NO_DERIVATIVES);
            summary.publish = self.publish(&rec.session_id, &record, &result.log_files);
            summary.record = Some(record);
            summary.outcome = SessionOutcome::Failed { deletions };
            summary.result = Some(result);
            return summary;
        }

        let files = bundle(&result);
        let record = self.record(RecordStatus::Success, "");
        summary.publish = self.publish(&rec.session_id, &record, &files);
        summary.record = Some(record);
        summary.outcome = SessionOutcome::Succeeded;
        summary.result = Some(result);
        summary
    }

    /// Remove a session's raw inputs; nothing is touched in a dry run.
    fn delete_raw(&self, files: &[PathBuf]) -> Vec<Deletion> {
        if self.dry_run {
            return Vec::new();
        }
        files
            .iter()
            .map(|p| {
                let d = remove_file_reported(p);
                report_deletion(p, &d);
                d
            })
            .collect()
    }

    fn record(&self, status: RecordStatus, note: impl Into<String>) -> AnalysisRecord {
        AnalysisRecord::new(self.context, analysis_timestamp(now_local()), status, note)
    }

    fn publish(
        &self,
        session_id: &str,
        record: &AnalysisRecord,
        files: &[PathBuf],
    ) -> Option<PublishReport> {
        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] would publish {} '{}' with {} file(s)",
                record.status.as_str(),
                record.label,
                files.len()
            );
            return None;
        }

        let mut report = PublishReport::default();
        let analysis = match self
            .platform
            .create_analysis(session_id, &record.label, &record.info())
        {
            Ok(a) => a,
            Err(e) => {
                tracing::error!("cannot create analysis for session {session_id}: {e}");
                report.errors.push(format!("create analysis: {e}"));
                return Some(report);
            }
        };
        report.analysis_id = Some(analysis.id.clone());

        for file in files {
            tracing::info!(
                "Uploading output file: {}",
                crate::util::fs::file_name_lossy(file)
            );
            match self.platform.upload_output(&analysis, file) {
                Ok(()) => report.uploaded.push(file.clone()),
                Err(e) => {
                    tracing::error!("upload of {} failed: {e}", file.display());
                    report.errors.push(format!("upload {}: {e}", file.display()));
                }
            }
        }
        Some(report)
    }
}

fn report_deletion(p: &Path, d: &Deletion) {
    match d.error {
        None => tracing::info!("Deleted raw file: {}", p.display()),
        Some(ref e) => tracing::warn!("Error deleting {}: {e}", p.display()),
    }
}

/// Raw, then derivative, then log files; each path at most once.
pub fn bundle(result: &ProcessingResult) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    for p in result
        .raw_files
        .iter()
        .chain(&result.derivative_files)
        .chain(&result.log_files)
    {
        if !out.contains(p) {
            out.push(p.clone());
        }
    }
    out
}
