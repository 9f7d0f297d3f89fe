mod common;

use std::path::PathBuf;

use common::{test_context, touch, FakeModelFactory, FakePlatform, FakeRegistrar};
use gambas_gear::dataset::BuiltSession;
use gambas_gear::importer::SessionRecord;
use gambas_gear::layout::Layout;
use gambas_gear::model::ModelKind;
use gambas_gear::processor::UnitProcessor;
use gambas_gear::supervisor::{RunSupervisor, SessionOutcome};

fn built(sub: &str, ses: &str, id: &str, error: Option<&str>) -> BuiltSession {
    BuiltSession {
        record: SessionRecord {
            subject: sub.to_string(),
            session: ses.to_string(),
            folder: PathBuf::from(format!("/unused/{sub}/{ses}")),
            session_id: id.to_string(),
        },
        error: error.map(str::to_string),
    }
}

#[test]
fn test_session_without_candidates_is_skipped() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ctx = test_context(td.path());
    let layout = Layout::new(&ctx.paths.work_dir);
    let fw = FakePlatform::new();
    let (reg, models) = (FakeRegistrar::default(), FakeModelFactory::new(true));
    let proc = UnitProcessor::new(&layout, &ctx, ModelKind::ResCnn, &reg, &models).mirror_stderr(false);

    let summary = RunSupervisor::new(&fw, &proc, &ctx).run(&[built("01", "1", "t1", None)]);
    assert_eq!(summary.sessions[0].outcome, SessionOutcome::Skipped);
    assert!(summary.sessions[0].record.is_none());
    assert!(fw.analyses.borrow().is_empty());
    assert!(fw.uploads.borrow().is_empty());
}

#[test]
fn test_no_derivatives_deletes_raw_and_publishes_failure() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ctx = test_context(td.path());
    let layout = Layout::new(&ctx.paths.work_dir);
    let raw = layout.anat_dir("01", "1").join("sub-01_ses-1_T2w_axi.nii.gz");
    let other = layout.anat_dir("02", "1").join("sub-02_ses-1_T2w_axi.nii.gz");
    touch(&raw);
    touch(&other);

    let fw = FakePlatform::new();
    let (reg, models) = (FakeRegistrar::failing_all(), FakeModelFactory::new(true));
    let proc = UnitProcessor::new(&layout, &ctx, ModelKind::Gambas, &reg, &models).mirror_stderr(false);
    let summary = RunSupervisor::new(&fw, &proc, &ctx).run(&[built("01", "1", "t1", None)]);

    let s = &summary.sessions[0];
    match &s.outcome {
        SessionOutcome::Failed { deletions } => {
            assert_eq!(deletions.len(), 1);
            assert!(deletions[0].ok());
            assert_eq!(deletions[0].path, raw);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!raw.exists());
    assert!(other.exists(), "other sessions are never touched");

    let analyses = fw.analyses.borrow();
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0].session_id, "t1");
    assert_eq!(analyses[0].info["status"], "failed");
    assert!(analyses[0].info["note"]
        .as_str()
        .expect("note")
        .contains("No derived outputs"));
    let uploads = fw.uploads_for(&analyses[0].id);
    assert_eq!(uploads, vec![ctx.paths.work_dir.join("sub-01_ses-1_log.txt")]);
}

#[test]
fn test_success_publishes_every_file_once() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ctx = test_context(td.path());
    let layout = Layout::new(&ctx.paths.work_dir);
    touch(&layout.anat_dir("01", "1").join("sub-01_ses-1_T2w_axi.nii.gz"));
    touch(&layout.anat_dir("01", "1").join("sub-01_ses-1_T2w_sag.nii.gz"));

    let fw = FakePlatform::new();
    let (reg, models) = (FakeRegistrar::default(), FakeModelFactory::new(true));
    let proc = UnitProcessor::new(&layout, &ctx, ModelKind::Gambas, &reg, &models).mirror_stderr(false);
    let summary = RunSupervisor::new(&fw, &proc, &ctx).run(&[built("01", "1", "t1", None)]);

    assert_eq!(summary.sessions[0].outcome, SessionOutcome::Succeeded);
    let analyses = fw.analyses.borrow();
    assert_eq!(analyses.len(), 1);
    let a = &analyses[0];
    assert!(a.label.starts_with("gambas/0.3.2 "), "{}", a.label);
    assert_eq!(a.info["status"], "success");
    assert_eq!(a.info["gear"], "gambas");
    assert_eq!(a.info["image"], "khula/gambas:0.3.2");
    assert_eq!(a.info["stride_inplane"], 32);
    assert!(a.info.get("work_dir").is_some());

    let uploads = fw.uploads_for(&a.id);
    let derivative = layout
        .derivative_anat_dir("01", "1")
        .join("sub-01_ses-1_T2w_axi_gambas.nii.gz");
    assert_eq!(
        uploads,
        vec![
            layout.anat_dir("01", "1").join("sub-01_ses-1_T2w_axi.nii.gz"),
            layout.anat_dir("01", "1").join("sub-01_ses-1_T2w_sag.nii.gz"),
            derivative,
            ctx.paths.work_dir.join("sub-01_ses-1_log.txt"),
        ]
    );
}

#[test]
fn test_build_failure_removes_leftovers_and_publishes_failed_record() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ctx = test_context(td.path());
    let layout = Layout::new(&ctx.paths.work_dir);
    let raw = layout.anat_dir("01", "1").join("sub-01_ses-1_T2w_axi.nii.gz");
    let sibling = layout.anat_dir("01", "2").join("sub-01_ses-2_T2w_axi.nii.gz");
    touch(&raw);
    touch(&sibling);

    let fw = FakePlatform::new();
    let (reg, models) = (FakeRegistrar::default(), FakeModelFactory::new(true));
    let proc = UnitProcessor::new(&layout, &ctx, ModelKind::Gambas, &reg, &models).mirror_stderr(false);
    let summary = RunSupervisor::new(&fw, &proc, &ctx)
        .run(&[built("01", "1", "t1", Some("dcm2bids crashed"))]);

    match &summary.sessions[0].outcome {
        SessionOutcome::BuildFailed { error, deletions } => {
            assert!(error.contains("dcm2bids crashed"));
            assert_eq!(deletions.len(), 1);
            assert!(deletions[0].ok());
            assert_eq!(deletions[0].path, raw);
        }
        other => panic!("expected build failure, got {other:?}"),
    }
    assert!(reg.calls.borrow().is_empty());
    assert!(!raw.exists());
    assert!(sibling.exists());
    let analyses = fw.analyses.borrow();
    assert_eq!(analyses[0].info["status"], "failed");
    assert!(analyses[0].info["note"]
        .as_str()
        .expect("note")
        .starts_with("Dataset build failed"));
    assert!(fw.uploads.borrow().is_empty());
}

#[test]
fn test_dry_run_build_failure_keeps_leftovers() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ctx = test_context(td.path());
    let layout = Layout::new(&ctx.paths.work_dir);
    let raw = layout.anat_dir("01", "1").join("sub-01_ses-1_T2w_axi.nii.gz");
    touch(&raw);

    let fw = FakePlatform::new();
    let (reg, models) = (FakeRegistrar::default(), FakeModelFactory::new(true));
    let proc = UnitProcessor::new(&layout, &ctx, ModelKind::Gambas, &reg, &models).mirror_stderr(false);
    let summary = RunSupervisor::new(&fw, &proc, &ctx)
        .dry_run(true)
        .run(&[built("01", "1", "t1", Some("dcm2bids crashed"))]);

    assert!(matches!(
        summary.sessions[0].outcome,
        SessionOutcome::BuildFailed { ref deletions, .. } if deletions.is_empty()
    ));
    assert!(raw.exists());
    assert!(fw.analyses.borrow().is_empty());
}

#[test]
fn test_publish_error_does_not_stop_later_sessions() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ctx = test_context(td.path());
    let layout = Layout::new(&ctx.paths.work_dir);
    touch(&layout.anat_dir("01", "1").join("sub-01_ses-1_T2w_axi.nii.gz"));
    touch(&layout.anat_dir("01", "2").join("sub-01_ses-2_T2w_axi.nii.gz"));

    let fw = FakePlatform::new();
    fw.failing_sessions.borrow_mut().insert("t1".to_string());
    let (reg, models) = (FakeRegistrar::default(), FakeModelFactory::new(true));
    let proc = UnitProcessor::new(&layout, &ctx, ModelKind::ResCnn, &reg, &models).mirror_stderr(false);
    let summary = RunSupervisor::new(&fw, &proc, &ctx).run(&[
        built("01", "1", "t1", None),
        built("01", "2", "t2", None),
    ]);

    assert_eq!(summary.publish_errors(), 1);
    let analyses = fw.analyses.borrow();
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0].session_id, "t2");
    assert_eq!(summary.sessions[1].outcome, SessionOutcome::Succeeded);
}

#[test]
fn test_dry_run_neither_publishes_nor_deletes() {
    let td = tempfile::tempdir().expect("tmpdir");
    let ctx = test_context(td.path());
    let layout = Layout::new(&ctx.paths.work_dir);
    let raw = layout.anat_dir("01", "1").join("sub-01_ses-1_T2w_axi.nii.gz");
    touch(&raw);

    let fw = FakePlatform::new();
    let (reg, models) = (FakeRegistrar::failing_all(), FakeModelFactory::new(true));
    let proc = UnitProcessor::new(&layout, &ctx, ModelKind::ResCnn, &reg, &models).mirror_stderr(false);
    let summary = RunSupervisor::new(&fw, &proc, &ctx)
        .dry_run(true)
        .run(&[built("01", "1", "t1", None)]);

    assert!(matches!(summary.sessions[0].outcome, SessionOutcome::Failed { ref deletions } if deletions.is_empty()));
    assert!(raw.exists());
    assert!(fw.analyses.borrow().is_empty());
}
