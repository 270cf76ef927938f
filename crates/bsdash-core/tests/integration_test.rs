//! Integration tests for bsdash-core.

use std::fs;
use std::path::Path;
use std::time::Duration;

use bsdash_core::documents::{
    DASHBOARD_CONFIG_FILE, RUN_PARAMS_FILE, STATUS_FILE, SUBJECTS_FILE,
};
use bsdash_core::render::{Gallery, TileContent};
use bsdash_core::status::summary_text;
use bsdash_core::{
    Action, Catalog, Classification, DashError, Dashboard, DashboardEngine, EngineConfig,
    ViewUpdate,
};
use tempfile::TempDir;

fn write_qc_dir(dir: &Path, subjects: &[&str], states: &[&str]) {
    fs::write(
        dir.join(SUBJECTS_FILE),
        serde_json::json!({ "subjects": subjects }).to_string(),
    )
    .unwrap();
    write_states(dir, states);
}

fn write_states(dir: &Path, states: &[&str]) {
    fs::write(
        dir.join(STATUS_FILE),
        serde_json::json!({
            "process_states": states,
            "start_time": "2024-05-01 09:00:00",
            "end": false,
        })
        .to_string(),
    )
    .unwrap();
}

fn load(tmp: &TempDir) -> Dashboard {
    Dashboard::load(&EngineConfig::new(tmp.path())).expect("Failed to load dashboard")
}

fn poll(dashboard: &mut Dashboard, dir: &Path) -> Vec<ViewUpdate> {
    let seq = dashboard.next_poll_seq();
    dashboard.apply_poll(seq, bsdash_core::documents::load_status(dir))
}

#[test]
fn test_queued_and_pending_subjects() {
    let tmp = TempDir::new().unwrap();
    write_qc_dir(tmp.path(), &["S1", "S2"], &["CCCQUUUUUUUUUUU", "PQQQQQQQQQQQQQQ"]);
    let mut dashboard = load(&tmp);
    poll(&mut dashboard, tmp.path());

    let view = dashboard.view();
    assert_eq!(summary_text(&view.rows[0].status.summary), "queued to run.");
    assert_eq!(summary_text(&view.rows[1].status.summary), "launch pending.");
    assert!(view.rows[1].status.glyphs.is_empty());
    assert_eq!(view.header.progress.counts.queued, 1);
    assert_eq!(view.header.progress.counts.pending, 1);
}

#[test]
fn test_expand_all_generates_and_clears_galleries_without_refetch() {
    let tmp = TempDir::new().unwrap();
    write_qc_dir(tmp.path(), &["S1", "S2"], &["CCCCCCCCCCCCCUU", "CCLQQQQQQQQQQQQ"]);
    let mut dashboard = load(&tmp);
    poll(&mut dashboard, tmp.path());
    let applied = dashboard.poll_health().last_applied;

    // Remove the status document: nothing below may read it again.
    fs::remove_file(tmp.path().join(STATUS_FILE)).unwrap();

    let updates = dashboard.handle(Action::ToggleExpandAll).unwrap();
    let rows = updates
        .iter()
        .find_map(|u| match u {
            ViewUpdate::Rows(rows) => Some(rows),
            _ => None,
        })
        .expect("expand-all should refresh rows");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status.expanded));
    assert!(rows.iter().all(|r| !r.gallery.tiles().is_empty()));
    assert_eq!(
        rows[0].gallery.tiles()[0].content,
        TileContent::Image {
            src: "/qc/S1/bse.png".into()
        }
    );

    dashboard.handle(Action::ToggleExpandAll).unwrap();
    let view = dashboard.view();
    assert!(view.rows.iter().all(|r| r.gallery == Gallery::Empty));
    assert_eq!(dashboard.poll_health().last_applied, applied);
}

#[test]
fn test_stale_poll_is_ignored() {
    let tmp = TempDir::new().unwrap();
    write_qc_dir(tmp.path(), &["S1"], &["QQQQQQQQQQQQQQQ"]);
    let mut dashboard = load(&tmp);

    let slow = dashboard.next_poll_seq();
    let fast = dashboard.next_poll_seq();

    write_states(tmp.path(), &["CCCCCCCCCCCCCCC"]);
    let fresh = bsdash_core::documents::load_status(tmp.path());
    assert!(!dashboard.apply_poll(fast, fresh).is_empty());

    write_states(tmp.path(), &["QQQQQQQQQQQQQQQ"]);
    let old = bsdash_core::documents::load_status(tmp.path());
    assert!(dashboard.apply_poll(slow, old).is_empty());

    assert_eq!(dashboard.statuses()[0].classify(), Classification::Finished);
}

#[test]
fn test_failed_poll_keeps_last_good_status() {
    let tmp = TempDir::new().unwrap();
    write_qc_dir(tmp.path(), &["S1"], &["CCLQQQQQQQQQQQQ"]);
    let mut dashboard = load(&tmp);
    poll(&mut dashboard, tmp.path());

    fs::write(tmp.path().join(STATUS_FILE), "{ truncated").unwrap();
    poll(&mut dashboard, tmp.path());
    poll(&mut dashboard, tmp.path());

    let header = dashboard.header();
    assert_eq!(header.progress.poll.consecutive_failures, 2);
    assert!(header.progress.poll.last_error.is_some());
    assert_eq!(header.progress.counts.running, 1);
    assert!(matches!(
        dashboard.statuses()[0].classify(),
        Classification::Active { .. }
    ));
}

#[test]
fn test_malformed_status_gets_badge() {
    let tmp = TempDir::new().unwrap();
    write_qc_dir(tmp.path(), &["S1", "S2"], &["CCCXCCCCCCCCCCC", "CCC"]);
    let mut dashboard = load(&tmp);
    poll(&mut dashboard, tmp.path());

    let view = dashboard.view();
    assert_eq!(
        view.rows[0].status.malformed.as_deref(),
        Some("unknown stage code 'X' at position 4")
    );
    assert_eq!(
        view.rows[1].status.malformed.as_deref(),
        Some("expected 15 stage codes, found 3")
    );
    assert_eq!(view.header.progress.counts.other, 2);
}

#[test]
fn test_config_replaces_tables_and_bad_config_falls_back() {
    let tmp = TempDir::new().unwrap();
    write_qc_dir(tmp.path(), &["S1"], &["CL"]);
    fs::write(
        tmp.path().join(DASHBOARD_CONFIG_FILE),
        r#"{
            "StageNames": ["import", "register"],
            "GroupNames": ["Everything"],
            "Contents": [
                {"img": "import.png", "stage": 1, "desc": "Imported"},
                {"img": "reg.png", "stage": 2, "desc": "Registered", "width": 300}
            ]
        }"#,
    )
    .unwrap();
    let mut dashboard = load(&tmp);
    assert_eq!(dashboard.catalog().stage_count(), 2);
    assert_eq!(dashboard.catalog().artifacts.len(), 2);

    poll(&mut dashboard, tmp.path());
    let view = dashboard.view();
    assert_eq!(summary_text(&view.rows[0].status.summary), "running register.");

    fs::write(
        tmp.path().join(DASHBOARD_CONFIG_FILE),
        r#"{"StageNames": ["only"], "Contents": [{"img": "x.png", "stage": 3, "desc": "X"}]}"#,
    )
    .unwrap();
    let dashboard = load(&tmp);
    assert_eq!(dashboard.catalog(), &Catalog::brainsuite());
}

#[test]
fn test_missing_subject_list_fails_startup() {
    let tmp = TempDir::new().unwrap();
    let err = Dashboard::load(&EngineConfig::new(tmp.path())).err().unwrap();
    assert!(matches!(err, DashError::Io(_)));
}

#[test]
fn test_run_parameters_in_header() {
    let tmp = TempDir::new().unwrap();
    write_qc_dir(tmp.path(), &["S1"], &["CCCCCCCCCCCCCCC"]);
    assert_eq!(
        load(&tmp).header().progress.run_parameters,
        "BrainSuite run parameters unavailable."
    );

    fs::write(
        tmp.path().join(RUN_PARAMS_FILE),
        r#"{"DATASET DESCRIPTION": [{"Dataset Name": "ds-aging"}]}"#,
    )
    .unwrap();
    assert_eq!(load(&tmp).header().progress.run_parameters, "Dataset Name: ds-aging");
}

#[tokio::test]
async fn test_engine_polls_on_its_own() {
    let tmp = TempDir::new().unwrap();
    write_qc_dir(tmp.path(), &["S1", "S2"], &["CCCCCCCCCCCCCCC", "CCCCCCCCCCCCCCC"]);
    let config = EngineConfig::new(tmp.path()).with_poll_interval(Duration::from_millis(20));
    let engine = DashboardEngine::start(config).expect("Failed to start engine");

    let mut finished = 0;
    for _ in 0..100 {
        finished = engine.stats().await.unwrap().counts.finished;
        if finished == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(finished, 2);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_engine_actions_reach_subscribers() {
    let tmp = TempDir::new().unwrap();
    write_qc_dir(tmp.path(), &["S1", "S2"], &["CCCCCCCCCCCCCCC", "NQQQQQQQQQQQQQQ"]);
    let config = EngineConfig::new(tmp.path()).with_start_paused(true);
    let engine = DashboardEngine::start(config).unwrap();
    engine.poll_now().await.unwrap();

    let mut rx = engine.subscribe();
    engine
        .apply(Action::SetHideUnlaunched { enabled: true })
        .await
        .unwrap();

    let mut visibility = None;
    while let Ok(update) = rx.try_recv() {
        if let ViewUpdate::Visibility(v) = update {
            visibility = Some(v);
        }
    }
    let visibility = visibility.expect("hide-unlaunched should publish visibility");
    assert!(visibility[0].visible);
    assert!(!visibility[1].visible);

    engine
        .apply(Action::SetExclude {
            subject: 1,
            exclude: true,
        })
        .await
        .unwrap();
    let tsv = engine.export_annotations().await.unwrap();
    assert!(tsv.contains("S2\t1\t\"\""));
    engine.shutdown().await;
}
