mod common;

use common::*;
use volunteer_client::state::{STATE_FILE_NAME, STATE_FILE_NEXT, STATE_FILE_PREV};
use volunteer_client::types::{ResultPhase, WriteMode};
use volunteer_client::{ClientError, ClientState};

fn result_names(state: &ClientState) -> Vec<&str> {
    state
        .results()
        .iter()
        .map(|e| e.result.name.as_str())
        .collect()
}

#[test]
fn test_load_links_graph() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), STATE_FILE_NAME, STATE);
    let mut state = ClientState::new(config(dir.path()));
    let report = state.load();

    assert_eq!(report.source, Some(dir.path().join(STATE_FILE_NAME)));
    assert_eq!(state.projects().len(), 2);
    assert_eq!(state.apps().len(), 1);
    assert_eq!(state.app_versions().len(), 1);
    assert_eq!(state.workunits().len(), 1);
    assert_eq!(state.file_infos().len(), 3);
    assert_eq!(state.host_info.p_ncpus, 4);
    assert!(state.proxy_info.present());

    let alpha = state.project_by_url(ALPHA).unwrap().id;
    let a = state.lookup_result(alpha, "a").unwrap();
    let wu = state.workunit(a.wu).unwrap();
    assert_eq!(wu.wu.name, "wu_1");
    assert_eq!(state.app_version(a.app_version).unwrap().version.version_num, 100);
    assert_eq!(state.result_phase(a.id), Some(ResultPhase::Running));
    assert!(a.result.stderr_out.contains("starting <simulation>"));

    // Only the pending download is queued.
    let queued: Vec<&str> = state
        .pers_file_xfers()
        .iter()
        .map(|id| state.file_info(*id).unwrap().file.name.as_str())
        .collect();
    assert_eq!(queued, vec!["in_1"]);
}

#[test]
fn test_round_trip_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = loaded(dir.path());
    first.save().unwrap();
    let written = first.write_state(WriteMode::StateFile);

    let mut second = ClientState::new(config(dir.path()));
    let report = second.load();
    assert!(report.discarded.is_empty());
    assert_eq!(second.write_state(WriteMode::StateFile), written);

    // Saving again rotates the first copy into the previous generation.
    second.set_dirty("test");
    second.save().unwrap();
    let prev = std::fs::read_to_string(dir.path().join(STATE_FILE_PREV)).unwrap();
    assert_eq!(prev, written);
}

#[test]
fn test_falls_back_to_previous_generation() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), STATE_FILE_PREV, STATE);
    write(dir.path(), STATE_FILE_NAME, "<client_state>\n<project>\n");

    let mut state = ClientState::new(config(dir.path()));
    let report = state.load();
    assert_eq!(report.source, Some(dir.path().join(STATE_FILE_PREV)));
    assert_eq!(state.projects().len(), 2);
}

#[test]
fn test_truncated_record_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), STATE_FILE_PREV, STATE);
    // Passes the wrapper check but a record never ends.
    write(
        dir.path(),
        STATE_FILE_NAME,
        "<client_state>\n<project>\n<master_url>http://x.org/</master_url>\n</client_state>\n",
    );

    let mut state = ClientState::new(config(dir.path()));
    let report = state.load();
    assert_eq!(report.source, Some(dir.path().join(STATE_FILE_PREV)));
    assert!(state.project_by_url("http://x.org/").is_none());
}

#[test]
fn test_next_generation_wins() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), STATE_FILE_NAME, STATE);
    write(
        dir.path(),
        STATE_FILE_NEXT,
        "<client_state>\n<project>\n<master_url>http://next.org/</master_url>\n</project>\n</client_state>\n",
    );

    let mut state = ClientState::new(config(dir.path()));
    let report = state.load();
    assert_eq!(report.source, Some(dir.path().join(STATE_FILE_NEXT)));
    assert_eq!(state.projects().len(), 1);
}

#[test]
fn test_no_state_file_is_first_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = ClientState::new(config(dir.path()));
    let report = state.load();
    assert_eq!(report.source, None);
    assert!(state.projects().is_empty());
    assert!(!state.is_dirty());
}

#[test]
fn test_unresolvable_result_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), STATE_FILE_NAME, STATE);
    let mut state = ClientState::new(config(dir.path()));
    let report = state.load();

    assert_eq!(report.discarded.len(), 1);
    assert_eq!(report.discarded[0].kind, "result");
    assert_eq!(report.discarded[0].name, "orphan");
    assert_eq!(report.discarded[0].project.as_deref(), Some(ALPHA));
    assert_eq!(state.results().len(), 2);
    assert!(state.is_dirty());
}

#[test]
fn test_zero_total_share_becomes_equal() {
    let dir = tempfile::tempdir().unwrap();
    let state = loaded(dir.path());
    let shares: Vec<f64> = state
        .projects()
        .iter()
        .map(|e| e.project.resource_share)
        .collect();
    assert_eq!(shares, vec![100.0, 100.0]);
}

#[test]
fn test_results_ordered_by_arrival() {
    let dir = tempfile::tempdir().unwrap();
    let state = loaded(dir.path());
    assert_eq!(result_names(&state), vec!["b", "a"]);
}

#[test]
fn test_anonymous_platform_duplicates_are_silent() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("projects").join("alpha.example.org"),
        "app_info.xml",
        APP_INFO,
    );
    write(dir.path(), STATE_FILE_NAME, STATE);

    let mut state = ClientState::new(config(dir.path()));
    let report = state.load();

    let alpha = state.project_by_url(ALPHA).unwrap();
    assert!(alpha.project.anonymous_platform);
    assert_eq!(state.apps().len(), 1);
    assert_eq!(state.app_versions().len(), 1);
    assert_eq!(state.file_infos().len(), 3);
    // The orphan moved to the only version there is.
    assert!(report.discarded.is_empty(), "{:?}", report.discarded);
    let orphan = state.lookup_result(alpha.id, "orphan").unwrap();
    assert_eq!(orphan.result.version_num, 100);
    assert_eq!(orphan.result.platform, PRIMARY);
}

#[test]
fn test_anonymous_files_come_back_from_app_info() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("projects").join("alpha.example.org"),
        "app_info.xml",
        APP_INFO,
    );
    write(dir.path(), STATE_FILE_NAME, STATE);
    let mut state = ClientState::new(config(dir.path()));
    state.load();

    let written = state.write_state(WriteMode::StateFile);
    assert!(!written.contains("<name>sim_1.0</name>"));

    state.save().unwrap();
    let mut reloaded = ClientState::new(config(dir.path()));
    let report = reloaded.load();
    assert!(report.discarded.is_empty(), "{:?}", report.discarded);
    assert_eq!(reloaded.app_versions().len(), 1);
    assert_eq!(reloaded.results().len(), 3);
}

const DUPLICATE_FILES: &str = r#"<client_state>
<project>
    <master_url>http://alpha.example.org/</master_url>
</project>
<file_info>
    <name>sim_1.0</name>
    <status>1</status>
</file_info>
<file_info>
    <name>sim_1.0</name>
    <status>1</status>
</file_info>
</client_state>
"#;

#[test]
fn test_duplicate_file_is_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), STATE_FILE_NAME, DUPLICATE_FILES);
    let mut state = ClientState::new(config(dir.path()));
    let report = state.load();

    assert_eq!(state.file_infos().len(), 1);
    assert_eq!(report.discarded.len(), 1);
    assert_eq!(report.discarded[0].kind, "file_info");
    assert_eq!(report.discarded[0].name, "sim_1.0");
}

#[test]
fn test_duplicate_file_of_anonymous_project_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("projects").join("alpha.example.org"),
        "app_info.xml",
        "<app_info>\n</app_info>\n",
    );
    write(dir.path(), STATE_FILE_NAME, DUPLICATE_FILES);
    let mut state = ClientState::new(config(dir.path()));
    let report = state.load();

    assert!(state.project_by_url(ALPHA).unwrap().project.anonymous_platform);
    assert_eq!(state.file_infos().len(), 1);
    assert!(report.discarded.is_empty(), "{:?}", report.discarded);
    assert!(!state.is_dirty());
}

#[test]
fn test_forward_reference_is_rejected() {
    let input = r#"<client_state>
<project>
    <master_url>http://alpha.example.org/</master_url>
</project>
<workunit>
    <name>wu_early</name>
    <app_name>sim</app_name>
</workunit>
<app>
    <name>sim</name>
</app>
</client_state>
"#;
    let dir = tempfile::tempdir().unwrap();
    let mut state = ClientState::new(config(dir.path()));
    let report = state.load_from_str(input).unwrap();
    assert!(state.workunits().is_empty());
    assert_eq!(state.apps().len(), 1);
    assert_eq!(report.discarded.len(), 1);
    assert_eq!(report.discarded[0].kind, "workunit");
}

#[test]
fn test_detach_cascades() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = loaded(dir.path());
    let alpha = state.project_by_url(ALPHA).unwrap().id;
    state.detach_project(alpha).unwrap();

    assert_eq!(state.projects().len(), 1);
    assert_eq!(state.projects()[0].project.master_url, BETA);
    assert!(state.apps().is_empty());
    assert!(state.app_versions().is_empty());
    assert!(state.workunits().is_empty());
    assert!(state.results().is_empty());
    assert!(state.file_infos().is_empty());
    assert!(state.active_tasks().is_empty());
    assert!(state.pers_file_xfers().is_empty());
    assert!(state.project(alpha).is_none());
}

#[test]
fn test_rename_failure_keeps_dirty() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = ClientState::new(config(dir.path()));
    state.attach_project(ALPHA, "key").unwrap();
    assert!(state.save_if_needed().unwrap());
    assert!(!state.is_dirty());

    let prev = dir.path().join(STATE_FILE_PREV);
    write(&prev, "blocker", "x");
    state.set_dirty("test");
    let err = state.save().unwrap_err();
    assert!(matches!(err, ClientError::Rename { .. }));
    assert!(state.is_dirty());

    std::fs::remove_dir_all(&prev).unwrap();
    assert!(state.save_if_needed().unwrap());
    assert!(!state.is_dirty());
}

#[test]
fn test_summary_serializes() {
    let dir = tempfile::tempdir().unwrap();
    let state = loaded(dir.path());
    let summary = serde_json::to_value(state.summary()).unwrap();
    assert_eq!(summary["projects"][0]["results"], 2);
    assert_eq!(summary["results"][1]["name"], "a");
    assert_eq!(summary["results"][1]["phase"], "running");
    assert_eq!(summary["pending_transfers"], 1);
}
