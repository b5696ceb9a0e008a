//! End-to-end integration tests for the acceptance harness
//!
//! These tests drive whole scenarios against the simulated cloud:
//! 1. Lifecycle scenarios (create, import, rename, destroy)
//! 2. Failure paths and the guarantee that teardown always runs once
//! 3. Destroy verification against lagging and failing remotes
//! 4. The CLI binary over the bundled YAML scenarios

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use acctest::acc::{
    run_all, Assertion, Fetcher, Harness, Identifier, IdentifierSet, ImportRef, Provisioner,
    Scenario, ScenarioRunner, Snapshot, Step,
};
use acctest::common::config::{DestroyConfig, SimConfig};
use acctest::sim::{Op, SimCloud, SimProvider};
use acctest::{Error, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

const ADDRESS: &str = "networking_secgroup.secgroup_1";

fn secgroup(name: &str, extra: &str) -> String {
    format!(
        "resource \"networking_secgroup\" \"secgroup_1\" {{\n  name = \"{}\"\n  {}\n}}\n",
        name, extra
    )
}

fn sim_harness(cloud: &SimCloud) -> (Harness, Arc<SimProvider>) {
    let provider = Arc::new(SimProvider::new(cloud.clone()));
    (Harness::new(provider.clone(), provider.clone()), provider)
}

/// Provisioner wrapper that counts calls and can hang on a chosen apply
struct Recording {
    inner: Arc<SimProvider>,
    applies: AtomicUsize,
    destroys: AtomicUsize,
    hang_on_apply: Option<usize>,
}

impl Recording {
    fn new(inner: Arc<SimProvider>) -> Self {
        Self {
            inner,
            applies: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            hang_on_apply: None,
        }
    }

    fn hanging_on(mut self, apply: usize) -> Self {
        self.hang_on_apply = Some(apply);
        self
    }

    fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provisioner for Recording {
    async fn apply(&self, config: &str) -> Result<IdentifierSet> {
        let n = self.applies.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_apply == Some(n) {
            return std::future::pending().await;
        }
        self.inner.apply(config).await
    }

    async fn import_resource(&self, reference: &ImportRef) -> Result<Identifier> {
        self.inner.import_resource(reference).await
    }

    async fn destroy(&self, ids: &[Identifier]) -> Result<()> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.inner.destroy(ids).await
    }
}

/// Fetcher that starts failing with a transport error after `healthy` calls
struct Flaky {
    inner: Arc<SimProvider>,
    healthy: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Fetcher for Flaky {
    async fn fetch(&self, id: &Identifier) -> Result<Snapshot> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy {
            return Err(Error::transport("connection reset by peer"));
        }
        self.inner.fetch(id).await
    }
}

// ============== Lifecycle scenarios ==============

#[tokio::test]
async fn test_create_import_rename() {
    let cloud = SimCloud::default();
    let (harness, _) = sim_harness(&cloud);

    let scenario = Scenario::new("secgroup_basic")
        .step(
            Step::apply(secgroup("seg-acc-test-abc12", ""))
                .check(Assertion::attr_equals("name", "seg-acc-test-abc12"))
                .check(Assertion::attr_len("rules", 6))
                .bind("sg"),
        )
        .step(Step::import(ADDRESS))
        .step(
            Step::apply(secgroup("seg-acc-test-abc12-updated", ""))
                .check(Assertion::id_unchanged("sg"))
                .check(Assertion::attr_equals("name", "seg-acc-test-abc12-updated")),
        );

    let report = ScenarioRunner::new(harness).run(&scenario).await;

    assert!(report.passed(), "{}", report);
    assert_eq!(report.steps_run, 3);
    assert_eq!(report.created.len(), 1);
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn test_delete_default_rules_leaves_no_rules() {
    let cloud = SimCloud::default();
    let (harness, _) = sim_harness(&cloud);

    let scenario = Scenario::new("secgroup_no_rules").step(
        Step::apply(secgroup("seg-acc-test-abc12", "delete_default_rules = true"))
            .check(Assertion::attr_equals("name", "seg-acc-test-abc12"))
            .check(Assertion::attr_len("rules", 0)),
    );

    let report = ScenarioRunner::new(harness).run(&scenario).await;
    assert!(report.passed(), "{}", report);
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn test_destroy_step_is_verified_with_one_fetch() {
    let cloud = SimCloud::default();
    let (harness, _) = sim_harness(&cloud);

    let scenario = Scenario::new("secgroup_destroy")
        .step(Step::apply(secgroup("seg-acc-test-abc12", "")))
        .step(Step::destroy());

    let report = ScenarioRunner::new(harness).run(&scenario).await;

    assert!(report.passed(), "{}", report);
    // One observation after apply, one absence check after teardown
    assert_eq!(cloud.calls(Op::Get), 2);
    assert_eq!(cloud.calls(Op::Delete), 1);
}

/// Provisioner that renames the group out of band before importing it
struct Drifting {
    inner: Arc<SimProvider>,
}

#[async_trait]
impl Provisioner for Drifting {
    async fn apply(&self, config: &str) -> Result<IdentifierSet> {
        self.inner.apply(config).await
    }

    async fn import_resource(&self, reference: &ImportRef) -> Result<Identifier> {
        self.inner
            .cloud()
            .update(&reference.id, "renamed-elsewhere", "")?;
        self.inner.import_resource(reference).await
    }

    async fn destroy(&self, ids: &[Identifier]) -> Result<()> {
        self.inner.destroy(ids).await
    }
}

fn drifting_harness(cloud: &SimCloud) -> Harness {
    let provider = Arc::new(SimProvider::new(cloud.clone()));
    Harness::new(Arc::new(Drifting { inner: provider.clone() }), provider)
}

#[tokio::test]
async fn test_import_drift_fails_step() {
    let cloud = SimCloud::default();

    let scenario = Scenario::new("import_drift")
        .step(Step::apply(secgroup("seg-acc-test-abc12", "")).bind("sg"))
        .step(Step::import(ADDRESS));

    let report = ScenarioRunner::new(drifting_harness(&cloud)).run(&scenario).await;

    assert_eq!(report.failed_step, Some(1));
    match &report.failure {
        Some(Error::Assertion { step: 1, message }) => {
            assert!(
                message.contains(r#"name ("seg-acc-test-abc12" != "renamed-elsewhere")"#),
                "{}",
                message
            );
        }
        other => panic!("Expected assertion failure at step 1, got {:?}", other),
    }
    assert!(report.cleanup_failures.is_empty());
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn test_import_verify_ignore_suppresses_drift() {
    let cloud = SimCloud::default();

    let scenario = Scenario::new("import_ignore")
        .step(Step::apply(secgroup("seg-acc-test-abc12", "")).bind("sg"))
        .step(
            Step::import(ADDRESS)
                .ignore("name")
                .check(Assertion::id_unchanged("sg"))
                .check(Assertion::attr_equals("name", "renamed-elsewhere")),
        );

    let report = ScenarioRunner::new(drifting_harness(&cloud)).run(&scenario).await;
    assert!(report.passed(), "{}", report);
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn test_import_of_untracked_address_is_harness_error() {
    let cloud = SimCloud::default();
    let (harness, _) = sim_harness(&cloud);

    let scenario = Scenario::new("bad_import")
        .step(Step::apply(secgroup("seg-acc-test-abc12", "")))
        .step(Step::import("networking_secgroup.other"));

    let report = ScenarioRunner::new(harness).run(&scenario).await;
    assert_eq!(report.failed_step, Some(1));
    assert!(matches!(report.failure, Some(Error::Harness(_))));
    assert!(cloud.is_empty());
}

// ============== Replacement ==============

#[tokio::test]
async fn test_unexpected_replacement_fails_step() {
    let cloud = SimCloud::default();
    let (harness, _) = sim_harness(&cloud);

    let scenario = Scenario::new("replace")
        .step(Step::apply(secgroup("seg-1", "enterprise_project_id = \"0\"")))
        .step(Step::apply(secgroup("seg-1", "enterprise_project_id = \"ep-2\"")));

    let report = ScenarioRunner::new(harness).run(&scenario).await;

    assert_eq!(report.failed_step, Some(1));
    match &report.failure {
        Some(Error::Assertion { step: 1, message }) => {
            assert!(message.contains("replaced"), "message: {}", message)
        }
        other => panic!("Expected assertion failure, got {:?}", other),
    }
    assert!(report.cleanup_failures.is_empty());
    assert_eq!(report.created.len(), 2);
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn test_expected_replacement_with_id_changed() {
    let cloud = SimCloud::default();
    let (harness, _) = sim_harness(&cloud);

    let scenario = Scenario::new("replace_ok")
        .step(Step::apply(secgroup("seg-1", "enterprise_project_id = \"0\"")).bind("sg"))
        .step(
            Step::apply(secgroup("seg-1", "enterprise_project_id = \"ep-2\""))
                .expect_replacement()
                .check(Assertion::id_changed("sg"))
                .check(Assertion::attr_equals("enterprise_project_id", "ep-2")),
        );

    let report = ScenarioRunner::new(harness).run(&scenario).await;
    assert!(report.passed(), "{}", report);
    assert!(cloud.is_empty());
}

// ============== Failure and teardown ==============

#[tokio::test]
async fn test_failed_assertion_still_tears_down_once() {
    let cloud = SimCloud::default();
    let recording = Arc::new(Recording::new(Arc::new(SimProvider::new(cloud.clone()))));
    let fetcher = Arc::new(SimProvider::new(cloud.clone()));
    let harness = Harness::new(recording.clone(), fetcher);

    let scenario = Scenario::new("wrong_name")
        .step(
            Step::apply(secgroup("seg-actual", ""))
                .check(Assertion::attr_equals("name", "seg-expected")),
        )
        .step(Step::apply(secgroup("seg-never-applied", "")));

    let report = ScenarioRunner::new(harness).run(&scenario).await;

    assert_eq!(report.failed_step, Some(0));
    assert_eq!(report.steps_run, 1);
    let message = report.failure.as_ref().map(|e| e.to_string()).unwrap_or_default();
    assert!(message.contains("expected \"seg-expected\", got \"seg-actual\""), "{}", message);
    assert_eq!(recording.destroys(), 1);
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn test_transport_error_is_not_still_exists() {
    let cloud = SimCloud::default();
    let provider = Arc::new(SimProvider::new(cloud.clone()));
    let flaky = Arc::new(Flaky {
        inner: provider.clone(),
        healthy: 1,
        calls: AtomicUsize::new(0),
    });
    let harness = Harness::new(provider, flaky);

    let scenario = Scenario::new("flaky").step(Step::apply(secgroup("seg-1", "")));
    let report = ScenarioRunner::new(harness).run(&scenario).await;

    assert!(report.failure.is_none());
    assert_eq!(report.cleanup_failures.len(), 1);
    assert!(matches!(report.cleanup_failures[0], Error::Transport(_)));
    assert!(matches!(report.into_result(), Err(Error::Transport(_))));
}

#[tokio::test]
async fn test_apply_transport_failure_stops_scenario() {
    let cloud = SimCloud::default();
    let (harness, _) = sim_harness(&cloud);
    cloud.inject_fault(Op::Create, "quota exceeded");

    let scenario = Scenario::new("quota")
        .step(Step::apply(secgroup("seg-1", "")))
        .step(Step::destroy());
    let report = ScenarioRunner::new(harness).run(&scenario).await;

    assert_eq!(report.failed_step, Some(0));
    assert!(matches!(report.failure, Some(Error::Transport(ref m)) if m == "quota exceeded"));
    assert!(report.created.is_empty());
    assert!(report.cleanup_failures.is_empty());
}

#[tokio::test]
async fn test_partial_apply_failure_leaves_nothing_behind() {
    let cloud = SimCloud::default();
    let (harness, _) = sim_harness(&cloud);

    let both = format!(
        "resource \"networking_secgroup\" \"secgroup_0\" {{ name = \"seg-extra\" }}\n{}",
        secgroup("seg-1-updated", "")
    );
    let scenario = Scenario::new("partial")
        .step(Step::apply(secgroup("seg-1", "")).bind("sg"))
        .step(Step::apply(both).target(ADDRESS));

    // Fails the rename after the extra group was created
    cloud.inject_fault(Op::Update, "503 Service Unavailable");
    let report = ScenarioRunner::new(harness).run(&scenario).await;

    assert_eq!(report.failed_step, Some(1));
    assert!(matches!(report.failure, Some(Error::Transport(ref m)) if m.contains("503")));
    assert_eq!(report.created.len(), 1);
    assert!(report.cleanup_failures.is_empty());
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn test_empty_scenario_never_touches_remote() {
    let cloud = SimCloud::default();
    let recording = Arc::new(Recording::new(Arc::new(SimProvider::new(cloud.clone()))));
    let harness = Harness::new(recording.clone(), Arc::new(SimProvider::new(cloud.clone())));

    let report = ScenarioRunner::new(harness).run(&Scenario::new("empty")).await;

    assert!(matches!(report.failure, Some(Error::Harness(_))));
    assert_eq!(recording.destroys(), 0);
    assert_eq!(cloud.calls(Op::Get), 0);
}

#[tokio::test]
async fn test_cancellation_still_tears_down() {
    let cloud = SimCloud::default();
    let recording = Arc::new(
        Recording::new(Arc::new(SimProvider::new(cloud.clone()))).hanging_on(1),
    );
    let harness = Harness::new(recording.clone(), Arc::new(SimProvider::new(cloud.clone())));

    let scenario = Scenario::new("cancelled")
        .step(Step::apply(secgroup("seg-1", "")))
        .step(Step::apply(secgroup("seg-1-updated", "")))
        .step(Step::destroy());

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let report = ScenarioRunner::new(harness)
        .run_with_cancel(&scenario, token)
        .await;

    assert_eq!(report.failed_step, Some(1));
    assert!(matches!(report.failure, Some(Error::Cancelled)));
    assert_eq!(recording.destroys(), 1);
    assert!(report.cleanup_failures.is_empty());
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start_runs_no_step() {
    let cloud = SimCloud::default();
    let recording = Arc::new(Recording::new(Arc::new(SimProvider::new(cloud.clone()))));
    let harness = Harness::new(recording.clone(), Arc::new(SimProvider::new(cloud.clone())));

    let scenario = Scenario::new("cancelled_early")
        .step(Step::apply(secgroup("seg-1", "")))
        .step(Step::destroy());

    let token = CancellationToken::new();
    token.cancel();
    let report = ScenarioRunner::new(harness)
        .run_with_cancel(&scenario, token)
        .await;

    assert_eq!(report.steps_run, 0);
    assert_eq!(report.failed_step, None);
    assert!(matches!(report.failure, Some(Error::Cancelled)));
    assert_eq!(recording.destroys(), 1);
    assert_eq!(cloud.calls(Op::Create), 0);
}

// ============== Destroy verification ==============

#[tokio::test]
async fn test_lagging_delete_fails_single_shot_check() {
    let cloud = SimCloud::new(SimConfig {
        read_lag: 2,
        ..SimConfig::default()
    });
    let (harness, _) = sim_harness(&cloud);

    let scenario = Scenario::new("lagging").step(Step::apply(secgroup("seg-1", "")));
    let report = ScenarioRunner::new(harness).run(&scenario).await;

    assert!(report.failure.is_none());
    assert!(matches!(
        report.cleanup_failures.as_slice(),
        [Error::StillExists { .. }]
    ));
}

#[tokio::test]
async fn test_lagging_delete_passes_bounded_polling() {
    let cloud = SimCloud::new(SimConfig {
        read_lag: 2,
        ..SimConfig::default()
    });
    let (harness, _) = sim_harness(&cloud);
    let harness = harness.with_destroy_config(DestroyConfig {
        max_attempts: 3,
        interval_ms: 1,
    });

    let scenario = Scenario::new("lagging").step(Step::apply(secgroup("seg-1", "")));
    let report = ScenarioRunner::new(harness).run(&scenario).await;

    assert!(report.passed(), "{}", report);
}

// ============== Parallel scenarios ==============

#[tokio::test]
async fn test_parallel_scenarios_are_independent() {
    let cloud = SimCloud::default();

    let runs: Vec<(Harness, Scenario)> = (0..4)
        .map(|i| {
            let (harness, _) = sim_harness(&cloud);
            let name = format!("seg-parallel-{}", i);
            let scenario = Scenario::new(&name)
                .step(
                    Step::apply(secgroup(&name, ""))
                        .check(Assertion::attr_equals("name", name.as_str()))
                        .bind("sg"),
                )
                .step(
                    Step::apply(secgroup(&format!("{}-renamed", name), ""))
                        .check(Assertion::id_unchanged("sg")),
                );
            (harness, scenario)
        })
        .collect();

    let reports = run_all(&runs).await;

    assert_eq!(reports.len(), 4);
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.name, format!("seg-parallel-{}", i));
        assert!(report.passed(), "{}", report);
    }
    assert!(cloud.is_empty());
}

// ============== CLI ==============

fn scenarios_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios")
}

fn bundled_scenarios() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(scenarios_dir())
        .expect("Failed to read scenarios dir")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "yaml"))
        .collect();
    paths.sort();
    paths
}

const EPS_VAR: &str = "HW_ENTERPRISE_PROJECT_ID_TEST";

#[test]
fn test_cli_check_bundled_scenarios() {
    let output = Command::new(env!("CARGO_BIN_EXE_acctest"))
        .arg("check")
        .args(bundled_scenarios())
        .env(EPS_VAR, "ep-acc-test")
        .output()
        .expect("Failed to run acctest");

    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_cli_run_bundled_scenarios() {
    let output = Command::new(env!("CARGO_BIN_EXE_acctest"))
        .arg("run")
        .arg("--json")
        .args(bundled_scenarios())
        .env("NO_COLOR", "1")
        .env(EPS_VAR, "ep-acc-test")
        .output()
        .expect("Failed to run acctest");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );

    let results: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout should be a single JSON document");
    let results = results.as_array().expect("Expected a JSON array");
    assert_eq!(results.len(), bundled_scenarios().len());
    assert!(results.iter().all(|r| r["passed"] == true), "{}", stdout);
    assert!(results.iter().any(|r| r["name"] == "secgroup_basic"));
    assert!(results.iter().any(|r| r["name"] == "secgroup_eps"));
}

#[test]
fn test_cli_run_without_precheck_variable_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_acctest"))
        .arg("run")
        .arg("--json")
        .arg(scenarios_dir().join("secgroup_eps.yaml"))
        .env_remove(EPS_VAR)
        .output()
        .expect("Failed to run acctest");

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let results: serde_json::Value = serde_json::from_str(&stdout).expect("Expected JSON");
    assert_eq!(results[0]["passed"], false);
    let error = results[0]["error"].as_str().unwrap_or_default();
    assert!(
        error.contains("requires environment variables: HW_ENTERPRISE_PROJECT_ID_TEST"),
        "{}",
        error
    );
}

#[test]
fn test_cli_run_missing_file_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_acctest"))
        .args(["run", "does-not-exist.yaml"])
        .output()
        .expect("Failed to run acctest");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 of 1 scenarios failed"), "stderr: {}", stderr);
}
