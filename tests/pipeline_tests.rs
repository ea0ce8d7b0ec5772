use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use vdp_recon_rs::analysis::Reasoner;
use vdp_recon_rs::artifacts::ArtifactStore;
use vdp_recon_rs::config::AgentConfig;
use vdp_recon_rs::pipeline::{Orchestrator, AMASS, HTTPX, KATANA, SUBFINDER};
use vdp_recon_rs::queue::{JobResult, ReconJob, ScanProcessor};
use vdp_recon_rs::runner::{ToolOutcome, ToolRunner};
use vdp_recon_rs::scope::resolve_scope;
use vdp_recon_rs::types::{ClusterLabel, ReconOutcome, ScanRequest, Stage, ToolInvocation};

/// Scripted runner: known tools answer with canned output, anything else is "not installed".
#[derive(Default)]
struct FakeRunner {
    outputs: HashMap<String, ToolOutcome>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl FakeRunner {
    fn with(mut self, tool: &str, outcome: ToolOutcome) -> Self {
        self.outputs.insert(tool.to_string(), outcome);
        self
    }

    fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    fn call(&self, tool: &str) -> Option<ToolInvocation> {
        self.calls().into_iter().find(|c| c.tool_name == tool)
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, invocation: &ToolInvocation) -> ToolOutcome {
        self.calls.lock().unwrap().push(invocation.clone());
        self.outputs.get(&invocation.tool_name).cloned().unwrap_or_else(|| {
            ToolOutcome::failure(format!(
                "{} not found on PATH; skipping {}.",
                invocation.program(),
                invocation.tool_name
            ))
        })
    }
}

fn full_runner() -> FakeRunner {
    FakeRunner::default()
        .with(SUBFINDER, ToolOutcome::success("api.example.com\nwww.example.com\n"))
        .with(AMASS, ToolOutcome::success("API.example.com\ndev.example.com\n# noise\n\n"))
        .with(
            HTTPX,
            ToolOutcome::success(
                "https://api.example.com [200] [API Gateway] [nginx,react]\n\
                 https://www.example.com [301,200] [Home, Example]\n",
            ),
        )
        .with(
            KATANA,
            ToolOutcome::success(
                "https://api.example.com/v1/users?id=1&sort=asc\n\
                 https://www.example.com/search?q=x\n\
                 https://www.example.com/about\n",
            ),
        )
}

fn config_in(temp: &TempDir) -> AgentConfig {
    AgentConfig {
        artifacts_dir: temp.path().to_path_buf(),
        ..AgentConfig::default()
    }
}

fn orchestrator(temp: &TempDir, runner: Arc<FakeRunner>) -> Orchestrator<FakeRunner> {
    let config = config_in(temp);
    let store = ArtifactStore::new(&config.artifacts_dir);
    Orchestrator::new(config, store, runner)
}

#[tokio::test]
async fn full_run_wires_stages_together() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(full_runner());
    let orch = orchestrator(&temp, runner.clone());
    let scope = resolve_scope(&ScanRequest::new("example.com")).unwrap();

    let outcome = orch.run(&scope).await;
    let ReconOutcome::Complete(result) = &outcome else {
        panic!("expected complete outcome, got {outcome:?}");
    };

    assert_eq!(
        result.hosts.as_slice(),
        ["api.example.com", "dev.example.com", "www.example.com"]
    );
    assert_eq!(result.clusters.get(ClusterLabel::Api), ["api.example.com"]);
    assert_eq!(result.clusters.get(ClusterLabel::Dev), ["dev.example.com"]);
    assert_eq!(result.clusters.get(ClusterLabel::Prod), ["www.example.com"]);

    let httpx = runner.call(HTTPX).expect("httpx invoked");
    assert_eq!(
        httpx.stdin.as_deref(),
        Some("api.example.com\ndev.example.com\nwww.example.com")
    );
    assert_eq!(result.live_urls, ["https://api.example.com", "https://www.example.com"]);
    assert_eq!(
        result.tech["https://api.example.com"].iter().collect::<Vec<_>>(),
        ["nginx", "react"]
    );
    // www printed a title but no tech column.
    assert_eq!(result.tech.len(), 1);

    let katana = runner.call(KATANA).expect("katana invoked");
    assert_eq!(
        katana.stdin.as_deref(),
        Some("https://api.example.com\nhttps://www.example.com")
    );
    assert_eq!(result.params.keys().collect::<Vec<_>>(), ["id", "q", "sort"]);
    assert!(result.params["id"].contains("/v1/users"));

    assert_eq!(result.tools.len(), 4);
    for record in result.tools.values() {
        assert!(record.ok);
        assert!(record.raw_artifact_path.as_ref().is_some_and(|p| p.exists()));
    }
    assert_eq!(fs::read_dir(orch.store().raw_dir("example.com")).unwrap().count(), 4);
}

#[tokio::test]
async fn focus_mode_narrows_before_clustering() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(full_runner());
    let orch = orchestrator(&temp, runner.clone());
    let scope =
        resolve_scope(&ScanRequest::new("example.com").with_focus("api.example.com")).unwrap();

    let outcome = orch.run(&scope).await;
    let result = outcome.result().expect("result");
    assert_eq!(result.hosts.as_slice(), ["api.example.com"]);
    assert_eq!(result.clusters.total(), 1);
    assert!(result.clusters.get(ClusterLabel::Dev).is_empty());
    assert_eq!(
        runner.call(HTTPX).unwrap().stdin.as_deref(),
        Some("api.example.com")
    );
}

#[tokio::test]
async fn focus_on_undiscovered_host_yields_nothing_downstream() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(full_runner());
    let orch = orchestrator(&temp, runner.clone());
    let scope =
        resolve_scope(&ScanRequest::new("example.com").with_focus("ghost.example.com")).unwrap();

    let outcome = orch.run(&scope).await;
    let result = outcome.result().unwrap();
    assert!(result.hosts.is_empty());
    assert!(runner.call(HTTPX).is_none());
    assert!(runner.call(KATANA).is_none());
}

#[tokio::test]
async fn missing_tools_degrade_but_complete() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(FakeRunner::default());
    let orch = orchestrator(&temp, runner.clone());
    let scope = resolve_scope(&ScanRequest::new("example.com")).unwrap();

    let outcome = orch.run(&scope).await;
    let ReconOutcome::Degraded { result, failures } = &outcome else {
        panic!("expected degraded outcome, got {outcome:?}");
    };
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.stage == Stage::Discovery));
    assert!(result.hosts.is_empty());
    assert_eq!(result.clusters.total(), 0);
    assert!(result.live_urls.is_empty());
    assert!(result.params.is_empty());

    // Diagnostic messages never leak into host data.
    let subfinder = result.tool(SUBFINDER).unwrap();
    assert!(!subfinder.ok);
    assert!(subfinder.output.contains("not found"));
    assert!(subfinder.raw_artifact_path.is_some());
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn failed_probe_skips_crawl() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(
        FakeRunner::default()
            .with(SUBFINDER, ToolOutcome::success("api.example.com\n"))
            .with(AMASS, ToolOutcome::success(""))
            .with(HTTPX, ToolOutcome::failure("httpx timed out after 180s")),
    );
    let orch = orchestrator(&temp, runner.clone());
    let scope = resolve_scope(&ScanRequest::new("example.com")).unwrap();

    let outcome = orch.run(&scope).await;
    let failures = outcome.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::LiveDetect);
    assert_eq!(failures[0].message, "httpx timed out after 180s");
    let result = outcome.result().unwrap();
    assert_eq!(result.hosts.len(), 1);
    assert!(result.live_urls.is_empty());
    assert!(runner.call(KATANA).is_none());
}

#[tokio::test]
async fn second_run_of_same_scan_is_skipped() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(full_runner());
    let job = ReconJob::new(orchestrator(&temp, runner.clone()), Reasoner::new());

    let first = job.process(ScanRequest::new("example.com")).await.unwrap();
    let JobResult::Reported(report) = first else {
        panic!("first run should report");
    };
    assert!(report.exists());
    let md = fs::read_to_string(&report).unwrap();
    assert!(md.starts_with("# Security Findings for example.com"));
    let calls_after_first = runner.calls().len();
    assert_eq!(calls_after_first, 4);

    let second = job.process(ScanRequest::new("https://EXAMPLE.com/")).await.unwrap();
    assert_eq!(second, JobResult::Skipped);
    assert_eq!(runner.calls().len(), calls_after_first, "no tool invoked on skip");
}

#[tokio::test]
async fn skip_can_be_disabled() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(full_runner());
    let mut config = config_in(&temp);
    config.skip_if_artifacts_exist = false;
    let store = ArtifactStore::new(&config.artifacts_dir);
    let job = ReconJob::new(Orchestrator::new(config, store, runner.clone()), Reasoner::new());

    job.process(ScanRequest::new("example.com")).await.unwrap();
    let again = job.process(ScanRequest::new("example.com")).await.unwrap();
    assert!(matches!(again, JobResult::Reported(_)));
    assert_eq!(runner.calls().len(), 8);
}

#[tokio::test]
async fn partial_prior_run_is_not_skipped() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(full_runner());
    let orch = orchestrator(&temp, runner.clone());
    orch.store().write_raw("example.com", "subfinder", "stale\n");

    let scope = resolve_scope(&ScanRequest::new("example.com")).unwrap();
    let outcome = orch.run(&scope).await;
    assert!(!outcome.is_skipped());
    assert_eq!(runner.calls().len(), 4);
}

#[tokio::test]
async fn all_tools_missing_still_produces_a_report() {
    let temp = TempDir::new().unwrap();
    let job = ReconJob::new(
        orchestrator(&temp, Arc::new(FakeRunner::default())),
        Reasoner::new(),
    );
    let JobResult::Reported(report) = job.process(ScanRequest::new("example.com")).await.unwrap()
    else {
        panic!("expected a report");
    };
    let md = fs::read_to_string(&report).unwrap();
    assert!(md.contains("Degraded Reconnaissance"));

    let json_path = report.with_extension("json");
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
    assert_eq!(json["outcome"]["status"], "degraded");
    assert_eq!(json["scope"]["domain"], "example.com");
}

#[tokio::test]
async fn invalid_scope_fails_only_that_job() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(full_runner());
    let job = ReconJob::new(orchestrator(&temp, runner.clone()), Reasoner::new());
    assert!(job.process(ScanRequest::new("not a domain")).await.is_err());
    assert!(runner.calls().is_empty());
}
