use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, info_span, Instrument};

use crate::artifacts::ArtifactStore;
use crate::config::{AgentConfig, ToolSpec};
use crate::runner::{run_tool, ToolRunner};
use crate::transform::{self, ProbeColumns};
use crate::types::{
    HostSet, ParamUsageMap, ReconOutcome, ReconResult, ScanScope, Stage, StageFailure,
    TechFingerprintMap, ToolInvocation, ToolResult,
};

pub const SUBFINDER: &str = "subfinder";
pub const AMASS: &str = "amass";
pub const HTTPX: &str = "httpx";
pub const KATANA: &str = "katana";

/// Runs the staged recon pipeline for one scope at a time:
/// skip-check, discovery, normalize + cluster, live detection, crawl.
///
/// Every stage tolerates a failed predecessor; a run always ends with an outcome.
pub struct Orchestrator<R: ?Sized> {
    config: AgentConfig,
    store: ArtifactStore,
    runner: Arc<R>,
}

impl<R> Orchestrator<R>
where
    R: ToolRunner + ?Sized,
{
    pub fn new(config: AgentConfig, store: ArtifactStore, runner: Arc<R>) -> Self {
        Self {
            config,
            store,
            runner,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub async fn run(&self, scope: &ScanScope) -> ReconOutcome {
        let span = info_span!("recon", scan = %scope.scan_name, domain = %scope.domain);
        self.run_stages(scope).instrument(span).await
    }

    async fn run_stages(&self, scope: &ScanScope) -> ReconOutcome {
        if self.config.skip_if_artifacts_exist && self.store.exists(&scope.scan_name) {
            info!("artifacts already present, skipping recon");
            return ReconOutcome::Skipped {
                scan_name: scope.scan_name.clone(),
            };
        }

        let mut run = StageLog::default();

        info!("stage: discovery");
        let tools = &self.config.tools;
        let (subfinder, amass) = tokio::join!(
            self.invoke(scope, subfinder_invocation(&tools.subfinder, &scope.domain)),
            self.invoke(scope, amass_invocation(&tools.amass, &scope.domain)),
        );

        info!("stage: normalize + cluster");
        let mut hosts = transform::normalize_hosts(&[
            run.usable(Stage::Discovery, SUBFINDER, &subfinder),
            run.usable(Stage::Discovery, AMASS, &amass),
        ]);
        run.record(SUBFINDER, subfinder);
        run.record(AMASS, amass);
        if let Some(focus) = &scope.focus_subdomain {
            hosts = hosts.retain_only(focus);
            info!(focus = %focus, kept = hosts.len(), "focus filter applied");
        }
        let clusters = transform::cluster_hosts(&hosts);
        info!(hosts = hosts.len(), "hosts normalized");

        let (live_urls, tech) = self.live_detect(scope, &hosts, &mut run).await;
        let params = self.crawl(scope, &live_urls, &mut run).await;

        let result = ReconResult {
            scope: scope.clone(),
            hosts,
            clusters,
            live_urls,
            tech,
            params,
            tools: run.tools,
        };
        info!(
            live = result.live_urls.len(),
            params = result.params.len(),
            failures = run.failures.len(),
            "recon done"
        );
        if run.failures.is_empty() {
            ReconOutcome::Complete(result)
        } else {
            ReconOutcome::Degraded {
                result,
                failures: run.failures,
            }
        }
    }

    async fn live_detect(
        &self,
        scope: &ScanScope,
        hosts: &HostSet,
        run: &mut StageLog,
    ) -> (Vec<String>, TechFingerprintMap) {
        info!("stage: live-detect");
        if hosts.is_empty() {
            info!("no hosts to probe");
            return (Vec::new(), TechFingerprintMap::new());
        }
        let invocation = httpx_invocation(&self.config.tools.httpx).with_stdin(hosts.to_lines());
        let result = self.invoke(scope, invocation).await;
        let text = run.usable(Stage::LiveDetect, HTTPX, &result).to_string();
        run.record(HTTPX, result);
        (
            transform::extract_live_urls(&text),
            transform::extract_tech_fingerprints_with(&text, HTTPX_COLUMNS),
        )
    }

    async fn crawl(&self, scope: &ScanScope, live_urls: &[String], run: &mut StageLog) -> ParamUsageMap {
        info!("stage: crawl");
        if live_urls.is_empty() {
            info!("no live urls to crawl");
            return ParamUsageMap::new();
        }
        let invocation = katana_invocation(&self.config.tools.katana).with_stdin(live_urls.join("\n"));
        let result = self.invoke(scope, invocation).await;
        let params = transform::extract_params(run.usable(Stage::Crawl, KATANA, &result));
        run.record(KATANA, result);
        params
    }

    async fn invoke(&self, scope: &ScanScope, invocation: ToolInvocation) -> ToolResult {
        run_tool(self.runner.as_ref(), &self.store, &scope.scan_name, &invocation).await
    }
}

/// Tool records and failures collected over one run.
#[derive(Default)]
struct StageLog {
    tools: BTreeMap<String, ToolResult>,
    failures: Vec<StageFailure>,
}

impl StageLog {
    /// The text downstream stages may consume: the output on success, nothing
    /// otherwise. Failures are noted as they are seen.
    fn usable<'a>(&mut self, stage: Stage, tool: &str, result: &'a ToolResult) -> &'a str {
        if result.ok {
            &result.output
        } else {
            self.failures.push(StageFailure {
                stage,
                tool: tool.to_string(),
                message: result.output.lines().next().unwrap_or("").to_string(),
            });
            ""
        }
    }

    fn record(&mut self, tool: &str, result: ToolResult) {
        self.tools.insert(tool.to_string(), result);
    }
}

pub fn subfinder_invocation(spec: &ToolSpec, domain: &str) -> ToolInvocation {
    ToolInvocation::new(SUBFINDER, [spec.binary.as_str(), "-silent", "-d", domain], spec.timeout_secs)
}

pub fn amass_invocation(spec: &ToolSpec, domain: &str) -> ToolInvocation {
    ToolInvocation::new(
        AMASS,
        [spec.binary.as_str(), "enum", "-passive", "-d", domain],
        spec.timeout_secs,
    )
}

/// Column layout produced by the flags in [`httpx_invocation`].
pub const HTTPX_COLUMNS: ProbeColumns = ProbeColumns::STATUS_TITLE_TECH;

/// Status code, title, tech detection, follow redirects, no color. Hosts come on stdin.
pub fn httpx_invocation(spec: &ToolSpec) -> ToolInvocation {
    ToolInvocation::new(
        HTTPX,
        [spec.binary.as_str(), "-silent", "-sc", "-title", "-td", "-fr", "-nc"],
        spec.timeout_secs,
    )
}

/// Silent crawl; seed URLs come on stdin.
pub fn katana_invocation(spec: &ToolSpec) -> ToolInvocation {
    ToolInvocation::new(KATANA, [spec.binary.as_str(), "-silent"], spec.timeout_secs)
}
