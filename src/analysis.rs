use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::info;

use crate::llm::LocalLlm;
use crate::pipeline::{AMASS, HTTPX, KATANA, SUBFINDER};
use crate::transform;
use crate::types::{Confidence, Finding, ReconOutcome, ReconResult, ScanScope};

const LARGE_SURFACE_HOSTS: usize = 5;
const MANY_ENDPOINTS: usize = 20;

/// Findings plus an optional narrative from the local model.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub findings: Vec<Finding>,
    pub summary: Option<String>,
}

/// Reasoning stage: rule-based interpretation of a recon outcome.
#[derive(Debug, Clone, Default)]
pub struct Reasoner {
    llm: Option<LocalLlm>,
}

impl Reasoner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm(mut self, llm: LocalLlm) -> Self {
        self.llm = Some(llm);
        self
    }

    pub async fn analyze(&self, scope: &ScanScope, outcome: &ReconOutcome) -> Analysis {
        let findings = analyze(scope, outcome);
        info!(scan = %scope.scan_name, findings = findings.len(), "analysis complete");
        let summary = match (&self.llm, outcome.result()) {
            (Some(llm), Some(_)) => Some(llm.generate(&summary_prompt(scope, &findings)).await),
            _ => None,
        };
        Analysis { findings, summary }
    }
}

/// Apply the fixed interpretation rules. Skipped outcomes produce nothing.
pub fn analyze(scope: &ScanScope, outcome: &ReconOutcome) -> Vec<Finding> {
    let Some(result) = outcome.result() else {
        return Vec::new();
    };
    let mut findings = Vec::new();

    let discovered = discovered_hosts(result);
    if discovered > LARGE_SURFACE_HOSTS {
        findings.push(Finding {
            title: "Large External Attack Surface".into(),
            confidence: Confidence::Medium,
            description: format!(
                "Detected {discovered} subdomains of {} which may expand attack surface.",
                scope.domain
            ),
            evidence: evidence(result, &[SUBFINDER, AMASS]),
        });
    }

    let probe_ok = result.tool(HTTPX).is_some_and(|r| r.ok);
    if probe_ok && !result.live_urls.is_empty() {
        findings.push(Finding {
            title: "Public Web Service Exposure".into(),
            confidence: Confidence::Low,
            description: format!(
                "{} live web endpoint(s) respond publicly. Review headers and authentication controls.",
                result.live_urls.len()
            ),
            evidence: evidence(result, &[HTTPX]),
        });
    }

    let endpoints = crawled_endpoints(result);
    if endpoints > MANY_ENDPOINTS {
        findings.push(Finding {
            title: "Extensive Endpoint Discovery".into(),
            confidence: Confidence::Medium,
            description: format!(
                "Crawling discovered {endpoints} endpoints ({} distinct query parameters) worth manual review.",
                result.params.len()
            ),
            evidence: evidence(result, &[KATANA]),
        });
    }

    let failures = outcome.failures();
    if !failures.is_empty() {
        let mut description = String::from("Some recon stages produced no data:\n");
        for f in failures {
            let _ = writeln!(description, "- {} ({}): {}", f.stage, f.tool, f.message);
        }
        let tools: Vec<&str> = failures.iter().map(|f| f.tool.as_str()).collect();
        findings.push(Finding {
            title: "Degraded Reconnaissance".into(),
            confidence: Confidence::Info,
            description: description.trim_end().to_string(),
            evidence: evidence(result, &tools),
        });
    }

    findings
}

/// Hosts seen by the discovery tools before any focus filter.
fn discovered_hosts(result: &ReconResult) -> usize {
    let outputs: Vec<&str> = [SUBFINDER, AMASS]
        .iter()
        .filter_map(|t| result.tool(t))
        .filter(|r| r.ok)
        .map(|r| r.output.as_str())
        .collect();
    transform::normalize_hosts(&outputs).len()
}

fn crawled_endpoints(result: &ReconResult) -> usize {
    result
        .tool(KATANA)
        .filter(|r| r.ok)
        .map(|r| r.output.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0)
}

fn evidence(result: &ReconResult, tools: &[&str]) -> BTreeMap<String, String> {
    tools
        .iter()
        .filter_map(|t| {
            let path = result.tool(t)?.raw_artifact_path.as_ref()?;
            Some((format!("{t}_raw"), path.display().to_string()))
        })
        .collect()
}

fn summary_prompt(scope: &ScanScope, findings: &[Finding]) -> String {
    let mut prompt = format!(
        "You are assisting a vulnerability disclosure program review of {}.\n\
         Summarize the following reconnaissance observations in three sentences. \
         Do not invent vulnerabilities.\n\n",
        scope.domain
    );
    if findings.is_empty() {
        prompt.push_str("No observations.\n");
    }
    for f in findings {
        let _ = writeln!(prompt, "- {} [{}]: {}", f.title, f.confidence, f.description);
    }
    prompt
}
