use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A scan request as it arrives from a producer (REPL, HTTP API, `--once`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub target: String,
    #[serde(default)]
    pub focus: Option<String>,
    #[serde(default)]
    pub scan_name: Option<String>,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            focus: None,
            scan_name: None,
        }
    }

    pub fn with_focus(mut self, focus: impl Into<String>) -> Self {
        self.focus = Some(focus.into());
        self
    }
}

/// Resolved scope of one pipeline run. Built once per request and never mutated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanScope {
    pub domain: String,
    pub focus_subdomain: Option<String>,
    pub scan_name: String,
    pub allowed_methods: Vec<String>,
    pub notes: String,
}

/// How to run one external tool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub command: Vec<String>,
    pub tool_name: String,
    pub timeout_secs: u64,
    pub stdin: Option<String>,
}

impl ToolInvocation {
    pub fn new<I, S>(tool_name: impl Into<String>, command: I, timeout_secs: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            tool_name: tool_name.into(),
            timeout_secs,
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("")
    }
}

/// Outcome of one tool invocation. `output` always holds text: the captured
/// transcript on success, a diagnostic message otherwise.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub ok: bool,
    pub output: String,
    pub raw_artifact_path: Option<PathBuf>,
}

/// Deduplicated, lowercased, sorted host names.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct HostSet(Vec<String>);

impl HostSet {
    /// Builds a set from arbitrary names, enforcing the sorted/unique invariant.
    pub fn from_unsorted<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = hosts.into_iter().map(Into::into).collect();
        Self(set.into_iter().collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, host: &str) -> bool {
        self.0.binary_search_by(|h| h.as_str().cmp(host)).is_ok()
    }

    /// Keeps only `host`, if present.
    pub fn retain_only(&self, host: &str) -> Self {
        if self.contains(host) {
            Self(vec![host.to_string()])
        } else {
            Self::default()
        }
    }

    /// Newline-joined form used as tool stdin.
    pub fn to_lines(&self) -> String {
        self.0.join("\n")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLabel {
    Api,
    Dev,
    Auth,
    Prod,
    Misc,
}

impl ClusterLabel {
    pub const ALL: [ClusterLabel; 5] = [
        ClusterLabel::Api,
        ClusterLabel::Dev,
        ClusterLabel::Auth,
        ClusterLabel::Prod,
        ClusterLabel::Misc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClusterLabel::Api => "api",
            ClusterLabel::Dev => "dev",
            ClusterLabel::Auth => "auth",
            ClusterLabel::Prod => "prod",
            ClusterLabel::Misc => "misc",
        }
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partition of a [`HostSet`] by naming convention. Every label is always present.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct HostClusters(BTreeMap<ClusterLabel, Vec<String>>);

impl HostClusters {
    pub fn empty() -> Self {
        Self(ClusterLabel::ALL.iter().map(|l| (*l, Vec::new())).collect())
    }

    pub fn push(&mut self, label: ClusterLabel, host: String) {
        self.0.entry(label).or_default().push(host);
    }

    pub fn get(&self, label: ClusterLabel) -> &[String] {
        self.0.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClusterLabel, &[String])> {
        self.0.iter().map(|(l, v)| (*l, v.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl Default for HostClusters {
    fn default() -> Self {
        Self::empty()
    }
}

/// Live URL -> detected technology tags.
pub type TechFingerprintMap = BTreeMap<String, BTreeSet<String>>;

/// Query parameter name -> URL paths seen carrying it.
pub type ParamUsageMap = BTreeMap<String, BTreeSet<String>>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    LiveDetect,
    Crawl,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Discovery => "discovery",
            Stage::LiveDetect => "live-detect",
            Stage::Crawl => "crawl",
        };
        f.write_str(s)
    }
}

/// A tool that reported `ok = false` during a stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub tool: String,
    pub message: String,
}

/// Structured output of a full pipeline run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReconResult {
    pub scope: ScanScope,
    pub hosts: HostSet,
    pub clusters: HostClusters,
    pub live_urls: Vec<String>,
    pub tech: TechFingerprintMap,
    pub params: ParamUsageMap,
    /// Raw records keyed by tool name, for traceability.
    pub tools: BTreeMap<String, ToolResult>,
}

impl ReconResult {
    pub fn tool(&self, name: &str) -> Option<&ToolResult> {
        self.tools.get(name)
    }
}

/// Result of one orchestrator run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconOutcome {
    Complete(ReconResult),
    Degraded {
        result: ReconResult,
        failures: Vec<StageFailure>,
    },
    Skipped {
        scan_name: String,
    },
}

impl ReconOutcome {
    pub fn result(&self) -> Option<&ReconResult> {
        match self {
            ReconOutcome::Complete(r) => Some(r),
            ReconOutcome::Degraded { result, .. } => Some(result),
            ReconOutcome::Skipped { .. } => None,
        }
    }

    pub fn failures(&self) -> &[StageFailure] {
        match self {
            ReconOutcome::Degraded { failures, .. } => failures,
            _ => &[],
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ReconOutcome::Skipped { .. })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    Info,
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::Info => "Info",
            Confidence::Low => "Low",
            Confidence::Medium => "Medium",
            Confidence::High => "High",
        };
        f.write_str(s)
    }
}

/// One observation produced by the reasoning stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub title: String,
    pub confidence: Confidence,
    pub description: String,
    /// Evidence label -> raw artifact path (or short note).
    pub evidence: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_set_sorts_and_dedups() {
        let set = HostSet::from_unsorted(["b.example.com", "a.example.com", "b.example.com"]);
        assert_eq!(set.as_slice(), ["a.example.com", "b.example.com"]);
        assert!(set.contains("b.example.com"));
        assert!(!set.contains("c.example.com"));
    }

    #[test]
    fn empty_clusters_have_every_label() {
        let clusters = HostClusters::empty();
        for label in ClusterLabel::ALL {
            assert!(clusters.get(label).is_empty());
        }
        assert_eq!(clusters.total(), 0);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ReconOutcome::Skipped {
            scan_name: "example.com".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["scan_name"], "example.com");
    }
}
