//! Pure transforms from raw tool transcripts to structured recon data.
//!
//! Every function here is total: lines that do not fit the expected shape are
//! skipped, never reported as errors.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::types::{ClusterLabel, HostClusters, HostSet, ParamUsageMap, TechFingerprintMap};

/// Prefix families, checked in order. The first family with a matching prefix wins.
const CLUSTER_RULES: &[(ClusterLabel, &[&str])] = &[
    (ClusterLabel::Api, &["api.", "graphql.", "rest."]),
    (ClusterLabel::Dev, &["dev.", "test.", "staging.", "qa."]),
    (ClusterLabel::Auth, &["auth.", "login.", "sso.", "id."]),
    (ClusterLabel::Prod, &["www."]),
];

static BRACKET_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("static regex"));

/// Merge host lists from several tools: trim, drop blanks and `#` comments,
/// lowercase, dedup, sort.
pub fn normalize_hosts<S: AsRef<str>>(outputs: &[S]) -> HostSet {
    let hosts = outputs
        .iter()
        .flat_map(|out| out.as_ref().lines())
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase);
    HostSet::from_unsorted(hosts)
}

pub fn cluster_of(host: &str) -> ClusterLabel {
    CLUSTER_RULES
        .iter()
        .find(|(_, prefixes)| prefixes.iter().any(|p| host.starts_with(p)))
        .map(|(label, _)| *label)
        .unwrap_or(ClusterLabel::Misc)
}

/// Partition hosts by naming convention. Each host lands in exactly one cluster,
/// keeping the input order inside each cluster.
pub fn cluster_hosts(hosts: &HostSet) -> HostClusters {
    let mut clusters = HostClusters::empty();
    for host in hosts.iter() {
        clusters.push(cluster_of(host), host.to_string());
    }
    clusters
}

/// The leading token of `line` if it is an http(s) URL.
fn leading_url(line: &str) -> Option<&str> {
    let token = line.split_whitespace().next()?;
    let scheme_end = token.find("://")?;
    let scheme = &token[..scheme_end];
    if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") {
        Some(token)
    } else {
        None
    }
}

/// First token of every line that starts with an http(s) URL, in source order.
/// Duplicates are kept.
pub fn extract_live_urls(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(leading_url)
        .map(str::to_string)
        .collect()
}

/// Bracket columns a probe line carries after its URL, in print order.
///
/// Status-code groups (`[200]`, `[301,200]`) always lead and are skipped. With
/// `title` set, the next group is the page title and the tech list follows it,
/// so a line whose tech group is missing yields nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeColumns {
    pub title: bool,
}

impl ProbeColumns {
    /// `httpx -sc -title -td`: `URL [status] [title] [tech,tech]`.
    pub const STATUS_TITLE_TECH: Self = Self { title: true };
}

/// Map each probed URL to its tech tags, for lines shaped `URL [status] [tech,tech]`.
pub fn extract_tech_fingerprints(text: &str) -> TechFingerprintMap {
    extract_tech_fingerprints_with(text, ProbeColumns::default())
}

pub fn extract_tech_fingerprints_with(text: &str, columns: ProbeColumns) -> TechFingerprintMap {
    let mut tech = TechFingerprintMap::new();
    for line in text.lines() {
        let Some(url) = leading_url(line) else {
            continue;
        };
        let rest = &line[line.find(url).unwrap_or(0) + url.len()..];
        let mut groups = BRACKET_GROUP
            .captures_iter(rest)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .skip_while(|g| is_status_group(g));
        if columns.title {
            groups.next();
        }
        let Some(group) = groups.next() else {
            continue;
        };
        let tags: BTreeSet<String> = group
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if !tags.is_empty() {
            tech.entry(url.to_string()).or_default().extend(tags);
        }
    }
    tech
}

fn is_status_group(group: &str) -> bool {
    let mut parts = group.split(',').map(str::trim).peekable();
    parts.peek().is_some() && parts.all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

/// Map each query parameter name to the URL paths that carried it.
pub fn extract_params(text: &str) -> ParamUsageMap {
    let mut params = ParamUsageMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(url) = Url::parse(line) else {
            continue;
        };
        for (name, _) in url.query_pairs() {
            if name.is_empty() {
                continue;
            }
            params
                .entry(name.into_owned())
                .or_default()
                .insert(url.path().to_string());
        }
    }
    params
}
