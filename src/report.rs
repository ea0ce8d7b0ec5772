use std::fmt::Write as _;
use std::path::PathBuf;

use ::time::{format_description::well_known, OffsetDateTime};
use serde::Serialize;
use tracing::info;

use crate::analysis::Analysis;
use crate::artifacts::ArtifactStore;
use crate::error::Result;
use crate::types::{Finding, ReconOutcome, ScanScope};

#[derive(Serialize)]
struct StructuredReport<'a> {
    generated_at: &'a str,
    scope: &'a ScanScope,
    outcome: &'a ReconOutcome,
    findings: &'a [Finding],
    summary: Option<&'a str>,
}

/// Write the Markdown and JSON reports for one scan into its reports directory.
/// Returns the Markdown path.
pub fn write_report(
    store: &ArtifactStore,
    scope: &ScanScope,
    outcome: &ReconOutcome,
    analysis: &Analysis,
) -> Result<PathBuf> {
    let generated_at = now_rfc3339();
    let base = store.report_stem(&scope.domain);

    let structured = StructuredReport {
        generated_at: &generated_at,
        scope,
        outcome,
        findings: &analysis.findings,
        summary: analysis.summary.as_deref(),
    };
    let json = serde_json::to_string_pretty(&structured)?;
    store.write_report_file(&scope.scan_name, &format!("{base}.json"), &json)?;

    let markdown = render_markdown(&scope.domain, &generated_at, analysis);
    let path = store.write_report_file(&scope.scan_name, &format!("{base}.md"), &markdown)?;
    info!(scan = %scope.scan_name, path = %path.display(), "report written");
    Ok(path)
}

pub fn render_markdown(domain: &str, generated_at: &str, analysis: &Analysis) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Security Findings for {domain}\n");
    let _ = writeln!(md, "Generated: {generated_at}\n");

    if let Some(summary) = analysis.summary.as_deref() {
        let _ = writeln!(md, "## Summary\n\n{}\n", summary.trim());
    }

    if analysis.findings.is_empty() {
        md.push_str("No findings identified.\n");
        return md;
    }

    for item in &analysis.findings {
        let _ = writeln!(md, "## {}", item.title);
        let _ = writeln!(md, "Confidence: {}\n", item.confidence);
        let _ = writeln!(md, "{}\n", item.description);
        let evidence: Vec<_> = item.evidence.iter().filter(|(_, v)| !v.is_empty()).collect();
        if !evidence.is_empty() {
            md.push_str("**Evidence:**\n");
            for (k, v) in evidence {
                let _ = writeln!(md, "- {k}: {v}");
            }
            md.push('\n');
        }
    }
    md
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
