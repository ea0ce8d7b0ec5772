use crate::error::{AgentError, Result};
use crate::types::{ScanRequest, ScanScope};

const SCOPE_NOTE: &str = "Manual validation of VDP scope required.";

/// Turn a raw scan request into a validated [`ScanScope`].
///
/// Accepts bare domains or URLs (`https://Example.com/path` -> `example.com`).
/// A focus subdomain must be the domain itself or one of its subdomains.
pub fn resolve_scope(request: &ScanRequest) -> Result<ScanScope> {
    let domain = normalize_domain(&request.target)?;

    let focus_subdomain = match request.focus.as_deref() {
        Some(f) if !f.trim().is_empty() => {
            let focus = normalize_domain(f)?;
            if focus != domain && !focus.ends_with(&format!(".{domain}")) {
                return Err(AgentError::Scope(format!(
                    "focus {focus} is outside of {domain}"
                )));
            }
            Some(focus)
        }
        _ => None,
    };

    let scan_name = match request.scan_name.as_deref() {
        Some(n) => {
            let n = sanitize_scan_name(n);
            if n.is_empty() {
                return Err(AgentError::Scope("scan name is empty after sanitizing".into()));
            }
            n
        }
        None => domain.clone(),
    };

    Ok(ScanScope {
        domain,
        focus_subdomain,
        scan_name,
        allowed_methods: vec!["GET".to_string(), "HEAD".to_string()],
        notes: SCOPE_NOTE.to_string(),
    })
}

/// Lowercase host name with scheme, credentials, port, path and trailing dot removed.
pub fn normalize_domain(raw: &str) -> Result<String> {
    let mut s = raw.trim();
    if s.is_empty() {
        return Err(AgentError::Scope("domain is empty".into()));
    }
    if let Some((scheme, rest)) = s.split_once("://") {
        if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
            return Err(AgentError::Scope(format!("unsupported scheme: {scheme}")));
        }
        s = rest;
    }
    // Authority ends at the first path, query or fragment delimiter.
    let authority = s.split(['/', '?', '#']).next().unwrap_or("");
    let host = authority.rsplit('@').next().unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    if host.is_empty() {
        return Err(AgentError::Scope(format!("no host in {raw:?}")));
    }
    if host.chars().any(|c| c.is_whitespace()) {
        return Err(AgentError::Scope(format!("host contains whitespace: {raw:?}")));
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
    {
        return Err(AgentError::Scope(format!("invalid characters in host: {host}")));
    }
    if !host.contains('.') || host.split('.').any(str::is_empty) {
        return Err(AgentError::Scope(format!("not a domain name: {host}")));
    }
    Ok(host)
}

fn sanitize_scan_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    // No "." or ".." components.
    cleaned.trim_matches('.').to_string()
}
