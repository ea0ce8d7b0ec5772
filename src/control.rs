//! Interactive control surface: a line-based REPL that turns user input into
//! queue operations.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::queue::WorkQueue;
use crate::types::ScanRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan { target: String, focus: Option<String> },
    Status,
    Shutdown,
    Empty,
    Invalid(String),
}

/// Parse one REPL line.
///
/// ```text
/// example.com
/// scan example.com
/// scan example.com --focus api.example.com
/// status
/// exit | quit | shutdown
/// ```
pub fn parse_command(line: &str) -> Command {
    let mut parts = line.split_whitespace();
    let Some(first) = parts.next() else {
        return Command::Empty;
    };

    match first.to_ascii_lowercase().as_str() {
        "exit" | "quit" | "shutdown" => return Command::Shutdown,
        "status" => return Command::Status,
        _ => {}
    }

    let target = if first.eq_ignore_ascii_case("scan") {
        match parts.next() {
            Some(t) => t,
            None => return Command::Invalid("usage: scan <domain> [--focus <subdomain>]".into()),
        }
    } else {
        first
    };

    let mut focus = None;
    while let Some(arg) = parts.next() {
        match arg {
            "--focus" | "-f" => match parts.next() {
                Some(f) => focus = Some(f.to_string()),
                None => return Command::Invalid("--focus needs a subdomain".into()),
            },
            other => return Command::Invalid(format!("unexpected argument: {other}")),
        }
    }

    Command::Scan {
        target: target.to_string(),
        focus,
    }
}

/// Read commands from stdin until shutdown, EOF or cancellation.
pub async fn run_repl(queue: &WorkQueue, cancel: CancellationToken) -> anyhow::Result<()> {
    println!(
        "vdp-recon-rs ready. Type a domain to enqueue a scan (optionally --focus <subdomain>), 'status', or 'shutdown'."
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            next = lines.next_line() => match next? {
                Some(l) => l,
                None => {
                    debug!("stdin closed");
                    break;
                }
            },
        };

        match parse_command(&line) {
            Command::Empty => {}
            Command::Shutdown => break,
            Command::Status => {
                let s = queue.status();
                println!(
                    "Queue size: {}  state: {}  running: {}  completed: {}  failed: {}",
                    s.queued,
                    s.state,
                    s.running.as_deref().unwrap_or("-"),
                    s.completed,
                    s.failed
                );
            }
            Command::Invalid(msg) => println!("{msg}"),
            Command::Scan { target, focus } => {
                let request = ScanRequest {
                    target: target.clone(),
                    focus,
                    scan_name: None,
                };
                match queue.enqueue(request) {
                    Ok(()) => println!("Enqueued {target}"),
                    Err(e) => println!("Could not enqueue {target}: {e}"),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(target: &str, focus: Option<&str>) -> Command {
        Command::Scan {
            target: target.into(),
            focus: focus.map(Into::into),
        }
    }

    #[test]
    fn bare_domain_and_scan_keyword() {
        assert_eq!(parse_command("example.com"), scan("example.com", None));
        assert_eq!(parse_command("  SCAN example.com "), scan("example.com", None));
    }

    #[test]
    fn focus_flag() {
        assert_eq!(
            parse_command("scan example.com --focus api.example.com"),
            scan("example.com", Some("api.example.com"))
        );
        assert_eq!(
            parse_command("example.com -f api.example.com"),
            scan("example.com", Some("api.example.com"))
        );
        assert!(matches!(parse_command("example.com --focus"), Command::Invalid(_)));
    }

    #[test]
    fn keywords() {
        assert_eq!(parse_command(""), Command::Empty);
        assert_eq!(parse_command("   "), Command::Empty);
        assert_eq!(parse_command("Status"), Command::Status);
        for w in ["exit", "quit", "SHUTDOWN"] {
            assert_eq!(parse_command(w), Command::Shutdown);
        }
        assert!(matches!(parse_command("scan"), Command::Invalid(_)));
        assert!(matches!(parse_command("example.com extra"), Command::Invalid(_)));
    }
}
