use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ::time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::Result;

const RAW_DIR: &str = "raw";
const REPORTS_DIR: &str = "reports";

/// On-disk layout for scan artifacts:
///
/// ```text
/// <root>/<scan_name>/raw/<tool>_<yyyymmddThhmmss.mmm>_<seq>.txt
/// <root>/<scan_name>/reports/...
/// ```
///
/// Cloning shares the sequence counter, so file names stay unique across clones.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    seq: Arc<AtomicU64>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn scan_dir(&self, scan_name: &str) -> PathBuf {
        self.root.join(scan_name)
    }

    pub fn raw_dir(&self, scan_name: &str) -> PathBuf {
        self.scan_dir(scan_name).join(RAW_DIR)
    }

    pub fn reports_dir(&self, scan_name: &str) -> PathBuf {
        self.scan_dir(scan_name).join(REPORTS_DIR)
    }

    /// True only when both the raw and the reports directory exist and hold at
    /// least one entry. A run that died before reporting is not "done".
    pub fn exists(&self, scan_name: &str) -> bool {
        dir_has_entries(&self.raw_dir(scan_name)) && dir_has_entries(&self.reports_dir(scan_name))
    }

    /// Best-effort write of one tool transcript. Returns `None` on any failure.
    pub fn write_raw(&self, scan_name: &str, tool_name: &str, content: &str) -> Option<PathBuf> {
        match self.try_write_raw(scan_name, tool_name, content) {
            Ok(path) => {
                debug!(scan = scan_name, tool = tool_name, path = %path.display(), "raw artifact written");
                Some(path)
            }
            Err(e) => {
                warn!(scan = scan_name, tool = tool_name, "failed to persist raw output: {e}");
                None
            }
        }
    }

    fn try_write_raw(&self, scan_name: &str, tool_name: &str, content: &str) -> io::Result<PathBuf> {
        let dir = self.raw_dir(scan_name);
        fs::create_dir_all(&dir)?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let file_name = format!("{}_{}_{seq:04}.txt", file_safe(tool_name), utc_stamp());
        let path = dir.join(file_name);
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Unique `<prefix>_<stamp>_<seq>` stem for a set of report files.
    pub fn report_stem(&self, prefix: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_{}_{seq:04}", utc_stamp())
    }

    /// Write a report file into the scan's reports directory.
    pub fn write_report_file(&self, scan_name: &str, file_name: &str, contents: &str) -> Result<PathBuf> {
        let dir = self.reports_dir(scan_name);
        fs::create_dir_all(&dir)?;
        let path = dir.join(file_name);
        fs::write(&path, contents)?;
        Ok(path)
    }
}

fn dir_has_entries(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Compact UTC timestamp with millisecond resolution, e.g. `20250101T120000.123`.
fn utc_stamp() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}.{:03}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.millisecond()
    )
}
