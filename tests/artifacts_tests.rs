use std::collections::HashSet;
use std::fs;

use tempfile::TempDir;
use vdp_recon_rs::artifacts::ArtifactStore;

#[test]
fn exists_needs_both_directories_non_empty() {
    let temp = TempDir::new().expect("temp dir");
    let store = ArtifactStore::new(temp.path());
    assert!(!store.exists("example.com"));

    store.write_raw("example.com", "subfinder", "a.example.com\n").expect("raw written");
    assert!(!store.exists("example.com"), "raw output alone is a partial run");

    fs::create_dir_all(store.reports_dir("example.com")).unwrap();
    assert!(!store.exists("example.com"), "empty reports dir does not count");

    store
        .write_report_file("example.com", "example.com.md", "# report\n")
        .expect("report written");
    assert!(store.exists("example.com"));
    assert!(!store.exists("other.com"));
}

#[test]
fn reports_without_raw_is_not_complete() {
    let temp = TempDir::new().unwrap();
    let store = ArtifactStore::new(temp.path());
    store.write_report_file("example.com", "r.md", "x").unwrap();
    assert!(!store.exists("example.com"));
}

#[test]
fn rapid_raw_writes_never_collide() {
    let temp = TempDir::new().unwrap();
    let store = ArtifactStore::new(temp.path());
    let clone = store.clone();
    let mut paths = HashSet::new();
    for i in 0..50 {
        let s = if i % 2 == 0 { &store } else { &clone };
        let p = s.write_raw("example.com", "httpx", &format!("run {i}")).expect("written");
        assert!(paths.insert(p));
    }
    assert_eq!(fs::read_dir(store.raw_dir("example.com")).unwrap().count(), 50);
}

#[test]
fn raw_file_layout_and_content() {
    let temp = TempDir::new().unwrap();
    let store = ArtifactStore::new(temp.path());
    let p = store.write_raw("example.com", "amass", "x.example.com\n").unwrap();
    assert_eq!(p.parent().unwrap(), store.raw_dir("example.com"));
    let name = p.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("amass_") && name.ends_with(".txt"), "{name}");
    assert_eq!(fs::read_to_string(&p).unwrap(), "x.example.com\n");
}

#[test]
fn write_failure_is_reported_as_none() {
    let temp = TempDir::new().unwrap();
    // A regular file where the root directory should be.
    let blocker = temp.path().join("not-a-dir");
    fs::write(&blocker, "x").unwrap();
    let store = ArtifactStore::new(&blocker);
    assert!(store.write_raw("example.com", "subfinder", "out").is_none());
}
