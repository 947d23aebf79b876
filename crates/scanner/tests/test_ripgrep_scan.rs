//! Runs the real `rg` binary when it is installed; otherwise the tests return
//! early.

use domain::ImpactScanConfig;
use futures::StreamExt;
use scanner::{HitSource, RipgrepScanner};
use std::fs;
use std::path::PathBuf;

fn rg_available() -> bool {
    std::process::Command::new("rg")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/store.rs"),
        "pub struct Store;\n\nimpl Store {\n    pub fn cache_get(&self) {}\n}\n",
    )
    .unwrap();
    fs::write(dir.path().join("src/other.rs"), "fn unrelated() {}\n").unwrap();
    fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
    fs::write(dir.path().join("node_modules/pkg/index.js"), "cache();\n").unwrap();
    dir
}

fn scanner_for(dir: &tempfile::TempDir) -> RipgrepScanner {
    let mut config = ImpactScanConfig::for_target(dir.path());
    config.ripgrep.context_lines = 1;
    RipgrepScanner::from_config(&config)
}

#[tokio::test]
async fn test_async_scan_finds_hits_and_respects_excludes() {
    if !rg_available() {
        return;
    }
    let dir = fixture();
    let scanner = scanner_for(&dir);

    let stream = HitSource::search(&scanner, &["cache".to_string()]).await.unwrap();
    let hits: Vec<_> = stream.map(|r| r.unwrap()).collect().await;

    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    assert_eq!(hit.file, PathBuf::from("src/store.rs"));
    assert_eq!(hit.line, 4);
    assert_eq!(hit.column, 11);
    assert_eq!(hit.matched_text, "cache");
    assert_eq!(hit.context_lines.len(), 3);
}

#[tokio::test]
async fn test_no_matches_is_clean_empty_stream() {
    if !rg_available() {
        return;
    }
    let dir = fixture();
    let stream = scanner_for(&dir)
        .search(&["nothing_matches_this".to_string()])
        .await
        .unwrap();
    let items: Vec<_> = stream.collect().await;
    assert!(items.is_empty());
}

#[test]
fn test_blocking_scan_matches_async_contract() {
    if !rg_available() {
        return;
    }
    let dir = fixture();
    let hits: Vec<_> = scanner_for(&dir)
        .search_blocking(&["Store".to_string()])
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.file == PathBuf::from("src/store.rs")));
    assert_eq!(hits[0].line, 1);
    assert_eq!(hits[1].line, 3);
}

#[tokio::test]
async fn test_dropping_stream_early_is_safe() {
    if !rg_available() {
        return;
    }
    let dir = fixture();
    for i in 0..50 {
        fs::write(dir.path().join(format!("src/gen{i}.rs")), "cache\n".repeat(20)).unwrap();
    }
    let mut stream = scanner_for(&dir).search(&["cache".to_string()]).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.matched_text, "cache");
    drop(stream);
}

/// Shell script standing in for `rg`: floods stderr, prints one summary
/// message and exits with `code`.
#[cfg(unix)]
fn noisy_rg(dir: &tempfile::TempDir, code: i32) -> RipgrepScanner {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.path().join("noisy-rg");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\nhead -c 200000 /dev/zero | tr '\\0' 'w' >&2\n\
             echo '{{\"type\":\"summary\",\"data\":{{\"elapsed_total\":{{}}}}}}'\nexit {code}\n"
        ),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = ImpactScanConfig::for_target(dir.path());
    config.ripgrep.binary = script.to_string_lossy().into_owned();
    RipgrepScanner::from_config(&config)
}

#[cfg(unix)]
#[test]
fn test_blocking_scan_survives_large_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = noisy_rg(&dir, 0);

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let items: Vec<_> = scanner.search_blocking(&["cache".to_string()]).unwrap().collect();
        let _ = tx.send(items.len());
    });

    let count = rx
        .recv_timeout(std::time::Duration::from_secs(10))
        .expect("blocking scan finished");
    assert_eq!(count, 0);
}

#[cfg(unix)]
#[test]
fn test_blocking_scan_failure_keeps_bounded_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let items: Vec<_> = noisy_rg(&dir, 2)
        .search_blocking(&["cache".to_string()])
        .unwrap()
        .collect();

    assert_eq!(items.len(), 1);
    match &items[0] {
        Err(common::ImpactError::ToolUnavailable { reason, .. }) => {
            assert!(reason.starts_with("exited with 2: www"));
            assert!(reason.len() < 5000);
        }
        other => panic!("expected tool failure, got {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_async_scan_survives_large_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let stream = noisy_rg(&dir, 0).search(&["cache".to_string()]).await.unwrap();

    let items: Vec<_> = tokio::time::timeout(std::time::Duration::from_secs(10), stream.collect::<Vec<_>>())
        .await
        .expect("async scan finished");
    assert!(items.is_empty());
}
