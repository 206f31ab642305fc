//! Toolchain bootstrap tests with local installer scripts
#![cfg(unix)]


use marlin_flasher::config::InstallerSource;
use marlin_flasher::{ErrorKind, FlasherEvent, InstallEvent, ToolchainKind};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_fixtures::{FakeToolchain, engine_with, test_config, write_script};
use tokio::sync::mpsc;

async fn drain(mut rx: mpsc::UnboundedReceiver<InstallEvent>) -> Vec<InstallEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
        let finished = event.finished;
        events.push(event);
        if finished {
            break;
        }
    }
    events
}

#[tokio::test]
async fn test_successful_install_persists_cli_path() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        "install.sh",
        "echo \"installing into $BINDIR\"\nmkdir -p \"$BINDIR\"\nprintf '#!/bin/sh\\n' > \"$BINDIR/arduino-cli\"\nchmod +x \"$BINDIR/arduino-cli\"\necho done",
    );
    let mut config = test_config(dir.path());
    config.installer.arduino.source = InstallerSource::Path(script);
    let engine = engine_with(config, vec![Arc::new(FakeToolchain::arduino())]);
    let mut published = engine.publisher().subscribe();

    let rx = engine.installer().install(ToolchainKind::Arduino).unwrap();
    let events = drain(rx).await;

    let last = events.last().unwrap();
    assert!(last.finished);
    assert!(last.success, "{:?}", events);
    let expected = dir.path().join("toolchains/arduino-cli/bin/arduino-cli");
    assert_eq!(last.resolved_path.as_deref(), Some(expected.as_path()));
    assert!(events.iter().any(|e| e.status_line == "done"));

    assert_eq!(
        engine.state().cli_path(ToolchainKind::Arduino).await,
        Some(expected.clone())
    );
    let job = engine.installer().status(ToolchainKind::Arduino).unwrap();
    assert!(!job.running);
    assert_eq!(job.success, Some(true));
    assert!(!engine.installer().is_running(ToolchainKind::Arduino));

    let mut saw_result = false;
    while let Ok(event) = published.try_recv() {
        if let FlasherEvent::InstallResult { success, path, .. } = event {
            assert!(success);
            assert_eq!(path, Some(expected.clone()));
            saw_result = true;
        }
    }
    assert!(saw_result);
}

#[tokio::test]
async fn test_failing_installer_reports_failure() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "install.sh", "echo 'no network' >&2\nexit 3");
    let mut config = test_config(dir.path());
    config.installer.arduino.source = InstallerSource::Path(script);
    let engine = engine_with(config, vec![Arc::new(FakeToolchain::arduino())]);

    let rx = engine.installer().install(ToolchainKind::Arduino).unwrap();
    let events = drain(rx).await;

    let last = events.last().unwrap();
    assert!(last.finished);
    assert!(!last.success);
    assert!(last.resolved_path.is_none());
    assert!(last.status_line.starts_with("Installation failed"));
    assert!(engine.state().cli_path(ToolchainKind::Arduino).await.is_none());
}

#[tokio::test]
async fn test_concurrent_install_is_busy() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "install.sh", "sleep 1\nexit 1");
    let mut config = test_config(dir.path());
    config.installer.platformio.source = InstallerSource::Path(script.clone());
    config.installer.platformio.interpreter = "sh".to_string();
    config.installer.arduino.source = InstallerSource::Path(script);
    let engine = engine_with(config, vec![Arc::new(FakeToolchain::arduino())]);

    let rx = engine.installer().install(ToolchainKind::PlatformIO).unwrap();
    let err = engine
        .installer()
        .install(ToolchainKind::PlatformIO)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);

    // Another toolchain may bootstrap at the same time
    let other = engine.installer().install(ToolchainKind::Arduino).unwrap();

    drain(rx).await;
    drain(other).await;
    assert!(!engine.installer().is_running(ToolchainKind::PlatformIO));
    // A finished bootstrap can be retried
    let retry = engine.installer().install(ToolchainKind::PlatformIO).unwrap();
    drain(retry).await;
}

#[tokio::test]
async fn test_stalled_download_times_out_and_allows_retry() {
    // Accepts connections but never answers
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/install.sh", listener.local_addr().unwrap());

    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.limits.install_timeout_secs = 1;
    config.installer.arduino.source = InstallerSource::Url(url);
    let engine = engine_with(config, vec![Arc::new(FakeToolchain::arduino())]);

    let rx = engine.installer().install(ToolchainKind::Arduino).unwrap();
    let events = drain(rx).await;

    let last = events.last().unwrap();
    assert!(last.finished);
    assert!(!last.success);
    assert!(last.status_line.contains("did not finish within 1s"));
    assert!(!engine.installer().is_running(ToolchainKind::Arduino));

    let retry = engine.installer().install(ToolchainKind::Arduino).unwrap();
    drain(retry).await;
    drop(listener);
}
