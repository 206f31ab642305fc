//! Remote agent supervision tests against a scripted `pio`
#![cfg(unix)]


use marlin_flasher::{
    Engine, ErrorKind, FlashRequest, FlasherEvent, RemoteAgentStatus, Target, ToolchainKind,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use test_fixtures::{
    FakeToolchain, collect_flash_events, create_platformio_project, engine_with, test_config,
    write_script,
};

const READY_AGENT: &str = "echo 'Connecting to PlatformIO Remote Development Cloud'\n\
echo 'Successfully connected'\n\
exec sleep 30";

fn agent_engine(dir: &Path, script_body: &str, enabled: bool) -> (Engine, Arc<FakeToolchain>) {
    let pio = write_script(dir, "pio", script_body);
    let mut config = test_config(dir);
    config.platformio.cli_path = Some(pio);
    config.platformio.remote_agent.enabled = enabled;
    config.platformio.remote_agent.name = Some("printer-bench".to_string());
    let fake = Arc::new(FakeToolchain::platformio(&["mega2560"]));
    (engine_with(config, vec![fake.clone()]), fake)
}

async fn wait_for(engine: &Engine, expected: RemoteAgentStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while engine.agent().status().await != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "agent never reached {:?}",
            expected
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_stop_while_stopped_is_silent() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = agent_engine(dir.path(), READY_AGENT, false);
    let mut rx = engine.publisher().subscribe();

    engine.agent().stop().await.unwrap();
    assert_eq!(engine.agent().status().await, RemoteAgentStatus::Stopped);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_agent_runs_after_confirmation_and_stops() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = agent_engine(dir.path(), READY_AGENT, false);
    let mut rx = engine.publisher().subscribe();

    engine.agent().start().await.unwrap();
    wait_for(&engine, RemoteAgentStatus::Running).await;
    // Starting again is a no-op
    engine.agent().start().await.unwrap();
    assert_eq!(engine.agent().status().await, RemoteAgentStatus::Running);

    engine.agent().stop().await.unwrap();
    wait_for(&engine, RemoteAgentStatus::Stopped).await;

    let mut statuses = Vec::new();
    let mut lines = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            FlasherEvent::AgentStatus { status } => statuses.push(status),
            FlasherEvent::AgentLog { line } => lines.push(line),
            _ => {}
        }
    }
    assert_eq!(
        statuses,
        vec![
            RemoteAgentStatus::Starting,
            RemoteAgentStatus::Running,
            RemoteAgentStatus::Stopping,
            RemoteAgentStatus::Stopped,
        ]
    );
    assert!(lines.iter().any(|l| l == "Successfully connected"));
    assert_eq!(lines.last().map(String::as_str), Some("Remote agent stopped"));
}

#[tokio::test]
async fn test_unexpected_exit_returns_to_stopped() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = agent_engine(
        dir.path(),
        "echo 'Error: You are not authorized' >&2\nexit 1",
        false,
    );
    let mut rx = engine.publisher().subscribe();

    engine.agent().start().await.unwrap();
    wait_for(&engine, RemoteAgentStatus::Stopped).await;

    let mut lines = Vec::new();
    let mut reached_running = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            FlasherEvent::AgentLog { line } => lines.push(line),
            FlasherEvent::AgentStatus {
                status: RemoteAgentStatus::Running,
            } => reached_running = true,
            _ => {}
        }
    }
    assert!(!reached_running);
    assert!(
        lines
            .last()
            .unwrap()
            .starts_with("Remote agent exited unexpectedly")
    );

    // The agent can be started again after it died
    engine.agent().start().await.unwrap();
    wait_for(&engine, RemoteAgentStatus::Stopped).await;
}

#[tokio::test]
async fn test_missing_binary_fails_start() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.platformio.cli_path = Some(dir.path().join("no-such-pio"));
    let engine = engine_with(
        config,
        vec![Arc::new(FakeToolchain::platformio(&["mega2560"]))],
    );

    assert!(engine.agent().start().await.is_err());
    assert_eq!(engine.agent().status().await, RemoteAgentStatus::Stopped);
}

#[tokio::test]
async fn test_flash_is_delegated_while_agent_runs() {
    let dir = TempDir::new().unwrap();
    let (engine, fake) = agent_engine(dir.path(), READY_AGENT, true);
    let project = create_platformio_project(dir.path());
    engine
        .artifacts()
        .accept(ToolchainKind::PlatformIO, &project)
        .await
        .unwrap();
    let mut rx = engine.publisher().subscribe();

    engine.agent().start().await.unwrap();
    wait_for(&engine, RemoteAgentStatus::Running).await;

    let handle = engine
        .orchestrator()
        .start_flash(
            ToolchainKind::PlatformIO,
            FlashRequest::new(Target::environment("mega2560")),
        )
        .await
        .unwrap();
    assert!(handle.remote);
    collect_flash_events(&mut rx, ToolchainKind::PlatformIO, Duration::from_secs(10)).await;
    assert_eq!(fake.remote_uploads.load(Ordering::SeqCst), 1);

    engine.agent().stop().await.unwrap();
    wait_for(&engine, RemoteAgentStatus::Stopped).await;
}

#[tokio::test]
async fn test_delegated_flash_fails_when_the_agent_stops() {
    let dir = TempDir::new().unwrap();
    let (engine, fake) = agent_engine(dir.path(), READY_AGENT, true);
    fake.hold();
    let project = create_platformio_project(dir.path());
    engine
        .artifacts()
        .accept(ToolchainKind::PlatformIO, &project)
        .await
        .unwrap();
    let mut rx = engine.publisher().subscribe();

    engine.agent().start().await.unwrap();
    wait_for(&engine, RemoteAgentStatus::Running).await;

    let handle = engine
        .orchestrator()
        .start_flash(
            ToolchainKind::PlatformIO,
            FlashRequest::new(Target::environment("mega2560")),
        )
        .await
        .unwrap();
    assert!(handle.remote);

    // Compile is parked on the fake, so the job sits in Building
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while fake.compile_calls.load(Ordering::SeqCst) == 0 {
        assert!(tokio::time::Instant::now() < deadline, "compile never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    engine.agent().stop().await.unwrap();

    let events = collect_flash_events(&mut rx, ToolchainKind::PlatformIO, Duration::from_secs(10)).await;
    match events.last() {
        Some(FlasherEvent::FlashResult {
            success,
            error_kind,
            ..
        }) => {
            assert!(!success);
            assert_eq!(*error_kind, Some(ErrorKind::Agent));
        }
        other => panic!("unexpected final event {:?}", other),
    }
    assert_eq!(fake.upload_calls.load(Ordering::SeqCst), 0);
    wait_for(&engine, RemoteAgentStatus::Stopped).await;
}
