//! Flash job orchestration tests
//!
//! Drive both pipelines through fake toolchains and check the state machine,
//! the published events and the durable records a job leaves behind.


use marlin_flasher::store::StateStore;
use marlin_flasher::{
    BoardOption, Engine, ErrorKind, FlashRequest, FlashState, FlashStatus, FlasherEvent, Target,
    Toolchain, ToolchainKind,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use test_fixtures::{
    FakeToolchain, MEGA_FQBN, StepOutcome, collect_flash_events, create_marlin_sketch,
    create_platformio_project, engine_with, progress_of, steps_of, test_config,
};
use tokio::sync::broadcast::error::TryRecvError;

const WAIT: Duration = Duration::from_secs(10);

fn mega_request(cpu: &str) -> FlashRequest {
    FlashRequest::new(Target::board(
        MEGA_FQBN,
        vec![BoardOption::new("cpu", cpu)],
    ))
}

async fn arduino_engine(dir: &TempDir, fake: Arc<FakeToolchain>) -> Engine {
    let engine = engine_with(test_config(dir.path()), vec![fake]);
    let sketch = create_marlin_sketch(dir.path());
    engine
        .artifacts()
        .accept(ToolchainKind::Arduino, &sketch)
        .await
        .unwrap();
    engine
}

#[tokio::test]
async fn test_missing_artifact_is_rejected_without_events() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(test_config(dir.path()), vec![Arc::new(FakeToolchain::arduino())]);
    let mut rx = engine.publisher().subscribe();

    let err = engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("no artifact"));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert!(matches!(
        engine.orchestrator().status(ToolchainKind::Arduino).await.unwrap(),
        FlashStatus::Idle
    ));
}

#[tokio::test]
async fn test_successful_flash_reports_monotonic_progress() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeToolchain::arduino());
    let engine = arduino_engine(&dir, fake.clone()).await;
    let mut rx = engine.publisher().subscribe();

    let handle = engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap();
    assert_eq!(handle.kind, ToolchainKind::Arduino);
    assert!(!handle.remote);

    let events = collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;
    assert_eq!(
        steps_of(&events),
        vec!["queued", "building", "uploading", "succeeded"]
    );
    let progress = progress_of(&events);
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    match events.last() {
        Some(FlasherEvent::FlashResult {
            success,
            error_output,
            ..
        }) => {
            assert!(success);
            assert!(error_output.is_none());
        }
        other => panic!("unexpected final event {:?}", other),
    }
    assert!(events.iter().any(
        |e| matches!(e, FlasherEvent::FlashLog { line, .. } if line == "compile done")
    ));

    assert_eq!(fake.compile_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fake.upload_calls.load(Ordering::SeqCst), 1);
    match engine.orchestrator().status(ToolchainKind::Arduino).await.unwrap() {
        FlashStatus::Finished { job } => {
            assert_eq!(job.state, FlashState::Succeeded);
            assert_eq!(job.progress, 100);
            assert_eq!(job.success, Some(true));
        }
        other => panic!("unexpected status {:?}", other),
    }
}

#[tokio::test]
async fn test_second_start_while_running_is_busy() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeToolchain::arduino());
    fake.hold();
    let engine = arduino_engine(&dir, fake.clone()).await;
    let mut rx = engine.publisher().subscribe();

    engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap();

    let err = engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega1280"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);
    assert!(matches!(
        engine.orchestrator().status(ToolchainKind::Arduino).await.unwrap(),
        FlashStatus::Active { .. }
    ));

    fake.release();
    let events = collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;
    let results = events
        .iter()
        .filter(|e| matches!(e, FlasherEvent::FlashResult { .. }))
        .count();
    assert_eq!(results, 1);
    assert_eq!(fake.compile_calls.load(Ordering::SeqCst), 1);

    // The rejected request did not overwrite the stored options
    let last = engine
        .orchestrator()
        .last_options(ToolchainKind::Arduino)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.target, mega_request("atmega2560").target);

    // A new request is accepted once the job is terminal
    engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap();
    collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;
}

#[tokio::test]
async fn test_status_answers_while_a_start_resolves() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeToolchain::arduino());
    fake.set_list_delay(Duration::from_secs(2));
    let engine = arduino_engine(&dir, fake.clone()).await;

    let starting = engine.clone();
    let start = tokio::spawn(async move {
        starting
            .orchestrator()
            .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
            .await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = tokio::time::timeout(
        Duration::from_secs(1),
        engine.orchestrator().status(ToolchainKind::Arduino),
    )
    .await
    .expect("status pull blocked behind board resolution")
    .unwrap();
    assert!(matches!(status, FlashStatus::Idle));

    start.await.unwrap().unwrap();
    assert_eq!(fake.list_board_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_targets_are_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = arduino_engine(&dir, Arc::new(FakeToolchain::arduino())).await;

    let unknown_board = FlashRequest::new(Target::board("arduino:avr:due", Vec::new()));
    let err = engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, unknown_board)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTarget);

    let stale_option = FlashRequest::new(Target::board(
        MEGA_FQBN,
        vec![BoardOption::new("PSRAM", "enabled")],
    ));
    let err = engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, stale_option)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTarget);

    let err = engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega328p"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTarget);

    assert!(matches!(
        engine.orchestrator().status(ToolchainKind::Arduino).await.unwrap(),
        FlashStatus::Idle
    ));
    assert!(
        engine
            .orchestrator()
            .last_options(ToolchainKind::Arduino)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_compile_failure_carries_stderr() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeToolchain::arduino());
    fake.set_compile(StepOutcome::Fail {
        stderr: "Marlin.ino:12:3: error: expected ';' before '}' token".to_string(),
    });
    let engine = arduino_engine(&dir, fake.clone()).await;
    let mut rx = engine.publisher().subscribe();

    engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap();
    let events = collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;

    assert_eq!(steps_of(&events), vec!["queued", "building", "failed"]);
    match events.last() {
        Some(FlasherEvent::FlashResult {
            success,
            message,
            error_kind,
            error_output,
            ..
        }) => {
            assert!(!success);
            assert!(message.contains("failed"));
            assert_eq!(*error_kind, Some(ErrorKind::Toolchain));
            assert!(error_output.as_deref().unwrap().contains("expected ';'"));
        }
        other => panic!("unexpected final event {:?}", other),
    }
    assert_eq!(fake.upload_calls.load(Ordering::SeqCst), 0);

    match engine.orchestrator().status(ToolchainKind::Arduino).await.unwrap() {
        FlashStatus::Finished { job } => {
            assert_eq!(job.state, FlashState::Failed);
            assert_eq!(job.progress, 10);
            assert!(job.error_output.unwrap().contains("expected ';'"));
        }
        other => panic!("unexpected status {:?}", other),
    }
}

#[tokio::test]
async fn test_step_timeout_fails_the_job() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeToolchain::arduino());
    fake.set_upload(StepOutcome::Sleep(Duration::from_secs(30)));
    let mut config = test_config(dir.path());
    config.limits.upload_timeout_secs = 1;
    let engine = engine_with(config, vec![fake]);
    let sketch = create_marlin_sketch(dir.path());
    engine
        .artifacts()
        .accept(ToolchainKind::Arduino, &sketch)
        .await
        .unwrap();
    let mut rx = engine.publisher().subscribe();

    engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap();
    let events = collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;

    match events.last() {
        Some(FlasherEvent::FlashResult {
            success,
            error_kind,
            ..
        }) => {
            assert!(!success);
            assert_eq!(*error_kind, Some(ErrorKind::Timeout));
        }
        other => panic!("unexpected final event {:?}", other),
    }
    assert_eq!(progress_of(&events).last(), Some(&60));
}

#[tokio::test]
async fn test_last_options_follow_the_latest_accepted_request() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeToolchain::arduino());
    let engine = arduino_engine(&dir, fake.clone()).await;
    let mut rx = engine.publisher().subscribe();

    let first = mega_request("atmega2560").with_port("/dev/ttyACM0");
    engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, first.clone())
        .await
        .unwrap();
    collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;

    let last = engine
        .orchestrator()
        .last_options(ToolchainKind::Arduino)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.target, first.target);
    assert_eq!(last.port.as_deref(), Some("/dev/ttyACM0"));

    // A failing job still overwrites the record at accept time
    fake.set_compile(StepOutcome::Fail {
        stderr: "boom".to_string(),
    });
    let second = mega_request("atmega1280");
    engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, second.clone())
        .await
        .unwrap();
    collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;

    let last = engine
        .orchestrator()
        .last_options(ToolchainKind::Arduino)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.target, second.target);
    assert_eq!(last.port, None);
    assert!(
        engine
            .orchestrator()
            .last_options(ToolchainKind::PlatformIO)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_arduino_needs_a_serial_port() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.serial_port = None;
    let engine = engine_with(config, vec![Arc::new(FakeToolchain::arduino())]);
    let sketch = create_marlin_sketch(dir.path());
    engine
        .artifacts()
        .accept(ToolchainKind::Arduino, &sketch)
        .await
        .unwrap();

    let err = engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[cfg(unix)]
#[tokio::test]
async fn test_hooks_run_around_the_build() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.hooks.pre_flash_script = Some("echo disconnecting printer".to_string());
    config.hooks.post_flash_script = Some("echo reconnecting printer".to_string());
    let engine = engine_with(config, vec![Arc::new(FakeToolchain::arduino())]);
    let sketch = create_marlin_sketch(dir.path());
    engine
        .artifacts()
        .accept(ToolchainKind::Arduino, &sketch)
        .await
        .unwrap();
    let mut rx = engine.publisher().subscribe();

    engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap();
    let events = collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;
    assert_eq!(
        steps_of(&events),
        vec![
            "queued",
            "pre_flash_hook",
            "building",
            "uploading",
            "post_flash_hook",
            "succeeded"
        ]
    );
    assert!(events.iter().any(
        |e| matches!(e, FlasherEvent::FlashLog { line, .. } if line == "disconnecting printer")
    ));

    // Hooks can be skipped per request
    engine
        .orchestrator()
        .start_flash(
            ToolchainKind::Arduino,
            mega_request("atmega2560").without_hooks(),
        )
        .await
        .unwrap();
    let events = collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;
    assert_eq!(
        steps_of(&events),
        vec!["queued", "building", "uploading", "succeeded"]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_failing_pre_hook_stops_the_job() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.hooks.pre_flash_script = Some("echo 'port locked' >&2; exit 2".to_string());
    let fake = Arc::new(FakeToolchain::arduino());
    let engine = engine_with(config, vec![fake.clone()]);
    let sketch = create_marlin_sketch(dir.path());
    engine
        .artifacts()
        .accept(ToolchainKind::Arduino, &sketch)
        .await
        .unwrap();
    let mut rx = engine.publisher().subscribe();

    engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap();
    let events = collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;

    assert_eq!(steps_of(&events), vec!["queued", "pre_flash_hook", "failed"]);
    match events.last() {
        Some(FlasherEvent::FlashResult { error_output, .. }) => {
            assert_eq!(error_output.as_deref(), Some("port locked"));
        }
        other => panic!("unexpected final event {:?}", other),
    }
    assert_eq!(fake.compile_calls.load(Ordering::SeqCst), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_hook_timeout_keeps_partial_stderr() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.hooks.pre_flash_script = Some("echo 'printer busy' >&2; sleep 5".to_string());
    config.limits.hook_timeout_secs = 1;
    let fake = Arc::new(FakeToolchain::arduino());
    let engine = engine_with(config, vec![fake.clone()]);
    let sketch = create_marlin_sketch(dir.path());
    engine
        .artifacts()
        .accept(ToolchainKind::Arduino, &sketch)
        .await
        .unwrap();
    let mut rx = engine.publisher().subscribe();

    engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap();
    let events = collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;

    match events.last() {
        Some(FlasherEvent::FlashResult {
            success,
            error_kind,
            error_output,
            ..
        }) => {
            assert!(!success);
            assert_eq!(*error_kind, Some(ErrorKind::Timeout));
            assert_eq!(error_output.as_deref(), Some("printer busy"));
        }
        other => panic!("unexpected final event {:?}", other),
    }
    assert_eq!(fake.compile_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_platformio_environment_flash() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.serial_port = None;
    let fake = Arc::new(FakeToolchain::platformio(&["mega2560", "LPC1768"]));
    let engine = engine_with(config, vec![fake.clone()]);
    let project = create_platformio_project(dir.path());
    engine
        .artifacts()
        .accept(ToolchainKind::PlatformIO, &project)
        .await
        .unwrap();
    let mut rx = engine.publisher().subscribe();

    let err = engine
        .orchestrator()
        .start_flash(
            ToolchainKind::PlatformIO,
            FlashRequest::new(Target::environment("due")),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTarget);

    let err = engine
        .orchestrator()
        .start_flash(ToolchainKind::PlatformIO, mega_request("atmega2560"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    engine
        .orchestrator()
        .start_flash(
            ToolchainKind::PlatformIO,
            FlashRequest::new(Target::environment("LPC1768")),
        )
        .await
        .unwrap();
    let events = collect_flash_events(&mut rx, ToolchainKind::PlatformIO, WAIT).await;
    assert!(matches!(
        events.last(),
        Some(FlasherEvent::FlashResult { success: true, .. })
    ));
    // The remote agent is not running, so the upload ran locally
    assert_eq!(fake.remote_uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_toolchains_flash_independently() {
    let dir = TempDir::new().unwrap();
    let arduino = Arc::new(FakeToolchain::arduino());
    arduino.hold();
    let platformio = Arc::new(FakeToolchain::platformio(&["mega2560"]));
    let engine = engine_with(
        test_config(dir.path()),
        vec![arduino.clone(), platformio.clone()],
    );
    let sketch = create_marlin_sketch(dir.path());
    let project = create_platformio_project(dir.path());
    engine
        .artifacts()
        .accept(ToolchainKind::Arduino, &sketch)
        .await
        .unwrap();
    engine
        .artifacts()
        .accept(ToolchainKind::PlatformIO, &project)
        .await
        .unwrap();
    let mut rx = engine.publisher().subscribe();

    engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap();
    engine
        .orchestrator()
        .start_flash(
            ToolchainKind::PlatformIO,
            FlashRequest::new(Target::environment("mega2560")),
        )
        .await
        .unwrap();

    collect_flash_events(&mut rx, ToolchainKind::PlatformIO, WAIT).await;
    assert!(matches!(
        engine.orchestrator().status(ToolchainKind::Arduino).await.unwrap(),
        FlashStatus::Active { .. }
    ));
    arduino.release();
    collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;
}

#[tokio::test]
async fn test_job_interrupted_by_restart_is_stale() {
    let dir = TempDir::new().unwrap();
    let state_file = dir.path().join("state.ron");
    let started_at = chrono::Local::now();
    {
        let store = StateStore::open(&state_file).unwrap();
        store
            .mark_in_flight(ToolchainKind::Arduino, started_at)
            .await
            .unwrap();
    }

    let fake: Arc<dyn Toolchain> = Arc::new(FakeToolchain::arduino());
    let engine = Engine::with_toolchains(
        test_config(dir.path()),
        Arc::new(StateStore::open(&state_file).unwrap()),
        vec![fake],
    );
    match engine.orchestrator().status(ToolchainKind::Arduino).await.unwrap() {
        FlashStatus::Stale { started_at: at } => {
            assert_eq!(at.timestamp(), started_at.timestamp())
        }
        other => panic!("unexpected status {:?}", other),
    }

    let sketch = create_marlin_sketch(dir.path());
    engine
        .artifacts()
        .accept(ToolchainKind::Arduino, &sketch)
        .await
        .unwrap();
    let mut rx = engine.publisher().subscribe();
    engine
        .orchestrator()
        .start_flash(ToolchainKind::Arduino, mega_request("atmega2560"))
        .await
        .unwrap();
    collect_flash_events(&mut rx, ToolchainKind::Arduino, WAIT).await;

    assert!(matches!(
        engine.orchestrator().status(ToolchainKind::Arduino).await.unwrap(),
        FlashStatus::Finished { .. }
    ));
    // The marker is cleared once the job reaches a terminal state
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.state().in_flight(ToolchainKind::Arduino).await.is_none());
}
