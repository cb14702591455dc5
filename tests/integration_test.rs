use key_sequence_recorder::config::{parse_duration, Config};
use key_sequence_recorder::event::{summarize, trim_dangling_presses};
use key_sequence_recorder::{
    keymap, storage, Controller, ControllerOptions, KeyEvent, KeyState, KsrError, Notification,
    PlaybackTiming, SimulatedBackend,
};
use std::io::Write;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::sync::mpsc::UnboundedReceiver;

const VK_A: u16 = 0x41;
const VK_B: u16 = 0x42;

fn options() -> ControllerOptions {
    ControllerOptions {
        timing: PlaybackTiming {
            settle_delay: Duration::ZERO,
            repetition_gap: Duration::from_millis(5),
        },
        ..ControllerOptions::default()
    }
}

fn controller() -> (Controller<SimulatedBackend>, UnboundedReceiver<Notification>) {
    Controller::new(SimulatedBackend::with_table(&keymap::windows::TABLE), options()).unwrap()
}

/// Wait for a notification matching `pred`, returning it and everything
/// received on the way.
fn wait_for(
    rx: &mut UnboundedReceiver<Notification>,
    pred: impl Fn(&Notification) -> bool,
) -> Vec<Notification> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        match rx.try_recv() {
            Ok(notification) => {
                let done = pred(&notification);
                seen.push(notification);
                if done {
                    return seen;
                }
            }
            Err(_) => std::thread::sleep(Duration::from_millis(2)),
        }
    }
    panic!("timed out; received {:?}", seen);
}

/// The end-of-playback notification is sent before the worker goes idle.
fn wait_idle(ctl: &Controller<SimulatedBackend>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while ctl.is_playing() {
        assert!(Instant::now() < deadline, "playback never went idle");
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn is_playback_end(n: &Notification) -> bool {
    matches!(
        n,
        Notification::PlaybackFinished { .. } | Notification::PlaybackCancelled { .. }
    )
}

fn abc() -> Vec<KeyEvent> {
    vec![
        KeyEvent::new("A", KeyState::Down, 0),
        KeyEvent::new("A", KeyState::Up, 50),
        KeyEvent::new("B", KeyState::Down, 100),
    ]
}

#[test]
fn test_record_then_replay_twice() {
    let (mut ctl, mut rx) = controller();

    ctl.start_recording().unwrap();
    ctl.backend().press(VK_A);
    ctl.backend().release(VK_A);
    ctl.backend().press(VK_B);
    ctl.stop_recording();

    let recorded = ctl.snapshot();
    assert_eq!(recorded.len(), 3);
    assert!(recorded.iter().all(|e| e.native_code.is_some()));

    ctl.start_playback(2).unwrap();
    let seen = wait_for(&mut rx, is_playback_end);
    assert!(matches!(
        seen.last(),
        Some(Notification::PlaybackFinished { emitted: 6, failed: 0 })
    ));

    let expected: Vec<(String, KeyState)> = [
        ("A", KeyState::Down),
        ("A", KeyState::Up),
        ("B", KeyState::Down),
    ]
    .iter()
    .cycle()
    .take(6)
    .map(|(k, s)| (k.to_string(), *s))
    .collect();
    assert_eq!(ctl.backend().posted_names(), expected);
    wait_idle(&ctl);
}

#[test]
fn test_replay_honors_recorded_delays() {
    let (mut ctl, mut rx) = controller();
    ctl.load_snapshot(abc()).unwrap();

    ctl.start_playback(1).unwrap();
    wait_for(&mut rx, is_playback_end);

    let posted = ctl.backend().posted();
    assert_eq!(posted.len(), 3);
    assert!(posted[1].at.duration_since(posted[0].at) >= Duration::from_millis(50));
    assert!(posted[2].at.duration_since(posted[1].at) >= Duration::from_millis(100));
}

#[test]
fn test_unknown_key_is_not_recorded() {
    let (mut ctl, _rx) = controller();
    ctl.start_recording().unwrap();

    ctl.backend().press(0xFF);
    ctl.backend().release(0xFF);
    ctl.backend().press(VK_A);
    ctl.stop_recording();

    let events = ctl.snapshot();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, "A");
}

#[test]
fn test_cancel_mid_playback() {
    let (mut ctl, mut rx) = controller();
    ctl.load_snapshot(vec![
        KeyEvent::new("A", KeyState::Down, 0),
        KeyEvent::new("A", KeyState::Up, 400),
        KeyEvent::new("B", KeyState::Down, 400),
    ])
    .unwrap();

    ctl.start_playback(5).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while ctl.backend().posted().is_empty() {
        assert!(Instant::now() < deadline, "first key never posted");
        std::thread::sleep(Duration::from_millis(2));
    }

    // Now sleeping before the second event.
    assert!(ctl.stop_playback());
    let seen = wait_for(&mut rx, is_playback_end);
    assert!(matches!(
        seen.last(),
        Some(Notification::PlaybackCancelled { emitted: 1 })
    ));

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(ctl.backend().posted().len(), 1);
    assert!(!ctl.is_playing());
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_recording_and_playback_are_exclusive() {
    let (mut ctl, mut rx) = controller();
    ctl.load_snapshot(vec![KeyEvent::new("A", KeyState::Down, 300)])
        .unwrap();

    ctl.start_playback(1).unwrap();
    let err = ctl.start_recording().unwrap_err();
    assert!(matches!(err, KsrError::ConcurrentModeConflict { .. }));
    assert!(!ctl.is_recording());
    assert!(matches!(ctl.start_playback(1), Err(KsrError::AlreadyPlaying)));
    ctl.stop_playback();
    wait_for(&mut rx, is_playback_end);
    wait_idle(&ctl);

    ctl.start_recording().unwrap();
    let err = ctl.start_playback(1).unwrap_err();
    assert_eq!(err.to_string(), "cannot start playback while recording");
    assert!(matches!(
        ctl.load_snapshot(abc()),
        Err(KsrError::ConcurrentModeConflict { .. })
    ));
    ctl.stop_recording();
}

#[test]
fn test_clear_during_playback_does_not_change_replay() {
    let (mut ctl, mut rx) = controller();
    ctl.load_snapshot(abc()).unwrap();

    ctl.start_playback(1).unwrap();
    ctl.clear();
    assert!(ctl.snapshot().is_empty());

    let seen = wait_for(&mut rx, is_playback_end);
    assert!(matches!(
        seen.last(),
        Some(Notification::PlaybackFinished { emitted: 3, .. })
    ));
    assert_eq!(ctl.backend().posted().len(), 3);
}

#[test]
fn test_malformed_file_leaves_sequence_unchanged() {
    let (ctl, _rx) = controller();
    ctl.load_snapshot(abc()).unwrap();

    for doc in [
        r#"[{"key": "A", "state": "down", "delay": 0}, {"key": 5}]"#,
        r#"{"key": "A", "state": "down", "delay": 0}"#,
    ] {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(doc.as_bytes()).unwrap();

        let result =
            storage::load_sequence(file.path()).and_then(|events| ctl.load_snapshot(events));
        assert!(matches!(result, Err(KsrError::Format(_))), "{}", doc);
        assert_eq!(ctl.snapshot(), abc());
    }
}

#[test]
fn test_sequence_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sequence.json");

    let events = vec![
        KeyEvent::new("LCtrl", KeyState::Down, 0).with_native_code(0xA2),
        KeyEvent::new("C", KeyState::Down, 40).with_native_code(0x43),
        KeyEvent::new("C", KeyState::Up, 60).with_native_code(0x43),
        KeyEvent::new("LCtrl", KeyState::Up, 15).with_native_code(0xA2),
    ];
    storage::save_sequence(&path, &events).unwrap();

    let loaded = storage::load_sequence(&path).unwrap();
    assert_eq!(loaded, events);
}

#[test]
fn test_stop_chord_trimmed_before_save() {
    let (mut ctl, _rx) = controller();
    ctl.start_recording().unwrap();
    ctl.backend().press(VK_A);
    ctl.backend().release(VK_A);
    // ctrl+alt+s held when the hotkey fires
    ctl.backend().press(0xA2);
    ctl.backend().press(0xA4);
    ctl.backend().press(0x53);
    ctl.stop_recording();

    let mut events = ctl.snapshot();
    assert_eq!(trim_dangling_presses(&mut events), 3);
    assert_eq!(events.len(), 2);
    assert!(summarize(&events).contains("Total events: 2"));
}

#[test]
fn test_sequence_limit() {
    let (mut ctl, _rx) = Controller::new(
        SimulatedBackend::with_table(&keymap::windows::TABLE),
        ControllerOptions {
            max_events: Some(2),
            ..options()
        },
    )
    .unwrap();

    assert!(matches!(
        ctl.load_snapshot(abc()),
        Err(KsrError::Overflow { limit: 2 })
    ));

    ctl.start_recording().unwrap();
    ctl.backend().press(VK_A);
    ctl.backend().release(VK_A);
    ctl.backend().press(VK_B);
    ctl.stop_recording();
    assert_eq!(ctl.snapshot().len(), 2);
}

#[test]
fn test_config_file_round_trip() {
    let json = r#"
    {
        "settle_delay": "250ms",
        "repetition_gap": "1s",
        "focus_countdown": "3s",
        "repeat_count": 4,
        "stop_hotkey": "ctrl+shift+q",
        "max_events": 5000,
        "verbose": true
    }
    "#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    let path = file.path().to_str().unwrap();

    let config = Config::from_file(path).unwrap();
    assert_eq!(config.settle_delay, Duration::from_millis(250));
    assert_eq!(config.repetition_gap, Duration::from_secs(1));
    assert_eq!(config.focus_countdown, Duration::from_secs(3));
    assert_eq!(config.repeat_count, 4);
    assert_eq!(config.stop_hotkey, "ctrl+shift+q");
    assert_eq!(config.max_events, Some(5000));
    assert!(config.prefer_native_code);
    assert!(config.verbose);
    assert!(config.validate().is_ok());

    let out = NamedTempFile::new().unwrap();
    let out_path = out.path().to_str().unwrap();
    config.save_to_file(out_path).unwrap();
    assert_eq!(Config::from_file(out_path).unwrap(), config);

    let options = ControllerOptions::from(&config);
    assert_eq!(options.timing.settle_delay, Duration::from_millis(250));
    assert_eq!(options.max_events, Some(5000));
}

#[test]
fn test_config_defaults() {
    let config: Config = serde_json::from_str("{}").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.settle_delay, Duration::from_millis(300));
    assert_eq!(config.repetition_gap, Duration::from_millis(500));
    assert_eq!(config.repeat_count, 1);
    assert_eq!(config.stop_hotkey, "ctrl+alt+s");
}

#[test]
fn test_invalid_configs() {
    let mut config = Config::default();

    config.repeat_count = 0;
    assert!(config.validate().is_err());

    config.repeat_count = 1;
    config.stop_hotkey = "  ".to_string();
    assert!(config.validate().is_err());

    assert!(Config::from_file("/nonexistent/ksr.json").is_err());
}

#[test]
fn test_duration_parsing() {
    assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
    assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    assert_eq!(parse_duration("1000").unwrap(), Duration::from_millis(1000));
    assert_eq!(parse_duration(" 5S ").unwrap(), Duration::from_secs(5));

    assert!(parse_duration("").is_err());
    assert!(parse_duration("abc").is_err());
    assert!(parse_duration("1000x").is_err());
    assert!(parse_duration("-1000ms").is_err());
}

#[test]
fn test_every_platform_round_trips_names() {
    for table in keymap::all_tables() {
        for code in table.codes() {
            let name = table.name_of(code).unwrap();
            let back = table.code_of(name).unwrap();
            assert_eq!(
                table.name_of(back),
                Some(name),
                "{}: {} -> {:#x}",
                table.platform(),
                name,
                code
            );
        }
    }
}
