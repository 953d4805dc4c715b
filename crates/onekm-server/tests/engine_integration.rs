//! End-to-end behaviour of the dispatch engine against scripted devices.
//!
//! Every test drives [`DispatchEngine::tick_at`] with explicit timestamps so
//! chord windows, flush intervals and heartbeat timers are deterministic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use onekm_core::keymap::evdev::{
    BTN_LEFT, KEY_A, KEY_D, KEY_F, KEY_LEFTCTRL, KEY_LEFTSHIFT, KEY_PAUSE, KEY_S, REL_X, REL_Y,
};
use onekm_core::{ControlState, HidUsage, Heartbeat, KeyboardReport, Message, MouseButton};
use onekm_server::application::dispatch::{
    DispatchEngine, EngineConfig, KeyForwarding, TickOutcome,
};
use onekm_server::application::key_sync::KeySyncRecovery;
use onekm_server::infrastructure::input_capture::mock::MockCaptureSource;
use onekm_server::infrastructure::input_capture::RawInputEvent;
use onekm_server::infrastructure::transport::mock::MockTransport;
use onekm_server::infrastructure::virtual_keyboard::mock::MockKeySync;

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Rig {
    engine: DispatchEngine,
    capture: MockCaptureSource,
    transport: MockTransport,
    sink: MockKeySync,
    running: Arc<AtomicBool>,
}

fn rig_with(config: EngineConfig, heartbeat: Heartbeat) -> Rig {
    let capture = MockCaptureSource::new();
    let transport = MockTransport::new();
    let sink = MockKeySync::new();
    let running = Arc::new(AtomicBool::new(true));
    let engine = DispatchEngine::new(
        Box::new(capture.clone()),
        Box::new(transport.clone()),
        config,
        Arc::clone(&running),
    )
    .with_heartbeat(heartbeat)
    .with_recovery(KeySyncRecovery::new(Box::new(sink.clone()), Duration::ZERO));
    Rig {
        engine,
        capture,
        transport,
        sink,
        running,
    }
}

fn rig() -> Rig {
    rig_with(EngineConfig::default(), Heartbeat::disabled())
}

fn hotkey(r: &Rig) {
    r.capture.push_key(KEY_PAUSE, 1);
}

/// Ticks until the capture queue is empty and one idle tick has run.
fn settle(r: &mut Rig, now: Instant) {
    while r.capture.pending() > 0 {
        r.engine.tick_at(now).unwrap();
    }
    r.engine.tick_at(now).unwrap();
}

fn switches(sent: &[Message]) -> Vec<ControlState> {
    sent.iter()
        .filter_map(|m| match m {
            Message::Switch(s) => Some(*s),
            _ => None,
        })
        .collect()
}

fn last_report(sent: &[Message]) -> Option<KeyboardReport> {
    sent.iter().rev().find_map(|m| match m {
        Message::KeyboardReport(r) => Some(*r),
        _ => None,
    })
}

// ── Control state machine ─────────────────────────────────────────────────────

#[test]
fn test_spaced_hotkey_presses_each_toggle_and_switch_once() {
    // Arrange
    let mut r = rig();
    let t0 = Instant::now();

    // Act
    for i in 0..5u64 {
        hotkey(&r);
        r.engine
            .tick_at(t0 + Duration::from_millis(2_500 * i))
            .unwrap();
    }

    // Assert
    assert_eq!(
        switches(&r.transport.sent()),
        vec![
            ControlState::Remote,
            ControlState::Local,
            ControlState::Remote,
            ControlState::Local,
            ControlState::Remote,
        ]
    );
    assert_eq!(r.engine.state(), ControlState::Remote);
}

#[test]
fn test_triple_press_within_window_shuts_down_with_no_net_toggle() {
    // Arrange
    let mut r = rig();
    let t0 = Instant::now();

    // Act
    let mut outcomes = Vec::new();
    for ms in [0u64, 500, 1_200] {
        hotkey(&r);
        outcomes.push(r.engine.tick_at(t0 + Duration::from_millis(ms)).unwrap());
    }

    // Assert
    assert_eq!(outcomes.last(), Some(&TickOutcome::Shutdown));
    assert_eq!(r.engine.state(), ControlState::Local);
    assert!(!r.running.load(Ordering::Relaxed));
    assert_eq!(
        r.engine.tick_at(t0 + Duration::from_secs(5)).unwrap(),
        TickOutcome::Shutdown
    );
}

#[test]
fn test_grab_happens_before_switch_and_release_before_recovery() {
    // Arrange
    let mut r = rig();
    let t0 = Instant::now();

    // Act
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    let grabbed_after_first = r.capture.is_grabbed();
    r.capture.push_key(KEY_A, 1);
    r.engine.tick_at(t0).unwrap();
    hotkey(&r);
    r.engine.tick_at(t0 + Duration::from_secs(3)).unwrap();

    // Assert
    assert!(grabbed_after_first);
    assert_eq!(r.capture.grab_calls(), vec![true, false]);
    assert_eq!(r.capture.key_state_queries(), 1);
    assert_eq!(
        r.capture.key_state_queries_while_grabbed(),
        0,
        "recovery must read key state only after devices are released"
    );
}

#[test]
fn test_partial_grab_failure_does_not_block_switch() {
    let mut r = rig();
    r.capture.fail_grab(true);
    hotkey(&r);

    r.engine.tick_at(Instant::now()).unwrap();

    assert_eq!(r.engine.state(), ControlState::Remote);
    assert_eq!(switches(&r.transport.sent()), vec![ControlState::Remote]);
}

// ── Local pacing ──────────────────────────────────────────────────────────────

/// Queues what a 1 kHz mouse moving diagonally produces in `elapsed`.
fn feed_mouse(r: &Rig, elapsed: Duration) {
    for _ in 0..elapsed.as_millis() {
        r.capture.push_motion(1, 1);
    }
}

/// Ticks once and returns how long the loop takes before the next tick.
fn tick_step(r: &mut Rig, now: Instant) -> Duration {
    let poll = EngineConfig::default().local_poll_timeout;
    match r.engine.tick_at(now).unwrap() {
        TickOutcome::Continue { sleep, .. } => poll + sleep,
        TickOutcome::Shutdown => panic!("engine stopped"),
    }
}

#[test]
fn test_sustained_mouse_motion_while_local_does_not_delay_hotkey() {
    // Arrange: ten seconds of a fast mouse while local.
    let mut r = rig();
    let t0 = Instant::now();
    let mut now = t0;
    let mut step = Duration::from_millis(1);
    let mut worst_backlog = 0;
    while now < t0 + Duration::from_secs(10) {
        feed_mouse(&r, step);
        worst_backlog = worst_backlog.max(r.capture.pending());
        step = tick_step(&mut r, now);
        now += step;
    }

    // Act: the hotkey lands behind queued motion and the mouse keeps going.
    feed_mouse(&r, step);
    hotkey(&r);
    let pressed_at = now;
    let mut ticks = 0;
    while r.engine.state() == ControlState::Local && ticks < 1_000 {
        step = tick_step(&mut r, now);
        now += step;
        feed_mouse(&r, step);
        ticks += 1;
    }

    // Assert
    let limit = EngineConfig::default().local_drain_limit;
    let latency = now - pressed_at;
    assert_eq!(r.engine.state(), ControlState::Remote);
    assert!(latency < Duration::from_millis(200), "hotkey took {latency:?}");
    assert!(worst_backlog < 2 * limit, "backlog grew to {worst_backlog}");
    assert_eq!(r.transport.sent(), vec![Message::Switch(ControlState::Remote)]);
}

// ── Keyboard tracker and reports ──────────────────────────────────────────────

#[test]
fn test_interleaved_key_transitions_leave_exact_held_set() {
    // Arrange
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();

    // Act
    for (code, value) in [
        (KEY_A, 1),
        (KEY_S, 1),
        (KEY_A, 0),
        (KEY_D, 1),
        (KEY_A, 1),
        (KEY_A, 1),
        (KEY_S, 0),
        (KEY_S, 0),
        (KEY_F, 1),
        (KEY_D, 0),
    ] {
        r.capture.push_key(code, value);
    }
    settle(&mut r, t0);

    // Assert
    assert_eq!(r.engine.held_keys(), &[KEY_A, KEY_F]);
    let report = last_report(&r.transport.sent()).expect("at least one report");
    let keys: Vec<HidUsage> = report.pressed_keys().collect();
    assert_eq!(keys, vec![HidUsage::KEY_A, HidUsage(0x09)]);
}

#[test]
fn test_seventh_key_is_omitted_until_a_slot_frees() {
    // Arrange
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    // evdev Q W E R T Y U
    let codes = [16u16, 17, 18, 19, 20, 21, 22];

    // Act
    for &code in &codes {
        r.capture.push_key(code, 1);
    }
    settle(&mut r, t0);
    let full = last_report(&r.transport.sent()).unwrap();
    let reports_before = r.transport.sent().len();

    // Assert: six reports for six keys, none for the seventh.
    assert_eq!(full.pressed_keys().count(), 6);
    assert!(!full.holds(HidUsage(0x18)), "U must not be reported yet");
    assert_eq!(reports_before, 1 + 6);

    // Act: releasing Q frees a slot for U.
    r.capture.push_key(16, 0);
    settle(&mut r, t0);

    // Assert
    let after = last_report(&r.transport.sent()).unwrap();
    assert!(after.holds(HidUsage(0x18)));
    assert!(!after.holds(HidUsage(0x14)));
}

#[test]
fn test_modifier_only_change_emits_report() {
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();

    r.capture.push_key(KEY_LEFTSHIFT, 1);
    settle(&mut r, t0);

    let report = last_report(&r.transport.sent()).unwrap();
    assert!(!report.modifiers.is_empty());
    assert_eq!(report.pressed_keys().count(), 0);
}

#[test]
fn test_autorepeat_is_not_forwarded() {
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.transport.take_sent();

    r.capture.push_key(KEY_A, 1);
    for _ in 0..5 {
        r.capture.push_key(KEY_A, 2);
    }
    settle(&mut r, t0);

    assert_eq!(r.transport.sent().len(), 1);
}

// ── Recovery ──────────────────────────────────────────────────────────────────

#[test]
fn test_recovery_releases_only_stale_keys_on_return_to_local() {
    // Arrange: A and S forwarded as held; only S is still physically down.
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.capture.push_key(KEY_A, 1);
    r.capture.push_key(KEY_S, 1);
    settle(&mut r, t0);
    r.capture.set_hardware_keys(&[KEY_S]);

    // Act
    hotkey(&r);
    r.engine.tick_at(t0 + Duration::from_secs(3)).unwrap();

    // Assert
    assert_eq!(r.sink.released(), vec![KEY_A]);
    assert_eq!(r.engine.held_keys(), &[KEY_S]);
}

#[test]
fn test_recovery_reconciles_remote_in_report_mode() {
    // Arrange
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.capture.push_key(KEY_A, 1);
    settle(&mut r, t0);
    r.transport.take_sent();

    // Act
    hotkey(&r);
    r.engine.tick_at(t0 + Duration::from_secs(3)).unwrap();

    // Assert
    assert_eq!(
        r.transport.sent(),
        vec![
            Message::Switch(ControlState::Local),
            Message::KeyboardReport(KeyboardReport::EMPTY),
        ]
    );
}

#[test]
fn test_recovery_reconciles_remote_in_event_mode() {
    let config = EngineConfig {
        key_forwarding: KeyForwarding::Event,
        ..EngineConfig::default()
    };
    let mut r = rig_with(config, Heartbeat::disabled());
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.capture.push_key(KEY_D, 1);
    settle(&mut r, t0);
    r.transport.take_sent();

    hotkey(&r);
    r.engine.tick_at(t0 + Duration::from_secs(3)).unwrap();

    assert_eq!(
        r.transport.sent(),
        vec![
            Message::Switch(ControlState::Local),
            Message::KeyEvent {
                keycode: KEY_D,
                pressed: false
            },
        ]
    );
}

#[test]
fn test_hardware_query_failure_keeps_ledger_and_state_machine_running() {
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.capture.push_key(KEY_A, 1);
    settle(&mut r, t0);
    r.capture.fail_key_state(true);

    hotkey(&r);
    r.engine.tick_at(t0 + Duration::from_secs(3)).unwrap();

    assert_eq!(r.engine.state(), ControlState::Local);
    assert!(r.sink.released().is_empty());
    assert_eq!(r.engine.held_keys(), &[KEY_A]);
}

#[test]
fn test_key_released_while_local_is_not_forwarded_on_next_remote_session() {
    // Arrange: Ctrl held across the switch to local, then released there.
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.capture.push_key(KEY_LEFTCTRL, 1);
    settle(&mut r, t0);
    r.capture.set_hardware_keys(&[KEY_LEFTCTRL]);
    hotkey(&r);
    r.engine.tick_at(t0 + Duration::from_secs(3)).unwrap();
    assert_eq!(r.engine.held_keys(), &[KEY_LEFTCTRL]);
    r.capture.set_hardware_keys(&[]);
    r.capture.push_key(KEY_LEFTCTRL, 0);
    settle(&mut r, t0 + Duration::from_secs(4));
    r.transport.take_sent();

    // Act
    hotkey(&r);
    r.engine.tick_at(t0 + Duration::from_secs(6)).unwrap();
    let on_switch = r.transport.take_sent();
    r.capture.push_key(KEY_A, 1);
    settle(&mut r, t0 + Duration::from_secs(6));

    // Assert
    assert_eq!(
        on_switch,
        vec![
            Message::Switch(ControlState::Remote),
            Message::KeyboardReport(KeyboardReport::EMPTY),
        ]
    );
    assert_eq!(r.engine.held_keys(), &[KEY_A]);
    let report = last_report(&r.transport.sent()).expect("report for A");
    assert!(report.holds(HidUsage::KEY_A));
    assert!(report.modifiers.is_empty(), "Ctrl must not ride along with A");
    assert!(r.sink.released().is_empty(), "the local OS already saw the release");
}

#[test]
fn test_key_released_while_local_is_released_on_target_in_event_mode() {
    let config = EngineConfig {
        key_forwarding: KeyForwarding::Event,
        ..EngineConfig::default()
    };
    let mut r = rig_with(config, Heartbeat::disabled());
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.capture.push_key(KEY_LEFTCTRL, 1);
    settle(&mut r, t0);
    r.capture.set_hardware_keys(&[KEY_LEFTCTRL]);
    hotkey(&r);
    r.engine.tick_at(t0 + Duration::from_secs(3)).unwrap();
    r.capture.set_hardware_keys(&[]);
    r.transport.take_sent();

    hotkey(&r);
    r.engine.tick_at(t0 + Duration::from_secs(6)).unwrap();

    assert_eq!(
        r.transport.sent(),
        vec![
            Message::Switch(ControlState::Remote),
            Message::KeyEvent {
                keycode: KEY_LEFTCTRL,
                pressed: false
            },
        ]
    );
    assert!(r.engine.held_keys().is_empty());
}

// ── Motion ────────────────────────────────────────────────────────────────────

#[test]
fn test_motion_samples_coalesce_into_one_message() {
    // Arrange
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.transport.take_sent();
    let samples = [(3, -2), (7, 1), (-1, 4), (12, 0)];
    for (dx, dy) in samples {
        r.capture.push_motion(dx, dy);
    }

    // Act
    r.engine.tick_at(t0 + Duration::from_millis(10)).unwrap();

    // Assert
    assert_eq!(r.transport.sent(), vec![Message::MouseMove { dx: 21, dy: 3 }]);
}

#[test]
fn test_large_motion_saturates_wire_field() {
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.transport.take_sent();
    for _ in 0..5 {
        r.capture.push(RawInputEvent::Relative {
            axis: REL_X,
            delta: 20_000,
        });
        r.capture.push(RawInputEvent::Relative {
            axis: REL_Y,
            delta: -20_000,
        });
    }

    r.engine.tick_at(t0 + Duration::from_millis(10)).unwrap();

    assert_eq!(
        r.transport.sent(),
        vec![Message::MouseMove {
            dx: i16::MAX,
            dy: i16::MIN
        }]
    );
}

#[test]
fn test_button_after_motion_is_sent_first_and_ends_batch() {
    // Arrange
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.transport.take_sent();
    r.capture.push_motion(1, 1);
    r.capture.push_motion(2, 2);
    r.capture.push_motion(3, 3);
    r.capture.push_key(BTN_LEFT, 1);
    r.capture.push_motion(100, 100);

    // Act
    r.engine.tick_at(t0 + Duration::from_millis(10)).unwrap();

    // Assert: only the button went out; the trailing sample is still queued.
    assert_eq!(
        r.transport.sent(),
        vec![Message::MouseButton {
            button: MouseButton::Left,
            pressed: true
        }]
    );
    assert!(r.capture.pending() > 0);

    // Act: the next ticks drain the queue, then the idle tick flushes.
    settle(&mut r, t0 + Duration::from_millis(20));

    // Assert
    assert_eq!(
        r.transport.sent().last(),
        Some(&Message::MouseMove { dx: 106, dy: 106 })
    );
}

#[test]
fn test_opportunistic_flush_respects_minimum_interval() {
    // Arrange
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.transport.take_sent();

    // Act
    r.capture.push_motion(1, 0);
    r.engine.tick_at(t0).unwrap();
    r.capture.push_motion(1, 0);
    r.engine.tick_at(t0 + Duration::from_millis(1)).unwrap();
    r.engine.tick_at(t0 + Duration::from_millis(6)).unwrap();

    // Assert
    assert_eq!(
        r.transport.sent(),
        vec![
            Message::MouseMove { dx: 1, dy: 0 },
            Message::MouseMove { dx: 1, dy: 0 },
        ]
    );
}

#[test]
fn test_pending_motion_is_flushed_before_switch_local() {
    // Arrange: motion accumulated 5 ms ago, flush interval not yet reached.
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    r.capture.push_motion(1, 1);
    r.engine.tick_at(t0).unwrap();
    r.transport.take_sent();
    r.capture.push_motion(4, -4);
    r.capture.push_key(KEY_PAUSE, 1);

    // Act
    r.engine.tick_at(t0 + Duration::from_secs(3)).unwrap();

    // Assert
    let sent = r.transport.sent();
    assert_eq!(sent[0], Message::MouseMove { dx: 4, dy: -4 });
    assert_eq!(sent[1], Message::Switch(ControlState::Local));
    assert!(!r.capture.is_grabbed());
}

// ── Heartbeat ─────────────────────────────────────────────────────────────────

#[test]
fn test_heartbeat_burst_alternates_and_is_cancelled_by_hotkey() {
    // Arrange
    let mut r = rig_with(
        EngineConfig::default(),
        Heartbeat::new(Duration::from_secs(30), 5),
    );
    let t0 = Instant::now();
    r.engine.tick_at(t0).unwrap();
    let t1 = t0 + Duration::from_secs(31);

    // Act: two burst steps, then a switch.
    r.engine.tick_at(t1).unwrap();
    r.engine.tick_at(t1).unwrap();
    hotkey(&r);
    r.engine.tick_at(t1).unwrap();
    hotkey(&r);
    r.engine.tick_at(t1 + Duration::from_secs(3)).unwrap();
    r.engine.tick_at(t1 + Duration::from_secs(3)).unwrap();

    // Assert
    let moves: Vec<Message> = r
        .transport
        .sent()
        .into_iter()
        .filter(|m| matches!(m, Message::MouseMove { .. }))
        .collect();
    assert_eq!(
        moves,
        vec![
            Message::MouseMove { dx: -1, dy: -1 },
            Message::MouseMove { dx: 1, dy: 1 },
        ],
        "no burst step may follow a switch"
    );
}

// ── Link failures and teardown ────────────────────────────────────────────────

#[test]
fn test_disconnect_ends_run_and_releases_devices() {
    // Arrange
    let mut r = rig();
    hotkey(&r);
    r.engine.tick().unwrap();
    r.transport
        .set_failure(Some(onekm_server::infrastructure::transport::mock::MockFailure::Disconnect));
    r.capture.push_key(KEY_A, 1);

    // Act
    let result = r.engine.run();

    // Assert
    assert!(result.is_err());
    assert!(!r.capture.is_grabbed());
}

#[test]
fn test_signal_during_remote_tears_down_to_local() {
    // Arrange
    let mut r = rig();
    hotkey(&r);
    r.engine.tick().unwrap();
    r.transport.take_sent();
    r.running.store(false, Ordering::Relaxed);

    // Act
    let result = r.engine.run();

    // Assert
    assert!(result.is_ok());
    assert_eq!(r.engine.state(), ControlState::Local);
    assert_eq!(r.transport.sent(), vec![Message::Switch(ControlState::Local)]);
    assert!(!r.capture.is_grabbed());
}

#[test]
fn test_signal_while_local_does_not_ungrab_again() {
    // Arrange: one round trip to remote and back, then a signal while local.
    let mut r = rig();
    let t0 = Instant::now();
    hotkey(&r);
    r.engine.tick_at(t0).unwrap();
    hotkey(&r);
    r.engine.tick_at(t0 + Duration::from_secs(3)).unwrap();
    r.transport.take_sent();
    r.running.store(false, Ordering::Relaxed);

    // Act
    let result = r.engine.run();

    // Assert
    assert!(result.is_ok());
    assert_eq!(r.capture.grab_calls(), vec![true, false]);
    assert!(r.transport.sent().is_empty());
}
