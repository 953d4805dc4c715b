//! The event dispatch loop.
//!
//! [`DispatchEngine`] owns every piece of mutable forwarding state and runs
//! one cooperative, single-threaded tick at a time:
//!
//! ```text
//! tick
//!  ├─ shutdown requested?            -> Shutdown
//!  ├─ LOCAL : short poll, drain <= local_drain_limit scanning for the
//!  │          hotkey, heartbeat; no sleep while the drain is saturated
//!  └─ REMOTE: drain <= batch_size events
//!       ├─ hotkey          -> state machine, end batch
//!       ├─ motion          -> coalescer, continue
//!       ├─ button / key    -> send now, end batch
//!       └─ nothing sent    -> opportunistic motion flush
//! ```
//!
//! The engine is the only writer to the transport.  A write error costs one
//! message; a closed link ends the loop with [`EngineError::Transport`].

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use onekm_core::keymap::evdev::{BTN_LEFT, BTN_MIDDLE, BTN_RIGHT, KEY_DOMAIN, REL_X, REL_Y};
use onekm_core::{
    ChordDetector, ControlState, Heartbeat, KeyPressTracker, Message, MotionCoalescer,
    MouseButton, ReportEmitter,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::application::control::{ControlEffects, ControlStateMachine, HotkeyOutcome};
use crate::application::key_sync::{resync_ledger, KeySyncRecovery};
use crate::infrastructure::input_capture::{CaptureSource, RawInputEvent};
use crate::infrastructure::transport::{Transport, TransportError};

/// Error type for the dispatch loop.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The link to the target host is gone.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

/// How key transitions are put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyForwarding {
    /// Edge-triggered boot-style keyboard reports.
    #[default]
    Report,
    /// One `KEY_EVENT` per transition, carrying the evdev code.
    Event,
}

/// Pacing and key handling for the dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// evdev code of the switch hotkey.
    pub hotkey: u16,
    pub batch_size: usize,
    pub local_drain_limit: usize,
    pub local_poll_timeout: Duration,
    pub local_idle_sleep: Duration,
    pub remote_idle_sleep: Duration,
    pub heartbeat_sleep: Duration,
    pub key_forwarding: KeyForwarding,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hotkey: onekm_core::keymap::evdev::KEY_PAUSE,
            batch_size: 20,
            local_drain_limit: 64,
            local_poll_timeout: Duration::from_millis(1),
            local_idle_sleep: Duration::from_millis(50),
            remote_idle_sleep: Duration::from_millis(1),
            heartbeat_sleep: Duration::from_millis(5),
            key_forwarding: KeyForwarding::Report,
        }
    }
}

/// What a raw event means to the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Hotkey,
    Motion { dx: i32, dy: i32 },
    Button { button: MouseButton, pressed: bool },
    Key { code: u16, pressed: bool },
    Ignored,
}

/// Classifies a raw capture event.
///
/// Only a hotkey press acts; its release and autorepeat are ignored, and the
/// hotkey is never forwarded.  Autorepeat of any key, key codes outside the
/// ledger domain other than the three mouse buttons, and relative axes other
/// than X/Y are ignored.
pub fn classify(event: RawInputEvent, hotkey: u16) -> Input {
    match event {
        RawInputEvent::Key { code, value } if code == hotkey => {
            if value == 1 {
                Input::Hotkey
            } else {
                Input::Ignored
            }
        }
        RawInputEvent::Key { code, value } => {
            let pressed = match value {
                0 => false,
                1 => true,
                _ => return Input::Ignored,
            };
            let button = match code {
                BTN_LEFT => Some(MouseButton::Left),
                BTN_RIGHT => Some(MouseButton::Right),
                BTN_MIDDLE => Some(MouseButton::Middle),
                _ => None,
            };
            match button {
                Some(button) => Input::Button { button, pressed },
                None if (code as usize) < KEY_DOMAIN => Input::Key { code, pressed },
                None => Input::Ignored,
            }
        }
        RawInputEvent::Relative { axis: REL_X, delta } => Input::Motion { dx: delta, dy: 0 },
        RawInputEvent::Relative { axis: REL_Y, delta } => Input::Motion { dx: 0, dy: delta },
        RawInputEvent::Relative { .. } => Input::Ignored,
    }
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep going after sleeping for `sleep`.
    Continue { processed: usize, sleep: Duration },
    /// Shutdown was requested.
    Shutdown,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub ticks: u64,
    pub sent: u64,
    pub dropped: u64,
    pub switches: u64,
    pub keys_repaired: u64,
    /// Ledger entries dropped on a switch to remote.
    pub keys_resynced: u64,
}

// ── I/O half ──────────────────────────────────────────────────────────────────

/// Everything the state machine's side effects touch.
///
/// Split from [`DispatchEngine`] so the machine can borrow it mutably while
/// the engine holds the machine.
struct EngineIo {
    capture: Box<dyn CaptureSource>,
    transport: Box<dyn Transport>,
    tracker: KeyPressTracker,
    emitter: ReportEmitter,
    coalescer: MotionCoalescer,
    recovery: KeySyncRecovery,
    key_forwarding: KeyForwarding,
    now: Instant,
    fatal: Option<TransportError>,
    link_alive: bool,
    /// Last requested grab state.
    grabbed: bool,
    stats: EngineStats,
}

impl EngineIo {
    /// Sends `msg`, returning `true` if it was written.
    fn send(&mut self, msg: Message) -> bool {
        if !self.link_alive {
            return false;
        }
        match self.transport.send(&msg) {
            Ok(()) => {
                trace!("-> {msg}");
                self.stats.sent += 1;
                true
            }
            Err(e) if e.is_fatal() => {
                error!("{e}");
                self.link_alive = false;
                self.fatal = Some(e);
                false
            }
            Err(e) => {
                warn!("dropped {msg}: {e}");
                self.stats.dropped += 1;
                false
            }
        }
    }

    /// Records a forwarded key transition and sends what it produces.
    ///
    /// Returns `true` if a message was produced.  A transition that does not
    /// change the ledger (a release for a key pressed before the switch, for
    /// example) produces nothing.
    fn forward_key(&mut self, code: u16, pressed: bool) -> bool {
        if !self.tracker.record(code, pressed) {
            return false;
        }
        match self.key_forwarding {
            KeyForwarding::Report => match self.emitter.maybe_emit(&self.tracker) {
                Some(report) => {
                    self.send(Message::KeyboardReport(report));
                    true
                }
                None => false,
            },
            KeyForwarding::Event => {
                self.send(Message::KeyEvent {
                    keycode: code,
                    pressed,
                });
                true
            }
        }
    }

    /// Makes the target host drop keys the ledger just released.
    fn release_on_target(&mut self, released: Vec<u16>) {
        match self.key_forwarding {
            KeyForwarding::Report => {
                if let Some(report) = self.emitter.maybe_emit(&self.tracker) {
                    self.send(Message::KeyboardReport(report));
                }
            }
            KeyForwarding::Event => {
                for keycode in released {
                    self.send(Message::KeyEvent {
                        keycode,
                        pressed: false,
                    });
                }
            }
        }
    }
}

impl ControlEffects for EngineIo {
    fn flush_motion(&mut self) {
        if let Some((dx, dy)) = self.coalescer.force_flush(self.now) {
            self.send(Message::MouseMove { dx, dy });
        }
    }

    fn set_grab(&mut self, grab: bool) {
        self.grabbed = grab;
        let report = self.capture.set_grab(grab);
        if report.failed > 0 {
            warn!(
                succeeded = report.succeeded,
                failed = report.failed,
                "partial {}",
                if grab { "grab" } else { "release" }
            );
        } else {
            debug!(devices = report.succeeded, grab, "grab state changed");
        }
    }

    fn announce(&mut self, state: ControlState) {
        self.stats.switches += 1;
        self.send(Message::Switch(state));
    }

    fn recover_keys(&mut self) {
        let repaired = self
            .recovery
            .recover(&mut self.tracker, self.capture.as_mut());
        if repaired.is_empty() {
            return;
        }
        self.stats.keys_repaired += repaired.len() as u64;
        self.release_on_target(repaired);
    }

    fn resync_keys(&mut self) {
        let dropped = resync_ledger(&mut self.tracker, self.capture.as_mut());
        if dropped.is_empty() {
            return;
        }
        self.stats.keys_resynced += dropped.len() as u64;
        self.release_on_target(dropped);
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// The single owner of forwarding state.
pub struct DispatchEngine {
    control: ControlStateMachine,
    io: EngineIo,
    heartbeat: Heartbeat,
    config: EngineConfig,
}

impl DispatchEngine {
    /// Creates an engine in the `LOCAL` state with default chord, coalescer
    /// and heartbeat settings and recovery disabled.
    ///
    /// Clearing `running` from anywhere stops the loop at the next tick.
    pub fn new(
        capture: Box<dyn CaptureSource>,
        transport: Box<dyn Transport>,
        config: EngineConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            control: ControlStateMachine::new(ChordDetector::default(), running),
            io: EngineIo {
                capture,
                transport,
                tracker: KeyPressTracker::new(),
                emitter: ReportEmitter::new(),
                coalescer: MotionCoalescer::default(),
                recovery: KeySyncRecovery::disabled(),
                key_forwarding: config.key_forwarding,
                now: Instant::now(),
                fatal: None,
                link_alive: true,
                grabbed: false,
                stats: EngineStats::default(),
            },
            heartbeat: Heartbeat::default(),
            config,
        }
    }

    pub fn with_recovery(mut self, recovery: KeySyncRecovery) -> Self {
        self.io.recovery = recovery;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_coalescer(mut self, coalescer: MotionCoalescer) -> Self {
        self.io.coalescer = coalescer;
        self
    }

    pub fn with_chord(mut self, chord: ChordDetector) -> Self {
        self.control.set_chord(chord);
        self
    }

    pub fn state(&self) -> ControlState {
        self.control.state()
    }

    pub fn stats(&self) -> EngineStats {
        self.io.stats
    }

    /// The keys currently forwarded as held.
    pub fn held_keys(&self) -> &[u16] {
        self.io.tracker.pressed_keys()
    }

    /// Runs one tick against the current time.
    pub fn tick(&mut self) -> Result<TickOutcome, EngineError> {
        self.tick_at(Instant::now())
    }

    /// Runs one tick as if the clock read `now`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] once the link is closed.
    pub fn tick_at(&mut self, now: Instant) -> Result<TickOutcome, EngineError> {
        if !self.control.is_running() {
            return Ok(TickOutcome::Shutdown);
        }
        self.io.now = now;
        self.io.stats.ticks += 1;

        let outcome = match self.control.state() {
            ControlState::Local => self.tick_local(now),
            ControlState::Remote => self.tick_remote(now),
        };

        if let Some(err) = self.io.fatal.take() {
            return Err(err.into());
        }
        if !self.control.is_running() {
            return Ok(TickOutcome::Shutdown);
        }
        Ok(outcome)
    }

    /// Ticks until shutdown or a fatal error, then tears down.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] if the link closed.
    pub fn run(&mut self) -> Result<(), EngineError> {
        info!(
            hotkey = self.config.hotkey,
            transport = %self.io.transport.describe(),
            "dispatch loop started"
        );
        let result = loop {
            match self.tick() {
                Ok(TickOutcome::Continue { sleep, .. }) => {
                    if !sleep.is_zero() {
                        thread::sleep(sleep);
                    }
                }
                Ok(TickOutcome::Shutdown) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.teardown();
        result
    }

    /// Leaves the capture host in a usable state.
    ///
    /// With a live link and control remote, this is a full return to local
    /// (flush, release, `SWITCH(LOCAL)`, recovery).  Otherwise grabbed
    /// devices are simply released.
    pub fn teardown(&mut self) {
        self.io.now = Instant::now();
        if self.control.state() == ControlState::Remote && self.io.link_alive {
            self.control.return_to_local(&mut self.io);
        } else if self.io.grabbed {
            self.io.set_grab(false);
        }
        self.io.fatal = None;

        let stats = self.io.stats;
        info!(
            ticks = stats.ticks,
            sent = stats.sent,
            dropped = stats.dropped,
            switches = stats.switches,
            keys_repaired = stats.keys_repaired,
            keys_resynced = stats.keys_resynced,
            "dispatch loop stopped"
        );
    }

    fn tick_local(&mut self, now: Instant) -> TickOutcome {
        let mut processed = 0;
        let mut drained = 0;

        if self.io.capture.wait_for_event(self.config.local_poll_timeout) {
            while drained < self.config.local_drain_limit {
                let Some(event) = self.io.capture.next_event() else {
                    break;
                };
                drained += 1;
                if classify(event, self.config.hotkey) == Input::Hotkey {
                    self.handle_hotkey(now);
                    processed += 1;
                    break;
                }
            }
        }

        if self.control.state() == ControlState::Local && self.control.is_running() {
            if let Some((dx, dy)) = self.heartbeat.poll(now) {
                trace!(dx, dy, "heartbeat step");
                self.io.send(Message::MouseMove { dx, dy });
                processed += 1;
            }
        }

        // A full drain means more is queued.
        let saturated = drained >= self.config.local_drain_limit;
        let sleep = if processed > 0 || saturated {
            Duration::ZERO
        } else if self.heartbeat.is_active() {
            self.config.heartbeat_sleep
        } else {
            self.config.local_idle_sleep
        };
        TickOutcome::Continue { processed, sleep }
    }

    fn tick_remote(&mut self, now: Instant) -> TickOutcome {
        let mut events = 0;
        let mut sent = 0;

        for _ in 0..self.config.batch_size {
            let Some(event) = self.io.capture.next_event() else {
                break;
            };
            events += 1;
            match classify(event, self.config.hotkey) {
                Input::Hotkey => {
                    self.handle_hotkey(now);
                    sent += 1;
                    break;
                }
                Input::Motion { dx, dy } => self.io.coalescer.add(dx, dy),
                Input::Button { button, pressed } => {
                    self.io.send(Message::MouseButton { button, pressed });
                    sent += 1;
                    break;
                }
                Input::Key { code, pressed } => {
                    if self.io.forward_key(code, pressed) {
                        sent += 1;
                        break;
                    }
                }
                Input::Ignored => {}
            }
        }

        if sent == 0 && self.control.state() == ControlState::Remote {
            if let Some((dx, dy)) = self.io.coalescer.try_flush(now) {
                self.io.send(Message::MouseMove { dx, dy });
            }
        }

        let sleep = if events > 0 {
            Duration::ZERO
        } else {
            self.config.remote_idle_sleep
        };
        TickOutcome::Continue {
            processed: events,
            sleep,
        }
    }

    fn handle_hotkey(&mut self, now: Instant) {
        self.heartbeat.cancel();
        match self.control.on_hotkey_down(now, &mut self.io) {
            HotkeyOutcome::Switched(_) => self.heartbeat.reset(now),
            HotkeyOutcome::ShutdownRequested => {}
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
