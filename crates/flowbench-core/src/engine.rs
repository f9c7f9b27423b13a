//! Serial engine
//!
//! Couples the background telemetry reader with the operator-facing
//! command surface. A single mutex arbitrates bus access: the reader
//! try-locks so it never starves a pending write, and every write path
//! blocks on the same lock, so a command is never interleaved with a
//! partially read line and a read never observes a half-written command.
//!
//! The engine publishes everything it learns on one ordered
//! [`EngineEvent`] channel; the subscriber (the UI layer) owns all
//! display state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::SessionClock;
use crate::protocol::{Connection, ProtocolError, ACK_PREFIX, HANDSHAKE_TOKEN};
use crate::telemetry::{self, Telemetry};

/// Delay after each background read, releasing the bus to any pending
/// writer before the next blocking read.
const READ_SETTLE: Duration = Duration::from_millis(5);

/// How long the reader yields when the bus is held by a writer
const LOCK_RETRY: Duration = Duration::from_millis(1);

/// Pause between handshake attempts, giving the firmware time to answer
const HANDSHAKE_POLL: Duration = Duration::from_millis(50);

/// Handshake attempts before bring-up is abandoned
pub const DEFAULT_HANDSHAKE_ATTEMPTS: u32 = 20;

/// Flag character appended to a toggle command when the caller wants the
/// rig to answer with a readings burst
pub const TELEMETRY_REQUEST_FLAG: char = 'r';

/// Malformed user input, rejected before the connection is touched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No pins given")]
    EmptyPins,

    #[error("Duplicate pin in request: {0:?}")]
    DuplicatePins(String),

    #[error("Interval must be a positive number of seconds, got {0:?}")]
    InvalidDuration(String),
}

/// Engine preset state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// No session active; toggles are ad hoc
    Idle,
    /// A timed session is running and will auto-stop
    PresetRunning,
}

/// Everything the engine publishes to its subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A raw line as received, for display and logging
    Line(String),
    /// One structured reading parsed from a received line
    Telemetry(Telemetry),
    /// A preset began; pins and duration echo the accepted request
    PresetStarted {
        /// Pin identifiers toggled by the session
        pins: String,
        /// Session length until the symmetric close toggle
        duration: Duration,
    },
    /// The engine returned to idle; preset affordances re-enable
    PresetEnded,
    /// The background reader hit an unrecoverable transport fault and
    /// stopped; the session must be restarted to continue
    Fault(String),
    /// The background reader exited; the engine may be joined
    Cleanup,
}

/// Preset bookkeeping, touched only by the foreground and the clock-fire
/// thread, never by the background reader.
struct PresetState {
    state: EngineState,
    active_pins: String,
    /// Exact message of the opening toggle; the closing toggle replays it
    /// so the pair stays symmetric even if the telemetry flag changes
    /// mid-session.
    close_message: String,
    clock: Option<SessionClock>,
}

struct EngineShared {
    /// The serial link; only ever touched while holding this mutex
    conn: Mutex<Connection>,
    preset: Mutex<PresetState>,
    running: AtomicBool,
    request_telemetry: AtomicBool,
    events: Sender<EngineEvent>,
}

impl EngineShared {
    fn compose(&self, pins: &str) -> String {
        if self.request_telemetry.load(Ordering::Relaxed) {
            format!("{pins}{TELEMETRY_REQUEST_FLAG}\n")
        } else {
            format!("{pins}\n")
        }
    }

    /// Blocking write path: a user-initiated command must eventually win
    /// the bus from the reader.
    fn write_message(&self, message: &str) -> bool {
        let mut conn = match self.conn.lock() {
            Ok(conn) => conn,
            // poisoned means the reader already faulted; nothing to write to
            Err(_) => return false,
        };
        let ok = conn.write(message);
        if !ok {
            tracing::warn!(command = message.trim(), "toggle write failed");
        }
        ok
    }

    fn publish_line(&self, line: &str) {
        let _ = self.events.send(EngineEvent::Line(line.to_string()));
        for reading in telemetry::parse(line) {
            let _ = self.events.send(EngineEvent::Telemetry(reading));
        }
    }

    /// Close out the active preset: symmetric toggle with the recorded pin
    /// set, stop the clock, return to idle. Idempotent.
    fn end_preset(&self) {
        let mut preset = self.preset.lock().unwrap_or_else(|e| e.into_inner());
        if preset.state == EngineState::Idle {
            return;
        }
        preset.state = EngineState::Idle;
        if let Some(mut clock) = preset.clock.take() {
            clock.cancel();
        }
        preset.active_pins.clear();

        let message = std::mem::take(&mut preset.close_message);
        self.write_message(&message);

        // The rig often answers the closing toggle immediately; drain and
        // forward whatever is already buffered so the tail is not lost.
        if let Ok(mut conn) = self.conn.lock() {
            if let Ok(flushed) = conn.read_available() {
                for line in flushed.lines().filter(|l| !l.trim().is_empty()) {
                    self.publish_line(line);
                }
            }
        }
        drop(preset);

        tracing::debug!("preset ended");
        let _ = self.events.send(EngineEvent::PresetEnded);
    }
}

/// Bring-up: repeat the init token until the rig acknowledges with the
/// expected prefix. Bounded, so a desynchronized rig surfaces as a setup
/// failure instead of a hang.
pub fn handshake(conn: &mut Connection, max_attempts: u32) -> Result<(), ProtocolError> {
    for attempt in 1..=max_attempts {
        if !conn.write(&format!("{HANDSHAKE_TOKEN}\n")) {
            tracing::debug!(attempt, "handshake write failed, retrying");
            continue;
        }
        thread::sleep(HANDSHAKE_POLL);
        let reply = conn.read_available()?;
        if reply.starts_with(ACK_PREFIX) {
            tracing::info!(attempt, "rig acknowledged handshake");
            return Ok(());
        }
    }
    Err(ProtocolError::SetupTimeout {
        attempts: max_attempts,
    })
}

/// Serial command/telemetry engine. See the module docs for the locking
/// model; construction spawns the background reader, dropping the engine
/// stops it.
pub struct SerialEngine {
    shared: Arc<EngineShared>,
    reader: Option<JoinHandle<()>>,
}

impl SerialEngine {
    /// Take ownership of a connection and start the background reader.
    /// Events arrive on the returned receiver for the engine's lifetime.
    pub fn start(conn: Connection) -> (Self, Receiver<EngineEvent>) {
        let (events, rx) = mpsc::channel();
        let shared = Arc::new(EngineShared {
            conn: Mutex::new(conn),
            preset: Mutex::new(PresetState {
                state: EngineState::Idle,
                active_pins: String::new(),
                close_message: String::new(),
                clock: None,
            }),
            running: AtomicBool::new(true),
            request_telemetry: AtomicBool::new(false),
            events,
        });

        let reader = thread::spawn({
            let shared = Arc::clone(&shared);
            move || read_loop(&shared)
        });

        (
            Self {
                shared,
                reader: Some(reader),
            },
            rx,
        )
    }

    /// Current preset state
    pub fn state(&self) -> EngineState {
        self.shared
            .preset
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .state
    }

    /// Append the telemetry-request flag to outbound commands so the rig
    /// answers each toggle with a readings burst
    pub fn set_request_telemetry(&self, on: bool) {
        self.shared.request_telemetry.store(on, Ordering::Relaxed);
    }

    /// Out-of-band toggle, independent of any running preset. `None`
    /// reuses the active preset's pin set.
    pub fn send_toggle(&self, pins: Option<&str>) -> Result<(), ValidationError> {
        let message = match pins {
            Some(pins) => {
                validate_pins(pins)?;
                self.shared.compose(pins)
            }
            None => {
                let preset = self.shared.preset.lock().unwrap_or_else(|e| e.into_inner());
                if preset.active_pins.is_empty() {
                    return Err(ValidationError::EmptyPins);
                }
                self.shared.compose(&preset.active_pins)
            }
        };
        self.shared.write_message(&message);
        Ok(())
    }

    /// Begin a timed session: toggle now, toggle back after the interval.
    ///
    /// `duration` is the operator's interval text and must parse as a
    /// positive number of seconds. Duplicate pins and bad durations are
    /// rejected before the connection is touched. Starting while a preset
    /// is already running is a no-op.
    pub fn start_preset(&self, pins: &str, duration: &str) -> Result<(), ValidationError> {
        validate_pins(pins)?;
        let duration = parse_duration(duration)?;

        let mut preset = self.shared.preset.lock().unwrap_or_else(|e| e.into_inner());
        if preset.state == EngineState::PresetRunning {
            tracing::debug!("preset already running, start request ignored");
            return Ok(());
        }
        preset.state = EngineState::PresetRunning;
        preset.active_pins = pins.to_string();

        let message = self.shared.compose(pins);
        self.shared.write_message(&message);
        preset.close_message = message;

        let shared = Arc::clone(&self.shared);
        preset.clock = Some(SessionClock::schedule(duration, move || {
            shared.end_preset();
        }));
        drop(preset);

        tracing::debug!(pins, ?duration, "preset started");
        let _ = self.shared.events.send(EngineEvent::PresetStarted {
            pins: pins.to_string(),
            duration,
        });
        Ok(())
    }

    /// End the running preset now instead of waiting for the clock.
    /// No-op when idle.
    pub fn cancel_preset(&self) {
        self.shared.end_preset();
    }

    /// Explicit end, same path the clock takes on expiry. Idempotent.
    pub fn end_preset(&self) {
        self.shared.end_preset();
    }

    /// Stop the reader, close out any running preset and release the
    /// link. Shutdown latency is bounded by one reader iteration (read
    /// timeout plus settling delay).
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.end_preset();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Ok(mut conn) = self.shared.conn.lock() {
            conn.close();
        }
    }
}

impl Drop for SerialEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Background read loop, running on its own thread for the engine's
/// entire lifetime, independent of preset state.
fn read_loop(shared: &EngineShared) {
    while shared.running.load(Ordering::SeqCst) {
        let line = match shared.conn.try_lock() {
            Ok(mut conn) => match conn.read_line() {
                Ok(line) => line,
                Err(e) => {
                    // fatal for the session: a half-broken reader cannot
                    // be trusted to resume silently
                    tracing::error!("reader fault: {e}");
                    let _ = shared.events.send(EngineEvent::Fault(e.to_string()));
                    break;
                }
            },
            Err(TryLockError::WouldBlock) => {
                // a writer holds the bus; never block it behind a read
                thread::sleep(LOCK_RETRY);
                continue;
            }
            Err(TryLockError::Poisoned(_)) => {
                let _ = shared
                    .events
                    .send(EngineEvent::Fault("bus lock poisoned".into()));
                break;
            }
        };

        // lock released above; yield the bus briefly to any pending writer
        thread::sleep(READ_SETTLE);

        if line.is_empty() {
            continue;
        }
        shared.publish_line(&line);
    }

    let _ = shared.events.send(EngineEvent::Cleanup);
}

/// Validate a pin request: non-empty, no duplicate identifiers
fn validate_pins(pins: &str) -> Result<(), ValidationError> {
    if pins.is_empty() {
        return Err(ValidationError::EmptyPins);
    }
    let mut seen = HashSet::new();
    for c in pins.chars() {
        if !seen.insert(c) {
            return Err(ValidationError::DuplicatePins(pins.to_string()));
        }
    }
    Ok(())
}

/// Parse the operator's interval text into a positive duration
fn parse_duration(text: &str) -> Result<Duration, ValidationError> {
    match text.trim().parse::<f64>() {
        Ok(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs)
            .map_err(|_| ValidationError::InvalidDuration(text.to_string())),
        _ => Err(ValidationError::InvalidDuration(text.to_string())),
    }
}
