//! Live capture engine.
//!
//! [`PacketCaptureEngine`] opens a device through a [`CaptureBackend`] and
//! reads frames on a dedicated `packet-capture` thread. Every IPv4 frame is
//! classified, checked against the blacklist cache and handed to the
//! attached [`PacketListener`], if any.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

use chrono::Local;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::capture::{CaptureBackend, NextPacket, PacketCapture};
use super::classify::{classify_frame, format_timestamp};
use super::device::find_device;
use super::listener::PacketListener;
use crate::cache::BlacklistCache;
use crate::config::CaptureSettings;
use crate::error::NetworkError;
use crate::metrics as names;

const THREAD_NAME: &str = "packet-capture";

/// Within one run of read errors, every this many is logged at `warn`.
const ERROR_LOG_INTERVAL: u64 = 1000;

/// Engine lifecycle: `Idle → Opening → Capturing → Stopping → Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Opening,
    Capturing,
    Stopping,
}

/// State shared with the capture thread.
struct Shared {
    state: Mutex<CaptureState>,
    running: AtomicBool,
    sequence: AtomicU64,
    packets_seen: AtomicU64,
    listener: RwLock<Option<Arc<dyn PacketListener>>>,
    cache: BlacklistCache,
    capture_thread: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn handle_frame(&self, frame: &[u8]) {
        let Some(summary) = classify_frame(frame) else {
            return;
        };

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.packets_seen.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::PACKETS_CAPTURED).increment(1);

        let is_blocked = self.cache.is_blocked(&summary.dest_ip.to_string());
        if is_blocked {
            metrics::counter!(names::PACKETS_BLOCKED).increment(1);
        }

        // Clone out of the slot so a concurrent detach never waits on a listener.
        let listener = self.listener.read().clone();
        let Some(listener) = listener else {
            return;
        };

        let record = summary.into_record(sequence, format_timestamp(&Local::now()), is_blocked);
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener.on_packet(record))) {
            error!(sequence, "packet listener panicked: {}", panic_message(&*panic));
        }
    }

    fn finish(&self) {
        self.running.store(false, Ordering::Release);
        let mut state = self.state.lock();
        if matches!(*state, CaptureState::Capturing | CaptureState::Stopping) {
            *state = CaptureState::Idle;
        }
    }

    fn on_capture_thread(&self) -> bool {
        *self.capture_thread.lock() == Some(std::thread::current().id())
    }
}

/// Run of consecutive read errors on one handle.
#[derive(Debug, Default)]
struct ErrorStreak {
    count: u64,
}

impl ErrorStreak {
    /// Count one more error and return the length of the run.
    fn record(&mut self) -> u64 {
        self.count += 1;
        self.count
    }

    const fn should_warn(count: u64) -> bool {
        count == 1 || count % ERROR_LOG_INTERVAL == 0
    }

    /// End the run, returning its length if there was one.
    fn clear(&mut self) -> Option<u64> {
        (self.count > 0).then(|| std::mem::take(&mut self.count))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn capture_loop<C: PacketCapture>(shared: &Shared, mut capture: C, pause: Duration) {
    *shared.capture_thread.lock() = Some(std::thread::current().id());
    let mut errors = ErrorStreak::default();

    while shared.running.load(Ordering::Acquire) {
        let result = capture.next_packet();
        if result.is_ok()
            && let Some(count) = errors.clear()
        {
            info!(errors = count, "packet reads recovered");
        }

        match result {
            Ok(NextPacket::Frame(frame)) => shared.handle_frame(&frame),
            Ok(NextPacket::Timeout) => {}
            Ok(NextPacket::Closed) => {
                info!("capture handle closed");
                break;
            }
            Err(err) => {
                metrics::counter!(names::CAPTURE_ERRORS).increment(1);
                let count = errors.record();
                if ErrorStreak::should_warn(count) {
                    warn!(error = %err, consecutive = count, "error reading packet");
                } else {
                    debug!(error = %err, consecutive = count, "error reading packet");
                }
                std::thread::sleep(pause);
            }
        }
    }

    // Dropping the capture closes the handle before the engine goes idle.
    drop(capture);
    shared.finish();
    debug!("capture thread exiting");
}

/// Captures on one device and reports classified packets.
pub struct PacketCaptureEngine<B: CaptureBackend> {
    backend: B,
    settings: CaptureSettings,
    interface: Option<String>,
    shared: Arc<Shared>,
    /// Held for the whole of `start` and `stop`, so they never interleave.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<B: CaptureBackend> PacketCaptureEngine<B> {
    /// Create an idle engine. `interface` selects a device by exact name;
    /// `None` picks one heuristically.
    pub fn new(
        backend: B,
        cache: BlacklistCache,
        settings: CaptureSettings,
        interface: Option<String>,
    ) -> Self {
        Self {
            backend,
            settings,
            interface,
            shared: Arc::new(Shared {
                state: Mutex::new(CaptureState::Idle),
                running: AtomicBool::new(false),
                sequence: AtomicU64::new(0),
                packets_seen: AtomicU64::new(0),
                listener: RwLock::new(None),
                cache,
                capture_thread: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Open the device and start the capture thread.
    ///
    /// Does nothing if already capturing.
    ///
    /// # Errors
    ///
    /// Returns an error if no device can be selected, the handle cannot be
    /// opened, or the thread cannot be spawned. The engine stays idle.
    pub fn start(&self) -> Result<(), NetworkError> {
        let mut worker = self.worker.lock();

        {
            let mut state = self.shared.state.lock();
            if matches!(*state, CaptureState::Capturing | CaptureState::Opening) {
                debug!(state = ?*state, "capture already running");
                return Ok(());
            }
            *state = CaptureState::Opening;
        }

        // A thread that ended on its own leaves a finished handle behind.
        if let Some(handle) = worker.take()
            && handle.join().is_err()
        {
            warn!("previous capture thread panicked");
        }

        match self.spawn_capture() {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                *self.shared.state.lock() = CaptureState::Idle;
                error!(error = %err, "failed to start packet capture");
                Err(err)
            }
        }
    }

    fn spawn_capture(&self) -> Result<JoinHandle<()>, NetworkError> {
        let devices = self.backend.devices();
        let device = find_device(&devices, self.interface.as_deref())?;
        let capture = self.backend.open(device, &self.settings)?;

        info!(
            device = %device,
            snapshot_len = self.settings.snapshot_len,
            promiscuous = self.settings.promiscuous,
            "starting packet capture"
        );

        self.shared.running.store(true, Ordering::Release);
        *self.shared.state.lock() = CaptureState::Capturing;

        let shared = Arc::clone(&self.shared);
        let pause = self.settings.read_timeout();
        std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || capture_loop(&shared, capture, pause))
            .map_err(NetworkError::Spawn)
    }

    /// Stop capturing and wait for the capture thread to exit.
    ///
    /// Safe to call when not capturing. Called from the capture thread itself
    /// (from a listener), it only asks the loop to end and returns at once;
    /// the engine turns idle when the loop exits.
    pub fn stop(&self) {
        if self.shared.on_capture_thread() {
            let mut state = self.shared.state.lock();
            if *state == CaptureState::Capturing {
                *state = CaptureState::Stopping;
            }
            self.shared.running.store(false, Ordering::Release);
            debug!("stop requested from capture thread");
            return;
        }

        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return;
        };

        *self.shared.state.lock() = CaptureState::Stopping;
        self.shared.running.store(false, Ordering::Release);

        if handle.join().is_err() {
            error!("capture thread panicked");
        }

        *self.shared.state.lock() = CaptureState::Idle;
        info!(packets = self.packets_seen(), "packet capture stopped");
    }

    /// Attach `listener`, replacing any previous one.
    pub fn set_listener(&self, listener: impl PacketListener) {
        *self.shared.listener.write() = Some(Arc::new(listener));
    }

    /// Detach the current listener. Later packets are dropped.
    pub fn clear_listener(&self) {
        *self.shared.listener.write() = None;
    }

    /// The next classified packet gets sequence 1.
    pub fn reset_sequence_counter(&self) {
        self.shared.sequence.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn state(&self) -> CaptureState {
        *self.shared.state.lock()
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.state() == CaptureState::Capturing
    }

    /// IPv4 frames classified since the engine was created.
    #[must_use]
    pub fn packets_seen(&self) -> u64 {
        self.shared.packets_seen.load(Ordering::Relaxed)
    }
}

impl<B: CaptureBackend> Drop for PacketCaptureEngine<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
