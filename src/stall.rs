// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Disk stall detection for blocking flush and sync calls.
//!
//! Every guarded call is timed by a background watchdog thread. When the call is still running
//! after the warning deadline the [`StallHandler`] is told the disk is slow; after the fatal
//! deadline it is told the disk stalled, which by default terminates the process.

use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::Sender;
use crossbeam_channel::unbounded;
use jiff::Timestamp;

use crate::Error;
use crate::ErrorKind;
use crate::ExitCode;
use crate::stderr::orig_stderr;

/// Default duration after which a slow flush or sync is reported.
pub const DEFAULT_SYNC_WARN_DURATION: Duration = Duration::from_secs(10);

/// Default duration after which a flush or sync is considered stalled.
pub const DEFAULT_MAX_SYNC_DURATION: Duration = Duration::from_secs(20);

/// Reacts to slow or stalled guarded calls.
///
/// Handlers run on the watchdog thread while the guarded call is still blocked, possibly with
/// a sink's lock held. They must not log through a sink that may be the one stalling.
pub trait StallHandler: fmt::Debug + Send + Sync + 'static {
    /// The guarded call did not return within `limit`.
    fn on_slow(&self, limit: Duration);

    /// The guarded call did not return within `limit`; the storage is considered hung.
    fn on_stall(&self, limit: Duration);
}

/// The default [`StallHandler`]: report on the original standard error stream, and terminate
/// the process once a stall is detected.
#[derive(Debug, Clone)]
pub struct ExitOnStall {
    exit_code: ExitCode,
}

impl Default for ExitOnStall {
    fn default() -> Self {
        Self {
            exit_code: ExitCode::LOGGING_FILE_UNAVAILABLE,
        }
    }
}

impl StallHandler for ExitOnStall {
    fn on_slow(&self, limit: Duration) {
        let now = Timestamp::now().strftime("%Y-%m-%dT%H:%M:%S.%6fZ");
        orig_stderr().write_line(format_args!(
            "{now}  WARN disk slowness detected: unable to sync log files within {limit:?}"
        ));
    }

    fn on_stall(&self, limit: Duration) {
        let now = Timestamp::now().strftime("%Y-%m-%dT%H:%M:%S.%6fZ");
        orig_stderr().write_line(format_args!(
            "{now} FATAL disk stall detected: unable to sync log files within {limit:?}"
        ));
        self.exit_code.exit()
    }
}

enum Command {
    Arm { id: u64, started: Instant },
    Disarm { id: u64 },
}

/// Times blocking calls against a warning and a fatal deadline.
#[derive(Debug)]
pub struct StallGuard {
    sender: Sender<Command>,
    next_id: AtomicU64,
    warn_after: Duration,
    fatal_after: Duration,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Arm { id, .. } => write!(f, "Arm({id})"),
            Command::Disarm { id } => write!(f, "Disarm({id})"),
        }
    }
}

impl StallGuard {
    /// Create a guard with its own watchdog thread.
    ///
    /// # Errors
    ///
    /// Return an error if `fatal_after` is not strictly greater than `warn_after`, or if the
    /// watchdog thread cannot be spawned.
    pub fn new(
        warn_after: Duration,
        fatal_after: Duration,
        handler: impl StallHandler,
    ) -> Result<Self, Error> {
        if fatal_after <= warn_after {
            return Err(Error::new(
                ErrorKind::InvalidConfig,
                "fatal sync deadline must be greater than the warning deadline",
            )
            .with_context("warn_after", format!("{warn_after:?}"))
            .with_context("fatal_after", format!("{fatal_after:?}")));
        }

        let (sender, receiver) = unbounded();
        let watchdog = Watchdog {
            receiver,
            warn_after,
            fatal_after,
            handler: Arc::new(handler),
            pending: vec![],
        };
        std::thread::Builder::new()
            .name("logforth-stall-watchdog".to_string())
            .spawn(move || watchdog.run())
            .map_err(|err| {
                Error::new(ErrorKind::Unexpected, "failed to spawn stall watchdog thread")
                    .with_source(err)
            })?;

        Ok(Self {
            sender,
            next_id: AtomicU64::new(0),
            warn_after,
            fatal_after,
        })
    }

    /// The process-wide guard with default deadlines and [`ExitOnStall`].
    pub fn shared() -> Result<Arc<StallGuard>, Error> {
        static SHARED: OnceLock<Arc<StallGuard>> = OnceLock::new();

        if let Some(guard) = SHARED.get() {
            return Ok(guard.clone());
        }
        let guard = StallGuard::new(
            DEFAULT_SYNC_WARN_DURATION,
            DEFAULT_MAX_SYNC_DURATION,
            ExitOnStall::default(),
        )?;
        Ok(SHARED.get_or_init(|| Arc::new(guard)).clone())
    }

    /// The warning deadline.
    pub fn warn_after(&self) -> Duration {
        self.warn_after
    }

    /// The fatal deadline.
    pub fn fatal_after(&self) -> Duration {
        self.fatal_after
    }

    /// Start timing. The deadlines are cancelled when the returned value is dropped.
    pub fn arm(&self) -> Armed<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        // the watchdog only exits once every sender is gone
        let _ = self.sender.send(Command::Arm { id, started });
        Armed { guard: self, id }
    }

    /// Run `f` with both deadlines armed.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _armed = self.arm();
        f()
    }
}

/// An armed guarded call. Dropping it cancels both deadlines.
#[derive(Debug)]
#[must_use = "deadlines are cancelled as soon as this value is dropped"]
pub struct Armed<'a> {
    guard: &'a StallGuard,
    id: u64,
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        let _ = self.guard.sender.send(Command::Disarm { id: self.id });
    }
}

struct Pending {
    id: u64,
    started: Instant,
    warned: bool,
}

struct Watchdog {
    receiver: Receiver<Command>,
    warn_after: Duration,
    fatal_after: Duration,
    handler: Arc<dyn StallHandler>,
    pending: Vec<Pending>,
}

impl Watchdog {
    fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .iter()
            .map(|p| {
                if p.warned {
                    p.started + self.fatal_after
                } else {
                    p.started + self.warn_after
                }
            })
            .min()
    }

    fn run(mut self) {
        loop {
            let command = match self.next_deadline() {
                Some(deadline) => match self.receiver.recv_deadline(deadline) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.receiver.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };

            match command {
                Some(Command::Arm { id, started }) => self.pending.push(Pending {
                    id,
                    started,
                    warned: false,
                }),
                Some(Command::Disarm { id }) => self.pending.retain(|p| p.id != id),
                None => {}
            }

            self.fire(Instant::now());
        }
    }

    fn fire(&mut self, now: Instant) {
        let warn_after = self.warn_after;
        let fatal_after = self.fatal_after;
        let handler = &self.handler;
        self.pending.retain_mut(|p| {
            if !p.warned && now >= p.started + warn_after {
                p.warned = true;
                handler.on_slow(warn_after);
            }
            if p.warned && now >= p.started + fatal_after {
                handler.on_stall(fatal_after);
                return false;
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use std::panic;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use super::*;

    #[derive(Debug, Default)]
    struct Counting {
        slow: AtomicUsize,
        stalled: AtomicUsize,
    }

    impl StallHandler for Arc<Counting> {
        fn on_slow(&self, _: Duration) {
            self.slow.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stall(&self, _: Duration) {
            self.stalled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn guard() -> (StallGuard, Arc<Counting>) {
        let counting = Arc::new(Counting::default());
        let guard = StallGuard::new(
            Duration::from_millis(50),
            Duration::from_millis(300),
            counting.clone(),
        )
        .unwrap();
        (guard, counting)
    }

    #[test]
    fn test_rejects_inverted_deadlines() {
        let err = StallGuard::new(
            Duration::from_secs(2),
            Duration::from_secs(2),
            ExitOnStall::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_fast_call_fires_nothing() {
        let (guard, counting) = guard();
        assert_eq!(guard.run(|| 42), 42);
        thread::sleep(Duration::from_millis(400));
        assert_eq!(counting.slow.load(Ordering::SeqCst), 0);
        assert_eq!(counting.stalled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_slow_call_warns_once() {
        let (guard, counting) = guard();
        guard.run(|| thread::sleep(Duration::from_millis(150)));
        thread::sleep(Duration::from_millis(400));
        assert_eq!(counting.slow.load(Ordering::SeqCst), 1);
        assert_eq!(counting.stalled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stalled_call_is_fatal() {
        let (guard, counting) = guard();
        guard.run(|| thread::sleep(Duration::from_millis(600)));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(counting.slow.load(Ordering::SeqCst), 1);
        assert_eq!(counting.stalled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_call_disarms() {
        let (guard, counting) = guard();
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            guard.run::<()>(|| panic!("flush exploded"))
        }));
        assert!(result.is_err());
        thread::sleep(Duration::from_millis(400));
        assert_eq!(counting.slow.load(Ordering::SeqCst), 0);
        assert_eq!(counting.stalled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_overlapping_calls_are_tracked_separately() {
        let (guard, counting) = guard();
        let guard = Arc::new(guard);
        let slow = {
            let guard = guard.clone();
            thread::spawn(move || guard.run(|| thread::sleep(Duration::from_millis(150))))
        };
        guard.run(|| ());
        slow.join().unwrap();
        thread::sleep(Duration::from_millis(400));
        assert_eq!(counting.slow.load(Ordering::SeqCst), 1);
        assert_eq!(counting.stalled.load(Ordering::SeqCst), 0);
    }
}
