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

//! Signals to, and throttling of, the garbage collector of old log files.
//!
//! This crate never deletes log files itself. A GC daemon subscribes to a sink's
//! [`GcNotify`] mailbox and, on every signal, trims the files listed by
//! [`list_log_files`](crate::list_log_files) down to the sink's combined size budget.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;

use crate::FileSink;

/// A one-slot mailbox telling the GC daemon that a new log file was created.
///
/// Posting never blocks: if a signal is already pending the new one is dropped, since the daemon
/// re-evaluates the whole directory anyway.
#[derive(Debug, Clone)]
pub struct GcNotify {
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl Default for GcNotify {
    fn default() -> Self {
        let (sender, receiver) = bounded(1);
        Self { sender, receiver }
    }
}

impl GcNotify {
    /// Post a signal, dropping it if one is already pending.
    pub fn post(&self) {
        let _ = self.sender.try_send(());
    }

    /// A receiver for the GC daemon.
    pub fn subscribe(&self) -> Receiver<()> {
        self.receiver.clone()
    }
}

/// Temporarily lift the combined size budget of `sink`, so no old file looks collectable.
///
/// Returns a no-op cleanup if the sink is absent or disabled.
///
/// Callers must not overlap: two disable/restore pairs in flight at once on the same sink leave
/// the budget in an unspecified state.
pub fn temporarily_disable_gc(sink: Option<&FileSink>) -> GcCleanup {
    match sink {
        Some(sink) if sink.enabled() => GcCleanup::disable(sink.combined_max_size_handle()),
        _ => GcCleanup { restore: None },
    }
}

/// Restores the combined size budget lifted by [`temporarily_disable_gc`].
///
/// Restoring is idempotent, and also happens when the cleanup is dropped.
#[derive(Debug)]
#[must_use = "the size budget is restored as soon as the cleanup is dropped"]
pub struct GcCleanup {
    restore: Option<(Arc<AtomicU64>, u64)>,
}

impl GcCleanup {
    fn disable(budget: Arc<AtomicU64>) -> Self {
        let old = budget.load(Ordering::SeqCst);
        let _ = budget.compare_exchange(old, u64::MAX, Ordering::SeqCst, Ordering::SeqCst);
        Self {
            restore: Some((budget, old)),
        }
    }

    /// Put the previous budget back, unless someone else changed it meanwhile.
    pub fn restore(&self) {
        if let Some((budget, old)) = &self.restore {
            let _ = budget.compare_exchange(u64::MAX, *old, Ordering::SeqCst, Ordering::SeqCst);
        }
    }
}

impl Drop for GcCleanup {
    fn drop(&mut self) {
        self.restore();
    }
}
