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

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::Error;
use crate::ErrorKind;

/// A process-unique identifier of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

impl SinkId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SinkId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink#{}", self.0)
    }
}

// At most one sink process-wide may capture the standard error stream.
static OWNER: Mutex<Option<SinkId>> = Mutex::new(None);

/// The sink that is configured to capture the standard error stream, if any.
pub fn current_owner() -> Option<SinkId> {
    *OWNER.lock().unwrap_or_else(|e| e.into_inner())
}

/// Register `id` as the owner. Re-acquiring by the current owner is a no-op.
pub(crate) fn acquire(id: SinkId) -> Result<(), Error> {
    let mut owner = OWNER.lock().unwrap_or_else(|e| e.into_inner());
    match *owner {
        Some(other) if other != id => Err(Error::new(
            ErrorKind::StderrAlreadyRedirected,
            "stderr is already redirected by another sink",
        )
        .with_context("owner", other)
        .with_context("requester", id)),
        _ => {
            *owner = Some(id);
            Ok(())
        }
    }
}

/// Unregister `id`. Releasing a slot owned by another sink is a no-op.
pub(crate) fn release(id: SinkId) {
    let mut owner = OWNER.lock().unwrap_or_else(|e| e.into_inner());
    if *owner == Some(id) {
        *owner = None;
    }
}

/// Serializes tests that touch the process-wide owner.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_most_one_owner() {
        let _lock = test_lock();
        let a = SinkId::next();
        let b = SinkId::next();

        acquire(a).unwrap();
        acquire(a).unwrap();
        let err = acquire(b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StderrAlreadyRedirected);
        assert_eq!(current_owner(), Some(a));

        release(b);
        assert_eq!(current_owner(), Some(a));
        release(a);
        assert_eq!(current_owner(), None);

        acquire(b).unwrap();
        release(b);
    }
}
