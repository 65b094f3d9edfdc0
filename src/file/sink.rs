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
use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crossbeam_channel::Receiver;
use jiff::Timestamp;
use log::Level;
use log::LevelFilter;

use crate::DirName;
use crate::Error;
use crate::ErrorKind;
use crate::ExitCode;
use crate::Identity;
use crate::Layout;
use crate::Sink;
use crate::file::FileSinkBuilder;
use crate::file::clock::Clock;
use crate::file::rotation::create;
use crate::file::rotation::update_symlink;
use crate::gc::GcCleanup;
use crate::gc::GcNotify;
use crate::gc::temporarily_disable_gc;
use crate::layout::Entry;
use crate::stall::StallGuard;
use crate::stderr;
use crate::stderr::SinkId;
use crate::stderr::StderrRedirect;
use crate::stderr::report;

const BUFFER_SIZE: usize = 256 * 1024;

static SYNC_ALL_WRITES: AtomicBool = AtomicBool::new(false);

/// Make every write of every sink flush and sync, as if each sink had been built with
/// [`FileSinkBuilder::sync_writes`].
pub fn set_sync_all_writes(sync: bool) {
    SYNC_ALL_WRITES.store(sync, Ordering::Relaxed);
}

/// Whether [`set_sync_all_writes`] is in effect.
pub fn sync_all_writes() -> bool {
    SYNC_ALL_WRITES.load(Ordering::Relaxed)
}

pub(crate) type StartLines = Box<dyn Fn(Timestamp) -> Vec<Entry> + Send + Sync>;

/// A sink writing to rotating log files in one directory.
///
/// Files are opened lazily on the first write after the sink is enabled, rotated once they
/// reach the configured size, and closed when the directory changes. Every new file starts
/// with the entries of the start-lines callback and signals the GC daemon.
///
/// All I/O of one sink is serialized by a mutex. Flushes and syncs run under a [`StallGuard`].
pub struct FileSink {
    id: SinkId,

    // Lock-free. Only written while `state` is locked; `enabled` implies `log_dir` is set.
    enabled: AtomicBool,
    file_max_size: AtomicU64,
    // Shared with GC throttle cleanups.
    combined_max_size: Arc<AtomicU64>,

    // Immutable after construction.
    prefix: String,
    sync_writes: bool,
    threshold: LevelFilter,
    layout: Box<dyn Layout>,
    gc_notify: GcNotify,
    start_lines: StartLines,
    identity: Identity,
    clock: Clock,
    stall_guard: Arc<StallGuard>,
    redirect: Box<dyn StderrRedirect>,

    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    // A test harness may swap the directory while other threads log.
    log_dir: Option<PathBuf>,
    file: Option<SyncBuffer>,
    last_rotation: i64,
    // The configured intent to capture fd 2. At most one sink process-wide has it set.
    redirect_internal_stderr_writes: bool,
    // Whether fd 2 points at `file` right now. False while no file is open, even with intent.
    currently_owns_internal_stderr: bool,
}

#[derive(Debug)]
struct SyncBuffer {
    writer: BufWriter<File>,
    path: PathBuf,
    nbytes: u64,
}

impl SyncBuffer {
    fn file(&self) -> &File {
        self.writer.get_ref()
    }

    /// Flush what is buffered, then close the file without retrying a failed flush.
    fn close(mut self, stall_guard: &StallGuard) -> io::Result<()> {
        let flushed = stall_guard.run(|| self.writer.flush());
        let (file, _unflushed) = self.writer.into_parts();
        drop(file);
        flushed
    }
}

impl fmt::Debug for FileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSink")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .field("prefix", &self.prefix)
            .field("sync_writes", &self.sync_writes)
            .field("threshold", &self.threshold)
            .field("file_max_size", &self.file_max_size)
            .field("combined_max_size", &self.combined_max_size)
            .field("layout", &self.layout)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

pub(crate) struct FileSinkParts {
    pub(crate) dir: DirName,
    pub(crate) prefix: String,
    pub(crate) sync_writes: bool,
    pub(crate) threshold: LevelFilter,
    pub(crate) file_max_size: u64,
    pub(crate) combined_max_size: u64,
    pub(crate) layout: Box<dyn Layout>,
    pub(crate) start_lines: StartLines,
    pub(crate) identity: Identity,
    pub(crate) clock: Clock,
    pub(crate) stall_guard: Arc<StallGuard>,
    pub(crate) redirect: Box<dyn StderrRedirect>,
}

impl FileSink {
    /// Create a new [`FileSinkBuilder`].
    pub fn builder(identity: Identity) -> FileSinkBuilder {
        FileSinkBuilder::new(identity)
    }

    pub(crate) fn from_parts(parts: FileSinkParts) -> Self {
        let log_dir = parts.dir.into_path();
        Self {
            id: SinkId::next(),
            enabled: AtomicBool::new(log_dir.is_some()),
            file_max_size: AtomicU64::new(parts.file_max_size),
            combined_max_size: Arc::new(AtomicU64::new(parts.combined_max_size)),
            prefix: parts.prefix,
            sync_writes: parts.sync_writes,
            threshold: parts.threshold,
            layout: parts.layout,
            gc_notify: GcNotify::default(),
            start_lines: parts.start_lines,
            identity: parts.identity,
            clock: parts.clock,
            stall_guard: parts.stall_guard,
            redirect: parts.redirect,
            state: Mutex::new(State {
                log_dir,
                file: None,
                last_rotation: 0,
                redirect_internal_stderr_writes: false,
                currently_owns_internal_stderr: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The process-unique id of this sink.
    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Whether the sink has a directory and accepts writes.
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// The file name prefix: the program name, plus the configured suffix if any.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The least severe level accepted by the sink.
    pub fn threshold(&self) -> LevelFilter {
        self.threshold
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// The current log directory.
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.state().log_dir.clone()
    }

    /// The path of the currently open log file, if any.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.state().file.as_ref().map(|file| file.path.clone())
    }

    /// The size at which a log file is rotated.
    pub fn log_file_max_size(&self) -> u64 {
        self.file_max_size.load(Ordering::Relaxed)
    }

    /// The total size budget across this sink's files, as enforced by the GC daemon.
    pub fn log_files_combined_max_size(&self) -> u64 {
        self.combined_max_size.load(Ordering::SeqCst)
    }

    pub(crate) fn combined_max_size_handle(&self) -> Arc<AtomicU64> {
        self.combined_max_size.clone()
    }

    /// A receiver signalled whenever a new log file is created.
    pub fn gc_notifications(&self) -> Receiver<()> {
        self.gc_notify.subscribe()
    }

    /// Lift the combined size budget until the returned cleanup runs.
    ///
    /// See [`temporarily_disable_gc`] for the single-caller contract.
    pub fn temporarily_disable_gc(&self) -> GcCleanup {
        temporarily_disable_gc(Some(self))
    }

    /// Whether this sink is configured to capture the standard error stream.
    pub fn redirects_internal_stderr(&self) -> bool {
        self.state().redirect_internal_stderr_writes
    }

    /// Whether the standard error stream currently points at this sink's open file.
    pub fn currently_owns_internal_stderr(&self) -> bool {
        self.state().currently_owns_internal_stderr
    }

    /// Switch to another directory, or disable the sink with an unset [`DirName`].
    ///
    /// The current file is flushed and closed; the next write opens a file in the new
    /// directory. The directory is switched even if closing the old file fails.
    pub fn set_dir(&self, dir: DirName) -> Result<(), Error> {
        let mut guard = self.state();
        let state = &mut *guard;
        let closed = self.close_file_locked(state);
        match dir.into_path() {
            Some(dir) => {
                state.log_dir = Some(dir);
                self.enabled.store(true, Ordering::SeqCst);
            }
            None => {
                self.enabled.store(false, Ordering::SeqCst);
                state.log_dir = None;
            }
        }
        closed
    }

    /// Flush and close the current file. The next write opens a new one.
    pub fn close(&self) -> Result<(), Error> {
        let mut guard = self.state();
        self.close_file_locked(&mut guard)
    }

    /// Capture the standard error stream into this sink's files.
    ///
    /// If a file is open the stream is redirected right away, otherwise when the next file is
    /// opened.
    ///
    /// # Errors
    ///
    /// Return [`ErrorKind::StderrAlreadyRedirected`] if another sink captures the stream, or an
    /// error if the open file cannot be made the target of the stream. In the latter case the
    /// sink does not keep the capture registered.
    ///
    /// A failed redirect when a later file is opened is only reported; the file is used anyway.
    pub fn take_over_internal_stderr(&self) -> Result<(), Error> {
        let mut guard = self.state();
        let state = &mut *guard;
        stderr::acquire(self.id)?;

        let had_intent = std::mem::replace(&mut state.redirect_internal_stderr_writes, true);
        if let Some(file) = &state.file {
            if !state.currently_owns_internal_stderr {
                if let Err(err) = self.redirect.redirect(file.file()) {
                    if !had_intent {
                        state.redirect_internal_stderr_writes = false;
                        stderr::release(self.id);
                    }
                    return Err(Error::new(
                        ErrorKind::Unexpected,
                        "failed to redirect stderr to log file",
                    )
                    .with_context("path", file.path.display())
                    .with_source(err));
                }
                state.currently_owns_internal_stderr = true;
            }
        }
        Ok(())
    }

    /// Give the standard error stream back and let another sink capture it.
    pub fn relinquish_internal_stderr(&self) -> Result<(), Error> {
        let mut guard = self.state();
        let state = &mut *guard;
        let restored = self.restore_stderr_locked(state);
        state.redirect_internal_stderr_writes = false;
        drop(guard);

        stderr::release(self.id);
        restored
    }

    /// Flush the current file, and sync it if `do_sync` is set.
    pub fn lock_and_flush_and_sync(&self, do_sync: bool) {
        let mut guard = self.state();
        self.flush_and_sync_locked(&mut guard, do_sync);
    }

    fn restore_stderr_locked(&self, state: &mut State) -> Result<(), Error> {
        if !state.currently_owns_internal_stderr {
            return Ok(());
        }
        state.currently_owns_internal_stderr = false;
        self.redirect.restore().map_err(|err| {
            Error::new(ErrorKind::Unexpected, "failed to restore stderr").with_source(err)
        })
    }

    fn close_file_locked(&self, state: &mut State) -> Result<(), Error> {
        let Some(file) = state.file.take() else {
            return Ok(());
        };
        let restored = self.restore_stderr_locked(state);
        let closed = file.close(&self.stall_guard).map_err(Error::from_io_error);
        restored.and(closed)
    }

    fn flush_and_sync_locked(&self, state: &mut State, do_sync: bool) {
        let Some(file) = state.file.as_mut() else {
            return;
        };

        let result = self.stall_guard.run(|| {
            file.writer.flush()?;
            if do_sync {
                file.file().sync_all()?;
            }
            Ok::<(), io::Error>(())
        });
        if let Err(err) = result {
            report(format_args!(
                "failed to flush log file {}: {err}",
                file.path.display()
            ));
        }
    }

    fn ensure_file_locked(&self, state: &mut State) -> Result<(), Error> {
        if state.file.is_none() {
            self.rotate_file_locked(state, self.clock.now())?;
        }
        Ok(())
    }

    fn write_to_file_locked(&self, state: &mut State, data: &[u8]) -> Result<(), Error> {
        let max_size = self.log_file_max_size();
        let full = state
            .file
            .as_ref()
            .is_some_and(|file| file.nbytes + data.len() as u64 >= max_size);
        if full {
            self.rotate_file_locked(state, self.clock.now())?;
        }

        let Some(file) = state.file.as_mut() else {
            return Err(Error::new(ErrorKind::Unexpected, "no log file open"));
        };
        file.writer.write_all(data).map_err(Error::from_io_error)?;
        file.nbytes += data.len() as u64;
        Ok(())
    }

    fn rotate_file_locked(&self, state: &mut State, now: Timestamp) -> Result<(), Error> {
        let opened = self.open_file_locked(state, now);
        if opened.is_err() {
            // fd 2 may still point at the closed previous file
            if let Err(err) = self.restore_stderr_locked(state) {
                report(format_args!("{err}"));
            }
        }
        opened
    }

    fn open_file_locked(&self, state: &mut State, now: Timestamp) -> Result<(), Error> {
        if let Some(old) = state.file.take() {
            if let Err(err) = old.close(&self.stall_guard) {
                report(format_args!("failed to close rotated log file: {err}"));
            }
        }

        let dir = state.log_dir.as_deref().unwrap_or(Path::new(""));
        let created = create(dir, &self.prefix, &self.identity, now, state.last_rotation)?;
        state.last_rotation = created.last_rotation;
        update_symlink(&created.path, &created.symlink);

        let mut file = created.file;
        let mut nbytes = 0;
        for entry in (self.start_lines)(now) {
            let mut bytes = match self.layout.format(&entry) {
                Ok(bytes) => bytes,
                Err(err) => {
                    report(format_args!("failed to format log file header: {err}"));
                    continue;
                }
            };
            bytes.push(b'\n');
            file.write_all(&bytes).map_err(Error::from_io_error)?;
            nbytes += bytes.len() as u64;
        }

        // Capturing stderr is best effort; logging goes on into the new file either way.
        if state.redirect_internal_stderr_writes {
            match self.redirect.redirect(&file) {
                Ok(()) => state.currently_owns_internal_stderr = true,
                Err(err) => {
                    report(format_args!(
                        "failed to redirect stderr to {}: {err}",
                        created.path.display()
                    ));
                    if let Err(err) = self.restore_stderr_locked(state) {
                        report(format_args!("{err}"));
                    }
                }
            }
        }

        state.file = Some(SyncBuffer {
            writer: BufWriter::with_capacity(BUFFER_SIZE, file),
            path: created.path,
            nbytes,
        });
        self.gc_notify.post();
        Ok(())
    }
}

impl Sink for FileSink {
    fn active_at_severity(&self, level: Level) -> bool {
        self.enabled() && level <= self.threshold
    }

    fn layout(&self) -> &dyn Layout {
        self.layout.as_ref()
    }

    fn output(&self, extra_sync: bool, bytes: &[u8]) -> Result<(), Error> {
        if !self.enabled() {
            return Ok(());
        }

        let mut guard = self.state();
        let state = &mut *guard;
        // the sink may have been disabled while we waited for the lock
        if !self.enabled() {
            return Ok(());
        }

        self.ensure_file_locked(state)?;
        self.write_to_file_locked(state, bytes)?;

        if extra_sync || self.sync_writes || sync_all_writes() {
            self.flush_and_sync_locked(state, true);
        }
        Ok(())
    }

    fn emergency_output(&self, bytes: &[u8]) {
        let mut guard = self.state();
        let state = &mut *guard;

        if self.ensure_file_locked(state).is_err() {
            return;
        }
        if self.write_to_file_locked(state, bytes).is_err() {
            return;
        }

        // Get the data to the OS, but trying hard to sync could stall a dying process.
        self.flush_and_sync_locked(state, false);
    }

    fn attach_hints(&self, mut stacks: Vec<u8>) -> Vec<u8> {
        let state = self.state();
        let dir = state
            .log_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        stacks.extend_from_slice(
            format!("\nFor more context, check log files in: {dir}\n").as_bytes(),
        );
        stacks
    }

    fn exit_code(&self) -> ExitCode {
        ExitCode::LOGGING_FILE_UNAVAILABLE
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = state.file.as_mut() {
            let _ = file.writer.flush();
        }
        if state.currently_owns_internal_stderr {
            let _ = self.redirect.restore();
        }
        if state.redirect_internal_stderr_writes {
            stderr::release(self.id);
        }
    }
}
