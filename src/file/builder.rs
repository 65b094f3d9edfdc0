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
use std::sync::Arc;

use jiff::Timestamp;
use log::LevelFilter;

use crate::DirName;
use crate::Error;
use crate::FileSink;
use crate::Identity;
use crate::Layout;
use crate::file::clock::Clock;
use crate::file::sink::FileSinkParts;
use crate::file::sink::StartLines;
use crate::layout::Entry;
use crate::layout::TextLayout;
use crate::stall::StallGuard;
use crate::stderr::FdRedirect;
use crate::stderr::StderrRedirect;

/// Default size at which a log file is rotated: 10 MiB.
pub const DEFAULT_FILE_MAX_SIZE: u64 = 10 << 20;

/// Default combined size budget across one sink's files: 100 MiB.
pub const DEFAULT_COMBINED_MAX_SIZE: u64 = 100 << 20;

/// A builder to configure and create a [`FileSink`].
pub struct FileSinkBuilder {
    identity: Identity,
    dir: DirName,
    file_name_suffix: Option<String>,
    sync_writes: bool,
    threshold: LevelFilter,
    file_max_size: u64,
    combined_max_size: u64,
    layout: Box<dyn Layout>,
    start_lines: StartLines,
    stall_guard: Option<Arc<StallGuard>>,
    redirect: Box<dyn StderrRedirect>,
    clock: Clock,
}

impl fmt::Debug for FileSinkBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSinkBuilder")
            .field("identity", &self.identity)
            .field("dir", &self.dir)
            .field("file_name_suffix", &self.file_name_suffix)
            .field("sync_writes", &self.sync_writes)
            .field("threshold", &self.threshold)
            .field("file_max_size", &self.file_max_size)
            .field("combined_max_size", &self.combined_max_size)
            .field("layout", &self.layout)
            .field("stall_guard", &self.stall_guard)
            .field("redirect", &self.redirect)
            .finish_non_exhaustive()
    }
}

impl FileSinkBuilder {
    /// Create a new file sink builder.
    ///
    /// The sink starts disabled unless a directory is set.
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            dir: DirName::unset(),
            file_name_suffix: None,
            sync_writes: false,
            threshold: LevelFilter::Info,
            file_max_size: DEFAULT_FILE_MAX_SIZE,
            combined_max_size: DEFAULT_COMBINED_MAX_SIZE,
            layout: Box::new(TextLayout::default()),
            start_lines: Box::new(|_| vec![]),
            stall_guard: None,
            redirect: Box::new(FdRedirect::default()),
            clock: Clock::DefaultClock,
        }
    }

    /// Build the [`FileSink`].
    ///
    /// No file is created until the first write.
    ///
    /// # Errors
    ///
    /// Return an error if no stall guard was given and the shared one cannot be started.
    pub fn build(self) -> Result<FileSink, Error> {
        let FileSinkBuilder {
            identity,
            dir,
            file_name_suffix,
            sync_writes,
            threshold,
            file_max_size,
            combined_max_size,
            layout,
            start_lines,
            stall_guard,
            redirect,
            clock,
        } = self;

        let stall_guard = match stall_guard {
            Some(guard) => guard,
            None => StallGuard::shared()?,
        };
        let prefix = match file_name_suffix {
            Some(suffix) => format!("{}-{suffix}", identity.program()),
            None => identity.program().to_string(),
        };

        Ok(FileSink::from_parts(FileSinkParts {
            dir,
            prefix,
            sync_writes,
            threshold,
            file_max_size,
            combined_max_size,
            layout,
            start_lines,
            identity,
            clock,
            stall_guard,
            redirect,
        }))
    }

    /// Set the log directory. An unset directory leaves the sink disabled.
    pub fn dir(mut self, dir: DirName) -> Self {
        self.dir = dir;
        self
    }

    /// Set the suffix appended to the program name to form the file name prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use logforth_filesink::FileSink;
    /// use logforth_filesink::Identity;
    ///
    /// let identity = Identity::new(4242, "cockpit", "db7", "root");
    /// let sink = FileSink::builder(identity)
    ///     .file_name_suffix("audit")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(sink.prefix(), "cockpit-audit");
    /// ```
    pub fn file_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        self.file_name_suffix = if suffix.is_empty() {
            None
        } else {
            Some(suffix)
        };
        self
    }

    /// Flush and sync after every write.
    ///
    /// Default to `false`.
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Set the least severe level accepted by the sink.
    ///
    /// Default to [`LevelFilter::Info`].
    pub fn threshold(mut self, threshold: LevelFilter) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the size in bytes at which a log file is rotated.
    ///
    /// Default to [`DEFAULT_FILE_MAX_SIZE`].
    pub fn max_file_size(mut self, n: u64) -> Self {
        self.file_max_size = n;
        self
    }

    /// Set the total size budget in bytes across all files of the sink.
    ///
    /// The budget is only checked by the GC daemon after a new file was created, so the total
    /// size may temporarily exceed it by up to one file.
    ///
    /// Default to [`DEFAULT_COMBINED_MAX_SIZE`].
    pub fn combined_max_size(mut self, n: u64) -> Self {
        self.combined_max_size = n;
        self
    }

    /// Set the layout for the header entries and for records logged through the `log` crate.
    ///
    /// Default to [`TextLayout`].
    pub fn layout(mut self, layout: impl Into<Box<dyn Layout>>) -> Self {
        self.layout = layout.into();
        self
    }

    /// Set the callback producing the entries written at the start of every new file.
    ///
    /// The callback receives the time the file is created.
    pub fn start_lines(
        mut self,
        start_lines: impl Fn(Timestamp) -> Vec<Entry> + Send + Sync + 'static,
    ) -> Self {
        self.start_lines = Box::new(start_lines);
        self
    }

    /// Set the stall guard flushes and syncs run under.
    ///
    /// Default to [`StallGuard::shared`].
    pub fn stall_guard(mut self, guard: Arc<StallGuard>) -> Self {
        self.stall_guard = Some(guard);
        self
    }

    /// Set the mechanism used to capture the standard error stream.
    ///
    /// Default to [`FdRedirect`].
    pub fn stderr_redirect(mut self, redirect: impl StderrRedirect) -> Self {
        self.redirect = Box::new(redirect);
        self
    }

    #[cfg(test)]
    pub(crate) fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}
