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

//! The process standard error stream: a raw side channel for the sink's own diagnostics, and the
//! bookkeeping that lets at most one sink capture file descriptor 2.

use std::fmt;
use std::fs::File;
use std::io;
use std::io::Write;
use std::sync::OnceLock;

pub use self::redirect::FdRedirect;
pub use self::redirect::StderrRedirect;
pub use self::registry::SinkId;
pub use self::registry::current_owner;

pub(crate) use self::registry::acquire;
pub(crate) use self::registry::release;
#[cfg(test)]
pub(crate) use self::registry::test_lock;

mod redirect;
mod registry;

/// The standard error stream as it was before any sink took it over.
///
/// Writes go to a duplicate of file descriptor 2 taken the first time this stream is used, so
/// they stay visible on the terminal (or wherever fd 2 originally pointed) even while a sink
/// owns fd 2. Every write is unbuffered and errors are ignored.
#[derive(Debug)]
pub struct OrigStderr {
    file: Option<File>,
}

static ORIG_STDERR: OnceLock<OrigStderr> = OnceLock::new();

/// Return the original standard error stream.
pub fn orig_stderr() -> &'static OrigStderr {
    ORIG_STDERR.get_or_init(OrigStderr::capture)
}

/// Report a best-effort diagnostic on the original standard error stream.
pub fn report(args: fmt::Arguments) {
    orig_stderr().write_line(format_args!("log: {args}"));
}

impl OrigStderr {
    #[cfg(unix)]
    fn capture() -> Self {
        use std::os::fd::FromRawFd;

        let fd = unsafe { libc::fcntl(libc::STDERR_FILENO, libc::F_DUPFD_CLOEXEC, 0) };
        let file = (fd >= 0).then(|| unsafe { File::from_raw_fd(fd) });
        OrigStderr { file }
    }

    #[cfg(not(unix))]
    fn capture() -> Self {
        OrigStderr { file: None }
    }

    /// Write one line, appending the newline.
    pub fn write_line(&self, args: fmt::Arguments) {
        let line = format!("{args}\n");
        match &self.file {
            Some(file) => {
                let mut file: &File = file;
                let _ = file.write_all(line.as_bytes());
            }
            None => {
                let _ = io::stderr().write_all(line.as_bytes());
            }
        }
    }

    #[cfg(unix)]
    pub(crate) fn raw_fd(&self) -> Option<std::os::fd::RawFd> {
        use std::os::fd::AsRawFd;

        self.file.as_ref().map(|file| file.as_raw_fd())
    }
}
