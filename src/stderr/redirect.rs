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

/// The mechanism that points the process standard error stream at a log file and back.
pub trait StderrRedirect: fmt::Debug + Send + Sync + 'static {
    /// Make writes to the standard error stream land in `target`.
    fn redirect(&self, target: &File) -> io::Result<()>;

    /// Point the standard error stream back to where it was originally.
    fn restore(&self) -> io::Result<()>;
}

/// Redirects file descriptor 2 itself, rather than a language-level handle.
///
/// Anything writing to fd 2 (panics, the C runtime, child libraries) is captured. Only
/// supported on Unix; elsewhere both operations fail with [`io::ErrorKind::Unsupported`].
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct FdRedirect {}

impl StderrRedirect for FdRedirect {
    fn redirect(&self, target: &File) -> io::Result<()> {
        sys::redirect(target)
    }

    fn restore(&self) -> io::Result<()> {
        sys::restore()
    }
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::fd::AsRawFd;
    use std::os::fd::RawFd;

    use crate::stderr::orig_stderr;

    pub(super) fn redirect(target: &File) -> io::Result<()> {
        // save the original fd 2 before it is overwritten
        let _ = orig_stderr();
        dup2(target.as_raw_fd(), libc::STDERR_FILENO)
    }

    pub(super) fn restore() -> io::Result<()> {
        match orig_stderr().raw_fd() {
            Some(fd) => dup2(fd, libc::STDERR_FILENO),
            None => Err(io::Error::other("original stderr is unavailable")),
        }
    }

    fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
        let rc = unsafe { libc::dup2(src, dst) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use std::fs::File;
    use std::io;

    pub(super) fn redirect(_: &File) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub(super) fn restore() -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}
