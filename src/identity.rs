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

use std::env;
use std::path::Path;

const UNKNOWN_HOST: &str = "unknownhost";
const UNKNOWN_USER: &str = "unknownuser";

/// The identity of the running process, as encoded in log file names.
///
/// An identity is computed once while the process bootstraps, see [`Identity::detect`], and then
/// handed to every sink that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pid: u32,
    program: String,
    host: String,
    user: String,
}

impl Identity {
    /// Create an identity from explicit values.
    ///
    /// The host name is truncated at its first period and path separators in the user name are
    /// replaced with underscores.
    pub fn new(
        pid: u32,
        program: impl Into<String>,
        host: impl AsRef<str>,
        user: impl AsRef<str>,
    ) -> Self {
        Self {
            pid,
            program: program.into(),
            host: short_hostname(host.as_ref()).to_string(),
            user: sanitize_user(user.as_ref()),
        }
    }

    /// Detect the identity of the current process.
    pub fn detect() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|host| host.into_string().ok())
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| UNKNOWN_HOST.to_string());
        let user = os_user()
            .or_else(|| env::var("USER").ok())
            .or_else(|| env::var("USERNAME").ok())
            .filter(|user| !user.is_empty())
            .unwrap_or_else(|| UNKNOWN_USER.to_string());
        Self::new(std::process::id(), program_name(), host, user)
    }

    /// The process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The base name of the running program.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The short host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The sanitized user name.
    pub fn user(&self) -> &str {
        &self.user
    }
}

/// Returns its argument truncated at the first period, e.g. `www` for `www.google.com`.
fn short_hostname(hostname: &str) -> &str {
    match hostname.find('.') {
        Some(i) => &hostname[..i],
        None => hostname,
    }
}

fn sanitize_user(user: &str) -> String {
    user.replace(['\\', '/'], "_")
}

fn program_name() -> String {
    let base = |p: &Path| {
        p.file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
    };

    env::args_os()
        .next()
        .and_then(|arg0| base(Path::new(&arg0)))
        .or_else(|| env::current_exe().ok().and_then(|exe| base(&exe)))
        .unwrap_or_else(|| "unknown".to_string())
}

// The user database wins over the login environment.
#[cfg(unix)]
fn os_user() -> Option<String> {
    use nix::unistd::Uid;
    use nix::unistd::User;

    User::from_uid(Uid::effective())
        .ok()
        .flatten()
        .map(|user| user.name)
}

#[cfg(not(unix))]
fn os_user() -> Option<String> {
    None
}
