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
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use crate::Error;
use crate::ErrorKind;

/// A log directory setting.
///
/// An empty value means "no directory", which disables file logging. Non-empty values are
/// normalized to absolute paths. Values starting with `~` are rejected since no shell is around
/// to expand them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirName(Option<PathBuf>);

impl DirName {
    /// An unset directory.
    pub const fn unset() -> Self {
        DirName(None)
    }

    /// Replace the directory.
    pub fn set(&mut self, dir: &str) -> Result<(), Error> {
        if dir.starts_with('~') {
            return Err(Error::new(
                ErrorKind::InvalidConfig,
                "log directory cannot start with '~'",
            )
            .with_context("dir", dir));
        }

        if dir.is_empty() {
            self.0 = None;
            return Ok(());
        }

        let abs = std::path::absolute(dir).map_err(|err| {
            Error::new(ErrorKind::InvalidConfig, "failed to resolve log directory")
                .with_context("dir", dir)
                .with_source(err)
        })?;
        self.0 = Some(abs);
        Ok(())
    }

    /// Returns true iff the directory is set.
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// The configured directory, if any.
    pub fn get(&self) -> Option<&Path> {
        self.0.as_deref()
    }

    pub(crate) fn into_path(self) -> Option<PathBuf> {
        self.0
    }
}

impl FromStr for DirName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut dir = DirName::unset();
        dir.set(s)?;
        Ok(dir)
    }
}

impl fmt::Display for DirName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(dir) => write!(f, "{}", dir.display()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_tilde() {
        let err = "~/logs".parse::<DirName>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_normalizes_to_absolute() {
        let dir = "logs/x".parse::<DirName>().unwrap();
        let path = dir.get().unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("logs/x"));
    }

    #[test]
    fn test_empty_unsets() {
        let mut dir = "/var/log/x".parse::<DirName>().unwrap();
        assert!(dir.is_set());
        assert_eq!(dir.to_string(), "/var/log/x");

        dir.set("").unwrap();
        assert!(!dir.is_set());
        assert_eq!(dir.to_string(), "");
    }
}
