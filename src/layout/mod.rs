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

//! Layouts for rendering log entries into bytes.

use std::fmt;

use jiff::Timestamp;
use log::Level;

pub use self::text::TextLayout;
#[cfg(feature = "layout-json")]
pub use self::json::JsonLayout;

use crate::Error;

#[cfg(feature = "layout-json")]
mod json;
mod text;

/// A structured log entry, as handed to a [`Layout`].
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Severity of the entry.
    pub level: Level,
    /// When the entry was produced.
    pub time: Timestamp,
    /// The target, usually the module path of the caller.
    pub target: String,
    /// Source file of the caller, if known.
    pub file: Option<String>,
    /// Source line of the caller, if known.
    pub line: Option<u32>,
    /// The rendered message.
    pub message: String,
    /// Structured key-value pairs attached to the entry.
    pub kvs: Vec<(String, String)>,
}

impl Entry {
    /// Create an entry with no source location and no key-value pairs.
    pub fn new(level: Level, time: Timestamp, message: impl Into<String>) -> Self {
        Self {
            level,
            time,
            target: String::new(),
            file: None,
            line: None,
            message: message.into(),
            kvs: vec![],
        }
    }

    /// Set the target of this entry.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

/// A layout renders an [`Entry`] into bytes.
///
/// The rendered bytes must not end with a newline; the sink terminates every entry itself.
pub trait Layout: fmt::Debug + Send + Sync + 'static {
    /// Render the entry.
    fn format(&self, entry: &Entry) -> Result<Vec<u8>, Error>;
}

impl<T: Layout> From<T> for Box<dyn Layout> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}
