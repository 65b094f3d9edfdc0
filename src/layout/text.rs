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

use std::fmt::Write;

use crate::Error;
use crate::layout::Entry;
use crate::layout::Layout;

/// A layout that renders an entry as a single line of text.
///
/// Output format:
///
/// ```text
/// 2024-01-02T03:04:05.000000Z ERROR server::node: src/node.rs:51 Hello error! node=7
/// 2024-01-02T03:04:05.000120Z  WARN server::node: src/node.rs:52 Hello warn!
/// 2024-01-02T03:04:05.000193Z  INFO server::node: src/node.rs:53 Hello info!
/// ```
///
/// Timestamps are always rendered in UTC, matching the timestamps in log file names.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct TextLayout {}

impl Layout for TextLayout {
    fn format(&self, entry: &Entry) -> Result<Vec<u8>, Error> {
        let mut text = String::new();

        let time = entry.time.strftime("%Y-%m-%dT%H:%M:%S.%6fZ");
        let level = entry.level.as_str();
        write!(&mut text, "{time} {level:>5}").map_err(Error::from_fmt_error)?;
        if !entry.target.is_empty() {
            write!(&mut text, " {}:", entry.target).map_err(Error::from_fmt_error)?;
        }
        if let Some(file) = &entry.file {
            let line = entry.line.unwrap_or_default();
            write!(&mut text, " {file}:{line}").map_err(Error::from_fmt_error)?;
        }
        write!(&mut text, " {}", entry.message).map_err(Error::from_fmt_error)?;
        for (k, v) in &entry.kvs {
            write!(&mut text, " {k}={v}").map_err(Error::from_fmt_error)?;
        }

        Ok(text.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use log::Level;

    use super::*;

    #[test]
    fn test_text_layout() {
        let time: Timestamp = "2024-01-02T03:04:05Z".parse().unwrap();
        let mut entry = Entry::new(Level::Warn, time, "disk is slow")
            .with_target("server::node");
        entry.kvs.push(("node".to_string(), "7".to_string()));
        entry.file = Some("src/node.rs".to_string());
        entry.line = Some(52);

        let bytes = TextLayout::default().format(&entry).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "2024-01-02T03:04:05.000000Z  WARN server::node: src/node.rs:52 disk is slow node=7"
        );
    }

    #[test]
    fn test_text_layout_minimal_entry() {
        let time: Timestamp = "2024-01-02T03:04:05Z".parse().unwrap();
        let entry = Entry::new(Level::Info, time, "file created at: 2024-01-02");

        let bytes = TextLayout::default().format(&entry).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "2024-01-02T03:04:05.000000Z  INFO file created at: 2024-01-02"
        );
    }
}
