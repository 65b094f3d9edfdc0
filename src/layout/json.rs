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

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::Error;
use crate::ErrorKind;
use crate::layout::Entry;
use crate::layout::Layout;

/// A JSON layout for formatting log entries.
///
/// Output format:
///
/// ```json
/// {"timestamp":"2024-01-02T03:04:05.000000Z","level":"ERROR","target":"server::node","file":"src/node.rs","line":51,"message":"Hello error!"}
/// {"timestamp":"2024-01-02T03:04:05.000120Z","level":"WARN","target":"server::node","file":"src/node.rs","line":52,"message":"Hello warn!","kvs":{"node":"7"}}
/// ```
#[derive(Default, Debug, Clone)]
#[non_exhaustive]
pub struct JsonLayout {}

#[derive(Debug, Clone, Serialize)]
struct EntryLine<'a> {
    timestamp: String,
    level: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    message: &'a str,
    #[serde(skip_serializing_if = "Map::is_empty")]
    kvs: Map<String, Value>,
}

fn is_empty(s: &&str) -> bool {
    s.is_empty()
}

impl Layout for JsonLayout {
    fn format(&self, entry: &Entry) -> Result<Vec<u8>, Error> {
        let kvs = entry
            .kvs
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        let line = EntryLine {
            timestamp: entry.time.strftime("%Y-%m-%dT%H:%M:%S.%6fZ").to_string(),
            level: entry.level.as_str(),
            target: &entry.target,
            file: entry.file.as_deref(),
            line: entry.line,
            message: &entry.message,
            kvs,
        };

        serde_json::to_vec(&line).map_err(|err| {
            Error::new(ErrorKind::Unexpected, "failed to serialize log entry").with_source(err)
        })
    }
}
