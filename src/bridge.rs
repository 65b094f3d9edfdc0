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

//! A bridge to install a [`FileSink`] as the `log` crate's global logger.

use std::sync::Arc;

use log::kv;

use crate::FileSink;
use crate::Sink;
use crate::layout::Entry;
use crate::stderr::report;

struct KvCollector<'a> {
    kvs: &'a mut Vec<(String, String)>,
}

impl<'kvs> kv::VisitSource<'kvs> for KvCollector<'_> {
    fn visit_pair(&mut self, key: kv::Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        self.kvs.push((key.to_string(), value.to_string()));
        Ok(())
    }
}

impl FileSink {
    fn entry_from_record(&self, record: &log::Record) -> Entry {
        let mut entry = Entry::new(record.level(), self.now(), record.args().to_string())
            .with_target(record.target());
        entry.file = record.file().map(str::to_string);
        entry.line = record.line();

        let mut collector = KvCollector {
            kvs: &mut entry.kvs,
        };
        if let Err(err) = record.key_values().visit(&mut collector) {
            report(format_args!("failed to collect key-values of log record: {err}"));
        }
        entry
    }
}

impl log::Log for FileSink {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.active_at_severity(metadata.level())
    }

    fn log(&self, record: &log::Record) {
        if !self.active_at_severity(record.level()) {
            return;
        }

        let entry = self.entry_from_record(record);
        let mut bytes = match self.layout().format(&entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                report(format_args!("failed to format log record: {err}"));
                return;
            }
        };
        bytes.push(b'\n');

        if let Err(err) = self.output(false, &bytes) {
            report(format_args!("failed to write log record: {err}"));
        }
    }

    fn flush(&self) {
        self.lock_and_flush_and_sync(false);
    }
}

struct SharedSink(Arc<FileSink>);

impl log::Log for SharedSink {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        log::Log::enabled(self.0.as_ref(), metadata)
    }

    fn log(&self, record: &log::Record) {
        log::Log::log(self.0.as_ref(), record)
    }

    fn flush(&self) {
        log::Log::flush(self.0.as_ref())
    }
}

/// Set up the log crate global logger to write into `sink`.
///
/// The global maximum log level is set to the sink's threshold.
///
/// # Errors
///
/// Return an error if the log crate global logger has already been set.
pub fn try_setup_log_crate(sink: Arc<FileSink>) -> Result<(), log::SetLoggerError> {
    let threshold = sink.threshold();
    log::set_boxed_logger(Box::new(SharedSink(sink)))?;
    log::set_max_level(threshold);
    Ok(())
}

/// Set up the log crate global logger to write into `sink`.
///
/// # Panics
///
/// Panic if the log crate global logger has already been set.
pub fn setup_log_crate(sink: Arc<FileSink>) {
    try_setup_log_crate(sink).expect(
        "logforth_filesink::setup_log_crate must be called before the log crate global logger initialized",
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use log::Log;
    use tempfile::TempDir;

    use crate::DirName;
    use crate::Identity;

    use super::*;

    #[test]
    fn test_log_records_land_in_file() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let sink = FileSink::builder(Identity::new(1, "node1", "db7", "root"))
            .dir(temp_dir.path().to_str().unwrap().parse::<DirName>().unwrap())
            .threshold(log::LevelFilter::Warn)
            .build()
            .unwrap();

        let kvs = ("node", 7);
        let record = log::Record::builder()
            .level(log::Level::Error)
            .target("server")
            .file(Some("src/server.rs"))
            .line(Some(12))
            .key_values(&kvs)
            .args(format_args!("disk full"))
            .build();
        sink.log(&record);

        let ignored = log::Record::builder()
            .level(log::Level::Info)
            .args(format_args!("chatty"))
            .build();
        assert!(!Log::enabled(&sink, ignored.metadata()));
        sink.log(&ignored);
        sink.flush();

        let content = fs::read_to_string(sink.current_file().unwrap()).unwrap();
        assert!(content.ends_with("ERROR server: src/server.rs:12 disk full node=7\n"));
        assert!(!content.contains("chatty"));
    }
}
