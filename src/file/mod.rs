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

//! A sink writing log entries to rotating files.
//!
//! # Example
//!
//! ```
//! use logforth_filesink::DirName;
//! use logforth_filesink::FileSink;
//! use logforth_filesink::Identity;
//! use logforth_filesink::Sink;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let sink = FileSink::builder(Identity::detect())
//!     .dir(dir.path().to_str().unwrap().parse::<DirName>().unwrap())
//!     .file_name_suffix("audit")
//!     .max_file_size(64 << 20)
//!     .build()
//!     .unwrap();
//!
//! sink.output(false, b"hello\n").unwrap();
//! sink.lock_and_flush_and_sync(true);
//! ```

pub use self::builder::DEFAULT_COMBINED_MAX_SIZE;
pub use self::builder::DEFAULT_FILE_MAX_SIZE;
pub use self::builder::FileSinkBuilder;
pub use self::naming::FILE_TIME_FORMAT;
pub use self::naming::FileDetails;
pub use self::naming::FileInfo;
pub use self::naming::file_name;
pub use self::naming::list_log_files;
pub use self::naming::parse_file_name;
pub use self::naming::remove_periods;
pub use self::rotation::Created;
pub use self::rotation::create;
pub use self::rotation::update_symlink;
pub use self::sink::FileSink;
pub use self::sink::set_sync_all_writes;
pub use self::sink::sync_all_writes;

mod builder;
mod clock;
mod naming;
mod rotation;
mod sink;
