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

//! A file-backed log sink for long-running server processes.
//!
//! # Overview
//!
//! A [`FileSink`] persists rendered log entries into rotating files in one directory. It
//! bounds disk usage together with an external GC daemon, terminates the process when the disk
//! stalls, and can capture the raw standard error stream of the process into its files.
//!
//! * Files are named `<prefix>.<host>.<user>.<time>.<pid>.log` with a `<prefix>.log` symlink
//!   pointing at the newest one, see [`file_name`].
//! * Every flush and sync runs under a [`StallGuard`]: slow calls are reported, stalled ones are
//!   fatal.
//! * [`temporarily_disable_gc`] lifts the combined size budget while, for example, a debug
//!   bundle is being collected.
//! * At most one sink captures file descriptor 2, see
//!   [`FileSink::take_over_internal_stderr`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use logforth_filesink::DirName;
//! use logforth_filesink::Entry;
//! use logforth_filesink::FileSink;
//! use logforth_filesink::Identity;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let sink = FileSink::builder(Identity::detect())
//!     .dir(dir.path().to_str().unwrap().parse::<DirName>().unwrap())
//!     .threshold(log::LevelFilter::Info)
//!     .start_lines(|now| vec![Entry::new(log::Level::Info, now, "file created")])
//!     .build()
//!     .unwrap();
//!
//! logforth_filesink::setup_log_crate(Arc::new(sink));
//! log::info!("This entry is written to a log file.");
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod file;
pub mod gc;
pub mod layout;
pub mod stall;
pub mod stderr;

pub use self::bridge::setup_log_crate;
pub use self::bridge::try_setup_log_crate;
pub use self::dir::DirName;
pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::exit::ExitCode;
pub use self::file::FileSink;
pub use self::file::FileSinkBuilder;
pub use self::file::file_name;
pub use self::file::list_log_files;
pub use self::file::parse_file_name;
pub use self::gc::temporarily_disable_gc;
pub use self::identity::Identity;
pub use self::layout::Entry;
pub use self::layout::Layout;
pub use self::sink::Sink;
pub use self::stall::StallGuard;

mod bridge;
mod dir;
mod error;
mod exit;
mod identity;
mod sink;
