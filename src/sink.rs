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

use log::Level;

use crate::Error;
use crate::ExitCode;
use crate::Layout;

/// A severity-gated destination for rendered log entries.
///
/// This is the contract a log dispatcher relies on. Entries are rendered once with
/// [`Sink::layout`] and then handed to [`Sink::output`] as bytes.
pub trait Sink: fmt::Debug + Send + Sync + 'static {
    /// Whether entries at `level` should be rendered for this sink at all.
    fn active_at_severity(&self, level: Level) -> bool;

    /// The layout entries for this sink are rendered with.
    fn layout(&self) -> &dyn Layout;

    /// Write one rendered entry, syncing it to stable storage if `extra_sync` is set.
    fn output(&self, extra_sync: bool, bytes: &[u8]) -> Result<(), Error>;

    /// Write one rendered entry while the process is terminating. Never fails loudly.
    fn emergency_output(&self, bytes: &[u8]);

    /// Append hints for a human reading `stacks` through another channel.
    fn attach_hints(&self, stacks: Vec<u8>) -> Vec<u8>;

    /// The exit code to use when the process terminates because this sink is unusable.
    fn exit_code(&self) -> ExitCode;
}
