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

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use logforth_filesink::DirName;
use logforth_filesink::ErrorKind;
use logforth_filesink::FileSink;
use logforth_filesink::Identity;
use logforth_filesink::Sink;
use logforth_filesink::StallGuard;
use logforth_filesink::list_log_files;
use logforth_filesink::stall::StallHandler;
use logforth_filesink::temporarily_disable_gc;
use rand::Rng;
use tempfile::TempDir;

#[derive(Debug, Default)]
struct Counts {
    slow: AtomicUsize,
    stalled: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
struct CountingHandler(Arc<Counts>);

impl StallHandler for CountingHandler {
    fn on_slow(&self, _limit: Duration) {
        self.0.slow.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stall(&self, _limit: Duration) {
        self.0.stalled.fetch_add(1, Ordering::SeqCst);
    }
}

fn dir_name(dir: &Path) -> DirName {
    dir.to_str().unwrap().parse().unwrap()
}

#[test]
fn test_concurrent_writers_rotate_without_losing_entries() {
    let temp_dir = TempDir::new().expect("failed to create a temporary directory");
    let max_size = 4096;
    let sink = Arc::new(
        FileSink::builder(Identity::new(7, "cockpit", "db7", "root"))
            .dir(dir_name(temp_dir.path()))
            .max_file_size(max_size)
            .build()
            .unwrap(),
    );

    let mut handles = vec![];
    for t in 0..4 {
        let sink = sink.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::rng();
            let mut written = vec![];
            for i in 0..200 {
                let payload = "A".repeat(rng.random_range(1..200));
                let line = format!("t{t}-{i}-{payload}\n");
                sink.output(false, line.as_bytes()).unwrap();
                written.push(line);
            }
            written
        }));
    }
    let mut expected = HashSet::new();
    for handle in handles {
        expected.extend(handle.join().unwrap());
    }
    sink.lock_and_flush_and_sync(true);

    let files = list_log_files(temp_dir.path(), "cockpit").unwrap();
    assert!(files.len() > 1, "expected rotations, found {files:?}");

    let mut found = HashSet::new();
    for file in &files {
        assert!(file.size < max_size, "{file:?} exceeds the rotation size");
        let content = fs::read_to_string(&file.path).unwrap();
        for line in content.split_inclusive('\n') {
            assert!(found.insert(line.to_string()), "duplicate entry {line:?}");
        }
    }
    assert_eq!(found, expected);
}

fn wait_for(counter: &AtomicUsize, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while counter.load(Ordering::SeqCst) < expected && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(counter.load(Ordering::SeqCst), expected);
}

#[test]
fn test_every_flush_runs_under_the_stall_guard() {
    let temp_dir = TempDir::new().expect("failed to create a temporary directory");
    let handler = CountingHandler::default();
    // every guarded call is already late when the watchdog sees it
    let guard = StallGuard::new(Duration::ZERO, Duration::from_secs(3600), handler.clone())
        .unwrap();
    let sink = FileSink::builder(Identity::new(7, "cockpit", "db7", "root"))
        .dir(dir_name(temp_dir.path()))
        .stall_guard(Arc::new(guard))
        .build()
        .unwrap();
    let slow = &handler.0.slow;

    for i in 0..3 {
        sink.output(false, format!("entry {i}\n").as_bytes())
            .unwrap();
    }
    thread::sleep(Duration::from_millis(100));
    assert_eq!(slow.load(Ordering::SeqCst), 0);

    sink.output(true, b"synced entry\n").unwrap();
    wait_for(slow, 1);

    sink.lock_and_flush_and_sync(false);
    wait_for(slow, 2);

    sink.close().unwrap();
    wait_for(slow, 3);

    assert_eq!(handler.0.stalled.load(Ordering::SeqCst), 0);
}

#[test]
fn test_invalid_stall_deadlines_are_rejected() {
    let err = StallGuard::new(
        Duration::from_secs(10),
        Duration::from_secs(10),
        CountingHandler::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[test]
fn test_gc_daemon_sees_new_files_and_throttle() {
    let temp_dir = TempDir::new().expect("failed to create a temporary directory");
    let sink = FileSink::builder(Identity::new(7, "cockpit", "db7", "root"))
        .dir(dir_name(temp_dir.path()))
        .max_file_size(64)
        .combined_max_size(200)
        .build()
        .unwrap();
    let notifications = sink.gc_notifications();

    for i in 0..5 {
        sink.output(false, format!("{i:0>40}\n").as_bytes()).unwrap();
    }
    sink.lock_and_flush_and_sync(false);
    notifications
        .recv_timeout(Duration::from_secs(1))
        .expect("no GC notification after file creation");

    // while a debug bundle is collected, nothing is over budget
    let cleanup = temporarily_disable_gc(Some(&sink));
    let total: u64 = list_log_files(temp_dir.path(), "cockpit")
        .unwrap()
        .iter()
        .map(|file| file.size)
        .sum();
    assert_eq!(total, 5 * 41);
    assert!(total < sink.log_files_combined_max_size());

    cleanup.restore();
    assert_eq!(sink.log_files_combined_max_size(), 200);
    assert!(total > sink.log_files_combined_max_size());
}

#[test]
fn test_tilde_directory_is_rejected() {
    let err = "~/logs".parse::<DirName>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}
