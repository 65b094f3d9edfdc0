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

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use jiff::Timestamp;

use crate::Error;
use crate::ErrorKind;
use crate::Identity;
use crate::file::naming::file_name;
use crate::stderr::report;

/// A freshly created log file.
#[derive(Debug)]
pub struct Created {
    /// The open file, positioned for appending.
    pub file: File,
    /// The rotation watermark to pass to the next [`create`] call.
    pub last_rotation: i64,
    /// Full path of the file.
    pub path: PathBuf,
    /// Full path of the symlink that should point at the file.
    pub symlink: PathBuf,
}

/// Create a new log file in `dir`.
///
/// The timestamp encoded in the file name is `now` at second precision, but always strictly
/// greater than `last_rotation`, so names keep increasing across rapid rotations and clock
/// steps backwards. The file is opened for appending and never truncated: two processes that
/// compute the same name share the file rather than clobber it.
pub fn create(
    dir: &Path,
    prefix: &str,
    identity: &Identity,
    now: Timestamp,
    last_rotation: i64,
) -> Result<Created, Error> {
    if dir.as_os_str().is_empty() {
        return Err(Error::new(
            ErrorKind::DirectoryNotConfigured,
            "log directory not set",
        ));
    }

    let unix = now.as_second().max(last_rotation.saturating_add(1));
    let time = Timestamp::from_second(unix).map_err(|err| {
        Error::new(ErrorKind::LogFileCreateFailed, "log file timestamp out of range")
            .with_context("unix", unix)
            .with_source(err)
    })?;

    let (name, link) = file_name(prefix, identity, time);
    let path = dir.join(name);
    let symlink = dir.join(link);

    let cannot_create = |err: io::Error| {
        Error::new(ErrorKind::LogFileCreateFailed, "cannot create output file")
            .with_context("path", path.display())
            .with_source(err)
    };
    fs::create_dir_all(dir).map_err(cannot_create)?;
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)
        .map_err(cannot_create)?;

    Ok(Created {
        file,
        last_rotation: unix,
        path,
        symlink,
    })
}

/// Point `symlink` at the base name of `path`.
///
/// Symlinks are best-effort: failures are reported on the original standard error stream and
/// never returned.
pub fn update_symlink(path: &Path, symlink: &Path) {
    if let Err(err) = fs::remove_file(symlink) {
        if err.kind() != io::ErrorKind::NotFound {
            report(format_args!(
                "failed to remove symlink {}: {err}",
                symlink.display()
            ));
        }
    }

    let Some(target) = path.file_name() else {
        return;
    };
    if let Err(err) = make_symlink(Path::new(target), symlink) {
        // Creating symlinks needs a privilege on Windows, so failing is the common case there.
        if !cfg!(windows) {
            report(format_args!(
                "failed to create symlink {}: {err}",
                symlink.display()
            ));
        }
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn make_symlink(_: &Path, _: &Path) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;
    use crate::file::naming::parse_file_name;

    fn identity() -> Identity {
        Identity::new(4242, "node1", "db7", "root")
    }

    #[test]
    fn test_create_requires_dir() {
        let now: Timestamp = "2024-01-02T03:04:05Z".parse().unwrap();
        let err = create(Path::new(""), "node1", &identity(), now, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotConfigured);
    }

    #[test]
    fn test_create_concrete_name() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let now: Timestamp = "2024-01-02T03:04:05Z".parse().unwrap();

        let created = create(temp_dir.path(), "node1", &identity(), now, 0).unwrap();
        assert_eq!(created.last_rotation, now.as_second());
        assert_eq!(
            created.path,
            temp_dir
                .path()
                .join("node1.db7.root.2024-01-02T03_04_05Z.004242.log")
        );
        assert_eq!(created.symlink, temp_dir.path().join("node1.log"));
        assert!(created.path.is_file());
    }

    #[test]
    fn test_create_timestamps_strictly_increase() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let base: Timestamp = "2024-01-02T03:04:05Z".parse().unwrap();
        let inputs = [0, 0, 0, -30, 2, 1, 60]
            .map(|offset| Timestamp::from_second(base.as_second() + offset).unwrap());

        let mut last_rotation = 0;
        let mut previous = None;
        for now in inputs {
            let created = create(temp_dir.path(), "node1", &identity(), now, last_rotation).unwrap();
            last_rotation = created.last_rotation;

            let name = created.path.file_name().unwrap().to_str().unwrap();
            let time = parse_file_name(name).unwrap().time;
            if let Some(previous) = previous {
                assert!(time > previous, "{time} must be after {previous}");
            }
            previous = Some(time);
        }
    }

    #[test]
    fn test_create_appends_to_existing_file() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let now: Timestamp = "2024-01-02T03:04:05Z".parse().unwrap();

        let mut first = create(temp_dir.path(), "node1", &identity(), now, 0).unwrap();
        first.file.write_all(b"first\n").unwrap();
        // another process racing on the same name
        let mut second = create(temp_dir.path(), "node1", &identity(), now, 0).unwrap();
        second.file.write_all(b"second\n").unwrap();

        assert_eq!(first.path, second.path);
        assert_eq!(fs::read_to_string(&first.path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_create_in_unwritable_place() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let blocker = temp_dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();
        let now: Timestamp = "2024-01-02T03:04:05Z".parse().unwrap();

        let err = create(&blocker, "node1", &identity(), now, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LogFileCreateFailed);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_follows_latest_file() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let now: Timestamp = "2024-01-02T03:04:05Z".parse().unwrap();

        let first = create(temp_dir.path(), "node1", &identity(), now, 0).unwrap();
        update_symlink(&first.path, &first.symlink);
        let second = create(
            temp_dir.path(),
            "node1",
            &identity(),
            now,
            first.last_rotation,
        )
        .unwrap();
        update_symlink(&second.path, &second.symlink);

        assert_ne!(first.path, second.path);
        let target = fs::read_link(&second.symlink).unwrap();
        assert_eq!(target, Path::new(second.path.file_name().unwrap()));
        assert_eq!(second.last_rotation, first.last_rotation + 1);
    }
}
