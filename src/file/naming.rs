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

//! Log file names.
//!
//! A log file is named `<prefix>.<host>.<user>.<time>.<pid>.log`, where `time` is the file's
//! creation time in [`FILE_TIME_FORMAT`] and `pid` is zero-padded to six digits. Free-form
//! components have their periods removed, so a name always splits into exactly six fields.
//! The symlink `<prefix>.log` points at the newest file.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;

use crate::Error;
use crate::ErrorKind;
use crate::Identity;

/// RFC 3339 in UTC with the colons replaced by underscores, which keeps file names valid on
/// Windows file systems.
pub const FILE_TIME_FORMAT: &str = "%Y-%m-%dT%H_%M_%SZ";

/// Remove all periods from `s`.
pub fn remove_periods(s: &str) -> String {
    s.replace('.', "")
}

/// Return the name of a log file created at `time`, and the name of its symlink.
pub fn file_name(prefix: &str, identity: &Identity, time: Timestamp) -> (String, String) {
    let prefix = remove_periods(prefix);
    let name = format!(
        "{}.{}.{}.{}.{:06}.log",
        prefix,
        remove_periods(identity.host()),
        remove_periods(identity.user()),
        time.strftime(FILE_TIME_FORMAT),
        identity.pid(),
    );
    let symlink = format!("{prefix}.log");
    (name, symlink)
}

/// The components encoded in a log file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetails {
    /// The sink prefix, without periods.
    pub prefix: String,
    /// The short host name, without periods.
    pub host: String,
    /// The user name, without periods.
    pub user: String,
    /// Creation time, at second precision.
    pub time: Timestamp,
    /// The id of the process that created the file.
    pub pid: u32,
}

/// Parse a name produced by [`file_name`].
pub fn parse_file_name(name: &str) -> Result<FileDetails, Error> {
    let invalid = || {
        Error::new(ErrorKind::InvalidFileName, "not a log file name").with_context("name", name)
    };

    let parts = name.split('.').collect::<Vec<_>>();
    let [prefix, host, user, time, pid, "log"] = parts.as_slice() else {
        return Err(invalid());
    };

    let time = DateTime::strptime(FILE_TIME_FORMAT, time)
        .and_then(|dt| dt.to_zoned(TimeZone::UTC))
        .map_err(|err| invalid().with_source(err))?;
    let pid = pid.parse::<u32>().map_err(|err| invalid().with_source(err))?;

    Ok(FileDetails {
        prefix: prefix.to_string(),
        host: host.to_string(),
        user: user.to_string(),
        time: time.timestamp(),
        pid,
    })
}

/// A log file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Full path of the file.
    pub path: PathBuf,
    /// Size of the file in bytes.
    pub size: u64,
    /// What the file name encodes.
    pub details: FileDetails,
}

/// List the log files of `prefix` in `dir`, newest first.
///
/// Only regular files with a parseable name are returned; the symlink is skipped.
pub fn list_log_files(dir: &Path, prefix: &str) -> Result<Vec<FileInfo>, Error> {
    let prefix = remove_periods(prefix);
    let read_dir = fs::read_dir(dir).map_err(|err| {
        Error::from_io_error(err).with_context("dir", dir.display())
    })?;

    let mut files = read_dir
        .filter_map(|entry| {
            let entry = entry.ok()?;
            // never follows symlinks
            let file_type = entry.file_type().ok()?;
            if !file_type.is_file() {
                return None;
            }

            let filename = entry.file_name();
            let details = parse_file_name(filename.to_str()?).ok()?;
            if details.prefix != prefix {
                return None;
            }

            let size = entry.metadata().ok()?.len();
            Some(FileInfo {
                path: entry.path(),
                size,
                details,
            })
        })
        .collect::<Vec<_>>();

    files.sort_by(|a, b| {
        b.details
            .time
            .cmp(&a.details.time)
            .then_with(|| b.path.cmp(&a.path))
    });
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn identity() -> Identity {
        Identity::new(4242, "node1", "db7", "root")
    }

    #[test]
    fn test_file_name() {
        let time: Timestamp = "2024-01-02T03:04:05Z".parse().unwrap();
        let (name, symlink) = file_name("node1", &identity(), time);
        assert_eq!(name, "node1.db7.root.2024-01-02T03_04_05Z.004242.log");
        assert_eq!(symlink, "node1.log");
    }

    #[test]
    fn test_file_name_strips_periods_and_subseconds() {
        let time: Timestamp = "2024-01-02T03:04:05.987654321Z".parse().unwrap();
        let identity = Identity::new(7, "x", "db7", "j.doe");
        let (name, symlink) = file_name("cockpit.v2-audit", &identity, time);
        assert_eq!(name, "cockpitv2-audit.db7.jdoe.2024-01-02T03_04_05Z.000007.log");
        assert_eq!(symlink, "cockpitv2-audit.log");
    }

    #[test]
    fn test_parse_file_name_inverts_file_name() {
        let time: Timestamp = "2024-01-02T03:04:05Z".parse().unwrap();
        let (name, _) = file_name("node1", &identity(), time);
        let details = parse_file_name(&name).unwrap();
        assert_eq!(
            details,
            FileDetails {
                prefix: "node1".to_string(),
                host: "db7".to_string(),
                user: "root".to_string(),
                time,
                pid: 4242,
            }
        );
    }

    #[test]
    fn test_parse_file_name_rejects_foreign_names() {
        for name in [
            "node1.log",
            "node1.db7.root.2024-01-02T03_04_05Z.004242.txt",
            "node1.db7.root.yesterday.004242.log",
            "node1.db7.root.2024-01-02T03_04_05Z.pid.log",
            "node1.db7.root.extra.2024-01-02T03_04_05Z.004242.log",
        ] {
            let err = parse_file_name(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFileName, "{name}");
        }
    }

    #[test]
    fn test_list_log_files_newest_first() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let dir = temp_dir.path();
        let identity = identity();

        let mut expected = vec![];
        for time in ["2024-01-02T03:04:05Z", "2024-01-02T03:04:07Z", "2024-01-02T03:04:06Z"] {
            let (name, _) = file_name("node1", &identity, time.parse().unwrap());
            fs::write(dir.join(&name), time).unwrap();
            expected.push(name);
        }
        let (other, _) = file_name("other", &identity, "2024-01-02T03:04:09Z".parse().unwrap());
        fs::write(dir.join(other), "x").unwrap();
        fs::write(dir.join("README"), "x").unwrap();
        fs::create_dir(dir.join("node1.db7.root.2024-01-02T03_04_08Z.004242.log")).unwrap();

        let files = list_log_files(dir, "node1").unwrap();
        let names = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec![
            expected[1].clone(),
            expected[2].clone(),
            expected[0].clone()
        ]);
        assert!(files.iter().all(|f| f.size == 20));
    }
}
