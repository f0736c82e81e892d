//! File helpers for run output.

use chrono::{DateTime, Local};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Prefix of streamed run files.
pub const STREAM_FILE_PREFIX: &str = "motor_movement_data_";

/// Write `bytes` to a sibling temp file, sync it, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

/// `motor_movement_data_<YYYYmmddHHMMSS>.txt`
pub fn stream_file_name(now: &DateTime<Local>) -> String {
    format!("{STREAM_FILE_PREFIX}{}.txt", now.format("%Y%m%d%H%M%S"))
}

/// Pick a path in `dir` for a new stream file that does not exist yet.
pub(crate) fn unused_stream_path(dir: &Path, now: &DateTime<Local>) -> PathBuf {
    let first = dir.join(stream_file_name(now));
    if !first.exists() {
        return first;
    }
    let stamp = now.format("%Y%m%d%H%M%S");
    (1u32..)
        .map(|n| dir.join(format!("{STREAM_FILE_PREFIX}{stamp}_{n}.txt")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stream_file_name_uses_compact_timestamp() {
        let t = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(stream_file_name(&t), "motor_movement_data_20240309140507.txt");
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("out.csv");
        write_atomic(&p, b"one").unwrap();
        write_atomic(&p, b"two").unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"two");
        assert!(!dir.path().join("out.csv.tmp").exists());
    }

    #[test]
    fn colliding_stream_names_get_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let t = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let a = unused_stream_path(dir.path(), &t);
        fs::write(&a, "").unwrap();
        let b = unused_stream_path(dir.path(), &t);
        assert_ne!(a, b);
        assert!(b.to_string_lossy().ends_with("_1.txt"));
    }
}
