//! util: общие утилиты (время, env-флаги, атомарная запись файлов).
//!
//! Содержит:
//! - now_secs(): текущее Unix-время в секундах.
//! - env_flag(): разбор булевых переменных окружения (1|true|yes|on / 0|false|no|off).
//! - fsync_dir(): fsync родительского каталога (best-effort вне unix).
//! - write_file_atomic(): tmp + rename + fsync каталога.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Текущее Unix-время в секундах.
#[inline]
pub fn now_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Parse a boolean env variable. None if unset or unrecognized.
pub fn env_flag(name: &str) -> Option<bool> {
    let v = std::env::var(name).ok()?;
    parse_flag(&v)
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(unix)]
pub fn fsync_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let dir = fs::File::open(parent)?;
            dir.sync_all()?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn fsync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// `<path>.tmp` рядом с целевым файлом.
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".tmp");
    PathBuf::from(s)
}

/// Атомарно записать файл: tmp + fsync + rename, затем fsync каталога (best-effort).
pub fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path_for(path);
    let _ = fs::remove_file(&tmp);

    let f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .with_context(|| format!("open tmp {}", tmp.display()))?;

    let res = (|mut f: File| -> Result<()> {
        f.write_all(bytes)
            .with_context(|| format!("write {}", tmp.display()))?;
        f.sync_all()?;
        drop(f);
        fs::rename(&tmp, path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    })(f);
    if res.is_err() {
        // tmp не должен пережить неудачную запись
        let _ = fs::remove_file(&tmp);
    }
    res?;
    let _ = fsync_dir(path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_secs_monotonic_nonzero() {
        let a = now_secs();
        let b = now_secs();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn parse_flag_variants() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" ON "), Some(true));
        assert_eq!(parse_flag("no"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn tmp_path_appends_suffix() {
        let p = tmp_path_for(Path::new("/x/out.sgr"));
        assert_eq!(p, PathBuf::from("/x/out.sgr.tmp"));
    }

    #[test]
    fn failed_rename_removes_tmp() {
        let dir = std::env::temp_dir().join(format!(
            "segtest-util-{}-{}",
            std::process::id(),
            now_secs()
        ));
        let target = dir.join("busy.hist");
        // непустой каталог на месте цели: rename падает
        fs::create_dir_all(target.join("x")).unwrap();

        assert!(write_file_atomic(&target, b"{}").is_err());
        assert!(!tmp_path_for(&target).exists());
        assert!(target.is_dir());

        let _ = fs::remove_dir_all(&dir);
    }
}
