//! Screenshot store naming and retention. The capture itself goes
//! through [`crate::collaborators::ScreenshotSource`]; this module only
//! owns the on-disk naming scheme and the sweep that enforces
//! `max_age_days` / `max_count`.

use std::path::{Path, PathBuf};

/// The four kinds of screenshot this pipeline writes, each with its own
/// filename prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotKind {
    Screenshot,
    Temp,
    Before,
    After,
}

impl ScreenshotKind {
    fn prefix(self) -> &'static str {
        match self {
            ScreenshotKind::Screenshot => "screenshot",
            ScreenshotKind::Temp => "temp",
            ScreenshotKind::Before => "before",
            ScreenshotKind::After => "after",
        }
    }
}

/// Builds `{screenshot_dir}/{kind}_{YYYYMMDD_HHMMSS}.png` for `at`.
pub fn path_for(screenshot_dir: &Path, kind: ScreenshotKind, at: chrono::DateTime<chrono::Utc>) -> PathBuf {
    let stamp = at.format("%Y%m%d_%H%M%S");
    screenshot_dir.join(format!("{}_{}.png", kind.prefix(), stamp))
}

/// Sweeps `screenshot_dir`, deleting files older than `max_age_days` and,
/// among what remains, the oldest beyond `max_count`. Best-effort: a
/// single file's metadata/removal error is skipped, not fatal — this
/// runs as a fire-and-forget cleanup hook, not a step the caller waits on.
pub async fn enforce_retention(screenshot_dir: &Path, max_age_days: u32, max_count: usize) {
    let Ok(mut entries) = tokio::fs::read_dir(screenshot_dir).await else {
        return;
    };

    let cutoff = std::time::SystemTime::now()
        .checked_sub(std::time::Duration::from_secs(u64::from(max_age_days) * 86_400));

    let mut files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if let Some(cutoff) = cutoff {
            if modified < cutoff {
                let _ = tokio::fs::remove_file(&path).await;
                continue;
            }
        }
        files.push((path, modified));
    }

    if files.len() > max_count {
        files.sort_by_key(|(_, modified)| *modified);
        let drop = files.len() - max_count;
        for (path, _) in files.into_iter().take(drop) {
            let _ = tokio::fs::remove_file(&path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn path_for_uses_kind_prefix_and_timestamp() {
        let at = chrono::Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let path = path_for(Path::new("/tmp/shots"), ScreenshotKind::Before, at);
        assert_eq!(path, PathBuf::from("/tmp/shots/before_20260728_120000.png"));
    }

    #[tokio::test]
    async fn retention_keeps_only_max_count_newest_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            let path = dir.path().join(format!("screenshot_{i}.png"));
            tokio::fs::write(&path, b"x").await.unwrap();
            // Ensure distinct mtimes so ordering is deterministic.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        enforce_retention(dir.path(), 30, 2).await;
        let mut remaining = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(e) = entries.next_entry().await.unwrap() {
            remaining.push(e.file_name().to_string_lossy().to_string());
        }
        assert_eq!(remaining.len(), 2);
    }
}
