//! Command history persistence.
//!
//! Append-only CSV, one row per run, guarded by a `tokio::sync::Mutex` so
//! concurrent runs never interleave a partial row. Readers tolerate a
//! legacy header missing `screen_summary` and migrate it in place.

use super::error::HistoryError;
use super::model::CommandHistoryEntry;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const HEADER: &str = "timestamp,command,steps,code,success,screen_summary";
const LEGACY_HEADER: &str = "timestamp,command,steps,code,success";

/// Quotes `value` per CSV rules if it contains a comma, semicolon, quote,
/// or newline; embedded quotes are doubled.
fn csv_quote(value: &str) -> String {
    let needs_quoting = value.contains([',', ';', '"', '\n', '\r']);
    if !needs_quoting {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn row_for(entry: &CommandHistoryEntry) -> String {
    let steps = entry.steps.join("; ");
    format!(
        "{},{},{},{},{},{}",
        csv_quote(&entry.timestamp.to_rfc3339()),
        csv_quote(&entry.command),
        csv_quote(&steps),
        csv_quote(&entry.code),
        entry.success,
        csv_quote(&entry.screen_summary),
    )
}

/// A single parsed CSV field accumulator respecting quoted commas.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    fields.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            }
        }
    }
    fields.push(current);
    fields
}

/// Append-only CSV history sink, guarded against concurrent writers.
pub struct HistoryWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HistoryWriter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Ensures the file exists with the current header, migrating a
    /// legacy header (missing `screen_summary`) in place by rewriting
    /// every row with an empty trailing column.
    async fn ensure_header(&self) -> Result<(), HistoryError> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&self.path, format!("{HEADER}\n")).await?;
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&self.path).await?;
        let mut lines = contents.lines();
        let Some(first) = lines.next() else {
            tokio::fs::write(&self.path, format!("{HEADER}\n")).await?;
            return Ok(());
        };

        if first.trim() == LEGACY_HEADER {
            let mut migrated = String::new();
            migrated.push_str(HEADER);
            migrated.push('\n');
            for line in lines {
                if line.trim().is_empty() {
                    continue;
                }
                migrated.push_str(line);
                migrated.push_str(",\n");
            }
            tokio::fs::write(&self.path, migrated).await?;
        }
        Ok(())
    }

    /// Appends one entry as a single whole row; the write is one
    /// `write_all` call so concurrent writers never interleave a partial
    /// row.
    pub async fn append(&self, entry: &CommandHistoryEntry) -> Result<(), HistoryError> {
        let _guard = self.lock.lock().await;
        self.ensure_header().await?;

        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await?;
        let line = format!("{}\n", row_for(entry));
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Reads back every complete row (best-effort; used by tests and by
    /// any caller wanting to inspect history).
    pub async fn read_all(&self) -> Result<Vec<CommandHistoryEntry>, HistoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = tokio::fs::read_to_string(&self.path).await?;
        parse_entries(&contents)
    }
}

fn parse_entries(contents: &str) -> Result<Vec<CommandHistoryEntry>, HistoryError> {
    let mut lines = contents.lines();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    if header.trim() != HEADER && header.trim() != LEGACY_HEADER {
        return Err(HistoryError::Csv(format!("unrecognized header: {header}")));
    }

    let mut out = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = parse_csv_line(line);
        if fields.len() < 5 {
            return Err(HistoryError::Csv(format!("malformed row: {line}")));
        }
        let timestamp: DateTime<Utc> = fields[0]
            .parse()
            .map_err(|e| HistoryError::Csv(format!("bad timestamp: {e}")))?;
        let steps: Vec<String> = if fields[2].is_empty() {
            Vec::new()
        } else {
            fields[2].split("; ").map(str::to_string).collect()
        };
        let success = fields[4].trim() == "true";
        let screen_summary = fields.get(5).cloned().unwrap_or_default();
        out.push(CommandHistoryEntry {
            timestamp,
            command: fields[1].clone(),
            steps,
            code: fields[3].clone(),
            success,
            screen_summary,
        });
    }
    Ok(out)
}

/// Prunes history rows older than `max_age_days` or beyond `max_count`
/// (keeping the most recent), rewriting the file once.
pub async fn enforce_retention(
    path: &Path,
    max_age_days: u32,
    max_count: usize,
) -> Result<(), HistoryError> {
    if !path.exists() {
        return Ok(());
    }
    let contents = tokio::fs::read_to_string(path).await?;
    let mut entries = parse_entries(&contents)?;
    let cutoff = Utc::now() - chrono::Duration::days(max_age_days as i64);
    entries.retain(|e| e.timestamp >= cutoff);
    if entries.len() > max_count {
        let drop = entries.len() - max_count;
        entries.drain(0..drop);
    }

    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    for entry in &entries {
        out.push_str(&row_for(entry));
        out.push('\n');
    }
    tokio::fs::write(path, out).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(command: &str) -> CommandHistoryEntry {
        CommandHistoryEntry {
            timestamp: Utc::now(),
            command: command.to_string(),
            steps: vec!["click on Save".to_string()],
            code: "move_to(1, 2)\nclick()".to_string(),
            success: true,
            screen_summary: "added: Saved".to_string(),
        }
    }

    #[tokio::test]
    async fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let writer = HistoryWriter::new(path);
        writer.append(&entry("click on Save")).await.unwrap();
        writer.append(&entry("press enter")).await.unwrap();
        let rows = writer.read_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].command, "click on Save");
    }

    #[tokio::test]
    async fn quotes_values_containing_commas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let writer = HistoryWriter::new(path);
        writer.append(&entry("click on \"A, B\"")).await.unwrap();
        let rows = writer.read_all().await.unwrap();
        assert_eq!(rows[0].command, "click on \"A, B\"");
    }

    #[tokio::test]
    async fn migrates_legacy_header_missing_screen_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        tokio::fs::write(
            &path,
            format!(
                "{LEGACY_HEADER}\n2024-01-01T00:00:00Z,click on Save,click on Save,move_to(1,2),true\n"
            ),
        )
        .await
        .unwrap();
        let writer = HistoryWriter::new(path.clone());
        writer.append(&entry("press enter")).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.lines().next().unwrap() == HEADER);
        let rows = writer.read_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].screen_summary, "");
    }

    #[tokio::test]
    async fn retention_drops_rows_beyond_max_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let writer = HistoryWriter::new(path.clone());
        for i in 0..5 {
            writer.append(&entry(&format!("step {i}"))).await.unwrap();
        }
        enforce_retention(&path, 30, 2).await.unwrap();
        let rows = writer.read_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].command, "step 4");
    }
}
