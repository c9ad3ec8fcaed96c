//! Line-delimited and whole-document JSON file codecs.
//!
//! All writes go through [`atomic_write`]: the content lands in a temp file in
//! the target directory and is then renamed over the target.

use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Read every record of a JSONL file.
///
/// A missing file is an empty collection. Malformed lines are skipped with a
/// warning so one bad record does not hide the rest; [`write_jsonl`] keeps
/// them on disk.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let Some(content) = read_existing(path)? else {
        return Ok(Vec::new());
    };

    let (records, malformed) = parse_lines::<T>(&content);
    for (line_no, _, error) in &malformed {
        tracing::warn!(
            path = %path.display(),
            line = line_no,
            error = %error,
            "skipping malformed JSONL record"
        );
    }
    Ok(records)
}

/// Replace a JSONL file with `records`, one compact JSON object per line.
///
/// Lines of the current file that do not parse as `T` are appended verbatim
/// after the records, so a rewrite never drops data it could not read.
pub fn write_jsonl<T: Serialize + DeserializeOwned>(path: &Path, records: &[T]) -> Result<()> {
    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record)?);
        buf.push('\n');
    }

    if let Some(content) = read_existing(path)? {
        let (_, malformed) = parse_lines::<T>(&content);
        if !malformed.is_empty() {
            tracing::warn!(
                path = %path.display(),
                lines = malformed.len(),
                "preserving malformed JSONL records"
            );
        }
        for (_, raw, _) in malformed {
            buf.push_str(raw);
            buf.push('\n');
        }
    }
    atomic_write(path, buf.as_bytes())
}

fn read_existing(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Parsed records plus `(line number, raw line, error)` for each bad line.
fn parse_lines<T: DeserializeOwned>(
    content: &str,
) -> (Vec<T>, Vec<(usize, &str, serde_json::Error)>) {
    let mut records = Vec::new();
    let mut malformed = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => malformed.push((index + 1, trimmed, e)),
        }
    }
    (records, malformed)
}

/// Read a whole-document JSON file.
///
/// Returns `Ok(None)` when the file does not exist. A file that exists but does
/// not parse is reported as [`Error::Corrupt`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Replace a JSON document file with the pretty-printed `value`.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    atomic_write(path, json.as_bytes())
}

/// Write `bytes` to `path` via temp file + rename, creating parent directories.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Other(format!("No parent directory for {}", path.display())))?;
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}
