use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

const LOG_EXTENSION: &str = "jsonl";

#[derive(Error, Debug)]
pub enum ConversationLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid conversation id")]
    InvalidKey,
}

/// Append-only JSON-Lines store, one file per conversation.
///
/// Every record is a single self-contained line, so a torn write can damage
/// at most the most recently written line and readers simply skip it.
pub struct ConversationLog {
    base_path: PathBuf,
}

impl ConversationLog {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, ConversationLogError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Map a conversation id to a filesystem-safe file stem.
    pub fn sanitize_key(conversation_id: &str) -> String {
        conversation_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn log_path(&self, conversation_id: &str) -> Result<PathBuf, ConversationLogError> {
        if conversation_id.trim().is_empty() {
            return Err(ConversationLogError::InvalidKey);
        }
        let stem = Self::sanitize_key(conversation_id);
        Ok(self.base_path.join(format!("{}.{}", stem, LOG_EXTENSION)))
    }

    pub fn exists(&self, conversation_id: &str) -> bool {
        self.log_path(conversation_id)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    pub fn load<T: DeserializeOwned>(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<T>, ConversationLogError> {
        let path = self.log_path(conversation_id)?;

        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();

        // Raw bytes: a torn tail may end inside a multi-byte character
        for (line_no, line) in reader.split(b'\n').enumerate() {
            let line = line?;
            if is_blank(&line) {
                continue;
            }
            match serde_json::from_slice(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        "Skipping unparsable record {} in {}: {}",
                        line_no + 1,
                        path.display(),
                        e
                    );
                }
            }
        }

        Ok(records)
    }

    pub fn append_one<T: Serialize>(
        &self,
        conversation_id: &str,
        record: &T,
    ) -> Result<(), ConversationLogError> {
        let path = self.log_path(conversation_id)?;
        let line = serde_json::to_string(record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut buf = String::with_capacity(line.len() + 2);
        if !ends_with_newline(&mut file)? {
            buf.push('\n');
        }
        buf.push_str(&line);
        buf.push('\n');

        file.write_all(buf.as_bytes())?;
        file.sync_all()?;

        Ok(())
    }

    /// Append a batch so that it becomes visible all at once.
    ///
    /// The existing log plus the batch is written to a sibling temp file and
    /// renamed over the log: readers and crashes observe either none or all
    /// of the batch.
    pub fn append_many<T: Serialize>(
        &self,
        conversation_id: &str,
        records: &[T],
    ) -> Result<(), ConversationLogError> {
        if records.is_empty() {
            return Ok(());
        }

        let path = self.log_path(conversation_id)?;

        let mut contents = if path.exists() {
            fs::read(&path)?
        } else {
            Vec::new()
        };
        if contents.last().is_some_and(|b| *b != b'\n') {
            contents.push(b'\n');
        }
        for record in records {
            serde_json::to_writer(&mut contents, record)?;
            contents.push(b'\n');
        }

        write_atomically(&path, &contents)
    }

    /// Overwrite the whole log atomically.
    pub fn replace<T: Serialize>(
        &self,
        conversation_id: &str,
        records: &[T],
    ) -> Result<(), ConversationLogError> {
        let path = self.log_path(conversation_id)?;

        let mut contents = Vec::new();
        for record in records {
            serde_json::to_writer(&mut contents, record)?;
            contents.push(b'\n');
        }

        write_atomically(&path, &contents)
    }

    /// Storage names of every persisted conversation, sorted.
    pub fn list(&self) -> Result<Vec<String>, ConversationLogError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove a conversation. Returns false if there was nothing to remove.
    pub fn delete(&self, conversation_id: &str) -> Result<bool, ConversationLogError> {
        let path = self.log_path(conversation_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of non-blank records, counted without parsing them.
    pub fn count(&self, conversation_id: &str) -> Result<usize, ConversationLogError> {
        let path = self.log_path(conversation_id)?;
        if !path.exists() {
            return Ok(0);
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut count = 0;
        for line in reader.split(b'\n') {
            if !is_blank(&line?) {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|b| b.is_ascii_whitespace())
}

fn ends_with_newline(file: &mut File) -> Result<bool, std::io::Error> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), ConversationLogError> {
    let temp_path = path.with_extension("tmp");

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(
            ConversationLog::sanitize_key("agent:main:repl:alice"),
            "agent_main_repl_alice"
        );
        assert_eq!(ConversationLog::sanitize_key("../etc/passwd"), "___etc_passwd");
        assert_eq!(ConversationLog::sanitize_key("ok-name_1"), "ok-name_1");
    }
}
