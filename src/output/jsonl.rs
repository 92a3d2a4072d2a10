//! Append-only JSONL record log
//!
//! One file per source (`notices_<source>.jsonl`), one JSON object per line.
//! When a file would grow past the configured size it is renamed to
//! `notices_<source>_<unix-ts>.jsonl` and a fresh file is started.

use crate::crawler::Record;
use crate::output::traits::{OutputError, OutputResult, RecordSink};
use async_trait::async_trait;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Local append-only log; the primary sink
#[derive(Debug)]
pub struct JsonlLog {
    dir: PathBuf,
    max_bytes: u64,
    write_lock: Mutex<()>,
}

impl JsonlLog {
    /// Creates the log directory if needed
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> OutputResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_bytes,
            write_lock: Mutex::new(()),
        })
    }

    /// Active log file of a source
    pub fn path_for(&self, source_id: &str) -> PathBuf {
        self.dir.join(format!("notices_{}.jsonl", source_id))
    }

    fn append(&self, record: &Record) -> OutputResult<()> {
        let mut line =
            serde_json::to_string(record).map_err(|e| OutputError::Format(e.to_string()))?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| OutputError::Write("record log lock poisoned".to_string()))?;

        let path = self.path_for(&record.source);
        self.rotate_if_needed(&path, &record.source, line.len() as u64)?;

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn rotate_if_needed(&self, path: &Path, source_id: &str, incoming: u64) -> OutputResult<()> {
        let current = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if current == 0 || current + incoming <= self.max_bytes {
            return Ok(());
        }

        let stamp = Utc::now().timestamp();
        let mut rotated = self.dir.join(format!("notices_{}_{}.jsonl", source_id, stamp));
        let mut n = 1;
        while rotated.exists() {
            rotated = self
                .dir
                .join(format!("notices_{}_{}_{}.jsonl", source_id, stamp, n));
            n += 1;
        }

        std::fs::rename(path, &rotated)?;
        tracing::info!(source = %source_id, "Rotated record log to {}", rotated.display());
        Ok(())
    }
}

#[async_trait]
impl RecordSink for JsonlLog {
    async fn persist(&self, record: &Record) -> OutputResult<()> {
        self.append(record)
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(source: &str, title: &str) -> Record {
        Record {
            source: source.to_string(),
            url: format!("https://{}.example.edu/view?no=1", source),
            title: title.to_string(),
            author: String::new(),
            created_date: "2024-03-05".to_string(),
            sub_category: String::new(),
            content: "body".to_string(),
            raw_html_len: 4,
            files: Vec::new(),
            images: Vec::new(),
            crawled_at: Utc::now(),
        }
    }

    fn read_lines(path: &Path) -> Vec<Record> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_appends_per_source() {
        let dir = TempDir::new().unwrap();
        let log = JsonlLog::new(dir.path(), 1024 * 1024).unwrap();

        log.persist(&record("physics", "first")).await.unwrap();
        log.persist(&record("physics", "second")).await.unwrap();
        log.persist(&record("math", "other")).await.unwrap();

        let physics = read_lines(&log.path_for("physics"));
        assert_eq!(physics.len(), 2);
        assert_eq!(physics[0].title, "first");
        assert_eq!(physics[1].title, "second");
        assert_eq!(read_lines(&log.path_for("math")).len(), 1);
    }

    #[tokio::test]
    async fn test_rotates_when_full() {
        let dir = TempDir::new().unwrap();
        let log = JsonlLog::new(dir.path(), 300).unwrap();

        for i in 0..4 {
            log.persist(&record("physics", &format!("post {}", i)))
                .await
                .unwrap();
        }

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(files.len() > 1);
        assert!(files.iter().any(|f| f == "notices_physics.jsonl"));
        assert!(files
            .iter()
            .all(|f| f.starts_with("notices_physics") && f.ends_with(".jsonl")));

        // Nothing lost across rotations
        let total: usize = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| read_lines(&e.unwrap().path()).len())
            .sum();
        assert_eq!(total, 4);
    }
}
