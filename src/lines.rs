//! Lazy line reading for large dictionary files.

use crate::error::{Result, WnError};
use futures::Stream;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A file that can be read line by line any number of times.
///
/// Each call to [`LineSource::open`] starts a fresh pass from the beginning;
/// passes never share a cursor.
#[derive(Debug, Clone)]
pub struct LineSource {
    path: PathBuf,
}

impl LineSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LineSource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a new pass over the file.
    pub async fn open(&self) -> Result<Lines> {
        let file = File::open(&self.path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => WnError::DataFileNotFound(self.path.display().to_string()),
            _ => WnError::Io(e),
        })?;
        Ok(Lines {
            inner: BufReader::with_capacity(READ_BUFFER_SIZE, file).lines(),
            path: self.path.clone(),
            line_number: 0,
        })
    }
}

/// One pass over a [`LineSource`]. Finite and not restartable.
pub struct Lines {
    inner: tokio::io::Lines<BufReader<File>>,
    path: PathBuf,
    line_number: usize,
}

impl Lines {
    /// Returns the next line without its terminator, or `None` at end of file.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        match self.inner.next_line().await {
            Ok(Some(line)) => {
                self.line_number += 1;
                Ok(Some(line))
            }
            Ok(None) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(WnError::Decode {
                path: self.path.display().to_string(),
                line: self.line_number + 1,
            }),
            Err(e) => Err(WnError::Io(e)),
        }
    }

    /// 1-based number of the line most recently returned.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<String>> {
        futures::stream::try_unfold(self, |mut lines| async move {
            Ok(lines.next_line().await?.map(|line| (line, lines)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reads_all_lines_including_unterminated_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.noun");
        std::fs::write(&path, "first\r\nsecond\nthird").unwrap();

        let mut lines = LineSource::new(&path).open().await.unwrap();
        let mut seen = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            seen.push(line);
        }
        assert_eq!(seen, vec!["first", "second", "third"]);
        assert_eq!(lines.line_number(), 3);
    }

    #[tokio::test]
    async fn each_open_restarts_from_the_beginning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.verb");
        std::fs::write(&path, "a\nb\n").unwrap();
        let source = LineSource::new(&path);

        let mut first = source.open().await.unwrap();
        assert_eq!(first.next_line().await.unwrap().as_deref(), Some("a"));

        let all: Vec<String> = source.open().await.unwrap().into_stream().try_collect().await.unwrap();
        assert_eq!(all, vec!["a", "b"]);
        assert_eq!(first.next_line().await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn invalid_utf8_reports_line_number() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.adv");
        std::fs::write(&path, b"ok\n\xff\xfe broken\n").unwrap();

        let mut lines = LineSource::new(&path).open().await.unwrap();
        assert!(lines.next_line().await.unwrap().is_some());
        match lines.next_line().await {
            Err(WnError::Decode { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = tempdir().unwrap();
        let result = LineSource::new(dir.path().join("data.noun")).open().await;
        assert!(matches!(result, Err(WnError::DataFileNotFound(_))));
    }
}
