//! Line source.

use crate::element::Source;
use crate::error::{Error, Result};
use crate::pipeline::SourceInput;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

enum LineReader {
    File(Lines<BufReader<File>>),
    Text(std::vec::IntoIter<String>),
}

/// Streams the lines of a file or string, without line terminators.
///
/// Registered as `text-streamer`.
pub struct TextStreamer {
    lines: LineReader,
}

impl TextStreamer {
    /// Open `input`.
    ///
    /// Fails with [`Error::SourceUnavailable`] if a file cannot be opened.
    pub fn open(input: &SourceInput) -> Result<Self> {
        let lines = match input {
            SourceInput::File(path) => {
                let file = File::open(path).map_err(|e| Error::SourceUnavailable {
                    name: super::TEXT_STREAMER.to_string(),
                    reason: format!("{}: {}", path.display(), e),
                })?;
                tracing::debug!("streaming lines from {}", path.display());
                LineReader::File(BufReader::new(file).lines())
            }
            SourceInput::Text(text) => LineReader::Text(
                text.lines()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
        };
        Ok(Self { lines })
    }
}

impl Source for TextStreamer {
    type Output = String;

    fn produce(&mut self) -> Result<Option<String>> {
        match &mut self.lines {
            LineReader::File(lines) => lines.next().transpose().map_err(Error::from),
            LineReader::Text(lines) => Ok(lines.next()),
        }
    }

    fn name(&self) -> &str {
        super::TEXT_STREAMER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn drain(mut source: TextStreamer) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = source.produce().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_text_lines() {
        let source = TextStreamer::open(&SourceInput::text("one two\nthree\n\nfour")).unwrap();
        assert_eq!(drain(source), vec!["one two", "three", "", "four"]);
    }

    #[test]
    fn test_file_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first line").unwrap();
        writeln!(file, "second line").unwrap();

        let source = TextStreamer::open(&SourceInput::file(file.path())).unwrap();
        assert_eq!(drain(source), vec!["first line", "second line"]);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let err = TextStreamer::open(&SourceInput::file(&missing)).err().unwrap();
        match err {
            Error::SourceUnavailable { name, reason } => {
                assert_eq!(name, "text-streamer");
                assert!(reason.contains("missing.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
