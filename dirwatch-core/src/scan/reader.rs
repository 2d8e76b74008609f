//! Whole-word occurrence counting in file contents.

use std::path::Path;

use regex::Regex;

use crate::error::{CensusError, Result};

/// Counts whole-word occurrences of a literal token.
///
/// The token is escaped before the word-boundary pattern is built, so regex
/// metacharacters in the token match literally. Content is read as raw bytes
/// and decoded lossily; binary files that pass the extension filter simply
/// count whatever boundaries survive the decode.
#[derive(Debug, Clone)]
pub struct OccurrenceReader {
    token: String,
    pattern: Regex,
}

impl OccurrenceReader {
    pub fn new(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(CensusError::Config(
                "search token must not be empty".into(),
            ));
        }

        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(token)))
            .map_err(|err| CensusError::Config(format!("invalid search token: {err}")))?;

        Ok(Self {
            token: token.to_string(),
            pattern,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Count whole-word matches in `text`. Zero is a valid result.
    pub fn count(&self, text: &str) -> u64 {
        self.pattern.find_iter(text).count() as u64
    }

    /// Read `path` and count matches in its content.
    pub fn count_file(&self, path: &Path) -> Result<u64> {
        let bytes = std::fs::read(path).map_err(|err| CensusError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(self.count(&String::from_utf8_lossy(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn counts_whole_words_only() {
        let reader = OccurrenceReader::new("hello").unwrap();
        assert_eq!(reader.count("hello world, hello"), 2);
        assert_eq!(reader.count("helloworld"), 0);
        assert_eq!(reader.count("say hello."), 1);
        assert_eq!(reader.count("shellohell"), 0);
        assert_eq!(reader.count(""), 0);
    }

    #[test]
    fn token_with_regex_metacharacters_matches_literally() {
        let reader = OccurrenceReader::new("a.b").unwrap();
        assert_eq!(reader.count("a.b and axb"), 1);
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(matches!(
            OccurrenceReader::new(""),
            Err(CensusError::Config(_))
        ));
    }

    #[test]
    fn counts_file_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sample.txt");
        fs::write(&path, "hello\nnot-hello but hello again").unwrap();

        let reader = OccurrenceReader::new("hello").unwrap();
        assert_eq!(reader.count_file(&path).unwrap(), 3);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let reader = OccurrenceReader::new("hello").unwrap();
        let result = reader.count_file(Path::new("/nonexistent/file.txt"));
        assert!(matches!(result, Err(CensusError::Read { .. })));
    }

    #[test]
    fn binary_content_is_decoded_lossily() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.bin");
        fs::write(&path, [0xff, 0xfe, b' ', b'h', b'i', b' ', 0x00]).unwrap();

        let reader = OccurrenceReader::new("hi").unwrap();
        assert_eq!(reader.count_file(&path).unwrap(), 1);
    }
}
