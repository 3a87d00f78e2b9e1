//! Where work items come from.
//!
//! Every source produces a fully materialized, ordered list of item ids
//! before the run starts.

use crate::error::{ParunError, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Produces the ordered list of work item ids for a run.
pub trait WorkItemSource {
    fn items(&self) -> Result<Vec<String>>;
}

/// Items given directly, e.g. repeated `--item` arguments.
#[derive(Debug, Clone, Default)]
pub struct ListSource(pub Vec<String>);

impl WorkItemSource for ListSource {
    fn items(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// One item per line of a file, or of stdin when the path is `-`.
///
/// Blank lines and lines starting with `#` are skipped; surrounding
/// whitespace is trimmed.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn parse_lines<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut items = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        items.push(trimmed.to_string());
    }
    Ok(items)
}

impl WorkItemSource for FileSource {
    fn items(&self) -> Result<Vec<String>> {
        if self.path.as_os_str() == "-" {
            return parse_lines(std::io::stdin().lock());
        }
        let file = std::fs::File::open(&self.path).map_err(|e| {
            ParunError::Source(format!("Cannot read {}: {}", self.path.display(), e))
        })?;
        let items = parse_lines(file)?;
        debug!(path = %self.path.display(), items = items.len(), "Read item file");
        Ok(items)
    }
}

/// Items printed by a collection command, one per line, run through `sh -c`.
#[derive(Debug, Clone)]
pub struct CommandSource {
    pub script: String,
}

impl CommandSource {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl WorkItemSource for CommandSource {
    fn items(&self) -> Result<Vec<String>> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.script)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| ParunError::Source(format!("Cannot run '{}': {}", self.script, e)))?;

        if !output.status.success() {
            return Err(ParunError::Source(format!(
                "Collection command '{}' failed with {}",
                self.script, output.status
            )));
        }
        let items = parse_lines(output.stdout.as_slice())?;
        debug!(command = %self.script, items = items.len(), "Collected items");
        Ok(items)
    }
}

/// Concatenation of several sources, in order. Duplicates are kept.
#[derive(Default)]
pub struct Chain {
    sources: Vec<Box<dyn WorkItemSource>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: Box<dyn WorkItemSource>) {
        self.sources.push(source);
    }
}

impl WorkItemSource for Chain {
    fn items(&self) -> Result<Vec<String>> {
        let mut items = Vec::new();
        for source in &self.sources {
            items.extend(source.items()?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_source_skips_comments_and_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# collected 3 tests").unwrap();
        writeln!(file, "tests/test_a.py::test_one").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  tests/test_a.py::test_two  ").unwrap();
        writeln!(file, "tests/test_b.py::test_three").unwrap();

        let items = FileSource::new(file.path()).items().unwrap();
        assert_eq!(
            items,
            vec![
                "tests/test_a.py::test_one",
                "tests/test_a.py::test_two",
                "tests/test_b.py::test_three",
            ]
        );
    }

    #[test]
    fn test_missing_file_is_source_error() {
        let err = FileSource::new("/nonexistent/items.txt").items().unwrap_err();
        assert!(matches!(err, ParunError::Source(_)));
        assert!(err.to_string().contains("/nonexistent/items.txt"));
    }

    #[test]
    fn test_command_source() {
        let items = CommandSource::new("printf 'a\\nb\\n\\nc\\n'").items().unwrap();
        assert_eq!(items, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failing_command_source() {
        let err = CommandSource::new("echo a; exit 4").items().unwrap_err();
        assert!(err.to_string().contains("failed"));
    }

    #[test]
    fn test_chain_keeps_order_and_duplicates() {
        let mut chain = Chain::new();
        chain.push(Box::new(ListSource(vec!["x".into(), "y".into()])));
        chain.push(Box::new(CommandSource::new("echo y; echo z")));
        assert_eq!(chain.items().unwrap(), vec!["x", "y", "y", "z"]);
    }

    #[test]
    fn test_empty_chain() {
        assert!(Chain::new().items().unwrap().is_empty());
    }
}
