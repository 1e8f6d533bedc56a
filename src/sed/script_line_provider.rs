// Provide the script contents line by line
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::path::PathBuf;

use uucore::display::Quotable;
use uucore::error::{FromIo, UResult};

#[derive(Debug, Clone, PartialEq, Eq)]
/// A compilation unit: script text given with -e (or as the first
/// argument), or a script file given with -f.
pub enum ScriptValue {
    StringVal(String),
    PathVal(PathBuf),
}

impl ScriptValue {
    /// Return true if the unit reads the script from the standard input.
    pub fn is_stdin(&self) -> bool {
        matches!(self, ScriptValue::PathVal(p) if p.as_os_str() == "-" || p.as_os_str() == "/dev/stdin")
    }
}

/// The chain of compilation units, delivered as one stream of lines.
pub struct ScriptLineProvider {
    sources: Vec<ScriptValue>,
    /// Index of the next unit to open
    next_source: usize,
    unit: Option<OpenUnit>,
    /// Number of string (-e) units opened so far
    expressions_seen: usize,
    /// Lines delivered across all units
    total_lines: usize,
}

/// The compilation unit currently being read.
struct OpenUnit {
    reader: Box<dyn BufRead>,
    name: String,
    line_number: usize,
}

impl ScriptLineProvider {
    pub fn new(sources: Vec<ScriptValue>) -> Self {
        Self {
            sources,
            next_source: 0,
            unit: None,
            expressions_seen: 0,
            total_lines: 0,
        }
    }

    /// Line number within the current compilation unit.
    pub fn get_line_number(&self) -> usize {
        self.unit.as_ref().map_or(0, |u| u.line_number)
    }

    /// Name of the current compilation unit, for diagnostics.
    pub fn get_input_name(&self) -> &str {
        self.unit.as_ref().map_or("", |u| u.name.as_str())
    }

    /// Return true if the line most recently returned is the very first
    /// line of the whole script.
    pub fn is_first_line(&self) -> bool {
        self.total_lines == 1
    }

    /// Return the next script line without its newline, or None once
    /// every compilation unit is exhausted.
    pub fn next_line(&mut self) -> UResult<Option<String>> {
        let mut line = String::new();

        loop {
            if let Some(unit) = &mut self.unit {
                let n = unit
                    .reader
                    .read_line(&mut line)
                    .map_err_context(|| format!("reading script {}", unit.name.quote()))?;
                if n > 0 {
                    unit.line_number += 1;
                    self.total_lines += 1;
                    if line.ends_with('\n') {
                        line.pop();
                    }
                    return Ok(Some(line));
                }
            }

            if self.next_source >= self.sources.len() {
                // Keep the last unit's name for diagnostics after the end.
                return Ok(None);
            }
            let unit = self.open_source(self.next_source)?;
            self.next_source += 1;
            self.unit = Some(unit);
        }
    }

    fn open_source(&mut self, index: usize) -> UResult<OpenUnit> {
        let source = &self.sources[index];
        let (reader, name): (Box<dyn BufRead>, String) = match source {
            ScriptValue::StringVal(s) => {
                self.expressions_seen += 1;
                (
                    Box::new(Cursor::new(s.clone().into_bytes())),
                    format!("-e expression #{}", self.expressions_seen),
                )
            }
            ScriptValue::PathVal(_) if source.is_stdin() => {
                (Box::new(BufReader::new(io::stdin())), "<stdin>".to_string())
            }
            ScriptValue::PathVal(p) => {
                let file =
                    File::open(p).map_err_context(|| format!("couldn't open file {}", p.quote()))?;
                (Box::new(BufReader::new(file)), p.to_string_lossy().into_owned())
            }
        };

        Ok(OpenUnit {
            reader,
            name,
            line_number: 0,
        })
    }
}

#[cfg(test)]
impl ScriptLineProvider {
    pub fn with_active_state(input_name: &str, line_number: usize) -> Self {
        Self {
            sources: vec![],
            next_source: 0,
            unit: Some(OpenUnit {
                reader: Box::new(Cursor::new(Vec::new())),
                name: input_name.to_string(),
                line_number,
            }),
            expressions_seen: 0,
            total_lines: line_number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn collect(provider: &mut ScriptLineProvider) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = provider.next_line().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_string_source() {
        let input = vec![
            ScriptValue::StringVal("line one\nline two\n".to_string()),
            ScriptValue::StringVal("line three".to_string()),
        ];
        let mut provider = ScriptLineProvider::new(input);
        assert_eq!(
            collect(&mut provider),
            vec!["line one", "line two", "line three"]
        );
    }

    #[test]
    fn test_newline_is_stripped() {
        let input = vec![ScriptValue::StringVal("a\\\n  text\n".to_string())];
        let mut provider = ScriptLineProvider::new(input);
        assert_eq!(provider.next_line().unwrap(), Some("a\\".to_string()));
        assert_eq!(provider.next_line().unwrap(), Some("  text".to_string()));
        assert_eq!(provider.next_line().unwrap(), None);
        assert_eq!(provider.next_line().unwrap(), None);
    }

    #[test]
    fn test_mixed_source() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "file line 1").unwrap();
        writeln!(temp_file, "file line 2").unwrap();
        let empty_file = NamedTempFile::new().unwrap();

        let input = vec![
            ScriptValue::PathVal(temp_file.path().to_path_buf()),
            ScriptValue::StringVal("script line 1".to_string()),
            ScriptValue::StringVal("".to_string()),
            ScriptValue::PathVal(empty_file.path().to_path_buf()),
            ScriptValue::StringVal("other script line 1".to_string()),
        ];
        let mut provider = ScriptLineProvider::new(input);

        assert_eq!(
            collect(&mut provider),
            vec![
                "file line 1",
                "file line 2",
                "script line 1",
                "other script line 1",
            ]
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let input = vec![ScriptValue::PathVal(PathBuf::from(
            "/definitely/not/here.sed",
        ))];
        let mut provider = ScriptLineProvider::new(input);
        let err = provider.next_line().unwrap_err();
        assert!(err.to_string().contains("couldn't open file"));
    }

    #[test]
    fn test_getters() {
        let input = vec![
            ScriptValue::StringVal("l1\nl2\n".to_string()),
            ScriptValue::StringVal("l3".to_string()),
        ];
        let mut provider = ScriptLineProvider::new(input);

        assert_eq!(provider.next_line().unwrap().unwrap(), "l1");
        assert_eq!(provider.get_line_number(), 1);
        assert_eq!(provider.get_input_name(), "-e expression #1");
        assert!(provider.is_first_line());

        assert_eq!(provider.next_line().unwrap().unwrap(), "l2");
        assert_eq!(provider.get_line_number(), 2);
        assert!(!provider.is_first_line());

        assert_eq!(provider.next_line().unwrap().unwrap(), "l3");
        assert_eq!(provider.get_line_number(), 1);
        assert_eq!(provider.get_input_name(), "-e expression #2");
        assert!(!provider.is_first_line());
    }

    #[test]
    fn test_is_stdin() {
        assert!(ScriptValue::PathVal(PathBuf::from("-")).is_stdin());
        assert!(ScriptValue::PathVal(PathBuf::from("/dev/stdin")).is_stdin());
        assert!(!ScriptValue::PathVal(PathBuf::from("x.sed")).is_stdin());
        assert!(!ScriptValue::StringVal("-".to_string()).is_stdin());
    }
}
