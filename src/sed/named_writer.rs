// An abstraction for output files created on entry and flushed on exit
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::sed::error_handling::{ScriptLocation, runtime_error};

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use uucore::display::Quotable;
use uucore::error::UResult;

#[derive(Debug)]
enum Target {
    /// Written through the main output stream, keeping its ordering
    Stdout,
    Stderr,
    /// Not yet created
    Unopened,
    File(BufWriter<File>),
}

#[derive(Debug)]
/// Writer that tracks its file name for better error messages
pub struct NamedWriter {
    pub path: PathBuf,
    target: Target,
    location: ScriptLocation,
}

impl NamedWriter {
    /// Create a writer for the specified path. Regular files are created
    /// (and truncated) now, unless defer is set, in which case this happens
    /// on the first write.
    pub fn new(path: PathBuf, location: ScriptLocation, defer: bool) -> UResult<Rc<RefCell<Self>>> {
        let target = if path == Path::new("/dev/stdout") {
            Target::Stdout
        } else if path == Path::new("/dev/stderr") {
            Target::Stderr
        } else {
            Target::Unopened
        };

        let mut writer = NamedWriter {
            path,
            target,
            location,
        };
        if !defer {
            writer.open()?;
        }
        Ok(Rc::new(RefCell::new(writer)))
    }

    /// Return true if output must go to the main output stream.
    pub fn is_stdout(&self) -> bool {
        matches!(self.target, Target::Stdout)
    }

    fn open(&mut self) -> UResult<()> {
        if !matches!(self.target, Target::Unopened) {
            return Ok(());
        }

        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
        {
            Ok(file) => {
                self.target = Target::File(BufWriter::new(file));
                Ok(())
            }
            Err(e) => runtime_error(
                &self.location,
                format!("couldn't open file {}: {e}", self.path.quote()),
            ),
        }
    }

    /// Write a line to the file with a newline, returning descriptive errors.
    pub fn write_line(&mut self, line: &str) -> UResult<()> {
        self.open()?;
        let result = match &mut self.target {
            Target::File(writer) => writeln!(writer, "{line}"),
            Target::Stderr => writeln!(io::stderr(), "{line}"),
            Target::Stdout | Target::Unopened => Ok(()),
        };
        result.or_else(|e| {
            runtime_error(
                &self.location,
                format!("couldn't write to {}: {e}", self.path.quote()),
            )
        })
    }

    /// Flush the writer, returning a descriptive error.
    pub fn flush(&mut self) -> UResult<()> {
        let result = match &mut self.target {
            Target::File(writer) => writer.flush(),
            _ => Ok(()),
        };
        result.or_else(|e| {
            runtime_error(
                &self.location,
                format!("couldn't flush {}: {e}", self.path.quote()),
            )
        })
    }
}

/// Flush buffered content of all writers, returning descriptive errors.
pub fn flush_all(writers: &[Rc<RefCell<NamedWriter>>]) -> UResult<()> {
    for handle in writers {
        handle.borrow_mut().flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_created_eagerly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old contents").unwrap();

        let _writer = NamedWriter::new(path.clone(), ScriptLocation::default(), false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_deferred_creation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("later.txt");

        let writer = NamedWriter::new(path.clone(), ScriptLocation::default(), true).unwrap();
        assert!(!path.exists());

        writer.borrow_mut().write_line("hello").unwrap();
        flush_all(&[Rc::clone(&writer)]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn test_lines_accumulate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let writer = NamedWriter::new(path.clone(), ScriptLocation::default(), false).unwrap();
        writer.borrow_mut().write_line("one").unwrap();
        writer.borrow_mut().write_line("two").unwrap();
        writer.borrow_mut().flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_stdout_target() {
        let writer =
            NamedWriter::new(PathBuf::from("/dev/stdout"), ScriptLocation::default(), false)
                .unwrap();
        assert!(writer.borrow().is_stdout());
    }

    #[test]
    fn test_create_failure() {
        let location = ScriptLocation {
            input_name: "-e expression #1".to_string(),
            line_number: 1,
            column_number: 3,
        };
        let err = NamedWriter::new(PathBuf::from("/nonexistent/dir/out"), location, false)
            .unwrap_err();
        assert!(err.to_string().contains("couldn't open file"));
        assert_eq!(err.code(), 2);
    }
}
