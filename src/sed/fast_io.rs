// Line-based input and buffered output
//
// Input files are mmapped when possible and scanned for lines with
// memchr; other inputs (standard input, pipes) are read through a
// BufReader.  Output goes through a BufWriter that tracks whether the
// last line written lacked its newline.
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::sed::command::StringSpace;

use memchr::memchr;
use memmap2::Mmap;

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Convert the bytes of a line into a String space, replacing invalid
/// UTF-8 sequences.
fn to_space(bytes: &[u8], has_newline: bool) -> StringSpace {
    StringSpace {
        content: String::from_utf8_lossy(bytes).into_owned(),
        has_newline,
    }
}

/// Cursor for iteration over an mmapped file.
pub struct MmapLineCursor {
    data: Mmap, // Mmapped data; the file can be closed after mapping
    pos: usize, // Position within the data
}

impl MmapLineCursor {
    /// Return the next line, if available, or None.
    fn get_line(&mut self) -> Option<StringSpace> {
        let data = &self.data[..];
        if self.pos >= data.len() {
            return None;
        }

        let start = self.pos;
        match memchr(b'\n', &data[start..]) {
            Some(offset) => {
                self.pos = start + offset + 1;
                Some(to_space(&data[start..start + offset], true))
            }
            None => {
                self.pos = data.len();
                Some(to_space(&data[start..], false))
            }
        }
    }

    /// Return true if the previously returned line was the last one.
    fn last_line(&self) -> bool {
        self.pos >= self.data.len()
    }
}

/// Buffered line reader from any BufRead input.
pub struct ReadLineCursor {
    reader: Box<dyn BufRead>,
    buffer: Vec<u8>,
}

impl ReadLineCursor {
    /// Construct from anything that implements `Read`.
    fn new<R: Read + 'static>(r: R) -> Self {
        Self {
            reader: Box::new(BufReader::new(r)),
            buffer: Vec::new(),
        }
    }

    /// If a line is available, return it.
    fn get_line(&mut self) -> io::Result<Option<StringSpace>> {
        self.buffer.clear();
        // read_until *includes* the '\n' if present
        let bytes_read = self.reader.read_until(b'\n', &mut self.buffer)?;
        if bytes_read == 0 {
            return Ok(None);
        }

        let has_newline = self.buffer.ends_with(b"\n");
        if has_newline {
            self.buffer.pop();
        }
        Ok(Some(to_space(&self.buffer, has_newline)))
    }

    /// Return true if the previously returned line was the last one.
    fn last_line(&mut self) -> io::Result<bool> {
        // FIXME(rust-lang#86423): Replace with BufRead::has_data_left()
        // when/if method becomes stable.
        Ok(self.reader.fill_buf()?.is_empty())
    }
}

/// Unified reader that uses mmap when possible, falls back to buffered reading.
pub enum LineReader {
    MmapInput(MmapLineCursor),
    ReadInput(ReadLineCursor),
}

impl LineReader {
    /// Open the specified file for line input.
    // Use "-" to read from the standard input.
    pub fn open(path: &Path) -> io::Result<Self> {
        if path.as_os_str() == "-" {
            return Ok(LineReader::from_reader(io::stdin()));
        }

        let file = File::open(path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Ok(LineReader::from_reader(file));
        }

        // SAFETY: the mapping is only read; as with other stream editors,
        // concurrent modification of the input file is not supported.
        match unsafe { Mmap::map(&file) } {
            Ok(data) => Ok(LineReader::MmapInput(MmapLineCursor { data, pos: 0 })),
            // Fallback to ReadInput
            Err(_) => Ok(LineReader::from_reader(file)),
        }
    }

    /// Construct a reader for an in-memory or other stream.
    pub fn from_reader<R: Read + 'static>(r: R) -> Self {
        LineReader::ReadInput(ReadLineCursor::new(r))
    }

    /// Return the next line, if available.
    pub fn get_line(&mut self) -> io::Result<Option<StringSpace>> {
        match self {
            LineReader::MmapInput(cursor) => Ok(cursor.get_line()),
            LineReader::ReadInput(cursor) => cursor.get_line(),
        }
    }

    /// Return true if the previously returned line was the last one.
    pub fn last_line(&mut self) -> io::Result<bool> {
        match self {
            LineReader::MmapInput(cursor) => Ok(cursor.last_line()),
            LineReader::ReadInput(cursor) => cursor.last_line(),
        }
    }
}

/// Abstraction for outputting data
/// A line read without a trailing newline is output without one,
/// unless more output follows it.
pub struct OutputBuffer {
    out: BufWriter<Box<dyn Write>>, // Where to write
    missing_newline: bool,          // True if the last line output lacked \n
}

impl OutputBuffer {
    pub fn new(w: Box<dyn Write>) -> Self {
        Self {
            out: BufWriter::new(w),
            missing_newline: false,
        }
    }

    /// Terminate a preceding line output without a newline.
    fn complete_line(&mut self) -> io::Result<()> {
        if self.missing_newline {
            self.missing_newline = false;
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Output the specified space, with a newline if it had one.
    pub fn write_chunk(&mut self, space: &StringSpace) -> io::Result<()> {
        self.complete_line()?;
        self.out.write_all(space.content.as_bytes())?;
        if space.has_newline {
            self.out.write_all(b"\n")?;
        } else {
            self.missing_newline = true;
        }
        Ok(())
    }

    /// Output the specified string as is.
    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        if s.is_empty() {
            return Ok(());
        }
        self.complete_line()?;
        self.out.write_all(s.as_bytes())
    }

    /// Copy the specified file to the output.
    pub fn copy_file(&mut self, path: &Path) -> io::Result<()> {
        let file = match File::open(path) {
            Ok(f) => f,
            // Per POSIX, if the file can't be read treat it as empty.
            Err(_) => return Ok(()),
        };

        let mut reader = BufReader::new(file);
        if reader.fill_buf().map(|b| b.is_empty()).unwrap_or(true) {
            return Ok(());
        }
        self.complete_line()?;
        io::copy(&mut reader, &mut self.out)?;
        Ok(())
    }

    /// Flush all buffered data.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
