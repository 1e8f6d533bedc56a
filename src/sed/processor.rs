// Process the files with the compiled scripts
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::sed::command::{
    Address, AppendElement, Command, CommandData, Occurrence, ProcessingContext, Script,
    ScriptRegex, StringSpace, Substitution, Transliteration,
};
use crate::sed::error_handling::{ScriptLocation, runtime_error};
use crate::sed::fast_io::LineReader;
use crate::sed::fast_regex::Regex;
use crate::sed::in_place::InPlace;
use crate::sed::named_writer::{NamedWriter, flush_all};
use crate::sed::unparse::{command_text, unparse};

use std::collections::VecDeque;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::rc::Rc;

use uucore::display::Quotable;
use uucore::error::{FromIo, UResult, set_exit_code};
use uucore::show_error;

/// Exit code for inputs that couldn't be read
const UNREADABLE_INPUT_EXIT_CODE: i32 = 2;

/// How processing continues after a command
#[derive(Debug, Clone, PartialEq, Eq)]
enum Flow {
    /// Execute the next command
    Continue,
    /// End the cycle, printing the pattern space unless quiet
    EndCycle,
    /// End the cycle without printing
    Delete,
    /// Start a new cycle without reading input
    Restart,
    /// Continue execution at the command with the specified path
    Branch(Vec<usize>),
    /// Stop processing with the specified exit code
    Quit { print: bool, code: i32 },
}

/// The chain of input files, presented as a single line source.
struct InputChain {
    /// Files not yet opened
    pending: VecDeque<PathBuf>,
    /// Files opened to look for the last line
    ahead: VecDeque<(PathBuf, LineReader)>,
    current: Option<LineReader>,
    /// True if `$` refers to the last line of each file
    separate: bool,
}

impl InputChain {
    fn new(files: Vec<PathBuf>, separate: bool) -> Self {
        Self {
            pending: files.into(),
            ahead: VecDeque::new(),
            current: None,
            separate,
        }
    }

    /// Open the next readable file, reporting the ones that can't be read.
    fn open_next(&mut self) -> Option<(PathBuf, LineReader)> {
        while let Some(path) = self.pending.pop_front() {
            if path.is_dir() {
                show_error!("read error on {}: Is a directory", path.maybe_quote());
                set_exit_code(UNREADABLE_INPUT_EXIT_CODE);
                continue;
            }

            match LineReader::open(&path)
                .map_err_context(|| format!("can't read {}", path.maybe_quote()))
            {
                Ok(reader) => return Some((path, reader)),
                Err(e) => {
                    show_error!("{e}");
                    set_exit_code(UNREADABLE_INPUT_EXIT_CODE);
                }
            }
        }
        None
    }

    /// Make the next file current, returning its name, or None at the
    /// end of the input.
    fn next_file(&mut self) -> Option<PathBuf> {
        let (path, reader) = self.ahead.pop_front().or_else(|| self.open_next())?;
        self.current = Some(reader);
        Some(path)
    }

    /// Return the next line of the current file.
    fn read_line(&mut self) -> UResult<Option<StringSpace>> {
        match &mut self.current {
            Some(reader) => Ok(reader.get_line()?),
            None => Ok(None),
        }
    }

    /// Return true if the last line read is the one `$` addresses:
    /// no lines follow it in the current file when files are separate,
    /// or in any remaining file otherwise.
    fn is_last_line(&mut self) -> UResult<bool> {
        if let Some(reader) = &mut self.current {
            if !reader.last_line()? {
                return Ok(false);
            }
        }
        if self.separate {
            return Ok(true);
        }

        for (_, reader) in &mut self.ahead {
            if !reader.last_line()? {
                return Ok(false);
            }
        }
        while let Some((path, mut reader)) = self.open_next() {
            let empty = reader.last_line()?;
            self.ahead.push_back((path, reader));
            if !empty {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// The state of the script's execution over the input
struct Processor<'a> {
    context: &'a mut ProcessingContext,
    input: InputChain,
    output: InPlace,
    pattern: StringSpace,
    /// Set when a new file starts in separate mode, to reset ranges
    new_document: bool,
}

impl Processor<'_> {
    /// Switch to the next input file, finishing any in-place edit of the
    /// previous one. Return false at the end of the input.
    fn open_next_file(&mut self) -> UResult<bool> {
        self.output.end()?;
        let Some(path) = self.input.next_file() else {
            return Ok(false);
        };

        self.output.begin(&path)?;
        self.context.input_name = path.to_string_lossy().into_owned();
        if self.context.separate {
            self.context.line_number = 0;
            self.new_document = true;
        }
        Ok(true)
    }

    /// Return the next input line, advancing through the input files.
    fn read_pattern_space(&mut self) -> UResult<Option<StringSpace>> {
        loop {
            if let Some(space) = self.input.read_line()? {
                self.context.line_number += 1;
                self.context.substitution_made = false;
                return Ok(Some(space));
            }
            if !self.open_next_file()? {
                return Ok(None);
            }
        }
    }

    /// Return the RE to use for re: its own, or the last one used.
    fn resolve_regex(&mut self, re: &ScriptRegex, location: &ScriptLocation) -> UResult<Rc<Regex>> {
        match &re.compiled {
            Some(compiled) => {
                self.context.saved_regex = Some(Rc::clone(compiled));
                Ok(Rc::clone(compiled))
            }
            None => match &self.context.saved_regex {
                Some(saved) => Ok(Rc::clone(saved)),
                None => runtime_error(location, "no previous regular expression"),
            },
        }
    }

    /// Return true if the address matches the current line.
    fn match_address(&mut self, addr: &Address, location: &ScriptLocation) -> UResult<bool> {
        match addr {
            Address::Line(n) => Ok(self.context.line_number == *n),
            Address::Last => self.input.is_last_line(),
            // Only valid as a range end
            Address::RelLine(_) => Ok(false),
            Address::Re(re) => {
                let regex = self.resolve_regex(re, location)?;
                regex.is_match(&self.pattern.content)
            }
        }
    }

    /// Return true if the line is within the range of addr1 and addr2,
    /// updating start_line as the range opens and closes.
    fn match_range(
        &mut self,
        addr1: &Address,
        addr2: &Address,
        start_line: &mut Option<usize>,
        location: &ScriptLocation,
    ) -> UResult<bool> {
        let line = self.context.line_number;

        if let Some(start) = *start_line {
            let closes = match addr2 {
                Address::Line(n) => line >= *n,
                Address::RelLine(n) => line - start >= *n,
                Address::Last | Address::Re(_) => self.match_address(addr2, location)?,
            };
            if closes {
                *start_line = None;
            }
            return Ok(true);
        }

        // Line 0 opens the range before the first line, so that the
        // end RE can already match on it.
        let from_zero = matches!(addr1, Address::Line(0));
        let opens = if from_zero {
            line == 1
        } else {
            self.match_address(addr1, location)?
        };
        if !opens {
            return Ok(false);
        }

        let closes_now = match addr2 {
            Address::Line(n) => *n <= line,
            Address::RelLine(n) => *n == 0,
            Address::Last => self.input.is_last_line()?,
            Address::Re(_) => from_zero && self.match_address(addr2, location)?,
        };
        if !closes_now {
            *start_line = Some(line);
        }
        Ok(true)
    }

    /// Return true if the command applies to the current line.
    fn applies(&mut self, cmd: &mut Command) -> UResult<bool> {
        let Command {
            addr1,
            addr2,
            start_line,
            non_select,
            location,
            ..
        } = cmd;

        let selected = match (addr1.as_ref(), addr2.as_ref()) {
            (None, _) => true,
            (Some(a1), None) => self.match_address(a1, location)?,
            (Some(a1), Some(a2)) => self.match_range(a1, a2, start_line, location)?,
        };
        Ok(selected != *non_select)
    }

    /// Output the queued a and r elements.
    fn flush_appends(&mut self) -> UResult<()> {
        for element in std::mem::take(&mut self.context.append_elements) {
            match element {
                AppendElement::Text(text) => self.output.output().write_str(&text)?,
                AppendElement::Path(path) => self.output.output().copy_file(&path)?,
            }
        }
        Ok(())
    }

    /// Write the line to the writer, which may be the standard output.
    fn write_to(&mut self, writer: &Rc<std::cell::RefCell<NamedWriter>>, line: &str) -> UResult<()> {
        if writer.borrow().is_stdout() {
            self.output.stdout().write_str(&format!("{line}\n"))?;
            Ok(())
        } else {
            writer.borrow_mut().write_line(line)
        }
    }

    /// Execute the commands starting at the resume path, returning how
    /// processing continues after them.
    fn execute_sequence(&mut self, commands: &mut [Command], resume: &[usize]) -> UResult<Flow> {
        let mut index = 0;

        if let Some((&first, inner)) = resume.split_first() {
            index = first;
            // Enter a block containing the target without checking its address.
            if !inner.is_empty() {
                if let Some(CommandData::Block(body)) =
                    commands.get_mut(first).map(|cmd| &mut cmd.data)
                {
                    let flow = self.execute_sequence(body, inner)?;
                    if flow != Flow::Continue {
                        return Ok(flow);
                    }
                }
                index += 1;
            }
        }

        while let Some(cmd) = commands.get_mut(index) {
            if self.applies(cmd)? {
                if self.context.debug {
                    let text = format!("COMMAND: {}\n", command_text(cmd));
                    self.output.output().write_str(&text)?;
                }
                let flow = self.execute_command(cmd)?;
                if flow != Flow::Continue {
                    return Ok(flow);
                }
            }
            index += 1;
        }
        Ok(Flow::Continue)
    }

    /// Execute the whole script once, following branches.
    fn execute_script(&mut self, commands: &mut [Command]) -> UResult<Flow> {
        let mut resume = Vec::new();
        loop {
            match self.execute_sequence(commands, &resume)? {
                Flow::Branch(path) => resume = path,
                flow => return Ok(flow),
            }
        }
    }

    /// Return how execution continues with a branch to target.
    fn branch(data: &CommandData) -> Flow {
        match data {
            CommandData::Branch(Some(target)) => Flow::Branch(target.path.clone()),
            _ => Flow::EndCycle,
        }
    }

    /// Execute a single command that applies to the current line.
    fn execute_command(&mut self, cmd: &mut Command) -> UResult<Flow> {
        match cmd.code {
            '{' => {
                if let CommandData::Block(body) = &mut cmd.data {
                    return self.execute_sequence(body, &[]);
                }
            }
            'a' => {
                if let CommandData::Text(text) = &cmd.data {
                    self.context
                        .append_elements
                        .push(AppendElement::Text(Rc::clone(text)));
                }
            }
            'b' => return Ok(Self::branch(&cmd.data)),
            'c' => {
                // Within a range the text is output at its end.
                if cmd.addr2.is_none() || cmd.start_line.is_none() {
                    if let CommandData::Text(text) = &cmd.data {
                        self.output.output().write_str(text)?;
                    }
                }
                return Ok(Flow::Delete);
            }
            'd' => return Ok(Flow::Delete),
            'D' => match self.pattern.content.find('\n') {
                None => return Ok(Flow::Delete),
                Some(pos) => {
                    self.pattern.content.drain(..=pos);
                    return Ok(Flow::Restart);
                }
            },
            'g' => self.pattern.content.clone_from(&self.context.hold.content),
            'G' => {
                self.pattern.content.push('\n');
                self.pattern.content.push_str(&self.context.hold.content);
            }
            'h' => self.context.hold.content.clone_from(&self.pattern.content),
            'H' => {
                self.context.hold.content.push('\n');
                self.context.hold.content.push_str(&self.pattern.content);
            }
            'i' => {
                if let CommandData::Text(text) = &cmd.data {
                    self.output.output().write_str(text)?;
                }
            }
            'l' => {
                let width = match cmd.data {
                    CommandData::Number(n) => n,
                    _ => self.context.length,
                };
                let listing = list_line(&self.pattern.content, width);
                self.output.output().write_str(&listing)?;
            }
            'n' => {
                if self.input.is_last_line()? {
                    return Ok(Flow::EndCycle);
                }
                if !self.context.quiet {
                    self.output.output().write_chunk(&self.pattern)?;
                }
                self.flush_appends()?;
                match self.read_pattern_space()? {
                    Some(space) => self.pattern = space,
                    None => return Ok(Flow::Delete),
                }
            }
            'N' => {
                if self.input.is_last_line()? {
                    return Ok(if self.context.posix {
                        Flow::Delete
                    } else {
                        Flow::EndCycle
                    });
                }
                self.flush_appends()?;
                if let Some(space) = self.read_pattern_space()? {
                    self.pattern.content.push('\n');
                    self.pattern.content.push_str(&space.content);
                    self.pattern.has_newline = space.has_newline;
                }
            }
            'p' => self.output.output().write_chunk(&self.pattern)?,
            'P' => match self.pattern.content.find('\n') {
                Some(pos) => {
                    let first = StringSpace::new(&self.pattern.content[..pos]);
                    self.output.output().write_chunk(&first)?;
                }
                None => self.output.output().write_chunk(&self.pattern)?,
            },
            'q' | 'Q' => {
                let code = match cmd.data {
                    CommandData::Number(n) => i32::try_from(n).unwrap_or(i32::MAX),
                    _ => 0,
                };
                return Ok(Flow::Quit {
                    print: cmd.code == 'q',
                    code,
                });
            }
            'r' => {
                if let CommandData::Path(path) = &cmd.data {
                    self.context
                        .append_elements
                        .push(AppendElement::Path(path.clone()));
                }
            }
            's' => {
                if let CommandData::Substitution(sub) = &cmd.data {
                    self.substitute(sub, &cmd.location)?;
                }
            }
            't' => {
                if self.context.substitution_made {
                    self.context.substitution_made = false;
                    return Ok(Self::branch(&cmd.data));
                }
            }
            'T' => {
                if !self.context.substitution_made {
                    return Ok(Self::branch(&cmd.data));
                }
                self.context.substitution_made = false;
            }
            'w' => {
                if let CommandData::NamedWriter(writer) = &cmd.data {
                    let line = self.pattern.content.clone();
                    self.write_to(writer, &line)?;
                }
            }
            'x' => std::mem::swap(&mut self.pattern.content, &mut self.context.hold.content),
            'y' => {
                if let CommandData::Transliteration(trans) = &cmd.data {
                    transliterate(trans, &mut self.pattern.content);
                }
            }
            '=' => {
                let number = format!("{}\n", self.context.line_number);
                self.output.output().write_str(&number)?;
            }
            // Labels are only branch targets.
            ':' => (),
            _ => (),
        }
        Ok(Flow::Continue)
    }

    /// Run a substitution on the pattern space, returning true if it
    /// replaced anything.
    fn substitute(&mut self, sub: &Substitution, location: &ScriptLocation) -> UResult<bool> {
        let regex = self.resolve_regex(&sub.regex, location)?;
        let text = self.pattern.content.as_str();

        let mut result = String::new();
        let mut copied_to = 0; // Text before this offset is in result
        let mut count = 0;
        let mut replaced = false;
        let mut previous_end = None;
        let mut start = 0;

        while start <= text.len() {
            let Some(caps) = regex.captures_at(text, start)? else {
                break;
            };
            let (match_start, match_end) = caps.whole();
            let empty = match_start == match_end;

            // An empty match adjacent to the previous match doesn't count.
            if !(empty && previous_end == Some(match_start)) {
                count += 1;
                let selected = match sub.occurrence {
                    Occurrence::Nth(n) => count == n,
                    Occurrence::Global => true,
                };
                if selected {
                    result.push_str(&text[copied_to..match_start]);
                    sub.replacement.apply_captures(location, &caps, &mut result)?;
                    copied_to = match_end;
                    replaced = true;
                    if matches!(sub.occurrence, Occurrence::Nth(_)) {
                        break;
                    }
                }
                previous_end = Some(match_end);
            }

            if empty {
                // Step over a character to make progress.
                match text[match_end..].chars().next() {
                    Some(c) => start = match_end + c.len_utf8(),
                    None => break,
                }
            } else {
                start = match_end;
            }
        }

        if !replaced {
            return Ok(false);
        }

        result.push_str(&text[copied_to..]);
        self.pattern.content = result;
        self.context.substitution_made = true;

        if sub.print_flag {
            self.output.output().write_chunk(&self.pattern)?;
        }
        if let Some(writer) = &sub.write_file {
            let line = self.pattern.content.clone();
            self.write_to(writer, &line)?;
        }
        Ok(true)
    }

    /// Process all input lines with the commands, returning the exit
    /// code of a `q` or `Q` command, or None at the end of the input.
    fn process(&mut self, commands: &mut [Command]) -> UResult<Option<i32>> {
        let mut restart = false;

        loop {
            if !restart {
                match self.read_pattern_space()? {
                    Some(space) => self.pattern = space,
                    None => return Ok(None),
                }
            }

            if self.new_document {
                reset_ranges(commands);
                self.new_document = false;
            }

            if self.context.debug {
                let header = format!(
                    "INPUT:   {} line {}\nPATTERN: {}\n",
                    self.context.input_name.quote(),
                    self.context.line_number,
                    self.pattern.content
                );
                self.output.output().write_str(&header)?;
            }

            let flow = self.execute_script(commands)?;

            if self.context.debug {
                self.output.output().write_str("END-OF-CYCLE:\n")?;
            }

            restart = flow == Flow::Restart;
            match flow {
                Flow::Quit { print, code } => {
                    if print {
                        if !self.context.quiet {
                            self.output.output().write_chunk(&self.pattern)?;
                        }
                        self.flush_appends()?;
                    }
                    return Ok(Some(code));
                }
                Flow::Delete | Flow::Restart => (),
                _ => {
                    if !self.context.quiet {
                        self.output.output().write_chunk(&self.pattern)?;
                    }
                }
            }

            self.flush_appends()?;
            if self.context.unbuffered {
                self.output.output().flush()?;
            }
        }
    }
}

/// Close all address ranges.
fn reset_ranges(commands: &mut [Command]) {
    for cmd in commands {
        cmd.start_line = None;
        if let CommandData::Block(body) = &mut cmd.data {
            reset_ranges(body);
        }
    }
}

/// Transliterate the text in place.
fn transliterate(trans: &Transliteration, text: &mut String) {
    *text = text.chars().map(|c| trans.lookup(c)).collect();
}

/// Return the text in the unambiguous form of the `l` command,
/// folded so that output lines have at most width characters.
/// A width of 0 or 1 disables folding.
fn list_line(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut column = 0;

    for c in text.chars() {
        let escaped = match c {
            '\\' => "\\\\".to_string(),
            '\x07' => "\\a".to_string(),
            '\x08' => "\\b".to_string(),
            '\x0c' => "\\f".to_string(),
            '\n' => "\\n".to_string(),
            '\r' => "\\r".to_string(),
            '\t' => "\\t".to_string(),
            '\x0b' => "\\v".to_string(),
            c if c.is_control() => {
                let mut buf = [0; 4];
                c.encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("\\{b:03o}"))
                    .collect()
            }
            c => c.to_string(),
        };

        let len = escaped.chars().count();
        if width > 1 && column + len > width - 1 {
            out.push_str("\\\n");
            column = 0;
        }
        out.push_str(&escaped);
        column += len;
    }

    out.push_str("$\n");
    out
}

/// Run the script over the files, sending standard output to
/// the output of in_place, and return the exit code.
fn run(
    script: &mut Script,
    files: Vec<PathBuf>,
    context: &mut ProcessingContext,
    output: InPlace,
) -> UResult<i32> {
    let separate = context.separate;
    let mut processor = Processor {
        context,
        input: InputChain::new(files, separate),
        output,
        pattern: StringSpace::default(),
        new_document: false,
    };

    if processor.context.debug {
        let mut program = String::from("SED PROGRAM:\n");
        for line in unparse(&script.commands).lines() {
            program.push_str("  ");
            program.push_str(line);
            program.push('\n');
        }
        processor.output.output().write_str(&program)?;
    }

    match processor.process(&mut script.commands) {
        Ok(code) => {
            processor.output.end()?;
            flush_all(&script.writers)?;
            Ok(code.unwrap_or(0))
        }
        Err(e) => {
            // Keep the output produced so far, but not partial in-place edits.
            let _ = processor.output.stdout().flush();
            let _ = flush_all(&script.writers);
            Err(e)
        }
    }
}

/// Process all input files with the compiled script, writing to the
/// standard output or editing the files in place.
pub fn process_all_files(
    script: &mut Script,
    files: Vec<PathBuf>,
    context: &mut ProcessingContext,
) -> UResult<()> {
    context.unbuffered = context.unbuffered || std::io::stdout().is_terminal();

    let output = InPlace::new(context);
    let code = run(script, files, context, output)?;
    if code != 0 {
        set_exit_code(code);
    }
    Ok(())
}
