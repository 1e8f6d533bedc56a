// Definitions for the compiled code data structures
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::sed::error_handling::{ScriptLocation, runtime_error};
use crate::sed::fast_regex::{Captures, Regex};
use crate::sed::named_writer::NamedWriter;
use crate::sed::script_char_provider::ScriptCharProvider;
use crate::sed::script_line_provider::ScriptLineProvider;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use uucore::error::UResult;

#[derive(Debug, Default, Clone)]
/// Compilation and processing options provided mostly through the
/// command-line interface, together with the state of a run
pub struct ProcessingContext {
    // Command-line flags with corresponding names
    pub debug: bool,
    pub defer_output_files: bool,
    pub regex_extended: bool,
    pub follow_symlinks: bool,
    pub in_place: bool,
    pub in_place_suffix: Option<String>,
    /// Line wrap length for `l`; 0 disables wrapping
    pub length: usize,
    pub quiet: bool,
    pub posix: bool,
    pub separate: bool,
    pub unbuffered: bool,

    // Other context
    /// Currently processed input file name (not script)
    pub input_name: String,
    /// Current input line number
    pub line_number: usize,
    /// Most recently used RE, for reuse when specifying an empty RE
    pub saved_regex: Option<Rc<Regex>>,
    /// Hold space
    pub hold: StringSpace,
    /// True if a substitution was made since the last input line
    /// was read or the last `t`/`T` was taken
    pub substitution_made: bool,
    /// Elements to append at the end of each command processing cycle
    pub append_elements: Vec<AppendElement>,
}

#[derive(Clone, Debug)]
/// Output queued by `a` and `r` for the end of the cycle
pub enum AppendElement {
    Text(Rc<str>),
    /// Copied from the file, if it can be read
    Path(PathBuf),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// The pattern or hold space
pub struct StringSpace {
    pub content: String,
    /// False only for a final input line lacking its newline
    pub has_newline: bool,
}

impl StringSpace {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            has_newline: true,
        }
    }
}

#[derive(Debug, Clone)]
/// An RE as written in the script, with its compiled form.
/// An empty source stands for the most recently used RE.
pub struct ScriptRegex {
    pub source: String,
    pub ignore_case: bool,
    pub compiled: Option<Rc<Regex>>,
}

impl ScriptRegex {
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

#[derive(Debug, Clone)]
/// A line selector
pub enum Address {
    Re(ScriptRegex),
    Line(usize),
    /// `+N` as a range end
    RelLine(usize),
    /// `$`
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A piece of the right-hand side of `s`
pub enum ReplacementPart {
    Literal(String),
    /// `&`
    WholeMatch,
    /// `\1` through `\9`
    Group(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The parsed right-hand side of `s`
pub struct ReplacementTemplate {
    pub parts: Vec<ReplacementPart>,
    /// Highest back-reference used, 0 if none
    pub max_group_number: usize,
}

impl Default for ReplacementTemplate {
    fn default() -> Self {
        ReplacementTemplate::new(Vec::new())
    }
}

impl ReplacementTemplate {
    pub fn new(parts: Vec<ReplacementPart>) -> Self {
        let max_group_number = parts
            .iter()
            .map(|part| match part {
                ReplacementPart::Group(n) => *n as usize,
                _ => 0,
            })
            .max()
            .unwrap_or_default();

        Self {
            parts,
            max_group_number,
        }
    }

    /// Append to result the template expanded with the given RE captures.
    /// Fail if a back-reference in the template exceeds the RE's groups,
    /// which can only happen through (unknown at compile time) reused REs.
    pub fn apply_captures(
        &self,
        location: &ScriptLocation,
        caps: &Captures,
        result: &mut String,
    ) -> UResult<()> {
        if self.max_group_number + 1 > caps.len() {
            return runtime_error(
                location,
                format!(
                    "invalid reference \\{} on `s' command's RHS",
                    self.max_group_number
                ),
            );
        }

        for part in &self.parts {
            let piece = match part {
                ReplacementPart::Literal(text) => text.as_str(),
                ReplacementPart::WholeMatch => caps.get(0).unwrap_or_default(),
                ReplacementPart::Group(n) => caps.get(*n as usize).unwrap_or_default(),
            };
            result.push_str(piece);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which matches a substitution replaces
pub enum Occurrence {
    Nth(usize), // Only the Nth match (1 by default)
    Global,     // All matches
}

#[derive(Debug, Clone)]
/// The `s` command
pub struct Substitution {
    pub regex: ScriptRegex,
    pub replacement: ReplacementTemplate,
    pub occurrence: Occurrence,
    /// `p` flag
    pub print_flag: bool,
    /// `w file` flag
    pub write_file: Option<Rc<RefCell<NamedWriter>>>,
}

#[derive(Debug, Clone)]
/// The `y` command's character map.
/// ASCII goes through a table; other characters through a map.
pub struct Transliteration {
    pub source: String,
    pub target: String,
    ascii: [char; 128],
    other: HashMap<char, char>,
}

impl Default for Transliteration {
    fn default() -> Self {
        Self {
            source: String::new(),
            target: String::new(),
            ascii: std::array::from_fn(|i| char::from(i as u8)),
            other: HashMap::new(),
        }
    }
}

impl Transliteration {
    /// Map each character of `source` to the one at the same index in
    /// `target`. The caller has checked the lengths match.
    pub fn from_strings(source: &str, target: &str) -> Self {
        let mut map = Self {
            source: source.to_string(),
            target: target.to_string(),
            ..Self::default()
        };
        for (from, to) in source.chars().zip(target.chars()) {
            if from.is_ascii() {
                map.ascii[from as usize] = to;
            } else {
                map.other.insert(from, to);
            }
        }
        map
    }

    pub fn lookup(&self, ch: char) -> char {
        if ch.is_ascii() {
            self.ascii[ch as usize]
        } else {
            self.other.get(&ch).copied().unwrap_or(ch)
        }
    }
}

#[derive(Debug, Clone)]
/// One compiled command with its addresses.
pub struct Command {
    pub code: char,
    pub addr1: Option<Address>,
    pub addr2: Option<Address>,
    /// Selection negated with `!`
    pub non_select: bool,
    /// Line on which the active range started; None outside a range
    pub start_line: Option<usize>,
    pub data: CommandData,
    /// Where the command appears in the script
    pub location: ScriptLocation,
}

impl Default for Command {
    fn default() -> Self {
        Command {
            code: '_',
            addr1: None,
            addr2: None,
            non_select: false,
            start_line: None,
            data: CommandData::None,
            location: ScriptLocation::default(),
        }
    }
}

impl Command {
    /// An empty command located at the cursor position.
    pub fn at_position(lines: &ScriptLineProvider, line: &ScriptCharProvider) -> Self {
        Command {
            location: ScriptLocation::at_position(lines, line),
            ..Default::default()
        }
    }

    pub fn n_addr(&self) -> usize {
        self.addr1.is_some() as usize + self.addr2.is_some() as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The resolved target of a branch command
pub struct BranchTarget {
    pub label: String,
    /// Indices leading to the label through the nested blocks
    pub path: Vec<usize>,
}

#[derive(Debug, Clone)]
/// Per-command payload.
/// `b`, `t` and `T` hold a Label while parsing and a Branch once
/// labels are resolved.
pub enum CommandData {
    None,
    Block(Vec<Command>),
    /// None jumps to the end of the script
    Branch(Option<BranchTarget>),
    Label(Option<String>),
    /// `r` file
    Path(PathBuf),
    /// `w` file
    NamedWriter(Rc<RefCell<NamedWriter>>),
    /// `l` width, `q` and `Q` exit code
    Number(usize),
    Substitution(Box<Substitution>),
    /// `a`, `i` and `c`
    Text(Rc<str>),
    Transliteration(Box<Transliteration>),
}

#[derive(Debug, Default)]
/// A compiled script
pub struct Script {
    pub commands: Vec<Command>,
    /// All `w` file handles, for flushing at the end of processing
    pub writers: Vec<Rc<RefCell<NamedWriter>>>,
}
