// Compile the scripts into the internal representation of commands
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::sed::command::{
    Address, BranchTarget, Command, CommandData, Occurrence, ProcessingContext, ReplacementPart,
    ReplacementTemplate, Script, ScriptRegex, Substitution, Transliteration,
};
use crate::sed::delimited_parser::{parse_char_escape, parse_regex, parse_transliteration};
use crate::sed::error_handling::{ScriptLocation, compilation_error, semantic_error};
use crate::sed::fast_regex::Regex;
use crate::sed::named_writer::NamedWriter;
use crate::sed::script_char_provider::ScriptCharProvider;
use crate::sed::script_line_provider::{ScriptLineProvider, ScriptValue};

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use uucore::display::Quotable;
use uucore::error::UResult;

// Handling required after processing a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandHandling {
    GetNext,  // Get next command and process that: !
    Return,   // Return from the sequence parser: }
    Continue, // Continue sequence parsing: all other commands
}

/// State that exists only while a script is compiled
struct CompileState<'a> {
    context: &'a mut ProcessingContext,
    /// Nesting of { }
    block_nesting: usize,
    /// Most recently compiled RE, which an empty RE will likely reuse
    last_regex: Option<Rc<Regex>>,
    /// Output files by name, so that all commands share a single handle
    writers: HashMap<PathBuf, Rc<RefCell<NamedWriter>>>,
    /// Output files in order of appearance
    writer_list: Vec<Rc<RefCell<NamedWriter>>>,
}

impl CompileState<'_> {
    /// Return the writer associated with path, creating it if needed.
    fn writer_for(
        &mut self,
        path: PathBuf,
        location: ScriptLocation,
    ) -> UResult<Rc<RefCell<NamedWriter>>> {
        if let Some(writer) = self.writers.get(&path) {
            return Ok(Rc::clone(writer));
        }

        let writer = NamedWriter::new(path.clone(), location, self.context.defer_output_files)?;
        self.writers.insert(path, Rc::clone(&writer));
        self.writer_list.push(Rc::clone(&writer));
        Ok(writer)
    }
}

/// The type of functions that compile individual commands
type CommandHandler = fn(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    state: &mut CompileState<'_>,
) -> UResult<CommandHandling>;

// Per-command compilation table
#[derive(Debug, Clone, Copy)]
struct CommandSpec {
    n_addr: usize,           // Number of supported addresses
    handler: CommandHandler, // Argument-specific command compilation handler
}

/// Compile the scripts into an executable data structure.
/// A `#n` first script line sets the context's quiet flag.
pub fn compile(scripts: Vec<ScriptValue>, context: &mut ProcessingContext) -> UResult<Script> {
    let mut lines = ScriptLineProvider::new(scripts);
    let mut state = CompileState {
        context,
        block_nesting: 0,
        last_regex: None,
        writers: HashMap::new(),
        writer_list: Vec::new(),
    };

    let mut empty_line = ScriptCharProvider::new("");
    let mut commands = compile_sequence(&mut lines, &mut empty_line, &mut state)?;

    // Resolve branch commands to the position of their target labels.
    let mut labels = HashMap::new();
    define_labels(&commands, &mut Vec::new(), &mut labels)?;
    check_labels(&mut commands, &labels)?;

    Ok(Script {
        commands,
        writers: state.writer_list,
    })
}

/// Enter the path of each `:` command into the labels map.
fn define_labels(
    commands: &[Command],
    prefix: &mut Vec<usize>,
    labels: &mut HashMap<String, Vec<usize>>,
) -> UResult<()> {
    for (i, cmd) in commands.iter().enumerate() {
        prefix.push(i);
        match &cmd.data {
            CommandData::Label(Some(name)) if cmd.code == ':' => {
                if labels.insert(name.clone(), prefix.clone()).is_some() {
                    return semantic_error(&cmd.location, format!("duplicate label `{name}'"));
                }
            }
            CommandData::Block(body) => define_labels(body, prefix, labels)?,
            _ => (),
        }
        prefix.pop();
    }
    Ok(())
}

/// Replace branch labels with the path of the corresponding commands.
/// Raise an error on undefined labels.
fn check_labels(commands: &mut [Command], labels: &HashMap<String, Vec<usize>>) -> UResult<()> {
    for cmd in commands.iter_mut() {
        if let CommandData::Block(body) = &mut cmd.data {
            check_labels(body, labels)?;
            continue;
        }

        if !matches!(cmd.code, 'b' | 't' | 'T') {
            continue;
        }

        let target = match &cmd.data {
            CommandData::Label(Some(name)) => match labels.get(name) {
                Some(path) => Some(BranchTarget {
                    label: name.clone(),
                    path: path.clone(),
                }),
                None => {
                    return semantic_error(
                        &cmd.location,
                        format!("can't find label for jump to `{name}'"),
                    );
                }
            },
            _ => None,
        };
        cmd.data = CommandData::Branch(target);
    }
    Ok(())
}

/// Compile provided scripts into a sequence of commands, up to the
/// end of the script or a `}` closing the current block.
fn compile_sequence(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    state: &mut CompileState,
) -> UResult<Vec<Command>> {
    let mut commands = Vec::new();

    loop {
        line.eat_spaces();

        if line.eol() || line.is('#') {
            match lines.next_line()? {
                None => {
                    return Ok(commands);
                }
                Some(line_string) => {
                    // According to POSIX: "If the first two characters in
                    // the script are "#n", the default output shall be
                    // suppressed".
                    if lines.is_first_line() && line_string == "#n" {
                        state.context.quiet = true;
                    }
                    *line = ScriptCharProvider::new(&line_string);
                }
            }
            continue;
        } else if line.is(';') {
            line.advance();
            continue;
        }

        let mut cmd = Command::at_position(lines, line);
        let n_addr = compile_address_range(lines, line, &mut cmd, state)?;
        line.eat_spaces();
        let mut cmd_spec = get_verified_cmd_spec(lines, line, n_addr)?;

        // Compile the command through its table entry.
        cmd.code = line.current();
        let mut handling = (cmd_spec.handler)(lines, line, &mut cmd, state)?;
        if handling == CommandHandling::GetNext {
            cmd_spec = get_verified_cmd_spec(lines, line, n_addr)?;
            cmd.code = line.current();
            handling = (cmd_spec.handler)(lines, line, &mut cmd, state)?;
        }

        match handling {
            CommandHandling::Return => return Ok(commands),
            _ => commands.push(cmd),
        }
    }
}

/// Return true if c is a valid character for starting a first address
fn is_address_char(c: char) -> bool {
    matches!(c, '0'..='9' | '/' | '\\' | '$')
}

/// Compile a command's optional address range into cmd.
/// Return the number of addresses encountered.
fn compile_address_range(
    lines: &ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    state: &mut CompileState,
) -> UResult<usize> {
    line.eat_spaces();
    if !line.eol() && is_address_char(line.current()) {
        cmd.addr1 = Some(compile_address(lines, line, state)?);

        line.eat_spaces();
        if line.is(',') {
            line.advance();
            line.eat_spaces();
            if line.eol() {
                return compilation_error(lines, line, "unexpected `,'");
            }
            cmd.addr2 = Some(compile_address(lines, line, state)?);
        }
    }

    // Line 0 only makes sense as the start of a range ended by an RE.
    if matches!(cmd.addr1, Some(Address::Line(0)))
        && !matches!(cmd.addr2, Some(Address::Re(_)))
    {
        return compilation_error(lines, line, "invalid usage of line address 0");
    }

    Ok(cmd.n_addr())
}

/// Read the line's remaining characters as a file path and return it.
fn read_file_path(lines: &ScriptLineProvider, line: &mut ScriptCharProvider) -> UResult<PathBuf> {
    line.advance(); // Skip the command/w character
    line.eat_spaces(); // Skip any leading whitespace

    let path = line.take_rest();
    if path.is_empty() {
        compilation_error(lines, line, "missing filename in r/w commands")
    } else {
        Ok(PathBuf::from(path))
    }
}

/// Compile and return a single address.
fn compile_address(
    lines: &ScriptLineProvider,
    line: &mut ScriptCharProvider,
    state: &mut CompileState,
) -> UResult<Address> {
    if line.eol() {
        return compilation_error(lines, line, "expected context address");
    }

    match line.current() {
        '\\' | '/' => {
            // Regular expression
            if line.current() == '\\' {
                // The next character is an arbitrary delimiter
                line.advance();
            }
            let re = parse_regex(lines, line, "unterminated address regex")?;
            // Skip over delimiter
            line.advance();

            let mut icase = false;
            if line.is('I') {
                icase = true;
                line.advance();
            }

            Ok(Address::Re(compile_regex(lines, line, &re, state, icase)?))
        }
        '$' => {
            line.advance();
            Ok(Address::Last)
        }
        '+' => {
            line.advance();
            Ok(Address::RelLine(parse_required_number(lines, line)?))
        }
        c if c.is_ascii_digit() => Ok(Address::Line(parse_required_number(lines, line)?)),
        _ => compilation_error(lines, line, "expected context address"),
    }
}

/// Parse and return the decimal number at the current line position.
/// Advance the line to first non-digit or EOL.
fn parse_number(lines: &ScriptLineProvider, line: &mut ScriptCharProvider) -> UResult<Option<usize>> {
    let mut num_str = String::new();

    while !line.eol() && line.current().is_ascii_digit() {
        num_str.push(line.current());
        line.advance();
    }

    if num_str.is_empty() {
        return Ok(None);
    }

    match num_str.parse::<usize>() {
        Ok(n) => Ok(Some(n)),
        Err(_) => compilation_error(lines, line, format!("invalid number '{num_str}'")),
    }
}

/// Parse a decimal number that must be present.
fn parse_required_number(lines: &ScriptLineProvider, line: &mut ScriptCharProvider) -> UResult<usize> {
    match parse_number(lines, line)? {
        Some(n) => Ok(n),
        None => compilation_error(lines, line, "number expected"),
    }
}

/// Parse the end of a command, failing with an error on extra characters.
/// A `}` or a comment may directly follow a command.
fn parse_command_ending(lines: &ScriptLineProvider, line: &mut ScriptCharProvider) -> UResult<()> {
    line.eat_spaces();
    if line.eol() || line.is('}') || line.is('#') {
        return Ok(());
    }

    if line.is(';') {
        line.advance();
        return Ok(());
    }

    compilation_error(lines, line, "extra characters after command")
}

/// Copy the bracket expression starting at chars[start] to out,
/// returning the index past its end.
/// Escaped members are already in engine form. Doubled `&`, `~` and
/// `-` are escaped, since the engine reads them as set operators.
fn copy_bracket_expression(chars: &[char], start: usize, out: &mut String) -> usize {
    let mut i = start + 1;
    out.push('[');
    if chars.get(i) == Some(&'^') {
        out.push('^');
        i += 1;
    }

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                out.push('\\');
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                }
                i += 2;
            }
            '[' if matches!(chars.get(i + 1), Some(':' | '.' | '=')) => {
                let marker = chars[i + 1];
                out.push('[');
                out.push(marker);
                i += 2;
                while i < chars.len() {
                    let c = chars[i];
                    out.push(c);
                    i += 1;
                    if c == marker && chars.get(i) == Some(&']') {
                        out.push(']');
                        i += 1;
                        break;
                    }
                }
            }
            ']' => {
                out.push(']');
                return i + 1;
            }
            c @ ('&' | '~' | '-') if chars.get(i + 1) == Some(&c) => {
                out.push('\\');
                out.push(c);
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    i
}

/// Convert a POSIX RE into the syntax of the RE engines.
/// In BREs:
/// - `\(`, `\)`, `\{`, `\}`, `\|`, `\+`, `\?` become operators.
/// - The ERE-only metacharacters `+ ? { } | ( )` become literals.
/// - `*` at the start of an RE or subexpression is a literal.
/// - `^` and `$` are anchors only at the ends of an RE or subexpression.
///
/// In both dialects single-digit back-references are put in
/// non-capturing groups, and `` \` `` `\'` anchor at the buffer ends.
fn to_engine_syntax(pattern: &str, extended: bool) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut result = String::with_capacity(pattern.len() + 8);

    // True where a following `*` or `^` is at the start of an RE
    let mut at_start = true;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let was_start = at_start;
        at_start = false;

        match c {
            '[' => {
                i = copy_bracket_expression(&chars, i, &mut result);
                continue;
            }
            '\\' => {
                let Some(&next) = chars.get(i + 1) else {
                    // Trailing backslash; match it literally.
                    result.push_str(r"\\");
                    break;
                };
                match next {
                    '`' => result.push_str(r"\A"),
                    '\'' => result.push_str(r"\z"),
                    // In sed REs these are single-digit (\1-\9), whereas
                    // fancy_regex supports multi-digit back-references.
                    '1'..='9' => result.push_str(&format!(r"(?:\{next})")),
                    '(' | ')' | '{' | '}' | '|' | '+' | '?' if !extended => {
                        result.push(next);
                        at_start = matches!(next, '(' | '|');
                    }
                    _ => {
                        result.push('\\');
                        result.push(next);
                    }
                }
                i += 2;
                continue;
            }
            '(' | '|' if extended => {
                result.push(c);
                at_start = true;
            }
            '+' | '?' | '{' | '}' | '|' | '(' | ')' if !extended => {
                result.push('\\');
                result.push(c);
            }
            '*' if was_start && !extended => result.push_str(r"\*"),
            '^' if !extended => {
                if was_start {
                    result.push('^');
                    at_start = true;
                } else {
                    result.push_str(r"\^");
                }
            }
            '$' if !extended => {
                let at_end = i + 1 == chars.len()
                    || (chars[i + 1] == '\\' && matches!(chars.get(i + 2), Some(')' | '|')));
                if at_end {
                    result.push('$');
                } else {
                    result.push_str(r"\$");
                }
            }
            _ => result.push(c),
        }
        i += 1;
    }

    result
}

/// Compile the provided regular expression string into a corresponding engine.
/// An empty pattern results in no compiled RE, which means that the last
/// RE employed at runtime will be used.
fn compile_regex(
    lines: &ScriptLineProvider,
    line: &ScriptCharProvider,
    pattern: &str,
    state: &mut CompileState,
    icase: bool,
) -> UResult<ScriptRegex> {
    if pattern.is_empty() {
        if icase {
            return compilation_error(
                lines,
                line,
                "cannot specify modifiers on empty regexp",
            );
        }
        if state.last_regex.is_none() {
            return compilation_error(lines, line, "first RE may not be empty");
        }
        return Ok(ScriptRegex {
            source: String::new(),
            ignore_case: false,
            compiled: None,
        });
    }

    let translated = to_engine_syntax(pattern, state.context.regex_extended);
    let compiled = match Regex::new(&translated, icase) {
        Ok(compiled) => Rc::new(compiled),
        Err(e) => {
            return compilation_error(
                lines,
                line,
                format!("invalid regular expression {}: {e}", pattern.quote()),
            );
        }
    };

    state.last_regex = Some(Rc::clone(&compiled));
    Ok(ScriptRegex {
        source: pattern.to_string(),
        ignore_case: icase,
        compiled: Some(compiled),
    })
}

/// Compile a regular expression replacement string.
/// At entry the line is on the replacement's opening delimiter;
/// on exit it is past the closing one.
fn compile_replacement(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
) -> UResult<ReplacementTemplate> {
    let mut parts = Vec::new();
    let mut literal = String::new();

    let delimiter = line.current();
    line.advance();

    loop {
        if line.eol() {
            return compilation_error(lines, line, "unterminated `s' command");
        }

        match line.current() {
            '\\' => {
                line.advance();

                // An escaped newline continues the replacement.
                if line.eol() {
                    match lines.next_line()? {
                        Some(next_line_string) => {
                            literal.push('\n');
                            *line = ScriptCharProvider::new(&next_line_string);
                            continue;
                        }
                        None => {
                            return compilation_error(lines, line, "unterminated `s' command");
                        }
                    }
                }

                match line.current() {
                    // \0 - \9
                    c @ '0'..='9' => {
                        if !literal.is_empty() {
                            parts.push(ReplacementPart::Literal(std::mem::take(&mut literal)));
                        }
                        match c.to_digit(10) {
                            Some(0) | None => parts.push(ReplacementPart::WholeMatch),
                            Some(n) => parts.push(ReplacementPart::Group(n)),
                        }
                        line.advance();
                    }

                    // Literal \ and &
                    '\\' | '&' => {
                        literal.push(line.current());
                        line.advance();
                    }

                    // Literal delimiter
                    v if v == delimiter => {
                        literal.push(v);
                        line.advance();
                    }

                    // other escape sequences
                    _ => match parse_char_escape(line) {
                        Some(decoded) => literal.push(decoded),
                        None => {
                            literal.push(line.current());
                            line.advance();
                        }
                    },
                }
            }

            '&' => {
                if !literal.is_empty() {
                    parts.push(ReplacementPart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(ReplacementPart::WholeMatch);
                line.advance();
            }

            c if c == delimiter => {
                line.advance(); // skip closing delimiter
                if !literal.is_empty() {
                    parts.push(ReplacementPart::Literal(literal));
                }
                return Ok(ReplacementTemplate::new(parts));
            }

            c => {
                literal.push(c);
                line.advance();
            }
        }
    }
}

/// The flags that may follow a substitution
#[derive(Debug)]
struct SubstFlags {
    occurrence: Occurrence,
    print_flag: bool,
    ignore_case: bool,
    write_file: Option<Rc<RefCell<NamedWriter>>>,
}

/// Parse the substitution command's optional flags
fn compile_subst_flags(
    lines: &ScriptLineProvider,
    line: &mut ScriptCharProvider,
    state: &mut CompileState,
) -> UResult<SubstFlags> {
    let mut flags = SubstFlags {
        occurrence: Occurrence::Nth(1),
        print_flag: false,
        ignore_case: false,
        write_file: None,
    };
    let mut seen_g_or_n = false;

    loop {
        line.eat_spaces();
        if line.eol() {
            break;
        }

        match line.current() {
            'g' | '0'..='9' if seen_g_or_n => {
                return compilation_error(lines, line, "multiple `g' or number options to `s' command");
            }

            'g' => {
                seen_g_or_n = true;
                flags.occurrence = Occurrence::Global;
                line.advance();
            }

            '0'..='9' => {
                seen_g_or_n = true;
                let number = parse_required_number(lines, line)?;
                if number == 0 {
                    return compilation_error(
                        lines,
                        line,
                        "number option to `s' command may not be zero",
                    );
                }
                flags.occurrence = Occurrence::Nth(number);
            }

            'p' => {
                if flags.print_flag {
                    return compilation_error(lines, line, "multiple `p' options to `s' command");
                }
                flags.print_flag = true;
                line.advance();
            }

            'i' | 'I' => {
                flags.ignore_case = true;
                line.advance();
            }

            'w' => {
                let location = ScriptLocation::at_position(lines, line);
                let path = read_file_path(lines, line)?;
                flags.write_file = Some(state.writer_for(path, location)?);
                break; // 'w' is the last flag allowed
            }

            ';' | '}' | '#' => break,

            _ => {
                return compilation_error(lines, line, "unknown option to `s'");
            }
        }
    }

    Ok(flags)
}

// Handles s
fn compile_subst_command(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    state: &mut CompileState,
) -> UResult<CommandHandling> {
    line.advance(); // move past 's'

    let pattern = parse_regex(lines, line, "unterminated `s' command")?;
    let replacement = compile_replacement(lines, line)?;
    let flags = compile_subst_flags(lines, line, state)?;

    // Compile regex with now known ignore_case flag.
    let regex = compile_regex(lines, line, &pattern, state, flags.ignore_case)?;

    // Catch invalid group references at compile time, if possible.
    let bound = regex.compiled.as_ref().or(state.last_regex.as_ref());
    if let Some(bound) = bound
        && replacement.max_group_number + 1 > bound.captures_len()
    {
        return compilation_error(
            lines,
            line,
            format!(
                "invalid reference \\{} on `s' command's RHS",
                replacement.max_group_number
            ),
        );
    }

    cmd.data = CommandData::Substitution(Box::new(Substitution {
        regex,
        replacement,
        occurrence: flags.occurrence,
        print_flag: flags.print_flag,
        write_file: flags.write_file,
    }));

    parse_command_ending(lines, line)?;
    Ok(CommandHandling::Continue)
}

// Handles y
fn compile_trans_command(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    _state: &mut CompileState,
) -> UResult<CommandHandling> {
    line.advance(); // move past 'y'

    let source = parse_transliteration(lines, line)?;
    let target = parse_transliteration(lines, line)?;
    if source.chars().count() != target.chars().count() {
        return compilation_error(
            lines,
            line,
            "strings for `y' command are different lengths",
        );
    }

    let transliteration = Box::new(Transliteration::from_strings(&source, &target));
    cmd.data = CommandData::Transliteration(transliteration);

    line.advance(); // move past last delimiter
    parse_command_ending(lines, line)?;
    Ok(CommandHandling::Continue)
}

// Handles }
fn compile_end_group_command(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    state: &mut CompileState,
) -> UResult<CommandHandling> {
    if state.block_nesting == 0 || cmd.non_select {
        return compilation_error(lines, line, "unexpected `}'");
    }
    state.block_nesting -= 1;
    line.advance();
    parse_command_ending(lines, line)?;
    Ok(CommandHandling::Return)
}

// Handles !
fn compile_negation_command(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    _state: &mut CompileState,
) -> UResult<CommandHandling> {
    if cmd.non_select {
        return compilation_error(lines, line, "multiple `!'s");
    }
    line.advance();
    line.eat_spaces();
    cmd.non_select = true;
    Ok(CommandHandling::GetNext)
}

/// Compile a command that doesn't take any arguments
// Handles d D g G h H n N p P x =
fn compile_empty_command(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    _cmd: &mut Command,
    _state: &mut CompileState,
) -> UResult<CommandHandling> {
    line.advance(); // Skip the command character
    parse_command_ending(lines, line)?;
    Ok(CommandHandling::Continue)
}

// Handles r
fn compile_read_file_command(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    _state: &mut CompileState,
) -> UResult<CommandHandling> {
    let path = read_file_path(lines, line)?;
    cmd.data = CommandData::Path(path);
    Ok(CommandHandling::Continue)
}

// Handles w
fn compile_write_file_command(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    state: &mut CompileState,
) -> UResult<CommandHandling> {
    let location = ScriptLocation::at_position(lines, line);
    let path = read_file_path(lines, line)?;
    cmd.data = CommandData::NamedWriter(state.writer_for(path, location)?);
    Ok(CommandHandling::Continue)
}

// Handles {
fn compile_block_command(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    state: &mut CompileState,
) -> UResult<CommandHandling> {
    line.advance(); // move past '{'
    let depth = state.block_nesting;
    state.block_nesting += 1;

    let body = compile_sequence(lines, line, state)?;
    if state.block_nesting > depth {
        // The script ended before the matching }
        return semantic_error(&cmd.location, "unmatched `{'");
    }

    cmd.data = CommandData::Block(body);
    Ok(CommandHandling::Continue)
}

// Handles b, t, T, :
fn compile_label_command(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    _state: &mut CompileState,
) -> UResult<CommandHandling> {
    /// Return true if `c` is in the POSIX portable filename character set.
    fn is_portable_filename_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
    }

    line.advance(); // Skip the command character
    line.eat_spaces(); // Skip any leading whitespace

    let mut label = String::new();
    while !line.eol() && is_portable_filename_char(line.current()) {
        label.push(line.current());
        line.advance();
    }

    if label.is_empty() {
        if cmd.code == ':' {
            return compilation_error(lines, line, "\":\" lacks a label");
        }
        cmd.data = CommandData::Label(None);
    } else {
        cmd.data = CommandData::Label(Some(label));
    }

    parse_command_ending(lines, line)?;
    Ok(CommandHandling::Continue)
}

/// Compile commands that take an optional number as an argument.
// Handles l q Q
fn compile_number_command(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    _state: &mut CompileState,
) -> UResult<CommandHandling> {
    line.advance(); // Skip the command character
    line.eat_spaces(); // Skip any leading whitespace

    cmd.data = match (parse_number(lines, line)?, cmd.code) {
        (Some(n), _) => CommandData::Number(n),
        // Exit code
        (None, 'q' | 'Q') => CommandData::Number(0),
        // Wrap at the command-line specified length
        (None, _) => CommandData::None,
    };

    parse_command_ending(lines, line)?;
    Ok(CommandHandling::Continue)
}

/// Compile commands that take text as an argument.
// Handles a, c, i
fn compile_text_command(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
    cmd: &mut Command,
    state: &mut CompileState,
) -> UResult<CommandHandling> {
    line.advance(); // Skip the command character.
    line.eat_spaces(); // Skip any leading whitespace.

    let text = if state.context.posix {
        compile_text_posix(lines, line)?
    } else {
        compile_text_gnu(lines, line)?
    };

    if text.is_empty() {
        return compilation_error(lines, line, "expected \\ after `a', `c' or `i'");
    }

    cmd.data = CommandData::Text(Rc::from(text));
    Ok(CommandHandling::Continue)
}

/// Return the text argument of an a, c, i command (GNU syntax).
// According to POSIX, these commands expect \ followed by text.
// As a GNU extension the initial \ can be omitted, and from then on
// character escapes are honored.
fn compile_text_gnu(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
) -> UResult<String> {
    let mut text = String::new();
    if line.eol() {
        return Ok(text);
    }

    // True after a \ at the end of a line
    let mut escaped_newline = false;

    // Skip optional \.
    if line.is('\\') {
        line.advance();
        escaped_newline = line.eol();
    }

    // Gather text.  Stop on a non-escaped newline.
    loop {
        if escaped_newline {
            match lines.next_line()? {
                None => break,
                Some(line_string) => *line = ScriptCharProvider::new(&line_string),
            }
            escaped_newline = false;
        }

        // Non-escaped newline
        if line.eol() {
            text.push('\n');
            break;
        }

        if line.current() == '\\' {
            line.advance();

            if line.eol() {
                escaped_newline = true;
                text.push('\n');
                continue;
            }

            match parse_char_escape(line) {
                Some(decoded) => text.push(decoded),
                None => {
                    // Other escapes result in the escaped character.
                    text.push(line.current());
                    line.advance();
                }
            }
        } else {
            text.push(line.current());
            line.advance();
        }
    }
    Ok(text)
}

/// Return the text argument of an a, c, i command (POSIX syntax).
// The command is followed by \ and a newline. Each text line ending
// in \ continues the text; a \ preceding any other character is removed.
fn compile_text_posix(
    lines: &mut ScriptLineProvider,
    line: &mut ScriptCharProvider,
) -> UResult<String> {
    if !line.is('\\') {
        return compilation_error(lines, line, "expected \\ after `a', `c' or `i'");
    }

    line.advance(); // Skip \.
    line.eat_spaces();
    if !line.eol() {
        return compilation_error(lines, line, "extra characters after \\ in text command");
    }

    let mut text = String::new();
    while let Some(text_line) = lines.next_line()? {
        let mut continued = false;
        let mut chars = text_line.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some(escaped) => text.push(escaped),
                    None => continued = true,
                }
            } else {
                text.push(c);
            }
        }
        text.push('\n');
        if !continued {
            break;
        }
    }
    *line = ScriptCharProvider::new("");
    Ok(text)
}

// Return the table entry for the command letter at the current line position
// checking for diverse errors.
fn get_verified_cmd_spec(
    lines: &ScriptLineProvider,
    line: &ScriptCharProvider,
    n_addr: usize,
) -> UResult<CommandSpec> {
    if line.eol() {
        return compilation_error(lines, line, "missing command");
    }

    let ch = line.current();
    let cmd_spec = get_cmd_spec(lines, line, ch)?;

    if n_addr > cmd_spec.n_addr {
        let msg = if cmd_spec.n_addr == 0 {
            format!("{ch} doesn't want any addresses")
        } else {
            "command only uses one address".to_string()
        };
        return compilation_error(lines, line, msg);
    }

    Ok(cmd_spec)
}

// Look up a command addresses and handler by its command code.
fn get_cmd_spec(
    lines: &ScriptLineProvider,
    line: &ScriptCharProvider,
    cmd_code: char,
) -> UResult<CommandSpec> {
    let (n_addr, handler): (usize, CommandHandler) = match cmd_code {
        '!' => (2, compile_negation_command),
        '=' => (2, compile_empty_command),
        ':' => (0, compile_label_command),
        '{' => (2, compile_block_command),
        '}' => (0, compile_end_group_command),
        'a' | 'i' => (1, compile_text_command),
        'b' | 't' | 'T' => (2, compile_label_command),
        'c' => (2, compile_text_command),
        'd' | 'D' | 'g' | 'G' | 'h' | 'H' | 'n' | 'N' | 'p' | 'P' | 'x' => {
            (2, compile_empty_command)
        }
        'l' => (2, compile_number_command),
        // Q is a GNU extension
        'q' | 'Q' => (1, compile_number_command),
        'r' => (1, compile_read_file_command),
        's' => (2, compile_subst_command),
        'w' => (2, compile_write_file_command),
        'y' => (2, compile_trans_command),
        _ => {
            return compilation_error(lines, line, format!("unknown command: `{cmd_code}'"));
        }
    };
    Ok(CommandSpec { n_addr, handler })
}
