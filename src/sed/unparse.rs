// Render compiled commands back into canonical script text
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::sed::command::{
    Address, Command, CommandData, Occurrence, ReplacementPart, ReplacementTemplate, ScriptRegex,
    Substitution,
};

use std::fmt::Write;

/// Return the canonical text of the specified commands, one command
/// per line, with block contents indented by two spaces per level.
pub fn unparse(commands: &[Command]) -> String {
    let mut out = String::new();
    unparse_sequence(commands, 0, &mut out);
    out
}

fn unparse_sequence(commands: &[Command], depth: usize, out: &mut String) {
    for cmd in commands {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&command_text(cmd));
        out.push('\n');

        if let CommandData::Block(body) = &cmd.data {
            unparse_sequence(body, depth + 1, out);
            for _ in 0..depth {
                out.push_str("  ");
            }
            out.push_str("}\n");
        }
    }
}

/// Return the canonical text of a single command.
/// For a block only its opening `{` is rendered.
pub fn command_text(cmd: &Command) -> String {
    let mut out = String::new();

    if let Some(addr1) = &cmd.addr1 {
        push_address(addr1, &mut out);
    }
    if let Some(addr2) = &cmd.addr2 {
        out.push(',');
        push_address(addr2, &mut out);
    }
    if cmd.non_select {
        out.push('!');
    }
    out.push(cmd.code);

    match &cmd.data {
        CommandData::None | CommandData::Block(_) => (),
        CommandData::Branch(target) => {
            if let Some(target) = target {
                out.push(' ');
                out.push_str(&target.label);
            }
        }
        CommandData::Label(label) => {
            if let Some(label) = label {
                if cmd.code != ':' {
                    out.push(' ');
                }
                out.push_str(label);
            }
        }
        CommandData::Path(path) => {
            let _ = write!(out, " {}", path.to_string_lossy());
        }
        CommandData::NamedWriter(writer) => {
            let _ = write!(out, " {}", writer.borrow().path.to_string_lossy());
        }
        CommandData::Number(n) => {
            // q and Q exit with 0 by default.
            if *n != 0 || cmd.code == 'l' {
                let _ = write!(out, " {n}");
            }
        }
        CommandData::Substitution(sub) => push_substitution(sub, &mut out),
        CommandData::Text(text) => push_text(text, &mut out),
        CommandData::Transliteration(trans) => {
            out.push('/');
            push_escaped(&trans.source, &mut out);
            out.push('/');
            push_escaped(&trans.target, &mut out);
            out.push('/');
        }
    }
    out
}

fn push_address(addr: &Address, out: &mut String) {
    match addr {
        Address::Line(n) => {
            let _ = write!(out, "{n}");
        }
        Address::RelLine(n) => {
            let _ = write!(out, "+{n}");
        }
        Address::Last => out.push('$'),
        Address::Re(re) => {
            push_regex(re, out);
            if re.ignore_case {
                out.push('I');
            }
        }
    }
}

/// Append the RE delimited by slashes.
/// Slashes outside bracket expressions are escaped, as are newlines.
fn push_regex(re: &ScriptRegex, out: &mut String) {
    out.push('/');

    let chars: Vec<char> = re.source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\n' => out.push_str("\\n"),
            '\\' => {
                out.push('\\');
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                    i += 1;
                }
            }
            '[' => {
                i = push_bracket(&chars, i, out);
                continue;
            }
            '/' => out.push_str("\\/"),
            c => out.push(c),
        }
        i += 1;
    }

    out.push('/');
}

/// Append the bracket expression starting at chars[start], returning
/// the index past its end.
/// Members stored escaped are written in a form the scanner reads back
/// to the same member.
fn push_bracket(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('[');
    let mut i = start + 1;
    if chars.get(i) == Some(&'^') {
        out.push('^');
        i += 1;
    }
    let first_member = i;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                match chars.get(i + 1) {
                    Some(']') if i == first_member => out.push(']'),
                    Some(']') => out.push_str("\\x5d"),
                    Some('[') if matches!(chars.get(i + 2), Some(':' | '.' | '=')) => {
                        out.push_str("\\x5b");
                    }
                    Some('[') => out.push('['),
                    _ => out.push_str("\\\\"),
                }
                i += 2;
            }
            '[' if matches!(chars.get(i + 1), Some(':' | '.' | '=')) => {
                let marker = chars[i + 1];
                out.push('[');
                out.push(marker);
                i += 2;
                while i < chars.len() {
                    out.push(chars[i]);
                    i += 1;
                    if chars[i - 1] == marker && chars.get(i) == Some(&']') {
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
            '\n' => {
                out.push_str("\\n");
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

/// Append a transliteration string, escaping `\`, `/` and newlines.
fn push_escaped(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str("\\/"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
}

fn push_replacement(template: &ReplacementTemplate, out: &mut String) {
    for part in &template.parts {
        match part {
            ReplacementPart::Literal(s) => {
                for c in s.chars() {
                    match c {
                        '\\' | '&' | '/' => {
                            out.push('\\');
                            out.push(c);
                        }
                        '\n' => out.push_str("\\n"),
                        _ => out.push(c),
                    }
                }
            }
            ReplacementPart::WholeMatch => out.push('&'),
            ReplacementPart::Group(n) => {
                let _ = write!(out, "\\{n}");
            }
        }
    }
}

fn push_substitution(sub: &Substitution, out: &mut String) {
    push_regex(&sub.regex, out);
    push_replacement(&sub.replacement, out);
    out.push('/');

    match sub.occurrence {
        Occurrence::Nth(1) => (),
        Occurrence::Nth(n) => {
            let _ = write!(out, "{n}");
        }
        Occurrence::Global => out.push('g'),
    }
    if sub.print_flag {
        out.push('p');
    }
    if sub.regex.ignore_case {
        out.push('I');
    }
    if let Some(writer) = &sub.write_file {
        let _ = write!(out, "w {}", writer.borrow().path.to_string_lossy());
    }
}

/// Append the text of a, i, c in its POSIX form: a backslash-newline,
/// followed by the text lines, all but the last ending in a backslash.
fn push_text(text: &str, out: &mut String) {
    out.push_str("\\\n");
    let body = text.strip_suffix('\n').unwrap_or(text);
    for (i, line) in body.split('\n').enumerate() {
        if i > 0 {
            out.push_str("\\\n");
        }
        for c in line.chars() {
            if c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
    }
}
