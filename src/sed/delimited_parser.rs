// Parse delimited character sequences
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::sed::error_handling::compilation_error;
use crate::sed::script_char_provider::ScriptCharProvider;
use crate::sed::script_line_provider::ScriptLineProvider;

use uucore::error::UResult;

/// Digit rules of a numeric character escape.
struct NumericEscape {
    radix: u32,
    max_digits: usize,
    /// All `max_digits` digits must be present
    exact: bool,
}

impl NumericEscape {
    fn for_letter(letter: char) -> Option<Self> {
        let (radix, max_digits, exact) = match letter {
            'd' => (10, 3, false),
            'o' => (8, 3, false),
            'x' => (16, 2, false),
            'u' => (16, 4, true),
            'U' => (16, 8, true),
            _ => return None,
        };
        Some(Self {
            radix,
            max_digits,
            exact,
        })
    }

    /// Decode the digits at the cursor into a char, leaving the cursor
    /// after them. On failure the cursor is left where it was.
    fn decode(&self, line: &mut ScriptCharProvider) -> Option<char> {
        let start = line.get_pos();
        let mut value: u32 = 0;
        let mut count = 0;

        while count < self.max_digits && !line.eol() {
            let Some(digit) = line.current().to_digit(self.radix) else {
                break;
            };
            value = value * self.radix + digit;
            count += 1;
            line.advance();
        }

        let complete = count > 0 && (!self.exact || count == self.max_digits);
        let decoded = if complete { char::from_u32(value) } else { None };
        if decoded.is_none() {
            line.retreat(line.get_pos() - start);
        }
        decoded
    }
}

/// `\cX`: the control character for X, i.e. X uppercased with bit 6
/// flipped.
fn control_char(x: char) -> Option<char> {
    x.is_ascii()
        .then(|| char::from(x.to_ascii_uppercase() as u8 ^ 0x40))
}

/// Decode a character escape, valid in regexes, replacements,
/// transliterations and one-liner text.
/// The cursor must be on the character following the backslash; on
/// success it is left after the escape.
/// Return `None`, without moving, for anything that isn't a character
/// escape. A numeric or control escape lacking a valid value decodes
/// to its own letter.
pub fn parse_char_escape(line: &mut ScriptCharProvider) -> Option<char> {
    let letter = line.current();
    let simple = match letter {
        'a' => Some('\x07'),
        'f' => Some('\x0c'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        'v' => Some('\x0b'),
        _ => None,
    };
    if let Some(c) = simple {
        line.advance();
        return Some(c);
    }

    let decoded = if letter == 'c' {
        line.advance();
        let ctrl = if line.eol() {
            None
        } else {
            control_char(line.current())
        };
        if ctrl.is_some() {
            line.advance();
        }
        ctrl
    } else {
        let escape = NumericEscape::for_letter(letter)?;
        line.advance();
        escape.decode(line)
    };

    Some(decoded.unwrap_or(letter))
}

/// Parse a POSIX RE bracket expression and return it in RE source form.
/// This keeps a delimiter inside the brackets from ending the RE.
/// Within the brackets a backslash is literal, except in a character
/// escape such as `\n`. In the returned text a literal `\`, `[` or `]`
/// is backslash-escaped; classes, equivalence classes and collating
/// symbols are kept as written.
/// Return `None` if the line ends before the closing `]`.
fn parse_bracket_expression(
    lines: &ScriptLineProvider,
    line: &mut ScriptCharProvider,
) -> UResult<Option<String>> {
    fn push_member(c: char, out: &mut String) {
        if matches!(c, '\\' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }

    let mut result = String::from("[");
    line.advance(); // Skip [

    if line.is('^') {
        result.push('^');
        line.advance();
    }

    // A leading ']' is part of the set.
    if line.is(']') {
        push_member(']', &mut result);
        line.advance();
    }

    while !line.eol() {
        let ch = line.current();

        match ch {
            ']' => {
                result.push(']');
                line.advance();
                return Ok(Some(result));
            }

            '[' if matches!(line.peek(), Some(':' | '.' | '=')) => {
                line.advance();
                let marker = line.current();
                line.advance();
                result.push('[');
                result.push(marker);

                let mut terminated = false;
                while !line.eol() {
                    let c = line.current();
                    line.advance();
                    if c == marker && line.is(']') {
                        line.advance();
                        result.push(marker);
                        result.push(']');
                        terminated = true;
                        break;
                    }
                    result.push(c);
                }

                if !terminated {
                    return compilation_error(
                        lines,
                        line,
                        "unterminated POSIX character class, equivalence or collating symbol",
                    );
                }
            }

            '\\' => {
                line.advance();
                if line.eol() {
                    break;
                }
                match parse_char_escape(line) {
                    Some(decoded) => push_member(decoded, &mut result),
                    None => {
                        // `\\` stands for one backslash; any other
                        // character after a lone `\` is scanned anew.
                        push_member('\\', &mut result);
                        if line.is('\\') {
                            line.advance();
                        }
                    }
                }
            }

            _ => {
                push_member(ch, &mut result);
                line.advance();
            }
        }
    }

    Ok(None)
}

/// Append a character produced by an escape to RE source text so that
/// it matches only itself in both BRE and ERE syntax.
fn push_escaped_literal(c: char, out: &mut String) {
    match c {
        '.' | '*' | '[' | ']' | '^' | '$' | '\\' => {
            out.push('\\');
            out.push(c);
        }
        // Special in EREs only, while their escaped forms are BRE operators
        '+' | '?' | '{' | '}' | '(' | ')' | '|' => {
            out.push('[');
            out.push(c);
            out.push(']');
        }
        _ => out.push(c),
    }
}

/// Scan and return the opening delimiter of a delimited string
/// Advances the line past the opening delimiter
fn scan_delimiter(lines: &ScriptLineProvider, line: &mut ScriptCharProvider) -> UResult<char> {
    if line.eol() {
        return compilation_error(lines, line, "unexpected end of line");
    }

    let delimiter = line.current();
    if delimiter == '\\' || delimiter == '\n' {
        return compilation_error(
            lines,
            line,
            "delimiter cannot be a newline or backslash",
        );
    }
    line.advance();
    Ok(delimiter)
}

/// Parse the regular expression delimited by the current line
/// character and return it as a string.
/// On return the line is on the closing delimiter.
/// `unterminated` is the error reported if the line ends first.
pub fn parse_regex(
    lines: &ScriptLineProvider,
    line: &mut ScriptCharProvider,
    unterminated: &str,
) -> UResult<String> {
    let delimiter = scan_delimiter(lines, line)?;
    let mut result = String::new();

    while !line.eol() {
        match line.current() {
            '[' if delimiter != '[' => match parse_bracket_expression(lines, line)? {
                Some(bracket) => result.push_str(&bracket),
                None => break,
            },
            '\\' => {
                line.advance();
                if line.eol() {
                    break;
                }
                if line.current() == delimiter {
                    result.push(delimiter);
                    line.advance();
                    continue;
                }
                match parse_char_escape(line) {
                    Some(decoded) => push_escaped_literal(decoded, &mut result),
                    None => {
                        // Pass through \<any> to RE engine for further treatment
                        result.push('\\');
                        result.push(line.current());
                        line.advance();
                    }
                }
            }
            c if c == delimiter => return Ok(result),
            c => {
                result.push(c);
                line.advance();
            }
        }
    }
    compilation_error(lines, line, unterminated)
}

/// Parse the transliteration string delimited by the current line
/// character and return it as a string.
/// On return the line is on the closing delimiter.
pub fn parse_transliteration(
    lines: &ScriptLineProvider,
    line: &mut ScriptCharProvider,
) -> UResult<String> {
    let delimiter = scan_delimiter(lines, line)?;
    let mut result = String::new();

    while !line.eol() {
        match line.current() {
            '\\' => {
                line.advance();
                if line.eol() {
                    break;
                }
                if line.current() == delimiter || line.current() == '\\' {
                    result.push(line.current());
                    line.advance();
                    continue;
                }
                match parse_char_escape(line) {
                    Some(decoded) => result.push(decoded),
                    None => {
                        return compilation_error(
                            lines,
                            line,
                            format!("unknown escape `\\{}' in `y' command", line.current()),
                        );
                    }
                }
            }
            c if c == delimiter => return Ok(result),
            c => {
                result.push(c);
                line.advance();
            }
        }
    }
    compilation_error(lines, line, "unterminated `y' command")
}
