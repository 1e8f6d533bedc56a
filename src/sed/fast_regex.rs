// A unified interface to literal, plain, and fancy regular expressions
//
// This allows using plain string search or the regex crate when
// possible, resorting to the slower fancy_regex crate when needed.
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use fancy_regex::Regex as FancyRegex;
use memchr::memmem;
use once_cell::sync::Lazy;
use regex::{Regex as RustRegex, RegexBuilder};
use std::error::Error;
use uucore::error::{UResult, USimpleError};

use crate::sed::error_handling::RUNTIME_EXIT_CODE;

/// REs requiring the fancy_regex capabilities: an odd number of
/// backslashes before a digit is a back-reference.
static NEEDS_FANCY_RE: Lazy<RustRegex> = Lazy::new(|| {
    RustRegex::new(
        r"(?x) # Turn on verbose mode
          (^|[^\\])         # Start, or a non-backslash
          (\\\\)*           # Any number of escaped backslashes
          \\[0-9]           # A back-reference
        ",
    )
    .expect("valid back-reference detector")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Types of literal string anchored matches
enum AnchoredMatch {
    Begin, // ^...
    End,   // ...$
    Both,  // ^...$
    Free,  // ...
}

#[derive(Clone, Debug)]
/// A fast Regex-like matcher for literal strings using memchr:memmem
pub struct LiteralMatcher {
    needle: String,            // Text without any anchors or escapes
    match_type: AnchoredMatch, // Type of anchoring specified
}

impl LiteralMatcher {
    /// Return a matcher if the ERE pattern denotes a fixed string,
    /// optionally anchored.
    pub fn from_pattern(pattern: &str) -> Option<Self> {
        let chars: Vec<char> = pattern.chars().collect();
        let mut needle = String::with_capacity(pattern.len());
        let mut begin = false;
        let mut end = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '^' if i == 0 => begin = true,
                '$' if i == chars.len() - 1 => end = true,
                '\\' => {
                    let next = *chars.get(i + 1)?;
                    if next.is_alphanumeric() || matches!(next, '<' | '>' | '`' | '\'') {
                        // Classes, assertions, back-references
                        return None;
                    }
                    needle.push(next);
                    i += 1;
                }
                '.' | '[' | ']' | '*' | '+' | '?' | '{' | '}' | '(' | ')' | '|' | '^' | '$' => {
                    return None;
                }
                _ => needle.push(c),
            }
            i += 1;
        }

        let match_type = match (begin, end) {
            (true, true) => AnchoredMatch::Both,
            (true, false) => AnchoredMatch::Begin,
            (false, true) => AnchoredMatch::End,
            (false, false) => AnchoredMatch::Free,
        };
        Some(Self { needle, match_type })
    }

    /// Returns the start index of a match at or after start, if any.
    /// A begin anchor can only match at the start of the haystack.
    fn anchored_find(&self, haystack: &str, start: usize) -> Option<usize> {
        let nlen = self.needle.len();
        let hlen = haystack.len();
        let needle = self.needle.as_str();

        match self.match_type {
            AnchoredMatch::Both => (start == 0 && haystack == needle).then_some(0),
            AnchoredMatch::Begin => (start == 0 && haystack.starts_with(needle)).then_some(0),
            AnchoredMatch::End => (hlen >= nlen
                && hlen - nlen >= start
                && haystack.ends_with(needle))
            .then(|| hlen - nlen),
            AnchoredMatch::Free => memmem::find(&haystack.as_bytes()[start..], needle.as_bytes())
                .map(|pos| pos + start),
        }
    }
}

#[derive(Clone, Debug)]
/// A regular expression that can be implemented in diverse efficient ways
pub enum Regex {
    Literal(LiteralMatcher), // Fastest: literal string
    Rust(RustRegex),         // Slower: automaton-based RE
    Fancy(FancyRegex),       // Slowest: backtracking RE supporting back-references
}

impl Regex {
    /// Construct the most efficient RE-like matching engine possible
    /// for the specified ERE pattern.
    /// The `.` metacharacter always matches newlines.
    pub fn new(pattern: &str, icase: bool) -> Result<Self, Box<dyn Error>> {
        if NEEDS_FANCY_RE.is_match(pattern) {
            let flags = if icase { "(?is)" } else { "(?s)" };
            Ok(Self::Fancy(FancyRegex::new(&format!("{flags}{pattern}"))?))
        } else if let Some(literal) = LiteralMatcher::from_pattern(pattern).filter(|_| !icase) {
            Ok(Self::Literal(literal))
        } else {
            Ok(Self::Rust(
                RegexBuilder::new(pattern)
                    .case_insensitive(icase)
                    .dot_matches_new_line(true)
                    .build()?,
            ))
        }
    }

    /// Return the number of capture groups, including group 0.
    pub fn captures_len(&self) -> usize {
        match self {
            Regex::Literal(_) => 1, // Only group 0
            Regex::Rust(re) => re.captures_len(),
            Regex::Fancy(re) => re.captures_len(),
        }
    }

    /// Check if the regex matches the specified text.
    pub fn is_match(&self, text: &str) -> UResult<bool> {
        match self {
            Regex::Literal(m) => Ok(m.anchored_find(text, 0).is_some()),
            Regex::Rust(re) => Ok(re.is_match(text)),
            Regex::Fancy(re) => re.is_match(text).map_err(match_error),
        }
    }

    /// Return the leftmost match starting at or after byte offset start.
    /// Text before start is still visible to assertions, so that `^`
    /// never matches after the beginning of the text.
    pub fn captures_at<'t>(&self, text: &'t str, start: usize) -> UResult<Option<Captures<'t>>> {
        match self {
            Regex::Literal(m) => Ok(m.anchored_find(text, start).map(|pos| Captures {
                text,
                spans: vec![Some((pos, pos + m.needle.len()))],
            })),

            Regex::Rust(re) => Ok(re.captures_at(text, start).map(|caps| Captures {
                text,
                spans: (0..caps.len())
                    .map(|i| caps.get(i).map(|m| (m.start(), m.end())))
                    .collect(),
            })),

            Regex::Fancy(re) => match re.captures_from_pos(text, start) {
                Ok(Some(caps)) => Ok(Some(Captures {
                    text,
                    spans: (0..caps.len())
                        .map(|i| caps.get(i).map(|m| (m.start(), m.end())))
                        .collect(),
                })),
                Ok(None) => Ok(None),
                Err(e) => Err(match_error(e)),
            },
        }
    }
}

fn match_error(e: fancy_regex::Error) -> Box<dyn uucore::error::UError> {
    USimpleError::new(RUNTIME_EXIT_CODE, format!("error while matching: {e}"))
}

#[derive(Clone, Debug)]
/// The groups of a single match, as byte ranges into the matched text
pub struct Captures<'t> {
    text: &'t str,
    spans: Vec<Option<(usize, usize)>>,
}

impl<'t> Captures<'t> {
    /// Return the text of group i, or None if it did not participate.
    pub fn get(&self, i: usize) -> Option<&'t str> {
        self.range(i).map(|(start, end)| &self.text[start..end])
    }

    /// Return the byte range of group i.
    pub fn range(&self, i: usize) -> Option<(usize, usize)> {
        self.spans.get(i).copied().flatten()
    }

    /// Return the byte range of the whole match.
    pub fn whole(&self) -> (usize, usize) {
        self.range(0).unwrap_or((0, 0))
    }

    /// Return the number of capture groups (including group 0).
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}
