// Character cursor over one line of script text
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

/// Cursor over the characters of one script line, without its newline.
/// Positions count characters, not bytes, so that error columns
/// match what a user sees.
pub struct ScriptCharProvider {
    chars: Box<[char]>,
    index: usize,
}

impl ScriptCharProvider {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            index: 0,
        }
    }

    /// Step one character forward; sticks at end of line.
    pub fn advance(&mut self) {
        self.index = (self.index + 1).min(self.chars.len());
    }

    /// Step `n` characters back, stopping at the line start.
    pub fn retreat(&mut self, n: usize) {
        self.index = self.index.saturating_sub(n);
    }

    /// The character under the cursor.
    /// Callers must check `eol()` first.
    pub fn current(&self) -> char {
        self.chars[self.index]
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.index + 1).copied()
    }

    pub fn eol(&self) -> bool {
        self.index >= self.chars.len()
    }

    pub fn is(&self, c: char) -> bool {
        self.chars.get(self.index) == Some(&c)
    }

    pub fn eat_spaces(&mut self) {
        let skipped = self.chars[self.index..]
            .iter()
            .take_while(|c| c.is_whitespace())
            .count();
        self.index += skipped;
    }

    /// Consume the remainder of the line.
    pub fn take_rest(&mut self) -> String {
        let rest = self.chars[self.index..].iter().collect();
        self.index = self.chars.len();
        rest
    }

    pub fn get_pos(&self) -> usize {
        self.index
    }
}
