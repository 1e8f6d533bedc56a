// Report compilation and processing errors
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::sed::script_char_provider::ScriptCharProvider;
use crate::sed::script_line_provider::ScriptLineProvider;

use std::fmt;
use uucore::error::{UResult, USimpleError};

/// Exit code of errors found while compiling the script
pub const COMPILE_EXIT_CODE: i32 = 1;
/// Exit code of errors found while processing input
pub const RUNTIME_EXIT_CODE: i32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// The place in the script where a command was defined
pub struct ScriptLocation {
    pub input_name: String,
    pub line_number: usize,
    pub column_number: usize,
}

impl ScriptLocation {
    /// Capture the current position of the script providers.
    pub fn at_position(lines: &ScriptLineProvider, line: &ScriptCharProvider) -> Self {
        Self {
            input_name: lines.get_input_name().to_string(),
            line_number: lines.get_line_number(),
            column_number: line.get_pos() + 1,
        }
    }
}

impl fmt::Display for ScriptLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.input_name, self.line_number, self.column_number
        )
    }
}

fn located_error<T>(location: &ScriptLocation, msg: impl ToString, exit_code: i32) -> UResult<T> {
    Err(USimpleError::new(
        exit_code,
        format!("{location}: error: {}", msg.to_string()),
    ))
}

/// Fail with msg as a compile error at the provider location.
pub fn compilation_error<T>(
    lines: &ScriptLineProvider,
    line: &ScriptCharProvider,
    msg: impl ToString,
) -> UResult<T> {
    located_error(
        &ScriptLocation::at_position(lines, line),
        msg,
        COMPILE_EXIT_CODE,
    )
}

/// Fail with msg as a compile error found after a command was parsed,
/// such as an undefined branch label.
pub fn semantic_error<T>(location: &ScriptLocation, msg: impl ToString) -> UResult<T> {
    located_error(location, msg, COMPILE_EXIT_CODE)
}

/// Fail with msg as an error while executing the command defined
/// at the specified location.
pub fn runtime_error<T>(location: &ScriptLocation, msg: impl ToString) -> UResult<T> {
    located_error(location, msg, RUNTIME_EXIT_CODE)
}
