// Program entry point and CLI processing
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

pub mod command;
pub mod compiler;
pub mod delimited_parser;
pub mod error_handling;
pub mod fast_io;
pub mod fast_regex;
pub mod in_place;
pub mod named_writer;
pub mod processor;
pub mod script_char_provider;
pub mod script_line_provider;
pub mod unparse;

use crate::sed::command::ProcessingContext;
use crate::sed::compiler::compile;
use crate::sed::processor::process_all_files;
use crate::sed::script_line_provider::ScriptValue;

use clap::{Arg, ArgAction, ArgMatches, Command, arg};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use terminal_size::{Width, terminal_size};
use uucore::error::{UResult, UUsageError};
use uucore::format_usage;

const ABOUT: &str = "Stream editor for filtering and transforming text";
const USAGE: &str = "sed [OPTION]... {script} [file]...";

/// Wrap length of `l` when the output isn't a terminal
const DEFAULT_OUTPUT_WIDTH: usize = 70;

#[uucore::main]
pub fn uumain(args: impl uucore::Args) -> UResult<()> {
    let matches = uu_app().try_get_matches_from(attach_in_place_suffixes(args))?;
    let (scripts, files) = get_scripts_files(&matches)?;
    let mut processing_context = build_context(&matches);
    check_stdin_use(&scripts, &files, &processing_context)?;

    let mut executable = compile(scripts, &mut processing_context)?;
    process_all_files(&mut executable, files, &mut processing_context)
}

pub fn uu_app() -> Command {
    Command::new(uucore::util_name())
        .about(ABOUT)
        .override_usage(format_usage(USAGE))
        .infer_long_args(true)
        .args([
            arg!([script] "Script to execute if not otherwise provided."),
            Arg::new("file")
                .help("Input files")
                .value_parser(clap::value_parser!(PathBuf))
                .num_args(0..),
            Arg::new("defer-output-files")
                .short('a')
                .long("defer-output-files")
                .help("Open output files on first use rather than before processing.")
                .action(ArgAction::SetTrue),
            arg!(--debug "Annotate program execution."),
            Arg::new("regexp-extended")
                .short('E')
                .long("regexp-extended")
                .short_alias('r')
                .help("Use extended regular expressions.")
                .action(ArgAction::SetTrue),
            arg!(-e --expression <SCRIPT> "Add script to executed commands.")
                .action(ArgAction::Append),
            // Access with .get_many::<PathBuf>("script-file")
            Arg::new("script-file")
                .short('f')
                .long("script-file")
                .value_name("FILE")
                .help("Add the contents of the script file to executed commands.")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Append),
            Arg::new("follow-symlinks")
                .long("follow-symlinks")
                .help("Follow symlinks when processing in place.")
                .action(ArgAction::SetTrue),
            // Access with .get_one::<String>("in-place")
            Arg::new("in-place")
                .short('i')
                .long("in-place")
                .value_name("SUFFIX")
                .help("Edit files in place, making a backup if SUFFIX is supplied.")
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value(""),
            Arg::new("in-place-joined")
                .short('I')
                .long("in-place-joined")
                .value_name("SUFFIX")
                .help("Like -i, but line numbers and ranges continue across files.")
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value("")
                .conflicts_with("in-place"),
            // Access with .get_one::<usize>("line-length")
            Arg::new("line-length")
                .short('l')
                .long("line-length")
                .value_name("N")
                .help("Specify the desired line-wrap length for the 'l' command.")
                .value_parser(clap::value_parser!(usize)),
            arg!(-n --quiet "Suppress automatic printing of pattern space.").aliases(["silent"]),
            arg!(--posix "Disable all GNU extensions."),
            arg!(-s --separate "Consider files as separate rather than as a single continuous long stream."),
            arg!(-u --unbuffered "Flush output buffers after processing each line."),
        ])
}

/// Return the arguments with a suffix attached to -i or -I given as
/// the long option's value, so that the option's optional value never
/// swallows the following argument.
fn attach_in_place_suffixes(args: impl Iterator<Item = OsString>) -> Vec<OsString> {
    let mut result = Vec::new();
    let mut takes_value = false; // True if the previous option needs a value
    let mut options_ended = false;

    for arg in args {
        if takes_value || options_ended {
            takes_value = false;
            result.push(arg);
            continue;
        }

        let rewritten = match arg.to_str() {
            Some("--") => {
                options_ended = true;
                None
            }
            Some("-e" | "-f" | "-l" | "--expression" | "--script-file" | "--line-length") => {
                takes_value = true;
                None
            }
            Some(s) => match (s.strip_prefix("-i"), s.strip_prefix("-I")) {
                (Some(suffix), _) if !suffix.is_empty() => {
                    Some(OsString::from(format!("--in-place={suffix}")))
                }
                (_, Some(suffix)) if !suffix.is_empty() => {
                    Some(OsString::from(format!("--in-place-joined={suffix}")))
                }
                _ => None,
            },
            None => None,
        };
        result.push(rewritten.unwrap_or(arg));
    }
    result
}

/// Split the arguments into compilation units and input files.
/// Units from -e and -f keep their command-line order; without either,
/// the first operand is the script.
fn get_scripts_files(matches: &ArgMatches) -> UResult<(Vec<ScriptValue>, Vec<PathBuf>)> {
    let mut units: BTreeMap<usize, ScriptValue> = BTreeMap::new();
    if let Some(indices) = matches.indices_of("expression") {
        let values = matches.get_many::<String>("expression").unwrap_or_default();
        units.extend(indices.zip(values.map(|e| ScriptValue::StringVal(e.clone()))));
    }
    if let Some(indices) = matches.indices_of("script-file") {
        let values = matches.get_many::<PathBuf>("script-file").unwrap_or_default();
        units.extend(indices.zip(values.map(|f| ScriptValue::PathVal(f.clone()))));
    }

    let first_operand = matches.get_one::<String>("script");
    let mut files: Vec<PathBuf> = Vec::new();
    if units.is_empty() {
        let Some(script) = first_operand else {
            return Err(UUsageError::new(1, "missing script"));
        };
        units.insert(0, ScriptValue::StringVal(script.clone()));
    } else if let Some(file) = first_operand {
        files.push(PathBuf::from(file));
    }

    files.extend(matches.get_many::<PathBuf>("file").into_iter().flatten().cloned());
    if files.is_empty() {
        files.push(PathBuf::from("-"));
    }

    Ok((units.into_values().collect(), files))
}

/// Fail if the standard input would be read more than once, or read
/// as a script while editing in place.
fn check_stdin_use(
    scripts: &[ScriptValue],
    files: &[PathBuf],
    context: &ProcessingContext,
) -> UResult<()> {
    let stdin_scripts = scripts.iter().filter(|s| s.is_stdin()).count();
    if stdin_scripts > 1 {
        return Err(UUsageError::new(1, "standard input can't be read more than once"));
    }

    if context.in_place {
        if stdin_scripts > 0 {
            return Err(UUsageError::new(
                1,
                "can't read the script from standard input when editing in place",
            ));
        }
        if files.iter().all(|f| f.as_os_str() == "-") {
            return Err(UUsageError::new(1, "no input files"));
        }
    }
    Ok(())
}

/// Return the width of the command's terminal or a default.
fn output_width() -> usize {
    match terminal_size() {
        Some((Width(w), _)) if w > 1 => usize::from(w) - 1,
        _ => DEFAULT_OUTPUT_WIDTH,
    }
}

/// Return the optional suffix of an in-place editing option.
fn in_place_suffix(matches: &ArgMatches, id: &str) -> Option<String> {
    matches
        .get_one::<String>(id)
        .filter(|s| !s.is_empty())
        .cloned()
}

// Parse CLI flag arguments and return a ProcessingContext struct based on them
fn build_context(matches: &ArgMatches) -> ProcessingContext {
    let in_place_separate = matches.contains_id("in-place");
    let in_place_joined = matches.contains_id("in-place-joined");

    ProcessingContext {
        debug: matches.get_flag("debug"),
        defer_output_files: matches.get_flag("defer-output-files"),
        regex_extended: matches.get_flag("regexp-extended"),
        follow_symlinks: matches.get_flag("follow-symlinks"),
        in_place: in_place_separate || in_place_joined,
        in_place_suffix: in_place_suffix(matches, "in-place")
            .or_else(|| in_place_suffix(matches, "in-place-joined")),
        length: matches
            .get_one::<usize>("line-length")
            .copied()
            .unwrap_or_else(output_width),
        quiet: matches.get_flag("quiet"),
        posix: matches.get_flag("posix") || std::env::var_os("POSIXLY_CORRECT").is_some(),
        separate: matches.get_flag("separate") || in_place_separate,
        unbuffered: matches.get_flag("unbuffered"),
        ..Default::default()
    }
}
