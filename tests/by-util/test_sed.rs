// Integration tests
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use std::io::Write;
use std::ops::RangeInclusive;
use tempfile::NamedTempFile;
use uutests::util::TestScenario;
use uutests::util_name;
use uutests::{at_and_ucmd, new_ucmd};

// Input files
const LINES1: &str = "input/lines1";
const LINES2: &str = "input/lines2";
const NO_NEW_LINE: &str = "input/no-new-line.txt";

/// Return the specified lines of input file lines1 or lines2.
fn lines(file: u32, numbers: RangeInclusive<u32>) -> String {
    numbers.map(|n| format!("l{file}_{n}\n")).collect()
}

/// Return all lines of both input files.
fn all_lines() -> String {
    lines(1, 1..=14) + &lines(2, 1..=9)
}

// Invocation
#[test]
fn test_invalid_arg() {
    new_ucmd!().arg("--definitely-invalid").fails().code_is(1);
}

#[test]
fn test_debug_accepted() {
    new_ucmd!().args(&["--debug", ""]).pipe_in("").succeeds();
}

#[test]
fn test_silent_alias() {
    new_ucmd!()
        .args(&["--silent", "p"])
        .pipe_in("a\n")
        .succeeds()
        .stdout_is("a\n");
}

#[test]
fn test_missing_script_argument() {
    new_ucmd!()
        .fails()
        .code_is(1)
        .stderr_contains("missing script");
}

#[test]
fn test_empty_script_copies_input() {
    new_ucmd!()
        .arg("")
        .pipe_in("one\ntwo\n")
        .succeeds()
        .stdout_is("one\ntwo\n");
}

#[test]
fn test_f_script() {
    let mut temp = NamedTempFile::new().unwrap();
    writeln!(temp, "s/a/b/").unwrap();
    writeln!(temp, "# comment").unwrap();
    writeln!(temp, "s/b/c/").unwrap();

    new_ucmd!()
        .arg("-f")
        .arg(temp.path())
        .pipe_in("a\n")
        .succeeds()
        .stdout_is("c\n");
}

#[test]
fn test_scripts_in_order() {
    let mut temp = NamedTempFile::new().unwrap();
    writeln!(temp, "s/b/c/").unwrap();

    new_ucmd!()
        .args(&["-e", "s/a/b/", "-f"])
        .arg(temp.path())
        .args(&["-e", "s/c/d/"])
        .pipe_in("a\n")
        .succeeds()
        .stdout_is("d\n");
}

#[test]
fn test_expression_makes_script_argument_a_file() {
    new_ucmd!()
        .args(&["-n", "-e", "$p", LINES1])
        .succeeds()
        .stdout_is(lines(1, 14..=14));
}

#[test]
fn test_no_script_files() {
    new_ucmd!()
        .args(&["", LINES1, NO_NEW_LINE])
        .succeeds()
        .stdout_is(lines(1, 1..=14) + "line one\nline two");
}

#[test]
fn test_hash_n_first_line() {
    new_ucmd!()
        .arg("#n\n2p")
        .pipe_in("a\nb\n")
        .succeeds()
        .stdout_is("b\n");
}

/// Create a test function checking the output of sed run with args.
macro_rules! check_output {
    ($name:ident, $args:expr, $expected:expr) => {
        #[test]
        fn $name() {
            new_ucmd!()
                .args(&$args)
                .succeeds()
                .stdout_is($expected);
        }
    };
}

// Addresses
check_output!(addr_one_line, ["-n", "-e", "4p", LINES1], lines(1, 4..=4));
check_output!(
    addr_straddle,
    ["-n", "-e", "20p", LINES1, LINES2],
    lines(2, 6..=6)
);
check_output!(addr_last_one_file, ["-n", "$p", LINES1], lines(1, 14..=14));
check_output!(
    addr_last_two_files,
    ["-n", "$p", LINES1, LINES2],
    lines(2, 9..=9)
);
#[cfg(unix)]
check_output!(
    addr_last_with_empty,
    ["-n", "$p", LINES1, LINES2, "/dev/null"],
    lines(2, 9..=9)
);
check_output!(addr_past_last, ["-n", "20p", LINES1], "");
check_output!(addr_not_found, ["-n", "/NOTFOUND/p", LINES1], "");
check_output!(addr_found, ["-n", "/l1_7/p", LINES1], lines(1, 7..=7));
check_output!(addr_found_space, ["-n", " /l1_7/ p", LINES1], lines(1, 7..=7));
check_output!(
    addr_escaped_delimiter,
    ["-n", r"\_l1\_7_p", LINES1],
    lines(1, 7..=7)
);
check_output!(addr_range_numeric, ["-n", "1,4p", LINES1], lines(1, 1..=4));
check_output!(addr_range_to_last, ["-n", "1,$p", LINES1, LINES2], all_lines());
check_output!(
    addr_range_to_pattern,
    ["-n", "1,/l2_9/p", LINES1, LINES2],
    all_lines()
);
check_output!(
    addr_pattern_to_last,
    ["-n", "/4/,$p", LINES1, LINES2],
    lines(1, 4..=14) + &lines(2, 1..=9)
);
check_output!(
    addr_pattern_to_straddle,
    ["-n", "/4/,20p", LINES1, LINES2],
    lines(1, 4..=14) + &lines(2, 1..=6)
);
check_output!(
    addr_pattern_to_pattern,
    ["-n", "/4/,/10/p", LINES1, LINES2],
    lines(1, 4..=10) + &lines(1, 14..=14) + &lines(2, 1..=9)
);
check_output!(
    addr_pattern_straddle,
    ["-n", "/l2_3/,/l1_8/p", LINES1, LINES2],
    lines(2, 3..=9)
);
check_output!(
    addr_range_reverse,
    ["-n", "12,3p", LINES1, LINES2],
    lines(1, 12..=12)
);
check_output!(
    addr_pattern_range_reverse,
    ["-n", "/l1_7/,3p", LINES1, LINES2],
    lines(1, 7..=7)
);
check_output!(
    addr_numeric_to_relative,
    ["-n", "13,+4p", LINES1, LINES2],
    lines(1, 13..=14) + &lines(2, 1..=3)
);
check_output!(
    addr_pattern_to_relative,
    ["-n", "/l1_6/,+2p", LINES1, LINES2],
    lines(1, 6..=8)
);
check_output!(
    addr_zero_to_pattern,
    ["-n", "0,/l1/p", LINES1],
    lines(1, 1..=1)
);
check_output!(
    addr_first_separate,
    ["-n", "--separate", "1p", LINES1, LINES2],
    lines(1, 1..=1) + &lines(2, 1..=1)
);
check_output!(
    addr_last_separate,
    ["-ns", "$p", LINES1, LINES2],
    lines(1, 14..=14) + &lines(2, 9..=9)
);
check_output!(
    addr_range_separate,
    ["-ns", "/l1_13/,/NOTFOUND/p", LINES1, LINES2],
    lines(1, 13..=14)
);
check_output!(
    addr_three_lines,
    ["-n", "4p;8p;1p", LINES1],
    "l1_1\nl1_4\nl1_8\n"
);
check_output!(addr_two_lines_newline, ["-n", "4p\n8p", LINES1], "l1_4\nl1_8\n");
check_output!(
    addr_one_line_negate,
    ["-n", "4!p", LINES1],
    lines(1, 1..=3) + &lines(1, 5..=14)
);
check_output!(
    addr_range_numeric_negate,
    ["-n", "1,4!p", LINES1],
    lines(1, 5..=14)
);
check_output!(
    addr_pattern_to_pattern_negate,
    ["-n", "/1_4/,/10/!p", LINES1],
    lines(1, 1..=3) + &lines(1, 11..=14)
);
check_output!(
    addr_empty_re_reuse,
    ["-n", "/_2/,//p", LINES1, LINES2],
    lines(1, 2..=14) + &lines(2, 1..=2)
);

// Substitution
check_output!(
    subst_print,
    ["-ne", "s/1_1/S&/p", LINES1],
    "lS1_1\nlS1_10\nlS1_11\nlS1_12\nlS1_13\nlS1_14\n"
);
check_output!(
    subst_no_new_line,
    ["s/l/L/g", NO_NEW_LINE],
    "Line one\nLine two"
);

#[test]
fn test_subst_occurrences() {
    new_ucmd!()
        .arg("s/foo/bar/2")
        .pipe_in("foo foo foo\n")
        .succeeds()
        .stdout_is("foo bar foo\n");
    new_ucmd!()
        .arg("s/./X/4")
        .pipe_in("abcdef\n")
        .succeeds()
        .stdout_is("abcXef\n");
    new_ucmd!()
        .arg("s,.,X,g")
        .pipe_in("abc\n")
        .succeeds()
        .stdout_is("XXX\n");
}

#[test]
fn test_subst_whole_match() {
    new_ucmd!()
        .arg("s/./(&)/g")
        .pipe_in("ab\n")
        .succeeds()
        .stdout_is("(a)(b)\n");
    new_ucmd!()
        .arg(r"s/./(\&)/g")
        .pipe_in("ab\n")
        .succeeds()
        .stdout_is("(&)(&)\n");
}

#[test]
fn test_subst_escaped_delimiter() {
    new_ucmd!()
        .arg(r"s_\__X_")
        .pipe_in("a_b\n")
        .succeeds()
        .stdout_is("aXb\n");
}

#[test]
fn test_subst_groups() {
    new_ucmd!()
        .arg(r"s/\(.\)\(.\)\(.\)/x\3x\2x\1/g")
        .pipe_in("abcdef\n")
        .succeeds()
        .stdout_is("xcxbxaxfxexd\n");
    new_ucmd!()
        .args(&["--regexp-extended", r"s/(.)(.)(.)/x\3x\2x\1/g"])
        .pipe_in("abcdef\n")
        .succeeds()
        .stdout_is("xcxbxaxfxexd\n");
    new_ucmd!()
        .args(&["-E", "s/(a|b)+/X/"])
        .pipe_in("aabbc\n")
        .succeeds()
        .stdout_is("Xc\n");
}

#[test]
fn test_subst_backreference_in_pattern() {
    new_ucmd!()
        .arg(r"s/\(.\)\1/<&>/g")
        .pipe_in("aabcdd\n")
        .succeeds()
        .stdout_is("<aa>bc<dd>\n");
}

#[test]
fn test_subst_multiline_replacement() {
    new_ucmd!()
        .arg("s/_/u0\\\nu1/g")
        .pipe_in("a_b\n")
        .succeeds()
        .stdout_is("au0\nu1b\n");
}

#[test]
fn test_subst_newline_in_pattern_space() {
    new_ucmd!()
        .args(&["-n", r"1{;N;s/[\n]/X/;p;}"])
        .pipe_in("a\nb\n")
        .succeeds()
        .stdout_is("aXb\n");
    new_ucmd!()
        .args(&["-n", r"1{;N;s/\n/X/;p;}"])
        .pipe_in("a\nb\n")
        .succeeds()
        .stdout_is("aXb\n");
}

#[test]
fn test_subst_write_file() {
    let (at, mut ucmd) = at_and_ucmd!();
    ucmd.args(&["-n", "s/b/B/w out.txt"])
        .pipe_in("a\nb\nc\nb\n")
        .succeeds()
        .no_stdout();
    assert_eq!(at.read("out.txt"), "B\nB\n");
}

#[test]
fn test_backslash_in_bracket_expression() {
    new_ucmd!()
        .args(&[r"s/[\]/x/;s/[\.]/y/g"])
        .pipe_in("a\\b\\c.d\n")
        .succeeds()
        .stdout_is("axbycyd\n");
}

#[test]
fn test_hex_escape_is_literal() {
    new_ucmd!()
        .args(&[r"s/\x2e/X/;s/a\x2a/Y/"])
        .pipe_in("abc.d aa*\n")
        .succeeds()
        .stdout_is("abcXd aY\n");
}

#[test]
fn test_unterminated_bracket() {
    new_ucmd!()
        .arg("s/[abc/x/")
        .pipe_in("a\n")
        .fails()
        .code_is(1)
        .stderr_contains("unterminated `s' command");
    new_ucmd!()
        .arg("/[abc/p")
        .pipe_in("a\n")
        .fails()
        .code_is(1)
        .stderr_contains("unterminated address regex");
}

#[test]
fn test_malformed_substitution() {
    new_ucmd!()
        .arg("s/a/b")
        .pipe_in("a\n")
        .fails()
        .code_is(1)
        .stderr_contains("unterminated `s' command");
}

// Transliteration
#[test]
fn test_transliteration() {
    new_ucmd!()
        .arg("y/0123456789/9876543210/")
        .pipe_in("a1_23\n")
        .succeeds()
        .stdout_is("a8_76\n");
    new_ucmd!()
        .arg(r"y10\123456789198765432\101")
        .pipe_in("a1_23\n")
        .succeeds()
        .stdout_is("a8_76\n");
    new_ucmd!()
        .arg(r"1N;2y/\n/X/")
        .pipe_in("a\nb\nc\n")
        .succeeds()
        .stdout_is("aXb\nc\n");
}

check_output!(trans_no_new_line, ["y/l/L/", NO_NEW_LINE], "Line one\nLine two");

// Pattern and hold space
check_output!(
    pattern_next_print,
    ["-n", "N;N;P", LINES1],
    "l1_1\nl1_4\nl1_7\nl1_10\n"
);
check_output!(
    pattern_delete_to_newline,
    ["-n", "2N;3p;3D;3p", LINES1],
    "l1_2\nl1_3\nl1_3\n"
);
check_output!(
    pattern_delete_no_newline,
    ["2D", LINES1],
    lines(1, 1..=1) + &lines(1, 3..=14)
);
check_output!(
    pattern_delete_print,
    ["-n", "4d;p", LINES1],
    lines(1, 1..=3) + &lines(1, 5..=14)
);
check_output!(pattern_append_delete, ["N;N;N;D", LINES1], lines(1, 5..=14));
check_output!(
    pattern_append_delete_two_files,
    ["N;N;N;D", LINES1, LINES2],
    lines(1, 8..=14) + &lines(2, 1..=9)
);
check_output!(
    pattern_append_delete_separate,
    ["-s", "N;N;N;D", LINES1, LINES2],
    lines(1, 5..=14) + &lines(2, 3..=9)
);
check_output!(
    pattern_hold_append_swap,
    ["2h;3H;4g;5G;6x;6p;6x;6p", LINES1],
    "l1_1\nl1_2\nl1_3\nl1_2\nl1_3\nl1_5\nl1_2\nl1_3\nl1_2\nl1_3\nl1_6\nl1_6\n".to_string()
        + &lines(1, 7..=14)
);
check_output!(pattern_next_output, ["4n", LINES1], lines(1, 1..=14));
check_output!(pattern_next_no_output, ["-n", "4n", LINES1], "");
check_output!(
    pattern_next_print_output,
    ["4n;p", LINES1],
    "l1_1\nl1_1\nl1_2\nl1_2\nl1_3\nl1_3\nl1_4\n".to_string()
        + &(5..=14)
            .map(|n| format!("l1_{n}\nl1_{n}\n"))
            .collect::<String>()
);
check_output!(
    pattern_next_print_no_output,
    ["-n", "4n;p", LINES1],
    lines(1, 1..=3) + &lines(1, 5..=14)
);
check_output!(pattern_quit, ["5q", LINES1], lines(1, 1..=5));
check_output!(pattern_quit_two_files, ["5q", LINES1, LINES2], lines(1, 1..=5));

#[test]
fn test_line_pairing() {
    new_ucmd!()
        .arg("N;P;D")
        .pipe_in("1\n2\n3\n")
        .succeeds()
        .stdout_is("1\n2\n3\n");
}

#[test]
fn test_tac() {
    new_ucmd!()
        .arg("1!G;h;$!d")
        .pipe_in("a\nb\nc\n")
        .succeeds()
        .stdout_is("c\nb\na\n");
}

#[test]
fn test_posix_next_append_at_end() {
    new_ucmd!()
        .arg(r"N;s/\n/-/")
        .pipe_in("1\n2\n3\n")
        .succeeds()
        .stdout_is("1-2\n3\n");
    new_ucmd!()
        .args(&["--posix", r"N;s/\n/-/"])
        .pipe_in("1\n2\n3\n")
        .succeeds()
        .stdout_is("1-2\n");
    new_ucmd!()
        .arg(r"N;s/\n/-/")
        .env("POSIXLY_CORRECT", "1")
        .pipe_in("1\n2\n3\n")
        .succeeds()
        .stdout_is("1-2\n");
}

// Text and files
#[test]
fn test_range_delete() {
    new_ucmd!()
        .arg("1,3d")
        .pipe_in("a\nb\nc\nd\n")
        .succeeds()
        .stdout_is("d\n");
}

#[test]
fn test_append_after_delete() {
    new_ucmd!()
        .arg("2a\\\nappended\n2d")
        .pipe_in("1\n2\n3\n")
        .succeeds()
        .stdout_is("1\nappended\n3\n");
}

#[test]
fn test_text_commands() {
    new_ucmd!()
        .arg("1a hello")
        .pipe_in("x\ny\n")
        .succeeds()
        .stdout_is("x\nhello\ny\n");
    new_ucmd!()
        .arg("2i\\\nbefore")
        .pipe_in("x\ny\n")
        .succeeds()
        .stdout_is("x\nbefore\ny\n");
    new_ucmd!()
        .arg("2,3c\\\nchanged")
        .pipe_in("1\n2\n3\n4\n")
        .succeeds()
        .stdout_is("1\nchanged\n4\n");
}

#[test]
fn test_append_to_line_without_newline() {
    new_ucmd!()
        .arg("$a\\\nend")
        .pipe_in("x")
        .succeeds()
        .stdout_is("x\nend\n");
    new_ucmd!().arg("p").pipe_in("x").succeeds().stdout_is("x\nx");
}

#[test]
fn test_read_file() {
    let (at, mut ucmd) = at_and_ucmd!();
    at.write("insert.txt", "inserted\n");
    ucmd.arg("1r insert.txt")
        .pipe_in("a\nb\n")
        .succeeds()
        .stdout_is("a\ninserted\nb\n");
}

#[test]
fn test_read_missing_file() {
    new_ucmd!()
        .arg("r /no/such/file")
        .pipe_in("a\n")
        .succeeds()
        .stdout_is("a\n");
}

#[test]
fn test_write_file() {
    let (at, mut ucmd) = at_and_ucmd!();
    ucmd.args(&["/b/w out.txt", LINES1]).succeeds();
    assert_eq!(at.read("out.txt"), "");

    let (at, mut ucmd) = at_and_ucmd!();
    ucmd.args(&["-n", "/1_1/w out.txt"])
        .pipe_in("l1_1\nl1_2\nl1_10\n")
        .succeeds()
        .no_stdout();
    assert_eq!(at.read("out.txt"), "l1_1\nl1_10\n");
}

#[test]
fn test_write_file_created_without_matches() {
    let (at, mut ucmd) = at_and_ucmd!();
    ucmd.arg("/x/w out.txt").pipe_in("a\n").succeeds();
    assert!(at.file_exists("out.txt"));

    let (at, mut ucmd) = at_and_ucmd!();
    ucmd.args(&["-a", "/x/w out.txt"]).pipe_in("a\n").succeeds();
    assert!(!at.file_exists("out.txt"));
}

#[test]
fn test_write_stdout() {
    new_ucmd!()
        .args(&["-n", "w /dev/stdout"])
        .pipe_in("a\nb\n")
        .succeeds()
        .stdout_is("a\nb\n");
}

// Other commands
#[test]
fn test_quit_exit_code() {
    new_ucmd!()
        .arg("q5")
        .pipe_in("a\nb\n")
        .fails()
        .code_is(5)
        .stdout_is("a\n");
    new_ucmd!()
        .arg("2Q")
        .pipe_in("a\nb\nc\n")
        .succeeds()
        .stdout_is("a\n");
}

#[test]
fn test_list() {
    new_ucmd!()
        .args(&["-n", "l"])
        .pipe_in("a\tb\\c\n")
        .succeeds()
        .stdout_is("a\\tb\\\\c$\n");
    new_ucmd!()
        .args(&["-n", "-l", "5", "l"])
        .pipe_in("abcdefghij\n")
        .succeeds()
        .stdout_is("abcd\\\nefgh\\\nij$\n");
    new_ucmd!()
        .args(&["-n", "l 0"])
        .pipe_in("abcdefghij\n")
        .succeeds()
        .stdout_is("abcdefghij$\n");
}

#[test]
fn test_line_number() {
    new_ucmd!()
        .args(&["-n", "$="])
        .pipe_in("a\nb\nc\n")
        .succeeds()
        .stdout_is("3\n");
}

#[test]
fn test_branches() {
    new_ucmd!()
        .arg(r":a;N;$!ba;s/\n/,/g")
        .pipe_in("a\nb\nc\n")
        .succeeds()
        .stdout_is("a,b,c\n");
    new_ucmd!()
        .arg("s/x/X/;Tskip;s/$/!/;:skip")
        .pipe_in("x\ny\n")
        .succeeds()
        .stdout_is("X!\ny\n");
}

#[test]
fn test_debug_output() {
    new_ucmd!()
        .args(&["--debug", "s/a/b/"])
        .pipe_in("a\n")
        .succeeds()
        .stdout_contains("SED PROGRAM:\n  s/a/b/\n")
        .stdout_contains("PATTERN: a\nCOMMAND: s/a/b/\nEND-OF-CYCLE:\nb\n");
}

// In-place editing
#[test]
fn test_in_place() {
    let (at, mut ucmd) = at_and_ucmd!();
    at.write("file.txt", "a\nb\n");
    ucmd.args(&["-i", "s/a/x/", "file.txt"])
        .succeeds()
        .no_stdout();
    assert_eq!(at.read("file.txt"), "x\nb\n");
}

#[test]
fn test_in_place_backup() {
    let (at, mut ucmd) = at_and_ucmd!();
    at.write("file.txt", "a\n");
    ucmd.args(&["-i.bak", "s/a/x/", "file.txt"]).succeeds();
    assert_eq!(at.read("file.txt"), "x\n");
    assert_eq!(at.read("file.txt.bak"), "a\n");
}

#[test]
fn test_in_place_files_separate() {
    let (at, mut ucmd) = at_and_ucmd!();
    at.write("one.txt", "a\nb\n");
    at.write("two.txt", "c\nd\n");
    ucmd.args(&["-i", "$s/$/!/", "one.txt", "two.txt"])
        .succeeds();
    assert_eq!(at.read("one.txt"), "a\nb!\n");
    assert_eq!(at.read("two.txt"), "c\nd!\n");
}

#[test]
fn test_in_place_files_joined() {
    let (at, mut ucmd) = at_and_ucmd!();
    at.write("one.txt", "a\nb\n");
    at.write("two.txt", "c\nd\n");
    ucmd.args(&["-I", "$s/$/!/;2,3s/^/>/", "one.txt", "two.txt"])
        .succeeds();
    assert_eq!(at.read("one.txt"), "a\n>b\n");
    assert_eq!(at.read("two.txt"), ">c\nd!\n");
}

#[test]
fn test_in_place_write_stdout() {
    let (at, mut ucmd) = at_and_ucmd!();
    at.write("file.txt", "a\nb\n");
    ucmd.args(&["-i", "1w /dev/stdout", "file.txt"])
        .succeeds()
        .stdout_is("a\n");
    assert_eq!(at.read("file.txt"), "a\nb\n");
}

#[test]
fn test_in_place_without_files() {
    new_ucmd!()
        .args(&["-i", "p"])
        .fails()
        .code_is(1)
        .stderr_contains("no input files");
}

// Errors
#[test]
fn test_compile_error_location() {
    new_ucmd!()
        .arg("p;k")
        .pipe_in("")
        .fails()
        .code_is(1)
        .stderr_contains("-e expression #1:1:3: error: unknown command: `k'");
}

#[test]
fn test_undefined_label() {
    new_ucmd!()
        .arg("b nowhere")
        .pipe_in("a\n")
        .fails()
        .code_is(1)
        .stderr_contains("can't find label for jump to `nowhere'")
        .no_stdout();
}

#[test]
fn test_no_previous_regex_at_runtime() {
    new_ucmd!()
        .arg("2{/x/p};s//y/")
        .pipe_in("a\n")
        .fails()
        .code_is(2)
        .stderr_contains("no previous regular expression");
}

#[test]
fn test_missing_input_file() {
    new_ucmd!()
        .args(&["-n", "$p", "missing.txt", LINES2])
        .fails()
        .code_is(2)
        .stderr_contains("can't read missing.txt")
        .stdout_is(lines(2, 9..=9));
}

#[test]
fn test_directory_input() {
    new_ucmd!()
        .args(&["p", "input"])
        .fails()
        .code_is(2)
        .stderr_contains("read error on input: Is a directory");
}
