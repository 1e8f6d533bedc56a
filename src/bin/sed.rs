// Binary entry point for the sed utility
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

fn main() {
    uucore::panic::mute_sigpipe_panic();
    std::process::exit(textutils::sed::uumain(std::env::args_os()));
}
