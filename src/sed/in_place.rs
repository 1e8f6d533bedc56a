// Support for in-place editing
//
// SPDX-License-Identifier: MIT
//
// This file is part of the textutils package.
// It is licensed under the MIT License.
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use std::fs;
use std::io::{Write, stdout};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use tempfile::NamedTempFile;
use uucore::display::Quotable;
use uucore::error::{FromIo, UIoError, UResult, USimpleError};

use crate::sed::command::ProcessingContext;
use crate::sed::error_handling::RUNTIME_EXIT_CODE;
use crate::sed::fast_io::OutputBuffer;

/// The file being edited in place
struct Edit {
    temp_file: NamedTempFile,
    original_path: PathBuf,
    output: OutputBuffer,
}

/// Output destination, redirected to a temporary file that replaces
/// each input file when in-place editing
pub struct InPlace {
    stdout: OutputBuffer,
    in_place: bool,
    in_place_suffix: Option<String>,
    follow_symlinks: bool,
    edit: Option<Edit>,
}

impl InPlace {
    /// Create an in-place editing engine based on ProcessingContext.
    /// Depending on its settings it may or may not perform in-place
    /// editing, backup the original file, or follow symlinks.
    pub fn new(context: &ProcessingContext) -> Self {
        Self::with_output(context, Box::new(stdout()))
    }

    /// Create an engine whose standard output goes to out.
    pub fn with_output(context: &ProcessingContext, out: Box<dyn Write>) -> Self {
        Self {
            stdout: OutputBuffer::new(out),
            in_place: context.in_place,
            in_place_suffix: context.in_place_suffix.clone(),
            follow_symlinks: context.follow_symlinks,
            edit: None,
        }
    }

    /// Return the output of the processed data: the file being edited,
    /// or the standard output.
    pub fn output(&mut self) -> &mut OutputBuffer {
        match &mut self.edit {
            Some(edit) => &mut edit.output,
            None => &mut self.stdout,
        }
    }

    /// Return the standard output, even while editing in place.
    pub fn stdout(&mut self) -> &mut OutputBuffer {
        &mut self.stdout
    }

    /// Start outputting the edits of the specified file.
    /// The file may be a symbolic link, which will be processed according
    /// to the context settings.
    /// Without in-place editing the output stream stays unchanged.
    pub fn begin(&mut self, file_name: &Path) -> UResult<()> {
        if !self.in_place {
            return Ok(());
        }

        if file_name.as_os_str() == "-" {
            return Err(USimpleError::new(
                RUNTIME_EXIT_CODE,
                "couldn't edit -: not a regular file",
            ));
        }

        let resolved = if self.follow_symlinks {
            fs::canonicalize(file_name)
                .map_err_context(|| format!("couldn't follow symlink {}", file_name.quote()))?
        } else {
            file_name.to_path_buf()
        };

        let metadata = fs::metadata(&resolved).map_err_context(|| {
            format!("couldn't edit {}: not a regular file", resolved.quote())
        })?;

        if !metadata.is_file() {
            return Err(USimpleError::new(
                RUNTIME_EXIT_CODE,
                format!("couldn't edit {}: not a regular file", resolved.quote()),
            ));
        }

        let dir = match resolved.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let temp_file = NamedTempFile::new_in(dir)
            .map_err_context(|| format!("couldn't open temporary file in {}", dir.quote()))?;

        #[cfg(unix)]
        {
            let mode = metadata.mode() & 0o7777;
            let perms = fs::Permissions::from_mode(mode);
            fs::set_permissions(temp_file.path(), perms)?;
        }

        let file = temp_file
            .reopen()
            .map_err_context(|| format!("couldn't open {}", temp_file.path().quote()))?;
        self.edit = Some(Edit {
            temp_file,
            original_path: resolved,
            output: OutputBuffer::new(Box::new(file)),
        });

        Ok(())
    }

    /// Finish (potentially in-place) editing of the current file.
    pub fn end(&mut self) -> UResult<()> {
        self.stdout.flush()?;

        let Some(Edit {
            temp_file,
            original_path,
            mut output,
        }) = self.edit.take()
        else {
            return Ok(());
        };
        output.flush()?;
        drop(output);

        // Backup original if suffix is provided
        if let Some(suffix) = &self.in_place_suffix {
            let backup_path = backup_path(&original_path, suffix);

            #[cfg(windows)]
            // Try to remove to ensure the rename won't fail on Windows.
            let _ = fs::remove_file(&backup_path);

            fs::rename(&original_path, &backup_path).map_err_context(|| {
                format!(
                    "couldn't back up {} to {}",
                    original_path.quote(),
                    backup_path.quote()
                )
            })?;
        } else {
            #[cfg(windows)]
            // On Windows delete the original file for temp.persist to work
            if original_path.exists() {
                fs::remove_file(&original_path).map_err_context(|| {
                    format!("couldn't remove {}", original_path.quote())
                })?;
            }
        }

        // Atomically replace the original
        if let Err(e) = temp_file.persist(&original_path) {
            return Err(UIoError::new(
                e.error.kind(),
                format!(
                    "couldn't rename {} to {}",
                    e.file.path().quote(),
                    original_path.quote()
                ),
            ));
        }

        Ok(())
    }
}

/// Return the backup path of original for the specified suffix.
/// A suffix containing `*` is a pattern in which `*` stands for the
/// original file name; otherwise the suffix is appended to the name.
fn backup_path(original: &Path, suffix: &str) -> PathBuf {
    let file_name = original
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if suffix.contains('*') {
        let backup = suffix.replace('*', &file_name);
        if backup.contains('/') {
            PathBuf::from(backup)
        } else {
            original.with_file_name(backup)
        }
    } else {
        original.with_file_name(format!("{file_name}{suffix}"))
    }
}
