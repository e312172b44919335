//! File redirection for a single pipeline stage.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;

use crate::system;

/// Apply `< file` and `> file` redirections and strip their tokens.
///
/// This runs in the child, after the fork and before the image replacement,
/// so a failed open only takes down the stage it belongs to. Output files
/// are created with mode 0600 and are not truncated.
pub(super) fn apply(argv: Vec<String>) -> io::Result<Vec<String>> {
    let mut stripped = Vec::with_capacity(argv.len());
    let mut args = argv.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "<" => {
                let path = args.next().ok_or_else(missing_file_name)?;
                let file = File::open(&path).map_err(|err| open_error(&path, err))?;
                system::dup2_stdin(&file)?;
            }
            ">" => {
                let path = args.next().ok_or_else(missing_file_name)?;
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .mode(0o600)
                    .open(&path)
                    .map_err(|err| open_error(&path, err))?;
                system::dup2_stdout(&file)?;
            }
            _ => stripped.push(arg),
        }
    }

    Ok(stripped)
}

fn missing_file_name() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "missing file name after redirection")
}

fn open_error(path: &str, err: io::Error) -> io::Error {
    io::Error::new(err.kind(), format!("cannot open {path}: {err}"))
}
