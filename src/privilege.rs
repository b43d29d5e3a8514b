// src/privilege.rs

//! Superuser detection and confirmation

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};

/// Whether the effective or real user is root
pub fn running_as_root() -> bool {
    // SAFETY: geteuid and getuid have no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 || libc::getuid() == 0 }
}

/// Ask whether to continue as superuser
///
/// Only an answer of `Y` or `y` proceeds; anything else, including end of
/// input, declines.
pub fn confirm_root<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<bool> {
    write!(output, "You are running as superuser. Continue? [y/N] ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;

    Ok(matches!(answer.trim(), "y" | "Y"))
}

/// Controlling terminal of the process
const TTY_PATH: &str = "/dev/tty";

/// Where the confirmation answer is read from
#[derive(Debug)]
enum Prompt {
    Terminal(File),
    Stdin,
}

/// Prefer the terminal; stdin is only usable when it does not carry the package
fn prompt_channel(terminal: io::Result<File>, stdin_carries_package: bool) -> Result<Prompt> {
    match terminal {
        Ok(tty) => Ok(Prompt::Terminal(tty)),
        Err(_) if !stdin_carries_package => Ok(Prompt::Stdin),
        Err(e) => Err(Error::InvalidArgument(format!(
            "Cannot confirm running as superuser: {} is unavailable ({}) and stdin carries the package",
            TTY_PATH, e
        ))),
    }
}

/// Prompt when running as root and fail with `Aborted` on refusal
pub fn require_confirmation(stdin_carries_package: bool) -> Result<()> {
    if !running_as_root() {
        return Ok(());
    }

    let terminal = OpenOptions::new().read(true).write(true).open(TTY_PATH);
    let confirmed = match prompt_channel(terminal, stdin_carries_package)? {
        Prompt::Terminal(tty) => {
            let mut output = tty.try_clone()?;
            confirm_root(&mut BufReader::new(tty), &mut output)?
        }
        Prompt::Stdin => confirm_root(&mut io::stdin().lock(), &mut io::stderr())?,
    };

    if confirmed { Ok(()) } else { Err(Error::Aborted) }
}
