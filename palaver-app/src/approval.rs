//! Terminal approval prompt for shell commands.

use palaver_infra::infra::Approver;
use std::io::{self, BufRead, Write};

/// Asks on the controlling terminal. Anything but `y`/`yes` denies, as
/// does a closed stdin.
pub struct StdinApprover;

impl Approver for StdinApprover {
    fn request(&self, command: &str) -> bool {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        ask(&mut stdin.lock(), &mut stdout, command)
    }
}

pub fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, command: &str) -> bool {
    let prompted = writeln!(output, "\n  Command requires approval: {}", command)
        .and_then(|_| write!(output, "  Allow? (y/n): "))
        .and_then(|_| output.flush());
    if prompted.is_err() {
        return false;
    }

    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
    }
}
