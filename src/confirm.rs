//! Interactive yes/no confirmation on a configurable input.

use std::io::BufRead;

use anyhow::Result;
use console::style;

/// Ask a yes/no question, reading the answer from `input`. Only `y` or
/// `yes` (case-insensitive) accept; EOF declines.
pub fn confirm(prompt: &str, input: &mut dyn BufRead) -> Result<bool> {
    eprint!("{} [y/N] ", style(prompt).bold());
    let mut line = String::new();
    let read = input.read_line(&mut line)?;
    if read == 0 {
        return Ok(false);
    }
    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// Print a user-facing warning line.
pub fn warn_user(message: &str) {
    eprintln!("{} {}", style("WARNING:").yellow().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn yes_variants_accept() {
        for answer in ["y\n", "Y\n", "yes\n", "YES\n"] {
            let mut input = Cursor::new(answer.as_bytes());
            assert!(confirm("continue?", &mut input).unwrap(), "{answer:?}");
        }
    }

    #[test]
    fn anything_else_declines() {
        for answer in ["n\n", "no\n", "\n", "nah\n"] {
            let mut input = Cursor::new(answer.as_bytes());
            assert!(!confirm("continue?", &mut input).unwrap(), "{answer:?}");
        }
    }

    #[test]
    fn eof_declines() {
        let mut input = Cursor::new(b"" as &[u8]);
        assert!(!confirm("continue?", &mut input).unwrap());
    }
}
