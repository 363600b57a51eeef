pub mod clean;
pub mod cli;
pub mod reset;
pub mod run;
pub mod status;

use std::io::{BufRead, Write};

use codex_worker_core::error::CliError;

/// Asks a yes/no question on the terminal. Without a terminal the answer
/// is no.
pub fn confirm(question: &str) -> Result<bool, CliError> {
    if !atty::is(atty::Stream::Stdin) {
        return Ok(false);
    }
    let mut stderr = std::io::stderr();
    write!(stderr, "{question} [y/N] ")?;
    stderr.flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(is_yes(&line))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::is_yes;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("no"));
        assert!(!is_yes("yep"));
    }
}
