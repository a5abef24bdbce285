//! Line-based command input with local syntax checking

use shared::command;
use shared::SyntaxError;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

/// Reads command lines and checks them against the command grammar before
/// they are sent, so typos never cost a round trip.
pub struct InputManager<R> {
    lines: Lines<R>,
}

impl InputManager<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> InputManager<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Next non-blank line, checked. `Ok(None)` at end of input.
    ///
    /// Cancel safe: no line is lost if the future is dropped.
    pub async fn next_command(&mut self) -> io::Result<Option<Result<String, SyntaxError>>> {
        while let Some(line) = self.lines.next_line().await? {
            if let Some(checked) = check_line(&line) {
                return Ok(Some(checked));
            }
        }
        Ok(None)
    }
}

/// Returns the trimmed line if it parses, the syntax error if it does not,
/// and `None` for blank lines.
pub fn check_line(line: &str) -> Option<Result<String, SyntaxError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(command::parse(line).map(|_| line.to_string()))
}
