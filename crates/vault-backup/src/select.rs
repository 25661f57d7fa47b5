//! Choosing one backup out of a list.
//!

use std::io::{self, BufRead, Write};

use thiserror::Error;

/// Picks one of the candidates, returning its index.
pub trait Selector {
    /// Choose one of `candidates`, which is never empty.
    fn choose_one(&mut self, candidates: &[String]) -> Result<usize, SelectError>;
}

impl<F> Selector for F
where
    F: FnMut(&[String]) -> Result<usize, SelectError>,
{
    fn choose_one(&mut self, candidates: &[String]) -> Result<usize, SelectError> {
        self(candidates)
    }
}

/// Always chooses the first, most recent, candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LatestSelector;

impl Selector for LatestSelector {
    fn choose_one(&mut self, _candidates: &[String]) -> Result<usize, SelectError> {
        Ok(0)
    }
}

/// Prints a numbered list and reads the chosen number.
///
/// Invalid input is reported and the prompt repeated. End of input or `q` cancels.
pub struct PromptSelector<R, W> {
    input: R,
    output: W,
}

impl PromptSelector<io::StdinLock<'static>, io::Stdout> {
    /// A selector on the terminal.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> PromptSelector<R, W> {
    /// A selector reading from `input` and prompting on `output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn prompt(&mut self, candidates: &[String]) -> io::Result<Option<usize>> {
        writeln!(self.output, "Select a backup:")?;
        for (number, candidate) in candidates.iter().enumerate() {
            writeln!(self.output, "  {}) {candidate}", number + 1)?;
        }

        loop {
            write!(self.output, "Enter 1-{} or q to cancel: ", candidates.len())?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }

            let line = line.trim();
            if line.eq_ignore_ascii_case("q") {
                return Ok(None);
            }

            match line.parse::<usize>() {
                Ok(number) if (1..=candidates.len()).contains(&number) => {
                    return Ok(Some(number - 1));
                }
                _ => writeln!(self.output, "'{line}' is not a listed backup")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> Selector for PromptSelector<R, W> {
    fn choose_one(&mut self, candidates: &[String]) -> Result<usize, SelectError> {
        self.prompt(candidates)
            .map_err(SelectError::Io)?
            .ok_or(SelectError::UserCancelled)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("The selection was cancelled")]
    UserCancelled,

    #[error("Failed to prompt for a selection: {0}")]
    Io(#[source] io::Error),
}
