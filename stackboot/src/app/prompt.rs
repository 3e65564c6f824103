//! Terminal prompts for interactive runs

use std::io::{BufRead, Write};

use colored::Colorize;

use crate::config::env::EnvKey;
use crate::config::resolve::{Prompter, Resolution, ResolutionKind};
use crate::errors::BootstrapError;

/// Invalid menu selections tolerated before giving up on a key
const MAX_MENU_ATTEMPTS: usize = 5;

/// Line-oriented prompter over any reader/writer pair
pub struct LinePrompter<I, O> {
    input: I,
    output: O,
}

impl LinePrompter<std::io::StdinLock<'static>, std::io::Stdout> {
    /// Prompter on the process's stdin and stdout
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<I: BufRead, O: Write> LinePrompter<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Result<String, BootstrapError> {
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(BootstrapError::PromptError("input closed".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl<I: BufRead, O: Write> Prompter for LinePrompter<I, O> {
    fn choose(
        &mut self,
        key: EnvKey,
        options: &[ResolutionKind],
        rejection: Option<&str>,
    ) -> Result<Resolution, BootstrapError> {
        writeln!(self.output)?;
        writeln!(self.output, "{} {}", key.name().bold(), key.description().dimmed())?;
        if let Some(reason) = rejection {
            writeln!(self.output, "  {} {}", "Rejected:".red(), reason)?;
        }
        for (index, kind) in options.iter().enumerate() {
            writeln!(self.output, "  {}) {}", index + 1, kind.label(key))?;
        }

        for _ in 0..MAX_MENU_ATTEMPTS {
            write!(self.output, "Choice [1-{}]: ", options.len())?;
            let answer = self.read_line()?;

            let selected = answer
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| options.get(i));

            match selected {
                Some(ResolutionKind::Default) => return Ok(Resolution::Default),
                Some(ResolutionKind::Generate) => return Ok(Resolution::Generate),
                Some(ResolutionKind::Custom) => {
                    write!(self.output, "Value for {}: ", key.name())?;
                    return Ok(Resolution::Custom(self.read_line()?));
                }
                None => writeln!(self.output, "{}", "Please pick one of the listed numbers".yellow())?,
            }
        }

        Err(BootstrapError::PromptError(format!(
            "no valid choice for {}",
            key.name()
        )))
    }

    fn confirm(&mut self, question: &str) -> Result<bool, BootstrapError> {
        write!(self.output, "{} [y/N]: ", question)?;
        let answer = self.read_line()?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}
