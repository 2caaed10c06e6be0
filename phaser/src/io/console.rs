//! Operator console used for interactive challenge resolution.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};

/// A human watching the run.
pub trait Operator {
    /// Show a message without waiting for input.
    fn notify(&self, message: &str);

    /// Show `message` and block for one line of input, returned trimmed.
    fn prompt(&self, message: &str) -> Result<String>;
}

/// Operator over the process's stdin/stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleOperator;

impl Operator for ConsoleOperator {
    fn notify(&self, message: &str) {
        println!("{message}");
    }

    fn prompt(&self, message: &str) -> Result<String> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{message} ").context("write prompt")?;
        stdout.flush().context("flush prompt")?;
        drop(stdout);

        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read operator input")?;
        if read == 0 {
            bail!("operator input closed");
        }
        Ok(line.trim().to_string())
    }
}
