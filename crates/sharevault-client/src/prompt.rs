//! Terminal prompt for unknown host keys.

use std::io::{self, BufRead, Write};

use sharevault_core::Prompter;

/// Asks on stderr and reads the answer from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&mut self, identity: &str, fingerprint: &str) -> io::Result<String> {
        let mut err = io::stderr().lock();
        writeln!(err, "The authenticity of host {identity} can't be established.")?;
        writeln!(err, "Key fingerprint is {fingerprint}.")?;
        write!(err, "Are you sure you want to continue connecting (yes/no)? ")?;
        err.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer)
    }
}
