//! Terminal interaction: yes/no confirmations and the console title.

use std::io::{self, BufRead, IsTerminal, Write};

const YES: [&str; 3] = ["y", "ye", "yes"];
const NO: [&str; 2] = ["n", "no"];

pub trait Prompt {
    /// Shows `message` and returns the reply, or `None` once input is closed.
    fn ask(&mut self, message: &str) -> Option<String>;
}

/// Reads replies from stdin.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, message: &str) -> Option<String> {
        print!("\r{message}");
        io::stdout().flush().ok()?;
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }
}

/// Keeps asking until the reply is a yes or a no. With `accept_return` an
/// empty reply counts as yes. Closed input counts as no.
pub fn yes_no(prompt: &mut dyn Prompt, message: &str, accept_return: bool) -> bool {
    let hint = if accept_return { "[Y/n]" } else { "[y/N]" };
    loop {
        let Some(reply) = prompt.ask(&format!("{message} {hint}: ")) else {
            return false;
        };
        let reply = reply.trim().to_lowercase();
        if YES.contains(&reply.as_str()) || (accept_return && reply.is_empty()) {
            return true;
        }
        if NO.contains(&reply.as_str()) {
            return false;
        }
    }
}

/// Two-step confirmation for destructive actions.
pub fn confirm_twice(prompt: &mut dyn Prompt, message: &str) -> bool {
    yes_no(prompt, message, true) && yes_no(prompt, "Are you sure about this?", true)
}

/// Sets the terminal title; a no-op when stdout is not a terminal.
pub fn set_title(title: &str) {
    let mut stdout = io::stdout();
    if stdout.is_terminal() {
        let _ = write!(stdout, "\x1b]0;TUBEDL: {title}\x07");
        let _ = stdout.flush();
    }
}

/// Replays canned replies and records every question asked.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ScriptedPrompt {
    replies: std::collections::VecDeque<String>,
    pub asked: Vec<String>,
}

#[cfg(test)]
impl ScriptedPrompt {
    pub(crate) fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|reply| reply.to_string()).collect(),
            asked: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Prompt for ScriptedPrompt {
    fn ask(&mut self, message: &str) -> Option<String> {
        self.asked.push(message.to_string());
        self.replies.pop_front()
    }
}
