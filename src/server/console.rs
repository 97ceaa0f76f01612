//! # Administrative Console
//!
//! A tiny line-oriented shell on the relay's stdin:
//!
//! ```text
//! jobs          -- list all connected clients
//! stats         -- show relay counters
//! quit / exit   -- stop the relay
//! help          -- show this information
//! ```
//!
//! The console only reads the roster; it never mutates it.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use log::warn;
use tokio::sync::mpsc;

use crate::server::metrics::RelayMetrics;
use crate::server::roster::Roster;

pub const HELP: &str = "\
jobs          -- list all connected clients
stats         -- show relay counters
quit          -- quit server program
help          -- show this information";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Jobs,
    Stats,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Command::Empty,
            "help" => Command::Help,
            "jobs" => Command::Jobs,
            "stats" => Command::Stats,
            "quit" | "exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// What the caller should do after a command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Print(String),
    Nothing,
    Quit,
}

/// Why [`Console::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    InputClosed,
}

#[derive(Clone)]
pub struct Console {
    roster: Arc<Roster>,
    metrics: RelayMetrics,
}

impl Console {
    pub fn new(roster: Arc<Roster>, metrics: RelayMetrics) -> Self {
        Self { roster, metrics }
    }

    pub async fn execute(&self, line: &str) -> Outcome {
        match Command::parse(line) {
            Command::Empty => Outcome::Nothing,
            Command::Help => Outcome::Print(HELP.to_string()),
            Command::Quit => Outcome::Quit,
            Command::Jobs => Outcome::Print(self.jobs().await),
            Command::Stats => Outcome::Print(self.stats()),
            Command::Unknown(cmd) => Outcome::Print(format!("{}: command not found", cmd)),
        }
    }

    async fn jobs(&self) -> String {
        let members = self.roster.list().await;
        if members.is_empty() {
            return "no job".to_string();
        }

        let mut out = format!("{} job(s)", members.len());
        for (idx, member) in members.iter().enumerate() {
            out.push_str(&format!(
                "\n#{:>4}: address={}, session id={}, nickname={}",
                idx + 1,
                member.addr,
                member.session_id,
                String::from_utf8_lossy(&member.nickname)
            ));
        }
        out
    }

    fn stats(&self) -> String {
        let s = self.metrics.snapshot();
        format!(
            "connections accepted: {}\n\
             active sessions:      {}\n\
             frames received:      {}\n\
             frames rejected:      {}\n\
             broadcasts:           {}\n\
             deliveries:           {}\n\
             write failures:       {}",
            s.connections_accepted,
            s.active_sessions,
            s.frames_received,
            s.frames_rejected,
            s.broadcasts,
            s.deliveries,
            s.write_failures
        )
    }

    /// Execute lines from `input` until `quit` or until the input closes,
    /// printing results to stdout.
    pub async fn run(self, mut input: mpsc::Receiver<String>) -> ConsoleExit {
        prompt();
        while let Some(line) = input.recv().await {
            match self.execute(&line).await {
                Outcome::Print(text) => println!("{}", text),
                Outcome::Nothing => {}
                Outcome::Quit => return ConsoleExit::Quit,
            }
            prompt();
        }
        ConsoleExit::InputClosed
    }
}

fn prompt() {
    print!("$ ");
    let _ = io::stdout().flush();
}

/// Forward stdin lines into a channel from a dedicated thread, so a blocked
/// terminal read never holds up the runtime.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("⚠️  Console input error: {}", e);
                    break;
                }
            }
        }
    });
    rx
}
