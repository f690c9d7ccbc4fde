//! Console output and interactive prompts.
//!
//! Components never write to the terminal directly; they receive a
//! `Reporter` so tests can capture output and script prompt answers.

use crate::error::ProbeError;
use colored::Colorize;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use tracing::debug;

/// How a reported line should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Unstyled text.
    Plain,
    /// Neutral information, e.g. the run header.
    Info,
    /// Advisory or degraded behaviour.
    Warning,
    /// Successful probe.
    Success,
    /// Failed probe.
    Error,
}

/// Output capability handed to every component.
pub trait Reporter: Send + Sync {
    /// Print a complete line.
    fn line(&self, tone: Tone, text: &str);

    /// Print text without a line break, used before a slow operation.
    fn partial(&self, text: &str);

    /// Ask for a secret without echoing it.
    fn prompt_secret(&self, prompt: &str) -> Result<String, ProbeError>;

    fn plain(&self, text: &str) {
        self.line(Tone::Plain, text);
    }

    fn info(&self, text: &str) {
        self.line(Tone::Info, text);
    }

    fn warn(&self, text: &str) {
        self.line(Tone::Warning, text);
    }

    /// Report an error that ended the run, with its full context chain.
    fn fatal(&self, error: &dyn fmt::Display) {
        self.line(Tone::Error, &format!("ERROR: {:#}", error));
    }
}

/// Reporter writing colored output to stdout.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for ConsoleReporter {
    fn line(&self, tone: Tone, text: &str) {
        let styled = match tone {
            Tone::Plain => text.normal(),
            Tone::Info => text.cyan(),
            Tone::Warning => text.yellow(),
            Tone::Success => text.green(),
            Tone::Error => text.red(),
        };
        println!("{}", styled);
    }

    fn partial(&self, text: &str) {
        if let Err(e) = write_partial(&mut std::io::stdout().lock(), text) {
            debug!("Failed to write to stdout: {}", e);
        }
    }

    fn prompt_secret(&self, prompt: &str) -> Result<String, ProbeError> {
        rpassword::prompt_password(prompt.yellow().to_string())
            .map_err(|e| ProbeError::Prompt(format!("Failed to read password: {}", e)))
    }
}

/// Write text without a line break and flush it.
fn write_partial(out: &mut impl Write, text: &str) -> std::io::Result<()> {
    write!(out, "{}", text)?;
    out.flush()
}

/// Reporter that records output in memory and answers prompts from a script.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<(Tone, String)>>,
    pending: Mutex<String>,
    answers: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the next `prompt_secret` call.
    pub fn with_answer(self, answer: impl Into<String>) -> Self {
        self.answers.lock().push_back(answer.into());
        self
    }

    /// All completed lines, in order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().map(|(_, l)| l.clone()).collect()
    }

    /// Completed lines with the given tone.
    pub fn lines_with(&self, tone: Tone) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(t, _)| *t == tone)
            .map(|(_, l)| l.clone())
            .collect()
    }

    /// Whole transcript joined by newlines.
    pub fn transcript(&self) -> String {
        self.lines().join("\n")
    }

    /// Prompts shown so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl Reporter for MemoryReporter {
    fn line(&self, tone: Tone, text: &str) {
        let prefix = std::mem::take(&mut *self.pending.lock());
        self.lines.lock().push((tone, format!("{}{}", prefix, text)));
    }

    fn partial(&self, text: &str) {
        self.pending.lock().push_str(text);
    }

    fn prompt_secret(&self, prompt: &str) -> Result<String, ProbeError> {
        self.prompts.lock().push(prompt.to_string());
        self.answers
            .lock()
            .pop_front()
            .ok_or_else(|| ProbeError::Prompt("no scripted answer".to_string()))
    }
}
