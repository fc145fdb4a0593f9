use crate::error::CommandError;
use crate::message::InputMessage;
use log::{error, info, warn};
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;

/// Terminal result of one pipeline message.
#[derive(Debug)]
pub enum Outcome {
    /// The action completed; `msg` is forwarded downstream.
    Success { label: String, msg: InputMessage },
    /// The action stopped; the message goes no further.
    Failure { label: String, error: CommandError },
    /// Nothing was done, e.g. an unknown command.
    Warning { label: String, detail: String },
}

impl Outcome {
    pub fn label(&self) -> &str {
        match self {
            Outcome::Success { label, .. }
            | Outcome::Failure { label, .. }
            | Outcome::Warning { label, .. } => label,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Receives exactly one outcome per handled message.
pub trait OutcomeReporter: Send + Sync {
    fn report(&self, outcome: Outcome);
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Line<'a> {
    Success { label: &'a str, msg: &'a InputMessage },
    Failure { label: &'a str, detail: String },
    Warning { label: &'a str, detail: &'a str },
}

/// Writes each outcome as one JSON line and logs it.
pub struct JsonLinesReporter<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_line(&self, line: &Line<'_>) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = serde_json::to_writer(&mut *out, line)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(out))
            .and_then(|_| out.flush());
        if let Err(e) = result {
            error!("Failed to write outcome: {}", e);
        }
    }
}

impl<W: Write + Send> OutcomeReporter for JsonLinesReporter<W> {
    fn report(&self, outcome: Outcome) {
        match &outcome {
            Outcome::Success { label, msg } => {
                info!("ok: {}", label);
                self.write_line(&Line::Success { label, msg });
            }
            Outcome::Failure { label, error } => {
                error!("{} failed: {:#}", label, error);
                self.write_line(&Line::Failure {
                    label,
                    detail: format!("{:#}", error),
                });
            }
            Outcome::Warning { label, detail } => {
                warn!("{}: {}", label, detail);
                self.write_line(&Line::Warning { label, detail });
            }
        }
    }
}
