//! Text-command control of a Sonos player and its My Sonos favorites.
//!
//! A pipeline message carries a single-word or single-value command in
//! `payload`. [`Controller::handle`] classifies it, validates the fields it
//! needs, runs the matching player calls and reports exactly one [`Outcome`].

pub mod command;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod message;
pub mod mysonos;
pub mod outcome;
pub mod sonos;
pub mod volume;

pub use config::Config;
pub use controller::Controller;
pub use error::CommandError;
pub use message::InputMessage;
pub use outcome::{JsonLinesReporter, Outcome, OutcomeReporter};
