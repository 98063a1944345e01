//! Configuration management for portsweep.
//!
//! Provides the XDG-compliant settings file and its defaults.

mod settings;

pub use settings::{AppSettings, Paths};
