//! Shared paths, settings and logging setup for the patcher tools

pub mod logging;
pub mod paths;
pub mod settings;

pub use settings::{OutputFormat, PatcherSettings, SettingsOverrides};
