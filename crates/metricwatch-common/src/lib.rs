//! Shared types for the metricwatch crates: alert states and action groups,
//! group keys, value formatting, translations and execution ids.

pub mod format;
pub mod i18n;
pub mod id;
pub mod types;
