//! gegensprech-core – Gemeinsame Typen
//!
//! Dieses Crate stellt die fundamentalen Identifikationstypen bereit, die
//! von allen anderen Gegensprech-Crates gemeinsam genutzt werden.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{CallId, ChannelId, Identity};
