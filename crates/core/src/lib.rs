//! parlor-core – Gemeinsame Typen
//!
//! Dieses Crate stellt die Bausteine des Relays bereit: die Verbindungs-ID
//! und die Chat-Nachricht.

pub mod nachricht;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use nachricht::ChatNachricht;
pub use types::VerbindungsId;
