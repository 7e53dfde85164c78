//! Identifikationstypen fuer Parlor
//!
//! Verbindungs-IDs verwenden das Newtype-Pattern, damit sie nicht mit
//! anderen Zahlen verwechselt werden koennen.

use serde::{Deserialize, Serialize};

/// Eindeutige ID einer Client-Verbindung
///
/// Wird beim Accept vergeben und nie wiederverwendet. Die Ordnung der IDs
/// entspricht der Accept-Reihenfolge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VerbindungsId(pub u64);

impl VerbindungsId {
    /// Gibt den inneren Zaehlerwert zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}
