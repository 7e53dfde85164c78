//! Fehlertypen fuer den Chat-Relay

use parlor_core::VerbindungsId;
use thiserror::Error;

/// Fehlertyp fuer den Chat-Relay
///
/// Alle Varianten betreffen genau eine Verbindung. Keiner dieser Fehler
/// wird ueber den Verbindungs-Task hinaus propagiert.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Keine Identitaets-Nachricht innerhalb der Handshake-Frist
    #[error("Handshake-Zeitlimit ueberschritten")]
    HandshakeZeitlimit,

    /// Lesefehler auf dem Transport einer aktiven Verbindung
    #[error("Lesefehler: {0}")]
    Lesefehler(String),

    /// Schreibfehler beim Zustellen an einen Empfaenger
    #[error("Schreibfehler: {0}")]
    Schreibfehler(String),

    /// Anmeldung nach dem Herunterfahren der Registry
    #[error("Registry wurde heruntergefahren")]
    RegistryBeendet,

    /// Verbindung ist bereits angemeldet
    #[error("Verbindung {0} ist bereits angemeldet")]
    BereitsAngemeldet(VerbindungsId),

    /// Verbindung wurde vom Broadcaster aus der Registry entfernt
    #[error("Verbindung wurde aus der Registry entfernt")]
    Entfernt,

    /// Kein eingehendes Frame innerhalb des Verbindungs-Timeouts
    #[error("Verbindungs-Timeout")]
    Zeitlimit,
}

/// Result-Typ fuer den Chat-Relay
pub type RelayResult<T> = Result<T, RelayError>;
