//! Transport-Abstraktion fuer eine einzelne Client-Verbindung
//!
//! Der Verbindungs-Lifecycle kennt nur diese vier Operationen. Die
//! WebSocket-Anbindung steckt in `ws::WsTransport`, Tests verwenden einen
//! In-Memory-Transport.

use async_trait::async_trait;
use thiserror::Error;

/// Ein eingehendes Frame aus Sicht des Chats
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eingang {
    /// Text-Nachricht (erste = Anzeigename, danach Chat-Zeilen)
    Text(String),
    /// Lebenszeichen ohne Nutzlast (Ping/Pong); zaehlt fuer den Keepalive
    Lebenszeichen,
}

/// Fehler des darunterliegenden Transports
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportFehler(pub String);

impl TransportFehler {
    pub fn neu(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Bidirektionaler, nachrichtenorientierter Transport
///
/// `empfangen` muss abbruchsicher sein: der Lifecycle verwendet es in
/// `tokio::select!`.
#[async_trait]
pub trait ChatTransport: Send {
    /// Naechstes Frame; `None` bei Stream-Ende (Client hat geschlossen)
    async fn empfangen(&mut self) -> Option<Result<Eingang, TransportFehler>>;

    /// Sendet eine Text-Nachricht
    async fn senden(&mut self, text: &str) -> Result<(), TransportFehler>;

    /// Sendet ein Keepalive-Ping
    async fn pingen(&mut self) -> Result<(), TransportFehler>;

    /// Schliesst den Transport; Fehler werden ignoriert
    async fn schliessen(&mut self);
}
