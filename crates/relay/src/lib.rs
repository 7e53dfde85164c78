//! parlor-relay – WebSocket-Chat-Relay
//!
//! Dieser Crate nimmt WebSocket-Verbindungen an, liest den Anzeigenamen
//! (Handshake) und verteilt jede weitere Zeile an alle anderen Clients.
//!
//! ## Architektur
//!
//! ```text
//! axum Router (chat_router / ws_server_starten)
//!     |
//!     v
//! ClientVerbindung (pro Verbindung ein Task)
//!     |  State Machine: Verbindend -> Handshake -> Aktiv -> Schliessend
//!     |
//!     +-- VerbindungsRegistry (anmelden, abmelden, schnappschuss)
//!     +-- Broadcaster         (an alle ausser Absender, best-effort)
//! ```

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod registry;
pub mod server_state;
pub mod transport;
pub mod ws;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use broadcast::{Broadcaster, ZustellBericht};
pub use connection::{ClientVerbindung, VerbindungsZustand};
pub use error::{RelayError, RelayResult};
pub use registry::{Verbindung, VerbindungsRegistry, ZustellFehler};
pub use server_state::{shutdown_abwarten, RelayKonfig, RelayState};
pub use transport::{ChatTransport, Eingang, TransportFehler};
pub use ws::{chat_router, ws_server_starten, WsTransport};
