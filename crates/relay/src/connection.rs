//! Client-Verbindung – Lifecycle einer einzelnen Chat-Verbindung
//!
//! Jede Verbindung laeuft in einem eigenen tokio-Task. Die State Machine
//! macht die Uebergaenge explizit.
//!
//! ## State Machine
//! ```text
//! Verbindend -> Handshake -> Aktiv -> Schliessend
//!                   |                     ^
//!                   +---------------------+
//!          (Timeout, Trennung, Shutdown: nie angemeldet)
//! ```
//!
//! ## Handshake
//! Die erste Text-Nachricht ist der Anzeigename. Kommt innerhalb von
//! `handshake_timeout` keine, wird die Verbindung ohne Anmeldung verworfen.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive` einen Ping
//! - Kommt laenger als `verbindungs_timeout` kein Frame, wird getrennt
//!
//! ## Schreibfrist
//! Jeder Schreibvorgang (Text, Ping, Close) ist auf `schreib_timeout`
//! begrenzt und endet vorzeitig beim Shutdown-Signal. Ein Client der nicht
//! mehr liest, blockiert seinen Task damit nicht dauerhaft.

use parlor_core::{ChatNachricht, VerbindungsId};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{RelayError, RelayResult};
use crate::registry::{AbmeldeGuard, Verbindung};
use crate::server_state::{shutdown_abwarten, RelayState};
use crate::transport::{ChatTransport, Eingang, TransportFehler};

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Zustand einer Chat-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbindungsZustand {
    /// Akzeptiert, Handshake noch nicht begonnen
    Verbindend,
    /// Wartet auf den Anzeigenamen
    Handshake,
    /// In der Registry angemeldet
    Aktiv,
    /// Wird abgebaut (terminal)
    Schliessend,
}

// ---------------------------------------------------------------------------
// ClientVerbindung
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne Chat-Verbindung
pub struct ClientVerbindung {
    state: Arc<RelayState>,
    id: VerbindungsId,
    peer_addr: SocketAddr,
    zustand: VerbindungsZustand,
}

impl ClientVerbindung {
    /// Erstellt eine neue ClientVerbindung und vergibt ihre ID
    ///
    /// Erst nach dem erfolgreichen Upgrade aufrufen: zaehlt die Verbindung
    /// in `connections_total`.
    pub fn neu(state: Arc<RelayState>, peer_addr: SocketAddr) -> Self {
        let id = state.registry.id_vergeben();
        state.metriken.connections_total.inc();
        Self {
            state,
            id,
            peer_addr,
            zustand: VerbindungsZustand::Verbindend,
        }
    }

    /// ID dieser Verbindung
    pub fn id(&self) -> VerbindungsId {
        self.id
    }

    /// Aktueller Zustand
    pub fn zustand(&self) -> VerbindungsZustand {
        self.zustand
    }

    /// Startet die Verbindungs-Verarbeitung
    ///
    /// Laeuft bis die Verbindung getrennt wird oder das Shutdown-Signal
    /// eingeht. Auf jedem Ausgangspfad wird abgemeldet und der Transport
    /// geschlossen. Der Fehler betrifft nur diese Verbindung und wird hier
    /// bereits protokolliert.
    pub async fn verarbeiten<T: ChatTransport>(
        mut self,
        mut transport: T,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> RelayResult<()> {
        tracing::info!(verbindung = %self.id, peer = %self.peer_addr, "Neue Verbindung");

        let ergebnis = self.lebenszyklus(&mut transport, &mut shutdown_rx).await;

        self.zustand_setzen(VerbindungsZustand::Schliessend);
        if tokio::time::timeout(self.state.config.schreib_timeout, transport.schliessen())
            .await
            .is_err()
        {
            tracing::debug!(verbindung = %self.id, "Close-Frame nicht rechtzeitig gesendet");
        }

        match &ergebnis {
            Ok(()) => {
                tracing::info!(verbindung = %self.id, peer = %self.peer_addr, "Verbindung beendet");
            }
            Err(e) => {
                tracing::warn!(
                    verbindung = %self.id,
                    peer = %self.peer_addr,
                    fehler = %e,
                    "Verbindung mit Fehler beendet"
                );
            }
        }

        ergebnis
    }

    async fn lebenszyklus<T: ChatTransport>(
        &mut self,
        transport: &mut T,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> RelayResult<()> {
        self.zustand_setzen(VerbindungsZustand::Handshake);
        let name = match self.handshake(transport, shutdown_rx).await? {
            Some(name) => name,
            None => return Ok(()),
        };

        let (tx, mut sende_rx) = mpsc::channel(self.state.config.sende_queue_groesse.max(1));
        self.state
            .registry
            .anmelden(Verbindung::neu(self.id, Arc::clone(&name), tx))?;
        let abmeldung = AbmeldeGuard::neu(self.state.registry.clone(), self.id);

        self.zustand_setzen(VerbindungsZustand::Aktiv);
        let ergebnis = self
            .aktiv(transport, &mut sende_rx, shutdown_rx, name)
            .await;

        // Abmelden vor dem Schliessen des Transports
        drop(abmeldung);
        ergebnis
    }

    /// Wartet auf den Anzeigenamen
    ///
    /// `Ok(None)`: Client hat vorher getrennt oder der Server faehrt herunter.
    async fn handshake<T: ChatTransport>(
        &self,
        transport: &mut T,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> RelayResult<Option<Arc<str>>> {
        let frist = self.state.config.handshake_timeout;

        tokio::select! {
            ergebnis = tokio::time::timeout(frist, identitaet_lesen(transport)) => match ergebnis {
                Ok(Ok(Some(name))) => {
                    tracing::debug!(verbindung = %self.id, name = %name, "Handshake abgeschlossen");
                    Ok(Some(Arc::from(name)))
                }
                Ok(Ok(None)) => {
                    tracing::info!(verbindung = %self.id, "Verbindung vor dem Handshake getrennt");
                    Ok(None)
                }
                Ok(Err(e)) => Err(e),
                Err(_) => {
                    self.state.metriken.handshake_timeouts_total.inc();
                    Err(RelayError::HandshakeZeitlimit)
                }
            },
            _ = shutdown_abwarten(shutdown_rx) => {
                tracing::debug!(verbindung = %self.id, "Shutdown waehrend des Handshakes");
                Ok(None)
            }
        }
    }

    /// Lese-Schleife einer angemeldeten Verbindung
    async fn aktiv<T: ChatTransport>(
        &self,
        transport: &mut T,
        sende_rx: &mut mpsc::Receiver<Arc<str>>,
        shutdown_rx: &mut watch::Receiver<bool>,
        name: Arc<str>,
    ) -> RelayResult<()> {
        let intervall = self.state.config.keepalive.max(Duration::from_millis(1));
        let timeout_dauer = self.state.config.verbindungs_timeout;

        let mut keepalive = tokio::time::interval_at(Instant::now() + intervall, intervall);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();

        loop {
            tokio::select! {
                // Eingehende Nachricht vom Client
                eingang = transport.empfangen() => match eingang {
                    Some(Ok(Eingang::Text(text))) => {
                        letzter_empfang = Instant::now();
                        tracing::trace!(verbindung = %self.id, bytes = text.len(), "Nachricht empfangen");
                        let nachricht = ChatNachricht::neu(self.id, Arc::clone(&name), text);
                        self.state.broadcaster.senden(&nachricht);
                    }
                    Some(Ok(Eingang::Lebenszeichen)) => {
                        letzter_empfang = Instant::now();
                    }
                    Some(Err(e)) => return Err(RelayError::Lesefehler(e.to_string())),
                    None => {
                        tracing::info!(verbindung = %self.id, "Verbindung vom Client getrennt");
                        return Ok(());
                    }
                },

                // Ausgehende Nachricht aus dem Broadcaster
                ausgehend = sende_rx.recv() => match ausgehend {
                    Some(text) => {
                        if !self.schreiben(transport.senden(&text), shutdown_rx).await? {
                            return Ok(());
                        }
                    }
                    // Queue geschlossen: abgemeldet durch Broadcaster oder Shutdown
                    None if self.state.registry.ist_beendet() => return Ok(()),
                    None => return Err(RelayError::Entfernt),
                },

                // Keepalive-Ping und Timeout-Pruefung
                _ = keepalive.tick() => {
                    if letzter_empfang.elapsed() > timeout_dauer {
                        return Err(RelayError::Zeitlimit);
                    }
                    if !self.schreiben(transport.pingen(), shutdown_rx).await? {
                        return Ok(());
                    }
                }

                // Shutdown-Signal
                _ = shutdown_abwarten(shutdown_rx) => {
                    tracing::info!(verbindung = %self.id, "Shutdown-Signal – Verbindung wird getrennt");
                    return Ok(());
                }
            }
        }
    }

    /// Fuehrt einen Schreibvorgang mit Frist aus
    ///
    /// `Ok(false)`: das Shutdown-Signal kam vor dem Ende des Schreibens.
    async fn schreiben<F>(
        &self,
        schreibvorgang: F,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> RelayResult<bool>
    where
        F: Future<Output = Result<(), TransportFehler>>,
    {
        let frist = self.state.config.schreib_timeout;

        tokio::select! {
            ergebnis = tokio::time::timeout(frist, schreibvorgang) => match ergebnis {
                Ok(Ok(())) => Ok(true),
                Ok(Err(e)) => Err(RelayError::Schreibfehler(e.to_string())),
                Err(_) => Err(RelayError::Schreibfehler(format!(
                    "Schreibfrist von {frist:?} ueberschritten"
                ))),
            },
            _ = shutdown_abwarten(shutdown_rx) => {
                tracing::info!(verbindung = %self.id, "Shutdown waehrend des Schreibens");
                Ok(false)
            }
        }
    }

    fn zustand_setzen(&mut self, neu: VerbindungsZustand) {
        tracing::debug!(
            verbindung = %self.id,
            von = ?self.zustand,
            nach = ?neu,
            "Zustandswechsel"
        );
        self.zustand = neu;
    }
}

/// Liest bis zur ersten Text-Nachricht; Lebenszeichen werden uebersprungen
async fn identitaet_lesen<T: ChatTransport>(transport: &mut T) -> RelayResult<Option<String>> {
    loop {
        match transport.empfangen().await {
            Some(Ok(Eingang::Text(name))) => return Ok(Some(name)),
            Some(Ok(Eingang::Lebenszeichen)) => continue,
            Some(Err(e)) => return Err(RelayError::Lesefehler(e.to_string())),
            None => return Ok(None),
        }
    }
}
