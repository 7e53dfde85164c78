//! Gemeinsamer Zustand fuer den Chat-Relay
//!
//! Haelt Registry, Broadcaster, Metriken und das Shutdown-Signal als
//! geteilte Referenzen, die sicher zwischen tokio-Tasks geteilt werden.

use parlor_observability::ParlorMetriken;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use crate::broadcast::Broadcaster;
use crate::registry::VerbindungsRegistry;

/// Konfiguration fuer den Chat-Relay
#[derive(Debug, Clone)]
pub struct RelayKonfig {
    /// Maximale Anzahl gleichzeitig akzeptierter Verbindungen
    pub max_clients: u32,
    /// HTTP-Pfad des WebSocket-Endpunkts
    pub ws_pfad: String,
    /// Frist fuer die erste Nachricht (Anzeigename)
    pub handshake_timeout: Duration,
    /// Groesse der Ausgangs-Queue pro Verbindung
    pub sende_queue_groesse: usize,
    /// Intervall der Keepalive-Pings
    pub keepalive: Duration,
    /// Maximale Zeit ohne eingehendes Frame
    pub verbindungs_timeout: Duration,
    /// Frist fuer einen einzelnen Schreibvorgang (Text, Ping, Close)
    pub schreib_timeout: Duration,
    /// Absendername vor jede weitergeleitete Zeile setzen
    pub absender_anzeigen: bool,
}

impl Default for RelayKonfig {
    fn default() -> Self {
        Self {
            max_clients: 512,
            ws_pfad: "/chat-ws".to_string(),
            handshake_timeout: Duration::from_secs(10),
            sende_queue_groesse: 64,
            keepalive: Duration::from_secs(30),
            verbindungs_timeout: Duration::from_secs(90),
            schreib_timeout: Duration::from_secs(10),
            absender_anzeigen: false,
        }
    }
}

/// Gemeinsamer Relay-Zustand (thread-safe, Arc-geteilt)
pub struct RelayState {
    /// Relay-Konfiguration
    pub config: Arc<RelayKonfig>,
    /// Registry aller angemeldeten Verbindungen
    pub registry: VerbindungsRegistry,
    /// Broadcaster ueber derselben Registry
    pub broadcaster: Broadcaster,
    /// Prometheus-Metriken
    pub metriken: ParlorMetriken,
    /// Shutdown-Signal fuer alle Verbindungs-Tasks
    pub shutdown_rx: watch::Receiver<bool>,
    /// Startzeitpunkt (fuer Uptime-Berechnung)
    pub start_time: Instant,
    /// Ein Platz pro akzeptierter Verbindung, vom Upgrade bis zum Task-Ende
    plaetze: Arc<Semaphore>,
}

impl RelayState {
    /// Erstellt einen neuen RelayState
    pub fn neu(
        config: RelayKonfig,
        metriken: ParlorMetriken,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Arc<Self> {
        let registry = VerbindungsRegistry::mit_metriken(metriken.clone());
        let broadcaster = Broadcaster::neu(registry.clone())
            .mit_metriken(metriken.clone())
            .mit_absender_anzeige(config.absender_anzeigen);

        let plaetze = Arc::new(Semaphore::new(config.max_clients as usize));

        Arc::new(Self {
            config: Arc::new(config),
            registry,
            broadcaster,
            metriken,
            shutdown_rx,
            start_time: Instant::now(),
            plaetze,
        })
    }

    /// Reserviert einen Verbindungsplatz
    ///
    /// `None` wenn `max_clients` Verbindungen akzeptiert sind, egal ob sie
    /// schon angemeldet sind oder noch im Handshake stecken. Der Platz wird
    /// mit dem Permit wieder frei.
    pub fn platz_reservieren(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.plaetze).try_acquire_owned().ok()
    }

    /// Anzahl belegter Verbindungsplaetze
    pub fn belegte_plaetze(&self) -> usize {
        (self.config.max_clients as usize).saturating_sub(self.plaetze.available_permits())
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Wartet bis das Shutdown-Signal `true` ist
///
/// Kehrt sofort zurueck wenn das Signal bereits gesetzt ist. Wird der
/// Sender verworfen ohne zu signalisieren, kehrt die Funktion nie zurueck.
pub async fn shutdown_abwarten(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
