//! parlor-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Relay und Observability und stellt den
//! oeffentlichen Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use parlor_observability::{observability_server_starten, ParlorMetriken};
use parlor_relay::{shutdown_abwarten, ws_server_starten, RelayState};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis Ctrl-C / SIGTERM
    pub async fn starten(self) -> Result<()> {
        let adresse = self.config.chat_bind_adresse();
        let listener = TcpListener::bind(&adresse)
            .await
            .with_context(|| format!("Chat-Port {adresse} konnte nicht gebunden werden"))?;

        self.laufen(listener, shutdown_signal()).await
    }

    /// Betreibt den Server auf einem bereits gebundenen Listener
    ///
    /// Reihenfolge:
    /// 1. Metriken und Relay-Zustand anlegen
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. WebSocket-Chat-Server starten
    /// 4. Auf `signal` warten, dann alle Verbindungen beenden
    pub async fn laufen<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            server_name = %self.config.server.name,
            chat = %listener.local_addr()?,
            ws_pfad = %self.config.netzwerk.ws_pfad,
            max_clients = self.config.server.max_clients,
            "Server startet"
        );

        let metriken = ParlorMetriken::neu()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = RelayState::neu(self.config.relay_konfig(), metriken.clone(), shutdown_rx);

        let observability_task = if self.config.observability.aktiviert {
            let bind_addr: SocketAddr = self
                .config
                .observability_bind_adresse()
                .parse()
                .context("Ungueltige Observability-Adresse")?;
            Some(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(bind_addr, metriken).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }))
        } else {
            tracing::info!("Observability-Server deaktiviert");
            None
        };

        let mut ws_shutdown = state.shutdown_rx.clone();
        let mut chat_task = tokio::spawn(ws_server_starten(
            Arc::clone(&state),
            listener,
            async move { shutdown_abwarten(&mut ws_shutdown).await },
        ));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C / SIGTERM)...");
        tokio::select! {
            _ = signal => {
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
            }
            ergebnis = &mut chat_task => {
                if let Some(task) = observability_task {
                    task.abort();
                }
                ergebnis??;
                anyhow::bail!("Chat-Server unerwartet beendet");
            }
        }

        // Neue Upgrades abweisen, Handler beenden, Queues schliessen
        let _ = shutdown_tx.send(true);
        let getrennt = state.registry.beenden();
        tracing::info!(getrennt, "Alle Verbindungen getrennt");

        chat_task.await??;

        if let Some(task) = observability_task {
            task.abort();
        }

        tracing::info!(uptime_sek = state.uptime_sek(), "Server beendet");
        Ok(())
    }
}

/// Wartet auf Ctrl-C oder (unter Unix) SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht installiert werden");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(fehler = %e, "SIGTERM-Handler konnte nicht installiert werden");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
