//! WebSocket-Anbindung – Router, Upgrade-Handler und Transport
//!
//! Der Chat-Router nimmt WebSocket-Upgrades am konfigurierten Pfad an und
//! startet fuer jede Verbindung einen eigenen Task mit einer
//! `ClientVerbindung`. Der Upgrade-Task wird von axum gespawnt.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::connection::ClientVerbindung;
use crate::server_state::RelayState;
use crate::transport::{ChatTransport, Eingang, TransportFehler};

// ---------------------------------------------------------------------------
// WsTransport
// ---------------------------------------------------------------------------

/// `ChatTransport` ueber einer axum-WebSocket-Verbindung
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn neu(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl ChatTransport for WsTransport {
    async fn empfangen(&mut self) -> Option<Result<Eingang, TransportFehler>> {
        loop {
            match self.socket.recv().await? {
                Ok(Message::Text(text)) => return Some(Ok(Eingang::Text(text))),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    return Some(Ok(Eingang::Lebenszeichen));
                }
                Ok(Message::Binary(daten)) => {
                    tracing::debug!(bytes = daten.len(), "Binaer-Frame ignoriert");
                }
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(TransportFehler::neu(e.to_string()))),
            }
        }
    }

    async fn senden(&mut self, text: &str) -> Result<(), TransportFehler> {
        self.socket
            .send(Message::Text(text.to_owned()))
            .await
            .map_err(|e| TransportFehler::neu(e.to_string()))
    }

    async fn pingen(&mut self) -> Result<(), TransportFehler> {
        self.socket
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportFehler::neu(e.to_string()))
    }

    async fn schliessen(&mut self) {
        let _ = self.socket.send(Message::Close(None)).await;
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Baut den Chat-Router
///
/// - `GET <ws_pfad>` – WebSocket-Upgrade
/// - `GET /health-check` – `OK`
pub fn chat_router(state: Arc<RelayState>) -> Router {
    let ws_pfad = state.config.ws_pfad.clone();

    Router::new()
        .route(&ws_pfad, get(ws_handler))
        .route("/health-check", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// WebSocket-Upgrade-Handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<RelayState>>,
) -> Response {
    if *state.shutdown_rx.borrow() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server wird heruntergefahren").into_response();
    }

    // Client-Limit pruefen: gezaehlt wird jede akzeptierte Verbindung
    let Some(platz) = state.platz_reservieren() else {
        tracing::warn!(
            peer = %peer_addr,
            max = state.config.max_clients,
            "Server voll – Verbindung abgelehnt"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Server voll").into_response();
    };

    let shutdown_rx = state.shutdown_rx.clone();

    // Schlaegt das Upgrade fehl, wird die Closure samt Platz verworfen
    ws.on_upgrade(move |socket| async move {
        let _platz = platz;
        let verbindung = ClientVerbindung::neu(state, peer_addr);
        // Fehler sind bereits protokolliert und betreffen nur diese Verbindung
        let _ = verbindung
            .verarbeiten(WsTransport::neu(socket), shutdown_rx)
            .await;
    })
}

/// Startet den WebSocket-Chat-Server auf einem gebundenen Listener
///
/// Laeuft bis `shutdown` abgeschlossen ist.
pub async fn ws_server_starten<F>(
    state: Arc<RelayState>,
    listener: TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let lokale_addr = listener.local_addr()?;
    tracing::info!(
        adresse = %lokale_addr,
        pfad = %state.config.ws_pfad,
        "WebSocket-Chat-Server gestartet"
    );

    let app = chat_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("WebSocket-Chat-Server gestoppt");
    Ok(())
}
