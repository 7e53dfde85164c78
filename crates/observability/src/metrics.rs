//! Prometheus-kompatible Metriken fuer Parlor
//!
//! Registrierte Metriken:
//! - `parlor_connected_clients` – Gauge: Angemeldete Verbindungen (Registry-Groesse)
//! - `parlor_connections_total` – Counter: Akzeptierte WebSocket-Verbindungen
//! - `parlor_handshake_timeouts_total` – Counter: Verbindungen ohne Handshake
//! - `parlor_messages_total` – Counter: Gebroadcastete Chat-Nachrichten
//! - `parlor_deliveries_total` – Counter: Erfolgreiche Zustellungen
//! - `parlor_delivery_failures_total` – Counter: Fehlgeschlagene Zustellungen
//! - `parlor_broadcast_recipients` – Histogram: Empfaenger pro Broadcast

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle Parlor-Prometheus-Metriken
///
/// Clone teilt die zugrundeliegenden Zaehler.
#[derive(Clone)]
pub struct ParlorMetriken {
    pub registry: Arc<Registry>,

    pub connected_clients: IntGauge,
    pub connections_total: IntCounter,
    pub handshake_timeouts_total: IntCounter,
    pub messages_total: IntCounter,
    pub deliveries_total: IntCounter,
    pub delivery_failures_total: IntCounter,
    pub broadcast_recipients: Histogram,
}

impl ParlorMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_clients = IntGauge::with_opts(Opts::new(
            "parlor_connected_clients",
            "Anzahl aktuell angemeldeter Verbindungen",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let connections_total = IntCounter::with_opts(Opts::new(
            "parlor_connections_total",
            "Gesamtanzahl akzeptierter Verbindungen",
        ))?;
        registry.register(Box::new(connections_total.clone()))?;

        let handshake_timeouts_total = IntCounter::with_opts(Opts::new(
            "parlor_handshake_timeouts_total",
            "Verbindungen die den Handshake nicht rechtzeitig abgeschlossen haben",
        ))?;
        registry.register(Box::new(handshake_timeouts_total.clone()))?;

        let messages_total = IntCounter::with_opts(Opts::new(
            "parlor_messages_total",
            "Gesamtanzahl gebroadcasteter Chat-Nachrichten",
        ))?;
        registry.register(Box::new(messages_total.clone()))?;

        let deliveries_total = IntCounter::with_opts(Opts::new(
            "parlor_deliveries_total",
            "Erfolgreich eingereihte Zustellungen",
        ))?;
        registry.register(Box::new(deliveries_total.clone()))?;

        let delivery_failures_total = IntCounter::with_opts(Opts::new(
            "parlor_delivery_failures_total",
            "Fehlgeschlagene Zustellungen (Queue voll oder geschlossen)",
        ))?;
        registry.register(Box::new(delivery_failures_total.clone()))?;

        let broadcast_recipients = Histogram::with_opts(
            HistogramOpts::new(
                "parlor_broadcast_recipients",
                "Anzahl Empfaenger pro Broadcast",
            )
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
        )?;
        registry.register(Box::new(broadcast_recipients.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            connections_total,
            handshake_timeouts_total,
            messages_total,
            deliveries_total,
            delivery_failures_total,
            broadcast_recipients,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: ParlorMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<ParlorMetriken>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
