//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use parlor_observability::logging::{log_format_gueltig, log_level_gueltig};
use parlor_relay::RelayKonfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Chat-Einstellungen (Handshake, Queues, Keepalive)
    pub chat: ChatEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Parlor".into(),
            max_clients: 512,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer Chat- und Observability-Server
    pub bind_adresse: String,
    /// Port des Chat-Servers
    pub port: u16,
    /// HTTP-Pfad des WebSocket-Endpunkts
    pub ws_pfad: String,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8087,
            ws_pfad: "/chat-ws".into(),
        }
    }
}

/// Chat-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatEinstellungen {
    /// Frist fuer den Anzeigenamen nach dem Verbindungsaufbau
    pub handshake_timeout_sek: u64,
    /// Ausgangs-Queue pro Verbindung (Nachrichten)
    pub sende_queue_groesse: usize,
    /// Intervall der Keepalive-Pings
    pub keepalive_sek: u64,
    /// Trennung nach so vielen Sekunden ohne eingehendes Frame
    pub verbindungs_timeout_sek: u64,
    /// Frist fuer einen einzelnen Schreibvorgang an einen Client
    pub schreib_timeout_sek: u64,
    /// Weitergeleitete Zeilen mit `"<name>: "` praefixen
    pub absender_anzeigen: bool,
}

impl Default for ChatEinstellungen {
    fn default() -> Self {
        Self {
            handshake_timeout_sek: 10,
            sende_queue_groesse: 64,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            schreib_timeout_sek: 10,
            absender_anzeigen: false,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };

        config.pruefen()?;
        Ok(config)
    }

    /// Parst eine Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Prueft Werte die serde allein nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if !self.netzwerk.ws_pfad.starts_with('/') {
            anyhow::bail!(
                "netzwerk.ws_pfad muss mit '/' beginnen: '{}'",
                self.netzwerk.ws_pfad
            );
        }
        if self.netzwerk.ws_pfad == "/health-check" {
            anyhow::bail!("netzwerk.ws_pfad kollidiert mit /health-check");
        }
        if self.chat.sende_queue_groesse == 0 {
            anyhow::bail!("chat.sende_queue_groesse muss groesser als 0 sein");
        }
        if self.chat.keepalive_sek == 0 {
            anyhow::bail!("chat.keepalive_sek muss groesser als 0 sein");
        }
        if self.chat.verbindungs_timeout_sek <= self.chat.keepalive_sek {
            anyhow::bail!(
                "chat.verbindungs_timeout_sek ({}) muss groesser als chat.keepalive_sek ({}) sein",
                self.chat.verbindungs_timeout_sek,
                self.chat.keepalive_sek
            );
        }
        if self.chat.schreib_timeout_sek == 0 {
            anyhow::bail!("chat.schreib_timeout_sek muss groesser als 0 sein");
        }
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Unbekanntes Log-Level: '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Unbekanntes Log-Format: '{}'", self.logging.format);
        }
        Ok(())
    }

    /// Gibt die Bind-Adresse fuer den Chat-Server zurueck
    pub fn chat_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port)
    }

    /// Leitet die Relay-Konfiguration ab
    pub fn relay_konfig(&self) -> RelayKonfig {
        RelayKonfig {
            max_clients: self.server.max_clients,
            ws_pfad: self.netzwerk.ws_pfad.clone(),
            handshake_timeout: Duration::from_secs(self.chat.handshake_timeout_sek),
            sende_queue_groesse: self.chat.sende_queue_groesse,
            keepalive: Duration::from_secs(self.chat.keepalive_sek),
            verbindungs_timeout: Duration::from_secs(self.chat.verbindungs_timeout_sek),
            schreib_timeout: Duration::from_secs(self.chat.schreib_timeout_sek),
            absender_anzeigen: self.chat.absender_anzeigen,
        }
    }
}
