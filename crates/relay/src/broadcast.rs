//! Broadcaster – Verteilt eine Chat-Nachricht an alle anderen Clients
//!
//! Der Broadcaster nimmt einen Schnappschuss der Registry und reiht die
//! Nachricht in die Ausgangs-Queue jedes Empfaengers ausser dem Absender
//! ein. Das Einreihen haelt keinen Lock.
//!
//! ## Best-Effort-Zustellung
//! Schlaegt die Zustellung an einen Empfaenger fehl (Queue voll oder
//! geschlossen), wird der Fehler protokolliert und der Empfaenger aus der
//! Registry entfernt. Die uebrigen Empfaenger erhalten die Nachricht
//! trotzdem.
//!
//! ## Reihenfolge
//! Jede Verbindung broadcastet ihre Nachrichten sequentiell aus ihrem
//! eigenen Task; die Queues sind FIFO. Damit bleibt die Reihenfolge pro
//! Absender erhalten. Eine globale Ordnung ueber Absender hinweg gibt es nicht.

use parlor_core::{ChatNachricht, VerbindungsId};
use parlor_observability::ParlorMetriken;
use std::sync::Arc;

use crate::registry::VerbindungsRegistry;

/// Ergebnis eines Broadcasts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZustellBericht {
    /// Anzahl erfolgreich eingereihter Zustellungen
    pub zugestellt: usize,
    /// Empfaenger bei denen die Zustellung fehlschlug (wurden abgemeldet)
    pub fehlgeschlagen: Vec<VerbindungsId>,
}

/// Verteilt Nachrichten an alle angemeldeten Verbindungen ausser dem Absender
#[derive(Clone)]
pub struct Broadcaster {
    registry: VerbindungsRegistry,
    metriken: Option<ParlorMetriken>,
    /// Stellt dem Text den Absendernamen voran (`"alice: hi"`)
    absender_anzeigen: bool,
}

impl Broadcaster {
    /// Erstellt einen Broadcaster ueber der gegebenen Registry
    pub fn neu(registry: VerbindungsRegistry) -> Self {
        Self {
            registry,
            metriken: None,
            absender_anzeigen: false,
        }
    }

    /// Zaehlt Nachrichten und Zustellungen in den Metriken mit
    pub fn mit_metriken(mut self, metriken: ParlorMetriken) -> Self {
        self.metriken = Some(metriken);
        self
    }

    /// Aktiviert oder deaktiviert das Voranstellen des Absendernamens
    pub fn mit_absender_anzeige(mut self, aktiv: bool) -> Self {
        self.absender_anzeigen = aktiv;
        self
    }

    /// Sendet eine Nachricht an alle angemeldeten Verbindungen ausser dem Absender
    pub fn senden(&self, nachricht: &ChatNachricht) -> ZustellBericht {
        let text: Arc<str> = if self.absender_anzeigen {
            nachricht.mit_absender()
        } else {
            Arc::clone(&nachricht.text)
        };

        let empfaenger = self.registry.schnappschuss();
        let mut bericht = ZustellBericht::default();

        for verbindung in empfaenger.iter().filter(|v| v.id != nachricht.von) {
            match verbindung.zustellen(Arc::clone(&text)) {
                Ok(()) => bericht.zugestellt += 1,
                Err(fehler) => {
                    tracing::warn!(
                        verbindung = %verbindung.id,
                        name = %verbindung.name,
                        absender = %nachricht.von,
                        fehler = %fehler,
                        "Zustellung fehlgeschlagen – Verbindung wird getrennt"
                    );
                    bericht.fehlgeschlagen.push(verbindung.id);
                }
            }
        }

        // Ohne die Sender-Klone des Schnappschusses schliesst Abmelden die
        // Ausgangs-Queue; der Verbindungs-Task geht in den Closing-Zustand.
        drop(empfaenger);
        for id in &bericht.fehlgeschlagen {
            self.registry.abmelden(id);
        }

        tracing::trace!(
            absender = %nachricht.von,
            zugestellt = bericht.zugestellt,
            fehlgeschlagen = bericht.fehlgeschlagen.len(),
            "Broadcast abgeschlossen"
        );

        if let Some(metriken) = &self.metriken {
            metriken.messages_total.inc();
            metriken.deliveries_total.inc_by(bericht.zugestellt as u64);
            metriken
                .delivery_failures_total
                .inc_by(bericht.fehlgeschlagen.len() as u64);
            metriken
                .broadcast_recipients
                .observe((bericht.zugestellt + bericht.fehlgeschlagen.len()) as f64);
        }

        bericht
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
