//! Verbindungs-Registry – Wer ist gerade im Chat?
//!
//! Die Registry ist die einzige geteilte, veraenderliche Ressource des
//! Relays. Anmelden, Abmelden und Schnappschuss laufen unter demselben
//! Mutex, damit der Broadcaster nie eine halb aktualisierte Menge sieht.
//!
//! Eine Verbindung ist genau dann sichtbar, wenn sie den Handshake
//! abgeschlossen hat und noch nicht getrennt wurde. Die Registry haelt den
//! dauerhaften `Sender` der Ausgangs-Queue. Ein Schnappschuss klont ihn fuer
//! die Dauer eines Broadcasts; die Queue schliesst sich erst, wenn nach dem
//! `abmelden` auch alle Schnappschuesse verworfen sind.

use parking_lot::Mutex;
use parlor_core::VerbindungsId;
use parlor_observability::ParlorMetriken;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{RelayError, RelayResult};

// ---------------------------------------------------------------------------
// Verbindung
// ---------------------------------------------------------------------------

/// Grund einer fehlgeschlagenen Zustellung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZustellFehler {
    /// Ausgangs-Queue ist voll (Client liest zu langsam)
    QueueVoll,
    /// Ausgangs-Queue ist geschlossen (Verbindungs-Task beendet)
    QueueGeschlossen,
}

impl std::fmt::Display for ZustellFehler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueueVoll => write!(f, "Send-Queue voll"),
            Self::QueueGeschlossen => write!(f, "Send-Queue geschlossen"),
        }
    }
}

/// Eine angemeldete Client-Verbindung
///
/// Clone ist billig (Name als `Arc<str>`, Sender als Handle).
#[derive(Debug, Clone)]
pub struct Verbindung {
    pub id: VerbindungsId,
    /// Anzeigename aus dem Handshake (undurchsichtiger Text)
    pub name: Arc<str>,
    tx: mpsc::Sender<Arc<str>>,
}

impl Verbindung {
    /// Erstellt eine Verbindung mit der Sendeseite ihrer Ausgangs-Queue
    pub fn neu(id: VerbindungsId, name: impl Into<Arc<str>>, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
            tx,
        }
    }

    /// Reiht einen Text nicht-blockierend in die Ausgangs-Queue ein
    pub fn zustellen(&self, text: Arc<str>) -> Result<(), ZustellFehler> {
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ZustellFehler::QueueVoll,
            mpsc::error::TrySendError::Closed(_) => ZustellFehler::QueueGeschlossen,
        })
    }
}

// ---------------------------------------------------------------------------
// VerbindungsRegistry
// ---------------------------------------------------------------------------

/// Registry aller aktiven Verbindungen
///
/// Thread-safe via Arc + Mutex. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct VerbindungsRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    zustand: Mutex<RegistryZustand>,
    /// Naechste zu vergebende Verbindungs-ID (beginnt bei 1)
    naechste_id: AtomicU64,
    metriken: Option<ParlorMetriken>,
}

#[derive(Default)]
struct RegistryZustand {
    verbindungen: BTreeMap<VerbindungsId, Verbindung>,
    beendet: bool,
}

impl VerbindungsRegistry {
    /// Erstellt eine leere Registry ohne Metriken
    pub fn neu() -> Self {
        Self::erstellen(None)
    }

    /// Erstellt eine leere Registry, die `parlor_connected_clients` pflegt
    pub fn mit_metriken(metriken: ParlorMetriken) -> Self {
        Self::erstellen(Some(metriken))
    }

    fn erstellen(metriken: Option<ParlorMetriken>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                zustand: Mutex::new(RegistryZustand::default()),
                naechste_id: AtomicU64::new(1),
                metriken,
            }),
        }
    }

    /// Vergibt eine neue, nie wiederverwendete Verbindungs-ID
    ///
    /// Wird beim Accept aufgerufen, lange bevor die Verbindung angemeldet ist.
    pub fn id_vergeben(&self) -> VerbindungsId {
        VerbindungsId(self.inner.naechste_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Meldet eine Verbindung an
    ///
    /// Schlaegt fehl wenn die Registry heruntergefahren wurde oder die ID
    /// bereits vorhanden ist.
    pub fn anmelden(&self, verbindung: Verbindung) -> RelayResult<VerbindungsId> {
        let id = verbindung.id;
        let name = Arc::clone(&verbindung.name);

        let anzahl = {
            let mut zustand = self.inner.zustand.lock();
            if zustand.beendet {
                return Err(RelayError::RegistryBeendet);
            }
            if zustand.verbindungen.contains_key(&id) {
                return Err(RelayError::BereitsAngemeldet(id));
            }
            zustand.verbindungen.insert(id, verbindung);
            let anzahl = zustand.verbindungen.len();
            self.gauge_setzen(anzahl);
            anzahl
        };

        tracing::info!(verbindung = %id, name = %name, online = anzahl, "Client angemeldet");
        Ok(id)
    }

    /// Meldet eine Verbindung ab
    ///
    /// Idempotent: ein zweiter Aufruf ist ein No-Op. Gibt `true` zurueck wenn
    /// die Verbindung tatsaechlich entfernt wurde.
    pub fn abmelden(&self, id: &VerbindungsId) -> bool {
        let (entfernt, anzahl) = {
            let mut zustand = self.inner.zustand.lock();
            let entfernt = zustand.verbindungen.remove(id);
            let anzahl = zustand.verbindungen.len();
            if entfernt.is_some() {
                self.gauge_setzen(anzahl);
            }
            (entfernt, anzahl)
        };

        match entfernt {
            Some(verbindung) => {
                tracing::info!(
                    verbindung = %id,
                    name = %verbindung.name,
                    online = anzahl,
                    "Client abgemeldet"
                );
                true
            }
            None => false,
        }
    }

    /// Konsistente Momentaufnahme aller angemeldeten Verbindungen
    ///
    /// Sortiert nach Verbindungs-ID (Accept-Reihenfolge).
    pub fn schnappschuss(&self) -> Vec<Verbindung> {
        self.inner
            .zustand
            .lock()
            .verbindungen
            .values()
            .cloned()
            .collect()
    }

    /// Gibt die Anzahl der angemeldeten Verbindungen zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.zustand.lock().verbindungen.len()
    }

    /// Prueft ob eine Verbindung angemeldet ist
    pub fn ist_angemeldet(&self, id: &VerbindungsId) -> bool {
        self.inner.zustand.lock().verbindungen.contains_key(id)
    }

    /// Anzeigename einer angemeldeten Verbindung
    pub fn name_von(&self, id: &VerbindungsId) -> Option<Arc<str>> {
        self.inner
            .zustand
            .lock()
            .verbindungen
            .get(id)
            .map(|v| Arc::clone(&v.name))
    }

    /// Faehrt die Registry herunter
    ///
    /// Alle Verbindungen werden entfernt (ihre Ausgangs-Queues schliessen
    /// sich), weitere Anmeldungen schlagen mit `RegistryBeendet` fehl.
    /// Gibt die Anzahl der entfernten Verbindungen zurueck.
    pub fn beenden(&self) -> usize {
        let entfernt = {
            let mut zustand = self.inner.zustand.lock();
            zustand.beendet = true;
            self.gauge_setzen(0);
            std::mem::take(&mut zustand.verbindungen)
        };

        tracing::info!(entfernt = entfernt.len(), "Registry heruntergefahren");
        entfernt.len()
    }

    /// Prueft ob die Registry heruntergefahren wurde
    pub fn ist_beendet(&self) -> bool {
        self.inner.zustand.lock().beendet
    }

    fn gauge_setzen(&self, anzahl: usize) {
        if let Some(metriken) = &self.inner.metriken {
            metriken.connected_clients.set(anzahl as i64);
        }
    }
}

impl Default for VerbindungsRegistry {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// AbmeldeGuard
// ---------------------------------------------------------------------------

/// Meldet eine Verbindung beim Drop ab
///
/// Deckt auch den Abbruch des Verbindungs-Tasks ab.
pub(crate) struct AbmeldeGuard {
    registry: VerbindungsRegistry,
    id: VerbindungsId,
}

impl AbmeldeGuard {
    pub(crate) fn neu(registry: VerbindungsRegistry, id: VerbindungsId) -> Self {
        Self { registry, id }
    }
}

impl Drop for AbmeldeGuard {
    fn drop(&mut self) {
        self.registry.abmelden(&self.id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
