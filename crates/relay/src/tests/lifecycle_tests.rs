//! Szenario-Tests fuer `ClientVerbindung`

use parlor_observability::ParlorMetriken;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::test_transport::{transport_paar, TestClient};
use crate::connection::ClientVerbindung;
use crate::error::{RelayError, RelayResult};
use crate::server_state::{RelayKonfig, RelayState};

struct Umgebung {
    state: Arc<RelayState>,
    shutdown_tx: watch::Sender<bool>,
}

fn umgebung(konfig: RelayKonfig) -> Umgebung {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metriken = ParlorMetriken::neu().expect("Metriken");
    Umgebung {
        state: RelayState::neu(konfig, metriken, shutdown_rx),
        shutdown_tx,
    }
}

fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

impl Umgebung {
    fn verbinden(&self) -> (JoinHandle<RelayResult<()>>, TestClient) {
        let (transport, client) = transport_paar();
        let verbindung = ClientVerbindung::neu(Arc::clone(&self.state), peer());
        let shutdown_rx = self.shutdown_tx.subscribe();
        let task = tokio::spawn(verbindung.verarbeiten(transport, shutdown_rx));
        (task, client)
    }

    /// Verbindet und schliesst den Handshake ab
    async fn beitreten(&self, name: &str) -> (JoinHandle<RelayResult<()>>, TestClient) {
        let vorher = self.state.registry.anzahl();
        let (task, client) = self.verbinden();
        client.senden(name);
        self.warten_bis(|s| s.registry.anzahl() == vorher + 1).await;
        (task, client)
    }

    async fn warten_bis(&self, bedingung: impl Fn(&RelayState) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !bedingung(self.state.as_ref()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Bedingung wurde nicht rechtzeitig erfuellt");
    }

    fn id_von(&self, name: &str) -> parlor_core::VerbindungsId {
        self.state
            .registry
            .schnappschuss()
            .into_iter()
            .find(|v| &*v.name == name)
            .map(|v| v.id)
            .expect("Verbindung muss angemeldet sein")
    }
}

async fn ergebnis(task: JoinHandle<RelayResult<()>>) -> RelayResult<()> {
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("Verbindungs-Task muss enden")
        .expect("Verbindungs-Task darf nicht paniken")
}

#[tokio::test]
async fn alice_sendet_hi_an_bob() {
    let u = umgebung(RelayKonfig::default());
    let (_alice_task, mut alice) = u.beitreten("alice").await;
    let (_bob_task, mut bob) = u.beitreten("bob").await;

    alice.senden("hi");
    assert_eq!(bob.empfangen().await.as_deref(), Some("hi"));

    // Kaeme "hi" bei alice an, laege es in ihrer FIFO-Queue vor "yo"
    bob.senden("yo");
    assert_eq!(alice.empfangen().await.as_deref(), Some("yo"));
    assert!(alice.nichts_empfangen());
}

#[tokio::test]
async fn nachricht_erreicht_alle_angemeldeten_ausser_absender() {
    let u = umgebung(RelayKonfig::default());
    let mut clients = Vec::new();
    for name in ["a", "b", "c", "d"] {
        clients.push(u.beitreten(name).await);
    }

    clients[0].1.senden("rundruf");
    for (_, client) in clients.iter_mut().skip(1) {
        assert_eq!(client.empfangen().await.as_deref(), Some("rundruf"));
    }
    assert!(clients[0].1.nichts_empfangen());
    assert_eq!(u.state.metriken.deliveries_total.get(), 3);
}

#[tokio::test]
async fn trennung_vor_handshake_meldet_nie_an() {
    let u = umgebung(RelayKonfig::default());
    let (_bob_task, mut bob) = u.beitreten("bob").await;

    let (task, mut alice) = u.verbinden();
    alice.trennen();

    assert!(ergebnis(task).await.is_ok());
    assert!(alice.ist_geschlossen());
    assert_eq!(u.state.registry.anzahl(), 1, "nur bob ist angemeldet");
    assert_eq!(u.state.metriken.messages_total.get(), 0, "kein Broadcast");
    assert!(bob.nichts_empfangen());
}

#[tokio::test(start_paused = true)]
async fn handshake_zeitlimit_verwirft_verbindung() {
    let u = umgebung(RelayKonfig {
        handshake_timeout: Duration::from_secs(2),
        ..Default::default()
    });

    let (task, client) = u.verbinden();

    assert!(matches!(ergebnis(task).await, Err(RelayError::HandshakeZeitlimit)));
    assert!(client.ist_geschlossen());
    assert!(u.state.registry.schnappschuss().is_empty());
    assert_eq!(u.state.metriken.handshake_timeouts_total.get(), 1);
}

#[tokio::test]
async fn lebenszeichen_ist_kein_anzeigename() {
    let u = umgebung(RelayKonfig::default());
    let (_task, client) = u.verbinden();

    client.lebenszeichen();
    client.senden("carol");
    u.warten_bis(|s| s.registry.anzahl() == 1).await;

    let id = u.id_von("carol");
    assert_eq!(u.state.registry.name_von(&id).as_deref(), Some("carol"));
}

#[tokio::test]
async fn schreibfehler_trennt_nur_den_empfaenger() {
    let u = umgebung(RelayKonfig::default());
    let (_alice_task, alice) = u.beitreten("alice").await;
    let (bob_task, bob) = u.beitreten("bob").await;
    let (_carol_task, mut carol) = u.beitreten("carol").await;
    let bob_id = u.id_von("bob");

    bob.schreibfehler_aktivieren();
    alice.senden("hi");

    assert!(matches!(ergebnis(bob_task).await, Err(RelayError::Schreibfehler(_))));
    assert!(bob.ist_geschlossen());
    assert!(!u.state.registry.ist_angemeldet(&bob_id));

    assert_eq!(carol.empfangen().await.as_deref(), Some("hi"));
    assert_eq!(u.state.registry.anzahl(), 2);
}

#[tokio::test]
async fn entfernung_durch_registry_schliesst_verbindung() {
    let u = umgebung(RelayKonfig::default());
    let (_c1_task, c1) = u.beitreten("client1").await;
    let (c2_task, c2) = u.beitreten("client2").await;
    let (_c3_task, mut c3) = u.beitreten("client3").await;

    // Broadcaster hat client2 wegen fehlgeschlagener Zustellung abgemeldet
    let c2_id = u.id_von("client2");
    assert!(u.state.registry.abmelden(&c2_id));

    assert!(matches!(ergebnis(c2_task).await, Err(RelayError::Entfernt)));
    assert!(c2.ist_geschlossen());

    c1.senden("noch da?");
    assert_eq!(c3.empfangen().await.as_deref(), Some("noch da?"));
}

#[tokio::test]
async fn lesefehler_meldet_ab() {
    let u = umgebung(RelayKonfig::default());
    let (task, client) = u.beitreten("alice").await;
    let id = u.id_von("alice");

    client.lesefehler();

    assert!(matches!(ergebnis(task).await, Err(RelayError::Lesefehler(_))));
    assert!(!u.state.registry.ist_angemeldet(&id));
    assert!(client.ist_geschlossen());
}

#[tokio::test]
async fn client_trennung_im_aktiven_zustand_meldet_ab() {
    let u = umgebung(RelayKonfig::default());
    let (task, mut client) = u.beitreten("alice").await;

    client.trennen();

    assert!(ergebnis(task).await.is_ok());
    assert_eq!(u.state.registry.anzahl(), 0);
}

#[tokio::test]
async fn anmeldung_nach_registry_shutdown_wird_abgelehnt() {
    let u = umgebung(RelayKonfig::default());
    u.state.registry.beenden();

    let (task, client) = u.verbinden();
    client.senden("zu spaet");

    assert!(matches!(ergebnis(task).await, Err(RelayError::RegistryBeendet)));
    assert!(client.ist_geschlossen());
    assert!(u.state.registry.schnappschuss().is_empty());
}

#[tokio::test]
async fn shutdown_schliesst_alle_verbindungen() {
    let u = umgebung(RelayKonfig::default());
    let (alice_task, alice) = u.beitreten("alice").await;
    let (bob_task, bob) = u.beitreten("bob").await;
    let (wartend_task, wartend) = u.verbinden();

    u.shutdown_tx.send(true).unwrap();
    u.state.registry.beenden();

    assert!(ergebnis(alice_task).await.is_ok());
    assert!(ergebnis(bob_task).await.is_ok());
    assert!(ergebnis(wartend_task).await.is_ok());
    assert!(alice.ist_geschlossen() && bob.ist_geschlossen() && wartend.ist_geschlossen());
    assert_eq!(u.state.registry.anzahl(), 0);
}

#[tokio::test(start_paused = true)]
async fn keepalive_pingt_und_trennt_stille_verbindung() {
    let u = umgebung(RelayKonfig {
        keepalive: Duration::from_secs(1),
        verbindungs_timeout: Duration::from_secs(2),
        ..Default::default()
    });
    let (task, client) = u.beitreten("still").await;

    assert!(matches!(ergebnis(task).await, Err(RelayError::Zeitlimit)));
    assert!(client.pings() >= 2);
    assert_eq!(u.state.registry.anzahl(), 0);
}

#[tokio::test]
async fn abgebrochener_task_meldet_trotzdem_ab() {
    let u = umgebung(RelayKonfig::default());
    let (task, _client) = u.beitreten("alice").await;

    task.abort();
    let _ = task.await;

    assert_eq!(u.state.registry.anzahl(), 0);
}

#[tokio::test]
async fn anzeigenamen_muessen_nicht_eindeutig_sein() {
    let u = umgebung(RelayKonfig::default());
    let (_t1, mut erster) = u.beitreten("alice").await;
    let (_t2, zweiter) = u.beitreten("alice").await;

    assert_eq!(u.state.registry.anzahl(), 2);
    zweiter.senden("ich bin auch alice");
    assert_eq!(erster.empfangen().await.as_deref(), Some("ich bin auch alice"));
}

#[tokio::test(start_paused = true)]
async fn haengendes_schreiben_endet_nach_schreibfrist() {
    let u = umgebung(RelayKonfig {
        sende_queue_groesse: 2,
        schreib_timeout: Duration::from_secs(2),
        ..Default::default()
    });
    let (_alice_task, alice) = u.beitreten("alice").await;
    let (bob_task, bob) = u.beitreten("bob").await;
    let bob_id = u.id_von("bob");

    bob.schreiben_blockieren();
    for i in 0..10 {
        alice.senden(&format!("zeile {i}"));
    }

    assert!(matches!(ergebnis(bob_task).await, Err(RelayError::Schreibfehler(_))));
    assert!(bob.ist_geschlossen());
    assert_eq!(bob.schreibversuche(), 1);
    assert!(!u.state.registry.ist_angemeldet(&bob_id));
    assert_eq!(u.state.registry.anzahl(), 1);
}

#[tokio::test]
async fn shutdown_beendet_haengendes_schreiben() {
    let u = umgebung(RelayKonfig {
        schreib_timeout: Duration::from_secs(60),
        ..Default::default()
    });
    let (_alice_task, alice) = u.beitreten("alice").await;
    let (bob_task, bob) = u.beitreten("bob").await;

    bob.schreiben_blockieren();
    alice.senden("hi");
    tokio::time::timeout(Duration::from_secs(5), async {
        while bob.schreibversuche() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("bob muss einen Schreibversuch starten");

    u.shutdown_tx.send(true).unwrap();
    u.state.registry.beenden();

    assert!(ergebnis(bob_task).await.is_ok());
    assert!(bob.ist_geschlossen());
    assert_eq!(u.state.registry.anzahl(), 0);
}
