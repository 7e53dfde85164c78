//! Integration-Tests fuer den kompletten Server (Konfiguration bis Shutdown)

use futures_util::{SinkExt, StreamExt};
use parlor_server::{config::ServerConfig, Server};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message};

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::aus_toml(
        r#"
            [netzwerk]
            bind_adresse = "127.0.0.1"

            [chat]
            absender_anzeigen = true

            [observability]
            aktiviert = false
        "#,
    )
    .expect("Test-Konfiguration muss parsen");
    config.server.name = "Testserver".into();
    config
}

#[tokio::test]
async fn server_leitet_weiter_und_faehrt_sauber_herunter() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/chat-ws", listener.local_addr().unwrap());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(Server::neu(test_config()).laufen(listener, async move {
        let _ = stop_rx.await;
    }));

    let (mut alice, _) = connect_async(&url).await.expect("alice verbindet");
    let (mut bob, _) = connect_async(&url).await.expect("bob verbindet");
    alice.send(Message::Text("alice".into())).await.unwrap();
    bob.send(Message::Text("bob".into())).await.unwrap();

    // Anmeldung beider Clients ist nicht direkt beobachtbar: erneut senden
    // bis bob die Zeile erhaelt
    let empfangen = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            alice.send(Message::Text("hi".into())).await.unwrap();
            match tokio::time::timeout(Duration::from_millis(100), bob.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => return text,
                Ok(Some(Ok(_))) | Err(_) => continue,
                Ok(other) => panic!("unerwartetes Frame: {other:?}"),
            }
        }
    })
    .await
    .expect("bob muss eine Nachricht erhalten");
    assert_eq!(empfangen, "alice: hi");

    stop_tx.send(()).unwrap();
    let ergebnis = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("Server muss nach dem Signal enden")
        .unwrap();
    assert!(ergebnis.is_ok());

    // Nach dem Shutdown ist der Stream fuer alice beendet
    let stream_ende = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(frame)) = alice.next().await {
            if let Message::Close(_) = frame {
                break;
            }
        }
    })
    .await;
    assert!(stream_ende.is_ok());
}

#[tokio::test]
async fn health_check_auf_chat_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(Server::neu(test_config()).laufen(listener, async move {
        let _ = stop_rx.await;
    }));

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health-check HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut antwort = String::new();
    stream.read_to_string(&mut antwort).await.unwrap();

    assert!(antwort.starts_with("HTTP/1.1 200"), "Antwort: {antwort}");
    assert!(antwort.ends_with("OK"));

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
