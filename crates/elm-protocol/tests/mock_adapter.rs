//! End-to-end session against a mock ELM327 adapter on localhost

use elm_protocol::{ElmClient, ElmConfig, ElmError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Scripted adapter answers, as a Wi-Fi ELM327 with echo on would send them
fn answer(command: &str) -> Option<&'static str> {
    let reply = match command {
        "ATZ" => "\r\rELM327 v1.5\r\r>",
        "ATE0" => "ATE0\rOK\r\r>",
        "ATL0" | "ATH1" | "ATSP0" => "OK\r\r>",
        "01 0D" => "41 0D 5A\r\r>",
        "01 0C" => "41 0C 1F 88\r\r>",
        "01 05" => "41 05 7B\r\r>",
        "01 0A" => "41 0A 7F\r\r>",
        "01 0B" => "NO DATA\r\r>",
        // Never answers
        "01 11" => return None,
        _ => "?\r\r>",
    };
    Some(reply)
}

async fn handle_client(mut stream: TcpStream) -> Vec<String> {
    let mut received = Vec::new();
    let mut pending = Vec::new();
    let mut buf = [0u8; 64];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return received,
            Ok(n) => n,
        };
        pending.extend_from_slice(&buf[..n]);

        while let Some(pos) = pending.windows(2).position(|w| w == b"\r\n") {
            let command = String::from_utf8_lossy(&pending[..pos]).into_owned();
            pending.drain(..pos + 2);

            if let Some(reply) = answer(&command) {
                stream.write_all(reply.as_bytes()).await.unwrap();
            }
            received.push(command);
        }
    }
}

async fn spawn_adapter() -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        handle_client(stream).await
    });

    (port, handle)
}

fn config(port: u16) -> ElmConfig {
    ElmConfig {
        timeout: Duration::from_millis(300),
        init_pacing: Duration::from_millis(1),
        ..ElmConfig::new("127.0.0.1", port)
    }
}

#[tokio::test]
async fn test_full_session() {
    let (port, adapter) = spawn_adapter().await;

    let mut client = ElmClient::new(config(port));
    client.connect().await.unwrap();
    client.initialize().await.unwrap();

    assert_eq!(client.read_obd_data("0D").await.unwrap(), "90 km/h");
    assert_eq!(client.read_obd_data("0C").await.unwrap(), "2018 RPM");
    assert_eq!(client.read_obd_data("05").await.unwrap(), "83 °C");
    assert_eq!(client.read_obd_data("0A").await.unwrap(), "7F");
    assert!(matches!(
        client.read_obd_data("0B").await,
        Err(ElmError::PidNotFound(_))
    ));

    client.close().await;

    let received = adapter.await.unwrap();
    assert_eq!(
        received,
        ["ATZ", "ATE0", "ATL0", "ATH1", "ATSP0", "01 0D", "01 0C", "01 05", "01 0A", "01 0B"]
    );
}

#[tokio::test]
async fn test_silent_pid_times_out_and_session_continues() {
    let (port, adapter) = spawn_adapter().await;

    let mut client = ElmClient::new(config(port));
    client.connect().await.unwrap();

    let err = client.read_obd_data("11").await.unwrap_err();
    assert!(matches!(err, ElmError::Timeout { .. }));
    assert!(!err.is_fatal_to_connection());

    // The next command still gets its own answer
    assert_eq!(client.read_obd_data("0D").await.unwrap(), "90 km/h");

    client.close().await;
    assert_eq!(adapter.await.unwrap(), ["01 11", "01 0D"]);
}

#[tokio::test]
async fn test_adapter_hangs_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let adapter = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 16];
        let _ = stream.read(&mut buf).await.unwrap();
        // Close without answering
    });

    let mut client = ElmClient::new(config(port));
    client.connect().await.unwrap();

    let response = client.send_command("ATZ").await.unwrap();
    assert!(response.is_empty());
    assert_eq!(response.text(), "");

    adapter.await.unwrap();
}
