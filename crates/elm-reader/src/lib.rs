//! ELM327 OBD-II Reader
//!
//! Connects to an adapter, runs the initialization sequence and prints live
//! PID readings until the configured rounds are done or Ctrl-C is pressed.

pub mod cli;
pub mod settings;

pub use cli::Args;
pub use settings::ReaderSettings;

use anyhow::{ensure, Context};
use elm_protocol::{ElmClient, ElmConfig};
use obd_poller::{PidReading, Poller};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging on stderr, leaving stdout to the readings
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Session configuration from the command line and loaded settings
pub fn build_elm_config(args: &Args, settings: &ReaderSettings) -> ElmConfig {
    let mut config = ElmConfig::new(args.host.clone(), args.port).with_timeout(args.timeout());
    config.init_commands = settings.init_commands.clone();
    config.init_pacing = settings.init_pacing();

    if args.tls {
        let mut tls = settings.tls.clone();
        if args.insecure {
            tls.verify_certificates = false;
        }
        if let Some(version) = args.tls_min_version {
            tls.min_version = version;
        }
        config = config.with_tls(tls);
    }

    config
}

/// One reading as a fixed-width text line
pub fn format_reading(reading: &PidReading) -> String {
    match reading.outcome() {
        Ok(value) => format!("{:<30}: {}", reading.description, value),
        Err(error) => format!("{:<30}: Error - {}", reading.description, error),
    }
}

fn print_readings(mut rx: mpsc::Receiver<PidReading>, json: bool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut current_round = 0;

        while let Some(reading) = rx.recv().await {
            if json {
                match serde_json::to_string(&reading) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "Failed to serialize reading"),
                }
                continue;
            }

            if reading.round != current_round {
                current_round = reading.round;
                println!("\n--- Reading {current_round} ---");
            }
            println!("{}", format_reading(&reading));
        }
    })
}

/// Run a full reader session
pub async fn run(args: Args) -> anyhow::Result<()> {
    let settings = ReaderSettings::load(args.config.as_deref()).context("Failed to load settings")?;
    ensure!(!settings.targets.is_empty(), "No PIDs configured");

    let config = build_elm_config(&args, &settings);
    let mut poller = Poller::new(settings.poller_config(args.rounds));

    let mut client = ElmClient::new(config);
    client
        .connect()
        .await
        .with_context(|| format!("Connection to {}:{} failed", args.host, args.port))?;

    if let Err(e) = client.initialize().await {
        client.close().await;
        return Err(e).context("Adapter initialization failed");
    }

    if !args.json {
        println!("\n=== OBD-II Data ===");
    }

    let (reading_tx, reading_rx) = mpsc::channel(32);
    let printer = print_readings(reading_rx, args.json);

    let result = tokio::select! {
        result = poller.run(&mut client, reading_tx) => result.context("Polling failed"),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    printer.await?;
    client.close().await;

    info!(
        rounds = poller.rounds_completed(),
        failures = poller.failures(),
        "Session finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use elm_protocol::TlsVersion;
    use std::io::Write;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["elm-reader", "obd.local", "35000"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_format_reading() {
        let ok = PidReading {
            round: 1,
            pid: "0D".to_string(),
            description: "Vehicle Speed".to_string(),
            timestamp: chrono::Utc::now(),
            value: Some("90 km/h".to_string()),
            error: None,
        };
        assert_eq!(format_reading(&ok), format!("{:<30}: 90 km/h", "Vehicle Speed"));

        let failed = PidReading {
            value: None,
            error: Some("PID response not found: 0D".to_string()),
            ..ok
        };
        assert_eq!(
            format_reading(&failed),
            "Vehicle Speed                 : Error - PID response not found: 0D"
        );
    }

    #[test]
    fn test_build_plain_config() {
        let config = build_elm_config(&args(&["3"]), &ReaderSettings::default());
        assert_eq!(config.address(), "obd.local:35000");
        assert_eq!(config.timeout.as_secs(), 3);
        assert!(!config.use_tls);
        assert_eq!(config.init_commands, ["ATZ", "ATE0", "ATL0", "ATH1", "ATSP0"]);
    }

    #[test]
    fn test_cli_tls_flags_override_settings() {
        let settings = ReaderSettings::default();
        let config = build_elm_config(
            &args(&["--tls", "--insecure", "--tls-min-version", "1.3"]),
            &settings,
        );

        assert!(config.use_tls);
        assert!(!config.tls.verify_certificates);
        assert_eq!(config.tls.min_version, TlsVersion::Tls13);
        assert!(settings.tls.verify_certificates);
    }

    #[tokio::test]
    async fn test_run_fails_when_adapter_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let args = Args::try_parse_from(["elm-reader", "127.0.0.1", &port.to_string(), "1"]).unwrap();
        let err = run(args).await.unwrap_err();
        assert!(format!("{err:#}").contains("Connection to 127.0.0.1"));
    }

    #[tokio::test]
    async fn test_run_single_round() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let adapter = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let mut received = Vec::new();

            while let Ok(Some(line)) = lines.next_line().await {
                let command = line.trim_end().to_string();
                let reply: &[u8] = if command.starts_with("AT") {
                    b"OK\r\r>"
                } else {
                    b"41 0D 5A\r\r>"
                };
                write_half.write_all(reply).await.unwrap();
                received.push(command);
            }
            received
        });

        let mut settings_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        settings_file
            .write_all(
                br#"
                rounds = 1
                pid_interval_ms = 1
                round_interval_ms = 1
                init_pacing_ms = 1
                init_commands = ["ATZ", "ATE0"]

                [[targets]]
                pid = "0D"
                description = "Vehicle Speed"
                "#,
            )
            .unwrap();

        let config_path = settings_file.path().to_string_lossy().into_owned();
        let args = Args::try_parse_from([
            "elm-reader",
            "127.0.0.1",
            &port.to_string(),
            "2",
            "--config",
            &config_path,
        ])
        .unwrap();

        run(args).await.unwrap();
        assert_eq!(adapter.await.unwrap(), ["ATZ", "ATE0", "01 0D"]);
    }
}
