//! Sensor - publishes synthetic honeypot events to a broker.
//!
//! This example demonstrates:
//! - Loading a `FeedConfig` from a JSON file
//! - Publishing typed channel payloads with `publisher.publish()`
//! - Streaming a captured binary with `publisher.send_file()`
//!
//! # Running
//!
//! ```sh
//! cat > feed.json <<'JSON'
//! { "server": "127.0.0.1", "port": "10000", "ident": "sensor-1", "secret": "s3cret" }
//! JSON
//! RUST_LOG=debug cargo run --example sensor -- feed.json /tmp/sample.bin
//! ```

use std::time::Duration;

use hpfeeds_client::channels::{
    timestamp, CaptureEvent, ConnectionEvent, ConnectionKind, CAPTURE_CHANNEL,
    CONNECTION_CHANNEL,
};
use hpfeeds_client::{FeedConfig, Publisher};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().ok_or("usage: sensor <config.json> [file]")?;
    let sample = args.next();

    let config = FeedConfig::from_json(&std::fs::read_to_string(config_path)?)?;
    let publisher = Publisher::start(config)?;

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    let mut port = 49152u16;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        publisher.publish(
            CONNECTION_CHANNEL,
            &ConnectionEvent {
                connection_type: ConnectionKind::Accept,
                connection_transport: "tcp".into(),
                connection_protocol: "smbd".into(),
                remote_host: "198.51.100.7".into(),
                remote_port: port,
                remote_hostname: String::new(),
                local_host: "192.0.2.10".into(),
                local_port: 445,
            },
        )?;

        if let Some(path) = &sample {
            publisher.publish(
                CAPTURE_CHANNEL,
                &CaptureEvent {
                    time: timestamp(),
                    saddr: "198.51.100.7".into(),
                    sport: port.to_string(),
                    daddr: "192.0.2.10".into(),
                    dport: "445".into(),
                    md5: String::new(),
                    sha512: String::new(),
                    url: format!("file://{path}"),
                },
            )?;
            publisher.send_file(path).await?;
        }

        port = port.wrapping_add(1).max(49152);
        println!("state={:?} stats={:?}", publisher.state(), publisher.stats());
    }

    publisher.shutdown().await?;
    Ok(())
}
