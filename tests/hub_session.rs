use std::time::Duration;

use channel_irc::SessionState;
use sensorhub::{app::Hub, config::HubConfig};
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    time::timeout,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hub_connects_relay_and_stops_cleanly() {
    let irc = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dir = TempDir::new().unwrap();
    let config: HubConfig = serde_json::from_value(serde_json::json!({
        "server": irc.local_addr().unwrap().to_string(),
        "nick": "hub",
        "channel": "#sensors",
        "web_addr": "127.0.0.1:0",
        "sensor_log_dir": dir.path().join("logs"),
        "device_patterns": [format!("{}/ttyACM*", dir.path().display())],
    }))
    .unwrap();
    config.validate().unwrap();

    let mut hub = Hub::new();
    hub.bootstrap(config).await.unwrap();

    // The relay waits out its initial backoff before dialing.
    let (stream, _) = timeout(Duration::from_secs(10), irc.accept())
        .await
        .expect("relay never connected")
        .unwrap();
    let mut lines = BufReader::new(stream).lines();
    let first = timeout(Duration::from_secs(2), lines.next_line()).await.unwrap().unwrap();
    assert_eq!(first.as_deref(), Some("NICK hub"));

    timeout(Duration::from_secs(10), hub.shutdown())
        .await
        .expect("shutdown took too long");
    assert_eq!(hub.relay_state(), Some(SessionState::ShuttingDown));
}
