// tests/exporter_tests.rs
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use varnish_backend_exporter::{
    health::{Aggregator, GroupExtractor, GroupingMode, HealthStatus, ListingPolicy},
    metrics::MetricsRegistry,
    poller::{PollSettings, Supervisor, TcpConnector, TokioScheduler},
    server::{MetricsHandler, ServerBuilder},
    varnish::{challenge_response, encode_header, Secret},
};

const SECRET: &str = "0123456789abcdef\n";
const CHALLENGE: &str = "qzvxtfbhcwspjmdlruknoaiygeq";
const LISTING: &str = "Backend name                   Admin      Probe\n\
                       boot.web1_frontend             probe      Healthy 5/5\n\
                       boot.web2_frontend             probe      Sick 0/5\n\
                       boot.api1_backend              healthy    Healthy 5/5\n";

async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, status: u16, body: &str) -> std::io::Result<()> {
    w.write_all(encode_header(status, body.len()).as_bytes()).await?;
    w.write_all(body.as_bytes()).await?;
    w.write_all(b"\n").await
}

/// Accepts connections forever, authenticating each and answering every
/// `backend.list` with the fixed listing.
async fn fake_varnish() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut read = BufReader::new(read);
                let expected = format!("auth {}", challenge_response(CHALLENGE, &Secret::new(SECRET)));

                write_frame(&mut write, 107, &format!("{}\n\nAuthentication required.", CHALLENGE))
                    .await?;
                let mut line = String::new();
                loop {
                    line.clear();
                    if read.read_line(&mut line).await? == 0 {
                        return Ok::<_, std::io::Error>(());
                    }
                    match line.trim_end() {
                        l if l == expected => write_frame(&mut write, 200, "Welcome").await?,
                        "backend.list" => write_frame(&mut write, 200, LISTING).await?,
                        _ => write_frame(&mut write, 101, "Unknown request.").await?,
                    }
                }
            });
        }
    });

    port
}

async fn scrape(addr: std::net::SocketAddr) -> String {
    let client = hyper::Client::new();
    let uri: hyper::Uri = format!("http://{}/metrics", addr).parse().unwrap();
    let response = client.get(uri).await.unwrap();
    assert_eq!(response.status(), hyper::StatusCode::OK);
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_end_to_end_grouped_scrape() {
    let port = fake_varnish().await;

    let grouping = GroupingMode::Enabled(GroupExtractor::new(r".*_([^_]+)$").unwrap());
    let registry = Arc::new(MetricsRegistry::new(&grouping).unwrap());
    let collector = registry.collector();

    let (metrics_addr, _server) = ServerBuilder::new("127.0.0.1:0".parse().unwrap())
        .with_handler(MetricsHandler::new(registry, "/metrics"))
        .spawn()
        .await
        .unwrap();

    let supervisor = Arc::new(Supervisor::new(
        TcpConnector::new(([127, 0, 0, 1], port).into()),
        TokioScheduler,
        Secret::new(SECRET),
        Aggregator::new(grouping, ListingPolicy::Lenient),
        collector.clone(),
        PollSettings {
            interval: Duration::from_millis(20),
            reset_on_scan: true,
            reconnect_delay: Duration::from_millis(20),
        },
    ));
    let poller = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run().await })
    };

    tokio::time::timeout(Duration::from_secs(10), async {
        while collector.value(HealthStatus::Healthy, Some("frontend")).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no snapshot published");

    assert_eq!(collector.value(HealthStatus::Healthy, Some("frontend")), Some(1));
    assert_eq!(collector.value(HealthStatus::Sick, Some("frontend")), Some(1));
    assert_eq!(collector.value(HealthStatus::Healthy, Some("backend")), Some(1));
    assert_eq!(collector.value(HealthStatus::Sick, Some("backend")), Some(0));

    let text = scrape(metrics_addr).await;
    let samples: Vec<&str> = text
        .lines()
        .filter(|line| line.starts_with("varnish_backend_state{"))
        .collect();
    assert_eq!(samples.len(), 4);
    assert!(samples
        .iter()
        .any(|l| l.contains("director=\"backend\"") && l.contains("state=\"sick\"") && l.ends_with(" 0")));

    supervisor.shutdown();
    poller.await.unwrap();
}

#[tokio::test]
async fn test_refused_connections_keep_poller_running() {
    // reserve a port, then free it so the first attempts are refused
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let registry = MetricsRegistry::new(&GroupingMode::Disabled).unwrap();
    let collector = registry.collector();
    let supervisor = Arc::new(Supervisor::new(
        TcpConnector::new(([127, 0, 0, 1], port).into()),
        TokioScheduler,
        Secret::new(SECRET),
        Aggregator::new(GroupingMode::Disabled, ListingPolicy::Lenient),
        collector.clone(),
        PollSettings {
            interval: Duration::from_millis(20),
            reset_on_scan: false,
            reconnect_delay: Duration::from_millis(20),
        },
    ));
    let poller = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(collector.current().is_empty());
    assert!(!poller.is_finished());

    supervisor.shutdown();
    poller.await.unwrap();
}
