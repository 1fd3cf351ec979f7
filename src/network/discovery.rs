//! Peer Discovery
//!
//! Pulls candidate hosts from a discovery service and introduces a sample
//! of them to a node with AddPeer requests.
//!
//! The service answers `GET /` with `{"hosts": ["a.b.c.d", ...]}`.

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};

use super::NodeClient;
use crate::error::{Error, Result};
use crate::protocol::{parse_ipv4, PeerAddress};

/// Default discovery endpoint
pub const DEFAULT_DISCOVERY_URL: &str = "http://discover.cauchyledger.io/";

/// Well-known port nodes listen on for peer connections
pub const DEFAULT_PEER_PORT: u16 = 8332;

/// Body returned by the discovery service
#[derive(Debug, Deserialize)]
struct HostList {
    #[serde(default)]
    hosts: Vec<String>,
}

/// Something that can list candidate peer hosts
#[async_trait]
pub trait HostSource: Send + Sync {
    /// Fetch the current host list
    async fn hosts(&self) -> Result<Vec<Ipv4Addr>>;
}

/// Discovery service reached over HTTP
pub struct HttpHostSource {
    url: String,
    client: reqwest::Client,
}

impl HttpHostSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HostSource for HttpHostSource {
    async fn hosts(&self) -> Result<Vec<Ipv4Addr>> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(Error::Discovery(format!(
                "{} answered {}",
                self.url,
                response.status()
            )));
        }

        let body = response.bytes().await?;
        parse_host_list(&body)
    }
}

/// Fixed list of hosts
#[derive(Debug, Clone, Default)]
pub struct StaticHostSource {
    hosts: Vec<Ipv4Addr>,
}

impl StaticHostSource {
    pub fn new(hosts: Vec<Ipv4Addr>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl HostSource for StaticHostSource {
    async fn hosts(&self) -> Result<Vec<Ipv4Addr>> {
        Ok(self.hosts.clone())
    }
}

/// Parse a discovery response body, skipping entries that are not IPv4
pub fn parse_host_list(body: &[u8]) -> Result<Vec<Ipv4Addr>> {
    let list: HostList = serde_json::from_slice(body)
        .map_err(|e| Error::Discovery(format!("malformed host list: {}", e)))?;

    let hosts = list
        .hosts
        .iter()
        .filter_map(|host| match parse_ipv4(host) {
            Ok(ip) => Some(ip),
            Err(e) => {
                tracing::warn!("Skipping discovered host: {}", e);
                None
            }
        })
        .collect();

    Ok(hosts)
}

/// Pick `k` hosts uniformly, with replacement
pub fn sample_hosts<R: Rng + ?Sized>(
    hosts: &[Ipv4Addr],
    k: usize,
    rng: &mut R,
) -> Result<Vec<Ipv4Addr>> {
    if k == 0 {
        return Ok(Vec::new());
    }
    if hosts.is_empty() {
        return Err(Error::Discovery("no hosts to choose from".into()));
    }

    Ok((0..k)
        .filter_map(|_| hosts.choose(&mut *rng).copied())
        .collect())
}

/// Result of introducing one peer
#[derive(Debug)]
pub struct PeerOutcome {
    pub peer: PeerAddress,
    pub result: Result<()>,
}

impl PeerOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Sample `k` hosts from `source` and send AddPeer for each on `port`.
///
/// A node that rejects a peer leaves the connection usable, so rejections
/// are recorded and the walk continues. Any other failure ends it, including
/// a status byte the protocol does not define.
pub async fn discover_peers<S, H>(
    client: &mut NodeClient<S>,
    source: &H,
    k: usize,
    port: u16,
) -> Result<Vec<PeerOutcome>>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: HostSource + ?Sized,
{
    let hosts = source.hosts().await?;
    tracing::info!("Found {} potential hosts", hosts.len());

    let chosen = sample_hosts(&hosts, k, &mut rand::thread_rng())?;
    let mut outcomes = Vec::with_capacity(chosen.len());

    for ip in chosen {
        let peer = PeerAddress::new(ip, port);
        match client.add_peer(peer).await {
            Err(e) if !e.is_rejected() => return Err(e),
            result => outcomes.push(PeerOutcome { peer, result }),
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Timeouts;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_host_list() {
        let body = br#"{"hosts": ["10.0.0.1", "not-an-ip", "192.168.0.7", "1.2.3"]}"#;
        let hosts = parse_host_list(body).unwrap();
        assert_eq!(hosts, vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(192, 168, 0, 7)]);

        assert!(parse_host_list(b"{}").unwrap().is_empty());
        assert!(matches!(parse_host_list(b"<html>"), Err(Error::Discovery(_))));
    }

    #[test]
    fn test_sample_with_replacement() {
        let hosts = vec![Ipv4Addr::new(10, 0, 0, 1)];
        let mut rng = StdRng::seed_from_u64(7);

        // More picks than hosts is fine when sampling with replacement
        let chosen = sample_hosts(&hosts, 5, &mut rng).unwrap();
        assert_eq!(chosen, vec![Ipv4Addr::new(10, 0, 0, 1); 5]);
    }

    #[test]
    fn test_sample_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sample_hosts(&[], 0, &mut rng).unwrap().is_empty());
        assert!(matches!(sample_hosts(&[], 3, &mut rng), Err(Error::Discovery(_))));

        let hosts: Vec<Ipv4Addr> = (1..=4).map(|i| Ipv4Addr::new(10, 0, 0, i)).collect();
        let chosen = sample_hosts(&hosts, 100, &mut rng).unwrap();
        assert_eq!(chosen.len(), 100);
        assert!(chosen.iter().all(|ip| hosts.contains(ip)));
    }

    #[tokio::test]
    async fn test_http_host_source() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();

            let body = r#"{"hosts": ["10.1.1.1", "10.1.1.2"]}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        let source = HttpHostSource::new(url, Duration::from_secs(5)).unwrap();
        let hosts = source.hosts().await.unwrap();
        server.await.unwrap();

        assert_eq!(hosts, vec![Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::new(10, 1, 1, 2)]);
    }

    #[tokio::test]
    async fn test_discover_peers_sends_add_peer_per_pick() {
        let (client_side, mut node_side) = tokio::io::duplex(256);

        // Accept the first peer, reject the second
        let node = tokio::spawn(async move {
            let mut seen = Vec::new();
            for status in [0x00u8, 0x01] {
                let mut request = [0u8; 7];
                node_side.read_exact(&mut request).await.unwrap();
                seen.push(request);
                node_side.write_all(&[status]).await.unwrap();
            }
            seen
        });

        let source = StaticHostSource::new(vec![Ipv4Addr::new(172, 16, 0, 9)]);
        let mut client = NodeClient::from_stream(client_side, "duplex", Timeouts::default());
        let outcomes = discover_peers(&mut client, &source, 2, DEFAULT_PEER_PORT)
            .await
            .unwrap();

        let seen = node.await.unwrap();
        assert_eq!(seen[0], [0x00, 172, 16, 0, 9, 0x20, 0x8c]);
        assert_eq!(seen[0], seen[1]);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1].result, Err(Error::Rejected { .. })));
        assert_eq!(outcomes[1].peer.to_string(), "172.16.0.9:8332");
    }

    #[tokio::test]
    async fn test_discover_peers_stops_on_unknown_status() {
        let (client_side, mut node_side) = tokio::io::duplex(256);

        // Garbage first, then answers that must never be asked for
        let node = tokio::spawn(async move {
            let mut request = [0u8; 7];
            node_side.read_exact(&mut request).await.unwrap();
            node_side.write_all(&[0x05, 0x00, 0x00]).await.unwrap();

            let mut rest = Vec::new();
            node_side.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let source = StaticHostSource::new(vec![Ipv4Addr::new(10, 0, 0, 1)]);
        let mut client = NodeClient::from_stream(client_side, "duplex", Timeouts::default());
        let result = discover_peers(&mut client, &source, 3, DEFAULT_PEER_PORT).await;

        match result {
            Err(e) => assert!(e.is_protocol()),
            Ok(outcomes) => panic!("expected protocol error, got {:?}", outcomes),
        }
        assert!(client.is_poisoned());

        drop(client);
        let sent_after_garbage = node.await.unwrap();
        assert!(sent_after_garbage.is_empty());
    }

    #[tokio::test]
    async fn test_discover_peers_stops_on_closed_connection() {
        let (client_side, node_side) = tokio::io::duplex(256);
        drop(node_side);

        let source = StaticHostSource::new(vec![Ipv4Addr::new(10, 0, 0, 1)]);
        let mut client = NodeClient::from_stream(client_side, "duplex", Timeouts::default());
        let result = discover_peers(&mut client, &source, 3, DEFAULT_PEER_PORT).await;
        assert!(result.is_err());
    }
}
