//! Liveness probing for registered applications.
//!
//! Best-effort and outside the trust boundary: any failure to reach an
//! application reads as "not running", never as an error.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use tokio::net::TcpStream;
use tracing::debug;

/// Default per-probe HTTP timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default number of probes in flight at once.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 50;

/// TCP connect budget used by the port scan before it spends an HTTP probe.
pub const SCAN_CONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Short-timeout HTTP prober for `http://{host}:{port}/`.
#[derive(Clone)]
pub struct Prober {
    client: Client,
    host: String,
    concurrency: usize,
}

impl Prober {
    pub fn new(
        host: impl Into<String>,
        timeout: Duration,
        concurrency: usize,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            host: host.into(),
            concurrency: concurrency.max(1),
        })
    }

    /// Probe `localhost` with the default timeout and concurrency.
    pub fn local() -> Result<Self, reqwest::Error> {
        Self::new("localhost", DEFAULT_PROBE_TIMEOUT, DEFAULT_PROBE_CONCURRENCY)
    }

    /// Whether the application on `port` answers `200 OK`.
    pub async fn probe(&self, port: u16) -> bool {
        let url = format!("http://{}:{port}/", self.host);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                debug!(port, error = %e, "probe failed");
                false
            }
        }
    }

    /// Probe many ports with bounded concurrency. Duplicates are probed once.
    pub async fn probe_many(&self, ports: &[u16]) -> HashMap<u16, bool> {
        let unique: BTreeSet<u16> = ports.iter().copied().collect();
        stream::iter(unique)
            .map(|port| async move { (port, self.probe(port).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    /// Scan `start..=end` for ports that accept a TCP connection and answer
    /// the HTTP probe, skipping `exclude`. Returns them sorted.
    pub async fn scan_range(&self, start: u16, end: u16, exclude: &[u16]) -> Vec<u16> {
        let excluded: BTreeSet<u16> = exclude.iter().copied().collect();
        let candidates: Vec<u16> = (start..=end).filter(|p| !excluded.contains(p)).collect();
        debug!(start, end, candidates = candidates.len(), "scanning ports");

        let mut running: Vec<u16> = stream::iter(candidates)
            .map(|port| async move {
                if self.accepts_tcp(port).await && self.probe(port).await {
                    Some(port)
                } else {
                    None
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|found| async move { found })
            .collect()
            .await;
        running.sort_unstable();
        running
    }

    async fn accepts_tcp(&self, port: u16) -> bool {
        let addr = format!("{}:{port}", self.host);
        matches!(
            tokio::time::timeout(SCAN_CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }
}
