//! Line-delimited stdio transport.
//!
//! Each input line is one JSON request, `{"token"?, "query", "variables"?}`;
//! each output line is the matching response body. Requests are served in
//! order until EOF or shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use graphgate_core::json;

use crate::error::Error;
use crate::handler::RequestHandler;

/// Transport metrics for monitoring.
#[derive(Debug)]
pub struct TransportMetrics {
    pub requests_total: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub started_at: Instant,
}

impl TransportMetrics {
    fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    fn record(&self, received_bytes: usize, sent_bytes: usize) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(received_bytes as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(sent_bytes as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }
}

impl Default for TransportMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves requests read line by line from `R`, writing responses to `W`.
pub struct StdioTransport<R, W> {
    reader: R,
    writer: W,
    handler: Arc<RequestHandler>,
    metrics: Arc<TransportMetrics>,
}

impl StdioTransport<tokio::io::BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Transport over the process's stdin and stdout.
    pub fn stdio(handler: Arc<RequestHandler>) -> Self {
        Self::new(
            tokio::io::BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            handler,
        )
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, handler: Arc<RequestHandler>) -> Self {
        Self {
            reader,
            writer,
            handler,
            metrics: Arc::new(TransportMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<TransportMetrics> {
        self.metrics.clone()
    }

    /// Serve until the input ends.
    pub async fn run(self) -> Result<(), Error> {
        let (_tx, rx) = broadcast::channel(1);
        self.run_until_shutdown(rx).await
    }

    /// Serve until the input ends or a shutdown signal arrives.
    ///
    /// A request in flight when the signal arrives is finished first.
    pub async fn run_until_shutdown(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), Error> {
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = tokio::select! {
                read = self.reader.read_until(b'\n', &mut line) => read?,
                _ = shutdown.recv() => {
                    info!("shutdown requested, stopping transport");
                    break;
                }
            };
            if read == 0 {
                debug!("input closed");
                break;
            }

            let request = trim_line(&line);
            if request.is_empty() {
                continue;
            }

            let token = request_token(request);
            let response = self.handler.handle(token.as_deref(), request).await;

            self.writer.write_all(&response).await?;
            self.writer.write_all(b"\n").await?;
            self.writer.flush().await?;

            self.metrics.record(request.len(), response.len() + 1);
        }

        info!(
            requests = self.metrics.total_requests(),
            uptime_secs = self.metrics.uptime().as_secs(),
            "transport stopped"
        );
        Ok(())
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &line[..end]
}

/// The bearer token of a request line, if it carries a string `token`.
fn request_token(request: &[u8]) -> Option<String> {
    let field = json::lookup(request, "token")?;
    match serde_json::from_slice::<String>(field.value.slice(request)) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!(error = %e, "ignoring non-string token");
            None
        }
    }
}
