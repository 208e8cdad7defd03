//! Hyper-based meta-request client
//!
//! Optimized with:
//! - One hyper connection pool per resolved endpoint, pinned to that IP
//!   (TLS SNI and Host stay the bucket hostname)
//! - A semaphore of `max_connections` permits: requests wait in Queued until
//!   a permit frees up
//! - TCP_NODELAY and keepalive on every connection
//! - Streaming bodies in both directions; downloads are written chunk by chunk
//!   so a slow sink throttles the socket read
//! - Automatic retry with jitter for 429/503 and connect failures when the
//!   request body can be replayed

use super::meta_request::{
    MetaRequest, MetaRequestClient, MetaRequestContext, MetaRequestError, MetaRequestFuture,
    MetaRequestResult, MetaRequestType,
};
use super::throughput::ThroughputMonitor;
use crate::transfer::{InputStream, OutputSink};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::StreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::ETAG;
use hyper::{Request, Response, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::dns::Name;
use hyper_util::client::legacy::connect::{HttpConnector, HttpInfo};
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use native_tls::TlsConnector;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

type RequestBody = UnsyncBoxBody<Bytes, io::Error>;
type Connector = HttpsConnector<HttpConnector<PinnedResolver>>;
type PooledClient = HyperClient<Connector, RequestBody>;

/// Error responses are read up to this size for the failure message
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Errors building the client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// URL scheme used to reach the storage service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(format!("unknown scheme: {}", other)),
        }
    }
}

/// Configuration for the pooled client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub scheme: Scheme,
    /// Maximum concurrent exchanges across all endpoints
    pub max_connections: usize,
    /// Abort exchanges slower than this over a full window (0 disables)
    pub min_throughput_bytes_per_second: u64,
    pub throughput_window: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub max_retries: u32,
    /// Disable certificate verification
    pub insecure_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::Https,
            max_connections: 64,
            min_throughput_bytes_per_second: 0,
            throughput_window: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
            pool_idle_timeout: Duration::from_secs(90),
            max_retries: 3,
            insecure_tls: false,
        }
    }
}

/// Counters across all meta-requests handled by a client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
    pub bytes: u64,
    /// Endpoint pools created (one per distinct address, plus on-demand)
    pub pools: usize,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    bytes: AtomicU64,
}

/// Resolver that pins every connection of a pool to one address, or falls
/// back to system resolution when no address is given
#[derive(Debug, Clone, Copy)]
struct PinnedResolver {
    addr: Option<IpAddr>,
}

impl tower::Service<Name> for PinnedResolver {
    type Response = std::vec::IntoIter<SocketAddr>;
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, name: Name) -> Self::Future {
        let pinned = self.addr;
        Box::pin(async move {
            match pinned {
                // Port is replaced by the connector with the URI port
                Some(ip) => Ok(vec![SocketAddr::new(ip, 0)].into_iter()),
                None => {
                    let addrs: Vec<SocketAddr> =
                        tokio::net::lookup_host((name.as_str(), 0)).await?.collect();
                    Ok(addrs.into_iter())
                }
            }
        })
    }
}

struct ClientInner {
    config: ClientConfig,
    tls: TlsConnector,
    pools: RwLock<HashMap<Option<IpAddr>, PooledClient>>,
    permits: Arc<Semaphore>,
    counters: Counters,
}

/// Pooled meta-request client built on hyper
///
/// Clone is cheap - clones share pools, permits, and counters.
#[derive(Clone)]
pub struct HyperMetaRequestClient {
    inner: Arc<ClientInner>,
    runtime: Handle,
}

impl HyperMetaRequestClient {
    /// Create a client bound to the current tokio runtime
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Self::with_runtime(config, Handle::try_current()?)
    }

    pub fn with_runtime(config: ClientConfig, runtime: Handle) -> Result<Self, ClientError> {
        let tls = if config.insecure_tls {
            warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?
        } else {
            TlsConnector::new()?
        };

        let permits = Arc::new(Semaphore::new(config.max_connections.max(1)));

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                tls,
                pools: RwLock::new(HashMap::new()),
                permits,
                counters: Counters::default(),
            }),
            runtime,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Permits currently free for new exchanges
    pub fn available_connections(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub async fn stats(&self) -> ClientStats {
        let counters = &self.inner.counters;
        ClientStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            retries: counters.retries.load(Ordering::Relaxed),
            bytes: counters.bytes.load(Ordering::Relaxed),
            pools: self.inner.pools.read().await.len(),
        }
    }
}

impl MetaRequestClient for HyperMetaRequestClient {
    fn make_meta_request(&self, meta_request: MetaRequest) -> MetaRequestFuture {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
            let result = inner.execute(meta_request).await;
            match &result {
                Ok(done) => {
                    inner.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    inner.counters.bytes.fetch_add(done.bytes, Ordering::Relaxed);
                }
                Err(_) => {
                    inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            result
        })
    }

    fn runtime(&self) -> Handle {
        self.runtime.clone()
    }
}

impl ClientInner {
    /// Get the pool for `endpoint`, creating it on first use
    async fn pool_for(&self, endpoint: Option<IpAddr>) -> PooledClient {
        if let Some(client) = self.pools.read().await.get(&endpoint) {
            return client.clone();
        }

        let mut pools = self.pools.write().await;
        pools
            .entry(endpoint)
            .or_insert_with(|| {
                info!(
                    backend = %endpoint.map(|ip| ip.to_string()).unwrap_or_else(|| "on-demand".to_string()),
                    "Creating endpoint connection pool"
                );
                self.build_pool(endpoint)
            })
            .clone()
    }

    fn build_pool(&self, endpoint: Option<IpAddr>) -> PooledClient {
        let mut http = HttpConnector::new_with_resolver(PinnedResolver { addr: endpoint });
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(self.config.connect_timeout));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let https = HttpsConnector::from((http, self.tls.clone().into()));

        HyperClient::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(self.config.pool_idle_timeout)
            .pool_max_idle_per_host(self.config.max_connections)
            .set_host(true)
            .build(https)
    }

    async fn execute(&self, meta_request: MetaRequest) -> Result<MetaRequestResult, MetaRequestError> {
        let MetaRequest {
            kind,
            mut request,
            endpoint,
            mut sink,
            context,
        } = meta_request;

        let host = request
            .header("host")
            .ok_or_else(|| MetaRequestError::InvalidRequest("request has no Host header".to_string()))?
            .to_string();
        let uri: Uri = format!(
            "{}://{}{}",
            self.config.scheme,
            host,
            request.path_and_query()
        )
        .parse()
        .map_err(|e| MetaRequestError::InvalidRequest(format!("invalid URI: {}", e)))?;

        let mut body = request.take_body();
        let replay = body.as_ref().and_then(|b| b.replayable().cloned());
        let max_attempts = if body.is_none() || replay.is_some() {
            self.config.max_retries + 1
        } else {
            1
        };

        let client = self.pool_for(endpoint).await;

        // Queued until a connection permit is available
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| MetaRequestError::InvalidRequest("client is shut down".to_string()))?;
        context.mark_in_flight();

        debug!(
            id = context.id(),
            kind = %kind,
            uri = %uri,
            backend = ?endpoint,
            "Meta-request in flight"
        );

        let mut attempt = 0;
        loop {
            let failure = Arc::new(Mutex::new(None));
            let request_body = match (&replay, body.take()) {
                (Some(bytes), _) => Full::new(bytes.clone())
                    .map_err(|never| match never {})
                    .boxed_unsync(),
                (None, Some(stream)) => self.streaming_body(stream, context.clone(), Arc::clone(&failure)),
                (None, None) => Empty::<Bytes>::new()
                    .map_err(|never| match never {})
                    .boxed_unsync(),
            };

            let mut builder = Request::builder().method(request.method().clone()).uri(uri.clone());
            for (name, value) in request.headers() {
                builder = builder.header(name, value);
            }
            let hyper_request = builder
                .body(request_body)
                .map_err(|e| MetaRequestError::InvalidRequest(format!("Request build error: {}", e)))?;

            let mut delivered = 0u64;
            let exchange = self.exchange(
                &client,
                hyper_request,
                kind,
                sink.as_mut(),
                &context,
                &failure,
                &mut delivered,
            );
            let result = match tokio::time::timeout(self.config.request_timeout, exchange).await {
                Ok(result) => result,
                Err(_) => Err(MetaRequestError::Timeout(self.config.request_timeout)),
            };

            match result {
                Ok(mut done) => {
                    if let (MetaRequestType::Put, Some(bytes)) = (kind, &replay) {
                        context.record_progress(bytes.len() as u64);
                        done.bytes = bytes.len() as u64;
                    }
                    return Ok(done);
                }
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() || delivered > 0 || attempt >= max_attempts {
                        return Err(e);
                    }

                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    let base_ms = 100u64 * (1 << attempt.min(6));
                    let jitter = rand::thread_rng().gen_range(0..=base_ms / 5);
                    warn!(
                        id = context.id(),
                        attempt = attempt,
                        backoff_ms = base_ms + jitter,
                        error = %e,
                        "Retrying meta-request after transient error"
                    );
                    tokio::time::sleep(Duration::from_millis(base_ms + jitter)).await;
                }
            }
        }
    }

    /// Upload body that reports progress and enforces the throughput floor
    fn streaming_body(
        &self,
        stream: InputStream,
        context: MetaRequestContext,
        failure: Arc<Mutex<Option<MetaRequestError>>>,
    ) -> RequestBody {
        let mut monitor = ThroughputMonitor::new(
            self.config.min_throughput_bytes_per_second,
            self.config.throughput_window,
        );
        let chunks = ReaderStream::with_capacity(stream.into_reader(), 256 * 1024).map(move |chunk| {
            let chunk = chunk?;
            context.record_progress(chunk.len() as u64);
            if let Err(e) = monitor.record(chunk.len() as u64, Instant::now()) {
                let message = e.to_string();
                *failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
                return Err(io::Error::new(io::ErrorKind::Other, message));
            }
            Ok(Frame::data(chunk))
        });
        StreamBody::new(chunks).boxed_unsync()
    }

    /// One request/response exchange
    #[allow(clippy::too_many_arguments)]
    async fn exchange(
        &self,
        client: &PooledClient,
        request: Request<RequestBody>,
        kind: MetaRequestType,
        sink: Option<&mut OutputSink>,
        context: &MetaRequestContext,
        failure: &Mutex<Option<MetaRequestError>>,
        delivered: &mut u64,
    ) -> Result<MetaRequestResult, MetaRequestError> {
        let response = match client.request(request).await {
            Ok(response) => response,
            Err(e) => {
                if let Some(cause) = failure.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    return Err(cause);
                }
                return Err(if e.is_connect() {
                    MetaRequestError::Connect(e.to_string())
                } else {
                    MetaRequestError::Io(format!("Request failed: {}", e))
                });
            }
        };

        let status = response.status();
        let remote_addr = response
            .extensions()
            .get::<HttpInfo>()
            .map(|info| info.remote_addr());
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        if !status.is_success() {
            let message = match Limited::new(response.into_body(), MAX_ERROR_BODY)
                .collect()
                .await
            {
                Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).to_string(),
                Err(e) if e.is::<LengthLimitError>() => {
                    format!("error body larger than {} bytes", MAX_ERROR_BODY)
                }
                Err(e) => return Err(MetaRequestError::Body(e.to_string())),
            };
            return Err(MetaRequestError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = match (kind, sink) {
            (MetaRequestType::Get, Some(sink)) => {
                self.stream_to_sink(response, sink, context, delivered).await?
            }
            _ => {
                // Drain body to return connection to pool
                response
                    .collect()
                    .await
                    .map_err(|e| MetaRequestError::Body(e.to_string()))?;
                0
            }
        };

        Ok(MetaRequestResult {
            status: status.as_u16(),
            bytes,
            remote_addr,
            etag,
        })
    }

    async fn stream_to_sink(
        &self,
        response: Response<Incoming>,
        sink: &mut OutputSink,
        context: &MetaRequestContext,
        delivered: &mut u64,
    ) -> Result<u64, MetaRequestError> {
        let mut monitor = ThroughputMonitor::new(
            self.config.min_throughput_bytes_per_second,
            self.config.throughput_window,
        );
        let mut body = response.into_body();

        loop {
            let frame = match monitor.stall_timeout() {
                Some(window) => match tokio::time::timeout(window, body.frame()).await {
                    Ok(frame) => frame,
                    Err(_) => {
                        monitor.record(0, Instant::now())?;
                        continue;
                    }
                },
                None => body.frame().await,
            };

            let Some(frame) = frame else { break };
            let frame = frame.map_err(|e| MetaRequestError::Body(e.to_string()))?;
            if let Some(chunk) = frame.data_ref() {
                sink.write_chunk(chunk).await?;
                let len = chunk.len() as u64;
                *delivered += len;
                context.record_progress(len);
                monitor.record(len, Instant::now())?;
            }
        }

        sink.finish().await?;
        Ok(*delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::Service;

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("https".parse::<Scheme>(), Ok(Scheme::Https));
        assert_eq!("HTTP".parse::<Scheme>(), Ok(Scheme::Http));
        assert!("ftp".parse::<Scheme>().is_err());
        assert_eq!(Scheme::Https.default_port(), 443);
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.scheme, Scheme::Https);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.min_throughput_bytes_per_second, 0);
    }

    #[tokio::test]
    async fn test_pinned_resolver_returns_pinned_addr() {
        let ip: IpAddr = "10.1.2.3".parse().unwrap();
        let mut resolver = PinnedResolver { addr: Some(ip) };
        let name: Name = "bench-bucket.s3.us-east-1.amazonaws.com".parse().unwrap();
        let addrs: Vec<SocketAddr> = resolver.call(name).await.unwrap().collect();
        assert_eq!(addrs, vec![SocketAddr::new(ip, 0)]);
    }

    #[tokio::test]
    async fn test_client_starts_empty() {
        let client = HyperMetaRequestClient::new(ClientConfig {
            max_connections: 4,
            ..ClientConfig::default()
        })
        .unwrap();
        assert_eq!(client.available_connections(), 4);
        assert_eq!(client.stats().await, ClientStats::default());
    }
}
