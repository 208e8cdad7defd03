use super::error::TransportError;
use crate::endpoint::Selection;

/// Construction parameters of an [`S3ObjectTransport`](super::S3ObjectTransport)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    pub bucket: String,
    pub region: String,
    /// Host (optionally `host:port`) replacing the AWS endpoint
    pub endpoint: Option<String>,
    /// Address the bucket in the path instead of the host name
    pub path_style: bool,
    /// Maximum concurrent connections; must be greater than zero
    pub max_connections: usize,
    /// Handed to the client, which aborts slower exchanges (0 disables)
    pub min_throughput_bytes_per_second: u64,
    /// Upper bound on warmed endpoints
    pub dns_cache_cap: usize,
    pub content_type: String,
    pub selection: Selection,
}

impl TransportOptions {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            endpoint: None,
            path_style: false,
            max_connections: 64,
            min_throughput_bytes_per_second: 0,
            dns_cache_cap: 32,
            content_type: "text/plain".to_string(),
            selection: Selection::RoundRobin,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_path_style(mut self, path_style: bool) -> Self {
        self.path_style = path_style;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_min_throughput(mut self, bytes_per_second: u64) -> Self {
        self.min_throughput_bytes_per_second = bytes_per_second;
        self
    }

    pub fn with_dns_cache_cap(mut self, cap: usize) -> Self {
        self.dns_cache_cap = cap;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Logical endpoint: the Host every request carries
    pub fn host(&self) -> String {
        match (&self.endpoint, self.path_style) {
            (Some(endpoint), _) => endpoint.trim_end_matches('/').to_string(),
            (None, true) => format!("s3.{}.amazonaws.com", self.region),
            (None, false) => format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.max_connections == 0 {
            return Err(TransportError::ZeroConnections);
        }
        if self.region.is_empty() && self.endpoint.is_none() {
            return Err(TransportError::InvalidBucket(format!(
                "{} (no region or endpoint)",
                self.bucket
            )));
        }
        validate_bucket(&self.bucket, self.path_style)
    }
}

/// Bucket names end up in the Host header unless path-style addressing is
/// used, so virtual-hosted buckets must be DNS labels.
fn validate_bucket(bucket: &str, path_style: bool) -> Result<(), TransportError> {
    let invalid = || TransportError::InvalidBucket(bucket.to_string());

    if bucket.is_empty() || bucket.len() > 255 {
        return Err(invalid());
    }
    if bucket.bytes().any(|b| b == b'/' || b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(invalid());
    }
    if path_style {
        return Ok(());
    }

    let dns_compatible = (3..=63).contains(&bucket.len())
        && bucket
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.'))
        && bucket.starts_with(|c: char| c.is_ascii_alphanumeric())
        && bucket.ends_with(|c: char| c.is_ascii_alphanumeric())
        && !bucket.contains("..");
    if dns_compatible {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Host name without an optional port, for DNS lookups
pub(crate) fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
