use super::addressing::{object_path, push_download_part_query, push_upload_part_query};
use super::error::TransportError;
use super::handle::{CompletionGuard, MetaRequestHandle};
use super::options::{strip_port, TransportOptions};
use crate::auth::{AwsSigningConfig, HttpRequestSigner, SignedBodyValue, SigningConfig};
use crate::client::{
    MetaRequest, MetaRequestClient, MetaRequestContext, MetaRequestState, MetaRequestType,
};
use crate::endpoint::{EndpointMonitor, EndpointOutcome, EndpointPool, Resolve, WarmReport};
use crate::request::HttpRequest;
use crate::transfer::{OutputSink, TransferError, TransferState};
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, HOST, RANGE};
use hyper::Method;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Authenticated PUT/GET transport for one bucket.
///
/// Builds storage requests for transfers, signs them, and hands them to a
/// pooled [`MetaRequestClient`]. Every accepted call ends with exactly one
/// terminal status on the transfer.
pub struct S3ObjectTransport {
    options: TransportOptions,
    host: String,
    host_header: HeaderValue,
    content_type: HeaderValue,
    signer: Arc<dyn HttpRequestSigner>,
    client: Arc<dyn MetaRequestClient>,
    resolver: Arc<dyn Resolve>,
    pool: EndpointPool,
    /// Requests with a body are signed with `UNSIGNED-PAYLOAD`
    body_signing_config: Arc<SigningConfig>,
    empty_signing_config: Arc<SigningConfig>,
    monitor: Option<Arc<dyn EndpointMonitor>>,
    next_meta_request_id: AtomicU64,
}

impl S3ObjectTransport {
    /// Validate the options and resolve the bucket host.
    ///
    /// Fails when the host resolves to no address, so a constructed transport
    /// always has at least one endpoint.
    pub async fn new(
        options: TransportOptions,
        signer: Arc<dyn HttpRequestSigner>,
        client: Arc<dyn MetaRequestClient>,
        resolver: Arc<dyn Resolve>,
    ) -> Result<Self, TransportError> {
        options.validate()?;
        if !signer.is_valid() {
            return Err(TransportError::InvalidSigner);
        }

        let host = options.host();
        let host_header = HeaderValue::from_str(&host)
            .map_err(|_| TransportError::InvalidBucket(options.bucket.clone()))?;
        let content_type = HeaderValue::from_str(&options.content_type)
            .map_err(|_| TransportError::InvalidContentType(options.content_type.clone()))?;

        let lookup_host = strip_port(&host).to_string();
        let addrs = resolver
            .resolve(&lookup_host)
            .await
            .map_err(|source| TransportError::Resolve {
                host: lookup_host.clone(),
                source,
            })?;
        if addrs.is_empty() {
            return Err(TransportError::NoEndpoints(lookup_host));
        }

        let pool = EndpointPool::new(lookup_host, options.dns_cache_cap, options.selection);
        pool.replace(&addrs);

        let signing = AwsSigningConfig::s3(options.region.clone());
        let body_signing_config = Arc::new(SigningConfig::from(
            signing.clone().with_signed_body(SignedBodyValue::UnsignedPayload),
        ));
        let empty_signing_config =
            Arc::new(SigningConfig::from(signing.with_signed_body(SignedBodyValue::Empty)));

        info!(
            bucket = %options.bucket,
            endpoint = %host,
            endpoints = pool.len(),
            max_connections = options.max_connections,
            "S3 object transport ready"
        );

        Ok(Self {
            options,
            host,
            host_header,
            content_type,
            signer,
            client,
            resolver,
            pool,
            body_signing_config,
            empty_signing_config,
            monitor: None,
            next_meta_request_id: AtomicU64::new(1),
        })
    }

    /// Attach a hook that receives every meta-request outcome
    pub fn with_endpoint_monitor(mut self, monitor: Arc<dyn EndpointMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn endpoint_monitor(&self) -> Option<&Arc<dyn EndpointMonitor>> {
        self.monitor.as_ref()
    }

    /// Logical endpoint of the bucket
    pub fn endpoint(&self) -> &str {
        &self.host
    }

    pub fn bucket(&self) -> &str {
        &self.options.bucket
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    pub fn endpoint_pool(&self) -> &EndpointPool {
        &self.pool
    }

    /// Grow the endpoint pool for `num_transfers` concurrent transfers
    pub async fn warm_dns_cache(&self, num_transfers: usize) -> WarmReport {
        self.pool.warm(self.resolver.as_ref(), num_transfers).await
    }

    /// Upload the body attached to `transfer` as `key` (or as a part of it)
    pub fn put_object(
        &self,
        transfer: &Arc<TransferState>,
        key: &str,
    ) -> Result<MetaRequestHandle, TransportError> {
        let attempt = transfer
            .begin(key)
            .ok_or(TransportError::TransferBusy(transfer.id()))?;

        let Some(body) = transfer.take_body() else {
            return Err(Self::fail_build(transfer, attempt, TransferError::MissingBody));
        };

        let mut path = object_path(&self.options.bucket, key, self.options.path_style);
        if let Some(part) = transfer.part() {
            let Some(upload_id) = part.upload_id.as_deref() else {
                return Err(Self::fail_build(
                    transfer,
                    attempt,
                    TransferError::MissingUploadId(part.part_number),
                ));
            };
            push_upload_part_query(&mut path, part.part_number, upload_id);
        }

        let mut request = self.base_request(Method::PUT, path);
        request.set_body(body);
        if let Err(e) = Self::add_content_length_header(&mut request) {
            return Err(Self::fail_build(transfer, attempt, e));
        }

        Ok(self.send_meta_request(transfer, attempt, key, MetaRequestType::Put, request, None))
    }

    /// Download `key` (or a part or range of it) into the transfer's sink
    pub fn get_object(
        &self,
        transfer: &Arc<TransferState>,
        key: &str,
    ) -> Result<MetaRequestHandle, TransportError> {
        let attempt = transfer
            .begin(key)
            .ok_or(TransportError::TransferBusy(transfer.id()))?;

        if let Some(range) = transfer.range().filter(|range| range.is_empty()) {
            return Err(Self::fail_build(
                transfer,
                attempt,
                TransferError::InvalidRange {
                    start: range.start,
                    end: range.end,
                },
            ));
        }

        let Some(sink) = transfer.take_sink() else {
            return Err(Self::fail_build(transfer, attempt, TransferError::MissingSink));
        };

        let mut path = object_path(&self.options.bucket, key, self.options.path_style);
        if let Some(part) = transfer.part() {
            push_download_part_query(&mut path, part);
        }

        let mut request = self.base_request(Method::GET, path);
        if let Some(range) = transfer.range() {
            // Range values are ASCII digits and separators
            if let Ok(value) = HeaderValue::from_str(&range.to_header()) {
                request.insert_header(RANGE, value);
            }
        }

        Ok(self.send_meta_request(
            transfer,
            attempt,
            key,
            MetaRequestType::Get,
            request,
            Some(sink),
        ))
    }

    fn base_request(&self, method: Method, path: String) -> HttpRequest {
        let mut request = HttpRequest::new(method, path);
        request.insert_header(HOST, self.host_header.clone());
        request.insert_header(CONTENT_TYPE, self.content_type.clone());
        request
    }

    /// Content-Length from the body's declared length; nothing without a body
    fn add_content_length_header(request: &mut HttpRequest) -> Result<(), TransferError> {
        let Some(body) = request.body() else {
            return Ok(());
        };
        let length = body.length().ok_or(TransferError::IndeterminateLength)?;
        request.insert_header(CONTENT_LENGTH, HeaderValue::from(length));
        Ok(())
    }

    fn signing_config_for(&self, request: &HttpRequest) -> Arc<SigningConfig> {
        if request.has_body() {
            Arc::clone(&self.body_signing_config)
        } else {
            Arc::clone(&self.empty_signing_config)
        }
    }

    fn fail_build(transfer: &TransferState, attempt: u64, error: TransferError) -> TransportError {
        warn!(transfer = transfer.id(), code = error.code(), error = %error, "Request build failed");
        transfer.complete(attempt, Err(error.clone()));
        TransportError::Request(error)
    }

    fn send_meta_request(
        &self,
        transfer: &Arc<TransferState>,
        attempt: u64,
        key: &str,
        kind: MetaRequestType,
        request: HttpRequest,
        sink: Option<OutputSink>,
    ) -> MetaRequestHandle {
        let id = self.next_meta_request_id.fetch_add(1, Ordering::Relaxed);
        let context = MetaRequestContext::new(id, attempt, Arc::clone(transfer));

        let lease = self.pool.select().map(|endpoint| endpoint.acquire());
        let endpoint = lease.as_ref().map(|lease| lease.endpoint().addr);

        context.set_phase(MetaRequestState::Signing);
        let config = self.signing_config_for(&request);
        let signing = self.signer.sign_request(request, config);

        let client = Arc::clone(&self.client);
        let monitor = self.monitor.clone();
        let key = key.to_string();

        debug!(
            id = id,
            kind = %kind,
            key = %key,
            backend = ?endpoint,
            "Meta-request built"
        );

        // Created before spawning so an abort before the first poll still
        // records Cancelled
        let guard = CompletionGuard::new(context.clone());
        let task = async move {
            let _guard = guard;

            let request = match signing.await {
                Ok(request) => request,
                Err(e) => {
                    warn!(id = id, key = %key, code = e.code(), error = %e, "Signing failed");
                    let error = TransferError::from(e);
                    context.complete(Err(error.clone()));
                    return Err(error);
                }
            };

            context.set_phase(MetaRequestState::Queued);
            let started = Instant::now();
            let result = client
                .make_meta_request(MetaRequest {
                    kind,
                    request,
                    endpoint,
                    sink,
                    context: context.clone(),
                })
                .await;
            let latency = started.elapsed();

            if let Some(lease) = &lease {
                match &result {
                    Ok(_) => lease.endpoint().record_success(),
                    Err(_) => lease.endpoint().record_failure(),
                }
            }
            drop(lease);

            if let Some(monitor) = &monitor {
                monitor.on_outcome(&EndpointOutcome {
                    endpoint,
                    remote_addr: result.as_ref().ok().and_then(|done| done.remote_addr),
                    kind,
                    success: result.is_ok(),
                    bytes: result.as_ref().map(|done| done.bytes).unwrap_or(0),
                    latency,
                    error_code: result.as_ref().err().map(|e| e.code()),
                });
            }

            match result {
                Ok(done) => {
                    debug!(
                        id = id,
                        key = %key,
                        status = done.status,
                        bytes = done.bytes,
                        latency_ms = latency.as_millis() as u64,
                        "Meta-request completed"
                    );
                    context.complete(Ok(()));
                    Ok(done)
                }
                Err(e) => {
                    warn!(id = id, key = %key, code = e.code(), error = %e, "Meta-request failed");
                    let error = TransferError::from(e);
                    context.complete(Err(error.clone()));
                    Err(error)
                }
            }
        };

        let join = self.client.runtime().spawn(task);
        MetaRequestHandle::new(id, kind, join)
    }
}

impl std::fmt::Debug for S3ObjectTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectTransport")
            .field("bucket", &self.options.bucket)
            .field("endpoint", &self.host)
            .field("endpoints", &self.pool.len())
            .field("monitor", &self.monitor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::InputStream;

    #[test]
    fn test_content_length_only_with_body() {
        let mut request = HttpRequest::new(Method::GET, "/obj-1");
        S3ObjectTransport::add_content_length_header(&mut request).unwrap();
        assert!(request.header("content-length").is_none());

        request.set_body(InputStream::from_bytes(vec![0u8; 1024]));
        S3ObjectTransport::add_content_length_header(&mut request).unwrap();
        assert_eq!(request.header("content-length"), Some("1024"));
    }

    #[test]
    fn test_indeterminate_length_rejected() {
        let mut request = HttpRequest::new(Method::PUT, "/obj-1");
        request.set_body(InputStream::from_reader(tokio::io::empty(), None));
        assert_eq!(
            S3ObjectTransport::add_content_length_header(&mut request),
            Err(TransferError::IndeterminateLength)
        );
    }
}
