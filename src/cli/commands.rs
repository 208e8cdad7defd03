use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use s3transport::core::Core;
use s3transport::endpoint::EndpointStats;
use s3transport::transfer::{ByteRange, InputStream, OutputSink, PartSpec, TransferState, TransferStatus};
use s3transport::transport::MetaRequestHandle;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Where the bytes of an upload come from
pub enum PutSource<'a> {
    File(&'a Path),
    /// Random payload of the given size
    Random(u64),
}

/// Result of one transfer, printed as text or JSON
#[derive(Debug, Serialize)]
pub struct TransferSummary {
    pub operation: &'static str,
    pub key: String,
    pub endpoint: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub bytes: u64,
    pub elapsed_ms: u64,
    pub throughput_mib_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub endpoints: Vec<EndpointStats>,
}

impl TransferSummary {
    fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(self)?);
            return Ok(());
        }

        println!("{} {} via {}", self.operation, self.key, self.endpoint);
        println!("  Status: {}", self.status);
        if let Some(error) = &self.error {
            println!("  Error: {}", error);
        }
        println!(
            "  {} in {:.2}s ({:.2} MiB/s)",
            format_bytes(self.bytes),
            self.elapsed_ms as f64 / 1000.0,
            self.throughput_mib_s
        );
        if let Some(addr) = &self.remote_addr {
            println!("  Remote: {}", addr);
        }
        if let Some(etag) = &self.etag {
            println!("  ETag: {}", etag);
        }
        Ok(())
    }
}

/// Upload an object (or part) and print a summary
pub async fn cmd_put(
    core: &Core,
    key: &str,
    source: PutSource<'_>,
    part: Option<PartSpec>,
    progress: bool,
    json: bool,
) -> Result<()> {
    let body = match source {
        PutSource::File(path) => InputStream::from_file(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?,
        PutSource::Random(size) => InputStream::from_bytes(random_payload(size)),
    };
    let total = body.length();

    let mut transfer = TransferState::upload(body);
    if let Some(part) = part {
        transfer = transfer.with_part(part);
    }
    let transfer = Arc::new(transfer);

    let handle = core.transport.put_object(&transfer, key)?;
    let summary = run_transfer(core, "PUT", key, &transfer, handle, total, progress).await;
    summary.print(json)?;
    ensure_completed(&transfer)
}

/// Download an object (or part/range) and print a summary
pub async fn cmd_get(
    core: &Core,
    key: &str,
    output: Option<&Path>,
    range: Option<ByteRange>,
    part: Option<PartSpec>,
    progress: bool,
    json: bool,
) -> Result<()> {
    let sink = match output {
        Some(path) => OutputSink::create_file(path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?,
        None => OutputSink::discard(),
    };

    let mut transfer = TransferState::download(sink);
    if let Some(range) = range {
        transfer = transfer.with_range(range);
    }
    if let Some(part) = part {
        transfer = transfer.with_part(part);
    }
    let transfer = Arc::new(transfer);

    let handle = core.transport.get_object(&transfer, key)?;
    let total = range.map(|r| r.len());
    let summary = run_transfer(core, "GET", key, &transfer, handle, total, progress).await;
    summary.print(json)?;
    ensure_completed(&transfer)
}

/// Warm the DNS cache for `transfers` concurrent transfers
pub async fn cmd_warm(core: &Core, transfers: usize, json: bool) -> Result<()> {
    let report = core.transport.warm_dns_cache(transfers).await;
    let addrs = core.transport.endpoint_pool().addrs();

    if json {
        #[derive(Serialize)]
        struct WarmOutput<'a> {
            endpoint: &'a str,
            #[serde(flatten)]
            report: &'a s3transport::endpoint::WarmReport,
            addrs: Vec<String>,
        }
        let output = WarmOutput {
            endpoint: core.transport.endpoint(),
            report: &report,
            addrs: addrs.iter().map(|a| a.to_string()).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Endpoint: {}", core.transport.endpoint());
    println!(
        "Warmed {} of {} requested ({} lookups, {} failed, {} new)",
        report.pool_size, report.target, report.lookups, report.failures, report.added
    );
    for addr in addrs {
        println!("  {}", addr);
    }
    Ok(())
}

/// Print the logical endpoint and the current pool
pub fn cmd_endpoint(core: &Core, json: bool) -> Result<()> {
    let endpoints: Vec<_> = core
        .transport
        .endpoint_pool()
        .snapshot()
        .iter()
        .map(|e| e.snapshot())
        .collect();

    if json {
        let output = serde_json::json!({
            "endpoint": core.transport.endpoint(),
            "bucket": core.transport.bucket(),
            "endpoints": endpoints,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", core.transport.endpoint());
        for endpoint in endpoints {
            println!("  {}", endpoint.addr);
        }
    }
    Ok(())
}

async fn run_transfer(
    core: &Core,
    operation: &'static str,
    key: &str,
    transfer: &Arc<TransferState>,
    handle: MetaRequestHandle,
    total: Option<u64>,
    progress: bool,
) -> TransferSummary {
    let bar = progress.then(|| progress_bar(key, total));
    let ticker = bar.clone().map(|bar| {
        let transfer = Arc::clone(transfer);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(100));
            loop {
                interval.tick().await;
                bar.set_position(transfer.bytes_transferred());
                if transfer.status().is_terminal() {
                    break;
                }
            }
        })
    });

    let result = handle.join().await;
    if let Some(ticker) = ticker {
        ticker.abort();
    }
    if let Some(bar) = bar {
        bar.set_position(transfer.bytes_transferred());
        bar.finish_and_clear();
    }

    let status = transfer.status();
    let elapsed = transfer.elapsed().unwrap_or_default();
    let (bytes, remote_addr, etag) = match &result {
        Ok(done) => (done.bytes, done.remote_addr.map(|a| a.to_string()), done.etag.clone()),
        Err(_) => (transfer.bytes_transferred(), None, None),
    };
    debug!(key = %key, status = %status, bytes = bytes, "Transfer finished");

    TransferSummary {
        operation,
        key: key.to_string(),
        endpoint: core.transport.endpoint().to_string(),
        status: status.to_string(),
        error_code: status.error_code(),
        error: match &status {
            TransferStatus::Failed(e) => Some(e.to_string()),
            _ => None,
        },
        bytes,
        elapsed_ms: elapsed.as_millis() as u64,
        throughput_mib_s: throughput_mib_s(bytes, elapsed),
        remote_addr,
        etag,
        endpoints: core.monitor.get_stats(),
    }
}

fn ensure_completed(transfer: &TransferState) -> Result<()> {
    match transfer.status() {
        TransferStatus::Completed => Ok(()),
        TransferStatus::Failed(e) => Err(anyhow::anyhow!("Transfer failed [{}]: {}", e.code(), e)),
        other => Err(anyhow::anyhow!("Transfer ended in non-terminal state: {}", other)),
    }
}

fn progress_bar(key: &str, total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    let style = ProgressStyle::default_bar()
        .template("{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar.set_message(key.to_string());
    bar
}

fn random_payload(size: u64) -> Vec<u8> {
    let mut payload = vec![0u8; size as usize];
    rand::thread_rng().fill(&mut payload[..]);
    payload
}

// ============================================================================
// Utility functions
// ============================================================================

/// Parse a byte range given as `start-end` (inclusive)
pub fn parse_range(value: &str) -> Result<ByteRange> {
    let (start, end) = value
        .split_once('-')
        .ok_or_else(|| anyhow::anyhow!("Range must look like start-end: {}", value))?;
    let start: u64 = start.trim().parse().context("Invalid range start")?;
    let end: u64 = end.trim().parse().context("Invalid range end")?;
    if end < start {
        anyhow::bail!("Range end {} is before start {}", end, start);
    }
    Ok(ByteRange::new(start, end))
}

/// Parse a size such as `1024`, `64K`, `10M` or `1G`
pub fn parse_size(value: &str) -> Result<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.chars().last() {
        Some('K') | Some('k') => (&value[..value.len() - 1], 1024),
        Some('M') | Some('m') => (&value[..value.len() - 1], 1024 * 1024),
        Some('G') | Some('g') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    let base: u64 = digits
        .parse()
        .with_context(|| format!("Invalid size: {}", value))?;
    Ok(base * multiplier)
}

/// Format bytes in human-readable form (B, KB, MB, GB, TB)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exponent = (bytes_f64.ln() / 1024_f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes_f64 / 1024_f64.powi(exponent as i32);

    if exponent == 0 {
        format!("{} {}", bytes, UNITS[exponent])
    } else {
        format!("{:.2} {}", value, UNITS[exponent])
    }
}

fn throughput_mib_s(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 / (1024.0 * 1024.0) / secs
}
