//! Host name resolution

use futures::future::BoxFuture;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Resolves a host name into addresses.
///
/// One call is one lookup; callers that want several answers issue several
/// lookups.
pub trait Resolve: Send + Sync {
    fn resolve(&self, host: &str) -> BoxFuture<'static, io::Result<Vec<IpAddr>>>;
}

impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, host: &str) -> BoxFuture<'static, io::Result<Vec<IpAddr>>> {
        (**self).resolve(host)
    }
}

/// Resolver backed by the operating system (`getaddrinfo` through tokio)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str) -> BoxFuture<'static, io::Result<Vec<IpAddr>>> {
        let host = host.to_string();
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
            let mut ips: Vec<IpAddr> = Vec::new();
            for addr in addrs {
                if !ips.contains(&addr.ip()) {
                    ips.push(addr.ip());
                }
            }
            if ips.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses for {}", host),
                ));
            }
            Ok(ips)
        })
    }
}

/// Resolver answering from a fixed address list.
///
/// With `per_lookup` set, each lookup returns that many addresses starting at
/// a rotating offset, the way round-robin DNS hands out a subset per answer.
#[derive(Debug)]
pub struct StaticResolver {
    addrs: Vec<IpAddr>,
    per_lookup: Option<usize>,
    next: AtomicUsize,
}

impl StaticResolver {
    pub fn new(addrs: Vec<IpAddr>) -> Self {
        Self {
            addrs,
            per_lookup: None,
            next: AtomicUsize::new(0),
        }
    }

    pub fn rotating(addrs: Vec<IpAddr>, per_lookup: usize) -> Self {
        Self {
            addrs,
            per_lookup: Some(per_lookup.max(1)),
            next: AtomicUsize::new(0),
        }
    }

    /// Parse a comma-separated address list such as `10.0.0.1,10.0.0.2`
    pub fn parse(list: &str) -> Result<Self, std::net::AddrParseError> {
        let addrs = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<IpAddr>, _>>()?;
        Ok(Self::new(addrs))
    }

    pub fn addrs(&self) -> &[IpAddr] {
        &self.addrs
    }
}

impl Resolve for StaticResolver {
    fn resolve(&self, host: &str) -> BoxFuture<'static, io::Result<Vec<IpAddr>>> {
        let answer = if self.addrs.is_empty() {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {}", host),
            ))
        } else {
            match self.per_lookup {
                None => Ok(self.addrs.clone()),
                Some(count) => {
                    let start = self.next.fetch_add(1, Ordering::Relaxed);
                    Ok((0..count.min(self.addrs.len()))
                        .map(|i| self.addrs[(start + i) % self.addrs.len()])
                        .collect())
                }
            }
        };
        Box::pin(async move { answer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(n: u8) -> Vec<IpAddr> {
        (1..=n).map(|i| IpAddr::from([10, 0, 0, i])).collect()
    }

    #[tokio::test]
    async fn test_static_resolver_returns_all() {
        let resolver = StaticResolver::new(addrs(3));
        let answer = resolver.resolve("bucket.example.com").await.unwrap();
        assert_eq!(answer, addrs(3));
    }

    #[tokio::test]
    async fn test_rotating_resolver() {
        let resolver = StaticResolver::rotating(addrs(4), 1);
        let first = resolver.resolve("h").await.unwrap();
        let second = resolver.resolve("h").await.unwrap();
        assert_eq!(first.len(), 1);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_empty_static_resolver_fails() {
        let resolver = StaticResolver::new(Vec::new());
        let err = resolver.resolve("h").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_parse_list() {
        let resolver = StaticResolver::parse("10.0.0.1, 10.0.0.2").unwrap();
        assert_eq!(resolver.addrs(), &addrs(2)[..]);
        assert!(StaticResolver::parse("not-an-ip").is_err());
    }

    #[tokio::test]
    async fn test_system_resolver_localhost() {
        let answer = SystemResolver.resolve("localhost").await.unwrap();
        assert!(answer.iter().all(|ip| ip.is_loopback()));
    }
}
