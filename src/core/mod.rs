use crate::auth::{
    Credentials, EnvironmentCredentialsProvider, ProvideCredentials, Sigv4Signer,
    StaticCredentialsProvider,
};
use crate::client::HyperMetaRequestClient;
use crate::config::{Config, Profile};
use crate::endpoint::{EndpointStatsMonitor, Resolve, StaticResolver, SystemResolver};
use crate::transport::S3ObjectTransport;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Transport wired from configuration, shared by every CLI command
///
/// The hyper client is created once; clones of `Core` share its connection
/// pools and counters.
#[derive(Clone)]
pub struct Core {
    pub config: Arc<Config>,
    pub profile: Profile,
    pub transport: Arc<S3ObjectTransport>,
    pub client: HyperMetaRequestClient,
    pub monitor: Arc<EndpointStatsMonitor>,
}

impl Core {
    pub async fn new(config: Config, profile_name: Option<&str>) -> Result<Self> {
        let config = Arc::new(config);

        let profile = config
            .get_profile(profile_name)
            .ok_or_else(|| anyhow::anyhow!("No profile found in configuration"))?
            .clone();

        let provider: Arc<dyn ProvideCredentials> =
            if profile.access_key.is_empty() && profile.secret_key.is_empty() {
                Arc::new(EnvironmentCredentialsProvider::new())
            } else {
                Arc::new(StaticCredentialsProvider::new(Credentials::new(
                    profile.access_key.clone(),
                    profile.secret_key.clone(),
                    profile.session_token.clone(),
                )))
            };
        let signer = Arc::new(Sigv4Signer::new(provider));

        let resolver: Arc<dyn Resolve> = if profile.resolve.is_empty() {
            Arc::new(SystemResolver)
        } else {
            let list = profile.resolve.join(",");
            Arc::new(StaticResolver::parse(&list).context("Invalid address in resolve list")?)
        };

        // Create the client ONCE - the transport and stats share its pools
        let client = HyperMetaRequestClient::new(config.transport.client_config(&profile))
            .context("Failed to create HTTP client")?;

        let monitor = Arc::new(EndpointStatsMonitor::new());
        let transport = S3ObjectTransport::new(
            config.transport.transport_options(&profile),
            signer,
            Arc::new(client.clone()),
            resolver,
        )
        .await
        .context("Failed to create S3 object transport")?
        .with_endpoint_monitor(monitor.clone());

        Ok(Self {
            config,
            profile,
            transport: Arc::new(transport),
            client,
            monitor,
        })
    }
}
