use std::net::SocketAddr;

use clap::Parser;
use tams_authz::{GroupClassifier, RestUpstream, RestUpstreamConfig, TamsAuthzError};
use tams_authz_credentials::DEFAULT_GROUPS_CLAIM;

/// Default cap on request bodies: 16 MiB
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Parser)]
#[command(name = "tams-authz-proxy")]
#[command(bin_name = "tams-authz-proxy")]
#[command(about = "Authorization-enforcing reverse proxy for a TAMS API", long_about = None)]
pub struct ProxyConfig {
    /// Base URL of the upstream TAMS API
    #[arg(long, env = "API_URL")]
    pub api_url: String,

    /// URL of the identity provider's JWKS document
    #[arg(long, env = "JWKS_URL")]
    pub jwks_url: String,

    /// Token claim listing the caller's groups
    #[arg(long, env = "GROUPS_CLAIM", default_value = DEFAULT_GROUPS_CLAIM)]
    pub groups_claim: String,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: SocketAddr,

    /// Upstream request timeout, in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT", default_value_t = 30)]
    pub upstream_timeout: u64,

    /// Largest request body accepted, in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_BODY_LIMIT)]
    pub max_body_bytes: usize,

    /// Audience tokens must be issued for
    #[arg(long, env = "TOKEN_AUDIENCE")]
    pub token_audience: Option<String>,

    #[arg(long, env = "READ_SUFFIX", default_value = "read")]
    pub read_suffix: String,

    #[arg(long, env = "WRITE_SUFFIX", default_value = "write")]
    pub write_suffix: String,

    #[arg(long, env = "DELETE_SUFFIX", default_value = "delete")]
    pub delete_suffix: String,

    /// Group whose members bypass all checks
    #[arg(long, env = "ADMIN_GROUP", default_value = "admin")]
    pub admin_group: String,
}

impl ProxyConfig {
    /// The group classification rule configured for this proxy
    pub fn classifier(&self) -> GroupClassifier {
        GroupClassifier::default()
            .with_read_suffix(&self.read_suffix)
            .with_write_suffix(&self.write_suffix)
            .with_delete_suffix(&self.delete_suffix)
            .with_admin_group(&self.admin_group)
    }

    /// The upstream this proxy fronts
    pub fn upstream(&self) -> Result<RestUpstream, TamsAuthzError> {
        RestUpstream::new(
            RestUpstreamConfig::new(&self.api_url).with_timeout(self.upstream_timeout),
        )
    }
}
