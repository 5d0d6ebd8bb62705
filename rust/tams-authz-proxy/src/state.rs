use std::sync::Arc;

use axum::http::HeaderMap;
use tams_authz::{GroupClassifier, RestUpstream, TamsAuthzError};
use tams_authz_credentials::{DEFAULT_GROUPS_CLAIM, KeySet};

use crate::{DEFAULT_BODY_LIMIT, ProxyConfig};

/// Everything a request handler needs, shared read-only across requests
#[derive(Debug, Clone)]
pub struct AppState {
    upstream: RestUpstream,
    keys: Arc<KeySet>,
    classifier: Arc<GroupClassifier>,
    groups_claim: Arc<str>,
    body_limit: usize,
}

impl AppState {
    /// State that reads groups from the default claim
    pub fn new(upstream: RestUpstream, keys: KeySet, classifier: GroupClassifier) -> Self {
        Self {
            upstream,
            keys: Arc::new(keys),
            classifier: Arc::new(classifier),
            groups_claim: Arc::from(DEFAULT_GROUPS_CLAIM),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Read groups from `claim` instead
    pub fn with_groups_claim(mut self, claim: &str) -> Self {
        self.groups_claim = Arc::from(claim);
        self
    }

    /// Refuse request bodies larger than `bytes`
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// State for a configured proxy, given its already fetched key set
    pub fn from_config(config: &ProxyConfig, keys: KeySet) -> Result<Self, TamsAuthzError> {
        Ok(Self::new(config.upstream()?, keys, config.classifier())
            .with_groups_claim(&config.groups_claim)
            .with_body_limit(config.max_body_bytes))
    }

    /// The upstream, bound to an inbound request's headers for lookups
    pub fn upstream_for(&self, headers: &HeaderMap) -> RestUpstream {
        self.upstream.forwarding(headers)
    }

    pub fn client(&self) -> &reqwest::Client {
        self.upstream.client()
    }

    pub fn api_url(&self) -> &str {
        &self.upstream.config().endpoint
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    pub fn classifier(&self) -> &Arc<GroupClassifier> {
        &self.classifier
    }

    pub fn groups_claim(&self) -> &str {
        &self.groups_claim
    }

    /// Largest request body accepted, in bytes
    pub fn body_limit(&self) -> usize {
        self.body_limit
    }
}
