//! In-memory upstream implementation for testing

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};

use super::{Upstream, UpstreamResponse};
use crate::{AuthClasses, TamsAuthzError};

/// Base URL reported by a [`MemoryUpstream`] unless overridden
pub const MEMORY_UPSTREAM_URL: &str = "http://memory.upstream";

#[derive(Debug, Clone, Default)]
struct MemorySource {
    auth_classes: AuthClasses,
    collection: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct MemoryFlow {
    source_id: String,
    auth_classes: AuthClasses,
    collection: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    sources: BTreeMap<String, MemorySource>,
    flows: BTreeMap<String, MemoryFlow>,
    webhooks: BTreeMap<String, AuthClasses>,
    objects: BTreeMap<String, Vec<String>>,
    failing: HashSet<String>,
    requests: Vec<String>,
}

/// An in-memory stand-in for the upstream API.
///
/// It models just enough of the upstream to exercise the engine: sources
/// with collections, flows with collections, webhooks, media objects
/// referenced by flows, `tag.auth_classes` / `flow_tag.auth_classes`
/// filtering (where an empty filter matches everything, as upstream does),
/// and paginated `/flows?source_id=` listings with `Link` headers.
///
/// Clones share state, so a test can keep a handle for inspection.
///
/// # Examples
///
/// ```
/// use tams_authz::{MemoryUpstream, Upstream};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let upstream = MemoryUpstream::new()
///     .with_source("s1", ["news-read"])
///     .with_flow("f1", "s1", ["news-read"]);
///
/// let flow = upstream.get("/flows/f1", &[]).await?;
/// assert_eq!(flow.status, 200);
/// assert_eq!(upstream.request_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryUpstream {
    state: Arc<RwLock<MemoryState>>,
    base_url: Arc<str>,
    page_size: usize,
}

impl Default for MemoryUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUpstream {
    /// Create an empty upstream
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            base_url: Arc::from(MEMORY_UPSTREAM_URL),
            page_size: 100,
        }
    }

    /// Report a different base URL (used in pagination links)
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = Arc::from(base_url.as_ref().trim_end_matches('/'));
        self
    }

    /// Set the page size of `/flows` listings
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Add a source
    pub fn with_source<I, S>(self, id: &str, auth_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.write().sources.insert(
            id.to_string(),
            MemorySource {
                auth_classes: auth_classes.into_iter().collect(),
                collection: Vec::new(),
            },
        );
        self
    }

    /// Set the sources collected by source `id`
    pub fn with_source_collection(self, id: &str, members: &[&str]) -> Self {
        if let Some(source) = self.state.write().sources.get_mut(id) {
            source.collection = members.iter().map(|member| member.to_string()).collect();
        }
        self
    }

    /// Add a flow belonging to `source_id`
    pub fn with_flow<I, S>(self, id: &str, source_id: &str, auth_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.write().flows.insert(
            id.to_string(),
            MemoryFlow {
                source_id: source_id.to_string(),
                auth_classes: auth_classes.into_iter().collect(),
                collection: Vec::new(),
            },
        );
        self
    }

    /// Set the flows collected by flow `id`
    pub fn with_flow_collection(self, id: &str, members: &[&str]) -> Self {
        if let Some(flow) = self.state.write().flows.get_mut(id) {
            flow.collection = members.iter().map(|member| member.to_string()).collect();
        }
        self
    }

    /// Add a webhook
    pub fn with_webhook<I, S>(self, id: &str, auth_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .write()
            .webhooks
            .insert(id.to_string(), auth_classes.into_iter().collect());
        self
    }

    /// Add a media object referenced by `flows`
    pub fn with_object(self, id: &str, flows: &[&str]) -> Self {
        self.state.write().objects.insert(
            id.to_string(),
            flows.iter().map(|flow| flow.to_string()).collect(),
        );
        self
    }

    /// Make every lookup of `path` fail as a transport error
    pub fn with_failure(self, path: &str) -> Self {
        self.state.write().failing.insert(path.to_string());
        self
    }

    /// Number of lookups served so far
    pub fn request_count(&self) -> usize {
        self.state.read().requests.len()
    }

    /// Every lookup served so far, as `path?query`
    pub fn requests(&self) -> Vec<String> {
        self.state.read().requests.clone()
    }

    /// Answer a lookup synchronously. This is what [`Upstream::get`] does,
    /// exposed so that test servers can serve the same data over HTTP.
    pub fn respond(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<UpstreamResponse, TamsAuthzError> {
        let (path, inline) = split_query(path);
        let mut params: Vec<(String, String)> = inline;
        params.extend(query.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let mut state = self.state.write();
        state.requests.push(render_request(path, &params));

        if state.failing.contains(path) {
            return Err(TamsAuthzError::upstream(format!(
                "Connection to upstream failed for {path}"
            )));
        }

        let param = |name: &str| find_param(&params, name);

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let response = match segments.as_slice() {
            ["sources"] => {
                let filter = AuthClasses::from_csv(param("tag.auth_classes").unwrap_or(""));
                let items = state
                    .sources
                    .iter()
                    .filter(|(_, source)| matches_filter(&source.auth_classes, &filter))
                    .map(|(id, source)| source_json(id, source))
                    .collect();
                ok(Value::Array(items))
            }
            ["sources", id] => match state.sources.get(*id) {
                Some(source) => ok(source_json(id, source)),
                None => not_found(),
            },
            ["flows"] => self.list_flows(&state, &params),
            ["flows", id] => match state.flows.get(*id) {
                Some(flow) => ok(flow_json(id, flow)),
                None => not_found(),
            },
            ["flows", id, "flow_collection"] => match state.flows.get(*id) {
                Some(flow) => ok(Value::Array(
                    flow.collection.iter().map(|id| json!({ "id": id })).collect(),
                )),
                None => not_found(),
            },
            ["service", "webhooks"] => {
                let filter = AuthClasses::from_csv(param("tag.auth_classes").unwrap_or(""));
                let items = state
                    .webhooks
                    .iter()
                    .filter(|(_, classes)| matches_filter(classes, &filter))
                    .map(|(id, classes)| webhook_json(id, classes))
                    .collect();
                ok(Value::Array(items))
            }
            ["service", "webhooks", id] => match state.webhooks.get(*id) {
                Some(classes) => ok(webhook_json(id, classes)),
                None => not_found(),
            },
            ["objects", id] => match state.objects.get(*id) {
                Some(referencing) => {
                    let filter =
                        AuthClasses::from_csv(param("flow_tag.auth_classes").unwrap_or(""));
                    let referenced: Vec<Value> = referencing
                        .iter()
                        .filter(|flow_id| {
                            state
                                .flows
                                .get(flow_id.as_str())
                                .is_some_and(|flow| matches_filter(&flow.auth_classes, &filter))
                        })
                        .map(|flow_id| Value::String(flow_id.clone()))
                        .collect();
                    ok(json!({ "id": id, "referenced_by_flows": referenced }))
                }
                None => not_found(),
            },
            _ => not_found(),
        };

        Ok(response)
    }

    fn list_flows(&self, state: &MemoryState, params: &[(String, String)]) -> UpstreamResponse {
        let param = |name: &str| find_param(params, name);
        let source_id = param("source_id");
        let filter = AuthClasses::from_csv(param("tag.auth_classes").unwrap_or(""));
        let page: usize = param("page").and_then(|page| page.parse().ok()).unwrap_or(0);

        let matching: Vec<Value> = state
            .flows
            .iter()
            .filter(|(_, flow)| source_id.is_none_or(|source_id| flow.source_id == source_id))
            .filter(|(_, flow)| matches_filter(&flow.auth_classes, &filter))
            .map(|(id, flow)| flow_json(id, flow))
            .collect();

        let start = page * self.page_size;
        let items: Vec<Value> = matching
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();

        let link = if start + self.page_size < matching.len() {
            let mut next = format!("{}/flows?page={}", self.base_url, page + 1);
            if let Some(source_id) = source_id {
                next.push_str(&format!("&source_id={source_id}"));
            }
            Some(format!(r#"<{next}>; rel="next""#))
        } else {
            None
        };

        UpstreamResponse {
            status: 200,
            link,
            body: Value::Array(items),
        }
    }
}

#[async_trait]
impl Upstream for MemoryUpstream {
    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<UpstreamResponse, TamsAuthzError> {
        self.respond(path, query)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn find_param<'p>(params: &'p [(String, String)], name: &str) -> Option<&'p str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn split_query(path: &str) -> (&str, Vec<(String, String)>) {
    match path.split_once('?') {
        Some((path, query)) => (
            path,
            query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((key, value)) => (key.to_string(), value.to_string()),
                    None => (pair.to_string(), String::new()),
                })
                .collect(),
        ),
        None => (path, Vec::new()),
    }
}

fn render_request(path: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        path.to_string()
    } else {
        let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{path}?{}", query.join("&"))
    }
}

fn matches_filter(classes: &AuthClasses, filter: &AuthClasses) -> bool {
    filter.is_empty() || classes.intersects(filter)
}

fn tags_json(classes: &AuthClasses) -> Value {
    if classes.is_empty() {
        json!({})
    } else {
        json!({ "auth_classes": classes.iter().collect::<Vec<_>>() })
    }
}

fn source_json(id: &str, source: &MemorySource) -> Value {
    json!({
        "id": id,
        "tags": tags_json(&source.auth_classes),
        "source_collection": source
            .collection
            .iter()
            .map(|id| json!({ "id": id }))
            .collect::<Vec<_>>(),
    })
}

fn flow_json(id: &str, flow: &MemoryFlow) -> Value {
    json!({
        "id": id,
        "source_id": flow.source_id,
        "tags": tags_json(&flow.auth_classes),
    })
}

fn webhook_json(id: &str, classes: &AuthClasses) -> Value {
    json!({
        "id": id,
        "url": format!("https://hooks.example.com/{id}"),
        "tags": tags_json(classes),
    })
}

fn ok(body: Value) -> UpstreamResponse {
    UpstreamResponse {
        status: 200,
        link: None,
        body,
    }
}

fn not_found() -> UpstreamResponse {
    UpstreamResponse {
        status: 404,
        link: None,
        body: json!({ "type": "NotFound", "summary": "not found" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[tokio::test]
    async fn it_filters_object_references_by_flow_tags() -> TestResult {
        let upstream = MemoryUpstream::new()
            .with_flow("f1", "s1", ["a-read"])
            .with_flow("f2", "s1", ["b-read"])
            .with_object("o1", &["f1", "f2"]);

        let all = upstream.get("/objects/o1", &[]).await?;
        assert_eq!(all.body["referenced_by_flows"], json!(["f1", "f2"]));

        let narrowed = upstream
            .get("/objects/o1", &[("flow_tag.auth_classes", "b-read")])
            .await?;
        assert_eq!(narrowed.body["referenced_by_flows"], json!(["f2"]));

        let missing = upstream.get("/objects/o2", &[]).await?;
        assert_eq!(missing.status, 404);
        Ok(())
    }

    #[tokio::test]
    async fn it_paginates_flow_listings() -> TestResult {
        let upstream = MemoryUpstream::new()
            .with_page_size(2)
            .with_flow("f1", "s1", ["a-read"])
            .with_flow("f2", "s1", ["a-read"])
            .with_flow("f3", "s1", ["a-read"])
            .with_flow("f4", "s2", ["a-read"]);

        let first = upstream.get("/flows", &[("source_id", "s1")]).await?;
        assert_eq!(first.body.as_array().map(Vec::len), Some(2));
        assert_eq!(
            first.link.as_deref(),
            Some(r#"<http://memory.upstream/flows?page=1&source_id=s1>; rel="next""#)
        );

        let second = upstream.get("/flows?page=1&source_id=s1", &[]).await?;
        assert_eq!(second.body, json!([{ "id": "f3", "source_id": "s1", "tags": { "auth_classes": ["a-read"] } }]));
        assert_eq!(second.link, None);
        Ok(())
    }

    #[tokio::test]
    async fn it_records_requests_and_failures() -> TestResult {
        let upstream = MemoryUpstream::new().with_failure("/flows/broken");

        assert!(upstream.get("/flows/broken", &[]).await.is_err());
        upstream.get("/flows", &[("source_id", "s")]).await?;

        assert_eq!(
            upstream.requests(),
            vec!["/flows/broken".to_string(), "/flows?source_id=s".to_string()]
        );
        Ok(())
    }
}
