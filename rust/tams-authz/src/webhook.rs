//! Static resolution of webhook subscriptions
//!
//! The upstream delivers webhook events for every flow or source when a
//! subscription has no id filters, and evaluates `*_collected_by_ids`
//! filters at delivery time without any notion of the subscriber's
//! permissions. A subscription made through the proxy is therefore resolved
//! up front into explicit `flow_ids` and `source_ids` the caller can read,
//! and the collected-by filters are dropped.
//!
//! Resolution is fail-closed: any unreadable filter id, any upstream failure
//! and any subscribed category that resolves to nothing rejects the whole
//! subscription.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    Caller, Capability, Resource, ResourceKind, TamsAuthzError, Upstream, check_id, next_link,
};

/// A webhook subscription request body.
///
/// Fields the resolver does not interpret are kept in `rest` and written back
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    /// Event types, e.g. `flows/segments_added`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,
    /// Flows to deliver events for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_ids: Option<Vec<String>>,
    /// Sources to deliver events for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ids: Option<Vec<String>>,
    /// Flows whose collected flows to deliver events for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_collected_by_ids: Option<Vec<String>>,
    /// Sources whose collected sources to deliver events for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_collected_by_ids: Option<Vec<String>>,
    /// Every other field of the body
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl WebhookSubscription {
    /// Decode a subscription from a request body
    pub fn from_json(body: Value) -> Result<Self, TamsAuthzError> {
        serde_json::from_value(body)
            .map_err(|e| TamsAuthzError::invalid(format!("Invalid webhook body: {e}")))
    }

    /// Encode the subscription as a request body
    pub fn to_json(&self) -> Result<Value, TamsAuthzError> {
        serde_json::to_value(self)
            .map_err(|e| TamsAuthzError::invalid(format!("Invalid webhook body: {e}")))
    }

    /// The subscribed event types
    pub fn events(&self) -> &[String] {
        self.events.as_deref().unwrap_or_default()
    }

    /// Does the subscription include any `flows/…` event?
    pub fn subscribes_to_flows(&self) -> bool {
        self.events().iter().any(|event| event.starts_with("flows/"))
    }

    /// Does the subscription include any `sources/…` event?
    pub fn subscribes_to_sources(&self) -> bool {
        self.events().iter().any(|event| event.starts_with("sources/"))
    }
}

fn ids(field: &Option<Vec<String>>) -> BTreeSet<String> {
    field.iter().flatten().cloned().collect()
}

/// Resolve `subscription` into a static one, made only of ids `caller` can
/// read.
///
/// Explicit ids and collected-by ids act as filters that must all hold, so
/// when both are given for the same kind the result is their intersection.
/// Flows are also derived from the resolved sources when flow events are
/// subscribed.
pub async fn resolve_webhook<U>(
    upstream: &U,
    caller: &Caller,
    subscription: WebhookSubscription,
) -> Result<WebhookSubscription, TamsAuthzError>
where
    U: Upstream + ?Sized,
{
    let flow_ids = ids(&subscription.flow_ids);
    let source_ids = ids(&subscription.source_ids);
    let flow_collected_by_ids = ids(&subscription.flow_collected_by_ids);
    let source_collected_by_ids = ids(&subscription.source_collected_by_ids);

    let flows_subscribed = subscription.subscribes_to_flows();
    let sources_subscribed = subscription.subscribes_to_sources();

    if flows_subscribed
        && flow_ids.is_empty()
        && source_ids.is_empty()
        && flow_collected_by_ids.is_empty()
        && source_collected_by_ids.is_empty()
    {
        return Err(TamsAuthzError::invalid(
            "When subscribing to Flow events, one or more of 'flow_ids', 'source_ids', \
             'flow_collected_by_ids', and 'source_collected_by_ids' must be specified",
        ));
    }

    if sources_subscribed && source_ids.is_empty() && source_collected_by_ids.is_empty() {
        return Err(TamsAuthzError::invalid(
            "When subscribing to Source events, one or both of 'source_ids' and \
             'source_collected_by_ids' must be specified",
        ));
    }

    for flow_id in flow_ids.union(&flow_collected_by_ids) {
        if !readable(upstream, caller, ResourceKind::Flow, flow_id).await? {
            return Err(TamsAuthzError::invalid(
                "One or more filter Flow IDs don't exist or have insufficient permissions",
            ));
        }
    }

    for source_id in source_ids.union(&source_collected_by_ids) {
        if !readable(upstream, caller, ResourceKind::Source, source_id).await? {
            return Err(TamsAuthzError::invalid(
                "One or more filter Source IDs don't exist or have insufficient permissions",
            ));
        }
    }

    let mut static_sources = source_ids.clone();
    if !source_collected_by_ids.is_empty() {
        let mut collected = BTreeSet::new();
        for collection_id in &source_collected_by_ids {
            for member in source_collection(upstream, collection_id).await? {
                if readable(upstream, caller, ResourceKind::Source, &member).await? {
                    collected.insert(member);
                }
            }
        }
        static_sources = fold(static_sources, collected, !source_ids.is_empty());
    }

    let mut static_flows = flow_ids.clone();
    if !flow_collected_by_ids.is_empty() {
        let mut collected = BTreeSet::new();
        for collection_id in &flow_collected_by_ids {
            for member in flow_collection(upstream, collection_id).await? {
                if readable(upstream, caller, ResourceKind::Flow, &member).await? {
                    collected.insert(member);
                }
            }
        }
        static_flows = fold(static_flows, collected, !flow_ids.is_empty());
    }

    if flows_subscribed && !static_sources.is_empty() {
        let mut from_sources = BTreeSet::new();
        for source_id in &static_sources {
            for flow_id in flows_of_source(upstream, source_id).await? {
                if readable(upstream, caller, ResourceKind::Flow, &flow_id).await? {
                    from_sources.insert(flow_id);
                }
            }
        }
        let flows_supplied = !flow_ids.is_empty() || !flow_collected_by_ids.is_empty();
        static_flows = fold(static_flows, from_sources, flows_supplied);
    }

    // An empty id list would subscribe to everything upstream
    if flows_subscribed && static_flows.is_empty() {
        return Err(TamsAuthzError::invalid(
            "Webhook subscribes to Flow events, but doesn't match any Flow IDs",
        ));
    }

    if sources_subscribed && static_sources.is_empty() {
        return Err(TamsAuthzError::invalid(
            "Webhook subscribes to Source events, but doesn't match any Source IDs",
        ));
    }

    tracing::debug!(
        flows = static_flows.len(),
        sources = static_sources.len(),
        "Resolved static webhook"
    );

    let mut resolved = subscription;
    resolved.flow_collected_by_ids = None;
    resolved.source_collected_by_ids = None;
    if !static_flows.is_empty() {
        resolved.flow_ids = Some(static_flows.into_iter().collect());
    }
    if !static_sources.is_empty() {
        resolved.source_ids = Some(static_sources.into_iter().collect());
    }

    Ok(resolved)
}

fn fold(current: BTreeSet<String>, found: BTreeSet<String>, intersect: bool) -> BTreeSet<String> {
    if intersect {
        current.intersection(&found).cloned().collect()
    } else {
        current.union(&found).cloned().collect()
    }
}

async fn readable<U>(
    upstream: &U,
    caller: &Caller,
    kind: ResourceKind,
    id: &str,
) -> Result<bool, TamsAuthzError>
where
    U: Upstream + ?Sized,
{
    Resource::fetch(upstream, kind, id)
        .await?
        .decide(caller, Capability::Read, false)
}

fn member_ids(items: Option<&Value>) -> Vec<String> {
    items
        .and_then(|items| items.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(|id| id.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

async fn source_collection<U>(upstream: &U, source_id: &str) -> Result<Vec<String>, TamsAuthzError>
where
    U: Upstream + ?Sized,
{
    let response = upstream
        .get(&ResourceKind::Source.path(source_id)?, &[])
        .await?;

    if !response.is_ok() {
        return Ok(Vec::new());
    }

    Ok(member_ids(response.body.get("source_collection")))
}

async fn flow_collection<U>(upstream: &U, flow_id: &str) -> Result<Vec<String>, TamsAuthzError>
where
    U: Upstream + ?Sized,
{
    let response = upstream
        .get(&format!("/flows/{}/flow_collection", check_id(flow_id)?), &[])
        .await?;

    if !response.is_ok() {
        return Ok(Vec::new());
    }

    Ok(member_ids(Some(&response.body)))
}

async fn flows_of_source<U>(upstream: &U, source_id: &str) -> Result<Vec<String>, TamsAuthzError>
where
    U: Upstream + ?Sized,
{
    let mut flows = Vec::new();
    let mut response = upstream.get("/flows", &[("source_id", source_id)]).await?;

    loop {
        if !response.is_ok() {
            return Err(TamsAuthzError::upstream(format!(
                "Listing flows of source {source_id} returned status {}",
                response.status
            )));
        }

        flows.extend(member_ids(Some(&response.body)));

        let Some(next) = response.link.as_deref().and_then(next_link) else {
            break;
        };

        let path = upstream.relative_path(&next)?;
        tracing::debug!(source_id, %path, "Following flow listing page");
        response = upstream.get(&path, &[]).await?;
    }

    Ok(flows)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{GroupClassifier, MemoryUpstream, UpstreamResponse};
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    fn caller(groups: &[&str]) -> Caller {
        Caller::new(Arc::new(GroupClassifier::default()), groups.iter().copied())
    }

    fn subscription(body: Value) -> WebhookSubscription {
        WebhookSubscription::from_json(body).unwrap()
    }

    async fn resolve(
        upstream: &MemoryUpstream,
        body: Value,
    ) -> Result<Value, TamsAuthzError> {
        resolve_webhook(upstream, &caller(&["news-read"]), subscription(body))
            .await?
            .to_json()
    }

    fn newsroom() -> MemoryUpstream {
        MemoryUpstream::new()
            .with_source("s1", ["news-read"])
            .with_source("s2", ["news-read"])
            .with_source("s3", ["sport-read"])
            .with_source("sc", ["news-read"])
            .with_source_collection("sc", &["s2", "s3"])
            .with_flow("a", "s1", ["news-read"])
            .with_flow("b", "s1", ["news-read"])
            .with_flow("c", "s2", ["news-read"])
            .with_flow("d", "s2", ["news-read"])
            .with_flow("x", "s3", ["sport-read"])
            .with_flow_collection("c", &["b", "d"])
    }

    #[tokio::test]
    async fn it_rejects_flow_events_without_filters() {
        let result = resolve(&newsroom(), json!({ "events": ["flows/created"] })).await;
        assert!(matches!(result, Err(TamsAuthzError::InvalidRequest(_))));

        let result = resolve(
            &newsroom(),
            json!({ "events": ["flows/created"], "flow_ids": [] }),
        )
        .await;
        assert!(matches!(result, Err(TamsAuthzError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn it_rejects_source_events_filtered_only_by_flow() {
        let result = resolve(
            &newsroom(),
            json!({ "events": ["sources/updated"], "flow_ids": ["a"] }),
        )
        .await;
        assert!(matches!(result, Err(TamsAuthzError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn it_rejects_unreadable_or_missing_filter_ids() {
        for body in [
            json!({ "events": ["flows/created"], "flow_ids": ["a", "x"] }),
            json!({ "events": ["flows/created"], "flow_ids": ["nope"] }),
            json!({ "events": ["sources/created"], "source_collected_by_ids": ["s3"] }),
        ] {
            let result = resolve(&newsroom(), body).await;
            assert!(matches!(result, Err(TamsAuthzError::InvalidRequest(_))));
        }
    }

    #[tokio::test]
    async fn it_intersects_explicit_ids_with_collections() -> TestResult {
        let resolved = resolve(
            &newsroom(),
            json!({
                "events": ["flows/segments_added"],
                "flow_ids": ["a", "b"],
                "flow_collected_by_ids": ["c"],
            }),
        )
        .await?;

        assert_eq!(
            resolved,
            json!({ "events": ["flows/segments_added"], "flow_ids": ["b"] })
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_excludes_unreadable_collection_members() -> TestResult {
        let resolved = resolve(
            &newsroom(),
            json!({
                "url": "https://hooks.example.com/news",
                "api_key_name": "x-api-key",
                "events": ["sources/updated"],
                "source_collected_by_ids": ["sc"],
            }),
        )
        .await?;

        assert_eq!(
            resolved,
            json!({
                "url": "https://hooks.example.com/news",
                "api_key_name": "x-api-key",
                "events": ["sources/updated"],
                "source_ids": ["s2"],
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_a_category_emptied_by_permissions() {
        let upstream = newsroom()
            .with_flow("hidden", "s3", ["news-read"])
            .with_flow_collection("hidden", &["x"]);

        let result = resolve(
            &upstream,
            json!({ "events": ["flows/created"], "flow_collected_by_ids": ["hidden"] }),
        )
        .await;
        assert!(matches!(result, Err(TamsAuthzError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn it_expands_sources_into_flows_across_pages() -> TestResult {
        let upstream = newsroom()
            .with_page_size(1)
            .with_flow("e", "s2", ["sport-read"]);

        let resolved = resolve(
            &upstream,
            json!({ "events": ["flows/created"], "source_ids": ["s2"] }),
        )
        .await?;

        assert_eq!(
            resolved,
            json!({
                "events": ["flows/created"],
                "flow_ids": ["c", "d"],
                "source_ids": ["s2"],
            })
        );
        assert!(
            upstream
                .requests()
                .contains(&"/flows?page=2&source_id=s2".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_narrows_explicit_flows_to_those_of_the_sources() -> TestResult {
        let resolved = resolve(
            &newsroom(),
            json!({
                "events": ["flows/created"],
                "flow_ids": ["a", "c"],
                "source_ids": ["s1"],
            }),
        )
        .await?;

        assert_eq!(resolved["flow_ids"], json!(["a"]));
        Ok(())
    }

    #[tokio::test]
    async fn it_fails_closed_on_upstream_errors() {
        let upstream = newsroom().with_failure("/flows/c/flow_collection");

        let result = resolve(
            &upstream,
            json!({ "events": ["flows/created"], "flow_collected_by_ids": ["c"] }),
        )
        .await;
        assert!(matches!(result, Err(TamsAuthzError::Upstream(_))));
    }

    #[derive(Debug)]
    struct ForeignLinks(MemoryUpstream);

    #[async_trait]
    impl Upstream for ForeignLinks {
        async fn get(
            &self,
            path: &str,
            query: &[(&str, &str)],
        ) -> Result<UpstreamResponse, TamsAuthzError> {
            let mut response = self.0.get(path, query).await?;
            if path == "/flows" {
                response.link = Some(r#"<https://elsewhere.example.com/flows?page=1>; rel="next""#.into());
            }
            Ok(response)
        }

        fn base_url(&self) -> &str {
            self.0.base_url()
        }
    }

    #[tokio::test]
    async fn it_refuses_to_follow_links_outside_the_upstream() {
        let upstream = ForeignLinks(newsroom());

        let result = resolve_webhook(
            &upstream,
            &caller(&["news-read"]),
            subscription(json!({ "events": ["flows/created"], "source_ids": ["s1"] })),
        )
        .await;
        assert!(matches!(result, Err(TamsAuthzError::Upstream(_))));
        assert_eq!(
            upstream.0.requests(),
            vec![
                "/sources/s1".to_string(),
                "/flows?source_id=s1".to_string()
            ]
        );
    }
}
