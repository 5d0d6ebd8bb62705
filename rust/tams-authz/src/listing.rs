//! Post-filtering of upstream listings
//!
//! Listings are not checked item by item before forwarding. Instead, the
//! upstream query is narrowed to the caller's readable classes, and the
//! response is filtered again locally, because the upstream treats an empty
//! class filter as "match everything".

use serde_json::Value;

use crate::{AuthClasses, Caller, Resource, TamsAuthzError, Upstream};

/// Query parameter carrying a resource class filter
pub const TAG_AUTH_CLASSES: &str = "tag.auth_classes";

/// Query parameter carrying a flow class filter on object lookups
pub const FLOW_TAG_AUTH_CLASSES: &str = "flow_tag.auth_classes";

/// The classes a listing may return for one caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingScope {
    readable: AuthClasses,
    requested: Option<AuthClasses>,
}

impl ListingScope {
    /// Scope a listing to `caller`, honouring the class filter the caller put
    /// on the request (if any).
    pub fn new(caller: &Caller, requested: Option<&str>) -> Self {
        let requested = requested
            .map(AuthClasses::from_csv)
            .filter(|requested| !requested.is_empty());

        Self {
            readable: caller.readable(),
            requested,
        }
    }

    /// The caller's groups that grant read
    pub fn readable(&self) -> &AuthClasses {
        &self.readable
    }

    /// The caller's own class filter
    pub fn requested(&self) -> Option<&AuthClasses> {
        self.requested.as_ref()
    }

    /// The class filter to send upstream in place of the caller's
    pub fn query_value(&self) -> String {
        self.readable.to_csv()
    }

    /// Would an item with `classes` be returned to the caller?
    pub fn admits(&self, classes: &AuthClasses) -> bool {
        classes.intersects(&self.readable)
            && self
                .requested
                .as_ref()
                .is_none_or(|requested| classes.intersects(requested))
    }

    /// Drop listing items the caller may not see. Bodies that are not arrays
    /// are returned untouched.
    pub fn filter_listing(&self, body: Value) -> Value {
        match body {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .filter(|item| self.admits(&AuthClasses::from_tags(item)))
                    .collect(),
            ),
            other => other,
        }
    }
}

/// Narrow an object's `referenced_by_flows` to flows matching the caller's
/// own class filter.
///
/// The upstream lookup that produced `body` must already have been filtered
/// to the caller's readable classes. Without a caller filter the body is
/// returned as is; otherwise each referenced flow is looked up once. An
/// object whose references are all filtered out is still returned, with an
/// empty list.
pub async fn filter_object_references<U>(
    upstream: &U,
    scope: &ListingScope,
    mut body: Value,
) -> Result<Value, TamsAuthzError>
where
    U: Upstream + ?Sized,
{
    let Some(requested) = scope.requested() else {
        return Ok(body);
    };

    let referenced: Vec<String> = body
        .get("referenced_by_flows")
        .and_then(|flows| flows.as_array())
        .map(|flows| {
            flows
                .iter()
                .filter_map(|flow| flow.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let mut retained = Vec::with_capacity(referenced.len());
    for flow_id in referenced {
        let flow = Resource::flow(upstream, &flow_id).await?;
        if flow.exists() && flow.auth_classes().intersects(requested) {
            retained.push(Value::String(flow_id));
        }
    }

    if let Value::Object(object) = &mut body {
        object.insert("referenced_by_flows".to_string(), Value::Array(retained));
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{GroupClassifier, MemoryUpstream};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use testresult::TestResult;

    fn caller(groups: &[&str]) -> Caller {
        Caller::new(Arc::new(GroupClassifier::default()), groups.iter().copied())
    }

    fn listing() -> Value {
        json!([
            { "id": "a", "tags": { "auth_classes": ["news-read"] } },
            { "id": "b", "tags": { "auth_classes": ["sport-read", "news-write"] } },
            { "id": "c", "tags": {} },
            { "id": "d" },
        ])
    }

    #[test]
    fn it_sends_readable_classes_upstream() {
        let scope = ListingScope::new(&caller(&["news-read", "sport-write", "admin"]), None);
        assert_eq!(scope.query_value(), "news-read");
    }

    #[test]
    fn it_keeps_items_intersecting_readable_classes() {
        let scope = ListingScope::new(&caller(&["news-read", "news-write"]), None);

        assert_eq!(
            scope.filter_listing(listing()),
            json!([{ "id": "a", "tags": { "auth_classes": ["news-read"] } }])
        );
    }

    #[test]
    fn it_applies_the_callers_own_filter() {
        let scope = ListingScope::new(&caller(&["news-read", "sport-read"]), Some("sport-read"));

        assert_eq!(
            scope.filter_listing(listing()),
            json!([{ "id": "b", "tags": { "auth_classes": ["sport-read", "news-write"] } }])
        );
    }

    #[test]
    fn it_ignores_an_empty_caller_filter() {
        let scope = ListingScope::new(&caller(&["news-read"]), Some(""));
        assert_eq!(scope.requested(), None);
    }

    #[test]
    fn it_returns_nothing_without_readable_classes() {
        let scope = ListingScope::new(&caller(&["news-write"]), None);

        assert_eq!(scope.query_value(), "");
        assert_eq!(scope.filter_listing(listing()), json!([]));
    }

    #[test]
    fn it_passes_non_arrays_through() {
        let scope = ListingScope::new(&caller(&["news-read"]), None);
        let error = json!({ "type": "BadRequest" });

        assert_eq!(scope.filter_listing(error.clone()), error);
    }

    #[tokio::test]
    async fn it_narrows_object_references_to_the_callers_filter() -> TestResult {
        let upstream = MemoryUpstream::new()
            .with_flow("f1", "s1", ["news-read"])
            .with_flow("f2", "s1", ["sport-read"]);
        let scope = ListingScope::new(&caller(&["news-read", "sport-read"]), Some("sport-read"));

        let body = json!({ "id": "o1", "referenced_by_flows": ["f1", "f2"] });
        let filtered = filter_object_references(&upstream, &scope, body).await?;

        assert_eq!(filtered, json!({ "id": "o1", "referenced_by_flows": ["f2"] }));
        assert_eq!(upstream.request_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn it_returns_objects_with_emptied_references() -> TestResult {
        let upstream = MemoryUpstream::new().with_flow("f1", "s1", ["news-read"]);
        let scope = ListingScope::new(&caller(&["news-read", "sport-read"]), Some("sport-read"));

        let body = json!({ "id": "o1", "referenced_by_flows": ["f1", "gone"] });
        let filtered = filter_object_references(&upstream, &scope, body).await?;

        assert_eq!(filtered, json!({ "id": "o1", "referenced_by_flows": [] }));
        Ok(())
    }

    #[tokio::test]
    async fn it_leaves_references_alone_without_a_caller_filter() -> TestResult {
        let upstream = MemoryUpstream::new();
        let scope = ListingScope::new(&caller(&["news-read"]), None);

        let body = json!({ "id": "o1", "referenced_by_flows": ["f1"] });
        let filtered = filter_object_references(&upstream, &scope, body.clone()).await?;

        assert_eq!(filtered, body);
        assert_eq!(upstream.request_count(), 0);
        Ok(())
    }
}
