use async_trait::async_trait;

use crate::{Access, AuthClasses, Caller, Capability, TamsAuthzError, Upstream, check_id};

/// What the upstream returned for one filtered object lookup
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectView {
    /// Did the upstream return the object?
    pub exists: bool,
    /// Flows referencing the object that matched the filter
    pub referenced_by_flows: Vec<String>,
}

/// A media object, whose visibility is derived from the flows that
/// reference it.
///
/// Objects carry no auth classes of their own. Each check asks the upstream
/// for the object again, filtered to flows tagged with the caller's groups
/// that grant the capability being checked, and the check passes when any
/// reference survives the filter. Nothing is cached between checks, so a
/// `MediaObject` costs one upstream lookup per check.
#[derive(Debug)]
pub struct MediaObject<'a, U: Upstream + ?Sized> {
    upstream: &'a U,
    id: String,
    exists: bool,
}

impl<'a, U: Upstream + ?Sized> MediaObject<'a, U> {
    /// Look up an object, recording whether it exists. Issues one unfiltered
    /// `GET /objects/{id}`.
    pub async fn fetch(upstream: &'a U, id: &str) -> Result<Self, TamsAuthzError> {
        let response = upstream.get(&Self::path_of(id)?, &[]).await?;

        tracing::debug!(id, exists = response.is_ok(), "Fetched media object");

        Ok(Self {
            upstream,
            id: id.to_string(),
            exists: response.is_ok(),
        })
    }

    fn path_of(id: &str) -> Result<String, TamsAuthzError> {
        Ok(format!("/objects/{}", check_id(id)?))
    }

    /// The object identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Did the priming lookup find the object?
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Look the object up again, keeping only references from flows tagged
    /// with one of `filter`.
    pub async fn view(&self, filter: &AuthClasses) -> Result<ObjectView, TamsAuthzError> {
        let csv = filter.to_csv();
        let response = self
            .upstream
            .get(&Self::path_of(&self.id)?, &[("flow_tag.auth_classes", &csv)])
            .await?;

        if !response.is_ok() {
            return Ok(ObjectView::default());
        }

        let referenced_by_flows = response
            .body
            .get("referenced_by_flows")
            .and_then(|flows| flows.as_array())
            .map(|flows| {
                flows
                    .iter()
                    .filter_map(|flow| flow.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ObjectView {
            exists: true,
            referenced_by_flows,
        })
    }

    async fn check(&self, filter: AuthClasses, throwing: bool) -> Result<bool, TamsAuthzError> {
        let view = self.view(&filter).await?;

        if throwing && !view.exists {
            return Err(TamsAuthzError::NotFound);
        }

        // An empty filter would match every flow upstream
        Ok(!filter.is_empty() && !view.referenced_by_flows.is_empty())
    }
}

#[async_trait]
impl<U: Upstream + ?Sized> Access for MediaObject<'_, U> {
    async fn authorize(
        &self,
        caller: &Caller,
        capability: Capability,
        throwing: bool,
    ) -> Result<bool, TamsAuthzError> {
        let granted = self.check(caller.filter(capability), throwing).await?;

        tracing::debug!(id = %self.id, %capability, granted, "Object authorization decision");

        if throwing && !granted {
            self.authorize_any(caller, true).await?;
            return Err(TamsAuthzError::Forbidden);
        }

        Ok(granted)
    }

    async fn authorize_any(&self, caller: &Caller, throwing: bool) -> Result<bool, TamsAuthzError> {
        let granted = self.check(caller.visible(), throwing).await?;

        if throwing && !granted {
            return Err(TamsAuthzError::NotFound);
        }

        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{GroupClassifier, MemoryUpstream};
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    fn caller(groups: &[&str]) -> Caller {
        Caller::new(Arc::new(GroupClassifier::default()), groups.iter().copied())
    }

    fn upstream() -> MemoryUpstream {
        MemoryUpstream::new()
            .with_source("s1", ["news-read"])
            .with_flow("f1", "s1", ["news-read"])
            .with_flow("f2", "s1", ["sport-write"])
            .with_object("o1", &["f1", "f2"])
    }

    #[tokio::test]
    async fn it_grants_read_through_referencing_flows() -> TestResult {
        let upstream = upstream();
        let object = MediaObject::fetch(&upstream, "o1").await?;
        assert!(object.exists());

        object.require_read(&caller(&["news-read"])).await?;
        assert_eq!(
            upstream.requests(),
            vec![
                "/objects/o1".to_string(),
                "/objects/o1?flow_tag.auth_classes=news-read".to_string()
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_forbids_visible_objects_without_the_capability() -> TestResult {
        let upstream = upstream();
        let object = MediaObject::fetch(&upstream, "o1").await?;

        let result = object.require_write(&caller(&["news-read"])).await;
        assert_eq!(result, Err(TamsAuthzError::Forbidden));

        // Priming lookup, the write check, then the visibility check
        assert_eq!(upstream.request_count(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn it_hides_objects_without_visible_references() -> TestResult {
        let upstream = upstream();
        let object = MediaObject::fetch(&upstream, "o1").await?;

        assert_eq!(
            object.require_read(&caller(&["sport-read"])).await,
            Err(TamsAuthzError::NotFound)
        );
        assert!(!object.permits(&caller(&["weather-read"]), Capability::Read).await?);
        Ok(())
    }

    #[tokio::test]
    async fn it_never_treats_an_empty_filter_as_a_wildcard() -> TestResult {
        let upstream = upstream();
        let object = MediaObject::fetch(&upstream, "o1").await?;

        assert!(!object.permits(&caller(&["team"]), Capability::Read).await?);
        assert_eq!(
            object.authorize_any(&caller(&["team"]), true).await,
            Err(TamsAuthzError::NotFound)
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_reports_missing_objects() -> TestResult {
        let upstream = upstream();
        let object = MediaObject::fetch(&upstream, "nope").await?;
        assert!(!object.exists());

        assert_eq!(
            object.require_read(&caller(&["admin", "news-read"])).await,
            Err(TamsAuthzError::NotFound)
        );
        assert!(!object.permits(&caller(&["news-read"]), Capability::Read).await?);
        Ok(())
    }

    #[tokio::test]
    async fn it_refetches_for_every_check() -> TestResult {
        let upstream = upstream();
        let object = MediaObject::fetch(&upstream, "o1").await?;
        let reader = caller(&["news-read", "sport-write"]);

        object.require_read(&reader).await?;
        object.require_write(&reader).await?;
        object.require_read(&reader).await?;

        assert_eq!(upstream.request_count(), 4);
        Ok(())
    }
}
