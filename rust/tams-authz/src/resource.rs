use std::fmt::{Display, Formatter};

use async_trait::async_trait;

use crate::{Access, AuthClasses, Caller, Capability, TamsAuthzError, Upstream};

/// The kinds of tag-bearing resource the upstream exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A source (`/sources/{id}`)
    Source,
    /// A flow (`/flows/{id}`)
    Flow,
    /// A webhook subscription (`/service/webhooks/{id}`)
    Webhook,
}

impl ResourceKind {
    /// Upstream path of the resource with identifier `id`
    pub fn path(&self, id: &str) -> Result<String, TamsAuthzError> {
        let id = check_id(id)?;

        Ok(match self {
            ResourceKind::Source => format!("/sources/{id}"),
            ResourceKind::Flow => format!("/flows/{id}"),
            ResourceKind::Webhook => format!("/service/webhooks/{id}"),
        })
    }
}

/// Accept `id` only if it is a single, literal path segment.
///
/// Identifiers arrive percent-decoded, from routes and from request bodies.
/// One holding a separator, a query or fragment marker, an escape or a dot
/// segment would address a different upstream resource than the request
/// being authorized.
pub fn check_id(id: &str) -> Result<&str, TamsAuthzError> {
    let reserved = |c: char| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control();

    if id.is_empty() || id == "." || id == ".." || id.contains(reserved) {
        return Err(TamsAuthzError::invalid(format!("Invalid identifier {id:?}")));
    }

    Ok(id)
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Source => write!(f, "source"),
            ResourceKind::Flow => write!(f, "flow"),
            ResourceKind::Webhook => write!(f, "webhook"),
        }
    }
}

/// A snapshot of a source, flow or webhook taken from the upstream.
///
/// Built by exactly one lookup and read-only afterwards. A resource that the
/// upstream did not return is still a valid snapshot, with `exists == false`
/// and no auth classes; what that means is up to the check made against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    kind: ResourceKind,
    id: String,
    exists: bool,
    auth_classes: AuthClasses,
    source_id: Option<String>,
}

impl Resource {
    /// Look up a resource. Issues exactly one `GET` to the upstream.
    pub async fn fetch<U>(upstream: &U, kind: ResourceKind, id: &str) -> Result<Self, TamsAuthzError>
    where
        U: Upstream + ?Sized,
    {
        let response = upstream.get(&kind.path(id)?, &[]).await?;

        let resource = if response.is_ok() {
            Self {
                kind,
                id: id.to_string(),
                exists: true,
                auth_classes: AuthClasses::from_tags(&response.body),
                source_id: match kind {
                    ResourceKind::Flow => response
                        .body
                        .get("source_id")
                        .and_then(|source_id| source_id.as_str())
                        .map(str::to_string),
                    _ => None,
                },
            }
        } else {
            Self::missing(kind, id)
        };

        tracing::debug!(
            %kind,
            id,
            exists = resource.exists,
            auth_classes = %resource.auth_classes.to_csv(),
            "Fetched resource"
        );

        Ok(resource)
    }

    /// Look up a source
    pub async fn source<U: Upstream + ?Sized>(upstream: &U, id: &str) -> Result<Self, TamsAuthzError> {
        Self::fetch(upstream, ResourceKind::Source, id).await
    }

    /// Look up a flow
    pub async fn flow<U: Upstream + ?Sized>(upstream: &U, id: &str) -> Result<Self, TamsAuthzError> {
        Self::fetch(upstream, ResourceKind::Flow, id).await
    }

    /// Look up a webhook
    pub async fn webhook<U: Upstream + ?Sized>(upstream: &U, id: &str) -> Result<Self, TamsAuthzError> {
        Self::fetch(upstream, ResourceKind::Webhook, id).await
    }

    /// A snapshot of an existing resource
    pub fn new<I, S>(kind: ResourceKind, id: impl Into<String>, auth_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            id: id.into(),
            exists: true,
            auth_classes: auth_classes.into_iter().collect(),
            source_id: None,
        }
    }

    /// A snapshot of a resource the upstream did not return
    pub fn missing(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            exists: false,
            auth_classes: AuthClasses::new(),
            source_id: None,
        }
    }

    /// Attach the owning source of a flow
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// What kind of resource this is
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The resource identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Did the upstream return the resource?
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// The resource's `auth_classes` tag
    pub fn auth_classes(&self) -> &AuthClasses {
        &self.auth_classes
    }

    /// The owning source, for flows
    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// The caller's groups that are also auth classes of this resource
    pub fn effective(&self, caller: &Caller) -> AuthClasses {
        self.auth_classes.intersection(caller.groups())
    }

    /// Decide a capability check without awaiting anything.
    ///
    /// See [`Access`] for the meaning of `throwing`.
    pub fn decide(
        &self,
        caller: &Caller,
        capability: Capability,
        throwing: bool,
    ) -> Result<bool, TamsAuthzError> {
        if throwing && !self.exists {
            return Err(TamsAuthzError::NotFound);
        }

        let effective = self.effective(caller);
        let granted = caller.classifier().any_has(&effective, capability);

        tracing::debug!(
            kind = %self.kind,
            id = %self.id,
            %capability,
            granted,
            "Authorization decision"
        );

        if throwing && !granted {
            self.decide_any(caller, true)?;
            return Err(TamsAuthzError::Forbidden);
        }

        Ok(granted)
    }

    /// Decide whether the caller holds any capability, without awaiting.
    pub fn decide_any(&self, caller: &Caller, throwing: bool) -> Result<bool, TamsAuthzError> {
        if throwing && !self.exists {
            return Err(TamsAuthzError::NotFound);
        }

        let granted = caller.classifier().any_visible(&self.effective(caller));

        if throwing && !granted {
            return Err(TamsAuthzError::NotFound);
        }

        Ok(granted)
    }
}

#[async_trait]
impl Access for Resource {
    async fn authorize(
        &self,
        caller: &Caller,
        capability: Capability,
        throwing: bool,
    ) -> Result<bool, TamsAuthzError> {
        self.decide(caller, capability, throwing)
    }

    async fn authorize_any(&self, caller: &Caller, throwing: bool) -> Result<bool, TamsAuthzError> {
        self.decide_any(caller, throwing)
    }
}
