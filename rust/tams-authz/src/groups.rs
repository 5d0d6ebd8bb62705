use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Capability, GroupClassifier, TamsAuthzError};

/// An unordered set of class or group names.
///
/// Used both for the `auth_classes` tag on a resource and for the groups a
/// caller holds; the two are compared by intersection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthClasses(BTreeSet<String>);

impl AuthClasses {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated query parameter value. Empty entries are
    /// skipped, so `""` yields the empty set.
    pub fn from_csv(value: &str) -> Self {
        value
            .split(',')
            .map(str::trim)
            .filter(|class| !class.is_empty())
            .collect()
    }

    /// Render as a comma-separated query parameter value
    pub fn to_csv(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    }

    /// Read the `tags.auth_classes` list out of a resource representation.
    /// Missing or malformed tags yield the empty set.
    pub fn from_tags(resource: &serde_json::Value) -> Self {
        resource
            .get("tags")
            .and_then(|tags| tags.get("auth_classes"))
            .map(Self::from_json)
            .unwrap_or_default()
    }

    /// Read a JSON list of strings. Non-string entries are ignored.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str())
                .map(str::to_string)
                .collect(),
            _ => Self::default(),
        }
    }

    /// Read a proposed `auth_classes` value from a request.
    ///
    /// Unlike [AuthClasses::from_json] this is strict: anything but a list
    /// of strings is refused, so a malformed proposal is never mistaken for
    /// removing every class.
    pub fn proposed(value: &serde_json::Value) -> Result<Self, TamsAuthzError> {
        let invalid = || TamsAuthzError::invalid("`auth_classes` must be a list of strings");

        value
            .as_array()
            .ok_or_else(invalid)?
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect()
    }

    /// Read the proposed `tags.auth_classes` out of a request body.
    /// A body without that tag proposes the empty set.
    pub fn proposed_in_tags(body: &serde_json::Value) -> Result<Self, TamsAuthzError> {
        match body.get("tags").and_then(|tags| tags.get("auth_classes")) {
            Some(value) => Self::proposed(value),
            None => Ok(Self::new()),
        }
    }

    /// Does the set contain `class`?
    pub fn contains(&self, class: &str) -> bool {
        self.0.contains(class)
    }

    /// Is the set empty?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate the entries in lexical order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Entries present in both sets
    pub fn intersection(&self, other: &AuthClasses) -> AuthClasses {
        self.0.intersection(&other.0).cloned().collect()
    }

    /// Entries present in exactly one of the two sets
    pub fn symmetric_difference(&self, other: &AuthClasses) -> AuthClasses {
        self.0.symmetric_difference(&other.0).cloned().collect()
    }

    /// Do the two sets share at least one entry?
    pub fn intersects(&self, other: &AuthClasses) -> bool {
        self.0.intersection(&other.0).next().is_some()
    }
}

impl<S: Into<String>> FromIterator<S> for AuthClasses {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a AuthClasses {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The authenticated party a request is made on behalf of: the groups from
/// its token, and the rule that classifies them.
#[derive(Debug, Clone)]
pub struct Caller {
    groups: AuthClasses,
    classifier: Arc<GroupClassifier>,
}

impl Caller {
    /// Create a caller holding `groups`
    pub fn new<I, S>(classifier: Arc<GroupClassifier>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups.into_iter().collect(),
            classifier,
        }
    }

    /// All groups held by the caller
    pub fn groups(&self) -> &AuthClasses {
        &self.groups
    }

    /// The classification rule in force
    pub fn classifier(&self) -> &GroupClassifier {
        &self.classifier
    }

    /// Does the caller hold the admin sentinel?
    pub fn is_admin(&self) -> bool {
        self.classifier.is_admin(&self.groups)
    }

    /// The caller's groups granting `capability`
    pub fn filter(&self, capability: Capability) -> AuthClasses {
        self.classifier
            .filter(&self.groups, capability)
            .into_iter()
            .collect()
    }

    /// The caller's groups granting any capability
    pub fn visible(&self) -> AuthClasses {
        self.classifier
            .filter_visible(&self.groups)
            .into_iter()
            .collect()
    }

    /// The caller's groups granting [`Capability::Read`]
    pub fn readable(&self) -> AuthClasses {
        self.filter(Capability::Read)
    }
}
