use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A capability a group may grant on the resources tagged with it.
///
/// [`Capability::Admin`] is not a stronger form of the other three; it is a
/// separate capability that bypasses resource-level checks altogether.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Permission to see a resource
    Read,
    /// Permission to modify a resource
    Write,
    /// Permission to remove a resource
    Delete,
    /// Full access, bypassing resource checks
    Admin,
}

#[cfg(test)]
impl Capability {
    /// All capabilities, in classification order
    pub const ALL: [Capability; 4] = [
        Capability::Admin,
        Capability::Read,
        Capability::Write,
        Capability::Delete,
    ];
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Read => write!(f, "read"),
            Capability::Write => write!(f, "write"),
            Capability::Delete => write!(f, "delete"),
            Capability::Admin => write!(f, "admin"),
        }
    }
}

/// Maps group names to the capability they grant.
///
/// The default rule grants [`Capability::Admin`] to the exact group `admin`
/// and otherwise classifies by suffix: `…read`, `…write` and `…delete`.
/// Every part of the rule can be overridden with the `with_*` builders.
///
/// ```rust
/// use tams_authz::{Capability, GroupClassifier};
///
/// let classifier = GroupClassifier::default();
/// assert_eq!(classifier.capability_of("news-read"), Some(Capability::Read));
/// assert_eq!(classifier.capability_of("admin"), Some(Capability::Admin));
/// assert_eq!(classifier.capability_of("news"), None);
///
/// let custom = GroupClassifier::default().with_read_suffix(":viewer");
/// assert_eq!(custom.capability_of("news:viewer"), Some(Capability::Read));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupClassifier {
    read_suffix: String,
    write_suffix: String,
    delete_suffix: String,
    admin_group: String,
}

impl Default for GroupClassifier {
    fn default() -> Self {
        Self {
            read_suffix: "read".to_string(),
            write_suffix: "write".to_string(),
            delete_suffix: "delete".to_string(),
            admin_group: "admin".to_string(),
        }
    }
}

impl GroupClassifier {
    /// Set the suffix that marks a read-granting group
    pub fn with_read_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.read_suffix = suffix.into();
        self
    }

    /// Set the suffix that marks a write-granting group
    pub fn with_write_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.write_suffix = suffix.into();
        self
    }

    /// Set the suffix that marks a delete-granting group
    pub fn with_delete_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.delete_suffix = suffix.into();
        self
    }

    /// Set the sentinel group that grants admin
    pub fn with_admin_group(mut self, group: impl Into<String>) -> Self {
        self.admin_group = group.into();
        self
    }

    /// Classify a single group. A group grants at most one capability.
    pub fn capability_of(&self, group: &str) -> Option<Capability> {
        if group == self.admin_group {
            Some(Capability::Admin)
        } else if group.ends_with(&self.read_suffix) {
            Some(Capability::Read)
        } else if group.ends_with(&self.write_suffix) {
            Some(Capability::Write)
        } else if group.ends_with(&self.delete_suffix) {
            Some(Capability::Delete)
        } else {
            None
        }
    }

    /// Does `group` grant `capability`?
    pub fn grants(&self, group: &str, capability: Capability) -> bool {
        self.capability_of(group) == Some(capability)
    }

    /// Does any of `groups` grant `capability`?
    pub fn any_has<I, S>(&self, groups: I, capability: Capability) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        groups
            .into_iter()
            .any(|group| self.grants(group.as_ref(), capability))
    }

    /// Does any of `groups` grant any capability at all?
    pub fn any_visible<I, S>(&self, groups: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        groups
            .into_iter()
            .any(|group| self.capability_of(group.as_ref()).is_some())
    }

    /// Is any of `groups` the admin sentinel?
    pub fn is_admin<I, S>(&self, groups: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.any_has(groups, Capability::Admin)
    }

    /// Keep only the groups granting `capability`
    pub fn filter<I, S>(&self, groups: I, capability: Capability) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        groups
            .into_iter()
            .filter(|group| self.grants(group.as_ref(), capability))
            .map(|group| group.as_ref().to_string())
            .collect()
    }

    /// Keep only the groups granting some capability
    pub fn filter_visible<I, S>(&self, groups: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        groups
            .into_iter()
            .filter(|group| self.capability_of(group.as_ref()).is_some())
            .map(|group| group.as_ref().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_classifies_by_suffix() {
        let classifier = GroupClassifier::default();

        assert_eq!(classifier.capability_of("news-read"), Some(Capability::Read));
        assert_eq!(classifier.capability_of("news-write"), Some(Capability::Write));
        assert_eq!(
            classifier.capability_of("news-delete"),
            Some(Capability::Delete)
        );
        assert_eq!(classifier.capability_of("read-news"), None);
        assert_eq!(classifier.capability_of(""), None);
    }

    #[test]
    fn it_only_treats_the_exact_sentinel_as_admin() {
        let classifier = GroupClassifier::default();

        assert_eq!(classifier.capability_of("admin"), Some(Capability::Admin));
        assert_eq!(classifier.capability_of("news-admin"), None);
        assert!(classifier.is_admin(["news-read", "admin"]));
        assert!(!classifier.is_admin(["news-read", "administrator"]));
    }

    #[test]
    fn it_filters_groups_by_capability() {
        let classifier = GroupClassifier::default();
        let groups = ["a-read", "b-write", "c-read", "d-delete", "unrelated"];

        assert_eq!(
            classifier.filter(groups, Capability::Read),
            vec!["a-read".to_string(), "c-read".to_string()]
        );
        assert_eq!(classifier.filter(groups, Capability::Admin), Vec::<String>::new());
        assert_eq!(classifier.filter_visible(groups).len(), 4);
        assert!(classifier.any_has(groups, Capability::Delete));
        assert!(!classifier.any_visible(["unrelated"]));
    }

    #[test]
    fn it_honours_overridden_rules() {
        let classifier = GroupClassifier::default()
            .with_read_suffix(":viewer")
            .with_write_suffix(":editor")
            .with_delete_suffix(":owner")
            .with_admin_group("root");

        assert_eq!(classifier.capability_of("x:viewer"), Some(Capability::Read));
        assert_eq!(classifier.capability_of("x:editor"), Some(Capability::Write));
        assert_eq!(classifier.capability_of("x:owner"), Some(Capability::Delete));
        assert_eq!(classifier.capability_of("root"), Some(Capability::Admin));
        assert_eq!(classifier.capability_of("x-read"), None);
        assert_eq!(classifier.capability_of("admin"), None);
    }
}
