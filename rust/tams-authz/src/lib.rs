#![warn(missing_docs)]

//! Authorization decisions for a TAMS media-asset API.
//!
//! Callers are identified by the groups listed in their bearer token. A
//! [GroupClassifier] maps each group to the [Capability] it grants, and
//! resources (sources, flows and webhooks) carry `auth_classes` tags naming
//! the groups that may act on them. A caller may act on a [Resource] when
//! one of their groups is also one of its auth classes and grants the
//! capability in question.
//!
//! ```rust
//! use std::sync::Arc;
//! use tams_authz::{Caller, Capability, GroupClassifier, Resource, ResourceKind, TamsAuthzError};
//!
//! let caller = Caller::new(Arc::new(GroupClassifier::default()), ["news-read"]);
//! let flow = Resource::new(ResourceKind::Flow, "f1", ["news-read", "news-write"]);
//!
//! assert_eq!(flow.decide(&caller, Capability::Read, true), Ok(true));
//! assert_eq!(
//!     flow.decide(&caller, Capability::Write, true),
//!     Err(TamsAuthzError::Forbidden)
//! );
//! ```
//!
//! Everything the engine knows about a resource comes from one lookup
//! through an [Upstream]. [RestUpstream] talks to the real API;
//! `MemoryUpstream` (feature `helpers`) stands in for it in tests.

mod access;
pub use access::*;

mod classifier;
pub use classifier::*;

mod error;
pub use error::*;

mod groups;
pub use groups::*;

mod link;
pub use link::*;

mod listing;
pub use listing::*;

mod mutation;
pub use mutation::*;

mod object;
pub use object::*;

mod resource;
pub use resource::*;

mod upstream;
pub use upstream::*;

mod webhook;
pub use webhook::*;
