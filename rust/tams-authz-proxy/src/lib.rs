//! An authorization-enforcing reverse proxy for a TAMS media-asset API.
//!
//! Every request carries a bearer token naming the caller's groups. The
//! proxy checks the request against the `auth_classes` of the sources,
//! flows, objects and webhooks it touches, using [tams_authz], and then
//! forwards it unchanged (or, for listings and webhooks, rewritten) to the
//! upstream API. Admins are forwarded without route checks.
//!
//! ```no_run
//! use tams_authz_credentials::KeySet;
//! use tams_authz_proxy::{AppState, ProxyConfig, router};
//!
//! # async fn example(config: ProxyConfig) -> anyhow::Result<()> {
//! let keys = KeySet::fetch(&config.jwks_url).await?;
//! let app = router(AppState::from_config(&config, keys)?);
//!
//! let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

mod cli;
pub use cli::*;

mod error;
pub use error::*;

mod forward;
pub use forward::*;

mod guard;
pub use guard::*;

mod state;
pub use state::*;

pub mod routes;
pub use routes::router;
