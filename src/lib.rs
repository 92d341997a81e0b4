//! authflow: pluggable multi-step authentication flows.
//!
//! A configured scheme (basic, offline, OAuth 2.0) is driven as a state
//! machine of authentication services. Steps that need the user raise a
//! challenge to the application and resume when it answers, without
//! blocking the calling thread.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use authflow::prelude::*;
//!
//! struct Prompt;
//!
//! impl AuthCallback for Prompt {
//!     fn on_challenge(&self, challenge: Challenge, handler: Arc<CompletionHandler>) {
//!         println!("{} requested", challenge.kind);
//!         handler.cancel();
//!     }
//! }
//!
//! # async fn example() -> authflow::error::Result<()> {
//! let config = AuthConfig::load_from_path("authflow.toml")?;
//! let manager = AuthenticationServiceManager::new(
//!     config,
//!     Arc::new(authflow::transport::ReqwestTransport::new()?),
//!     Arc::new(authflow::store::FileCredentialStore::new_default()),
//!     Arc::new(Prompt),
//! )?;
//! match manager.login(AuthenticationRequest::default()).await? {
//!     LoginOutcome::Authenticated(ctx) => println!("signed in as {:?}", ctx.user_name),
//!     LoginOutcome::Cancelled => println!("cancelled"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod challenge;
pub mod config;
pub mod error;
pub mod prelude;
pub mod store;
pub mod token;
pub mod transport;
