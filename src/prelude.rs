//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthCallback, AuthenticationContext, AuthenticationRequest, AuthenticationServiceManager,
    LoginOutcome, Status,
};
pub use crate::challenge::{Challenge, ChallengeType, CompletionHandler, InputParams};
pub use crate::config::{AuthConfig, AuthScheme};
pub use crate::error::{AuthError, ErrorCode, Result};
pub use crate::store::CredentialStore;
pub use crate::token::{Cookie, OAuthMSToken, OAuthToken, Token};
