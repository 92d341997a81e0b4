//! Machine-readable error codes and categories.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    UsernameRequired,
    PasswordRequired,
    IdentityDomainRequired,
    UsernameAndIdentityDomainRequired,
    InvalidAuthenticationScheme,
    AuthenticationFailed,
    #[serde(rename = "oauth_authentication_failed")]
    #[strum(serialize = "oauth_authentication_failed")]
    OAuthAuthenticationFailed,
    MaxRetriesReached,
    UserCanceledAuthentication,
    MalformedToken,
    ProtocolError,
    ChallengeAlreadyPending,
    OfflineCredentialsUnavailable,
    NetworkError,
    InternalError,
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Protocol,
    Validation,
    Token,
    Authentication,
    Network,
    Storage,
    Internal,
}
