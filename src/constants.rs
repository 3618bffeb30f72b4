//! Application-wide constants for boardsync.
//!
//! Centralizes timing values, cache keys and default user-facing strings so
//! the feedback, push and storage layers agree on them.
//!
//! # Categories
//!
//! - **Timeouts**: HTTP and transient feedback expiry
//! - **Push**: reconnection backoff and keepalive
//! - **Storage**: cache keys and file names

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for API calls.
///
/// Applies to each request against the board API, including the private
/// channel authorization call made by the push transport.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a transient feedback message stays visible before it expires.
pub const FEEDBACK_EXPIRY: Duration = Duration::from_secs(5);

// ============================================================================
// Push transport
// ============================================================================

/// Initial reconnection delay after the push socket drops.
pub const PUSH_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for the exponential reconnection delay.
pub const PUSH_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Activity timeout used until the server announces its own value in
/// `pusher:connection_established`.
pub const PUSH_DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(120);

/// How long to wait for `pusher:pong` after sending our own ping before the
/// connection is considered dead.
pub const PUSH_PONG_TIMEOUT: Duration = Duration::from_secs(30);

/// Pusher wire protocol version spoken by the transport.
pub const PUSHER_PROTOCOL_VERSION: u8 = 7;

/// Prefix Laravel Echo uses for private channels.
pub const PRIVATE_CHANNEL_PREFIX: &str = "private-";

// ============================================================================
// Storage
// ============================================================================

/// Key under which the full notification list is cached.
pub const NOTIFICATIONS_CACHE_KEY: &str = "notifications";

/// Key holding the id of the user the cached list belongs to.
pub const NOTIFICATIONS_OWNER_KEY: &str = "notifications-owner";

/// File holding the session token and user identity.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// File holding the user-editable configuration.
pub const CONFIG_FILE: &str = "config.json";

// ============================================================================
// Default strings
// ============================================================================

/// Banner text shown while a request is in flight.
pub const DEFAULT_LOADING_TEXT: &str = "Loading…";

/// Banner text used when a failed request carries no usable message.
pub const DEFAULT_FALLBACK_ERROR_TEXT: &str = "Something went wrong.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_bounds_are_ordered() {
        assert!(PUSH_INITIAL_BACKOFF < PUSH_MAX_BACKOFF);
    }

    #[test]
    fn test_feedback_expiry_default() {
        assert_eq!(FEEDBACK_EXPIRY, Duration::from_secs(5));
    }
}
