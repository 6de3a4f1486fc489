//! Session tokens and refresh scheduling.

use crate::message::AuthResult;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use zeroize::Zeroizing;

/// When to refresh an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Refresh this long before the token expires.
    pub safety_margin: Duration,
    /// On the test network the token is refreshed this long after issue,
    /// regardless of its advertised lifetime.
    pub testnet_refresh_after: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(240),
            testnet_refresh_after: Duration::from_secs(300),
        }
    }
}

impl RefreshPolicy {
    /// Refresh deadline for a token issued at `now`.
    pub fn deadline(&self, now: DateTime<Utc>, expires_in_secs: i64, testnet: bool) -> DateTime<Utc> {
        let after_secs = if testnet {
            self.testnet_refresh_after.as_secs() as i64
        } else {
            (expires_in_secs - self.safety_margin.as_secs() as i64).max(0)
        };
        now + ChronoDuration::seconds(after_secs)
    }
}

/// Tokens of an authenticated session.
pub struct SessionTokens {
    access_token: Zeroizing<String>,
    refresh_token: Zeroizing<String>,
    issued_at: DateTime<Utc>,
    refresh_deadline: DateTime<Utc>,
}

impl SessionTokens {
    pub fn from_auth(auth: AuthResult, now: DateTime<Utc>, testnet: bool, policy: &RefreshPolicy) -> Self {
        Self {
            refresh_deadline: policy.deadline(now, auth.expires_in, testnet),
            access_token: Zeroizing::new(auth.access_token),
            refresh_token: Zeroizing::new(auth.refresh_token),
            issued_at: now,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn refresh_deadline(&self) -> DateTime<Utc> {
        self.refresh_deadline
    }

    pub fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_deadline
    }
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("issued_at", &self.issued_at)
            .field("refresh_deadline", &self.refresh_deadline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(expires_in: i64) -> AuthResult {
        AuthResult {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_in,
            scope: None,
        }
    }

    #[test]
    fn test_production_deadline_uses_margin() {
        let policy = RefreshPolicy::default();
        let now = Utc::now();
        let tokens = SessionTokens::from_auth(auth(900), now, false, &policy);
        assert_eq!(tokens.refresh_deadline(), now + ChronoDuration::seconds(660));
        assert!(!tokens.refresh_due(now));
        assert!(tokens.refresh_due(now + ChronoDuration::seconds(660)));
    }

    #[test]
    fn test_testnet_deadline_is_fixed() {
        let policy = RefreshPolicy::default();
        let now = Utc::now();
        assert_eq!(
            policy.deadline(now, 31_536_000, true),
            now + ChronoDuration::seconds(300)
        );
    }

    #[test]
    fn test_short_lived_token_refreshes_immediately() {
        let policy = RefreshPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.deadline(now, 60, false), now);
    }

    #[test]
    fn test_debug_hides_tokens() {
        let result = AuthResult {
            access_token: "access-secret".to_string(),
            refresh_token: "refresh-secret".to_string(),
            expires_in: 900,
            scope: None,
        };
        let tokens = SessionTokens::from_auth(result, Utc::now(), false, &RefreshPolicy::default());
        let rendered = format!("{tokens:?}");
        assert!(!rendered.contains("secret"));
        assert_eq!(tokens.access_token(), "access-secret");
        assert_eq!(tokens.refresh_token(), "refresh-secret");
    }
}
