//! Explicit hub auth session.
//!
//! The transport layer authenticates to the hub with a bearer token obtained
//! through a challenge/response. Instead of caching that token in a hidden
//! process-wide slot, callers own a [`HubSession`] value, pass it to every
//! request, and refresh it on demand through a [`SessionProvider`].

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, Result, constants};

/// Issues fresh bearer tokens for an address (the challenge/response round
/// trip lives behind this trait).
pub trait SessionProvider {
    fn issue(&self, address: Address) -> impl Future<Output = Result<String>> + Send;
}

/// A caller-owned authentication session with the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSession {
    pub address: Address,
    token: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    ttl_secs: i64,
}

impl HubSession {
    /// An unauthenticated session for `address`.
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self {
            address,
            token: None,
            issued_at: None,
            ttl_secs: constants::DEFAULT_SESSION_TTL_SECS,
        }
    }

    #[must_use]
    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// The bearer token, if one has been issued and has not expired.
    #[must_use]
    pub fn token(&self, now: DateTime<Utc>) -> Option<&str> {
        if self.is_valid(now) {
            self.token.as_deref()
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.issued_at) {
            (Some(_), Some(issued)) => now < issued + Duration::seconds(self.ttl_secs),
            _ => false,
        }
    }

    /// True when the token is missing or within the refresh margin of expiry.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        let margin = Duration::seconds(constants::SESSION_REFRESH_MARGIN_SECS);
        !self.is_valid(now + margin)
    }

    /// Drop the token, e.g. after the hub answered 401.
    pub fn invalidate(&mut self) {
        self.token = None;
        self.issued_at = None;
    }

    /// Refresh the token through `provider` if needed; returns the usable token.
    pub async fn refresh_with<P: SessionProvider>(
        &mut self,
        provider: &P,
        now: DateTime<Utc>,
    ) -> Result<&str> {
        if self.needs_refresh(now) {
            let token = provider.issue(self.address).await?;
            self.token = Some(token);
            self.issued_at = Some(now);
        }
        Ok(self.token.as_deref().unwrap_or_default())
    }
}
