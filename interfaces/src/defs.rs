use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a remote account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<u64> for AccountId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Account record as reported by the remote service. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub screen_name: String,
    pub statuses_count: u64,
}

/// The author fields carried on every post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: AccountId,
    pub screen_name: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub author: AuthorRef,
    /// Id of the post this one replies to. `None` for original posts.
    pub in_reply_to: Option<String>,
    pub favorite_count: u64,
    pub retweet_count: u64,
}

impl Post {
    pub fn is_reply(&self) -> bool {
        self.in_reply_to.is_some()
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next_token: None }
    }
}

/// Output of a sentiment oracle. Polarity in [-1, 1], subjectivity in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub subjectivity: f64,
    pub polarity: f64,
}

impl Sentiment {
    pub const NEUTRAL: Sentiment = Sentiment { subjectivity: 0.0, polarity: 0.0 };

    /// Builds a sentiment with both scalars clamped into their ranges.
    pub fn clamped(polarity: f64, subjectivity: f64) -> Self {
        Self {
            polarity: polarity.clamp(-1.0, 1.0),
            subjectivity: subjectivity.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("Rate limited by remote service")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ServiceError::RateLimited { .. })
    }
}

/// The remote social platform, acting as one authenticated identity.
#[async_trait]
pub trait SocialService: Send + Sync {
    /// Checks the session and returns the authenticated account.
    async fn verify_credentials(&self) -> Result<Account, ServiceError>;

    /// One page of the accounts the authenticated identity follows.
    async fn followings_page(&self, token: Option<String>) -> Result<Page<Account>, ServiceError>;

    /// One page of the ids the authenticated identity follows.
    async fn followed_ids_page(&self, token: Option<String>) -> Result<Page<AccountId>, ServiceError>;

    /// Up to `count` most recent posts of `account`, in the service's order.
    /// Fewer than `count` means the available history is exhausted.
    async fn recent_posts(&self, account: &AccountId, count: usize) -> Result<Vec<Post>, ServiceError>;

    /// Severs the follow relationship to `account`.
    async fn unfollow(&self, account: &AccountId) -> Result<(), ServiceError>;
}

/// Pure text scorer.
pub trait SentimentOracle: Send + Sync {
    fn score(&self, text: &str) -> Sentiment;
}
