use chrono::{DateTime, Utc};
use std::env;
use std::time::Duration;
use url::Url;

// Use the interfaces crate for core types
pub use interfaces::defs::{
    Account, AccountId, AuthorRef, Page, Post, Sentiment, SentimentOracle, ServiceError, SocialService,
};

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com/2/";
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_MAX_AGE_DAYS: i64 = 365;
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

/// Transport and credential settings for the remote service.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub bearer_token: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub page_size: usize,
}

impl ApiConfig {
    pub fn new(bearer_token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(DEFAULT_API_BASE)?,
            bearer_token: bearer_token.into(),
            user_agent: "follow-curator/0.1".to_string(),
            timeout_seconds: 30,
            page_size: 1000,
        })
    }

    /// Reads settings from the environment, loading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let token = env::var("TWITTER_BEARER_TOKEN")
            .map_err(|_| CuratorError::Config("TWITTER_BEARER_TOKEN is not set".to_string()))?;
        let mut config = Self::new(token)?;

        if let Ok(base) = env::var("TWITTER_API_BASE") {
            config.base_url = Url::parse(&base)?;
        }
        if let Ok(agent) = env::var("TWITTER_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Ok(timeout) = env::var("TWITTER_TIMEOUT_SECONDS") {
            config.timeout_seconds = timeout
                .parse()
                .map_err(|_| CuratorError::Config(format!("Invalid TWITTER_TIMEOUT_SECONDS: {}", timeout)))?;
        }

        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct CurationConfig {
    pub max_age_days: i64,
    pub batch_size: usize,
    pub rate_limit_cooldown: Duration,
    pub dry_run: bool,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            batch_size: DEFAULT_BATCH_SIZE,
            rate_limit_cooldown: RATE_LIMIT_COOLDOWN,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub days: i64,
    pub max_posts_per_account: usize,
    pub batch_size: usize,
    pub rate_limit_cooldown: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            days: 7,
            max_posts_per_account: 100,
            batch_size: DEFAULT_BATCH_SIZE,
            rate_limit_cooldown: RATE_LIMIT_COOLDOWN,
        }
    }
}

/// Start of a window reaching `days` whole days back from `now`.
pub fn window_start(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    chrono::Duration::try_days(days)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| CuratorError::Config(format!("A window of {} days is out of range", days)))
}

#[derive(Debug, thiserror::Error)]
pub enum CuratorError {
    #[error("Remote service error: {0}")]
    Service(#[from] ServiceError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

impl CuratorError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, CuratorError::Service(ServiceError::Authentication(_)))
    }
}

pub type Result<T> = std::result::Result<T, CuratorError>;
