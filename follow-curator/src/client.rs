use crate::types::{
    Account, AccountId, ApiConfig, AuthorRef, Page, Post, Result, ServiceError, SocialService,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const USER_FIELDS: &str = "public_metrics";
const TWEET_FIELDS: &str = "created_at,author_id,public_metrics,referenced_tweets,note_tweet";
const MIN_TIMELINE_PAGE: usize = 5;
const MAX_TIMELINE_PAGE: usize = 100;
const MAX_FOLLOWING_PAGE: usize = 1000;

/// `SocialService` over the platform's v2 REST API, authenticated with a
/// user-context bearer token.
pub struct TwitterClient {
    client: Client,
    config: ApiConfig,
    me: OnceCell<AccountId>,
}

impl TwitterClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            config,
            me: OnceCell::new(),
        })
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, ServiceError> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| ServiceError::Transport(format!("Invalid endpoint {}: {}", path, e)))
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, ServiceError> {
        let response = request
            .bearer_auth(&self.config.bearer_token)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_secs = response
            .headers()
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .map(|reset| (reset - Utc::now().timestamp()).max(0) as u64);
        let message = response.text().await.unwrap_or_default();

        Err(classify(status, retry_after_secs, message))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> std::result::Result<T, ServiceError> {
        debug!("GET {}", url.path());
        let response = self.send(self.client.get(url)).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| ServiceError::Decode(e.to_string()))
    }

    async fn me(&self) -> std::result::Result<AccountId, ServiceError> {
        if let Some(id) = self.me.get() {
            return Ok(id.clone());
        }
        Ok(self.verify_credentials().await?.id)
    }

    async fn following_listing<T: DeserializeOwned>(
        &self,
        token: Option<String>,
        user_fields: bool,
    ) -> std::result::Result<Envelope<Vec<T>>, ServiceError> {
        let me = self.me().await?;
        let mut url = self.endpoint(&format!("users/{}/following", me))?;
        {
            let mut query = url.query_pairs_mut();
            let page_size = self.config.page_size.clamp(1, MAX_FOLLOWING_PAGE);
            query.append_pair("max_results", &page_size.to_string());
            if user_fields {
                query.append_pair("user.fields", USER_FIELDS);
            }
            if let Some(token) = &token {
                query.append_pair("pagination_token", token);
            }
        }
        self.get_json(url).await
    }
}

/// Maps a non-success status to the service error taxonomy.
pub fn classify(status: StatusCode, retry_after_secs: Option<u64>, message: String) -> ServiceError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited { retry_after_secs },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Authentication(message),
        _ => ServiceError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl SocialService for TwitterClient {
    async fn verify_credentials(&self) -> std::result::Result<Account, ServiceError> {
        let mut url = self.endpoint("users/me")?;
        url.query_pairs_mut().append_pair("user.fields", USER_FIELDS);

        let envelope: Envelope<WireUser> = self.get_json(url).await?;
        let account = match envelope.data {
            Some(user) => Account::from(user),
            None => return Err(ServiceError::Authentication(describe(&envelope.errors))),
        };
        // A concurrent caller may have set it first; both saw the same identity.
        let _ = self.me.set(account.id.clone());
        Ok(account)
    }

    async fn followings_page(
        &self,
        token: Option<String>,
    ) -> std::result::Result<Page<Account>, ServiceError> {
        let envelope: Envelope<Vec<WireUser>> = self.following_listing(token, true).await?;
        Ok(Page {
            items: envelope.data.unwrap_or_default().into_iter().map(Account::from).collect(),
            next_token: envelope.meta.and_then(|m| m.next_token),
        })
    }

    async fn followed_ids_page(
        &self,
        token: Option<String>,
    ) -> std::result::Result<Page<AccountId>, ServiceError> {
        let envelope: Envelope<Vec<WireUserId>> = self.following_listing(token, false).await?;
        Ok(Page {
            items: envelope.data.unwrap_or_default().into_iter().map(|u| AccountId(u.id)).collect(),
            next_token: envelope.meta.and_then(|m| m.next_token),
        })
    }

    async fn recent_posts(
        &self,
        account: &AccountId,
        count: usize,
    ) -> std::result::Result<Vec<Post>, ServiceError> {
        let mut posts = Vec::new();
        let mut token: Option<String> = None;

        while posts.len() < count {
            let want = (count - posts.len()).clamp(MIN_TIMELINE_PAGE, MAX_TIMELINE_PAGE);
            let mut url = self.endpoint(&format!("users/{}/tweets", account))?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("max_results", &want.to_string());
                query.append_pair("tweet.fields", TWEET_FIELDS);
                query.append_pair("expansions", "author_id");
                query.append_pair("user.fields", USER_FIELDS);
                if let Some(token) = &token {
                    query.append_pair("pagination_token", token);
                }
            }

            let envelope: Envelope<Vec<WireTweet>> = self.get_json(url).await?;
            token = absorb_timeline(&mut posts, envelope, account);
            if token.is_none() {
                break;
            }
        }

        posts.truncate(count);
        Ok(posts)
    }

    async fn unfollow(&self, account: &AccountId) -> std::result::Result<(), ServiceError> {
        let me = self.me().await?;
        let url = self.endpoint(&format!("users/{}/following/{}", me, account))?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}

/// Appends the usable records of one timeline page to `posts`.
///
/// Returns the token of the next page, or `None` once the listing has ended.
/// Records dropped here do not end the listing, so the caller keeps paging
/// until it holds the requested count or the history runs out.
fn absorb_timeline(
    posts: &mut Vec<Post>,
    envelope: Envelope<Vec<WireTweet>>,
    account: &AccountId,
) -> Option<String> {
    let authors: HashMap<String, WireUser> = envelope
        .includes
        .users
        .into_iter()
        .map(|user| (user.id.clone(), user))
        .collect();
    let page = envelope.data.unwrap_or_default();
    if page.is_empty() {
        return None;
    }
    posts.extend(page.into_iter().filter_map(|tweet| tweet.into_post(account, &authors)));
    envelope.meta.and_then(|m| m.next_token)
}

fn describe(problems: &[Problem]) -> String {
    if problems.is_empty() {
        return "no account returned for the session".to_string();
    }
    problems
        .iter()
        .map(|p| p.detail.clone().or_else(|| p.title.clone()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    includes: Includes,
    meta: Option<Meta>,
    #[serde(default)]
    errors: Vec<Problem>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<WireUser>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Problem {
    title: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUserId {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WireUser {
    id: String,
    name: String,
    username: String,
    public_metrics: Option<UserMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct UserMetrics {
    #[serde(default)]
    tweet_count: u64,
}

impl From<WireUser> for Account {
    fn from(user: WireUser) -> Self {
        Self {
            id: AccountId(user.id),
            name: user.name,
            screen_name: user.username,
            statuses_count: user.public_metrics.map(|m| m.tweet_count).unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireTweet {
    id: String,
    text: Option<String>,
    note_tweet: Option<NoteTweet>,
    created_at: Option<DateTime<Utc>>,
    author_id: Option<String>,
    #[serde(default)]
    public_metrics: TweetMetrics,
    #[serde(default)]
    referenced_tweets: Vec<ReferencedTweet>,
}

#[derive(Debug, Deserialize)]
struct NoteTweet {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct TweetMetrics {
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    retweet_count: u64,
}

#[derive(Debug, Deserialize)]
struct ReferencedTweet {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

impl WireTweet {
    fn into_post(
        self,
        timeline_owner: &AccountId,
        authors: &HashMap<String, WireUser>,
    ) -> Option<Post> {
        let Some(created_at) = self.created_at else {
            warn!("Skipping post {} without a creation time", self.id);
            return None;
        };

        // Long posts carry their full body in the note variant.
        let text = match (self.note_tweet, self.text) {
            (Some(note), _) => note.text,
            (None, Some(text)) => text,
            (None, None) => {
                warn!("Post {} carries no text", self.id);
                String::new()
            }
        };

        let author_id = self.author_id.unwrap_or_else(|| timeline_owner.to_string());
        let author = match authors.get(&author_id) {
            Some(user) => AuthorRef {
                id: AccountId(user.id.clone()),
                screen_name: user.username.clone(),
                name: user.name.clone(),
            },
            None => AuthorRef {
                id: AccountId(author_id),
                screen_name: String::new(),
                name: String::new(),
            },
        };

        let in_reply_to = self
            .referenced_tweets
            .into_iter()
            .find(|r| r.kind == "replied_to")
            .map(|r| r.id);

        Some(Post {
            id: self.id,
            created_at,
            text,
            author,
            in_reply_to,
            favorite_count: self.public_metrics.like_count,
            retweet_count: self.public_metrics.retweet_count,
        })
    }
}
