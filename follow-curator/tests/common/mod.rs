#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use follow_curator::{Account, AccountId, AuthorRef, Page, Post, RateLimitPolicy, ServiceError, Sleeper, SocialService};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const COOLDOWN: std::time::Duration = std::time::Duration::from_secs(15 * 60);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Log sink for asserting on what a run reports.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Routes this thread's events here until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: Mutex<Vec<std::time::Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: std::time::Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

pub fn policy() -> (RateLimitPolicy, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    (RateLimitPolicy::with_sleeper(COOLDOWN, sleeper.clone()), sleeper)
}

pub fn account(id: &str, handle: &str) -> Account {
    Account {
        id: AccountId::from(id),
        name: handle.to_uppercase(),
        screen_name: handle.to_string(),
        statuses_count: 0,
    }
}

pub fn post(id: &str, author: &str, created_at: DateTime<Utc>, reply: bool) -> Post {
    Post {
        id: id.to_string(),
        created_at,
        text: format!("post {} by {}", id, author),
        author: AuthorRef {
            id: AccountId::from(author),
            screen_name: format!("user{}", author),
            name: format!("User {}", author),
        },
        in_reply_to: reply.then(|| format!("{}-parent", id)),
        favorite_count: 1,
        retweet_count: 0,
    }
}

/// `count` original posts by `author`, one every `spacing_hours`, newest `start_age_hours` old.
pub fn hourly_posts(author: &str, now: DateTime<Utc>, count: usize, start_age_hours: i64, spacing_hours: i64) -> Vec<Post> {
    (0..count)
        .map(|i| {
            let age = start_age_hours + i as i64 * spacing_hours;
            post(&format!("{}-{}", author, i), author, now - Duration::hours(age), false)
        })
        .collect()
}

/// In-memory platform with scripted rate limits.
pub struct FakeService {
    pub me: Account,
    pub accounts: Vec<Account>,
    pub ids: Option<Vec<AccountId>>,
    pub timelines: HashMap<AccountId, Vec<Post>>,
    pub page_size: usize,
    pub reject_credentials: bool,
    /// Remaining rate-limit responses per operation name.
    pub rate_limits: Mutex<HashMap<&'static str, usize>>,
    pub timeline_requests: Mutex<Vec<(AccountId, usize)>>,
    pub unfollowed: Mutex<Vec<AccountId>>,
}

impl FakeService {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            me: account("1", "me"),
            accounts,
            ids: None,
            timelines: HashMap::new(),
            page_size: 2,
            reject_credentials: false,
            rate_limits: Mutex::new(HashMap::new()),
            timeline_requests: Mutex::new(Vec::new()),
            unfollowed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_timeline(mut self, id: &str, posts: Vec<Post>) -> Self {
        self.timelines.insert(AccountId::from(id), posts);
        self
    }

    pub fn with_rate_limits(self, operation: &'static str, times: usize) -> Self {
        self.rate_limits.lock().unwrap().insert(operation, times);
        self
    }

    pub fn unfollowed(&self) -> Vec<AccountId> {
        self.unfollowed.lock().unwrap().clone()
    }

    pub fn requested_sizes(&self, id: &str) -> Vec<usize> {
        self.timeline_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a.as_str() == id)
            .map(|(_, n)| *n)
            .collect()
    }

    fn throttle(&self, operation: &'static str) -> Result<(), ServiceError> {
        let mut limits = self.rate_limits.lock().unwrap();
        match limits.get_mut(operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(ServiceError::RateLimited { retry_after_secs: Some(900) })
            }
            _ => Ok(()),
        }
    }

    fn paginate<T: Clone>(&self, items: &[T], token: Option<String>) -> Page<T> {
        let start: usize = token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (start + self.page_size).min(items.len());
        Page {
            items: items[start..end].to_vec(),
            next_token: (end < items.len()).then(|| end.to_string()),
        }
    }
}

#[async_trait]
impl SocialService for FakeService {
    async fn verify_credentials(&self) -> Result<Account, ServiceError> {
        if self.reject_credentials {
            return Err(ServiceError::Authentication("invalid or expired token".to_string()));
        }
        self.throttle("verify")?;
        Ok(self.me.clone())
    }

    async fn followings_page(&self, token: Option<String>) -> Result<Page<Account>, ServiceError> {
        self.throttle("followings")?;
        Ok(self.paginate(&self.accounts, token))
    }

    async fn followed_ids_page(&self, token: Option<String>) -> Result<Page<AccountId>, ServiceError> {
        self.throttle("ids")?;
        let ids = self
            .ids
            .clone()
            .unwrap_or_else(|| self.accounts.iter().map(|a| a.id.clone()).collect());
        Ok(self.paginate(&ids, token))
    }

    async fn recent_posts(&self, account: &AccountId, count: usize) -> Result<Vec<Post>, ServiceError> {
        self.throttle("posts")?;
        self.timeline_requests.lock().unwrap().push((account.clone(), count));

        let mut posts = self.timelines.get(account).cloned().unwrap_or_default();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts.truncate(count);
        // Hand them back oldest first so callers cannot rely on service order.
        posts.reverse();
        Ok(posts)
    }

    async fn unfollow(&self, account: &AccountId) -> Result<(), ServiceError> {
        self.throttle("unfollow")?;
        self.unfollowed.lock().unwrap().push(account.clone());
        Ok(())
    }
}
