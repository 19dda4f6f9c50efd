use crate::cursor::RateLimitPolicy;
use crate::types::{AccountId, Post, Result, SocialService, DEFAULT_BATCH_SIZE};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

/// Smallest request the fetcher ever issues.
pub const MIN_REQUEST_SIZE: usize = 10;

/// One attempt at covering the window `(cutoff, now]` for an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchWindow {
    pub account: AccountId,
    pub cutoff: DateTime<Utc>,
    pub desired_count: usize,
    pub batch_size: usize,
}

impl FetchWindow {
    pub fn new(
        account: AccountId,
        cutoff: DateTime<Utc>,
        desired_count: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            account,
            cutoff,
            desired_count,
            batch_size,
        }
    }

    /// Number of posts requested for this window.
    pub fn request_size(&self) -> usize {
        self.batch_size.saturating_mul(2).max(MIN_REQUEST_SIZE)
    }

    /// The next, wider window.
    pub fn widen(self) -> Self {
        let batch_size = self.batch_size.saturating_mul(2).max(1);
        Self { batch_size, ..self }
    }

    /// The next window that asks for more posts than this one.
    pub fn grow(self) -> Self {
        let requested = self.request_size();
        let mut next = self.widen();
        while next.request_size() <= requested && next.batch_size < usize::MAX {
            next = next.widen();
        }
        next
    }

    pub fn admits(&self, post: &Post) -> bool {
        post.created_at > self.cutoff && !post.is_reply()
    }
}

/// Why a fetch stopped widening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NoPosts,
    Satisfied,
    ReachedCutoff,
    HistoryExhausted,
}

/// Retrieves bounded, newest-first slices of an account's original posts.
pub struct RecentPostFetcher<'a, S: SocialService + ?Sized> {
    service: &'a S,
    policy: RateLimitPolicy,
    batch_size: usize,
}

impl<'a, S: SocialService + ?Sized> RecentPostFetcher<'a, S> {
    pub fn new(service: &'a S, policy: RateLimitPolicy) -> Self {
        Self {
            service,
            policy,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Returns up to `desired_count` non-reply posts newer than `cutoff`,
    /// sorted by creation time, newest first.
    pub async fn fetch_recent(
        &self,
        account: &AccountId,
        cutoff: DateTime<Utc>,
        desired_count: usize,
    ) -> Result<Vec<Post>> {
        let window = FetchWindow::new(account.clone(), cutoff, desired_count, self.batch_size);
        let (posts, reason) = self.fetch_window(window).await?;
        debug!("Fetch for {} stopped ({:?}) with {} posts", account, reason, posts.len());
        Ok(posts)
    }

    /// Widens `window` until it is satisfied or cannot reveal more posts.
    pub async fn fetch_window(&self, mut window: FetchWindow) -> Result<(Vec<Post>, StopReason)> {
        if window.desired_count == 0 {
            return Ok((Vec::new(), StopReason::Satisfied));
        }

        loop {
            let requested = window.request_size();
            let mut batch = self
                .policy
                .retry("recent posts", || self.service.recent_posts(&window.account, requested))
                .await?;

            if batch.is_empty() {
                info!("No posts for account {}", window.account);
                return Ok((Vec::new(), StopReason::NoPosts));
            }

            let received = batch.len();
            batch.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let mut seen = HashSet::new();
            batch.retain(|post| seen.insert(post.id.clone()));

            // Non-empty after dedup: at least the first occurrence survives.
            let oldest = batch[batch.len() - 1].created_at;
            let mut recent: Vec<Post> =
                batch.into_iter().filter(|post| window.admits(post)).collect();

            let reason = if recent.len() >= window.desired_count {
                Some(StopReason::Satisfied)
            } else if oldest <= window.cutoff {
                Some(StopReason::ReachedCutoff)
            } else if received < requested {
                Some(StopReason::HistoryExhausted)
            } else {
                None
            };

            if let Some(reason) = reason {
                recent.truncate(window.desired_count);
                return Ok((recent, reason));
            }

            debug!(
                "Account {}: {} of {} wanted posts within {} fetched, widening",
                window.account,
                recent.len(),
                window.desired_count,
                requested
            );
            window = window.grow();
        }
    }

    /// The newest original post newer than `cutoff`, if any.
    pub async fn newest_post(&self, account: &AccountId, cutoff: DateTime<Utc>) -> Result<Option<Post>> {
        Ok(self.fetch_recent(account, cutoff, 1).await?.into_iter().next())
    }
}
