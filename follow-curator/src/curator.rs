use crate::cursor::RateLimitPolicy;
use crate::fetcher::RecentPostFetcher;
use crate::relationships::list_followings;
use crate::types::{window_start, Account, AccountId, CurationConfig, Post, Result, SocialService};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowReason {
    /// No original post inside the window at all.
    NoRecentPosts,
    /// Newest original post is older than the allowed age.
    Stale { age_days: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep { age_days: i64 },
    Unfollow(UnfollowReason),
}

impl Verdict {
    pub fn is_unfollow(&self) -> bool {
        matches!(self, Verdict::Unfollow(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub account: AccountId,
    pub verdict: Verdict,
}

/// Decides keep/unfollow from the newest qualifying post. Pure.
pub fn decide(
    account: &AccountId,
    newest: Option<&Post>,
    now: DateTime<Utc>,
    max_age_days: i64,
) -> Decision {
    let verdict = match newest {
        None => Verdict::Unfollow(UnfollowReason::NoRecentPosts),
        Some(post) => {
            let age_days = (now - post.created_at).num_days();
            if age_days > max_age_days {
                Verdict::Unfollow(UnfollowReason::Stale { age_days })
            } else {
                Verdict::Keep { age_days }
            }
        }
    };

    Decision {
        account: account.clone(),
        verdict,
    }
}

/// Outcome of one curation run.
#[derive(Debug, Clone, Default)]
pub struct CurationReport {
    pub decisions: Vec<Decision>,
    pub unfollowed: Vec<AccountId>,
}

impl CurationReport {
    pub fn kept(&self) -> usize {
        self.decisions.iter().filter(|d| !d.verdict.is_unfollow()).count()
    }

    pub fn stale(&self) -> usize {
        self.decisions.iter().filter(|d| d.verdict.is_unfollow()).count()
    }
}

/// Prunes followed accounts that have gone quiet.
pub struct Curator<S: SocialService + ?Sized> {
    service: Arc<S>,
    config: CurationConfig,
    policy: RateLimitPolicy,
}

impl<S: SocialService + ?Sized> Curator<S> {
    pub fn new(service: Arc<S>, config: CurationConfig) -> Self {
        let policy = RateLimitPolicy::new(config.rate_limit_cooldown);
        Self::with_policy(service, config, policy)
    }

    pub fn with_policy(service: Arc<S>, config: CurationConfig, policy: RateLimitPolicy) -> Self {
        Self { service, config, policy }
    }

    pub fn config(&self) -> &CurationConfig {
        &self.config
    }

    fn fetcher(&self) -> RecentPostFetcher<'_, S> {
        RecentPostFetcher::new(self.service.as_ref(), self.policy.clone())
            .with_batch_size(self.config.batch_size)
    }

    fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        window_start(now, self.config.max_age_days)
    }

    /// Fetches, decides and, for stale accounts, severs the relationship.
    pub async fn review_account(&self, account: &Account, now: DateTime<Utc>) -> Result<Decision> {
        let newest = self.fetcher().newest_post(&account.id, self.cutoff(now)?).await?;
        let decision = decide(&account.id, newest.as_ref(), now, self.config.max_age_days);

        match decision.verdict {
            Verdict::Keep { age_days } => {
                debug!("Keeping @{}: newest post is {} days old", account.screen_name, age_days);
            }
            Verdict::Unfollow(reason) => {
                match reason {
                    UnfollowReason::NoRecentPosts => info!(
                        "Unfollowing @{} ({}) as there are no posts within {} days",
                        account.screen_name, account.id, self.config.max_age_days
                    ),
                    UnfollowReason::Stale { age_days } => info!(
                        "Unfollowing @{} ({}) as the newest post is {} days old",
                        account.screen_name, account.id, age_days
                    ),
                }
                if self.config.dry_run {
                    info!("Dry run: not unfollowing @{}", account.screen_name);
                } else {
                    self.policy.retry("unfollow", || self.service.unfollow(&account.id)).await?;
                }
            }
        }

        Ok(decision)
    }

    /// Reviews every followed account once.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<CurationReport> {
        self.cutoff(now)?;
        let me = self
            .policy
            .retry("verify credentials", || self.service.verify_credentials())
            .await?;
        info!("Curating follows of @{} (max age {} days)", me.screen_name, self.config.max_age_days);

        let followings = list_followings(self.service.as_ref(), &self.policy).await?;
        let mut report = CurationReport::default();

        for account in &followings.accounts {
            let decision = self.review_account(account, now).await?;
            if decision.verdict.is_unfollow() && !self.config.dry_run {
                report.unfollowed.push(account.id.clone());
            }
            report.decisions.push(decision);
        }

        info!(
            "Curation finished: {} kept, {} stale, {} unfollowed",
            report.kept(),
            report.stale(),
            report.unfollowed.len()
        );
        Ok(report)
    }

    /// Newest original post within the window for every followed account.
    pub async fn newest_posts(&self, now: DateTime<Utc>) -> Result<Vec<(Account, Option<Post>)>> {
        let cutoff = self.cutoff(now)?;
        self.policy
            .retry("verify credentials", || self.service.verify_credentials())
            .await?;
        let followings = list_followings(self.service.as_ref(), &self.policy).await?;
        let fetcher = self.fetcher();

        let mut newest = Vec::with_capacity(followings.len());
        for account in followings.accounts {
            let post = fetcher.newest_post(&account.id, cutoff).await?;
            newest.push((account, post));
        }
        Ok(newest)
    }
}
