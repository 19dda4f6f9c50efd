use crate::cursor::RateLimitPolicy;
use crate::dataset::Dataset;
use crate::fetcher::RecentPostFetcher;
use crate::processing::SentimentStage;
use crate::relationships::list_followings;
use crate::types::{window_start, HarvestConfig, Result, SentimentOracle, SocialService};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Collects recent posts across all follows into one scored dataset.
pub struct Harvester<S: SocialService + ?Sized> {
    service: Arc<S>,
    stage: SentimentStage,
    config: HarvestConfig,
    policy: RateLimitPolicy,
}

impl<S: SocialService + ?Sized> Harvester<S> {
    pub fn new(service: Arc<S>, oracle: Arc<dyn SentimentOracle>, config: HarvestConfig) -> Self {
        let policy = RateLimitPolicy::new(config.rate_limit_cooldown);
        Self::with_policy(service, oracle, config, policy)
    }

    pub fn with_policy(
        service: Arc<S>,
        oracle: Arc<dyn SentimentOracle>,
        config: HarvestConfig,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            service,
            stage: SentimentStage::new(oracle),
            config,
            policy,
        }
    }

    /// Unscored rows for every post of the last `days` days.
    pub async fn collect(&self, now: DateTime<Utc>) -> Result<Dataset> {
        let cutoff = window_start(now, self.config.days)?;
        self.policy
            .retry("verify credentials", || self.service.verify_credentials())
            .await?;

        let followings = list_followings(self.service.as_ref(), &self.policy).await?;
        let fetcher = RecentPostFetcher::new(self.service.as_ref(), self.policy.clone())
            .with_batch_size(self.config.batch_size);

        let mut dataset = Dataset::default();
        for account in &followings.accounts {
            let posts = fetcher
                .fetch_recent(&account.id, cutoff, self.config.max_posts_per_account)
                .await?;
            debug!("Collected {} posts from @{}", posts.len(), account.screen_name);
            dataset.extend(Dataset::from_posts(&posts));
        }

        info!(
            "Collected {} posts from {} accounts over the last {} days",
            dataset.len(),
            followings.len(),
            self.config.days
        );
        Ok(dataset)
    }

    /// Collects and scores.
    pub async fn harvest(&self, now: DateTime<Utc>) -> Result<Dataset> {
        let dataset = self.collect(now).await?;
        Ok(self.stage.process(dataset))
    }
}
