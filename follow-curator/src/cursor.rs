use crate::traits::{Sleeper, TokioSleeper};
use crate::types::{Page, Result, ServiceError, RATE_LIMIT_COOLDOWN};
use backoff::backoff::{Backoff, Constant};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed-cooldown retry policy applied to rate-limit signals.
///
/// Retries never give up: a rate-limited request is suspended for the cooldown
/// and reissued unchanged. Clones share the same sleeper, so one policy value
/// can stand for the whole connection's rate-limit budget.
#[derive(Clone)]
pub struct RateLimitPolicy {
    cooldown: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimitPolicy {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_sleeper(cooldown, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(cooldown: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { cooldown, sleeper }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn backoff(&self) -> Constant {
        Constant::new(self.cooldown)
    }

    /// Runs `call` until it returns anything other than a rate-limit signal.
    pub async fn retry<T, F, Fut>(
        &self,
        operation: &str,
        mut call: F,
    ) -> std::result::Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ServiceError>>,
    {
        let mut backoff = self.backoff();
        loop {
            match call().await {
                Err(ServiceError::RateLimited { retry_after_secs }) => {
                    let delay = backoff.next_backoff().unwrap_or(self.cooldown);
                    warn!(
                        "Rate limited during {} (service hint: {:?}s), backing off for {:?}",
                        operation, retry_after_secs, delay
                    );
                    self.sleeper.sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(RATE_LIMIT_COOLDOWN)
    }
}

impl fmt::Debug for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitPolicy")
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

type PageFuture<'a, T> = BoxFuture<'a, std::result::Result<Page<T>, ServiceError>>;
type PageFetch<'a, T> = Box<dyn FnMut(Option<String>) -> PageFuture<'a, T> + Send + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Requesting,
    BackingOff(Duration),
    Delivering,
    Exhausted,
}

/// Lazily walks a paginated listing, absorbing rate-limit signals.
///
/// Items are delivered in page order and never skipped. Any error other than
/// a rate-limit signal is returned to the caller as-is.
pub struct RateLimitedCursor<'a, T> {
    listing: String,
    fetch: PageFetch<'a, T>,
    policy: RateLimitPolicy,
    backoff: Constant,
    state: CursorState,
    buffer: VecDeque<T>,
    next_token: Option<String>,
    pages_fetched: usize,
    backoffs: usize,
}

impl<'a, T: Send> RateLimitedCursor<'a, T> {
    pub fn new<F>(listing: impl Into<String>, policy: RateLimitPolicy, fetch: F) -> Self
    where
        F: FnMut(Option<String>) -> PageFuture<'a, T> + Send + 'a,
    {
        let backoff = policy.backoff();
        Self {
            listing: listing.into(),
            fetch: Box::new(fetch),
            policy,
            backoff,
            state: CursorState::Requesting,
            buffer: VecDeque::new(),
            next_token: None,
            pages_fetched: 0,
            backoffs: 0,
        }
    }

    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            match self.state {
                CursorState::Delivering => {
                    if let Some(item) = self.buffer.pop_front() {
                        return Ok(Some(item));
                    }
                    self.state = if self.next_token.is_some() {
                        CursorState::Requesting
                    } else {
                        CursorState::Exhausted
                    };
                }
                CursorState::Requesting => match (self.fetch)(self.next_token.clone()).await {
                    Ok(page) => {
                        self.pages_fetched += 1;
                        debug!(
                            "{}: page {} delivered {} items (more: {})",
                            self.listing,
                            self.pages_fetched,
                            page.items.len(),
                            page.next_token.is_some()
                        );
                        self.buffer.extend(page.items);
                        self.next_token = page.next_token;
                        self.backoff.reset();
                        self.state = CursorState::Delivering;
                    }
                    Err(e) if e.is_rate_limited() => {
                        let delay = self.backoff.next_backoff().unwrap_or(self.policy.cooldown);
                        warn!("{}: rate limited, backing off for {:?}", self.listing, delay);
                        self.state = CursorState::BackingOff(delay);
                    }
                    Err(e) => return Err(e.into()),
                },
                CursorState::BackingOff(delay) => {
                    self.policy.sleeper.sleep(delay).await;
                    self.backoffs += 1;
                    self.state = CursorState::Requesting;
                }
                CursorState::Exhausted => return Ok(None),
            }
        }
    }

    /// Drains the listing.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        debug!(
            "{}: collected {} items over {} pages ({} backoffs)",
            self.listing,
            items.len(),
            self.pages_fetched,
            self.backoffs
        );
        Ok(items)
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn backoffs(&self) -> usize {
        self.backoffs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CuratorError;
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    type Script = Arc<Mutex<VecDeque<std::result::Result<Page<u32>, ServiceError>>>>;

    fn scripted(responses: Vec<std::result::Result<Page<u32>, ServiceError>>) -> (Script, Arc<Mutex<Vec<Option<String>>>>) {
        (Arc::new(Mutex::new(responses.into())), Arc::new(Mutex::new(Vec::new())))
    }

    fn page(items: Vec<u32>, next: Option<&str>) -> std::result::Result<Page<u32>, ServiceError> {
        Ok(Page { items, next_token: next.map(str::to_string) })
    }

    fn rate_limited() -> std::result::Result<Page<u32>, ServiceError> {
        Err(ServiceError::RateLimited { retry_after_secs: Some(60) })
    }

    fn cursor_over(script: Script, tokens: Arc<Mutex<Vec<Option<String>>>>, policy: RateLimitPolicy) -> RateLimitedCursor<'static, u32> {
        RateLimitedCursor::new("numbers", policy, move |token| {
            tokens.lock().unwrap().push(token);
            let response = script.lock().unwrap().pop_front().expect("script exhausted");
            async move { response }.boxed()
        })
    }

    #[tokio::test]
    async fn test_walks_all_pages_in_order() {
        let (script, tokens) = scripted(vec![
            page(vec![1, 2], Some("p2")),
            page(vec![], Some("p3")),
            page(vec![3], None),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = RateLimitPolicy::with_sleeper(RATE_LIMIT_COOLDOWN, sleeper.clone());

        let items = cursor_over(script, tokens.clone(), policy).collect_all().await.unwrap();

        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(
            *tokens.lock().unwrap(),
            vec![None, Some("p2".to_string()), Some("p3".to_string())]
        );
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_backs_off_and_reissues_same_request() {
        let (script, tokens) = scripted(vec![
            rate_limited(),
            page(vec![1], Some("p2")),
            rate_limited(),
            rate_limited(),
            page(vec![2], None),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = RateLimitPolicy::with_sleeper(RATE_LIMIT_COOLDOWN, sleeper.clone());

        let mut cursor = cursor_over(script, tokens.clone(), policy);
        let mut items = Vec::new();
        while let Some(item) = cursor.next().await.unwrap() {
            items.push(item);
        }

        assert_eq!(items, vec![1, 2]);
        assert_eq!(cursor.backoffs(), 3);
        assert_eq!(cursor.pages_fetched(), 2);
        assert_eq!(*sleeper.slept.lock().unwrap(), vec![RATE_LIMIT_COOLDOWN; 3]);
        assert_eq!(
            *tokens.lock().unwrap(),
            vec![
                None,
                None,
                Some("p2".to_string()),
                Some("p2".to_string()),
                Some("p2".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_other_errors_propagate_unchanged() {
        let (script, tokens) = scripted(vec![
            page(vec![1], Some("p2")),
            Err(ServiceError::Http { status: 500, message: "boom".to_string() }),
        ]);
        let policy = RateLimitPolicy::with_sleeper(RATE_LIMIT_COOLDOWN, Arc::new(RecordingSleeper::default()));

        let mut cursor = cursor_over(script, tokens, policy);
        assert_eq!(cursor.next().await.unwrap(), Some(1));
        match cursor.next().await {
            Err(CuratorError::Service(ServiceError::Http { status, .. })) => assert_eq!(status, 500),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_retry_absorbs_rate_limits_on_single_calls() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = RateLimitPolicy::with_sleeper(Duration::from_secs(5), sleeper.clone());
        let attempts = Mutex::new(0);

        let value = policy
            .retry("lookup", || {
                let mut n = attempts.lock().unwrap();
                *n += 1;
                let attempt = *n;
                async move {
                    if attempt < 3 {
                        Err(ServiceError::RateLimited { retry_after_secs: None })
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(*sleeper.slept.lock().unwrap(), vec![Duration::from_secs(5); 2]);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_authentication_failures() {
        let policy = RateLimitPolicy::with_sleeper(Duration::from_secs(5), Arc::new(RecordingSleeper::default()));
        let result: std::result::Result<(), ServiceError> = policy
            .retry("verify", || async { Err(ServiceError::Authentication("bad token".to_string())) })
            .await;
        assert!(matches!(result, Err(ServiceError::Authentication(_))));
    }
}
