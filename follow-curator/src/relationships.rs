use crate::cursor::{RateLimitPolicy, RateLimitedCursor};
use crate::types::{Account, AccountId, Result, SocialService};
use std::collections::HashSet;
use tracing::{info, warn};

/// Accounts followed by the authenticated identity.
///
/// `ids[i]` is always `accounts[i].id`.
#[derive(Debug, Clone, Default)]
pub struct Followings {
    pub ids: Vec<AccountId>,
    pub accounts: Vec<Account>,
}

impl Followings {
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Lists every account the authenticated identity follows.
///
/// The record listing and the bulk id listing are separate round-trips and may
/// observe different snapshots of the follow set. Records are taken as the
/// source of order; a record is kept only if the id listing confirms it, and
/// the id sequence is derived from the kept records.
pub async fn list_followings<S>(service: &S, policy: &RateLimitPolicy) -> Result<Followings>
where
    S: SocialService + ?Sized,
{
    let records = RateLimitedCursor::new("followings", policy.clone(), move |token| {
        service.followings_page(token)
    })
    .collect_all()
    .await?;
    let confirmed: HashSet<AccountId> = RateLimitedCursor::new("followed ids", policy.clone(), move |token| {
        service.followed_ids_page(token)
    })
    .collect_all()
    .await?
    .into_iter()
    .collect();

    let listed = records.len();
    let mut seen = HashSet::new();
    let accounts: Vec<Account> = records
        .into_iter()
        .filter(|account| confirmed.contains(&account.id) && seen.insert(account.id.clone()))
        .collect();

    if accounts.len() != listed || accounts.len() != confirmed.len() {
        warn!(
            "Follow listings disagree: {} records, {} ids, {} reconciled",
            listed,
            confirmed.len(),
            accounts.len()
        );
    }

    let ids = accounts.iter().map(|account| account.id.clone()).collect();
    info!("Listed {} followed accounts", accounts.len());

    Ok(Followings { ids, accounts })
}
