//! CapacityModel - remaining slots per quota level
//!
//! ## Responsibilities
//!
//! - Quota limits for accounts, campaigns and ad groups
//! - Pure slot arithmetic over mirror counts
//! - Account and set capacity queries (read-only)

use crate::error::{Error, Result};
use crate::local_mirror::MirrorRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-level quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_campaigns_per_account: usize,
    pub max_adgroups_per_campaign: usize,
    pub max_keywords_per_adgroup: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_campaigns_per_account: 25,
            max_adgroups_per_campaign: 100,
            max_keywords_per_adgroup: 1000,
        }
    }
}

fn count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// Free ad group slots per existing campaign, plus a full campaign's worth for
/// every campaign the account could still open; largest first
pub fn account_slots(limits: &Limits, adgroup_counts: &[i64]) -> Vec<usize> {
    let mut slots: Vec<usize> = adgroup_counts
        .iter()
        .map(|n| limits.max_adgroups_per_campaign.saturating_sub(count(*n)))
        .collect();

    let openable = limits
        .max_campaigns_per_account
        .saturating_sub(adgroup_counts.len());
    slots.extend(std::iter::repeat(limits.max_adgroups_per_campaign).take(openable));

    slots.sort_unstable_by(|a, b| b.cmp(a));
    slots
}

/// Keywords that still fit in a set's campaign, given the ad groups other sets hold there
pub fn set_slots(limits: &Limits, other_adgroups: usize) -> usize {
    limits
        .max_adgroups_per_campaign
        .saturating_sub(other_adgroups)
        .saturating_mul(limits.max_keywords_per_adgroup)
}

#[derive(Clone)]
pub struct CapacityModel {
    mirror: Arc<dyn MirrorRepository>,
    limits: Limits,
}

impl CapacityModel {
    pub fn new(mirror: Arc<dyn MirrorRepository>, limits: Limits) -> Self {
        Self { mirror, limits }
    }

    /// Slot list for an account; the first entry is the largest block
    /// placeable in one campaign
    pub async fn account_capacity(&self, email: &str) -> Result<Vec<usize>> {
        let account = self
            .mirror
            .find_account(email)
            .await?
            .ok_or_else(|| Error::NotFound(format!("account {}", email)))?;
        self.account_capacity_by_id(account.id).await
    }

    pub async fn account_capacity_by_id(&self, account_id: i64) -> Result<Vec<usize>> {
        let counts: Vec<i64> = self
            .mirror
            .campaign_usage(Some(account_id))
            .await?
            .iter()
            .map(|u| u.adgroup_count)
            .collect();
        Ok(account_slots(&self.limits, &counts))
    }

    /// Largest block of ad groups placeable in one campaign of the account
    pub async fn largest_block(&self, account_id: i64) -> Result<usize> {
        Ok(self
            .account_capacity_by_id(account_id)
            .await?
            .first()
            .copied()
            .unwrap_or(0))
    }

    /// Additional keywords placeable into the campaign backing a set
    pub async fn set_capacity(&self, label: &str) -> Result<usize> {
        let set = self.mirror.adgroups_by_set(label).await?;
        let first = set
            .first()
            .ok_or_else(|| Error::NotFound(format!("set {}", label)))?;

        let others = self
            .mirror
            .adgroups_by_campaign(first.campaign_id)
            .await?
            .iter()
            .filter(|g| g.set_label != label)
            .count();

        Ok(set_slots(&self.limits, others))
    }
}
