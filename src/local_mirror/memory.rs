//! In-process mirror and ledger
//!
//! Same contract as `MySqlStore`, held in memory. Used by tests and by
//! dry runs without a database.

use super::repository::{LedgerRepository, MirrorRepository};
use super::types::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    accounts: Vec<Account>,
    campaigns: Vec<Campaign>,
    adgroups: Vec<AdGroup>,
    names: Vec<UsedName>,
    next_account_id: i64,
    next_name_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MirrorRepository for MemoryStore {
    async fn install(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_account(&self, email: &str, password: &str) -> Result<Account> {
        let mut t = self.tables.write().await;
        if t.accounts.iter().any(|a| a.email == email) {
            return Err(Error::AlreadyExists(format!("account {}", email)));
        }
        t.next_account_id += 1;
        let account = Account {
            id: t.next_account_id,
            email: email.to_string(),
            password: password.to_string(),
        };
        t.accounts.push(account.clone());
        Ok(account)
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>> {
        let t = self.tables.read().await;
        Ok(t.accounts.iter().find(|a| a.email == email).cloned())
    }

    async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let t = self.tables.read().await;
        Ok(t.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.tables.read().await.accounts.clone())
    }

    async fn delete_account(&self, id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        let owned: Vec<i64> = t
            .campaigns
            .iter()
            .filter(|c| c.account_id == id)
            .map(|c| c.id)
            .collect();
        t.adgroups.retain(|g| !owned.contains(&g.campaign_id));
        t.campaigns.retain(|c| c.account_id != id);
        t.accounts.retain(|a| a.id != id);
        Ok(())
    }

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.campaigns.iter().any(|c| c.id == campaign.id) {
            return Err(Error::Database(format!("duplicate campaign id {}", campaign.id)));
        }
        t.campaigns.push(*campaign);
        Ok(())
    }

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        let t = self.tables.read().await;
        Ok(t.campaigns.iter().find(|c| c.id == id).copied())
    }

    async fn campaigns_by_account(&self, account_id: i64) -> Result<Vec<Campaign>> {
        let t = self.tables.read().await;
        let mut campaigns: Vec<Campaign> = t
            .campaigns
            .iter()
            .filter(|c| c.account_id == account_id)
            .copied()
            .collect();
        campaigns.sort_by_key(|c| c.id);
        Ok(campaigns)
    }

    async fn insert_adgroup(&self, adgroup: &AdGroup) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.adgroups.iter().any(|g| g.id == adgroup.id) {
            return Err(Error::Database(format!("duplicate ad group id {}", adgroup.id)));
        }
        t.adgroups.push(adgroup.clone());
        Ok(())
    }

    async fn adgroups_by_set(&self, label: &str) -> Result<Vec<AdGroup>> {
        let t = self.tables.read().await;
        let mut adgroups: Vec<AdGroup> = t
            .adgroups
            .iter()
            .filter(|g| g.set_label == label)
            .cloned()
            .collect();
        adgroups.sort_by_key(|g| g.id);
        Ok(adgroups)
    }

    async fn adgroups_by_campaign(&self, campaign_id: i64) -> Result<Vec<AdGroup>> {
        let t = self.tables.read().await;
        let mut adgroups: Vec<AdGroup> = t
            .adgroups
            .iter()
            .filter(|g| g.campaign_id == campaign_id)
            .cloned()
            .collect();
        adgroups.sort_by_key(|g| g.id);
        Ok(adgroups)
    }

    async fn update_adgroup_bid(&self, id: i64, bid: Decimal) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(g) = t.adgroups.iter_mut().find(|g| g.id == id) {
            g.default_bid = bid;
        }
        Ok(())
    }

    async fn delete_adgroup(&self, id: i64) -> Result<()> {
        self.tables.write().await.adgroups.retain(|g| g.id != id);
        Ok(())
    }

    async fn campaign_usage(&self, account_id: Option<i64>) -> Result<Vec<CampaignUsage>> {
        let t = self.tables.read().await;
        let mut usage: Vec<CampaignUsage> = t
            .campaigns
            .iter()
            .filter(|c| account_id.map_or(true, |id| c.account_id == id))
            .map(|c| CampaignUsage {
                campaign_id: c.id,
                account_id: c.account_id,
                adgroup_count: t.adgroups.iter().filter(|g| g.campaign_id == c.id).count() as i64,
            })
            .collect();
        usage.sort_by_key(|u| u.campaign_id);
        Ok(usage)
    }

    async fn account_usage(&self) -> Result<Vec<AccountUsage>> {
        let t = self.tables.read().await;
        Ok(t.accounts
            .iter()
            .map(|a| AccountUsage {
                account_id: a.id,
                email: a.email.clone(),
                campaign_count: t.campaigns.iter().filter(|c| c.account_id == a.id).count() as i64,
            })
            .collect())
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn insert_name(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        parent_id: i64,
        name: &str,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        t.next_name_id += 1;
        let id = t.next_name_id;
        t.names.push(UsedName {
            id,
            entity_type: entity_type.as_str().to_string(),
            entity_id,
            entity_parent_id: parent_id,
            entity_name: name.to_string(),
            active: true,
        });
        Ok(())
    }

    async fn names_in_scope(&self, entity_type: EntityType, parent_id: i64) -> Result<Vec<String>> {
        let t = self.tables.read().await;
        Ok(t.names
            .iter()
            .filter(|n| n.entity_type == entity_type.as_str() && n.entity_parent_id == parent_id)
            .map(|n| n.entity_name.clone())
            .collect())
    }

    async fn find_active(&self, entity_type: EntityType, entity_id: i64) -> Result<Option<UsedName>> {
        let t = self.tables.read().await;
        Ok(t.names
            .iter()
            .rev()
            .find(|n| n.active && n.entity_type == entity_type.as_str() && n.entity_id == entity_id)
            .cloned())
    }

    async fn deactivate(&self, row_id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(n) = t.names.iter_mut().find(|n| n.id == row_id) {
            n.active = false;
        }
        Ok(())
    }
}
