//! AllocationEngine Service
//!
//! ## Flow
//! 1. Validate input and read capacity from the mirror (no remote calls yet)
//! 2. Decide placement
//! 3. Sign in to the owning account and drive the remote workflows
//! 4. After each confirmed remote call, record ledger entries and mirror rows
//!
//! A remote failure aborts the operation. Remote changes already made by earlier
//! steps are not rolled back; the mirror reflects exactly the confirmed ones.

use super::placement::{
    choose_account, choose_campaign, chunk_count, expand_url, first_adgroup_name,
    resolve_keywords, CAMPAIGN_PREFIX,
};
use super::types::{AdTemplate, CloneSummary, CreateSetRequest};
use crate::capacity::{CapacityModel, Limits};
use crate::error::{Error, Result};
use crate::local_mirror::{
    Account, AdGroup, Campaign, EntityType, LedgerRepository, MirrorRepository,
};
use crate::name_ledger::NameLedger;
use crate::session_driver::{
    Keyword, KeywordReport, NewAdGroup, NewCampaign, RemoteSession, SessionFactory,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Where a new set goes
enum Target {
    Existing { campaign_id: i64, account_id: i64 },
    NewCampaign { account_id: i64 },
}

/// Campaign a set is being written into
struct CampaignRef {
    id: i64,
    name: String,
}

pub struct AllocationEngine {
    mirror: Arc<dyn MirrorRepository>,
    ledger: NameLedger,
    capacity: CapacityModel,
    sessions: Arc<dyn SessionFactory>,
    limits: Limits,
}

impl AllocationEngine {
    pub fn new(
        mirror: Arc<dyn MirrorRepository>,
        ledger: Arc<dyn LedgerRepository>,
        sessions: Arc<dyn SessionFactory>,
        limits: Limits,
    ) -> Self {
        Self {
            capacity: CapacityModel::new(mirror.clone(), limits),
            ledger: NameLedger::new(ledger),
            mirror,
            sessions,
            limits,
        }
    }

    // ========================================
    // Schema / accounts
    // ========================================

    pub async fn install_schema(&self) -> Result<()> {
        self.mirror.install().await
    }

    pub async fn add_account(&self, email: &str, password: &str) -> Result<Account> {
        if email.trim().is_empty() {
            return Err(Error::Validation("account email must not be empty".to_string()));
        }
        if self.mirror.find_account(email).await?.is_some() {
            return Err(Error::AlreadyExists(format!("account {}", email)));
        }
        let account = self.mirror.insert_account(email, password).await?;
        info!(account = %email, id = account.id, "Account added");
        Ok(account)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.mirror.list_accounts().await
    }

    /// Local removal only; remote campaigns stay untouched
    pub async fn remove_account(&self, email: &str) -> Result<()> {
        let account = self.find_account(email).await?;
        self.mirror.delete_account(account.id).await?;
        info!(account = %email, "Account removed");
        Ok(())
    }

    pub async fn account_capacity(&self, email: &str) -> Result<Vec<usize>> {
        self.capacity.account_capacity(email).await
    }

    pub async fn set_capacity(&self, label: &str) -> Result<usize> {
        self.capacity.set_capacity(label).await
    }

    // ========================================
    // Sets
    // ========================================

    /// Place a new keyword set, returning the account that received it
    pub async fn create_set(&self, request: CreateSetRequest) -> Result<Account> {
        let CreateSetRequest {
            label,
            ad,
            keywords,
            account,
        } = request;
        info!(set = %label, keywords = keywords.len(), pinned = ?account, "create_set");

        if label.trim().is_empty() {
            return Err(Error::Validation("set label must not be empty".to_string()));
        }
        if keywords.is_empty() {
            return Err(Error::Validation(format!("set {} has no keywords", label)));
        }
        keywords.iter().try_for_each(Keyword::validate)?;
        if !self.mirror.adgroups_by_set(&label).await?.is_empty() {
            return Err(Error::AlreadyExists(format!("set {}", label)));
        }

        let chunks = chunk_count(keywords.len(), self.limits.max_keywords_per_adgroup);
        if chunks > self.limits.max_adgroups_per_campaign {
            return Err(Error::Overflow(format!(
                "set {} needs {} ad groups, a campaign holds {}",
                label, chunks, self.limits.max_adgroups_per_campaign
            )));
        }

        let pinned = match account.as_deref() {
            Some(email) => {
                let account = self.find_account(email).await?;
                let block = self.capacity.largest_block(account.id).await?;
                if block < chunks {
                    return Err(Error::Overflow(format!(
                        "account {} can place {} ad groups in one campaign, set {} needs {}",
                        email, block, label, chunks
                    )));
                }
                Some(account)
            }
            None => None,
        };

        let target = self.choose_target(pinned.as_ref(), chunks).await?;
        let account = match (target_account_id(&target), pinned) {
            (_, Some(pinned)) => pinned,
            (id, None) => self.get_account(id).await?,
        };

        let existing = match &target {
            Target::Existing { campaign_id, .. } => Some(CampaignRef {
                id: *campaign_id,
                name: self.ledger.name_of(EntityType::Campaign, *campaign_id).await?,
            }),
            Target::NewCampaign { .. } => None,
        };

        let mut session = self.open_session(&account).await?;
        let result = self
            .populate_set(session.as_mut(), &account, existing, &label, &ad, &keywords)
            .await;
        self.close_session(session).await;
        let campaign = result?;

        info!(
            set = %label,
            account = %account.email,
            campaign_id = campaign.id,
            adgroups = chunks,
            "Set created"
        );
        Ok(account)
    }

    async fn choose_target(&self, pinned: Option<&Account>, chunks: usize) -> Result<Target> {
        let usage = self.mirror.campaign_usage(pinned.map(|a| a.id)).await?;
        if let Some(found) = choose_campaign(&usage, chunks, self.limits.max_adgroups_per_campaign)
        {
            return Ok(Target::Existing {
                campaign_id: found.campaign_id,
                account_id: found.account_id,
            });
        }

        if let Some(account) = pinned {
            return Ok(Target::NewCampaign {
                account_id: account.id,
            });
        }

        let accounts = self.mirror.account_usage().await?;
        choose_account(&accounts, self.limits.max_campaigns_per_account)
            .map(|a| Target::NewCampaign {
                account_id: a.account_id,
            })
            .ok_or_else(|| Error::Overflow("no account can open another campaign".to_string()))
    }

    async fn populate_set(
        &self,
        session: &mut dyn RemoteSession,
        account: &Account,
        existing: Option<CampaignRef>,
        label: &str,
        ad: &AdTemplate,
        keywords: &[Keyword],
    ) -> Result<CampaignRef> {
        let mut chunks = keywords.chunks(self.limits.max_keywords_per_adgroup.max(1));

        let campaign = match existing {
            Some(campaign) => campaign,
            None => {
                let first = chunks
                    .next()
                    .ok_or_else(|| Error::Internal("empty keyword list".to_string()))?;
                self.open_campaign(session, account, label, ad, first).await?
            }
        };

        for chunk in chunks {
            self.add_adgroup(session, &campaign, label, ad, chunk).await?;
        }

        Ok(campaign)
    }

    /// Remove every ad group of a set, remotely then locally
    pub async fn drop_set(&self, label: &str) -> Result<()> {
        info!(set = %label, "drop_set");
        let adgroups = self.set_adgroups(label).await?;
        let account = self.account_of(adgroups[0].campaign_id).await?;

        let mut session = self.open_session(&account).await?;
        let result = self.delete_adgroups(session.as_mut(), &adgroups).await;
        self.close_session(session).await;
        result?;

        info!(set = %label, adgroups = adgroups.len(), "Set dropped");
        Ok(())
    }

    /// Every keyword of a set, in ad group order
    pub async fn get_keywords(&self, label: &str) -> Result<Vec<Keyword>> {
        info!(set = %label, "get_keywords");
        let adgroups = self.set_adgroups(label).await?;
        let account = self.account_of(adgroups[0].campaign_id).await?;

        let mut session = self.open_session(&account).await?;
        let result = read_keywords(session.as_mut(), &adgroups).await;
        self.close_session(session).await;
        result
    }

    /// Replace a set's keywords, growing or shrinking its ad groups as needed
    pub async fn modify_keywords(&self, label: &str, keywords: Vec<Keyword>) -> Result<()> {
        info!(set = %label, keywords = keywords.len(), "modify_keywords");
        let adgroups = self.set_adgroups(label).await?;
        if keywords.is_empty() {
            return Err(Error::Validation(format!(
                "new keyword list for set {} is empty",
                label
            )));
        }
        keywords.iter().try_for_each(Keyword::validate)?;

        let chunks: Vec<&[Keyword]> = keywords
            .chunks(self.limits.max_keywords_per_adgroup.max(1))
            .collect();
        let campaign_id = adgroups[0].campaign_id;

        let extra = chunks.len().saturating_sub(adgroups.len());
        if extra > 0 {
            let in_campaign = self.mirror.adgroups_by_campaign(campaign_id).await?.len();
            if in_campaign + extra > self.limits.max_adgroups_per_campaign {
                return Err(Error::Overflow(format!(
                    "set {} needs {} more ad groups, campaign {} has room for {}",
                    label,
                    extra,
                    campaign_id,
                    self.limits
                        .max_adgroups_per_campaign
                        .saturating_sub(in_campaign)
                )));
            }
        }

        let campaign = CampaignRef {
            id: campaign_id,
            name: self.ledger.name_of(EntityType::Campaign, campaign_id).await?,
        };
        let account = self.account_of(campaign_id).await?;
        let template = AdTemplate::from(&adgroups[0]);

        let mut session = self.open_session(&account).await?;
        let result = self
            .rewrite_set(session.as_mut(), &campaign, label, &template, &adgroups, &chunks)
            .await;
        self.close_session(session).await;
        result
    }

    async fn rewrite_set(
        &self,
        session: &mut dyn RemoteSession,
        campaign: &CampaignRef,
        label: &str,
        template: &AdTemplate,
        adgroups: &[AdGroup],
        chunks: &[&[Keyword]],
    ) -> Result<()> {
        // replace in place
        for (adgroup, chunk) in adgroups.iter().zip(chunks) {
            let name = self.ledger.name_of(EntityType::AdGroup, adgroup.id).await?;
            session
                .set_keywords(
                    campaign.id,
                    adgroup.id,
                    &resolve_keywords(chunk, &campaign.name, &name),
                )
                .await?;
        }

        // surplus ad groups
        if adgroups.len() > chunks.len() {
            self.delete_adgroups(session, &adgroups[chunks.len()..])
                .await?;
        }

        // keywords left over
        for chunk in chunks.iter().skip(adgroups.len()) {
            self.add_adgroup(session, campaign, label, template, chunk)
                .await?;
        }

        Ok(())
    }

    /// Apply a new default bid to every ad group of a set
    ///
    /// Stops at the first remote failure; ad groups already updated keep the new bid.
    pub async fn change_default_bid(&self, label: &str, bid: Decimal) -> Result<()> {
        info!(set = %label, bid = %bid, "change_default_bid");
        let adgroups = self.set_adgroups(label).await?;
        if bid <= Decimal::ZERO {
            return Err(Error::Validation(format!("bid must be positive, got {}", bid)));
        }
        let account = self.account_of(adgroups[0].campaign_id).await?;

        let mut session = self.open_session(&account).await?;
        let result = self.apply_bid(session.as_mut(), &adgroups, bid).await;
        self.close_session(session).await;
        result
    }

    async fn apply_bid(
        &self,
        session: &mut dyn RemoteSession,
        adgroups: &[AdGroup],
        bid: Decimal,
    ) -> Result<()> {
        for adgroup in adgroups {
            session
                .set_default_bid(adgroup.campaign_id, adgroup.id, bid)
                .await?;
            self.mirror.update_adgroup_bid(adgroup.id, bid).await?;
        }
        Ok(())
    }

    /// Keyword performance over the last `days` days, merged across ad groups
    pub async fn report_set_performance(&self, label: &str, days: u32) -> Result<KeywordReport> {
        info!(set = %label, days, "report_set_performance");
        if days < 1 {
            return Err(Error::Validation(format!("days must be at least 1, got {}", days)));
        }
        let adgroups = self.set_adgroups(label).await?;
        let account = self.account_of(adgroups[0].campaign_id).await?;

        let mut session = self.open_session(&account).await?;
        let result = collect_reports(session.as_mut(), &adgroups, days).await;
        self.close_session(session).await;
        result
    }

    // ========================================
    // Account cloning
    // ========================================

    /// Recreate every non-empty campaign of `source` under `destination`, then
    /// drop `source` locally
    pub async fn clone_account(&self, source: &str, destination: &str) -> Result<CloneSummary> {
        info!(source = %source, destination = %destination, "clone_account");
        let from = self.find_account(source).await?;
        let to = self.find_account(destination).await?;
        if from.id == to.id {
            return Err(Error::Validation(format!(
                "cannot clone account {} onto itself",
                source
            )));
        }

        let campaigns: Vec<i64> = self
            .mirror
            .campaign_usage(Some(from.id))
            .await?
            .into_iter()
            .filter(|u| u.adgroup_count > 0)
            .map(|u| u.campaign_id)
            .collect();

        let used = self.mirror.campaigns_by_account(to.id).await?.len();
        let free = self.limits.max_campaigns_per_account.saturating_sub(used);
        if campaigns.len() > free {
            return Err(Error::Overflow(format!(
                "account {} has room for {} campaigns, {} needed",
                destination,
                free,
                campaigns.len()
            )));
        }

        let mut reader = self.open_session(&from).await?;
        let mut writer = match self.open_session(&to).await {
            Ok(session) => session,
            Err(e) => {
                self.close_session(reader).await;
                return Err(e);
            }
        };
        let result = self
            .copy_campaigns(reader.as_mut(), writer.as_mut(), &to, &campaigns)
            .await;
        self.close_session(reader).await;
        self.close_session(writer).await;
        let adgroups = result?;

        self.mirror.delete_account(from.id).await?;
        info!(
            source = %source,
            destination = %destination,
            campaigns = campaigns.len(),
            adgroups,
            "Account cloned"
        );

        Ok(CloneSummary {
            source: source.to_string(),
            destination: destination.to_string(),
            campaigns: campaigns.len(),
            adgroups,
        })
    }

    async fn copy_campaigns(
        &self,
        reader: &mut dyn RemoteSession,
        writer: &mut dyn RemoteSession,
        to: &Account,
        campaigns: &[i64],
    ) -> Result<usize> {
        let mut copied = 0;

        for &source_campaign in campaigns {
            let adgroups = self.mirror.adgroups_by_campaign(source_campaign).await?;
            let Some((first, rest)) = adgroups.split_first() else {
                continue;
            };

            let keywords = reader.get_keywords(source_campaign, first.id).await?;
            let campaign = self
                .open_campaign(writer, to, &first.set_label, &AdTemplate::from(first), &keywords)
                .await?;
            copied += 1;

            for adgroup in rest {
                let keywords = reader.get_keywords(source_campaign, adgroup.id).await?;
                self.add_adgroup(
                    writer,
                    &campaign,
                    &adgroup.set_label,
                    &AdTemplate::from(adgroup),
                    &keywords,
                )
                .await?;
                copied += 1;
            }
        }

        Ok(copied)
    }

    // ========================================
    // Building blocks
    // ========================================

    /// Open a campaign holding the set's first ad group
    async fn open_campaign(
        &self,
        session: &mut dyn RemoteSession,
        account: &Account,
        label: &str,
        ad: &AdTemplate,
        chunk: &[Keyword],
    ) -> Result<CampaignRef> {
        let campaign_name = self
            .ledger
            .unique_name(EntityType::Campaign, CAMPAIGN_PREFIX, account.id)
            .await?;
        let adgroup_name = first_adgroup_name(label);

        let created = session
            .create_campaign(&NewCampaign {
                name: campaign_name.clone(),
                first_adgroup: wizard_adgroup(&adgroup_name, &campaign_name, ad, chunk),
            })
            .await?;

        self.ledger
            .add(EntityType::Campaign, created.campaign_id, account.id, &campaign_name)
            .await?;
        self.ledger
            .add(EntityType::AdGroup, created.adgroup_id, created.campaign_id, &adgroup_name)
            .await?;
        self.mirror
            .insert_campaign(&Campaign {
                id: created.campaign_id,
                account_id: account.id,
            })
            .await?;
        self.mirror
            .insert_adgroup(&ad.to_row(created.adgroup_id, created.campaign_id, label))
            .await?;

        info!(
            account = %account.email,
            campaign_id = created.campaign_id,
            adgroup_id = created.adgroup_id,
            campaign = %campaign_name,
            "Campaign opened"
        );

        let campaign = CampaignRef {
            id: created.campaign_id,
            name: campaign_name,
        };
        apply_overrides(session, &campaign, created.adgroup_id, &adgroup_name, chunk).await?;
        Ok(campaign)
    }

    /// Add one ad group holding `chunk` to an existing campaign
    async fn add_adgroup(
        &self,
        session: &mut dyn RemoteSession,
        campaign: &CampaignRef,
        label: &str,
        ad: &AdTemplate,
        chunk: &[Keyword],
    ) -> Result<i64> {
        let name = self
            .ledger
            .unique_name(EntityType::AdGroup, label, campaign.id)
            .await?;

        let adgroup_id = session
            .create_adgroup(campaign.id, &wizard_adgroup(&name, &campaign.name, ad, chunk))
            .await?;

        self.ledger
            .add(EntityType::AdGroup, adgroup_id, campaign.id, &name)
            .await?;
        self.mirror
            .insert_adgroup(&ad.to_row(adgroup_id, campaign.id, label))
            .await?;

        info!(campaign_id = campaign.id, adgroup_id, adgroup = %name, "Ad group added");
        apply_overrides(session, campaign, adgroup_id, &name, chunk).await?;
        Ok(adgroup_id)
    }

    async fn delete_adgroups(
        &self,
        session: &mut dyn RemoteSession,
        adgroups: &[AdGroup],
    ) -> Result<()> {
        for adgroup in adgroups {
            session
                .delete_adgroup(adgroup.campaign_id, adgroup.id)
                .await?;
            self.mirror.delete_adgroup(adgroup.id).await?;

            match self.ledger.tombstone(EntityType::AdGroup, adgroup.id).await {
                Ok(()) => {}
                Err(Error::NotFound(msg)) => {
                    warn!(adgroup_id = adgroup.id, error = %msg, "Deleted ad group had no ledger entry");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn open_session(&self, account: &Account) -> Result<Box<dyn RemoteSession>> {
        let mut session = self.sessions.open(&account.email)?;
        session.sign_in(&account.email, &account.password).await?;
        Ok(session)
    }

    async fn close_session(&self, mut session: Box<dyn RemoteSession>) {
        if let Err(e) = session.sign_out().await {
            warn!(error = %e, "Sign-out failed");
        }
    }

    async fn find_account(&self, email: &str) -> Result<Account> {
        self.mirror
            .find_account(email)
            .await?
            .ok_or_else(|| Error::NotFound(format!("account {}", email)))
    }

    async fn get_account(&self, id: i64) -> Result<Account> {
        self.mirror
            .get_account(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("account id {}", id)))
    }

    async fn account_of(&self, campaign_id: i64) -> Result<Account> {
        let campaign = self
            .mirror
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;
        self.get_account(campaign.account_id).await
    }

    async fn set_adgroups(&self, label: &str) -> Result<Vec<AdGroup>> {
        let adgroups = self.mirror.adgroups_by_set(label).await?;
        if adgroups.is_empty() {
            return Err(Error::NotFound(format!("set {}", label)));
        }
        Ok(adgroups)
    }
}

fn target_account_id(target: &Target) -> i64 {
    match target {
        Target::Existing { account_id, .. } | Target::NewCampaign { account_id } => *account_id,
    }
}

/// Wizard submission: plain keyword texts and the expanded destination URL
fn wizard_adgroup(name: &str, campaign_name: &str, ad: &AdTemplate, chunk: &[Keyword]) -> NewAdGroup {
    NewAdGroup {
        name: name.to_string(),
        display_url: ad.display_url.clone(),
        destination_url: expand_url(&ad.default_url, campaign_name, name),
        headline: ad.headline.clone(),
        adline1: ad.adline1.clone(),
        adline2: ad.adline2.clone(),
        keywords: chunk.iter().map(|k| k.text.clone()).collect(),
        default_bid: ad.default_bid,
    }
}

/// Second pass for keywords carrying their own bid or URL
async fn apply_overrides(
    session: &mut dyn RemoteSession,
    campaign: &CampaignRef,
    adgroup_id: i64,
    adgroup_name: &str,
    chunk: &[Keyword],
) -> Result<()> {
    if !chunk.iter().any(Keyword::has_override) {
        return Ok(());
    }
    session
        .set_keywords(
            campaign.id,
            adgroup_id,
            &resolve_keywords(chunk, &campaign.name, adgroup_name),
        )
        .await
}

async fn read_keywords(
    session: &mut dyn RemoteSession,
    adgroups: &[AdGroup],
) -> Result<Vec<Keyword>> {
    let mut keywords = Vec::new();
    for adgroup in adgroups {
        keywords.extend(session.get_keywords(adgroup.campaign_id, adgroup.id).await?);
    }
    Ok(keywords)
}

async fn collect_reports(
    session: &mut dyn RemoteSession,
    adgroups: &[AdGroup],
    days: u32,
) -> Result<KeywordReport> {
    let mut report = KeywordReport::new();
    for adgroup in adgroups {
        report.extend(
            session
                .keyword_report(adgroup.campaign_id, adgroup.id, days)
                .await?,
        );
    }
    Ok(report)
}
