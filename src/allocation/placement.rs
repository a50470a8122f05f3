//! Placement rules
//!
//! Pure decisions over mirror counts: chunking, campaign/account choice and
//! URL placeholder expansion.

use crate::local_mirror::{AccountUsage, CampaignUsage};
use crate::name_ledger::next_free_name;
use crate::session_driver::Keyword;

/// Name prefix of every campaign this system opens
pub const CAMPAIGN_PREFIX: &str = "campaign";

pub const CAMPAIGN_PLACEHOLDER: &str = "%%campaign%%";
pub const ADGROUP_PLACEHOLDER: &str = "%%adgroup%%";

/// Ad groups needed for `keywords` keywords
pub fn chunk_count(keywords: usize, per_adgroup: usize) -> usize {
    keywords.div_ceil(per_adgroup.max(1))
}

fn count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// Existing campaign able to take `chunks` more ad groups
///
/// Prefers the most-used campaign so campaigns stay dense; the first one wins a tie.
pub fn choose_campaign(
    usage: &[CampaignUsage],
    chunks: usize,
    max_adgroups: usize,
) -> Option<CampaignUsage> {
    let mut best: Option<&CampaignUsage> = None;
    for candidate in usage
        .iter()
        .filter(|u| count(u.adgroup_count) + chunks <= max_adgroups)
    {
        if best.map_or(true, |b| candidate.adgroup_count > b.adgroup_count) {
            best = Some(candidate);
        }
    }
    best.copied()
}

/// Account able to open one more campaign, most-used first
pub fn choose_account(usage: &[AccountUsage], max_campaigns: usize) -> Option<&AccountUsage> {
    let mut best: Option<&AccountUsage> = None;
    for candidate in usage
        .iter()
        .filter(|u| count(u.campaign_count) < max_campaigns)
    {
        if best.map_or(true, |b| candidate.campaign_count > b.campaign_count) {
            best = Some(candidate);
        }
    }
    best
}

/// Name of the first ad group of a brand-new campaign
pub fn first_adgroup_name(label: &str) -> String {
    next_free_name::<&str>(label, &[])
}

/// Substitute `%%campaign%%` / `%%adgroup%%` with the percent-encoded names
pub fn expand_url(url: &str, campaign: &str, adgroup: &str) -> String {
    url.replace(CAMPAIGN_PLACEHOLDER, &urlencoding::encode(campaign))
        .replace(ADGROUP_PLACEHOLDER, &urlencoding::encode(adgroup))
}

/// Keywords with placeholders in their URL overrides expanded
pub fn resolve_keywords(keywords: &[Keyword], campaign: &str, adgroup: &str) -> Vec<Keyword> {
    keywords
        .iter()
        .map(|k| Keyword {
            text: k.text.clone(),
            bid: k.bid,
            url: k.url.as_deref().map(|u| expand_url(u, campaign, adgroup)),
        })
        .collect()
}
