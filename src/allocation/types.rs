//! AllocationEngine request/response types

use crate::local_mirror::AdGroup;
use crate::session_driver::Keyword;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ad copy shared by every ad group of a set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdTemplate {
    pub display_url: String,
    /// May carry `%%campaign%%` / `%%adgroup%%` placeholders
    pub default_url: String,
    pub headline: String,
    pub adline1: String,
    pub adline2: String,
    pub default_bid: Decimal,
}

impl AdTemplate {
    /// Mirror row for a confirmed ad group built from this template
    pub fn to_row(&self, id: i64, campaign_id: i64, label: &str) -> AdGroup {
        AdGroup {
            id,
            campaign_id,
            set_label: label.to_string(),
            default_bid: self.default_bid,
            default_url: self.default_url.clone(),
            display_url: self.display_url.clone(),
            headline: self.headline.clone(),
            adline1: self.adline1.clone(),
            adline2: self.adline2.clone(),
        }
    }
}

impl From<&AdGroup> for AdTemplate {
    fn from(adgroup: &AdGroup) -> Self {
        Self {
            display_url: adgroup.display_url.clone(),
            default_url: adgroup.default_url.clone(),
            headline: adgroup.headline.clone(),
            adline1: adgroup.adline1.clone(),
            adline2: adgroup.adline2.clone(),
            default_bid: adgroup.default_bid,
        }
    }
}

/// New keyword set
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSetRequest {
    pub label: String,
    #[serde(flatten)]
    pub ad: AdTemplate,
    pub keywords: Vec<Keyword>,
    /// Pin the set to this account's email
    #[serde(default)]
    pub account: Option<String>,
}

/// Result of moving an account's structure to another account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloneSummary {
    pub source: String,
    pub destination: String,
    pub campaigns: usize,
    pub adgroups: usize,
}
