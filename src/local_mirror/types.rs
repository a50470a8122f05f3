//! LocalMirror records
//!
//! Plain rows; campaign and ad group ids are the remote ids.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Remote credentials plus the local collection of campaigns
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: i64,
    pub account_id: i64,
}

/// Unit of keyword storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdGroup {
    pub id: i64,
    pub campaign_id: i64,
    #[sqlx(rename = "set")]
    pub set_label: String,
    pub default_bid: Decimal,
    pub default_url: String,
    pub display_url: String,
    pub headline: String,
    pub adline1: String,
    pub adline2: String,
}

/// Ad group count of one campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct CampaignUsage {
    pub campaign_id: i64,
    pub account_id: i64,
    pub adgroup_count: i64,
}

/// Campaign count of one account
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AccountUsage {
    pub account_id: i64,
    pub email: String,
    pub campaign_count: i64,
}

/// Entity kinds the name ledger tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Campaign,
    AdGroup,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Campaign => "Campaign",
            EntityType::AdGroup => "AdGroup",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger row binding a chosen name to a remote id within a parent scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct UsedName {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub entity_parent_id: i64,
    pub entity_name: String,
    pub active: bool,
}
