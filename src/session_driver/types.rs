//! SessionDriver data types

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Separator used by the remote keyword editor between text, bid and URL
pub const KEYWORD_FIELD_SEPARATOR: &str = " ** ";

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    SignedOut,
    SignedIn,
}

/// A keyword with optional per-keyword overrides of the ad group defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "KeywordInput")]
pub struct Keyword {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Keyword {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bid: None,
            url: None,
        }
    }

    pub fn with_bid(mut self, bid: Decimal) -> Self {
        self.bid = Some(bid);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Per-keyword bid; zero means "use the ad group default"
    pub fn bid_override(&self) -> Option<Decimal> {
        self.bid.filter(|b| !b.is_zero())
    }

    /// Per-keyword URL; empty means "use the ad group default"
    pub fn url_override(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }

    /// True when the keyword overrides the ad group's default bid or URL
    pub fn has_override(&self) -> bool {
        self.bid_override().is_some() || self.url_override().is_some()
    }

    /// Rejects content the one-line editor form cannot carry
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::Validation("keyword text must not be empty".to_string()));
        }
        let fields = std::iter::once(self.text.as_str()).chain(self.url.as_deref());
        for field in fields {
            if field.contains(['\n', '\r']) || field.contains(KEYWORD_FIELD_SEPARATOR) {
                return Err(Error::Validation(format!(
                    "keyword {:?} contains a line break or '{}'",
                    self.text,
                    KEYWORD_FIELD_SEPARATOR.trim()
                )));
            }
        }
        if self.bid.is_some_and(|b| b.is_sign_negative()) {
            return Err(Error::Validation(format!("keyword {:?} has a negative bid", self.text)));
        }
        Ok(())
    }
}

impl From<&str> for Keyword {
    fn from(text: &str) -> Self {
        Keyword::new(text)
    }
}

impl fmt::Display for Keyword {
    /// Editor line form: `text[ ** bid][ ** url]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        if let Some(bid) = self.bid_override() {
            write!(f, "{}{}", KEYWORD_FIELD_SEPARATOR, format_money(bid))?;
        }
        if let Some(url) = self.url_override() {
            write!(f, "{}{}", KEYWORD_FIELD_SEPARATOR, url)?;
        }
        Ok(())
    }
}

/// Accepts either a bare string or a full keyword object
#[derive(Deserialize)]
#[serde(untagged)]
enum KeywordInput {
    Plain(String),
    Full {
        text: String,
        #[serde(default)]
        bid: Option<Decimal>,
        #[serde(default)]
        url: Option<String>,
    },
}

impl From<KeywordInput> for Keyword {
    fn from(input: KeywordInput) -> Self {
        match input {
            KeywordInput::Plain(text) => Keyword::new(text),
            KeywordInput::Full { text, bid, url } => Keyword { text, bid, url },
        }
    }
}

/// Two-decimal money formatting used by every remote form
pub fn format_money(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

/// Ad group contents submitted through the creation wizards
#[derive(Debug, Clone, PartialEq)]
pub struct NewAdGroup {
    pub name: String,
    pub display_url: String,
    /// Destination URL with placeholders already substituted
    pub destination_url: String,
    pub headline: String,
    pub adline1: String,
    pub adline2: String,
    /// Plain keyword texts
    pub keywords: Vec<String>,
    pub default_bid: Decimal,
}

/// A campaign is always opened together with its first ad group
#[derive(Debug, Clone, PartialEq)]
pub struct NewCampaign {
    pub name: String,
    pub first_adgroup: NewAdGroup,
}

/// Server-assigned identifiers of a freshly opened campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreatedCampaign {
    pub campaign_id: i64,
    pub adgroup_id: i64,
}

/// One performance report row
///
/// Fields the remote shows as a placeholder (`-`) are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordStats {
    pub bid: Option<Decimal>,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: Option<Decimal>,
    pub cpc: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub avg_position: Option<Decimal>,
}

/// Report rows keyed by keyword text; a repeated key overwrites the earlier row
pub type KeywordReport = BTreeMap<String, KeywordStats>;

/// Remote endpoints and campaign defaults used by the driver
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Origin of the management UI, e.g. `https://adwords.google.com`
    pub base_url: String,
    /// Sign-in form target
    pub login_url: String,
    /// Daily budget for new campaigns
    pub campaign_budget: Decimal,
    /// Serialized geo-target token sent with new campaigns
    pub target_location: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_keyword_display_forms() {
        assert_eq!(Keyword::new("red shoes").to_string(), "red shoes");
        assert_eq!(
            Keyword::new("red shoes").with_bid(dec!(0.5)).to_string(),
            "red shoes ** 0.50"
        );
        assert_eq!(
            Keyword::new("red shoes")
                .with_url("http://example.com/x")
                .to_string(),
            "red shoes ** http://example.com/x"
        );
        assert_eq!(
            Keyword::new("red shoes")
                .with_bid(dec!(1.234))
                .with_url("http://example.com/x")
                .to_string(),
            "red shoes ** 1.23 ** http://example.com/x"
        );
    }

    #[test]
    fn test_keyword_zero_bid_and_empty_url_use_defaults() {
        let keyword = Keyword::new("red shoes").with_bid(Decimal::ZERO).with_url("");
        assert_eq!(keyword.to_string(), "red shoes");
        assert!(!keyword.has_override());
        assert!(Keyword::new("red shoes").with_bid(dec!(0.01)).has_override());
    }

    #[test]
    fn test_keyword_validate_rejects_editor_breaking_text() {
        assert!(Keyword::new("red shoes").validate().is_ok());
        for bad in [
            Keyword::new("red\nshoes"),
            Keyword::new("red\rshoes"),
            Keyword::new("red ** 0.50"),
            Keyword::new("   "),
            Keyword::new("red shoes").with_url("http://x.example/\nboots"),
            Keyword::new("red shoes").with_bid(dec!(-0.10)),
        ] {
            assert!(matches!(bad.validate(), Err(Error::Validation(_))), "{:?}", bad);
        }
    }

    #[test]
    fn test_keyword_deserialize_plain_and_full() {
        let keywords: Vec<Keyword> =
            serde_json::from_str(r#"["shoes", {"text": "boots", "bid": "0.75"}]"#).unwrap();
        assert_eq!(keywords[0], Keyword::new("shoes"));
        assert_eq!(keywords[1], Keyword::new("boots").with_bid(dec!(0.75)));
    }
}
