//! SessionDriver - remote ad-management workflow driver
//!
//! ## Responsibilities
//!
//! - Authenticated session against the management UI (cookie carried)
//! - One operation per remote action, each a declarative checkpoint table
//!   (`workflow`) validated step by step
//! - Identifier extraction from the final response
//! - Paginated keyword performance reports
//!
//! ## State machine
//!
//! `SignedOut --sign_in--> SignedIn --sign_out--> SignedOut`. Every other
//! operation requires `SignedIn` and fails with `IllegalState` otherwise.
//!
//! A checkpoint mismatch aborts the whole operation with `ResponseValidation`
//! naming the workflow and the step. Nothing is retried here; the caller
//! decides whether to rerun the operation.

pub mod pacing;
pub mod parser;
pub mod transport;
pub mod types;
pub mod workflow;

pub use pacing::{NoDelay, Pacer, RandomPacer};
pub use transport::{HttpTransport, PageRequest, PageResponse, Transport};
#[cfg(test)]
pub use transport::ScriptedTransport;
pub use types::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use workflow::{Vars, WorkflowRunner};

/// Remote operations the allocation engine relies on
#[async_trait]
pub trait RemoteSession: Send {
    fn state(&self) -> SessionState;

    async fn sign_in(&mut self, email: &str, password: &str) -> Result<()>;

    async fn sign_out(&mut self) -> Result<()>;

    /// Opens a campaign together with its first ad group
    async fn create_campaign(&mut self, campaign: &NewCampaign) -> Result<CreatedCampaign>;

    async fn create_adgroup(&mut self, campaign_id: i64, adgroup: &NewAdGroup) -> Result<i64>;

    async fn delete_adgroup(&mut self, campaign_id: i64, adgroup_id: i64) -> Result<()>;

    async fn get_keywords(&mut self, campaign_id: i64, adgroup_id: i64) -> Result<Vec<Keyword>>;

    /// Replaces the ad group's keyword list
    async fn set_keywords(
        &mut self,
        campaign_id: i64,
        adgroup_id: i64,
        keywords: &[Keyword],
    ) -> Result<()>;

    async fn set_default_bid(&mut self, campaign_id: i64, adgroup_id: i64, bid: Decimal)
        -> Result<()>;

    /// Keyword report covering the last `days` days, today included
    async fn keyword_report(
        &mut self,
        campaign_id: i64,
        adgroup_id: i64,
        days: u32,
    ) -> Result<KeywordReport>;
}

/// Produces one fresh (signed-out) session per account
pub trait SessionFactory: Send + Sync {
    fn open(&self, email: &str) -> Result<Box<dyn RemoteSession>>;
}

/// Workflow-table driver over any transport
pub struct SessionDriver {
    settings: DriverSettings,
    transport: Box<dyn Transport>,
    pacer: Arc<dyn Pacer>,
    state: SessionState,
    email: Option<String>,
}

impl SessionDriver {
    pub fn new(settings: DriverSettings, transport: Box<dyn Transport>, pacer: Arc<dyn Pacer>) -> Self {
        Self {
            settings,
            transport,
            pacer,
            state: SessionState::SignedOut,
            email: None,
        }
    }

    fn require_signed_in(&self, operation: &str) -> Result<()> {
        match self.state {
            SessionState::SignedIn => Ok(()),
            SessionState::SignedOut => Err(Error::IllegalState(format!(
                "{} requires a signed-in session",
                operation
            ))),
        }
    }

    fn base_vars(&self) -> Vars {
        let mut vars = Vars::new();
        vars.insert("base", self.settings.base_url.trim_end_matches('/').to_string());
        vars.insert("login_url", self.settings.login_url.clone());
        vars
    }

    fn adgroup_vars(&self, campaign_id: i64, adgroup_id: i64) -> Vars {
        let mut vars = self.base_vars();
        vars.insert("campaign_id", campaign_id.to_string());
        vars.insert("adgroup_id", adgroup_id.to_string());
        vars
    }

    /// Variables shared by both creation wizards
    fn wizard_vars(&self, adgroup: &NewAdGroup) -> Vars {
        let (protocol, destination) = parser::split_destination(&adgroup.destination_url);
        let mut vars = self.base_vars();
        vars.insert("adgroup_name", adgroup.name.clone());
        vars.insert("headline", adgroup.headline.clone());
        vars.insert("adline1", adgroup.adline1.clone());
        vars.insert("adline2", adgroup.adline2.clone());
        vars.insert("display_url", adgroup.display_url.clone());
        vars.insert("protocol", protocol.to_string());
        vars.insert("destination", destination.to_string());
        vars.insert("keywords", parser::join_keyword_lines(&adgroup.keywords));
        vars.insert("bid", format_money(adgroup.default_bid));
        vars
    }

    async fn run(&self, workflow: &workflow::Workflow, vars: &mut Vars) -> Result<PageResponse> {
        WorkflowRunner::new(self.transport.as_ref(), self.pacer.as_ref())
            .run(workflow, vars)
            .await
    }

    fn id_var(vars: &Vars, operation: &str, name: &str) -> Result<i64> {
        vars.get(name)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::unexpected(operation, "save", format!("no numeric {}", name)))
    }

    fn period_query(campaign_id: i64, adgroup_id: i64, begin: NaiveDate, end: NaiveDate) -> String {
        use chrono::Datelike;

        let pairs: [(&str, String); 14] = [
            ("campaignid", campaign_id.to_string()),
            ("adgroupid", adgroup_id.to_string()),
            ("mode", String::new()),
            ("timeperiod", "date".to_string()),
            ("timeperiod.begin.month", begin.month().to_string()),
            ("timeperiod.begin.day", begin.day().to_string()),
            ("timeperiod.begin.year", begin.year().to_string()),
            ("timeperiod.begin.dateField", begin.format("%b %d, %Y").to_string()),
            ("timeperiod.end.month", end.month().to_string()),
            ("timeperiod.end.day", end.day().to_string()),
            ("timeperiod.end.year", end.year().to_string()),
            ("timeperiod.end.dateField", end.format("%b %d, %Y").to_string()),
            ("timeperiod.display", "Go".to_string()),
            ("hideDeleted", "1".to_string()),
        ];

        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

#[async_trait]
impl RemoteSession for SessionDriver {
    fn state(&self) -> SessionState {
        self.state
    }

    async fn sign_in(&mut self, email: &str, password: &str) -> Result<()> {
        if self.state == SessionState::SignedIn {
            return Err(Error::IllegalState(format!(
                "session already signed in as {}",
                self.email.as_deref().unwrap_or_default()
            )));
        }
        tracing::info!(account = %email, "sign_in");

        let mut vars = self.base_vars();
        vars.insert("email", email.to_string());
        vars.insert("password", password.to_string());

        match self.run(&workflow::SIGN_IN, &mut vars).await {
            Ok(_) => {
                self.state = SessionState::SignedIn;
                self.email = Some(email.to_string());
                Ok(())
            }
            Err(Error::ResponseValidation { checkpoint, .. }) => {
                tracing::warn!(account = %email, checkpoint = %checkpoint, "Sign-in rejected");
                Err(Error::Authentication(format!(
                    "sign-in for {} rejected (no redirect marker at '{}')",
                    email, checkpoint
                )))
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_out(&mut self) -> Result<()> {
        self.require_signed_in("sign_out")?;
        tracing::info!(account = ?self.email, "sign_out");

        let mut vars = self.base_vars();
        self.run(&workflow::SIGN_OUT, &mut vars).await?;
        self.state = SessionState::SignedOut;
        self.email = None;
        Ok(())
    }

    async fn create_campaign(&mut self, campaign: &NewCampaign) -> Result<CreatedCampaign> {
        self.require_signed_in("create_campaign")?;
        tracing::info!(
            campaign = %campaign.name,
            first_adgroup = %campaign.first_adgroup.name,
            "create_campaign"
        );

        let mut vars = self.wizard_vars(&campaign.first_adgroup);
        vars.insert("campaign_name", campaign.name.clone());
        vars.insert("target_location", self.settings.target_location.clone());
        vars.insert("budget", format_money(self.settings.campaign_budget));

        self.run(&workflow::CREATE_CAMPAIGN, &mut vars).await?;

        Ok(CreatedCampaign {
            campaign_id: Self::id_var(&vars, workflow::CREATE_CAMPAIGN.name, "campaign_id")?,
            adgroup_id: Self::id_var(&vars, workflow::CREATE_CAMPAIGN.name, "adgroup_id")?,
        })
    }

    async fn create_adgroup(&mut self, campaign_id: i64, adgroup: &NewAdGroup) -> Result<i64> {
        self.require_signed_in("create_adgroup")?;
        tracing::info!(campaign_id, adgroup = %adgroup.name, "create_adgroup");

        let mut vars = self.wizard_vars(adgroup);
        vars.insert("campaign_id", campaign_id.to_string());

        self.run(&workflow::CREATE_ADGROUP, &mut vars).await?;
        Self::id_var(&vars, workflow::CREATE_ADGROUP.name, "adgroup_id")
    }

    async fn delete_adgroup(&mut self, campaign_id: i64, adgroup_id: i64) -> Result<()> {
        self.require_signed_in("delete_adgroup")?;
        tracing::info!(campaign_id, adgroup_id, "delete_adgroup");

        let mut vars = self.adgroup_vars(campaign_id, adgroup_id);
        self.run(&workflow::DELETE_ADGROUP, &mut vars).await?;
        Ok(())
    }

    async fn get_keywords(&mut self, campaign_id: i64, adgroup_id: i64) -> Result<Vec<Keyword>> {
        self.require_signed_in("get_keywords")?;
        tracing::info!(campaign_id, adgroup_id, "get_keywords");

        let mut vars = self.adgroup_vars(campaign_id, adgroup_id);
        self.run(&workflow::GET_KEYWORDS, &mut vars).await?;

        let text = vars.get("keywords").map(String::as_str).unwrap_or_default();
        Ok(parser::parse_keyword_lines(text))
    }

    async fn set_keywords(
        &mut self,
        campaign_id: i64,
        adgroup_id: i64,
        keywords: &[Keyword],
    ) -> Result<()> {
        self.require_signed_in("set_keywords")?;
        tracing::info!(campaign_id, adgroup_id, count = keywords.len(), "set_keywords");

        let mut vars = self.adgroup_vars(campaign_id, adgroup_id);
        vars.insert(
            "keywords",
            parser::join_keyword_lines(keywords.iter().map(|k| k.to_string())),
        );
        self.run(&workflow::SET_KEYWORDS, &mut vars).await?;
        Ok(())
    }

    async fn set_default_bid(
        &mut self,
        campaign_id: i64,
        adgroup_id: i64,
        bid: Decimal,
    ) -> Result<()> {
        self.require_signed_in("set_default_bid")?;
        tracing::info!(campaign_id, adgroup_id, bid = %bid, "set_default_bid");

        let mut vars = self.adgroup_vars(campaign_id, adgroup_id);
        vars.insert("price", format_money(bid));
        self.run(&workflow::SET_DEFAULT_BID, &mut vars).await?;
        Ok(())
    }

    async fn keyword_report(
        &mut self,
        campaign_id: i64,
        adgroup_id: i64,
        days: u32,
    ) -> Result<KeywordReport> {
        self.require_signed_in("keyword_report")?;
        if days < 1 {
            return Err(Error::Validation(format!("days must be at least 1, got {}", days)));
        }
        tracing::info!(campaign_id, adgroup_id, days, "keyword_report");

        let end = Local::now().date_naive();
        let begin = end - ChronoDuration::days(i64::from(days) - 1);

        let mut vars = self.adgroup_vars(campaign_id, adgroup_id);
        vars.insert(
            "period_query",
            Self::period_query(campaign_id, adgroup_id, begin, end),
        );

        let mut page = self.run(&workflow::OPEN_REPORT, &mut vars).await?;
        let mut report = KeywordReport::new();
        let mut visited = HashSet::new();
        let mut page_no = 1;

        loop {
            let rows = parser::parse_report_page(&page.body).map_err(|message| {
                Error::unexpected(
                    workflow::OPEN_REPORT.name,
                    format!("report_page_{}", page_no),
                    message,
                )
            })?;
            tracing::debug!(page = page_no, rows = rows.len(), "Report page parsed");
            report.extend(rows);

            let Some(next) = parser::next_page_link(&page.body) else {
                break;
            };
            if !visited.insert(next.clone()) {
                tracing::warn!(link = %next, page = page_no, "Report pagination revisits a page, stopping");
                break;
            }
            let url = format!("{}/select/{}", vars["base"], next);
            page = self.transport.fetch(&PageRequest::get(url)).await?;
            self.pacer.pause().await;
            page_no += 1;
        }

        self.run(&workflow::CLOSE_REPORT, &mut vars).await?;
        Ok(report)
    }
}

/// Live sessions over HTTPS
pub struct HttpSessionFactory {
    settings: DriverSettings,
    pacer: Arc<dyn Pacer>,
    timeout: Duration,
}

impl HttpSessionFactory {
    pub fn new(settings: DriverSettings, pacer: Arc<dyn Pacer>, timeout: Duration) -> Self {
        Self {
            settings,
            pacer,
            timeout,
        }
    }
}

impl SessionFactory for HttpSessionFactory {
    fn open(&self, email: &str) -> Result<Box<dyn RemoteSession>> {
        let transport = HttpTransport::new(transport::user_agent_for(email), self.timeout)?;
        Ok(Box::new(SessionDriver::new(
            self.settings.clone(),
            Box::new(transport),
            self.pacer.clone(),
        )))
    }
}
