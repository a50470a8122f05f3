use super::*;
use crate::capacity::Limits;
use crate::error::{Error, Result};
use crate::local_mirror::{EntityType, MemoryStore, MirrorRepository};
use crate::name_ledger::NameLedger;
use crate::session_driver::{
    CreatedCampaign, Keyword, KeywordReport, KeywordStats, NewAdGroup, NewCampaign,
    RemoteSession, SessionFactory, SessionState,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

// ----------------------------------------
// Recording remote
// ----------------------------------------

#[derive(Debug, Clone)]
struct RemoteAdGroup {
    campaign_id: i64,
    name: String,
    destination: String,
    keywords: Vec<Keyword>,
    bid: Decimal,
}

#[derive(Default)]
struct Remote {
    next_id: i64,
    campaigns: BTreeMap<i64, (String, String)>,
    adgroups: BTreeMap<i64, RemoteAdGroup>,
    calls: Vec<String>,
    counts: HashMap<&'static str, usize>,
    /// Clicks reported for every keyword of an ad group
    clicks: HashMap<i64, u64>,
    fail_on: Option<(&'static str, usize)>,
}

impl Remote {
    fn record(&mut self, op: &'static str, detail: impl std::fmt::Display) -> Result<()> {
        self.calls.push(format!("{} {}", op, detail));
        let count = self.counts.entry(op).or_insert(0);
        *count += 1;
        let seen = *count;
        match self.fail_on {
            Some((fail_op, at)) if fail_op == op && at == seen => {
                Err(Error::unexpected(op, "save", "scripted failure"))
            }
            _ => Ok(()),
        }
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn store_adgroup(&mut self, id: i64, campaign_id: i64, adgroup: &NewAdGroup) {
        self.adgroups.insert(
            id,
            RemoteAdGroup {
                campaign_id,
                name: adgroup.name.clone(),
                destination: adgroup.destination_url.clone(),
                keywords: adgroup.keywords.iter().map(|k| Keyword::new(k.as_str())).collect(),
                bid: adgroup.default_bid,
            },
        );
    }
}

struct FakeSession {
    remote: Arc<Mutex<Remote>>,
    state: SessionState,
}

#[async_trait]
impl RemoteSession for FakeSession {
    fn state(&self) -> SessionState {
        self.state
    }

    async fn sign_in(&mut self, email: &str, _password: &str) -> Result<()> {
        self.remote.lock().unwrap().record("sign_in", email)?;
        self.state = SessionState::SignedIn;
        Ok(())
    }

    async fn sign_out(&mut self) -> Result<()> {
        self.remote.lock().unwrap().record("sign_out", "")?;
        self.state = SessionState::SignedOut;
        Ok(())
    }

    async fn create_campaign(&mut self, campaign: &NewCampaign) -> Result<CreatedCampaign> {
        let mut remote = self.remote.lock().unwrap();
        remote.record("create_campaign", &campaign.name)?;
        let campaign_id = remote.next_id();
        let adgroup_id = remote.next_id();
        remote
            .campaigns
            .insert(campaign_id, (campaign.name.clone(), campaign.first_adgroup.name.clone()));
        remote.store_adgroup(adgroup_id, campaign_id, &campaign.first_adgroup);
        Ok(CreatedCampaign {
            campaign_id,
            adgroup_id,
        })
    }

    async fn create_adgroup(&mut self, campaign_id: i64, adgroup: &NewAdGroup) -> Result<i64> {
        let mut remote = self.remote.lock().unwrap();
        remote.record("create_adgroup", &adgroup.name)?;
        let id = remote.next_id();
        remote.store_adgroup(id, campaign_id, adgroup);
        Ok(id)
    }

    async fn delete_adgroup(&mut self, _campaign_id: i64, adgroup_id: i64) -> Result<()> {
        let mut remote = self.remote.lock().unwrap();
        remote.record("delete_adgroup", adgroup_id)?;
        remote.adgroups.remove(&adgroup_id);
        Ok(())
    }

    async fn get_keywords(&mut self, _campaign_id: i64, adgroup_id: i64) -> Result<Vec<Keyword>> {
        let mut remote = self.remote.lock().unwrap();
        remote.record("get_keywords", adgroup_id)?;
        Ok(remote
            .adgroups
            .get(&adgroup_id)
            .map(|g| g.keywords.clone())
            .unwrap_or_default())
    }

    async fn set_keywords(
        &mut self,
        _campaign_id: i64,
        adgroup_id: i64,
        keywords: &[Keyword],
    ) -> Result<()> {
        let mut remote = self.remote.lock().unwrap();
        remote.record("set_keywords", adgroup_id)?;
        if let Some(g) = remote.adgroups.get_mut(&adgroup_id) {
            g.keywords = keywords.to_vec();
        }
        Ok(())
    }

    async fn set_default_bid(
        &mut self,
        _campaign_id: i64,
        adgroup_id: i64,
        bid: Decimal,
    ) -> Result<()> {
        let mut remote = self.remote.lock().unwrap();
        remote.record("set_default_bid", adgroup_id)?;
        if let Some(g) = remote.adgroups.get_mut(&adgroup_id) {
            g.bid = bid;
        }
        Ok(())
    }

    async fn keyword_report(
        &mut self,
        _campaign_id: i64,
        adgroup_id: i64,
        _days: u32,
    ) -> Result<KeywordReport> {
        let mut remote = self.remote.lock().unwrap();
        remote.record("keyword_report", adgroup_id)?;
        let keywords = remote
            .adgroups
            .get(&adgroup_id)
            .map(|g| g.keywords.clone())
            .unwrap_or_default();
        let clicks = remote.clicks.get(&adgroup_id).copied().unwrap_or(0);
        Ok(keywords
            .into_iter()
            .map(|k| {
                (
                    k.text,
                    KeywordStats {
                        bid: None,
                        clicks,
                        impressions: 0,
                        ctr: None,
                        cpc: None,
                        cost: None,
                        avg_position: None,
                    },
                )
            })
            .collect())
    }
}

struct FakeFactory {
    remote: Arc<Mutex<Remote>>,
}

impl SessionFactory for FakeFactory {
    fn open(&self, _email: &str) -> Result<Box<dyn RemoteSession>> {
        Ok(Box::new(FakeSession {
            remote: self.remote.clone(),
            state: SessionState::SignedOut,
        }))
    }
}

// ----------------------------------------
// Harness
// ----------------------------------------

struct Harness {
    engine: AllocationEngine,
    store: Arc<MemoryStore>,
    remote: Arc<Mutex<Remote>>,
}

impl Harness {
    async fn new(limits: Limits, accounts: &[&str]) -> Self {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(Mutex::new(Remote::default()));
        let engine = AllocationEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(FakeFactory {
                remote: remote.clone(),
            }),
            limits,
        );
        for email in accounts {
            engine.add_account(email, "secret").await.unwrap();
        }
        Self {
            engine,
            store,
            remote,
        }
    }

    fn calls(&self) -> Vec<String> {
        self.remote.lock().unwrap().calls.clone()
    }

    fn clear_calls(&self) {
        self.remote.lock().unwrap().calls.clear();
    }

    fn fail_on(&self, op: &'static str, nth: usize) {
        let mut remote = self.remote.lock().unwrap();
        remote.counts.clear();
        remote.fail_on = Some((op, nth));
    }

    fn remote_adgroup(&self, id: i64) -> Option<RemoteAdGroup> {
        self.remote.lock().unwrap().adgroups.get(&id).cloned()
    }

    fn ledger(&self) -> NameLedger {
        NameLedger::new(self.store.clone())
    }

    /// Remote keyword texts of a set, in ad group order
    async fn remote_texts(&self, label: &str) -> Vec<String> {
        let adgroups = self.store.adgroups_by_set(label).await.unwrap();
        adgroups
            .iter()
            .flat_map(|g| self.remote_adgroup(g.id).unwrap().keywords)
            .map(|k| k.text)
            .collect()
    }
}

/// 2 campaigns per account, 4 ad groups per campaign, 3 keywords per ad group
fn small() -> Limits {
    Limits {
        max_campaigns_per_account: 2,
        max_adgroups_per_campaign: 4,
        max_keywords_per_adgroup: 3,
    }
}

fn ad() -> AdTemplate {
    AdTemplate {
        display_url: "shop.example".to_string(),
        default_url: "http://shop.example/?c=%%campaign%%&g=%%adgroup%%".to_string(),
        headline: "Shoes for all".to_string(),
        adline1: "Every size".to_string(),
        adline2: "Free returns".to_string(),
        default_bid: dec!(0.25),
    }
}

fn keywords(prefix: &str, n: usize) -> Vec<Keyword> {
    (0..n).map(|i| Keyword::new(format!("{} {}", prefix, i))).collect()
}

fn texts(keywords: &[Keyword]) -> Vec<String> {
    keywords.iter().map(|k| k.text.clone()).collect()
}

fn request(label: &str, keywords: Vec<Keyword>, account: Option<&str>) -> CreateSetRequest {
    CreateSetRequest {
        label: label.to_string(),
        ad: ad(),
        keywords,
        account: account.map(str::to_string),
    }
}

// ----------------------------------------
// create_set
// ----------------------------------------

#[tokio::test]
async fn test_create_set_chunks_keywords_in_order() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    let list = keywords("shoes", 7);

    let account = h.engine.create_set(request("shoes", list.clone(), None)).await.unwrap();

    assert_eq!(account.email, "a@example.com");
    let adgroups = h.store.adgroups_by_set("shoes").await.unwrap();
    assert_eq!(adgroups.len(), 3);
    assert!(adgroups.iter().all(|g| g.campaign_id == adgroups[0].campaign_id));
    assert_eq!(h.remote_texts("shoes").await, texts(&list));

    let names: Vec<String> = adgroups
        .iter()
        .map(|g| h.remote_adgroup(g.id).unwrap().name)
        .collect();
    assert_eq!(names, vec!["shoes__1", "shoes__2", "shoes__3"]);

    let first = h.remote_adgroup(adgroups[0].id).unwrap();
    assert_eq!(first.destination, "http://shop.example/?c=campaign__1&g=shoes__1");
    assert_eq!(
        h.ledger().name_of(EntityType::Campaign, adgroups[0].campaign_id).await.unwrap(),
        "campaign__1"
    );

    let calls = h.calls();
    assert_eq!(calls.first().map(String::as_str), Some("sign_in a@example.com"));
    assert_eq!(calls.last().map(String::as_str), Some("sign_out "));
    assert!(!calls.iter().any(|c| c.starts_with("set_keywords")));
}

#[tokio::test]
async fn test_create_set_existing_label_fails_before_remote() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    h.engine.create_set(request("shoes", keywords("shoes", 2), None)).await.unwrap();
    h.clear_calls();

    let err = h
        .engine
        .create_set(request("shoes", keywords("other", 1), None))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AlreadyExists(_)));
    assert!(h.calls().is_empty());
}

#[tokio::test]
async fn test_create_set_rejects_bad_input_before_remote() {
    let h = Harness::new(small(), &["a@example.com"]).await;

    let empty = h.engine.create_set(request("shoes", vec![], None)).await;
    assert!(matches!(empty, Err(Error::Validation(_))));

    let multiline = vec![Keyword::new("red shoes"), Keyword::new("blue\nboots")];
    let broken = h.engine.create_set(request("shoes", multiline, None)).await;
    assert!(matches!(broken, Err(Error::Validation(_))));

    let separator = vec![Keyword::new("red ** 0.90")];
    let broken = h.engine.create_set(request("shoes", separator, None)).await;
    assert!(matches!(broken, Err(Error::Validation(_))));

    // 13 keywords need 5 ad groups, a campaign holds 4
    let too_big = h.engine.create_set(request("shoes", keywords("k", 13), None)).await;
    assert!(matches!(too_big, Err(Error::Overflow(_))));

    let unknown = h
        .engine
        .create_set(request("shoes", keywords("k", 1), Some("nobody@example.com")))
        .await;
    assert!(matches!(unknown, Err(Error::NotFound(_))));

    assert!(h.calls().is_empty());
}

#[tokio::test]
async fn test_create_set_pinned_to_full_account_overflows() {
    let limits = Limits {
        max_campaigns_per_account: 1,
        max_adgroups_per_campaign: 2,
        max_keywords_per_adgroup: 3,
    };
    let h = Harness::new(limits, &["a@example.com"]).await;
    h.engine.create_set(request("shoes", keywords("shoes", 6), None)).await.unwrap();
    h.clear_calls();

    let pinned = h
        .engine
        .create_set(request("boots", keywords("boots", 1), Some("a@example.com")))
        .await;
    assert!(matches!(pinned, Err(Error::Overflow(_))));

    let unpinned = h.engine.create_set(request("boots", keywords("boots", 1), None)).await;
    assert!(matches!(unpinned, Err(Error::Overflow(_))));

    assert!(h.calls().is_empty());
}

#[tokio::test]
async fn test_sets_fill_existing_campaign_before_opening_another() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    h.engine.create_set(request("shoes", keywords("shoes", 3), None)).await.unwrap();
    h.engine.create_set(request("boots", keywords("boots", 4), None)).await.unwrap();

    let usage = h.store.campaign_usage(None).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].adgroup_count, 3);

    // two more ad groups do not fit in the 3/4 campaign
    h.engine.create_set(request("hats", keywords("hats", 4), None)).await.unwrap();
    let usage = h.store.campaign_usage(None).await.unwrap();
    assert_eq!(usage.len(), 2);
    assert_eq!(
        h.ledger().name_of(EntityType::Campaign, usage[1].campaign_id).await.unwrap(),
        "campaign__2"
    );
    assert_eq!(usage[1].adgroup_count, 2);
}

#[tokio::test]
async fn test_new_campaign_prefers_busiest_account() {
    let h = Harness::new(small(), &["a@example.com", "b@example.com"]).await;
    // fill one campaign of b completely
    h.engine
        .create_set(request("x", keywords("x", 12), Some("b@example.com")))
        .await
        .unwrap();

    let account = h.engine.create_set(request("y", keywords("y", 3), None)).await.unwrap();

    assert_eq!(account.email, "b@example.com");
}

#[tokio::test]
async fn test_keyword_overrides_applied_with_placeholders() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    let list = vec![
        Keyword::new("plain"),
        Keyword::new("priced").with_bid(dec!(0.40)),
        Keyword::new("linked").with_url("http://shop.example/%%adgroup%%/l"),
    ];

    h.engine.create_set(request("shoes", list, None)).await.unwrap();

    let adgroup = &h.store.adgroups_by_set("shoes").await.unwrap()[0];
    let remote = h.remote_adgroup(adgroup.id).unwrap();
    assert_eq!(
        remote.keywords,
        vec![
            Keyword::new("plain"),
            Keyword::new("priced").with_bid(dec!(0.40)),
            Keyword::new("linked").with_url("http://shop.example/shoes__1/l"),
        ]
    );
    assert!(h.calls().iter().any(|c| c.starts_with("set_keywords")));
}

#[tokio::test]
async fn test_partial_failure_keeps_only_confirmed_rows() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    h.fail_on("create_adgroup", 1);

    let err = h
        .engine
        .create_set(request("shoes", keywords("shoes", 7), None))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ResponseValidation { .. }));
    assert_eq!(h.store.adgroups_by_set("shoes").await.unwrap().len(), 1);
    assert_eq!(h.store.campaign_usage(None).await.unwrap().len(), 1);
    assert_eq!(h.calls().last().map(String::as_str), Some("sign_out "));
}

// ----------------------------------------
// Set maintenance
// ----------------------------------------

#[tokio::test]
async fn test_get_keywords_concatenates_adgroups() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    let list = keywords("shoes", 5);
    h.engine.create_set(request("shoes", list.clone(), None)).await.unwrap();

    let read = h.engine.get_keywords("shoes").await.unwrap();

    assert_eq!(read, list);
    assert!(matches!(h.engine.get_keywords("boots").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_modify_keywords_shrinks_set_to_one_adgroup() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    h.engine.create_set(request("shoes", keywords("shoes", 7), None)).await.unwrap();
    let before = h.store.adgroups_by_set("shoes").await.unwrap();
    let campaign_id = before[0].campaign_id;
    let replacement = keywords("new", 2);

    h.engine.modify_keywords("shoes", replacement.clone()).await.unwrap();

    let after = h.store.adgroups_by_set("shoes").await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, before[0].id);
    assert_eq!(h.remote_adgroup(after[0].id).unwrap().keywords, replacement);
    for removed in &before[1..] {
        assert!(h.remote_adgroup(removed.id).is_none());
        assert!(matches!(
            h.ledger().name_of(EntityType::AdGroup, removed.id).await,
            Err(Error::NotFound(_))
        ));
    }
    // tombstoned names stay reserved
    assert_eq!(
        h.ledger().unique_name(EntityType::AdGroup, "shoes", campaign_id).await.unwrap(),
        "shoes__4"
    );
}

#[tokio::test]
async fn test_modify_keywords_grows_from_first_adgroup_template() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    h.engine.create_set(request("shoes", keywords("shoes", 2), None)).await.unwrap();
    let replacement = keywords("more", 7);

    h.engine.modify_keywords("shoes", replacement.clone()).await.unwrap();

    let adgroups = h.store.adgroups_by_set("shoes").await.unwrap();
    assert_eq!(adgroups.len(), 3);
    assert!(adgroups.iter().all(|g| g.headline == "Shoes for all"));
    assert_eq!(h.remote_texts("shoes").await, texts(&replacement));
    assert_eq!(h.remote_adgroup(adgroups[2].id).unwrap().name, "shoes__3");
}

#[tokio::test]
async fn test_modify_keywords_checks_capacity_before_remote() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    h.engine.create_set(request("shoes", keywords("shoes", 3), None)).await.unwrap();
    h.engine.create_set(request("boots", keywords("boots", 9), None)).await.unwrap();
    h.clear_calls();

    let grown = h.engine.modify_keywords("shoes", keywords("shoes", 6)).await;
    assert!(matches!(grown, Err(Error::Overflow(_))));

    let empty = h.engine.modify_keywords("shoes", vec![]).await;
    assert!(matches!(empty, Err(Error::Validation(_))));

    let broken = h
        .engine
        .modify_keywords("shoes", vec![Keyword::new("red\r\nshoes")])
        .await;
    assert!(matches!(broken, Err(Error::Validation(_))));

    let missing = h.engine.modify_keywords("hats", keywords("hats", 1)).await;
    assert!(matches!(missing, Err(Error::NotFound(_))));

    assert!(h.calls().is_empty());
}

#[tokio::test]
async fn test_drop_set_removes_everywhere() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    h.engine.create_set(request("shoes", keywords("shoes", 4), None)).await.unwrap();
    let adgroups = h.store.adgroups_by_set("shoes").await.unwrap();

    h.engine.drop_set("shoes").await.unwrap();

    assert!(h.store.adgroups_by_set("shoes").await.unwrap().is_empty());
    for g in &adgroups {
        assert!(h.remote_adgroup(g.id).is_none());
        assert!(h.ledger().name_of(EntityType::AdGroup, g.id).await.is_err());
    }
    // the campaign itself stays, empty
    let usage = h.store.campaign_usage(None).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].adgroup_count, 0);

    assert!(matches!(h.engine.drop_set("shoes").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_change_default_bid_updates_remote_and_mirror() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    h.engine.create_set(request("shoes", keywords("shoes", 4), None)).await.unwrap();

    h.engine.change_default_bid("shoes", dec!(0.75)).await.unwrap();

    for g in h.store.adgroups_by_set("shoes").await.unwrap() {
        assert_eq!(g.default_bid, dec!(0.75));
        assert_eq!(h.remote_adgroup(g.id).unwrap().bid, dec!(0.75));
    }
    assert!(matches!(
        h.engine.change_default_bid("shoes", Decimal::ZERO).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        h.engine.change_default_bid("boots", dec!(1)).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_change_default_bid_stops_at_first_failure() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    h.engine.create_set(request("shoes", keywords("shoes", 7), None)).await.unwrap();
    h.fail_on("set_default_bid", 2);

    let err = h.engine.change_default_bid("shoes", dec!(0.90)).await.unwrap_err();

    assert!(matches!(err, Error::ResponseValidation { .. }));
    let bids: Vec<Decimal> = h
        .store
        .adgroups_by_set("shoes")
        .await
        .unwrap()
        .iter()
        .map(|g| g.default_bid)
        .collect();
    assert_eq!(bids, vec![dec!(0.90), dec!(0.25), dec!(0.25)]);
}

#[tokio::test]
async fn test_report_for_zero_traffic_set() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    h.engine.create_set(request("shoes", keywords("shoes", 4), None)).await.unwrap();
    h.clear_calls();

    assert!(matches!(
        h.engine.report_set_performance("shoes", 0).await,
        Err(Error::Validation(_))
    ));
    assert!(h.calls().is_empty());

    let report = h.engine.report_set_performance("shoes", 7).await.unwrap();

    assert_eq!(report.len(), 4);
    for stats in report.values() {
        assert_eq!((stats.clicks, stats.impressions), (0, 0));
        assert!(stats.ctr.is_none() && stats.cpc.is_none());
        assert!(stats.cost.is_none() && stats.avg_position.is_none());
    }
    assert_eq!(
        h.calls().iter().filter(|c| c.starts_with("keyword_report")).count(),
        2
    );
}

#[tokio::test]
async fn test_report_keyword_in_two_adgroups_keeps_later_adgroup() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    let list = vec![
        Keyword::new("boots"),
        Keyword::new("sandals"),
        Keyword::new("slippers"),
        Keyword::new("boots"),
    ];
    h.engine.create_set(request("shoes", list, None)).await.unwrap();

    let adgroups = h.store.adgroups_by_set("shoes").await.unwrap();
    assert_eq!(adgroups.len(), 2);
    {
        let mut remote = h.remote.lock().unwrap();
        remote.clicks.insert(adgroups[0].id, 5);
        remote.clicks.insert(adgroups[1].id, 9);
    }

    let report = h.engine.report_set_performance("shoes", 7).await.unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report["boots"].clicks, 9);
    assert_eq!(report["sandals"].clicks, 5);
}

// ----------------------------------------
// Accounts
// ----------------------------------------

#[tokio::test]
async fn test_account_capacity_reflects_placements() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    h.engine.create_set(request("shoes", keywords("shoes", 7), None)).await.unwrap();

    let first = h.engine.account_capacity("a@example.com").await.unwrap();
    let second = h.engine.account_capacity("a@example.com").await.unwrap();

    assert_eq!(first, vec![4, 1]);
    assert_eq!(first, second);
    assert_eq!(h.engine.set_capacity("shoes").await.unwrap(), 12);
}

#[tokio::test]
async fn test_add_and_remove_account() {
    let h = Harness::new(small(), &["a@example.com"]).await;
    assert!(matches!(
        h.engine.add_account("a@example.com", "x").await,
        Err(Error::AlreadyExists(_))
    ));

    h.engine.create_set(request("shoes", keywords("shoes", 2), None)).await.unwrap();
    let adgroup_id = h.store.adgroups_by_set("shoes").await.unwrap()[0].id;
    h.clear_calls();

    h.engine.add_account("b@example.com", "other").await.unwrap();
    let emails: Vec<String> = h
        .engine
        .list_accounts()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.email)
        .collect();
    assert_eq!(emails, vec!["a@example.com", "b@example.com"]);

    h.engine.remove_account("a@example.com").await.unwrap();

    assert_eq!(h.engine.list_accounts().await.unwrap().len(), 1);
    assert!(h.store.adgroups_by_set("shoes").await.unwrap().is_empty());
    assert!(h.store.campaign_usage(None).await.unwrap().is_empty());
    assert!(h.remote_adgroup(adgroup_id).is_some());
    assert!(h.calls().is_empty());
    assert!(matches!(
        h.engine.remove_account("a@example.com").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_clone_account_moves_structure() {
    let h = Harness::new(small(), &["a@example.com", "b@example.com"]).await;
    let mut shoes = keywords("shoes", 5);
    shoes[0] = Keyword::new("shoes 0").with_bid(dec!(0.60));
    h.engine
        .create_set(request("shoes", shoes.clone(), Some("a@example.com")))
        .await
        .unwrap();
    h.engine
        .create_set(request("boots", keywords("boots", 2), Some("a@example.com")))
        .await
        .unwrap();

    let summary = h
        .engine
        .clone_account("a@example.com", "b@example.com")
        .await
        .unwrap();

    assert_eq!(summary.campaigns, 1);
    assert_eq!(summary.adgroups, 3);
    assert!(h.store.find_account("a@example.com").await.unwrap().is_none());

    let b = h.store.find_account("b@example.com").await.unwrap().unwrap();
    let campaigns = h.store.campaigns_by_account(b.id).await.unwrap();
    assert_eq!(campaigns.len(), 1);
    assert_eq!(
        h.ledger().name_of(EntityType::Campaign, campaigns[0].id).await.unwrap(),
        "campaign__1"
    );

    let cloned = h.store.adgroups_by_set("shoes").await.unwrap();
    assert_eq!(cloned.len(), 2);
    assert!(cloned.iter().all(|g| g.campaign_id == campaigns[0].id));
    let remote: Vec<Keyword> = cloned
        .iter()
        .flat_map(|g| h.remote_adgroup(g.id).unwrap().keywords)
        .collect();
    assert_eq!(remote, shoes);
    assert_eq!(h.store.adgroups_by_set("boots").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_clone_account_checks_destination_room() {
    let limits = Limits {
        max_campaigns_per_account: 1,
        ..small()
    };
    let h = Harness::new(limits, &["a@example.com", "b@example.com"]).await;
    h.engine
        .create_set(request("shoes", keywords("shoes", 2), Some("a@example.com")))
        .await
        .unwrap();
    h.engine
        .create_set(request("boots", keywords("boots", 2), Some("b@example.com")))
        .await
        .unwrap();
    h.clear_calls();

    let full = h.engine.clone_account("a@example.com", "b@example.com").await;
    assert!(matches!(full, Err(Error::Overflow(_))));

    let same = h.engine.clone_account("a@example.com", "a@example.com").await;
    assert!(matches!(same, Err(Error::Validation(_))));

    assert!(h.calls().is_empty());
}
