//! LocalMirror Repository
//!
//! Repository interfaces over the mirror and the name ledger, plus the MySQL
//! implementation of both.

use super::types::*;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::MySqlPool;

/// Account/Campaign/AdGroup store
#[async_trait]
pub trait MirrorRepository: Send + Sync {
    /// Create the four relations if absent
    async fn install(&self) -> Result<()>;

    async fn insert_account(&self, email: &str, password: &str) -> Result<Account>;
    async fn find_account(&self, email: &str) -> Result<Option<Account>>;
    async fn get_account(&self, id: i64) -> Result<Option<Account>>;
    async fn list_accounts(&self) -> Result<Vec<Account>>;
    /// Removes the account with its campaign and ad group rows
    async fn delete_account(&self, id: i64) -> Result<()>;

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<()>;
    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>>;
    async fn campaigns_by_account(&self, account_id: i64) -> Result<Vec<Campaign>>;

    async fn insert_adgroup(&self, adgroup: &AdGroup) -> Result<()>;
    /// Ad groups of a set in creation (id) order
    async fn adgroups_by_set(&self, label: &str) -> Result<Vec<AdGroup>>;
    async fn adgroups_by_campaign(&self, campaign_id: i64) -> Result<Vec<AdGroup>>;
    async fn update_adgroup_bid(&self, id: i64, bid: Decimal) -> Result<()>;
    async fn delete_adgroup(&self, id: i64) -> Result<()>;

    /// Ad group counts per campaign, optionally for one account, ordered by campaign id
    async fn campaign_usage(&self, account_id: Option<i64>) -> Result<Vec<CampaignUsage>>;
    /// Campaign counts per account, ordered by account id
    async fn account_usage(&self) -> Result<Vec<AccountUsage>>;
}

/// `usednames` store
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn insert_name(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        parent_id: i64,
        name: &str,
    ) -> Result<()>;

    /// Every name ever recorded in the scope, tombstoned ones included
    async fn names_in_scope(&self, entity_type: EntityType, parent_id: i64) -> Result<Vec<String>>;

    async fn find_active(&self, entity_type: EntityType, entity_id: i64) -> Result<Option<UsedName>>;

    /// Tombstone one ledger row
    async fn deactivate(&self, row_id: i64) -> Result<()>;
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        email VARCHAR(255) NOT NULL,
        password VARCHAR(255) NOT NULL,
        UNIQUE KEY uq_accounts_email (email)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS campaigns (
        id BIGINT NOT NULL PRIMARY KEY,
        account_id BIGINT NOT NULL,
        KEY idx_campaigns_account (account_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS adgroups (
        id BIGINT NOT NULL PRIMARY KEY,
        campaign_id BIGINT NOT NULL,
        `set` VARCHAR(255) NOT NULL,
        default_bid DECIMAL(10, 2) NOT NULL,
        default_url VARCHAR(1024) NOT NULL,
        display_url VARCHAR(255) NOT NULL,
        headline VARCHAR(255) NOT NULL,
        adline1 VARCHAR(255) NOT NULL,
        adline2 VARCHAR(255) NOT NULL,
        KEY idx_adgroups_campaign (campaign_id),
        KEY idx_adgroups_set (`set`)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS usednames (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        entity_type VARCHAR(32) NOT NULL,
        entity_id BIGINT NOT NULL,
        entity_parent_id BIGINT NOT NULL,
        entity_name VARCHAR(255) NOT NULL,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        KEY idx_usednames_scope (entity_type, entity_parent_id),
        KEY idx_usednames_entity (entity_type, entity_id)
    )
    "#,
];

const ADGROUP_COLUMNS: &str = r#"
    id, campaign_id, `set`, default_bid, default_url, display_url,
    headline, adline1, adline2
"#;

/// MySQL-backed mirror and ledger
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MirrorRepository for MySqlStore {
    async fn install(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Mirror schema installed");
        Ok(())
    }

    async fn insert_account(&self, email: &str, password: &str) -> Result<Account> {
        let result = sqlx::query("INSERT INTO accounts (email, password) VALUES (?, ?)")
            .bind(email)
            .bind(password)
            .execute(&self.pool)
            .await?;

        Ok(Account {
            id: result.last_insert_id() as i64,
            email: email.to_string(),
            password: password.to_string(),
        })
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, email, password FROM accounts WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let account =
            sqlx::query_as::<_, Account>("SELECT id, email, password FROM accounts WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(account)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let accounts =
            sqlx::query_as::<_, Account>("SELECT id, email, password FROM accounts ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(accounts)
    }

    async fn delete_account(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE g FROM adgroups g
            JOIN campaigns c ON g.campaign_id = c.id
            WHERE c.account_id = ?
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM campaigns WHERE account_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<()> {
        sqlx::query("INSERT INTO campaigns (id, account_id) VALUES (?, ?)")
            .bind(campaign.id)
            .bind(campaign.account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        let campaign =
            sqlx::query_as::<_, Campaign>("SELECT id, account_id FROM campaigns WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(campaign)
    }

    async fn campaigns_by_account(&self, account_id: i64) -> Result<Vec<Campaign>> {
        let campaigns = sqlx::query_as::<_, Campaign>(
            "SELECT id, account_id FROM campaigns WHERE account_id = ? ORDER BY id",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(campaigns)
    }

    async fn insert_adgroup(&self, adgroup: &AdGroup) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO adgroups (
                id, campaign_id, `set`, default_bid, default_url, display_url,
                headline, adline1, adline2
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(adgroup.id)
        .bind(adgroup.campaign_id)
        .bind(&adgroup.set_label)
        .bind(adgroup.default_bid)
        .bind(&adgroup.default_url)
        .bind(&adgroup.display_url)
        .bind(&adgroup.headline)
        .bind(&adgroup.adline1)
        .bind(&adgroup.adline2)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn adgroups_by_set(&self, label: &str) -> Result<Vec<AdGroup>> {
        let query = format!(
            "SELECT {} FROM adgroups WHERE `set` = ? ORDER BY id",
            ADGROUP_COLUMNS
        );
        let adgroups = sqlx::query_as::<_, AdGroup>(&query)
            .bind(label)
            .fetch_all(&self.pool)
            .await?;

        Ok(adgroups)
    }

    async fn adgroups_by_campaign(&self, campaign_id: i64) -> Result<Vec<AdGroup>> {
        let query = format!(
            "SELECT {} FROM adgroups WHERE campaign_id = ? ORDER BY id",
            ADGROUP_COLUMNS
        );
        let adgroups = sqlx::query_as::<_, AdGroup>(&query)
            .bind(campaign_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(adgroups)
    }

    async fn update_adgroup_bid(&self, id: i64, bid: Decimal) -> Result<()> {
        sqlx::query("UPDATE adgroups SET default_bid = ? WHERE id = ?")
            .bind(bid)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_adgroup(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM adgroups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn campaign_usage(&self, account_id: Option<i64>) -> Result<Vec<CampaignUsage>> {
        let usage = sqlx::query_as::<_, CampaignUsage>(
            r#"
            SELECT c.id AS campaign_id, c.account_id, COUNT(g.id) AS adgroup_count
            FROM campaigns c
            LEFT JOIN adgroups g ON g.campaign_id = c.id
            WHERE (? IS NULL OR c.account_id = ?)
            GROUP BY c.id, c.account_id
            ORDER BY c.id
            "#,
        )
        .bind(account_id)
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(usage)
    }

    async fn account_usage(&self) -> Result<Vec<AccountUsage>> {
        let usage = sqlx::query_as::<_, AccountUsage>(
            r#"
            SELECT a.id AS account_id, a.email, COUNT(c.id) AS campaign_count
            FROM accounts a
            LEFT JOIN campaigns c ON c.account_id = a.id
            GROUP BY a.id, a.email
            ORDER BY a.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(usage)
    }
}

#[async_trait]
impl LedgerRepository for MySqlStore {
    async fn insert_name(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        parent_id: i64,
        name: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO usednames (entity_type, entity_id, entity_parent_id, entity_name, active)
            VALUES (?, ?, ?, ?, TRUE)
            "#,
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .bind(parent_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn names_in_scope(&self, entity_type: EntityType, parent_id: i64) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT entity_name FROM usednames WHERE entity_type = ? AND entity_parent_id = ?",
        )
        .bind(entity_type.as_str())
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    async fn find_active(&self, entity_type: EntityType, entity_id: i64) -> Result<Option<UsedName>> {
        let entry = sqlx::query_as::<_, UsedName>(
            r#"
            SELECT id, entity_type, entity_id, entity_parent_id, entity_name, active
            FROM usednames
            WHERE entity_type = ? AND entity_id = ? AND active = TRUE
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn deactivate(&self, row_id: i64) -> Result<()> {
        sqlx::query("UPDATE usednames SET active = FALSE WHERE id = ?")
            .bind(row_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
