//! Local persistence — a SQLite cache of the session and the pending
//! company list, so a restart shows state immediately while the backfill
//! runs.

use std::str::FromStr;

use alloy::primitives::Address;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::Result;
use crate::events::{iso_date, CompanyProfile, PendingCompany};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the cache database and run migrations.
    pub async fn init(database_url: &str) -> Result<Self> {
        let url = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite:{database_url}")
        };

        let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Cache database ready");
        Ok(Store { pool })
    }

    // ─────────────────────────────────────────────────────
    // Session cache
    // ─────────────────────────────────────────────────────

    pub async fn save_session(&self, account: Address, is_admin: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_cache (id, account, is_admin)
            VALUES (1, ?1, ?2)
            ON CONFLICT (id) DO UPDATE SET account = ?1, is_admin = ?2
            "#,
        )
        .bind(account.to_string())
        .bind(is_admin)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_session(&self) -> Result<Option<(Address, bool)>> {
        let row: Option<(String, bool)> =
            sqlx::query_as("SELECT account, is_admin FROM session_cache WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        // A cache row that no longer parses is treated as absent.
        Ok(row.and_then(|(account, is_admin)| {
            account.parse::<Address>().ok().map(|a| (a, is_admin))
        }))
    }

    pub async fn clear_session(&self) -> Result<()> {
        sqlx::query("DELETE FROM session_cache WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────
    // Pending-company cache
    // ─────────────────────────────────────────────────────

    /// Overwrite the cached pending list with a fresh snapshot.
    pub async fn replace_pending(&self, companies: &[PendingCompany]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pending_companies")
            .execute(&mut *tx)
            .await?;
        for c in companies {
            sqlx::query(
                r#"
                INSERT INTO pending_companies
                    (wallet, name, company_type, registration_number, country,
                     city, address, email, phone, registered_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(c.wallet.to_string())
            .bind(&c.profile.name)
            .bind(&c.profile.company_type)
            .bind(&c.profile.registration_number)
            .bind(&c.profile.country)
            .bind(&c.profile.city)
            .bind(&c.profile.address)
            .bind(&c.profile.email)
            .bind(&c.profile.phone)
            .bind(c.registered_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_pending(&self) -> Result<Vec<PendingCompany>> {
        let rows: Vec<PendingRow> = sqlx::query_as(
            r#"
            SELECT wallet, name, company_type, registration_number, country,
                   city, address, email, phone, registered_at
            FROM   pending_companies
            ORDER  BY registered_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let wallet = r.wallet.parse::<Address>().ok()?;
                Some(PendingCompany {
                    wallet,
                    profile: CompanyProfile {
                        name: r.name,
                        company_type: r.company_type,
                        registration_number: r.registration_number,
                        country: r.country,
                        city: r.city,
                        address: r.address,
                        email: r.email,
                        phone: r.phone,
                    },
                    registered_at: r.registered_at,
                    registered_date: iso_date(r.registered_at),
                })
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    wallet: String,
    name: String,
    company_type: String,
    registration_number: String,
    country: String,
    city: String,
    address: String,
    email: String,
    phone: String,
    registered_at: i64,
}
