use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::codec::{decode_list, encode_list, object_from_value};
use super::{TierError, TierKind, TierStore};
use crate::workflows::pipeline::categories::{CategoryError, CategoryLinks};
use crate::workflows::pipeline::domain::{
    Category, Listing, ListingId, ListingMetrics, ProfileFields, Submission, SubmissionId,
    SubmissionStatus,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS submissions (
        id TEXT PRIMARY KEY,
        slug TEXT NOT NULL,
        display_name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT,
        company TEXT NOT NULL,
        job_title TEXT NOT NULL,
        location TEXT NOT NULL,
        website TEXT,
        linkedin_url TEXT,
        photo_url TEXT,
        bio TEXT NOT NULL,
        years_experience INTEGER,
        specializations TEXT NOT NULL DEFAULT '[]',
        industries TEXT NOT NULL DEFAULT '[]',
        achievements TEXT NOT NULL DEFAULT '[]',
        languages TEXT NOT NULL DEFAULT '[]',
        category_ids TEXT NOT NULL DEFAULT '[]',
        metrics TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        submitted_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS listings (
        id TEXT PRIMARY KEY,
        slug TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT,
        company TEXT NOT NULL,
        job_title TEXT NOT NULL,
        location TEXT NOT NULL,
        website TEXT,
        linkedin_url TEXT,
        photo_url TEXT,
        bio TEXT NOT NULL,
        years_experience INTEGER,
        specializations TEXT NOT NULL DEFAULT '[]',
        industries TEXT NOT NULL DEFAULT '[]',
        achievements TEXT NOT NULL DEFAULT '[]',
        languages TEXT NOT NULL DEFAULT '[]',
        category_ids TEXT NOT NULL DEFAULT '[]',
        total_placements INTEGER NOT NULL DEFAULT 0,
        avg_time_to_fill_days INTEGER NOT NULL DEFAULT 30,
        candidate_satisfaction_pct INTEGER NOT NULL DEFAULT 90,
        client_retention_pct INTEGER NOT NULL DEFAULT 90,
        approved INTEGER NOT NULL DEFAULT 1,
        hidden INTEGER NOT NULL DEFAULT 0,
        featured INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS categories (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS listing_categories (
        listing_id TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
        category_id TEXT NOT NULL REFERENCES categories(id) ON DELETE RESTRICT,
        PRIMARY KEY (listing_id, category_id)
    )",
];

const PROFILE_COLUMNS: &[&str] = &[
    "display_name",
    "email",
    "phone",
    "company",
    "job_title",
    "location",
    "website",
    "linkedin_url",
    "photo_url",
    "bio",
    "years_experience",
    "specializations",
    "industries",
    "achievements",
    "languages",
];

const SUBMISSION_TAIL: &[&str] = &[
    "category_ids",
    "metrics",
    "status",
    "submitted_at",
    "updated_at",
];

const LISTING_TAIL: &[&str] = &[
    "category_ids",
    "total_placements",
    "avg_time_to_fill_days",
    "candidate_satisfaction_pct",
    "client_retention_pct",
    "approved",
    "hidden",
    "featured",
    "created_at",
    "updated_at",
];

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn columns(tail: &[&'static str]) -> Vec<&'static str> {
    let mut all = vec!["id", "slug"];
    all.extend_from_slice(PROFILE_COLUMNS);
    all.extend_from_slice(tail);
    all
}

fn insert_sql(table: &str, columns: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    )
}

fn upsert_sql(table: &str, columns: &[&str], preserved: &[&str]) -> String {
    let updates = columns
        .iter()
        .filter(|column| **column != "id" && !preserved.contains(*column))
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} ON CONFLICT(id) DO UPDATE SET {updates}",
        insert_sql(table, columns)
    )
}

fn transport(err: sqlx::Error) -> TierError {
    TierError::unavailable(TierKind::Primary, err)
}

/// Maps a failed write to a conflict when the database reports a uniqueness violation.
fn write_error(err: sqlx::Error, id: &str, slug: Option<&str>) -> TierError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return match slug {
                Some(slug) if db_err.message().contains(".slug") => TierError::UniqueViolation {
                    slug: slug.to_string(),
                },
                _ => TierError::AlreadyExists(id.to_string()),
            };
        }
    }
    transport(err)
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_pct(value: i64) -> u8 {
    u8::try_from(value.clamp(0, 100)).unwrap_or(0)
}

fn bind_profile<'q>(query: SqliteQuery<'q>, profile: &ProfileFields) -> SqliteQuery<'q> {
    query
        .bind(profile.display_name.clone())
        .bind(profile.email.clone())
        .bind(profile.phone.clone())
        .bind(profile.company.clone())
        .bind(profile.job_title.clone())
        .bind(profile.location.clone())
        .bind(profile.website.clone())
        .bind(profile.linkedin_url.clone())
        .bind(profile.photo_url.clone())
        .bind(profile.bio.clone())
        .bind(profile.years_experience.map(i64::from))
        .bind(encode_list(&profile.specializations))
        .bind(encode_list(&profile.industries))
        .bind(encode_list(&profile.achievements))
        .bind(encode_list(&profile.languages))
}

fn bind_submission<'q>(query: SqliteQuery<'q>, submission: &Submission) -> SqliteQuery<'q> {
    let metrics = submission
        .metrics
        .as_ref()
        .and_then(|metrics| serde_json::to_string(metrics).ok());
    let query = query
        .bind(submission.id.0.clone())
        .bind(submission.slug.clone());
    bind_profile(query, &submission.profile)
        .bind(encode_list(&submission.category_ids))
        .bind(metrics)
        .bind(submission.status.label())
        .bind(submission.submitted_at)
        .bind(submission.updated_at)
}

fn bind_listing<'q>(query: SqliteQuery<'q>, listing: &Listing) -> SqliteQuery<'q> {
    let query = query.bind(listing.id.0.clone()).bind(listing.slug.clone());
    bind_profile(query, &listing.profile)
        .bind(encode_list(&listing.category_ids))
        .bind(i64::from(listing.metrics.total_placements))
        .bind(i64::from(listing.metrics.avg_time_to_fill_days))
        .bind(i64::from(listing.metrics.candidate_satisfaction_pct))
        .bind(i64::from(listing.metrics.client_retention_pct))
        .bind(listing.approved)
        .bind(listing.hidden)
        .bind(listing.featured)
        .bind(listing.created_at)
        .bind(listing.updated_at)
}

fn profile_from_row(row: &SqliteRow) -> Result<ProfileFields, sqlx::Error> {
    let list = |column: &str| -> Result<Vec<String>, sqlx::Error> {
        let raw: Option<String> = row.try_get(column)?;
        Ok(raw.as_deref().map(decode_list).unwrap_or_default())
    };
    let years: Option<i64> = row.try_get("years_experience")?;

    Ok(ProfileFields {
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        company: row.try_get("company")?,
        job_title: row.try_get("job_title")?,
        location: row.try_get("location")?,
        website: row.try_get("website")?,
        linkedin_url: row.try_get("linkedin_url")?,
        photo_url: row.try_get("photo_url")?,
        bio: row.try_get("bio")?,
        years_experience: years.and_then(|value| u16::try_from(value).ok()),
        specializations: list("specializations")?,
        industries: list("industries")?,
        achievements: list("achievements")?,
        languages: list("languages")?,
    })
}

fn submission_from_row(row: &SqliteRow) -> Result<Submission, sqlx::Error> {
    let categories: Option<String> = row.try_get("category_ids")?;
    let metrics: Option<String> = row.try_get("metrics")?;
    let status: String = row.try_get("status")?;

    Ok(Submission {
        id: SubmissionId(row.try_get("id")?),
        slug: row.try_get("slug")?,
        profile: profile_from_row(row)?,
        category_ids: categories.as_deref().map(decode_list).unwrap_or_default(),
        metrics: metrics.and_then(|raw| object_from_value(serde_json::Value::String(raw))),
        status: SubmissionStatus::parse(&status).unwrap_or(SubmissionStatus::Pending),
        submitted_at: row.try_get::<DateTime<Utc>, _>("submitted_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn listing_from_row(row: &SqliteRow) -> Result<Listing, sqlx::Error> {
    let categories: Option<String> = row.try_get("category_ids")?;

    Ok(Listing {
        id: ListingId(row.try_get("id")?),
        slug: row.try_get("slug")?,
        profile: profile_from_row(row)?,
        category_ids: categories.as_deref().map(decode_list).unwrap_or_default(),
        metrics: ListingMetrics {
            total_placements: to_u32(row.try_get("total_placements")?),
            avg_time_to_fill_days: to_u32(row.try_get("avg_time_to_fill_days")?),
            candidate_satisfaction_pct: to_pct(row.try_get("candidate_satisfaction_pct")?),
            client_retention_pct: to_pct(row.try_get("client_retention_pct")?),
        },
        approved: row.try_get("approved")?,
        hidden: row.try_get("hidden")?,
        featured: row.try_get("featured")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

/// Primary tier backed by the managed relational database.
///
/// The pool connects lazily and the schema is created on the first successful call, so an
/// unreachable database surfaces as [`TierError::Unavailable`] per call rather than at boot.
#[derive(Debug)]
pub struct PrimaryStore {
    pool: SqlitePool,
    schema: OnceCell<()>,
}

impl PrimaryStore {
    pub fn connect_lazy(url: &str) -> Result<Self, TierError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(transport)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_lazy_with(options);
        Ok(Self::from_pool(pool))
    }

    /// Single-connection in-memory database, used by tests and the CLI demo.
    pub async fn in_memory() -> Result<Self, TierError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(transport)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(transport)?;
        let store = Self::from_pool(pool);
        store.ready().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            schema: OnceCell::new(),
        }
    }

    /// Closes the pool; every later call reports the store as unavailable.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ready(&self) -> Result<&SqlitePool, TierError> {
        self.schema
            .get_or_try_init(|| async {
                for statement in SCHEMA {
                    sqlx::query(statement).execute(&self.pool).await?;
                }
                info!("primary store schema ready");
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(transport)?;
        Ok(&self.pool)
    }

    async fn delete_from(&self, table: &str, id: &str) -> Result<bool, TierError> {
        let pool = self.ready().await?;
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
            .bind(id)
            .execute(pool)
            .await
            .map_err(transport)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_rows(&self, table: &str) -> Result<usize, TierError> {
        let pool = self.ready().await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .map_err(transport)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl TierStore<Submission> for PrimaryStore {
    fn kind(&self) -> TierKind {
        TierKind::Primary
    }

    async fn read_all(&self) -> Result<Vec<Submission>, TierError> {
        let pool = self.ready().await?;
        let rows = sqlx::query("SELECT * FROM submissions ORDER BY submitted_at, id")
            .fetch_all(pool)
            .await
            .map_err(transport)?;
        rows.iter()
            .map(submission_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(transport)
    }

    async fn read_one(&self, id: &str) -> Result<Option<Submission>, TierError> {
        let pool = self.ready().await?;
        let row = sqlx::query("SELECT * FROM submissions WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(transport)?;
        row.as_ref()
            .map(submission_from_row)
            .transpose()
            .map_err(transport)
    }

    async fn write_all(&self, records: &[Submission]) -> Result<(), TierError> {
        let pool = self.ready().await?;
        let sql = upsert_sql("submissions", &columns(SUBMISSION_TAIL), &["submitted_at"]);
        let mut tx = pool.begin().await.map_err(transport)?;
        for record in records {
            bind_submission(sqlx::query(&sql), record)
                .execute(&mut *tx)
                .await
                .map_err(|err| write_error(err, &record.id.0, None))?;
        }
        tx.commit().await.map_err(transport)?;
        debug!(count = records.len(), "primary batch upsert of submissions committed");
        Ok(())
    }

    async fn upsert(&self, record: &Submission) -> Result<(), TierError> {
        let pool = self.ready().await?;
        let sql = upsert_sql("submissions", &columns(SUBMISSION_TAIL), &["submitted_at"]);
        bind_submission(sqlx::query(&sql), record)
            .execute(pool)
            .await
            .map_err(|err| write_error(err, &record.id.0, None))?;
        Ok(())
    }

    async fn insert(&self, record: &Submission) -> Result<(), TierError> {
        let pool = self.ready().await?;
        let sql = insert_sql("submissions", &columns(SUBMISSION_TAIL));
        bind_submission(sqlx::query(&sql), record)
            .execute(pool)
            .await
            .map_err(|err| write_error(err, &record.id.0, None))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, TierError> {
        self.delete_from("submissions", id).await
    }

    async fn count(&self) -> Result<usize, TierError> {
        self.count_rows("submissions").await
    }
}

#[async_trait]
impl TierStore<Listing> for PrimaryStore {
    fn kind(&self) -> TierKind {
        TierKind::Primary
    }

    async fn read_all(&self) -> Result<Vec<Listing>, TierError> {
        let pool = self.ready().await?;
        let rows = sqlx::query("SELECT * FROM listings ORDER BY created_at, id")
            .fetch_all(pool)
            .await
            .map_err(transport)?;
        rows.iter()
            .map(listing_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(transport)
    }

    async fn read_one(&self, id: &str) -> Result<Option<Listing>, TierError> {
        let pool = self.ready().await?;
        let row = sqlx::query("SELECT * FROM listings WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(transport)?;
        row.as_ref()
            .map(listing_from_row)
            .transpose()
            .map_err(transport)
    }

    async fn write_all(&self, records: &[Listing]) -> Result<(), TierError> {
        let pool = self.ready().await?;
        let sql = upsert_sql("listings", &columns(LISTING_TAIL), &["created_at"]);
        let mut tx = pool.begin().await.map_err(transport)?;
        for record in records {
            bind_listing(sqlx::query(&sql), record)
                .execute(&mut *tx)
                .await
                .map_err(|err| write_error(err, &record.id.0, Some(&record.slug)))?;
        }
        tx.commit().await.map_err(transport)?;
        debug!(count = records.len(), "primary batch upsert of listings committed");
        Ok(())
    }

    async fn upsert(&self, record: &Listing) -> Result<(), TierError> {
        let pool = self.ready().await?;
        let sql = upsert_sql("listings", &columns(LISTING_TAIL), &["created_at"]);
        bind_listing(sqlx::query(&sql), record)
            .execute(pool)
            .await
            .map_err(|err| write_error(err, &record.id.0, Some(&record.slug)))?;
        Ok(())
    }

    /// SQLite reports the slug index before the primary key, so the id is checked first in the
    /// same transaction to keep a repeated id from reading as a slug clash.
    async fn insert(&self, record: &Listing) -> Result<(), TierError> {
        let pool = self.ready().await?;
        let sql = insert_sql("listings", &columns(LISTING_TAIL));
        let mut tx = pool.begin().await.map_err(transport)?;
        let existing: Option<i64> = sqlx::query_scalar("SELECT 1 FROM listings WHERE id = ?")
            .bind(&record.id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(transport)?;
        if existing.is_some() {
            return Err(TierError::AlreadyExists(record.id.0.clone()));
        }
        bind_listing(sqlx::query(&sql), record)
            .execute(&mut *tx)
            .await
            .map_err(|err| write_error(err, &record.id.0, Some(&record.slug)))?;
        tx.commit().await.map_err(transport)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, TierError> {
        self.delete_from("listings", id).await
    }

    async fn count(&self) -> Result<usize, TierError> {
        self.count_rows("listings").await
    }
}

#[async_trait]
impl CategoryLinks for PrimaryStore {
    async fn upsert_category(&self, category: &Category) -> Result<(), CategoryError> {
        let pool = self.ready().await?;
        sqlx::query(
            "INSERT INTO categories (id, name, slug) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, slug = excluded.slug",
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.slug)
        .execute(pool)
        .await
        .map_err(transport)?;
        Ok(())
    }

    async fn link_listing(
        &self,
        listing_id: &ListingId,
        category_ids: &[String],
    ) -> Result<(), CategoryError> {
        let pool = self.ready().await?;
        let mut tx = pool.begin().await.map_err(transport)?;
        for category_id in category_ids {
            let outcome = sqlx::query(
                "INSERT INTO listing_categories (listing_id, category_id) VALUES (?, ?)
                 ON CONFLICT(listing_id, category_id) DO NOTHING",
            )
            .bind(&listing_id.0)
            .bind(category_id)
            .execute(&mut *tx)
            .await;

            if let Err(err) = outcome {
                if let sqlx::Error::Database(db_err) = &err {
                    if db_err.is_foreign_key_violation() {
                        return Err(CategoryError::UnknownReference {
                            listing_id: listing_id.0.clone(),
                            category_id: category_id.clone(),
                        });
                    }
                }
                return Err(transport(err).into());
            }
        }
        tx.commit().await.map_err(transport)?;
        Ok(())
    }

    async fn linked_categories(&self, listing_id: &ListingId) -> Result<Vec<String>, CategoryError> {
        let pool = self.ready().await?;
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT category_id FROM listing_categories WHERE listing_id = ? ORDER BY category_id",
        )
        .bind(&listing_id.0)
        .fetch_all(pool)
        .await
        .map_err(transport)?;
        Ok(ids)
    }

    async fn unlink_listing(&self, listing_id: &ListingId) -> Result<(), CategoryError> {
        let pool = self.ready().await?;
        sqlx::query("DELETE FROM listing_categories WHERE listing_id = ?")
            .bind(&listing_id.0)
            .execute(pool)
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn delete_category(&self, category_id: &str) -> Result<(), CategoryError> {
        let pool = self.ready().await?;
        let references: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM listing_categories WHERE category_id = ?")
                .bind(category_id)
                .fetch_one(pool)
                .await
                .map_err(transport)?;
        if references > 0 {
            return Err(CategoryError::InUse {
                category_id: category_id.to_string(),
                listings: usize::try_from(references).unwrap_or(usize::MAX),
            });
        }

        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(category_id)
            .execute(pool)
            .await
            .map_err(transport)?;
        if result.rows_affected() == 0 {
            return Err(CategoryError::NotFound(category_id.to_string()));
        }
        Ok(())
    }
}
