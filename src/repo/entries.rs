use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::debug;

use super::{DeleteResult, Page, UpdateResult};
use crate::error::ApiResult;
use crate::model::entry::{ENTRY_COLUMNS, Entry, NewEntry};
use crate::utils::db_utils::{SqlFilter, SqlValue, arguments, build_update_sql};

const SELECT_ENTRY: &str = r#"
    SELECT id, date, user_id, oidc_user_identifier, type, am, pm,
           taken, refresh, plus_one, reserve, comment
    FROM entries
"#;

/// Identity columns only ever grow on upsert, so an existing legacy record
/// picks up the username instead of being duplicated.
const UPSERT_ENTRY: &str = r#"
    INSERT INTO entries
        (date, user_id, oidc_user_identifier, type, am, pm,
         taken, refresh, plus_one, reserve, comment)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON DUPLICATE KEY UPDATE
        id = LAST_INSERT_ID(id),
        user_id = COALESCE(VALUES(user_id), user_id),
        oidc_user_identifier = COALESCE(VALUES(oidc_user_identifier), oidc_user_identifier),
        type = VALUES(type),
        am = VALUES(am),
        pm = VALUES(pm),
        taken = VALUES(taken),
        refresh = VALUES(refresh),
        plus_one = VALUES(plus_one),
        reserve = VALUES(reserve),
        comment = COALESCE(VALUES(comment), comment)
"#;

const INSERT_ENTRY: &str = r#"
    INSERT INTO entries
        (date, user_id, oidc_user_identifier, type, am, pm,
         taken, refresh, plus_one, reserve, comment)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn optional(value: &Option<String>) -> SqlValue {
    value.clone().map(SqlValue::String).unwrap_or(SqlValue::Null)
}

fn entry_values(entry: &NewEntry) -> Vec<SqlValue> {
    vec![
        SqlValue::DateTime(entry.date),
        optional(&entry.user_id),
        optional(&entry.oidc_user_identifier),
        SqlValue::String(entry.entry_type.clone()),
        SqlValue::Bool(entry.am),
        SqlValue::Bool(entry.pm),
        SqlValue::Bool(entry.taken),
        SqlValue::Bool(entry.refresh),
        SqlValue::Bool(entry.plus_one),
        SqlValue::Bool(entry.reserve),
        optional(&entry.comment),
    ]
}

/// `date BETWEEN start AND end`, both ends inclusive.
pub fn date_between(start: DateTime<Utc>, end: DateTime<Utc>) -> SqlFilter {
    SqlFilter::new(
        "date >= ? AND date <= ?",
        vec![SqlValue::DateTime(start), SqlValue::DateTime(end)],
    )
}

/// Entries matching `filter` ordered by date, optionally paginated.
pub async fn find(pool: &MySqlPool, filter: &SqlFilter, page: Option<Page>) -> ApiResult<Vec<Entry>> {
    let mut values = filter.values.clone();
    let mut sql = format!("{SELECT_ENTRY}{} ORDER BY date ASC, id ASC", filter.where_clause());
    if let Some(page) = page {
        let (limit, skip) = page.bounds();
        sql.push_str(" LIMIT ? OFFSET ?");
        values.push(SqlValue::U64(limit));
        values.push(SqlValue::U64(skip));
    }

    let entries = sqlx::query_as_with::<_, Entry, _>(&sql, arguments(&values))
        .fetch_all(pool)
        .await?;
    Ok(entries)
}

pub async fn count(pool: &MySqlPool, filter: &SqlFilter) -> ApiResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM entries{}", filter.where_clause());
    let total = sqlx::query_scalar_with::<_, i64, _>(&sql, arguments(&filter.values))
        .fetch_one(pool)
        .await?;
    Ok(total)
}

pub async fn find_by_id(pool: &MySqlPool, id: u64) -> ApiResult<Option<Entry>> {
    let sql = format!("{SELECT_ENTRY} WHERE id = ?");
    let entry = sqlx::query_as::<_, Entry>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(entry)
}

/// Creates the entry of an identity for a day, or overwrites the existing one.
///
/// When the entry carries both identities and the day is already stored
/// once per scheme, the username-only row is folded into the legacy row so
/// the insert cannot collide on both unique keys at once.
pub async fn upsert(pool: &MySqlPool, entry: &NewEntry) -> ApiResult<Entry> {
    let mut tx = pool.begin().await?;

    if let (Some(user_id), Some(username)) = (&entry.user_id, &entry.oidc_user_identifier) {
        let legacy: Option<u64> =
            sqlx::query_scalar("SELECT id FROM entries WHERE date = ? AND user_id = ?")
                .bind(entry.date)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(legacy_id) = legacy {
            let folded = sqlx::query(
                "DELETE FROM entries WHERE date = ? AND oidc_user_identifier = ? \
                 AND user_id IS NULL AND id <> ?",
            )
            .bind(entry.date)
            .bind(username)
            .bind(legacy_id)
            .execute(&mut *tx)
            .await?;
            if folded.rows_affected() > 0 {
                debug!(entry_id = legacy_id, username = %username, "Folded username entry into legacy entry");
            }
        }
    }

    let result = sqlx::query_with(UPSERT_ENTRY, arguments(&entry_values(entry)))
        .execute(&mut *tx)
        .await?;

    let sql = format!("{SELECT_ENTRY} WHERE id = ?");
    let stored = sqlx::query_as::<_, Entry>(&sql)
        .bind(result.last_insert_id())
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(stored)
}

/// Inserts every entry or none of them.
pub async fn insert_many(pool: &MySqlPool, entries: &[NewEntry]) -> ApiResult<Vec<Entry>> {
    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(entries.len());
    for entry in entries {
        let result = sqlx::query_with(INSERT_ENTRY, arguments(&entry_values(entry)))
            .execute(&mut *tx)
            .await?;
        ids.push(result.last_insert_id());
    }
    tx.commit().await?;

    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("{SELECT_ENTRY} WHERE id IN ({placeholders}) ORDER BY id ASC");
    let values: Vec<SqlValue> = ids.into_iter().map(SqlValue::U64).collect();
    let inserted = sqlx::query_as_with::<_, Entry, _>(&sql, arguments(&values))
        .fetch_all(pool)
        .await?;
    Ok(inserted)
}

/// Merges the known fields of `payload` into one entry.
pub async fn update(pool: &MySqlPool, id: u64, payload: &Value) -> ApiResult<UpdateResult> {
    let update = build_update_sql("entries", ENTRY_COLUMNS, payload, id)?;
    let result = sqlx::query_with(&update.sql, arguments(&update.values))
        .execute(pool)
        .await?;
    Ok(UpdateResult {
        matched_count: result.rows_affected(),
    })
}

/// Rewrites only the `type` column of many entries in one transaction.
pub async fn update_types(pool: &MySqlPool, changes: &[(u64, String)]) -> ApiResult<UpdateResult> {
    let mut tx = pool.begin().await?;
    let mut matched_count = 0;
    for (id, entry_type) in changes {
        let result = sqlx::query("UPDATE entries SET type = ? WHERE id = ?")
            .bind(entry_type)
            .bind(*id)
            .execute(&mut *tx)
            .await?;
        matched_count += result.rows_affected();
    }
    tx.commit().await?;
    Ok(UpdateResult { matched_count })
}

pub async fn delete(pool: &MySqlPool, id: u64) -> ApiResult<DeleteResult> {
    let result = sqlx::query("DELETE FROM entries WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(DeleteResult {
        deleted_count: result.rows_affected(),
    })
}

pub async fn delete_many(pool: &MySqlPool, ids: &[u64]) -> ApiResult<DeleteResult> {
    if ids.is_empty() {
        return Ok(DeleteResult { deleted_count: 0 });
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("DELETE FROM entries WHERE id IN ({placeholders})");
    let values: Vec<SqlValue> = ids.iter().copied().map(SqlValue::U64).collect();
    let result = sqlx::query_with(&sql, arguments(&values))
        .execute(pool)
        .await?;
    Ok(DeleteResult {
        deleted_count: result.rows_affected(),
    })
}
