use serde_json::Value;
use sqlx::MySqlPool;

use super::{DeleteResult, Page, UpdateResult};
use crate::error::ApiResult;
use crate::model::allocation::{ALLOCATION_COLUMNS, Allocation, AllocationRow, NewAllocation};
use crate::utils::db_utils::{SqlFilter, SqlValue, arguments, build_update_sql};

const SELECT_ALLOCATION: &str = r#"
    SELECT id, year, user_id, oidc_user_identifier,
           leaves_current_year_grants, leaves_carried_over,
           reserve_current_year_grants, reserve_carried_over
    FROM allocations
"#;

const UPSERT_ALLOCATION: &str = r#"
    INSERT INTO allocations
        (year, user_id, oidc_user_identifier,
         leaves_current_year_grants, leaves_carried_over,
         reserve_current_year_grants, reserve_carried_over)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON DUPLICATE KEY UPDATE
        id = LAST_INSERT_ID(id),
        user_id = COALESCE(VALUES(user_id), user_id),
        oidc_user_identifier = COALESCE(VALUES(oidc_user_identifier), oidc_user_identifier),
        leaves_current_year_grants = VALUES(leaves_current_year_grants),
        leaves_carried_over = VALUES(leaves_carried_over),
        reserve_current_year_grants = VALUES(reserve_current_year_grants),
        reserve_carried_over = VALUES(reserve_carried_over)
"#;

pub fn year_is(year: i32) -> SqlFilter {
    SqlFilter::new("year = ?", vec![SqlValue::I64(year.into())])
}

/// Allocations matching `filter` ordered by year.
pub async fn find(
    pool: &MySqlPool,
    filter: &SqlFilter,
    page: Option<Page>,
) -> ApiResult<Vec<Allocation>> {
    let mut values = filter.values.clone();
    let mut sql = format!(
        "{SELECT_ALLOCATION}{} ORDER BY year ASC, id ASC",
        filter.where_clause()
    );
    if let Some(page) = page {
        let (limit, skip) = page.bounds();
        sql.push_str(" LIMIT ? OFFSET ?");
        values.push(SqlValue::U64(limit));
        values.push(SqlValue::U64(skip));
    }

    let rows = sqlx::query_as_with::<_, AllocationRow, _>(&sql, arguments(&values))
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Allocation::from).collect())
}

/// First allocation matching `filter`, used for the per-year lookup of one user.
pub async fn find_one(pool: &MySqlPool, filter: &SqlFilter) -> ApiResult<Option<Allocation>> {
    let sql = format!(
        "{SELECT_ALLOCATION}{} ORDER BY id ASC LIMIT 1",
        filter.where_clause()
    );
    let row = sqlx::query_as_with::<_, AllocationRow, _>(&sql, arguments(&filter.values))
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Allocation::from))
}

pub async fn count(pool: &MySqlPool, filter: &SqlFilter) -> ApiResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM allocations{}", filter.where_clause());
    let total = sqlx::query_scalar_with::<_, i64, _>(&sql, arguments(&filter.values))
        .fetch_one(pool)
        .await?;
    Ok(total)
}

pub async fn find_by_id(pool: &MySqlPool, id: u64) -> ApiResult<Option<Allocation>> {
    let sql = format!("{SELECT_ALLOCATION} WHERE id = ?");
    let row = sqlx::query_as::<_, AllocationRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Allocation::from))
}

/// Creates the allocation of an identity for a year, or overwrites it.
pub async fn upsert(pool: &MySqlPool, allocation: &NewAllocation) -> ApiResult<Allocation> {
    let optional = |v: &Option<String>| v.clone().map(SqlValue::String).unwrap_or(SqlValue::Null);
    let values = vec![
        SqlValue::I64(allocation.year.into()),
        optional(&allocation.user_id),
        optional(&allocation.oidc_user_identifier),
        SqlValue::F64(allocation.leaves.current_year_grants),
        SqlValue::F64(allocation.leaves.carried_over),
        SqlValue::F64(allocation.reserve.current_year_grants),
        SqlValue::F64(allocation.reserve.carried_over),
    ];
    let result = sqlx::query_with(UPSERT_ALLOCATION, arguments(&values))
        .execute(pool)
        .await?;

    let sql = format!("{SELECT_ALLOCATION} WHERE id = ?");
    let row = sqlx::query_as::<_, AllocationRow>(&sql)
        .bind(result.last_insert_id())
        .fetch_one(pool)
        .await?;
    Ok(row.into())
}

pub async fn update(pool: &MySqlPool, id: u64, payload: &Value) -> ApiResult<UpdateResult> {
    let update = build_update_sql("allocations", ALLOCATION_COLUMNS, payload, id)?;
    let result = sqlx::query_with(&update.sql, arguments(&update.values))
        .execute(pool)
        .await?;
    Ok(UpdateResult {
        matched_count: result.rows_affected(),
    })
}

pub async fn delete(pool: &MySqlPool, id: u64) -> ApiResult<DeleteResult> {
    let result = sqlx::query("DELETE FROM allocations WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(DeleteResult {
        deleted_count: result.rows_affected(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::allocation::Balance;

    fn allocation(user_id: Option<&str>, username: Option<&str>, year: i32) -> NewAllocation {
        NewAllocation {
            year,
            user_id: user_id.map(str::to_string),
            oidc_user_identifier: username.map(str::to_string),
            leaves: Balance {
                current_year_grants: 20.0,
                carried_over: 3.5,
            },
            reserve: Balance::default(),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a MySQL server in DATABASE_URL"]
    async fn one_allocation_per_identity_and_year(pool: MySqlPool) {
        let first = upsert(&pool, &allocation(None, Some("sato"), 2024)).await.unwrap();
        let mut again = allocation(None, Some("sato"), 2024);
        again.leaves.carried_over = 0.0;
        let second = upsert(&pool, &again).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.leaves.carried_over, 0.0);
        assert_eq!(count(&pool, &year_is(2024)).await.unwrap(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a MySQL server in DATABASE_URL"]
    async fn partial_update_touches_only_named_balances(pool: MySqlPool) {
        let stored = upsert(&pool, &allocation(Some("3"), None, 2023)).await.unwrap();
        let result = update(
            &pool,
            stored.id,
            &serde_json::json!({ "reserve": { "carried_over": 8 } }),
        )
        .await
        .unwrap();
        assert_eq!(result.matched_count, 1);

        let reloaded = find_by_id(&pool, stored.id).await.unwrap().unwrap();
        assert_eq!(reloaded.reserve.carried_over, 8.0);
        assert_eq!(reloaded.leaves.current_year_grants, 20.0);
    }
}
