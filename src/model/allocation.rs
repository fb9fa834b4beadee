use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::utils::db_utils::{Column, ColumnKind};

/// Days granted this year and days carried over from the previous one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Balance {
    #[serde(default)]
    pub current_year_grants: f64,
    #[serde(default)]
    pub carried_over: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[schema(example = json!({
    "_id": 3,
    "year": 2024,
    "user_id": "42",
    "oidc_user_identifier": "yamada",
    "leaves": { "current_year_grants": 20, "carried_over": 4.5 },
    "reserve": { "current_year_grants": 0, "carried_over": 10 }
}))]
pub struct Allocation {
    #[serde(rename = "_id")]
    pub id: u64,
    pub year: i32,
    pub user_id: Option<String>,
    pub oidc_user_identifier: Option<String>,
    pub leaves: Balance,
    pub reserve: Balance,
}

/// Flat row as stored in `allocations`.
#[derive(Debug, sqlx::FromRow)]
pub struct AllocationRow {
    pub id: u64,
    pub year: i32,
    pub user_id: Option<String>,
    pub oidc_user_identifier: Option<String>,
    pub leaves_current_year_grants: f64,
    pub leaves_carried_over: f64,
    pub reserve_current_year_grants: f64,
    pub reserve_carried_over: f64,
}

impl From<AllocationRow> for Allocation {
    fn from(row: AllocationRow) -> Self {
        Self {
            id: row.id,
            year: row.year,
            user_id: row.user_id,
            oidc_user_identifier: row.oidc_user_identifier,
            leaves: Balance {
                current_year_grants: row.leaves_current_year_grants,
                carried_over: row.leaves_carried_over,
            },
            reserve: Balance {
                current_year_grants: row.reserve_current_year_grants,
                carried_over: row.reserve_carried_over,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewAllocation {
    pub year: i32,
    pub user_id: Option<String>,
    pub oidc_user_identifier: Option<String>,
    pub leaves: Balance,
    pub reserve: Balance,
}

pub const ALLOCATION_COLUMNS: &[Column] = &[
    Column { field: "year", column: "year", kind: ColumnKind::Integer },
    Column { field: "user_id", column: "user_id", kind: ColumnKind::OptionalText },
    Column { field: "oidc_user_identifier", column: "oidc_user_identifier", kind: ColumnKind::OptionalText },
    Column { field: "preferred_username", column: "oidc_user_identifier", kind: ColumnKind::OptionalText },
    Column {
        field: "leaves.current_year_grants",
        column: "leaves_current_year_grants",
        kind: ColumnKind::Number,
    },
    Column { field: "leaves.carried_over", column: "leaves_carried_over", kind: ColumnKind::Number },
    Column {
        field: "reserve.current_year_grants",
        column: "reserve_current_year_grants",
        kind: ColumnKind::Number,
    },
    Column { field: "reserve.carried_over", column: "reserve_carried_over", kind: ColumnKind::Number },
];
