use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;
use utoipa::ToSchema;

use crate::utils::db_utils::{Column, ColumnKind};

/// Leave categories written into `type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr)]
pub enum LeaveCategory {
    /// Full day of paid leave
    #[strum(serialize = "有休")]
    PaidLeave,
    #[strum(serialize = "前半休")]
    MorningHalfDay,
    #[strum(serialize = "後半休")]
    AfternoonHalfDay,
}

impl LeaveCategory {
    /// Category implied by the legacy half-day flags.
    pub fn from_half_days(am: bool, pm: bool) -> Self {
        match (am, pm) {
            (true, false) => LeaveCategory::MorningHalfDay,
            (false, true) => LeaveCategory::AfternoonHalfDay,
            _ => LeaveCategory::PaidLeave,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "_id": 1,
    "date": "2024-01-01T00:00:00Z",
    "user_id": "42",
    "oidc_user_identifier": "yamada",
    "type": "有休",
    "am": true,
    "pm": true,
    "taken": false,
    "refresh": false,
    "plus_one": false,
    "reserve": false,
    "comment": null
}))]
pub struct Entry {
    #[serde(rename = "_id")]
    pub id: u64,
    #[schema(value_type = String, format = "date-time")]
    pub date: DateTime<Utc>,
    pub user_id: Option<String>,
    pub oidc_user_identifier: Option<String>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub entry_type: String,
    pub am: bool,
    pub pm: bool,
    pub taken: bool,
    pub refresh: bool,
    pub plus_one: bool,
    /// Whether the day is taken from the reserved leave balance
    pub reserve: bool,
    pub comment: Option<String>,
}

/// Fully defaulted entry ready to be upserted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewEntry {
    pub date: DateTime<Utc>,
    pub user_id: Option<String>,
    pub oidc_user_identifier: Option<String>,
    pub entry_type: String,
    pub am: bool,
    pub pm: bool,
    pub taken: bool,
    pub refresh: bool,
    pub plus_one: bool,
    pub reserve: bool,
    pub comment: Option<String>,
}

pub const ENTRY_COLUMNS: &[Column] = &[
    Column { field: "date", column: "date", kind: ColumnKind::Day },
    Column { field: "user_id", column: "user_id", kind: ColumnKind::OptionalText },
    Column { field: "oidc_user_identifier", column: "oidc_user_identifier", kind: ColumnKind::OptionalText },
    Column { field: "preferred_username", column: "oidc_user_identifier", kind: ColumnKind::OptionalText },
    Column { field: "type", column: "type", kind: ColumnKind::Text },
    Column { field: "am", column: "am", kind: ColumnKind::Bool },
    Column { field: "pm", column: "pm", kind: ColumnKind::Bool },
    Column { field: "taken", column: "taken", kind: ColumnKind::Bool },
    Column { field: "refresh", column: "refresh", kind: ColumnKind::Bool },
    Column { field: "plus_one", column: "plus_one", kind: ColumnKind::Bool },
    Column { field: "reserve", column: "reserve", kind: ColumnKind::Bool },
    Column { field: "comment", column: "comment", kind: ColumnKind::OptionalText },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_day_flags_map_to_categories() {
        assert_eq!(LeaveCategory::from_half_days(true, true), LeaveCategory::PaidLeave);
        assert_eq!(LeaveCategory::from_half_days(true, false), LeaveCategory::MorningHalfDay);
        assert_eq!(LeaveCategory::from_half_days(false, true), LeaveCategory::AfternoonHalfDay);
        assert_eq!(LeaveCategory::from_half_days(false, false), LeaveCategory::PaidLeave);
    }

    #[test]
    fn categories_are_stored_under_their_japanese_names() {
        assert_eq!(LeaveCategory::PaidLeave.as_ref(), "有休");
        assert_eq!(LeaveCategory::MorningHalfDay.as_ref(), "前半休");
        assert_eq!(LeaveCategory::AfternoonHalfDay.as_ref(), "後半休");
    }
}
