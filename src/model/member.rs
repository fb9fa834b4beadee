//! Joins members of a group or workplace with their stored records.
//!
//! A member may have been recorded under its legacy ID, its username, or
//! both, so records are indexed under every identity they carry and each
//! member collects the union over its own identities.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use utoipa::ToSchema;

use crate::model::allocation::Allocation;
use crate::model::entry::Entry;
use crate::model::identity::{IdentityFilter, UserIdentity, json_id};

/// One member with its entries in range and its allocation for the year.
#[derive(Debug, Serialize, ToSchema)]
pub struct MemberLeave {
    #[schema(value_type = Object)]
    pub user: Value,
    pub entries: Vec<Entry>,
    pub allocations: Option<Allocation>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberAllocation {
    #[schema(value_type = Object)]
    pub user: Value,
    pub allocations: Option<Allocation>,
}

/// Identities of a member object: its legacy ID, then the first username
/// found under `username_keys`.
pub fn member_identities(user: &Value, username_keys: &[&str]) -> Vec<UserIdentity> {
    let username = username_keys.iter().find_map(|key| {
        user.get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    });

    json_id(user)
        .map(UserIdentity::LegacyId)
        .into_iter()
        .chain(username.map(|name| UserIdentity::OidcUsername(name.to_string())))
        .collect()
}

/// Filter matching any identity of any member, `None` when no member has one.
pub fn members_filter(members: &[Value], username_keys: &[&str]) -> Option<IdentityFilter> {
    let identities = members
        .iter()
        .flat_map(|user| member_identities(user, username_keys))
        .collect::<Vec<_>>();
    IdentityFilter::new(identities).ok()
}

fn index_entries(entries: &[Entry]) -> HashMap<UserIdentity, Vec<usize>> {
    let mut index: HashMap<UserIdentity, Vec<usize>> = HashMap::new();
    for (position, entry) in entries.iter().enumerate() {
        let keys = UserIdentity::of_record(
            entry.user_id.as_deref(),
            entry.oidc_user_identifier.as_deref(),
        );
        for key in keys {
            index.entry(key).or_default().push(position);
        }
    }
    index
}

fn index_allocations(allocations: &[Allocation]) -> HashMap<UserIdentity, usize> {
    let mut index = HashMap::new();
    for (position, allocation) in allocations.iter().enumerate() {
        let keys = UserIdentity::of_record(
            allocation.user_id.as_deref(),
            allocation.oidc_user_identifier.as_deref(),
        );
        for key in keys {
            index.insert(key, position);
        }
    }
    index
}

fn allocation_of(
    identities: &[UserIdentity],
    index: &HashMap<UserIdentity, usize>,
    allocations: &[Allocation],
) -> Option<Allocation> {
    identities
        .iter()
        .find_map(|identity| index.get(identity))
        .map(|&position| allocations[position].clone())
}

fn warn_unidentified(user: &Value) {
    warn!(user = %user, "Member has neither a user ID nor a username");
}

/// Pairs every member with its entries and allocation, keeping the member
/// order of the membership service.
pub fn join_entries(
    members: Vec<Value>,
    entries: &[Entry],
    allocations: &[Allocation],
    username_keys: &[&str],
) -> Vec<MemberLeave> {
    let entry_index = index_entries(entries);
    let allocation_index = index_allocations(allocations);

    members
        .into_iter()
        .map(|user| {
            let identities = member_identities(&user, username_keys);
            if identities.is_empty() {
                warn_unidentified(&user);
            }

            let mut seen = HashSet::new();
            let mut own: Vec<&Entry> = identities
                .iter()
                .filter_map(|identity| entry_index.get(identity))
                .flatten()
                .map(|&position| &entries[position])
                .filter(|entry| seen.insert(entry.id))
                .collect();
            own.sort_by_key(|entry| (entry.date, entry.id));

            MemberLeave {
                entries: own.into_iter().cloned().collect(),
                allocations: allocation_of(&identities, &allocation_index, allocations),
                user,
            }
        })
        .collect()
}

pub fn join_allocations(
    members: Vec<Value>,
    allocations: &[Allocation],
    username_keys: &[&str],
) -> Vec<MemberAllocation> {
    let index = index_allocations(allocations);
    members
        .into_iter()
        .map(|user| {
            let identities = member_identities(&user, username_keys);
            if identities.is_empty() {
                warn_unidentified(&user);
            }
            MemberAllocation {
                allocations: allocation_of(&identities, &index, allocations),
                user,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::allocation::Balance;
    use crate::utils::dates::parse_day;
    use rstest::{fixture, rstest};
    use serde_json::json;

    const KEYS: &[&str] = &["username", "preferred_username"];

    fn entry(id: u64, day: &str, user_id: Option<&str>, username: Option<&str>) -> Entry {
        Entry {
            id,
            date: parse_day(day).unwrap(),
            user_id: user_id.map(str::to_string),
            oidc_user_identifier: username.map(str::to_string),
            entry_type: "有休".into(),
            am: true,
            pm: true,
            taken: false,
            refresh: false,
            plus_one: false,
            reserve: false,
            comment: None,
        }
    }

    fn allocation(id: u64, user_id: Option<&str>, username: Option<&str>) -> Allocation {
        Allocation {
            id,
            year: 2024,
            user_id: user_id.map(str::to_string),
            oidc_user_identifier: username.map(str::to_string),
            leaves: Balance {
                current_year_grants: 20.0,
                carried_over: 0.0,
            },
            reserve: Balance::default(),
        }
    }

    #[fixture]
    fn members() -> Vec<Value> {
        vec![
            json!({ "_id": "1", "username": "yamada" }),
            json!({ "preferred_username": "suzuki" }),
            json!({ "properties": { "_id": "3" } }),
        ]
    }

    #[rstest]
    fn filter_covers_every_member_identity(members: Vec<Value>) {
        let filter = members_filter(&members, KEYS).unwrap();
        assert_eq!(
            filter.identities(),
            &[
                UserIdentity::LegacyId("1".into()),
                UserIdentity::OidcUsername("yamada".into()),
                UserIdentity::OidcUsername("suzuki".into()),
                UserIdentity::LegacyId("3".into()),
            ]
        );
    }

    #[test]
    fn members_without_identity_give_no_filter() {
        assert!(members_filter(&[json!({ "name": "x" })], KEYS).is_none());
        assert!(members_filter(&[], KEYS).is_none());
    }

    #[rstest]
    fn entries_are_matched_under_either_scheme_once(members: Vec<Value>) {
        let entries = vec![
            entry(10, "2024-02-01", Some("1"), Some("yamada")),
            entry(11, "2024-01-15", None, Some("yamada")),
            entry(12, "2024-03-01", None, Some("suzuki")),
            entry(13, "2024-01-02", Some("3"), None),
            entry(14, "2024-01-03", Some("99"), None),
        ];
        let joined = join_entries(members, &entries, &[], KEYS);

        let ids = |i: usize| joined[i].entries.iter().map(|e| e.id).collect::<Vec<_>>();
        assert_eq!(ids(0), vec![11, 10]);
        assert_eq!(ids(1), vec![12]);
        assert_eq!(ids(2), vec![13]);
    }

    #[rstest]
    fn allocation_is_found_by_any_identity(members: Vec<Value>) {
        let allocations = vec![allocation(1, None, Some("yamada")), allocation(2, Some("3"), None)];
        let joined = join_allocations(members, &allocations, KEYS);

        assert_eq!(joined[0].allocations.as_ref().map(|a| a.id), Some(1));
        assert!(joined[1].allocations.is_none());
        assert_eq!(joined[2].allocations.as_ref().map(|a| a.id), Some(2));
    }

    #[test]
    fn unidentified_member_is_kept_with_nothing() {
        let joined = join_entries(
            vec![json!({ "name": "ghost" })],
            &[entry(1, "2024-01-01", Some("1"), None)],
            &[allocation(1, Some("1"), None)],
            KEYS,
        );
        assert_eq!(joined.len(), 1);
        assert!(joined[0].entries.is_empty());
        assert!(joined[0].allocations.is_none());
    }
}
