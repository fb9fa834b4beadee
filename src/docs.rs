use crate::api::allocations::{AllocationListResponse, AllocationPayload};
use crate::api::entries::{EntryListResponse, EntryPayload, TypeChange, UserEntriesResponse};
use crate::api::groups::{MemberAllocationsResponse, MemberEntriesResponse};
use crate::api::info::{AuthInfo, DatabaseInfo, ServiceInfo};
use crate::model::allocation::{Allocation, Balance};
use crate::model::entry::Entry;
use crate::model::member::{MemberAllocation, MemberLeave};
use crate::repo::{DeleteResult, UpdateResult};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Nenkyuu Calendar API",
        version = "3.0.0",
        description = r#"
## Paid leave calendar

Stores the paid leave **entries** (one per user and day) and the yearly
leave **allocations** of every user.

### Versions
- `/` and `/v1`: a numeric identifier is a legacy user ID, anything else a username
- `/v2`: user entries together with the allocation of the year
- `/v3`: every identifier is matched against both the legacy ID and the username

Paths below are shown under `/v3`; `/` and `/v1` expose the same routes.

### Security
Every route except `GET /` needs a bearer token, either an OIDC access
token or a token understood by the user manager.
"#,
    ),
    paths(
        crate::api::info::index,

        crate::api::entries::list_user_entries,
        crate::api::entries::user_entries_with_allocations,
        crate::api::entries::create_user_entry,
        crate::api::entries::list_entries,
        crate::api::entries::create_entries,
        crate::api::entries::update_entries,
        crate::api::entries::delete_entries,
        crate::api::entries::get_entry,
        crate::api::entries::update_entry,
        crate::api::entries::delete_entry,

        crate::api::allocations::list_user_allocations,
        crate::api::allocations::create_user_allocation,
        crate::api::allocations::list_allocations,
        crate::api::allocations::create_allocation,
        crate::api::allocations::get_allocation,
        crate::api::allocations::update_allocation,
        crate::api::allocations::delete_allocation,

        crate::api::groups::group_entries,
        crate::api::groups::group_allocations,
        crate::api::groups::workplace_entries
    ),
    components(
        schemas(
            Entry,
            EntryPayload,
            EntryListResponse,
            UserEntriesResponse,
            TypeChange,
            Allocation,
            Balance,
            AllocationPayload,
            AllocationListResponse,
            MemberLeave,
            MemberAllocation,
            MemberEntriesResponse,
            MemberAllocationsResponse,
            UpdateResult,
            DeleteResult,
            ServiceInfo,
            AuthInfo,
            DatabaseInfo
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Info", description = "Service information"),
        (name = "Entries", description = "Leave entries"),
        (name = "Allocations", description = "Yearly leave allocations"),
        (name = "Groups", description = "Entries and allocations of group and workplace members"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_versioned_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v3/entries/{_id}"));
        assert!(doc.paths.paths.contains_key("/v3/groups/{group_id}/entries"));
        let schemes = &doc.components.unwrap().security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
    }
}
