use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::debug;
use utoipa::ToSchema;

use crate::api::{ListQuery, authorization};
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::model::member::{
    MemberAllocation, MemberLeave, join_allocations, join_entries, members_filter,
};
use crate::repo::{allocations, entries};
use crate::services::TOTAL_HEADER;
use crate::services::membership::{MemberSource, MembershipDirectory};
use crate::utils::dates::{current_year, date_range};

#[derive(Serialize, ToSchema)]
pub struct MemberEntriesResponse {
    #[schema(value_type = String, format = "date-time")]
    pub start_of_date: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub end_of_date: DateTime<Utc>,
    pub limit: i64,
    pub skip: i64,
    /// Member count reported by the membership service
    pub total: u64,
    pub items: Vec<MemberLeave>,
}

#[derive(Serialize, ToSchema)]
pub struct MemberAllocationsResponse {
    pub year: i32,
    pub limit: i64,
    pub skip: i64,
    pub total: u64,
    pub items: Vec<MemberAllocation>,
}

fn username_keys(config: &Config) -> [&str; 2] {
    [
        config.legacy_auth_identifier.as_str(),
        config.oidc_auth_identifier.as_str(),
    ]
}

async fn member_entries(
    req: &HttpRequest,
    pool: &MySqlPool,
    config: &Config,
    directory: &dyn MembershipDirectory,
    source: MemberSource,
    id: &str,
    query: &ListQuery,
) -> ApiResult<MemberEntriesResponse> {
    let year = query.year.unwrap_or_else(current_year);
    let (start, end) = date_range(year, query.start_date.as_deref(), query.end_date.as_deref())?;
    let (limit, skip) = query.window(config);

    let page = directory
        .members(source, id, query.page(config), authorization(req))
        .await?;
    let keys = username_keys(config);
    let identities = members_filter(&page.members, &keys)
        .ok_or_else(|| ApiError::not_found(format!("{source} {id} appears to be empty")))?
        .to_sql();
    debug!(%source, id, members = page.members.len(), "Resolved members");

    let found = entries::find(
        pool,
        &identities.clone().and(entries::date_between(start, end)),
        None,
    )
    .await?;
    let granted = allocations::find(pool, &identities.and(allocations::year_is(year)), None).await?;

    Ok(MemberEntriesResponse {
        start_of_date: start,
        end_of_date: end,
        limit,
        skip,
        total: page.total,
        items: join_entries(page.members, &found, &granted, &keys),
    })
}

#[utoipa::path(
    get,
    path = "/v3/groups/{group_id}/entries",
    params(("group_id" = String, Path, description = "Group ID"), ListQuery),
    responses(
        (status = 200, description = "Entries and allocation of every member", body = MemberEntriesResponse),
        (status = 404, description = "Group unknown or without members")
    ),
    security(("bearer_auth" = [])),
    tag = "Groups"
)]
pub async fn group_entries(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    directory: web::Data<dyn MembershipDirectory>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let response = member_entries(
        &req,
        &pool,
        &config,
        directory.get_ref(),
        MemberSource::Group,
        &path,
        &query,
    )
    .await?;
    Ok(HttpResponse::Ok()
        .insert_header((TOTAL_HEADER, response.total.to_string()))
        .json(response))
}

#[utoipa::path(
    get,
    path = "/v3/workplaces/{workplace_id}/entries",
    params(("workplace_id" = String, Path, description = "Workplace ID"), ListQuery),
    responses(
        (status = 200, description = "Entries and allocation of every employee", body = MemberEntriesResponse),
        (status = 404, description = "Workplace unknown or without employees")
    ),
    security(("bearer_auth" = [])),
    tag = "Groups"
)]
pub async fn workplace_entries(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    directory: web::Data<dyn MembershipDirectory>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let response = member_entries(
        &req,
        &pool,
        &config,
        directory.get_ref(),
        MemberSource::Workplace,
        &path,
        &query,
    )
    .await?;
    Ok(HttpResponse::Ok()
        .insert_header((TOTAL_HEADER, response.total.to_string()))
        .json(response))
}

#[utoipa::path(
    get,
    path = "/v3/groups/{group_id}/allocations",
    params(("group_id" = String, Path, description = "Group ID"), ListQuery),
    responses(
        (status = 200, description = "Allocation of every member for the year", body = MemberAllocationsResponse),
        (status = 404, description = "Group unknown or without members")
    ),
    security(("bearer_auth" = [])),
    tag = "Groups"
)]
pub async fn group_allocations(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    directory: web::Data<dyn MembershipDirectory>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let group_id = path.into_inner();
    let year = query.year.unwrap_or_else(current_year);
    let (limit, skip) = query.window(&config);

    let page = directory
        .members(MemberSource::Group, &group_id, query.page(&config), authorization(&req))
        .await?;
    let keys = username_keys(&config);
    let identities = members_filter(&page.members, &keys)
        .ok_or_else(|| ApiError::not_found(format!("Group {group_id} appears to be empty")))?;

    let granted = allocations::find(
        &pool,
        &identities.to_sql().and(allocations::year_is(year)),
        None,
    )
    .await?;

    Ok(HttpResponse::Ok()
        .insert_header((TOTAL_HEADER, page.total.to_string()))
        .json(MemberAllocationsResponse {
        year,
        limit,
        skip,
        total: page.total,
        items: join_allocations(page.members, &granted, &keys),
    }))
}
