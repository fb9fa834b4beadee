use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::api::{ListQuery, parse_id, query_list};
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::model::allocation::Allocation;
use crate::model::entry::{Entry, LeaveCategory, NewEntry};
use crate::model::identity::{
    IdentityFields, ResolutionMode, resolve_entry_fields, resolve_identifier_list,
    resolve_user_query, scalar_id,
};
use crate::repo::{DeleteResult, UpdateResult, allocations, entries};
use crate::utils::dates::{current_year, date_range, parse_day};
use crate::utils::db_utils::SqlFilter;

/// Body of an entry creation. Only `date` and an identity are required.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[schema(example = json!({ "date": "2024-01-01", "type": "有休", "comment": "family trip" }))]
pub struct EntryPayload {
    #[schema(example = "2024-01-01")]
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub am: Option<bool>,
    pub pm: Option<bool>,
    pub taken: Option<bool>,
    pub refresh: Option<bool>,
    pub plus_one: Option<bool>,
    pub reserve: Option<bool>,
    pub comment: Option<String>,
    /// Legacy user ID, string or number
    #[schema(value_type = Option<String>)]
    pub user_id: Option<Value>,
    pub oidc_user_identifier: Option<String>,
    pub preferred_username: Option<String>,
}

impl EntryPayload {
    fn day(&self) -> ApiResult<DateTime<Utc>> {
        match self.date.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => parse_day(raw),
            _ => Err(ApiError::bad_request("Date not provided")),
        }
    }

    /// Identity fields named in the body itself.
    fn identity(&self) -> IdentityFields {
        let username = self
            .preferred_username
            .as_ref()
            .or(self.oidc_user_identifier.as_ref())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        IdentityFields {
            user_id: self.user_id.as_ref().and_then(scalar_id),
            oidc_user_identifier: username,
        }
    }

    fn into_entry(self, date: DateTime<Utc>, identity: IdentityFields) -> NewEntry {
        let am = self.am.unwrap_or(true);
        let pm = self.pm.unwrap_or(true);
        let entry_type = self
            .entry_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| LeaveCategory::from_half_days(am, pm).as_ref().to_string());

        NewEntry {
            date,
            user_id: identity.user_id,
            oidc_user_identifier: identity.oidc_user_identifier,
            entry_type,
            am,
            pm,
            taken: self.taken.unwrap_or(false),
            refresh: self.refresh.unwrap_or(false),
            plus_one: self.plus_one.unwrap_or(false),
            reserve: self.reserve.unwrap_or(false),
            comment: self.comment,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct EntryListResponse {
    #[schema(value_type = String, format = "date-time")]
    pub start_of_date: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub end_of_date: DateTime<Utc>,
    pub limit: i64,
    pub skip: i64,
    pub total: i64,
    pub entries: Vec<Entry>,
}

/// Entries of one user together with that user's allocation for the year.
#[derive(Serialize, ToSchema)]
pub struct UserEntriesResponse {
    pub entries: Vec<Entry>,
    pub allocations: Option<Allocation>,
}

/// Type change of one entry in a bulk update.
#[derive(Deserialize, ToSchema)]
pub struct TypeChange {
    #[serde(rename = "_id")]
    #[schema(value_type = String)]
    pub id: Option<Value>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
}

/// Entries of one user in the requested window, plus the year it falls in.
async fn entries_of_user(
    pool: &MySqlPool,
    identity: &SqlFilter,
    query: &ListQuery,
) -> ApiResult<(Vec<Entry>, i32)> {
    let year = query.year.unwrap_or_else(current_year);
    let (start, end) = date_range(year, query.start_date.as_deref(), query.end_date.as_deref())?;
    let found = entries::find(
        pool,
        &identity.clone().and(entries::date_between(start, end)),
        None,
    )
    .await?;
    Ok((found, year))
}

/* =========================
Entries of one user
========================= */
#[utoipa::path(
    get,
    path = "/v1/users/{identifier}/entries",
    params(
        ("identifier" = String, Path, description = "`self`, a legacy user ID or a username"),
        ListQuery
    ),
    responses(
        (status = 200, description = "Entries in range sorted by date", body = [Entry]),
        (status = 400, description = "Identifier missing or bad date"),
        (status = 401, description = "`self` without an authenticated caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn list_user_entries(
    pool: web::Data<MySqlPool>,
    mode: web::Data<ResolutionMode>,
    user: Option<AuthUser>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let identity = resolve_user_query(&path, user.as_ref(), **mode)?.to_sql();
    let (found, _) = entries_of_user(&pool, &identity, &query).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[utoipa::path(
    get,
    path = "/v3/users/{identifier}/entries",
    params(
        ("identifier" = String, Path, description = "`self`, a legacy user ID or a username"),
        ListQuery
    ),
    responses(
        (status = 200, description = "Entries in range and the allocation of the year", body = UserEntriesResponse),
        (status = 400, description = "Identifier missing or bad date"),
        (status = 401, description = "`self` without an authenticated caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn user_entries_with_allocations(
    pool: web::Data<MySqlPool>,
    mode: web::Data<ResolutionMode>,
    user: Option<AuthUser>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let identity = resolve_user_query(&path, user.as_ref(), **mode)?.to_sql();
    let (found, year) = entries_of_user(&pool, &identity, &query).await?;
    let allocation = allocations::find_one(&pool, &identity.and(allocations::year_is(year))).await?;
    Ok(HttpResponse::Ok().json(UserEntriesResponse {
        entries: found,
        allocations: allocation,
    }))
}

#[utoipa::path(
    post,
    path = "/v3/users/{identifier}/entries",
    params(("identifier" = String, Path, description = "`self`, a legacy user ID or a username")),
    request_body(content = EntryPayload, content_type = "application/json"),
    responses(
        (status = 200, description = "Stored entry", body = Entry),
        (status = 400, description = "Date or identity missing"),
        (status = 401, description = "`self` without an authenticated caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn create_user_entry(
    pool: web::Data<MySqlPool>,
    mode: web::Data<ResolutionMode>,
    user: Option<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<EntryPayload>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    let date = payload.day()?;
    let identity = resolve_entry_fields(Some(path.as_str()), payload.identity(), user.as_ref(), **mode)?;

    let entry = entries::upsert(&pool, &payload.into_entry(date, identity)).await?;
    info!(entry_id = entry.id, "Entry saved");
    Ok(HttpResponse::Ok().json(entry))
}

/* =========================
Entries collection
========================= */
#[utoipa::path(
    get,
    path = "/v3/entries",
    params(
        ListQuery,
        ("identifiers" = Option<Vec<String>>, Query, description = "Restrict to these users, repeatable")
    ),
    responses((status = 200, description = "Paginated entries", body = EntryListResponse)),
    security(("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn list_entries(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    mode: web::Data<ResolutionMode>,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let year = query.year.unwrap_or_else(current_year);
    let (start, end) = date_range(year, query.start_date.as_deref(), query.end_date.as_deref())?;
    let (limit, skip) = query.window(&config);

    let mut filter = entries::date_between(start, end);
    let identifiers = query_list(&req, &["identifiers", "user_ids"]);
    if let Some(identities) = resolve_identifier_list(&identifiers, **mode) {
        filter = filter.and(identities.to_sql());
    }

    let found = entries::find(&pool, &filter, Some(query.page(&config))).await?;
    let total = entries::count(&pool, &filter).await?;

    Ok(HttpResponse::Ok().json(EntryListResponse {
        start_of_date: start,
        end_of_date: end,
        limit,
        skip,
        total,
        entries: found,
    }))
}

#[utoipa::path(
    post,
    path = "/v3/entries",
    request_body(content = [EntryPayload], content_type = "application/json"),
    responses(
        (status = 200, description = "Inserted entries", body = [Entry]),
        (status = 400, description = "An item misses its date or identity"),
        (status = 409, description = "An entry already exists for an identity and day")
    ),
    security(("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn create_entries(
    pool: web::Data<MySqlPool>,
    payload: web::Json<Vec<EntryPayload>>,
) -> ApiResult<HttpResponse> {
    let mut batch = Vec::with_capacity(payload.len());
    for item in payload.into_inner() {
        let date = item.day()?;
        let identity = item.identity();
        if identity.is_empty() {
            return Err(ApiError::bad_request("User ID or preferred_username not provided"));
        }
        batch.push(item.into_entry(date, identity));
    }

    let inserted = entries::insert_many(&pool, &batch).await.map_err(|e| {
        warn!(error = %e, count = batch.len(), "Bulk entry creation rolled back");
        e
    })?;
    Ok(HttpResponse::Ok().json(inserted))
}

#[utoipa::path(
    put,
    path = "/v3/entries",
    request_body(content = [TypeChange], content_type = "application/json"),
    responses(
        (status = 200, description = "Number of matched entries", body = UpdateResult),
        (status = 400, description = "An item misses `_id` or `type`")
    ),
    security(("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn update_entries(
    pool: web::Data<MySqlPool>,
    payload: web::Json<Vec<TypeChange>>,
) -> ApiResult<HttpResponse> {
    let mut changes = Vec::with_capacity(payload.len());
    for change in payload.into_inner() {
        let id = change
            .id
            .as_ref()
            .and_then(scalar_id)
            .ok_or_else(|| ApiError::bad_request("_id not provided"))?;
        let entry_type = change
            .entry_type
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("type not provided"))?;
        changes.push((parse_id(&id)?, entry_type));
    }

    let result: UpdateResult = entries::update_types(&pool, &changes).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[utoipa::path(
    delete,
    path = "/v3/entries",
    params(("ids" = Vec<String>, Query, description = "IDs to delete, repeatable")),
    responses(
        (status = 200, description = "Number of deleted entries", body = DeleteResult),
        (status = 400, description = "No ID given")
    ),
    security(("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn delete_entries(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    let raw = query_list(&req, &["ids"]);
    if raw.is_empty() {
        return Err(ApiError::bad_request("_id not provided"));
    }
    let ids = raw
        .iter()
        .map(|id| parse_id(id))
        .collect::<ApiResult<Vec<_>>>()?;

    let result = entries::delete_many(&pool, &ids).await?;
    Ok(HttpResponse::Ok().json(result))
}

/* =========================
Single entry
========================= */
#[utoipa::path(
    get,
    path = "/v3/entries/{_id}",
    params(("_id" = u64, Path, description = "Entry ID")),
    responses(
        (status = 200, description = "Entry", body = Entry),
        (status = 404, description = "No such entry")
    ),
    security(("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn get_entry(
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = parse_id(&path)?;
    let entry = entries::find_by_id(&pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Entry {id} not found")))?;
    Ok(HttpResponse::Ok().json(entry))
}

#[utoipa::path(
    put,
    path = "/v3/entries/{_id}",
    params(("_id" = u64, Path, description = "Entry ID")),
    request_body(content = EntryPayload, description = "Fields to overwrite", content_type = "application/json"),
    responses(
        (status = 200, description = "Number of matched entries", body = UpdateResult),
        (status = 400, description = "No known field in the body")
    ),
    security(("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn update_entry(
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    let id = parse_id(&path)?;
    let result = entries::update(&pool, id, &payload).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[utoipa::path(
    delete,
    path = "/v3/entries/{_id}",
    params(("_id" = u64, Path, description = "Entry ID")),
    responses((status = 200, description = "Number of deleted entries", body = DeleteResult)),
    security(("bearer_auth" = [])),
    tag = "Entries"
)]
pub async fn delete_entry(
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = parse_id(&path)?;
    let result: DeleteResult = entries::delete(&pool, id).await?;
    Ok(HttpResponse::Ok().json(result))
}
