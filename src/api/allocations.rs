use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

use crate::api::{ListQuery, parse_id, query_list};
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::model::allocation::{Allocation, Balance, NewAllocation};
use crate::model::identity::{
    IdentityFields, ResolutionMode, resolve_entry_fields, resolve_identifier_list,
    resolve_user_query, scalar_id,
};
use crate::repo::{DeleteResult, UpdateResult, allocations};
use crate::utils::db_utils::SqlFilter;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[schema(example = json!({
    "year": 2024,
    "leaves": { "current_year_grants": 20, "carried_over": 3 },
    "reserve": { "current_year_grants": 0, "carried_over": 12 }
}))]
pub struct AllocationPayload {
    /// Number or numeric string
    #[schema(value_type = Option<i32>)]
    pub year: Option<Value>,
    pub leaves: Option<Balance>,
    pub reserve: Option<Balance>,
    #[schema(value_type = Option<String>)]
    pub user_id: Option<Value>,
    pub oidc_user_identifier: Option<String>,
    pub preferred_username: Option<String>,
}

impl AllocationPayload {
    fn year(&self) -> ApiResult<i32> {
        let raw = match &self.year {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(ApiError::bad_request("Year not provided")),
        };
        raw.parse()
            .map_err(|_| ApiError::bad_request(format!("Invalid year: {raw}")))
    }

    fn identity(&self) -> IdentityFields {
        IdentityFields {
            user_id: self.user_id.as_ref().and_then(scalar_id),
            oidc_user_identifier: self
                .preferred_username
                .as_ref()
                .or(self.oidc_user_identifier.as_ref())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }

    fn into_allocation(self, year: i32, identity: IdentityFields) -> NewAllocation {
        NewAllocation {
            year,
            user_id: identity.user_id,
            oidc_user_identifier: identity.oidc_user_identifier,
            leaves: self.leaves.unwrap_or_default(),
            reserve: self.reserve.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AllocationListResponse {
    pub year: Option<i32>,
    pub limit: i64,
    pub skip: i64,
    pub total: i64,
    pub allocations: Vec<Allocation>,
}

async fn save(
    pool: &MySqlPool,
    identifier: Option<&str>,
    payload: AllocationPayload,
    user: Option<&AuthUser>,
    mode: ResolutionMode,
) -> ApiResult<Allocation> {
    let year = payload.year()?;
    let identity = resolve_entry_fields(identifier, payload.identity(), user, mode)?;
    let allocation = allocations::upsert(pool, &payload.into_allocation(year, identity)).await?;
    info!(allocation_id = allocation.id, year, "Allocation saved");
    Ok(allocation)
}

/* =========================
Allocations of one user
========================= */
#[utoipa::path(
    get,
    path = "/v3/users/{identifier}/allocations",
    params(
        ("identifier" = String, Path, description = "`self`, a legacy user ID or a username"),
        ("year" = Option<i32>, Query, description = "Only this year")
    ),
    responses(
        (status = 200, description = "Allocations sorted by year", body = [Allocation]),
        (status = 401, description = "`self` without an authenticated caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Allocations"
)]
pub async fn list_user_allocations(
    pool: web::Data<MySqlPool>,
    mode: web::Data<ResolutionMode>,
    user: Option<AuthUser>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let mut filter = resolve_user_query(&path, user.as_ref(), **mode)?.to_sql();
    if let Some(year) = query.year {
        filter = filter.and(allocations::year_is(year));
    }
    let found = allocations::find(&pool, &filter, None).await?;
    Ok(HttpResponse::Ok().json(found))
}

#[utoipa::path(
    post,
    path = "/v3/users/{identifier}/allocations",
    params(("identifier" = String, Path, description = "`self`, a legacy user ID or a username")),
    request_body(content = AllocationPayload, content_type = "application/json"),
    responses(
        (status = 200, description = "Stored allocation", body = Allocation),
        (status = 400, description = "Year or identity missing")
    ),
    security(("bearer_auth" = [])),
    tag = "Allocations"
)]
pub async fn create_user_allocation(
    pool: web::Data<MySqlPool>,
    mode: web::Data<ResolutionMode>,
    user: Option<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<AllocationPayload>,
) -> ApiResult<HttpResponse> {
    let allocation = save(
        &pool,
        Some(path.as_str()),
        payload.into_inner(),
        user.as_ref(),
        **mode,
    )
    .await?;
    Ok(HttpResponse::Ok().json(allocation))
}

/* =========================
Allocations collection
========================= */
#[utoipa::path(
    get,
    path = "/v3/allocations",
    params(
        ListQuery,
        ("identifiers" = Option<Vec<String>>, Query, description = "Restrict to these users, repeatable")
    ),
    responses((status = 200, description = "Paginated allocations", body = AllocationListResponse)),
    security(("bearer_auth" = [])),
    tag = "Allocations"
)]
pub async fn list_allocations(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    mode: web::Data<ResolutionMode>,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let (limit, skip) = query.window(&config);

    let mut filter = SqlFilter::default();
    if let Some(year) = query.year {
        filter = filter.and(allocations::year_is(year));
    }
    let identifiers = query_list(&req, &["identifiers", "user_ids"]);
    if let Some(identities) = resolve_identifier_list(&identifiers, **mode) {
        filter = filter.and(identities.to_sql());
    }

    let found = allocations::find(&pool, &filter, Some(query.page(&config))).await?;
    let total = allocations::count(&pool, &filter).await?;

    Ok(HttpResponse::Ok().json(AllocationListResponse {
        year: query.year,
        limit,
        skip,
        total,
        allocations: found,
    }))
}

#[utoipa::path(
    post,
    path = "/v3/allocations",
    request_body(content = AllocationPayload, content_type = "application/json"),
    responses(
        (status = 200, description = "Stored allocation", body = Allocation),
        (status = 400, description = "Year or identity missing")
    ),
    security(("bearer_auth" = [])),
    tag = "Allocations"
)]
pub async fn create_allocation(
    pool: web::Data<MySqlPool>,
    mode: web::Data<ResolutionMode>,
    payload: web::Json<AllocationPayload>,
) -> ApiResult<HttpResponse> {
    let allocation = save(&pool, None, payload.into_inner(), None, **mode).await?;
    Ok(HttpResponse::Ok().json(allocation))
}

/* =========================
Single allocation
========================= */
#[utoipa::path(
    get,
    path = "/v3/allocations/{_id}",
    params(("_id" = u64, Path, description = "Allocation ID")),
    responses(
        (status = 200, description = "Allocation", body = Allocation),
        (status = 404, description = "No such allocation")
    ),
    security(("bearer_auth" = [])),
    tag = "Allocations"
)]
pub async fn get_allocation(
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = parse_id(&path)?;
    let allocation = allocations::find_by_id(&pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Allocation {id} not found")))?;
    Ok(HttpResponse::Ok().json(allocation))
}

#[utoipa::path(
    put,
    path = "/v3/allocations/{_id}",
    params(("_id" = u64, Path, description = "Allocation ID")),
    request_body(content = AllocationPayload, description = "Fields to overwrite, balances may be partial", content_type = "application/json"),
    responses(
        (status = 200, description = "Number of matched allocations", body = UpdateResult),
        (status = 400, description = "No known field in the body")
    ),
    security(("bearer_auth" = [])),
    tag = "Allocations"
)]
pub async fn update_allocation(
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    let id = parse_id(&path)?;
    let result: UpdateResult = allocations::update(&pool, id, &payload).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[utoipa::path(
    delete,
    path = "/v3/allocations/{_id}",
    params(("_id" = u64, Path, description = "Allocation ID")),
    responses((status = 200, description = "Number of deleted allocations", body = DeleteResult)),
    security(("bearer_auth" = [])),
    tag = "Allocations"
)]
pub async fn delete_allocation(
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = parse_id(&path)?;
    let result: DeleteResult = allocations::delete(&pool, id).await?;
    Ok(HttpResponse::Ok().json(result))
}
