use crate::auth::provider::IdentityProvider;
use crate::error::ApiError;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use tracing::debug;

/// Resolves the caller through the registered `IdentityProvider` and
/// attaches the resulting `AuthUser` to the request.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let provider = req
        .app_data::<Data<dyn IdentityProvider>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Identity provider missing"))?;

    let header_value = match req.headers().get("Authorization") {
        Some(h) => match h.to_str() {
            Ok(value) => value.to_string(),
            Err(_) => {
                return Ok(refuse(req, "Invalid Authorization header encoding"));
            }
        },
        None => return Ok(refuse(req, "Missing Authorization header")),
    };

    let user = match provider.identify(&header_value).await {
        Ok(user) => user,
        Err(e) => {
            debug!(error = %e, path = %req.path(), "Authentication failed");
            return Ok(refuse(req, "Invalid or expired token"));
        }
    };

    debug!(principal = user.label(), path = %req.path(), "Authenticated");
    req.extensions_mut().insert(user);

    next.call(req).await
}

fn refuse(req: ServiceRequest, message: &str) -> ServiceResponse<BoxBody> {
    let resp = ApiError::unauthorized(message).error_response();
    req.into_response(resp.map_into_boxed_body())
}
