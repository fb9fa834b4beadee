use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;
use strum_macros::Display;
use tracing::{instrument, warn};

use super::TOTAL_HEADER;
use crate::error::{ApiError, ApiResult};
use crate::repo::Page;

/// Kind of membership list a leave report is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum MemberSource {
    Group,
    Workplace,
}

/// One page of members as returned by a membership service.
#[derive(Debug, Default)]
pub struct MemberPage {
    pub members: Vec<Value>,
    /// Total member count reported by the service, across all pages
    pub total: u64,
}

/// Membership services resolving a group or workplace into its users.
pub trait MembershipDirectory: Send + Sync {
    fn members<'a>(
        &'a self,
        source: MemberSource,
        id: &'a str,
        page: Page,
        authorization: Option<&'a str>,
    ) -> BoxFuture<'a, ApiResult<MemberPage>>;
}

#[derive(Deserialize)]
struct GroupMembers {
    #[serde(default)]
    items: Vec<Value>,
    count: Option<u64>,
}

/// HTTP client for the Group Manager and Workplace Manager services.
pub struct MembershipClient {
    client: reqwest::Client,
    group_manager_api_url: Option<String>,
    workplace_manager_api_url: Option<String>,
}

impl MembershipClient {
    pub fn new(
        client: reqwest::Client,
        group_manager_api_url: Option<String>,
        workplace_manager_api_url: Option<String>,
    ) -> Self {
        Self {
            client,
            group_manager_api_url,
            workplace_manager_api_url,
        }
    }

    fn url(&self, source: MemberSource, id: &str) -> ApiResult<String> {
        let (base, env) = match source {
            MemberSource::Group => (&self.group_manager_api_url, "GROUP_MANAGER_API_URL"),
            MemberSource::Workplace => {
                (&self.workplace_manager_api_url, "WORKPLACE_MANAGER_API_URL")
            }
        };
        let base = base
            .as_deref()
            .ok_or_else(|| ApiError::internal(format!("{env} not provided")))?;
        Ok(match source {
            MemberSource::Group => format!("{base}/v3/groups/{id}/members"),
            MemberSource::Workplace => format!("{base}/v2/workplaces/{id}/employees"),
        })
    }

    #[instrument(name = "membership_fetch", skip(self, authorization))]
    async fn fetch(
        &self,
        source: MemberSource,
        id: &str,
        page: Page,
        authorization: Option<&str>,
    ) -> ApiResult<MemberPage> {
        let failure = format!("Failed to query {} members", source.to_string().to_lowercase());
        let url = self.url(source, id)?;

        let mut request = self
            .client
            .get(&url)
            .query(&[("batch_size", page.limit), ("start_index", page.skip)]);
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, url = %url, "Membership service unreachable");
            ApiError::Upstream {
                status: 500,
                message: failure.clone(),
                body: None,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), url = %url, "Membership service refused the request");
            return Err(upstream_error(status.as_u16(), &text, &failure));
        }

        let invalid = |e: reqwest::Error| {
            warn!(error = %e, url = %url, "Membership service sent an unreadable body");
            ApiError::Upstream {
                status: 500,
                message: failure.clone(),
                body: None,
            }
        };

        match source {
            MemberSource::Group => {
                let body: GroupMembers = response.json().await.map_err(invalid)?;
                let total = body.count.unwrap_or(body.items.len() as u64);
                Ok(MemberPage {
                    members: body.items,
                    total,
                })
            }
            MemberSource::Workplace => {
                let total = response
                    .headers()
                    .get(TOTAL_HEADER)
                    .and_then(|h| h.to_str().ok())
                    .and_then(|h| h.trim().parse::<u64>().ok());
                let members: Vec<Value> = response.json().await.map_err(invalid)?;
                Ok(MemberPage {
                    total: total.unwrap_or(members.len() as u64),
                    members,
                })
            }
        }
    }
}

/// Forwards a refused membership call: the peer's status, and its body
/// when that body is JSON.
pub fn upstream_error(status: u16, text: &str, fallback: &str) -> ApiError {
    let body = serde_json::from_str::<Value>(text).ok();
    let message = if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    };
    ApiError::Upstream {
        status,
        message,
        body,
    }
}

impl MembershipDirectory for MembershipClient {
    fn members<'a>(
        &'a self,
        source: MemberSource,
        id: &'a str,
        page: Page,
        authorization: Option<&'a str>,
    ) -> BoxFuture<'a, ApiResult<MemberPage>> {
        self.fetch(source, id, page, authorization).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_each_service_layout() {
        let client = MembershipClient::new(
            reqwest::Client::new(),
            Some("http://groups".into()),
            Some("http://workplaces".into()),
        );
        assert_eq!(
            client.url(MemberSource::Group, "g1").unwrap(),
            "http://groups/v3/groups/g1/members"
        );
        assert_eq!(
            client.url(MemberSource::Workplace, "w1").unwrap(),
            "http://workplaces/v2/workplaces/w1/employees"
        );
    }

    #[test]
    fn missing_base_url_is_an_internal_error() {
        let client = MembershipClient::new(reqwest::Client::new(), None, None);
        assert!(matches!(
            client.url(MemberSource::Group, "g1"),
            Err(ApiError::Internal(_))
        ));
    }

    #[test]
    fn refused_calls_keep_status_and_json_body() {
        match upstream_error(404, r#"{"message":"Group not found"}"#, "fallback") {
            ApiError::Upstream { status, body, .. } => {
                assert_eq!(status, 404);
                assert_eq!(body.unwrap()["message"], "Group not found");
            }
            other => panic!("unexpected error {other:?}"),
        }
        match upstream_error(502, "", "Failed to query group members") {
            ApiError::Upstream { message, body, .. } => {
                assert_eq!(message, "Failed to query group members");
                assert!(body.is_none());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
