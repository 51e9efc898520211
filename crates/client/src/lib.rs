//! HTTP client for the CRM backend.
//!
//! The backend owns authentication: every call forwards the portal user's
//! bearer token untouched.

use std::time::Duration;

use api_types::forms::{ContactNew, Created, DealNew, LeadNew, PartnerNew};
use engine::{RecordKind, RowView};
use reqwest::{Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("backend error: {0}")]
    Server(String),
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    message: Option<String>,
}

/// Backend path serving the hierarchy for a view.
pub fn hierarchy_path(view: RowView) -> &'static str {
    match view {
        RowView::Partners => "api/partners",
        RowView::Records(RecordKind::Lead) => "api/leads",
        RowView::Records(RecordKind::Contact) => "api/contacts",
        RowView::Records(RecordKind::Deal) => "api/deals",
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: Url,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        // `Url::join` drops the last segment unless the base ends with `/`.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|err| ClientError::Server(format!("invalid base_url: {err}")))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|err| ClientError::Server(format!("invalid base_url: {err}")))
    }

    /// Raw hierarchy document for `view`, to be fed to [`engine::normalize`].
    pub async fn hierarchy(&self, token: &str, view: RowView) -> Result<Value, ClientError> {
        let endpoint = self.endpoint(hierarchy_path(view))?;
        tracing::debug!(%endpoint, "fetching hierarchy");

        let res = self
            .http
            .get(endpoint)
            .bearer_auth(token)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        if res.status().is_success() {
            return res.json::<Value>().await.map_err(ClientError::Transport);
        }
        Err(error_from(res).await)
    }

    pub async fn create_partner(
        &self,
        token: &str,
        form: &PartnerNew,
    ) -> Result<Created, ClientError> {
        self.post_form(token, "api/partners", form).await
    }

    pub async fn create_lead(&self, token: &str, form: &LeadNew) -> Result<Created, ClientError> {
        self.post_form(token, "api/leads", form).await
    }

    pub async fn create_contact(
        &self,
        token: &str,
        form: &ContactNew,
    ) -> Result<Created, ClientError> {
        self.post_form(token, "api/contacts", form).await
    }

    pub async fn create_deal(&self, token: &str, form: &DealNew) -> Result<Created, ClientError> {
        self.post_form(token, "api/deals", form).await
    }

    async fn post_form<T: Serialize + ?Sized>(
        &self,
        token: &str,
        path: &str,
        form: &T,
    ) -> Result<Created, ClientError> {
        let endpoint = self.endpoint(path)?;

        let res = self
            .http
            .post(endpoint)
            .bearer_auth(token)
            .json(form)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        if !res.status().is_success() {
            return Err(error_from(res).await);
        }

        let body = res.json::<Value>().await.map_err(ClientError::Transport)?;
        created_id(&body)
            .map(|id| Created { id })
            .ok_or_else(|| ClientError::Server("create response without id".to_string()))
    }
}

/// Finds the new record id in the backend's create response:
/// `{ id }`, `{ data: { id } }` or `{ data: [{ details: { id } }] }`.
fn created_id(body: &Value) -> Option<String> {
    let scalar = |value: &Value| match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    if let Some(id) = body.get("id").and_then(scalar) {
        return Some(id);
    }
    match body.get("data") {
        Some(Value::Array(items)) => items.first().and_then(|item| {
            item.get("details")
                .unwrap_or(item)
                .get("id")
                .and_then(scalar)
        }),
        Some(inner @ Value::Object(_)) => created_id(inner),
        _ => None,
    }
}

async fn error_from(res: Response) -> ClientError {
    let status = res.status();
    let body = res
        .json::<ErrorResponse>()
        .await
        .ok()
        .and_then(|err| err.error.or(err.message))
        .unwrap_or_else(|| "unknown error".to_string());

    tracing::error!(%status, %body, "backend request failed");
    match status.as_u16() {
        401 => ClientError::Unauthorized,
        403 => ClientError::Forbidden,
        404 => ClientError::NotFound,
        409 => ClientError::Conflict(body),
        422 => ClientError::Validation(body),
        _ => ClientError::Server(body),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn created_id_accepts_known_shapes() {
        assert_eq!(created_id(&json!({ "id": "1" })).as_deref(), Some("1"));
        assert_eq!(created_id(&json!({ "data": { "id": 42 } })).as_deref(), Some("42"));
        assert_eq!(
            created_id(&json!({ "data": [{ "details": { "id": "z9" } }] })).as_deref(),
            Some("z9")
        );
        assert_eq!(created_id(&json!({ "data": [] })), None);
        assert_eq!(created_id(&json!({ "id": " " })), None);
    }

    #[test]
    fn base_url_keeps_its_path() {
        let client = BackendClient::new("http://crm.local/v1", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint("api/leads").unwrap().as_str(),
            "http://crm.local/v1/api/leads"
        );
        assert!(BackendClient::new("not a url", Duration::from_secs(5)).is_err());
    }
}
