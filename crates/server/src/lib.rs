use axum::{Json, http::StatusCode, response::IntoResponse};
use backend_client::ClientError;
use engine::EngineError;

use serde::Serialize;
pub use server::{PortalConfig, ServerState, router, run_with_listener};
pub use session::Session;

mod dashboard;
mod forms;
mod server;
mod session;
mod views;

pub mod types {
    pub mod session {
        pub use api_types::session::SessionView;
    }

    pub mod rows {
        pub use api_types::{query::RowsQuery, rows::RowsResponse, tree::TreeResponse};
        pub use engine::{FlatRow, TreeNode};
    }

    pub mod summary {
        pub use api_types::{
            dashboard::DashboardResponse,
            performance::PerformanceResponse,
            summary::{OwnerCount, StatusCount, SummaryResponse},
        };
    }

    pub mod forms {
        pub use api_types::forms::{ContactNew, Created, DealNew, LeadNew, PartnerNew};
    }
}

#[derive(Debug)]
pub enum ServerError {
    Engine(EngineError),
    Backend(ClientError),
    Unauthorized(String),
    Generic(String),
}

#[derive(Serialize)]
struct Error {
    error: String,
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Export(_) | EngineError::Csv(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::NothingToExport
        | EngineError::InvalidAmount(_)
        | EngineError::InvalidField(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::Export(_) | EngineError::Csv(_) => {
            tracing::error!("export error: {err}");
            "internal server error".to_string()
        }
        other => other.to_string(),
    }
}

fn status_for_client_error(err: &ClientError) -> StatusCode {
    match err {
        ClientError::Unauthorized => StatusCode::UNAUTHORIZED,
        ClientError::Forbidden => StatusCode::FORBIDDEN,
        ClientError::NotFound => StatusCode::NOT_FOUND,
        ClientError::Conflict(_) => StatusCode::CONFLICT,
        ClientError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ClientError::Server(_) | ClientError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
}

fn message_for_client_error(err: ClientError) -> String {
    match err {
        ClientError::Conflict(msg) | ClientError::Validation(msg) => msg,
        ClientError::Transport(err) => {
            tracing::error!("backend unreachable: {err}");
            "backend unavailable".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ServerError::Engine(err) => (status_for_engine_error(&err), message_for_engine_error(err)),
            ServerError::Backend(err) => (status_for_client_error(&err), message_for_client_error(err)),
            ServerError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err),
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
        };

        (status, Json(Error { error })).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<ClientError> for ServerError {
    fn from(value: ClientError) -> Self {
        Self::Backend(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_to_export_maps_to_422() {
        let res = ServerError::from(EngineError::NothingToExport).into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn invalid_field_maps_to_422() {
        let res = ServerError::from(EngineError::InvalidField("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn backend_errors_keep_their_status() {
        let cases = [
            (ClientError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ClientError::Forbidden, StatusCode::FORBIDDEN),
            (ClientError::NotFound, StatusCode::NOT_FOUND),
            (ClientError::Conflict("dup".to_string()), StatusCode::CONFLICT),
            (ClientError::Validation("bad".to_string()), StatusCode::UNPROCESSABLE_ENTITY),
            (ClientError::Server("boom".to_string()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn generic_maps_to_400() {
        let res = ServerError::Generic("bad".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
