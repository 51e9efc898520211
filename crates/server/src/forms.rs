//! Create forms: validated here, stored by the backend, then shown right away
//! as pending rows until the next fetch.

use api_types::forms::{ContactNew, Created, DealNew, LeadNew, PartnerNew};
use axum::{Extension, Json, extract::State, http::StatusCode};
use engine::{Draft, EngineError, Money, RecordKind, RowSource, RowView};

use crate::{ServerError, server::ServerState, session::Session};

fn invalid(msg: impl Into<String>) -> ServerError {
    ServerError::Engine(EngineError::InvalidField(msg.into()))
}

fn required_name(name: &str) -> Result<String, ServerError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("name is required"));
    }
    Ok(name.to_string())
}

/// `+` followed by 7 to 15 digits; spaces, dashes and dots are ignored.
fn optional_phone(phone: Option<&str>) -> Result<Option<String>, ServerError> {
    let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let compact: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();
    let Some(digits) = compact.strip_prefix('+') else {
        return Err(invalid("phone number must start with +"));
    };
    if !(7..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("phone number must have 7 to 15 digits"));
    }
    Ok(Some(compact))
}

fn optional_email(email: Option<&str>) -> Result<Option<String>, ServerError> {
    let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    };
    if !valid {
        return Err(invalid(format!("invalid email: {email}")));
    }
    Ok(Some(email.to_string()))
}

fn required_partner(partner_id: &str) -> Result<String, ServerError> {
    let partner_id = partner_id.trim();
    if partner_id.is_empty() {
        return Err(invalid("partner is required"));
    }
    Ok(partner_id.to_string())
}

async fn push_pending(
    state: &ServerState,
    session: &Session,
    view: RowView,
    draft: Draft,
) {
    let row = state
        .with_workspace_mut(session, view, |workspace| {
            workspace.push_pending(view.source(), draft)
        })
        .await;
    tracing::info!(id = %row.id, view = view.label(), "created");
}

pub async fn create_partner(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Json(payload): Json<PartnerNew>,
) -> Result<(StatusCode, Json<Created>), ServerError> {
    let form = PartnerNew {
        name: required_name(&payload.name)?,
        email: optional_email(payload.email.as_deref())?,
        phone_number: optional_phone(payload.phone_number.as_deref())?,
        parent_id: payload
            .parent_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
    };

    let created = state.backend.create_partner(&session.token, &form).await?;
    push_pending(
        &state,
        &session,
        RowView::Partners,
        Draft {
            id: Some(created.id.clone()),
            name: form.name,
            email: form.email,
            phone_number: form.phone_number,
            status: String::new(),
            partner_id: form.parent_id,
        },
    )
    .await;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn create_lead(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Json(payload): Json<LeadNew>,
) -> Result<(StatusCode, Json<Created>), ServerError> {
    let form = LeadNew {
        name: required_name(&payload.name)?,
        email: optional_email(payload.email.as_deref())?,
        phone_number: optional_phone(payload.phone_number.as_deref())?,
        status: payload.status.or_else(|| Some("New".to_string())),
        partner_id: required_partner(&payload.partner_id)?,
    };

    let created = state.backend.create_lead(&session.token, &form).await?;
    push_pending(
        &state,
        &session,
        RowView::Records(RecordKind::Lead),
        Draft {
            id: Some(created.id.clone()),
            name: form.name,
            email: form.email,
            phone_number: form.phone_number,
            status: form.status.unwrap_or_default(),
            partner_id: Some(form.partner_id),
        },
    )
    .await;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn create_contact(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Json(payload): Json<ContactNew>,
) -> Result<(StatusCode, Json<Created>), ServerError> {
    let form = ContactNew {
        name: required_name(&payload.name)?,
        email: optional_email(payload.email.as_deref())?,
        phone_number: optional_phone(payload.phone_number.as_deref())?,
        status: payload.status,
        partner_id: required_partner(&payload.partner_id)?,
    };

    let created = state.backend.create_contact(&session.token, &form).await?;
    push_pending(
        &state,
        &session,
        RowView::Records(RecordKind::Contact),
        Draft {
            id: Some(created.id.clone()),
            name: form.name,
            email: form.email,
            phone_number: form.phone_number,
            status: form.status.unwrap_or_default(),
            partner_id: Some(form.partner_id),
        },
    )
    .await;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn create_deal(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Json(payload): Json<DealNew>,
) -> Result<(StatusCode, Json<Created>), ServerError> {
    let revenue = match payload.expected_revenue.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(raw.parse::<Money>()?),
        _ => None,
    };
    if revenue.is_some_and(|value| value < Money::ZERO) {
        return Err(ServerError::Engine(EngineError::InvalidAmount(
            "expected revenue cannot be negative".to_string(),
        )));
    }

    let form = DealNew {
        name: required_name(&payload.name)?,
        stage: payload.stage,
        expected_revenue: revenue.map(|value| value.to_string()),
        closing_date: payload.closing_date,
        contact_id: payload.contact_id,
        partner_id: required_partner(&payload.partner_id)?,
    };

    let created = state.backend.create_deal(&session.token, &form).await?;
    push_pending(
        &state,
        &session,
        RowView::Records(RecordKind::Deal),
        Draft {
            id: Some(created.id.clone()),
            name: form.name,
            email: None,
            phone_number: None,
            status: form.stage.unwrap_or_default(),
            partner_id: Some(form.partner_id),
        },
    )
    .await;
    Ok((StatusCode::CREATED, Json(created)))
}
