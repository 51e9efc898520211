//! Dashboard and partner performance endpoints.

use api_types::{dashboard::DashboardResponse, performance::PerformanceResponse};
use axum::{Extension, Json, extract::State, response::Response};
use engine::{
    PartnerPerformance, RecordKind, RowView, Tracked, all_records, deal_dashboard,
    export_file_name, model::node_count, partner_performance, status_distribution,
    to_delimited_text,
};

use crate::{ServerError, server::ServerState, session::Session, views::csv_attachment};

const CONTACTS: RowView = RowView::Records(RecordKind::Contact);

pub async fn get(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<Json<DashboardResponse>, ServerError> {
    let (partners, contacts) = tokio::join!(
        state.ensure_loaded(&session, RowView::Partners, false),
        state.ensure_loaded(&session, CONTACTS, false),
    );
    partners?;
    contacts?;

    let (total_partners, mut warnings) = state
        .with_workspace(&session, RowView::Partners, |workspace| {
            (node_count(workspace.forest()), workspace.warnings().to_vec())
        })
        .await;

    let time_zone = state.portal.time_zone;
    let response = state
        .with_workspace(&session, CONTACTS, |workspace| {
            let records = all_records(workspace.forest(), RecordKind::Contact);
            let statuses: Vec<&str> = records.iter().map(|record| record.status()).collect();
            let deals = deal_dashboard(workspace.forest(), time_zone);
            warnings.extend(workspace.warnings().iter().cloned());

            DashboardResponse {
                total_partners,
                total_contacts: records.len(),
                conversion_rate: deals.conversion.rate(),
                win_rate: deals.deals.win_rate(),
                average_deal_value: deals.deals.average_value().to_string(),
                contact_statuses: status_distribution(&statuses, RecordKind::Contact),
                deals,
                warnings,
            }
        })
        .await;
    Ok(Json(response))
}

async fn load_performance(
    state: &ServerState,
    session: &Session,
) -> Result<(Vec<PartnerPerformance>, Vec<String>), ServerError> {
    state.ensure_loaded(session, RowView::Partners, false).await?;

    let separator = state.portal.path_separator.clone();
    Ok(state
        .with_workspace(session, RowView::Partners, |workspace| {
            (
                partner_performance(workspace.forest(), &separator),
                workspace.warnings().to_vec(),
            )
        })
        .await)
}

pub async fn performance(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<Json<PerformanceResponse>, ServerError> {
    let (partners, warnings) = load_performance(&state, &session).await?;
    Ok(Json(PerformanceResponse { partners, warnings }))
}

pub async fn performance_export(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<Response, ServerError> {
    let (partners, _) = load_performance(&state, &session).await?;
    let records: Vec<_> = partners
        .iter()
        .map(PartnerPerformance::export_record)
        .collect();
    let text = to_delimited_text(&records)?;
    Ok(csv_attachment(
        &export_file_name("Partner Deal Performance"),
        text,
    ))
}
