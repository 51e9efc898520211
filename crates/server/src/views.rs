//! Table, tree, summary and export endpoints shared by every view.

use api_types::{
    query::RowsQuery,
    rows::RowsResponse,
    summary::{OwnerCount, StatusCount, SummaryResponse},
    tree::TreeResponse,
};
use axum::{
    Extension, Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use engine::{
    FilterOptions, FlatRow, RecordKind, RowView, Tracked, Workspace, all_records,
    export_file_name, project, to_delimited_text, tone_for,
};

use crate::{ServerError, server::ServerState, session::Session};

/// Total row count (overlay included) and the filtered, sorted rows.
fn projected(
    workspace: &Workspace,
    view: RowView,
    query: &RowsQuery,
) -> Result<(usize, Vec<FlatRow>), ServerError> {
    let filter = query.filter()?;
    let sort = query.sort()?;
    let rows = workspace.rows(view);
    let total = rows.len();
    Ok((total, project(&rows, &filter, sort.as_ref())))
}

fn record_kind(view: RowView) -> Result<RecordKind, ServerError> {
    match view {
        RowView::Records(kind) => Ok(kind),
        RowView::Partners => Err(ServerError::Generic(
            "partners have no record summary".to_string(),
        )),
    }
}

pub async fn rows(
    Extension(session): Extension<Session>,
    Extension(view): Extension<RowView>,
    State(state): State<ServerState>,
    Query(query): Query<RowsQuery>,
) -> Result<Json<RowsResponse>, ServerError> {
    state.ensure_loaded(&session, view, query.refresh).await?;

    state
        .with_workspace(&session, view, |workspace| {
            let (total, rows) = projected(workspace, view, &query)?;
            Ok(Json(RowsResponse {
                total,
                filtered: rows.len(),
                options: FilterOptions::from_rows(&workspace.rows(view)),
                rows,
                warnings: workspace.warnings().to_vec(),
                fetched_at: workspace.snapshot().map(|snapshot| snapshot.fetched_at),
            }))
        })
        .await
}

pub async fn tree(
    Extension(session): Extension<Session>,
    Extension(view): Extension<RowView>,
    State(state): State<ServerState>,
) -> Result<Json<TreeResponse>, ServerError> {
    state.ensure_loaded(&session, view, false).await?;

    // The partner tree counts contacts, the usual unit of partner activity.
    let kind = match view {
        RowView::Partners => RecordKind::Contact,
        RowView::Records(kind) => kind,
    };
    let response = state
        .with_workspace(&session, view, |workspace| TreeResponse {
            kind,
            nodes: workspace.tree(kind),
            warnings: workspace.warnings().to_vec(),
        })
        .await;
    Ok(Json(response))
}

pub async fn summary(
    Extension(session): Extension<Session>,
    Extension(view): Extension<RowView>,
    State(state): State<ServerState>,
) -> Result<Json<SummaryResponse>, ServerError> {
    let kind = record_kind(view)?;
    state.ensure_loaded(&session, view, false).await?;

    let response = state
        .with_workspace(&session, view, |workspace| {
            let agg = workspace.aggregate(kind);

            let mut owner_names = std::collections::HashMap::new();
            for record in all_records(workspace.forest(), kind) {
                if let Some(owner) = record.owner() {
                    owner_names
                        .entry(owner.id.clone())
                        .or_insert_with(|| owner.name.clone());
                }
            }

            let mut by_status: Vec<StatusCount> = agg
                .by_status
                .iter()
                .map(|(status, count)| {
                    let tone = tone_for(kind, status);
                    StatusCount {
                        status: status.clone(),
                        count: *count,
                        tone,
                        color: tone.color().to_string(),
                    }
                })
                .collect();
            by_status.sort_by(|a, b| b.count.cmp(&a.count));

            let by_owner = agg
                .by_owner
                .iter()
                .map(|(owner_id, count)| OwnerCount {
                    owner_id: owner_id.clone(),
                    owner_name: owner_names.get(owner_id).cloned(),
                    count: *count,
                })
                .collect();

            SummaryResponse {
                kind,
                total_records: agg.total_records,
                total_partners: agg.total_nodes,
                by_status,
                by_owner,
                deals: agg.deals,
                conversion_rate: agg.conversion.rate(),
                warnings: workspace.warnings().to_vec(),
            }
        })
        .await;
    Ok(Json(response))
}

/// `text/csv` attachment of the currently filtered rows.
pub async fn export(
    Extension(session): Extension<Session>,
    Extension(view): Extension<RowView>,
    State(state): State<ServerState>,
    Query(query): Query<RowsQuery>,
) -> Result<Response, ServerError> {
    state.ensure_loaded(&session, view, query.refresh).await?;

    let text = state
        .with_workspace(&session, view, |workspace| {
            let (_, rows) = projected(workspace, view, &query)?;
            let records: Vec<_> = rows.iter().map(FlatRow::export_record).collect();
            to_delimited_text(&records).map_err(ServerError::from)
        })
        .await?;

    Ok(csv_attachment(&export_file_name(view.label()), text))
}

pub(crate) fn csv_attachment(file_name: &str, text: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        text,
    )
        .into_response()
}

/// Refetches every view the user has open.
pub async fn refresh(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<StatusCode, ServerError> {
    for view in state.loaded_views(&session).await {
        state.ensure_loaded(&session, view, true).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}
