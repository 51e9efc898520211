use axum::{
    Extension, Router,
    middleware,
    routing::{get, post},
};
use backend_client::BackendClient;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use engine::{DEFAULT_SEPARATOR, RecordKind, RowView, Workspace};
use tokio::sync::RwLock;

use std::{collections::HashMap, sync::Arc};

use crate::{ServerError, dashboard, forms, session, session::Session, views};

/// Presentation settings shared by every request.
#[derive(Clone, Debug)]
pub struct PortalConfig {
    /// Zone used to bucket dates by month.
    pub time_zone: Tz,
    pub path_separator: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            time_zone: Tz::UTC,
            path_separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

/// One workspace per view for a single portal user.
#[derive(Debug)]
pub(crate) struct ViewState {
    /// Latest expiry among the tokens that touched this state.
    expires_at: DateTime<Utc>,
    partners: Workspace,
    leads: Workspace,
    contacts: Workspace,
    deals: Workspace,
}

impl ViewState {
    fn new(separator: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            expires_at,
            partners: Workspace::new(separator),
            leads: Workspace::new(separator),
            contacts: Workspace::new(separator),
            deals: Workspace::new(separator),
        }
    }

    pub(crate) fn workspace(&self, view: RowView) -> &Workspace {
        match view {
            RowView::Partners => &self.partners,
            RowView::Records(RecordKind::Lead) => &self.leads,
            RowView::Records(RecordKind::Contact) => &self.contacts,
            RowView::Records(RecordKind::Deal) => &self.deals,
        }
    }

    pub(crate) fn workspace_mut(&mut self, view: RowView) -> &mut Workspace {
        match view {
            RowView::Partners => &mut self.partners,
            RowView::Records(RecordKind::Lead) => &mut self.leads,
            RowView::Records(RecordKind::Contact) => &mut self.contacts,
            RowView::Records(RecordKind::Deal) => &mut self.deals,
        }
    }

    fn loaded_views(&self) -> Vec<RowView> {
        VIEWS
            .into_iter()
            .filter(|view| self.workspace(*view).is_loaded())
            .collect()
    }
}

pub(crate) const VIEWS: [RowView; 4] = [
    RowView::Partners,
    RowView::Records(RecordKind::Lead),
    RowView::Records(RecordKind::Contact),
    RowView::Records(RecordKind::Deal),
];

#[derive(Clone)]
pub struct ServerState {
    pub backend: Arc<BackendClient>,
    pub portal: Arc<PortalConfig>,
    pub(crate) views: Arc<RwLock<HashMap<String, ViewState>>>,
}

impl ServerState {
    pub fn new(backend: BackendClient, portal: PortalConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            portal: Arc::new(portal),
            views: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetches `view` from the backend unless it is already cached.
    ///
    /// The lock is not held across the backend call; a response that was
    /// overtaken by a newer fetch is discarded by the workspace.
    pub(crate) async fn ensure_loaded(
        &self,
        session: &Session,
        view: RowView,
        refresh: bool,
    ) -> Result<(), ServerError> {
        let ticket = {
            let mut views = self.views.write().await;
            let workspace = self.state_for(&mut views, session).workspace_mut(view);
            if workspace.is_loaded() && !refresh {
                return Ok(());
            }
            workspace.begin_fetch()
        };

        let body = self.backend.hierarchy(&session.token, view).await?;
        let normalized = engine::normalize(&body);
        if !normalized.is_clean() {
            tracing::warn!(
                view = view.label(),
                warnings = normalized.warnings.len(),
                "hierarchy loaded with warnings"
            );
        }

        let mut views = self.views.write().await;
        if let Some(state) = views.get_mut(&session.subject) {
            state.workspace_mut(view).complete_fetch(ticket, normalized);
        }
        Ok(())
    }

    /// Runs `f` on the user's workspace for `view`; an empty workspace when
    /// nothing was fetched yet.
    pub(crate) async fn with_workspace<T>(
        &self,
        session: &Session,
        view: RowView,
        f: impl FnOnce(&Workspace) -> T,
    ) -> T {
        let views = self.views.read().await;
        match views.get(&session.subject) {
            Some(state) => f(state.workspace(view)),
            None => f(&Workspace::new(self.portal.path_separator.as_str())),
        }
    }

    pub(crate) async fn with_workspace_mut<T>(
        &self,
        session: &Session,
        view: RowView,
        f: impl FnOnce(&mut Workspace) -> T,
    ) -> T {
        let mut views = self.views.write().await;
        f(self.state_for(&mut views, session).workspace_mut(view))
    }

    fn state_for<'a>(
        &self,
        views: &'a mut HashMap<String, ViewState>,
        session: &Session,
    ) -> &'a mut ViewState {
        let state = views
            .entry(session.subject.clone())
            .or_insert_with(|| ViewState::new(&self.portal.path_separator, session.expires_at));
        state.expires_at = state.expires_at.max(session.expires_at);
        state
    }

    /// Drops the cached hierarchies of users whose last token has expired.
    pub(crate) async fn evict_expired(&self, now: DateTime<Utc>) {
        if !self
            .views
            .read()
            .await
            .values()
            .any(|state| state.expires_at <= now)
        {
            return;
        }
        let mut views = self.views.write().await;
        let before = views.len();
        views.retain(|_, state| state.expires_at > now);
        tracing::debug!(evicted = before - views.len(), "expired sessions evicted");
    }

    /// Views this user already fetched.
    pub(crate) async fn loaded_views(&self, session: &Session) -> Vec<RowView> {
        let views = self.views.read().await;
        views
            .get(&session.subject)
            .map(ViewState::loaded_views)
            .unwrap_or_default()
    }
}

pub fn router(state: ServerState) -> Router {
    let partners = Extension(RowView::Partners);
    let leads = Extension(RowView::Records(RecordKind::Lead));
    let contacts = Extension(RowView::Records(RecordKind::Contact));
    let deals = Extension(RowView::Records(RecordKind::Deal));

    Router::new()
        .route("/session", get(session::get))
        .route("/partners", post(forms::create_partner))
        .route("/partners/rows", get(views::rows).layer(partners.clone()))
        .route("/partners/tree", get(views::tree).layer(partners.clone()))
        .route("/partners/export", get(views::export).layer(partners))
        .route("/partners/performance", get(dashboard::performance))
        .route(
            "/partners/performance/export",
            get(dashboard::performance_export),
        )
        .route("/leads", post(forms::create_lead))
        .route("/leads/rows", get(views::rows).layer(leads.clone()))
        .route("/leads/tree", get(views::tree).layer(leads.clone()))
        .route("/leads/summary", get(views::summary).layer(leads.clone()))
        .route("/leads/export", get(views::export).layer(leads))
        .route("/contacts", post(forms::create_contact))
        .route("/contacts/rows", get(views::rows).layer(contacts.clone()))
        .route("/contacts/tree", get(views::tree).layer(contacts.clone()))
        .route("/contacts/summary", get(views::summary).layer(contacts.clone()))
        .route("/contacts/export", get(views::export).layer(contacts))
        .route("/deals", post(forms::create_deal))
        .route("/deals/rows", get(views::rows).layer(deals.clone()))
        .route("/deals/summary", get(views::summary).layer(deals.clone()))
        .route("/deals/export", get(views::export).layer(deals))
        .route("/dashboard", get(dashboard::get))
        .route("/refresh", post(views::refresh))
        .route_layer(middleware::from_fn_with_state(state.clone(), session::auth))
        .with_state(state)
}

pub async fn run_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Portal listening on {}", addr);

    axum::serve(listener, router(state)).await
}
