//! Per-view state: the last fetched snapshot plus an optimistic overlay.
//!
//! The two lists are never merged structurally. Flat tables show the
//! snapshot rows followed by the pending rows; trees and aggregates only see
//! the snapshot. A pending row is dropped once a fetch issued after it was
//! pushed lands.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    Money,
    aggregate::{Aggregate, aggregate},
    flatten::{FlatRow, RowSource, RowView, flatten},
    model::{PartnerNode, RecordKind, subtree},
    normalize::Normalized,
    tree::{TreeNode, tree_view},
};

/// Issued when a fetch starts; used to discard responses that were
/// overtaken by a newer fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub forest: Vec<PartnerNode>,
    pub warnings: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

/// What the user just created, before the backend data is refetched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Draft {
    /// Id assigned by the backend, when known.
    pub id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub status: String,
    /// Partner the new entry is attached to (parent for partners).
    pub partner_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Workspace {
    separator: String,
    issued: u64,
    applied: Option<FetchTicket>,
    snapshot: Option<Snapshot>,
    /// Pending rows with the last ticket issued when each was pushed.
    pending: Vec<(u64, FlatRow)>,
}

impl Workspace {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            issued: 0,
            applied: None,
            snapshot: None,
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Starts a fetch and returns its ticket.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.issued += 1;
        FetchTicket(self.issued)
    }

    /// Applies a completed fetch. Returns `false`, leaving the state
    /// untouched, when a newer fetch has already been applied.
    pub fn complete_fetch(&mut self, ticket: FetchTicket, normalized: Normalized) -> bool {
        if self.applied.is_some_and(|applied| applied > ticket) {
            tracing::debug!(?ticket, "dropping stale hierarchy response");
            return false;
        }
        self.applied = Some(ticket);
        self.snapshot = Some(Snapshot {
            forest: normalized.forest,
            warnings: normalized.warnings,
            fetched_at: Utc::now(),
        });
        // Responses to fetches begun before a push cannot contain that row.
        self.pending.retain(|(issued, _)| *issued >= ticket.0);
        true
    }

    /// Convenience for callers that fetch synchronously.
    pub fn replace(&mut self, normalized: Normalized) {
        let ticket = self.begin_fetch();
        self.complete_fetch(ticket, normalized);
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Fetched forest, empty when nothing has been fetched yet.
    #[must_use]
    pub fn forest(&self) -> &[PartnerNode] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.forest.as_slice())
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.warnings.as_slice())
            .unwrap_or(&[])
    }

    pub fn pending(&self) -> impl Iterator<Item = &FlatRow> {
        self.pending.iter().map(|(_, row)| row)
    }

    /// Adds an optimistic row for `source` and returns it.
    pub fn push_pending(&mut self, source: RowSource, draft: Draft) -> FlatRow {
        let (parent_name, path, level) = match draft.partner_id.as_deref() {
            Some(partner_id) => match subtree(self.forest(), partner_id) {
                Some((mut names, node)) => {
                    let depth = names.len();
                    names.push(node.name.clone());
                    let level = if source == RowSource::Partner { depth + 1 } else { depth };
                    (Some(node.name), names.join(self.separator.as_str()), level)
                }
                None => (None, String::new(), 0),
            },
            None => (None, String::new(), 0),
        };

        let row = FlatRow {
            id: draft
                .id
                .unwrap_or_else(|| format!("pending-{}", Uuid::new_v4())),
            source,
            name: draft.name,
            email: draft.email,
            phone_number: draft.phone_number,
            status: draft.status,
            owner_id: None,
            owner_name: None,
            created_time: Some(Utc::now()),
            partner_id: draft.partner_id,
            partner_name: parent_name,
            partner_path: path,
            partner_level: level,
            deal_count: 0,
            deal_value: Money::ZERO,
            pending: true,
        };
        self.pending.push((self.issued, row.clone()));
        row
    }

    /// Snapshot rows for `view` followed by matching pending rows.
    #[must_use]
    pub fn rows(&self, view: RowView) -> Vec<FlatRow> {
        let mut rows = flatten(self.forest(), view, &self.separator);
        let source = view.source();
        rows.extend(
            self.pending()
                .filter(|row| row.source == source)
                .cloned(),
        );
        rows
    }

    #[must_use]
    pub fn tree(&self, kind: RecordKind) -> Vec<TreeNode> {
        tree_view(self.forest(), kind, &self.separator)
    }

    #[must_use]
    pub fn aggregate(&self, kind: RecordKind) -> Aggregate {
        aggregate(self.forest(), kind)
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(crate::flatten::DEFAULT_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;

    fn snapshot_with(names: &[&str]) -> Normalized {
        Normalized {
            forest: names
                .iter()
                .map(|name| {
                    PartnerNode::new(*name, *name)
                        .with_record(Record::new(RecordKind::Lead, format!("{name}-l"), "Lead"))
                })
                .collect(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn unloaded_workspace_is_empty() {
        let ws = Workspace::default();
        assert!(!ws.is_loaded());
        assert!(ws.rows(RowView::Partners).is_empty());
        assert!(ws.tree(RecordKind::Lead).is_empty());
        assert_eq!(ws.aggregate(RecordKind::Lead).total_records, 0);
    }

    #[test]
    fn stale_fetch_is_dropped() {
        let mut ws = Workspace::default();
        let old = ws.begin_fetch();
        let new = ws.begin_fetch();
        assert!(ws.complete_fetch(new, snapshot_with(&["new"])));
        assert!(!ws.complete_fetch(old, snapshot_with(&["old"])));
        assert_eq!(ws.forest()[0].name, "new");
    }

    #[test]
    fn pending_partner_shows_in_rows_not_in_tree() {
        let mut ws = Workspace::default();
        ws.replace(snapshot_with(&["Alice"]));

        let row = ws.push_pending(
            RowSource::Partner,
            Draft {
                name: "Bob".to_string(),
                partner_id: Some("Alice".to_string()),
                ..Draft::default()
            },
        );
        assert!(row.pending);
        assert!(row.id.starts_with("pending-"));
        assert_eq!(row.partner_path, "Alice");
        assert_eq!(row.partner_level, 1);

        assert_eq!(ws.rows(RowView::Partners).len(), 2);
        assert_eq!(ws.rows(RowView::Records(RecordKind::Lead)).len(), 1);
        assert_eq!(ws.tree(RecordKind::Lead)[0].children.len(), 0);
    }

    #[test]
    fn new_fetch_evicts_overlay() {
        let mut ws = Workspace::default();
        ws.replace(snapshot_with(&["Alice"]));
        ws.push_pending(
            RowSource::Lead,
            Draft {
                id: Some("l-new".to_string()),
                name: "New lead".to_string(),
                partner_id: Some("Alice".to_string()),
                ..Draft::default()
            },
        );
        assert_eq!(ws.rows(RowView::Records(RecordKind::Lead)).len(), 2);

        ws.replace(snapshot_with(&["Alice"]));
        assert_eq!(ws.pending().count(), 0);
        assert_eq!(ws.rows(RowView::Records(RecordKind::Lead)).len(), 1);
    }

    #[test]
    fn fetch_begun_before_a_create_keeps_the_new_row() {
        let mut ws = Workspace::default();
        ws.replace(snapshot_with(&["Alice"]));

        let in_flight = ws.begin_fetch();
        ws.push_pending(
            RowSource::Lead,
            Draft {
                id: Some("l-new".to_string()),
                name: "New lead".to_string(),
                partner_id: Some("Alice".to_string()),
                ..Draft::default()
            },
        );
        assert!(ws.complete_fetch(in_flight, snapshot_with(&["Alice"])));

        let ids: Vec<_> = ws
            .rows(RowView::Records(RecordKind::Lead))
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, vec!["Alice-l", "l-new"]);

        ws.replace(snapshot_with(&["Alice"]));
        assert_eq!(ws.pending().count(), 0);
    }
}
