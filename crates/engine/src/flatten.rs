//! Flattening of a partner forest into table rows.
//!
//! Traversal is depth-first pre-order: a node's own records come before the
//! rows of its children, and children keep the backend order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    Money,
    model::{PartnerNode, Record, RecordKind},
};

/// Separator used to join partner names into a breadcrumb.
pub const DEFAULT_SEPARATOR: &str = " > ";

/// What a flat row was produced from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSource {
    Partner,
    Lead,
    Contact,
    Deal,
}

impl From<RecordKind> for RowSource {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Lead => Self::Lead,
            RecordKind::Contact => Self::Contact,
            RecordKind::Deal => Self::Deal,
        }
    }
}

/// Which rows a flattening pass produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RowView {
    /// One row per partner node.
    Partners,
    /// One row per record of the given kind.
    Records(RecordKind),
}

impl RowView {
    #[must_use]
    pub fn source(self) -> RowSource {
        match self {
            Self::Partners => RowSource::Partner,
            Self::Records(kind) => kind.into(),
        }
    }

    /// Plural display name: `Partners`, `Leads`, ...
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Partners => "Partners",
            Self::Records(kind) => kind.plural_label(),
        }
    }
}

impl TryFrom<&str> for RowView {
    type Error = crate::EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "partner" | "partners" => Ok(Self::Partners),
            other => RecordKind::try_from(other).map(Self::Records),
        }
    }
}

/// A table row: the record (or partner) fields plus its place in the
/// hierarchy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRow {
    pub id: String,
    pub source: RowSource,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub status: String,
    pub owner_id: Option<String>,
    pub owner_name: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    /// Owning node for record rows, parent node for partner rows.
    pub partner_id: Option<String>,
    pub partner_name: Option<String>,
    pub partner_path: String,
    pub partner_level: usize,
    pub deal_count: usize,
    pub deal_value: Money,
    /// `true` for optimistic rows not yet confirmed by a fetch.
    #[serde(default)]
    pub pending: bool,
}

impl FlatRow {
    /// Row for a record owned by `node`; `path` already ends with the node.
    fn from_record(record: &Record, node: &PartnerNode, path: &str, level: usize) -> Self {
        let deal_value = record.deals.iter().map(|deal| deal.expected_revenue).sum();
        Self {
            id: record.id.clone(),
            source: record.kind.into(),
            name: record.name.clone(),
            email: record.email.clone(),
            phone_number: record.phone_number.clone(),
            status: record.status.clone(),
            owner_id: record.owner.as_ref().map(|owner| owner.id.clone()),
            owner_name: record.owner.as_ref().map(|owner| owner.name.clone()),
            created_time: record.created_time,
            partner_id: Some(node.id.clone()),
            partner_name: Some(node.name.clone()),
            partner_path: path.to_string(),
            partner_level: level,
            deal_count: record.deals.len(),
            deal_value,
            pending: false,
        }
    }

    /// Row for a partner node; `path` holds strict ancestors only.
    fn from_partner(
        node: &PartnerNode,
        parent: Option<&PartnerNode>,
        path: &str,
        level: usize,
    ) -> Self {
        let deals: Vec<_> = node.records.all_deals().collect();
        Self {
            id: node.id.clone(),
            source: RowSource::Partner,
            name: node.name.clone(),
            email: node.email.clone(),
            phone_number: node.phone_number.clone(),
            status: String::new(),
            owner_id: None,
            owner_name: None,
            created_time: None,
            partner_id: parent.map(|p| p.id.clone()),
            partner_name: parent.map(|p| p.name.clone()),
            partner_path: path.to_string(),
            partner_level: level,
            deal_count: deals.len(),
            deal_value: deals.iter().map(|deal| deal.expected_revenue).sum(),
            pending: false,
        }
    }

    /// Human-facing export columns, in display order.
    #[must_use]
    pub fn export_record(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let text = |value: &Option<String>| Value::String(value.clone().unwrap_or_default());
        map.insert("ID".into(), Value::String(self.id.clone()));
        map.insert("Name".into(), Value::String(self.name.clone()));
        map.insert("Email".into(), text(&self.email));
        map.insert("Phone".into(), text(&self.phone_number));
        if self.source != RowSource::Partner {
            map.insert("Status".into(), Value::String(self.status.clone()));
            map.insert("Owner".into(), text(&self.owner_name));
            map.insert(
                "Created".into(),
                Value::String(
                    self.created_time
                        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default(),
                ),
            );
        }
        map.insert("Partner".into(), text(&self.partner_name));
        map.insert("Partner Path".into(), Value::String(self.partner_path.clone()));
        map.insert("Level".into(), Value::from(self.partner_level));
        if matches!(self.source, RowSource::Partner | RowSource::Contact) {
            map.insert("Deals".into(), Value::from(self.deal_count));
            map.insert("Deal Value".into(), Value::String(self.deal_value.to_string()));
        }
        map
    }
}

/// Flattens a forest for the given view.
///
/// Output length equals the number of records of the kind (or the number of
/// nodes for [`RowView::Partners`]). Records with a blank id are skipped.
pub fn flatten(forest: &[PartnerNode], view: RowView, separator: &str) -> Vec<FlatRow> {
    let mut rows = Vec::new();
    let mut ancestors: Vec<&str> = Vec::new();
    for root in forest {
        visit(root, None, view, separator, &mut ancestors, &mut rows);
    }
    rows
}

fn visit<'a>(
    node: &'a PartnerNode,
    parent: Option<&'a PartnerNode>,
    view: RowView,
    separator: &str,
    ancestors: &mut Vec<&'a str>,
    rows: &mut Vec<FlatRow>,
) {
    let level = ancestors.len();
    match view {
        RowView::Partners => {
            let path = ancestors.join(separator);
            rows.push(FlatRow::from_partner(node, parent, &path, level));
        }
        RowView::Records(kind) => {
            ancestors.push(&node.name);
            let path = ancestors.join(separator);
            ancestors.pop();
            for record in node.records.get(kind) {
                if record.id.trim().is_empty() {
                    tracing::warn!(partner = %node.id, "skipping {kind} without id");
                    continue;
                }
                rows.push(FlatRow::from_record(&record, node, &path, level));
            }
        }
    }

    ancestors.push(&node.name);
    for child in &node.children {
        visit(child, Some(node), view, separator, ancestors, rows);
    }
    ancestors.pop();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(id: &str) -> Record {
        Record::new(RecordKind::Lead, id, format!("Lead {id}"))
    }

    #[test]
    fn empty_forest_flattens_to_nothing() {
        assert!(flatten(&[], RowView::Records(RecordKind::Lead), DEFAULT_SEPARATOR).is_empty());
        assert!(flatten(&[], RowView::Partners, DEFAULT_SEPARATOR).is_empty());
    }

    #[test]
    fn own_records_come_before_children() {
        let forest = vec![
            PartnerNode::new("a", "Alice")
                .with_child(PartnerNode::new("b", "Bob").with_record(lead("b1")))
                .with_record(lead("a1")),
        ];
        let ids: Vec<_> = flatten(&forest, RowView::Records(RecordKind::Lead), DEFAULT_SEPARATOR)
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, vec!["a1", "b1"]);
    }

    #[test]
    fn partner_rows_carry_strict_ancestors() {
        let forest = vec![PartnerNode::new("a", "Alice").with_child(
            PartnerNode::new("b", "Bob").with_child(PartnerNode::new("c", "Carol")),
        )];
        let rows = flatten(&forest, RowView::Partners, "/");
        let summary: Vec<_> = rows
            .iter()
            .map(|row| (row.name.as_str(), row.partner_path.as_str(), row.partner_level))
            .collect();
        assert_eq!(
            summary,
            vec![("Alice", "", 0), ("Bob", "Alice", 1), ("Carol", "Alice/Bob", 2)]
        );
        assert_eq!(rows[2].partner_id.as_deref(), Some("b"));
        assert_eq!(rows[0].partner_id, None);
    }

    #[test]
    fn blank_record_ids_are_skipped() {
        let forest = vec![
            PartnerNode::new("a", "Alice")
                .with_record(lead(" "))
                .with_record(lead("ok")),
        ];
        let rows = flatten(&forest, RowView::Records(RecordKind::Lead), DEFAULT_SEPARATOR);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn export_record_keeps_display_order() {
        let forest = vec![PartnerNode::new("a", "Alice").with_record(lead("l1"))];
        let rows = flatten(&forest, RowView::Records(RecordKind::Lead), DEFAULT_SEPARATOR);
        let keys: Vec<_> = rows[0].export_record().keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                "ID", "Name", "Email", "Phone", "Status", "Owner", "Created", "Partner",
                "Partner Path", "Level"
            ]
        );
    }
}
