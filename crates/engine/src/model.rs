//! Hierarchy model: partners, their sub-partners and the records attached to
//! each level.
//!
//! A snapshot is a forest of [`PartnerNode`] values. Each node owns its
//! children and the records directly attached to it; a record belongs to
//! exactly one node. The owner reference on a record is a weak link to a
//! partner id and does not imply nesting.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::Money;

/// Kind of record attached to a partner node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Lead,
    Contact,
    Deal,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Lead, RecordKind::Contact, RecordKind::Deal];

    /// Canonical lowercase name, used in routes and file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Contact => "contact",
            Self::Deal => "deal",
        }
    }

    #[must_use]
    pub const fn plural_label(self) -> &'static str {
        match self {
            Self::Lead => "Leads",
            Self::Contact => "Contacts",
            Self::Deal => "Deals",
        }
    }
}

impl core::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RecordKind {
    type Error = crate::EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lead" | "leads" => Ok(Self::Lead),
            "contact" | "contacts" => Ok(Self::Contact),
            "deal" | "deals" => Ok(Self::Deal),
            other => Err(crate::EngineError::InvalidField(format!(
                "unknown record kind: {other}"
            ))),
        }
    }
}

/// Weak reference to the partner that owns a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub id: String,
    pub name: String,
}

/// Shared capability set of leads, contacts and deals.
pub trait Tracked {
    fn status(&self) -> &str;
    fn owner(&self) -> Option<&OwnerRef>;
    fn created_time(&self) -> Option<DateTime<Utc>>;
}

/// A single stage change in a deal pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub stage: String,
    pub changed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub name: String,
    pub stage: String,
    pub stage_history: Vec<StageTransition>,
    pub expected_revenue: Money,
    pub closing_date: Option<NaiveDate>,
    pub created_time: Option<DateTime<Utc>>,
    pub owner: Option<OwnerRef>,
}

impl Deal {
    /// `true` when the deal sits in a won stage (`Closed Won`, `Won`, ...).
    #[must_use]
    pub fn is_won(&self) -> bool {
        crate::status::is_won_stage(&self.stage)
    }

    /// `true` when the deal sits in a lost stage.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        crate::status::is_lost_stage(&self.stage)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.is_won() && !self.is_lost()
    }
}

impl Tracked for Deal {
    fn status(&self) -> &str {
        &self.stage
    }

    fn owner(&self) -> Option<&OwnerRef> {
        self.owner.as_ref()
    }

    fn created_time(&self) -> Option<DateTime<Utc>> {
        self.created_time
    }
}

/// A lead or contact. Contacts may carry deals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub kind: RecordKind,
    pub name: String,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub status: String,
    pub owner: Option<OwnerRef>,
    pub created_time: Option<DateTime<Utc>>,
    pub deals: Vec<Deal>,
}

impl Record {
    /// Builds a record with only the identity fields set.
    pub fn new(kind: RecordKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            phone_number: None,
            email: None,
            status: String::new(),
            owner: None,
            created_time: None,
            deals: Vec::new(),
        }
    }

    #[must_use]
    pub fn has_deals(&self) -> bool {
        !self.deals.is_empty()
    }
}

impl Tracked for Record {
    fn status(&self) -> &str {
        &self.status
    }

    fn owner(&self) -> Option<&OwnerRef> {
        self.owner.as_ref()
    }

    fn created_time(&self) -> Option<DateTime<Utc>> {
        self.created_time
    }
}

/// A deal seen as a flat record (stage becomes status).
impl From<&Deal> for Record {
    fn from(deal: &Deal) -> Self {
        Self {
            id: deal.id.clone(),
            kind: RecordKind::Deal,
            name: deal.name.clone(),
            phone_number: None,
            email: None,
            status: deal.stage.clone(),
            owner: deal.owner.clone(),
            created_time: deal.created_time,
            deals: Vec::new(),
        }
    }
}

/// Records directly owned by a node (not by its descendants).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachedRecords {
    pub leads: Vec<Record>,
    pub contacts: Vec<Record>,
    pub deals: Vec<Deal>,
}

impl AttachedRecords {
    /// Records of `kind` attached to the node, in backend order.
    ///
    /// Deals are projected to records on the fly.
    pub fn get(&self, kind: RecordKind) -> Vec<Record> {
        match kind {
            RecordKind::Lead => self.leads.clone(),
            RecordKind::Contact => self.contacts.clone(),
            RecordKind::Deal => self.deals.iter().map(Record::from).collect(),
        }
    }

    #[must_use]
    pub fn count(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Lead => self.leads.len(),
            RecordKind::Contact => self.contacts.len(),
            RecordKind::Deal => self.deals.len(),
        }
    }

    pub fn push(&mut self, record: Record) {
        match record.kind {
            RecordKind::Lead => self.leads.push(record),
            RecordKind::Contact => self.contacts.push(record),
            RecordKind::Deal => self.deals.push(Deal {
                id: record.id,
                name: record.name,
                stage: record.status,
                stage_history: Vec::new(),
                expected_revenue: Money::ZERO,
                closing_date: None,
                created_time: record.created_time,
                owner: record.owner,
            }),
        }
    }

    /// All deals reachable from this node's own records: node-level deals
    /// followed by the deals of each attached contact.
    pub fn all_deals(&self) -> impl Iterator<Item = &Deal> {
        self.deals
            .iter()
            .chain(self.contacts.iter().flat_map(|contact| contact.deals.iter()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartnerNode {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub children: Vec<PartnerNode>,
    pub records: AttachedRecords,
}

impl PartnerNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            phone_number: None,
            children: Vec::new(),
            records: AttachedRecords::default(),
        }
    }

    /// Builder-style helper to attach a child node.
    #[must_use]
    pub fn with_child(mut self, child: PartnerNode) -> Self {
        self.children.push(child);
        self
    }

    /// Builder-style helper to attach a record.
    #[must_use]
    pub fn with_record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    /// Number of nodes in this subtree, including `self`.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PartnerNode::node_count).sum::<usize>()
    }

    /// Number of records of `kind` in this subtree.
    #[must_use]
    pub fn record_count(&self, kind: RecordKind) -> usize {
        self.records.count(kind)
            + self
                .children
                .iter()
                .map(|child| child.record_count(kind))
                .sum::<usize>()
    }
}

/// Total node count of a forest.
#[must_use]
pub fn node_count(forest: &[PartnerNode]) -> usize {
    forest.iter().map(PartnerNode::node_count).sum()
}

/// Total record count of `kind` across a forest.
#[must_use]
pub fn record_count(forest: &[PartnerNode], kind: RecordKind) -> usize {
    forest.iter().map(|root| root.record_count(kind)).sum()
}

/// Finds a node and returns its subtree as a single-root forest, together
/// with the names of its strict ancestors (root first).
pub fn subtree(forest: &[PartnerNode], id: &str) -> Option<(Vec<String>, PartnerNode)> {
    fn walk(
        node: &PartnerNode,
        id: &str,
        ancestors: &mut Vec<String>,
    ) -> Option<(Vec<String>, PartnerNode)> {
        if node.id == id {
            return Some((ancestors.clone(), node.clone()));
        }
        ancestors.push(node.name.clone());
        for child in &node.children {
            if let Some(found) = walk(child, id, ancestors) {
                return Some(found);
            }
        }
        ancestors.pop();
        None
    }

    let mut ancestors = Vec::new();
    forest.iter().find_map(|root| walk(root, id, &mut ancestors))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(id: &str) -> Record {
        Record::new(RecordKind::Lead, id, id)
    }

    #[test]
    fn counts_walk_the_whole_subtree() {
        let root = PartnerNode::new("a", "Alice")
            .with_record(lead("l1"))
            .with_child(
                PartnerNode::new("b", "Bob")
                    .with_record(lead("l2"))
                    .with_child(PartnerNode::new("c", "Carol").with_record(lead("l3"))),
            );

        assert_eq!(root.node_count(), 3);
        assert_eq!(root.record_count(RecordKind::Lead), 3);
        assert_eq!(root.record_count(RecordKind::Contact), 0);
    }

    #[test]
    fn subtree_reports_strict_ancestors() {
        let forest = vec![PartnerNode::new("a", "Alice").with_child(
            PartnerNode::new("b", "Bob").with_child(PartnerNode::new("c", "Carol")),
        )];

        let (ancestors, node) = subtree(&forest, "c").unwrap();
        assert_eq!(ancestors, vec!["Alice".to_string(), "Bob".to_string()]);
        assert_eq!(node.name, "Carol");
        assert!(subtree(&forest, "missing").is_none());
    }

    #[test]
    fn record_kind_parses_singular_and_plural() {
        assert_eq!(RecordKind::try_from("Leads").unwrap(), RecordKind::Lead);
        assert_eq!(RecordKind::try_from("contact").unwrap(), RecordKind::Contact);
        assert!(RecordKind::try_from("partner").is_err());
    }
}
