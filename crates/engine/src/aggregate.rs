//! Roll-up statistics over a partner forest.
//!
//! Every metric here is a monoid: a subtree's value is its own contribution
//! combined with its children's values, so child order never matters.
//! Rates are guarded and are `0` whenever their denominator is `0`.

use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
    iter::Sum,
    ops::Add,
};

use serde::{Deserialize, Serialize};

use crate::{
    Money,
    model::{Deal, PartnerNode, Record, RecordKind, Tracked},
};

/// Status key used when a record carries no status at all.
pub const UNSPECIFIED_STATUS: &str = "Unspecified";

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Deal counts and values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealMetrics {
    pub deal_count: usize,
    pub won_count: usize,
    pub lost_count: usize,
    pub open_count: usize,
    pub total_value: Money,
    pub won_value: Money,
}

impl DealMetrics {
    /// Metrics of a single deal.
    #[must_use]
    pub fn of(deal: &Deal) -> Self {
        let won = deal.is_won();
        let lost = deal.is_lost();
        Self {
            deal_count: 1,
            won_count: usize::from(won),
            lost_count: usize::from(lost),
            open_count: usize::from(!won && !lost),
            total_value: deal.expected_revenue,
            won_value: if won { deal.expected_revenue } else { Money::ZERO },
        }
    }

    /// `total_value / deal_count`, or `0` without deals.
    #[must_use]
    pub fn average_value(&self) -> Money {
        self.total_value.average(self.deal_count)
    }

    /// Percentage of won deals, or `0` without deals.
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        percent(self.won_count, self.deal_count)
    }
}

impl Add for DealMetrics {
    type Output = DealMetrics;

    fn add(self, rhs: DealMetrics) -> Self::Output {
        DealMetrics {
            deal_count: self.deal_count + rhs.deal_count,
            won_count: self.won_count + rhs.won_count,
            lost_count: self.lost_count + rhs.lost_count,
            open_count: self.open_count + rhs.open_count,
            total_value: self.total_value + rhs.total_value,
            won_value: self.won_value + rhs.won_value,
        }
    }
}

impl Sum for DealMetrics {
    fn sum<I: Iterator<Item = DealMetrics>>(iter: I) -> Self {
        iter.fold(DealMetrics::default(), Add::add)
    }
}

impl<'a> Sum<&'a Deal> for DealMetrics {
    fn sum<I: Iterator<Item = &'a Deal>>(iter: I) -> Self {
        iter.map(DealMetrics::of).sum()
    }
}

/// Contacts converted into at least one deal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStats {
    pub total_contacts: usize,
    pub converted: usize,
}

impl ConversionStats {
    pub fn of<'a>(contacts: impl IntoIterator<Item = &'a Record>) -> Self {
        contacts
            .into_iter()
            .fold(ConversionStats::default(), |acc, contact| ConversionStats {
                total_contacts: acc.total_contacts + 1,
                converted: acc.converted + usize::from(contact.has_deals()),
            })
    }

    /// `converted / total_contacts * 100`, or `0` without contacts.
    #[must_use]
    pub fn rate(&self) -> f64 {
        percent(self.converted, self.total_contacts)
    }
}

impl Add for ConversionStats {
    type Output = ConversionStats;

    fn add(self, rhs: ConversionStats) -> Self::Output {
        ConversionStats {
            total_contacts: self.total_contacts + rhs.total_contacts,
            converted: self.converted + rhs.converted,
        }
    }
}

/// Metrics of one node: its own contribution plus its whole subtree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    pub direct_records: usize,
    pub total_records: usize,
    /// Nodes in the subtree, the node itself included.
    pub total_nodes: usize,
    pub direct_deals: DealMetrics,
    pub deals: DealMetrics,
    pub conversion: ConversionStats,
}

/// Whole-forest aggregate for one record kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub kind: Option<RecordKind>,
    pub total_records: usize,
    pub total_nodes: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Counts by the record's owner reference, independent of nesting.
    pub by_owner: BTreeMap<String, usize>,
    pub per_node: HashMap<String, NodeMetrics>,
    pub deals: DealMetrics,
    pub conversion: ConversionStats,
}

/// Aggregates the records of `kind` over the forest.
///
/// Counts follow nesting position: a record counts for the node it is
/// attached to and for every ancestor of that node.
pub fn aggregate(forest: &[PartnerNode], kind: RecordKind) -> Aggregate {
    let mut out = Aggregate {
        kind: Some(kind),
        ..Aggregate::default()
    };

    for root in forest {
        let metrics = roll_up(root, kind, &mut out);
        out.total_records += metrics.total_records;
        out.total_nodes += metrics.total_nodes;
        out.deals = out.deals + metrics.deals;
        out.conversion = out.conversion + metrics.conversion;
    }
    out
}

fn roll_up(node: &PartnerNode, kind: RecordKind, out: &mut Aggregate) -> NodeMetrics {
    let own = node.records.get(kind);
    for record in &own {
        let status = record.status().trim();
        let status = if status.is_empty() { UNSPECIFIED_STATUS } else { status };
        *out.by_status.entry(status.to_string()).or_default() += 1;
        if let Some(owner) = record.owner() {
            *out.by_owner.entry(owner.id.clone()).or_default() += 1;
        }
    }

    let direct_deals: DealMetrics = node.records.all_deals().sum();
    let mut metrics = NodeMetrics {
        direct_records: own.len(),
        total_records: own.len(),
        total_nodes: 1,
        direct_deals,
        deals: direct_deals,
        conversion: ConversionStats::of(&node.records.contacts),
    };

    for child in &node.children {
        let child_metrics = roll_up(child, kind, out);
        metrics.total_records += child_metrics.total_records;
        metrics.total_nodes += child_metrics.total_nodes;
        metrics.deals = metrics.deals + child_metrics.deals;
        metrics.conversion = metrics.conversion + child_metrics.conversion;
    }

    out.per_node.insert(node.id.clone(), metrics.clone());
    metrics
}

/// Groups items by a caller-supplied key. Items whose key is `None` are
/// dropped; keys without items never appear.
pub fn bucket_by<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> HashMap<K, Vec<T>>
where
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    let mut buckets: HashMap<K, Vec<T>> = HashMap::new();
    for item in items {
        if let Some(k) = key(&item) {
            buckets.entry(k).or_default().push(item);
        }
    }
    buckets
}

/// Counting variant of [`bucket_by`].
pub fn count_by<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> HashMap<K, usize>
where
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    bucket_by(items, key)
        .into_iter()
        .map(|(k, v)| (k, v.len()))
        .collect()
}

/// Every deal in the forest: node-level deals and contact deals, pre-order.
pub fn all_deals(forest: &[PartnerNode]) -> Vec<&Deal> {
    fn walk<'a>(node: &'a PartnerNode, out: &mut Vec<&'a Deal>) {
        out.extend(node.records.all_deals());
        for child in &node.children {
            walk(child, out);
        }
    }

    let mut out = Vec::new();
    for root in forest {
        walk(root, &mut out);
    }
    out
}

/// Every record of `kind` in the forest, pre-order.
pub fn all_records(forest: &[PartnerNode], kind: RecordKind) -> Vec<Record> {
    fn walk(node: &PartnerNode, kind: RecordKind, out: &mut Vec<Record>) {
        out.extend(node.records.get(kind));
        for child in &node.children {
            walk(child, kind, out);
        }
    }

    let mut out = Vec::new();
    for root in forest {
        walk(root, kind, &mut out);
    }
    out
}
