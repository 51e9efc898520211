//! Tree projection consumed by hierarchy widgets.

use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{DealMetrics, aggregate},
    model::{PartnerNode, RecordKind},
};

/// A partner as rendered in a tree widget, with its roll-up counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub partner_path: String,
    pub partner_level: usize,
    pub direct_records: usize,
    pub total_records: usize,
    pub total_nodes: usize,
    pub deals: DealMetrics,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Ids of this node and all descendants, pre-order.
    pub fn ids(&self) -> Vec<&str> {
        let mut out = vec![self.id.as_str()];
        for child in &self.children {
            out.extend(child.ids());
        }
        out
    }
}

/// Mirrors the forest with counts for records of `kind`. Only fetched data
/// is shown; optimistic rows never appear here.
pub fn tree_view(forest: &[PartnerNode], kind: RecordKind, separator: &str) -> Vec<TreeNode> {
    let agg = aggregate(forest, kind);

    fn build<'a>(
        node: &'a PartnerNode,
        agg: &crate::aggregate::Aggregate,
        separator: &str,
        ancestors: &mut Vec<&'a str>,
    ) -> TreeNode {
        let metrics = agg.per_node.get(&node.id).cloned().unwrap_or_default();
        let partner_path = ancestors.join(separator);
        let partner_level = ancestors.len();

        ancestors.push(&node.name);
        let children = node
            .children
            .iter()
            .map(|child| build(child, agg, separator, ancestors))
            .collect();
        ancestors.pop();

        TreeNode {
            id: node.id.clone(),
            name: node.name.clone(),
            partner_path,
            partner_level,
            direct_records: metrics.direct_records,
            total_records: metrics.total_records,
            total_nodes: metrics.total_nodes,
            deals: metrics.deals,
            children,
        }
    }

    let mut ancestors = Vec::new();
    forest
        .iter()
        .map(|root| build(root, &agg, separator, &mut ancestors))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;

    #[test]
    fn tree_mirrors_forest_with_roll_ups() {
        let forest = vec![
            PartnerNode::new("a", "Alice")
                .with_record(Record::new(RecordKind::Contact, "c1", "One"))
                .with_child(
                    PartnerNode::new("b", "Bob")
                        .with_record(Record::new(RecordKind::Contact, "c2", "Two")),
                ),
        ];

        let tree = tree_view(&forest, RecordKind::Contact, " > ");
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].direct_records, 1);
        assert_eq!(tree[0].total_records, 2);
        assert_eq!(tree[0].total_nodes, 2);
        assert_eq!(tree[0].children[0].partner_path, "Alice");
        assert_eq!(tree[0].ids(), vec!["a", "b"]);
    }
}
