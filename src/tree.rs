//! Nested view of the flat category table.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::errors::ApiError;
use crate::models::{Category, CategoryId};
use crate::store::CategoryStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryNode {
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Builds the category forest from rows in any order.
///
/// The first pass indexes every row and groups children by parent; the
/// second links nodes starting from the roots. Roots and siblings keep their
/// input order. Rows that no root reaches (a dangling parent id or a cycle)
/// are left out.
pub fn materialize(categories: &[Category]) -> Vec<CategoryNode> {
    let known: HashSet<CategoryId> = categories.iter().map(|c| c.id).collect();
    let mut children: HashMap<CategoryId, Vec<&Category>> = HashMap::new();
    let mut roots = Vec::new();
    for category in categories {
        match category.parent_id {
            None => roots.push(category),
            Some(parent_id) => children.entry(parent_id).or_default().push(category),
        }
    }

    let mut placed = HashSet::new();
    let forest: Vec<CategoryNode> = roots
        .into_iter()
        .filter_map(|root| build(root, &children, &mut placed))
        .collect();

    if placed.len() < known.len() {
        let skipped: Vec<CategoryId> =
            categories.iter().map(|c| c.id).filter(|id| !placed.contains(id)).collect();
        log::warn!("categories not reachable from a root: {:?}", skipped);
    }
    forest
}

fn build(
    category: &Category,
    children: &HashMap<CategoryId, Vec<&Category>>,
    placed: &mut HashSet<CategoryId>,
) -> Option<CategoryNode> {
    if !placed.insert(category.id) {
        return None;
    }
    let nodes: Vec<CategoryNode> = children
        .get(&category.id)
        .map(|kids| kids.iter().filter_map(|kid| build(kid, children, placed)).collect())
        .unwrap_or_default();
    Some(CategoryNode { category: category.clone(), children: nodes })
}

/// Loads every category and materializes the forest.
pub async fn category_tree<S: CategoryStore + ?Sized>(
    store: &S,
) -> Result<Vec<CategoryNode>, ApiError> {
    let categories = store.all_categories().await?;
    Ok(materialize(&categories))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: CategoryId, parent_id: Option<CategoryId>) -> Category {
        Category { id, name: format!("Category {id}"), parent_id }
    }

    /// Parent/child pairs with children sorted, for comparing trees while
    /// ignoring sibling order.
    fn edges(forest: &[CategoryNode]) -> Vec<(Option<CategoryId>, CategoryId)> {
        fn walk(
            node: &CategoryNode,
            parent: Option<CategoryId>,
            out: &mut Vec<(Option<CategoryId>, CategoryId)>,
        ) {
            out.push((parent, node.category.id));
            for child in &node.children {
                walk(child, Some(node.category.id), out);
            }
        }
        let mut out = Vec::new();
        for root in forest {
            walk(root, None, &mut out);
        }
        out.sort();
        out
    }

    fn sample() -> Vec<Category> {
        vec![
            category(1, None),
            category(2, Some(1)),
            category(3, Some(2)),
            category(4, Some(1)),
            category(5, None),
            category(6, Some(5)),
            category(7, Some(6)),
            category(8, Some(2)),
        ]
    }

    #[test]
    fn nests_three_levels() {
        let forest = materialize(&sample());
        assert_eq!(forest.len(), 2);
        let first = &forest[0];
        assert_eq!(first.category.id, 1);
        assert_eq!(
            first.children.iter().map(|n| n.category.id).collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert_eq!(
            first.children[0].children.iter().map(|n| n.category.id).collect::<Vec<_>>(),
            vec![3, 8]
        );
        assert_eq!(forest[1].children[0].children[0].category.id, 7);
    }

    #[test]
    fn grandchild_before_its_parent() {
        let rows = vec![category(3, Some(2)), category(2, Some(1)), category(1, None)];
        let forest = materialize(&rows);
        assert_eq!(edges(&forest), vec![(None, 1), (Some(1), 2), (Some(2), 3)]);
    }

    #[test]
    fn every_rotation_and_reversal_gives_the_same_tree() {
        let rows = sample();
        let expected = edges(&materialize(&rows));
        for shift in 0..rows.len() {
            let mut rotated = rows.clone();
            rotated.rotate_left(shift);
            assert_eq!(edges(&materialize(&rotated)), expected, "rotation {shift}");
            rotated.reverse();
            assert_eq!(edges(&materialize(&rotated)), expected, "reversed rotation {shift}");
        }
    }

    #[test]
    fn siblings_keep_input_order() {
        let rows = vec![category(1, None), category(9, Some(1)), category(4, Some(1))];
        let forest = materialize(&rows);
        assert_eq!(
            forest[0].children.iter().map(|n| n.category.id).collect::<Vec<_>>(),
            vec![9, 4]
        );
    }

    #[test]
    fn unreachable_rows_are_skipped() {
        let rows = vec![
            category(1, None),
            category(2, Some(42)),
            category(3, Some(4)),
            category(4, Some(3)),
        ];
        let forest = materialize(&rows);
        assert_eq!(edges(&forest), vec![(None, 1)]);
    }

    #[test]
    fn empty_input() {
        assert!(materialize(&[]).is_empty());
    }
}
