//! In-memory view of the category tree, rebuilt per request from a full
//! snapshot of the `categories` table.
//!
//! The forest is stored as a flat id-keyed map with children held as id
//! lists, so traversal never relies on owned recursive structures or
//! unbounded call-stack recursion. All mutation checks (cycle guard,
//! removal planning) run against a snapshot taken inside the same
//! transaction as the write.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use uuid::Uuid;

use crate::features::categories::models::Category;

/// Integrity failures met while walking parent chains. These mean the
/// stored data already violated the acyclicity invariant; they are never
/// produced by well-formed snapshots.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("parent chain revisited category {0}")]
    CycleDetected(Uuid),

    #[error("parent chain ascent from {0} exceeded {1} hops")]
    AscentBoundExceeded(Uuid, usize),
}

#[derive(Debug)]
struct ForestNode {
    record: Category,
    /// The edge the builder actually attached. `None` for true roots and
    /// for synthetic roots whose stored parent could not be attached.
    attached_parent: Option<Uuid>,
    children: Vec<Uuid>,
}

/// What a category removal does to the rest of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalPlan {
    /// Parent the direct children are moved to; `None` promotes them to roots.
    pub new_parent_id: Option<Uuid>,
    pub child_ids: Vec<Uuid>,
}

/// Outcome of a deletion pre-check. A blocked deletion is a normal
/// decision, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionCheck {
    pub allowed: bool,
    pub blocking_products: i64,
    pub reason: Option<String>,
}

/// Flat category rows assembled into an ordered forest.
#[derive(Debug)]
pub struct CategoryForest {
    nodes: HashMap<Uuid, ForestNode>,
    roots: Vec<Uuid>,
    dangling: Vec<Uuid>,
}

impl CategoryForest {
    /// Build the forest from an unordered snapshot.
    ///
    /// Every input record appears in the forest exactly once. A record
    /// whose stored `parent_id` is absent from the snapshot (or names the
    /// record itself) is kept as a synthetic root instead of being
    /// dropped; its id is also listed in [`dangling_ids`](Self::dangling_ids).
    /// Sibling order is `(sort_order, name, id)`, so output is
    /// deterministic for any input order.
    pub fn from_records(records: Vec<Category>) -> Self {
        let mut nodes: HashMap<Uuid, ForestNode> = HashMap::with_capacity(records.len());
        for record in records {
            nodes.insert(
                record.id,
                ForestNode {
                    record,
                    attached_parent: None,
                    children: Vec::new(),
                },
            );
        }

        let ids: Vec<Uuid> = nodes.keys().copied().collect();
        let mut roots = Vec::new();
        let mut dangling = Vec::new();

        for id in &ids {
            let stored_parent = match nodes.get(id) {
                Some(node) => node.record.parent_id,
                None => continue,
            };
            match stored_parent {
                None => roots.push(*id),
                Some(parent_id) if parent_id == *id || !nodes.contains_key(&parent_id) => {
                    // Unattachable: the stored parent is missing from the
                    // snapshot or is the record itself. Keep the record
                    // visible as a synthetic root.
                    dangling.push(*id);
                    roots.push(*id);
                }
                Some(parent_id) => {
                    if let Some(parent) = nodes.get_mut(&parent_id) {
                        parent.children.push(*id);
                    }
                    if let Some(node) = nodes.get_mut(id) {
                        node.attached_parent = Some(parent_id);
                    }
                }
            }
        }

        let order: HashMap<Uuid, (i32, String)> = nodes
            .values()
            .map(|n| (n.record.id, (n.record.sort_order, n.record.name.clone())))
            .collect();
        let sort_key = |id: &Uuid| match order.get(id) {
            Some((sort_order, name)) => (*sort_order, name.clone(), *id),
            None => (i32::MAX, String::new(), *id),
        };

        roots.sort_by_key(sort_key);
        dangling.sort_by_key(sort_key);
        for node in nodes.values_mut() {
            node.children.sort_by_key(sort_key);
        }

        Self {
            nodes,
            roots,
            dangling,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Category> {
        self.nodes.get(&id).map(|n| &n.record)
    }

    /// Direct children in display order. Empty for unknown ids.
    pub fn children_of(&self, id: Uuid) -> &[Uuid] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Root ids in display order, synthetic roots included.
    pub fn root_ids(&self) -> &[Uuid] {
        &self.roots
    }

    /// Ids kept as synthetic roots because their stored parent could not
    /// be attached.
    pub fn dangling_ids(&self) -> &[Uuid] {
        &self.dangling
    }

    /// The parent edge the builder attached, if any. Differs from the
    /// stored `parent_id` only for synthetic roots.
    pub fn attached_parent(&self, id: Uuid) -> Option<Uuid> {
        self.nodes.get(&id).and_then(|n| n.attached_parent)
    }

    /// Would setting `proposed_parent_id` as the parent of `category_id`
    /// close a cycle?
    ///
    /// Ascends the stored parent chain from the proposed parent; meeting
    /// `category_id` on the way up means the move is circular. Clearing
    /// the parent can never create a cycle. The ascent is bounded by the
    /// snapshot size; exceeding the bound means the stored chain was
    /// already cyclic before this call.
    pub fn would_create_cycle(
        &self,
        category_id: Uuid,
        proposed_parent_id: Option<Uuid>,
    ) -> Result<bool, HierarchyError> {
        let Some(start) = proposed_parent_id else {
            return Ok(false);
        };

        let bound = self.nodes.len();
        let mut current = start;
        let mut hops = 0usize;

        loop {
            if current == category_id {
                return Ok(true);
            }
            // A parent outside the snapshot ends the ascent like a root does.
            let Some(node) = self.nodes.get(&current) else {
                return Ok(false);
            };
            match node.record.parent_id {
                Some(parent_id) => {
                    hops += 1;
                    if hops > bound {
                        return Err(HierarchyError::AscentBoundExceeded(start, bound));
                    }
                    current = parent_id;
                }
                None => return Ok(false),
            }
        }
    }

    /// Breadcrumb path from the root down to `category_id` inclusive.
    ///
    /// Walks attached edges, so a synthetic root is the first (and only
    /// ancestral) element of its own path. An unknown id yields an empty
    /// path. A revisited id is reported as a data-integrity violation
    /// rather than looping.
    pub fn path_to(&self, category_id: Uuid) -> Result<Vec<&Category>, HierarchyError> {
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current = category_id;

        while let Some(node) = self.nodes.get(&current) {
            if !visited.insert(current) {
                return Err(HierarchyError::CycleDetected(current));
            }
            path.push(&node.record);
            match node.attached_parent {
                Some(parent_id) => current = parent_id,
                None => break,
            }
        }

        path.reverse();
        Ok(path)
    }

    /// Ids of `category_id` and all its descendants, deduplicated, in
    /// pre-order. Empty for unknown ids.
    pub fn subtree_ids(&self, category_id: Uuid) -> Vec<Uuid> {
        if !self.nodes.contains_key(&category_id) {
            return Vec::new();
        }

        let mut ids = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![category_id];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            ids.push(id);
            if let Some(node) = self.nodes.get(&id) {
                // Reversed push keeps pop order equal to display order.
                for child in node.children.iter().rev() {
                    stack.push(*child);
                }
            }
        }

        ids
    }

    /// Reparenting required to remove `category_id`: its direct children
    /// move to its own attached parent (root promotion when it has none).
    /// `None` for unknown ids.
    pub fn plan_removal(&self, category_id: Uuid) -> Option<RemovalPlan> {
        let node = self.nodes.get(&category_id)?;
        Some(RemovalPlan {
            new_parent_id: node.attached_parent,
            child_ids: node.children.clone(),
        })
    }
}

/// Deletion is blocked only by directly-assigned active products.
/// Children never block; they are reparented by the removal plan.
pub fn deletion_check(active_products: i64) -> DeletionCheck {
    if active_products > 0 {
        DeletionCheck {
            allowed: false,
            blocking_products: active_products,
            reason: Some(format!(
                "Category has {} active product(s) directly assigned; move or archive them first",
                active_products
            )),
        }
    } else {
        DeletionCheck {
            allowed: true,
            blocking_products: 0,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::{category, category_with_order};
    use fake::faker::lorem::en::Word;
    use fake::Fake;

    /// Electronics > Phones > Smartphones, plus a root-level Shoes.
    fn catalog() -> (Category, Category, Category, Category) {
        let electronics = category("Electronics", None);
        let phones = category("Phones", Some(electronics.id));
        let smartphones = category("Smartphones", Some(phones.id));
        let shoes = category("Shoes", None);
        (electronics, phones, smartphones, shoes)
    }

    fn forest_of(records: &[&Category]) -> CategoryForest {
        CategoryForest::from_records(records.iter().map(|c| (*c).clone()).collect())
    }

    #[test]
    fn test_build_preserves_every_record_once() {
        let (electronics, phones, smartphones, shoes) = catalog();
        let forest = forest_of(&[&smartphones, &shoes, &electronics, &phones]);

        assert_eq!(forest.len(), 4);
        assert_eq!(forest.root_ids(), &[electronics.id, shoes.id]);
        assert_eq!(forest.children_of(electronics.id), &[phones.id]);
        assert_eq!(forest.children_of(phones.id), &[smartphones.id]);
        assert!(forest.children_of(smartphones.id).is_empty());
        assert!(forest.dangling_ids().is_empty());

        // Walking down from the roots reaches every input record exactly once.
        let reached: usize = forest
            .root_ids()
            .iter()
            .map(|root| forest.subtree_ids(*root).len())
            .sum();
        assert_eq!(reached, 4);
    }

    #[test]
    fn test_children_sorted_by_sort_order_then_name() {
        let root = category("Catalog", None);
        let late = category_with_order("Accessories", Some(root.id), 2);
        let second = category_with_order("Zoom Lenses", Some(root.id), 1);
        let first = category_with_order("Audio", Some(root.id), 1);
        let forest = forest_of(&[&root, &late, &second, &first]);

        assert_eq!(
            forest.children_of(root.id),
            &[first.id, second.id, late.id]
        );
    }

    #[test]
    fn test_dangling_parent_becomes_synthetic_root() {
        let (electronics, phones, smartphones, _) = catalog();
        let orphan = category("Orphan", Some(Uuid::new_v4()));
        let forest = forest_of(&[&electronics, &phones, &smartphones, &orphan]);

        assert_eq!(forest.len(), 4);
        assert!(forest.root_ids().contains(&orphan.id));
        assert_eq!(forest.dangling_ids(), &[orphan.id]);
        assert!(forest.attached_parent(orphan.id).is_none());
        // The stored pointer survives untouched.
        assert!(forest.get(orphan.id).is_some_and(|c| c.parent_id.is_some()));
    }

    #[test]
    fn test_self_referencing_row_kept_as_synthetic_root() {
        let mut knot = category("Knot", None);
        knot.parent_id = Some(knot.id);
        let other = category("Other", None);
        let forest = forest_of(&[&knot, &other]);

        assert!(forest.root_ids().contains(&knot.id));
        assert_eq!(forest.dangling_ids(), &[knot.id]);
        assert!(forest.children_of(knot.id).is_empty());
        // The breadcrumb of a synthetic root is just itself.
        let path = forest.path_to(knot.id).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].id, knot.id);
    }

    #[test]
    fn test_would_create_cycle_self_parent() {
        let (electronics, phones, smartphones, shoes) = catalog();
        let forest = forest_of(&[&electronics, &phones, &smartphones, &shoes]);

        for id in [electronics.id, phones.id, smartphones.id, shoes.id] {
            assert_eq!(forest.would_create_cycle(id, Some(id)), Ok(true));
        }
    }

    #[test]
    fn test_would_create_cycle_descendant_parent() {
        let (electronics, phones, smartphones, _) = catalog();
        let forest = forest_of(&[&electronics, &phones, &smartphones]);

        // Moving Electronics under anything in its own subtree is circular.
        assert_eq!(
            forest.would_create_cycle(electronics.id, Some(smartphones.id)),
            Ok(true)
        );
        assert_eq!(
            forest.would_create_cycle(electronics.id, Some(phones.id)),
            Ok(true)
        );
        assert_eq!(
            forest.would_create_cycle(phones.id, Some(smartphones.id)),
            Ok(true)
        );
    }

    #[test]
    fn test_would_create_cycle_legal_moves() {
        let (electronics, phones, smartphones, shoes) = catalog();
        let forest = forest_of(&[&electronics, &phones, &smartphones, &shoes]);

        // Unrelated subtree, moving up the chain, and clearing the parent
        // are all legal.
        assert_eq!(
            forest.would_create_cycle(phones.id, Some(shoes.id)),
            Ok(false)
        );
        assert_eq!(
            forest.would_create_cycle(smartphones.id, Some(electronics.id)),
            Ok(false)
        );
        assert_eq!(forest.would_create_cycle(phones.id, None), Ok(false));
    }

    #[test]
    fn test_would_create_cycle_bound_exceeded_on_corrupt_chain() {
        let mut first = category("First", None);
        let mut second = category("Second", None);
        first.parent_id = Some(second.id);
        second.parent_id = Some(first.id);
        let bystander = category("Bystander", None);
        let forest = forest_of(&[&first, &second, &bystander]);

        let result = forest.would_create_cycle(bystander.id, Some(first.id));
        assert_eq!(
            result,
            Err(HierarchyError::AscentBoundExceeded(first.id, 3))
        );
    }

    #[test]
    fn test_path_length_is_depth_plus_one() {
        let (electronics, phones, smartphones, _) = catalog();
        let forest = forest_of(&[&electronics, &phones, &smartphones]);

        let path = forest.path_to(smartphones.id).unwrap();
        let ids: Vec<Uuid> = path.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![electronics.id, phones.id, smartphones.id]);

        let root_path = forest.path_to(electronics.id).unwrap();
        assert_eq!(root_path.len(), 1);
        assert_eq!(root_path[0].id, electronics.id);
        assert!(root_path[0].parent_id.is_none());
    }

    #[test]
    fn test_path_for_unknown_id_is_empty() {
        let (electronics, phones, smartphones, _) = catalog();
        let forest = forest_of(&[&electronics, &phones, &smartphones]);

        assert!(forest.path_to(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn test_path_reports_stored_cycle_instead_of_looping() {
        let mut first = category("First", None);
        let mut second = category("Second", None);
        first.parent_id = Some(second.id);
        second.parent_id = Some(first.id);
        let forest = forest_of(&[&first, &second]);

        let result = forest.path_to(first.id);
        assert!(matches!(result, Err(HierarchyError::CycleDetected(_))));
    }

    #[test]
    fn test_subtree_ids_deduped_and_complete() {
        let (electronics, phones, smartphones, shoes) = catalog();
        let forest = forest_of(&[&electronics, &phones, &smartphones, &shoes]);

        assert_eq!(
            forest.subtree_ids(electronics.id),
            vec![electronics.id, phones.id, smartphones.id]
        );
        assert_eq!(
            forest.subtree_ids(phones.id),
            vec![phones.id, smartphones.id]
        );
        assert_eq!(forest.subtree_ids(shoes.id), vec![shoes.id]);
        assert!(forest.subtree_ids(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn test_plan_removal_moves_children_to_grandparent() {
        let (electronics, phones, smartphones, _) = catalog();
        let forest = forest_of(&[&electronics, &phones, &smartphones]);

        let plan = forest.plan_removal(phones.id).unwrap();
        assert_eq!(plan.new_parent_id, Some(electronics.id));
        assert_eq!(plan.child_ids, vec![smartphones.id]);
    }

    #[test]
    fn test_plan_removal_promotes_root_children_to_roots() {
        let (electronics, phones, smartphones, _) = catalog();
        let forest = forest_of(&[&electronics, &phones, &smartphones]);

        let plan = forest.plan_removal(electronics.id).unwrap();
        assert_eq!(plan.new_parent_id, None);
        assert_eq!(plan.child_ids, vec![phones.id]);

        assert!(forest.plan_removal(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_plan_removal_of_synthetic_root_promotes_children() {
        let orphan = category("Orphan", Some(Uuid::new_v4()));
        let child = category("Child", Some(orphan.id));
        let forest = forest_of(&[&orphan, &child]);

        // Children of a synthetic root must not inherit its dangling
        // pointer; they become roots.
        let plan = forest.plan_removal(orphan.id).unwrap();
        assert_eq!(plan.new_parent_id, None);
        assert_eq!(plan.child_ids, vec![child.id]);
    }

    #[test]
    fn test_deletion_check_blocked_only_by_active_products() {
        let blocked = deletion_check(3);
        assert!(!blocked.allowed);
        assert_eq!(blocked.blocking_products, 3);
        assert!(blocked.reason.as_deref().is_some_and(|r| r.contains("3")));

        let clear = deletion_check(0);
        assert!(clear.allowed);
        assert_eq!(clear.blocking_products, 0);
        assert!(clear.reason.is_none());
    }

    #[test]
    fn test_bulk_forest_keeps_every_record() {
        // Random shallow forest: each record is parented to an earlier one
        // or kept as a root.
        let mut records: Vec<Category> = Vec::new();
        for i in 0..50 {
            let word: String = Word().fake();
            let parent_id = if i % 3 == 0 || records.is_empty() {
                None
            } else {
                Some(records[i / 2].id)
            };
            records.push(category_with_order(
                &format!("{}-{}", word, i),
                parent_id,
                (i % 7) as i32,
            ));
        }

        let forest = CategoryForest::from_records(records.clone());
        assert_eq!(forest.len(), 50);
        assert!(forest.dangling_ids().is_empty());

        let reached: usize = forest
            .root_ids()
            .iter()
            .map(|root| forest.subtree_ids(*root).len())
            .sum();
        assert_eq!(reached, 50);

        // No cycle answer may error on a well-formed snapshot.
        for record in &records {
            assert!(forest
                .would_create_cycle(record.id, record.parent_id)
                .is_ok());
        }
    }
}
