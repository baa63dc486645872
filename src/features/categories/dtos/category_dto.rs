use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::features::categories::hierarchy::{CategoryForest, DeletionCheck};
use crate::features::categories::models::Category;
use crate::shared::validation::SLUG_REGEX;

/// Query parameters for listing categories
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListCategoriesQuery {
    /// Search by name or slug (case-insensitive, partial match)
    #[param(example = "shoes")]
    pub search: Option<String>,

    /// Only categories directly under this parent
    pub parent_id: Option<Uuid>,

    /// If true, return the nested tree built from the filtered records.
    /// Default: false (flat list)
    #[serde(default)]
    pub tree: bool,

    /// Attach direct product counts to tree nodes (tree mode only)
    #[serde(default)]
    pub with_counts: bool,
}

/// Query parameters for the product-count endpoint
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ProductCountQuery {
    /// Count across the whole subtree instead of the category alone
    #[serde(default)]
    pub include_descendants: bool,
}

// Create request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryDto {
    #[validate(length(min = 1, max = 120))]
    pub name: String,

    /// Derived from `name` when omitted; collisions then resolve with a
    /// numeric suffix. A supplied duplicate is rejected instead.
    #[validate(
        length(min = 1, max = 100),
        regex(
            path = *SLUG_REGEX,
            message = "slug must be lowercase alphanumeric segments separated by single hyphens"
        )
    )]
    pub slug: Option<String>,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(length(max = 500))]
    pub image_url: Option<String>,

    #[validate(range(min = 0, max = 1_000_000))]
    pub sort_order: Option<i32>,

    pub parent_id: Option<Uuid>,
}

// Update request (partial)
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryDto {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,

    #[validate(
        length(min = 1, max = 100),
        regex(
            path = *SLUG_REGEX,
            message = "slug must be lowercase alphanumeric segments separated by single hyphens"
        )
    )]
    pub slug: Option<String>,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(length(max = 500))]
    pub image_url: Option<String>,

    #[validate(range(min = 0, max = 1_000_000))]
    pub sort_order: Option<i32>,

    /// Tri-state: absent = keep current parent, `null` = make root,
    /// value = move under that category (cycle-checked).
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub parent_id: Option<Option<Uuid>>,
}

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Response DTO for a category record
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponseDto {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Category> for CategoryResponseDto {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            parent_id: c.parent_id,
            name: c.name,
            slug: c.slug,
            description: c.description,
            image_url: c.image_url,
            sort_order: c.sort_order,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Shortened category shape used for parents, children and breadcrumbs
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummaryDto {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

impl From<&Category> for CategorySummaryDto {
    fn from(c: &Category) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            slug: c.slug.clone(),
        }
    }
}

/// Full detail view: the record plus its place in the tree
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDetailDto {
    pub category: CategoryResponseDto,
    pub parent: Option<CategorySummaryDto>,
    pub children: Vec<CategorySummaryDto>,
    /// Breadcrumb from the root down to this category inclusive
    pub path: Vec<CategorySummaryDto>,
    pub direct_product_count: i64,
    pub subtree_product_count: i64,
}

/// Response DTO for category tree (hierarchical structure)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(no_recursion)]
pub struct CategoryTreeDto {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub sort_order: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_count: Option<i64>,
    pub children: Vec<CategoryTreeDto>,
}

impl CategoryTreeDto {
    /// Assemble nested trees from a built forest, optionally attaching
    /// direct product counts. Iterative on purpose: a pre-order walk with
    /// an explicit stack, then a deepest-first assembly pass, so display
    /// depth never touches the call stack.
    pub fn from_forest(
        forest: &CategoryForest,
        counts: Option<&HashMap<Uuid, i64>>,
    ) -> Vec<CategoryTreeDto> {
        let mut order: Vec<Uuid> = Vec::with_capacity(forest.len());
        let mut visited: HashSet<Uuid> = HashSet::with_capacity(forest.len());
        let mut stack: Vec<Uuid> = forest.root_ids().iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            // Reversed push keeps pop order equal to display order.
            for child_id in forest.children_of(id).iter().rev() {
                stack.push(*child_id);
            }
        }

        // Reversed pre-order puts every child before its parent, so each
        // node's children are already built when the node is assembled.
        let mut built: HashMap<Uuid, CategoryTreeDto> = HashMap::with_capacity(order.len());
        for id in order.iter().rev() {
            let Some(record) = forest.get(*id) else { continue };
            let mut children = Vec::new();
            for child_id in forest.children_of(*id) {
                if let Some(child) = built.remove(child_id) {
                    children.push(child);
                }
            }
            built.insert(
                *id,
                CategoryTreeDto {
                    id: record.id,
                    parent_id: record.parent_id,
                    name: record.name.clone(),
                    slug: record.slug.clone(),
                    description: record.description.clone(),
                    image_url: record.image_url.clone(),
                    sort_order: record.sort_order,
                    product_count: counts.map(|m| m.get(&record.id).copied().unwrap_or(0)),
                    children,
                },
            );
        }

        forest
            .root_ids()
            .iter()
            .filter_map(|id| built.remove(id))
            .collect()
    }
}

/// Deletion pre-check result
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletionCheckDto {
    pub allowed: bool,
    pub blocking_products: i64,
    pub reason: Option<String>,
}

impl From<DeletionCheck> for DeletionCheckDto {
    fn from(check: DeletionCheck) -> Self {
        Self {
            allowed: check.allowed,
            blocking_products: check.blocking_products,
            reason: check.reason,
        }
    }
}

/// What a committed deletion did
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCategoryResponseDto {
    pub deleted_id: Uuid,
    pub reparented_child_ids: Vec<Uuid>,
}

/// Product count for one category
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductCountDto {
    pub category_id: Uuid,
    pub include_descendants: bool,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::{category, category_with_order};

    #[test]
    fn test_patch_parent_id_tri_state() {
        let absent: UpdateCategoryDto = serde_json::from_str(r#"{"name":"Audio"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let cleared: UpdateCategoryDto = serde_json::from_str(r#"{"parentId":null}"#).unwrap();
        assert_eq!(cleared.parent_id, Some(None));

        let id = Uuid::new_v4();
        let moved: UpdateCategoryDto =
            serde_json::from_str(&format!(r#"{{"parentId":"{}"}}"#, id)).unwrap();
        assert_eq!(moved.parent_id, Some(Some(id)));
    }

    #[test]
    fn test_create_dto_rejects_bad_slug() {
        let dto: CreateCategoryDto =
            serde_json::from_str(r#"{"name":"Shoes","slug":"Bad Slug"}"#).unwrap();
        assert!(dto.validate().is_err());

        let dto: CreateCategoryDto =
            serde_json::from_str(r#"{"name":"Shoes","slug":"mens-shoes"}"#).unwrap();
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn test_create_dto_rejects_out_of_range_sort_order() {
        let dto: CreateCategoryDto =
            serde_json::from_str(r#"{"name":"Shoes","sortOrder":-1}"#).unwrap();
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_tree_assembly_nests_and_orders_children() {
        let root = category("Electronics", None);
        let second = category_with_order("Phones", Some(root.id), 1);
        let first = category_with_order("Audio", Some(root.id), 0);
        let leaf = category("Smartphones", Some(second.id));
        let forest = CategoryForest::from_records(vec![
            leaf.clone(),
            root.clone(),
            second.clone(),
            first.clone(),
        ]);

        let tree = CategoryTreeDto::from_forest(&forest, None);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, root.id);
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[0].children[0].id, first.id);
        assert_eq!(tree[0].children[1].id, second.id);
        assert_eq!(tree[0].children[1].children[0].id, leaf.id);
        assert!(tree[0].product_count.is_none());
    }

    #[test]
    fn test_tree_assembly_attaches_counts_with_zero_default() {
        let root = category("Electronics", None);
        let child = category("Phones", Some(root.id));
        let forest = CategoryForest::from_records(vec![root.clone(), child.clone()]);

        let counts = HashMap::from([(child.id, 4_i64)]);
        let tree = CategoryTreeDto::from_forest(&forest, Some(&counts));
        assert_eq!(tree[0].product_count, Some(0));
        assert_eq!(tree[0].children[0].product_count, Some(4));
    }

    #[test]
    fn test_tree_assembly_keeps_synthetic_roots() {
        let root = category("Electronics", None);
        let orphan = category("Orphan", Some(Uuid::new_v4()));
        let forest = CategoryForest::from_records(vec![root.clone(), orphan.clone()]);

        let tree = CategoryTreeDto::from_forest(&forest, None);
        let ids: Vec<Uuid> = tree.iter().map(|n| n.id).collect();
        assert!(ids.contains(&root.id));
        assert!(ids.contains(&orphan.id));
    }
}
