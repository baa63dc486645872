use std::collections::HashMap;

use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::categories::hierarchy::CategoryForest;
use crate::features::categories::models::Category;
use crate::features::products::dtos::{ListProductsQuery, ProductResponseDto};
use crate::features::products::models::Product;
use crate::shared::types::PaginationQuery;

/// Active products directly assigned to one category.
///
/// Generic over the executor so mutation paths can run it against their own
/// transaction (the deletion check must see the row-locked state).
pub async fn count_active_in_category<'e, E>(executor: E, category_id: Uuid) -> Result<i64>
where
    E: PgExecutor<'e>,
{
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM products
        WHERE category_id = $1 AND is_active AND deleted_at IS NULL
        "#,
    )
    .bind(category_id)
    .fetch_one(executor)
    .await
    .map_err(AppError::Database)?;

    Ok(count)
}

/// Active products across a set of category ids, in one query. The caller
/// passes a deduplicated subtree id set; an empty set counts nothing.
pub async fn count_active_in_categories<'e, E>(executor: E, category_ids: &[Uuid]) -> Result<i64>
where
    E: PgExecutor<'e>,
{
    if category_ids.is_empty() {
        return Ok(0);
    }

    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM products
        WHERE category_id = ANY($1) AND is_active AND deleted_at IS NULL
        "#,
    )
    .bind(category_ids)
    .fetch_one(executor)
    .await
    .map_err(AppError::Database)?;

    Ok(count)
}

/// Per-category active-product counts for the whole catalog. Categories
/// with no products are absent from the map.
pub async fn counts_by_category<'e, E>(executor: E) -> Result<HashMap<Uuid, i64>>
where
    E: PgExecutor<'e>,
{
    let rows: Vec<(Uuid, i64)> = sqlx::query_as(
        r#"
        SELECT category_id, COUNT(*)
        FROM products
        WHERE category_id IS NOT NULL AND is_active AND deleted_at IS NULL
        GROUP BY category_id
        "#,
    )
    .fetch_all(executor)
    .await
    .map_err(AppError::Database)?;

    Ok(rows.into_iter().collect())
}

/// Service for the public product read surface
pub struct ProductService {
    pool: PgPool,
}

impl ProductService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List active products, paginated. A `category_id` filter can be
    /// widened to the category's whole subtree; the subtree is resolved
    /// against a fresh category snapshot per request.
    pub async fn list(
        &self,
        query: &ListProductsQuery,
        pagination: &PaginationQuery,
    ) -> Result<(Vec<ProductResponseDto>, i64)> {
        let category_ids = match query.category_id {
            Some(category_id) => Some(self.resolve_category_filter(category_id, query).await?),
            None => None,
        };

        let search_pattern = query.search.as_ref().map(|s| format!("%{}%", s));

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM products
            WHERE is_active AND deleted_at IS NULL
              AND ($1::uuid[] IS NULL OR category_id = ANY($1))
              AND ($2::text IS NULL OR name ILIKE $2 OR slug ILIKE $2)
            "#,
        )
        .bind(&category_ids)
        .bind(&search_pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, category_id, name, slug, description, price, is_active, deleted_at, created_at, updated_at
            FROM products
            WHERE is_active AND deleted_at IS NULL
              AND ($1::uuid[] IS NULL OR category_id = ANY($1))
              AND ($2::text IS NULL OR name ILIKE $2 OR slug ILIKE $2)
            ORDER BY name, id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&category_ids)
        .bind(&search_pattern)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list products: {:?}", e);
            AppError::Database(e)
        })?;

        Ok((products.into_iter().map(|p| p.into()).collect(), total))
    }

    /// Get an active product by id
    pub async fn get_by_id(&self, id: Uuid) -> Result<ProductResponseDto> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, category_id, name, slug, description, price, is_active, deleted_at, created_at, updated_at
            FROM products
            WHERE id = $1 AND is_active AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get product: {:?}", e);
            AppError::Database(e)
        })?;

        product
            .map(|p| p.into())
            .ok_or_else(|| AppError::NotFound(format!("Product with id {} not found", id)))
    }

    async fn resolve_category_filter(
        &self,
        category_id: Uuid,
        query: &ListProductsQuery,
    ) -> Result<Vec<Uuid>> {
        if !query.include_descendants {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
                    .bind(category_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(AppError::Database)?;
            if !exists {
                return Err(AppError::NotFound(format!(
                    "Category with id {} not found",
                    category_id
                )));
            }
            return Ok(vec![category_id]);
        }

        let records = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, parent_id, name, slug, description, image_url, sort_order, created_at, updated_at
            FROM categories
            ORDER BY sort_order, name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        let forest = CategoryForest::from_records(records);
        if !forest.contains(category_id) {
            return Err(AppError::NotFound(format!(
                "Category with id {} not found",
                category_id
            )));
        }

        Ok(forest.subtree_ids(category_id))
    }
}
