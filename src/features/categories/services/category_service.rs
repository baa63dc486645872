use std::collections::HashSet;

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::categories::dtos::{
    CategoryDetailDto, CategoryResponseDto, CategorySummaryDto, CategoryTreeDto,
    CreateCategoryDto, DeleteCategoryResponseDto, DeletionCheckDto, ListCategoriesQuery,
    ProductCountDto, UpdateCategoryDto,
};
use crate::features::categories::hierarchy::{deletion_check, CategoryForest, HierarchyError};
use crate::features::categories::models::Category;
use crate::features::categories::slug::{disambiguate, slugify};
use crate::features::products::services::{
    count_active_in_categories, count_active_in_category, counts_by_category,
};
use crate::shared::constants::SLUG_RETRY_ATTEMPTS;

/// Convert database errors to more specific AppError with user-friendly messages
fn handle_db_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        // Unique constraint violation (PostgreSQL error code 23505)
        if db_err.code() == Some(std::borrow::Cow::Borrowed("23505")) {
            if let Some(constraint) = db_err.constraint() {
                if constraint.contains("slug") {
                    return AppError::Conflict(
                        "A category with this slug already exists.".to_string(),
                    );
                }
            }
            return AppError::Conflict("A category with these fields already exists.".to_string());
        }

        // Foreign key violation (PostgreSQL error code 23503)
        if db_err.code() == Some(std::borrow::Cow::Borrowed("23503")) {
            return AppError::BadRequest("Referenced record does not exist.".to_string());
        }
    }

    AppError::Database(e)
}

/// A broken parent chain means the stored tree was already corrupt.
fn integrity_error(e: HierarchyError) -> AppError {
    AppError::DataIntegrity(e.to_string())
}

/// Snapshot every category row and lock it for the rest of the
/// transaction. Mutation checks and the writes they guard must see the
/// same chain, so the whole (small) table is row-locked at once.
async fn lock_category_snapshot(tx: &mut Transaction<'_, Postgres>) -> Result<Vec<Category>> {
    let records = sqlx::query_as::<_, Category>(
        r#"
        SELECT id, parent_id, name, slug, description, image_url, sort_order, created_at, updated_at
        FROM categories
        ORDER BY sort_order, name
        FOR UPDATE
        "#,
    )
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to lock category snapshot: {:?}", e);
        AppError::Database(e)
    })?;

    Ok(records)
}

/// Same snapshot without locks, for checks that cannot change the chain.
async fn read_category_snapshot(tx: &mut Transaction<'_, Postgres>) -> Result<Vec<Category>> {
    let records = sqlx::query_as::<_, Category>(
        r#"
        SELECT id, parent_id, name, slug, description, image_url, sort_order, created_at, updated_at
        FROM categories
        ORDER BY sort_order, name
        "#,
    )
    .fetch_all(&mut **tx)
    .await
    .map_err(AppError::Database)?;

    Ok(records)
}

/// Service for category CRUD and hierarchy operations
pub struct CategoryService {
    pool: PgPool,
}

impl CategoryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List categories matching the filters (flat records)
    pub async fn list(&self, query: &ListCategoriesQuery) -> Result<Vec<CategoryResponseDto>> {
        let records = self.fetch_filtered(query).await?;
        Ok(records.into_iter().map(|c| c.into()).collect())
    }

    /// List categories matching the filters as a nested tree.
    ///
    /// The tree is built from the filtered record set, so a child whose
    /// parent was filtered out surfaces as a root of its own subtree.
    pub async fn list_tree(&self, query: &ListCategoriesQuery) -> Result<Vec<CategoryTreeDto>> {
        let records = self.fetch_filtered(query).await?;
        let forest = self.build_forest(records);

        let counts = if query.with_counts {
            Some(counts_by_category(&self.pool).await?)
        } else {
            None
        };

        Ok(CategoryTreeDto::from_forest(&forest, counts.as_ref()))
    }

    /// Get category by slug
    pub async fn get_by_slug(&self, slug: &str) -> Result<CategoryResponseDto> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, parent_id, name, slug, description, image_url, sort_order, created_at, updated_at
            FROM categories
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get category by slug: {:?}", e);
            AppError::Database(e)
        })?;

        category
            .map(|c| c.into())
            .ok_or_else(|| AppError::NotFound(format!("Category '{}' not found", slug)))
    }

    /// Detail view: the record plus parent, children, breadcrumb path and
    /// direct/subtree product counts.
    pub async fn get_detail(&self, id: Uuid) -> Result<CategoryDetailDto> {
        let forest = self.snapshot_forest().await?;
        let record = forest
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Category with id {} not found", id)))?;

        let path = forest.path_to(id).map_err(integrity_error)?;
        let parent = record
            .parent_id
            .and_then(|parent_id| forest.get(parent_id))
            .map(CategorySummaryDto::from);
        let children: Vec<CategorySummaryDto> = forest
            .children_of(id)
            .iter()
            .filter_map(|child_id| forest.get(*child_id))
            .map(CategorySummaryDto::from)
            .collect();

        let direct_count = count_active_in_category(&self.pool, id).await?;
        let subtree_count = count_active_in_categories(&self.pool, &forest.subtree_ids(id)).await?;

        Ok(CategoryDetailDto {
            category: CategoryResponseDto::from(record.clone()),
            parent,
            children,
            path: path.iter().map(|c| CategorySummaryDto::from(*c)).collect(),
            direct_product_count: direct_count,
            subtree_product_count: subtree_count,
        })
    }

    /// Count active products in a category, optionally across its subtree
    pub async fn count_products(
        &self,
        id: Uuid,
        include_descendants: bool,
    ) -> Result<ProductCountDto> {
        let forest = self.snapshot_forest().await?;
        if !forest.contains(id) {
            return Err(AppError::NotFound(format!(
                "Category with id {} not found",
                id
            )));
        }

        let count = if include_descendants {
            count_active_in_categories(&self.pool, &forest.subtree_ids(id)).await?
        } else {
            count_active_in_category(&self.pool, id).await?
        };

        Ok(ProductCountDto {
            category_id: id,
            include_descendants,
            count,
        })
    }

    /// Pre-flight deletion check; a blocked result is data, not an error
    pub async fn check_deletable(&self, id: Uuid) -> Result<DeletionCheckDto> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to check category existence: {:?}", e);
                    AppError::Database(e)
                })?;
        if !exists {
            return Err(AppError::NotFound(format!(
                "Category with id {} not found",
                id
            )));
        }

        let blocking = count_active_in_category(&self.pool, id).await?;
        Ok(DeletionCheckDto::from(deletion_check(blocking)))
    }

    /// Create a category. An omitted slug is derived from the name and
    /// disambiguated against existing slugs; a concurrent insert can still
    /// claim the candidate first, so derived slugs retry on conflict.
    pub async fn create(&self, dto: CreateCategoryDto) -> Result<CategoryResponseDto> {
        let mut attempt = 0;
        loop {
            match self.try_create(&dto).await {
                Err(AppError::Conflict(msg))
                    if dto.slug.is_none() && attempt < SLUG_RETRY_ATTEMPTS =>
                {
                    attempt += 1;
                    tracing::debug!(
                        "derived slug collided, retrying (attempt {}): {}",
                        attempt,
                        msg
                    );
                }
                other => return other,
            }
        }
    }

    async fn try_create(&self, dto: &CreateCategoryDto) -> Result<CategoryResponseDto> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        // Lock the parent row so it cannot be deleted between this check
        // and the insert.
        if let Some(parent_id) = dto.parent_id {
            let locked: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM categories WHERE id = $1 FOR UPDATE")
                    .bind(parent_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(AppError::Database)?;
            if locked.is_none() {
                return Err(AppError::BadRequest(format!(
                    "Parent category {} does not exist",
                    parent_id
                )));
            }
        }

        let id = Uuid::now_v7();

        // A fresh id can never close a cycle; the guard still runs so a
        // parent chain that is already corrupt is caught here instead of
        // surfacing later as an unresolvable breadcrumb.
        let snapshot = read_category_snapshot(&mut tx).await?;
        let forest = CategoryForest::from_records(snapshot);
        if forest
            .would_create_cycle(id, dto.parent_id)
            .map_err(integrity_error)?
        {
            return Err(AppError::CircularReference(
                "Assigning this parent would create a circular reference".to_string(),
            ));
        }

        let slug = match &dto.slug {
            Some(slug) => slug.clone(),
            None => {
                let base = slugify(&dto.name);
                let existing: Vec<String> = sqlx::query_scalar(
                    "SELECT slug FROM categories WHERE slug = $1 OR slug LIKE $1 || '-%'",
                )
                .bind(&base)
                .fetch_all(&mut *tx)
                .await
                .map_err(AppError::Database)?;
                let taken: HashSet<String> = existing.into_iter().collect();
                disambiguate(&base, &taken)
            }
        };

        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (id, parent_id, name, slug, description, image_url, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, parent_id, name, slug, description, image_url, sort_order, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(dto.parent_id)
        .bind(&dto.name)
        .bind(&slug)
        .bind(dto.description.as_deref())
        .bind(dto.image_url.as_deref())
        .bind(dto.sort_order.unwrap_or(0))
        .fetch_one(&mut *tx)
        .await
        .map_err(handle_db_error)?;

        tx.commit().await.map_err(AppError::Database)?;

        Ok(CategoryResponseDto::from(category))
    }

    /// Partial update. When the patch carries `parentId` the cycle guard
    /// runs inside the same transaction as the write, over a row-locked
    /// snapshot, so a concurrent move cannot interleave a cycle.
    pub async fn update(&self, id: Uuid, dto: UpdateCategoryDto) -> Result<CategoryResponseDto> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let snapshot = lock_category_snapshot(&mut tx).await?;
        let forest = CategoryForest::from_records(snapshot);

        if !forest.contains(id) {
            return Err(AppError::NotFound(format!(
                "Category with id {} not found",
                id
            )));
        }

        if let Some(new_parent) = dto.parent_id {
            if let Some(parent_id) = new_parent {
                if !forest.contains(parent_id) {
                    return Err(AppError::BadRequest(format!(
                        "Parent category {} does not exist",
                        parent_id
                    )));
                }
            }
            if forest
                .would_create_cycle(id, new_parent)
                .map_err(integrity_error)?
            {
                return Err(AppError::CircularReference(
                    "Moving the category under the requested parent would create a circular reference"
                        .to_string(),
                ));
            }
        }

        let parent_in_patch = dto.parent_id.is_some();
        let new_parent_value = dto.parent_id.flatten();

        let category = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
            SET name = COALESCE($1, name),
                slug = COALESCE($2, slug),
                description = COALESCE($3, description),
                image_url = COALESCE($4, image_url),
                sort_order = COALESCE($5, sort_order),
                parent_id = CASE WHEN $6 THEN $7 ELSE parent_id END,
                updated_at = NOW()
            WHERE id = $8
            RETURNING id, parent_id, name, slug, description, image_url, sort_order, created_at, updated_at
            "#,
        )
        .bind(dto.name.as_deref())
        .bind(dto.slug.as_deref())
        .bind(dto.description.as_deref())
        .bind(dto.image_url.as_deref())
        .bind(dto.sort_order)
        .bind(parent_in_patch)
        .bind(new_parent_value)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(handle_db_error)?;

        tx.commit().await.map_err(AppError::Database)?;

        Ok(CategoryResponseDto::from(category))
    }

    /// Delete a category: direct children move to its own parent (root
    /// promotion when it has none), leftover non-active products move the
    /// same way, then the row goes. One transaction; blocked deletions
    /// change nothing.
    pub async fn delete(&self, id: Uuid) -> Result<DeleteCategoryResponseDto> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let snapshot = lock_category_snapshot(&mut tx).await?;
        let forest = CategoryForest::from_records(snapshot);

        let plan = forest
            .plan_removal(id)
            .ok_or_else(|| AppError::NotFound(format!("Category with id {} not found", id)))?;

        // The row lock holds off concurrent product inserts into this
        // category (their FK check blocks on it), so the count is stable
        // for the rest of the transaction.
        let blocking = count_active_in_category(&mut *tx, id).await?;
        let check = deletion_check(blocking);
        if !check.allowed {
            let reason = check
                .reason
                .unwrap_or_else(|| "Category has active products assigned".to_string());
            return Err(AppError::DeletionBlocked(reason));
        }

        if !plan.child_ids.is_empty() {
            sqlx::query(
                "UPDATE categories SET parent_id = $1, updated_at = NOW() WHERE parent_id = $2",
            )
            .bind(plan.new_parent_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        }

        // Archived and soft-deleted products do not block deletion but
        // still reference the row; they follow the children.
        sqlx::query("UPDATE products SET category_id = $1, updated_at = NOW() WHERE category_id = $2")
            .bind(plan.new_parent_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        tracing::info!(
            "deleted category {}, reparented {} children",
            id,
            plan.child_ids.len()
        );

        Ok(DeleteCategoryResponseDto {
            deleted_id: id,
            reparented_child_ids: plan.child_ids,
        })
    }

    async fn fetch_filtered(&self, query: &ListCategoriesQuery) -> Result<Vec<Category>> {
        let search_pattern = query.search.as_ref().map(|s| format!("%{}%", s));

        let records = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, parent_id, name, slug, description, image_url, sort_order, created_at, updated_at
            FROM categories
            WHERE ($1::text IS NULL OR name ILIKE $1 OR slug ILIKE $1)
              AND ($2::uuid IS NULL OR parent_id = $2)
            ORDER BY sort_order, name
            "#,
        )
        .bind(search_pattern)
        .bind(query.parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list categories: {:?}", e);
            AppError::Database(e)
        })?;

        Ok(records)
    }

    async fn snapshot_forest(&self) -> Result<CategoryForest> {
        let records = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, parent_id, name, slug, description, image_url, sort_order, created_at, updated_at
            FROM categories
            ORDER BY sort_order, name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to snapshot categories: {:?}", e);
            AppError::Database(e)
        })?;

        Ok(self.build_forest(records))
    }

    fn build_forest(&self, records: Vec<Category>) -> CategoryForest {
        let forest = CategoryForest::from_records(records);
        for dangling_id in forest.dangling_ids() {
            tracing::warn!(
                "category {} has an unresolvable parent reference, treating it as a root",
                dangling_id
            );
        }
        forest
    }
}
