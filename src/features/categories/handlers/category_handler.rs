use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::AppJson;
use crate::features::categories::dtos::{
    CategoryDetailDto, CategoryResponseDto, CreateCategoryDto, DeleteCategoryResponseDto,
    DeletionCheckDto, ListCategoriesQuery, ProductCountDto, ProductCountQuery, UpdateCategoryDto,
};
use crate::features::categories::services::CategoryService;
use crate::shared::types::ApiResponse;

/// List categories
///
/// Returns categories as a flat list or as a nested tree based on the `tree`
/// query param. `search` and `parentId` filter the flat list; `withCounts`
/// attaches per-node product counts to the tree.
#[utoipa::path(
    get,
    path = "/api/categories",
    params(ListCategoriesQuery),
    responses(
        (status = 200, description = "List of categories", body = ApiResponse<Vec<CategoryResponseDto>>),
    ),
    tag = "categories"
)]
pub async fn list_categories(
    State(service): State<Arc<CategoryService>>,
    Query(query): Query<ListCategoriesQuery>,
) -> Result<Response> {
    if query.tree {
        let tree = service.list_tree(&query).await?;
        Ok(Json(ApiResponse::success(Some(tree), None, None)).into_response())
    } else {
        let categories = service.list(&query).await?;
        Ok(Json(ApiResponse::success(Some(categories), None, None)).into_response())
    }
}

/// Create a new category
#[utoipa::path(
    post,
    path = "/api/categories",
    request_body = CreateCategoryDto,
    responses(
        (status = 201, description = "Category created successfully", body = ApiResponse<CategoryResponseDto>),
        (status = 400, description = "Validation error or unknown parent"),
        (status = 409, description = "Slug already in use")
    ),
    tag = "categories"
)]
pub async fn create_category(
    State(service): State<Arc<CategoryService>>,
    AppJson(dto): AppJson<CreateCategoryDto>,
) -> Result<(StatusCode, Json<ApiResponse<CategoryResponseDto>>)> {
    dto.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let category = service.create(dto).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(Some(category), None, None)),
    ))
}

/// Get category detail by ID
///
/// Includes the parent, direct children, the root-to-node path and product
/// counts alongside the category record.
#[utoipa::path(
    get,
    path = "/api/categories/{id}",
    params(
        ("id" = Uuid, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "Category found", body = ApiResponse<CategoryDetailDto>),
        (status = 404, description = "Category not found")
    ),
    tag = "categories"
)]
pub async fn get_category(
    State(service): State<Arc<CategoryService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CategoryDetailDto>>> {
    let detail = service.get_detail(id).await?;
    Ok(Json(ApiResponse::success(Some(detail), None, None)))
}

/// Get category by slug
#[utoipa::path(
    get,
    path = "/api/categories/slug/{slug}",
    params(
        ("slug" = String, Path, description = "Category slug")
    ),
    responses(
        (status = 200, description = "Category found", body = ApiResponse<CategoryResponseDto>),
        (status = 404, description = "Category not found")
    ),
    tag = "categories"
)]
pub async fn get_category_by_slug(
    State(service): State<Arc<CategoryService>>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<CategoryResponseDto>>> {
    let category = service.get_by_slug(&slug).await?;
    Ok(Json(ApiResponse::success(Some(category), None, None)))
}

/// Update a category
///
/// Omitted fields keep their stored value. `parentId` distinguishes an
/// explicit `null` (move to root) from an omitted field (keep current parent).
#[utoipa::path(
    patch,
    path = "/api/categories/{id}",
    params(
        ("id" = Uuid, Path, description = "Category ID")
    ),
    request_body = UpdateCategoryDto,
    responses(
        (status = 200, description = "Category updated successfully", body = ApiResponse<CategoryResponseDto>),
        (status = 400, description = "Validation error or unknown parent"),
        (status = 404, description = "Category not found"),
        (status = 409, description = "Slug already in use"),
        (status = 422, description = "Move would create a cycle")
    ),
    tag = "categories"
)]
pub async fn update_category(
    State(service): State<Arc<CategoryService>>,
    Path(id): Path<Uuid>,
    AppJson(dto): AppJson<UpdateCategoryDto>,
) -> Result<Json<ApiResponse<CategoryResponseDto>>> {
    dto.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let category = service.update(id, dto).await?;
    Ok(Json(ApiResponse::success(Some(category), None, None)))
}

/// Delete a category
///
/// Children are reparented to the deleted category's parent. Blocked with a
/// 409 when active products are still directly assigned.
#[utoipa::path(
    delete,
    path = "/api/categories/{id}",
    params(
        ("id" = Uuid, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "Category deleted successfully", body = ApiResponse<DeleteCategoryResponseDto>),
        (status = 404, description = "Category not found"),
        (status = 409, description = "Category has active products directly assigned")
    ),
    tag = "categories"
)]
pub async fn delete_category(
    State(service): State<Arc<CategoryService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DeleteCategoryResponseDto>>> {
    let result = service.delete(id).await?;
    Ok(Json(ApiResponse::success(Some(result), None, None)))
}

/// Check whether a category can be deleted
#[utoipa::path(
    get,
    path = "/api/categories/{id}/deletable",
    params(
        ("id" = Uuid, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "Deletion check result", body = ApiResponse<DeletionCheckDto>),
        (status = 404, description = "Category not found")
    ),
    tag = "categories"
)]
pub async fn get_deletion_check(
    State(service): State<Arc<CategoryService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DeletionCheckDto>>> {
    let check = service.check_deletable(id).await?;
    Ok(Json(ApiResponse::success(Some(check), None, None)))
}

/// Count products assigned to a category
#[utoipa::path(
    get,
    path = "/api/categories/{id}/product-count",
    params(
        ("id" = Uuid, Path, description = "Category ID"),
        ProductCountQuery
    ),
    responses(
        (status = 200, description = "Product count", body = ApiResponse<ProductCountDto>),
        (status = 404, description = "Category not found")
    ),
    tag = "categories"
)]
pub async fn get_product_count(
    State(service): State<Arc<CategoryService>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ProductCountQuery>,
) -> Result<Json<ApiResponse<ProductCountDto>>> {
    let count = service
        .count_products(id, query.include_descendants)
        .await?;
    Ok(Json(ApiResponse::success(Some(count), None, None)))
}
