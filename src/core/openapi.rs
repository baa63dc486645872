use utoipa::{Modify, OpenApi};

use crate::features::categories::{dtos as categories_dtos, handlers as categories_handlers};
use crate::features::products::{dtos as products_dtos, handlers as products_handlers};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Categories
        categories_handlers::list_categories,
        categories_handlers::create_category,
        categories_handlers::get_category,
        categories_handlers::get_category_by_slug,
        categories_handlers::update_category,
        categories_handlers::delete_category,
        categories_handlers::get_deletion_check,
        categories_handlers::get_product_count,
        // Products
        products_handlers::list_products,
        products_handlers::get_product,
    ),
    components(
        schemas(
            // Shared
            Meta,
            // Categories
            categories_dtos::CreateCategoryDto,
            categories_dtos::UpdateCategoryDto,
            categories_dtos::CategoryResponseDto,
            categories_dtos::CategoryTreeDto,
            categories_dtos::CategorySummaryDto,
            categories_dtos::CategoryDetailDto,
            categories_dtos::DeletionCheckDto,
            categories_dtos::DeleteCategoryResponseDto,
            categories_dtos::ProductCountDto,
            ApiResponse<Vec<categories_dtos::CategoryResponseDto>>,
            ApiResponse<Vec<categories_dtos::CategoryTreeDto>>,
            ApiResponse<categories_dtos::CategoryResponseDto>,
            ApiResponse<categories_dtos::CategoryDetailDto>,
            ApiResponse<categories_dtos::DeletionCheckDto>,
            ApiResponse<categories_dtos::DeleteCategoryResponseDto>,
            ApiResponse<categories_dtos::ProductCountDto>,
            // Products
            products_dtos::ProductResponseDto,
            ApiResponse<Vec<products_dtos::ProductResponseDto>>,
            ApiResponse<products_dtos::ProductResponseDto>,
        )
    ),
    tags(
        (name = "categories", description = "Category catalog and hierarchy management"),
        (name = "products", description = "Storefront product listing (public)"),
    ),
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = "API documentation for the storefront backend",
    )
)]
pub struct ApiDoc;

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}
