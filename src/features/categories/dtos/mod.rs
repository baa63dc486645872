pub mod category_dto;

pub use category_dto::{
    CategoryDetailDto, CategoryResponseDto, CategorySummaryDto, CategoryTreeDto,
    CreateCategoryDto, DeleteCategoryResponseDto, DeletionCheckDto, ListCategoriesQuery,
    ProductCountDto, ProductCountQuery, UpdateCategoryDto,
};
