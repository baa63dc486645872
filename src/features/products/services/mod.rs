mod product_service;

pub use product_service::{
    count_active_in_categories, count_active_in_category, counts_by_category, ProductService,
};
