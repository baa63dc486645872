pub mod category_handler;

pub use category_handler::{
    __path_create_category, __path_delete_category, __path_get_category,
    __path_get_category_by_slug, __path_get_deletion_check, __path_get_product_count,
    __path_list_categories, __path_update_category, create_category, delete_category, get_category,
    get_category_by_slug, get_deletion_check, get_product_count, list_categories, update_category,
};
