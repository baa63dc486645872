pub mod product_handler;

pub use product_handler::{__path_get_product, __path_list_products, get_product, list_products};
