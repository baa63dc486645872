//! Storefront product listing.
//!
//! Products reference exactly one category through a nullable `category_id`.
//! This feature owns the product table reads the catalog needs: the public
//! listing endpoints and the active-product counts the category subsystem
//! uses for aggregation and deletion checks. "Active" means `is_active` and
//! not soft-deleted.
//!
//! ## Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | `/api/products` | List active products, optionally across a category subtree |
//! | GET | `/api/products/{id}` | Get an active product by id |

pub mod dtos;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use services::ProductService;
