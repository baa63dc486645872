//! Category catalog feature.
//!
//! Categories form a hierarchy through a nullable `parent_id` self reference.
//! Every read rebuilds the forest from a flat snapshot of the table; rows
//! whose parent is missing are kept as roots rather than dropped, so a
//! partially corrupted hierarchy still renders. Mutations that touch the
//! parent chain run a cycle check inside the same transaction that applies
//! the write.
//!
//! ## Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | `/api/categories` | List categories (flat or `?tree=true`) |
//! | POST | `/api/categories` | Create category |
//! | GET | `/api/categories/{id}` | Category detail with path and counts |
//! | PATCH | `/api/categories/{id}` | Update category, move subtree |
//! | DELETE | `/api/categories/{id}` | Delete category, reparent children |
//! | GET | `/api/categories/{id}/deletable` | Pre-flight deletion check |
//! | GET | `/api/categories/{id}/product-count` | Direct or subtree product count |
//! | GET | `/api/categories/slug/{slug}` | Get category by slug |

pub mod dtos;
pub mod handlers;
pub mod hierarchy;
pub mod models;
pub mod routes;
pub mod services;
pub mod slug;

pub use services::CategoryService;
