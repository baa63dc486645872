#[cfg(test)]
use chrono::Utc;

#[cfg(test)]
use uuid::Uuid;

#[cfg(test)]
use crate::features::categories::models::Category;

#[cfg(test)]
use crate::features::categories::slug::slugify;

/// Build a category fixture with a random id and a slug derived from the name.
#[cfg(test)]
pub fn category(name: &str, parent_id: Option<Uuid>) -> Category {
    category_with_order(name, parent_id, 0)
}

#[cfg(test)]
pub fn category_with_order(name: &str, parent_id: Option<Uuid>, sort_order: i32) -> Category {
    let now = Utc::now();
    Category {
        id: Uuid::new_v4(),
        parent_id,
        name: name.to_string(),
        slug: slugify(name),
        description: None,
        image_url: None,
        sort_order,
        created_at: now,
        updated_at: now,
    }
}
