//! Category hierarchy rules.
//!
//! A category chain (the category, its parent, its grandparent) holds at most
//! [`MAX_DEPTH`] categories. The rule is checked at write time by walking
//! parent references upward, so every walk here is a loop bounded by the
//! cap rather than a general tree traversal.

use crate::errors::ApiError;
use crate::models::{Category, CategoryId, NewCategory};
use crate::response::{Page, PageRequest};
use crate::store::{CategoryStore, StoreError};

pub use crate::store::Removal;

/// Root, sub, sub-sub.
pub const MAX_DEPTH: usize = 3;

/// Checks that `category_id` (absent for an insert) may hang under
/// `parent_id` (absent for a root).
pub async fn validate_insert_or_move<S: CategoryStore + ?Sized>(
    store: &S,
    category_id: Option<CategoryId>,
    parent_id: Option<CategoryId>,
) -> Result<(), ApiError> {
    let parent_id = match parent_id {
        Some(id) => id,
        None => return Ok(()),
    };
    if category_id == Some(parent_id) {
        return Err(ApiError::SelfReference);
    }

    let parent = store
        .find_category(parent_id)
        .await?
        .ok_or(ApiError::NotFound("Parent category"))?;

    // Categories on the parent's chain, the parent included.
    let mut parent_depth = 1;
    let mut next = parent.parent_id;
    while let Some(ancestor_id) = next {
        if Some(ancestor_id) == category_id {
            return Err(ApiError::PolicyViolation(
                "You can't move a category under its own subcategory!".to_string(),
            ));
        }
        parent_depth += 1;
        if parent_depth + 1 > MAX_DEPTH {
            log::debug!("parent {} is already at depth {}", parent_id, parent_depth);
            return Err(ApiError::DepthExceeded);
        }
        let ancestor = store.find_category(ancestor_id).await?.ok_or_else(|| {
            ApiError::PolicyViolation(format!("Category {} has a missing parent!", parent_id))
        })?;
        next = ancestor.parent_id;
    }

    if let Some(id) = category_id {
        let height = subtree_height(store, id).await?;
        if parent_depth + 1 + height > MAX_DEPTH {
            log::debug!("moving {} with {} levels below it under {}", id, height, parent_id);
            return Err(ApiError::DepthExceeded);
        }
    }
    Ok(())
}

/// Levels of descendants below `id`: 0 for a leaf. Stops counting once the
/// cap is reached.
async fn subtree_height<S: CategoryStore + ?Sized>(
    store: &S,
    id: CategoryId,
) -> Result<usize, ApiError> {
    let mut frontier = vec![id];
    let mut height = 0;
    while height < MAX_DEPTH {
        let children = store.children_of(&frontier).await?;
        if children.is_empty() {
            break;
        }
        height += 1;
        frontier = children.into_iter().map(|c| c.id).collect();
    }
    Ok(height)
}

/// Deletes a category with all of its descendants in one store transaction.
pub async fn cascade_delete<S: CategoryStore + ?Sized>(
    store: &S,
    id: CategoryId,
) -> Result<Removal, ApiError> {
    let removal = store.delete_subtree(id).await?.ok_or(ApiError::NotFound("Category"))?;
    log::info!(
        "deleted category {} with {} descendants and {} products",
        id,
        removal.categories.len() - 1,
        removal.products.len()
    );
    Ok(removal)
}

/// The parent passed validation but was deleted before the write landed.
fn parent_gone(err: StoreError) -> ApiError {
    match err {
        StoreError::MissingParent(_) => ApiError::NotFound("Parent category"),
        other => other.into(),
    }
}

pub async fn create_category<S: CategoryStore + ?Sized>(
    store: &S,
    name: String,
    parent_id: Option<CategoryId>,
) -> Result<Category, ApiError> {
    validate_insert_or_move(store, None, parent_id).await?;
    let category = store
        .insert_category(NewCategory { name, parent_id })
        .await
        .map_err(parent_gone)?;
    log::info!("created category {} under {:?}", category.id, category.parent_id);
    Ok(category)
}

pub async fn update_category<S: CategoryStore + ?Sized>(
    store: &S,
    id: CategoryId,
    name: String,
    parent_id: Option<CategoryId>,
) -> Result<Category, ApiError> {
    let mut category = get_category(store, id).await?;
    if category.parent_id != parent_id {
        validate_insert_or_move(store, Some(id), parent_id).await?;
    } else if parent_id == Some(id) {
        return Err(ApiError::SelfReference);
    }
    category.name = name;
    category.parent_id = parent_id;
    store.update_category(&category).await.map_err(parent_gone)?;
    Ok(category)
}

pub async fn get_category<S: CategoryStore + ?Sized>(
    store: &S,
    id: CategoryId,
) -> Result<Category, ApiError> {
    store.find_category(id).await?.ok_or(ApiError::NotFound("Category"))
}

pub async fn list_categories<S: CategoryStore + ?Sized>(
    store: &S,
    search: Option<&str>,
    page: PageRequest,
) -> Result<Page<Category>, ApiError> {
    let (rows, total) = store.search_categories(search, page).await?;
    Ok(Page::new(rows, total, page))
}
