//! Products and their association with the category hierarchy.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::files::FileStore;
use crate::hierarchy;
use crate::models::{CategoryId, ImageUpload, Product, ProductDraft, ProductId};
use crate::response::{Page, PageRequest};
use crate::store::{CategoryStore, ProductFilter, ProductStore};

const IMAGE_DIR: &str = "products";
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp"];

/// Every product filed under `category_id`, its children or its
/// grandchildren. The depth cap means three levels cover the whole subtree.
pub async fn products_under<S>(store: &S, category_id: CategoryId) -> Result<Vec<Product>, ApiError>
where
    S: CategoryStore + ProductStore + ?Sized,
{
    hierarchy::get_category(store, category_id).await?;

    let children = store.children_of(&[category_id]).await?;
    let child_ids: Vec<CategoryId> = children.iter().map(|c| c.id).collect();
    let grandchildren = store.children_of(&child_ids).await?;

    let mut ids = vec![category_id];
    ids.extend(child_ids);
    ids.extend(grandchildren.iter().map(|c| c.id));
    Ok(store.products_in(&ids).await?)
}

pub async fn list_products<S: ProductStore + ?Sized>(
    store: &S,
    filter: &ProductFilter,
    page: PageRequest,
) -> Result<Page<Product>, ApiError> {
    let (rows, total) = store.search_products(filter, page).await?;
    Ok(Page::new(rows, total, page))
}

pub async fn get_product<S: ProductStore + ?Sized>(
    store: &S,
    id: ProductId,
) -> Result<Product, ApiError> {
    store.find_product(id).await?.ok_or(ApiError::NotFound("Product"))
}

async fn check_draft<S: CategoryStore + ?Sized>(
    store: &S,
    draft: &ProductDraft,
) -> Result<(), ApiError> {
    if !draft.price.is_finite() || draft.price < 0.0 {
        return Err(ApiError::PolicyViolation("The price must be at least 0.".to_string()));
    }
    if store.find_category(draft.category_id).await?.is_none() {
        return Err(ApiError::NotFound("Category"));
    }
    Ok(())
}

pub async fn create_product<S>(
    store: &S,
    files: &dyn FileStore,
    draft: ProductDraft,
    image: Option<&ImageUpload>,
) -> Result<Product, ApiError>
where
    S: CategoryStore + ProductStore + ?Sized,
{
    check_draft(store, &draft).await?;
    let image = match image {
        Some(upload) => Some(store_image(files, upload)?),
        None => None,
    };
    let product = store.insert_product(draft, image).await?;
    log::info!("created product {} in category {}", product.id, product.category_id);
    Ok(product)
}

pub async fn update_product<S>(
    store: &S,
    id: ProductId,
    draft: ProductDraft,
) -> Result<Product, ApiError>
where
    S: CategoryStore + ProductStore + ?Sized,
{
    let current = get_product(store, id).await?;
    check_draft(store, &draft).await?;
    let product = draft.into_product(id, current.image);
    store.update_product(&product).await?;
    Ok(product)
}

/// Stores the new image, then drops the one it replaces.
pub async fn replace_image<S: ProductStore + ?Sized>(
    store: &S,
    files: &dyn FileStore,
    id: ProductId,
    upload: &ImageUpload,
) -> Result<Product, ApiError> {
    let mut product = get_product(store, id).await?;
    let reference = store_image(files, upload)?;
    if let Some(previous) = product.image.replace(reference) {
        discard_image(files, &previous)?;
    }
    store.update_product(&product).await?;
    Ok(product)
}

pub async fn delete_product<S: ProductStore + ?Sized>(
    store: &S,
    files: &dyn FileStore,
    id: ProductId,
) -> Result<(), ApiError> {
    let product = get_product(store, id).await?;
    if let Some(image) = &product.image {
        discard_image(files, image)?;
    }
    store.delete_product(id).await?;
    log::info!("deleted product {}", id);
    Ok(())
}

/// Deletes a category subtree, then the images of the products it took
/// with it. File failures after the commit are logged, not returned.
pub async fn delete_category<S: CategoryStore + ?Sized>(
    store: &S,
    files: &dyn FileStore,
    id: CategoryId,
) -> Result<hierarchy::Removal, ApiError> {
    let removal = hierarchy::cascade_delete(store, id).await?;
    for image in removal.products.iter().filter_map(|p| p.image.as_deref()) {
        if let Err(err) = discard_image(files, image) {
            log::warn!("could not delete image {}: {}", image, err);
        }
    }
    Ok(removal)
}

fn discard_image(files: &dyn FileStore, reference: &str) -> Result<(), ApiError> {
    if files.exists(reference) {
        files.delete(reference)?;
    }
    Ok(())
}

fn store_image(files: &dyn FileStore, upload: &ImageUpload) -> Result<String, ApiError> {
    let extension = upload.extension.trim_start_matches('.').to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::invalid("image", "The image must be an image file."));
    }
    let bytes = STANDARD
        .decode(upload.content.trim())
        .map_err(|_| ApiError::invalid("image", "The image must be base64 encoded."))?;
    if bytes.is_empty() {
        return Err(ApiError::invalid("image", "The image field is required."));
    }

    let path = format!(
        "{}/P{}-{}.{}",
        IMAGE_DIR,
        Utc::now().timestamp(),
        Uuid::new_v4().simple(),
        extension
    );
    Ok(files.put(&bytes, &path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::LocalFileStore;
    use crate::models::ProductStatus;
    use crate::store::MemoryStore;

    fn temp_files() -> (LocalFileStore, std::path::PathBuf) {
        let root = std::env::temp_dir().join(format!("products-{}", Uuid::new_v4()));
        (LocalFileStore::new(&root), root)
    }

    fn draft(category_id: CategoryId, name: &str) -> ProductDraft {
        ProductDraft {
            category_id,
            name: name.to_string(),
            description: "A product".to_string(),
            quantity: 3,
            price: 9.5,
            status: ProductStatus::Active,
        }
    }

    fn png() -> ImageUpload {
        ImageUpload { content: STANDARD.encode(b"\x89PNG fake"), extension: "png".to_string() }
    }

    async fn category(store: &MemoryStore, name: &str, parent: Option<CategoryId>) -> CategoryId {
        hierarchy::create_category(store, name.to_string(), parent).await.unwrap().id
    }

    #[actix_web::test]
    async fn products_under_covers_three_levels() {
        let store = MemoryStore::new();
        let (files, _) = temp_files();
        let root = category(&store, "root", None).await;
        let child = category(&store, "child", Some(root)).await;
        let grandchild = category(&store, "grandchild", Some(child)).await;
        let other = category(&store, "other", None).await;

        for (cat, name) in [(root, "r"), (child, "c"), (grandchild, "g"), (other, "o")] {
            create_product(&store, &files, draft(cat, name), None).await.unwrap();
        }

        let names = |products: Vec<Product>| -> Vec<String> {
            products.into_iter().map(|p| p.name).collect()
        };
        assert_eq!(names(products_under(&store, root).await.unwrap()), vec!["r", "c", "g"]);
        assert_eq!(names(products_under(&store, child).await.unwrap()), vec!["c", "g"]);
        assert_eq!(names(products_under(&store, grandchild).await.unwrap()), vec!["g"]);
        assert!(matches!(
            products_under(&store, 404).await.unwrap_err(),
            ApiError::NotFound("Category")
        ));
    }

    #[actix_web::test]
    async fn create_requires_an_existing_category() {
        let store = MemoryStore::new();
        let (files, _) = temp_files();
        let err = create_product(&store, &files, draft(5, "orphan"), None).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Category")));
    }

    #[actix_web::test]
    async fn negative_price_is_a_policy_violation() {
        let store = MemoryStore::new();
        let (files, _) = temp_files();
        let cat = category(&store, "c", None).await;
        let mut bad = draft(cat, "bad");
        bad.price = -1.0;
        let err = create_product(&store, &files, bad, None).await.unwrap_err();
        assert!(matches!(err, ApiError::PolicyViolation(_)));
    }

    #[actix_web::test]
    async fn replacing_an_image_deletes_the_old_file() {
        let store = MemoryStore::new();
        let (files, root) = temp_files();
        let cat = category(&store, "c", None).await;
        let product = create_product(&store, &files, draft(cat, "p"), Some(&png())).await.unwrap();
        let first = product.image.clone().unwrap();
        assert!(files.exists(&first));

        let updated = replace_image(&store, &files, product.id, &png()).await.unwrap();
        let second = updated.image.clone().unwrap();
        assert_ne!(first, second);
        assert!(!files.exists(&first));
        assert!(files.exists(&second));

        delete_product(&store, &files, product.id).await.unwrap();
        assert!(!files.exists(&second));
        assert!(matches!(get_product(&store, product.id).await, Err(ApiError::NotFound(_))));
        std::fs::remove_dir_all(root).ok();
    }

    #[actix_web::test]
    async fn update_keeps_the_image() {
        let store = MemoryStore::new();
        let (files, root) = temp_files();
        let cat = category(&store, "c", None).await;
        let product = create_product(&store, &files, draft(cat, "p"), Some(&png())).await.unwrap();

        let updated = update_product(&store, product.id, draft(cat, "renamed")).await.unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.image, product.image);
        std::fs::remove_dir_all(root).ok();
    }

    #[actix_web::test]
    async fn rejects_unknown_image_types() {
        let store = MemoryStore::new();
        let (files, _) = temp_files();
        let cat = category(&store, "c", None).await;
        let exe = ImageUpload { content: STANDARD.encode(b"MZ"), extension: "exe".into() };
        let err = create_product(&store, &files, draft(cat, "p"), Some(&exe)).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[actix_web::test]
    async fn deleting_a_category_removes_product_images() {
        let store = MemoryStore::new();
        let (files, root) = temp_files();
        let parent = category(&store, "parent", None).await;
        let child = category(&store, "child", Some(parent)).await;
        let product = create_product(&store, &files, draft(child, "p"), Some(&png())).await.unwrap();

        let removal = delete_category(&store, &files, parent).await.unwrap();

        assert_eq!(removal.categories.len(), 2);
        assert!(!files.exists(product.image.as_deref().unwrap()));
        assert!(store.find_product(product.id).await.unwrap().is_none());
        std::fs::remove_dir_all(root).ok();
    }
}
