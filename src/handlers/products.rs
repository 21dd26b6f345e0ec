use actix_web::{web, HttpResponse};
use validator::Validate;

use super::AppState;
use crate::errors::ApiError;
use crate::models::{
    CategoryId, ImageInput, Product, ProductId, ProductInput, ProductUpdateInput, ProductView,
};
use crate::products;
use crate::response::{self, ListQuery};
use crate::store::ProductFilter;

fn view(state: &AppState, product: Product) -> ProductView {
    ProductView::new(product, &state.public_storage_url)
}

pub async fn list(
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let filter = ProductFilter {
        search: query.search().map(str::to_string),
        category_id: query.category,
        status: query.status,
    };
    let page = products::list_products(state.store.as_ref(), &filter, query.page_request()).await?;
    Ok(response::ok(page.map(|p| view(&state, p))))
}

pub async fn under(
    state: web::Data<AppState>,
    category_id: web::Path<CategoryId>,
) -> Result<HttpResponse, ApiError> {
    let found = products::products_under(state.store.as_ref(), category_id.into_inner()).await?;
    let views: Vec<ProductView> = found.into_iter().map(|p| view(&state, p)).collect();
    Ok(response::ok(views))
}

pub async fn add(
    state: web::Data<AppState>,
    input: web::Json<ProductInput>,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;
    let product = products::create_product(
        state.store.as_ref(),
        state.files.as_ref(),
        input.draft(),
        input.image.as_ref(),
    )
    .await?;
    Ok(response::created(view(&state, product)))
}

pub async fn get(
    state: web::Data<AppState>,
    id: web::Path<ProductId>,
) -> Result<HttpResponse, ApiError> {
    let product = products::get_product(state.store.as_ref(), id.into_inner()).await?;
    Ok(response::ok(view(&state, product)))
}

/// Updates the fields; the image is only changed through the image endpoint.
pub async fn update(
    state: web::Data<AppState>,
    id: web::Path<ProductId>,
    input: web::Json<ProductUpdateInput>,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;
    let product =
        products::update_product(state.store.as_ref(), id.into_inner(), input.draft()).await?;
    Ok(response::ok(view(&state, product)))
}

pub async fn update_image(
    state: web::Data<AppState>,
    id: web::Path<ProductId>,
    input: web::Json<ImageInput>,
) -> Result<HttpResponse, ApiError> {
    let product = products::replace_image(
        state.store.as_ref(),
        state.files.as_ref(),
        id.into_inner(),
        &input.image,
    )
    .await?;
    Ok(response::ok(view(&state, product)))
}

pub async fn delete(
    state: web::Data<AppState>,
    id: web::Path<ProductId>,
) -> Result<HttpResponse, ApiError> {
    products::delete_product(state.store.as_ref(), state.files.as_ref(), id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
