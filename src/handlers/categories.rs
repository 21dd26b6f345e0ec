use actix_web::{web, HttpResponse};
use validator::Validate;

use super::AppState;
use crate::errors::ApiError;
use crate::models::{CategoryId, CategoryInput};
use crate::response::{self, ListQuery};
use crate::tree::category_tree;
use crate::{hierarchy, products};

pub async fn list(
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let page =
        hierarchy::list_categories(state.store.as_ref(), query.search(), query.page_request())
            .await?;
    Ok(response::ok(page))
}

pub async fn add(
    state: web::Data<AppState>,
    input: web::Json<CategoryInput>,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;
    let input = input.into_inner();
    let category =
        hierarchy::create_category(state.store.as_ref(), input.name, input.parent_id).await?;
    Ok(response::created(category))
}

pub async fn get(
    state: web::Data<AppState>,
    id: web::Path<CategoryId>,
) -> Result<HttpResponse, ApiError> {
    let category = hierarchy::get_category(state.store.as_ref(), id.into_inner()).await?;
    Ok(response::ok(category))
}

pub async fn update(
    state: web::Data<AppState>,
    id: web::Path<CategoryId>,
    input: web::Json<CategoryInput>,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;
    let input = input.into_inner();
    let category = hierarchy::update_category(
        state.store.as_ref(),
        id.into_inner(),
        input.name,
        input.parent_id,
    )
    .await?;
    Ok(response::ok(category))
}

pub async fn delete(
    state: web::Data<AppState>,
    id: web::Path<CategoryId>,
) -> Result<HttpResponse, ApiError> {
    products::delete_category(state.store.as_ref(), state.files.as_ref(), id.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn tree(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let forest = category_tree(state.store.as_ref()).await?;
    Ok(response::ok(forest))
}
