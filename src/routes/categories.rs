use actix_web::{web, HttpResponse};
use mongodb::Database;

use crate::crud;
use crate::error::ApiError;
use crate::middleware::AdminUser;
use crate::models::{Category, CategoryInput, CategoryUpdate};
use crate::query::GetOptions;
use crate::responses;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(get_categories))
            .route(web::post().to(add_category)),
    )
    .service(
        web::resource("/{id}")
            .route(web::get().to(get_category))
            .route(web::put().to(update_category))
            .route(web::delete().to(delete_category)),
    );
}

async fn get_categories(db: web::Data<Database>) -> Result<HttpResponse, ApiError> {
    let items = crud::get_all_items(&db, Category::COLLECTION, &GetOptions::default()).await?;
    Ok(responses::ok(items))
}

async fn get_category(
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let item =
        crud::get_item_by_id(&db, Category::COLLECTION, id.as_str(), &GetOptions::default())
            .await?;
    Ok(responses::ok(item))
}

async fn add_category(
    db: web::Data<Database>,
    input: web::Json<CategoryInput>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let category = input.into_inner().into_category()?;
    let saved = crud::save_item(&db, Category::COLLECTION, &category, None).await?;
    Ok(responses::created(saved))
}

async fn update_category(
    db: web::Data<Database>,
    id: web::Path<String>,
    input: web::Json<CategoryUpdate>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let set = input.into_inner().into_set_document();
    let updated = crud::update_item(&db, Category::COLLECTION, id.as_str(), set, None).await?;
    Ok(responses::ok(updated))
}

async fn delete_category(
    db: web::Data<Database>,
    id: web::Path<String>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let deleted = crud::delete_item(&db, Category::COLLECTION, id.as_str(), None).await?;
    Ok(responses::ok(deleted))
}
