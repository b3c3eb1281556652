use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::Database;
use serde::Deserialize;

use crate::crud;
use crate::error::ApiError;
use crate::middleware::AdminUser;
use crate::models::{Category, Product, ProductInput, ProductUpdate};
use crate::query::{GetOptions, Populate};
use crate::responses;
use crate::storage;

const MAX_GALLERY_IMAGES: usize = 20;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(get_products))
            .route(web::post().to(add_product)),
    )
    .service(web::resource("/brief").route(web::get().to(get_products_brief)))
    .service(web::resource("/brief/{id}").route(web::get().to(get_product_brief)))
    .service(web::resource("/get/count").route(web::get().to(get_product_count)))
    .service(web::resource("/get/featured").route(web::get().to(get_featured_products)))
    .service(web::resource("/get/featured/{count}").route(web::get().to(get_featured_products_limited)))
    .service(web::resource("/{id}/gallery").route(web::put().to(update_product_gallery)))
    .service(
        web::resource("/{id}")
            .route(web::get().to(get_product))
            .route(web::put().to(update_product))
            .route(web::delete().to(delete_product)),
    );
}

fn brief_selection() -> Document {
    doc! { "name": 1, "image": 1, "_id": 0 }
}

#[derive(Debug, Deserialize)]
struct ProductListQuery {
    categories: Option<String>,
}

/// `?categories=a,b,c` narrows a listing to those categories.
fn category_filter(query: &ProductListQuery) -> Result<Option<Document>, ApiError> {
    match query.categories.as_deref() {
        Some(raw) if !raw.is_empty() => {
            let ids = raw
                .split(',')
                .map(|id| ObjectId::parse_str(id.trim()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ApiError::Validation("Invalid category".into()))?;

            Ok(Some(doc! { "category": { "$in": ids } }))
        }
        _ => Ok(None),
    }
}

async fn get_products(
    db: web::Data<Database>,
    query: web::Query<ProductListQuery>,
) -> Result<HttpResponse, ApiError> {
    let options = GetOptions {
        filter: category_filter(&query)?,
        populate: vec![Populate::one("category", Category::COLLECTION)],
        ..GetOptions::default()
    };

    let items = crud::get_all_items(&db, Product::COLLECTION, &options).await?;
    Ok(responses::ok(items))
}

async fn get_products_brief(
    db: web::Data<Database>,
    query: web::Query<ProductListQuery>,
) -> Result<HttpResponse, ApiError> {
    let options = GetOptions {
        filter: category_filter(&query)?,
        selection: Some(brief_selection()),
        ..GetOptions::default()
    };

    let items = crud::get_all_items(&db, Product::COLLECTION, &options).await?;
    Ok(responses::ok(items))
}

async fn get_product(
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let options = GetOptions::default().populate(Populate::one("category", Category::COLLECTION));
    let item = crud::get_item_by_id(&db, Product::COLLECTION, id.as_str(), &options).await?;
    Ok(responses::ok(item))
}

async fn get_product_brief(
    db: web::Data<Database>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let options = GetOptions::default().selection(brief_selection());
    let item = crud::get_item_by_id(&db, Product::COLLECTION, id.as_str(), &options).await?;
    Ok(responses::ok(item))
}

async fn add_product(
    db: web::Data<Database>,
    input: web::Json<ProductInput>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let product = input.into_inner().into_product()?;

    if crud::find_item_by_id::<Category>(&db, Category::COLLECTION, &product.category.to_hex())
        .await
        .is_none()
    {
        return Err(ApiError::Validation("Invalid category".into()));
    }

    let saved = crud::save_item(&db, Product::COLLECTION, &product, None).await?;
    Ok(responses::created(saved))
}

async fn update_product(
    db: web::Data<Database>,
    id: web::Path<String>,
    input: web::Json<ProductUpdate>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let set = input.into_inner().into_set_document()?;

    if let Ok(category) = set.get_object_id("category") {
        if crud::find_item_by_id::<Category>(&db, Category::COLLECTION, &category.to_hex())
            .await
            .is_none()
        {
            return Err(ApiError::Validation("Invalid category".into()));
        }
    }

    let updated = crud::update_item(&db, Product::COLLECTION, id.as_str(), set, None).await?;
    Ok(responses::ok(updated))
}

async fn update_product_gallery(
    db: web::Data<Database>,
    id: web::Path<String>,
    payload: Multipart,
    req: HttpRequest,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let product_id = crud::parse_object_id(id.as_str())?;

    if crud::find_item_by_id::<Product>(&db, Product::COLLECTION, &product_id.to_hex())
        .await
        .is_none()
    {
        return Err(ApiError::NotFound("Product not found".into()));
    }

    let images = storage::save_images(payload, &req, MAX_GALLERY_IMAGES).await?;

    if images.is_empty() {
        return Err(ApiError::Validation("No images given".into()));
    }

    let updated = crud::update_item(
        &db,
        Product::COLLECTION,
        id.as_str(),
        doc! { "images": images },
        None,
    )
    .await?;
    Ok(responses::ok(updated))
}

async fn delete_product(
    db: web::Data<Database>,
    id: web::Path<String>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let deleted = crud::delete_item(&db, Product::COLLECTION, id.as_str(), None).await?;
    Ok(responses::ok(deleted))
}

async fn get_product_count(db: web::Data<Database>) -> Result<HttpResponse, ApiError> {
    let count = crud::count_items(&db, Product::COLLECTION).await?;
    Ok(responses::ok(count))
}

async fn get_featured_products(
    db: web::Data<Database>,
    query: web::Query<ProductListQuery>,
) -> Result<HttpResponse, ApiError> {
    featured(&db, &query, None).await
}

async fn get_featured_products_limited(
    db: web::Data<Database>,
    count: web::Path<String>,
    query: web::Query<ProductListQuery>,
) -> Result<HttpResponse, ApiError> {
    let limit = count
        .parse::<i64>()
        .map_err(|_| ApiError::Validation("Invalid count".into()))?;

    featured(&db, &query, Some(limit)).await
}

async fn featured(
    db: &Database,
    query: &ProductListQuery,
    limit: Option<i64>,
) -> Result<HttpResponse, ApiError> {
    let mut filter = category_filter(query)?.unwrap_or_default();
    filter.insert("isFeatured", true);

    let mut options = GetOptions::default().filter(filter);
    if let Some(limit) = limit {
        options = options.limit(limit);
    }

    let items = crud::get_all_items(db, Product::COLLECTION, &options).await?;
    Ok(responses::ok(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_query_parses_into_an_inclusion_filter() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let query = ProductListQuery {
            categories: Some(format!("{},{}", a.to_hex(), b.to_hex())),
        };

        let filter = category_filter(&query).unwrap().unwrap();
        let ids = filter
            .get_document("category")
            .unwrap()
            .get_array("$in")
            .unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn absent_or_empty_category_query_is_no_filter() {
        assert!(category_filter(&ProductListQuery { categories: None })
            .unwrap()
            .is_none());
        assert!(category_filter(&ProductListQuery { categories: Some(String::new()) })
            .unwrap()
            .is_none());
    }

    #[test]
    fn malformed_category_query_is_a_validation_error() {
        let query = ProductListQuery { categories: Some("abc,def".into()) };
        assert!(matches!(
            category_filter(&query),
            Err(ApiError::Validation(_))
        ));
    }
}
