use actix_web::{web, HttpRequest, HttpResponse};
use futures::stream::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};
use mongodb::Database;
use serde_json::json;

use crate::crud;
use crate::error::ApiError;
use crate::middleware::{self, AdminUser, CurrentUser};
use crate::models::{
    Category, Order, OrderInput, OrderItem, OrderStatus, OrderUpdate, Product, User,
};
use crate::query::{GetOptions, Populate};
use crate::responses;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(get_orders))
            .route(web::post().to(add_order)),
    )
    .service(web::resource("/get/count").route(web::get().to(get_order_count)))
    .service(web::resource("/get/totalsales").route(web::get().to(get_total_sales)))
    .service(web::resource("/get/user/{id}").route(web::get().to(get_user_orders)))
    .service(web::resource("/{id}/set/status/{status}").route(web::post().to(set_order_status)))
    .service(
        web::resource("/{id}")
            .route(web::get().to(get_order))
            .route(web::put().to(update_order))
            .route(web::delete().to(delete_order)),
    );
}

/// Orders expand all the way down: user contact fields, then each order item
/// with its product and the product's category.
fn order_options() -> GetOptions {
    GetOptions::default()
        .populate(
            Populate::one("user", User::COLLECTION)
                .select(doc! { "name": 1, "email": 1, "phone": 1 }),
        )
        .populate(
            Populate::many("orderItems", OrderItem::COLLECTION).then(
                Populate::one("product", Product::COLLECTION)
                    .then(Populate::one("category", Category::COLLECTION)),
            ),
        )
}

async fn get_orders(db: web::Data<Database>, _admin: AdminUser) -> Result<HttpResponse, ApiError> {
    let options = order_options().sort(doc! { "dateOrdered": -1 });

    let items = crud::get_all_items(&db, Order::COLLECTION, &options).await?;
    Ok(responses::ok(items))
}

async fn get_order(
    db: web::Data<Database>,
    id: web::Path<String>,
    user: CurrentUser,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    // Non-admins only ever see their own orders; anyone else's id reads as
    // not found.
    let mut options = order_options();
    if !middleware::is_admin(&req) {
        options = options.filter(doc! { "user": user.0.user_id });
    }

    let item = crud::get_item_by_id(&db, Order::COLLECTION, id.as_str(), &options).await?;
    Ok(responses::ok(item))
}

async fn get_user_orders(
    db: web::Data<Database>,
    id: web::Path<String>,
    user: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let target = crud::parse_object_id(id.as_str())?;

    if target != user.0.user_id && !user.0.is_admin {
        return Err(ApiError::Unauthorized("You are not authorized.".into()));
    }

    let options = order_options()
        .filter(doc! { "user": target })
        .sort(doc! { "dateOrdered": -1 });

    let items = crud::get_all_items(&db, Order::COLLECTION, &options).await?;
    Ok(responses::ok(items))
}

async fn add_order(
    db: web::Data<Database>,
    input: web::Json<OrderInput>,
    _user: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let input = input.into_inner();
    input.validate()?;

    let user_id = ObjectId::parse_str(&input.user)
        .map_err(|_| ApiError::Validation("Invalid user".into()))?;
    if crud::find_item_by_id::<User>(&db, User::COLLECTION, &input.user)
        .await
        .is_none()
    {
        return Err(ApiError::Validation("Invalid user".into()));
    }

    // Every reference must resolve before the first write.
    let mut items = Vec::with_capacity(input.order_items.len());
    for item_input in &input.order_items {
        let item = item_input.to_order_item()?;
        if crud::find_item_by_id::<Product>(&db, Product::COLLECTION, &item.product.to_hex())
            .await
            .is_none()
        {
            return Err(ApiError::Validation("Invalid product".into()));
        }
        items.push(item);
    }

    let item_ids = insert_order_items(&db, &items).await?;
    let total_price = resolve_total_price(&db, &item_ids).await?;

    let order = Order {
        id: None,
        order_items: item_ids,
        shipping_address1: input.shipping_address1,
        shipping_address2: input.shipping_address2,
        city: input.city,
        country: input.country,
        phone: input.phone,
        status: OrderStatus::Pending,
        total_price,
        user: user_id,
        date_ordered: mongodb::bson::DateTime::now(),
    };

    let saved = crud::save_item(&db, Order::COLLECTION, &order, None).await?;
    Ok(responses::created(saved))
}

/// Persists order items one by one. A failure aborts the whole creation; the
/// items inserted so far are removed best-effort so no order can ever
/// reference a partial set.
async fn insert_order_items(
    db: &Database,
    items: &[OrderItem],
) -> Result<Vec<ObjectId>, ApiError> {
    let coll = db.collection::<OrderItem>(OrderItem::COLLECTION);
    let mut ids = Vec::with_capacity(items.len());

    for item in items {
        match coll.insert_one(item, None).await {
            Ok(result) => match result.inserted_id.as_object_id() {
                Some(id) => ids.push(id),
                None => {
                    remove_order_items(db, &ids).await;
                    return Err(ApiError::Persistence(
                        "order item insert returned no id".into(),
                    ));
                }
            },
            Err(err) => {
                remove_order_items(db, &ids).await;
                return Err(err.into());
            }
        }
    }

    Ok(ids)
}

/// Best-effort cleanup; failures are logged and the original error wins.
async fn remove_order_items(db: &Database, ids: &[ObjectId]) {
    let coll = db.collection::<OrderItem>(OrderItem::COLLECTION);
    for id in ids {
        if let Err(err) = coll.delete_one(doc! { "_id": *id }, None).await {
            log::warn!("failed to clean up order item {}: {}", id, err);
        }
    }
}

/// Re-reads each persisted item and resolves its product's price at creation
/// time. A miss here is a lookup failure, not a client error.
async fn resolve_total_price(db: &Database, item_ids: &[ObjectId]) -> Result<f64, ApiError> {
    let mut lines = Vec::with_capacity(item_ids.len());

    for id in item_ids {
        let item: OrderItem = crud::find_item_by_id(db, OrderItem::COLLECTION, &id.to_hex())
            .await
            .ok_or_else(|| ApiError::Persistence("order item could not be read back".into()))?;

        let product: Product =
            crud::find_item_by_id(db, Product::COLLECTION, &item.product.to_hex())
                .await
                .ok_or_else(|| {
                    ApiError::Persistence("order item price could not be resolved".into())
                })?;

        lines.push((item.quantity, product.price));
    }

    Ok(sum_line_totals(&lines))
}

fn sum_line_totals(lines: &[(i32, f64)]) -> f64 {
    lines
        .iter()
        .map(|(quantity, price)| price * f64::from(*quantity))
        .sum()
}

async fn set_order_status(
    db: web::Data<Database>,
    path: web::Path<(String, String)>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let (id, status) = path.into_inner();

    let status = OrderStatus::parse(&status)
        .ok_or_else(|| ApiError::Validation("Invalid order status".into()))?;

    let updated = crud::update_item(
        &db,
        Order::COLLECTION,
        &id,
        doc! { "status": status.as_str() },
        None,
    )
    .await?;
    Ok(responses::ok(updated))
}

async fn update_order(
    db: web::Data<Database>,
    id: web::Path<String>,
    input: web::Json<OrderUpdate>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let set = input.into_inner().into_set_document();
    let updated = crud::update_item(&db, Order::COLLECTION, id.as_str(), set, None).await?;
    Ok(responses::ok(updated))
}

async fn delete_order(
    db: web::Data<Database>,
    id: web::Path<String>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    crud::parse_object_id(id.as_str())?;

    let order: Order = crud::find_item_by_id(&db, Order::COLLECTION, id.as_str())
        .await
        .ok_or_else(|| ApiError::NotFound("The order was not found!".into()))?;

    // Cascade before the order itself; a failed item deletion aborts and
    // leaves the order in place.
    let items = db.collection::<Document>(OrderItem::COLLECTION);
    for item_id in &order.order_items {
        let result = items.delete_one(doc! { "_id": *item_id }, None).await?;
        if result.deleted_count == 0 {
            log::warn!("order item {} was already missing", item_id);
        }
    }

    let deleted = crud::delete_item(&db, Order::COLLECTION, id.as_str(), None).await?;
    Ok(responses::ok(deleted))
}

async fn get_order_count(
    db: web::Data<Database>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let count = crud::count_items(&db, Order::COLLECTION).await?;
    Ok(responses::ok(count))
}

/// One aggregation over the whole collection; an empty collection is a
/// reportable failure, not zero.
async fn get_total_sales(
    db: web::Data<Database>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let pipeline = vec![
        doc! { "$group": { "_id": null, "totalSales": { "$sum": "$totalPrice" } } },
        doc! { "$project": { "_id": 0, "totalSales": 1 } },
    ];

    let mut cursor = db
        .collection::<Document>(Order::COLLECTION)
        .aggregate(pipeline, None)
        .await?;

    let result = cursor
        .try_next()
        .await?
        .ok_or_else(|| ApiError::Persistence("Order sales can not be generated".into()))?;

    let total = match result.get("totalSales") {
        Some(Bson::Double(value)) => *value,
        Some(Bson::Int32(value)) => f64::from(*value),
        Some(Bson::Int64(value)) => *value as f64,
        _ => return Err(ApiError::Persistence("Order sales can not be generated".into())),
    };

    Ok(responses::ok(json!({ "totalSales": total })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_price_is_the_sum_of_quantity_times_price() {
        let lines = [(2, 10.0), (1, 5.5), (3, 0.5)];
        assert_eq!(sum_line_totals(&lines), 27.0);
    }

    #[test]
    fn empty_line_set_sums_to_zero() {
        assert_eq!(sum_line_totals(&[]), 0.0);
    }

    #[test]
    fn order_reads_expand_user_and_nested_items() {
        let options = order_options();
        assert_eq!(options.populate.len(), 2);

        // The nested chain must reach the category through the product.
        let pipeline = crate::query::build_pipeline(&options);
        let rendered = format!("{:?}", pipeline);
        assert!(rendered.contains("orderitems"));
        assert!(rendered.contains("products"));
        assert!(rendered.contains("categories"));
    }
}
