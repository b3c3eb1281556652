//! Generic persistence operations shared by every router. Each returns a
//! classified [`ApiError`] instead of letting driver errors reach the
//! transport layer, and each re-applies the caller's response selection so
//! that excluded fields (e.g. `passwordHash`) stay excluded on every path.

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOneOptions, ReturnDocument};
use mongodb::Database;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::query::{self, GetOptions};
use crate::responses::document_to_json;

/// Malformed identifiers are rejected before any query runs.
pub fn parse_object_id(id: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(id).map_err(|_| ApiError::Validation("Invalid object ID".into()))
}

/// Inserts the entity, then re-fetches it by the generated id with the given
/// response selection applied.
pub async fn save_item<T>(
    db: &Database,
    collection: &str,
    item: &T,
    selection: Option<Document>,
) -> Result<Value, ApiError>
where
    T: Serialize,
{
    let result = db
        .collection::<T>(collection)
        .insert_one(item, None)
        .await?;

    let id = result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::Persistence("inserted document has no object id".into()))?;

    let options = GetOptions { selection, ..GetOptions::default() };

    query::find_by_id(db, collection, id, &options)
        .await?
        .map(document_to_json)
        .ok_or_else(|| ApiError::Persistence("saved item could not be read back".into()))
}

/// Always a sequence, possibly empty.
pub async fn get_all_items(
    db: &Database,
    collection: &str,
    options: &GetOptions,
) -> Result<Vec<Value>, ApiError> {
    let items = query::find_many(db, collection, options).await?;
    Ok(items.into_iter().map(document_to_json).collect())
}

pub async fn get_item_by_id(
    db: &Database,
    collection: &str,
    id: &str,
    options: &GetOptions,
) -> Result<Value, ApiError> {
    let id = parse_object_id(id)?;

    query::find_by_id(db, collection, id, options)
        .await?
        .map(document_to_json)
        .ok_or_else(|| ApiError::NotFound("The item was not found.".into()))
}

/// Silent lookup for reference resolution: malformed ids and lookup failures
/// both read as absence, so callers can turn a dangling reference into their
/// own error.
pub async fn find_item_by_id<T>(db: &Database, collection: &str, id: &str) -> Option<T>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let id = ObjectId::parse_str(id).ok()?;

    db.collection::<T>(collection)
        .find_one(doc! { "_id": id }, None)
        .await
        .ok()
        .flatten()
}

/// Partial update; returns the post-update view with the response selection
/// applied.
pub async fn update_item(
    db: &Database,
    collection: &str,
    id: &str,
    set: Document,
    selection: Option<Document>,
) -> Result<Value, ApiError> {
    let id = parse_object_id(id)?;

    if set.is_empty() {
        return Err(ApiError::Validation("No recognized fields to update.".into()));
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .projection(selection)
        .build();

    let updated = db
        .collection::<Document>(collection)
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, options)
        .await?;

    updated
        .map(document_to_json)
        .ok_or_else(|| ApiError::NotFound("The item was not found.".into()))
}

/// Fetch-then-remove so the deleted entity's selected fields can be echoed
/// back.
pub async fn delete_item(
    db: &Database,
    collection: &str,
    id: &str,
    selection: Option<Document>,
) -> Result<Value, ApiError> {
    let id = parse_object_id(id)?;
    let coll = db.collection::<Document>(collection);

    let options = FindOneOptions::builder().projection(selection).build();
    let item = coll
        .find_one(doc! { "_id": id }, options)
        .await?
        .ok_or_else(|| ApiError::NotFound("The item was not found!".into()))?;

    coll.delete_one(doc! { "_id": id }, None).await?;

    Ok(document_to_json(item))
}

pub async fn count_items(db: &Database, collection: &str) -> Result<u64, ApiError> {
    let count = db
        .collection::<Document>(collection)
        .count_documents(None, None)
        .await?;
    Ok(count)
}
