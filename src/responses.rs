use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use mongodb::bson::{Bson, Document};
use serde::Serialize;
use serde_json::{json, Value};

pub fn success(status: StatusCode, result: impl Serialize) -> HttpResponse {
    HttpResponse::build(status).json(json!({
        "success": true,
        "result": result,
    }))
}

pub fn created(result: impl Serialize) -> HttpResponse {
    success(StatusCode::CREATED, result)
}

pub fn ok(result: impl Serialize) -> HttpResponse {
    success(StatusCode::OK, result)
}

/// Converts a stored document into its API shape: `_id` becomes `id`, object
/// ids become hex strings and datetimes become RFC 3339 strings, recursively
/// through populated sub-documents. Storage-level representations never leak
/// into a response.
pub fn document_to_json(doc: Document) -> Value {
    let mut map = serde_json::Map::with_capacity(doc.len());
    for (key, value) in doc {
        let key = if key == "_id" { "id".to_string() } else { key };
        map.insert(key, bson_to_json(value));
    }
    Value::Object(map)
}

fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .map(Value::String)
            .unwrap_or(Value::Null),
        Bson::Document(doc) => document_to_json(doc),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::String(s) => Value::String(s),
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(n) => Value::from(n),
        Bson::Int64(n) => Value::from(n),
        Bson::Double(n) => serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::Null => Value::Null,
        other => other.into_relaxed_extjson(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use mongodb::bson::{doc, DateTime};

    #[test]
    fn renames_id_and_stringifies_object_ids() {
        let oid = ObjectId::new();
        let json = document_to_json(doc! { "_id": oid, "name": "Shoes" });

        assert_eq!(json["id"], oid.to_hex());
        assert_eq!(json["name"], "Shoes");
        assert!(json.get("_id").is_none());
    }

    #[test]
    fn converts_nested_populated_documents() {
        let category_id = ObjectId::new();
        let json = document_to_json(doc! {
            "_id": ObjectId::new(),
            "category": { "_id": category_id, "name": "Footwear" },
            "images": ["a.png", "b.png"],
        });

        assert_eq!(json["category"]["id"], category_id.to_hex());
        assert_eq!(json["category"]["name"], "Footwear");
        assert_eq!(json["images"], serde_json::json!(["a.png", "b.png"]));
    }

    #[test]
    fn converts_scalars_and_dates() {
        let json = document_to_json(doc! {
            "price": 19.5,
            "quantity": 3_i32,
            "isFeatured": true,
            "dateOrdered": DateTime::from_millis(0),
        });

        assert_eq!(json["price"], 19.5);
        assert_eq!(json["quantity"], 3);
        assert_eq!(json["isFeatured"], true);
        assert_eq!(json["dateOrdered"], "1970-01-01T00:00:00Z");
    }
}
