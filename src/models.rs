use mongodb::bson::oid::ObjectId;
use mongodb::bson::{DateTime, Document};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// JWT payload attached to every issued token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id (hex)
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    pub exp: usize, // expiration time as UTC timestamp
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub image: String,
}

impl Category {
    pub const COLLECTION: &'static str = "categories";
}

#[derive(Debug, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub image: String,
}

impl CategoryInput {
    pub fn into_category(self) -> Result<Category, ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("No category name given.".into()));
        }

        Ok(Category {
            id: None,
            name: self.name,
            color: self.color,
            icon: self.icon,
            image: self.image,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub image: Option<String>,
}

impl CategoryUpdate {
    pub fn into_set_document(self) -> Document {
        let mut set = Document::new();
        if let Some(name) = self.name {
            set.insert("name", name);
        }
        if let Some(color) = self.color {
            set.insert("color", color);
        }
        if let Some(icon) = self.icon {
            set.insert("icon", icon);
        }
        if let Some(image) = self.image {
            set.insert("image", image);
        }
        set
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub price: f64,
    pub category: ObjectId,
    #[serde(default)]
    pub is_featured: bool,
    pub date_created: DateTime,
}

impl Product {
    pub const COLLECTION: &'static str = "products";
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub is_featured: bool,
}

impl ProductInput {
    /// Checks everything that does not require a database round trip; the
    /// category reference itself is resolved by the handler.
    pub fn into_product(self) -> Result<Product, ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("No product name given.".into()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ApiError::Validation("Invalid product price.".into()));
        }

        let category = ObjectId::parse_str(&self.category)
            .map_err(|_| ApiError::Validation("Invalid category".into()))?;

        Ok(Product {
            id: None,
            name: self.name,
            description: self.description,
            image: self.image,
            images: self.images,
            price: self.price,
            category,
            is_featured: self.is_featured,
            date_created: DateTime::now(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub images: Option<Vec<String>>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub is_featured: Option<bool>,
}

impl ProductUpdate {
    pub fn into_set_document(self) -> Result<Document, ApiError> {
        let mut set = Document::new();
        if let Some(name) = self.name {
            set.insert("name", name);
        }
        if let Some(description) = self.description {
            set.insert("description", description);
        }
        if let Some(image) = self.image {
            set.insert("image", image);
        }
        if let Some(images) = self.images {
            set.insert("images", images);
        }
        if let Some(price) = self.price {
            if !price.is_finite() || price < 0.0 {
                return Err(ApiError::Validation("Invalid product price.".into()));
            }
            set.insert("price", price);
        }
        if let Some(category) = self.category {
            let category = ObjectId::parse_str(&category)
                .map_err(|_| ApiError::Validation("Invalid category".into()))?;
            set.insert("category", category);
        }
        if let Some(is_featured) = self.is_featured {
            set.insert("isFeatured", is_featured);
        }
        Ok(set)
    }
}

pub const ORDER_ITEM_MAX_QUANTITY: i32 = 99;

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub quantity: i32,
    pub product: ObjectId,
}

impl OrderItem {
    pub const COLLECTION: &'static str = "orderitems";
}

#[derive(Debug, Deserialize)]
pub struct OrderItemInput {
    pub quantity: i32,
    pub product: String,
}

impl OrderItemInput {
    pub fn to_order_item(&self) -> Result<OrderItem, ApiError> {
        if !(0..=ORDER_ITEM_MAX_QUANTITY).contains(&self.quantity) {
            return Err(ApiError::Validation(format!(
                "Order item quantity must be between 0 and {}.",
                ORDER_ITEM_MAX_QUANTITY
            )));
        }

        let product = ObjectId::parse_str(&self.product)
            .map_err(|_| ApiError::Validation("Invalid product".into()))?;

        Ok(OrderItem {
            id: None,
            quantity: self.quantity,
            product,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "shipped" => Some(OrderStatus::Shipped),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub order_items: Vec<ObjectId>,
    pub shipping_address1: String,
    #[serde(default)]
    pub shipping_address2: String,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub phone: String,
    pub status: OrderStatus,
    pub total_price: f64,
    pub user: ObjectId,
    pub date_ordered: DateTime,
}

impl Order {
    pub const COLLECTION: &'static str = "orders";
}

/// Client payload for order creation. `totalPrice` and `status` are absent on
/// purpose: both are derived server-side, so anything the client sends for
/// them is dropped here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInput {
    #[serde(default)]
    pub order_items: Vec<OrderItemInput>,
    pub shipping_address1: String,
    #[serde(default)]
    pub shipping_address2: String,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub phone: String,
    pub user: String,
}

impl OrderInput {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.order_items.is_empty() {
            return Err(ApiError::Validation("No order items given".into()));
        }
        if self.user.trim().is_empty() {
            return Err(ApiError::Validation("No user given".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub shipping_address1: Option<String>,
    pub shipping_address2: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderUpdate {
    pub fn into_set_document(self) -> Document {
        let mut set = Document::new();
        if let Some(address) = self.shipping_address1 {
            set.insert("shippingAddress1", address);
        }
        if let Some(address) = self.shipping_address2 {
            set.insert("shippingAddress2", address);
        }
        if let Some(city) = self.city {
            set.insert("city", city);
        }
        if let Some(country) = self.country {
            set.insert("country", country);
        }
        if let Some(phone) = self.phone {
            set.insert("phone", phone);
        }
        if let Some(status) = self.status {
            set.insert("status", status.as_str());
        }
        set
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub apartment: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    pub date_registered: DateTime,
}

impl User {
    pub const COLLECTION: &'static str = "users";
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub apartment: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    pub is_admin: Option<bool>,
}

impl RegisterInput {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("No name given.".into()));
        }
        if self.email.trim().is_empty() {
            return Err(ApiError::Validation("E-mail not given.".into()));
        }
        if self.password.is_empty() {
            return Err(ApiError::Validation("No password given.".into()));
        }
        Ok(())
    }

    /// `allow_admin_flag` is true only for the admin-guarded create route;
    /// public registration can never mint an admin account.
    pub fn into_user(self, password_hash: String, allow_admin_flag: bool) -> User {
        User {
            id: None,
            name: self.name,
            email: self.email,
            password_hash,
            phone: self.phone,
            is_admin: allow_admin_flag && self.is_admin.unwrap_or(false),
            street: self.street,
            apartment: self.apartment,
            zip: self.zip,
            city: self.city,
            country: self.country,
            date_registered: DateTime::now(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub apartment: Option<String>,
    pub zip: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub is_admin: Option<bool>,
}

impl UserUpdate {
    // Password rotation has its own credential-checked route; there is no
    // passwordHash path here.
    pub fn into_set_document(self) -> Document {
        let mut set = Document::new();
        if let Some(name) = self.name {
            set.insert("name", name);
        }
        if let Some(email) = self.email {
            set.insert("email", email);
        }
        if let Some(phone) = self.phone {
            set.insert("phone", phone);
        }
        if let Some(street) = self.street {
            set.insert("street", street);
        }
        if let Some(apartment) = self.apartment {
            set.insert("apartment", apartment);
        }
        if let Some(zip) = self.zip {
            set.insert("zip", zip);
        }
        if let Some(city) = self.city {
            set.insert("city", city);
        }
        if let Some(country) = self.country {
            set.insert("country", country);
        }
        if let Some(is_admin) = self.is_admin {
            set.insert("isAdmin", is_admin);
        }
        set
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordInput {
    pub email: String,
    pub current_password: String,
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::to_document;

    #[test]
    fn order_status_parses_only_known_values() {
        assert_eq!(OrderStatus::parse("pending"), Some(OrderStatus::Pending));
        assert_eq!(OrderStatus::parse("shipped"), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse("cancelled"), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::parse("delivered"), None);
        assert_eq!(OrderStatus::parse("PENDING"), None);
    }

    #[test]
    fn order_item_quantity_is_bounded() {
        let product = ObjectId::new().to_hex();

        let ok = OrderItemInput { quantity: 99, product: product.clone() };
        assert!(ok.to_order_item().is_ok());

        let zero = OrderItemInput { quantity: 0, product: product.clone() };
        assert!(zero.to_order_item().is_ok());

        let too_many = OrderItemInput { quantity: 100, product: product.clone() };
        assert!(matches!(too_many.to_order_item(), Err(ApiError::Validation(_))));

        let negative = OrderItemInput { quantity: -1, product };
        assert!(matches!(negative.to_order_item(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn order_item_rejects_malformed_product_reference() {
        let input = OrderItemInput { quantity: 1, product: "not-an-id".into() };
        assert!(matches!(input.to_order_item(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn order_input_requires_items() {
        let input: OrderInput = serde_json::from_value(serde_json::json!({
            "orderItems": [],
            "shippingAddress1": "1 Main St",
            "city": "Espoo",
            "country": "Finland",
            "user": ObjectId::new().to_hex(),
        }))
        .unwrap();

        assert!(matches!(input.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn order_input_drops_client_supplied_total_price() {
        let input: OrderInput = serde_json::from_value(serde_json::json!({
            "orderItems": [{ "quantity": 2, "product": ObjectId::new().to_hex() }],
            "shippingAddress1": "1 Main St",
            "city": "Espoo",
            "country": "Finland",
            "user": ObjectId::new().to_hex(),
            "totalPrice": 999999.0,
        }))
        .unwrap();

        // The DTO has no totalPrice field, so the value above can never
        // reach storage.
        assert!(input.validate().is_ok());
    }

    #[test]
    fn partial_updates_only_set_provided_fields() {
        let update = CategoryUpdate { color: Some("#ff0000".into()), ..Default::default() };
        let set = update.into_set_document();

        assert_eq!(set.len(), 1);
        assert_eq!(set.get_str("color").unwrap(), "#ff0000");
    }

    #[test]
    fn product_update_validates_price_and_category() {
        let bad_price = ProductUpdate { price: Some(-1.0), ..Default::default() };
        assert!(matches!(bad_price.into_set_document(), Err(ApiError::Validation(_))));

        let bad_category = ProductUpdate { category: Some("zzz".into()), ..Default::default() };
        assert!(matches!(bad_category.into_set_document(), Err(ApiError::Validation(_))));

        let ok = ProductUpdate {
            price: Some(12.5),
            category: Some(ObjectId::new().to_hex()),
            ..Default::default()
        };
        let set = ok.into_set_document().unwrap();
        assert_eq!(set.get_f64("price").unwrap(), 12.5);
        assert!(set.get_object_id("category").is_ok());
    }

    #[test]
    fn public_registration_cannot_mint_admins() {
        let input: RegisterInput = serde_json::from_value(serde_json::json!({
            "name": "Mallory",
            "email": "mallory@example.com",
            "password": "hunter2",
            "isAdmin": true,
        }))
        .unwrap();

        let user = input.into_user("hash".into(), false);
        assert!(!user.is_admin);
    }

    #[test]
    fn user_serializes_with_camel_case_wire_names() {
        let user = User {
            id: None,
            name: "Alice".into(),
            email: "alice@example.com".into(),
            password_hash: "hash".into(),
            phone: String::new(),
            is_admin: true,
            street: String::new(),
            apartment: String::new(),
            zip: String::new(),
            city: String::new(),
            country: String::new(),
            date_registered: DateTime::now(),
        };

        let doc = to_document(&user).unwrap();
        assert!(doc.contains_key("passwordHash"));
        assert!(doc.contains_key("isAdmin"));
        assert!(doc.contains_key("dateRegistered"));
        assert!(!doc.contains_key("_id"));
    }
}
