use actix_web::{web, HttpRequest, HttpResponse};
use argon2::Config as ArgonConfig;
use jsonwebtoken::{encode, EncodingKey, Header};
use mongodb::bson::{doc, Document};
use mongodb::Database;
use rand::Rng;
use serde_json::json;

use crate::crud;
use crate::error::ApiError;
use crate::middleware::{self, AdminUser, CurrentUser, TokenSecret};
use crate::models::{ChangePasswordInput, Claims, LoginInput, RegisterInput, User, UserUpdate};
use crate::query::GetOptions;
use crate::responses;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(get_users))
            .route(web::post().to(add_user)),
    )
    .service(web::resource("/register").route(web::post().to(register_user)))
    .service(web::resource("/login").route(web::post().to(login)))
    .service(web::resource("/change/password").route(web::post().to(change_password)))
    .service(web::resource("/get/count").route(web::get().to(get_user_count)))
    .service(
        web::resource("/{id}")
            .route(web::get().to(get_user))
            .route(web::put().to(update_user))
            .route(web::delete().to(delete_user)),
    );
}

/// The hash never appears in a response, on any path.
fn user_selection() -> Document {
    doc! { "passwordHash": 0 }
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt: [u8; 16] = rand::thread_rng().gen();

    argon2::hash_encoded(password.as_bytes(), &salt, &ArgonConfig::default()).map_err(|err| {
        log::error!("password hashing failed: {}", err);
        ApiError::Unknown
    })
}

fn verify_password(hash: &str, password: &str) -> bool {
    argon2::verify_encoded(hash, password.as_bytes()).unwrap_or(false)
}

async fn find_user_by_email(db: &Database, email: &str) -> Result<Option<User>, ApiError> {
    let user = db
        .collection::<User>(User::COLLECTION)
        .find_one(doc! { "email": email }, None)
        .await?;
    Ok(user)
}

async fn get_users(db: web::Data<Database>, _admin: AdminUser) -> Result<HttpResponse, ApiError> {
    let options = GetOptions::default().selection(user_selection());
    let items = crud::get_all_items(&db, User::COLLECTION, &options).await?;
    Ok(responses::ok(items))
}

async fn get_user(
    db: web::Data<Database>,
    id: web::Path<String>,
    caller: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let target = crud::parse_object_id(id.as_str())?;

    if target != caller.0.user_id && !caller.0.is_admin {
        return Err(ApiError::Unauthorized("You are not authorized.".into()));
    }

    let options = GetOptions::default().selection(user_selection());
    let item = crud::get_item_by_id(&db, User::COLLECTION, id.as_str(), &options).await?;
    Ok(responses::ok(item))
}

async fn register(
    db: &Database,
    input: RegisterInput,
    allow_admin_flag: bool,
) -> Result<HttpResponse, ApiError> {
    input.validate()?;

    if find_user_by_email(db, &input.email).await?.is_some() {
        return Err(ApiError::Conflict(
            "User already exists with that e-mail.".into(),
        ));
    }

    let password_hash = hash_password(&input.password)?;
    let user = input.into_user(password_hash, allow_admin_flag);

    let saved = crud::save_item(db, User::COLLECTION, &user, Some(user_selection())).await?;
    Ok(responses::created(saved))
}

async fn add_user(
    db: web::Data<Database>,
    input: web::Json<RegisterInput>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    register(&db, input.into_inner(), true).await
}

async fn register_user(
    db: web::Data<Database>,
    input: web::Json<RegisterInput>,
) -> Result<HttpResponse, ApiError> {
    register(&db, input.into_inner(), false).await
}

async fn update_user(
    db: web::Data<Database>,
    id: web::Path<String>,
    input: web::Json<UserUpdate>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let set = input.into_inner().into_set_document();
    let updated = crud::update_item(
        &db,
        User::COLLECTION,
        id.as_str(),
        set,
        Some(user_selection()),
    )
    .await?;
    Ok(responses::ok(updated))
}

async fn delete_user(
    db: web::Data<Database>,
    id: web::Path<String>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let deleted =
        crud::delete_item(&db, User::COLLECTION, id.as_str(), Some(user_selection())).await?;
    Ok(responses::ok(deleted))
}

async fn login(
    db: web::Data<Database>,
    secret: web::Data<TokenSecret>,
    input: web::Json<LoginInput>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    if middleware::has_identity(&req) {
        return Err(ApiError::Validation("Already logged in.".into()));
    }

    let input = input.into_inner();

    if input.email.trim().is_empty() {
        return Err(ApiError::Validation("E-mail not given.".into()));
    }
    if input.password.is_empty() {
        return Err(ApiError::Validation("Password not given.".into()));
    }

    let user = find_user_by_email(&db, &input.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found.".into()))?;

    if !verify_password(&user.password_hash, &input.password) {
        return Err(ApiError::Unauthorized("Wrong password.".into()));
    }

    let user_id = user.id.ok_or(ApiError::Unknown)?;

    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::days(1))
        .ok_or(ApiError::Unknown)?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_hex(),
        is_admin: user.is_admin,
        exp: expiration,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.0.as_bytes()),
    )
    .map_err(|err| {
        log::error!("failed to encode token: {}", err);
        ApiError::Unknown
    })?;

    Ok(responses::ok(json!({ "user": user.email, "token": token })))
}

async fn change_password(
    db: web::Data<Database>,
    input: web::Json<ChangePasswordInput>,
) -> Result<HttpResponse, ApiError> {
    let input = input.into_inner();

    if input.email.trim().is_empty() {
        return Err(ApiError::Validation("No e-mail given.".into()));
    }
    if input.new_password.is_empty() {
        return Err(ApiError::Validation("No new password given.".into()));
    }
    if input.current_password.is_empty() {
        return Err(ApiError::Validation("No current password given.".into()));
    }

    let user = find_user_by_email(&db, &input.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found.".into()))?;

    if !verify_password(&user.password_hash, &input.current_password) {
        return Err(ApiError::Unauthorized("Wrong current password.".into()));
    }

    if verify_password(&user.password_hash, &input.new_password) {
        return Err(ApiError::Conflict(
            "New password can not be the same as the current password.".into(),
        ));
    }

    let password_hash = hash_password(&input.new_password)?;
    let user_id = user.id.ok_or(ApiError::Unknown)?;

    let updated = crud::update_item(
        &db,
        User::COLLECTION,
        &user_id.to_hex(),
        doc! { "passwordHash": password_hash },
        Some(user_selection()),
    )
    .await?;
    Ok(responses::ok(updated))
}

async fn get_user_count(
    db: web::Data<Database>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let count = crud::count_items(&db, User::COLLECTION).await?;
    Ok(responses::ok(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trips() {
        let hash = hash_password("hunter2").unwrap();

        assert_ne!(hash, "hunter2");
        assert!(verify_password(&hash, "hunter2"));
        assert!(!verify_password(&hash, "hunter3"));
    }

    #[test]
    fn same_password_hashes_differently_per_salt() {
        let first = hash_password("hunter2").unwrap();
        let second = hash_password("hunter2").unwrap();

        assert_ne!(first, second);
        assert!(verify_password(&second, "hunter2"));
    }

    #[test]
    fn garbage_hashes_never_verify() {
        assert!(!verify_password("not-an-encoded-hash", "anything"));
    }
}
