use std::env;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

mod crud;
mod db;
mod error;
mod middleware;
mod models;
mod query;
mod responses;
mod routes;
mod storage;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok(); // Load environment variables from .env file
    env_logger::init();

    // Connect to the MongoDB database
    let db = db::connect().await;

    let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    let api_url = env::var("API_URL").unwrap_or_else(|_| "/api/v1".to_string());
    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(8080);

    log::info!("The server is running on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(db.clone())) // Share the database handle with handlers
            .app_data(web::Data::new(middleware::TokenSecret(jwt_secret.clone())))
            .app_data(web::JsonConfig::default().error_handler(error::json_error_handler))
            .wrap(middleware::AuthMiddleware::new(jwt_secret.clone()))
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .service(actix_files::Files::new(
                &format!("/{}", storage::STORAGE_DESTINATION),
                storage::STORAGE_DESTINATION,
            ))
            .service(
                web::scope(&format!("{}/categories", api_url))
                    .configure(routes::categories::configure),
            )
            .service(
                web::scope(&format!("{}/products", api_url))
                    .configure(routes::products::configure),
            )
            .service(
                web::scope(&format!("{}/orders", api_url)).configure(routes::orders::configure),
            )
            .service(web::scope(&format!("{}/users", api_url)).configure(routes::users::configure))
    })
    .bind((host, port))?
    .run()
    .await
}
