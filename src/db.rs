use mongodb::{options::ClientOptions, Client, Database};
use std::env;

pub async fn connect() -> Database {
    // Retrieve the MongoDB connection string from environment variables
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let database_name =
        env::var("DATABASE_NAME").unwrap_or_else(|_| "eshop-database".to_string());

    let client_options = ClientOptions::parse(&database_url)
        .await
        .expect("Failed to parse MongoDB connection string");

    let client = Client::with_options(client_options).expect("Failed to initialize MongoDB client");

    client.database(&database_name)
}
