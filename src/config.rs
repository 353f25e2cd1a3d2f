use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub storage_url: String,
    pub storage_api_key: String,
    pub storage_bucket: String,
    pub storage_signing_secret: String,
    pub export_dir: String,
    pub lodge_name: String,
    pub lodge_address: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "lodgebook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            storage_url: env::var("STORAGE_URL").unwrap_or_default(),
            storage_api_key: env::var("STORAGE_API_KEY").unwrap_or_default(),
            storage_bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "id-proofs".to_string()),
            storage_signing_secret: env::var("STORAGE_SIGNING_SECRET").unwrap_or_default(),
            export_dir: env::var("EXPORT_DIR").unwrap_or_else(|_| "exports".to_string()),
            lodge_name: env::var("LODGE_NAME").unwrap_or_else(|_| "Sai Grand Lodge".to_string()),
            lodge_address: env::var("LODGE_ADDRESS")
                .unwrap_or_else(|_| "Surendrapuri, Yadagirigutta".to_string()),
        }
    }
}
