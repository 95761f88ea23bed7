//! `deepsearch users`: User provisioning.

use deepsearch_config::AppConfig;
use deepsearch_core::identity::UserId;
use deepsearch_store::SqliteStore;
use tracing::info;

pub async fn add(
    id: &str,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = id.trim();
    if id.is_empty() {
        return Err("user id must not be empty".into());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = SqliteStore::new(&config.database.url).await?;
    store.create_user(&UserId::from(id), name, email).await?;
    info!(user_id = id, "User provisioned");

    println!("✅ User '{id}' is ready");
    if !config.auth.tokens.values().any(|user| user == id) {
        println!("   No bearer token maps to this user yet; add one under [auth.tokens].");
    }
    Ok(())
}
