//! `deepsearch doctor`: Diagnose system health.

use std::time::Duration;

use deepsearch_config::AppConfig;
use deepsearch_core::provider::Provider;
use deepsearch_providers::OpenAiCompatProvider;
use deepsearch_store::SqliteStore;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 DeepSearch Doctor: System Diagnostics");
    println!("=========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found");
    } else {
        println!("  ⚠️  No config file, using defaults (run `deepsearch onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Cannot continue without a valid config.");
            return Ok(());
        }
    };

    if config.search.api_key.is_some() {
        println!("  ✅ Search API key configured");
    } else {
        println!("  ❌ No search API key (set SERPER_API_KEY)");
        issues += 1;
    }

    if config.auth.tokens.is_empty() {
        println!("  ❌ No bearer tokens under [auth.tokens]; every request will get 401");
        issues += 1;
    } else {
        println!("  ✅ {} bearer token(s) configured", config.auth.tokens.len());
    }

    match SqliteStore::new(&config.database.url).await {
        Ok(_) => println!("  ✅ Database reachable and migrated"),
        Err(e) => {
            println!("  ❌ Database error: {e}");
            issues += 1;
        }
    }

    match OpenAiCompatProvider::from_config(&config.provider) {
        Ok(provider) => {
            let check = tokio::time::timeout(Duration::from_secs(10), provider.health_check()).await;
            match check {
                Ok(Ok(true)) => println!("  ✅ Provider '{}' reachable", provider.name()),
                Ok(Ok(false)) => {
                    println!("  ⚠️  Provider '{}' answered but reported unhealthy", provider.name());
                    issues += 1;
                }
                Ok(Err(e)) => {
                    println!("  ❌ Provider error: {e}");
                    issues += 1;
                }
                Err(_) => {
                    println!("  ❌ Provider health check timed out");
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  ❌ {e} (set OPENROUTER_API_KEY)");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
