//! `deepsearch onboard`: First-time setup.

use deepsearch_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🔎 DeepSearch: First-Time Setup");
    println!("================================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set OPENROUTER_API_KEY and SERPER_API_KEY (or edit the file)");
    println!("   2. Add a bearer token under [auth.tokens], e.g. \"my-token\" = \"alice\"");
    println!("   3. Run: deepsearch users add alice");
    println!("   4. Run: deepsearch serve\n");

    Ok(())
}
