use anyhow::Result;
use std::env;
use std::sync::Arc;

use calorie_snap::handlers::snap;
use calorie_snap::services::{CloudBackend, FallbackAnalyzer, OnDeviceBackend, EXTRA_OPTIONS};
use calorie_snap::{Config, FoodImage};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    let mut args = env::args().skip(1);
    let Some(photo_path) = args.next() else {
        eprintln!("Usage: calorie-snap <photo> [extra ...]");
        eprintln!("Suggested extras: {}", EXTRA_OPTIONS.join(", "));
        std::process::exit(2);
    };
    let extras: Vec<String> = args.collect();

    log::info!("🚀 Starting Calorie Snap...");

    let config = Config::from_env()?;

    let on_device = Arc::new(OnDeviceBackend::new(
        config.local_model_url.clone(),
        config.local_model.clone(),
        config.generation.clone(),
    ));
    log::info!("✅ Local model configured: {} at {}", config.local_model, config.local_model_url);

    let cloud = Arc::new(CloudBackend::new(
        config.openrouter_api_key.clone(),
        config.openrouter_model.clone(),
        config.openrouter_base_url.clone(),
        config.generation.clone(),
    ));
    log::info!("✅ OpenRouter service initialized with model: {}", config.openrouter_model);

    let analyzer = Arc::new(FallbackAnalyzer::new(on_device, cloud));
    let image = FoodImage::from_path(&photo_path)?;

    let record = snap(analyzer, image, &photo_path, extras).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    log::info!("🛑 Shutting down...");
    Ok(())
}
