//! `generate` and `scrape` commands.

use crate::cli::args::GenerateArgs;
use crate::cli::context;
use crate::core::models::ImageSource;
use crate::core::scraper::{BrowserScraper, SessionScraper};
use crate::error::{RelayError, Result};
use crate::storage::config::ResolvedConfig;

/// Execute the generate command.
///
/// # Errors
/// Any generation failure; there is no fallback on the command line.
pub async fn execute(args: &GenerateArgs, config: &ResolvedConfig) -> Result<()> {
    let orchestrator = context::orchestrator(config)?;
    let generated = orchestrator.generate(&args.prompt).await?;

    if args.json {
        let json = serde_json::to_string_pretty(&generated)?;
        println!("{json}");
        return Ok(());
    }

    let source = match generated.source {
        ImageSource::Fresh => "generated",
        ImageSource::Cached => "cached",
    };
    println!("{} images ({source}) for \"{}\":", generated.image_paths.len(), generated.prompt);
    let images = config.paths.images_dir();
    for path in &generated.image_paths {
        println!("  {}", images.join(path).display());
    }
    Ok(())
}

/// Execute the scrape command: log in and rotate the stored credential.
///
/// # Errors
/// Scraper or persistence failures.
pub async fn scrape(config: &ResolvedConfig) -> Result<()> {
    config.paths.ensure_dirs()?;
    let store = context::credential_store(config)?;
    let scraper = BrowserScraper::new(config.scraper.clone());

    let scraped = scraper.scrape().await?;
    if scraped.token.is_empty() {
        return Err(RelayError::Automation("scraper returned an empty token".to_string()));
    }
    let credential = store.rotate(&scraped.token).await?;

    println!(
        "Credential rotated (rotation #{}, fingerprint {}) -> {}",
        credential.rotation_count,
        credential.fingerprint(),
        store.path().display()
    );
    Ok(())
}
