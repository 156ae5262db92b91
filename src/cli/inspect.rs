//! Read-only commands: `credential show`, `random-prompt`, `cache list`.

use crate::cli::args::{CacheCommand, CredentialCommand, RandomPromptArgs};
use crate::cli::context;
use crate::error::{RelayError, Result};
use crate::storage::config::ResolvedConfig;
use crate::storage::image_cache::ImageCache;
use crate::storage::prompts::{AutoPrompts, random_prompt};
use crate::util::time::format_age;

/// Execute a `credential` subcommand.
///
/// # Errors
/// Returns an error if the record cannot be read.
pub fn credential(cmd: &CredentialCommand, config: &ResolvedConfig) -> Result<()> {
    match cmd {
        CredentialCommand::Show => {
            let store = context::credential_store(config)?;
            let credential = store.current();
            let persisted = store.path().exists();

            println!("Record:       {}", store.path().display());
            println!("Persisted:    {}", if persisted { "yes" } else { "no" });
            println!("Rotations:    {}", credential.rotation_count);
            println!(
                "Issued:       {} ({})",
                credential.issued_at.format("%Y-%m-%d %H:%M:%S UTC"),
                format_age(credential.issued_at, chrono::Utc::now())
            );
            if credential.token.is_empty() {
                println!("Token:        (none)");
            } else {
                println!("Fingerprint:  {}", credential.fingerprint());
            }
            Ok(())
        }
    }
}

/// Execute the random-prompt command.
///
/// # Errors
/// [`RelayError::CacheMiss`] when there is nothing to choose from.
pub fn random(args: &RandomPromptArgs, config: &ResolvedConfig) -> Result<()> {
    let cache = ImageCache::new(config.paths.images_dir());
    let prompts = if args.include_auto {
        AutoPrompts::load(&config.paths.prompts_file())?
    } else {
        AutoPrompts::default()
    };

    match random_prompt(&cache, &prompts, !args.include_auto)? {
        Some(prompt) => {
            println!("{prompt}");
            Ok(())
        }
        None => Err(RelayError::CacheMiss {
            key: "<any>".to_string(),
        }),
    }
}

/// Execute a `cache` subcommand.
///
/// # Errors
/// Returns an error if the cache directory cannot be listed.
pub fn cache(cmd: &CacheCommand, config: &ResolvedConfig) -> Result<()> {
    match cmd {
        CacheCommand::List => {
            let cache = ImageCache::new(config.paths.images_dir());
            let mut entries = Vec::new();
            for key in cache.keys()? {
                match cache.entry(&key) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => tracing::warn!(prompt_key = %key, error = %e, "Skipping unreadable entry"),
                }
            }

            if entries.is_empty() {
                println!("No cached prompts in {}", cache.root().display());
                return Ok(());
            }

            entries.sort_by(|a, b| a.prompt_text.cmp(&b.prompt_text));
            println!("{:<12} {:>6}  Prompt", "Key", "Images");
            println!("{:-<12} {:->6}  {:-<40}", "", "", "");
            for entry in entries {
                println!(
                    "{:<12} {:>6}  {}",
                    &entry.prompt_key[..12],
                    entry.image_paths.len(),
                    entry.prompt_text
                );
            }
            Ok(())
        }
    }
}
