//! Remove command implementation.

use super::StoreOptions;

/// Runs the rm command.
pub async fn run(options: &StoreOptions, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let root = super::open(options).await?;
    root.erase(key, options.security()).await?;

    println!("Removed `{key}`");
    Ok(())
}
