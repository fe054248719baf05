//! Get command implementation.

use super::StoreOptions;

/// Runs the get command.
pub async fn run(options: &StoreOptions, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let root = super::open(options).await?;

    match root.read(key, options.security()).await? {
        Some(raw) => println!("{raw}"),
        None => println!("(absent)"),
    }

    Ok(())
}
