//! Set command implementation.

use super::StoreOptions;
use serde_json::Value;

/// Runs the set command.
///
/// `value` must be valid JSON. It is stored in compact form.
pub async fn run(
    options: &StoreOptions,
    key: &str,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed: Value =
        serde_json::from_str(value).map_err(|e| format!("Value is not valid JSON: {e}"))?;

    let root = super::open(options).await?;
    root.set(key, Some(&parsed), options.security()).await?;

    println!("Stored `{key}` ({:?})", options.security());
    Ok(())
}
