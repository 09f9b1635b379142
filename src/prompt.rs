//! Line prompts on stdin for values not given as flags

use anyhow::{Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Print `label` and read one trimmed line.
pub async fn line(label: &str) -> Result<String> {
    print!("{}: ", label);
    std::io::stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut input)
        .await
        .context("Failed to read from stdin")?;
    Ok(input.trim().to_string())
}

/// The flag value when given, otherwise ask for it.
pub async fn or_ask(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None => line(label).await,
    }
}
