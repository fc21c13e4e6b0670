use regex::Regex;

use crate::bot::dispatcher::BotError;

/* Common utilities for handlers. */

// Parse an amount. Reads a string, returns a positive f64.
pub fn parse_amount(text: &str) -> Result<f64, BotError> {
    let amount = text
        .trim()
        .parse::<f64>()
        .map_err(|_| BotError::UserError("Invalid number provided.".to_string()))?;

    if !amount.is_finite() || amount <= 0.0 {
        Err(BotError::UserError("Amount must be positive.".to_string()))
    } else {
        Ok(amount)
    }
}

// Signed variant for administrative overrides.
pub fn parse_signed_amount(text: &str) -> Result<f64, BotError> {
    let amount = text
        .trim()
        .parse::<f64>()
        .map_err(|_| BotError::UserError("Invalid number provided.".to_string()))?;
    if !amount.is_finite() {
        return Err(BotError::UserError("Invalid number provided.".to_string()));
    }
    Ok(amount)
}

// Normalizes a username argument: optional leading '@', lowercased.
pub fn parse_username(text: &str) -> String {
    text.trim().trim_start_matches('@').to_lowercase()
}

// Extracts the name out of a "{tag}" attachment argument.
pub fn extract_tag(argument: &str) -> Option<String> {
    let tag_re = Regex::new(r"^\{(.+)\}$").unwrap();
    tag_re
        .captures(argument.trim())
        .map(|captures| captures[1].to_string())
}

// Balances read nicer without a trailing ".00".
pub fn display_points(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{:.0}", value.round())
    } else {
        format!("{value:.2}")
    }
}
