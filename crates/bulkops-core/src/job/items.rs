//! Work-item validation
//!
//! A run's item list is fixed once accepted, so every check happens up front.
//! Any failure here is fatal for the run.

use std::collections::HashSet;

use crate::error::{Error, Result};

/// Maximum domain name length (RFC 1035)
const MAX_DOMAIN_LEN: usize = 253;

/// Maximum label length (RFC 1035)
const MAX_LABEL_LEN: usize = 63;

/// Normalize and validate the item list of a new run
///
/// Items are trimmed and lowercased. The list must be non-empty and contain
/// only valid, distinct domain names; the original order is kept.
pub fn normalize_items(items: Vec<String>) -> Result<Vec<String>> {
    if items.is_empty() {
        return Err(Error::fatal("Item list is empty"));
    }

    let mut seen = HashSet::with_capacity(items.len());
    let mut normalized = Vec::with_capacity(items.len());

    for (position, item) in items.into_iter().enumerate() {
        let domain = item.trim().to_ascii_lowercase();
        validate_domain_name(&domain)
            .map_err(|reason| Error::fatal(format!("Invalid item #{}: {}", position + 1, reason)))?;
        if !seen.insert(domain.clone()) {
            return Err(Error::fatal(format!(
                "Duplicate item #{}: {}",
                position + 1,
                domain
            )));
        }
        normalized.push(domain);
    }

    Ok(normalized)
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; not comprehensive but catches common input errors.
pub fn validate_domain_name(domain: &str) -> std::result::Result<(), String> {
    if domain.is_empty() {
        return Err("Domain name cannot be empty".to_string());
    }

    if domain.len() > MAX_DOMAIN_LEN {
        return Err(format!(
            "Domain name too long: {} chars (max {})",
            domain.len(),
            MAX_DOMAIN_LEN
        ));
    }

    if !domain.contains('.') {
        return Err(format!("Domain name needs at least two labels: '{}'", domain));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err(format!("Domain name has empty label: '{}'", domain));
        }

        if label.len() > MAX_LABEL_LEN {
            return Err(format!(
                "Domain label too long: {} chars (max {}). Label: '{}'",
                label.len(),
                MAX_LABEL_LEN,
                label
            ));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(format!(
                "Domain label contains invalid characters: '{}'",
                label
            ));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!(
                "Domain label cannot start or end with hyphen: '{}'",
                label
            ));
        }
    }

    Ok(())
}
