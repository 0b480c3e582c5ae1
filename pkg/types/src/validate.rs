use anyhow::{Result, bail};

use crate::scope::{ScopeSelector, ScopeSelectorOperator};

/// Validate a DNS-label style object name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Validate a scope selector.
/// `In`/`NotIn` need a non-empty value set; scope names must be set.
pub fn validate_scope_selector(selector: &ScopeSelector) -> Result<()> {
    for (i, req) in selector.match_expressions.iter().enumerate() {
        if req.scope_name.as_str().is_empty() {
            bail!("match_expressions[{}]: scope name must not be empty", i);
        }
        match req.operator {
            ScopeSelectorOperator::In | ScopeSelectorOperator::NotIn if req.values.is_empty() => {
                bail!(
                    "match_expressions[{}]: operator {} on scope {} requires at least one value",
                    i,
                    req.operator,
                    req.scope_name
                );
            }
            _ => {}
        }
    }
    Ok(())
}
