//! Canonical forms for structural names.
//!
//! Domain names, type names, relationship names and labels are upper-case
//! `[A-Z0-9_]`; property keys are lower-case `[a-z0-9_]`. Everything that
//! reaches a Cypher statement as text must have passed through one of these
//! functions first.

use crate::error::{Result, StrataError};

/// Attributes every object node carries; they can be neither property keys
/// nor labels.
pub const RESERVED_KEYS: [&str; 4] = ["id", "name", "type", "domain"];

/// Prefix of the synthetic per-domain umbrella label.
pub const DOMAIN_LABEL_PREFIX: char = '_';

fn is_reserved(candidate: &str) -> bool {
    RESERVED_KEYS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(candidate))
}

/// True if `s` is non-empty and entirely `[A-Z0-9_]`.
pub fn is_upper_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

/// True if `s` is non-empty and entirely `[a-z0-9_]`.
pub fn is_lower_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Normalise a domain, type, or relationship-schema name.
pub fn normalize_name(raw: &str) -> Result<String> {
    let value = raw.trim().to_ascii_uppercase();
    if value.is_empty() {
        return Err(StrataError::InvalidName {
            value,
            reason: "must not be empty",
        });
    }
    if !is_upper_ident(&value) {
        return Err(StrataError::InvalidName {
            value,
            reason: "only [A-Z0-9_] allowed",
        });
    }
    if is_reserved(&value) {
        return Err(StrataError::InvalidName {
            value,
            reason: "collides with a reserved attribute",
        });
    }
    Ok(value)
}

/// Normalise a user-supplied node label.
///
/// Labels starting with `_` belong to the domain umbrella and are never
/// accepted from callers.
pub fn normalize_label(raw: &str) -> Result<String> {
    let value = raw.trim().to_ascii_uppercase();
    if value.is_empty() {
        return Err(StrataError::InvalidName {
            value,
            reason: "label must not be empty",
        });
    }
    if !is_upper_ident(&value) {
        return Err(StrataError::InvalidName {
            value,
            reason: "only [A-Z0-9_] allowed in labels",
        });
    }
    if value.starts_with(DOMAIN_LABEL_PREFIX) || is_reserved(&value) {
        return Err(StrataError::ReservedLabel(value));
    }
    Ok(value)
}

/// Normalise a property key.
pub fn normalize_property_key(raw: &str) -> Result<String> {
    let key = raw.trim().to_ascii_lowercase();
    if key.is_empty() {
        return Err(StrataError::InvalidPropertyKey {
            key,
            reason: "must not be empty",
        });
    }
    if !is_lower_ident(&key) {
        return Err(StrataError::InvalidPropertyKey {
            key,
            reason: "only [a-z0-9_] allowed",
        });
    }
    if is_reserved(&key) {
        return Err(StrataError::InvalidPropertyKey {
            key,
            reason: "reserved system key",
        });
    }
    Ok(key)
}

/// Object node names are data, not structure: trimmed, never empty, case kept.
pub fn normalize_node_name(raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(StrataError::InvalidName {
            value: value.to_string(),
            reason: "object name must not be empty",
        });
    }
    Ok(value.to_string())
}

/// The umbrella label attached to every object node of `domain`.
pub fn domain_label(domain: &str) -> String {
    format!("{DOMAIN_LABEL_PREFIX}{domain}")
}
