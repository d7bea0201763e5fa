//! Normalisation and schema checks for client-supplied input.

use std::collections::{BTreeMap, BTreeSet};

use strata_core::naming::{normalize_label, normalize_property_key};
use strata_core::{
    PropertyDecl, PropertyDecls, PropertyKind, Properties, RawProperties, Result, StrataError,
};

/// Requested property declarations, keyed by raw property key.
pub type PropertyInputs = BTreeMap<String, PropertyKind>;

/// Check `raw` against `decls`, returning typed values under normalised keys.
///
/// `owner` names the schema in violation messages.
pub fn properties(decls: &PropertyDecls, raw: &RawProperties, owner: &str) -> Result<Properties> {
    let mut out = Properties::new();
    for (raw_key, value) in raw {
        let key = normalize_property_key(raw_key)?;
        let decl = decls
            .get(&key)
            .ok_or_else(|| StrataError::property(&key, format!("not declared on {owner}")))?;
        let typed = decl.kind.coerce(value).ok_or_else(|| {
            StrataError::property(&key, format!("expected {}, got {value}", decl.kind))
        })?;
        if out.insert(key.clone(), typed).is_some() {
            return Err(StrataError::property(key, "supplied more than once"));
        }
    }
    Ok(out)
}

/// Normalise declarations, rejecting keys that collide after normalisation.
pub fn declarations(inputs: &PropertyInputs) -> Result<PropertyDecls> {
    let mut out = PropertyDecls::new();
    for (raw_key, kind) in inputs {
        let key = normalize_property_key(raw_key)?;
        if out.insert(key.clone(), PropertyDecl::new(*kind)).is_some() {
            return Err(StrataError::property(key, "declared more than once"));
        }
    }
    Ok(out)
}

pub fn property_keys(raw: &[String]) -> Result<Vec<String>> {
    let keys: BTreeSet<String> = raw
        .iter()
        .map(|k| normalize_property_key(k))
        .collect::<Result<_>>()?;
    Ok(keys.into_iter().collect())
}

/// Caller-supplied labels as a set; duplicates collapse.
pub fn labels(raw: &[String]) -> Result<BTreeSet<String>> {
    raw.iter().map(|l| normalize_label(l)).collect()
}
