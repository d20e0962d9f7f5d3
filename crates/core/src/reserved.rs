//! Reserved schema fields
//!
//! Every multi-version entity carries two hidden fields. They belong to the
//! on-disk schema contract and are only written by internal rewrite logic.

use crate::error::{Error, Result};
use crate::value::Value;

/// Identity field (`entry_id` of the record)
pub const IDENTIFIER_KEY: &str = "_eid";

/// Version field (see [`crate::version::Version`])
pub const VERSION_KEY: &str = "_vid";

/// All reserved field names
pub const RESERVED_FIELDS: [&str; 2] = [IDENTIFIER_KEY, VERSION_KEY];

/// Whether a field name is reserved
pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// Reject the first reserved name in `fields`
pub fn check_fields<'a, I>(fields: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    match fields.into_iter().find(|f| is_reserved(f)) {
        Some(field) => Err(Error::reserved_field(field)),
        None => Ok(()),
    }
}

/// Reject documents (and nested documents) that carry a reserved key
pub fn check_value(value: &Value) -> Result<()> {
    match value {
        Value::Document(fields) => {
            check_fields(fields.keys().map(String::as_str))?;
            fields.values().try_for_each(check_value)
        }
        Value::List(items) => items.iter().try_for_each(check_value),
        _ => Ok(()),
    }
}

/// Field names with the reserved ones removed, for user-visible projections
pub fn user_visible<'a>(fields: &'a [String]) -> impl Iterator<Item = &'a String> + 'a {
    fields.iter().filter(|f| !is_reserved(f))
}
