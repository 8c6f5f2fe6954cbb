//! Identifier validation and quoting shared by every dialect.
//!
//! Identifiers cannot be bound as parameters, so table and column names are
//! spliced into SQL text. They are validated first and then wrapped in the
//! dialect's quote characters with the closing character doubled.

use crate::error::{CopyError, Result};

/// Maximum identifier length (conservative limit across databases).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before it is spliced into SQL.
///
/// Rejects empty names, names containing NUL bytes and names longer than
/// [`MAX_IDENTIFIER_LENGTH`] bytes per dotted part.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CopyError::planning(name, "identifier cannot be empty"));
    }

    if name.contains('\0') {
        return Err(CopyError::planning(
            name.replace('\0', "\\0"),
            "identifier contains a null byte",
        ));
    }

    if let Some(part) = name.split('.').find(|p| p.len() > MAX_IDENTIFIER_LENGTH) {
        return Err(CopyError::planning(
            name,
            format!(
                "identifier part exceeds {} bytes (got {})",
                MAX_IDENTIFIER_LENGTH,
                part.len()
            ),
        ));
    }

    Ok(())
}

/// Wrap an identifier in `open`/`close`.
///
/// - surrounding whitespace is trimmed and an empty name passes through
/// - a name already wrapped in `open`/`close` is returned unchanged
/// - a dotted name (`schema.table`) has each part quoted separately
/// - `close` inside a part is doubled
pub fn quote_with(name: &str, open: char, close: char) -> String {
    let name = name.trim();
    if name.is_empty() {
        return String::new();
    }
    if is_wrapped(name, open, close) {
        return name.to_string();
    }
    if name.contains('.') && !name.contains(open) && !name.contains(close) {
        return name
            .split('.')
            .map(|part| quote_part(part.trim(), open, close))
            .collect::<Vec<_>>()
            .join(".");
    }
    quote_part(name, open, close)
}

fn quote_part(part: &str, open: char, close: char) -> String {
    let escaped = part.replace(close, &format!("{close}{close}"));
    format!("{open}{escaped}{close}")
}

fn is_wrapped(name: &str, open: char, close: char) -> bool {
    name.len() >= 2 && name.starts_with(open) && name.ends_with(close)
}

/// Split `schema.table` into its parts with any quote characters removed.
pub fn split_qualified(name: &str) -> (Option<String>, String) {
    let bare: String = name
        .trim()
        .chars()
        .filter(|c| !matches!(c, '"' | '`' | '[' | ']'))
        .collect();
    if let Some((schema, table)) = bare.rsplit_once('.').filter(|(s, _)| !s.is_empty()) {
        return (Some(schema.to_string()), table.to_string());
    }
    (None, bare)
}

/// Escape a value for use inside a single-quoted SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
