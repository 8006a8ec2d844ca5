//! Name validation for stage configuration.
//!
//! Attribute names and driver class names end up in generated operator
//! parameters and in JDBC driver loading, so both are held to strict
//! character rules before a request descriptor is produced.

use crate::error::Error;

/// Validate an attribute identifier (schema attributes, `sql_attribute`,
/// `sql_params` entries).
///
/// - Must not be empty
/// - Maximum 255 characters
/// - Must start with ASCII letter or underscore
/// - May only contain ASCII alphanumeric characters and underscores
///
/// # Examples
///
/// ```
/// use sqlstage::security::validate_identifier;
///
/// assert!(validate_identifier("sql").is_ok());
/// assert!(validate_identifier("_private").is_ok());
///
/// assert!(validate_identifier("x; DROP TABLE users--").is_err());
/// assert!(validate_identifier("").is_err());
/// assert!(validate_identifier("1abc").is_err());
/// ```
pub fn validate_identifier(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::config("identifier cannot be empty"));
    }

    if name.len() > 255 {
        return Err(Error::config(format!(
            "identifier too long: {} chars (max 255)",
            name.len()
        )));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => {
            return Err(Error::config(format!(
                "Invalid identifier '{}': must start with a letter or underscore",
                name
            )));
        }
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(Error::config(format!(
                "Invalid identifier '{}': contains invalid character '{}'",
                name, c
            )));
        }
    }

    Ok(())
}

/// Validate a fully qualified JDBC driver class name such as
/// `com.ibm.db2.jcc.DB2Driver`.
///
/// Every dot-separated segment must be a Java identifier (ASCII letters,
/// digits, `_` and `$`, not starting with a digit). Empty segments are
/// rejected, so are leading or trailing dots.
///
/// # Examples
///
/// ```
/// use sqlstage::security::validate_driver_class;
///
/// assert!(validate_driver_class("com.ibm.db2.jcc.DB2Driver").is_ok());
/// assert!(validate_driver_class("Driver").is_ok());
/// assert!(validate_driver_class("com..Driver").is_err());
/// assert!(validate_driver_class("com.any.DB Driver").is_err());
/// ```
pub fn validate_driver_class(class: &str) -> crate::Result<()> {
    if class.is_empty() {
        return Err(Error::config("JDBC driver class cannot be empty"));
    }

    for segment in class.split('.') {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
            _ => {
                return Err(Error::config(format!(
                    "Invalid JDBC driver class '{}': bad segment '{}'",
                    class, segment
                )));
            }
        }
        if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$')) {
            return Err(Error::config(format!(
                "Invalid JDBC driver class '{}': contains invalid character '{}'",
                class, c
            )));
        }
    }

    Ok(())
}
