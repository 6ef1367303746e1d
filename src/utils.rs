// ABOUTME: Identifier validation and quoting helpers
// ABOUTME: Keeps table, schema, and column names safe to splice into SQL text

use anyhow::{bail, Result};

/// Validate a PostgreSQL identifier (table, schema, or column name)
///
/// Identifiers declared in a sync manifest must be plain identifiers:
/// - 1 to 63 characters
/// - Start with a letter or underscore
/// - Only letters, digits, and underscores afterwards
///
/// Names discovered from a live catalog are never passed through this check;
/// they are always emitted through [`quote_ident`] instead.
///
/// # Examples
///
/// ```
/// # use erp_table_sync::utils::validate_postgres_identifier;
/// assert!(validate_postgres_identifier("contact_persons").is_ok());
/// assert!(validate_postgres_identifier("_audit").is_ok());
/// assert!(validate_postgres_identifier("1st_table").is_err());
/// assert!(validate_postgres_identifier("users; DROP TABLE users").is_err());
/// ```
pub fn validate_postgres_identifier(identifier: &str) -> Result<()> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        bail!("Identifier cannot be empty or whitespace-only");
    }

    // PostgreSQL truncates identifiers at NAMEDATALEN - 1
    if trimmed.len() > 63 {
        bail!(
            "Identifier '{}' exceeds maximum length of 63 characters (got {})",
            sanitize_identifier(trimmed),
            trimmed.len()
        );
    }

    let mut chars = trimmed.chars();
    if let Some(first_char) = chars.next() {
        if !first_char.is_ascii_alphabetic() && first_char != '_' {
            bail!(
                "Identifier '{}' must start with a letter or underscore, not '{}'",
                sanitize_identifier(trimmed),
                first_char
            );
        }
    }

    for (i, c) in trimmed.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            bail!(
                "Identifier '{}' contains invalid character '{}' at position {}. \
                 Only letters, digits, and underscores are allowed",
                sanitize_identifier(trimmed),
                if c.is_control() {
                    format!("\\x{:02x}", c as u32)
                } else {
                    c.to_string()
                },
                i
            );
        }
    }

    Ok(())
}

/// Strip control characters and cap the length of an identifier for display
///
/// # Examples
///
/// ```
/// # use erp_table_sync::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_table"), "normal_table");
/// assert_eq!(sanitize_identifier("table\x00name"), "tablename");
/// assert_eq!(sanitize_identifier(&"a".repeat(200)).len(), 100);
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Quote an identifier for use in SQL text
///
/// Always wraps the name in double quotes and doubles any embedded double
/// quote, so reserved words (`order`, `user`) and mixed-case names survive.
///
/// # Examples
///
/// ```
/// # use erp_table_sync::utils::quote_ident;
/// assert_eq!(quote_ident("customers"), "\"customers\"");
/// assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Schema-qualified, quoted table name: `"schema"."table"`
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}
