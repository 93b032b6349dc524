//! SQL identifier and literal quoting

/// Quote a SQL identifier, doubling embedded double quotes.
///
/// # Examples
/// ```
/// use kf_sql::quote::quote_ident;
/// assert_eq!(quote_ident("plans"), r#""plans""#);
/// assert_eq!(quote_ident(r#"my"table"#), r#""my""table""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified name (e.g. `staging.facts`), one part at a time.
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Escape a value for use inside a single-quoted string literal.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Render a single-quoted string literal.
pub fn quote_string(value: &str) -> String {
    format!("'{}'", escape_sql_string(value))
}
