//! Lookup rules for route bindings, query strings and form bodies.

/// Canonical key for a path parameter: one leading `:` and lowercase.
///
/// ```rust
/// use http_context::params::normalize;
///
/// assert_eq!(normalize("id"), ":id");
/// assert_eq!(normalize(":ID"), ":id");
/// ```
pub fn normalize(name: &str) -> String {
    let bare = name.strip_prefix(':').unwrap_or(name);
    let mut key = String::with_capacity(bare.len() + 1);
    key.push(':');
    key.push_str(&bare.to_lowercase());
    key
}

/// Finds `name` in a `key=value&key=value` body.
///
/// Keys compare case-insensitively and the first match wins. The value is
/// returned verbatim, without percent-decoding: everything after the first
/// `=`, or the whole pair when it has no `=`. Callers depend on this legacy
/// behavior, so it is kept as is.
///
/// ```rust
/// use http_context::params::form_value;
///
/// assert_eq!(form_value("a=1&b=2", "A"), Some("1"));
/// assert_eq!(form_value("token=a=b", "token"), Some("a=b"));
/// assert_eq!(form_value("flag", "flag"), Some("flag"));
/// assert_eq!(form_value("a=1", "b"), None);
/// ```
pub fn form_value<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let name = name.to_lowercase();
    body.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, pair));
        (key.to_lowercase() == name).then_some(value)
    })
}

/// Decodes a query string into ordered `(name, value)` pairs.
///
/// Percent escapes and `+` are decoded. A key without `=` yields an empty value.
pub(crate) fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|query| serde_urlencoded::from_str(query).unwrap_or_default())
        .unwrap_or_default()
}
