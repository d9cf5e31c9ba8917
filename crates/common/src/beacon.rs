//! Beacon query string decoding

use std::collections::HashMap;

/// Decode the query string of a captured request URL into a flat map.
///
/// The whole query string is percent-decoded before it is split on `&` and
/// `=`, so an encoded `&` inside a value splits the pair just like a literal
/// one would. Duplicate keys keep the last value. A URL without `?` yields
/// an empty map.
pub fn parse_query(url: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    let query = match url.split_once('?') {
        Some((_, query)) => query,
        None => return params,
    };

    let decoded = decode_component(query);
    for pair in decoded.split('&') {
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key, value),
            None => (pair, ""),
        };
        if key.is_empty() {
            continue;
        }
        params.insert(key.to_string(), value.to_string());
    }

    params
}

/// Percent-decode, replacing invalid UTF-8 instead of failing
pub fn decode_component(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned(),
    }
}
