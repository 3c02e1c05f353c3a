/// Appends `key=value`, choosing `?` or `&` by whether `endpoint` already
/// carries a query string.
pub fn append_query(endpoint: &str, key: &str, value: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", endpoint, separator, key, value)
}

/// Millisecond timestamp parameter that defeats intermediary caches.
pub fn with_cache_buster(endpoint: &str) -> String {
    append_query(endpoint, "_", &chrono::Utc::now().timestamp_millis().to_string())
}
