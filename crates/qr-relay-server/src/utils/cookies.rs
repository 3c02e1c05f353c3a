//! Cookie bookkeeping for relayed sessions.
//!
//! Cookie names are compared case-sensitively. Parsing never fails: a
//! malformed `Set-Cookie` value simply contributes nothing.

use regex::Regex;
use std::collections::BTreeMap;

/// Cookie name -> value. Ordered so `cookie_string` output is stable.
pub type CookieMap = BTreeMap<String, String>;

/// Overwrite-union of `incoming` into `target`; later values win.
///
/// An empty incoming value (a `Max-Age=0` deletion) never clears a value we
/// already hold.
pub fn merge(target: &mut CookieMap, incoming: &CookieMap) {
    for (name, value) in incoming {
        if value.is_empty() && target.get(name).is_some_and(|v| !v.is_empty()) {
            continue;
        }
        target.insert(name.clone(), value.clone());
    }
}

/// Renders `a=1; b=2` for a `Cookie` request header.
pub fn cookie_string(cookies: &CookieMap) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pulls `name=value` out of a single `Set-Cookie` header value.
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}

/// Collects every parseable `Set-Cookie` value into a map.
pub fn from_set_cookie_headers<'a, I>(headers: I) -> CookieMap
where
    I: IntoIterator<Item = &'a str>,
{
    headers.into_iter().filter_map(parse_set_cookie).collect()
}

/// Pattern search for `name=<value>` anywhere in raw `Set-Cookie` text.
///
/// Catches values that a structured parse misses, e.g. several cookies
/// folded into one header line.
pub fn find_in_raw<'a, I>(headers: I, name: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let pattern = format!(r"(?:^|[\s;,]){}=([^;,\s]+)", regex::escape(name));
    let re = Regex::new(&pattern).ok()?;

    headers.into_iter().find_map(|raw| {
        re.captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    })
}
