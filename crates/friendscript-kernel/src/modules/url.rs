//! url: split and join addresses.
//!
//! Addresses without a scheme get the environment's default scheme, which is
//! handed to [`module`] when the environment is built.

use std::sync::LazyLock;

use anyhow::{anyhow, Context};
use regex::Regex;
use serde::{Deserialize, Serialize};

use friendscript_types::{Object, Value};

use crate::dispatch::{CommandSet, Options};

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*)://)?(?:(?P<user>[^@/?#]*)@)?(?P<host>[^/:?#]*)(?::(?P<port>\d+))?(?P<path>[^?#]*)(?:\?(?P<query>[^#]*))?(?:#(?P<fragment>.*))?$",
    )
    .expect("valid url regex")
});

/// The parts of an address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Url {
    pub scheme: String,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    /// Decoded query parameters. Repeated keys collect into an array.
    pub query: Object,
    pub fragment: Option<String>,
}

impl Url {
    /// `scheme://[user@]host[:port]`
    pub fn origin(&self) -> String {
        let mut origin = format!("{}://", self.scheme);
        if let Some(user) = &self.user {
            origin.push_str(user);
            origin.push('@');
        }
        origin.push_str(&self.host);
        if let Some(port) = self.port {
            origin.push_str(&format!(":{port}"));
        }
        origin
    }
}

/// `join` options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JoinOptions {
    /// Absolute address, absolute path, or a path relative to the base.
    pub path: String,
}

pub fn module(default_scheme: String) -> CommandSet {
    let join_scheme = default_scheme.clone();
    CommandSet::new("url")
        .command("parse", "Split an address into its parts", move |address: String| {
            parse_url(&address, &default_scheme)
        })
        .command(
            "join",
            "Resolve a path against a base address",
            move |base: String, options: Options<JoinOptions>| join(&base, &options.path, &join_scheme),
        )
}

/// Parse `address`, assuming `default_scheme` when it has none.
pub fn parse_url(address: &str, default_scheme: &str) -> anyhow::Result<Url> {
    let address = address.trim();
    let captures = URL_PATTERN
        .captures(address)
        .ok_or_else(|| anyhow!("url::parse: cannot parse '{address}'"))?;
    let part = |name: &str| captures.name(name).map(|m| m.as_str());

    let host = part("host").unwrap_or_default();
    if host.is_empty() {
        return Err(anyhow!("url::parse: '{address}' has no host"));
    }
    let port = part("port")
        .map(str::parse::<u16>)
        .transpose()
        .with_context(|| format!("url::parse: bad port in '{address}'"))?;

    let path = match part("path") {
        Some("") | None => "/".to_string(),
        Some(path) => path.to_string(),
    };

    Ok(Url {
        scheme: part("scheme").unwrap_or(default_scheme).to_ascii_lowercase(),
        user: part("user").map(str::to_string),
        host: host.to_ascii_lowercase(),
        port,
        path,
        query: part("query").map(parse_query).unwrap_or_default(),
        fragment: part("fragment").map(str::to_string),
    })
}

fn join(base: &str, path: &str, default_scheme: &str) -> anyhow::Result<String> {
    if path.contains("://") {
        return Ok(path.to_string());
    }
    let base = parse_url(base, default_scheme)?;
    if path.is_empty() {
        return Ok(format!("{}{}", base.origin(), base.path));
    }
    if path.starts_with('/') {
        return Ok(format!("{}{}", base.origin(), path));
    }
    let directory = match base.path.rfind('/') {
        Some(slash) => &base.path[..=slash],
        None => "/",
    };
    Ok(format!("{}{}{}", base.origin(), directory, path))
}

fn parse_query(query: &str) -> Object {
    let mut params = Object::new();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode(key);
        let value = Value::String(decode(value));
        match params.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = std::mem::take(existing);
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                params.insert(key, value);
            }
        }
    }
    params
}

/// Percent-decoding with `+` as space. Malformed escapes pass through.
fn decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3]).ok().and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'%'),
                }
            }
            byte => out.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::dispatch;

    #[test]
    fn parses_every_part() {
        let url = parse_url("HTTP://me@Example.com:8080/a/b?x=1&y=two+words&x=3#top", "https").expect("parse");
        assert_eq!(url.scheme, "http");
        assert_eq!(url.user.as_deref(), Some("me"));
        assert_eq!(url.host, "example.com");
        assert_eq!(url.port, Some(8080));
        assert_eq!(url.path, "/a/b");
        assert_eq!(url.query.get("y"), Some(&Value::from("two words")));
        assert_eq!(
            url.query.get("x"),
            Some(&Value::Array(vec![Value::from("1"), Value::from("3")]))
        );
        assert_eq!(url.fragment.as_deref(), Some("top"));
    }

    #[test]
    fn default_scheme_is_applied() {
        let url = parse_url("example.com", "ftp").expect("parse");
        assert_eq!(url.scheme, "ftp");
        assert_eq!(url.path, "/");
        assert!(parse_url("", "https").is_err());
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(decode("a%20b%2Fc"), "a b/c");
        assert_eq!(decode("100%"), "100%");
        assert_eq!(decode("%zz"), "%zz");
    }

    #[test]
    fn join_resolves_relative_and_absolute_paths() {
        assert_eq!(join("https://h.io/a/b", "c", "https").expect("join"), "https://h.io/a/c");
        assert_eq!(join("https://h.io/a/b", "/root", "https").expect("join"), "https://h.io/root");
        assert_eq!(join("h.io", "x", "http").expect("join"), "http://h.io/x");
        assert_eq!(join("https://h.io", "ftp://other/", "https").expect("join"), "ftp://other/");
    }

    #[test]
    fn module_threads_the_configured_scheme() {
        let value = dispatch(&module("http".into()), "parse", Some(Value::from("example.com/p")), None).expect("parse");
        let Value::Object(parts) = value else {
            panic!("expected an object");
        };
        assert_eq!(parts.get("scheme"), Some(&Value::from("http")));
        assert_eq!(parts.get("path"), Some(&Value::from("/p")));
    }
}
