//! `key=value;` connection-string parsing and endpoint extraction

use crate::error::{CascadeError, CascadeResult};
use std::fmt;

/// Keys that may name the server, in lookup order
const SERVER_KEYS: &[&str] = &[
    "server",
    "data source",
    "address",
    "addr",
    "network address",
    "host",
];

/// File extensions that mark a `Data Source` as an embedded database file
const FILE_EXTENSIONS: &[&str] = &[".db", ".sqlite", ".sqlite3", ".mdb", ".mdf", ".sdf"];

/// Parsed `key=value` pairs, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStringParts {
    pairs: Vec<(String, String)>,
}

impl ConnectionStringParts {
    /// Parse `key=value;key2="quoted;value"`.
    ///
    /// Keys are trimmed and matched case-insensitively; values may be wrapped
    /// in single or double quotes, a doubled quote standing for itself.
    pub fn parse(raw: &str) -> CascadeResult<Self> {
        let mut pairs = Vec::new();
        let mut chars = raw.chars().peekable();

        loop {
            // key
            let mut key = String::new();
            let mut has_value = false;
            for c in chars.by_ref() {
                if c == '=' {
                    has_value = true;
                    break;
                }
                if c == ';' {
                    if key.trim().is_empty() {
                        key.clear();
                        continue;
                    }
                    return Err(CascadeError::invalid_input(format!(
                        "connection string segment {:?} has no value",
                        key.trim()
                    )));
                }
                key.push(c);
            }
            let key = key.trim().to_string();
            if !has_value {
                if key.is_empty() {
                    break;
                }
                return Err(CascadeError::invalid_input(format!(
                    "connection string segment {key:?} has no value"
                )));
            }
            if key.is_empty() {
                return Err(CascadeError::invalid_input(
                    "connection string contains a value without a key",
                ));
            }

            // value
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            let mut value = String::new();
            match chars.peek().copied() {
                Some(quote @ ('"' | '\'')) => {
                    chars.next();
                    let mut closed = false;
                    while let Some(c) = chars.next() {
                        if c == quote {
                            if chars.peek() == Some(&quote) {
                                chars.next();
                                value.push(quote);
                                continue;
                            }
                            closed = true;
                            break;
                        }
                        value.push(c);
                    }
                    if !closed {
                        return Err(CascadeError::invalid_field(
                            key,
                            "unterminated quoted value",
                        ));
                    }
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                    }
                }
                _ => {
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                        value.push(c);
                    }
                    value = value.trim().to_string();
                }
            }

            pairs.push((key, value));
            if chars.peek().is_none() {
                break;
            }
        }

        Ok(Self { pairs })
    }

    /// Value of `key`; the last occurrence wins
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Network endpoint the connection string points at, if any
    pub fn endpoint(&self) -> Option<Endpoint> {
        let (key, raw) = SERVER_KEYS
            .iter()
            .find_map(|key| self.get(key).map(|value| (*key, value)))?;
        let mut endpoint = Endpoint::parse(raw)?;

        if key == "data source" && endpoint.port.is_none() && looks_like_file(&endpoint.host) {
            return None;
        }
        if endpoint.port.is_none() {
            endpoint.port = self.get("port").and_then(|p| p.trim().parse().ok());
        }
        Some(endpoint)
    }

    /// Render back to `key=value;` form, values containing `;` quoted
    pub fn to_connection_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| {
                if v.contains(';') || v.contains('"') {
                    format!("{k}=\"{}\";", v.replace('"', "\"\""))
                } else {
                    format!("{k}={v};")
                }
            })
            .collect()
    }
}

/// Host and optional port of a database server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<u16>,
}

impl Endpoint {
    /// Parse `tcp:host,1433`, `host:5432`, `host\instance`, `(local)` and
    /// similar server values
    pub fn parse(raw: &str) -> Option<Self> {
        let mut value = raw.trim();
        for prefix in ["tcp:", "TCP:"] {
            if let Some(rest) = value.strip_prefix(prefix) {
                value = rest;
            }
        }

        let (host_part, port) = if let Some((host, port)) = value.split_once(',') {
            (host, port.trim().parse().ok())
        } else if let Some(inner) = value.strip_prefix('[') {
            // [::1]:5432
            let (host, rest) = inner.split_once(']')?;
            let port = rest.strip_prefix(':').and_then(|p| p.parse().ok());
            return Some(Self {
                host: host.to_string(),
                port,
            });
        } else {
            match value.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
                    (host, port.parse().ok())
                }
                _ => (value, None),
            }
        };

        let host = host_part
            .split('\\')
            .next()
            .unwrap_or_default()
            .trim();
        let host = match host.to_ascii_lowercase().as_str() {
            "." | "(local)" | "localhost" => "localhost".to_string(),
            _ => host.to_string(),
        };
        if host.is_empty() || host.contains('/') || host.starts_with('(') || host.ends_with(':') {
            return None;
        }
        Some(Self { host, port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) if self.host.contains(':') => write!(f, "[{}]:{port}", self.host),
            Some(port) => write!(f, "{}:{port}", self.host),
            None => f.write_str(&self.host),
        }
    }
}

fn looks_like_file(host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    FILE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) || lower == ":memory:"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let parts = ConnectionStringParts::parse(
            "Server=tcp:db.internal,1433; Database = orders ;User Id=app;Password=\"p;w\"\"d\";",
        )
        .unwrap();

        assert_eq!(parts.len(), 4);
        assert_eq!(parts.get("server"), Some("tcp:db.internal,1433"));
        assert_eq!(parts.get("DATABASE"), Some("orders"));
        assert_eq!(parts.get("password"), Some("p;w\"d"));
    }

    #[test]
    fn test_parse_tolerates_empty_segments() {
        let parts = ConnectionStringParts::parse(";;Host=db;;Port=5432;").unwrap();
        assert_eq!(parts.get("host"), Some("db"));
        assert_eq!(parts.get("port"), Some("5432"));
        assert!(ConnectionStringParts::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConnectionStringParts::parse("Server=db;Trusted").is_err());
        assert!(ConnectionStringParts::parse("Password='open").is_err());
        assert!(ConnectionStringParts::parse("=value").is_err());
    }

    #[test]
    fn test_endpoint_extraction() {
        let cases = [
            ("Server=tcp:db.internal,1433;", Some(("db.internal", Some(1433)))),
            ("Data Source=sql01\\PROD;", Some(("sql01", None))),
            ("Host=pg.local;Port=5432;", Some(("pg.local", Some(5432)))),
            ("Server=mysql.local:3306;", Some(("mysql.local", Some(3306)))),
            ("Address=(local);", Some(("localhost", None))),
            ("Network Address=[::1]:5432;", Some(("::1", Some(5432)))),
            ("Data Source=orders.db;", None),
            ("Data Source=/var/lib/app/orders.sqlite;", None),
            ("Data Source=(localdb)\\MSSQLLocalDB;", None),
            ("Database=orders;", None),
        ];

        for (raw, expected) in cases {
            let endpoint = ConnectionStringParts::parse(raw).unwrap().endpoint();
            let actual = endpoint.as_ref().map(|e| (e.host.as_str(), e.port));
            assert_eq!(actual, expected, "{raw}");
        }
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::parse("db,1433").unwrap();
        assert_eq!(endpoint.to_string(), "db:1433");
        let v6 = Endpoint::parse("[::1]:5432").unwrap();
        assert_eq!(v6.to_string(), "[::1]:5432");
    }

    #[test]
    fn test_render_round_trip() {
        let raw = "Server=db;Password=\"a;b\";";
        let parts = ConnectionStringParts::parse(raw).unwrap();
        assert_eq!(parts.to_connection_string(), raw);
    }
}
