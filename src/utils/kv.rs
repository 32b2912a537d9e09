//! `key=value; flag` strings as used by `Set-Cookie` and `Content-Disposition`.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum KvValue {
    Str(String),
    Bool(bool),
    Num(f64),
}

impl KvValue {
    fn is_truthy(&self) -> bool {
        match self {
            KvValue::Str(s) => !s.is_empty(),
            KvValue::Bool(b) => *b,
            KvValue::Num(n) => *n != 0.0,
        }
    }
}

impl fmt::Display for KvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvValue::Str(s) => f.write_str(s),
            KvValue::Bool(b) => write!(f, "{b}"),
            KvValue::Num(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for KvValue {
    fn from(s: &str) -> Self {
        KvValue::Str(s.to_string())
    }
}

impl From<String> for KvValue {
    fn from(s: String) -> Self {
        KvValue::Str(s)
    }
}

impl From<bool> for KvValue {
    fn from(b: bool) -> Self {
        KvValue::Bool(b)
    }
}

impl From<i64> for KvValue {
    fn from(n: i64) -> Self {
        KvValue::Num(n as f64)
    }
}

/// Join pairs into `k=v; flag` form. Falsy values are dropped and `true`
/// renders as the bare key.
#[must_use]
pub fn build_kv(props: &[(&str, KvValue)]) -> String {
    props
        .iter()
        .filter(|(_, v)| v.is_truthy())
        .map(|(k, v)| match v {
            KvValue::Bool(true) => (*k).to_string(),
            other => format!("{k}={other}"),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse a `k=v; flag` string. Keys without a value become `Bool(true)` and
/// values that round-trip as numbers become `Num`.
#[must_use]
pub fn parse_kv(kv: &str) -> Vec<(String, KvValue)> {
    kv.split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next()?.trim();
            if key.is_empty() {
                return None;
            }
            let value = match parts.next().map(str::trim) {
                None => KvValue::Bool(true),
                Some(v) => match v.parse::<f64>() {
                    Ok(n) if n.to_string() == v => KvValue::Num(n),
                    _ => KvValue::Str(v.to_string()),
                },
            };
            Some((key.to_string(), value))
        })
        .collect()
}
