// ── Query keys ──
//
// A QueryKey identifies one logical fetchable resource. Equality is
// structural: the key is canonicalized at construction (stable JSON
// serialization with recursively sorted object fields), so two keys
// built with different field orders collide in the cache map.

use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical, structurally-compared identifier for a cached resource.
///
/// An ordered sequence of JSON segments, e.g.
/// `["libraries", {"state": "NY", "page": 1}]`. The canonical string is
/// computed once at construction and used for equality, hashing,
/// ordering, and as the cache map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<Value>", into = "Vec<Value>")]
pub struct QueryKey {
    segments: Vec<Value>,
    canonical: String,
}

impl QueryKey {
    pub fn new<I>(segments: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let segments: Vec<Value> = segments.into_iter().collect();
        let canonical = canonicalize(&segments);
        Self {
            segments,
            canonical,
        }
    }

    /// A key with a single string segment, e.g. `QueryKey::named("setupStatus")`.
    pub fn named(name: &str) -> Self {
        Self::new([Value::String(name.to_owned())])
    }

    /// Append a segment, returning the extended key.
    pub fn with(mut self, segment: impl Into<Value>) -> Self {
        self.segments.push(segment.into());
        self.canonical = canonicalize(&self.segments);
        self
    }

    pub fn segments(&self) -> &[Value] {
        &self.segments
    }

    /// The canonical serialized form. Stable across construction order.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Segment-wise prefix test, used for prefix invalidation.
    /// Every key is a prefix of itself.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        prefix.segments.len() <= self.segments.len()
            && self
                .segments
                .iter()
                .zip(&prefix.segments)
                .all(|(a, b)| canonicalize_value(a) == canonicalize_value(b))
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for QueryKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueryKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl From<Vec<Value>> for QueryKey {
    fn from(segments: Vec<Value>) -> Self {
        Self::new(segments)
    }
}

impl From<QueryKey> for Vec<Value> {
    fn from(key: QueryKey) -> Self {
        key.segments
    }
}

impl From<&str> for QueryKey {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

// ── Canonical serialization ─────────────────────────────────────────

fn canonicalize(segments: &[Value]) -> String {
    let mut out = String::with_capacity(32);
    out.push('[');
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_canonical(segment, &mut out);
    }
    out.push(']');
    out
}

fn canonicalize_value(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Deterministic JSON writer: object fields are emitted in sorted key
/// order at every nesting level.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => write_escaped(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(k, out);
                out.push(':');
                if let Some(v) = map.get(*k) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
    }
}

fn write_escaped(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_order_does_not_matter() {
        let mut forward = serde_json::Map::new();
        forward.insert("state".into(), json!("NY"));
        forward.insert("page".into(), json!(1));

        let mut reversed = serde_json::Map::new();
        reversed.insert("page".into(), json!(1));
        reversed.insert("state".into(), json!("NY"));

        let a = QueryKey::new([json!("libraries"), Value::Object(forward)]);
        let b = QueryKey::new([json!("libraries"), Value::Object(reversed)]);

        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn nested_objects_are_sorted_recursively() {
        let key = QueryKey::new([json!({"outer": {"b": 2, "a": 1}})]);
        assert_eq!(key.canonical(), r#"[{"outer":{"a":1,"b":2}}]"#);
    }

    #[test]
    fn distinct_keys_do_not_collide() {
        let a = QueryKey::new([json!("libraries"), json!({"state": "NY"})]);
        let b = QueryKey::new([json!("libraries"), json!({"state": "CA"})]);
        assert_ne!(a, b);
    }

    #[test]
    fn strings_are_escaped() {
        let key = QueryKey::named("a\"b\\c\n");
        assert_eq!(key.canonical(), r#"["a\"b\\c\n"]"#);
    }

    #[test]
    fn prefix_matching() {
        let prefix = QueryKey::named("libraries");
        let full = QueryKey::new([json!("libraries"), json!({"state": "NY"})]);
        let other = QueryKey::named("stats");

        assert!(full.starts_with(&prefix));
        assert!(prefix.starts_with(&prefix));
        assert!(!other.starts_with(&prefix));
        assert!(!prefix.starts_with(&full));
    }

    #[test]
    fn serde_round_trip_recomputes_canonical() {
        let key = QueryKey::new([json!("libraries"), json!({"page": 1})]);
        let text = serde_json::to_string(&key).unwrap();
        let back: QueryKey = serde_json::from_str(&text).unwrap();
        assert_eq!(key, back);
        assert_eq!(key.canonical(), back.canonical());
    }
}
