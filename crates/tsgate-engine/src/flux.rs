//! Flux source helpers.
//!
//! Query bodies reference values through `params.<name>`. The one place a
//! value has to be written into script text is a task script, which has no
//! runtime parameters; there the value goes through `string_literal`.

use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Whether `s` can be used as a bare Flux identifier (`r.<s>`, `params.<s>`).
pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER.is_match(s)
}

/// Quote and escape `value` as a Flux string literal.
///
/// Escapes backslash, double quote, the `${` interpolation opener and
/// control characters, so the result always parses as exactly one string
/// literal whatever `value` contains.
pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render a float so Flux reads it as a float literal (`0.0`, not `0`).
pub fn float_literal(value: f64) -> String {
    let s = format!("{}", value);
    if s.contains('.') || s.contains('e') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        format!("{}.0", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("tenant_id"));
        assert!(is_identifier("_value"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("tenant-id"));
        assert!(!is_identifier("a) or (true"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_string_literal_escapes() {
        assert_eq!(string_literal("user1"), "\"user1\"");
        assert_eq!(string_literal("a\"b"), "\"a\\\"b\"");
        assert_eq!(string_literal("a\\b"), "\"a\\\\b\"");
        assert_eq!(string_literal("${x}"), "\"\\${x}\"");
        assert_eq!(string_literal("$5"), "\"$5\"");
        assert_eq!(string_literal("a\nb"), "\"a\\nb\"");
    }

    #[test]
    fn test_injection_stays_inside_literal() {
        let lit = string_literal("user1\") |> drop(columns: [\"_value\"]) //");
        // Only the opening and closing quotes are unescaped.
        let inner = &lit[1..lit.len() - 1];
        let mut escaped = false;
        for c in inner.chars() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => panic!("unescaped quote in {}", lit),
                _ => {}
            }
        }
    }

    #[test]
    fn test_float_literal() {
        assert_eq!(float_literal(0.0), "0.0");
        assert_eq!(float_literal(42.0), "42.0");
        assert_eq!(float_literal(1.5), "1.5");
        assert_eq!(float_literal(-3.0), "-3.0");
    }
}
