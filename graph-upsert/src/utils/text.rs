//! Identifier handling for generated Cypher.

/// Quote a label, relationship type or property key as a Cypher identifier.
///
/// Labels and keys come from file headers and the model, so they are always
/// backtick-quoted; an embedded backtick is doubled.
pub fn quote_identifier(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('`');
    for c in s.chars() {
        if c == '`' {
            out.push('`');
        }
        out.push(c);
    }
    out.push('`');
    out
}
