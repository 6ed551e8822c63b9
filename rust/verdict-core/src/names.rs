//! DMN name matching.
//!
//! DMN permits names with embedded spaces (`Full Name`) while input JSON
//! often carries the same variable as `full_name` or `FULL NAME`. Lookup
//! therefore compares *normalized* forms: lowercased, underscores replaced
//! by spaces, whitespace runs collapsed. Exact key matches always win over
//! normalized ones; among normalized ties the first-inserted key wins.

use indexmap::IndexMap;

/// Normalize a name for comparison: lowercase, `_` to space, collapse
/// whitespace runs, trim.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for ch in name.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            for lc in ch.to_lowercase() {
                out.push(lc);
            }
        }
    }
    out
}

/// Look a name up in an insertion-ordered map under the loose-match rule.
pub fn lookup<'a, V>(map: &'a IndexMap<String, V>, name: &str) -> Option<&'a V> {
    if let Some(v) = map.get(name) {
        return Some(v);
    }
    let wanted = normalize(name);
    map.iter()
        .find(|(k, _)| normalize(k) == wanted)
        .map(|(_, v)| v)
}

/// Two names that refer to the same variable under the loose-match rule.
pub fn matches(a: &str, b: &str) -> bool {
    a == b || normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowers_and_despaces() {
        assert_eq!(normalize("Full Name"), "full name");
        assert_eq!(normalize("full_name"), "full name");
        assert_eq!(normalize("  Full   Name  "), "full name");
        assert_eq!(normalize("FULL_NAME"), "full name");
    }

    #[test]
    fn exact_match_beats_normalized() {
        let mut map = IndexMap::new();
        map.insert("full name".to_string(), 1);
        map.insert("Full Name".to_string(), 2);
        assert_eq!(lookup(&map, "Full Name"), Some(&2));
        assert_eq!(lookup(&map, "FULL_NAME"), Some(&1));
    }

    #[test]
    fn normalized_tie_takes_first_inserted() {
        let mut map = IndexMap::new();
        map.insert("Input_With_Spaces".to_string(), 1);
        map.insert("input with spaces".to_string(), 2);
        assert_eq!(lookup(&map, "Input With Spaces"), Some(&1));
    }

    #[test]
    fn miss_is_none() {
        let map: IndexMap<String, i32> = IndexMap::new();
        assert_eq!(lookup(&map, "age"), None);
    }
}
