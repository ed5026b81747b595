//! Duplicate-name disambiguation within a single directory listing (§4.4).
//! Deterministic: a pure function of listing order as returned by the
//! backend.

use std::collections::HashMap;

/// Rewrites `X`, `X`, `X` (in listing order) into `X`, `X (2)`, `X (3)`.
/// For names with an extension, the suffix goes before the final dot:
/// `doc.txt` → `doc (2).txt`.
pub fn disambiguate_listing(names: &[String]) -> Vec<String> {
    let mut seen_count: HashMap<&str, u32> = HashMap::new();
    let mut result = Vec::with_capacity(names.len());

    for name in names {
        let count = seen_count.entry(name.as_str()).or_insert(0);
        *count += 1;
        if *count == 1 {
            result.push(name.clone());
        } else {
            result.push(suffixed(name, *count));
        }
    }

    result
}

fn suffixed(name: &str, n: u32) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &name[..dot], n, &name[dot..]),
        _ => format!("{} ({})", name, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_keeps_original_name() {
        let names = vec!["doc.txt".to_string(), "doc.txt".to_string(), "doc.txt".to_string()];
        let result = disambiguate_listing(&names);
        assert_eq!(result, vec!["doc.txt", "doc (2).txt", "doc (3).txt"]);
    }

    #[test]
    fn names_without_extensions_get_bare_suffix() {
        let names = vec!["notes".to_string(), "notes".to_string()];
        assert_eq!(disambiguate_listing(&names), vec!["notes", "notes (2)"]);
    }

    #[test]
    fn dotfiles_are_treated_as_extensionless() {
        let names = vec![".bashrc".to_string(), ".bashrc".to_string()];
        assert_eq!(disambiguate_listing(&names), vec![".bashrc", ".bashrc (2)"]);
    }

    #[test]
    fn unique_names_pass_through_unchanged() {
        let names = vec!["a.txt".to_string(), "b.txt".to_string()];
        assert_eq!(disambiguate_listing(&names), names);
    }
}
