//! Author-name helpers shared by the record model and the cross-source resolver.

use std::collections::BTreeSet;

/// Split a joined author string (`"Kaiming He, Xiangyu Zhang; Jian Sun"`) into
/// trimmed display names. Empty fragments are dropped.
pub fn split_author_string(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Collapse duplicate names, keeping the first occurrence of each.
pub fn unique_authors<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = normalize_whitespace(name.as_ref());
        if name.is_empty() || out.iter().any(|existing| existing == &name) {
            continue;
        }
        out.push(name);
    }
    out
}

/// Last whitespace-delimited token of a display name, lower-cased and reduced to
/// alphanumerics. `None` when nothing alphanumeric remains (e.g. `"..."`).
pub fn surname_key(display_name: &str) -> Option<String> {
    let last = display_name.split_whitespace().last()?;
    let key: String = last
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    if key.is_empty() { None } else { Some(key) }
}

/// Set of surname keys for a list of display names.
pub fn surname_set<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| surname_key(name.as_ref()))
        .collect()
}

fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
