// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node name canonicalization and uniquing.

/// Longest prefix of `name` made of ASCII letters, digits and underscores
pub fn canonical_name(name: &str) -> &str {
    let end = name
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(name.len());
    &name[..end]
}

/// Canonicalize `name` and bump its counter until `taken` rejects it.
///
/// A six-digit counter embedded between non-digits is incremented first,
/// then a trailing counter. Names with neither get `000002` appended.
/// Counters are always written zero-padded to six digits.
pub fn unique_name(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut candidate = canonical_name(name).to_string();
    if candidate.bytes().all(|b| b.is_ascii_digit()) {
        candidate.insert_str(0, "node");
    }

    while taken(&candidate) {
        candidate = next_candidate(&candidate);
    }
    candidate
}

fn next_candidate(name: &str) -> String {
    if let Some((prefix, n, suffix)) = embedded_counter(name) {
        return format!("{prefix}{:06}{suffix}", n + 1);
    }
    if let Some((prefix, n)) = trailing_counter(name) {
        return format!("{prefix}{:06}", n + 1);
    }
    format!("{name}000002")
}

/// Runs of ASCII digits as byte ranges
fn digit_runs(name: &str) -> Vec<(usize, usize)> {
    let bytes = name.as_bytes();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            runs.push((start, i));
        } else {
            i += 1;
        }
    }
    runs
}

fn embedded_counter(name: &str) -> Option<(&str, u64, &str)> {
    digit_runs(name)
        .into_iter()
        .rev()
        .find(|&(start, end)| start > 0 && end < name.len() && end - start == 6)
        .and_then(|(start, end)| {
            let n = name[start..end].parse().ok()?;
            Some((&name[..start], n, &name[end..]))
        })
}

fn trailing_counter(name: &str) -> Option<(&str, u64)> {
    let (start, end) = digit_runs(name).pop()?;
    if start == 0 || end != name.len() {
        return None;
    }
    let n = name[start..end].parse().ok()?;
    Some((&name[..start], n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taken_from<'a>(names: &'a [&'a str]) -> impl Fn(&str) -> bool + 'a {
        move |n: &str| names.iter().any(|name| *name == n)
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("source_1.media"), "source_1");
        assert_eq!(canonical_name("plain"), "plain");
        assert_eq!(canonical_name("#bad"), "");
    }

    #[test]
    fn test_free_name_unchanged() {
        assert_eq!(unique_name("exposure", taken_from(&[])), "exposure");
    }

    #[test]
    fn test_appends_counter() {
        assert_eq!(unique_name("src", taken_from(&["src"])), "src000002");
        assert_eq!(
            unique_name("src", taken_from(&["src", "src000002"])),
            "src000003"
        );
    }

    #[test]
    fn test_trailing_counter_padded() {
        assert_eq!(unique_name("exp1", taken_from(&["exp1"])), "exp000002");
    }

    #[test]
    fn test_embedded_counter() {
        assert_eq!(
            unique_name("sourceGroup000001_source", taken_from(&["sourceGroup000001_source"])),
            "sourceGroup000002_source"
        );
    }

    #[test]
    fn test_digit_only_names() {
        assert_eq!(unique_name("42", taken_from(&[])), "node42");
        assert_eq!(unique_name("", taken_from(&[])), "node");
    }
}
