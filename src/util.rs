//! Shared utility helpers.

/// Case-insensitive substring search without allocating an uppercase copy.
#[inline]
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    let needle_bytes = needle.as_bytes();
    let haystack_bytes = haystack.as_bytes();
    if needle_bytes.len() > haystack_bytes.len() {
        return false;
    }
    haystack_bytes
        .windows(needle_bytes.len())
        .any(|window| window.eq_ignore_ascii_case(needle_bytes))
}

/// Case-insensitive ends_with check without allocating.
#[inline]
pub fn ends_with_ci(haystack: &str, needle: &str) -> bool {
    haystack.len() >= needle.len()
        && haystack.as_bytes()[haystack.len() - needle.len()..]
            .eq_ignore_ascii_case(needle.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_ci() {
        assert!(contains_ci("C:/Repo/Deployment/post.sql", "deployment"));
        assert!(!contains_ci("short", "much longer needle"));
    }

    #[test]
    fn test_ends_with_ci() {
        assert!(ends_with_ci("file:///db/Tables/Employee.SQL", ".sql"));
        assert!(!ends_with_ci("notes.txt", ".sql"));
        assert!(!ends_with_ci("sql", ".sql"));
    }
}
