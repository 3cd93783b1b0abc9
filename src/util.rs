//! Small helpers shared across the models.

use time::OffsetDateTime;

/// The timestamp stamped onto records as they are written.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Turn user input into a `LIKE` pattern matching values that start with it,
/// escaping the wildcards with `\`.
pub fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');

    pattern
}

/// `None` for missing or blank text, otherwise the trimmed text.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("Do"), "Do%");
        assert_eq!(like_prefix("50%_off\\"), "50\\%\\_off\\\\%");
        assert_eq!(like_prefix(""), "%");
    }

    #[test]
    fn blank_text_becomes_none() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" Macon ")), Some("Macon".to_owned()));
    }
}
