use url::Url;

/// Derive the stable ContentID for an essay link: the last path segment with
/// its file extension stripped. Deterministic across runs for the same link;
/// distinct links are assumed not to collide (a naming collision between two
/// essays would merge their records).
pub fn content_id(link: &str) -> String {
    let segment = match Url::parse(link) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
            .unwrap_or_default(),
        // relative or otherwise unparseable link: fall back to a plain split
        Err(_) => link.rsplit('/').next().unwrap_or(link).to_string(),
    };

    match segment.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem.to_string(),
        _ => segment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_id_strips_extension() {
        assert_eq!(content_id("http://www.paulgraham.com/greatwork.html"), "greatwork");
        assert_eq!(content_id("https://example.com/essays/avg.html"), "avg");
    }

    #[test]
    fn content_id_without_extension_keeps_segment() {
        assert_eq!(content_id("https://example.com/posts/startup-advice"), "startup-advice");
    }

    #[test]
    fn content_id_ignores_trailing_slash() {
        assert_eq!(content_id("https://example.com/posts/ideas/"), "ideas");
    }

    #[test]
    fn content_id_handles_unparseable_links() {
        assert_eq!(content_id("essays/ds.html"), "ds");
    }

    #[test]
    fn content_id_is_stable_across_calls() {
        let link = "http://www.paulgraham.com/vb.html";
        assert_eq!(content_id(link), content_id(link));
    }
}
