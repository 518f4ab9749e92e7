use url::Url;

/// Format token for the lightweight count endpoint.
pub const FORMAT_COUNT: &str = "count";

/// Builds the PSICQUIC REST URL `{base}/query/{expression}?format={format}`.
///
/// The query expression is percent-encoded as a single path segment.
pub fn query_url(base: &str, expression: &str, format: &str) -> Result<Url, String> {
    let mut url = Url::parse(base).map_err(|e| e.to_string())?;
    url.path_segments_mut()
        .map_err(|_| format!("endpoint URL '{}' cannot carry a path", base))?
        .pop_if_empty()
        .push("query")
        .push(expression);
    url.query_pairs_mut().append_pair("format", format);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_url_layout() {
        let url = query_url(
            "http://example.org/psicquic/current/search/",
            "brca1",
            FORMAT_COUNT,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://example.org/psicquic/current/search/query/brca1?format=count"
        );
    }

    #[test]
    fn test_query_url_encodes_expression() {
        let url = query_url("http://example.org/", "species:9606 AND species:10090", "tab25")
            .unwrap();
        assert!(url.path().contains("species:9606%20AND%20species:10090"));
        assert_eq!(url.query(), Some("format=tab25"));
    }

    #[test]
    fn test_query_url_rejects_garbage_base() {
        assert!(query_url("not a url", "brca1", FORMAT_COUNT).is_err());
    }
}
