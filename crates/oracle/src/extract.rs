//! Fenced block extraction from model responses.

/// Return the body of the first fenced block tagged `language`, else the
/// first untagged-or-any fenced block, else the trimmed response.
///
/// An unterminated fence yields everything after the opening line.
#[must_use]
pub fn extract_code(response: &str, language: &str) -> String {
    if !language.is_empty() {
        let tagged = format!("```{language}");
        if let Some(body) = tagged_block(response, &tagged) {
            return body;
        }
    }
    fenced_block(response).unwrap_or_else(|| response.trim().to_string())
}

/// Strip a ```json (or bare) fence around a JSON payload.
#[must_use]
pub fn extract_json(response: &str) -> String {
    extract_code(response, "json")
}

fn tagged_block(response: &str, tag: &str) -> Option<String> {
    let mut search = 0;
    while let Some(pos) = response[search..].find(tag) {
        let start = search + pos + tag.len();
        // ```python3 must not match a request for ```python
        let rest = &response[start..];
        let boundary = rest
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace());
        if boundary {
            return Some(block_body(rest));
        }
        search = start;
    }
    None
}

fn fenced_block(response: &str) -> Option<String> {
    let pos = response.find("```")?;
    let rest = &response[pos + 3..];
    // skip the info string, whatever language it names
    let body_start = rest.find('\n').map_or(rest.len(), |i| i + 1);
    Some(block_body(&rest[body_start..]))
}

fn block_body(after_open: &str) -> String {
    let body = after_open.strip_prefix('\r').unwrap_or(after_open);
    let body = body.strip_prefix('\n').unwrap_or(body);
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_fence() {
        let response = "Here you go:\n```python\ndef transform(a, b):\n    return []\n```\nDone.";
        assert_eq!(
            extract_code(response, "python"),
            "def transform(a, b):\n    return []"
        );
    }

    #[test]
    fn test_bare_fence() {
        let response = "```\nx = 1\n```";
        assert_eq!(extract_code(response, "python"), "x = 1");
    }

    #[test]
    fn test_other_language_fence_is_stripped() {
        let response = "```py\nx = 1\n```";
        assert_eq!(extract_code(response, "python"), "x = 1");
    }

    #[test]
    fn test_prefers_requested_language() {
        let response = "```text\nnotes\n```\n```python\nx = 2\n```";
        assert_eq!(extract_code(response, "python"), "x = 2");
    }

    #[test]
    fn test_no_fence_returns_trimmed() {
        assert_eq!(extract_code("  x = 1 \n", "python"), "x = 1");
    }

    #[test]
    fn test_unterminated_fence() {
        assert_eq!(extract_code("```python\nx = 1\n", "python"), "x = 1");
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("{\"a\": 1}"), "{\"a\": 1}");
    }
}
