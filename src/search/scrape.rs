//! Page fetching and HTML-to-text conversion.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::SearchError;

/// Fetches a page body by URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Raw body of `url`. Implementations must give up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, SearchError>;
}

/// `reqwest`-backed fetcher.
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, SearchError> {
        let failed = |reason: String| SearchError::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::FetchTimeout {
                        url: url.to_string(),
                        timeout,
                    }
                } else {
                    failed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {status}")));
        }

        let body = response.text().await.map_err(|e| failed(e.to_string()))?;
        debug!(url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

// ── HTML to text ────────────────────────────────────────────────────

static INVISIBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<!--.*?-->")
        .expect("static regex")
});

static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6]|section|article|header|footer|blockquote)\s*>")
        .expect("static regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

static NUMERIC_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").expect("static regex")
});

/// Convert an HTML document to plain text.
///
/// Script, style and noscript blocks and comments are dropped, tags are
/// stripped and common entities decoded. Each line is trimmed, runs of two
/// or more spaces start a new line, and blank lines are removed.
pub fn html_to_text(html: &str) -> String {
    let visible = INVISIBLE.replace_all(html, " ");
    let broken = BLOCK_BREAK.replace_all(&visible, "\n");
    let stripped = TAG.replace_all(&broken, "");
    let decoded = decode_entities(&stripped);

    decoded
        .lines()
        .flat_map(|line| line.trim().split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// `&amp;` goes last so `&amp;lt;` stays `&lt;`.
fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse().ok(),
            (None, None) => None,
        };
        // Invalid code points are left as written.
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    numeric
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags() {
        assert_eq!(html_to_text("<p>Hello</p>"), "Hello");
        assert_eq!(
            html_to_text("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
        assert_eq!(
            html_to_text(r#"<a href="https://example.com">Link</a>"#),
            "Link"
        );
    }

    #[test]
    fn drops_script_style_and_comments() {
        let html = r#"<html><head><style>body { color: red }</style>
            <script type="text/javascript">var x = "<p>";</script></head>
            <body><!-- nav --><h1>Title</h1><p>Body text</p>
            <noscript>Enable JS</noscript></body></html>"#;
        assert_eq!(html_to_text(html), "Title\nBody text");
    }

    #[test]
    fn splits_on_double_spaces_and_drops_blanks() {
        let html = "<p>first  second</p>\n\n   \n<p>  third  </p>";
        assert_eq!(html_to_text(html), "first\nsecond\nthird");
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(
            html_to_text("<p>Fish &amp; chips &lt;3 &quot;yum&quot;</p>"),
            "Fish & chips <3 \"yum\""
        );
        assert_eq!(html_to_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn decodes_numeric_entities() {
        assert_eq!(
            html_to_text("<p>It&#8217;s &#x201C;done&#x201D; &#39;now&#39;</p>"),
            "It\u{2019}s \u{201C}done\u{201D} 'now'"
        );
        assert_eq!(html_to_text("caf&#xE9; &#233;"), "caf\u{e9} \u{e9}");
        // Surrogates are not chars.
        assert_eq!(html_to_text("bad &#xD800; ref"), "bad &#xD800; ref");
    }

    #[test]
    fn plain_text_passthrough() {
        assert_eq!(html_to_text("No HTML here"), "No HTML here");
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn line_breaks_at_br() {
        assert_eq!(html_to_text("one<br>two<br/>three"), "one\ntwo\nthree");
    }
}
