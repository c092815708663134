use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use ego_tree::NodeRef;
use regex::Regex;
use scraper::{Html, Node, Selector};

/// Browser-like identification, some sites refuse the default client UA.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

const TITLE_SENTINEL: &str = "No title found";

/// Elements whose text is never user-visible content.
const STRIPPED_TAGS: [&str; 5] = ["script", "style", "img", "input", "noscript"];

/// Shared HTTP client for website fetching.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .build()?)
}

/// A fetched web page reduced to title, visible text, and outbound links.
#[derive(Debug, Clone)]
pub struct Website {
    pub url: String,
    pub title: String,
    pub text: String,
    pub links: Vec<String>,
}

impl Website {
    /// Fetches and cleans a page. Transport failures surface as an
    /// empty-content result, not an error.
    pub async fn fetch(http: &reqwest::Client, url: &str) -> Website {
        let body = match http.get(url).send().await {
            Ok(response) => match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!("failed to read body of {}: {}", url, e);
                    return Website::empty(url);
                }
            },
            Err(e) => {
                tracing::warn!("failed to fetch {}: {}", url, e);
                return Website::empty(url);
            }
        };

        Website::parse(url, &body)
    }

    pub fn parse(url: &str, body: &str) -> Website {
        let document = Html::parse_document(body);

        let title = Selector::parse("title")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| TITLE_SENTINEL.to_string());

        let text = Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .map(|body| {
                let mut parts = Vec::new();
                for child in body.children() {
                    collect_visible_text(child, &mut parts);
                }
                parts.join("\n")
            })
            .unwrap_or_default();

        let links = Selector::parse("a")
            .ok()
            .map(|sel| {
                document
                    .select(&sel)
                    .filter_map(|a| a.value().attr("href"))
                    .filter(|href| !href.is_empty() && !href.starts_with("mailto:"))
                    .map(|href| href.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Website {
            url: url.to_string(),
            title,
            text,
            links,
        }
    }

    fn empty(url: &str) -> Website {
        Website {
            url: url.to_string(),
            title: TITLE_SENTINEL.to_string(),
            text: String::new(),
            links: Vec::new(),
        }
    }

    pub fn contents(&self) -> String {
        format!("Title: {}\n\n{}\n\n", self.title, self.text)
    }
}

fn collect_visible_text(node: NodeRef<'_, Node>, out: &mut Vec<String>) {
    match node.value() {
        Node::Element(element) => {
            if STRIPPED_TAGS.contains(&element.name()) {
                return;
            }
            for child in node.children() {
                collect_visible_text(child, out);
            }
        }
        Node::Text(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
        _ => {}
    }
}

/// Reachable iff a HEAD request answers with a status below 400. Any
/// transport failure counts as unreachable.
pub async fn is_reachable(http: &reqwest::Client, url: &str) -> bool {
    match http
        .head(url)
        .timeout(REACHABILITY_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response.status().as_u16() < 400,
        Err(_) => false,
    }
}

static JSON_OBJECT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").ok());

/// Best-effort grab of the first brace-delimited JSON object inside free
/// text. Returns None when the text has no braces at all.
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT_RE.as_ref()?.find(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head><title> Acme Corp </title></head>
          <body>
            <h1>Welcome</h1>
            <script>var hidden = 1;</script>
            <style>.x { color: red }</style>
            <noscript>enable javascript</noscript>
            <p>We make anvils.</p>
            <a href="/about">About</a>
            <a href="mailto:sales@acme.test">Mail us</a>
            <a href="https://acme.test/careers">Careers</a>
          </body>
        </html>"#;

    #[test]
    fn parse_extracts_title_text_and_links() {
        let site = Website::parse("https://acme.test", PAGE);

        assert_eq!(site.title, "Acme Corp");
        assert!(site.text.contains("Welcome"));
        assert!(site.text.contains("We make anvils."));
        assert!(!site.text.contains("hidden"));
        assert!(!site.text.contains("enable javascript"));
        assert_eq!(site.links, vec!["/about", "https://acme.test/careers"]);
    }

    #[test]
    fn missing_title_falls_back_to_sentinel() {
        let site = Website::parse("https://x.test", "<html><body><p>hi</p></body></html>");
        assert_eq!(site.title, "No title found");
        assert_eq!(site.text, "hi");
    }

    #[test]
    fn contents_includes_title_header() {
        let site = Website::parse("https://x.test", "<title>T</title><body>b</body>");
        assert_eq!(site.contents(), "Title: T\n\nb\n\n");
    }

    #[test]
    fn extract_json_object_finds_first_braced_span() {
        let reply = "Sure! Here you go:\n{\"links\": [{\"type\": \"about\", \"url\": \"/a\"}]}\nDone.";
        let json = extract_json_object(reply).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
        assert!(serde_json::from_str::<serde_json::Value>(json).is_ok());
    }

    #[test]
    fn extract_json_object_spans_newlines() {
        let reply = "prefix {\n \"links\": []\n} suffix";
        assert_eq!(extract_json_object(reply), Some("{\n \"links\": []\n}"));
    }

    #[test]
    fn extract_json_object_without_braces_is_none() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object(""), None);
    }
}
