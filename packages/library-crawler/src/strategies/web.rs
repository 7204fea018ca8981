//! Web sources: same-host HTML traversal.
//!
//! Pages are rendered to markdown by the [`HtmlClient`] and handed on as
//! `text/markdown` documents named after the page title. The file filter is
//! not applied to web pages.

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{CrawlStrategy, DiscoveredItem, Discovery, DiscoveryFailure, FetchHandle};
use crate::credentials::Credentials;
use crate::error::{CrawlError, CrawlResult, ProviderError, ProviderResult};
use crate::model::{DiscoveredFile, SourceDescriptor, SourceKind};

pub const WEB_MIME_TYPE: &str = "text/markdown";
const UNTITLED: &str = "No title";
const EMPTY_MARKDOWN: &str = "No Markdown crawled from HTTP Crawler";

/// A fetched page, already converted to markdown.
#[derive(Debug, Clone, PartialEq)]
pub struct WebPage {
    /// Final URL after redirects
    pub url: String,
    pub title: Option<String>,
    pub markdown: String,
    /// Absolute http(s) links found on the page
    pub links: Vec<String>,
}

impl WebPage {
    pub fn new(url: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            markdown: markdown.into(),
            links: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.links.push(link.into());
        self
    }
}

/// Fetches one page and extracts its title, markdown and links.
#[async_trait]
pub trait HtmlClient: Send + Sync {
    async fn fetch_page(&self, url: &str) -> ProviderResult<WebPage>;
}

struct HtmlPatterns {
    script: Regex,
    style: Regex,
    headings: [Regex; 3],
    paragraph: Regex,
    line_break: Regex,
    anchor: Regex,
    list_item: Regex,
    tag: Regex,
    blank_lines: Regex,
    title: Regex,
    href: Regex,
}

impl HtmlPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            script: Regex::new(r"(?is)<script[^>]*>.*?</script>")?,
            style: Regex::new(r"(?is)<style[^>]*>.*?</style>")?,
            headings: [
                Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>")?,
                Regex::new(r"(?is)<h2[^>]*>(.*?)</h2>")?,
                Regex::new(r"(?is)<h3[^>]*>(.*?)</h3>")?,
            ],
            paragraph: Regex::new(r"(?is)<p[^>]*>(.*?)</p>")?,
            line_break: Regex::new(r"(?i)<br\s*/?>")?,
            anchor: Regex::new(r#"(?is)<a[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#)?,
            list_item: Regex::new(r"(?is)<li[^>]*>(.*?)</li>")?,
            tag: Regex::new(r"<[^>]+>")?,
            blank_lines: Regex::new(r"\n{3,}")?,
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>")?,
            href: Regex::new(r#"href\s*=\s*["']([^"']+)["']"#)?,
        })
    }

    fn title(&self, html: &str) -> Option<String> {
        self.title
            .captures(html)
            .and_then(|cap| cap.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|t| !t.is_empty())
    }

    fn links(&self, base: &Url, html: &str) -> Vec<String> {
        self.href
            .captures_iter(html)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str())
            .filter(|href| {
                !(href.starts_with('#')
                    || href.starts_with("javascript:")
                    || href.starts_with("mailto:")
                    || href.starts_with("tel:"))
            })
            .filter_map(|href| base.join(href).ok())
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .map(|url| url.to_string())
            .collect()
    }

    fn markdown(&self, html: &str) -> String {
        let mut text = self.script.replace_all(html, "").into_owned();
        text = self.style.replace_all(&text, "").into_owned();

        for (level, pattern) in self.headings.iter().enumerate() {
            let replacement = format!("{} $1\n", "#".repeat(level + 1));
            text = pattern.replace_all(&text, replacement.as_str()).into_owned();
        }

        text = self.paragraph.replace_all(&text, "$1\n\n").into_owned();
        text = self.line_break.replace_all(&text, "\n").into_owned();
        text = self.anchor.replace_all(&text, "[$2]($1)").into_owned();
        text = self.list_item.replace_all(&text, "- $1\n").into_owned();
        text = self.tag.replace_all(&text, "").into_owned();
        text = self.blank_lines.replace_all(&text, "\n\n").into_owned();

        decode_entities(text.trim())
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// [`HtmlClient`] over plain HTTP. Does not run JavaScript.
pub struct HttpHtmlClient {
    client: reqwest::Client,
    user_agent: String,
    patterns: HtmlPatterns,
}

impl HttpHtmlClient {
    pub fn new() -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Self::with_client(client)
    }

    pub fn with_client(client: reqwest::Client) -> ProviderResult<Self> {
        let patterns =
            HtmlPatterns::compile().map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(Self {
            client,
            user_agent: "LibraryCrawler/1.0".to_string(),
            patterns,
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait]
impl HtmlClient for HttpHtmlClient {
    async fn fetch_page(&self, url: &str) -> ProviderResult<WebPage> {
        debug!(url = %url, "HTTP fetch starting");
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: format!("HTTP {} fetching {}", status, url),
            });
        }

        let final_url = response.url().clone();
        let html = response.text().await?;

        Ok(WebPage {
            url: final_url.to_string(),
            title: self.patterns.title(&html),
            markdown: self.patterns.markdown(&html),
            links: self.patterns.links(&final_url, &html),
        })
    }
}

/// Strategy for [`SourceKind::Web`].
#[derive(Clone)]
pub struct WebStrategy {
    client: Arc<dyn HtmlClient>,
}

impl WebStrategy {
    pub fn new(client: impl HtmlClient + 'static) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn from_arc(client: Arc<dyn HtmlClient>) -> Self {
        Self { client }
    }
}

fn normalize(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

fn same_host(url: &str, host: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(host)))
        .unwrap_or(false)
}

fn enqueue_links(
    page: &WebPage,
    depth: u32,
    max_depth: u32,
    host: &str,
    visited: &mut HashSet<String>,
    queue: &mut VecDeque<(String, u32)>,
) {
    if depth >= max_depth {
        return;
    }
    for link in &page.links {
        let key = normalize(link);
        if same_host(link, host) && visited.insert(key.clone()) {
            queue.push_back((key, depth + 1));
        }
    }
}

fn page_item(page: WebPage) -> DiscoveredItem {
    let name = page
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());
    let markdown = if page.markdown.trim().is_empty() {
        EMPTY_MARKDOWN.to_string()
    } else {
        page.markdown
    };
    let relative_path = Url::parse(&page.url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| page.url.clone());

    let file = DiscoveredFile::new(page.url.clone(), name, page.url)
        .with_relative_path(relative_path)
        .with_size(markdown.len() as u64)
        .with_mime_type(WEB_MIME_TYPE);
    DiscoveredItem::new(file, FetchHandle::ready(Bytes::from(markdown)))
}

#[async_trait]
impl CrawlStrategy for WebStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::Web
    }

    fn label(&self) -> &'static str {
        "HTTP"
    }

    fn applies_filters(&self) -> bool {
        false
    }

    async fn discover(
        &self,
        descriptor: &SourceDescriptor,
        _credentials: &Credentials,
    ) -> CrawlResult<Discovery> {
        let seed = Url::parse(descriptor.uri.trim())
            .map_err(|e| CrawlError::invalid(format!("invalid web uri {}: {}", descriptor.uri, e)))?;
        if !matches!(seed.scheme(), "http" | "https") {
            return Err(CrawlError::invalid(format!(
                "web uri must be http or https: {}",
                descriptor.uri
            )));
        }
        let host = seed
            .host_str()
            .ok_or_else(|| CrawlError::invalid(format!("web uri has no host: {}", seed)))?
            .to_string();

        info!(uri = %seed, max_depth = descriptor.max_depth, "Starting web crawl");
        let seed_page = self.client.fetch_page(seed.as_str()).await.map_err(|e| {
            if e.is_auth() {
                CrawlError::Authentication(e)
            } else {
                CrawlError::Connect(e)
            }
        })?;

        let client = Arc::clone(&self.client);
        let max_depth = descriptor.max_depth;
        let max_pages = descriptor.max_pages;

        let items = stream! {
            let mut visited: HashSet<String> = HashSet::new();
            let mut queue: VecDeque<(String, u32)> = VecDeque::new();
            visited.insert(normalize(seed.as_str()));
            visited.insert(normalize(&seed_page.url));

            enqueue_links(&seed_page, 0, max_depth, &host, &mut visited, &mut queue);
            yield Ok(page_item(seed_page));

            let mut produced = 1u32;
            while produced < max_pages {
                let Some((url, depth)) = queue.pop_front() else {
                    break;
                };
                produced += 1;
                match client.fetch_page(&url).await {
                    Ok(page) => {
                        visited.insert(normalize(&page.url));
                        enqueue_links(&page, depth, max_depth, &host, &mut visited, &mut queue);
                        debug!(url = %page.url, depth, "Web page discovered");
                        yield Ok(page_item(page));
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Web page fetch failed");
                        yield Err(DiscoveryFailure::from(e).at(url));
                    }
                }
            }
        };

        Ok(Discovery::new(items.boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CrawlerId, LibraryId};
    use crate::testing::MockWebClient;

    fn descriptor(uri: &str) -> SourceDescriptor {
        SourceDescriptor::new(CrawlerId::new(), LibraryId::new(), SourceKind::Web, uri)
    }

    async fn collect(mut discovery: Discovery) -> Vec<Result<DiscoveredItem, DiscoveryFailure>> {
        let mut out = Vec::new();
        while let Some(item) = discovery.next().await {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_markdown_conversion() {
        let patterns = HtmlPatterns::compile().unwrap();
        let html = r#"
            <html><head><title>Opening Hours</title><script>var x = 1;</script></head>
            <body><h1>Title</h1><p>Paragraph &amp; more.</p>
            <a href="https://example.com">Link</a><ul><li>One</li></ul></body></html>
        "#;
        let md = patterns.markdown(html);
        assert!(md.contains("# Title"));
        assert!(md.contains("Paragraph & more."));
        assert!(md.contains("[Link](https://example.com)"));
        assert!(md.contains("- One"));
        assert!(!md.contains("var x"));
        assert_eq!(patterns.title(html).as_deref(), Some("Opening Hours"));
    }

    #[test]
    fn test_link_extraction() {
        let patterns = HtmlPatterns::compile().unwrap();
        let base = Url::parse("https://example.com/page").unwrap();
        let html = r##"
            <a href="/about">About</a>
            <a href="#section">Anchor</a>
            <a href="mailto:info@example.com">Mail</a>
            <a href="ftp://example.com/file">FTP</a>
        "##;
        assert_eq!(patterns.links(&base, html), vec!["https://example.com/about"]);
    }

    #[tokio::test]
    async fn test_traversal_stays_on_host_and_respects_depth() {
        let client = MockWebClient::new()
            .with_page(
                WebPage::new("https://example.com/", "home")
                    .with_title("Home")
                    .with_link("https://example.com/a")
                    .with_link("https://other.org/x"),
            )
            .with_page(
                WebPage::new("https://example.com/a", "a")
                    .with_title("A")
                    .with_link("https://example.com/b"),
            )
            .with_page(WebPage::new("https://example.com/b", "b"));

        let strategy = WebStrategy::new(client.clone());
        let discovery = strategy
            .discover(&descriptor("https://example.com/").with_max_depth(1), &Credentials::new())
            .await
            .unwrap();
        let items = collect(discovery).await;

        let names: Vec<_> = items
            .iter()
            .map(|i| i.as_ref().unwrap().file.name.clone())
            .collect();
        assert_eq!(names, vec!["Home", "A"]);
        assert_eq!(client.fetched(), vec!["https://example.com/", "https://example.com/a"]);
    }

    #[tokio::test]
    async fn test_untitled_page_and_failed_page() {
        let client = MockWebClient::new()
            .with_page(
                WebPage::new("https://example.com/", "")
                    .with_link("https://example.com/missing"),
            );
        let strategy = WebStrategy::new(client);
        let items = collect(
            strategy
                .discover(&descriptor("https://example.com/"), &Credentials::new())
                .await
                .unwrap(),
        )
        .await;

        assert_eq!(items.len(), 2);
        let first = items[0].as_ref().unwrap();
        assert_eq!(first.file.name, "No title");
        assert_eq!(first.file.mime_type_hint.as_deref(), Some("text/markdown"));
        let failure = items[1].as_ref().unwrap_err();
        assert_eq!(failure.origin_uri.as_deref(), Some("https://example.com/missing"));
    }

    #[tokio::test]
    async fn test_unreachable_seed_is_fatal() {
        let strategy = WebStrategy::new(MockWebClient::new());
        let result = strategy
            .discover(&descriptor("https://example.com/"), &Credentials::new())
            .await;
        assert!(matches!(result, Err(CrawlError::Connect(_))));

        let result = WebStrategy::new(MockWebClient::new())
            .discover(&descriptor("not a url"), &Credentials::new())
            .await;
        assert!(matches!(result, Err(CrawlError::InvalidDescriptor { .. })));
    }
}
