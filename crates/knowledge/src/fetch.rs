use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Node, Selector};
use std::time::Duration;
use thiserror::Error;

/// Per-url failure; the builder logs it and skips the document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),

    #[error("{0}")]
    Other(String),
}

/// `fetch(url, timeout) -> plain text`
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

/// Fetches pages over HTTP and reduces HTML to plain text
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

const USER_AGENT: &str = concat!("ashguard/", env!("CARGO_PKG_VERSION"));

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let classify = |err: reqwest::Error| {
            if err.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Network(err.to_string())
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase());
        let kind = ContentKind::classify(content_type.as_deref())?;

        let body = response.text().await.map_err(classify)?;
        Ok(match kind {
            ContentKind::Html => html_to_text(&body),
            ContentKind::Plain => collapse_plain_text(&body),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Html,
    Plain,
}

impl ContentKind {
    fn classify(content_type: Option<&str>) -> Result<Self, FetchError> {
        let Some(raw) = content_type else {
            return Ok(Self::Html);
        };
        let mime = raw.split(';').next().unwrap_or_default().trim();
        match mime {
            "text/html" | "application/xhtml+xml" | "" => Ok(Self::Html),
            "text/plain" => Ok(Self::Plain),
            other => Err(FetchError::UnsupportedContent(other.to_string())),
        }
    }
}

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg"];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "aside", "nav", "li", "ul",
    "ol", "table", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "br", "hr",
    "figure", "figcaption", "dl", "dt", "dd",
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    Space,
    Paragraph,
}

/// Visible body text with whitespace collapsed and block boundaries kept as paragraph breaks.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next());
    let root = body.unwrap_or_else(|| document.root_element());

    let mut out = String::new();
    let mut pending = Pending::None;
    // Nearest block ancestor of the last emitted text; a change means a block closed or opened
    let mut last_block = None;
    for node in root.descendants() {
        match node.value() {
            Node::Element(element) if BLOCK_ELEMENTS.contains(&element.name()) => {
                pending = Pending::Paragraph;
            }
            Node::Text(text) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
                });
                if hidden {
                    continue;
                }

                let raw: &str = text;
                if raw.starts_with(char::is_whitespace) && pending == Pending::None {
                    pending = Pending::Space;
                }
                let mut words = raw.split_whitespace().peekable();
                if words.peek().is_none() {
                    continue;
                }
                let block = node
                    .ancestors()
                    .find(|ancestor| {
                        ancestor
                            .value()
                            .as_element()
                            .is_some_and(|el| BLOCK_ELEMENTS.contains(&el.name()))
                    })
                    .map(|ancestor| ancestor.id());
                if !out.is_empty() && block != last_block {
                    pending = Pending::Paragraph;
                }
                last_block = block;
                for word in words {
                    if !out.is_empty() {
                        match pending {
                            Pending::Paragraph => out.push_str("\n\n"),
                            Pending::Space => out.push(' '),
                            Pending::None => {}
                        }
                    }
                    out.push_str(word);
                    pending = Pending::Space;
                }
                pending = if raw.ends_with(char::is_whitespace) {
                    Pending::Space
                } else {
                    Pending::None
                };
            }
            _ => {}
        }
    }
    out
}

fn collapse_plain_text(text: &str) -> String {
    text.split("\n\n")
        .map(|para| para.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
