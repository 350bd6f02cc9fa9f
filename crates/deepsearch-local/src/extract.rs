use deepsearch_core::{ContentExtractor, Error, FetchBackend, FetchRequest, Result};
use std::io::Cursor;
use std::sync::Arc;

use crate::LocalFetcher;

/// Convert HTML to readable plain text.
///
/// Deterministic and "good enough"; not a full readability engine.
pub fn html_to_text(html: &str, width: usize) -> String {
    // html2text expects bytes; Cursor avoids allocating a second large buffer.
    html2text::from_read(Cursor::new(html.as_bytes()), width).unwrap_or_else(|_| html.to_string())
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn has_any_text(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}

/// Extract text from an in-memory PDF body.
pub fn pdf_to_text(bytes: &[u8]) -> std::result::Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
}

/// Sniff for PDF bytes (magic header).
pub fn bytes_look_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Conservative guess for whether bytes are HTML-ish.
pub fn bytes_look_like_html(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let rest = &bytes[start..];
    let head: Vec<u8> = rest.iter().take(9).map(|b| b.to_ascii_lowercase()).collect();
    let prefixes: [&[u8]; 4] = [b"<!doctype", b"<html", b"<head", b"<body"];
    prefixes.iter().any(|p| head.starts_with(p))
}

fn content_type_lc_prefix(ct: Option<&str>) -> String {
    ct.unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Remove `<tag ...> ... </tag>` blocks (ASCII case-insensitive); stops at the first
/// unclosed block.
fn strip_tag_blocks(html: &str, tag: &str) -> String {
    let open_pat = format!("<{}", tag.to_ascii_lowercase());
    let close_pat = format!("</{}>", tag.to_ascii_lowercase());
    let lower = html.to_ascii_lowercase();

    let mut out = String::with_capacity(html.len());
    let mut i = 0usize;
    while let Some(rel_start) = lower[i..].find(&open_pat) {
        let start = i + rel_start;
        let after_open = start + open_pat.len();
        let Some(rel_end) = lower[after_open..].find(&close_pat) else {
            break;
        };
        out.push_str(&html[i..start]);
        i = after_open + rel_end + close_pat.len();
    }
    out.push_str(&html[i..]);
    out
}

fn is_boilerplate_container(el: &html_scraper::ElementRef) -> bool {
    let mut marks = String::new();
    if let Some(c) = el.value().attr("class") {
        marks.push_str(c);
        marks.push(' ');
    }
    if let Some(i) = el.value().attr("id") {
        marks.push_str(i);
    }
    let marks = marks.to_ascii_lowercase();
    !marks.is_empty()
        && [
            "nav", "menu", "sidebar", "footer", "header", "banner", "cookie", "consent", "advert",
            "promo", "subscribe", "newsletter",
        ]
        .iter()
        .any(|bad| marks.contains(bad))
}

/// Pick the densest non-link block (article/main/section/div) as the page's main text.
pub fn html_main_to_text(html: &str) -> Option<String> {
    const MAX_ELEMS: usize = 20_000;
    let doc = html_scraper::Html::parse_document(html);
    let blocks = html_scraper::Selector::parse("article, main, section, div").ok()?;
    let links = html_scraper::Selector::parse("a").ok()?;

    let mut best_score: i64 = 0;
    let mut best_text: Option<String> = None;
    for el in doc.select(&blocks).take(MAX_ELEMS) {
        if is_boilerplate_container(&el) {
            continue;
        }
        let txt: usize = el.text().map(|t| t.chars().count()).sum();
        if txt < 20 {
            continue;
        }
        let link_txt: usize = el
            .select(&links)
            .map(|a| a.text().map(|t| t.chars().count()).sum::<usize>())
            .sum();
        let mut score = txt as i64 - 2 * link_txt as i64;
        match el.value().name() {
            "article" => score += 500,
            "main" => score += 300,
            _ => {}
        }
        if link_txt > txt / 2 {
            score -= 500;
        }
        if score > best_score {
            best_score = score;
            best_text = Some(norm_ws(&el.text().collect::<Vec<_>>().join(" ")));
        }
    }
    best_text.filter(|t| has_any_text(t))
}

/// Penalizes link soup, menu-like short lines, and consent/login chrome.
fn quality_score(s: &str) -> i64 {
    let non_ws = s.chars().filter(|c| !c.is_whitespace()).count() as i64;
    let url_hits = s.matches("http").count() as i64;
    let short_lines = s
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && l.chars().count() <= 30)
        .count() as i64;
    let lower = s.to_ascii_lowercase();
    let chrome: i64 = ["sign up", "log in", "login", "cookie", "consent", "privacy", "terms"]
        .iter()
        .map(|n| lower.matches(n).count() as i64)
        .sum();
    non_ws - 200 * url_hits - 20 * short_lines - 250 * chrome
}

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub engine: &'static str,
    pub text: String,
}

impl ExtractedText {
    fn new(engine: &'static str, text: String) -> Self {
        Self { engine, text }
    }
}

/// Readable text from a fetched body.
///
/// - PDF: pdf-extract.
/// - text/markdown/json/xml: taken as-is.
/// - HTML (or unknown-but-textual): main-content pick when it clearly beats the
///   whole-page html2text rendering.
/// - images and other binaries: empty.
pub fn best_effort_text_from_bytes(
    bytes: &[u8],
    content_type: Option<&str>,
    width: usize,
) -> ExtractedText {
    let ct = content_type_lc_prefix(content_type);

    if ct == "application/pdf" || bytes_look_like_pdf(bytes) {
        return match pdf_to_text(bytes) {
            Ok(t) => ExtractedText::new("pdf-extract", t),
            Err(e) => {
                tracing::debug!(error = %e, "pdf extraction failed");
                ExtractedText::new("pdf-extract", String::new())
            }
        };
    }

    if ct.starts_with("image/")
        || ct.starts_with("video/")
        || ct.starts_with("audio/")
        || ct == "application/octet-stream"
    {
        return ExtractedText::new("unsupported", String::new());
    }

    let is_markdown = ct == "text/markdown" || ct == "text/x-markdown";
    let is_json = ct == "application/json" || ct.ends_with("+json");
    let is_xml = ct == "application/xml" || ct == "text/xml" || ct.ends_with("+xml");
    let is_text = (ct.starts_with("text/") && ct != "text/html") || is_markdown || is_json || is_xml;
    if is_text && !bytes_look_like_html(bytes) {
        return ExtractedText::new("text", String::from_utf8_lossy(bytes).to_string());
    }

    let raw = String::from_utf8_lossy(bytes).to_string();
    // Script/style bodies would otherwise count as "content".
    let html = ["script", "style", "noscript"]
        .iter()
        .fold(raw, |acc, tag| strip_tag_blocks(&acc, tag));
    let full = html_to_text(&html, width);
    let full_ok = has_any_text(&full);

    if let Some(main) = html_main_to_text(&html) {
        let s_full = if full_ok { quality_score(&full) } else { 0 };
        if !full_ok || quality_score(&main) >= s_full + 300 {
            return ExtractedText::new("html_main", main);
        }
    }
    if full_ok {
        return ExtractedText::new("html2text", full);
    }
    ExtractedText::new("unknown", String::new())
}

/// [`ContentExtractor`] over a [`FetchBackend`]: fetch, sniff, convert to text.
#[derive(Clone)]
pub struct LocalExtractor {
    fetcher: Arc<dyn FetchBackend>,
    timeout_ms: u64,
    max_bytes: u64,
    width: usize,
}

impl LocalExtractor {
    pub fn new(fetcher: Arc<dyn FetchBackend>) -> Self {
        Self {
            fetcher,
            timeout_ms: 20_000,
            max_bytes: 5_000_000,
            width: 100,
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut out = Self::new(Arc::new(LocalFetcher::new()?));
        if let Some(ms) = crate::env_first(&["DEEPSEARCH_FETCH_TIMEOUT_MS"])
            .and_then(|s| s.parse::<u64>().ok())
        {
            out.timeout_ms = ms.clamp(1_000, 120_000);
        }
        Ok(out)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Fallible variant of [`ContentExtractor::extract`].
    pub async fn try_extract(&self, url: &str) -> Result<ExtractedText> {
        let mut req = FetchRequest::new(url);
        req.timeout_ms = Some(self.timeout_ms);
        req.max_bytes = Some(self.max_bytes);

        let resp = self.fetcher.fetch(&req).await?;
        if !resp.is_success() {
            return Err(Error::Fetch(format!("HTTP {}", resp.status)));
        }
        let width = self.width;
        let ct = resp.content_type.clone();
        // PDF/HTML parsing is CPU-bound.
        tokio::task::spawn_blocking(move || {
            best_effort_text_from_bytes(&resp.bytes, ct.as_deref(), width)
        })
        .await
        .map_err(|e| Error::Fetch(format!("extract join failed: {e}")))
    }
}

#[async_trait::async_trait]
impl ContentExtractor for LocalExtractor {
    async fn extract(&self, url: &str) -> String {
        match self.try_extract(url).await {
            Ok(ex) => {
                tracing::debug!(url, engine = ex.engine, chars = ex.text.chars().count(), "extracted");
                ex.text.trim().to_string()
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "extraction failed");
                String::new()
            }
        }
    }
}
