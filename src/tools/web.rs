//! Web 工具：web_search / fetch_url（web 能力组）
//!
//! fetch_url：GET 请求带超时与 User-Agent，可选域名白名单（为空则不限制）；HTML 响应用 html2text 提取可读文本，
//! 超过 max_result_chars 时截断并追加 ...[truncated]。
//! web_search：请求 HTML 版搜索入口（默认 DuckDuckGo），从结果页提取标题、链接与摘要。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Url};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::WebSection;
use crate::tools::schema::{parameters_for, parse_args};
use crate::tools::{Tool, ToolContext};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

fn build_client(timeout_secs: u64) -> Client {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .unwrap_or_default()
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20
            && s.contains('<')
            && (s.contains("</") || s.contains("<meta") || s.contains("<head") || s.contains("<title")))
}

fn html_to_text(html: &str) -> String {
    match from_read(html.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => strip_html_tags(html),
    }
}

fn truncate_chars(body: String, max: usize) -> (String, bool) {
    if body.chars().count() > max {
        (body.chars().take(max).collect::<String>() + "\n...[truncated]", true)
    } else {
        (body, false)
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
}

/// 搜索结果页中的跳转链接（//duckduckgo.com/l/?uddg=...）还原为目标地址
fn resolve_result_href(href: &str) -> String {
    let href = decode_entities(href);
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.clone()
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(href)
}

/// 从 HTML 结果页提取 (title, url, snippet)
pub fn parse_search_results(html: &str, max_results: usize) -> Vec<Value> {
    let (Ok(link_re), Ok(snippet_re)) = (
        Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#),
        Regex::new(r#"(?s)class="result__snippet"[^>]*>(.*?)</(?:a|td|div)>"#),
    ) else {
        return Vec::new();
    };
    let snippets: Vec<String> = snippet_re
        .captures_iter(html)
        .map(|c| decode_entities(&strip_html_tags(&c[1])))
        .collect();
    link_re
        .captures_iter(html)
        .take(max_results)
        .enumerate()
        .map(|(i, c)| {
            json!({
                "title": decode_entities(&strip_html_tags(&c[2])),
                "url": resolve_result_href(&c[1]),
                "snippet": snippets.get(i).cloned().unwrap_or_default(),
            })
        })
        .collect()
}

/// 从 URL 中提取 host
fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

#[derive(Deserialize, JsonSchema)]
struct FetchUrlArgs {
    /// 以 http:// 或 https:// 开头的地址
    url: String,
}

/// 抓取网页并转为可读文本
pub struct FetchUrlTool {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

impl FetchUrlTool {
    pub fn new(cfg: &WebSection) -> Self {
        Self {
            client: build_client(cfg.timeout_secs),
            allowed_domains: cfg.allowed_domains.iter().map(|s| s.to_lowercase()).collect(),
            max_result_chars: cfg.max_result_chars,
        }
    }

    fn is_allowed(&self, url: &str) -> Result<(), String> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err("URL must start with http:// or https://".to_string());
        }
        let domain = extract_domain(url).ok_or_else(|| "Invalid or missing URL".to_string())?;
        if self.allowed_domains.is_empty() || self.allowed_domains.contains(&domain) {
            return Ok(());
        }
        Err(format!("Domain not in allowlist: {}", domain))
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text content (HTML is converted to text, long pages are truncated)."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<FetchUrlArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, String> {
        let args: FetchUrlArgs = parse_args(args)?;
        let url = args.url.trim();
        self.is_allowed(url)?;
        tracing::info!(url = %url, "fetch_url");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Error fetching {}: {}", url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {} from {}", status, url));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Error reading body: {}", e))?;
        let body = body.trim_start_matches('\u{FEFF}');
        let text = if looks_like_html(body) {
            html_to_text(body)
        } else {
            body.to_string()
        };
        let (content, truncated) = truncate_chars(text, self.max_result_chars);
        Ok(json!({
            "url": url,
            "status": status.as_u16(),
            "content": content,
            "truncated": truncated,
        }))
    }
}

fn default_max_results() -> usize {
    5
}

#[derive(Deserialize, JsonSchema)]
struct WebSearchArgs {
    /// 搜索关键词
    query: String,
    /// 最多返回条数
    #[serde(default = "default_max_results")]
    max_results: usize,
}

/// 网页搜索
pub struct WebSearchTool {
    client: Client,
    endpoint: String,
}

impl WebSearchTool {
    pub fn new(cfg: &WebSection) -> Self {
        Self {
            client: build_client(cfg.timeout_secs),
            endpoint: cfg.search_endpoint.clone(),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return a list of results with title, url and snippet."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<WebSearchArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, String> {
        let args: WebSearchArgs = parse_args(args)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        let max_results = args.max_results.clamp(1, 20);
        tracing::info!(query = %query, max_results, "web_search");

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("Search failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("Search failed: HTTP {}", resp.status()));
        }
        let html = resp
            .text()
            .await
            .map_err(|e| format!("Search failed: {}", e))?;
        let results = parse_search_results(&html, max_results);
        Ok(json!({
            "query": query,
            "count": results.len(),
            "results": results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_PAGE: &str = r##"
<div class="result">
  <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdocs.rs%2Ftokio&amp;rut=abc">Tokio <b>docs</b></a>
  <a class="result__snippet" href="#">An async runtime for <b>Rust</b> &amp; more</a>
</div>
<div class="result">
  <a rel="nofollow" class="result__a" href="https://tokio.rs/">Tokio</a>
  <a class="result__snippet" href="#">Build reliable network applications</a>
</div>
"##;

    #[test]
    fn test_parse_search_results() {
        let results = parse_search_results(RESULTS_PAGE, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["url"], "https://docs.rs/tokio");
        assert_eq!(results[0]["title"], "Tokio docs");
        assert_eq!(results[0]["snippet"], "An async runtime for Rust & more");
        assert_eq!(results[1]["url"], "https://tokio.rs/");
        assert_eq!(parse_search_results(RESULTS_PAGE, 1).len(), 1);
    }

    #[test]
    fn test_fetch_url_guards() {
        let mut cfg = WebSection::default();
        let open = FetchUrlTool::new(&cfg);
        assert!(open.is_allowed("ftp://example.com").is_err());
        assert!(open.is_allowed("https://example.com/page").is_ok());

        cfg.allowed_domains = vec!["docs.rs".into()];
        let restricted = FetchUrlTool::new(&cfg);
        assert!(restricted.is_allowed("https://docs.rs/serde").is_ok());
        assert!(restricted.is_allowed("https://example.com").is_err());
    }

    #[test]
    fn test_html_detection_and_truncation() {
        assert!(looks_like_html("<!DOCTYPE html><html></html>"));
        assert!(!looks_like_html("{\"json\": true}"));
        let (text, truncated) = truncate_chars("abcdef".into(), 3);
        assert!(truncated);
        assert!(text.starts_with("abc\n"));
    }
}
