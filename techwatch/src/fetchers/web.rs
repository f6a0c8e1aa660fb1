use super::http::HttpClient;
use crate::traits::Fetcher;
use crate::types::{Article, FetchConfig, Result, SourceCategory, SourceDescriptor, WatchError};
use crate::utils::text::{collapse_whitespace, smart_truncate, visible_text};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

const MAX_ITEMS: usize = 50;
const MIN_ITEM_CHARS: usize = 10;
const TITLE_CHARS: usize = 100;
const SUMMARY_CHARS: usize = 500;

const CVE_PATTERN: &str = r"cve-\d{4}-\d{4,}";
const DATE_PATTERN: &str = r"\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4}";

/// Page text that marks a bulletin or changelog
const LISTING_MARKERS: [&str; 5] = [
    "security advisory",
    "vulnerability",
    "changelog",
    "release notes",
    "what's new",
];

const ITEM_CONTAINERS: &str = "li[class*=\"item\"], li[class*=\"entry\"], li[class*=\"row\"], \
     tr[class*=\"item\"], tr[class*=\"entry\"], tr[class*=\"row\"], \
     div[class*=\"item\"], div[class*=\"entry\"], div[class*=\"row\"]";

const MAIN_CONTENT: [&str; 5] = ["article", "main", "[role=\"main\"]", ".content", "#content"];

const PUBLISHED_META: &str = "meta[property=\"article:published_time\"], \
     meta[itemprop=\"datePublished\"], meta[name=\"publish-date\"], meta[name=\"date\"]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Bulletins, changelogs and indexes: one article per entry
    Listing,
    Single,
}

/// Fetcher for WEB sources: plain HTML pages without a feed
pub struct WebFetcher {
    http: HttpClient,
}

impl WebFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }
}

#[async_trait]
impl Fetcher for WebFetcher {
    fn category(&self) -> SourceCategory {
        SourceCategory::Web
    }

    fn fetcher_name(&self) -> String {
        "web".to_string()
    }

    async fn fetch_articles(&self, source: &SourceDescriptor, max_age_days: u32) -> Result<Vec<Article>> {
        info!("Pulling web page: {}", source.url);

        let content = self
            .http
            .get_text(&source.url)
            .await
            .map_err(|e| WatchError::fetch(SourceCategory::Web, format!("{}: {}", source.url, e)))?;

        let now = Utc::now();
        let cutoff = now - Duration::days(i64::from(max_age_days));
        let articles = parse_page(&content, &source.url, now, cutoff)?;

        info!("{} articles extracted from {}", articles.len(), source.label());
        Ok(articles)
    }
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!("Bad selector {}: {:?}", css, e);
            None
        }
    }
}

/// Whether the page reads as a list of entries or as one article
pub fn detect_kind(document: &Html) -> PageKind {
    let text = visible_text(document.root_element()).to_lowercase();

    let mentions_cve = Regex::new(CVE_PATTERN)
        .map(|re| re.is_match(&text))
        .unwrap_or(false);
    if mentions_cve || LISTING_MARKERS.iter().any(|marker| text.contains(marker)) {
        return PageKind::Listing;
    }

    if selector("article, main").is_some_and(|s| document.select(&s).next().is_some()) {
        return PageKind::Single;
    }

    let lists = selector("ul, ol, table")
        .map(|s| document.select(&s).count())
        .unwrap_or(0);
    if lists > 3 {
        PageKind::Listing
    } else {
        PageKind::Single
    }
}

/// Articles found in the page at `base_url`.
///
/// Listing pages give one article per entry, falling back to the whole page
/// when no entry qualifies. Entries dated before `cutoff` are dropped and
/// undated ones are stamped with `now`.
pub fn parse_page(
    html: &str,
    base_url: &str,
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Article>> {
    let base = Url::parse(base_url)?;
    let document = Html::parse_document(html);

    let kind = detect_kind(&document);
    debug!("{} looks like {:?}", base, kind);

    if kind == PageKind::Listing {
        let items = listing_items(&document, &base, now, cutoff);
        if !items.is_empty() {
            return Ok(items);
        }
        debug!("No entries in {}, reading it as one article", base);
    }

    Ok(single_article(&document, &base, now, cutoff)
        .into_iter()
        .collect())
}

fn listing_items(document: &Html, base: &Url, now: DateTime<Utc>, cutoff: DateTime<Utc>) -> Vec<Article> {
    let mut containers: Vec<ElementRef<'_>> = selector(ITEM_CONTAINERS)
        .map(|s| document.select(&s).collect())
        .unwrap_or_default();

    if containers.is_empty() {
        if let Some(items) = selector("ul > li, ol > li") {
            containers.extend(document.select(&items));
        }
        if let (Some(tables), Some(rows)) = (selector("table"), selector("tr")) {
            for table in document.select(&tables) {
                // header row
                containers.extend(table.select(&rows).skip(1));
            }
        }
    }

    let links = selector("a[href]");
    let times = selector("time[datetime]");
    let date_pattern = Regex::new(DATE_PATTERN).ok();

    let mut seen_links = HashSet::new();
    let mut articles = Vec::new();

    for (idx, container) in containers.into_iter().take(MAX_ITEMS).enumerate() {
        let text = visible_text(container);
        if text.chars().count() < MIN_ITEM_CHARS {
            continue;
        }

        let anchor = links.as_ref().and_then(|s| container.select(s).next());
        let link = anchor
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve(base, href))
            .unwrap_or_else(|| {
                let mut url = base.clone();
                url.set_fragment(Some(&format!("item-{}", idx)));
                url.to_string()
            });

        let published = times
            .as_ref()
            .and_then(|s| container.select(s).next())
            .and_then(|t| t.value().attr("datetime"))
            .and_then(parse_date)
            .or_else(|| {
                date_pattern
                    .as_ref()
                    .and_then(|re| re.find(&text))
                    .and_then(|m| parse_date(m.as_str()))
            })
            .unwrap_or(now);

        if published < cutoff {
            debug!("Skipping old entry: {}", link);
            continue;
        }

        if !seen_links.insert(link.clone()) {
            continue;
        }

        let title = anchor
            .map(visible_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| text.clone());

        articles.push(
            Article::new(smart_truncate(&title, TITLE_CHARS), link, published, SourceCategory::Web)
                .with_summary(smart_truncate(&text, SUMMARY_CHARS)),
        );
    }

    articles
}

fn single_article(document: &Html, base: &Url, now: DateTime<Utc>, cutoff: DateTime<Utc>) -> Option<Article> {
    let title = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_title(base));

    let main = MAIN_CONTENT
        .iter()
        .filter_map(|css| selector(css))
        .find_map(|s| document.select(&s).next())
        .or_else(|| selector("body").and_then(|s| document.select(&s).next()))
        .unwrap_or_else(|| document.root_element());
    let content = visible_text(main);

    let published = selector(PUBLISHED_META)
        .and_then(|s| document.select(&s).next())
        .and_then(|meta| meta.value().attr("content"))
        .and_then(parse_date)
        .or_else(|| {
            selector("time[datetime]")
                .and_then(|s| main.select(&s).next())
                .and_then(|t| t.value().attr("datetime"))
                .and_then(parse_date)
        })
        .unwrap_or(now);

    if published < cutoff {
        debug!("Skipping old page: {}", base);
        return None;
    }

    let mut article = Article::new(title, base.as_str(), published, SourceCategory::Web);
    if !content.is_empty() {
        article.summary = Some(smart_truncate(&content, SUMMARY_CHARS));
    }
    Some(article)
}

fn fallback_title(base: &Url) -> String {
    base.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .or_else(|| base.host_str().map(str::to_string))
        .unwrap_or_else(|| base.to_string())
}

/// Absolute http(s) url for `href`, relative to `base`
fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }

    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// RFC 3339 timestamps, or `YYYY-MM-DD` / `DD/MM/YYYY` dates at midnight UTC
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let head = raw.get(..10).unwrap_or(raw);
    ["%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(head, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
