use crate::types::{
    ForumSort, Result, SourceCategory, SourceDescriptor, SourceParams, TimeWindow, WatchError,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use std::path::Path;
use tracing::{error, info, warn};

/// Read FEED sources from an OPML subscription list.
///
/// A missing or malformed file is logged and yields no sources.
pub fn load_opml(path: &Path) -> Vec<SourceDescriptor> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!("Cannot read OPML file {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match parse_opml(&content) {
        Ok(sources) => {
            info!("Loaded {} feeds from {}", sources.len(), path.display());
            sources
        }
        Err(e) => {
            error!("Cannot parse OPML file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Extract every `<outline type="rss">` with an `xmlUrl`
pub fn parse_opml(content: &str) -> Result<Vec<SourceDescriptor>> {
    let mut reader = Reader::from_str(content);
    let mut sources = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.name().as_ref() == b"outline" => {
                if let Some(source) = outline_to_source(e)? {
                    sources.push(source);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(WatchError::Parse(format!(
                    "OPML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    Ok(sources)
}

fn outline_to_source(element: &BytesStart) -> Result<Option<SourceDescriptor>> {
    let mut kind = None;
    let mut xml_url = None;
    let mut html_url = None;
    let mut title = None;
    let mut text = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| WatchError::Parse(format!("Bad OPML attribute: {}", e)))?;
        let value = attr
            .unescape_value()
            .map_err(|e| WatchError::Parse(format!("Bad OPML attribute value: {}", e)))?
            .into_owned();

        match attr.key.as_ref() {
            b"type" => kind = Some(value),
            b"xmlUrl" => xml_url = Some(value),
            b"htmlUrl" => html_url = Some(value),
            b"title" => title = Some(value),
            b"text" => text = Some(value),
            _ => {}
        }
    }

    if kind.as_deref() != Some("rss") {
        return Ok(None);
    }
    let Some(xml_url) = xml_url.filter(|u| !u.is_empty()) else {
        warn!("Skipping rss outline without xmlUrl");
        return Ok(None);
    };

    let mut source = SourceDescriptor::new(SourceCategory::Feed, xml_url);
    if let Some(name) = title.or(text).filter(|n| !n.is_empty()) {
        source = source.with_name(name);
    }
    if let Some(link) = html_url.filter(|l| !l.is_empty()) {
        source = source.with_link(link);
    }
    Ok(Some(source))
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SourceEntry {
    #[serde(alias = "reddit")]
    Forum {
        subreddit: String,
        #[serde(default)]
        sort_by: ForumSort,
        #[serde(default)]
        time_filter: TimeWindow,
        name: Option<String>,
    },
    #[serde(alias = "bluesky")]
    Social { url: String, name: Option<String> },
    Web { url: String, name: Option<String> },
}

/// Read FORUM, SOCIAL and WEB sources from a JSON sources file
pub fn load_sources_file(path: &Path) -> Result<Vec<SourceDescriptor>> {
    let content = std::fs::read_to_string(path)?;
    let sources = parse_sources(&content)?;
    info!("Loaded {} sources from {}", sources.len(), path.display());
    Ok(sources)
}

pub fn parse_sources(content: &str) -> Result<Vec<SourceDescriptor>> {
    let file: SourcesFile = serde_json::from_str(content)?;

    Ok(file
        .sources
        .into_iter()
        .map(|entry| match entry {
            SourceEntry::Forum {
                subreddit,
                sort_by,
                time_filter,
                name,
            } => {
                SourceDescriptor::new(SourceCategory::Forum, format!("https://www.reddit.com/r/{}", subreddit))
                    .with_name(name.unwrap_or_else(|| format!("r/{}", subreddit)))
                    .with_params(SourceParams::Forum {
                        community: subreddit,
                        sort: sort_by,
                        window: time_filter,
                    })
            }
            SourceEntry::Social { url, name } => {
                let name = name.unwrap_or_else(|| url.clone());
                SourceDescriptor::new(SourceCategory::Social, url).with_name(name)
            }
            SourceEntry::Web { url, name } => {
                let name = name.unwrap_or_else(|| url.clone());
                SourceDescriptor::new(SourceCategory::Web, url).with_name(name)
            }
        })
        .collect())
}

/// Keep only sources whose name or url mentions one of `keywords`
pub fn filter_by_keywords(sources: Vec<SourceDescriptor>, keywords: &[String]) -> Vec<SourceDescriptor> {
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    sources
        .into_iter()
        .filter(|source| {
            let name = source.name.as_deref().unwrap_or("").to_lowercase();
            let url = source.url.to_lowercase();
            keywords.iter().any(|k| name.contains(k) || url.contains(k))
        })
        .collect()
}
