use super::player::SonosPlayer;
use super::soap::{extract_text, CONTENT_DIRECTORY};
use crate::mysonos::{CatalogEntry, ProcessingType};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;

#[cfg(test)]
use mockall::automock;

const FAVORITES_OBJECT_ID: &str = "FV:2";
const BROWSE_PAGE_SIZE: u32 = 100;

const RADIO_SCHEMES: &[&str] = &[
    "x-sonosapi-stream:",
    "x-sonosapi-radio:",
    "x-rincon-mp3radio:",
    "aac:",
    "hls-radio:",
];

const LIBRARY_SCHEMES: &[&str] = &["x-file-cifs:", "file:", "x-rincon-playlist:"];

/// Source of the My Sonos favorites list.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Full favorites list in player order, fetched fresh on every call.
    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>>;
}

#[async_trait]
impl CatalogSource for SonosPlayer {
    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let mut entries = Vec::new();
        loop {
            let start = entries.len().to_string();
            let count = BROWSE_PAGE_SIZE.to_string();
            let response = self
                .soap
                .call(
                    CONTENT_DIRECTORY,
                    "Browse",
                    &[
                        ("ObjectID", FAVORITES_OBJECT_ID),
                        ("BrowseFlag", "BrowseDirectChildren"),
                        ("Filter", "*"),
                        ("StartingIndex", start.as_str()),
                        ("RequestedCount", count.as_str()),
                        ("SortCriteria", ""),
                    ],
                )
                .await
                .context("Failed to browse My Sonos favorites")?;

            let didl = extract_text(&response, "Result")?
                .ok_or_else(|| anyhow!("Browse response has no Result element"))?;
            let page = parse_favorites(&didl)?;
            let returned = page.len();
            entries.extend(page);

            let total: usize = extract_text(&response, "TotalMatches")?
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(entries.len());
            debug!("browsed {} of {} My Sonos items", entries.len(), total);
            if returned == 0 || entries.len() >= total {
                return Ok(entries);
            }
        }
    }
}

#[derive(Debug, Default)]
struct ItemFields {
    title: Option<String>,
    uri: String,
    metadata: String,
    album_art: String,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Uri,
    Metadata,
    AlbumArt,
}

/// Parses a favorites DIDL-Lite document into catalog entries.
pub fn parse_favorites(didl: &str) -> Result<Vec<CatalogEntry>> {
    let mut reader = Reader::from_str(didl);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut entries = Vec::new();
    let mut item: Option<ItemFields> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().local_name().as_ref() {
                b"item" => item = Some(ItemFields::default()),
                b"title" => field = Some(Field::Title),
                b"res" => field = Some(Field::Uri),
                b"resMD" => field = Some(Field::Metadata),
                b"albumArtURI" => field = Some(Field::AlbumArt),
                _ => field = None,
            },
            Ok(Event::Text(e)) => {
                if let (Some(fields), Some(target)) = (item.as_mut(), field) {
                    let text = e.unescape().context("Failed to unescape DIDL text")?;
                    match target {
                        Field::Title => fields.title.get_or_insert_with(String::new).push_str(&text),
                        Field::Uri => fields.uri.push_str(&text),
                        Field::Metadata => fields.metadata.push_str(&text),
                        Field::AlbumArt => fields.album_art.push_str(&text),
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                field = None;
                if e.name().local_name().as_ref() == b"item" {
                    if let Some(fields) = item.take() {
                        entries.push(into_entry(fields));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("Error parsing favorites: {}", e)),
            _ => (),
        }
        buf.clear();
    }
    Ok(entries)
}

fn into_entry(fields: ItemFields) -> CatalogEntry {
    let upnp_class = if fields.metadata.trim().is_empty() {
        String::new()
    } else {
        extract_text(&fields.metadata, "class")
            .ok()
            .flatten()
            .unwrap_or_default()
    };
    let sid = service_id(&fields.uri);
    let service_name = service_name(&sid, &fields.uri).to_string();
    let media_type = media_type(&upnp_class).to_string();
    let processing_type = if media_type == "stream"
        || RADIO_SCHEMES.iter().any(|scheme| fields.uri.starts_with(scheme))
    {
        ProcessingType::Stream
    } else {
        ProcessingType::Queue
    };

    CatalogEntry {
        title: fields.title,
        album_art: fields.album_art,
        uri: fields.uri,
        metadata: fields.metadata,
        sid,
        upnp_class,
        processing_type,
        media_type,
        service_name,
        queue: processing_type == ProcessingType::Queue,
    }
}

/// Value of the `sid` query parameter, empty if there is none.
fn service_id(uri: &str) -> String {
    url::Url::parse(uri)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "sid")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default()
}

fn service_name(sid: &str, uri: &str) -> &'static str {
    match sid {
        "254" => "TuneIn",
        "9" | "12" => "Spotify",
        "160" => "SoundCloud",
        "201" => "Amazon Music",
        "203" => "Napster",
        "204" => "Apple Music",
        _ if LIBRARY_SCHEMES.iter().any(|scheme| uri.starts_with(scheme)) => "Music Library",
        _ => "unknown",
    }
}

fn media_type(upnp_class: &str) -> &'static str {
    if upnp_class.contains("audioBroadcast") {
        "stream"
    } else if upnp_class.contains("playlistContainer") {
        "playlist"
    } else if upnp_class.contains("musicAlbum") {
        "album"
    } else if upnp_class.contains("musicTrack") {
        "track"
    } else if upnp_class.contains("musicArtist") {
        "artist"
    } else if upnp_class.contains("genre") {
        "genre"
    } else {
        "unknown"
    }
}
