use crate::error::CommandError;
use crate::message::{ExportItem, FilterSelection};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wildcard value for `Filter::media_type` and `Filter::service_name`.
pub const MATCH_ALL: &str = "all";

/// How a My Sonos item is meant to be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingType {
    Queue,
    Stream,
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingType::Queue => f.write_str("queue"),
            ProcessingType::Stream => f.write_str("stream"),
        }
    }
}

/// One saved favorite. Only `title` is required for matching; the other
/// string fields may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub title: Option<String>,
    pub album_art: String,
    pub uri: String,
    pub metadata: String,
    pub sid: String,
    pub upnp_class: String,
    pub processing_type: ProcessingType,
    pub media_type: String,
    pub service_name: String,
    pub queue: bool,
}

impl CatalogEntry {
    pub fn export_item(&self) -> ExportItem {
        ExportItem {
            uri: self.uri.clone(),
            metadata: self.metadata.clone(),
            queue: self.queue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub processing_type: ProcessingType,
    pub media_type: String,
    pub service_name: String,
}

impl Filter {
    /// Filter for `processing_type` that accepts any media type and service.
    pub fn any(processing_type: ProcessingType) -> Self {
        Self {
            processing_type,
            media_type: MATCH_ALL.to_string(),
            service_name: MATCH_ALL.to_string(),
        }
    }

    /// Filter for `processing_type`, narrowed by `msg.filter` when given.
    pub fn from_selection(processing_type: ProcessingType, selection: Option<FilterSelection>) -> Self {
        match selection {
            Some(selection) => Self {
                processing_type,
                media_type: selection.media_type,
                service_name: selection.service_name,
            },
            None => Self::any(processing_type),
        }
    }

    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        entry.processing_type == self.processing_type
            && (self.media_type == MATCH_ALL || entry.media_type == self.media_type)
            && (self.service_name == MATCH_ALL || entry.service_name == self.service_name)
    }
}

/// First entry, in catalog order, whose title contains `search` and which
/// passes `filter`. A `None` filter admits every entry.
pub fn resolve<'a>(
    catalog: &'a [CatalogEntry],
    search: &str,
    filter: Option<&Filter>,
) -> Result<&'a CatalogEntry, CommandError> {
    if catalog.is_empty() {
        return Err(CommandError::EmptyCatalog);
    }
    debug!("search >>{}<< filter {:?}", search, filter);

    catalog
        .iter()
        .find(|entry| {
            filter.map_or(true, |f| f.matches(entry))
                && entry
                    .title
                    .as_deref()
                    .is_some_and(|title| title.contains(search))
        })
        .ok_or_else(|| CommandError::NoMatchFound(search.to_string()))
}
