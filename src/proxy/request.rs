//! Requests and responses carried between a remote client and the proxy.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of a [`CacheRequest`], the key of the dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Get,
    Put,
    Remove,
    Size,
    KeysPage,
    EntriesPage,
}

impl RequestKind {
    pub const ALL: [RequestKind; 6] = [
        Self::Get,
        Self::Put,
        Self::Remove,
        Self::Size,
        Self::KeysPage,
        Self::EntriesPage,
    ];
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::Put => write!(f, "put"),
            Self::Remove => write!(f, "remove"),
            Self::Size => write!(f, "size"),
            Self::KeysPage => write!(f, "keys_page"),
            Self::EntriesPage => write!(f, "entries_page"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheRequest {
    Get {
        cache: String,
        key: Bytes,
    },
    Put {
        cache: String,
        key: Bytes,
        value: Bytes,
    },
    Remove {
        cache: String,
        key: Bytes,
    },
    Size {
        cache: String,
    },
    /// One page of keys; no cookie asks for the first page
    KeysPage {
        cache: String,
        cookie: Option<Bytes>,
    },
    /// One page of entries; no cookie asks for the first page
    EntriesPage {
        cache: String,
        cookie: Option<Bytes>,
    },
}

impl CacheRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Get { .. } => RequestKind::Get,
            Self::Put { .. } => RequestKind::Put,
            Self::Remove { .. } => RequestKind::Remove,
            Self::Size { .. } => RequestKind::Size,
            Self::KeysPage { .. } => RequestKind::KeysPage,
            Self::EntriesPage { .. } => RequestKind::EntriesPage,
        }
    }

    pub fn cache_name(&self) -> &str {
        match self {
            Self::Get { cache, .. }
            | Self::Put { cache, .. }
            | Self::Remove { cache, .. }
            | Self::Size { cache }
            | Self::KeysPage { cache, .. }
            | Self::EntriesPage { cache, .. } => cache,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheResponse {
    /// Current value for `Get`, previous value for `Put` and `Remove`
    Value { value: Option<Bytes> },
    Size { size: usize },
    /// A page of keys; no cookie marks the last page
    Keys {
        keys: Vec<Bytes>,
        cookie: Option<Bytes>,
    },
    /// A page of entries; no cookie marks the last page
    Entries {
        entries: Vec<(Bytes, Bytes)>,
        cookie: Option<Bytes>,
    },
}

impl CacheResponse {
    /// Cookie to send with the next page request, if any
    pub fn cookie(&self) -> Option<&Bytes> {
        match self {
            Self::Keys { cookie, .. } | Self::Entries { cookie, .. } => cookie.as_ref(),
            Self::Value { .. } | Self::Size { .. } => None,
        }
    }
}
