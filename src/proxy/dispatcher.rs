//! # Request Dispatcher
//!
//! Routes [`CacheRequest`]s to handlers through a table keyed by
//! [`RequestKind`]. The default table serves every kind against the session's
//! data maps; callers may replace individual handlers.

use super::paged_query::PagedQuery;
use super::request::{CacheRequest, CacheResponse, RequestKind};
use crate::cluster::map::ClusteredMap;
use crate::cluster::session::GridSession;
use crate::config::PartitionConfig;
use crate::error::{GridError, GridResult};
use crate::partition::{CookieCodecs, PartitionBatcher};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub type Handler = fn(&ProxyContext, CacheRequest) -> GridResult<CacheResponse>;

/// What handlers run against
#[derive(Clone)]
pub struct ProxyContext {
    pub session: Arc<dyn GridSession>,
    pub paged: PagedQuery,
}

impl fmt::Debug for ProxyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyContext")
            .field("paged", &self.paged)
            .finish_non_exhaustive()
    }
}

pub struct RequestDispatcher {
    context: ProxyContext,
    handlers: HashMap<RequestKind, Handler>,
}

impl fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("context", &self.context)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RequestDispatcher {
    /// Dispatcher with the standard handler table; fails on an unknown
    /// cookie format
    pub fn new(session: Arc<dyn GridSession>, config: &PartitionConfig) -> GridResult<Self> {
        let codec = CookieCodecs::default().get(&config.cookie_format)?;
        let paged = PagedQuery::new(PartitionBatcher::from_config(config), codec);

        let mut handlers: HashMap<RequestKind, Handler> = HashMap::new();
        handlers.insert(RequestKind::Get, handle_get);
        handlers.insert(RequestKind::Put, handle_put);
        handlers.insert(RequestKind::Remove, handle_remove);
        handlers.insert(RequestKind::Size, handle_size);
        handlers.insert(RequestKind::KeysPage, handle_keys_page);
        handlers.insert(RequestKind::EntriesPage, handle_entries_page);

        Ok(Self {
            context: ProxyContext { session, paged },
            handlers,
        })
    }

    /// Install a handler, returning the one it replaced
    pub fn register(&mut self, kind: RequestKind, handler: Handler) -> Option<Handler> {
        self.handlers.insert(kind, handler)
    }

    pub fn deregister(&mut self, kind: RequestKind) -> Option<Handler> {
        self.handlers.remove(&kind)
    }

    pub fn dispatch(&self, request: CacheRequest) -> GridResult<CacheResponse> {
        let kind = request.kind();
        let handler = self
            .handlers
            .get(&kind)
            .ok_or_else(|| GridError::Unsupported(format!("no handler for '{kind}' requests")))?;
        debug!(kind = %kind, cache = %request.cache_name(), "Dispatching request");
        handler(&self.context, request)
    }
}

fn mismatched(expected: RequestKind) -> GridError {
    GridError::InvalidInput(format!("request routed to the '{expected}' handler"))
}

fn handle_get(context: &ProxyContext, request: CacheRequest) -> GridResult<CacheResponse> {
    let CacheRequest::Get { cache, key } = request else {
        return Err(mismatched(RequestKind::Get));
    };
    let value = context.session.data_map(&cache).get(&key)?;
    Ok(CacheResponse::Value { value })
}

fn handle_put(context: &ProxyContext, request: CacheRequest) -> GridResult<CacheResponse> {
    let CacheRequest::Put { cache, key, value } = request else {
        return Err(mismatched(RequestKind::Put));
    };
    let previous = context.session.data_map(&cache).put(key, value)?;
    Ok(CacheResponse::Value { value: previous })
}

fn handle_remove(context: &ProxyContext, request: CacheRequest) -> GridResult<CacheResponse> {
    let CacheRequest::Remove { cache, key } = request else {
        return Err(mismatched(RequestKind::Remove));
    };
    let previous = context.session.data_map(&cache).remove(&key)?;
    Ok(CacheResponse::Value { value: previous })
}

fn handle_size(context: &ProxyContext, request: CacheRequest) -> GridResult<CacheResponse> {
    let CacheRequest::Size { cache } = request else {
        return Err(mismatched(RequestKind::Size));
    };
    let size = context.session.data_map(&cache).len()?;
    Ok(CacheResponse::Size { size })
}

fn handle_keys_page(context: &ProxyContext, request: CacheRequest) -> GridResult<CacheResponse> {
    let CacheRequest::KeysPage { cache, cookie } = request else {
        return Err(mismatched(RequestKind::KeysPage));
    };
    let map = context.session.data_map(&cache);
    let partitions = context.session.partitions();
    let page = context
        .paged
        .next_page(map.as_ref(), partitions.as_ref(), cookie.as_deref())?;
    Ok(CacheResponse::Keys {
        keys: page.entries.into_iter().map(|(key, _)| key).collect(),
        cookie: page.cookie,
    })
}

fn handle_entries_page(context: &ProxyContext, request: CacheRequest) -> GridResult<CacheResponse> {
    let CacheRequest::EntriesPage { cache, cookie } = request else {
        return Err(mismatched(RequestKind::EntriesPage));
    };
    let map = context.session.data_map(&cache);
    let partitions = context.session.partitions();
    let page = context
        .paged
        .next_page(map.as_ref(), partitions.as_ref(), cookie.as_deref())?;
    Ok(CacheResponse::Entries {
        entries: page.entries,
        cookie: page.cookie,
    })
}
