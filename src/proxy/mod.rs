//! # Proxy Requests
//!
//! Request/response types for remote clients, the [`RequestDispatcher`] that
//! routes them and the paged scatter-gather query behind `KeysPage` and
//! `EntriesPage`.

pub mod dispatcher;
pub mod paged_query;
pub mod request;

pub use dispatcher::{Handler, ProxyContext, RequestDispatcher};
pub use paged_query::{Page, PagedQuery};
pub use request::{CacheRequest, CacheResponse, RequestKind};
