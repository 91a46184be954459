//! # Partitions
//!
//! Partition bitmaps, batch sizing for paged scatter-gather queries and the
//! cookie that carries query progress between round trips.

pub mod batcher;
pub mod cookie;
pub mod set;

pub use batcher::PartitionBatcher;
pub use cookie::{
    decode_cookie, encode_cookie, Base64CookieCodec, BinaryCookieCodec, CookieCodec, CookieCodecs,
    CookieError, PartitionCookie,
};
pub use set::PartitionSet;
