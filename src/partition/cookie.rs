//! # Partition Cookies
//!
//! Opaque resumption token for paged scatter-gather queries. A cookie carries
//! the partitions that still have to be visited plus an integer cursor, so the
//! proxy keeps no cursor state between round trips.
//!
//! ## Binary layout
//!
//! ```text
//! varint(partition_count) | ceil(partition_count / 64) x u64 LE | varint(cursor)
//! ```
//!
//! Varints are protobuf base-128 varints.

use crate::constants::cookie_formats;
use crate::error::{GridError, GridResult};
use crate::partition::PartitionSet;
use base64::{engine::general_purpose, Engine as _};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::encoding::{decode_varint, encode_varint, encoded_len_varint};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CookieError {
    #[error("Cookie truncated: {needed} more bytes expected")]
    Truncated { needed: usize },
    #[error("Malformed varint: {0}")]
    MalformedVarint(String),
    #[error("Cookie built for {actual} partitions, service has {expected}")]
    PartitionCountMismatch { expected: u32, actual: u64 },
    #[error("Unexpected trailing bytes after cookie cursor")]
    TrailingBytes,
    #[error("Cookie bitmap has bits beyond the partition count")]
    InvalidBits,
    #[error("Invalid cookie encoding: {0}")]
    InvalidEncoding(String),
}

/// Decoded cookie: remaining partitions plus the cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionCookie {
    pub partitions: PartitionSet,
    pub cursor: u64,
}

impl PartitionCookie {
    pub fn new(partitions: PartitionSet, cursor: u64) -> Self {
        Self { partitions, cursor }
    }

    /// First page: every partition, cursor zero
    pub fn first_page(partition_count: u32) -> Self {
        Self::new(PartitionSet::full(partition_count), 0)
    }
}

/// Named serialization format for cookies
pub trait CookieCodec: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn encode(&self, partitions: &PartitionSet, cursor: u64) -> Bytes;

    fn decode(&self, blob: &[u8], partition_count: u32) -> Result<PartitionCookie, CookieError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCookieCodec;

impl CookieCodec for BinaryCookieCodec {
    fn name(&self) -> &'static str {
        cookie_formats::BINARY
    }

    fn encode(&self, partitions: &PartitionSet, cursor: u64) -> Bytes {
        let count = u64::from(partitions.partition_count());
        let mut buf = BytesMut::with_capacity(
            encoded_len_varint(count) + partitions.words().len() * 8 + encoded_len_varint(cursor),
        );
        encode_varint(count, &mut buf);
        for word in partitions.words() {
            buf.put_u64_le(*word);
        }
        encode_varint(cursor, &mut buf);
        buf.freeze()
    }

    fn decode(&self, blob: &[u8], partition_count: u32) -> Result<PartitionCookie, CookieError> {
        let mut buf = blob;

        let count =
            decode_varint(&mut buf).map_err(|e| CookieError::MalformedVarint(e.to_string()))?;
        if count != u64::from(partition_count) {
            return Err(CookieError::PartitionCountMismatch {
                expected: partition_count,
                actual: count,
            });
        }

        let word_count = PartitionSet::word_count(partition_count);
        let needed = word_count * 8;
        if buf.remaining() < needed {
            return Err(CookieError::Truncated {
                needed: needed - buf.remaining(),
            });
        }
        let words = (0..word_count).map(|_| buf.get_u64_le()).collect();
        let partitions =
            PartitionSet::from_words(partition_count, words).ok_or(CookieError::InvalidBits)?;

        let cursor =
            decode_varint(&mut buf).map_err(|e| CookieError::MalformedVarint(e.to_string()))?;
        if buf.has_remaining() {
            return Err(CookieError::TrailingBytes);
        }

        Ok(PartitionCookie { partitions, cursor })
    }
}

/// The binary layout as standard base64 text, for text-only transports
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64CookieCodec;

impl CookieCodec for Base64CookieCodec {
    fn name(&self) -> &'static str {
        cookie_formats::BASE64
    }

    fn encode(&self, partitions: &PartitionSet, cursor: u64) -> Bytes {
        let raw = BinaryCookieCodec.encode(partitions, cursor);
        Bytes::from(general_purpose::STANDARD.encode(raw))
    }

    fn decode(&self, blob: &[u8], partition_count: u32) -> Result<PartitionCookie, CookieError> {
        let raw = general_purpose::STANDARD
            .decode(blob)
            .map_err(|e| CookieError::InvalidEncoding(e.to_string()))?;
        BinaryCookieCodec.decode(&raw, partition_count)
    }
}

/// Cookie codecs keyed by format name
#[derive(Debug, Clone)]
pub struct CookieCodecs {
    codecs: HashMap<&'static str, Arc<dyn CookieCodec>>,
}

impl Default for CookieCodecs {
    fn default() -> Self {
        let mut codecs = Self {
            codecs: HashMap::new(),
        };
        codecs.register(Arc::new(BinaryCookieCodec));
        codecs.register(Arc::new(Base64CookieCodec));
        codecs
    }
}

impl CookieCodecs {
    pub fn register(&mut self, codec: Arc<dyn CookieCodec>) {
        self.codecs.insert(codec.name(), codec);
    }

    pub fn get(&self, name: &str) -> GridResult<Arc<dyn CookieCodec>> {
        self.codecs
            .get(name)
            .cloned()
            .ok_or_else(|| GridError::Unsupported(format!("cookie format '{name}'")))
    }
}

/// Encode the remaining partitions; `None` once nothing is left to visit
pub fn encode_cookie(codec: &dyn CookieCodec, partitions: &PartitionSet, cursor: u64) -> Option<Bytes> {
    if partitions.is_empty() {
        return None;
    }
    Some(codec.encode(partitions, cursor))
}

/// Decode a cookie; a missing cookie is the first page
pub fn decode_cookie(
    codec: &dyn CookieCodec,
    blob: Option<&[u8]>,
    partition_count: u32,
) -> GridResult<PartitionCookie> {
    match blob {
        None => Ok(PartitionCookie::first_page(partition_count)),
        Some(blob) => Ok(codec.decode(blob, partition_count)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_layout() {
        let partitions = PartitionSet::from_partitions(70, [0, 65]);
        let blob = BinaryCookieCodec.encode(&partitions, 300);

        // varint(70), two words, varint(300) = 0xAC 0x02
        assert_eq!(blob.len(), 1 + 16 + 2);
        assert_eq!(blob[0], 70);
        assert_eq!(&blob[1..9], &1u64.to_le_bytes());
        assert_eq!(&blob[9..17], &2u64.to_le_bytes());
        assert_eq!(&blob[17..], &[0xAC, 0x02]);
    }

    #[test]
    fn test_round_trip_both_codecs() {
        let partitions = PartitionSet::from_partitions(257, [3, 64, 128, 256]);
        for codec in [&BinaryCookieCodec as &dyn CookieCodec, &Base64CookieCodec] {
            let blob = encode_cookie(codec, &partitions, 42).unwrap();
            let cookie = decode_cookie(codec, Some(blob.as_ref()), 257).unwrap();
            assert_eq!(cookie.partitions, partitions);
            assert_eq!(cookie.cursor, 42);
        }
    }

    #[test]
    fn test_empty_set_has_no_cookie() {
        assert!(encode_cookie(&BinaryCookieCodec, &PartitionSet::new(257), 9).is_none());
    }

    #[test]
    fn test_missing_cookie_is_first_page() {
        let cookie = decode_cookie(&BinaryCookieCodec, None, 257).unwrap();
        assert!(cookie.partitions.is_full());
        assert_eq!(cookie.cursor, 0);
    }

    #[test]
    fn test_malformed_cookies() {
        let codec = BinaryCookieCodec;
        let good = codec.encode(&PartitionSet::full(70), 1);

        assert!(matches!(
            codec.decode(&good[..5], 70),
            Err(CookieError::Truncated { needed: 12 })
        ));
        assert!(matches!(
            codec.decode(&good, 71),
            Err(CookieError::PartitionCountMismatch { expected: 71, actual: 70 })
        ));
        assert!(matches!(
            codec.decode(&[], 70),
            Err(CookieError::MalformedVarint(_))
        ));

        let mut trailing = good.to_vec();
        trailing.push(0);
        assert_eq!(codec.decode(&trailing, 70), Err(CookieError::TrailingBytes));

        let mut stray_bits = good.to_vec();
        stray_bits[16] = 0xFF;
        assert_eq!(codec.decode(&stray_bits, 70), Err(CookieError::InvalidBits));
    }

    #[test]
    fn test_decode_error_surfaces_as_grid_error() {
        let err = decode_cookie(&Base64CookieCodec, Some(&b"***"[..]), 257).unwrap_err();
        assert!(matches!(
            err,
            GridError::CookieDecode(CookieError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let codecs = CookieCodecs::default();
        assert_eq!(codecs.get("binary").unwrap().name(), "binary");
        assert_eq!(codecs.get("base64").unwrap().name(), "base64");
        assert!(matches!(codecs.get("pof"), Err(GridError::Unsupported(_))));
    }
}
