//! Cursor-based pagination for the event feed.

use serde::{Deserialize, Serialize};

/// Default page size when `count` is not specified.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    /// Opaque cursor from a previous response.
    pub cursor: Option<String>,
    /// Number of items per page (default 100, max 1000).
    pub count: Option<u32>,
}

impl PaginationParams {
    /// Effective page size, clamped to `[1, MAX_PAGE_SIZE]`.
    pub fn effective_count(&self) -> u32 {
        self.count
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// The feed offset the cursor points at. A missing cursor is the start
    /// of the feed; a malformed one is rejected.
    pub fn offset(&self) -> Result<u64, String> {
        match self.cursor.as_deref() {
            None | Some("") => Ok(0),
            Some(c) => decode_cursor(c).ok_or_else(|| format!("malformed cursor {c:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    /// Cursor for the next page, absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Encode a feed offset as an opaque cursor (big-endian hex).
pub fn encode_cursor(offset: u64) -> String {
    hex::encode(offset.to_be_bytes())
}

pub fn decode_cursor(cursor: &str) -> Option<u64> {
    let bytes: [u8; 8] = hex::decode(cursor).ok()?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// The next-page cursor, or `None` once a short page shows the end was reached.
pub fn next_cursor(current_offset: u64, returned: usize, page_size: u32) -> Option<String> {
    if (returned as u64) < u64::from(page_size) {
        None
    } else {
        Some(encode_cursor(current_offset + returned as u64))
    }
}
