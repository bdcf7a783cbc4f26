//! Keyset pagination primitives.
//!
//! Cursors carry the sort key and insertion sequence of the last row of a
//! page, so later pages stay correct while rows are inserted or deleted.

/// Default batch size when callers do not pass one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Upper bound for one fetch batch.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Normalizes a page size: `0` means default, large values are clamped.
pub fn normalize_page_size(page_size: u32) -> u32 {
    match page_size {
        0 => DEFAULT_PAGE_SIZE,
        value if value > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
        value => value,
    }
}

/// Opaque position after which the next page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    key: CursorKey,
    seq: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CursorKey {
    Text(String),
    Integer(i64),
}

impl PageCursor {
    pub(crate) fn text(key: String, seq: i64) -> Self {
        Self {
            key: CursorKey::Text(key),
            seq,
        }
    }

    pub(crate) fn integer(key: i64, seq: i64) -> Self {
        Self {
            key: CursorKey::Integer(key),
            seq,
        }
    }

    pub(crate) fn as_text(&self) -> Option<(&str, i64)> {
        match &self.key {
            CursorKey::Text(key) => Some((key.as_str(), self.seq)),
            CursorKey::Integer(_) => None,
        }
    }

    pub(crate) fn as_integer(&self) -> Option<(i64, i64)> {
        match self.key {
            CursorKey::Integer(key) => Some((key, self.seq)),
            CursorKey::Text(_) => None,
        }
    }
}

/// Query options for one page of an ordered listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    /// Start after this position; `None` starts at the beginning.
    pub after: Option<PageCursor>,
    /// Requested page size, normalized with [`normalize_page_size`].
    pub limit: u32,
}

impl PageQuery {
    pub fn first(limit: u32) -> Self {
        Self { after: None, limit }
    }

    pub fn after(cursor: PageCursor, limit: u32) -> Self {
        Self {
            after: Some(cursor),
            limit,
        }
    }
}

/// One page of results plus the cursor for the next page, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<PageCursor>,
}

impl<T> Page<T> {
    /// Builds a page from `limit + 1` fetched rows; the extra row only
    /// signals that another page exists.
    pub(crate) fn from_rows(
        mut rows: Vec<(T, PageCursor)>,
        limit: u32,
    ) -> Self {
        let has_more = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        let next_cursor = if has_more {
            rows.last().map(|(_, cursor)| cursor.clone())
        } else {
            None
        };
        Self {
            items: rows.into_iter().map(|(item, _)| item).collect(),
            next_cursor,
        }
    }

    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}
