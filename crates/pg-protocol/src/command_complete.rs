//! CommandComplete parsing.
//!
//! The body is a command tag such as `INSERT 0 5`, `UPDATE 42` or `BEGIN`.
//! Only the trailing row count matters to the client.

use bytes::Buf;

use crate::codec::read_cstring;
use crate::error::ProtocolError;

/// Row counts below this value resolve to a shared static instance.
pub const CACHED_COUNTS: usize = 128;

/// Completion of a single statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CommandComplete {
    /// Rows affected or returned, or 0 when the tag carries no count.
    pub rows: u64,
}

static CACHE: [CommandComplete; CACHED_COUNTS] = {
    let mut cache = [CommandComplete { rows: 0 }; CACHED_COUNTS];
    let mut i = 0;
    while i < CACHED_COUNTS {
        cache[i].rows = i as u64;
        i += 1;
    }
    cache
};

impl CommandComplete {
    /// Shared instance for small row counts.
    #[must_use]
    pub fn cached(rows: u64) -> Option<&'static CommandComplete> {
        usize::try_from(rows).ok().and_then(|i| CACHE.get(i))
    }

    /// Extract the row count from a command tag.
    ///
    /// The count is the integer after the last space. A tag with no space, or
    /// whose last word is not a non-negative integer, yields 0.
    #[must_use]
    pub fn parse_rows(tag: &str) -> u64 {
        tag.rsplit_once(' ')
            .and_then(|(_, last)| last.parse::<u64>().ok())
            .unwrap_or(0)
    }

    /// Decode a message body.
    ///
    /// Counts below [`CACHED_COUNTS`] return a shared static instance and leave
    /// `scratch` untouched; larger counts are written into `scratch`.
    pub fn decode<'a>(
        src: &mut impl Buf,
        scratch: &'a mut CommandComplete,
    ) -> Result<&'a CommandComplete, ProtocolError> {
        let tag = read_cstring(src)?;
        let rows = Self::parse_rows(&tag);
        if let Some(cached) = Self::cached(rows) {
            return Ok(cached);
        }
        scratch.rows = rows;
        Ok(scratch)
    }
}
