//! Result set column metadata.
//!
//! A [`RowDescription`] is owned by a connection and overwritten in place for
//! every result set. Column slots (and their name buffers) are kept across
//! result sets; the backing storage is only rebuilt when a result set needs
//! more columns than are allocated, or far fewer.

use bytes::Buf;

use crate::codec::{ensure, read_cstring_truncated, skip};
use crate::error::ProtocolError;
use crate::types::Oid;

/// Maximum number of columns a result set may carry.
pub const MAX_COLUMNS: usize = 1600;

/// Maximum stored length of a column name, in bytes.
///
/// Longer names are silently truncated at a character boundary.
pub const COLUMN_NAME_CAPACITY: usize = 64;

/// Number of surplus column slots tolerated before storage is rebuilt.
pub const SHRINK_THRESHOLD: usize = 50;

/// Metadata for one result column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDescription {
    ordinal: u16,
    name: String,
    type_oid: Oid,
}

impl ColumnDescription {
    fn with_ordinal(ordinal: u16) -> Self {
        Self {
            ordinal,
            name: String::with_capacity(COLUMN_NAME_CAPACITY),
            type_oid: Oid::UNSPECIFIED,
        }
    }

    /// Zero-based position of the column in the row.
    #[must_use]
    pub fn ordinal(&self) -> u16 {
        self.ordinal
    }

    /// Column name, truncated to [`COLUMN_NAME_CAPACITY`] bytes.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type code.
    #[must_use]
    pub fn type_oid(&self) -> Oid {
        self.type_oid
    }

    // field layout after the name: table oid (4), attribute number (2),
    // type oid (4), type size (2), type modifier (4), format code (2)
    fn decode(&mut self, src: &mut impl Buf) -> Result<(), ProtocolError> {
        read_cstring_truncated(src, &mut self.name, COLUMN_NAME_CAPACITY)?;
        skip(src, 4 + 2)?;
        ensure(src, 4)?;
        self.type_oid = Oid(src.get_u32());
        skip(src, 2 + 4 + 2)
    }
}

/// Ordered column metadata for the current result set.
#[derive(Debug, Clone, Default)]
pub struct RowDescription {
    columns: Vec<ColumnDescription>,
    count: usize,
}

impl RowDescription {
    /// Description of a result with no columns.
    pub const EMPTY: RowDescription = RowDescription {
        columns: Vec::new(),
        count: 0,
    };

    /// Create an empty description.
    #[must_use]
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Shared zero-column description.
    #[must_use]
    pub fn empty() -> &'static RowDescription {
        static EMPTY: RowDescription = RowDescription::EMPTY;
        &EMPTY
    }

    /// Number of columns in the current result set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if the current result set has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of allocated column slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.columns.len()
    }

    /// Columns of the current result set.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDescription] {
        &self.columns[..self.count]
    }

    /// Column at `ordinal`, if present.
    #[must_use]
    pub fn column(&self, ordinal: usize) -> Option<&ColumnDescription> {
        self.columns().get(ordinal)
    }

    /// Find the first column with the given name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ColumnDescription> {
        self.columns().iter().find(|c| c.name == name)
    }

    /// Forget the current result set, keeping allocated slots.
    pub fn clear(&mut self) {
        self.count = 0;
    }

    /// Overwrite this description from a RowDescription message body.
    pub fn decode(&mut self, src: &mut impl Buf) -> Result<(), ProtocolError> {
        ensure(src, 2)?;
        let count = usize::from(src.get_u16());
        if count > MAX_COLUMNS {
            return Err(ProtocolError::TooManyColumns {
                count,
                max: MAX_COLUMNS,
            });
        }

        self.resize(count);
        for column in &mut self.columns[..count] {
            column.decode(src)?;
        }
        Ok(())
    }

    fn resize(&mut self, count: usize) {
        let capacity = self.columns.len();
        if count > capacity || capacity - count > SHRINK_THRESHOLD {
            // count is bounded by MAX_COLUMNS, so ordinals fit in u16
            self.columns = (0..count as u16)
                .map(ColumnDescription::with_ordinal)
                .collect();
        }
        self.count = count;
    }
}
