//! Streaming row decoder.
//!
//! A [`DataRow`] walks the columns of one DataRow message in order. Column
//! values are never materialized up front: [`DataRow::move_next`] reads the
//! length prefix of the next column (and the header of an array column),
//! and the typed accessors consume the payload in place. Bytes a caller
//! leaves unread are discarded on the next advance, so the decoder always
//! stays aligned with the message.
//!
//! ## Access Patterns
//!
//! - `get::<T>()` - typed scalar read; `None` for NULL or incompatible types
//! - `get_array::<T>()` - lazy element iterator over a one-dimensional array
//! - `read_partial()` - raw bytes in caller-sized chunks
//! - `value()` - dynamic [`PgValue`] through the type registry

use std::marker::PhantomData;

use bytes::{Buf, Bytes};
use pg_protocol::{ColumnDescription, Oid, ProtocolError, RowDescription};
use pg_types::{ArrayHeader, PgProtocol, PgValue, registry};

/// Decode state of the current column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataColumn {
    ordinal: usize,
    type_oid: Oid,
    length: i32,
    remaining: usize,
    array_length: i32,
    element_oid: Oid,
    consumed: bool,
}

impl DataColumn {
    const BEFORE_FIRST: DataColumn = DataColumn {
        ordinal: 0,
        type_oid: Oid::UNSPECIFIED,
        length: -1,
        remaining: 0,
        array_length: -1,
        element_oid: Oid::UNSPECIFIED,
        consumed: true,
    };

    /// Zero-based column position.
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Declared type code.
    #[must_use]
    pub fn type_oid(&self) -> Oid {
        self.type_oid
    }

    /// Binary length of the value; -1 for SQL NULL.
    #[must_use]
    pub fn length(&self) -> i32 {
        self.length
    }

    /// Check if the value is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.length < 0
    }

    /// Bytes of this value not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Element count of a one-dimensional array; -1 if the column is not an
    /// array or has more than one dimension.
    #[must_use]
    pub fn array_length(&self) -> i32 {
        self.array_length
    }

    /// Element type code from the array header.
    #[must_use]
    pub fn element_oid(&self) -> Oid {
        self.element_oid
    }

    /// Check if the declared type is a registered array type.
    #[must_use]
    pub fn is_array(&self) -> bool {
        registry::is_array(self.type_oid)
    }
}

/// One data row being decoded against its row description.
///
/// Borrowing the description ties the row to the result set it belongs to;
/// the description cannot change while a row is alive.
#[derive(Debug)]
pub struct DataRow<'a> {
    description: &'a RowDescription,
    body: Bytes,
    column: DataColumn,
    visited: usize,
}

impl<'a> DataRow<'a> {
    /// Start decoding a DataRow message body.
    ///
    /// The column count must match the description.
    pub fn new(description: &'a RowDescription, mut body: Bytes) -> Result<Self, ProtocolError> {
        if body.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let count = usize::from(body.get_u16());
        if count != description.len() {
            return Err(ProtocolError::ColumnCountMismatch {
                expected: description.len(),
                actual: count,
            });
        }
        Ok(Self {
            description,
            body,
            column: DataColumn::BEFORE_FIRST,
            visited: 0,
        })
    }

    /// Row description the row is decoded against.
    #[must_use]
    pub fn description(&self) -> &'a RowDescription {
        self.description
    }

    /// Number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.description.len()
    }

    /// Check if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.description.is_empty()
    }

    /// Unread bytes left in the row.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.body.remaining()
    }

    /// Decode state of the current column.
    #[must_use]
    pub fn column(&self) -> &DataColumn {
        &self.column
    }

    /// Description of the current column, if positioned on one.
    #[must_use]
    pub fn column_description(&self) -> Option<&'a ColumnDescription> {
        if self.visited == 0 {
            return None;
        }
        self.description.column(self.column.ordinal)
    }

    /// Name of the current column; empty before the first advance.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.column_description().map_or("", ColumnDescription::name)
    }

    /// Check if the current value is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.column.is_null()
    }

    /// Advance to the next column.
    ///
    /// Unread bytes of the current column are discarded first. Returns
    /// `false` once every column has been visited.
    pub fn move_next(&mut self) -> Result<bool, ProtocolError> {
        self.skip();

        let Some(description) = self.description.column(self.visited) else {
            if self.body.has_remaining() {
                return Err(ProtocolError::TrailingRowData(self.body.remaining()));
            }
            return Ok(false);
        };

        if self.body.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let length = self.body.get_i32();
        if length < -1 || length as i64 > self.body.remaining() as i64 {
            return Err(ProtocolError::InvalidColumnLength {
                length,
                remaining: self.body.remaining(),
            });
        }

        self.column = DataColumn {
            ordinal: self.visited,
            type_oid: description.type_oid(),
            length,
            remaining: length.max(0) as usize,
            array_length: -1,
            element_oid: Oid::UNSPECIFIED,
            consumed: length < 0,
        };
        self.visited += 1;

        if length >= 0 && self.column.is_array() {
            self.read_array_header()?;
        }

        tracing::trace!(
            ordinal = self.column.ordinal,
            oid = %self.column.type_oid,
            length,
            "advanced to column"
        );
        Ok(true)
    }

    fn read_array_header(&mut self) -> Result<(), ProtocolError> {
        let mut view = &self.body[..self.column.remaining];
        let header = ArrayHeader::decode(&mut view)?;
        let consumed = self.column.remaining - view.len();
        self.body.advance(consumed);
        self.column.remaining -= consumed;
        self.column.element_oid = header.element_oid;
        if header.is_supported() {
            self.column.array_length = header.length;
        }
        Ok(())
    }

    /// Read the current value as `T`.
    ///
    /// Returns `None` for SQL NULL. If `T` cannot represent the declared
    /// type, the value is discarded and `None` is returned.
    pub fn get<T: PgProtocol>(&mut self) -> Option<T> {
        if self.column.consumed {
            return None;
        }
        if !T::can_convert_element(self.column.type_oid) {
            self.skip();
            return None;
        }
        let len = self.column.remaining;
        self.column.remaining = 0;
        self.column.consumed = true;
        T::decode_element(self.column.type_oid, len, &mut self.body)
    }

    /// Iterate over the elements of the current array value.
    ///
    /// Returns `None` for SQL NULL, for arrays of more than one dimension,
    /// and when `T` cannot represent the element type; the value is
    /// discarded in those cases. The iterator is forward-only and reads
    /// straight from the row; elements it does not reach are discarded on
    /// the next advance.
    pub fn get_array<T: PgProtocol>(&mut self) -> Option<ArrayElements<'_, T>> {
        if self.column.consumed
            || self.column.array_length < 0
            || !T::can_convert_array(self.column.type_oid)
            || !T::can_convert_element(self.column.element_oid)
        {
            self.skip();
            return None;
        }
        self.column.consumed = true;
        let left = self.column.array_length as usize;
        Some(ArrayElements {
            element_oid: self.column.element_oid,
            column: &mut self.column,
            body: &mut self.body,
            left,
            _marker: PhantomData,
        })
    }

    /// Read up to `max` raw bytes of the current value.
    ///
    /// Returns an empty buffer once the value is exhausted. For array
    /// columns the header has already been consumed.
    pub fn read_partial(&mut self, max: usize) -> Bytes {
        let n = max.min(self.column.remaining);
        self.column.remaining -= n;
        if self.column.remaining == 0 {
            self.column.consumed = true;
        }
        self.body.split_to(n)
    }

    /// Discard the rest of the current value.
    pub fn skip(&mut self) {
        if self.column.remaining > 0 {
            self.body.advance(self.column.remaining);
            self.column.remaining = 0;
        }
        self.column.consumed = true;
    }

    /// Read the current value dynamically through the type registry.
    ///
    /// SQL NULL reads as [`PgValue::Null`]. Unregistered types and scalar
    /// values that do not decode are discarded and yield `Ok(None)`. Array
    /// elements that do not decode, such as a NaN numeric, read as
    /// [`PgValue::Null`]. A malformed element length is a protocol error.
    pub fn value(&mut self) -> Result<Option<PgValue>, ProtocolError> {
        if self.column.is_null() {
            return Ok(Some(PgValue::Null));
        }
        if self.column.consumed {
            return Ok(None);
        }
        if !self.column.is_array() {
            let raw = self.read_partial(self.column.remaining);
            return Ok(registry::decode_value(self.column.type_oid, &raw));
        }

        let Some(descriptor) = registry::lookup_array(self.column.type_oid)
            .filter(|d| d.element == self.column.element_oid && self.column.array_length >= 0)
        else {
            self.skip();
            return Ok(None);
        };
        let count = self.column.array_length as usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            if self.column.remaining < 4 {
                self.skip();
                return Err(ProtocolError::UnexpectedEof);
            }
            let len = self.body.get_i32();
            self.column.remaining -= 4;
            if len == -1 {
                items.push(PgValue::Null);
                continue;
            }
            if len < 0 || len as usize > self.column.remaining {
                let remaining = self.column.remaining;
                self.skip();
                return Err(ProtocolError::InvalidColumnLength {
                    length: len,
                    remaining,
                });
            }
            let raw = self.read_partial(len as usize);
            items.push(descriptor.decode(&raw).unwrap_or(PgValue::Null));
        }
        self.skip();
        Ok(Some(PgValue::Array {
            element: descriptor.element,
            items,
        }))
    }
}

/// Lazy iterator over the elements of an array column.
///
/// Each item is `Ok(Some(_))` for a value and `Ok(None)` for a NULL
/// element or one with no representation in `T` (a NaN numeric, an
/// infinite timestamp). An element whose length does not fit the column is
/// an error, after which the iterator is exhausted.
#[derive(Debug)]
pub struct ArrayElements<'r, T> {
    column: &'r mut DataColumn,
    body: &'r mut Bytes,
    element_oid: Oid,
    left: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ArrayElements<'_, T> {
    fn fail(&mut self, err: ProtocolError) -> Option<Result<Option<T>, ProtocolError>> {
        self.left = 0;
        self.body.advance(self.column.remaining);
        self.column.remaining = 0;
        Some(Err(err))
    }
}

impl<T: PgProtocol> Iterator for ArrayElements<'_, T> {
    type Item = Result<Option<T>, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.left == 0 {
            return None;
        }
        self.left -= 1;

        if self.column.remaining < 4 {
            return self.fail(ProtocolError::UnexpectedEof);
        }
        let len = self.body.get_i32();
        self.column.remaining -= 4;
        if len == -1 {
            return Some(Ok(None));
        }
        if len < 0 || len as usize > self.column.remaining {
            let remaining = self.column.remaining;
            return self.fail(ProtocolError::InvalidColumnLength {
                length: len,
                remaining,
            });
        }

        let len = len as usize;
        self.column.remaining -= len;
        // a well-framed element that does not decode (NaN, infinity) reads as no value
        Some(Ok(T::decode_element(self.element_oid, len, self.body)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.left, Some(self.left))
    }
}

impl<T: PgProtocol> ExactSizeIterator for ArrayElements<'_, T> {}
