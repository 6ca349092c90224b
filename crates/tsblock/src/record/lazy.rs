//! Buffer-backed records that decode fields on first access.

use std::cell::OnceCell;
use std::sync::Arc;

use bytes::Bytes;

use crate::codec::varint::read_varint;
use crate::error::{BlockError, Result};
use crate::field::Field;
use crate::record::{read_frame, FieldAccess, DELTA_FLAG};
use crate::schema::{RecordLayout, Schema};

/// A record read from an encoded block without decoding its fields up front.
///
/// Construction validates the frame and locates every present field, so a
/// `LazyRecord` that exists has well-formed bounds. Field values are decoded
/// and cached the first time [`FieldAccess::field`] asks for them.
#[derive(Debug, Clone)]
pub struct LazyRecord {
    record_type: u8,
    delta: bool,
    layout: Arc<RecordLayout>,
    presence: u64,
    body: Bytes,
    offsets: Vec<Option<usize>>,
    cache: Vec<OnceCell<Field>>,
}

impl LazyRecord {
    /// Splits one record off the front of `buf` and indexes its fields.
    ///
    /// The returned record shares `buf`'s storage.
    pub fn read_from(schema: &Schema, buf: &mut Bytes) -> Result<Self> {
        let (tag, body) = read_frame(buf)?;
        let record_type = tag & !DELTA_FLAG;
        let layout = schema.wire_layout(record_type).ok_or_else(|| {
            BlockError::malformed(format!("unknown record type {record_type}"))
        })?;
        Self::index(record_type, tag & DELTA_FLAG != 0, Arc::clone(layout), body)
    }

    fn index(
        record_type: u8,
        delta: bool,
        layout: Arc<RecordLayout>,
        body: Bytes,
    ) -> Result<Self> {
        let field_count = layout.field_count();
        let mut cursor: &[u8] = &body;
        let presence = read_varint(&mut cursor)?;
        if field_count < 64 && presence >> field_count != 0 {
            return Err(BlockError::malformed(format!(
                "presence bitset {presence:#x} exceeds the {field_count} fields of record type {record_type}"
            )));
        }

        let mut offsets = Vec::with_capacity(field_count);
        for (i, def) in layout.fields().iter().enumerate() {
            if presence & (1 << i) == 0 {
                offsets.push(None);
                continue;
            }
            offsets.push(Some(body.len() - cursor.len()));
            Field::skip(def.ty, &mut cursor)?;
        }
        if !cursor.is_empty() {
            return Err(BlockError::malformed(format!(
                "{} trailing bytes in record of type {record_type}",
                cursor.len()
            )));
        }

        Ok(Self {
            record_type,
            delta,
            layout,
            presence,
            body,
            offsets,
            cache: (0..field_count).map(|_| OnceCell::new()).collect(),
        })
    }

    /// Layout the record was decoded with.
    pub fn layout(&self) -> &Arc<RecordLayout> {
        &self.layout
    }

    /// Bitset of the fields present on the wire.
    pub fn presence_bitset(&self) -> u64 {
        self.presence
    }

    /// Returns true if field `index` was written (is non-zero).
    pub fn is_present(&self, index: usize) -> bool {
        self.offsets.get(index).is_some_and(Option::is_some)
    }

    /// Number of fields decoded so far.
    pub fn decoded_count(&self) -> usize {
        self.cache.iter().filter(|cell| cell.get().is_some()).count()
    }
}

impl FieldAccess for LazyRecord {
    fn record_type(&self) -> u8 {
        self.record_type
    }

    fn is_delta(&self) -> bool {
        self.delta
    }

    fn field_count(&self) -> usize {
        self.cache.len()
    }

    fn field(&self, index: usize) -> Result<&Field> {
        let cell = self.cache.get(index).ok_or_else(|| {
            BlockError::precondition(format!(
                "field index {index} out of range ({} fields)",
                self.cache.len()
            ))
        })?;
        if let Some(field) = cell.get() {
            return Ok(field);
        }

        let def = &self.layout.fields()[index];
        let field = match self.offsets[index] {
            Some(offset) => Field::read_from(def.ty, &mut &self.body[offset..])?,
            None => Field::zero(def.ty),
        };
        Ok(cell.get_or_init(|| field))
    }
}
