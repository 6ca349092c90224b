//! Records: ordered rows of fields tagged with a record type.
//!
//! Two representations share the [`FieldAccess`] trait:
//!
//! - [`Record`]: heap-resident and mutable, used while building blocks
//! - [`LazyRecord`]: a view over encoded bytes that decodes each field the first
//!   time it is read, used while scanning blocks
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────────┬────────────────┬──────────────────┬─────────────────────────┐
//! │ tag (u8)     │ length (varint)│ presence (varint)│ field bytes             │
//! │ type | delta │ bytes after it │ bit i = field i  │ set fields, index order │
//! └──────────────┴────────────────┴──────────────────┴─────────────────────────┘
//! ```
//!
//! The tag holds the record type in its low seven bits and the delta flag in
//! bit 7. A field's presence bit is set exactly when the field is non-zero;
//! absent fields decode to their type's zero value.

pub mod lazy;

use std::fmt;

use bytes::{Buf, BufMut, Bytes};

use crate::codec::varint::{read_varint, varint_len, write_varint};
use crate::error::{BlockError, Result};
use crate::field::Field;
use crate::schema::{RecordLayout, Schema, MAX_FIELDS_PER_RECORD};

pub use lazy::LazyRecord;

/// Bit of the tag byte marking a delta record.
pub const DELTA_FLAG: u8 = 0x80;

/// Largest record type tag that fits beside the delta flag.
pub const MAX_RECORD_TYPE: u8 = !DELTA_FLAG;

/// Read access shared by eager and lazy records.
pub trait FieldAccess {
    /// Record type tag.
    fn record_type(&self) -> u8;

    /// True if field values are differences from the previous record of the
    /// same type rather than absolute values.
    fn is_delta(&self) -> bool;

    /// Number of fields.
    fn field_count(&self) -> usize;

    /// Field at `index`.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::Precondition` if `index` is out of bounds and
    /// `BlockError::MalformedInput` if a lazily decoded field is corrupt.
    fn field(&self, index: usize) -> Result<&Field>;

    /// The timestamp in field 0, in nanoseconds since the epoch.
    fn timestamp_nanos(&self) -> Result<i64> {
        self.field(0)?.timestamp_nanos()
    }

    /// Materializes every field into an eager [`Record`].
    fn to_record(&self) -> Result<Record> {
        let fields = (0..self.field_count())
            .map(|i| self.field(i).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Record {
            record_type: self.record_type(),
            delta: self.is_delta(),
            fields,
        })
    }
}

/// An eager, mutable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    record_type: u8,
    delta: bool,
    fields: Vec<Field>,
}

impl Record {
    /// Creates an absolute record of `record_type` with every field zero.
    pub fn new(record_type: u8, layout: &RecordLayout) -> Self {
        Self {
            record_type,
            delta: false,
            fields: layout.zero_fields(),
        }
    }

    /// Creates an absolute record from explicit field values.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::Precondition` if the type tag collides with the
    /// delta flag, there are no fields or too many, or field 0 is not a
    /// timestamp.
    pub fn from_fields(record_type: u8, fields: Vec<Field>) -> Result<Self> {
        if record_type > MAX_RECORD_TYPE {
            return Err(BlockError::precondition(format!(
                "record type {record_type} exceeds {MAX_RECORD_TYPE}"
            )));
        }
        match fields.first() {
            Some(first) if first.field_type().is_timestamp() => {}
            _ => {
                return Err(BlockError::precondition(
                    "field 0 of a record must be a timestamp",
                ))
            }
        }
        if fields.len() > MAX_FIELDS_PER_RECORD {
            return Err(BlockError::precondition(format!(
                "record has {} fields, at most {MAX_FIELDS_PER_RECORD} are supported",
                fields.len()
            )));
        }
        Ok(Self {
            record_type,
            delta: false,
            fields,
        })
    }

    /// Marks the record as holding deltas (`true`) or absolute values.
    pub fn set_delta(&mut self, delta: bool) {
        self.delta = delta;
    }

    /// Returns the record with its delta flag set to `delta`.
    pub fn with_delta(mut self, delta: bool) -> Self {
        self.delta = delta;
        self
    }

    /// All fields in index order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field at `index`, if it exists.
    pub fn get(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Mutable field at `index`, if it exists. The field's type cannot change
    /// through the returned reference without breaking the record's layout, so
    /// prefer [`Record::set`] for replacing values.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Field> {
        self.fields.get_mut(index)
    }

    /// Replaces field `index` with `value`, which must keep the field's type.
    pub fn set(&mut self, index: usize, value: Field) -> Result<()> {
        let count = self.fields.len();
        let slot = self.fields.get_mut(index).ok_or_else(|| {
            BlockError::precondition(format!("field index {index} out of range ({count} fields)"))
        })?;
        value.copy_to(slot)
    }

    /// The timestamp field.
    pub fn timestamp(&self) -> &Field {
        &self.fields[0]
    }

    /// Sets the raw timestamp value, in the layout's unit.
    pub fn set_timestamp(&mut self, raw: i64) -> Result<()> {
        self.fields[0].set_i64(raw)
    }

    /// Returns true if the record's fields have exactly the layout's types.
    pub fn matches_layout(&self, layout: &RecordLayout) -> bool {
        self.fields.len() == layout.field_count()
            && self
                .fields
                .iter()
                .zip(layout.fields())
                .all(|(field, def)| field.field_type() == def.ty)
    }

    fn ensure_compatible(&self, other: &Record) -> Result<()> {
        if self.record_type != other.record_type {
            return Err(BlockError::precondition(format!(
                "record type mismatch: {} vs {}",
                self.record_type, other.record_type
            )));
        }
        if self.fields.len() != other.fields.len() {
            return Err(BlockError::precondition(format!(
                "field count mismatch: {} vs {}",
                self.fields.len(),
                other.fields.len()
            )));
        }
        if let Some(index) = self
            .fields
            .iter()
            .zip(&other.fields)
            .position(|(a, b)| a.field_type() != b.field_type())
        {
            return Err(BlockError::precondition(format!(
                "field {index} type mismatch: {} vs {}",
                self.fields[index].field_type(),
                other.fields[index].field_type()
            )));
        }
        Ok(())
    }

    /// Adds `other` field by field. The delta flag of `self` is kept.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::Precondition`, leaving `self` untouched, if the
    /// records differ in type, field count or any field's type.
    pub fn add(&mut self, other: &Record) -> Result<()> {
        self.ensure_compatible(other)?;
        for (field, operand) in self.fields.iter_mut().zip(&other.fields) {
            field.add(operand)?;
        }
        Ok(())
    }

    /// Subtracts `other` field by field. The delta flag of `self` is kept.
    ///
    /// # Errors
    ///
    /// See [`Record::add`].
    pub fn subtract(&mut self, other: &Record) -> Result<()> {
        self.ensure_compatible(other)?;
        for (field, operand) in self.fields.iter_mut().zip(&other.fields) {
            field.subtract(operand)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Binary codec
    // ------------------------------------------------------------------

    /// Bitset of the fields written on the wire (the non-zero ones).
    pub fn presence_bitset(&self) -> u64 {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, field)| !field.is_zero())
            .fold(0u64, |bits, (i, _)| bits | (1 << i))
    }

    /// Size of everything after the length prefix: bitset plus field bytes.
    pub fn body_size(&self) -> usize {
        let fields: usize = self
            .fields
            .iter()
            .filter(|field| !field.is_zero())
            .map(Field::serialized_size)
            .sum();
        varint_len(self.presence_bitset()) + fields
    }

    /// Exact number of bytes [`Record::write_to`] emits.
    pub fn serialized_size(&self) -> usize {
        let body = self.body_size();
        1 + varint_len(body as u64) + body
    }

    fn tag(&self) -> u8 {
        if self.delta {
            self.record_type | DELTA_FLAG
        } else {
            self.record_type
        }
    }

    /// Writes the record and returns the number of bytes written.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) -> usize {
        buf.put_u8(self.tag());
        let mut written = 1 + write_varint(self.body_size() as u64, buf);
        written += write_varint(self.presence_bitset(), buf);
        for field in self.fields.iter().filter(|field| !field.is_zero()) {
            written += field.write_to(buf);
        }
        written
    }

    /// Reads one record from the front of `buf`, using `schema` for its layout.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::MalformedInput` for an unknown record type, a
    /// length prefix beyond the buffer, a presence bit past the layout's
    /// fields, or corrupt field bytes.
    pub fn read_from(schema: &Schema, buf: &mut Bytes) -> Result<Self> {
        LazyRecord::read_from(schema, buf)?.to_record()
    }
}

impl FieldAccess for Record {
    fn record_type(&self) -> u8 {
        self.record_type
    }

    fn is_delta(&self) -> bool {
        self.delta
    }

    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn field(&self, index: usize) -> Result<&Field> {
        self.fields.get(index).ok_or_else(|| {
            BlockError::precondition(format!(
                "field index {index} out of range ({} fields)",
                self.fields.len()
            ))
        })
    }

    fn to_record(&self) -> Result<Record> {
        Ok(self.clone())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.record_type)?;
        if self.delta {
            f.write_str("Δ")?;
        }
        f.write_str("[")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}")?;
        }
        f.write_str("]")
    }
}

/// Splits one record frame off the front of `buf`.
///
/// Returns the tag byte and the frame body (bitset plus field bytes).
pub(crate) fn read_frame(buf: &mut Bytes) -> Result<(u8, Bytes)> {
    if !buf.has_remaining() {
        return Err(BlockError::malformed("missing record tag"));
    }
    let tag = buf.get_u8();
    let length = read_varint(buf)?;
    let length = usize::try_from(length)
        .ok()
        .filter(|&len| len <= buf.remaining())
        .ok_or_else(|| {
            BlockError::malformed(format!(
                "record length {length} exceeds the {} remaining bytes",
                buf.remaining()
            ))
        })?;
    Ok((tag, buf.split_to(length)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Decimal, FieldType, TimeUnit};
    use crate::schema::{FieldDef, FixedPartitioner, PartitionDuration};

    fn schema() -> Schema {
        let layout = RecordLayout::new(
            "tick",
            vec![
                FieldDef::new("time", FieldType::Timestamp(TimeUnit::Milliseconds)),
                FieldDef::new("state", FieldType::Byte),
                FieldDef::new("volume", FieldType::Long),
                FieldDef::new("price", FieldType::Decimal),
            ],
        )
        .unwrap();
        Schema::new(vec![layout], FixedPartitioner::from(PartitionDuration::Daily)).unwrap()
    }

    fn tick(ts: i64, state: i32, volume: i64, price: Decimal) -> Record {
        Record::from_fields(
            0,
            vec![
                Field::timestamp(TimeUnit::Milliseconds, ts),
                Field::Byte(state),
                Field::Long(volume),
                Field::Decimal(price),
            ],
        )
        .unwrap()
    }

    fn encode(record: &Record) -> Bytes {
        let mut buf = Vec::new();
        let written = record.write_to(&mut buf);
        assert_eq!(written, buf.len());
        assert_eq!(record.serialized_size(), buf.len());
        Bytes::from(buf)
    }

    #[test]
    fn test_record_roundtrip() {
        let schema = schema();
        let record = tick(1_700_000_000_000, 10, 5_000, Decimal::new(12345, -2));
        let mut bytes = encode(&record);

        let decoded = Record::read_from(&schema, &mut bytes).unwrap();
        assert_eq!(decoded, record);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_delta_flag_roundtrip() {
        let schema = schema();
        let record = tick(100, -5, 0, Decimal::new(-1, -1)).with_delta(true);
        let mut bytes = encode(&record);
        assert_eq!(bytes[0], DELTA_FLAG);

        let decoded = Record::read_from(&schema, &mut bytes).unwrap();
        assert!(decoded.is_delta());
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_zero_fields_are_omitted() {
        let record = tick(0, 0, 0, Decimal::ZERO);
        assert_eq!(record.presence_bitset(), 0);
        // tag + length + empty bitset
        assert_eq!(record.serialized_size(), 3);

        let record = tick(0, 0, 7, Decimal::ZERO);
        assert_eq!(record.presence_bitset(), 0b0100);
        assert_eq!(record.body_size(), 1 + Field::Long(7).serialized_size());
    }

    #[test]
    fn test_add_and_subtract_records() {
        let r1 = tick(1_000, 10, 100, Decimal::new(125, -1));
        let r2 = tick(1_350, 5, 250, Decimal::new(115, -1));

        let mut delta = r2.clone();
        delta.subtract(&r1).unwrap();
        delta.set_delta(true);
        assert_eq!(delta.get(0).unwrap().as_i64().unwrap(), 350);
        assert_eq!(delta.get(1).unwrap().as_i32().unwrap(), -5);
        assert_eq!(delta.get(3), Some(&Field::Decimal(Decimal::new(-10, -1))));

        let mut rebuilt = r1.clone();
        rebuilt.add(&delta).unwrap();
        assert!(!rebuilt.is_delta());
        assert_eq!(rebuilt, r2);
    }

    #[test]
    fn test_arithmetic_rejects_mismatched_layouts() {
        let mut a = tick(0, 1, 1, Decimal::ZERO);
        let other_type = Record::from_fields(1, a.fields().to_vec()).unwrap();
        assert!(matches!(a.add(&other_type), Err(BlockError::Precondition(_))));

        let short = Record::from_fields(0, vec![Field::timestamp(TimeUnit::Milliseconds, 1)])
            .unwrap();
        assert!(matches!(a.subtract(&short), Err(BlockError::Precondition(_))));

        let mut retyped = a.fields().to_vec();
        retyped[2] = Field::Integer(1);
        let retyped = Record::from_fields(0, retyped).unwrap();
        assert!(matches!(a.add(&retyped), Err(BlockError::Precondition(_))));

        // Failed operations leave the record untouched.
        assert_eq!(a, tick(0, 1, 1, Decimal::ZERO));
    }

    #[test]
    fn test_set_keeps_field_types() {
        let schema = schema();
        let mut record = Record::new(0, schema.layout(0).unwrap());
        record.set(1, Field::Byte(3)).unwrap();
        record.set_timestamp(42).unwrap();
        assert_eq!(record.timestamp_nanos().unwrap(), 42_000_000);

        assert!(matches!(
            record.set(1, Field::Long(3)),
            Err(BlockError::TypeConversion { .. })
        ));
        assert!(matches!(
            record.set(9, Field::Byte(3)),
            Err(BlockError::Precondition(_))
        ));
        assert!(record.matches_layout(schema.layout(0).unwrap()));
    }

    #[test]
    fn test_from_fields_validation() {
        assert!(Record::from_fields(0, vec![Field::Long(1)]).is_err());
        assert!(Record::from_fields(0, vec![]).is_err());
        assert!(Record::from_fields(
            DELTA_FLAG,
            vec![Field::timestamp(TimeUnit::Seconds, 0)]
        )
        .is_err());
    }

    #[test]
    fn test_read_rejects_unknown_type() {
        let schema = schema();
        let record = Record::from_fields(3, vec![Field::timestamp(TimeUnit::Milliseconds, 1)])
            .unwrap();
        let mut bytes = encode(&record);
        assert!(matches!(
            Record::read_from(&schema, &mut bytes),
            Err(BlockError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_read_rejects_truncated_input() {
        let schema = schema();
        let bytes = encode(&tick(1, 2, 3, Decimal::new(4, 0)));
        for cut in 0..bytes.len() {
            let mut truncated = bytes.slice(..cut);
            assert!(
                Record::read_from(&schema, &mut truncated).is_err(),
                "cut at {cut} should fail"
            );
        }
    }

    #[test]
    fn test_read_rejects_bitset_past_layout() {
        let schema = schema();
        let mut buf = Vec::new();
        buf.put_u8(0);
        buf.put_u8(2);
        write_varint(1 << 5, &mut buf);
        buf.put_u8(0);
        let mut bytes = Bytes::from(buf);
        assert!(matches!(
            Record::read_from(&schema, &mut bytes),
            Err(BlockError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_display() {
        let record = tick(5, 1, 0, Decimal::new(15, -1)).with_delta(true);
        assert_eq!(record.to_string(), "#0Δ[5ms, 1, 0, 1.5]");
    }
}
