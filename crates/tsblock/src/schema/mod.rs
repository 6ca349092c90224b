//! Record layouts and partitioning supplied by the table catalog.
//!
//! The catalog itself lives outside this crate; a [`Schema`] is the subset of
//! it that block encoding needs:
//!
//! - one [`RecordLayout`] per record type, indexed by the record's type tag
//! - the timestamp unit shared by every layout's field 0
//! - a [`Partitioner`] answering which partition a timestamp belongs to

pub mod partition;

use std::sync::Arc;

use crate::block::header::{header_layout, HEADER_FIXED_FIELDS, HEADER_RECORD_TYPE};
use crate::error::{BlockError, Result};
use crate::field::{Field, FieldType, TimeUnit};

pub use partition::{
    CalendarDayPartitioner, FixedPartitioner, PartitionDuration, Partitioner, TimeRange,
};

/// Maximum number of fields in one record; the presence bitset is a `u64`.
pub const MAX_FIELDS_PER_RECORD: usize = 64;

/// Maximum number of record types in a schema.
///
/// The block header stores one count per record type after its fixed fields,
/// and must itself fit in [`MAX_FIELDS_PER_RECORD`].
pub const MAX_RECORD_TYPES: usize = MAX_FIELDS_PER_RECORD - HEADER_FIXED_FIELDS;

/// A named, typed column of a record layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Column name.
    pub name: String,
    /// Column type.
    pub ty: FieldType,
}

impl FieldDef {
    /// Creates a new field definition.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// The ordered columns of one record type. Field 0 is always the timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    name: String,
    fields: Vec<FieldDef>,
}

impl RecordLayout {
    /// Creates a layout.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::InvalidSchema` if the layout has no fields, more
    /// than [`MAX_FIELDS_PER_RECORD`] fields, or a non-timestamp field 0.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Result<Self> {
        let name = name.into();
        match fields.first() {
            Some(first) if first.ty.is_timestamp() => {}
            Some(first) => {
                return Err(BlockError::InvalidSchema(format!(
                    "record type {name}: field 0 must be a timestamp, found {}",
                    first.ty
                )))
            }
            None => {
                return Err(BlockError::InvalidSchema(format!(
                    "record type {name} has no fields"
                )))
            }
        }
        if fields.len() > MAX_FIELDS_PER_RECORD {
            return Err(BlockError::InvalidSchema(format!(
                "record type {name} has {} fields, at most {MAX_FIELDS_PER_RECORD} are supported",
                fields.len()
            )));
        }
        Ok(Self { name, fields })
    }

    /// Creates a layout the caller has already checked.
    pub(crate) fn from_checked_parts(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Record type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Field definitions in index order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Type of field `index`, if it exists.
    pub fn field_type(&self, index: usize) -> Option<FieldType> {
        self.fields.get(index).map(|def| def.ty)
    }

    /// Index of the field called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|def| def.name == name)
    }

    /// Unit of the timestamp in field 0.
    pub fn timestamp_unit(&self) -> TimeUnit {
        match self.fields[0].ty {
            FieldType::Timestamp(unit) => unit,
            // Guarded by `RecordLayout::new`.
            _ => TimeUnit::default(),
        }
    }

    /// Zero values for every field.
    pub fn zero_fields(&self) -> Vec<Field> {
        self.fields.iter().map(|def| Field::zero(def.ty)).collect()
    }
}

/// Record layouts, timestamp unit and partitioning for one table.
#[derive(Debug, Clone)]
pub struct Schema {
    record_types: Vec<Arc<RecordLayout>>,
    header_layout: Arc<RecordLayout>,
    timestamp_unit: TimeUnit,
    partitioner: Arc<dyn Partitioner>,
}

impl Schema {
    /// Creates a schema.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::InvalidSchema` if there are no record types, more
    /// than [`MAX_RECORD_TYPES`], or the layouts disagree on the timestamp unit.
    pub fn new(
        record_types: Vec<RecordLayout>,
        partitioner: impl Partitioner + 'static,
    ) -> Result<Self> {
        Self::with_partitioner(record_types, Arc::new(partitioner))
    }

    /// Creates a schema sharing an existing partitioner.
    pub fn with_partitioner(
        record_types: Vec<RecordLayout>,
        partitioner: Arc<dyn Partitioner>,
    ) -> Result<Self> {
        let first = record_types
            .first()
            .ok_or_else(|| BlockError::InvalidSchema("schema has no record types".into()))?;
        if record_types.len() > MAX_RECORD_TYPES {
            return Err(BlockError::InvalidSchema(format!(
                "schema has {} record types, at most {MAX_RECORD_TYPES} are supported",
                record_types.len()
            )));
        }

        let timestamp_unit = first.timestamp_unit();
        if let Some(other) = record_types
            .iter()
            .find(|layout| layout.timestamp_unit() != timestamp_unit)
        {
            return Err(BlockError::InvalidSchema(format!(
                "record type {} uses timestamp unit {}, expected {timestamp_unit}",
                other.name(),
                other.timestamp_unit()
            )));
        }

        let header_layout = Arc::new(header_layout(timestamp_unit, record_types.len()));
        Ok(Self {
            record_types: record_types.into_iter().map(Arc::new).collect(),
            header_layout,
            timestamp_unit,
            partitioner,
        })
    }

    /// Number of record types.
    pub fn record_type_count(&self) -> usize {
        self.record_types.len()
    }

    /// Layout of `record_type`, if the schema defines it.
    pub fn layout(&self, record_type: u8) -> Option<&Arc<RecordLayout>> {
        self.record_types.get(record_type as usize)
    }

    /// Layout of `record_type`, or the header layout for the header tag.
    pub(crate) fn wire_layout(&self, record_type: u8) -> Option<&Arc<RecordLayout>> {
        if record_type == HEADER_RECORD_TYPE {
            Some(&self.header_layout)
        } else {
            self.layout(record_type)
        }
    }

    /// Type tag of the record type called `name`.
    pub fn record_type_index(&self, name: &str) -> Option<u8> {
        self.record_types
            .iter()
            .position(|layout| layout.name() == name)
            .map(|index| index as u8)
    }

    /// Layout of block header records.
    pub fn header_layout(&self) -> &Arc<RecordLayout> {
        &self.header_layout
    }

    /// Unit of every record's timestamp field.
    pub fn timestamp_unit(&self) -> TimeUnit {
        self.timestamp_unit
    }

    /// Returns the partition range containing `timestamp_nanos`.
    pub fn partition_range_containing(&self, timestamp_nanos: i64) -> TimeRange {
        self.partitioner.partition_range_containing(timestamp_nanos)
    }
}
