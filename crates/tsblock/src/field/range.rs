//! Inclusive value ranges over fields, used to prune blocks by column bounds.

use std::cmp::Ordering;

use crate::error::{BlockError, Result};
use crate::field::{Field, FieldType};

/// An inclusive `[lower, upper]` range of field values of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRange {
    lower: Field,
    upper: Field,
}

impl FieldRange {
    /// Creates a range from two bounds of the same type.
    ///
    /// # Errors
    ///
    /// Returns `BlockError::TypeConversion` if the bounds differ in type and
    /// `BlockError::Precondition` if `lower > upper`.
    pub fn new(lower: Field, upper: Field) -> Result<Self> {
        if lower.compare(&upper)? == Ordering::Greater {
            return Err(BlockError::precondition(format!(
                "range lower bound {lower} exceeds upper bound {upper}"
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Returns the range spanning every value of `ty`, bounded by its sentinels.
    pub fn entire_domain(ty: FieldType) -> Self {
        Self {
            lower: Field::min_value(ty),
            upper: Field::max_value(ty),
        }
    }

    /// Returns the lower bound.
    pub fn lower(&self) -> &Field {
        &self.lower
    }

    /// Returns the upper bound.
    pub fn upper(&self) -> &Field {
        &self.upper
    }

    /// Returns the type of the bounds.
    pub fn field_type(&self) -> FieldType {
        self.lower.field_type()
    }

    /// Returns true if both bounds are the type's sentinels.
    pub fn is_entire_domain(&self) -> bool {
        let ty = self.field_type();
        self.lower == Field::min_value(ty) && self.upper == Field::max_value(ty)
    }

    /// Returns true if `value` lies within the range.
    pub fn contains(&self, value: &Field) -> Result<bool> {
        Ok(self.lower.compare(value)? != Ordering::Greater
            && self.upper.compare(value)? != Ordering::Less)
    }

    /// Returns true if the two ranges share at least one value.
    pub fn overlaps(&self, other: &FieldRange) -> Result<bool> {
        Ok(self.lower.compare(&other.upper)? != Ordering::Greater
            && other.lower.compare(&self.upper)? != Ordering::Greater)
    }

    /// Returns the common part of two ranges, or `None` if they are disjoint.
    pub fn intersect(&self, other: &FieldRange) -> Result<Option<FieldRange>> {
        if !self.overlaps(other)? {
            return Ok(None);
        }
        let lower = match self.lower.compare(&other.lower)? {
            Ordering::Less => other.lower.clone(),
            _ => self.lower.clone(),
        };
        let upper = match self.upper.compare(&other.upper)? {
            Ordering::Greater => other.upper.clone(),
            _ => self.upper.clone(),
        };
        Ok(Some(FieldRange { lower, upper }))
    }
}
