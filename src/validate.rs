//! Range validation for scalar field values.
//!
//! Whole integer fields accept the numeric range of their primitive; bitfields accept
//! `0..=2^bit_width - 1` whatever the signedness of the storage type. Floating-point
//! fields accept any value the target width can hold (NaN and infinities included).

use crate::ast::{Field, FieldType};
use crate::primitive::BaseType;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RangeError {
    #[error("{composite}.{field}: value {value} outside valid range [{min},{max}]")]
    Int {
        composite: String,
        field: String,
        value: i128,
        min: i128,
        max: i128,
    },
    #[error("{composite}.{field}: value {value} cannot be represented as {base}")]
    Float {
        composite: String,
        field: String,
        value: f64,
        base: BaseType,
    },
}

/// Inclusive integer domain of a field, or `None` for floating-point and composite fields.
pub fn int_domain(field: &Field) -> Option<(i128, i128)> {
    let base = match &field.ty {
        FieldType::Base(b) => *b,
        FieldType::Composite(_) => return None,
    };
    match field.bit_width {
        Some(w) if w >= 128 => Some((0, i128::MAX)),
        Some(w) => Some((0, (1i128 << w) - 1)),
        None => base.int_range(),
    }
}

pub fn check_int(composite: &str, field: &Field, value: i128) -> Result<i128, RangeError> {
    if let Some((min, max)) = int_domain(field) {
        if value < min || value > max {
            return Err(RangeError::Int {
                composite: composite.to_string(),
                field: field.name.clone(),
                value,
                min,
                max,
            });
        }
    }
    Ok(value)
}

pub fn check_float(composite: &str, field: &Field, value: f64) -> Result<f64, RangeError> {
    if let FieldType::Base(BaseType::F32) = field.ty {
        if value.is_finite() && value.abs() > f32::MAX as f64 {
            return Err(RangeError::Float {
                composite: composite.to_string(),
                field: field.name.clone(),
                value,
                base: BaseType::F32,
            });
        }
    }
    Ok(value)
}

/// Check a decoded or assigned scalar. Nested instances are validated when they are built.
pub fn check(composite: &str, field: &Field, value: &Value) -> Result<(), RangeError> {
    match value {
        Value::Int(v) => check_int(composite, field, *v).map(|_| ()),
        Value::Float(v) => check_float(composite, field, *v).map(|_| ()),
        Value::Composite(_) => Ok(()),
    }
}
