//! Runtime values: scalars and [`Instance`]s shaped like their composite type.
//!
//! Struct instances keep one [`Value`] per field. Union instances keep their overlay
//! bytes (native byte order), so writing one member and reading another returns the
//! reinterpretation of the same storage.

use crate::ast::{CompositeKind, CompositeType, FieldType};
use crate::codec::{self, CodecError};
use crate::primitive::BaseType;
use crate::validate::{self, RangeError};
use std::sync::Arc;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i128),
    Float(f64),
    Composite(Instance),
}

impl Value {
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_int().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_int().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Instance> {
        match self {
            Value::Composite(i) => Some(i),
            _ => None,
        }
    }

    fn kind_name(&self) -> String {
        match self {
            Value::Int(_) => "integer".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Composite(i) => i.type_name().to_string(),
        }
    }
}

macro_rules! int_value_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i128)
            }
        })*
    };
}

int_value_from!(u8, u16, u32, u64, i8, i16, i32, i64, i128, usize);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Value::Composite(v)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InstanceError {
    #[error("{composite}: no field named {field}")]
    UnknownField { composite: String, field: String },
    #[error("{composite}.{field}: expected {expected}, got {found}")]
    TypeMismatch {
        composite: String,
        field: String,
        expected: String,
        found: String,
    },
    #[error("{composite}: expected {expected} values, got {actual}")]
    Arity {
        composite: String,
        expected: usize,
        actual: usize,
    },
    #[error("{composite}: field {field} given more than once")]
    DuplicateValue { composite: String, field: String },
    #[error("{composite}: missing value for field {field}")]
    MissingField { composite: String, field: String },
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Storage {
    Fields(Vec<Value>),
    Overlay(Vec<u8>),
}

/// A value of a composite type. Always holds exactly the fields of its type.
#[derive(Debug, Clone)]
pub struct Instance {
    ty: Arc<CompositeType>,
    storage: Storage,
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.ty, &other.ty) && self.storage == other.storage
    }
}

impl Instance {
    /// Zero-initialised instance (every scalar 0, nested composites zeroed).
    pub fn new(ty: &Arc<CompositeType>) -> Self {
        let storage = match ty.kind() {
            CompositeKind::Struct => Storage::Fields(
                ty.fields()
                    .iter()
                    .map(|f| match &f.ty {
                        FieldType::Base(b) if b.is_integer() => Value::Int(0),
                        FieldType::Base(_) => Value::Float(0.0),
                        FieldType::Composite(c) => Value::Composite(Instance::new(c)),
                    })
                    .collect(),
            ),
            CompositeKind::Union => Storage::Overlay(vec![0u8; ty.size()]),
        };
        Instance {
            ty: Arc::clone(ty),
            storage,
        }
    }

    /// Build from values given in declaration order; exactly one per field.
    pub fn from_positional<I, V>(ty: &Arc<CompositeType>, values: I) -> Result<Self, InstanceError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.len() != ty.fields().len() {
            return Err(InstanceError::Arity {
                composite: ty.name().to_string(),
                expected: ty.fields().len(),
                actual: values.len(),
            });
        }
        let mut inst = Instance::new(ty);
        for (i, v) in values.into_iter().enumerate() {
            inst.set_index(i, v)?;
        }
        Ok(inst)
    }

    /// Build from `(name, value)` pairs.
    ///
    /// Structs need every field exactly once. Unions accept any subset of members,
    /// written in the given order, so a later member overlays an earlier one.
    pub fn from_named<I, K, V>(ty: &Arc<CompositeType>, values: I) -> Result<Self, InstanceError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut inst = Instance::new(ty);
        let mut seen = vec![false; ty.fields().len()];
        for (name, v) in values {
            let i = inst.index_of(name.as_ref())?;
            if seen[i] && ty.kind() == CompositeKind::Struct {
                return Err(InstanceError::DuplicateValue {
                    composite: ty.name().to_string(),
                    field: ty.fields()[i].name.clone(),
                });
            }
            seen[i] = true;
            inst.set_index(i, v.into())?;
        }
        if ty.kind() == CompositeKind::Struct {
            if let Some(i) = seen.iter().position(|s| !s) {
                return Err(InstanceError::MissingField {
                    composite: ty.name().to_string(),
                    field: ty.fields()[i].name.clone(),
                });
            }
        }
        Ok(inst)
    }

    pub fn type_def(&self) -> &Arc<CompositeType> {
        &self.ty
    }

    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    /// Serialized length in bytes.
    pub fn size(&self) -> usize {
        self.ty.size()
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    pub(crate) fn from_storage(ty: &Arc<CompositeType>, storage: Storage) -> Self {
        Instance {
            ty: Arc::clone(ty),
            storage,
        }
    }

    pub(crate) fn replace_storage(&mut self, storage: Storage) {
        self.storage = storage;
    }

    fn index_of(&self, name: &str) -> Result<usize, InstanceError> {
        self.ty
            .field_index(name)
            .ok_or_else(|| InstanceError::UnknownField {
                composite: self.ty.name().to_string(),
                field: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Result<Value, InstanceError> {
        let i = self.index_of(name)?;
        self.get_index(i)
    }

    fn get_index(&self, index: usize) -> Result<Value, InstanceError> {
        match &self.storage {
            Storage::Fields(values) => Ok(values[index].clone()),
            Storage::Overlay(bytes) => Ok(codec::read_field(&self.ty, index, bytes)?),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i128, InstanceError> {
        let v = self.get(name)?;
        v.as_int().ok_or_else(|| self.mismatch(name, "integer", &v))
    }

    pub fn get_float(&self, name: &str) -> Result<f64, InstanceError> {
        let v = self.get(name)?;
        v.as_f64().ok_or_else(|| self.mismatch(name, "float", &v))
    }

    pub fn get_composite(&self, name: &str) -> Result<Instance, InstanceError> {
        match self.get(name)? {
            Value::Composite(i) => Ok(i),
            other => Err(self.mismatch(name, "composite", &other)),
        }
    }

    /// Assign a field after type and range checks. On error the instance is unchanged.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), InstanceError> {
        let i = self.index_of(name)?;
        self.set_index(i, value.into())
    }

    /// Assign through a dotted path such as `header.flags`.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<(), InstanceError> {
        match path.split_once('.') {
            None => self.set(path, value),
            Some((head, rest)) => {
                let mut nested = self.get_composite(head)?;
                nested.set_path(rest, value)?;
                self.set(head, nested)
            }
        }
    }

    /// Read through a dotted path such as `header.flags`.
    pub fn get_path(&self, path: &str) -> Result<Value, InstanceError> {
        match path.split_once('.') {
            None => self.get(path),
            Some((head, rest)) => self.get_composite(head)?.get_path(rest),
        }
    }

    fn set_index(&mut self, index: usize, value: Value) -> Result<(), InstanceError> {
        let value = self.coerce(index, value)?;
        match &mut self.storage {
            Storage::Fields(values) => values[index] = value,
            Storage::Overlay(bytes) => codec::write_field(&self.ty, index, &value, bytes),
        }
        Ok(())
    }

    /// Type-check and range-check a candidate value for field `index`.
    fn coerce(&self, index: usize, value: Value) -> Result<Value, InstanceError> {
        let field = &self.ty.fields()[index];
        let composite = self.ty.name();
        match (&field.ty, value) {
            (FieldType::Base(b), Value::Int(v)) if b.is_integer() => {
                Ok(Value::Int(validate::check_int(composite, field, v)?))
            }
            (FieldType::Base(b), Value::Int(v)) if !b.is_integer() => {
                let v = validate::check_float(composite, field, v as f64)?;
                Ok(Value::Float(round_to_storage(*b, v)))
            }
            (FieldType::Base(b), Value::Float(v)) if !b.is_integer() => {
                let v = validate::check_float(composite, field, v)?;
                Ok(Value::Float(round_to_storage(*b, v)))
            }
            (FieldType::Composite(c), Value::Composite(inst)) if Arc::ptr_eq(c, &inst.ty) => {
                Ok(Value::Composite(inst))
            }
            (ty, other) => Err(InstanceError::TypeMismatch {
                composite: composite.to_string(),
                field: field.name.clone(),
                expected: match ty {
                    FieldType::Base(b) if b.is_integer() => format!("integer ({})", b),
                    FieldType::Base(b) => b.to_string(),
                    FieldType::Composite(c) => c.name().to_string(),
                },
                found: other.kind_name(),
            }),
        }
    }

    fn mismatch(&self, name: &str, expected: &str, found: &Value) -> InstanceError {
        InstanceError::TypeMismatch {
            composite: self.ty.name().to_string(),
            field: name.to_string(),
            expected: expected.to_string(),
            found: found.kind_name(),
        }
    }

    /// Serialize to exactly [`size`](Self::size) bytes.
    pub fn pack(&self) -> Vec<u8> {
        codec::pack(self)
    }

    /// Replace every field from `bytes`. Nothing is modified if any value fails validation.
    pub fn parse(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        codec::parse(self, bytes)
    }
}


/// An `f32` field holds exactly what its four bytes can represent.
fn round_to_storage(base: BaseType, v: f64) -> f64 {
    match base {
        BaseType::F32 => v as f32 as f64,
        _ => v,
    }
}
