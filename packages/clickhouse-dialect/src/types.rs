//! # ClickHouse Type Registry
//!
//! The `ClickHouseType` sum type models every column type the dialect knows
//! about. Its `Display` implementation is the one place DDL text for a type is
//! produced; the compilers never concatenate type strings by hand.

use std::fmt;

use crate::errors::ArgumentError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ClickHouseInt {
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Int256,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    UInt256,
}

impl ClickHouseInt {
    pub const ALL: [ClickHouseInt; 12] = [
        ClickHouseInt::Int8,
        ClickHouseInt::Int16,
        ClickHouseInt::Int32,
        ClickHouseInt::Int64,
        ClickHouseInt::Int128,
        ClickHouseInt::Int256,
        ClickHouseInt::UInt8,
        ClickHouseInt::UInt16,
        ClickHouseInt::UInt32,
        ClickHouseInt::UInt64,
        ClickHouseInt::UInt128,
        ClickHouseInt::UInt256,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ClickHouseInt::Int8 => "Int8",
            ClickHouseInt::Int16 => "Int16",
            ClickHouseInt::Int32 => "Int32",
            ClickHouseInt::Int64 => "Int64",
            ClickHouseInt::Int128 => "Int128",
            ClickHouseInt::Int256 => "Int256",
            ClickHouseInt::UInt8 => "UInt8",
            ClickHouseInt::UInt16 => "UInt16",
            ClickHouseInt::UInt32 => "UInt32",
            ClickHouseInt::UInt64 => "UInt64",
            ClickHouseInt::UInt128 => "UInt128",
            ClickHouseInt::UInt256 => "UInt256",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|int| int.name() == name)
    }

    pub fn bits(&self) -> u16 {
        match self {
            ClickHouseInt::Int8 | ClickHouseInt::UInt8 => 8,
            ClickHouseInt::Int16 | ClickHouseInt::UInt16 => 16,
            ClickHouseInt::Int32 | ClickHouseInt::UInt32 => 32,
            ClickHouseInt::Int64 | ClickHouseInt::UInt64 => 64,
            ClickHouseInt::Int128 | ClickHouseInt::UInt128 => 128,
            ClickHouseInt::Int256 | ClickHouseInt::UInt256 => 256,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ClickHouseInt::Int8
                | ClickHouseInt::Int16
                | ClickHouseInt::Int32
                | ClickHouseInt::Int64
                | ClickHouseInt::Int128
                | ClickHouseInt::Int256
        )
    }
}

impl fmt::Display for ClickHouseInt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ClickHouseFloat {
    Float32,
    Float64,
}

impl fmt::Display for ClickHouseFloat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClickHouseFloat::Float32 => f.write_str("Float32"),
            ClickHouseFloat::Float64 => f.write_str("Float64"),
        }
    }
}

/// Storage width of an enum type.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EnumBits {
    Enum8,
    Enum16,
}

impl EnumBits {
    fn range(&self) -> (i32, i32) {
        match self {
            EnumBits::Enum8 => (i8::MIN as i32, i8::MAX as i32),
            EnumBits::Enum16 => (i16::MIN as i32, i16::MAX as i32),
        }
    }
}

impl fmt::Display for EnumBits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EnumBits::Enum8 => f.write_str("Enum8"),
            EnumBits::Enum16 => f.write_str("Enum16"),
        }
    }
}

/// Represents an element in a Tuple type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TupleElement {
    /// Named element (name Type)
    Named { name: String, element_type: ClickHouseType },
    /// Unnamed element (just Type)
    Unnamed(ClickHouseType),
}

impl TupleElement {
    pub fn element_type(&self) -> &ClickHouseType {
        match self {
            TupleElement::Named { element_type, .. } => element_type,
            TupleElement::Unnamed(element_type) => element_type,
        }
    }
}

impl fmt::Display for TupleElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TupleElement::Named { name, element_type } => write!(f, "{name} {element_type}"),
            TupleElement::Unnamed(element_type) => write!(f, "{element_type}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickHouseType {
    Int(ClickHouseInt),
    Float(ClickHouseFloat),
    Decimal {
        precision: u8,
        scale: u8,
    },
    Boolean,
    Date,
    Date32,
    DateTime {
        timezone: Option<String>,
    },
    DateTime64 {
        precision: u8,
        timezone: Option<String>,
    },
    String,
    FixedString(u64),
    Uuid,
    IPv4,
    IPv6,
    Enum {
        bits: EnumBits,
        members: Vec<(String, i16)>,
    },
    Array(Box<ClickHouseType>),
    Nullable(Box<ClickHouseType>),
    LowCardinality(Box<ClickHouseType>),
    Tuple(Vec<TupleElement>),
    Map {
        key_type: Box<ClickHouseType>,
        value_type: Box<ClickHouseType>,
    },
    Nested(Vec<(String, ClickHouseType)>),
    AggregateFunction {
        function_name: String,
        argument_types: Vec<ClickHouseType>,
    },
    SimpleAggregateFunction {
        function_name: String,
        argument_types: Vec<ClickHouseType>,
    },
    /// Placeholder for a type string the parser did not recognise.
    NullType {
        original: String,
    },
}

impl ClickHouseType {
    /// The family name the parser keys on.
    pub fn family_name(&self) -> &'static str {
        match self {
            ClickHouseType::Int(int) => int.name(),
            ClickHouseType::Float(ClickHouseFloat::Float32) => "Float32",
            ClickHouseType::Float(ClickHouseFloat::Float64) => "Float64",
            ClickHouseType::Decimal { .. } => "Decimal",
            ClickHouseType::Boolean => "Bool",
            ClickHouseType::Date => "Date",
            ClickHouseType::Date32 => "Date32",
            ClickHouseType::DateTime { .. } => "DateTime",
            ClickHouseType::DateTime64 { .. } => "DateTime64",
            ClickHouseType::String => "String",
            ClickHouseType::FixedString(_) => "FixedString",
            ClickHouseType::Uuid => "UUID",
            ClickHouseType::IPv4 => "IPv4",
            ClickHouseType::IPv6 => "IPv6",
            ClickHouseType::Enum {
                bits: EnumBits::Enum8,
                ..
            } => "Enum8",
            ClickHouseType::Enum {
                bits: EnumBits::Enum16,
                ..
            } => "Enum16",
            ClickHouseType::Array(_) => "Array",
            ClickHouseType::Nullable(_) => "Nullable",
            ClickHouseType::LowCardinality(_) => "LowCardinality",
            ClickHouseType::Tuple(_) => "Tuple",
            ClickHouseType::Map { .. } => "Map",
            ClickHouseType::Nested(_) => "Nested",
            ClickHouseType::AggregateFunction { .. } => "AggregateFunction",
            ClickHouseType::SimpleAggregateFunction { .. } => "SimpleAggregateFunction",
            ClickHouseType::NullType { .. } => "Nothing",
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ClickHouseType::Nullable(_))
    }

    pub fn array(inner: ClickHouseType) -> Self {
        ClickHouseType::Array(Box::new(inner))
    }

    /// Wraps `inner` in `Nullable`. Nullable never nests Nullable or LowCardinality.
    pub fn nullable(inner: ClickHouseType) -> Result<Self, ArgumentError> {
        match inner {
            ClickHouseType::Nullable(_) | ClickHouseType::LowCardinality(_) => {
                Err(ArgumentError::InvalidType {
                    type_name: format!("Nullable({inner})"),
                    message: "Nullable cannot wrap Nullable or LowCardinality".to_string(),
                })
            }
            ClickHouseType::Array(_) | ClickHouseType::Map { .. } | ClickHouseType::Nested(_) => {
                Err(ArgumentError::InvalidType {
                    type_name: format!("Nullable({inner})"),
                    message: "composite types cannot be inside Nullable".to_string(),
                })
            }
            inner => Ok(ClickHouseType::Nullable(Box::new(inner))),
        }
    }

    /// Wraps `inner` in `LowCardinality`. Only string-like, integer and date
    /// types (optionally Nullable) are accepted.
    pub fn low_cardinality(inner: ClickHouseType) -> Result<Self, ArgumentError> {
        if inner.supports_low_cardinality() {
            Ok(ClickHouseType::LowCardinality(Box::new(inner)))
        } else {
            Err(ArgumentError::InvalidType {
                type_name: format!("LowCardinality({inner})"),
                message: "LowCardinality requires a string-like or small integer type"
                    .to_string(),
            })
        }
    }

    fn supports_low_cardinality(&self) -> bool {
        match self {
            ClickHouseType::String
            | ClickHouseType::FixedString(_)
            | ClickHouseType::Date
            | ClickHouseType::Date32
            | ClickHouseType::DateTime { .. } => true,
            ClickHouseType::Int(int) => int.bits() <= 64,
            ClickHouseType::Nullable(inner) => inner.supports_low_cardinality(),
            _ => false,
        }
    }

    pub fn map(key_type: ClickHouseType, value_type: ClickHouseType) -> Self {
        ClickHouseType::Map {
            key_type: Box::new(key_type),
            value_type: Box::new(value_type),
        }
    }

    /// Builds an enum type, checking that every code fits the storage width.
    pub fn enumeration<S: Into<String>>(
        bits: EnumBits,
        members: impl IntoIterator<Item = (S, i16)>,
    ) -> Result<Self, ArgumentError> {
        let (min, max) = bits.range();
        let members = members
            .into_iter()
            .map(|(label, code)| (label.into(), code))
            .collect::<Vec<_>>();
        if let Some((label, code)) = members
            .iter()
            .find(|(_, code)| (*code as i32) < min || (*code as i32) > max)
        {
            return Err(ArgumentError::InvalidType {
                type_name: bits.to_string(),
                message: format!("code {code} of label '{label}' is out of range"),
            });
        }
        Ok(ClickHouseType::Enum { bits, members })
    }

    /// The type of a Nested sub-column when addressed as `parent.field`.
    pub fn nested_field(&self, field: &str) -> Option<ClickHouseType> {
        match self {
            ClickHouseType::Nested(fields) => fields
                .iter()
                .find(|(name, _)| name == field)
                .map(|(_, field_type)| ClickHouseType::array(field_type.clone())),
            _ => None,
        }
    }
}

/// Escapes an enum label or timezone for use inside single quotes.
pub(crate) fn escape_quoted(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for ClickHouseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClickHouseType::Int(int) => write!(f, "{int}"),
            ClickHouseType::Float(float) => write!(f, "{float}"),
            ClickHouseType::Decimal { precision, scale } => {
                write!(f, "Decimal({precision}, {scale})")
            }
            // Older servers have no Bool type.
            ClickHouseType::Boolean => write!(f, "UInt8"),
            ClickHouseType::Date => write!(f, "Date"),
            ClickHouseType::Date32 => write!(f, "Date32"),
            ClickHouseType::DateTime { timezone } => match timezone {
                Some(tz) => write!(f, "DateTime('{}')", escape_quoted(tz)),
                None => write!(f, "DateTime"),
            },
            ClickHouseType::DateTime64 {
                precision,
                timezone,
            } => match timezone {
                Some(tz) => write!(f, "DateTime64({precision}, '{}')", escape_quoted(tz)),
                None => write!(f, "DateTime64({precision})"),
            },
            ClickHouseType::String => write!(f, "String"),
            ClickHouseType::FixedString(length) => write!(f, "FixedString({length})"),
            ClickHouseType::Uuid => write!(f, "UUID"),
            ClickHouseType::IPv4 => write!(f, "IPv4"),
            ClickHouseType::IPv6 => write!(f, "IPv6"),
            ClickHouseType::Enum { bits, members } => {
                write!(f, "{bits}(")?;
                for (i, (label, code)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}' = {code}", escape_quoted(label))?;
                }
                write!(f, ")")
            }
            ClickHouseType::Array(inner) => write!(f, "Array({inner})"),
            ClickHouseType::Nullable(inner) => write!(f, "Nullable({inner})"),
            ClickHouseType::LowCardinality(inner) => write!(f, "LowCardinality({inner})"),
            ClickHouseType::Tuple(elements) => {
                write!(f, "Tuple(")?;
                write_list(f, elements)?;
                write!(f, ")")
            }
            ClickHouseType::Map {
                key_type,
                value_type,
            } => write!(f, "Map({key_type}, {value_type})"),
            ClickHouseType::Nested(fields) => {
                write!(f, "Nested(")?;
                for (i, (name, field_type)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} {field_type}")?;
                }
                write!(f, ")")
            }
            ClickHouseType::AggregateFunction {
                function_name,
                argument_types,
            } => {
                write!(f, "AggregateFunction({function_name}")?;
                for arg_type in argument_types {
                    write!(f, ", {arg_type}")?;
                }
                write!(f, ")")
            }
            ClickHouseType::SimpleAggregateFunction {
                function_name,
                argument_types,
            } => {
                write!(f, "SimpleAggregateFunction({function_name}")?;
                for arg_type in argument_types {
                    write!(f, ", {arg_type}")?;
                }
                write!(f, ")")
            }
            ClickHouseType::NullType { .. } => write!(f, "Nothing"),
        }
    }
}
