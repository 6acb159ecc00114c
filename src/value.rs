// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application-facing value model and the wire codec.
//!
//! The stack hands the adapter pointer-rich wire values ([`UaVariant`]);
//! the application sees owned, typed values ([`OpcUaValue`]). The
//! [`ValueCodec`] translates between the two per this table:
//!
//! | Wire type                        | Public representation            |
//! |----------------------------------|----------------------------------|
//! | Boolean, integer widths, floats  | native Rust scalar               |
//! | DateTime                         | `chrono::DateTime<Utc>`          |
//! | String, ByteString, XmlElement   | owned `String` / `Vec<u8>`       |
//! | Guid                             | `uuid::Uuid` (canonical 36-char) |
//! | LocalizedText                    | (locale, text) pair              |
//! | QualifiedName                    | (namespaceIndex, name) pair      |
//! | NodeId                           | structured [`NodeId`]            |
//!
//! Both scalar and array forms are supported; arrays decode element-wise.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AdapterResult, ConversionError};
use crate::transport::{UaDateTime, UaGuid, UaScalar, UaVariant};
use crate::types::NodeId;

// =============================================================================
// LocalizedText / QualifiedName
// =============================================================================

/// A localized text value: locale id plus text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalizedText {
    /// Locale id, e.g. `en-US`. Possibly empty.
    pub locale: String,
    /// The text.
    pub text: String,
}

impl LocalizedText {
    /// Creates a localized text value.
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.locale.is_empty() {
            write!(f, "{}", self.text)
        } else {
            write!(f, "[{}] {}", self.locale, self.text)
        }
    }
}

/// A qualified name: namespace index plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,
    /// The name.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace_index, self.name)
    }
}

// =============================================================================
// OpcUaValue
// =============================================================================

/// The adapter's public value representation.
///
/// A tagged union over the decoding table; arrays wrap their elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum OpcUaValue {
    /// Boolean value.
    Boolean(bool),
    /// Signed 8-bit integer.
    SByte(i8),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit double.
    Double(f64),
    /// Date/time value.
    DateTime(DateTime<Utc>),
    /// UTF-8 string.
    String(String),
    /// Opaque byte string.
    ByteString(Vec<u8>),
    /// XML element text.
    XmlElement(String),
    /// GUID; renders in the canonical 36-char form.
    Guid(Uuid),
    /// Localized text pair.
    LocalizedText(LocalizedText),
    /// Qualified name pair.
    QualifiedName(QualifiedName),
    /// Structured node id.
    NodeId(NodeId),
    /// Array of values.
    Array(Vec<OpcUaValue>),
    /// Null value.
    Null,
}

impl OpcUaValue {
    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if this is an array value.
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Returns the array length (0 for scalars).
    pub fn array_length(&self) -> usize {
        match self {
            Self::Array(items) => items.len(),
            _ => 0,
        }
    }

    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::SByte(v) => Some(f64::from(*v)),
            Self::Byte(v) => Some(f64::from(*v)),
            Self::Int16(v) => Some(f64::from(*v)),
            Self::UInt16(v) => Some(f64::from(*v)),
            Self::Int32(v) => Some(f64::from(*v)),
            Self::UInt32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::XmlElement(v) => Some(v),
            Self::LocalizedText(lt) => Some(&lt.text),
            _ => None,
        }
    }

    /// Returns the value type name, used in diagnostics.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::DateTime(_) => "DateTime",
            Self::String(_) => "String",
            Self::ByteString(_) => "ByteString",
            Self::XmlElement(_) => "XmlElement",
            Self::Guid(_) => "Guid",
            Self::LocalizedText(_) => "LocalizedText",
            Self::QualifiedName(_) => "QualifiedName",
            Self::NodeId(_) => "NodeId",
            Self::Array(_) => "Array",
            Self::Null => "Null",
        }
    }
}

impl Default for OpcUaValue {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Display for OpcUaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::String(v) => write!(f, "{}", v),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::XmlElement(v) => write!(f, "{}", v),
            Self::Guid(v) => write!(f, "{}", v),
            Self::LocalizedText(v) => write!(f, "{}", v),
            Self::QualifiedName(v) => write!(f, "{}", v),
            Self::NodeId(v) => write!(f, "{}", v),
            Self::Array(v) => write!(f, "[{} items]", v.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// ValueCodec
// =============================================================================

/// Translates between stack wire variants and the public value model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueCodec;

impl ValueCodec {
    /// Creates a codec.
    pub fn new() -> Self {
        Self
    }

    /// Decodes a wire variant into the public value model.
    ///
    /// Arrays decode element-wise; an undecodable element fails the whole
    /// variant.
    pub fn decode(&self, variant: &UaVariant) -> AdapterResult<OpcUaValue> {
        match variant {
            UaVariant::Scalar(scalar) => self.decode_scalar(scalar),
            UaVariant::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.decode_scalar(item)?);
                }
                Ok(OpcUaValue::Array(values))
            }
        }
    }

    /// Decodes one wire scalar.
    pub fn decode_scalar(&self, scalar: &UaScalar) -> AdapterResult<OpcUaValue> {
        let value = match scalar {
            UaScalar::Boolean(v) => OpcUaValue::Boolean(*v),
            UaScalar::SByte(v) => OpcUaValue::SByte(*v),
            UaScalar::Byte(v) => OpcUaValue::Byte(*v),
            UaScalar::Int16(v) => OpcUaValue::Int16(*v),
            UaScalar::UInt16(v) => OpcUaValue::UInt16(*v),
            UaScalar::Int32(v) => OpcUaValue::Int32(*v),
            UaScalar::UInt32(v) => OpcUaValue::UInt32(*v),
            UaScalar::Int64(v) => OpcUaValue::Int64(*v),
            UaScalar::UInt64(v) => OpcUaValue::UInt64(*v),
            UaScalar::Float(v) => OpcUaValue::Float(*v),
            UaScalar::Double(v) => OpcUaValue::Double(*v),
            UaScalar::DateTime(ticks) => {
                let dt = ticks.to_datetime().ok_or_else(|| {
                    ConversionError::malformed("DateTime", "tick count outside representable range")
                })?;
                OpcUaValue::DateTime(dt)
            }
            UaScalar::String(bytes) => {
                OpcUaValue::String(String::from_utf8_lossy(bytes).into_owned())
            }
            UaScalar::ByteString(bytes) => OpcUaValue::ByteString(bytes.clone()),
            UaScalar::XmlElement(bytes) => {
                OpcUaValue::XmlElement(String::from_utf8_lossy(bytes).into_owned())
            }
            UaScalar::Guid(guid) => OpcUaValue::Guid(guid.to_uuid()),
            UaScalar::LocalizedText { locale, text } => OpcUaValue::LocalizedText(LocalizedText {
                locale: String::from_utf8_lossy(locale).into_owned(),
                text: String::from_utf8_lossy(text).into_owned(),
            }),
            UaScalar::QualifiedName {
                namespace_index,
                name,
            } => OpcUaValue::QualifiedName(QualifiedName {
                namespace_index: *namespace_index,
                name: String::from_utf8_lossy(name).into_owned(),
            }),
            UaScalar::NodeId(node_id) => OpcUaValue::NodeId(node_id.clone()),
        };
        Ok(value)
    }

    /// Encodes a public value for the wire, used by write and method-call.
    pub fn encode(&self, value: &OpcUaValue) -> AdapterResult<UaVariant> {
        match value {
            OpcUaValue::Array(items) => {
                let mut scalars = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_array() {
                        return Err(ConversionError::encode(
                            "Array",
                            "nested arrays are not representable on the wire",
                        )
                        .into());
                    }
                    scalars.push(self.encode_scalar(item)?);
                }
                Ok(UaVariant::Array(scalars))
            }
            other => Ok(UaVariant::Scalar(self.encode_scalar(other)?)),
        }
    }

    fn encode_scalar(&self, value: &OpcUaValue) -> AdapterResult<UaScalar> {
        let scalar = match value {
            OpcUaValue::Boolean(v) => UaScalar::Boolean(*v),
            OpcUaValue::SByte(v) => UaScalar::SByte(*v),
            OpcUaValue::Byte(v) => UaScalar::Byte(*v),
            OpcUaValue::Int16(v) => UaScalar::Int16(*v),
            OpcUaValue::UInt16(v) => UaScalar::UInt16(*v),
            OpcUaValue::Int32(v) => UaScalar::Int32(*v),
            OpcUaValue::UInt32(v) => UaScalar::UInt32(*v),
            OpcUaValue::Int64(v) => UaScalar::Int64(*v),
            OpcUaValue::UInt64(v) => UaScalar::UInt64(*v),
            OpcUaValue::Float(v) => UaScalar::Float(*v),
            OpcUaValue::Double(v) => UaScalar::Double(*v),
            OpcUaValue::DateTime(dt) => UaScalar::DateTime(UaDateTime::from_unix_parts(
                dt.timestamp(),
                i64::from(dt.timestamp_subsec_micros()),
            )),
            OpcUaValue::String(v) => UaScalar::String(v.clone().into_bytes()),
            OpcUaValue::ByteString(v) => UaScalar::ByteString(v.clone()),
            OpcUaValue::XmlElement(v) => UaScalar::XmlElement(v.clone().into_bytes()),
            OpcUaValue::Guid(uuid) => UaScalar::Guid(UaGuid::from_uuid(uuid)),
            OpcUaValue::LocalizedText(lt) => UaScalar::LocalizedText {
                locale: lt.locale.clone().into_bytes(),
                text: lt.text.clone().into_bytes(),
            },
            OpcUaValue::QualifiedName(qn) => UaScalar::QualifiedName {
                namespace_index: qn.namespace_index,
                name: qn.name.clone().into_bytes(),
            },
            OpcUaValue::NodeId(node_id) => UaScalar::NodeId(node_id.clone()),
            OpcUaValue::Null => {
                return Err(ConversionError::encode("Null", "null carries no wire type").into())
            }
            OpcUaValue::Array(_) => {
                return Err(ConversionError::encode(
                    "Array",
                    "nested arrays are not representable on the wire",
                )
                .into())
            }
        };
        Ok(scalar)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn codec() -> ValueCodec {
        ValueCodec::new()
    }

    #[test]
    fn test_decode_numeric_scalars() {
        let cases = vec![
            (UaScalar::Boolean(true), OpcUaValue::Boolean(true)),
            (UaScalar::SByte(-5), OpcUaValue::SByte(-5)),
            (UaScalar::Byte(200), OpcUaValue::Byte(200)),
            (UaScalar::Int16(-1000), OpcUaValue::Int16(-1000)),
            (UaScalar::UInt16(40000), OpcUaValue::UInt16(40000)),
            (UaScalar::Int32(-70000), OpcUaValue::Int32(-70000)),
            (UaScalar::UInt32(3_000_000_000), OpcUaValue::UInt32(3_000_000_000)),
            (UaScalar::Int64(-1), OpcUaValue::Int64(-1)),
            (UaScalar::UInt64(u64::MAX), OpcUaValue::UInt64(u64::MAX)),
            (UaScalar::Float(1.5), OpcUaValue::Float(1.5)),
            (UaScalar::Double(-2.25), OpcUaValue::Double(-2.25)),
        ];
        for (wire, expected) in cases {
            let decoded = codec().decode(&UaVariant::Scalar(wire)).unwrap();
            assert_eq!(decoded, expected);
        }
    }

    #[test]
    fn test_decode_text_scalars() {
        let decoded = codec()
            .decode(&UaVariant::Scalar(UaScalar::String(b"hello".to_vec())))
            .unwrap();
        assert_eq!(decoded, OpcUaValue::String("hello".to_string()));

        let decoded = codec()
            .decode(&UaVariant::Scalar(UaScalar::LocalizedText {
                locale: b"en-US".to_vec(),
                text: b"Temperature".to_vec(),
            }))
            .unwrap();
        assert_eq!(
            decoded,
            OpcUaValue::LocalizedText(LocalizedText::new("en-US", "Temperature"))
        );

        let decoded = codec()
            .decode(&UaVariant::Scalar(UaScalar::QualifiedName {
                namespace_index: 3,
                name: b"Pump".to_vec(),
            }))
            .unwrap();
        assert_eq!(
            decoded,
            OpcUaValue::QualifiedName(QualifiedName::new(3, "Pump"))
        );
    }

    #[test]
    fn test_decode_guid_canonical_form() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let wire = UaScalar::Guid(UaGuid::from_uuid(&uuid));
        let decoded = codec().decode(&UaVariant::Scalar(wire)).unwrap();

        match decoded {
            OpcUaValue::Guid(g) => {
                let text = g.to_string();
                assert_eq!(text.len(), 36);
                assert_eq!(text, "550e8400-e29b-41d4-a716-446655440000");
            }
            other => panic!("expected Guid, got {:?}", other),
        }
    }

    #[test]
    fn test_guid_encode_preserves_bytes() {
        let uuid = Uuid::new_v4();
        let value = OpcUaValue::Guid(uuid);

        let encoded = codec().encode(&value).unwrap();
        let decoded = codec().decode(&encoded).unwrap();
        assert_eq!(decoded, value);

        match encoded {
            UaVariant::Scalar(UaScalar::Guid(g)) => assert_eq!(g.to_uuid(), uuid),
            other => panic!("expected Guid scalar, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_array() {
        let wire = UaVariant::Array(vec![
            UaScalar::Int32(1),
            UaScalar::Int32(2),
            UaScalar::Int32(3),
        ]);
        let decoded = codec().decode(&wire).unwrap();
        assert!(decoded.is_array());
        assert_eq!(decoded.array_length(), 3);
        assert_eq!(
            decoded,
            OpcUaValue::Array(vec![
                OpcUaValue::Int32(1),
                OpcUaValue::Int32(2),
                OpcUaValue::Int32(3),
            ])
        );
    }

    #[test]
    fn test_decode_string_array() {
        let wire = UaVariant::Array(vec![
            UaScalar::String(b"a".to_vec()),
            UaScalar::String(b"bc".to_vec()),
        ]);
        let decoded = codec().decode(&wire).unwrap();
        assert_eq!(
            decoded,
            OpcUaValue::Array(vec![
                OpcUaValue::String("a".to_string()),
                OpcUaValue::String("bc".to_string()),
            ])
        );
    }

    #[test]
    fn test_encode_round_trip_scalars() {
        let values = vec![
            OpcUaValue::Boolean(false),
            OpcUaValue::SByte(-1),
            OpcUaValue::Byte(7),
            OpcUaValue::Int16(-32768),
            OpcUaValue::UInt16(65535),
            OpcUaValue::Int32(42),
            OpcUaValue::UInt32(7),
            OpcUaValue::Int64(i64::MIN),
            OpcUaValue::UInt64(9),
            OpcUaValue::Float(0.5),
            OpcUaValue::Double(9.75),
            OpcUaValue::String("sensor".to_string()),
            OpcUaValue::ByteString(vec![0, 1, 2]),
            OpcUaValue::NodeId(NodeId::numeric(2, 1001)),
        ];
        for value in values {
            let encoded = codec().encode(&value).unwrap();
            let decoded = codec().decode(&encoded).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_datetime_round_trip() {
        let dt = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();
        let value = OpcUaValue::DateTime(dt);
        let encoded = codec().encode(&value).unwrap();
        let decoded = codec().decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_encode_rejects_null_and_nested_arrays() {
        assert!(codec().encode(&OpcUaValue::Null).is_err());

        let nested = OpcUaValue::Array(vec![OpcUaValue::Array(vec![OpcUaValue::Int32(1)])]);
        assert!(codec().encode(&nested).is_err());
    }
}
