//! Custom attribute value blobs (ECMA-335 II.23.3)

use serde::Serialize;

use super::error::{MetadataError, Result};
use super::model::TypeHandle;
use super::reader::ByteReader;
use super::signature::{element, Primitive, SigType};

const PROLOG: u16 = 0x0001;
const NULL_STRING: u8 = 0xFF;
const NULL_ARRAY: u32 = 0xFFFF_FFFF;
/// Deepest nesting of boxed values and arrays accepted in one value
const MAX_VALUE_DEPTH: usize = 32;

/// A decoded attribute argument value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Char(char),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// `None` for a serialized null string
    String(Option<String>),
    /// Serialized `System.Type` name
    Type(Option<String>),
    Array(Option<Vec<AttributeValue>>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(Some(value)) => Some(value),
            _ => None,
        }
    }
}

impl From<&AttributeValue> for serde_json::Value {
    fn from(value: &AttributeValue) -> Self {
        use serde_json::Value;
        match value {
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Char(c) => Value::String(c.to_string()),
            AttributeValue::Int(i) => Value::from(*i),
            AttributeValue::UInt(u) => Value::from(*u),
            AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AttributeValue::String(s) | AttributeValue::Type(s) => {
                s.clone().map(Value::String).unwrap_or(Value::Null)
            }
            AttributeValue::Array(items) => items
                .as_ref()
                .map(|items| Value::Array(items.iter().map(Value::from).collect()))
                .unwrap_or(Value::Null),
        }
    }
}

/// A positional constructor argument
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeArgument {
    /// Constructor parameter name, when the constructor could be resolved
    pub name: Option<String>,
    pub value: AttributeValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedArgumentKind {
    Field,
    Property,
}

/// A named field or property assignment
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArgument {
    pub kind: NamedArgumentKind,
    pub name: String,
    pub value: AttributeValue,
}

/// All argument values of one attribute instance
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedAttribute {
    pub arguments: Vec<AttributeArgument>,
    pub named: Vec<NamedArgument>,
}

/// Answers the questions blob decoding cannot answer from the blob alone
///
/// Handles are interpreted in the module that declares the attribute.
pub trait EnumResolver {
    /// Underlying primitive of the enum a signature handle refers to
    fn underlying_of(&self, handle: TypeHandle) -> Option<Primitive>;

    /// Underlying primitive of an enum named in a blob (possibly
    /// assembly-qualified)
    fn underlying_of_named(&self, name: &str) -> Option<Primitive>;

    /// Whether a class handle names `System.Type`
    fn is_system_type(&self, handle: TypeHandle) -> bool;
}

/// Shape of a value to decode, after resolving enums
#[derive(Debug, Clone, PartialEq)]
enum ValueShape {
    Primitive(Primitive),
    String,
    Type,
    Boxed,
    Array(Box<ValueShape>),
}

/// Enums whose definition cannot be found are almost always `int32`
const DEFAULT_ENUM_UNDERLYING: Primitive = Primitive::I4;

fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_VALUE_DEPTH {
        return Err(MetadataError::MalformedAttribute(format!(
            "value nested deeper than {} levels",
            MAX_VALUE_DEPTH
        )));
    }
    Ok(())
}

struct BlobDecoder<'a, 'r> {
    reader: ByteReader<'a>,
    resolver: &'r dyn EnumResolver,
}

impl<'a, 'r> BlobDecoder<'a, 'r> {
    fn shape_of(&self, ty: &SigType, depth: usize) -> Result<ValueShape> {
        check_depth(depth)?;
        Ok(match ty {
            SigType::Primitive(primitive) => ValueShape::Primitive(*primitive),
            SigType::String => ValueShape::String,
            SigType::Object => ValueShape::Boxed,
            SigType::SzArray(inner) => {
                ValueShape::Array(Box::new(self.shape_of(inner, depth + 1)?))
            }
            SigType::Class(handle) if self.resolver.is_system_type(*handle) => ValueShape::Type,
            SigType::ValueType(handle) => ValueShape::Primitive(
                self.resolver
                    .underlying_of(*handle)
                    .unwrap_or(DEFAULT_ENUM_UNDERLYING),
            ),
            other => {
                return Err(MetadataError::MalformedAttribute(format!(
                    "constructor parameter type {:?} cannot be serialized",
                    other
                )))
            }
        })
    }

    /// Reads a FieldOrPropType (II.23.3) used by named and boxed arguments
    fn read_field_or_prop_type(&mut self, depth: usize) -> Result<ValueShape> {
        check_depth(depth)?;
        let code = self.reader.u8()?;
        if let Some(primitive) = Primitive::from_element(code) {
            return Ok(ValueShape::Primitive(primitive));
        }
        Ok(match code {
            element::STRING => ValueShape::String,
            element::SYSTEM_TYPE => ValueShape::Type,
            element::BOXED => ValueShape::Boxed,
            element::SZARRAY => {
                ValueShape::Array(Box::new(self.read_field_or_prop_type(depth + 1)?))
            }
            element::ENUM => {
                let name = self.read_ser_string()?.unwrap_or_default();
                ValueShape::Primitive(
                    self.resolver
                        .underlying_of_named(&name)
                        .unwrap_or(DEFAULT_ENUM_UNDERLYING),
                )
            }
            other => {
                return Err(MetadataError::UnsupportedElementType {
                    element: other,
                    context: "custom attribute",
                })
            }
        })
    }

    fn read_ser_string(&mut self) -> Result<Option<String>> {
        if self.reader.peek_u8()? == NULL_STRING {
            self.reader.u8()?;
            return Ok(None);
        }
        let len = self.reader.compressed_u32()? as usize;
        let bytes = self.reader.take(len)?;
        std::str::from_utf8(bytes)
            .map(|s| Some(s.to_string()))
            .map_err(|_| MetadataError::InvalidUtf8("custom attribute string"))
    }

    fn read_primitive(&mut self, primitive: Primitive) -> Result<AttributeValue> {
        let r = &mut self.reader;
        Ok(match primitive {
            Primitive::Boolean => AttributeValue::Bool(r.u8()? != 0),
            Primitive::Char => {
                AttributeValue::Char(char::from_u32(u32::from(r.u16()?)).unwrap_or('\u{FFFD}'))
            }
            Primitive::I1 => AttributeValue::Int(i64::from(r.u8()? as i8)),
            Primitive::U1 => AttributeValue::UInt(u64::from(r.u8()?)),
            Primitive::I2 => AttributeValue::Int(i64::from(r.u16()? as i16)),
            Primitive::U2 => AttributeValue::UInt(u64::from(r.u16()?)),
            Primitive::I4 => AttributeValue::Int(i64::from(r.u32()? as i32)),
            Primitive::U4 => AttributeValue::UInt(u64::from(r.u32()?)),
            Primitive::I8 | Primitive::I => AttributeValue::Int(r.u64()? as i64),
            Primitive::U8 | Primitive::U => AttributeValue::UInt(r.u64()?),
            Primitive::R4 => AttributeValue::Float(f64::from(f32::from_bits(r.u32()?))),
            Primitive::R8 => AttributeValue::Float(f64::from_bits(r.u64()?)),
        })
    }

    fn read_value(&mut self, shape: &ValueShape, depth: usize) -> Result<AttributeValue> {
        check_depth(depth)?;
        match shape {
            ValueShape::Primitive(primitive) => self.read_primitive(*primitive),
            ValueShape::String => Ok(AttributeValue::String(self.read_ser_string()?)),
            ValueShape::Type => Ok(AttributeValue::Type(self.read_ser_string()?)),
            ValueShape::Boxed => {
                let inner = self.read_field_or_prop_type(depth + 1)?;
                self.read_value(&inner, depth + 1)
            }
            ValueShape::Array(element_shape) => {
                let count = self.reader.u32()?;
                if count == NULL_ARRAY {
                    return Ok(AttributeValue::Array(None));
                }
                // Every element takes at least one byte
                if count as usize > self.reader.remaining() {
                    return Err(MetadataError::MalformedAttribute(format!(
                        "array length {} exceeds blob",
                        count
                    )));
                }
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    items.push(self.read_value(element_shape, depth + 1)?);
                }
                Ok(AttributeValue::Array(Some(items)))
            }
        }
    }
}

/// Decodes an attribute value blob against its constructor's parameters
///
/// `parameter_names` supplies the constructor parameter names when the
/// constructor definition could be found; it may be shorter than
/// `parameters`.
pub fn decode_attribute_blob(
    blob: &[u8],
    parameters: &[SigType],
    parameter_names: &[Option<String>],
    resolver: &dyn EnumResolver,
) -> Result<DecodedAttribute> {
    let mut decoder = BlobDecoder {
        reader: ByteReader::new(blob, "custom attribute"),
        resolver,
    };

    if blob.is_empty() {
        if parameters.is_empty() {
            return Ok(DecodedAttribute::default());
        }
        return Err(MetadataError::MalformedAttribute(
            "empty blob for constructor with parameters".to_string(),
        ));
    }

    let prolog = decoder.reader.u16()?;
    if prolog != PROLOG {
        return Err(MetadataError::MalformedAttribute(format!(
            "invalid prolog {:#06x}",
            prolog
        )));
    }

    let mut arguments = Vec::with_capacity(parameters.len());
    for (index, parameter) in parameters.iter().enumerate() {
        let shape = decoder.shape_of(parameter, 0)?;
        arguments.push(AttributeArgument {
            name: parameter_names.get(index).cloned().flatten(),
            value: decoder.read_value(&shape, 0)?,
        });
    }

    // Some compilers omit the named-argument count when it is zero
    let named_count = if decoder.reader.is_empty() {
        0
    } else {
        decoder.reader.u16()?
    };
    let mut named = Vec::with_capacity(usize::from(named_count));
    for _ in 0..named_count {
        let kind = match decoder.reader.u8()? {
            element::FIELD => NamedArgumentKind::Field,
            element::PROPERTY => NamedArgumentKind::Property,
            other => {
                return Err(MetadataError::MalformedAttribute(format!(
                    "invalid named argument kind {:#04x}",
                    other
                )))
            }
        };
        let shape = decoder.read_field_or_prop_type(0)?;
        let name = decoder.read_ser_string()?.ok_or_else(|| {
            MetadataError::MalformedAttribute("named argument without a name".to_string())
        })?;
        let value = decoder.read_value(&shape, 0)?;
        named.push(NamedArgument { kind, name, value });
    }

    Ok(DecodedAttribute { arguments, named })
}
