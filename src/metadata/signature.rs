//! Signature blobs as seen by attribute decoding
//!
//! Blob parsing is done by `dotscope`; this module narrows its
//! [`TypeSignature`] tree to the shapes that matter for attribute
//! constructors and base types, keyed by in-module [`TypeHandle`]s.

use dotscope::metadata::signatures::{
    parse_field_signature as parse_field_blob, parse_method_signature,
    parse_type_spec_signature, TypeSignature,
};

use super::error::{MetadataError, Result};
use super::model::TypeHandle;

/// Element type codes used by custom attribute encodings (II.23.1.16)
pub mod element {
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const SZARRAY: u8 = 0x1D;
    /// `System.Type` in custom attribute encodings
    pub const SYSTEM_TYPE: u8 = 0x50;
    /// Boxed `object` in custom attribute encodings
    pub const BOXED: u8 = 0x51;
    pub const FIELD: u8 = 0x53;
    pub const PROPERTY: u8 = 0x54;
    pub const ENUM: u8 = 0x55;
}

/// Deepest signature tree converted before the rest is treated as opaque
const MAX_SIGNATURE_DEPTH: usize = 32;

const TABLE_TYPE_REF: u8 = 0x01;
const TABLE_TYPE_DEF: u8 = 0x02;
const TABLE_TYPE_SPEC: u8 = 0x1B;

/// Primitive types that can appear in custom attribute values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    I,
    U,
}

impl Primitive {
    pub fn from_element(code: u8) -> Option<Self> {
        use self::element as e;
        Some(match code {
            e::BOOLEAN => Primitive::Boolean,
            e::CHAR => Primitive::Char,
            e::I1 => Primitive::I1,
            e::U1 => Primitive::U1,
            e::I2 => Primitive::I2,
            e::U2 => Primitive::U2,
            e::I4 => Primitive::I4,
            e::U4 => Primitive::U4,
            e::I8 => Primitive::I8,
            e::U8 => Primitive::U8,
            e::R4 => Primitive::R4,
            e::R8 => Primitive::R8,
            e::I => Primitive::I,
            e::U => Primitive::U,
            _ => return None,
        })
    }

    fn from_signature(signature: &TypeSignature) -> Option<Self> {
        Some(match signature {
            TypeSignature::Boolean => Primitive::Boolean,
            TypeSignature::Char => Primitive::Char,
            TypeSignature::I1 => Primitive::I1,
            TypeSignature::U1 => Primitive::U1,
            TypeSignature::I2 => Primitive::I2,
            TypeSignature::U2 => Primitive::U2,
            TypeSignature::I4 => Primitive::I4,
            TypeSignature::U4 => Primitive::U4,
            TypeSignature::I8 => Primitive::I8,
            TypeSignature::U8 => Primitive::U8,
            TypeSignature::R4 => Primitive::R4,
            TypeSignature::R8 => Primitive::R8,
            TypeSignature::I => Primitive::I,
            TypeSignature::U => Primitive::U,
            _ => return None,
        })
    }
}

/// A decoded type from a signature blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigType {
    Void,
    Primitive(Primitive),
    String,
    Object,
    Class(TypeHandle),
    ValueType(TypeHandle),
    SzArray(Box<SigType>),
    GenericInst {
        definition: TypeHandle,
        arguments: Vec<SigType>,
    },
    /// Pointers, generic parameters, multi-dimensional arrays and similar
    /// shapes that never appear in attribute constructors
    Other,
}

impl SigType {
    fn from_signature(signature: &TypeSignature, depth: usize) -> SigType {
        if depth > MAX_SIGNATURE_DEPTH {
            return SigType::Other;
        }
        if let Some(primitive) = Primitive::from_signature(signature) {
            return SigType::Primitive(primitive);
        }
        match signature {
            TypeSignature::Void => SigType::Void,
            TypeSignature::String => SigType::String,
            TypeSignature::Object => SigType::Object,
            TypeSignature::Class(token) => handle_of(token.table(), token.row())
                .map_or(SigType::Other, SigType::Class),
            TypeSignature::ValueType(token) => handle_of(token.table(), token.row())
                .map_or(SigType::Other, SigType::ValueType),
            TypeSignature::SzArray(array) => {
                SigType::SzArray(Box::new(SigType::from_signature(&array.base, depth + 1)))
            }
            TypeSignature::GenericInst(definition, arguments) => {
                match SigType::from_signature(definition, depth + 1) {
                    SigType::Class(definition) | SigType::ValueType(definition) => {
                        SigType::GenericInst {
                            definition,
                            arguments: arguments
                                .iter()
                                .map(|argument| SigType::from_signature(argument, depth + 1))
                                .collect(),
                        }
                    }
                    _ => SigType::Other,
                }
            }
            _ => SigType::Other,
        }
    }
}

fn handle_of(table: u8, row: u32) -> Option<TypeHandle> {
    match table {
        _ if row == 0 => None,
        TABLE_TYPE_DEF => Some(TypeHandle::Def(row)),
        TABLE_TYPE_REF => Some(TypeHandle::Ref(row)),
        TABLE_TYPE_SPEC => Some(TypeHandle::Spec(row)),
        _ => None,
    }
}

/// Parameter list of a method signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub parameters: Vec<SigType>,
}

impl MethodSignature {
    pub fn parse(blob: &[u8]) -> Result<Self> {
        let signature = parse_method_signature(blob)
            .map_err(|e| MetadataError::MalformedSignature(e.to_string()))?;
        Ok(Self {
            parameters: signature
                .params
                .iter()
                .map(|parameter| SigType::from_signature(&parameter.base, 0))
                .collect(),
        })
    }
}

/// Decodes a FieldSig blob into the field's type
pub fn parse_field_signature(blob: &[u8]) -> Result<SigType> {
    let signature =
        parse_field_blob(blob).map_err(|e| MetadataError::MalformedSignature(e.to_string()))?;
    Ok(SigType::from_signature(&signature.base, 0))
}

/// Decodes a TypeSpec blob into the type definition it instantiates, if any
pub fn parse_type_spec(blob: &[u8]) -> Result<Option<TypeHandle>> {
    let signature = parse_type_spec_signature(blob)
        .map_err(|e| MetadataError::MalformedSignature(e.to_string()))?;
    Ok(match SigType::from_signature(&signature.base, 0) {
        SigType::GenericInst { definition, .. } => Some(definition),
        SigType::Class(handle) | SigType::ValueType(handle) => Some(handle),
        _ => None,
    })
}
