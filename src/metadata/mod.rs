//! ECMA-335 metadata decoding
//!
//! Turns the bytes of a managed PE image into a [`Module`]: a read-only
//! graph of type definitions, methods, parameters and the declarative
//! attributes attached to them. Nothing here touches the file system or
//! other modules; cross-module lookups live in [`crate::loader`].
//!
//! PE headers, metadata streams, tables and signature blobs are read with
//! `dotscope`. This module copies what the scanner needs into owned
//! arenas (`decode`), narrows signatures to attribute-relevant shapes
//! ([`signature`]) and decodes custom attribute value blobs
//! ([`attribute`]), which need enum lookups across assemblies.

pub mod attribute;
mod decode;
pub mod error;
pub mod model;
mod reader;
pub mod signature;

pub use attribute::{
    decode_attribute_blob, AttributeArgument, AttributeValue, DecodedAttribute, EnumResolver,
    NamedArgument, NamedArgumentKind,
};
pub use error::MetadataError;
pub use model::{
    AssemblyIdentity, AttributeInstance, BlobIndex, ConstructorRef, ExportedImplementation,
    ExportedType, MemberReference, MethodRecord, Module, ParameterRecord, ResolutionScope,
    TypeHandle, TypeId, TypeRecord, TypeReference, Version,
};
pub use signature::{MethodSignature, Primitive, SigType};
