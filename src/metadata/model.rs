//! Navigable type/method/parameter graph decoded from one module
//!
//! Records are stored in index-addressed arenas owned by [`Module`]. Cross
//! references inside a module are plain indices ([`TypeId`]) or metadata row
//! handles ([`TypeHandle`]); references into other modules go through the
//! resolver in [`crate::loader`].

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use dotscope::CilAssemblyView;

use super::error::{MetadataError, Result};
use super::signature::Primitive;

/// Index of a [`TypeRecord`] inside its owning [`Module`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub usize);

impl TypeId {
    /// Converts a 1-based TypeDef row into an arena index
    pub fn from_row(row: u32) -> Option<Self> {
        (row as usize).checked_sub(1).map(TypeId)
    }

    pub fn row(self) -> u32 {
        self.0 as u32 + 1
    }
}

/// A TypeDefOrRef reference as it appears in metadata (1-based rows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeHandle {
    Def(u32),
    Ref(u32),
    Spec(u32),
}

/// Offset into the owning module's `#Blob` heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlobIndex(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Name and version of an assembly definition or reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyIdentity {
    pub name: String,
    pub version: Version,
}

/// Where a TypeRef says its definition lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionScope {
    CurrentModule,
    ModuleRef(u32),
    AssemblyRef(u32),
    /// Nested type: the enclosing TypeRef row
    Enclosing(u32),
    /// A null scope (legal only in ENC deltas and exported-type lookups)
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeReference {
    pub name: String,
    pub namespace: String,
    pub scope: ResolutionScope,
}

/// Target of an ExportedType (type forwarder) row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportedImplementation {
    File(u32),
    AssemblyRef(u32),
    Enclosing(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedType {
    pub name: String,
    pub namespace: String,
    pub implementation: ExportedImplementation,
}

impl ExportedType {
    pub fn full_name(&self) -> String {
        join_name(&self.namespace, &self.name)
    }
}

/// MemberRef row: a method or field on a type from another scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberReference {
    /// `None` when the parent is a ModuleRef or a MethodDef (vararg call sites)
    pub parent: Option<TypeHandle>,
    pub name: String,
    pub signature: BlobIndex,
}

/// The constructor a custom attribute row invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructorRef {
    MethodDef(u32),
    MemberRef(u32),
}

/// A declarative attribute attached to a type, method, parameter or assembly
///
/// Only the references are kept; argument values are decoded on demand by
/// [`crate::loader::ModuleContext::decode_attribute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInstance {
    pub constructor: ConstructorRef,
    /// Type declaring the constructor; `None` for malformed parents
    pub attribute_type: Option<TypeHandle>,
    pub value: BlobIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRecord {
    pub name: String,
    /// Zero-based position in the method's parameter list
    pub position: usize,
    pub attributes: Vec<AttributeInstance>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    pub name: String,
    pub declaring_type: TypeId,
    pub parameters: Vec<ParameterRecord>,
    pub attributes: Vec<AttributeInstance>,
    pub signature: BlobIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    pub name: String,
    pub namespace: String,
    /// `Namespace.Name`, or `Outer/Inner` for nested types
    pub full_name: String,
    pub enclosing: Option<TypeId>,
    pub base: Option<TypeHandle>,
    pub attributes: Vec<AttributeInstance>,
    pub methods: Vec<MethodRecord>,
    /// Underlying primitive when this type is an enum
    pub enum_underlying: Option<Primitive>,
}

/// Location of a MethodDef row inside the type arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodLocation {
    pub type_id: TypeId,
    pub slot: usize,
}

/// One parsed binary module
///
/// A `Module` owns every record decoded from its file along with the
/// assembly view whose blob heap those records point into.
pub struct Module {
    pub(crate) path: PathBuf,
    pub(crate) name: String,
    pub(crate) assembly: Option<AssemblyIdentity>,
    pub(crate) assembly_attributes: Vec<AttributeInstance>,
    pub(crate) types: Vec<TypeRecord>,
    pub(crate) type_refs: Vec<TypeReference>,
    pub(crate) type_specs: Vec<Option<TypeHandle>>,
    pub(crate) assembly_refs: Vec<AssemblyIdentity>,
    pub(crate) exported_types: Vec<ExportedType>,
    pub(crate) member_refs: Vec<MemberReference>,
    pub(crate) method_defs: Vec<Option<MethodLocation>>,
    pub(crate) type_index: HashMap<String, TypeId>,
    pub(crate) view: CilAssemblyView,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("assembly", &self.assembly)
            .field("types", &self.types.len())
            .finish_non_exhaustive()
    }
}

impl Module {
    /// Module name from the Module table (usually the file name)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assembly(&self) -> Option<&AssemblyIdentity> {
        self.assembly.as_ref()
    }

    /// Assembly name, falling back to the module name without extension
    pub fn assembly_name(&self) -> &str {
        match &self.assembly {
            Some(identity) => &identity.name,
            None => self
                .name
                .rsplit_once('.')
                .map(|(stem, _)| stem)
                .unwrap_or(&self.name),
        }
    }

    pub fn assembly_attributes(&self) -> &[AttributeInstance] {
        &self.assembly_attributes
    }

    pub fn types(&self) -> &[TypeRecord] {
        &self.types
    }

    pub fn type_record(&self, id: TypeId) -> Option<&TypeRecord> {
        self.types.get(id.0)
    }

    pub fn find_type(&self, full_name: &str) -> Option<TypeId> {
        self.type_index.get(full_name).copied()
    }

    pub fn type_ref(&self, row: u32) -> Option<&TypeReference> {
        self.type_refs.get((row as usize).checked_sub(1)?)
    }

    pub fn type_spec(&self, row: u32) -> Option<TypeHandle> {
        *self.type_specs.get((row as usize).checked_sub(1)?)?
    }

    pub fn assembly_ref(&self, row: u32) -> Option<&AssemblyIdentity> {
        self.assembly_refs.get((row as usize).checked_sub(1)?)
    }

    pub fn exported_types(&self) -> &[ExportedType] {
        &self.exported_types
    }

    pub fn member_ref(&self, row: u32) -> Option<&MemberReference> {
        self.member_refs.get((row as usize).checked_sub(1)?)
    }

    pub fn method_def(&self, row: u32) -> Option<&MethodRecord> {
        let location = (*self.method_defs.get((row as usize).checked_sub(1)?)?)?;
        self.types.get(location.type_id.0)?.methods.get(location.slot)
    }

    /// Bytes of a `#Blob` heap entry; offset zero is the empty blob
    pub fn blob(&self, index: BlobIndex) -> Result<&[u8]> {
        if index.0 == 0 {
            return Ok(&[]);
        }
        let heap = self
            .view
            .blobs()
            .ok_or(MetadataError::MissingStream("#Blob"))?;
        heap.get(index.0 as usize)
            .map_err(|_| MetadataError::HeapOutOfRange {
                heap: "#Blob",
                offset: index.0,
            })
    }

    /// Full name of a type reference, following enclosing TypeRefs
    pub fn type_ref_full_name(&self, row: u32) -> Option<String> {
        let mut reference = self.type_ref(row)?;
        let mut name = reference.name.clone();
        // Bounded to stop on cyclic enclosing chains in malformed input
        for _ in 0..32 {
            match reference.scope {
                ResolutionScope::Enclosing(parent) => {
                    reference = self.type_ref(parent)?;
                    name = format!("{}/{}", reference.name, name);
                }
                _ => return Some(join_name(&reference.namespace, &name)),
            }
        }
        None
    }

    /// Full name of any handle without leaving this module
    pub fn handle_full_name(&self, handle: TypeHandle) -> Option<String> {
        match handle {
            TypeHandle::Def(row) => self
                .type_record(TypeId::from_row(row)?)
                .map(|record| record.full_name.clone()),
            TypeHandle::Ref(row) => self.type_ref_full_name(row),
            TypeHandle::Spec(row) => match self.type_spec(row)? {
                TypeHandle::Spec(_) => None,
                inner => self.handle_full_name(inner),
            },
        }
    }
}

pub(crate) fn join_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}
