//! Builds a [`Module`] from the raw bytes of a PE file
//!
//! PE, CLI header, stream and table parsing is delegated to `dotscope`'s
//! [`CilAssemblyView`]. The rows it exposes are copied into the owned
//! arenas of [`Module`]; only blob bytes stay in the view.

use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;

use dotscope::metadata::streams::{Blob, Strings, TablesHeader};
use dotscope::metadata::tables::{
    AssemblyRaw, AssemblyRefRaw, CodedIndex, CustomAttributeRaw, ExportedTypeRaw, FieldPtrRaw,
    FieldRaw, MemberRefRaw, MethodDefRaw, MethodPtrRaw, ModuleRaw, NestedClassRaw, ParamPtrRaw,
    ParamRaw, TableId, TypeDefRaw, TypeRefRaw, TypeSpecRaw,
};
use dotscope::{CilAssemblyView, File};
use tracing::debug;

use super::error::{MetadataError, Result};
use super::model::{
    join_name, AssemblyIdentity, AttributeInstance, BlobIndex, ConstructorRef,
    ExportedImplementation, ExportedType, MemberReference, MethodLocation, MethodRecord, Module,
    ParameterRecord, ResolutionScope, TypeHandle, TypeId, TypeRecord, TypeReference, Version,
};
use super::signature::{parse_field_signature, parse_type_spec, SigType};

const FIELD_STATIC: u32 = 0x0010;
const MAX_NESTING: usize = 32;

/// Collects every row of one table, in row order
macro_rules! table_rows {
    ($header:expr, $raw:ty) => {
        $header
            .table::<$raw>()
            .map(|table| table.iter().collect::<Vec<$raw>>())
            .unwrap_or_default()
    };
}

/// Where a Param row's attributes should be attached
#[derive(Debug, Clone, Copy)]
struct ParamLocation {
    method: MethodLocation,
    slot: usize,
}

/// Everything decoded from the view; becomes a [`Module`] once the view
/// is no longer borrowed
struct Decoded {
    name: String,
    assembly: Option<AssemblyIdentity>,
    assembly_attributes: Vec<AttributeInstance>,
    types: Vec<TypeRecord>,
    type_refs: Vec<TypeReference>,
    type_specs: Vec<Option<TypeHandle>>,
    assembly_refs: Vec<AssemblyIdentity>,
    exported_types: Vec<ExportedType>,
    member_refs: Vec<MemberReference>,
    method_defs: Vec<Option<MethodLocation>>,
    type_index: HashMap<String, TypeId>,
}

struct Decoder<'v> {
    tables: &'v TablesHeader<'v>,
    strings: &'v Strings<'v>,
    blobs: &'v Blob<'v>,
}

impl<'v> Decoder<'v> {
    fn string(&self, index: u32) -> Result<String> {
        self.strings
            .get(index as usize)
            .map(str::to_string)
            .map_err(|_| MetadataError::HeapOutOfRange {
                heap: "#Strings",
                offset: index,
            })
    }

    fn blob(&self, index: u32) -> Option<&'v [u8]> {
        self.blobs.get(index as usize).ok()
    }

    fn decode(&self, path: &Path) -> Result<Decoded> {
        let name = match table_rows!(self.tables, ModuleRaw).first() {
            Some(row) => self.string(row.name)?,
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        let assembly = match table_rows!(self.tables, AssemblyRaw).first() {
            Some(row) => Some(self.identity(
                row.name,
                [
                    u32::from(row.major_version),
                    u32::from(row.minor_version),
                    u32::from(row.build_number),
                    u32::from(row.revision_number),
                ],
            )?),
            None => None,
        };

        let assembly_refs = table_rows!(self.tables, AssemblyRefRaw)
            .iter()
            .map(|row| {
                self.identity(
                    row.name,
                    [
                        u32::from(row.major_version),
                        u32::from(row.minor_version),
                        u32::from(row.build_number),
                        u32::from(row.revision_number),
                    ],
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let type_refs = table_rows!(self.tables, TypeRefRaw)
            .iter()
            .map(|row| {
                Ok(TypeReference {
                    name: self.string(row.type_name)?,
                    namespace: self.string(row.type_namespace)?,
                    scope: resolution_scope(&row.resolution_scope),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // A spec we cannot read is just an unresolvable base type
        let type_specs = table_rows!(self.tables, TypeSpecRaw)
            .iter()
            .map(|row| {
                self.blob(row.signature)
                    .and_then(|blob| parse_type_spec(blob).ok().flatten())
            })
            .collect();

        let method_rows = table_rows!(self.tables, MethodDefRaw);
        let mut decoded = Decoded {
            name,
            assembly,
            assembly_attributes: Vec::new(),
            types: Vec::new(),
            type_refs,
            type_specs,
            assembly_refs,
            exported_types: Vec::new(),
            member_refs: Vec::new(),
            method_defs: vec![None; method_rows.len()],
            type_index: HashMap::new(),
        };

        let type_rows = table_rows!(self.tables, TypeDefRaw);
        let param_locations = self.read_types(&type_rows, &method_rows, &mut decoded)?;
        self.read_nesting(&mut decoded);
        index_types(&mut decoded);
        self.read_enum_underlying(&type_rows, &mut decoded);

        decoded.member_refs = table_rows!(self.tables, MemberRefRaw)
            .iter()
            .map(|row| {
                Ok(MemberReference {
                    parent: type_handle(&row.class),
                    name: self.string(row.name)?,
                    signature: BlobIndex(row.signature),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        decoded.exported_types = table_rows!(self.tables, ExportedTypeRaw)
            .iter()
            .filter_map(|row| {
                let implementation = exported_implementation(&row.implementation)?;
                Some(Ok(ExportedType {
                    name: match self.string(row.name) {
                        Ok(name) => name,
                        Err(e) => return Some(Err(e)),
                    },
                    namespace: match self.string(row.namespace) {
                        Ok(namespace) => namespace,
                        Err(e) => return Some(Err(e)),
                    },
                    implementation,
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        self.read_custom_attributes(&mut decoded, &param_locations);
        Ok(decoded)
    }

    fn identity(&self, name: u32, version: [u32; 4]) -> Result<AssemblyIdentity> {
        let [major, minor, build, revision] = version.map(|part| part as u16);
        Ok(AssemblyIdentity {
            name: self.string(name)?,
            version: Version {
                major,
                minor,
                build,
                revision,
            },
        })
    }

    /// Rows owned through a list column, following the pointer table when
    /// the stream uses the uncompressed layout
    fn owned_rows(&self, range: Range<u32>, pointers: &[u32]) -> Vec<u32> {
        if pointers.is_empty() {
            range.collect()
        } else {
            range
                .filter_map(|ptr| pointers.get((ptr as usize).wrapping_sub(1)).copied())
                .collect()
        }
    }

    /// Reads TypeDef, MethodDef and Param rows into the type arena and
    /// returns where each Param row landed
    fn read_types(
        &self,
        type_rows: &[TypeDefRaw],
        method_rows: &[MethodDefRaw],
        decoded: &mut Decoded,
    ) -> Result<Vec<Option<ParamLocation>>> {
        let param_rows = table_rows!(self.tables, ParamRaw);
        let method_ptrs: Vec<u32> = table_rows!(self.tables, MethodPtrRaw)
            .iter()
            .map(|row| row.method)
            .collect();
        let param_ptrs: Vec<u32> = table_rows!(self.tables, ParamPtrRaw)
            .iter()
            .map(|row| row.param)
            .collect();
        let method_count = list_len(method_rows.len(), &method_ptrs);
        let param_count = list_len(param_rows.len(), &param_ptrs);
        let mut param_locations = vec![None; param_rows.len()];

        for (index, row) in type_rows.iter().enumerate() {
            let type_id = TypeId(index);
            let name = self.string(row.type_name)?;
            let namespace = self.string(row.type_namespace)?;

            let next = type_rows.get(index + 1).map(|next| next.method_list);
            let owned = list_range(row.method_list, next, method_count);
            let mut methods = Vec::new();
            for method_row in self.owned_rows(owned, &method_ptrs) {
                let slot = methods.len();
                let location = MethodLocation { type_id, slot };
                let method_index = (method_row as usize).wrapping_sub(1);
                let (Some(method), Some(entry)) = (
                    method_rows.get(method_index),
                    decoded.method_defs.get_mut(method_index),
                ) else {
                    continue;
                };
                *entry = Some(location);

                let next = method_rows.get(method_index + 1).map(|next| next.param_list);
                let owned = list_range(method.param_list, next, param_count);
                let mut parameters = Vec::new();
                for param_row in self.owned_rows(owned, &param_ptrs) {
                    let param_index = (param_row as usize).wrapping_sub(1);
                    let Some(param) = param_rows.get(param_index) else {
                        continue;
                    };
                    // Sequence 0 describes the return value, not a parameter
                    if param.sequence == 0 {
                        continue;
                    }
                    param_locations[param_index] = Some(ParamLocation {
                        method: location,
                        slot: parameters.len(),
                    });
                    parameters.push(ParameterRecord {
                        name: self.string(param.name)?,
                        position: param.sequence as usize - 1,
                        attributes: Vec::new(),
                    });
                }

                methods.push(MethodRecord {
                    name: self.string(method.name)?,
                    declaring_type: type_id,
                    parameters,
                    attributes: Vec::new(),
                    signature: BlobIndex(method.signature),
                });
            }

            decoded.types.push(TypeRecord {
                full_name: join_name(&namespace, &name),
                name,
                namespace,
                enclosing: None,
                base: type_handle(&row.extends),
                attributes: Vec::new(),
                methods,
                enum_underlying: None,
            });
        }

        Ok(param_locations)
    }

    fn read_nesting(&self, decoded: &mut Decoded) {
        for row in table_rows!(self.tables, NestedClassRaw) {
            let (Some(nested), Some(enclosing)) = (
                TypeId::from_row(row.nested_class),
                TypeId::from_row(row.enclosing_class),
            ) else {
                continue;
            };
            if nested != enclosing && enclosing.0 < decoded.types.len() {
                if let Some(record) = decoded.types.get_mut(nested.0) {
                    record.enclosing = Some(enclosing);
                }
            }
        }
    }

    fn read_enum_underlying(&self, type_rows: &[TypeDefRaw], decoded: &mut Decoded) {
        let field_rows = table_rows!(self.tables, FieldRaw);
        let field_ptrs: Vec<u32> = table_rows!(self.tables, FieldPtrRaw)
            .iter()
            .map(|row| row.field)
            .collect();
        let field_count = list_len(field_rows.len(), &field_ptrs);

        for (index, row) in type_rows.iter().enumerate() {
            if !extends_system_enum(decoded, decoded.types[index].base) {
                continue;
            }
            let next = type_rows.get(index + 1).map(|next| next.field_list);
            let owned = list_range(row.field_list, next, field_count);
            // The single instance field carries the underlying type
            let instance_field = self
                .owned_rows(owned, &field_ptrs)
                .into_iter()
                .filter_map(|field_row| field_rows.get((field_row as usize).wrapping_sub(1)))
                .find(|field| field.flags & FIELD_STATIC == 0);
            let Some(field) = instance_field else {
                continue;
            };
            let field_type = self
                .blob(field.signature)
                .ok_or(MetadataError::HeapOutOfRange {
                    heap: "#Blob",
                    offset: field.signature,
                })
                .and_then(parse_field_signature);
            if let Ok(SigType::Primitive(primitive)) = field_type {
                decoded.types[index].enum_underlying = Some(primitive);
            }
        }
    }

    fn read_custom_attributes(
        &self,
        decoded: &mut Decoded,
        param_locations: &[Option<ParamLocation>],
    ) {
        for row in table_rows!(self.tables, CustomAttributeRaw) {
            if row.constructor.row == 0 {
                continue;
            }
            let constructor = match row.constructor.tag {
                TableId::MethodDef => ConstructorRef::MethodDef(row.constructor.row),
                TableId::MemberRef => ConstructorRef::MemberRef(row.constructor.row),
                _ => continue,
            };
            let attribute_type = match constructor {
                ConstructorRef::MethodDef(r) => method_location(decoded, r)
                    .map(|location| TypeHandle::Def(location.type_id.row())),
                ConstructorRef::MemberRef(r) => (r as usize)
                    .checked_sub(1)
                    .and_then(|index| decoded.member_refs.get(index))
                    .and_then(|member| member.parent),
            };
            let instance = AttributeInstance {
                constructor,
                attribute_type,
                value: BlobIndex(row.value),
            };

            let parent = row.parent.row;
            let target = match row.parent.tag {
                TableId::TypeDef => TypeId::from_row(parent)
                    .and_then(|id| decoded.types.get_mut(id.0))
                    .map(|record| &mut record.attributes),
                TableId::MethodDef => match method_location(decoded, parent) {
                    Some(location) => decoded.types[location.type_id.0]
                        .methods
                        .get_mut(location.slot)
                        .map(|method| &mut method.attributes),
                    None => None,
                },
                TableId::Param => {
                    let location = param_locations
                        .get((parent as usize).wrapping_sub(1))
                        .copied()
                        .flatten();
                    match location {
                        Some(location) => decoded.types[location.method.type_id.0]
                            .methods
                            .get_mut(location.method.slot)
                            .and_then(|method| method.parameters.get_mut(location.slot))
                            .map(|parameter| &mut parameter.attributes),
                        None => None,
                    }
                }
                TableId::Assembly => Some(&mut decoded.assembly_attributes),
                _ => None,
            };
            if let Some(target) = target {
                target.push(instance);
            }
        }
    }
}

impl Module {
    /// Decodes a module from the bytes of a PE file
    pub fn from_bytes(path: &Path, data: &[u8]) -> Result<Module> {
        let file = File::from_mem(data.to_vec())
            .map_err(|e| MetadataError::NotAModule(e.to_string()))?;
        if !file.is_clr() {
            return Err(MetadataError::NotAModule(
                "PE image has no CLI header".to_string(),
            ));
        }
        drop(file);

        let view = CilAssemblyView::from_mem(data.to_vec()).map_err(MetadataError::invalid)?;
        let decoded = {
            let decoder = Decoder {
                tables: view.tables().ok_or(MetadataError::MissingStream("#~"))?,
                strings: view
                    .strings()
                    .ok_or(MetadataError::MissingStream("#Strings"))?,
                blobs: view.blobs().ok_or(MetadataError::MissingStream("#Blob"))?,
            };
            decoder.decode(path)?
        };

        let module = Module {
            path: path.to_path_buf(),
            name: decoded.name,
            assembly: decoded.assembly,
            assembly_attributes: decoded.assembly_attributes,
            types: decoded.types,
            type_refs: decoded.type_refs,
            type_specs: decoded.type_specs,
            assembly_refs: decoded.assembly_refs,
            exported_types: decoded.exported_types,
            member_refs: decoded.member_refs,
            method_defs: decoded.method_defs,
            type_index: decoded.type_index,
            view,
        };

        debug!(
            module = %module.name,
            assembly = module.assembly_name(),
            types = module.types.len(),
            type_refs = module.type_refs.len(),
            "Decoded module metadata"
        );
        Ok(module)
    }
}

/// Number of addressable rows in a list target, through its pointer table
/// when present
fn list_len(rows: usize, pointers: &[u32]) -> u32 {
    if pointers.is_empty() {
        rows as u32
    } else {
        pointers.len() as u32
    }
}

/// `[start, next)` clamped to the rows that exist; the last owner runs to
/// the end of the table
fn list_range(start: u32, next: Option<u32>, count: u32) -> Range<u32> {
    let start = start.max(1);
    let end = next.unwrap_or(count + 1).min(count + 1);
    start..end.max(start)
}

fn type_handle(index: &CodedIndex) -> Option<TypeHandle> {
    if index.row == 0 {
        return None;
    }
    match index.tag {
        TableId::TypeDef => Some(TypeHandle::Def(index.row)),
        TableId::TypeRef => Some(TypeHandle::Ref(index.row)),
        TableId::TypeSpec => Some(TypeHandle::Spec(index.row)),
        _ => None,
    }
}

fn resolution_scope(index: &CodedIndex) -> ResolutionScope {
    if index.row == 0 {
        return ResolutionScope::Unknown;
    }
    match index.tag {
        TableId::Module => ResolutionScope::CurrentModule,
        TableId::ModuleRef => ResolutionScope::ModuleRef(index.row),
        TableId::AssemblyRef => ResolutionScope::AssemblyRef(index.row),
        TableId::TypeRef => ResolutionScope::Enclosing(index.row),
        _ => ResolutionScope::Unknown,
    }
}

fn exported_implementation(index: &CodedIndex) -> Option<ExportedImplementation> {
    if index.row == 0 {
        return None;
    }
    match index.tag {
        TableId::File => Some(ExportedImplementation::File(index.row)),
        TableId::AssemblyRef => Some(ExportedImplementation::AssemblyRef(index.row)),
        TableId::ExportedType => Some(ExportedImplementation::Enclosing(index.row)),
        _ => None,
    }
}

fn method_location(decoded: &Decoded, row: u32) -> Option<MethodLocation> {
    decoded
        .method_defs
        .get((row as usize).checked_sub(1)?)
        .copied()
        .flatten()
}

/// Whether a base handle names `System.Enum`
fn extends_system_enum(decoded: &Decoded, base: Option<TypeHandle>) -> bool {
    match base {
        Some(TypeHandle::Ref(row)) => (row as usize)
            .checked_sub(1)
            .and_then(|index| decoded.type_refs.get(index))
            .is_some_and(|reference| {
                reference.namespace == "System"
                    && reference.name == "Enum"
                    && !matches!(reference.scope, ResolutionScope::Enclosing(_))
            }),
        Some(TypeHandle::Def(row)) => TypeId::from_row(row)
            .and_then(|id| decoded.types.get(id.0))
            .is_some_and(|record| record.full_name == "System.Enum"),
        _ => false,
    }
}

/// Computes nested full names and the lookup index
fn index_types(decoded: &mut Decoded) {
    for index in 0..decoded.types.len() {
        let mut segments = vec![decoded.types[index].name.clone()];
        let mut current = index;
        let mut depth = 0;
        while let Some(enclosing) = decoded.types[current].enclosing {
            depth += 1;
            if depth > MAX_NESTING {
                break;
            }
            current = enclosing.0;
            segments.push(decoded.types[current].name.clone());
        }
        segments.reverse();
        let outermost = &decoded.types[current];
        let full_name = join_name(&outermost.namespace, &segments.join("/"));
        decoded.types[index].full_name = full_name.clone();
        decoded.type_index.entry(full_name).or_insert(TypeId(index));
    }
}
