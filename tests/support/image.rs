//! Minimal ECMA-335 image writer for tests
//!
//! Produces real PE32 files with a single `.text` section holding the CLI
//! header and metadata. Only the tables the scanner reads are emitted, all
//! heaps stay below 64 KiB so every index is two bytes wide.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

mod table {
    pub const MODULE: u8 = 0x00;
    pub const TYPE_REF: u8 = 0x01;
    pub const TYPE_DEF: u8 = 0x02;
    pub const FIELD: u8 = 0x04;
    pub const METHOD_DEF: u8 = 0x06;
    pub const PARAM: u8 = 0x08;
    pub const MEMBER_REF: u8 = 0x0A;
    pub const CUSTOM_ATTRIBUTE: u8 = 0x0C;
    pub const TYPE_SPEC: u8 = 0x1B;
    pub const ASSEMBLY: u8 = 0x20;
    pub const ASSEMBLY_REF: u8 = 0x23;
    pub const EXPORTED_TYPE: u8 = 0x27;
    pub const NESTED_CLASS: u8 = 0x29;
}

/// Column widths per table with two-byte heap and table indexes
fn column_widths(id: u8) -> &'static [usize] {
    match id {
        table::MODULE => &[2, 2, 2, 2, 2],
        table::TYPE_REF => &[2, 2, 2],
        table::TYPE_DEF => &[4, 2, 2, 2, 2, 2],
        table::FIELD => &[2, 2, 2],
        table::METHOD_DEF => &[4, 2, 2, 2, 2, 2],
        table::PARAM => &[2, 2, 2],
        table::MEMBER_REF => &[2, 2, 2],
        table::CUSTOM_ATTRIBUTE => &[2, 2, 2],
        table::TYPE_SPEC => &[2],
        table::ASSEMBLY => &[4, 2, 2, 2, 2, 4, 2, 2, 2],
        table::ASSEMBLY_REF => &[2, 2, 2, 2, 4, 2, 2, 2, 2],
        table::EXPORTED_TYPE => &[4, 4, 2, 2, 2],
        table::NESTED_CLASS => &[2, 2],
        other => panic!("test image writer does not emit table {other:#04x}"),
    }
}

/// A TypeDefOrRef target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHandle {
    Def(u32),
    Ref(u32),
    Spec(u32),
}

impl TypeHandle {
    pub fn type_def_or_ref(self) -> u32 {
        match self {
            TypeHandle::Def(row) => row << 2,
            TypeHandle::Ref(row) => (row << 2) | 1,
            TypeHandle::Spec(row) => (row << 2) | 2,
        }
    }

    fn member_ref_parent(self) -> u32 {
        match self {
            TypeHandle::Def(row) => row << 3,
            TypeHandle::Ref(row) => (row << 3) | 1,
            TypeHandle::Spec(row) => (row << 3) | 4,
        }
    }
}

/// Resolution scope of a TypeRef row
#[derive(Debug, Clone, Copy)]
pub enum Scope {
    Module,
    AssemblyRef(u32),
    Enclosing(u32),
}

/// Parent of a CustomAttribute row
#[derive(Debug, Clone, Copy)]
pub enum Target {
    Type(u32),
    Method(u32),
    Param(u32),
    Assembly,
}

/// Constructor of a CustomAttribute row
#[derive(Debug, Clone, Copy)]
pub enum Ctor {
    Def(u32),
    Ref(u32),
}

/// A MethodDef row and its Param rows (excluding any return-value row)
#[derive(Debug, Clone)]
pub struct MethodRow {
    pub row: u32,
    pub params: Vec<u32>,
}

pub fn compressed(value: u32) -> Vec<u8> {
    match value {
        0..=0x7F => vec![value as u8],
        0x80..=0x3FFF => vec![0x80 | (value >> 8) as u8, value as u8],
        _ => vec![
            0xC0 | (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ],
    }
}

/// Signature blob helpers
pub mod sig {
    use super::{compressed, TypeHandle};

    pub fn void() -> Vec<u8> {
        vec![0x01]
    }

    pub fn boolean() -> Vec<u8> {
        vec![0x02]
    }

    pub fn i4() -> Vec<u8> {
        vec![0x08]
    }

    pub fn string() -> Vec<u8> {
        vec![0x0E]
    }

    pub fn object() -> Vec<u8> {
        vec![0x1C]
    }

    pub fn class(handle: TypeHandle) -> Vec<u8> {
        let mut bytes = vec![0x12];
        bytes.extend(compressed(handle.type_def_or_ref()));
        bytes
    }

    pub fn value_type(handle: TypeHandle) -> Vec<u8> {
        let mut bytes = vec![0x11];
        bytes.extend(compressed(handle.type_def_or_ref()));
        bytes
    }

    pub fn sz_array(element: Vec<u8>) -> Vec<u8> {
        let mut bytes = vec![0x1D];
        bytes.extend(element);
        bytes
    }

    pub fn generic_inst(definition: TypeHandle, arguments: &[Vec<u8>]) -> Vec<u8> {
        let mut bytes = vec![0x15, 0x12];
        bytes.extend(compressed(definition.type_def_or_ref()));
        bytes.extend(compressed(arguments.len() as u32));
        for argument in arguments {
            bytes.extend(argument);
        }
        bytes
    }

    /// `instance void .ctor(params)`
    pub fn ctor(params: &[Vec<u8>]) -> Vec<u8> {
        let mut bytes = vec![0x20];
        bytes.extend(compressed(params.len() as u32));
        bytes.extend(void());
        for param in params {
            bytes.extend(param);
        }
        bytes
    }

    /// `static ret name(params)`
    pub fn static_method(ret: Vec<u8>, params: &[Vec<u8>]) -> Vec<u8> {
        let mut bytes = vec![0x00];
        bytes.extend(compressed(params.len() as u32));
        bytes.extend(ret);
        for param in params {
            bytes.extend(param);
        }
        bytes
    }

    pub fn field(ty: Vec<u8>) -> Vec<u8> {
        let mut bytes = vec![0x06];
        bytes.extend(ty);
        bytes
    }
}

fn ser_string(value: &str) -> Vec<u8> {
    let mut bytes = compressed(value.len() as u32);
    bytes.extend_from_slice(value.as_bytes());
    bytes
}

/// Builds a custom attribute value blob
#[derive(Debug, Default, Clone)]
pub struct AttributeBlob {
    fixed: Vec<u8>,
    named: Vec<Vec<u8>>,
}

impl AttributeBlob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string(mut self, value: &str) -> Self {
        self.fixed.extend(ser_string(value));
        self
    }

    pub fn null_string(mut self) -> Self {
        self.fixed.push(0xFF);
        self
    }

    pub fn i4(mut self, value: i32) -> Self {
        self.fixed.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn boolean(mut self, value: bool) -> Self {
        self.fixed.push(u8::from(value));
        self
    }

    pub fn strings(mut self, values: &[&str]) -> Self {
        self.fixed.extend_from_slice(&(values.len() as u32).to_le_bytes());
        for value in values {
            self.fixed.extend(ser_string(value));
        }
        self
    }

    pub fn property_string(mut self, name: &str, value: &str) -> Self {
        let mut bytes = vec![0x54, 0x0E];
        bytes.extend(ser_string(name));
        bytes.extend(ser_string(value));
        self.named.push(bytes);
        self
    }

    pub fn property_bool(mut self, name: &str, value: bool) -> Self {
        let mut bytes = vec![0x54, 0x02];
        bytes.extend(ser_string(name));
        bytes.push(u8::from(value));
        self.named.push(bytes);
        self
    }

    pub fn field_i4(mut self, name: &str, value: i32) -> Self {
        let mut bytes = vec![0x53, 0x08];
        bytes.extend(ser_string(name));
        bytes.extend_from_slice(&value.to_le_bytes());
        self.named.push(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut bytes = vec![0x01, 0x00];
        bytes.extend(self.fixed);
        bytes.extend_from_slice(&(self.named.len() as u16).to_le_bytes());
        for named in self.named {
            bytes.extend(named);
        }
        bytes
    }
}

/// Accumulates metadata rows and writes a PE image
#[derive(Debug, Clone)]
pub struct AssemblyBuilder {
    name: String,
    version: [u16; 4],
    include_assembly: bool,
    strings: Vec<u8>,
    string_offsets: HashMap<String, u32>,
    blobs: Vec<u8>,
    tables: BTreeMap<u8, Vec<Vec<u32>>>,
}

impl AssemblyBuilder {
    pub fn new(name: &str) -> Self {
        let mut builder = Self {
            name: name.to_string(),
            version: [1, 0, 0, 0],
            include_assembly: true,
            strings: vec![0],
            string_offsets: HashMap::new(),
            blobs: vec![0],
            tables: BTreeMap::new(),
        };
        builder.begin_type("", "<Module>", None);
        builder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(mut self, version: [u16; 4]) -> Self {
        self.version = version;
        self
    }

    /// Omits the Assembly row, producing a bare netmodule
    pub fn without_assembly_row(mut self) -> Self {
        self.include_assembly = false;
        self
    }

    fn string(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(offset) = self.string_offsets.get(value) {
            return *offset;
        }
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(value.as_bytes());
        self.strings.push(0);
        self.string_offsets.insert(value.to_string(), offset);
        offset
    }

    fn blob(&mut self, bytes: &[u8]) -> u32 {
        if bytes.is_empty() {
            return 0;
        }
        let offset = self.blobs.len() as u32;
        self.blobs.extend(compressed(bytes.len() as u32));
        self.blobs.extend_from_slice(bytes);
        offset
    }

    fn rows(&self, id: u8) -> u32 {
        self.tables.get(&id).map(|rows| rows.len() as u32).unwrap_or(0)
    }

    fn push(&mut self, id: u8, row: Vec<u32>) -> u32 {
        debug_assert_eq!(row.len(), column_widths(id).len());
        let rows = self.tables.entry(id).or_default();
        rows.push(row);
        rows.len() as u32
    }

    pub fn assembly_ref(&mut self, name: &str, version: [u16; 4]) -> u32 {
        let name = self.string(name);
        self.push(
            table::ASSEMBLY_REF,
            vec![
                u32::from(version[0]),
                u32::from(version[1]),
                u32::from(version[2]),
                u32::from(version[3]),
                0,
                0,
                name,
                0,
                0,
            ],
        )
    }

    pub fn type_ref(&mut self, scope: Scope, namespace: &str, name: &str) -> TypeHandle {
        let scope = match scope {
            Scope::Module => 1 << 2,
            Scope::AssemblyRef(row) => (row << 2) | 2,
            Scope::Enclosing(row) => (row << 2) | 3,
        };
        let name = self.string(name);
        let namespace = self.string(namespace);
        TypeHandle::Ref(self.push(table::TYPE_REF, vec![scope, name, namespace]))
    }

    pub fn type_spec(&mut self, signature: &[u8]) -> TypeHandle {
        let blob = self.blob(signature);
        TypeHandle::Spec(self.push(table::TYPE_SPEC, vec![blob]))
    }

    /// Starts a type; fields and methods added afterwards belong to it
    pub fn begin_type(&mut self, namespace: &str, name: &str, base: Option<TypeHandle>) -> u32 {
        let name = self.string(name);
        let namespace = self.string(namespace);
        let extends = base.map(TypeHandle::type_def_or_ref).unwrap_or(0);
        let field_list = self.rows(table::FIELD) + 1;
        let method_list = self.rows(table::METHOD_DEF) + 1;
        self.push(
            table::TYPE_DEF,
            vec![0x0010_0001, name, namespace, extends, field_list, method_list],
        )
    }

    pub fn field(&mut self, name: &str, flags: u16, signature: &[u8]) -> u32 {
        let name = self.string(name);
        let signature = self.blob(signature);
        self.push(table::FIELD, vec![u32::from(flags), name, signature])
    }

    pub fn method(&mut self, name: &str, signature: &[u8], params: &[&str]) -> MethodRow {
        self.method_with_return_row(name, signature, params, false)
    }

    /// Adds a method, optionally preceded by a sequence-0 return-value Param row
    pub fn method_with_return_row(
        &mut self,
        name: &str,
        signature: &[u8],
        params: &[&str],
        return_row: bool,
    ) -> MethodRow {
        let name = self.string(name);
        let signature = self.blob(signature);
        let param_list = self.rows(table::PARAM) + 1;
        let row = self.push(
            table::METHOD_DEF,
            vec![0, 0, 0x0096, name, signature, param_list],
        );
        if return_row {
            self.push(table::PARAM, vec![0, 0, 0]);
        }
        let params = params
            .iter()
            .enumerate()
            .map(|(index, param)| {
                let param_name = self.string(param);
                self.push(table::PARAM, vec![0, index as u32 + 1, param_name])
            })
            .collect();
        MethodRow { row, params }
    }

    pub fn member_ref(&mut self, parent: TypeHandle, name: &str, signature: &[u8]) -> u32 {
        let name = self.string(name);
        let signature = self.blob(signature);
        self.push(
            table::MEMBER_REF,
            vec![parent.member_ref_parent(), name, signature],
        )
    }

    pub fn attribute(&mut self, target: Target, ctor: Ctor, value: &[u8]) {
        let parent = match target {
            Target::Method(row) => row << 5,
            Target::Type(row) => (row << 5) | 3,
            Target::Param(row) => (row << 5) | 4,
            Target::Assembly => (1 << 5) | 14,
        };
        let ctor = match ctor {
            Ctor::Def(row) => (row << 3) | 2,
            Ctor::Ref(row) => (row << 3) | 3,
        };
        let value = self.blob(value);
        self.push(table::CUSTOM_ATTRIBUTE, vec![parent, ctor, value]);
    }

    pub fn nest(&mut self, nested: u32, enclosing: u32) {
        self.push(table::NESTED_CLASS, vec![nested, enclosing]);
    }

    /// Adds a type forwarder to `assembly_ref`
    pub fn forward(&mut self, namespace: &str, name: &str, assembly_ref: u32) {
        let name = self.string(name);
        let namespace = self.string(namespace);
        self.push(
            table::EXPORTED_TYPE,
            vec![0x0020_0000, 0, name, namespace, (assembly_ref << 2) | 1],
        );
    }

    fn table_stream(&mut self) -> Vec<u8> {
        let module_name = self.string(&format!("{}.dll", self.name));
        let mut tables = std::mem::take(&mut self.tables);
        tables.insert(table::MODULE, vec![vec![0, module_name, 1, 0, 0]]);
        if self.include_assembly {
            let name = self.string(&self.name.clone());
            let [major, minor, build, revision] = self.version;
            tables.insert(
                table::ASSEMBLY,
                vec![vec![
                    0x8004,
                    u32::from(major),
                    u32::from(minor),
                    u32::from(build),
                    u32::from(revision),
                    0,
                    0,
                    name,
                    0,
                ]],
            );
        }

        let valid = tables.keys().fold(0u64, |mask, id| mask | (1u64 << id));
        let mut stream = Vec::new();
        stream.extend_from_slice(&0u32.to_le_bytes());
        stream.extend_from_slice(&[2, 0, 0, 1]);
        stream.extend_from_slice(&valid.to_le_bytes());
        stream.extend_from_slice(&0u64.to_le_bytes());
        for rows in tables.values() {
            stream.extend_from_slice(&(rows.len() as u32).to_le_bytes());
        }
        for (id, rows) in &tables {
            let widths = column_widths(*id);
            for row in rows {
                for (value, width) in row.iter().zip(widths) {
                    match *width {
                        2 => stream.extend_from_slice(&(*value as u16).to_le_bytes()),
                        _ => stream.extend_from_slice(&value.to_le_bytes()),
                    }
                }
            }
        }
        stream
    }

    /// Serializes the metadata root and all streams
    fn metadata(mut self) -> Vec<u8> {
        let tables = self.table_stream();
        let streams: Vec<(&str, Vec<u8>)> = vec![
            ("#~", tables),
            ("#Strings", self.strings),
            ("#US", vec![0]),
            ("#GUID", vec![0x11; 16]),
            ("#Blob", self.blobs),
        ];

        let version = b"v4.0.30319\0\0";
        let header_len = 16 + version.len() + 4
            + streams
                .iter()
                .map(|(name, _)| 8 + align4(name.len() + 1))
                .sum::<usize>();

        let mut root = Vec::new();
        root.extend_from_slice(b"BSJB");
        root.extend_from_slice(&1u16.to_le_bytes());
        root.extend_from_slice(&1u16.to_le_bytes());
        root.extend_from_slice(&0u32.to_le_bytes());
        root.extend_from_slice(&(version.len() as u32).to_le_bytes());
        root.extend_from_slice(version);
        root.extend_from_slice(&0u16.to_le_bytes());
        root.extend_from_slice(&(streams.len() as u16).to_le_bytes());

        let mut offset = header_len;
        for (name, data) in &streams {
            let size = align4(data.len());
            root.extend_from_slice(&(offset as u32).to_le_bytes());
            root.extend_from_slice(&(size as u32).to_le_bytes());
            root.extend_from_slice(name.as_bytes());
            root.push(0);
            pad4(&mut root);
            offset += size;
        }
        debug_assert_eq!(root.len(), header_len);
        for (_, data) in streams {
            root.extend(data);
            pad4(&mut root);
        }
        root
    }

    /// Full PE image bytes
    pub fn build(self) -> Vec<u8> {
        pe_image(Some(&self.metadata()))
    }

    /// Writes `<dir>/<name>.dll`
    pub fn write_to(self, dir: &Path) -> PathBuf {
        let path = dir.join(format!("{}.dll", self.name));
        fs::write(&path, self.build()).expect("write test module");
        path
    }
}

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

fn pad4(bytes: &mut Vec<u8>) {
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
}

const FILE_ALIGNMENT: usize = 0x200;
const SECTION_RVA: u32 = 0x2000;
const CLI_HEADER_SIZE: usize = 72;

/// PE32 DLL with one section; `metadata` of `None` leaves out the CLI header
fn pe_image(metadata: Option<&[u8]>) -> Vec<u8> {
    let mut section = Vec::new();
    if let Some(metadata) = metadata {
        section.extend_from_slice(&(CLI_HEADER_SIZE as u32).to_le_bytes());
        section.extend_from_slice(&2u16.to_le_bytes());
        section.extend_from_slice(&5u16.to_le_bytes());
        section.extend_from_slice(&(SECTION_RVA + CLI_HEADER_SIZE as u32).to_le_bytes());
        section.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
        section.extend_from_slice(&1u32.to_le_bytes());
        section.resize(CLI_HEADER_SIZE, 0);
        section.extend_from_slice(metadata);
    } else {
        section.extend_from_slice(&[0xC3; 16]);
    }
    let virtual_size = section.len();
    section.resize(
        (section.len() + FILE_ALIGNMENT - 1) / FILE_ALIGNMENT * FILE_ALIGNMENT,
        0,
    );

    let mut image = vec![0u8; FILE_ALIGNMENT];
    image[0..2].copy_from_slice(b"MZ");
    image[0x3C..0x40].copy_from_slice(&0x80u32.to_le_bytes());

    let mut headers = Vec::new();
    headers.extend_from_slice(b"PE\0\0");
    // COFF header
    headers.extend_from_slice(&0x014Cu16.to_le_bytes());
    headers.extend_from_slice(&1u16.to_le_bytes());
    headers.extend_from_slice(&0u32.to_le_bytes());
    headers.extend_from_slice(&0u32.to_le_bytes());
    headers.extend_from_slice(&0u32.to_le_bytes());
    headers.extend_from_slice(&224u16.to_le_bytes());
    headers.extend_from_slice(&0x2102u16.to_le_bytes());

    // PE32 optional header
    let mut optional = vec![0u8; 224];
    optional[0..2].copy_from_slice(&0x010Bu16.to_le_bytes());
    optional[28..32].copy_from_slice(&0x1000_0000u32.to_le_bytes());
    optional[32..36].copy_from_slice(&0x2000u32.to_le_bytes());
    optional[36..40].copy_from_slice(&(FILE_ALIGNMENT as u32).to_le_bytes());
    optional[56..60].copy_from_slice(&(SECTION_RVA + 0x2000).to_le_bytes());
    optional[60..64].copy_from_slice(&(FILE_ALIGNMENT as u32).to_le_bytes());
    optional[92..96].copy_from_slice(&16u32.to_le_bytes());
    if metadata.is_some() {
        let cli = 96 + 14 * 8;
        optional[cli..cli + 4].copy_from_slice(&SECTION_RVA.to_le_bytes());
        optional[cli + 4..cli + 8].copy_from_slice(&(CLI_HEADER_SIZE as u32).to_le_bytes());
    }
    headers.extend(optional);

    // Section header
    headers.extend_from_slice(b".text\0\0\0");
    headers.extend_from_slice(&(virtual_size as u32).to_le_bytes());
    headers.extend_from_slice(&SECTION_RVA.to_le_bytes());
    headers.extend_from_slice(&(section.len() as u32).to_le_bytes());
    headers.extend_from_slice(&(FILE_ALIGNMENT as u32).to_le_bytes());
    headers.extend_from_slice(&[0u8; 12]);
    headers.extend_from_slice(&0x6000_0020u32.to_le_bytes());

    image[0x80..0x80 + headers.len()].copy_from_slice(&headers);
    image.extend(section);
    image
}

/// A native PE image: valid container, no CLI header
pub fn native_image() -> Vec<u8> {
    pe_image(None)
}

/// Corrupts the metadata root signature of a managed image
pub fn break_metadata(mut image: Vec<u8>) -> Vec<u8> {
    let position = image
        .windows(4)
        .position(|window| window == b"BSJB")
        .expect("metadata signature");
    image[position..position + 4].copy_from_slice(b"XXXX");
    image
}
