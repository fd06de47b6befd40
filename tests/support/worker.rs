//! Worker SDK fixtures built with [`AssemblyBuilder`]
//!
//! Mirrors how real function apps are laid out: the marker attributes live
//! in the worker core and abstractions assemblies, binding attributes in
//! extension assemblies, and the app references all of them.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::image::{
    sig, AssemblyBuilder, AttributeBlob, Ctor, MethodRow, Scope, Target, TypeHandle,
};

pub const SYSTEM_RUNTIME: &str = "System.Runtime";
pub const WORKER_CORE: &str = "Microsoft.Azure.Functions.Worker.Core";
pub const WORKER_NAMESPACE: &str = "Microsoft.Azure.Functions.Worker";
pub const ABSTRACTIONS: &str = "Microsoft.Azure.Functions.Worker.Extensions.Abstractions";
pub const HTTP_EXTENSION: &str = "Microsoft.Azure.Functions.Worker.Extensions.Http";
pub const STORAGE_EXTENSION: &str = "Microsoft.Azure.Functions.Worker.Extensions.Storage";

const VERSION: [u16; 4] = [1, 0, 0, 0];

/// Which abstractions base an extension attribute derives from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Trigger,
    Input,
    Output,
}

impl BindingKind {
    pub fn base_name(self) -> &'static str {
        match self {
            BindingKind::Trigger => "TriggerBindingAttribute",
            BindingKind::Input => "InputBindingAttribute",
            BindingKind::Output => "OutputBindingAttribute",
        }
    }
}

/// One binding attribute type declared by an extension assembly
#[derive(Debug, Clone)]
pub struct ExtensionAttribute {
    pub name: &'static str,
    pub kind: BindingKind,
    pub parameters: Vec<(&'static str, Vec<u8>)>,
}

impl ExtensionAttribute {
    pub fn new(name: &'static str, kind: BindingKind) -> Self {
        Self {
            name,
            kind,
            parameters: Vec::new(),
        }
    }

    pub fn string_parameter(mut self, name: &'static str) -> Self {
        self.parameters.push((name, sig::string()));
        self
    }
}

fn system_type(builder: &mut AssemblyBuilder, name: &str) -> TypeHandle {
    let runtime = builder.assembly_ref(SYSTEM_RUNTIME, [8, 0, 0, 0]);
    builder.type_ref(Scope::AssemblyRef(runtime), "System", name)
}

/// Adds an attribute type with a single constructor; returns the ctor row
fn attribute_type(
    builder: &mut AssemblyBuilder,
    namespace: &str,
    name: &str,
    base: TypeHandle,
    parameters: &[(&str, Vec<u8>)],
) -> (u32, u32) {
    let type_row = builder.begin_type(namespace, name, Some(base));
    let signatures: Vec<Vec<u8>> = parameters.iter().map(|(_, sig)| sig.clone()).collect();
    let names: Vec<&str> = parameters.iter().map(|(name, _)| *name).collect();
    let ctor = builder.method(".ctor", &sig::ctor(&signatures), &names);
    (type_row, ctor.row)
}

/// Writes the worker core assembly declaring `FunctionAttribute`
pub fn write_worker_core(dir: &Path) -> PathBuf {
    let mut builder = AssemblyBuilder::new(WORKER_CORE);
    let attribute = system_type(&mut builder, "Attribute");
    attribute_type(
        &mut builder,
        WORKER_NAMESPACE,
        "FunctionAttribute",
        attribute,
        &[("name", sig::string())],
    );
    builder.write_to(dir)
}

/// Writes the abstractions assembly declaring the binding marker hierarchy
pub fn write_abstractions(dir: &Path) -> PathBuf {
    let mut builder = AssemblyBuilder::new(ABSTRACTIONS);
    let attribute = system_type(&mut builder, "Attribute");
    let (binding, _) =
        attribute_type(&mut builder, ABSTRACTIONS, "BindingAttribute", attribute, &[]);
    let binding = TypeHandle::Def(binding);
    for base in [
        BindingKind::Trigger,
        BindingKind::Input,
        BindingKind::Output,
    ] {
        attribute_type(&mut builder, ABSTRACTIONS, base.base_name(), binding, &[]);
    }
    attribute_type(
        &mut builder,
        ABSTRACTIONS,
        "ExtensionInformationAttribute",
        attribute,
        &[
            ("extensionPackage", sig::string()),
            ("extensionVersion", sig::string()),
        ],
    );
    builder.write_to(dir)
}

/// Writes both SDK assemblies
pub fn write_worker_sdk(dir: &Path) {
    write_worker_core(dir);
    write_abstractions(dir);
}

/// Declares `[assembly: ExtensionInformation(package, version)]`
pub fn declare_extension(builder: &mut AssemblyBuilder, package: &str, version: &str) {
    let abstractions = builder.assembly_ref(ABSTRACTIONS, VERSION);
    let info = builder.type_ref(
        Scope::AssemblyRef(abstractions),
        ABSTRACTIONS,
        "ExtensionInformationAttribute",
    );
    let ctor = builder.member_ref(info, ".ctor", &sig::ctor(&[sig::string(), sig::string()]));
    builder.attribute(
        Target::Assembly,
        Ctor::Ref(ctor),
        &AttributeBlob::new().string(package).string(version).build(),
    );
}

/// Extension assembly named `assembly` declaring `attributes` in `namespace`,
/// without any extension information
pub fn extension_builder(
    assembly: &str,
    namespace: &str,
    attributes: &[ExtensionAttribute],
) -> AssemblyBuilder {
    let mut builder = AssemblyBuilder::new(assembly);
    let abstractions = builder.assembly_ref(ABSTRACTIONS, VERSION);
    let mut bases = HashMap::new();
    for attribute in attributes {
        let base = *bases.entry(attribute.kind).or_insert_with(|| {
            builder.type_ref(
                Scope::AssemblyRef(abstractions),
                ABSTRACTIONS,
                attribute.kind.base_name(),
            )
        });
        attribute_type(&mut builder, namespace, attribute.name, base, &attribute.parameters);
    }
    builder
}

/// Writes an extension assembly named `assembly` whose attributes live in
/// `namespace`, optionally declaring `(package, version)`
pub fn write_extension(
    dir: &Path,
    assembly: &str,
    namespace: &str,
    extension: Option<(&str, &str)>,
    attributes: &[ExtensionAttribute],
) -> PathBuf {
    let mut builder = extension_builder(assembly, namespace, attributes);
    if let Some((package, version)) = extension {
        declare_extension(&mut builder, package, version);
    }
    builder.write_to(dir)
}

/// Writes the HTTP extension with `AuthorizationLevel` and
/// `HttpTriggerAttribute(AuthorizationLevel authLevel, string[] methods)`
pub fn write_http_extension(dir: &Path, version: &str) -> PathBuf {
    let mut builder = AssemblyBuilder::new(HTTP_EXTENSION);
    let abstractions = builder.assembly_ref(ABSTRACTIONS, VERSION);
    let trigger = builder.type_ref(
        Scope::AssemblyRef(abstractions),
        ABSTRACTIONS,
        BindingKind::Trigger.base_name(),
    );
    let enum_base = system_type(&mut builder, "Enum");

    let level = builder.begin_type(WORKER_NAMESPACE, "AuthorizationLevel", Some(enum_base));
    builder.field("value__", 0x0606, &sig::field(sig::i4()));
    for name in ["Anonymous", "User", "Function", "System", "Admin"] {
        builder.field(name, 0x8056, &sig::field(sig::value_type(TypeHandle::Def(level))));
    }

    attribute_type(
        &mut builder,
        WORKER_NAMESPACE,
        "HttpTriggerAttribute",
        trigger,
        &[
            ("authLevel", sig::value_type(TypeHandle::Def(level))),
            ("methods", sig::sz_array(sig::string())),
        ],
    );
    declare_extension(&mut builder, "Microsoft.Azure.WebJobs.Extensions.Http", version);
    builder.write_to(dir)
}

/// Writes the storage extension with queue and blob attributes
pub fn write_storage_extension(dir: &Path, version: &str) -> PathBuf {
    write_extension(
        dir,
        STORAGE_EXTENSION,
        WORKER_NAMESPACE,
        Some(("Microsoft.Azure.WebJobs.Extensions.Storage", version)),
        &[
            ExtensionAttribute::new("QueueTriggerAttribute", BindingKind::Trigger)
                .string_parameter("queueName"),
            ExtensionAttribute::new("QueueOutputAttribute", BindingKind::Output)
                .string_parameter("queueName"),
            ExtensionAttribute::new("BlobInputAttribute", BindingKind::Input)
                .string_parameter("blobPath"),
        ],
    )
}

/// HTTP trigger blob: `(AuthorizationLevel level, string[] methods)` plus Route
pub fn http_trigger_args(level: i32, methods: &[&str], route: Option<&str>) -> Vec<u8> {
    let blob = AttributeBlob::new().i4(level).strings(methods);
    match route {
        Some(route) => blob.property_string("Route", route),
        None => blob,
    }
    .build()
}

/// Function app under construction, referencing the SDK and extensions
pub struct AppAssembly {
    pub builder: AssemblyBuilder,
    assembly_refs: HashMap<String, u32>,
    type_refs: HashMap<(String, String), TypeHandle>,
    object: TypeHandle,
    function_ctor: u32,
}

impl AppAssembly {
    pub fn new(name: &str) -> Self {
        let mut builder = AssemblyBuilder::new(name);
        let object = system_type(&mut builder, "Object");
        let mut app = Self {
            builder,
            assembly_refs: HashMap::new(),
            type_refs: HashMap::new(),
            object,
            function_ctor: 0,
        };
        let function = app.type_ref(WORKER_CORE, WORKER_NAMESPACE, "FunctionAttribute");
        app.function_ctor = app
            .builder
            .member_ref(function, ".ctor", &sig::ctor(&[sig::string()]));
        app
    }

    pub fn object(&self) -> TypeHandle {
        self.object
    }

    fn assembly(&mut self, name: &str) -> u32 {
        if let Some(row) = self.assembly_refs.get(name) {
            return *row;
        }
        let row = self.builder.assembly_ref(name, VERSION);
        self.assembly_refs.insert(name.to_string(), row);
        row
    }

    /// TypeRef to `namespace.name` in `assembly`, deduplicated
    pub fn type_ref(&mut self, assembly: &str, namespace: &str, name: &str) -> TypeHandle {
        let key = (assembly.to_string(), format!("{namespace}.{name}"));
        if let Some(handle) = self.type_refs.get(&key) {
            return *handle;
        }
        let scope = Scope::AssemblyRef(self.assembly(assembly));
        let handle = self.builder.type_ref(scope, namespace, name);
        self.type_refs.insert(key, handle);
        handle
    }

    /// MemberRef to the constructor of an attribute in another assembly
    pub fn attribute_ctor(
        &mut self,
        assembly: &str,
        namespace: &str,
        name: &str,
        parameters: &[Vec<u8>],
    ) -> Ctor {
        let parent = self.type_ref(assembly, namespace, name);
        Ctor::Ref(self.builder.member_ref(parent, ".ctor", &sig::ctor(parameters)))
    }

    pub fn http_trigger_ctor(&mut self) -> Ctor {
        let level = self.type_ref(HTTP_EXTENSION, WORKER_NAMESPACE, "AuthorizationLevel");
        self.attribute_ctor(
            HTTP_EXTENSION,
            WORKER_NAMESPACE,
            "HttpTriggerAttribute",
            &[sig::value_type(level), sig::sz_array(sig::string())],
        )
    }

    pub fn storage_ctor(&mut self, name: &str) -> Ctor {
        self.attribute_ctor(STORAGE_EXTENSION, WORKER_NAMESPACE, name, &[sig::string()])
    }

    pub fn class(&mut self, namespace: &str, name: &str) -> u32 {
        let object = self.object;
        self.builder.begin_type(namespace, name, Some(object))
    }

    /// Adds a static method taking `params` objects, marked `[Function(function_name)]`
    pub fn function(&mut self, method: &str, function_name: &str, params: &[&str]) -> MethodRow {
        let signatures = vec![sig::object(); params.len()];
        let row = self.builder.method(
            method,
            &sig::static_method(sig::void(), &signatures),
            params,
        );
        self.builder.attribute(
            Target::Method(row.row),
            Ctor::Ref(self.function_ctor),
            &AttributeBlob::new().string(function_name).build(),
        );
        row
    }

    /// Adds a plain method with no attributes
    pub fn method(&mut self, method: &str, params: &[&str]) -> MethodRow {
        let signatures = vec![sig::object(); params.len()];
        self.builder
            .method(method, &sig::static_method(sig::void(), &signatures), params)
    }

    pub fn annotate(&mut self, target: Target, ctor: Ctor, value: &[u8]) {
        self.builder.attribute(target, ctor, value);
    }

    pub fn write_to(self, dir: &Path) -> PathBuf {
        self.builder.write_to(dir)
    }
}
