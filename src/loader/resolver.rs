//! Cross-module type resolution
//!
//! The resolver answers "which type definition does this handle name?" for
//! handles found in any module reachable from the file being scanned.
//! Referenced assemblies are looked up on disk by simple name across the
//! search directories and parsed at most once per resolver.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, trace};

use super::read_module;
use crate::metadata::{
    BlobIndex, ConstructorRef, EnumResolver, ExportedImplementation, MethodSignature, Module,
    ParameterRecord, Primitive, ResolutionScope, SigType, TypeHandle, TypeId, TypeRecord,
};

/// File extensions tried, in order, for an assembly simple name
const CANDIDATE_EXTENSIONS: &[&str] = &["dll", "exe"];

/// Maximum number of type-forwarding hops followed for one lookup
const MAX_FORWARD_DEPTH: usize = 8;

/// Maximum nesting of TypeSpec/enclosing-reference indirections
const MAX_REFERENCE_DEPTH: usize = 32;

const CONSTRUCTOR_NAME: &str = ".ctor";
const SYSTEM_TYPE: &str = "System.Type";

/// A type definition together with the module that owns it
#[derive(Debug, Clone)]
pub struct ResolvedType {
    pub module: Rc<Module>,
    pub id: TypeId,
}

impl ResolvedType {
    /// Only built for ids that exist in `module`
    fn new(module: Rc<Module>, id: TypeId) -> Option<Self> {
        module.type_record(id)?;
        Some(Self { module, id })
    }

    pub fn record(&self) -> &TypeRecord {
        &self.module.types()[self.id.0]
    }

    pub fn full_name(&self) -> &str {
        &self.record().full_name
    }
}

/// Resolves type references across the modules of one scan context
#[derive(Debug)]
pub struct AssemblyResolver {
    search_dirs: Vec<PathBuf>,
    max_module_size: u64,
    /// Keyed by lowercase simple name; `None` records a failed lookup
    cache: RefCell<HashMap<String, Option<Rc<Module>>>>,
}

impl AssemblyResolver {
    /// Creates a resolver over `reference_dirs` followed by `own_dir`
    ///
    /// Duplicate directories are dropped, keeping the first occurrence.
    pub fn new(reference_dirs: &[PathBuf], own_dir: Option<&Path>, max_module_size: u64) -> Self {
        let mut search_dirs: Vec<PathBuf> = Vec::with_capacity(reference_dirs.len() + 1);
        for dir in reference_dirs.iter().map(PathBuf::as_path).chain(own_dir) {
            if !search_dirs.iter().any(|existing| existing == dir) {
                search_dirs.push(dir.to_path_buf());
            }
        }
        Self {
            search_dirs,
            max_module_size,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Registers an already loaded module under its assembly name
    pub fn register(&self, module: Rc<Module>) {
        let key = module.assembly_name().to_ascii_lowercase();
        self.cache.borrow_mut().entry(key).or_insert(Some(module));
    }

    /// Number of assemblies looked up so far, including failed lookups
    pub fn cached_count(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Finds and parses an assembly by simple name
    pub fn load_assembly(&self, name: &str) -> Option<Rc<Module>> {
        let key = name.to_ascii_lowercase();
        if let Some(cached) = self.cache.borrow().get(&key) {
            return cached.clone();
        }

        let loaded = self.search(name);
        self.cache.borrow_mut().insert(key, loaded.clone());
        loaded
    }

    fn search(&self, name: &str) -> Option<Rc<Module>> {
        for dir in &self.search_dirs {
            for extension in CANDIDATE_EXTENSIONS {
                let candidate = dir.join(format!("{}.{}", name, extension));
                if !candidate.is_file() {
                    continue;
                }
                match read_module(&candidate, self.max_module_size) {
                    Ok(module) => {
                        debug!(
                            assembly = %name,
                            path = %candidate.display(),
                            "Resolved referenced assembly"
                        );
                        return Some(Rc::new(module));
                    }
                    Err(e) => {
                        debug!(
                            assembly = %name,
                            path = %candidate.display(),
                            error = %e,
                            "Candidate assembly failed to load"
                        );
                    }
                }
            }
        }
        trace!(assembly = %name, "Referenced assembly not found");
        None
    }

    /// Resolves a TypeDefOrRef handle found in `module`
    pub fn resolve(&self, module: &Rc<Module>, handle: TypeHandle) -> Option<ResolvedType> {
        self.resolve_handle(module, handle, 0)
    }

    fn resolve_handle(
        &self,
        module: &Rc<Module>,
        handle: TypeHandle,
        depth: usize,
    ) -> Option<ResolvedType> {
        if depth > MAX_REFERENCE_DEPTH {
            return None;
        }
        match handle {
            TypeHandle::Def(row) => ResolvedType::new(module.clone(), TypeId::from_row(row)?),
            TypeHandle::Ref(row) => self.resolve_type_ref(module, row, depth),
            TypeHandle::Spec(row) => {
                self.resolve_handle(module, module.type_spec(row)?, depth + 1)
            }
        }
    }

    fn resolve_type_ref(
        &self,
        module: &Rc<Module>,
        row: u32,
        depth: usize,
    ) -> Option<ResolvedType> {
        // Enclosing chains can loop back on themselves in malformed input
        if depth > MAX_REFERENCE_DEPTH {
            return None;
        }
        let reference = module.type_ref(row)?;
        match reference.scope {
            ResolutionScope::Enclosing(parent) => {
                let enclosing = self.resolve_type_ref(module, parent, depth + 1)?;
                let nested_name = format!("{}/{}", enclosing.full_name(), reference.name);
                let id = enclosing.module.find_type(&nested_name)?;
                ResolvedType::new(enclosing.module.clone(), id)
            }
            ResolutionScope::AssemblyRef(assembly_row) => {
                let identity = module.assembly_ref(assembly_row)?;
                let target = self.load_assembly(&identity.name)?;
                let full_name = module.type_ref_full_name(row)?;
                self.find_in_assembly(&target, &full_name, 0)
            }
            ResolutionScope::CurrentModule
            | ResolutionScope::ModuleRef(_)
            | ResolutionScope::Unknown => {
                let full_name = module.type_ref_full_name(row)?;
                self.find_in_assembly(module, &full_name, 0)
            }
        }
    }

    /// Looks a type up by full name, following type forwarders
    fn find_in_assembly(
        &self,
        module: &Rc<Module>,
        full_name: &str,
        forwards: usize,
    ) -> Option<ResolvedType> {
        if let Some(id) = module.find_type(full_name) {
            return ResolvedType::new(module.clone(), id);
        }
        if forwards >= MAX_FORWARD_DEPTH {
            debug!(type_name = %full_name, "Type forwarding chain too deep");
            return None;
        }
        let forwarder = module
            .exported_types()
            .iter()
            .find(|exported| exported.full_name() == full_name)?;
        match forwarder.implementation {
            ExportedImplementation::AssemblyRef(row) => {
                let identity = module.assembly_ref(row)?;
                let target = self.load_assembly(&identity.name)?;
                trace!(
                    type_name = %full_name,
                    target = %identity.name,
                    "Following type forwarder"
                );
                self.find_in_assembly(&target, full_name, forwards + 1)
            }
            ExportedImplementation::File(_) | ExportedImplementation::Enclosing(_) => None,
        }
    }

    /// Resolves a serialized type name such as
    /// `Ns.Type+Nested, Assembly, Version=1.0.0.0`
    fn resolve_serialized_name(
        &self,
        module: &Rc<Module>,
        serialized: &str,
    ) -> Option<ResolvedType> {
        let (type_name, assembly) = match serialized.split_once(',') {
            Some((type_name, rest)) => (type_name.trim(), rest.split(',').next().map(str::trim)),
            None => (serialized.trim(), None),
        };
        let full_name = type_name.replace('+', "/");
        match assembly {
            Some(assembly) if !assembly.eq_ignore_ascii_case(module.assembly_name()) => {
                let target = self.load_assembly(assembly)?;
                self.find_in_assembly(&target, &full_name, 0)
            }
            _ => self.find_in_assembly(module, &full_name, 0),
        }
    }

    /// Constructor parameter names for a custom attribute constructor
    ///
    /// Entries are `None` where the definition carries no name; the result is
    /// empty when the constructor definition cannot be found.
    pub fn constructor_parameter_names(
        &self,
        module: &Rc<Module>,
        constructor: ConstructorRef,
    ) -> Vec<Option<String>> {
        match constructor {
            ConstructorRef::MethodDef(row) => module
                .method_def(row)
                .map(|method| {
                    positional_names(&method.parameters, parameter_count(module, method.signature))
                })
                .unwrap_or_default(),
            ConstructorRef::MemberRef(row) => self
                .member_ref_parameter_names(module, row)
                .unwrap_or_default(),
        }
    }

    fn member_ref_parameter_names(
        &self,
        module: &Rc<Module>,
        row: u32,
    ) -> Option<Vec<Option<String>>> {
        let member = module.member_ref(row)?;
        let wanted = MethodSignature::parse(module.blob(member.signature).ok()?).ok()?;
        let declaring = self.resolve(module, member.parent?)?;

        let candidates: Vec<_> = declaring
            .record()
            .methods
            .iter()
            .filter(|method| method.name == CONSTRUCTOR_NAME)
            .filter_map(|method| {
                let blob = declaring.module.blob(method.signature).ok()?;
                let signature = MethodSignature::parse(blob).ok()?;
                (signature.parameters.len() == wanted.parameters.len())
                    .then_some((method, signature))
            })
            .collect();

        let matched = candidates
            .iter()
            .find(|(_, signature)| {
                signature
                    .parameters
                    .iter()
                    .zip(&wanted.parameters)
                    .all(|(defined, referenced)| {
                        self.same_type(&declaring.module, defined, module, referenced)
                    })
            })
            .or_else(|| (candidates.len() == 1).then(|| &candidates[0]))?;

        Some(positional_names(&matched.0.parameters, wanted.parameters.len()))
    }

    /// Structural signature comparison across two modules
    fn same_type(
        &self,
        left_module: &Rc<Module>,
        left: &SigType,
        right_module: &Rc<Module>,
        right: &SigType,
    ) -> bool {
        match (left, right) {
            (SigType::Class(a), SigType::Class(b))
            | (SigType::ValueType(a), SigType::ValueType(b)) => {
                match (left_module.handle_full_name(*a), right_module.handle_full_name(*b)) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            (SigType::SzArray(a), SigType::SzArray(b)) => {
                self.same_type(left_module, a, right_module, b)
            }
            (
                SigType::GenericInst {
                    definition: a,
                    arguments: left_args,
                },
                SigType::GenericInst {
                    definition: b,
                    arguments: right_args,
                },
            ) => {
                left_module.handle_full_name(*a) == right_module.handle_full_name(*b)
                    && left_args.len() == right_args.len()
                    && left_args
                        .iter()
                        .zip(right_args)
                        .all(|(a, b)| self.same_type(left_module, a, right_module, b))
            }
            (a, b) => a == b,
        }
    }

    /// Enum and `System.Type` lookups for attributes declared in `module`
    pub fn scoped<'r>(&'r self, module: &'r Rc<Module>) -> DeclaringScope<'r> {
        DeclaringScope {
            module,
            resolver: self,
        }
    }
}

/// The module an attribute is declared in, paired with the resolver that
/// can follow its references
#[derive(Debug, Clone, Copy)]
pub struct DeclaringScope<'r> {
    module: &'r Rc<Module>,
    resolver: &'r AssemblyResolver,
}

impl EnumResolver for DeclaringScope<'_> {
    fn underlying_of(&self, handle: TypeHandle) -> Option<Primitive> {
        self.resolver
            .resolve(self.module, handle)?
            .record()
            .enum_underlying
    }

    fn underlying_of_named(&self, name: &str) -> Option<Primitive> {
        self.resolver
            .resolve_serialized_name(self.module, name)?
            .record()
            .enum_underlying
    }

    fn is_system_type(&self, handle: TypeHandle) -> bool {
        self.module.handle_full_name(handle).as_deref() == Some(SYSTEM_TYPE)
    }
}

fn parameter_count(module: &Module, signature: BlobIndex) -> usize {
    module
        .blob(signature)
        .ok()
        .and_then(|blob| MethodSignature::parse(blob).ok())
        .map(|signature| signature.parameters.len())
        .unwrap_or(0)
}

fn positional_names(parameters: &[ParameterRecord], count: usize) -> Vec<Option<String>> {
    (0..count)
        .map(|position| {
            parameters
                .iter()
                .find(|parameter| parameter.position == position)
                .map(|parameter| parameter.name.clone())
                .filter(|name| !name.is_empty())
        })
        .collect()
}
