//! Module loading with cross-module resolution
//!
//! [`ModuleLoader::load`] turns one file into a [`ModuleContext`]: the parsed
//! module plus an [`AssemblyResolver`] seeded with the reference directories
//! and the file's own directory. The context lives for the processing of one
//! file and is then dropped along with every dependency it loaded.

mod error;
mod resolver;

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

pub use error::LoadError;
pub use resolver::{AssemblyResolver, DeclaringScope, ResolvedType};

use crate::metadata::{
    decode_attribute_blob, AttributeInstance, ConstructorRef, DecodedAttribute, MetadataError,
    MethodSignature, Module, TypeHandle,
};

/// Reads and decodes one module file
pub(crate) fn read_module(path: &Path, max_module_size: u64) -> Result<Module, LoadError> {
    let size = fs::metadata(path)
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if size > max_module_size {
        return Err(LoadError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: max_module_size,
        });
    }

    let data = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Module::from_bytes(path, &data)
        .map_err(|source| LoadError::from_metadata(path.to_path_buf(), source))
}

/// Opens module files against a fixed set of reference directories
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    reference_dirs: Vec<PathBuf>,
    max_module_size: u64,
}

impl ModuleLoader {
    pub fn new(reference_dirs: Vec<PathBuf>, max_module_size: u64) -> Self {
        Self {
            reference_dirs,
            max_module_size,
        }
    }

    /// Loads `path` and builds its resolution context
    pub fn load(&self, path: &Path) -> Result<ModuleContext, LoadError> {
        let module = Rc::new(read_module(path, self.max_module_size)?);
        let resolver =
            AssemblyResolver::new(&self.reference_dirs, path.parent(), self.max_module_size);
        resolver.register(module.clone());

        debug!(
            path = %path.display(),
            assembly = %module.assembly_name(),
            types = module.types().len(),
            "Loaded module"
        );
        Ok(ModuleContext { module, resolver })
    }
}

/// A loaded module and the resolver for everything it references
#[derive(Debug)]
pub struct ModuleContext {
    module: Rc<Module>,
    resolver: AssemblyResolver,
}

impl ModuleContext {
    pub fn module(&self) -> &Rc<Module> {
        &self.module
    }

    pub fn resolver(&self) -> &AssemblyResolver {
        &self.resolver
    }

    /// Resolves a handle that appears in `module` to its definition
    pub fn resolve_type(&self, module: &Rc<Module>, handle: TypeHandle) -> Option<ResolvedType> {
        self.resolver.resolve(module, handle)
    }

    /// Resolves the type declaring an attribute's constructor
    pub fn attribute_type(
        &self,
        module: &Rc<Module>,
        attribute: &AttributeInstance,
    ) -> Option<ResolvedType> {
        self.resolve_type(module, attribute.attribute_type?)
    }

    /// Decodes the argument values of an attribute declared in `module`
    pub fn decode_attribute(
        &self,
        module: &Rc<Module>,
        attribute: &AttributeInstance,
    ) -> Result<DecodedAttribute, MetadataError> {
        let signature_blob = match attribute.constructor {
            ConstructorRef::MethodDef(row) => {
                module.method_def(row).map(|method| method.signature)
            }
            ConstructorRef::MemberRef(row) => {
                module.member_ref(row).map(|member| member.signature)
            }
        }
        .ok_or_else(|| {
            MetadataError::MalformedAttribute("constructor row out of range".to_string())
        })?;

        let signature = MethodSignature::parse(module.blob(signature_blob)?)?;
        let names = self
            .resolver
            .constructor_parameter_names(module, attribute.constructor);
        let blob = module.blob(attribute.value)?;
        decode_attribute_blob(
            blob,
            &signature.parameters,
            &names,
            &self.resolver.scoped(module),
        )
    }
}
