//! Directory scan driver: loads each module and collects its descriptors

use std::path::{Path, PathBuf};
use std::time::Instant;

use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use super::error::ScanError;
use super::output::{ScanOutput, SkippedFile};
use crate::config::ScanConfig;
use crate::diagnostics::{DiagnosticHandler, LoggingHandler, ScanEvent};
use crate::functions::{DescriptorSynthesizer, ExtensionRegistry, FunctionDescriptor};
use crate::loader::ModuleLoader;

/// Drives loading and synthesis over every module in a directory
pub struct ScanOrchestrator {
    config: ScanConfig,
    handler: Box<dyn DiagnosticHandler>,
}

impl ScanOrchestrator {
    /// Creates an orchestrator that reports through [`LoggingHandler`]
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            handler: Box::new(LoggingHandler),
        }
    }

    pub fn with_handler(mut self, handler: impl DiagnosticHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scans the directory containing `assembly_path`
    ///
    /// `reference_paths` may name directories or referenced assembly files;
    /// files contribute their parent directory. They are searched before
    /// the configured reference paths and the scanned directory itself.
    ///
    /// Per-file failures never escape: the file is reported through the
    /// diagnostic handler, listed in [`ScanOutput::skipped`], and any
    /// extension registry writes it made are rolled back.
    pub fn scan(
        &self,
        assembly_path: &Path,
        reference_paths: &[PathBuf],
    ) -> Result<ScanOutput, ScanError> {
        let start = Instant::now();
        self.config.validate()?;

        let directory = match assembly_path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
            Some(parent) => parent,
            None => return Err(ScanError::DirectoryNotFound(assembly_path.to_path_buf())),
        };
        let files = self.module_files(directory)?;
        info!(dir = %directory.display(), files = files.len(), "Starting function metadata scan");
        self.handler.on_event(&ScanEvent::Started {
            directory: directory.to_path_buf(),
            files: files.len(),
        });

        let loader = ModuleLoader::new(
            self.search_dirs(reference_paths),
            self.config.max_module_size,
        );
        let mut output = ScanOutput::default();
        for path in files {
            let snapshot = output.extensions.clone();
            match self.scan_file(&loader, &path, &mut output.extensions) {
                Ok(functions) => output.functions.extend(functions),
                Err(e) => {
                    output.extensions = snapshot;
                    let reason = e.skip_reason();
                    let detail = e.to_string();
                    self.handler.on_event(&ScanEvent::ModuleSkipped {
                        path: path.clone(),
                        reason,
                        detail: detail.clone(),
                    });
                    output.skipped.push(SkippedFile { path, reason, detail });
                }
            }
        }

        info!(
            functions = output.functions.len(),
            extensions = output.extensions.len(),
            skipped = output.skipped.len(),
            "Function metadata scan complete"
        );
        self.handler.on_event(&ScanEvent::Completed {
            functions: output.functions.len(),
            extensions: output.extensions.len(),
            skipped: output.skipped.len(),
            duration: start.elapsed(),
        });
        Ok(output)
    }

    /// Module files directly inside `directory`, sorted by file name
    pub fn module_files(&self, directory: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !directory.is_dir() {
            return Err(ScanError::DirectoryNotFound(directory.to_path_buf()));
        }

        let mut files = Vec::new();
        for result in WalkBuilder::new(directory)
            .max_depth(Some(1))
            .standard_filters(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build()
        {
            let entry = match result {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "Failed to read directory entry");
                    continue;
                }
            };
            if entry.depth() == 0 || !entry.path().is_file() {
                continue;
            }
            let is_module = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| self.config.is_module_extension(ext));
            if is_module {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn search_dirs(&self, reference_paths: &[PathBuf]) -> Vec<PathBuf> {
        reference_paths
            .iter()
            .chain(&self.config.reference_paths)
            .filter_map(|path| {
                if path.is_file() {
                    path.parent().map(Path::to_path_buf)
                } else {
                    Some(path.clone())
                }
            })
            .collect()
    }

    fn scan_file(
        &self,
        loader: &ModuleLoader,
        path: &Path,
        registry: &mut ExtensionRegistry,
    ) -> Result<Vec<FunctionDescriptor>, ScanError> {
        let context = loader.load(path)?;
        let module = context.module();
        self.handler.on_event(&ScanEvent::ModuleLoaded {
            path: path.to_path_buf(),
            assembly: module.assembly_name().to_string(),
            types: module.types().len(),
        });

        let functions = DescriptorSynthesizer::new(&context)
            .synthesize(registry)
            .map_err(|source| ScanError::Binding {
                path: path.to_path_buf(),
                source,
            })?;

        for function in &functions {
            let type_name = function
                .entry_point
                .rsplit_once('.')
                .map(|(type_name, _)| type_name)
                .unwrap_or_default();
            self.handler.on_event(&ScanEvent::FunctionDiscovered {
                path: path.to_path_buf(),
                type_name: type_name.to_string(),
                function: function.name.clone(),
                bindings: function.bindings.len(),
            });
        }
        debug!(
            path = %path.display(),
            functions = functions.len(),
            resolved_assemblies = context.resolver().cached_count(),
            "File scanned"
        );
        Ok(functions)
    }
}
