//! Function discovery and descriptor synthesis
//!
//! Works on a loaded [`crate::loader::ModuleContext`]: methods carrying the
//! entry-point attribute become [`FunctionDescriptor`]s whose bindings come
//! from the binding attributes on their parameters and return value.

pub mod binding;
pub mod classifier;
pub mod descriptor;
pub mod extensions;
pub mod markers;
pub mod synthesizer;

pub use binding::{BindingBuilder, BindingDescriptor, BindingError, Direction};
pub use classifier::AttributeClassifier;
pub use descriptor::FunctionDescriptor;
pub use extensions::ExtensionRegistry;
pub use markers::Marker;
pub use synthesizer::DescriptorSynthesizer;
