//! Assembles function descriptors for the entry points of one module

use std::rc::Rc;

use tracing::debug;

use super::binding::{BindingBuilder, BindingDescriptor, BindingError, Direction};
use super::classifier::AttributeClassifier;
use super::descriptor::FunctionDescriptor;
use super::extensions::ExtensionRegistry;
use super::markers::Marker;
use crate::loader::ModuleContext;
use crate::metadata::{AttributeInstance, MethodRecord, Module, TypeRecord};

/// Bindings split by direction, each in production order
#[derive(Debug, Default)]
struct BindingSet {
    inputs: Vec<BindingDescriptor>,
    outputs: Vec<BindingDescriptor>,
}

impl BindingSet {
    fn extend(&mut self, bindings: Vec<BindingDescriptor>) {
        for binding in bindings {
            match binding.direction() {
                Some(Direction::Out) => self.outputs.push(binding),
                _ => self.inputs.push(binding),
            }
        }
    }

    fn into_ordered(mut self) -> Vec<BindingDescriptor> {
        self.inputs.append(&mut self.outputs);
        self.inputs
    }
}

/// Builds [`FunctionDescriptor`]s for every entry-point method in a module
pub struct DescriptorSynthesizer<'c> {
    context: &'c ModuleContext,
    classifier: AttributeClassifier<'c>,
    builder: BindingBuilder<'c>,
}

impl<'c> DescriptorSynthesizer<'c> {
    pub fn new(context: &'c ModuleContext) -> Self {
        Self {
            context,
            classifier: AttributeClassifier::new(context),
            builder: BindingBuilder::new(context),
        }
    }

    /// Descriptors for the whole module in type then method order
    pub fn synthesize(
        &self,
        registry: &mut ExtensionRegistry,
    ) -> Result<Vec<FunctionDescriptor>, BindingError> {
        let module = self.context.module();
        let mut descriptors = Vec::new();
        for record in module.types() {
            for method in &record.methods {
                let descriptor = self.synthesize_method(module, record, method, registry)?;
                descriptors.extend(descriptor);
            }
        }
        Ok(descriptors)
    }

    /// Descriptor for one method, or `None` when it is not an entry point
    pub fn synthesize_method(
        &self,
        module: &Rc<Module>,
        declaring_type: &TypeRecord,
        method: &MethodRecord,
        registry: &mut ExtensionRegistry,
    ) -> Result<Option<FunctionDescriptor>, BindingError> {
        let Some(marker) = method
            .attributes
            .iter()
            .find(|attribute| self.classifier.classify(module, attribute, Marker::Function))
        else {
            return Ok(None);
        };

        let Some(name) = self.function_name(module, marker)? else {
            debug!(
                type_name = %declaring_type.full_name,
                method = %method.name,
                "Entry point without a function name, skipped"
            );
            return Ok(None);
        };

        let mut descriptor = FunctionDescriptor::new(
            name,
            module.assembly_name(),
            &declaring_type.full_name,
            &method.name,
        );

        let mut bindings = BindingSet::default();
        let mut parameters: Vec<_> = method.parameters.iter().collect();
        parameters.sort_by_key(|parameter| parameter.position);
        for parameter in parameters {
            let parameter_name = Some(parameter.name.as_str()).filter(|name| !name.is_empty());
            for attribute in &parameter.attributes {
                if self.classifier.classify(module, attribute, Marker::Binding)
                    || self.classifier.classify(module, attribute, Marker::OutputBinding)
                {
                    let built = self.builder.build(module, attribute, parameter_name, registry)?;
                    bindings.extend(built);
                }
            }
        }
        for attribute in &method.attributes {
            if self.classifier.classify(module, attribute, Marker::OutputBinding) {
                bindings.extend(self.builder.build(module, attribute, None, registry)?);
            }
        }
        descriptor.bindings = bindings.into_ordered();

        debug!(
            function = %descriptor.name,
            entry_point = %descriptor.entry_point,
            bindings = descriptor.bindings.len(),
            "Synthesized function descriptor"
        );
        Ok(Some(descriptor))
    }

    /// First constructor argument of the entry-point attribute, if non-blank
    fn function_name(
        &self,
        module: &Rc<Module>,
        attribute: &AttributeInstance,
    ) -> Result<Option<String>, BindingError> {
        let decoded = self
            .context
            .decode_attribute(module, attribute)
            .map_err(|source| BindingError::Decode {
                attribute: Marker::Function.full_name().to_string(),
                source,
            })?;
        Ok(decoded
            .arguments
            .first()
            .and_then(|argument| argument.value.as_str())
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string))
    }
}
