//! Binding descriptors and the builder that derives them from attributes

use std::fmt;
use std::rc::Rc;

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::classifier::AttributeClassifier;
use super::extensions::ExtensionRegistry;
use super::markers::{
    binding_type_tag, Marker, HTTP_RETURN_TYPE, HTTP_TRIGGER_TAG, RETURN_BINDING_NAME,
};
use crate::loader::{ModuleContext, ResolvedType};
use crate::metadata::{AttributeInstance, MetadataError, Module};

/// Data-flow direction of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "In",
            Direction::Out => "Out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while turning attributes into bindings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    /// Two values were declared under the same binding property
    #[error("Duplicate binding property '{key}'")]
    DuplicateProperty { key: String },

    /// An attribute's argument blob could not be decoded
    #[error("Failed to decode {attribute}: {source}")]
    Decode {
        attribute: String,
        #[source]
        source: MetadataError,
    },
}

/// Insertion-ordered property bag describing one binding
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct BindingDescriptor {
    properties: IndexMap<String, Value>,
}

impl BindingDescriptor {
    pub const NAME: &'static str = "Name";
    pub const TYPE: &'static str = "Type";
    pub const DIRECTION: &'static str = "Direction";

    /// Starts a bag with `Name` (when given), `Type` and `Direction`
    pub fn new(name: Option<&str>, binding_type: &str, direction: Direction) -> Self {
        let mut properties = IndexMap::new();
        if let Some(name) = name {
            properties.insert(Self::NAME.to_string(), Value::from(name));
        }
        properties.insert(Self::TYPE.to_string(), Value::from(binding_type));
        properties.insert(Self::DIRECTION.to_string(), Value::from(direction.as_str()));
        Self { properties }
    }

    /// Adds a property, rejecting keys already present
    pub fn try_insert(
        &mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), BindingError> {
        match self.properties.entry(key.into()) {
            Entry::Occupied(entry) => Err(BindingError::DuplicateProperty {
                key: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn name(&self) -> Option<&str> {
        self.get(Self::NAME).and_then(Value::as_str)
    }

    pub fn binding_type(&self) -> Option<&str> {
        self.get(Self::TYPE).and_then(Value::as_str)
    }

    pub fn direction(&self) -> Option<Direction> {
        match self.get(Self::DIRECTION).and_then(Value::as_str) {
            Some("In") => Some(Direction::In),
            Some("Out") => Some(Direction::Out),
            _ => None,
        }
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }
}

/// Converts classified binding attributes into [`BindingDescriptor`]s
pub struct BindingBuilder<'c> {
    context: &'c ModuleContext,
    classifier: AttributeClassifier<'c>,
}

impl<'c> BindingBuilder<'c> {
    pub fn new(context: &'c ModuleContext) -> Self {
        Self {
            context,
            classifier: AttributeClassifier::new(context),
        }
    }

    /// Builds the binding(s) for one attribute declared in `module`
    ///
    /// Returns the attribute's own binding, followed by the implicit HTTP
    /// return binding for HTTP triggers. The extension declared by the
    /// attribute's assembly is recorded in `registry`.
    pub fn build(
        &self,
        module: &Rc<Module>,
        attribute: &AttributeInstance,
        parameter_name: Option<&str>,
        registry: &mut ExtensionRegistry,
    ) -> Result<Vec<BindingDescriptor>, BindingError> {
        let Some(resolved) = self.context.attribute_type(module, attribute) else {
            return Ok(Vec::new());
        };
        let attribute_name = resolved.record().name.clone();
        let binding_type = binding_type_tag(&attribute_name);
        let direction = if self.classifier.classify(module, attribute, Marker::OutputBinding) {
            Direction::Out
        } else {
            Direction::In
        };

        let mut binding = BindingDescriptor::new(parameter_name, &binding_type, direction);
        let decoded = self
            .context
            .decode_attribute(module, attribute)
            .map_err(|source| BindingError::Decode {
                attribute: resolved.full_name().to_string(),
                source,
            })?;
        for argument in &decoded.arguments {
            match &argument.name {
                Some(name) => binding.try_insert(name.clone(), Value::from(&argument.value))?,
                None => warn!(
                    attribute = %resolved.full_name(),
                    "Constructor parameter name unavailable, argument omitted"
                ),
            }
        }
        for named in &decoded.named {
            binding.try_insert(named.name.clone(), Value::from(&named.value))?;
        }

        debug!(
            binding_type = %binding_type,
            direction = %direction,
            name = parameter_name.unwrap_or(""),
            properties = binding.properties().len(),
            "Built binding"
        );

        let mut bindings = vec![binding];
        if binding_type.eq_ignore_ascii_case(HTTP_TRIGGER_TAG) {
            bindings.push(BindingDescriptor::new(
                Some(RETURN_BINDING_NAME),
                HTTP_RETURN_TYPE,
                Direction::Out,
            ));
        }

        self.record_extension(&resolved, registry)?;
        Ok(bindings)
    }

    /// Upserts the extension declared by the assembly owning `attribute_type`
    ///
    /// Only the first extension information attribute of an assembly counts.
    fn record_extension(
        &self,
        attribute_type: &ResolvedType,
        registry: &mut ExtensionRegistry,
    ) -> Result<(), BindingError> {
        let origin = &attribute_type.module;
        let Some(info) = origin.assembly_attributes().iter().find(|attribute| {
            self.classifier
                .classify(origin, attribute, Marker::ExtensionInformation)
        }) else {
            return Ok(());
        };

        let decoded = self
            .context
            .decode_attribute(origin, info)
            .map_err(|source| BindingError::Decode {
                attribute: Marker::ExtensionInformation.full_name().to_string(),
                source,
            })?;
        let mut values = decoded.arguments.iter().map(|argument| argument.value.as_str());
        match (values.next().flatten(), values.next().flatten()) {
            (Some(name), Some(version)) => {
                if let Some(previous) = registry.upsert(name, version) {
                    if previous != version {
                        debug!(
                            extension = %name,
                            previous = %previous,
                            version = %version,
                            "Extension version replaced"
                        );
                    }
                }
            }
            _ => debug!(
                assembly = %origin.assembly_name(),
                "Extension information attribute without name and version"
            ),
        }
        Ok(())
    }
}
