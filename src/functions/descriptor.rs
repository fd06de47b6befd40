//! Function descriptor records

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use super::binding::{BindingDescriptor, Direction};
use super::markers::{IS_CODELESS, LANGUAGE};

/// Everything the host needs to invoke one function entry point
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescriptor {
    pub name: String,
    /// `<AssemblyName>.dll`
    pub script_file: String,
    /// `<FullDeclaringTypeName>.<MethodName>`
    pub entry_point: String,
    pub language: String,
    pub properties: IndexMap<String, Value>,
    pub bindings: Vec<BindingDescriptor>,
}

impl FunctionDescriptor {
    pub fn new(
        name: impl Into<String>,
        assembly_name: &str,
        declaring_type: &str,
        method: &str,
    ) -> Self {
        let mut properties = IndexMap::new();
        properties.insert(IS_CODELESS.to_string(), Value::Bool(false));
        Self {
            name: name.into(),
            script_file: format!("{}.dll", assembly_name),
            entry_point: format!("{}.{}", declaring_type, method),
            language: LANGUAGE.to_string(),
            properties,
            bindings: Vec::new(),
        }
    }

    pub fn input_bindings(&self) -> impl Iterator<Item = &BindingDescriptor> {
        self.bindings_with(Direction::In)
    }

    pub fn output_bindings(&self) -> impl Iterator<Item = &BindingDescriptor> {
        self.bindings_with(Direction::Out)
    }

    fn bindings_with(&self, direction: Direction) -> impl Iterator<Item = &BindingDescriptor> {
        self.bindings
            .iter()
            .filter(move |binding| binding.direction() == Some(direction))
    }
}
