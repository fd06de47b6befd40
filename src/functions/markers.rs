//! Well-known attribute types and descriptor constants

use std::fmt;

/// Language tag stamped on every function descriptor
pub const LANGUAGE: &str = "dotnet-isolated";

/// Property seeded into every descriptor's property bag
pub const IS_CODELESS: &str = "IsCodeless";

/// Binding appended after any HTTP trigger
pub const RETURN_BINDING_NAME: &str = "$return";
pub const HTTP_RETURN_TYPE: &str = "http";
pub const HTTP_TRIGGER_TAG: &str = "httptrigger";

/// Base attribute types that drive classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Marks a method as a function entry point
    Function,
    /// Base of every trigger, input and output binding attribute
    Binding,
    /// Base of output binding attributes
    OutputBinding,
    /// Assembly-level attribute naming the extension package
    ExtensionInformation,
}

impl Marker {
    pub const fn full_name(self) -> &'static str {
        match self {
            Marker::Function => "Microsoft.Azure.Functions.Worker.FunctionAttribute",
            Marker::Binding => {
                "Microsoft.Azure.Functions.Worker.Extensions.Abstractions.BindingAttribute"
            }
            Marker::OutputBinding => {
                "Microsoft.Azure.Functions.Worker.Extensions.Abstractions.OutputBindingAttribute"
            }
            Marker::ExtensionInformation => {
                "Microsoft.Azure.Functions.Worker.Extensions.Abstractions.ExtensionInformationAttribute"
            }
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}

/// Binding type tag derived from an attribute's short type name
///
/// `HttpTriggerAttribute` becomes `HttpTrigger`, `BlobInputAttribute` becomes
/// `Blob` and `QueueOutputAttribute` becomes `Queue`. Replacements are
/// literal and apply anywhere in the name, not only as a suffix.
pub fn binding_type_tag(attribute_name: &str) -> String {
    attribute_name
        .replace("TriggerAttribute", "Trigger")
        .replace("InputAttribute", "")
        .replace("OutputAttribute", "")
}
