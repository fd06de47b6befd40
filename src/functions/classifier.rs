//! Attribute classification by base-type ancestry

use std::rc::Rc;

use tracing::trace;

use super::markers::Marker;
use crate::loader::{ModuleContext, ResolvedType};
use crate::metadata::{AttributeInstance, Module};

/// Longest base-type chain walked before giving up on malformed metadata
const MAX_BASE_CHAIN: usize = 64;

/// Decides whether attribute types derive from a [`Marker`]
#[derive(Debug, Clone, Copy)]
pub struct AttributeClassifier<'c> {
    context: &'c ModuleContext,
}

impl<'c> AttributeClassifier<'c> {
    pub fn new(context: &'c ModuleContext) -> Self {
        Self { context }
    }

    /// Whether `attribute`, declared in `module`, is or derives from `marker`
    ///
    /// Unresolvable types anywhere on the chain yield `false`.
    pub fn classify(
        &self,
        module: &Rc<Module>,
        attribute: &AttributeInstance,
        marker: Marker,
    ) -> bool {
        match self.context.attribute_type(module, attribute) {
            Some(resolved) => self.derives_from(resolved, marker),
            None => false,
        }
    }

    /// Walks the base-type chain starting at `resolved` itself
    pub fn derives_from(&self, resolved: ResolvedType, marker: Marker) -> bool {
        let target = marker.full_name();
        let mut current = resolved;
        for _ in 0..MAX_BASE_CHAIN {
            if current.full_name() == target {
                return true;
            }
            let Some(base) = current.record().base else {
                return false;
            };
            match self.context.resolve_type(&current.module, base) {
                Some(next) => current = next,
                None => {
                    trace!(
                        type_name = %current.full_name(),
                        marker = %marker,
                        "Base type unresolvable, not classified"
                    );
                    return false;
                }
            }
        }
        trace!(marker = %marker, "Base-type chain too long, not classified");
        false
    }
}
