//! Resource descriptor attached to every exported batch.

use crate::attributes::{AttributeValue, Attributes};
use crate::config::TelemetryConfig;

/// Attribute key carrying the service name.
pub const SERVICE_NAME: &str = "service.name";

/// Immutable service identity shared by all batches of an exporter.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    attributes: Attributes,
}

impl Resource {
    /// Builds the resource from the config and the common attributes known at
    /// construction. `service.name` always comes from the config, even if the
    /// common attributes carry one.
    pub fn build(config: &TelemetryConfig, common: &Attributes) -> Self {
        let identity = Attributes::builder()
            .put(SERVICE_NAME, config.service_name.as_str())
            .build();

        Self {
            attributes: Attributes::merge(common, &identity),
        }
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn service_name(&self) -> &str {
        match self.attributes.get(SERVICE_NAME) {
            Some(AttributeValue::String(name)) => name,
            _ => "",
        }
    }
}
