// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Remote-invocation contract metadata.
//!
//! Every remotely invokable operation is described by an explicit,
//! inspectable descriptor registered at startup. The transport layer
//! consults the registry to decide how to move an invocation: whether it
//! is synchronous, which parameters are addressing data versus payload,
//! where results and errors land, and which routing strategy picks the
//! destination. Nothing is discovered at call time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::sync::Protected;

/// Whether the caller blocks for the operation's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Synchronous,
    Asynchronous,
}

/// What a parameter means to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterRole {
    /// Addressing or association data, consumed for routing.
    Address,
    /// Payload serialized for transport.
    Serialize,
    /// Callback slot receiving the success result.
    ResultHandler,
    /// Callback slot receiving the failure.
    ErrorHandler,
}

/// Which routing strategy resolves the operation's destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKind {
    Addressed,
    Any,
    AggregateOrAddressed,
}

/// One named parameter and its transport role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub role: ParameterRole,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, role: ParameterRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

/// The complete transport contract of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// The interface the operation belongs to.
    pub interface: String,
    /// The operation name, unique within its interface.
    pub operation: String,
    pub mode: DispatchMode,
    /// Absent means the operation is dispatched locally only.
    pub routing: Option<RoutingKind>,
    pub parameters: Vec<ParameterDescriptor>,
}

impl OperationDescriptor {
    /// Checks internal consistency: at most one result handler and at most
    /// one error handler per operation.
    fn validate(&self) -> Result<()> {
        let handlers = |role: ParameterRole| {
            self.parameters
                .iter()
                .filter(|parameter| parameter.role == role)
                .count()
        };
        if handlers(ParameterRole::ResultHandler) > 1 {
            return Err(CoreError::bad_request(format!(
                "operation '{}.{}' declares more than one result handler",
                self.interface, self.operation
            )));
        }
        if handlers(ParameterRole::ErrorHandler) > 1 {
            return Err(CoreError::bad_request(format!(
                "operation '{}.{}' declares more than one error handler",
                self.interface, self.operation
            )));
        }
        Ok(())
    }

    /// The parameter filling `role`, if declared.
    pub fn parameter_with_role(&self, role: ParameterRole) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.role == role)
    }
}

/// The startup-populated table of operation descriptors.
#[derive(Default)]
pub struct OperationRegistry {
    descriptors: Protected<HashMap<(String, String), OperationDescriptor>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one descriptor. Re-registering an `(interface, operation)`
    /// pair is a bad request: the table is written once at startup and must
    /// stay unambiguous.
    pub fn register(&self, descriptor: OperationDescriptor) -> Result<()> {
        descriptor.validate()?;
        let key = (descriptor.interface.clone(), descriptor.operation.clone());
        let mut descriptors = self.descriptors.write();
        if descriptors.contains_key(&key) {
            return Err(CoreError::bad_request(format!(
                "operation '{}.{}' is already registered",
                key.0, key.1
            )));
        }
        descriptors.insert(key, descriptor);
        Ok(())
    }

    pub fn lookup(&self, interface: &str, operation: &str) -> Option<OperationDescriptor> {
        self.descriptors
            .read()
            .get(&(interface.to_string(), operation.to_string()))
            .cloned()
    }

    /// Every registered descriptor, ordered by interface then operation.
    pub fn descriptors(&self) -> Vec<OperationDescriptor> {
        let mut all: Vec<OperationDescriptor> =
            self.descriptors.read().values().cloned().collect();
        all.sort_by(|a, b| {
            a.interface
                .cmp(&b.interface)
                .then_with(|| a.operation.cmp(&b.operation))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> OperationDescriptor {
        OperationDescriptor {
            interface: "IndexContext".to_string(),
            operation: "link".to_string(),
            mode: DispatchMode::Asynchronous,
            routing: Some(RoutingKind::Addressed),
            parameters: vec![
                ParameterDescriptor::new("resourceId", ParameterRole::Address),
                ParameterDescriptor::new("destination", ParameterRole::Serialize),
                ParameterDescriptor::new("onSuccess", ParameterRole::ResultHandler),
                ParameterDescriptor::new("onFailure", ParameterRole::ErrorHandler),
            ],
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = OperationRegistry::new();
        registry.register(descriptor()).unwrap();

        let found = registry.lookup("IndexContext", "link").unwrap();
        assert_eq!(found, descriptor());
        assert_eq!(
            found
                .parameter_with_role(ParameterRole::ResultHandler)
                .unwrap()
                .name,
            "onSuccess"
        );
        assert!(registry.lookup("IndexContext", "unlink").is_none());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let registry = OperationRegistry::new();
        registry.register(descriptor()).unwrap();

        let err = registry.register(descriptor()).unwrap_err();
        assert_eq!(err.error_code(), "BAD_REQUEST");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_two_result_handlers_are_rejected() {
        let registry = OperationRegistry::new();
        let mut bad = descriptor();
        bad.parameters
            .push(ParameterDescriptor::new("extra", ParameterRole::ResultHandler));

        let err = registry.register(bad).unwrap_err();
        assert_eq!(err.error_code(), "BAD_REQUEST");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_descriptor_schema_is_inspectable() {
        let json = serde_json::to_value(descriptor()).unwrap();
        assert_eq!(json["mode"], "asynchronous");
        assert_eq!(json["routing"], "addressed");
        assert_eq!(json["parameters"][0]["role"], "address");

        let back: OperationDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, descriptor());
    }

    #[test]
    fn test_descriptors_are_ordered() {
        let registry = OperationRegistry::new();
        for operation in ["unlink", "link", "list"] {
            let mut d = descriptor();
            d.operation = operation.to_string();
            registry.register(d).unwrap();
        }

        let names: Vec<String> = registry
            .descriptors()
            .into_iter()
            .map(|d| d.operation)
            .collect();
        assert_eq!(names, vec!["link", "list", "unlink"]);
    }
}
