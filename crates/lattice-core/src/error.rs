// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for lattice-core.
//!
//! One variant per failure kind of the cluster-facing contexts. Asynchronous
//! APIs deliver these through their returned futures; nothing is ever
//! silently dropped. `Internal` wraps interrupted waits and foreign causes
//! at the boundary.

use lattice_cluster::{IdError, PathError, ResourceId, TaskId};
use thiserror::Error;

/// Result type using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during request processing.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Malformed invocation, rejected before dispatch. Never retried.
    #[error("bad request: {reason}")]
    BadRequest {
        /// What was malformed.
        reason: String,
    },

    /// Raised to any task still outstanding on a resource being destroyed.
    #[error("resource '{resource_id}' destroyed")]
    ResourceDestroyed {
        /// The destroyed resource.
        resource_id: ResourceId,
    },

    /// The addressed resource is not present in the service. `what` is the
    /// resource id or path the lookup used.
    #[error("resource not found: {what}")]
    ResourceNotFound {
        /// The identifier or path that failed to resolve.
        what: String,
    },

    /// A named module cannot be resolved by the module loader.
    #[error("module '{module}' not found")]
    ModuleNotFound {
        /// The module name that failed to resolve.
        module: String,
    },

    /// A named method does not exist on the dispatched resource.
    #[error("method '{method}' not found on resource '{resource_id}'")]
    MethodNotFound {
        /// The dispatched resource.
        resource_id: ResourceId,
        /// The method name that failed to resolve.
        method: String,
    },

    /// A listener pair is already registered for the task.
    #[error("task '{task_id}' already has listeners registered")]
    DuplicateTask {
        /// The task id that was registered twice.
        task_id: TaskId,
    },

    /// Routing found no destination. An empty destination set is an error,
    /// never a no-op.
    #[error("no nodes available for routing")]
    NoNodesAvailable,

    /// A managed handler invocation exceeded its allotted time. The
    /// transient resource is destroyed regardless.
    #[error("handler timed out after {timeout_ms} ms")]
    HandlerTimeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// A payload or header cannot be converted to the requested type.
    #[error("cannot convert {what}: {details}")]
    InvalidConversion {
        /// What was being converted.
        what: String,
        /// The underlying conversion failure.
        details: String,
    },

    /// Catch-all wrapper for interrupted waits and unexpected causes.
    #[error("internal error: {details}")]
    Internal {
        /// The underlying cause.
        details: String,
    },
}

impl CoreError {
    /// Constructs a `BadRequest` from anything printable.
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    /// Constructs a `ResourceNotFound` from an id or path.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::ResourceNotFound {
            what: what.to_string(),
        }
    }

    /// Constructs an `Internal` from anything printable.
    pub fn internal(details: impl std::fmt::Display) -> Self {
        Self::Internal {
            details: details.to_string(),
        }
    }

    /// Stable code string for this error kind, preserved across transports.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::ResourceDestroyed { .. } => "RESOURCE_DESTROYED",
            Self::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
            Self::ModuleNotFound { .. } => "MODULE_NOT_FOUND",
            Self::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            Self::DuplicateTask { .. } => "DUPLICATE_TASK",
            Self::NoNodesAvailable => "NO_NODES_AVAILABLE",
            Self::HandlerTimeout { .. } => "HANDLER_TIMEOUT",
            Self::InvalidConversion { .. } => "INVALID_CONVERSION",
            Self::Internal { .. } => "INTERNAL",
        }
    }
}

impl From<PathError> for CoreError {
    fn from(err: PathError) -> Self {
        CoreError::BadRequest {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::internal(err)
    }
}

impl From<IdError> for CoreError {
    fn from(err: IdError) -> Self {
        CoreError::BadRequest {
            reason: err.to_string(),
        }
    }
}
