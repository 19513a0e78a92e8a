// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Managed single-use invocations.
//!
//! A handler invocation creates a transient resource at a hidden path,
//! dispatches one method, and destroys the resource again — on success, on
//! failure, and on timeout alike. The context owns the transient resource's
//! whole lifecycle; the caller only ever sees the result.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lattice_cluster::{Path, ResourceId};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::module::ModuleLoader;
use crate::service::ResourceService;

/// Runs one-shot methods on transient resources with a bounded wait.
pub struct HandlerContext {
    service: Arc<ResourceService>,
    loader: Arc<dyn ModuleLoader>,
    timeout: Duration,
}

impl HandlerContext {
    pub fn new(
        service: Arc<ResourceService>,
        loader: Arc<dyn ModuleLoader>,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            loader,
            timeout,
        }
    }

    /// Creates a transient resource of `module`, dispatches `method` on it,
    /// and waits for completion up to the configured timeout.
    ///
    /// The transient resource lives at a hidden path the caller never
    /// learns and is destroyed whatever the outcome. The whole lifecycle
    /// runs on its own spawned task: a caller that abandons this future
    /// abandons only the wait, never the destroy. A wait that exceeds the
    /// timeout fails with [`CoreError::HandlerTimeout`]; the destroy still
    /// happens.
    #[instrument(skip(self, args, method_args), fields(module = module, method = method))]
    pub async fn invoke_single_use(
        &self,
        module: &str,
        args: &[Value],
        method: &str,
        method_args: Vec<Value>,
    ) -> Result<Value> {
        let service = Arc::clone(&self.service);
        let loader = Arc::clone(&self.loader);
        let timeout = self.timeout;
        let module = module.to_string();
        let args = args.to_vec();
        let method = method.to_string();

        let lifecycle = tokio::spawn(async move {
            run_single_use(&service, loader.as_ref(), timeout, &module, &args, &method, method_args)
                .await
        });
        match lifecycle.await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(CoreError::internal(join_error)),
        }
    }
}

async fn run_single_use(
    service: &ResourceService,
    loader: &dyn ModuleLoader,
    timeout: Duration,
    module: &str,
    args: &[Value],
    method: &str,
    method_args: Vec<Value>,
) -> Result<Value> {
    let path = transient_path();
    let resource_id = service.create(loader, &path, module, args)?;

    let (tx, rx) = oneshot::channel::<Result<Value>>();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let result_tx = Arc::clone(&tx);
    let error_tx = Arc::clone(&tx);
    let dispatched = service
        .invoke_with_listeners(
            resource_id,
            method,
            method_args,
            move |value| send_outcome(&result_tx, Ok(value)),
            move |error| send_outcome(&error_tx, Err(error)),
        )
        .await;

    if let Err(error) = dispatched {
        destroy_transient(service, resource_id);
        return Err(error);
    }

    let outcome = match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => Err(CoreError::internal(
            "handler completion listener dropped without resolving",
        )),
        Err(_) => Err(CoreError::HandlerTimeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    };

    destroy_transient(service, resource_id);
    outcome
}

fn destroy_transient(service: &ResourceService, resource_id: ResourceId) {
    if let Err(error) = service.destroy(resource_id) {
        warn!(resource_id = %resource_id, %error, "failed to destroy transient handler resource");
    }
}

fn send_outcome(tx: &Arc<Mutex<Option<oneshot::Sender<Result<Value>>>>>, outcome: Result<Value>) {
    let taken = tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
    if let Some(tx) = taken {
        // The receiver may already have timed out; nothing left to tell it.
        let _ = tx.send(outcome);
    }
}

fn transient_path() -> Path {
    // Infallible: two fixed components without separators or wildcards.
    let suffix = Uuid::new_v4().to_string();
    Path::from_components(["handler", suffix.as_str()]).unwrap_or_else(|_| Path::root())
}
