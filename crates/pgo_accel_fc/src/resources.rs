//! Lifecycle of the temporary service, function and trigger of one run.

use std::sync::Arc;

use futures::future::join_all;
use pgo_accel_core::{PgoError, Result};
use tracing::{info, warn};

use crate::adapters::function_compute::{FunctionCompute, FunctionSpec, ServiceSpec, TriggerSpec};

/// Names of what this run has created so far. A field is only set after the
/// matching create call succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TempResourceHandle {
    pub service: Option<String>,
    pub function: Option<String>,
    pub trigger: Option<String>,
}

impl TempResourceHandle {
    pub fn is_empty(&self) -> bool {
        self.service.is_none() && self.function.is_none() && self.trigger.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionHandle {
    pub service: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerHandle {
    pub service: String,
    pub function: String,
    pub name: String,
}

pub struct TransientResourceManager {
    client: Arc<dyn FunctionCompute>,
    handle: TempResourceHandle,
}

impl TransientResourceManager {
    pub fn new(client: Arc<dyn FunctionCompute>) -> Self {
        Self {
            client,
            handle: TempResourceHandle::default(),
        }
    }

    pub fn handle(&self) -> &TempResourceHandle {
        &self.handle
    }

    pub async fn create_service(&mut self, spec: &ServiceSpec) -> Result<ServiceHandle> {
        let name = spec.service_name.clone();
        self.client
            .create_service(spec)
            .await
            .map_err(|message| PgoError::provision(format!("service {name}"), message))?;
        self.handle.service = Some(name.clone());
        info!(component = "resources", event = "service_created", service = %name);
        Ok(ServiceHandle { name })
    }

    pub async fn create_function(
        &mut self,
        service: &ServiceHandle,
        spec: &FunctionSpec,
    ) -> Result<FunctionHandle> {
        let name = spec.function_name.clone();
        self.client
            .create_function(&service.name, spec)
            .await
            .map_err(|message| PgoError::provision(format!("function {name}"), message))?;
        self.handle.function = Some(name.clone());
        info!(
            component = "resources",
            event = "function_created",
            service = %service.name,
            function = %name,
            runtime = %spec.runtime
        );
        Ok(FunctionHandle {
            service: service.name.clone(),
            name,
        })
    }

    pub async fn create_http_trigger(
        &mut self,
        function: &FunctionHandle,
        name: &str,
        methods: &[&str],
    ) -> Result<TriggerHandle> {
        let spec = TriggerSpec::anonymous_http(name, methods);
        self.client
            .create_trigger(&function.service, &function.name, &spec)
            .await
            .map_err(|message| PgoError::provision(format!("trigger {name}"), message))?;
        self.handle.trigger = Some(name.to_string());
        info!(
            component = "resources",
            event = "trigger_created",
            function = %function.name,
            trigger = %name,
            methods = ?methods
        );
        Ok(TriggerHandle {
            service: function.service.clone(),
            function: function.name.clone(),
            name: name.to_string(),
        })
    }

    /// Deletes everything under the temporary service, then the service.
    /// Never fails; the handle is empty afterwards so a repeat call is a no-op.
    pub async fn cleanup(&mut self) {
        let handle = std::mem::take(&mut self.handle);
        let Some(service) = handle.service.as_deref() else {
            return;
        };
        let client = self.client.as_ref();

        let functions = match handle.function.as_deref() {
            Some(recorded) => {
                let functions = match client.list_functions(service).await {
                    Ok(names) => names,
                    Err(error) => {
                        warn_failure("list_functions", service, &error);
                        vec![recorded.to_string()]
                    }
                };
                self.delete_triggers(service, &functions, &handle).await;
                functions
            }
            None => Vec::new(),
        };

        let aliases = listed_or_empty("list_aliases", service, client.list_aliases(service).await);
        let results = join_all(aliases.iter().map(|alias| async move {
            (alias, client.delete_alias(service, alias).await)
        }))
        .await;
        report("delete_alias", results);

        let versions = listed_or_empty("list_versions", service, client.list_versions(service).await);
        let results = join_all(versions.iter().map(|version| async move {
            (version, client.delete_version(service, version).await)
        }))
        .await;
        report("delete_version", results);

        let results = join_all(functions.iter().map(|function| async move {
            (function, client.delete_function(service, function).await)
        }))
        .await;
        report("delete_function", results);

        match client.delete_service(service).await {
            Ok(()) => info!(component = "resources", event = "service_deleted", service = %service),
            Err(error) => warn_failure("delete_service", service, &error),
        }
    }

    async fn delete_triggers(&self, service: &str, functions: &[String], handle: &TempResourceHandle) {
        let client = self.client.as_ref();
        let mut targets: Vec<(String, String)> = Vec::new();
        for function in functions {
            let triggers = match client.list_triggers(service, function).await {
                Ok(names) => names,
                Err(error) => {
                    warn_failure("list_triggers", function, &error);
                    match (&handle.function, &handle.trigger) {
                        (Some(recorded), Some(trigger)) if recorded == function => {
                            vec![trigger.clone()]
                        }
                        _ => Vec::new(),
                    }
                }
            };
            targets.extend(triggers.into_iter().map(|trigger| (function.clone(), trigger)));
        }

        let results = join_all(targets.iter().map(|(function, trigger)| async move {
            (trigger, client.delete_trigger(service, function, trigger).await)
        }))
        .await;
        report("delete_trigger", results);
    }
}

fn listed_or_empty(
    operation: &str,
    service: &str,
    listed: std::result::Result<Vec<String>, String>,
) -> Vec<String> {
    listed.unwrap_or_else(|error| {
        warn_failure(operation, service, &error);
        Vec::new()
    })
}

fn report(operation: &str, results: Vec<(&String, std::result::Result<(), String>)>) {
    for (name, result) in results {
        if let Err(error) = result {
            warn_failure(operation, name, &error);
        }
    }
}

fn warn_failure(operation: &str, resource: &str, error: &str) {
    warn!(
        component = "resources",
        event = "cleanup_step_failed",
        operation,
        resource,
        error,
        "temporary resource may need manual removal"
    );
}
