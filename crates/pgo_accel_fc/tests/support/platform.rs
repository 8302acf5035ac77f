#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pgo_accel_core::protocol::ActionRequest;
use pgo_accel_fc::adapters::function_compute::{
    FunctionCompute, FunctionSpec, InvocationMode, ServiceSpec, TriggerSpec,
};

/// In-memory function-compute platform. Serves the helper shim's actions from
/// a fixed archive and records every call in order.
pub struct FakePlatform {
    archive: Vec<u8>,
    dump_response: String,
    size_response: Option<String>,
    failing: BTreeSet<&'static str>,
    state: Mutex<PlatformState>,
}

#[derive(Default)]
struct PlatformState {
    calls: Vec<String>,
    services: BTreeSet<String>,
    functions: BTreeMap<String, BTreeSet<String>>,
    triggers: BTreeMap<(String, String), BTreeSet<String>>,
    aliases: BTreeMap<String, BTreeSet<String>>,
    versions: BTreeMap<String, BTreeSet<String>>,
    service_specs: Vec<ServiceSpec>,
    function_specs: Vec<FunctionSpec>,
    trigger_specs: Vec<TriggerSpec>,
    actions: Vec<(InvocationMode, BTreeMap<String, String>)>,
}

impl FakePlatform {
    pub fn serving(archive: Vec<u8>) -> Self {
        Self {
            archive,
            dump_response: "success".to_string(),
            size_response: None,
            failing: BTreeSet::new(),
            state: Mutex::new(PlatformState::default()),
        }
    }

    pub fn with_dump_response(mut self, response: impl Into<String>) -> Self {
        self.dump_response = response.into();
        self
    }

    /// Replaces the shim's answer to `type=size`.
    pub fn with_size_response(mut self, response: impl Into<String>) -> Self {
        self.size_response = Some(response.into());
        self
    }

    /// Makes the named operation (e.g. `create_function`) fail.
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Seeds a published version and alias on an existing service.
    pub fn publish(&self, service: &str, version: &str, alias: &str) {
        let mut state = self.lock();
        state
            .versions
            .entry(service.to_string())
            .or_default()
            .insert(version.to_string());
        state
            .aliases
            .entry(service.to_string())
            .or_default()
            .insert(alias.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Recorded calls of one operation, e.g. `delete_function`.
    pub fn calls_named(&self, operation: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .collect()
    }

    /// Position of the first call of `operation`, if any.
    pub fn first_call(&self, operation: &str) -> Option<usize> {
        self.calls()
            .iter()
            .position(|call| call.split(' ').next() == Some(operation))
    }

    pub fn live_services(&self) -> Vec<String> {
        self.lock().services.iter().cloned().collect()
    }

    pub fn live_function_count(&self) -> usize {
        self.lock().functions.values().map(BTreeSet::len).sum()
    }

    pub fn live_trigger_count(&self) -> usize {
        self.lock().triggers.values().map(BTreeSet::len).sum()
    }

    pub fn service_specs(&self) -> Vec<ServiceSpec> {
        self.lock().service_specs.clone()
    }

    pub fn function_specs(&self) -> Vec<FunctionSpec> {
        self.lock().function_specs.clone()
    }

    pub fn trigger_specs(&self) -> Vec<TriggerSpec> {
        self.lock().trigger_specs.clone()
    }

    /// Parsed bodies of every action call, in order.
    pub fn actions(&self) -> Vec<BTreeMap<String, String>> {
        self.lock()
            .actions
            .iter()
            .map(|(_, fields)| fields.clone())
            .collect()
    }

    pub fn action_modes(&self) -> Vec<InvocationMode> {
        self.lock().actions.iter().map(|(mode, _)| *mode).collect()
    }

    fn lock(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().expect("platform state poisoned")
    }

    fn enter(&self, operation: &'static str, detail: String) -> Result<(), String> {
        self.lock().calls.push(format!("{operation} {detail}"));
        if self.failing.contains(operation) {
            return Err(format!("{operation} rejected by fake platform"));
        }
        Ok(())
    }

    fn serve(&self, fields: &BTreeMap<String, String>) -> Result<String, String> {
        match fields.get("type").map(String::as_str) {
            Some("dump") => return Ok(self.dump_response.clone()),
            Some("size") => {
                return Ok(self
                    .size_response
                    .clone()
                    .unwrap_or_else(|| self.archive.len().to_string()))
            }
            _ => {}
        }
        let start: usize = fields
            .get("start")
            .and_then(|value| value.parse().ok())
            .ok_or("missing start")?;
        let size: usize = fields
            .get("size")
            .and_then(|value| value.parse().ok())
            .ok_or("missing size")?;
        let end = (start + size).min(self.archive.len());
        let slice = self.archive.get(start..end).ok_or("range out of bounds")?;
        Ok(BASE64.encode(slice))
    }
}

#[async_trait]
impl FunctionCompute for FakePlatform {
    async fn create_service(&self, spec: &ServiceSpec) -> Result<(), String> {
        self.enter("create_service", spec.service_name.clone())?;
        let mut state = self.lock();
        if !state.services.insert(spec.service_name.clone()) {
            return Err(format!("service {} already exists", spec.service_name));
        }
        state.service_specs.push(spec.clone());
        Ok(())
    }

    async fn create_function(&self, service: &str, spec: &FunctionSpec) -> Result<(), String> {
        self.enter("create_function", format!("{service}/{}", spec.function_name))?;
        let mut state = self.lock();
        if !state.services.contains(service) {
            return Err(format!("service {service} not found"));
        }
        state
            .functions
            .entry(service.to_string())
            .or_default()
            .insert(spec.function_name.clone());
        state.function_specs.push(spec.clone());
        Ok(())
    }

    async fn create_trigger(
        &self,
        service: &str,
        function: &str,
        spec: &TriggerSpec,
    ) -> Result<(), String> {
        self.enter("create_trigger", format!("{service}/{function}/{}", spec.trigger_name))?;
        let mut state = self.lock();
        let exists = state
            .functions
            .get(service)
            .is_some_and(|functions| functions.contains(function));
        if !exists {
            return Err(format!("function {service}/{function} not found"));
        }
        state
            .triggers
            .entry((service.to_string(), function.to_string()))
            .or_default()
            .insert(spec.trigger_name.clone());
        state.trigger_specs.push(spec.clone());
        Ok(())
    }

    async fn list_functions(&self, service: &str) -> Result<Vec<String>, String> {
        self.enter("list_functions", service.to_string())?;
        Ok(self
            .lock()
            .functions
            .get(service)
            .map(|functions| functions.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_triggers(&self, service: &str, function: &str) -> Result<Vec<String>, String> {
        self.enter("list_triggers", format!("{service}/{function}"))?;
        Ok(self
            .lock()
            .triggers
            .get(&(service.to_string(), function.to_string()))
            .map(|triggers| triggers.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_aliases(&self, service: &str) -> Result<Vec<String>, String> {
        self.enter("list_aliases", service.to_string())?;
        Ok(self
            .lock()
            .aliases
            .get(service)
            .map(|aliases| aliases.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_versions(&self, service: &str) -> Result<Vec<String>, String> {
        self.enter("list_versions", service.to_string())?;
        Ok(self
            .lock()
            .versions
            .get(service)
            .map(|versions| versions.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_trigger(
        &self,
        service: &str,
        function: &str,
        trigger: &str,
    ) -> Result<(), String> {
        self.enter("delete_trigger", format!("{service}/{function}/{trigger}"))?;
        let mut state = self.lock();
        let removed = state
            .triggers
            .get_mut(&(service.to_string(), function.to_string()))
            .is_some_and(|triggers| triggers.remove(trigger));
        if removed {
            Ok(())
        } else {
            Err(format!("trigger {trigger} not found"))
        }
    }

    async fn delete_alias(&self, service: &str, alias: &str) -> Result<(), String> {
        self.enter("delete_alias", format!("{service}/{alias}"))?;
        let mut state = self.lock();
        if let Some(aliases) = state.aliases.get_mut(service) {
            aliases.remove(alias);
        }
        Ok(())
    }

    async fn delete_version(&self, service: &str, version: &str) -> Result<(), String> {
        self.enter("delete_version", format!("{service}/{version}"))?;
        let mut state = self.lock();
        if state.aliases.get(service).is_some_and(|aliases| !aliases.is_empty()) {
            return Err(format!("version {version} is still referenced by an alias"));
        }
        if let Some(versions) = state.versions.get_mut(service) {
            versions.remove(version);
        }
        Ok(())
    }

    async fn delete_function(&self, service: &str, function: &str) -> Result<(), String> {
        self.enter("delete_function", format!("{service}/{function}"))?;
        let mut state = self.lock();
        let key = (service.to_string(), function.to_string());
        if state.triggers.get(&key).is_some_and(|triggers| !triggers.is_empty()) {
            return Err(format!("function {function} still has triggers"));
        }
        state.triggers.remove(&key);
        let removed = state
            .functions
            .get_mut(service)
            .is_some_and(|functions| functions.remove(function));
        if removed {
            Ok(())
        } else {
            Err(format!("function {function} not found"))
        }
    }

    async fn delete_service(&self, service: &str) -> Result<(), String> {
        self.enter("delete_service", service.to_string())?;
        let mut state = self.lock();
        if state.functions.get(service).is_some_and(|functions| !functions.is_empty()) {
            return Err(format!("service {service} is not empty"));
        }
        if state.versions.get(service).is_some_and(|versions| !versions.is_empty()) {
            return Err(format!("service {service} still has versions"));
        }
        state.functions.remove(service);
        if state.services.remove(service) {
            Ok(())
        } else {
            Err(format!("service {service} not found"))
        }
    }

    async fn call_action(
        &self,
        service: &str,
        function: &str,
        mode: InvocationMode,
        body: &str,
    ) -> Result<String, String> {
        self.enter("call_action", format!("{service}/{function}"))?;
        let fields = ActionRequest::parse(body);
        {
            let mut state = self.lock();
            let deployed = state
                .functions
                .get(service)
                .is_some_and(|functions| functions.contains(function));
            if !deployed {
                return Err(format!("function {service}/{function} not found"));
            }
            if mode == InvocationMode::HttpTrigger
                && state
                    .triggers
                    .get(&(service.to_string(), function.to_string()))
                    .map_or(true, BTreeSet::is_empty)
            {
                return Err("no http trigger to route the request".to_string());
            }
            state.actions.push((mode, fields.clone()));
        }
        self.serve(&fields)
    }
}
