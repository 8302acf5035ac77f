use std::collections::BTreeMap;

use async_trait::async_trait;
use pgo_accel_core::config::{LogConfig, ServiceNasConfig, VpcConfig};
use serde::Serialize;

/// How the helper shim inside the temporary function is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Through the anonymous HTTP trigger, `POST /proxy/<service>/<function>/action`.
    HttpTrigger,
    /// Synchronous function invocation with the action as the event payload.
    Direct,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    pub service_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_config: Option<LogConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_config: Option<VpcConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_config: Option<ServiceNasConfig>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCode {
    /// Base64 of the code zip.
    pub zip_file: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    pub function_name: String,
    pub description: String,
    pub code: FunctionCode,
    pub handler: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initializer: Option<String>,
    pub memory_size: u32,
    pub runtime: String,
    pub timeout: u32,
    pub initialization_timeout: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    pub environment_variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpTriggerConfig {
    pub auth_type: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    pub trigger_name: String,
    pub trigger_type: String,
    pub trigger_config: HttpTriggerConfig,
    pub qualifier: String,
    pub invocation_role: String,
    pub source_arn: String,
}

impl TriggerSpec {
    /// Anonymous HTTP trigger pinned to the latest version.
    pub fn anonymous_http(name: impl Into<String>, methods: &[&str]) -> Self {
        Self {
            trigger_name: name.into(),
            trigger_type: "http".to_string(),
            trigger_config: HttpTriggerConfig {
                auth_type: "anonymous".to_string(),
                methods: methods.iter().map(|method| method.to_string()).collect(),
            },
            qualifier: "LATEST".to_string(),
            invocation_role: String::new(),
            source_arn: "test".to_string(),
        }
    }
}

/// Function-compute operations a run needs. Errors are reported as text and
/// classified by the caller.
#[async_trait]
pub trait FunctionCompute: Send + Sync {
    async fn create_service(&self, spec: &ServiceSpec) -> Result<(), String>;

    async fn create_function(&self, service: &str, spec: &FunctionSpec) -> Result<(), String>;

    async fn create_trigger(
        &self,
        service: &str,
        function: &str,
        spec: &TriggerSpec,
    ) -> Result<(), String>;

    async fn list_functions(&self, service: &str) -> Result<Vec<String>, String>;

    async fn list_triggers(&self, service: &str, function: &str) -> Result<Vec<String>, String>;

    async fn list_aliases(&self, service: &str) -> Result<Vec<String>, String>;

    async fn list_versions(&self, service: &str) -> Result<Vec<String>, String>;

    async fn delete_trigger(&self, service: &str, function: &str, trigger: &str)
        -> Result<(), String>;

    async fn delete_alias(&self, service: &str, alias: &str) -> Result<(), String>;

    async fn delete_version(&self, service: &str, version: &str) -> Result<(), String>;

    async fn delete_function(&self, service: &str, function: &str) -> Result<(), String>;

    async fn delete_service(&self, service: &str) -> Result<(), String>;

    /// Sends one action body to the helper shim and returns the response text.
    async fn call_action(
        &self,
        service: &str,
        function: &str,
        mode: InvocationMode,
        body: &str,
    ) -> Result<String, String>;
}
