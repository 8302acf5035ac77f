//! REST client for the function-compute control and invocation API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use pgo_accel_core::config::Credentials;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::adapters::function_compute::{
    FunctionCompute, FunctionSpec, InvocationMode, ServiceSpec, TriggerSpec,
};

pub const API_VERSION: &str = "2016-08-15";
const LIST_LIMIT: &str = "100";
const CANONICAL_HEADER_PREFIX: &str = "x-fc-";

type HmacSha256 = Hmac<Sha256>;

pub struct FcHttpClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl FcHttpClient {
    pub fn new(credentials: Credentials, region: &str, endpoint: Option<&str>) -> Result<Self, String> {
        let base_url = match endpoint.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) if value.starts_with("http://") || value.starts_with("https://") => {
                value.trim_end_matches('/').to_string()
            }
            Some(value) => format!("https://{}", value.trim_end_matches('/')),
            None => format!(
                "https://{}.{region}.fc.aliyuncs.com",
                credentials.account_id
            ),
        };
        let http = reqwest::Client::builder()
            .build()
            .map_err(|error| format!("failed to build http client: {error}"))?;
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<(Vec<u8>, &str)>,
        extra_headers: &[(&str, &str)],
    ) -> Result<(BTreeMap<String, String>, String), String> {
        let full_path = format!("/{API_VERSION}{path}");
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), "application/json".to_string());
        headers.insert(
            "date".to_string(),
            Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
        headers.insert(
            "x-fc-account-id".to_string(),
            self.credentials.account_id.clone(),
        );
        for (key, value) in extra_headers {
            headers.insert(key.to_ascii_lowercase(), value.to_string());
        }
        if let Some((bytes, content_type)) = &body {
            headers.insert("content-type".to_string(), content_type.to_string());
            headers.insert("content-md5".to_string(), content_md5(bytes));
        }

        let query: Vec<(String, String)> = query
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        let string_to_sign = compose_string_to_sign(method.as_str(), &full_path, &headers, &query);
        let signature = sign(&self.credentials.access_key_secret, &string_to_sign)?;
        headers.insert(
            "authorization".to_string(),
            format!("FC {}:{signature}", self.credentials.access_key_id),
        );

        let mut request = self
            .http
            .request(method.clone(), format!("{}{full_path}", self.base_url))
            .query(&query);
        for (key, value) in &headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some((bytes, _)) = body {
            request = request.body(bytes);
        }

        debug!(component = "fc_http", method = %method, path = %full_path, "request");
        let response = request
            .send()
            .await
            .map_err(|error| format!("{method} {full_path} failed: {error}"))?;
        let status = response.status();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|text| (name.as_str().to_ascii_lowercase(), text.to_string()))
            })
            .collect();
        let text = response
            .text()
            .await
            .map_err(|error| format!("{method} {full_path} body unreadable: {error}"))?;
        if !status.is_success() {
            return Err(format!("{method} {full_path} returned {status}: {text}"));
        }
        Ok((response_headers, text))
    }

    async fn send_json(
        &self,
        method: Method,
        path: &str,
        payload: &impl Serialize,
    ) -> Result<(), String> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|error| format!("failed to serialize request for {path}: {error}"))?;
        self.send(method, path, &[], Some((bytes, "application/json")), &[])
            .await
            .map(|_| ())
    }

    async fn delete(&self, path: &str) -> Result<(), String> {
        self.send(Method::DELETE, path, &[], None, &[])
            .await
            .map(|_| ())
    }

    async fn list_names<T: DeserializeOwned + Listing>(&self, path: &str) -> Result<Vec<String>, String> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut query = vec![("limit", LIST_LIMIT)];
            if let Some(token) = next_token.as_deref() {
                query.push(("nextToken", token));
            }
            let (_, text) = self.send(Method::GET, path, &query, None, &[]).await?;
            let page: T = serde_json::from_str(&text)
                .map_err(|error| format!("malformed listing from {path}: {error}"))?;
            let (page_names, token) = page.into_names();
            names.extend(page_names);
            match token.filter(|value| !value.is_empty()) {
                Some(token) => next_token = Some(token),
                None => return Ok(names),
            }
        }
    }
}

trait Listing {
    fn into_names(self) -> (Vec<String>, Option<String>);
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionListing {
    #[serde(default)]
    functions: Vec<FunctionEntry>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionEntry {
    function_name: String,
}

impl Listing for FunctionListing {
    fn into_names(self) -> (Vec<String>, Option<String>) {
        (
            self.functions.into_iter().map(|entry| entry.function_name).collect(),
            self.next_token,
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerListing {
    #[serde(default)]
    triggers: Vec<TriggerEntry>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerEntry {
    trigger_name: String,
}

impl Listing for TriggerListing {
    fn into_names(self) -> (Vec<String>, Option<String>) {
        (
            self.triggers.into_iter().map(|entry| entry.trigger_name).collect(),
            self.next_token,
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AliasListing {
    #[serde(default)]
    aliases: Vec<AliasEntry>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AliasEntry {
    alias_name: String,
}

impl Listing for AliasListing {
    fn into_names(self) -> (Vec<String>, Option<String>) {
        (
            self.aliases.into_iter().map(|entry| entry.alias_name).collect(),
            self.next_token,
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionListing {
    #[serde(default)]
    versions: Vec<VersionEntry>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionEntry {
    version_id: String,
}

impl Listing for VersionListing {
    fn into_names(self) -> (Vec<String>, Option<String>) {
        (
            self.versions.into_iter().map(|entry| entry.version_id).collect(),
            self.next_token,
        )
    }
}

#[async_trait]
impl FunctionCompute for FcHttpClient {
    async fn create_service(&self, spec: &ServiceSpec) -> Result<(), String> {
        self.send_json(Method::POST, "/services", spec).await
    }

    async fn create_function(&self, service: &str, spec: &FunctionSpec) -> Result<(), String> {
        self.send_json(Method::POST, &format!("/services/{service}/functions"), spec)
            .await
    }

    async fn create_trigger(
        &self,
        service: &str,
        function: &str,
        spec: &TriggerSpec,
    ) -> Result<(), String> {
        self.send_json(
            Method::POST,
            &format!("/services/{service}/functions/{function}/triggers"),
            spec,
        )
        .await
    }

    async fn list_functions(&self, service: &str) -> Result<Vec<String>, String> {
        self.list_names::<FunctionListing>(&format!("/services/{service}/functions"))
            .await
    }

    async fn list_triggers(&self, service: &str, function: &str) -> Result<Vec<String>, String> {
        self.list_names::<TriggerListing>(&format!(
            "/services/{service}/functions/{function}/triggers"
        ))
        .await
    }

    async fn list_aliases(&self, service: &str) -> Result<Vec<String>, String> {
        self.list_names::<AliasListing>(&format!("/services/{service}/aliases"))
            .await
    }

    async fn list_versions(&self, service: &str) -> Result<Vec<String>, String> {
        self.list_names::<VersionListing>(&format!("/services/{service}/versions"))
            .await
    }

    async fn delete_trigger(
        &self,
        service: &str,
        function: &str,
        trigger: &str,
    ) -> Result<(), String> {
        self.delete(&format!(
            "/services/{service}/functions/{function}/triggers/{trigger}"
        ))
        .await
    }

    async fn delete_alias(&self, service: &str, alias: &str) -> Result<(), String> {
        self.delete(&format!("/services/{service}/aliases/{alias}"))
            .await
    }

    async fn delete_version(&self, service: &str, version: &str) -> Result<(), String> {
        self.delete(&format!("/services/{service}/versions/{version}"))
            .await
    }

    async fn delete_function(&self, service: &str, function: &str) -> Result<(), String> {
        self.delete(&format!("/services/{service}/functions/{function}"))
            .await
    }

    async fn delete_service(&self, service: &str) -> Result<(), String> {
        self.delete(&format!("/services/{service}")).await
    }

    async fn call_action(
        &self,
        service: &str,
        function: &str,
        mode: InvocationMode,
        body: &str,
    ) -> Result<String, String> {
        let payload = Some((body.as_bytes().to_vec(), "application/octet-stream"));
        match mode {
            InvocationMode::HttpTrigger => self
                .send(
                    Method::POST,
                    &format!("/proxy/{service}/{function}/action"),
                    &[],
                    payload,
                    &[],
                )
                .await
                .map(|(_, text)| text),
            InvocationMode::Direct => {
                let (headers, text) = self
                    .send(
                        Method::POST,
                        &format!("/services/{service}/functions/{function}/invocations"),
                        &[],
                        payload,
                        &[("x-fc-invocation-type", "Sync")],
                    )
                    .await?;
                match headers.get("x-fc-error-type") {
                    Some(error_type) => Err(format!("function raised {error_type}: {text}")),
                    None => Ok(text),
                }
            }
        }
    }
}

/// `METHOD\nContent-MD5\nContent-Type\nDate\n<x-fc-* headers>path[\nqueries]`
pub fn compose_string_to_sign(
    method: &str,
    path: &str,
    headers: &BTreeMap<String, String>,
    query: &[(String, String)],
) -> String {
    let header = |name: &str| headers.get(name).map(String::as_str).unwrap_or("");
    let canonical_headers: String = headers
        .iter()
        .filter(|(name, _)| name.starts_with(CANONICAL_HEADER_PREFIX))
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();

    let mut string_to_sign = format!(
        "{method}\n{}\n{}\n{}\n{canonical_headers}{path}",
        header("content-md5"),
        header("content-type"),
        header("date"),
    );

    if !query.is_empty() {
        let mut params: Vec<String> = query
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        params.sort();
        string_to_sign.push('\n');
        string_to_sign.push_str(&params.join("\n"));
    }
    string_to_sign
}

pub fn sign(secret: &str, string_to_sign: &str) -> Result<String, String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|error| format!("invalid signing key: {error}"))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Base64 of the lowercase hex MD5 digest, as the platform expects.
pub fn content_md5(body: &[u8]) -> String {
    let digest = Md5::digest(body);
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    BASE64.encode(hex.as_bytes())
}
