use std::time::{Duration, Instant};

use async_trait::async_trait;
use sbrule_domain::{AccessRight, NamespaceId, QueueAuthorizationRuleId};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::{AccessKeys, AuthorizationRule, QueuesClient, ReplicationWaiter};
use crate::error::DriverError;

/// Service Bus management API version used for every request.
pub const API_VERSION: &str = "2021-06-01-preview";

// ── Configuration ─────────────────────────────────────────────────────────────

/// Operator-level settings for the ARM client, injected at startup.
#[derive(Clone)]
pub struct AzureServiceBusConfig {
    /// Azure tenant ID (GUID).
    pub tenant_id: String,
    /// Service principal client ID (optional; falls back to MSI/CLI).
    pub client_id: Option<String>,
    /// Service principal client secret (optional; falls back to MSI/CLI).
    pub client_secret: Option<String>,
    /// Delay between disaster recovery replication polls.
    pub poll_interval: Duration,
}

// ── Base URLs (overridden in tests) ───────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct BaseUrls {
    management: String,
    login:      String,
}

impl Default for BaseUrls {
    fn default() -> Self {
        Self {
            management: "https://management.azure.com".into(),
            login:      "https://login.microsoftonline.com".into(),
        }
    }
}

// ── Token provider ────────────────────────────────────────────────────────────

/// Source of ARM bearer tokens.
#[async_trait]
trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, DriverError>;
}

/// Bearer token with its refresh deadline.
#[derive(Default)]
struct TokenCache(Mutex<Option<(String, Instant)>>);

impl TokenCache {
    async fn get(&self) -> Option<String> {
        let guard = self.0.lock().await;
        match guard.as_ref() {
            Some((tok, expiry)) if Instant::now() < *expiry => Some(tok.clone()),
            _ => None,
        }
    }

    async fn put(&self, tok: &str, expires_in: u64) {
        let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));
        *self.0.lock().await = Some((tok.to_string(), expiry));
    }
}

// ── Service Principal ─────────────────────────────────────────────────────────

struct ServicePrincipalTokenProvider {
    tenant_id:     String,
    client_id:     String,
    client_secret: String,
    login_base:    String,
    client:        reqwest::Client,
    cache:         TokenCache,
}

#[async_trait]
impl TokenProvider for ServicePrincipalTokenProvider {
    async fn token(&self) -> Result<String, DriverError> {
        if let Some(tok) = self.cache.get().await {
            return Ok(tok);
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant_id);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", "https://management.azure.com/.default"),
        ];
        let resp: Value = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| DriverError::Internal(format!("SP token request: {}", e)))?
            .json()
            .await
            .map_err(|e| DriverError::Internal(format!("SP token decode: {}", e)))?;

        let tok = resp["access_token"]
            .as_str()
            .ok_or_else(|| DriverError::Internal(format!("SP token: no access_token in response: {}", resp)))?
            .to_string();
        self.cache.put(&tok, resp["expires_in"].as_u64().unwrap_or(3600)).await;
        Ok(tok)
    }
}

// ── Managed Identity (IMDS) ───────────────────────────────────────────────────

struct ManagedIdentityTokenProvider {
    client: reqwest::Client,
    cache:  TokenCache,
}

#[async_trait]
impl TokenProvider for ManagedIdentityTokenProvider {
    async fn token(&self) -> Result<String, DriverError> {
        if let Some(tok) = self.cache.get().await {
            return Ok(tok);
        }

        let resp: Value = self
            .client
            .get("http://169.254.169.254/metadata/identity/oauth2/token")
            .header("Metadata", "true")
            .query(&[
                ("api-version", "2018-02-01"),
                ("resource", "https://management.azure.com/"),
            ])
            .send()
            .await
            .map_err(|e| DriverError::Internal(format!("IMDS token request: {}", e)))?
            .json()
            .await
            .map_err(|e| DriverError::Internal(format!("IMDS token decode: {}", e)))?;

        let tok = resp["access_token"]
            .as_str()
            .ok_or_else(|| DriverError::Internal(format!("IMDS token: no access_token: {}", resp)))?
            .to_string();
        let expires_in = resp["expires_in"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(3600);
        self.cache.put(&tok, expires_in).await;
        Ok(tok)
    }
}

// ── Azure CLI ─────────────────────────────────────────────────────────────────

struct AzureCliTokenProvider {
    tenant_id: String,
}

#[async_trait]
impl TokenProvider for AzureCliTokenProvider {
    async fn token(&self) -> Result<String, DriverError> {
        let output = tokio::process::Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                "https://management.azure.com",
                "--tenant",
                self.tenant_id.as_str(),
                "--output",
                "json",
            ])
            .output()
            .await
            .map_err(|e| DriverError::Internal(format!("az CLI not found: {}. Install Azure CLI or configure service principal credentials.", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriverError::Internal(format!(
                "az account get-access-token failed: {}. Run 'az login' first.",
                stderr.trim()
            )));
        }

        let resp: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| DriverError::Internal(format!("az CLI output parse: {}", e)))?;
        let tok = resp["accessToken"]
            .as_str()
            .ok_or_else(|| DriverError::Internal("az CLI: no accessToken in output".into()))?
            .to_string();
        Ok(tok)
    }
}

// ── Static (tests) ────────────────────────────────────────────────────────────

pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, DriverError> {
        Ok(self.0.clone())
    }
}

// ── Wire shapes ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawRule {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    properties: Option<RawRuleProperties>,
}

#[derive(Deserialize)]
struct RawRuleProperties {
    #[serde(default)]
    rights: Vec<AccessRight>,
}

impl From<RawRule> for AuthorizationRule {
    fn from(raw: RawRule) -> Self {
        AuthorizationRule {
            id:     raw.id,
            name:   raw.name,
            rights: raw.properties.map(|p| p.rights),
        }
    }
}

// ── AzureServiceBusClient ─────────────────────────────────────────────────────

pub struct AzureServiceBusClient {
    config: AzureServiceBusConfig,
    client: reqwest::Client,
    token:  Box<dyn TokenProvider>,
    base:   BaseUrls,
}

impl AzureServiceBusClient {
    /// Create a client, auto-selecting the token provider:
    /// 1. `client_id` + `client_secret` in config → Service Principal
    /// 2. `AZURE_CLIENT_ID` + `AZURE_CLIENT_SECRET` env vars → Service Principal
    /// 3. `IDENTITY_ENDPOINT` env var → Managed Identity (IMDS)
    /// 4. Otherwise → Azure CLI (`az account get-access-token`)
    pub fn new(config: AzureServiceBusConfig) -> Result<Self, DriverError> {
        let client = reqwest::Client::new();
        let base   = BaseUrls::default();

        let token: Box<dyn TokenProvider> = if let (Some(cid), Some(cs)) = (
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
        ) {
            Box::new(ServicePrincipalTokenProvider {
                tenant_id:     config.tenant_id.clone(),
                client_id:     cid.to_string(),
                client_secret: cs.to_string(),
                login_base:    base.login.clone(),
                client:        client.clone(),
                cache:         TokenCache::default(),
            })
        } else if let (Ok(cid), Ok(cs)) = (
            std::env::var("AZURE_CLIENT_ID"),
            std::env::var("AZURE_CLIENT_SECRET"),
        ) {
            Box::new(ServicePrincipalTokenProvider {
                tenant_id:     config.tenant_id.clone(),
                client_id:     cid,
                client_secret: cs,
                login_base:    base.login.clone(),
                client:        client.clone(),
                cache:         TokenCache::default(),
            })
        } else if std::env::var("IDENTITY_ENDPOINT").is_ok() {
            Box::new(ManagedIdentityTokenProvider {
                client: client.clone(),
                cache:  TokenCache::default(),
            })
        } else {
            Box::new(AzureCliTokenProvider {
                tenant_id: config.tenant_id.clone(),
            })
        };

        Ok(Self { config, client, token, base })
    }

    /// Create a client with a static bearer token and custom base URLs.
    /// Used exclusively in tests.
    #[cfg(test)]
    pub(crate) fn with_static_token(config: AzureServiceBusConfig, token: &str, base: BaseUrls) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            token:  Box::new(StaticToken(token.to_string())),
            base,
        }
    }

    async fn bearer(&self) -> Result<String, DriverError> {
        self.token.token().await
    }

    fn url(&self, resource_id: &str, suffix: &str) -> String {
        format!(
            "{}{}{}?api-version={}",
            self.base.management, resource_id, suffix, API_VERSION,
        )
    }

    // ── ARM error parsing ─────────────────────────────────────────────────────

    fn parse_arm_error(body: &Value) -> String {
        let err = body
            .get("error")
            .or_else(|| body.get("Error"))
            .unwrap_or(body);
        let code    = err["code"].as_str().unwrap_or("Unknown");
        let message = err["message"].as_str().unwrap_or("unknown error");
        format!("{}: {}", code, message)
    }

    fn status_error(verb: &str, url: &str, status: u16, body: &Value) -> DriverError {
        if status == 404 {
            return DriverError::NotFound(format!("{} {}: {}", verb, url, Self::parse_arm_error(body)));
        }
        DriverError::RequestFailed(format!(
            "{} {}: status {}: {}",
            verb,
            url,
            status,
            Self::parse_arm_error(body)
        ))
    }

    // ── ARM HTTP verbs ────────────────────────────────────────────────────────

    async fn arm_get(&self, url: &str) -> Result<(u16, Value), DriverError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM GET");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| DriverError::RequestFailed(format!("GET {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body: Value = resp
            .json()
            .await
            .unwrap_or(Value::Null);
        Ok((status, body))
    }

    async fn arm_put(&self, url: &str, body: &Value) -> Result<(u16, Value), DriverError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM PUT");
        let resp = self
            .client
            .put(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| DriverError::RequestFailed(format!("PUT {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body_val: Value = resp
            .json()
            .await
            .unwrap_or(Value::Null);
        Ok((status, body_val))
    }

    async fn arm_post(&self, url: &str, body: &Value) -> Result<(u16, Value), DriverError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM POST");
        let resp = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| DriverError::RequestFailed(format!("POST {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body_val: Value = resp.json().await.unwrap_or(Value::Null);
        Ok((status, body_val))
    }

    async fn arm_delete(&self, url: &str) -> Result<(), DriverError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM DELETE");
        let resp = self
            .client
            .delete(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| DriverError::RequestFailed(format!("DELETE {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        if status == 404 || (200..300).contains(&status) {
            return Ok(());
        }

        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Err(DriverError::RequestFailed(format!(
            "DELETE {}: status {}: {}",
            url,
            status,
            Self::parse_arm_error(&body)
        )))
    }

    fn decode<T: serde::de::DeserializeOwned>(url: &str, body: Value) -> Result<T, DriverError> {
        serde_json::from_value(body)
            .map_err(|e| DriverError::Internal(format!("decode {}: {}", url, e)))
    }

    // ── Disaster recovery replication ─────────────────────────────────────────

    /// Poll the namespace's single disaster recovery config until replication
    /// settles. Namespaces below the Premium tier, or without exactly one
    /// pairing, have nothing to wait for.
    async fn poll_replication(&self, namespace: &NamespaceId) -> Result<(), DriverError> {
        let ns_url = self.url(&namespace.id(), "");
        let (status, ns_body) = self.arm_get(&ns_url).await?;
        if status != 200 {
            return Err(Self::status_error("GET", &ns_url, status, &ns_body));
        }
        let sku = ns_body["sku"]["name"].as_str().unwrap_or("");
        if !sku.eq_ignore_ascii_case("Premium") {
            debug!(%namespace, sku, "namespace is not Premium, no replication to wait for");
            return Ok(());
        }

        let list_url = self.url(&namespace.id(), "/disasterRecoveryConfigs");
        let (status, list_body) = self.arm_get(&list_url).await?;
        if status != 200 {
            return Err(Self::status_error("GET", &list_url, status, &list_body));
        }
        let configs = list_body["value"].as_array().cloned().unwrap_or_default();
        if configs.len() != 1 {
            debug!(%namespace, count = configs.len(), "no single disaster recovery pairing, skipping wait");
            return Ok(());
        }
        let alias = configs[0]["name"].as_str().unwrap_or("").to_string();
        if alias.is_empty() {
            return Ok(());
        }

        let config_url = self.url(
            &namespace.id(),
            &format!("/disasterRecoveryConfigs/{}", alias),
        );
        let delay = self.config.poll_interval;
        let mut poll: u64 = 0;
        loop {
            poll += 1;
            let (status, body) = self.arm_get(&config_url).await?;
            if status != 200 {
                return Err(DriverError::ReplicationFailed(format!(
                    "wait read Service Bus Namespace Disaster Recovery Configs {:?} ({}): {}",
                    alias,
                    namespace,
                    Self::status_error("GET", &config_url, status, &body)
                )));
            }

            match body["properties"]["provisioningState"].as_str() {
                Some("Succeeded") => {
                    info!(%namespace, alias, poll, "paired namespace replication complete");
                    return Ok(());
                }
                Some("Failed") => {
                    return Err(DriverError::ReplicationFailed(format!(
                        "replication for Service Bus Namespace Disaster Recovery Configs {:?} ({}) failed",
                        alias, namespace
                    )));
                }
                Some("Accepted") => {}
                Some(other) => {
                    return Err(DriverError::ReplicationFailed(format!(
                        "unexpected state {:?} for Disaster Recovery Config {:?} ({}), wanted \"Succeeded\"",
                        other, alias, namespace
                    )));
                }
                None => {
                    return Err(DriverError::ReplicationFailed(format!(
                        "waiting for replication of Disaster Recovery Config {:?} ({}): provisioning state is nil",
                        alias, namespace
                    )));
                }
            }

            if poll % 10 == 0 {
                info!(poll, %namespace, alias, "still waiting for paired namespace replication");
            } else {
                debug!(poll, %namespace, alias, ?delay, "replication pending, waiting");
            }
            tokio::time::sleep(delay).await;
        }
    }
}

// ── QueuesClient impl ─────────────────────────────────────────────────────────

#[async_trait]
impl QueuesClient for AzureServiceBusClient {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn get_authorization_rule(
        &self,
        id: &QueueAuthorizationRuleId,
    ) -> Result<AuthorizationRule, DriverError> {
        let url = self.url(&id.id(), "");
        let (status, body) = self.arm_get(&url).await?;
        if status != 200 {
            return Err(Self::status_error("GET", &url, status, &body));
        }
        let raw: RawRule = Self::decode(&url, body)?;
        Ok(raw.into())
    }

    async fn create_or_update_authorization_rule(
        &self,
        id: &QueueAuthorizationRuleId,
        rights: &[AccessRight],
    ) -> Result<AuthorizationRule, DriverError> {
        let url = self.url(&id.id(), "");
        let body = json!({
            "properties": { "rights": rights }
        });
        let (status, body_val) = self.arm_put(&url, &body).await?;
        if status != 200 && status != 201 {
            return Err(Self::status_error("PUT", &url, status, &body_val));
        }
        if body_val.get("error").is_some() {
            return Err(DriverError::RequestFailed(format!(
                "PUT {}: {}",
                url,
                Self::parse_arm_error(&body_val)
            )));
        }
        let raw: RawRule = Self::decode(&url, body_val)?;
        Ok(raw.into())
    }

    async fn delete_authorization_rule(
        &self,
        id: &QueueAuthorizationRuleId,
    ) -> Result<(), DriverError> {
        self.arm_delete(&self.url(&id.id(), "")).await
    }

    async fn list_keys(&self, id: &QueueAuthorizationRuleId) -> Result<AccessKeys, DriverError> {
        let url = self.url(&id.id(), "/listKeys");
        let (status, body) = self.arm_post(&url, &json!({})).await?;
        if status != 200 {
            return Err(Self::status_error("POST", &url, status, &body));
        }
        Self::decode(&url, body)
    }
}

#[async_trait]
impl ReplicationWaiter for AzureServiceBusClient {
    async fn wait_for_replication(
        &self,
        namespace: &NamespaceId,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        match tokio::time::timeout(timeout, self.poll_replication(namespace)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout {
                what:  format!("replication of {}", namespace),
                after: timeout,
            }),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
