//! vSphere VI/JSON Session Adapter
//!
//! Implements the `RemoteSession` port against the vSphere Web Services API
//! served as JSON under `/sdk/vim25/{release}` (vCenter 8.0U1 and later).
//! Every managed object method is addressed as
//! `{base}/{ObjectType}/{moId}/{method-or-property}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::domain::ports::{
    CounterId, CounterInfo, EntityMetric, HostRef, ManagedObjectRef, MetricSeries, PerfQuerySpec,
    RemoteSession, ScopeHandle,
};
use crate::error::{Error, Result};

/// Header carrying the session token after login.
const SESSION_HEADER: &str = "vmware-api-session-id";

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY: usize = 512;

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings for [`VimJsonSession`]
#[derive(Clone)]
pub struct VimJsonConfig {
    /// vCenter address, `host[:port]` or a full `https://` URL
    pub hostname: String,
    pub username: String,
    pub password: String,
    /// API release path segment, e.g. `8.0.1.0`
    pub api_release: String,
    /// Accept self-signed certificates
    pub insecure: bool,
    /// Per-request timeout
    pub query_timeout: Duration,
}

impl Default for VimJsonConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            username: "administrator@vsphere.local".to_string(),
            password: String::new(),
            api_release: "8.0.1.0".to_string(),
            insecure: true,
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for VimJsonConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VimJsonConfig")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("api_release", &self.api_release)
            .field("insecure", &self.insecure)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl VimJsonConfig {
    /// Base URL of the VI/JSON API.
    pub fn base_url(&self) -> String {
        let host = self.hostname.trim_end_matches('/');
        if host.starts_with("https://") || host.starts_with("http://") {
            format!("{}/sdk/vim25/{}", host, self.api_release)
        } else {
            format!("https://{}/sdk/vim25/{}", host, self.api_release)
        }
    }
}

// =============================================================================
// VI/JSON Wire Types
// =============================================================================

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct MoRef {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

impl From<MoRef> for ManagedObjectRef {
    fn from(r: MoRef) -> Self {
        ManagedObjectRef::new(r.kind, r.value)
    }
}

fn mo_ref_json(reference: &ManagedObjectRef) -> Value {
    json!({
        "_typeName": "ManagedObjectReference",
        "type": reference.kind,
        "value": reference.value,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceContent {
    root_folder: MoRef,
    search_index: MoRef,
    #[serde(default)]
    session_manager: Option<MoRef>,
    #[serde(default)]
    perf_manager: Option<MoRef>,
    #[serde(default)]
    view_manager: Option<MoRef>,
}

#[derive(Debug, Deserialize)]
struct ElementDescription {
    key: String,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerfCounterInfo {
    key: i32,
    name_info: ElementDescription,
    group_info: ElementDescription,
    #[serde(default)]
    rollup_type: Option<String>,
    #[serde(default)]
    stats_type: Option<String>,
}

impl From<PerfCounterInfo> for CounterInfo {
    fn from(info: PerfCounterInfo) -> Self {
        CounterInfo {
            id: CounterId(info.key),
            group: info.group_info.key,
            name: info.name_info.key,
            summary: info.name_info.summary,
            rollup: info.rollup_type,
            stats: info.stats_type,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerfMetricId {
    counter_id: i32,
    #[serde(default)]
    instance: String,
}

/// `PerfMetricIntSeries` (array of longs) or `PerfMetricSeriesCSV` (string).
#[derive(Debug, Deserialize)]
struct RawSeries {
    id: PerfMetricId,
    #[serde(default)]
    value: Value,
}

impl RawSeries {
    fn values(&self) -> Vec<i64> {
        match &self.value {
            Value::Array(items) => items.iter().filter_map(Value::as_i64).collect(),
            Value::String(csv) => csv
                .split(',')
                .filter_map(|v| v.trim().parse().ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEntityMetric {
    entity: MoRef,
    #[serde(default)]
    value: Option<Vec<RawSeries>>,
}

impl From<RawEntityMetric> for EntityMetric {
    fn from(raw: RawEntityMetric) -> Self {
        let series = raw
            .value
            .unwrap_or_default()
            .into_iter()
            .map(|s| {
                let values = s.values();
                MetricSeries::new(s.id.counter_id, s.id.instance, values)
            })
            .collect();
        EntityMetric {
            entity: raw.entity.into(),
            series,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Fault {
    #[serde(rename = "_typeName")]
    type_name: String,
    #[serde(default)]
    message: Option<String>,
}

// =============================================================================
// Response Handling
// =============================================================================

/// Map a non-success response to an error.
fn api_error(status: StatusCode, body: &str) -> Error {
    let fault = serde_json::from_str::<Fault>(body).ok();
    let message = match &fault {
        Some(Fault {
            type_name,
            message: Some(message),
        }) => format!("{}: {}", type_name, message),
        Some(Fault { type_name, .. }) => type_name.clone(),
        None => body.chars().take(MAX_ERROR_BODY).collect(),
    };

    let auth_fault = fault
        .as_ref()
        .is_some_and(|f| f.type_name == "InvalidLogin" || f.type_name == "NotAuthenticated");

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || auth_fault {
        Error::Authentication(message)
    } else {
        Error::RemoteApi {
            status: status.as_u16(),
            message,
        }
    }
}

/// Decode a JSON body. Empty and `null` bodies (void methods, unset
/// properties) decode to `None`.
fn parse_body<T: DeserializeOwned>(body: &str) -> Result<Option<T>> {
    let body = body.trim();
    if body.is_empty() || body == "null" {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| Error::ResponseParse(e.to_string()))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<Option<T>> {
    let status = response.status();
    let body = response.text().await.map_err(Error::Connection)?;
    if !status.is_success() {
        return Err(api_error(status, &body));
    }
    parse_body(&body)
}

fn required<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| Error::ResponseParse(format!("empty response for {}", what)))
}

// =============================================================================
// Session
// =============================================================================

/// Authenticated VI/JSON session.
pub struct VimJsonSession {
    client: Client,
    base_url: String,
    session_id: String,
    content: ServiceContent,
}

impl VimJsonSession {
    /// Fetch the service content and log in.
    #[instrument(skip(config), fields(hostname = %config.hostname))]
    pub async fn connect(config: VimJsonConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.query_timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config.base_url();

        let response = client
            .get(format!("{}/ServiceInstance/ServiceInstance/content", base_url))
            .send()
            .await
            .map_err(Error::Connection)?;
        let content: ServiceContent = required(read_json(response).await?, "service content")?;

        let session_manager = content
            .session_manager
            .clone()
            .ok_or_else(|| Error::ResponseParse("service content has no session manager".into()))?;

        let response = client
            .post(format!(
                "{}/SessionManager/{}/Login",
                base_url,
                urlencoding::encode(&session_manager.value)
            ))
            .json(&json!({
                "userName": config.username,
                "password": config.password,
            }))
            .send()
            .await
            .map_err(Error::Connection)?;

        let status = response.status();
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(Error::Connection)?;

        if !status.is_success() {
            return Err(match api_error(status, &body) {
                Error::RemoteApi { message, .. } => Error::Authentication(message),
                other => other,
            });
        }
        let session_id = session_id.ok_or_else(|| {
            Error::Authentication("login response carried no session token".into())
        })?;

        info!(username = %config.username, "Authenticated to vCenter");

        Ok(Self {
            client,
            base_url,
            session_id,
            content,
        })
    }

    fn url(&self, kind: &str, id: &str, member: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            kind,
            urlencoding::encode(id),
            member
        )
    }

    fn object_url(&self, reference: &MoRef, member: &str) -> String {
        self.url(&reference.kind, &reference.value, member)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(SESSION_HEADER, &self.session_id)
            .send()
            .await
            .map_err(Error::Connection)?;
        read_json(response).await
    }

    async fn post<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<Option<T>> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header(SESSION_HEADER, &self.session_id)
            .json(body)
            .send()
            .await
            .map_err(Error::Connection)?;
        read_json(response).await
    }

    fn perf_manager(&self) -> Result<&MoRef> {
        self.content
            .perf_manager
            .as_ref()
            .ok_or_else(|| Error::ResponseParse("service content has no performance manager".into()))
    }

    async fn object_name(&self, reference: &MoRef) -> Result<String> {
        let name: Option<String> = self.get(&self.object_url(reference, "name")).await?;
        required(name, "object name")
    }

    /// Members of a recursive container view of `kind` below `container`.
    async fn container_members(&self, container: &ManagedObjectRef, kind: &str) -> Result<Vec<MoRef>> {
        let view_manager = self
            .content
            .view_manager
            .as_ref()
            .ok_or_else(|| Error::ResponseParse("service content has no view manager".into()))?;

        let view: MoRef = required(
            self.post(
                &self.object_url(view_manager, "CreateContainerView"),
                &json!({
                    "container": mo_ref_json(container),
                    "type": [kind],
                    "recursive": true,
                }),
            )
            .await?,
            "CreateContainerView",
        )?;

        let members: Result<Option<Vec<MoRef>>> = self.get(&self.object_url(&view, "view")).await;

        if let Err(e) = self
            .post::<Value>(&self.object_url(&view, "DestroyView"), &json!({}))
            .await
        {
            warn!(view = %view.value, "Failed to destroy container view: {}", e);
        }

        Ok(members?.unwrap_or_default())
    }

    async fn default_datacenter(&self) -> Result<ScopeHandle> {
        let root = ManagedObjectRef::from(self.content.root_folder.clone());
        let datacenters = self.container_members(&root, "Datacenter").await?;

        match datacenters.as_slice() {
            [only] => Ok(ScopeHandle {
                name: self.object_name(only).await?,
                reference: only.clone().into(),
            }),
            [] => Err(Error::ScopeNotFound("no datacenter found".into())),
            _ => Err(Error::ScopeNotFound(
                "default datacenter resolves to multiple instances, please specify".into(),
            )),
        }
    }
}

impl std::fmt::Debug for VimJsonSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VimJsonSession")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl RemoteSession for VimJsonSession {
    #[instrument(skip(self))]
    async fn list_performance_counters(&self) -> Result<Vec<CounterInfo>> {
        let url = self.object_url(self.perf_manager()?, "perfCounter");
        let counters: Option<Vec<PerfCounterInfo>> = self.get(&url).await?;
        let counters: Vec<CounterInfo> = counters
            .unwrap_or_default()
            .into_iter()
            .map(CounterInfo::from)
            .collect();

        debug!(count = counters.len(), "Fetched performance counter catalogue");
        Ok(counters)
    }

    #[instrument(skip(self))]
    async fn resolve_scope(&self, name: &str) -> Result<ScopeHandle> {
        let path = name.trim_matches('/');
        if path.is_empty() {
            return self.default_datacenter().await;
        }

        let found: Option<MoRef> = self
            .post(
                &self.object_url(&self.content.search_index, "FindByInventoryPath"),
                &json!({ "inventoryPath": path }),
            )
            .await?;

        match found {
            Some(reference) if reference.kind == "Datacenter" => Ok(ScopeHandle {
                name: path.to_string(),
                reference: reference.into(),
            }),
            _ => Err(Error::ScopeNotFound(name.to_string())),
        }
    }

    #[instrument(skip(self), fields(datacenter = %scope.reference))]
    async fn list_hosts(&self, scope: &ScopeHandle) -> Result<Vec<HostRef>> {
        let members = self.container_members(&scope.reference, "HostSystem").await?;

        let mut hosts = Vec::with_capacity(members.len());
        for member in members {
            let name = self.object_name(&member).await?;
            hosts.push(HostRef {
                name,
                reference: member.into(),
            });
        }

        debug!(count = hosts.len(), "Enumerated hosts");
        Ok(hosts)
    }

    #[instrument(skip(self, spec), fields(host = %host.name))]
    async fn query_performance(
        &self,
        host: &HostRef,
        spec: &PerfQuerySpec,
    ) -> Result<Vec<EntityMetric>> {
        let url = self.object_url(self.perf_manager()?, "QueryPerf");
        let body = json!({
            "querySpec": [{
                "_typeName": "PerfQuerySpec",
                "entity": mo_ref_json(&host.reference),
                "maxSample": spec.max_sample,
                "intervalId": spec.interval_id,
            }]
        });

        let metrics: Option<Vec<RawEntityMetric>> = self.post(&url, &body).await?;
        Ok(metrics
            .unwrap_or_default()
            .into_iter()
            .map(EntityMetric::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // =========================================================================
    // Configuration Tests
    // =========================================================================

    #[test]
    fn test_config_default() {
        let config = VimJsonConfig::default();
        assert_eq!(config.hostname, "localhost");
        assert_eq!(config.username, "administrator@vsphere.local");
        assert!(config.password.is_empty());
        assert!(config.insecure);
        assert_eq!(config.query_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_base_url() {
        let mut config = VimJsonConfig {
            hostname: "vcenter.lab".into(),
            ..Default::default()
        };
        assert_eq!(config.base_url(), "https://vcenter.lab/sdk/vim25/8.0.1.0");

        config.hostname = "http://127.0.0.1:8989/".into();
        assert_eq!(config.base_url(), "http://127.0.0.1:8989/sdk/vim25/8.0.1.0");
    }

    #[test]
    fn test_config_debug_hides_password() {
        let config = VimJsonConfig {
            password: "hunter2".into(),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    // =========================================================================
    // Response Parsing Tests
    // =========================================================================

    #[test]
    fn test_service_content_deserialize() {
        let json = r#"{
            "_typeName": "ServiceContent",
            "rootFolder": {"_typeName": "ManagedObjectReference", "type": "Folder", "value": "group-d1"},
            "searchIndex": {"_typeName": "ManagedObjectReference", "type": "SearchIndex", "value": "SearchIndex"},
            "sessionManager": {"_typeName": "ManagedObjectReference", "type": "SessionManager", "value": "SessionManager"},
            "perfManager": {"_typeName": "ManagedObjectReference", "type": "PerformanceManager", "value": "PerfMgr"},
            "viewManager": {"_typeName": "ManagedObjectReference", "type": "ViewManager", "value": "ViewManager"},
            "about": {"_typeName": "AboutInfo", "name": "VMware vCenter Server"}
        }"#;

        let content: ServiceContent = parse_body(json).unwrap().unwrap();
        assert_eq!(content.root_folder.value, "group-d1");
        assert_eq!(content.perf_manager.unwrap().value, "PerfMgr");
        assert_eq!(content.view_manager.unwrap().kind, "ViewManager");
    }

    #[test]
    fn test_perf_counter_deserialize() {
        let json = r#"[
            {
                "_typeName": "PerfCounterInfo",
                "key": 2,
                "nameInfo": {"_typeName": "ElementDescription", "label": "Usage", "summary": "CPU usage as a percentage during the interval", "key": "usage"},
                "groupInfo": {"_typeName": "ElementDescription", "label": "CPU", "summary": "CPU", "key": "cpu"},
                "unitInfo": {"_typeName": "ElementDescription", "label": "%", "summary": "Percentage", "key": "percent"},
                "rollupType": "average",
                "statsType": "rate",
                "level": 1
            }
        ]"#;

        let counters: Vec<PerfCounterInfo> = parse_body(json).unwrap().unwrap();
        let info = CounterInfo::from(counters.into_iter().next().unwrap());

        assert_eq!(info.id, CounterId(2));
        assert_eq!(info.group, "cpu");
        assert_eq!(info.name, "usage");
        assert_eq!(info.summary, "CPU usage as a percentage during the interval");
        assert_eq!(info.rollup.as_deref(), Some("average"));
        assert_eq!(info.stats.as_deref(), Some("rate"));
    }

    #[test]
    fn test_query_perf_int_series() {
        let json = r#"[
            {
                "_typeName": "PerfEntityMetric",
                "entity": {"_typeName": "ManagedObjectReference", "type": "HostSystem", "value": "host-10"},
                "sampleInfo": [{"_typeName": "PerfSampleInfo", "timestamp": "2024-01-01T00:00:20Z", "interval": 20}],
                "value": [
                    {"_typeName": "PerfMetricIntSeries", "id": {"_typeName": "PerfMetricId", "counterId": 2, "instance": ""}, "value": [4211]},
                    {"_typeName": "PerfMetricIntSeries", "id": {"_typeName": "PerfMetricId", "counterId": 146, "instance": "vmnic0"}, "value": [17]}
                ]
            }
        ]"#;

        let raw: Vec<RawEntityMetric> = parse_body(json).unwrap().unwrap();
        let metrics: Vec<EntityMetric> = raw.into_iter().map(EntityMetric::from).collect();

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].entity, ManagedObjectRef::host("host-10"));
        assert_eq!(metrics[0].series.len(), 2);
        assert_eq!(metrics[0].series[0], MetricSeries::new(2, "", vec![4211]));
        assert_eq!(metrics[0].series[1].instance, "vmnic0");
    }

    #[test]
    fn test_query_perf_csv_series_and_missing_values() {
        let json = r#"[
            {
                "_typeName": "PerfEntityMetricCSV",
                "entity": {"_typeName": "ManagedObjectReference", "type": "HostSystem", "value": "host-11"},
                "value": [
                    {"_typeName": "PerfMetricSeriesCSV", "id": {"_typeName": "PerfMetricId", "counterId": 2}, "value": "10,20"}
                ]
            },
            {
                "_typeName": "PerfEntityMetric",
                "entity": {"_typeName": "ManagedObjectReference", "type": "HostSystem", "value": "host-12"}
            }
        ]"#;

        let raw: Vec<RawEntityMetric> = parse_body(json).unwrap().unwrap();
        let metrics: Vec<EntityMetric> = raw.into_iter().map(EntityMetric::from).collect();

        assert_eq!(metrics[0].series[0].values, vec![10, 20]);
        assert_eq!(metrics[0].series[0].instance, "");
        assert!(metrics[1].series.is_empty());
    }

    #[test]
    fn test_empty_and_null_bodies() {
        assert!(parse_body::<Vec<RawEntityMetric>>("").unwrap().is_none());
        assert!(parse_body::<Vec<RawEntityMetric>>("null").unwrap().is_none());
        assert_matches!(
            parse_body::<Vec<RawEntityMetric>>("{not json"),
            Err(Error::ResponseParse(_))
        );
    }

    // =========================================================================
    // Error Mapping Tests
    // =========================================================================

    #[test]
    fn test_api_error_invalid_login() {
        let body = r#"{"_typeName": "InvalidLogin", "message": "Cannot complete login due to an incorrect user name or password."}"#;
        assert_matches!(
            api_error(StatusCode::INTERNAL_SERVER_ERROR, body),
            Error::Authentication(msg) if msg.starts_with("InvalidLogin")
        );
    }

    #[test]
    fn test_api_error_remote_fault() {
        let body = r#"{"_typeName": "ManagedObjectNotFound"}"#;
        assert_matches!(
            api_error(StatusCode::INTERNAL_SERVER_ERROR, body),
            Error::RemoteApi { status: 500, message } if message == "ManagedObjectNotFound"
        );
    }

    #[test]
    fn test_api_error_unauthorized_plain_body() {
        assert_matches!(
            api_error(StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::Authentication(_)
        );
    }

    // =========================================================================
    // Connection Tests
    // =========================================================================

    #[tokio::test]
    async fn test_connect_refused() {
        let config = VimJsonConfig {
            hostname: "http://127.0.0.1:19999".into(),
            query_timeout: Duration::from_secs(1),
            ..Default::default()
        };

        let result = VimJsonSession::connect(config).await;
        assert_matches!(result, Err(Error::Connection(_)));
    }
}
