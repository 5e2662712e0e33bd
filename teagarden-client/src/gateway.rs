//! Remote gateway: one async call per domain operation against the REST
//! backend, with failures normalized into [`GatewayError`].

use crate::config::ClientConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use teagarden_core::{
    Agent, AgentDraft, AgentId, AgentPatch, EntityIdType, GraphNode, GraphNodeDraft,
    HasEntityId, KnowledgeGraph, Message, MessageDraft, SettingsPatch, SystemSettings, Task,
    TaskDraft, TaskId, TaskPatch, User, UserDraft, UserId, UserPatch,
};

// ============================================================================
// ERRORS
// ============================================================================

/// Failure category of a gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayErrorKind {
    /// The request could not complete (connect failure, timeout).
    Network,
    NotFound,
    /// Server-side validation rejected the request (400/422).
    Validation,
    Unauthorized,
    Conflict,
    /// 5xx or an undecodable success body.
    Server,
    Unknown,
}

impl GatewayErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => GatewayErrorKind::Validation,
            401 | 403 => GatewayErrorKind::Unauthorized,
            404 => GatewayErrorKind::NotFound,
            409 => GatewayErrorKind::Conflict,
            500..=599 => GatewayErrorKind::Server,
            _ => GatewayErrorKind::Unknown,
        }
    }
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatewayErrorKind::Network => "network",
            GatewayErrorKind::NotFound => "not found",
            GatewayErrorKind::Validation => "validation",
            GatewayErrorKind::Unauthorized => "unauthorized",
            GatewayErrorKind::Conflict => "conflict",
            GatewayErrorKind::Server => "server",
            GatewayErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Normalized gateway failure carrying the HTTP status and raw body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub body: Option<String>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Network, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(
            GatewayErrorKind::Server,
            format!("Malformed payload: {}", message.into()),
        )
    }

    /// Build an error from a non-success response.
    pub fn from_response(status: u16, body: String) -> Self {
        let message = extract_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
        Self {
            kind: GatewayErrorKind::from_status(status),
            message,
            status: Some(status),
            body: Some(body),
        }
    }

    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            Self::network(err.to_string())
        } else if err.is_decode() {
            Self::malformed(err.to_string())
        } else {
            Self::new(GatewayErrorKind::Unknown, err.to_string())
        }
    }
}

/// Pull `error` or `message` out of a JSON error body.
fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

pub type GatewayResult<T> = Result<T, GatewayError>;

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Result of a create call. Some backends answer with the full record,
/// others only acknowledge with the new id.
#[derive(Debug, Clone, PartialEq)]
pub enum Created<T: HasEntityId> {
    Entity(T),
    Acknowledged(T::Id),
}

impl<T: HasEntityId> Created<T> {
    pub fn id(&self) -> &T::Id {
        match self {
            Created::Entity(entity) => entity.entity_id(),
            Created::Acknowledged(id) => id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReorderRequest<'a, I: Serialize> {
    pub ids: &'a [I],
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginResponse")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

// ============================================================================
// GATEWAY TRAIT
// ============================================================================

/// Remote backend as seen by the store. Implementations never retry.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Bearer token attached to subsequent requests.
    fn set_bearer_token(&self, token: Option<String>);

    // Agents
    async fn list_agents(&self) -> GatewayResult<Vec<Agent>>;
    async fn create_agent(&self, draft: &AgentDraft) -> GatewayResult<Created<Agent>>;
    async fn update_agent(&self, id: &AgentId, patch: &AgentPatch) -> GatewayResult<Option<Agent>>;
    async fn delete_agent(&self, id: &AgentId) -> GatewayResult<()>;
    async fn reorder_agents(&self, ids: &[AgentId]) -> GatewayResult<()>;
    async fn start_agent(&self, id: &AgentId) -> GatewayResult<Option<Agent>>;
    async fn stop_agent(&self, id: &AgentId) -> GatewayResult<Option<Agent>>;

    // Tasks
    async fn list_tasks(&self) -> GatewayResult<Vec<Task>>;
    async fn create_task(&self, draft: &TaskDraft) -> GatewayResult<Created<Task>>;
    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> GatewayResult<Option<Task>>;
    async fn delete_task(&self, id: &TaskId) -> GatewayResult<()>;
    async fn reorder_tasks(&self, ids: &[TaskId]) -> GatewayResult<()>;

    // Users
    async fn list_users(&self) -> GatewayResult<Vec<User>>;
    async fn create_user(&self, draft: &UserDraft) -> GatewayResult<Created<User>>;
    async fn update_user(&self, id: &UserId, patch: &UserPatch) -> GatewayResult<Option<User>>;
    async fn delete_user(&self, id: &UserId) -> GatewayResult<()>;

    // Threads
    async fn list_messages(&self, agent_id: &AgentId) -> GatewayResult<Vec<Message>>;
    async fn post_message(&self, agent_id: &AgentId, draft: &MessageDraft)
        -> GatewayResult<Message>;

    // Knowledge graph
    async fn fetch_graph(&self) -> GatewayResult<KnowledgeGraph>;
    async fn add_graph_node(&self, draft: &GraphNodeDraft) -> GatewayResult<Created<GraphNode>>;

    // Settings
    async fn fetch_settings(&self) -> GatewayResult<SystemSettings>;
    async fn update_settings(&self, patch: &SettingsPatch)
        -> GatewayResult<Option<SystemSettings>>;

    // Session
    async fn login(&self, request: &LoginRequest) -> GatewayResult<LoginResponse>;
    async fn logout(&self) -> GatewayResult<()>;
}

// ============================================================================
// REST IMPLEMENTATION
// ============================================================================

/// reqwest-backed gateway.
pub struct RestGateway {
    client: reqwest::Client,
    base_url: Url,
    bearer: RwLock<Option<String>>,
}

impl RestGateway {
    pub fn new(config: &ClientConfig) -> GatewayResult<Self> {
        Self::with_base_url(
            &config.api_base_url,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::new(GatewayErrorKind::Unknown, e.to_string()))?;
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            GatewayError::new(GatewayErrorKind::Unknown, format!("Invalid base URL: {}", e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::new(
                GatewayErrorKind::Unknown,
                format!("Invalid base URL: {}", base_url),
            ));
        }
        Ok(Self {
            client,
            base_url,
            bearer: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Endpoint URL for `path`. Each segment is percent-encoded, so ids
    /// containing `/` or `?` stay a single segment.
    fn endpoint(&self, path: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, url);
        let bearer = self.bearer.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = bearer.as_deref() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                request = request.header(AUTHORIZATION, value);
            }
        }
        request
    }

    /// Send and return the body of a success response.
    async fn send<B>(&self, method: Method, path: &[&str], body: Option<&B>) -> GatewayResult<String>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path);
        let path = url.path().to_string();
        tracing::debug!(%method, path = %path, "Sending request");
        let mut request = self.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|e| {
            let err = GatewayError::from_transport(e);
            tracing::warn!(%method, path = %path, error = %err, "Request failed");
            err
        })?;

        let status = response.status();
        let text = response.text().await.map_err(GatewayError::from_transport)?;
        if status.is_success() {
            Ok(text)
        } else {
            let err = GatewayError::from_response(status.as_u16(), text);
            tracing::warn!(%method, path = %path, status = status.as_u16(), kind = %err.kind, "Request rejected");
            Err(err)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &[&str]) -> GatewayResult<T> {
        let text = self.send::<()>(Method::GET, path, None).await?;
        decode(&text)
    }

    async fn send_json<T, B>(&self, method: Method, path: &[&str], body: &B) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let text = self.send(method, path, Some(body)).await?;
        decode(&text)
    }

    /// An empty or acknowledgement-only body yields `None`.
    async fn send_optional<T, B>(
        &self,
        method: Method,
        path: &[&str],
        body: Option<&B>,
    ) -> GatewayResult<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let text = self.send(method, path, body).await?;
        Ok(decode_optional(&text))
    }

    async fn send_empty<B>(&self, method: Method, path: &[&str], body: Option<&B>) -> GatewayResult<()>
    where
        B: Serialize + ?Sized,
    {
        self.send(method, path, body).await.map(|_| ())
    }

    async fn create<T, B>(&self, path: &[&str], body: &B) -> GatewayResult<Created<T>>
    where
        T: HasEntityId + DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let text = self.send(Method::POST, path, Some(body)).await?;
        decode_created(&text)
    }
}

fn decode<T: DeserializeOwned>(text: &str) -> GatewayResult<T> {
    serde_json::from_str(text).map_err(|e| GatewayError::malformed(e.to_string()))
}

fn decode_optional<T: DeserializeOwned>(text: &str) -> Option<T> {
    if text.trim().is_empty() {
        return None;
    }
    serde_json::from_str(text).ok()
}

fn decode_created<T>(text: &str) -> GatewayResult<Created<T>>
where
    T: HasEntityId + DeserializeOwned,
{
    let value: serde_json::Value = decode(text)?;
    if let Ok(entity) = serde_json::from_value::<T>(value.clone()) {
        return Ok(Created::Entity(entity));
    }
    let id = match value.get("id") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => return Err(GatewayError::malformed("create response has no id")),
    };
    Ok(Created::Acknowledged(T::Id::new(id)))
}

#[async_trait]
impl Gateway for RestGateway {
    fn set_bearer_token(&self, token: Option<String>) {
        *self.bearer.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    async fn list_agents(&self) -> GatewayResult<Vec<Agent>> {
        self.get_json(&["agents"]).await
    }

    async fn create_agent(&self, draft: &AgentDraft) -> GatewayResult<Created<Agent>> {
        self.create(&["agents"], draft).await
    }

    async fn update_agent(&self, id: &AgentId, patch: &AgentPatch) -> GatewayResult<Option<Agent>> {
        let path = ["agents", id.as_str()];
        self.send_optional(Method::PUT, &path, Some(patch)).await
    }

    async fn delete_agent(&self, id: &AgentId) -> GatewayResult<()> {
        let path = ["agents", id.as_str()];
        self.send_empty::<()>(Method::DELETE, &path, None).await
    }

    async fn reorder_agents(&self, ids: &[AgentId]) -> GatewayResult<()> {
        self.send_empty(Method::POST, &["agents", "reorder"], Some(&ReorderRequest { ids }))
            .await
    }

    async fn start_agent(&self, id: &AgentId) -> GatewayResult<Option<Agent>> {
        let path = ["agents", id.as_str(), "start"];
        self.send_optional::<Agent, ()>(Method::POST, &path, None).await
    }

    async fn stop_agent(&self, id: &AgentId) -> GatewayResult<Option<Agent>> {
        let path = ["agents", id.as_str(), "stop"];
        self.send_optional::<Agent, ()>(Method::POST, &path, None).await
    }

    async fn list_tasks(&self) -> GatewayResult<Vec<Task>> {
        self.get_json(&["tasks"]).await
    }

    async fn create_task(&self, draft: &TaskDraft) -> GatewayResult<Created<Task>> {
        self.create(&["tasks"], draft).await
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> GatewayResult<Option<Task>> {
        let path = ["tasks", id.as_str()];
        self.send_optional(Method::PUT, &path, Some(patch)).await
    }

    async fn delete_task(&self, id: &TaskId) -> GatewayResult<()> {
        let path = ["tasks", id.as_str()];
        self.send_empty::<()>(Method::DELETE, &path, None).await
    }

    async fn reorder_tasks(&self, ids: &[TaskId]) -> GatewayResult<()> {
        self.send_empty(Method::POST, &["tasks", "reorder"], Some(&ReorderRequest { ids }))
            .await
    }

    async fn list_users(&self) -> GatewayResult<Vec<User>> {
        self.get_json(&["users"]).await
    }

    async fn create_user(&self, draft: &UserDraft) -> GatewayResult<Created<User>> {
        self.create(&["users"], draft).await
    }

    async fn update_user(&self, id: &UserId, patch: &UserPatch) -> GatewayResult<Option<User>> {
        let path = ["users", id.as_str()];
        self.send_optional(Method::PUT, &path, Some(patch)).await
    }

    async fn delete_user(&self, id: &UserId) -> GatewayResult<()> {
        let path = ["users", id.as_str()];
        self.send_empty::<()>(Method::DELETE, &path, None).await
    }

    async fn list_messages(&self, agent_id: &AgentId) -> GatewayResult<Vec<Message>> {
        let path = ["agents", agent_id.as_str(), "messages"];
        self.get_json(&path).await
    }

    async fn post_message(
        &self,
        agent_id: &AgentId,
        draft: &MessageDraft,
    ) -> GatewayResult<Message> {
        let path = ["agents", agent_id.as_str(), "messages"];
        self.send_json(Method::POST, &path, draft).await
    }

    async fn fetch_graph(&self) -> GatewayResult<KnowledgeGraph> {
        self.get_json(&["knowledge-graph"]).await
    }

    async fn add_graph_node(&self, draft: &GraphNodeDraft) -> GatewayResult<Created<GraphNode>> {
        self.create(&["knowledge-graph", "nodes"], draft).await
    }

    async fn fetch_settings(&self) -> GatewayResult<SystemSettings> {
        self.get_json(&["system_settings"]).await
    }

    async fn update_settings(
        &self,
        patch: &SettingsPatch,
    ) -> GatewayResult<Option<SystemSettings>> {
        self.send_optional(Method::PUT, &["system_settings"], Some(patch))
            .await
    }

    async fn login(&self, request: &LoginRequest) -> GatewayResult<LoginResponse> {
        self.send_json(Method::POST, &["auth", "login"], request).await
    }

    async fn logout(&self) -> GatewayResult<()> {
        self.send_empty::<()>(Method::POST, &["logout"], None).await
    }
}

impl fmt::Debug for RestGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayErrorKind::from_status(400), GatewayErrorKind::Validation);
        assert_eq!(GatewayErrorKind::from_status(422), GatewayErrorKind::Validation);
        assert_eq!(GatewayErrorKind::from_status(401), GatewayErrorKind::Unauthorized);
        assert_eq!(GatewayErrorKind::from_status(403), GatewayErrorKind::Unauthorized);
        assert_eq!(GatewayErrorKind::from_status(404), GatewayErrorKind::NotFound);
        assert_eq!(GatewayErrorKind::from_status(409), GatewayErrorKind::Conflict);
        assert_eq!(GatewayErrorKind::from_status(503), GatewayErrorKind::Server);
        assert_eq!(GatewayErrorKind::from_status(418), GatewayErrorKind::Unknown);
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let gw = RestGateway::with_base_url("http://localhost:8080/api/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            gw.endpoint(&["agents", "a/b?c", "start"]).as_str(),
            "http://localhost:8080/api/agents/a%2Fb%3Fc/start"
        );

        let gw = RestGateway::with_base_url("http://localhost:8080", Duration::from_secs(1)).unwrap();
        assert_eq!(gw.endpoint(&["users"]).as_str(), "http://localhost:8080/users");
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        assert!(RestGateway::with_base_url("not a url", Duration::from_secs(1)).is_err());
        assert!(RestGateway::with_base_url("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_error_message_prefers_body_fields() {
        let err = GatewayError::from_response(400, r#"{"error":"Agent name is required"}"#.into());
        assert_eq!(err.message, "Agent name is required");
        assert_eq!(err.status, Some(400));

        let err = GatewayError::from_response(500, r#"{"code":"X","message":"boom"}"#.into());
        assert_eq!(err.message, "boom");

        let err = GatewayError::from_response(502, "<html>bad gateway</html>".into());
        assert_eq!(err.message, "HTTP 502");
        assert_eq!(err.body.as_deref(), Some("<html>bad gateway</html>"));
    }

    #[test]
    fn test_decode_created_accepts_entity_or_ack() {
        let full = r#"{"id":"a1","name":"Scout"}"#;
        match decode_created::<Agent>(full).unwrap() {
            Created::Entity(agent) => assert_eq!(agent.name, "Scout"),
            other => panic!("unexpected {:?}", other),
        }

        let ack = r#"{"message":"Agent created","id":12}"#;
        assert_eq!(
            decode_created::<Agent>(ack).unwrap(),
            Created::Acknowledged(AgentId::from("12"))
        );

        assert!(decode_created::<Agent>(r#"{"message":"ok"}"#).is_err());
    }

    #[test]
    fn test_decode_optional_treats_ack_as_none() {
        assert!(decode_optional::<Agent>("").is_none());
        assert!(decode_optional::<Agent>(r#"{"message":"Agent updated"}"#).is_none());
        assert!(decode_optional::<Agent>(r#"{"id":"1","name":"Scout"}"#).is_some());
    }

    #[test]
    fn test_login_debug_redacts_password() {
        let request = LoginRequest {
            email: "ada@example.com".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", request).contains("hunter2"));
    }
}
