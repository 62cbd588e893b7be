use crate::application::data_service::DataService;
use crate::domain::models::{
    LogEntry, LogQuery, SessionKind, TaskNode, TaskNodePatch, TimerSession, TimerSettings,
    TimerSettingsPatch,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// REST backend reached over the network.
#[derive(Debug, Clone)]
pub struct HttpDataService {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest<'a> {
    session_type: SessionKind,
    task_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct EndSessionRequest {
    duration: u32,
    completed: bool,
}

impl HttpDataService {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(InfraError::InvalidConfig("data service base url must not be empty".to_string()));
        }
        let base_url = Url::parse(trimmed)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid data service base url '{trimmed}': {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "data service base url cannot be a base: {trimmed}"
            )));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| InfraError::Http(format!("failed building http client: {error}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::InvalidConfig("data service base url cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("api");
            for segment in path {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    fn http_error(context: &str, status: StatusCode, body: &str) -> InfraError {
        if status == StatusCode::NOT_FOUND {
            return InfraError::NotFound(format!("{context}: http 404"));
        }
        let message = if body.trim().is_empty() {
            format!("{context}: http {}", status.as_u16())
        } else {
            format!("{context}: http {}; body={body}", status.as_u16())
        };
        InfraError::Http(message)
    }

    async fn execute(&self, request: RequestBuilder, context: &str) -> Result<String, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Http(format!("network error during {context}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Http(format!("failed reading {context} response: {error}")))?;

        if !status.is_success() {
            return Err(Self::http_error(context, status, &body));
        }
        Ok(body)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder, context: &str) -> Result<T, InfraError> {
        let body = self.execute(request, context).await?;
        serde_json::from_str(&body)
            .map_err(|error| InfraError::Http(format!("invalid {context} payload: {error}; body={body}")))
    }
}

#[async_trait]
impl DataService for HttpDataService {
    async fn fetch_task_tree(&self) -> Result<Vec<TaskNode>, InfraError> {
        let url = self.endpoint(&["tasks", "tree"])?;
        self.fetch_json(self.client.get(url), "fetch task tree").await
    }

    async fn fetch_deleted_tasks(&self) -> Result<Vec<TaskNode>, InfraError> {
        let url = self.endpoint(&["tasks", "deleted"])?;
        self.fetch_json(self.client.get(url), "fetch deleted tasks").await
    }

    async fn create_task(&self, node: &TaskNode) -> Result<TaskNode, InfraError> {
        let url = self.endpoint(&["tasks"])?;
        self.fetch_json(self.client.post(url).json(node), "create task").await
    }

    async fn update_task(&self, id: &str, patch: &TaskNodePatch) -> Result<TaskNode, InfraError> {
        let url = self.endpoint(&["tasks", id])?;
        self.fetch_json(self.client.put(url).json(patch), "update task").await
    }

    async fn sync_task_tree(&self, nodes: &[TaskNode]) -> Result<(), InfraError> {
        let url = self.endpoint(&["tasks", "tree"])?;
        self.execute(self.client.put(url).json(nodes), "sync task tree").await?;
        Ok(())
    }

    async fn soft_delete_task(&self, id: &str) -> Result<(), InfraError> {
        let url = self.endpoint(&["tasks", id, "soft"])?;
        self.execute(self.client.delete(url), "soft delete task").await?;
        Ok(())
    }

    async fn restore_task(&self, id: &str) -> Result<(), InfraError> {
        let url = self.endpoint(&["tasks", id, "restore"])?;
        self.execute(self.client.post(url), "restore task").await?;
        Ok(())
    }

    async fn permanent_delete_task(&self, id: &str) -> Result<(), InfraError> {
        let url = self.endpoint(&["tasks", id])?;
        self.execute(self.client.delete(url), "delete task").await?;
        Ok(())
    }

    async fn migrate_tasks(&self, nodes: &[TaskNode]) -> Result<(), InfraError> {
        let url = self.endpoint(&["migrate", "tasks"])?;
        self.execute(self.client.post(url).json(nodes), "migrate tasks").await?;
        Ok(())
    }

    async fn start_timer_session(
        &self,
        kind: SessionKind,
        task_id: Option<&str>,
    ) -> Result<TimerSession, InfraError> {
        let url = self.endpoint(&["timer-sessions"])?;
        let request = StartSessionRequest {
            session_type: kind,
            task_id,
        };
        self.fetch_json(self.client.post(url).json(&request), "start timer session")
            .await
    }

    async fn end_timer_session(
        &self,
        id: i64,
        duration_seconds: u32,
        completed: bool,
    ) -> Result<TimerSession, InfraError> {
        let url = self.endpoint(&["timer-sessions", &id.to_string()])?;
        let request = EndSessionRequest {
            duration: duration_seconds,
            completed,
        };
        self.fetch_json(self.client.put(url).json(&request), "end timer session")
            .await
    }

    async fn fetch_timer_sessions(&self) -> Result<Vec<TimerSession>, InfraError> {
        let url = self.endpoint(&["timer-sessions"])?;
        self.fetch_json(self.client.get(url), "fetch timer sessions").await
    }

    async fn fetch_sessions_by_task(&self, task_id: &str) -> Result<Vec<TimerSession>, InfraError> {
        let url = self.endpoint(&["tasks", task_id, "sessions"])?;
        self.fetch_json(self.client.get(url), "fetch task sessions").await
    }

    async fn fetch_timer_settings(&self) -> Result<TimerSettings, InfraError> {
        let url = self.endpoint(&["timer-settings"])?;
        self.fetch_json(self.client.get(url), "fetch timer settings").await
    }

    async fn update_timer_settings(
        &self,
        patch: &TimerSettingsPatch,
    ) -> Result<TimerSettings, InfraError> {
        let url = self.endpoint(&["timer-settings"])?;
        self.fetch_json(self.client.put(url).json(patch), "update timer settings")
            .await
    }

    async fn fetch_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, InfraError> {
        let url = self.endpoint(&["diagnostics", "logs"])?;
        let mut request = self.client.get(url);
        if let Some(level) = query.level.as_deref() {
            request = request.query(&[("level", level)]);
        }
        if let Some(limit) = query.limit {
            request = request.query(&[("limit", limit)]);
        }
        self.fetch_json(request, "fetch logs").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned response and hands back the raw request text.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let address = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buffer = vec![0u8; 16 * 1024];
            let mut received = Vec::new();
            loop {
                let read = socket.read(&mut buffer).await.expect("read request");
                if read == 0 {
                    break;
                }
                received.extend_from_slice(&buffer[..read]);
                let text = String::from_utf8_lossy(&received);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if received.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.expect("write response");
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&received).to_string()
        });
        (format!("http://{address}"), handle)
    }

    #[test]
    fn endpoint_appends_api_segments_and_escapes_ids() {
        let service = HttpDataService::new("http://localhost:8080/").expect("service");
        let url = service.endpoint(&["tasks", "a b/c", "soft"]).expect("url");
        assert_eq!(url.as_str(), "http://localhost:8080/api/tasks/a%20b%2Fc/soft");

        let nested = HttpDataService::new("https://example.com/sonicflow").expect("service");
        assert_eq!(
            nested.endpoint(&["timer-settings"]).expect("url").as_str(),
            "https://example.com/sonicflow/api/timer-settings"
        );
    }

    #[test]
    fn new_rejects_invalid_base_urls() {
        assert!(HttpDataService::new("   ").is_err());
        assert!(HttpDataService::new("not a url").is_err());
        assert!(HttpDataService::new("mailto:someone@example.com").is_err());
    }

    #[test]
    fn http_error_includes_status_and_body() {
        let error = HttpDataService::http_error("sync task tree", StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(
            error.to_string(),
            "data service request failed: sync task tree: http 500; body=boom"
        );
        assert!(matches!(
            HttpDataService::http_error("update task", StatusCode::NOT_FOUND, ""),
            InfraError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn fetch_task_tree_parses_backend_payload() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"[{"id":"task-1","type":"task","title":"Draft","parentId":null,"order":0,"status":"TODO","isExpanded":null,"isDeleted":false,"createdAt":"2026-02-16T08:00:00Z"}]"#,
        )
        .await;
        let service = HttpDataService::new(&base_url).expect("service");
        let nodes = service.fetch_task_tree().await.expect("fetch tree");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].title, "Draft");

        let request = server.await.expect("server task");
        assert!(request.starts_with("GET /api/tasks/tree HTTP/1.1"));
    }

    #[tokio::test]
    async fn sync_task_tree_puts_full_snapshot_and_surfaces_errors() {
        let (base_url, server) = serve_once("HTTP/1.1 503 Service Unavailable", "down").await;
        let service = HttpDataService::new(&base_url).expect("service");
        let node = TaskNode::new(
            "task-1",
            crate::domain::models::NodeType::Task,
            "Draft",
            None,
            0,
            chrono::Utc::now(),
        );
        let error = service
            .sync_task_tree(std::slice::from_ref(&node))
            .await
            .expect_err("sync should fail");
        assert!(error.to_string().contains("http 503; body=down"));

        let request = server.await.expect("server task");
        assert!(request.starts_with("PUT /api/tasks/tree HTTP/1.1"));
        assert!(request.contains("\"id\":\"task-1\""));
    }
}
