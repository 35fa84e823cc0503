use super::auth::{build_app_jwt, Credentials, InstallationToken};
use super::RepoRef;
use crate::controller::clock::Clock;
use crate::controller::tracker::{ContentFile, IssueTracker, NewTicket, Ticket, TrackerError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";

/// GitHub REST client scoped to one repository
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    repo: RepoRef,
    credentials: Credentials,
    clock: Arc<dyn Clock>,
    /// Cached installation token (app credentials only)
    installation_token: Mutex<Option<InstallationToken>>,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    body: Option<String>,
    /// Present when the "issue" is a pull request
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<IssueResponse> for Ticket {
    fn from(issue: IssueResponse) -> Self {
        Ticket {
            number: issue.number,
            title: issue.title,
            body: issue.body,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileCommitResponse {
    content: Option<FileCommitContent>,
}

#[derive(Debug, Deserialize)]
struct FileCommitContent {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutFileRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AppResponse {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    full_name: String,
}

impl GitHubClient {
    pub fn new(
        api_base: &str,
        repo: RepoRef,
        credentials: Credentials,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("valvoja/", env!("CARGO_PKG_VERSION")))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to build GitHub HTTP client, using default");
                reqwest::Client::new()
            }
        };

        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo,
            credentials,
            clock,
            installation_token: Mutex::new(None),
        }
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.repo.owner, self.repo.name, path
        )
    }

    fn request(&self, method: Method, url: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(bearer)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Bearer token for repository calls, refreshing the installation token when needed
    async fn access_token(&self) -> Result<String, TrackerError> {
        let app = match &self.credentials {
            Credentials::Token(token) => return Ok(token.clone()),
            Credentials::App(app) => app,
        };

        let mut cached = self.installation_token.lock().await;
        let now = self.clock.now();
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.token.clone());
        }

        let jwt = build_app_jwt(app, now)?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, app.installation_id
        );
        let response = send(self.request(Method::POST, &url, &jwt), "POST", &url).await?;
        let token: InstallationToken = decode(response, &url).await?;
        debug!(expires_at = %token.expires_at, "Refreshed installation token");

        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }
}

/// Send a request and turn non-2xx responses into `TrackerError::Status`
async fn send(
    builder: RequestBuilder,
    method: &'static str,
    url: &str,
) -> Result<Response, TrackerError> {
    let response = builder.send().await.map_err(|source| TrackerError::Http {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TrackerError::Status {
            method,
            url: url.to_string(),
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, TrackerError> {
    response
        .json()
        .await
        .map_err(|e| TrackerError::InvalidResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

fn commit_sha(response: FileCommitResponse, url: &str) -> Result<String, TrackerError> {
    response
        .content
        .map(|c| c.sha)
        .ok_or_else(|| TrackerError::InvalidResponse {
            url: url.to_string(),
            reason: "file commit response has no content sha".to_string(),
        })
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn authenticate(&self) -> Result<String, TrackerError> {
        match &self.credentials {
            Credentials::App(app) => {
                let jwt = build_app_jwt(app, self.clock.now())?;
                let url = format!("{}/app", self.api_base);
                let response = send(self.request(Method::GET, &url, &jwt), "GET", &url).await?;
                let app_info: AppResponse = decode(response, &url).await?;
                // Fail early if the installation cannot act on the repository
                self.access_token().await?;
                Ok(app_info.slug)
            }
            Credentials::Token(token) => {
                // Actions installation tokens get 403 from /user; stay repository scoped
                let url = format!(
                    "{}/repos/{}/{}",
                    self.api_base, self.repo.owner, self.repo.name
                );
                let response = send(self.request(Method::GET, &url, token), "GET", &url).await?;
                let repository: RepositoryResponse = decode(response, &url).await?;
                Ok(repository.full_name)
            }
        }
    }

    async fn list_open_tickets(&self, label: &str) -> Result<Vec<Ticket>, TrackerError> {
        let token = self.access_token().await?;
        let url = self.repo_url("issues");
        let request = self
            .request(Method::GET, &url, &token)
            .query(&[("state", "open"), ("labels", label), ("per_page", "100")]);
        let response = send(request, "GET", &url).await?;
        let issues: Vec<IssueResponse> = decode(response, &url).await?;

        Ok(issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .map(Ticket::from)
            .collect())
    }

    async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket, TrackerError> {
        let token = self.access_token().await?;
        let url = self.repo_url("issues");
        let request = self.request(Method::POST, &url, &token).json(&json!({
            "title": ticket.title,
            "body": ticket.body,
            "labels": ticket.labels,
        }));
        let response = send(request, "POST", &url).await?;
        let issue: IssueResponse = decode(response, &url).await?;
        Ok(issue.into())
    }

    async fn close_ticket(&self, number: u64) -> Result<(), TrackerError> {
        let token = self.access_token().await?;
        let url = self.repo_url(&format!("issues/{}", number));
        let request = self
            .request(Method::PATCH, &url, &token)
            .json(&json!({ "state": "closed" }));
        send(request, "PATCH", &url).await?;
        Ok(())
    }

    async fn create_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String, TrackerError> {
        let token = self.access_token().await?;
        let url = self.repo_url(&format!("contents/{}", path));
        let request = self.request(Method::PUT, &url, &token).json(&PutFileRequest {
            message,
            content: STANDARD.encode(content),
            sha: None,
        });
        let response = send(request, "PUT", &url).await?;
        commit_sha(decode(response, &url).await?, &url)
    }

    async fn get_file(&self, path: &str) -> Result<ContentFile, TrackerError> {
        let token = self.access_token().await?;
        let url = self.repo_url(&format!("contents/{}", path));
        let response = send(self.request(Method::GET, &url, &token), "GET", &url).await?;
        let file: ContentResponse = decode(response, &url).await?;

        let invalid = |reason: String| TrackerError::InvalidResponse {
            url: url.clone(),
            reason,
        };
        if let Some(encoding) = file.encoding.as_deref() {
            if encoding != "base64" {
                return Err(invalid(format!("unsupported content encoding '{}'", encoding)));
            }
        }
        // GitHub wraps base64 content at 60 columns
        let encoded: String = file
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| invalid(format!("invalid base64 content: {}", e)))?;
        let content =
            String::from_utf8(bytes).map_err(|e| invalid(format!("content is not UTF-8: {}", e)))?;

        Ok(ContentFile {
            path: path.to_string(),
            sha: file.sha,
            content,
        })
    }

    async fn update_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: &str,
    ) -> Result<String, TrackerError> {
        let token = self.access_token().await?;
        let url = self.repo_url(&format!("contents/{}", path));
        let request = self.request(Method::PUT, &url, &token).json(&PutFileRequest {
            message,
            content: STANDARD.encode(content),
            sha: Some(sha),
        });
        let response = send(request, "PUT", &url).await?;
        commit_sha(decode(response, &url).await?, &url)
    }
}
