//! GitHub REST implementation of the remote gateway.
//!
//! Rate limits and auth are owned here, not by the core. The local issue
//! id is embedded in the rendered body as a `**<id>**` marker so humans
//! (and older tooling) can correlate remote issues with source files.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value, json};

use crate::core::{IssueDefinition, RemoteHandle};

use super::{
    GatewayError, LabelRef, LabelSpec, MilestoneNumber, MilestoneSpec, RemoteGateway,
};

const PAGE_SIZE: usize = 100;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("issuesync/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GitHubGateway {
    owner: String,
    repo: String,
    token: String,
    api_base: String,
    client: Client,
}

impl GitHubGateway {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GatewayError::permanent(format!("http client init failed: {e}")))?;
        Ok(Self {
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            client,
        })
    }

    /// Token from `GITHUB_TOKEN`.
    pub fn from_env(
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let token = std::env::var("GITHUB_TOKEN")
            .map_err(|_| GatewayError::permanent("GITHUB_TOKEN environment variable required"))?;
        Self::new(owner, repo, token)
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{path}",
            self.api_base, self.owner, self.repo
        )
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder) -> Result<Value, GatewayError> {
        let response = req
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .map_err(|e| GatewayError::transient(format!("request failed: {e}")))?;

        let status = response.status();
        let rate_limited = status == StatusCode::FORBIDDEN
            && response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0");
        if status.is_success() {
            response
                .json()
                .map_err(|e| GatewayError::permanent(format!("invalid response body: {e}")))
        } else {
            let detail = response.text().unwrap_or_default();
            Err(classify_status(status, rate_limited, &detail))
        }
    }

    /// Collect every item from a paginated list endpoint.
    fn list_all(&self, path: &str, extra_query: &str) -> Result<Vec<Value>, GatewayError> {
        let mut items = Vec::new();
        for page in 1.. {
            let url = format!(
                "{}?per_page={PAGE_SIZE}&page={page}{extra_query}",
                self.url(path)
            );
            let body = self.send(self.client.get(url))?;
            let batch = body.as_array().cloned().ok_or_else(|| {
                GatewayError::permanent(format!("list response for {path} is not an array"))
            })?;
            let len = batch.len();
            items.extend(batch);
            if len < PAGE_SIZE {
                break;
            }
        }
        Ok(items)
    }
}

/// HTTP status to gateway error classification.
fn classify_status(status: StatusCode, rate_limited: bool, detail: &str) -> GatewayError {
    let snippet: String = detail.chars().take(200).collect();
    if rate_limited {
        GatewayError::transient(format!("rate limited: {snippet}"))
    } else if status.is_server_error() {
        GatewayError::transient(format!("server error {status}: {snippet}"))
    } else {
        GatewayError::permanent(format!("request refused {status}: {snippet}"))
    }
}

impl RemoteGateway for GitHubGateway {
    fn ensure_labels(&self, specs: &[LabelSpec]) -> Result<(), GatewayError> {
        let existing: BTreeSet<String> = self
            .list_all("labels", "")?
            .iter()
            .filter_map(|item| item.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        for spec in specs {
            if existing.contains(&spec.name) {
                continue;
            }
            let payload = json!({
                "name": spec.name,
                "color": spec.color,
                "description": spec.description,
            });
            self.send(self.client.post(self.url("labels")).json(&payload))?;
            tracing::info!(label = %spec.name, "created remote label");
        }
        Ok(())
    }

    fn ensure_milestones(
        &self,
        specs: &[MilestoneSpec],
    ) -> Result<BTreeMap<String, MilestoneNumber>, GatewayError> {
        let mut directory = BTreeMap::new();
        for item in self.list_all("milestones", "&state=all")? {
            let title = item.get("title").and_then(Value::as_str);
            let number = item.get("number").and_then(Value::as_u64);
            if let (Some(title), Some(number)) = (title, number) {
                directory.insert(title.to_string(), MilestoneNumber::new(number));
            }
        }
        for spec in specs {
            if directory.contains_key(&spec.title) {
                continue;
            }
            let payload = json!({
                "title": spec.title,
                "description": spec.description,
            });
            let body = self.send(self.client.post(self.url("milestones")).json(&payload))?;
            let number = body.get("number").and_then(Value::as_u64).ok_or_else(|| {
                GatewayError::permanent("milestone response missing number")
            })?;
            directory.insert(spec.title.clone(), MilestoneNumber::new(number));
            tracing::info!(milestone = %spec.title, number, "created remote milestone");
        }
        Ok(directory)
    }

    fn create_issue(
        &self,
        issue: &IssueDefinition,
        labels: &BTreeSet<LabelRef>,
        milestone: Option<MilestoneNumber>,
    ) -> Result<RemoteHandle, GatewayError> {
        let payload = issue_payload(issue, labels, milestone);
        let body = self.send(self.client.post(self.url("issues")).json(&payload))?;
        let number = body
            .get("number")
            .and_then(Value::as_u64)
            .ok_or_else(|| GatewayError::permanent("create response missing issue number"))?;
        Ok(RemoteHandle::new(number))
    }

    fn update_issue(
        &self,
        handle: RemoteHandle,
        issue: &IssueDefinition,
        labels: &BTreeSet<LabelRef>,
        milestone: Option<MilestoneNumber>,
    ) -> Result<(), GatewayError> {
        let payload = issue_payload(issue, labels, milestone);
        let path = format!("issues/{}", handle.number());
        self.send(self.client.patch(self.url(&path)).json(&payload))?;
        Ok(())
    }
}

fn issue_payload(
    issue: &IssueDefinition,
    labels: &BTreeSet<LabelRef>,
    milestone: Option<MilestoneNumber>,
) -> Value {
    let mut payload = json!({
        "title": format!("[{}] {}", issue.issue_type.as_str().to_uppercase(), issue.title),
        "body": render_issue_body(issue),
        "labels": labels.iter().map(LabelRef::as_str).collect::<Vec<_>>(),
    });
    if let Some(milestone) = milestone {
        payload["milestone"] = json!(milestone.number());
    }
    payload
}

/// Markdown body for the remote issue.
pub fn render_issue_body(issue: &IssueDefinition) -> String {
    let mut sections = Vec::new();

    sections.push(format!(
        "**{}** | {} | priority: {}",
        issue.id,
        issue.issue_type.as_str(),
        issue.priority.as_str()
    ));

    if !issue.depends_on.is_empty() {
        let refs: Vec<String> = issue
            .depends_on
            .iter()
            .map(|dep| format!("`{dep}`"))
            .collect();
        sections.push(format!("**Depends On:** {}", refs.join(", ")));
    }

    if !issue.acceptance_criteria.is_empty() {
        let mut lines = vec!["### Acceptance Criteria".to_string(), String::new()];
        for ac in &issue.acceptance_criteria {
            lines.push(format!("**{}**", ac.id));
            lines.push(format!("- **Given** {}", ac.given));
            lines.push(format!("- **When** {}", ac.when));
            lines.push(format!("- **Then** {}", ac.then));
            lines.push(String::new());
        }
        sections.push(lines.join("\n").trim_end().to_string());
    }

    if !issue.technical_context.is_null() {
        let rendered = serde_json::to_string_pretty(&issue.technical_context)
            .unwrap_or_else(|_| issue.technical_context.to_string());
        sections.push(format!("### Technical Context\n\n```json\n{rendered}\n```"));
    }

    sections.join("\n\n")
}
