use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_core::{ChangeMetadata, Comment, GitHubConfig, QuillError};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::services::ChangeHost;

const PER_PAGE: usize = 100;
const ERROR_BODY_CHARS: usize = 200;

/// A pull request address: `owner/repo#number`.
///
/// # Examples
///
/// ```
/// use quill_review::github::PullRequestRef;
///
/// let pr: PullRequestRef = "rust-lang/rust#12345".parse().unwrap();
/// assert_eq!(pr.owner, "rust-lang");
/// assert_eq!(pr.repo, "rust");
/// assert_eq!(pr.number, 12345);
/// assert_eq!(pr.to_string(), "rust-lang/rust#12345");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Pull request number.
    pub number: u64,
}

impl FromStr for PullRequestRef {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_pr_reference(s)
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Parse a PR reference string (`owner/repo#number`) into its components.
///
/// # Errors
///
/// Returns [`QuillError::Config`] if the format is invalid.
///
/// # Examples
///
/// ```
/// use quill_review::github::parse_pr_reference;
///
/// let pr = parse_pr_reference("octocat/hello-world#42").unwrap();
/// assert_eq!(pr.owner, "octocat");
/// assert_eq!(pr.repo, "hello-world");
/// assert_eq!(pr.number, 42);
/// ```
pub fn parse_pr_reference(pr_ref: &str) -> Result<PullRequestRef, QuillError> {
    let invalid =
        || QuillError::Config(format!("invalid PR reference '{pr_ref}', expected owner/repo#number"));
    let (owner_repo, number_str) = pr_ref.split_once('#').ok_or_else(invalid)?;
    let (owner, repo) = owner_repo.split_once('/').ok_or_else(invalid)?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return Err(invalid());
    }
    let number: u64 = number_str
        .parse()
        .map_err(|_| QuillError::Config(format!("invalid PR number: {number_str}")))?;
    Ok(PullRequestRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
        number,
    })
}

#[derive(Deserialize)]
struct PullRequest {
    title: String,
    body: Option<String>,
    head: HeadRef,
}

#[derive(Deserialize)]
struct HeadRef {
    #[serde(rename = "ref")]
    ref_field: String,
}

#[derive(Deserialize)]
struct PullCommit {
    sha: String,
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    message: String,
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct IssueComment {
    id: u64,
    user: Option<User>,
    body: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<IssueComment> for Comment {
    fn from(c: IssueComment) -> Self {
        Comment {
            id: c.id,
            author: c.user.map(|u| u.login).unwrap_or_default(),
            body: c.body.unwrap_or_default(),
            created_at: c.created_at,
        }
    }
}

#[derive(Serialize)]
struct PageQuery {
    per_page: usize,
    page: u32,
}

#[derive(Serialize)]
struct BodyUpdate<'a> {
    body: &'a str,
}

/// GitHub client bound to a single pull request.
///
/// Structured calls go through octocrab; the raw diff is fetched with
/// reqwest using the `application/vnd.github.v3.diff` media type.
///
/// # Examples
///
/// ```no_run
/// use quill_core::GitHubConfig;
/// use quill_review::github::GitHubClient;
///
/// let config = GitHubConfig {
///     token: Some("ghp_xxxx".into()),
///     ..GitHubConfig::default()
/// };
/// let client = GitHubClient::new(&config, "octocat/hello-world#42".parse().unwrap()).unwrap();
/// ```
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
    http: reqwest::Client,
    api_url: String,
    token: String,
    pr: PullRequestRef,
    identity: OnceCell<String>,
}

impl GitHubClient {
    /// Create a client for `pr`, taking the token from config or environment.
    ///
    /// Requests go to `config.api_url()`. A configured `login` is used as
    /// the agent identity instead of asking `GET /user`.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] if no token is available, or
    /// [`QuillError::Host`] if the client cannot be built.
    pub fn new(config: &GitHubConfig, pr: PullRequestRef) -> Result<Self, QuillError> {
        let token = config.resolved_token().ok_or_else(|| {
            QuillError::Config(
                "GitHub token not set. Set [github] token in .quill.toml or GITHUB_TOKEN".into(),
            )
        })?;

        let api_url = config.api_url().to_string();
        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token.clone())
            .base_uri(api_url.as_str())
            .and_then(|builder| builder.build())
            .map_err(|e| QuillError::Host(format!("failed to create GitHub client: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent("quill")
            .build()
            .map_err(|e| QuillError::Host(format!("failed to create HTTP client: {e}")))?;

        let identity = match config.login.as_deref().map(str::trim) {
            Some(login) if !login.is_empty() => OnceCell::new_with(Some(login.to_string())),
            _ => OnceCell::new(),
        };

        Ok(Self {
            octocrab,
            http,
            api_url,
            token,
            pr,
            identity,
        })
    }

    /// The pull request this client is bound to.
    pub fn pull_request(&self) -> &PullRequestRef {
        &self.pr
    }

    fn repo_route(&self) -> String {
        format!("/repos/{}/{}", self.pr.owner, self.pr.repo)
    }

    fn pull_route(&self) -> String {
        format!("{}/pulls/{}", self.repo_route(), self.pr.number)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        route: &str,
        query: Option<&PageQuery>,
    ) -> Result<T, QuillError> {
        self.octocrab
            .get(route, query)
            .await
            .map_err(|e| QuillError::Host(format!("GET {route} failed: {e}")))
    }

    async fn get_all_pages<T: serde::de::DeserializeOwned>(
        &self,
        route: &str,
    ) -> Result<Vec<T>, QuillError> {
        let mut items = Vec::new();
        for page in 1.. {
            let query = PageQuery {
                per_page: PER_PAGE,
                page,
            };
            let batch: Vec<T> = self.get_json(route, Some(&query)).await?;
            let done = batch.len() < PER_PAGE;
            items.extend(batch);
            if done {
                break;
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl ChangeHost for GitHubClient {
    async fn fetch_metadata(&self) -> Result<ChangeMetadata, QuillError> {
        let route = self.pull_route();
        let pull: PullRequest = self.get_json(&route, None).await?;
        let commits: Vec<PullCommit> = self.get_all_pages(&format!("{route}/commits")).await?;
        tracing::debug!(pr = %self.pr, commits = commits.len(), "fetched pull request");

        Ok(ChangeMetadata {
            branch: pull.head.ref_field,
            title: pull.title,
            description: pull.body.unwrap_or_default(),
            commits: condense_commits(
                commits
                    .iter()
                    .map(|c| (c.sha.as_str(), c.commit.message.as_str())),
            ),
        })
    }

    async fn fetch_description(&self) -> Result<String, QuillError> {
        let pull: PullRequest = self.get_json(&self.pull_route(), None).await?;
        Ok(pull.body.unwrap_or_default())
    }

    async fn fetch_diff(&self, exclude: &[String]) -> Result<String, QuillError> {
        let url = format!("{}{}", self.api_url, self.pull_route());
        tracing::debug!(excluded = exclude.len(), "fetching full diff, exclusions applied locally");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github.v3.diff")
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|e| QuillError::Host(format!("failed to fetch PR diff: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuillError::Host(format!(
                "GitHub API error {status} fetching diff: {}",
                body.chars().take(ERROR_BODY_CHARS).collect::<String>()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| QuillError::Host(format!("failed to read diff response: {e}")))
    }

    async fn current_user(&self) -> Result<String, QuillError> {
        self.identity
            .get_or_try_init(|| async {
                let user: User = self.octocrab.get("/user", None::<&()>).await.map_err(|e| {
                    QuillError::Host(format!(
                        "GET /user failed: {e}. App and Actions tokens cannot read /user; \
                         set [github] login (e.g. \"github-actions[bot]\")"
                    ))
                })?;
                Ok::<_, QuillError>(user.login)
            })
            .await
            .cloned()
    }

    async fn list_comments(&self) -> Result<Vec<Comment>, QuillError> {
        let route = format!("{}/issues/{}/comments", self.repo_route(), self.pr.number);
        let comments: Vec<IssueComment> = self.get_all_pages(&route).await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    async fn create_comment(&self, body: &str) -> Result<Comment, QuillError> {
        let route = format!("{}/issues/{}/comments", self.repo_route(), self.pr.number);
        let created: IssueComment = self
            .octocrab
            .post(route, Some(&BodyUpdate { body }))
            .await
            .map_err(|e| QuillError::Host(format!("failed to create comment: {e}")))?;
        Ok(created.into())
    }

    async fn edit_comment(&self, id: u64, body: &str) -> Result<(), QuillError> {
        let route = format!("{}/issues/comments/{id}", self.repo_route());
        let _response: serde_json::Value = self
            .octocrab
            .patch(route, Some(&BodyUpdate { body }))
            .await
            .map_err(|e| QuillError::Host(format!("failed to edit comment {id}: {e}")))?;
        Ok(())
    }

    async fn update_description(&self, body: &str) -> Result<(), QuillError> {
        let route = self.pull_route();
        let _response: serde_json::Value = self
            .octocrab
            .patch(route, Some(&BodyUpdate { body }))
            .await
            .map_err(|e| QuillError::Host(format!("failed to update description: {e}")))?;
        Ok(())
    }
}

/// One `- <sha7> <subject>` line per commit.
fn condense_commits<'a>(commits: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let mut log = String::new();
    for (sha, message) in commits {
        let short: String = sha.chars().take(7).collect();
        let subject = message.lines().next().unwrap_or_default().trim();
        log.push_str(&format!("- {short} {subject}\n"));
    }
    log
}
