use crate::config::GitHubConfig;
use crate::traits::DiscussionBoard;
use crate::types::{ExistingPost, NewPost, Result, SuggesterError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const LIST_QUERY: &str = r#"
query($owner: String!, $name: String!, $categoryId: ID!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    discussions(first: $first, after: $after, categoryId: $categoryId, orderBy: {field: CREATED_AT, direction: DESC}) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number
        title
        body
        url
        labels(first: 10) { nodes { name } }
      }
    }
  }
}
"#;

const CATEGORIES_QUERY: &str = r#"
query($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    id
    discussionCategories(first: 25) {
      nodes { id name }
    }
  }
}
"#;

const CREATE_MUTATION: &str = r#"
mutation($repoId: ID!, $categoryId: ID!, $title: String!, $body: String!) {
  createDiscussion(input: {
    repositoryId: $repoId,
    categoryId: $categoryId,
    title: $title,
    body: $body
  }) {
    discussion { id number url }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryData<T> {
    repository: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DiscussionList {
    discussions: DiscussionPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscussionPage {
    page_info: PageInfo,
    nodes: Vec<DiscussionNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscussionNode {
    number: u64,
    title: String,
    body: Option<String>,
    url: Option<String>,
    labels: Option<Nodes<Named>>,
}

/// Repository and category node ids, as the mutation and the listing need them.
struct CategoryRef {
    repository_id: String,
    category_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryList {
    id: String,
    discussion_categories: Nodes<Named>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateData {
    create_discussion: CreatedDiscussion,
}

#[derive(Debug, Deserialize)]
struct CreatedDiscussion {
    discussion: CreatedNode,
}

#[derive(Debug, Deserialize)]
struct CreatedNode {
    number: u64,
    url: String,
}

/// GitHub Discussions over the GraphQL API.
pub struct GitHubDiscussions {
    http: Client,
    api_url: String,
    owner: String,
    name: String,
    page_size: u32,
    max_pages: u32,
    resolution_labels: Vec<String>,
}

impl GitHubDiscussions {
    /// `resolution_labels` are the labels reported as a post's resolution label.
    pub fn new(config: &GitHubConfig, resolution_labels: Vec<String>) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(SuggesterError::MissingCredential("GITHUB_TOKEN".to_string()));
        }

        let (owner, name) = config
            .repo
            .split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty())
            .ok_or_else(|| SuggesterError::Config(format!("repo must be owner/name, got '{}'", config.repo)))?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.token.trim()))
            .map_err(|e| SuggesterError::Config(format!("invalid GitHub token header: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("site-suggester"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            owner: owner.to_string(),
            name: name.to_string(),
            page_size: config.page_size.clamp(1, 100),
            max_pages: config.max_pages.max(1),
            resolution_labels,
        })
    }

    async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let response = self
            .http
            .post(&self.api_url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SuggesterError::MissingCredential("GITHUB_TOKEN was rejected (401)".to_string()));
        }
        if !status.is_success() {
            return Err(SuggesterError::HttpStatus {
                status: status.as_u16(),
                url: self.api_url.clone(),
            });
        }

        let body: GraphQlResponse<T> = response.json().await?;
        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(SuggesterError::Platform(messages.join("; ")));
        }

        body.data
            .ok_or_else(|| SuggesterError::Platform("GraphQL response without data".to_string()))
    }

    fn resolution_label(&self, labels: &[Named]) -> Option<String> {
        labels
            .iter()
            .find(|l| self.resolution_labels.iter().any(|r| r.eq_ignore_ascii_case(&l.name)))
            .map(|l| l.name.clone())
    }

    async fn category(&self, category: &str) -> Result<CategoryRef> {
        let data: RepositoryData<CategoryList> = self
            .graphql(CATEGORIES_QUERY, json!({ "owner": self.owner, "name": self.name }))
            .await?;

        let repository = data
            .repository
            .ok_or_else(|| SuggesterError::Config(format!("repository {}/{} not found", self.owner, self.name)))?;

        let category_id = repository
            .discussion_categories
            .nodes
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(category))
            .and_then(|c| c.id.clone());

        match category_id {
            Some(category_id) => Ok(CategoryRef {
                repository_id: repository.id,
                category_id,
            }),
            None => Err(SuggesterError::CategoryNotFound {
                category: category.to_string(),
                available: repository
                    .discussion_categories
                    .nodes
                    .into_iter()
                    .map(|c| c.name)
                    .collect(),
            }),
        }
    }

    fn to_post(&self, node: DiscussionNode) -> ExistingPost {
        let labels = node.labels.map(|l| l.nodes).unwrap_or_default();
        ExistingPost {
            id: node.number.to_string(),
            title: node.title,
            body: node.body.unwrap_or_default(),
            resolution_label: self.resolution_label(&labels),
            url: node.url,
        }
    }
}

#[async_trait]
impl DiscussionBoard for GitHubDiscussions {
    fn board_name(&self) -> String {
        format!("GitHub Discussions ({}/{})", self.owner, self.name)
    }

    async fn list_posts(&self, category: &str) -> Result<Vec<ExistingPost>> {
        debug!(repo = %format!("{}/{}", self.owner, self.name), category = category, "listing discussions");
        let category_ref = self.category(category).await?;

        let mut posts = Vec::new();
        let mut after: Option<String> = None;
        let mut pages = 0;
        loop {
            let data: RepositoryData<DiscussionList> = self
                .graphql(
                    LIST_QUERY,
                    json!({
                        "owner": self.owner,
                        "name": self.name,
                        "categoryId": category_ref.category_id,
                        "first": self.page_size,
                        "after": after,
                    }),
                )
                .await?;
            pages += 1;

            let page = data
                .repository
                .ok_or_else(|| SuggesterError::Config(format!("repository {}/{} not found", self.owner, self.name)))?
                .discussions;
            posts.extend(page.nodes.into_iter().map(|node| self.to_post(node)));

            match page.page_info {
                PageInfo {
                    has_next_page: true,
                    end_cursor: Some(cursor),
                } if pages < self.max_pages => after = Some(cursor),
                PageInfo { has_next_page: true, .. } => {
                    warn!(pages = pages, listed = posts.len(), "stopped listing discussions at the page limit");
                    break;
                }
                _ => break,
            }
        }

        info!(posts = posts.len(), pages = pages, category = category, "discussions listed");
        Ok(posts)
    }

    async fn create_post(&self, post: &NewPost) -> Result<String> {
        let category_ref = self.category(&post.category).await?;

        let created: CreateData = self
            .graphql(
                CREATE_MUTATION,
                json!({
                    "repoId": category_ref.repository_id,
                    "categoryId": category_ref.category_id,
                    "title": post.title,
                    "body": post.body,
                }),
            )
            .await?;

        let discussion = created.create_discussion.discussion;
        info!(number = discussion.number, url = %discussion.url, "discussion created");
        Ok(discussion.url)
    }
}

/// Discussion board kept in memory, for dry runs and tests.
pub struct InMemoryBoard {
    categories: Vec<String>,
    posts: RwLock<Vec<(String, ExistingPost)>>,
    next_id: AtomicU64,
    create_failures: AtomicUsize,
    lost_acknowledgements: AtomicUsize,
    create_calls: AtomicUsize,
}

impl InMemoryBoard {
    pub fn new(categories: &[&str]) -> Self {
        Self {
            categories: categories.iter().map(|c| c.to_string()).collect(),
            posts: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            create_failures: AtomicUsize::new(0),
            lost_acknowledgements: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Seed a post. Later seeds are listed first, like the real board.
    pub fn with_post(mut self, category: &str, post: ExistingPost) -> Self {
        if let Ok(id) = post.id.parse::<u64>() {
            self.next_id.fetch_max(id + 1, Ordering::SeqCst);
        }
        self.posts.get_mut().insert(0, (category.to_string(), post));
        self
    }

    /// Fail the next `n` create calls without creating anything.
    pub fn failing_creates(self, n: usize) -> Self {
        self.create_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Create the post but report a failure for the next `n` create calls,
    /// as a request that timed out after the platform accepted it would.
    pub fn losing_acknowledgements(self, n: usize) -> Self {
        self.lost_acknowledgements.store(n, Ordering::SeqCst);
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub async fn posts(&self, category: &str) -> Vec<ExistingPost> {
        self.posts
            .read()
            .await
            .iter()
            .filter(|(c, _)| c.eq_ignore_ascii_case(category))
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DiscussionBoard for InMemoryBoard {
    fn board_name(&self) -> String {
        format!("In-memory board ({})", self.categories.join(", "))
    }

    async fn list_posts(&self, category: &str) -> Result<Vec<ExistingPost>> {
        Ok(self.posts(category).await)
    }

    async fn create_post(&self, post: &NewPost) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        if !self.categories.iter().any(|c| c.eq_ignore_ascii_case(&post.category)) {
            return Err(SuggesterError::CategoryNotFound {
                category: post.category.clone(),
                available: self.categories.clone(),
            });
        }

        if Self::take_one(&self.create_failures) {
            return Err(SuggesterError::Platform("simulated platform outage".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let url = format!("memory://discussions/{}", id);
        self.posts.write().await.insert(
            0,
            (
                post.category.clone(),
                ExistingPost {
                    id: id.to_string(),
                    title: post.title.clone(),
                    body: post.body.clone(),
                    resolution_label: None,
                    url: Some(url.clone()),
                },
            ),
        );

        if Self::take_one(&self.lost_acknowledgements) {
            warn!(id = id, "post created but acknowledgement dropped");
            return Err(SuggesterError::Platform("request timed out".to_string()));
        }

        Ok(url)
    }
}
