//! Code-hosting REST API access.
//!
//! Two calls are needed: listing a repository's open pull requests (for
//! duplicate suppression) and code search (to turn a query into a set of
//! repositories). Both go through the [`CodeHost`] trait so the resolver and
//! dispatcher can be exercised without the network.

use crate::error::{PatchstormError, Result};
use crate::settings::Settings;
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, LINK, USER_AGENT};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

/// GitHub code search returns at most 1000 results (10 pages of 100).
const MAX_SEARCH_PAGES: usize = 10;
const PER_PAGE: &str = "100";

static NEXT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#).expect("valid regex"));

/// An open pull request as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub draft: bool,
}

/// The slice of the code-hosting service patchstorm depends on.
pub trait CodeHost {
    /// All open (including draft) pull requests of `repo` (`owner/name`).
    fn open_pull_requests(&self, repo: &str) -> Result<Vec<PullRequestSummary>>;

    /// Full names of the repositories matching a code-search query.
    fn search_repositories(&self, query: &str) -> Result<BTreeSet<String>>;
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    total_count: u64,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    repository: SearchRepository,
}

#[derive(Debug, Deserialize)]
struct SearchRepository {
    full_name: String,
}

/// Blocking GitHub REST client.
pub struct GitHubClient {
    client: Client,
    api_url: String,
    organization: String,
    page_delay: Duration,
}

impl GitHubClient {
    /// Build a client from settings. Requires a token and an organization.
    pub fn new(settings: &Settings) -> Result<Self> {
        let token = settings.token()?;
        let organization = settings.organization()?.to_string();

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            PatchstormError::Usage("the code-hosting token contains invalid characters".to_string())
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("patchstorm"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PatchstormError::TransientService(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_url: settings.github_api_url.trim_end_matches('/').to_string(),
            organization,
            page_delay: Duration::from_millis(settings.search_page_delay_ms),
        })
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| PatchstormError::TransientService(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PatchstormError::TransientService(format!(
                "GET {} returned {}: {}",
                url,
                status,
                body.trim()
            )));
        }
        Ok(response)
    }
}

impl CodeHost for GitHubClient {
    fn open_pull_requests(&self, repo: &str) -> Result<Vec<PullRequestSummary>> {
        let mut url = format!("{}/repos/{}/pulls", self.api_url, repo);
        let mut query: &[(&str, &str)] = &[("state", "open"), ("per_page", PER_PAGE)];
        let mut pulls = Vec::new();

        loop {
            let response = self.get(&url, query)?;
            let next = next_page_url(response.headers());
            let page: Vec<PullRequestSummary> = response.json().map_err(|e| {
                PatchstormError::TransientService(format!(
                    "failed to decode pull requests of {}: {}",
                    repo, e
                ))
            })?;
            pulls.extend(page);

            match next {
                Some(next) => {
                    url = next;
                    query = &[];
                }
                None => break,
            }
        }

        Ok(pulls)
    }

    fn search_repositories(&self, query: &str) -> Result<BTreeSet<String>> {
        let q = search_expression(&self.organization, query);
        let mut url = format!("{}/search/code", self.api_url);
        let first_page = [("q", q.as_str()), ("per_page", PER_PAGE)];
        let mut params: &[(&str, &str)] = &first_page;
        let mut repos = BTreeSet::new();

        for page_number in 1..=MAX_SEARCH_PAGES {
            let response = self.get(&url, params)?;
            let next = next_page_url(response.headers());
            let page: SearchPage = response.json().map_err(|e| {
                PatchstormError::TransientService(format!(
                    "failed to decode code search results: {}",
                    e
                ))
            })?;

            repos.extend(page.items.into_iter().map(|i| i.repository.full_name));
            info!(
                page = page_number,
                total_results = page.total_count,
                repos = repos.len(),
                "code search progress"
            );

            match next {
                Some(next) => {
                    url = next;
                    params = &[];
                    std::thread::sleep(self.page_delay);
                }
                None => break,
            }
        }

        Ok(repos)
    }
}

/// The search expression sent to the API: scoped to the organization and
/// excluding archived repositories.
pub fn search_expression(organization: &str, query: &str) -> String {
    format!("org:{} {} NOT is:archived", organization, query.trim())
}

fn next_page_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_next_link)
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn parse_next_link(link: &str) -> Option<String> {
    link.split(',')
        .find_map(|part| NEXT_LINK.captures(part))
        .map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_next_link() {
        let header = r#"<https://api.github.com/search/code?q=x&page=2>; rel="next", <https://api.github.com/search/code?q=x&page=10>; rel="last""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/search/code?q=x&page=2")
        );
    }

    #[test]
    fn test_parse_next_link_absent_on_last_page() {
        let header = r#"<https://api.github.com/search/code?q=x&page=1>; rel="prev", <https://api.github.com/search/code?q=x&page=1>; rel="first""#;
        assert_eq!(parse_next_link(header), None);
    }

    #[test]
    fn test_search_expression_scopes_to_org() {
        assert_eq!(
            search_expression("acme", " path:.github tj-actions "),
            "org:acme path:.github tj-actions NOT is:archived"
        );
    }

    #[test]
    fn test_decode_search_page() {
        let json = r#"{
            "total_count": 3,
            "incomplete_results": false,
            "items": [
                {"name": "ci.yml", "repository": {"full_name": "acme/api"}},
                {"name": "cd.yml", "repository": {"full_name": "acme/api"}},
                {"name": "ci.yml", "repository": {"full_name": "acme/web"}}
            ]
        }"#;
        let page: SearchPage = serde_json::from_str(json).unwrap();
        let repos: BTreeSet<String> = page
            .items
            .into_iter()
            .map(|i| i.repository.full_name)
            .collect();

        assert_eq!(page.total_count, 3);
        assert_eq!(repos.len(), 2);
    }

    #[test]
    fn test_decode_pull_requests() {
        let json = r#"[
            {"number": 7, "title": "Pin actions", "html_url": "https://github.com/acme/api/pull/7", "draft": true, "state": "open"},
            {"number": 9, "title": "Other"}
        ]"#;
        let pulls: Vec<PullRequestSummary> = serde_json::from_str(json).unwrap();

        assert_eq!(pulls[0].title, "Pin actions");
        assert!(pulls[0].draft);
        assert!(!pulls[1].draft);
    }

    #[test]
    fn test_client_requires_token_and_org() {
        let settings = Settings::default();
        assert!(GitHubClient::new(&settings).is_err());

        let mut settings = Settings::default();
        settings.github_token = Some("tok".to_string());
        settings.github_organization = Some("acme".to_string());
        assert!(GitHubClient::new(&settings).is_ok());
    }
}
