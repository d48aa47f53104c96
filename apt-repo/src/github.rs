#![doc = "GitHub release source: lists an organisation's repositories and reads their latest release."]
//
//! # GitHub integration (CLI <-> Core)
//!
//! Implements [`ReleaseSource`] from `apt-repo-core` against the GitHub REST
//! API. Every request carries the access token given on the command line.
//! The same [`reqwest::Client`] is handed to the core's `HttpDownloader`
//! so asset downloads are authenticated too.

use apt_repo_core::contract::{Artifact, ProjectRelease, ReleaseSource};
use apt_repo_core::error::SourceError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const PAGE_SIZE: usize = 100;

pub struct GitHubClient {
    http: Client,
    api_url: String,
    org: String,
}

#[derive(Debug, Deserialize)]
struct RepoJson {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseJson {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    assets: Vec<AssetJson>,
}

#[derive(Debug, Deserialize)]
struct AssetJson {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    digest: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: &str, org: &str) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| SourceError::Other("access token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(USER_AGENT, HeaderValue::from_static("apt-repo"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|source| SourceError::Request {
                url: api_url.to_owned(),
                source,
            })?;

        tracing::info!(api_url, org, "Initialised GitHub client");
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_owned(),
            org: org.to_owned(),
        })
    }

    /// The underlying HTTP client, shared with the asset downloader.
    pub fn http(&self) -> &Client {
        &self.http
    }

    fn repos_url(&self, page: usize) -> String {
        format!(
            "{}/orgs/{}/repos?per_page={PAGE_SIZE}&page={page}",
            self.api_url, self.org
        )
    }

    fn latest_release_url(&self, project: &str) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_url, self.org, project
        )
    }

    /// GET `url` and decode JSON; `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, SourceError> {
        let request_err = |source| SourceError::Request {
            url: url.to_owned(),
            source,
        };
        let response = self.http.get(url).send().await.map_err(request_err)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            tracing::error!(url, status = %status, "GitHub API returned error status");
            return Err(SourceError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        response.json::<T>().await.map(Some).map_err(request_err)
    }
}

fn into_release(project: &str, json: ReleaseJson) -> ProjectRelease {
    // State is keyed on the release title when there is one, as earlier
    // versions of the state file were.
    let tag = json
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(json.tag_name);
    ProjectRelease {
        project: project.to_owned(),
        tag,
        assets: json
            .assets
            .into_iter()
            .map(|a| Artifact {
                name: a.name,
                download_url: a.browser_download_url,
                digest: a.digest,
            })
            .collect(),
    }
}

#[async_trait]
impl ReleaseSource for GitHubClient {
    async fn list_projects(&self) -> Result<Vec<String>, SourceError> {
        let mut projects = Vec::new();
        for page in 1.. {
            let url = self.repos_url(page);
            let repos: Vec<RepoJson> = self.get_json(&url).await?.ok_or_else(|| {
                SourceError::Other(format!("organisation {} not found", self.org))
            })?;
            let count = repos.len();
            projects.extend(repos.into_iter().map(|r| r.name));
            if count < PAGE_SIZE {
                break;
            }
        }
        tracing::info!(org = %self.org, projects = projects.len(), "Listed organisation repositories");
        Ok(projects)
    }

    async fn latest_release(&self, project: &str) -> Result<Option<ProjectRelease>, SourceError> {
        let url = self.latest_release_url(project);
        let release: Option<ReleaseJson> = self.get_json(&url).await?;
        Ok(release.map(|json| into_release(project, json)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE: &str = r#"{
        "tag_name": "v1.0.0",
        "name": "Widget 1.0",
        "draft": false,
        "assets": [
            {
                "name": "widget_1.0_amd64.deb",
                "browser_download_url": "https://github.com/acme/widget/releases/download/v1.0.0/widget_1.0_amd64.deb",
                "digest": "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
                "size": 1024
            },
            {
                "name": "pkg.conf",
                "browser_download_url": "https://github.com/acme/widget/releases/download/v1.0.0/pkg.conf"
            }
        ]
    }"#;

    #[test]
    fn release_json_maps_to_project_release() {
        let json: ReleaseJson = serde_json::from_str(RELEASE).unwrap();
        let release = into_release("widget", json);
        assert_eq!(release.project, "widget");
        assert_eq!(release.tag, "Widget 1.0");
        assert_eq!(release.assets.len(), 2);
        assert_eq!(release.assets[0].name, "widget_1.0_amd64.deb");
        assert!(release.assets[0].digest.is_some());
        assert_eq!(release.assets[1].digest, None);
    }

    #[test]
    fn untitled_release_falls_back_to_tag_name() {
        let json: ReleaseJson =
            serde_json::from_str(r#"{"tag_name": "v2", "name": "", "assets": []}"#).unwrap();
        assert_eq!(into_release("widget", json).tag, "v2");
        let json: ReleaseJson = serde_json::from_str(r#"{"tag_name": "v3"}"#).unwrap();
        assert_eq!(into_release("widget", json).tag, "v3");
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let client = GitHubClient::new("https://ghe.example/api/v3/", "t0ken", "acme").unwrap();
        assert_eq!(
            client.repos_url(2),
            "https://ghe.example/api/v3/orgs/acme/repos?per_page=100&page=2"
        );
        assert_eq!(
            client.latest_release_url("widget"),
            "https://ghe.example/api/v3/repos/acme/widget/releases/latest"
        );
    }

    #[test]
    fn token_with_newline_is_rejected() {
        assert!(GitHubClient::new(DEFAULT_API_URL, "bad\ntoken", "acme").is_err());
    }
}
