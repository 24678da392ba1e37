//! HTTP implementation of the upstream, CI and release-hosting lookups.
//!
//! - tags: `<hg>/<repo>/json-tags`
//! - pushes: `<treeherder>/project/<repo>/push/?revision=<changeset>`
//! - jobs: `<treeherder>/jobs/?push_id=<id>`
//! - artifacts: `<taskcluster>/task/<task>/runs/<run>/artifacts[/<name>]`
//! - release assets: `<host>/<repo>/releases/download/<release id>/<asset>`

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::contract::{
    ArtifactRecord, DownloadStats, JobRecord, PushRecord, ReleaseAssets, TagRecord, UpstreamClient,
};
use crate::error::SyncError;

#[derive(Deserialize)]
struct TagsResponse {
    tags: Vec<TagRecord>,
}

#[derive(Deserialize)]
struct ResultsResponse<T> {
    results: Vec<T>,
}

#[derive(Deserialize)]
struct ArtifactsResponse {
    artifacts: Vec<ArtifactRecord>,
}

/// `reqwest` client for hg.mozilla.org, Treeherder, Taskcluster and GitHub release downloads.
pub struct HttpClient {
    client: Client,
    hg_base_url: String,
    treeherder_url: String,
    taskcluster_url: String,
    release_base_url: String,
    release_repo: String,
}

impl HttpClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, SyncError> {
        let mut builder = Client::builder().user_agent(config.ci.user_agent.clone());
        if let Some(secs) = config.ci.http_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;
        info!(
            treeherder = %config.ci.treeherder_url,
            taskcluster = %config.ci.taskcluster_url,
            timeout_secs = ?config.ci.http_timeout_secs,
            "Initialised HTTP client"
        );
        Ok(Self {
            client,
            hg_base_url: config.upstream.hg_base_url.trim_end_matches('/').to_string(),
            treeherder_url: config.ci.treeherder_url.trim_end_matches('/').to_string(),
            taskcluster_url: config.ci.taskcluster_url.trim_end_matches('/').to_string(),
            release_base_url: config.release.download_base_url.trim_end_matches('/').to_string(),
            release_repo: config.release.repo.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SyncError> {
        debug!(url = %url, ?query, "GET");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!(error = ?e, url = %url, "Request failed");
                SyncError::http(url, e)
            })?;
        response.json::<T>().await.map_err(|e| {
            error!(error = ?e, url = %url, "Failed to decode JSON response");
            SyncError::http(url, e)
        })
    }

    /// Stream `url` into `dest`, hashing as it goes.
    async fn download_to(&self, url: &str, dest: &Path) -> Result<DownloadStats, SyncError> {
        info!(url = %url, dest = %dest.display(), "Downloading");
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!(error = ?e, url = %url, "Download request failed");
                SyncError::http(url, e)
            })?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| SyncError::io(dest, e))?;
        let result = stream_into(&mut response, &mut file, url, dest).await;
        drop(file);
        if result.is_err() {
            // A truncated file must not stay in the working tree.
            if let Err(e) = tokio::fs::remove_file(dest).await {
                warn!(error = ?e, dest = %dest.display(), "Could not remove partial download");
            }
        }
        result
    }

    fn artifacts_url(&self, task_id: &str, run: u32) -> String {
        format!(
            "{}/task/{}/runs/{}/artifacts",
            self.taskcluster_url, task_id, run
        )
    }
}

async fn stream_into(
    response: &mut reqwest::Response,
    file: &mut tokio::fs::File,
    url: &str,
    dest: &Path,
) -> Result<DownloadStats, SyncError> {
    let mut hasher = Sha256::new();
    let mut bytes = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(|e| {
        error!(error = ?e, url = %url, "Download interrupted");
        SyncError::http(url, e)
    })? {
        hasher.update(&chunk);
        bytes += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|e| SyncError::io(dest, e))?;
    }
    file.flush().await.map_err(|e| SyncError::io(dest, e))?;

    Ok(DownloadStats {
        bytes,
        sha256: format!("{:x}", hasher.finalize()),
    })
}

#[async_trait]
impl UpstreamClient for HttpClient {
    async fn fetch_tags(&self, repo: &str) -> Result<Vec<TagRecord>, SyncError> {
        let url = format!("{}/{}/json-tags", self.hg_base_url, repo);
        let body: TagsResponse = self.get_json(&url, &[]).await?;
        Ok(body.tags)
    }

    async fn fetch_pushes(
        &self,
        repo: &str,
        changeset: &str,
    ) -> Result<Vec<PushRecord>, SyncError> {
        let url = format!("{}/project/{}/push/", self.treeherder_url, repo);
        let body: ResultsResponse<PushRecord> =
            self.get_json(&url, &[("revision", changeset)]).await?;
        Ok(body.results)
    }

    async fn fetch_jobs(&self, push_id: u64) -> Result<Vec<JobRecord>, SyncError> {
        let url = format!("{}/jobs/", self.treeherder_url);
        let push_id = push_id.to_string();
        let body: ResultsResponse<JobRecord> =
            self.get_json(&url, &[("push_id", push_id.as_str())]).await?;
        Ok(body.results)
    }

    async fn list_artifacts(
        &self,
        task_id: &str,
        run: u32,
    ) -> Result<Vec<ArtifactRecord>, SyncError> {
        let body: ArtifactsResponse = self
            .get_json(&self.artifacts_url(task_id, run), &[])
            .await?;
        Ok(body.artifacts)
    }

    async fn download_artifact(
        &self,
        task_id: &str,
        run: u32,
        name: &str,
        dest: &Path,
    ) -> Result<DownloadStats, SyncError> {
        let url = format!("{}/{}", self.artifacts_url(task_id, run), name);
        self.download_to(&url, dest).await
    }
}

#[async_trait]
impl ReleaseAssets for HttpClient {
    async fn download_asset(
        &self,
        release_id: &str,
        asset: &str,
        dest: &Path,
    ) -> Result<DownloadStats, SyncError> {
        let url = format!(
            "{}/{}/releases/download/{}/{}",
            self.release_base_url, self.release_repo, release_id, asset
        );
        self.download_to(&url, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_treeherder_and_taskcluster_payloads() {
        let pushes: ResultsResponse<PushRecord> = serde_json::from_str(
            r#"{"meta":{"count":1},"results":[{"id":999,"revision":"abc123","author":"ffxbld"}]}"#,
        )
        .unwrap();
        assert_eq!(pushes.results[0].id, 999);

        let jobs: ResultsResponse<JobRecord> = serde_json::from_str(
            r#"{"results":[[1,"x","spidermonkey-sm-package-linux64/opt",null,"T1"]],"job_property_names":[]}"#,
        )
        .unwrap();
        assert_eq!(jobs.results[0][4], serde_json::json!("T1"));

        let artifacts: ArtifactsResponse = serde_json::from_str(
            r#"{"artifacts":[{"storageType":"s3","name":"public/build/mozjs.tar.xz","expires":"2026-01-01","contentType":"application/x-xz"}]}"#,
        )
        .unwrap();
        assert_eq!(artifacts.artifacts[0].name, "public/build/mozjs.tar.xz");
        assert_eq!(artifacts.artifacts[0].content_type.as_deref(), Some("application/x-xz"));

        let tags: TagsResponse = serde_json::from_str(
            r#"{"node":"tip","tags":[{"node":"abc123","tag":"FIREFOX_140_5_0esr_RELEASE"}]}"#,
        )
        .unwrap();
        assert_eq!(tags.tags[0].node, "abc123");
    }

    /// Serve one connection with a canned raw HTTP response, then close it.
    async fn serve_once(response: &'static str) -> String {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    fn release_client(base_url: String) -> HttpClient {
        let mut config = PipelineConfig::default();
        config.release.download_base_url = base_url;
        HttpClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn download_records_size_and_digest() {
        let base = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nstub").await;
        let client = release_client(base);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mozjs.tar.xz");

        let stats = client
            .download_asset("mozjs-source-abc123", "mozjs.tar.xz", &dest)
            .await
            .unwrap();

        assert_eq!(stats.bytes, 4);
        assert_eq!(
            stats.sha256,
            "725c546b990dd1b41f3d5791b37c3c0edcb1f08cf150bdae32a73dfd166e02d7"
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"stub");
    }

    #[tokio::test]
    async fn truncated_download_leaves_no_partial_file() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\npartial",
        )
        .await;
        let client = release_client(base);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mozjs.tar.xz");

        let err = client
            .download_asset("mozjs-source-abc123", "mozjs.tar.xz", &dest)
            .await
            .unwrap_err();

        assert!(
            matches!(err, SyncError::Http { ref url, .. }
                if url.ends_with("/servo/mozjs/releases/download/mozjs-source-abc123/mozjs.tar.xz")),
            "got {err:?}"
        );
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn error_status_maps_to_http_error_with_url() {
        let base = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let mut config = PipelineConfig::default();
        config.ci.taskcluster_url = base;
        let client = HttpClient::new(&config).unwrap();

        let err = client.list_artifacts("T1", 0).await.unwrap_err();

        assert_eq!(err.stage(), "http");
        assert!(
            matches!(err, SyncError::Http { ref url, .. } if url.ends_with("/task/T1/runs/0/artifacts")),
            "got {err:?}"
        );
    }

    #[test]
    fn artifact_urls_follow_queue_api_layout() {
        let client = HttpClient::new(&PipelineConfig::default()).unwrap();
        assert_eq!(
            client.artifacts_url("T1", 2),
            "https://firefox-ci-tc.services.mozilla.com/api/queue/v1/task/T1/runs/2/artifacts"
        );
    }
}
