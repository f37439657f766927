// RemoteSource implementation over the GitHub REST API.
// Consumes the forks, contents, and commits endpoints the original chat
// repository layout requires.

use async_trait::async_trait;

use crate::error::{ChatError, Result};
use crate::source::{FileRef, ForkRef, PathHistory, RemoteSource};

use super::client::GitHubClient;
use super::types::{CommitListItem, ContentEntry, ForkInfo};

const PER_PAGE: u32 = 100;

#[async_trait]
impl RemoteSource for GitHubClient {
    async fn list_forks(&self, owner: &str, repo: &str) -> Result<Vec<ForkRef>> {
        let endpoint = format!("/repos/{}/{}/forks", owner, repo);
        let mut forks = Vec::new();

        for page in 1u32.. {
            let params = [
                ("page", page.to_string()),
                ("per_page", PER_PAGE.to_string()),
            ];
            let response = self.get_with_params(&endpoint, &params).await?;
            let batch: Vec<ForkInfo> = response.json().await.map_err(ChatError::Network)?;
            let last_page = batch.len() < PER_PAGE as usize;

            forks.extend(batch.into_iter().map(|fork| ForkRef {
                owner: fork.owner.login,
                repo: fork.name,
            }));

            if last_page {
                break;
            }
        }

        Ok(forks)
    }

    async fn list_message_files(&self, owner: &str, repo: &str) -> Result<Vec<FileRef>> {
        let endpoint = format!("/repos/{}/{}/contents/messages", owner, repo);
        let response = self.get(&endpoint).await?;
        let entries: Vec<ContentEntry> = response.json().await.map_err(ChatError::Network)?;

        Ok(entries
            .into_iter()
            .filter(ContentEntry::is_message_file)
            .map(|entry| FileRef {
                owner: owner.to_string(),
                repo: repo.to_string(),
                name: entry.name,
                download_url: entry.download_url,
            })
            .collect())
    }

    async fn fetch_content(&self, file: &FileRef) -> Result<String> {
        let url = file.download_url.as_deref().ok_or_else(|| {
            ChatError::InvalidData(format!("{} has no download url", file.path()))
        })?;
        let response = self.get_absolute(url).await?;
        let body = response.text().await.map_err(ChatError::Network)?;
        Ok(body.trim().to_string())
    }

    async fn fetch_path_history(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<PathHistory>> {
        let endpoint = format!("/repos/{}/{}/commits", owner, repo);
        let params = [("path", path.to_string()), ("per_page", "1".to_string())];

        let response = match self.get_with_params(&endpoint, &params).await {
            Ok(response) => response,
            // A path with no commits yet is not an error for provenance.
            Err(ChatError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let commits: Vec<CommitListItem> = response.json().await.map_err(ChatError::Network)?;
        Ok(commits.into_iter().next().and_then(|item| {
            item.commit.author.map(|author| PathHistory {
                author: author.name,
                date: author.date,
                commit_hash: item.sha,
            })
        }))
    }
}
