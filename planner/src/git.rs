//! Resolves a `"HEAD"` commit_sha to a concrete SHA via the Git smart-HTTP
//! ref advertisement, authenticated with the token `zaneops_backends::git_auth`
//! mints for the service's `GitApp` (spec.md §4.3 step 7).

use async_trait::async_trait;

#[async_trait]
pub trait GitRefResolver: Send + Sync {
    async fn resolve_branch_head(
        &self,
        repository_url: &str,
        branch_name: &str,
        auth_token: Option<&str>,
    ) -> Result<String, GitResolveError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GitResolveError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ref refs/heads/{0} not found in advertisement")]
    RefNotFound(String),
}

pub struct HttpGitRefResolver {
    client: reqwest::Client,
}

impl HttpGitRefResolver {
    pub fn new(client: reqwest::Client) -> Self {
        HttpGitRefResolver { client }
    }
}

#[async_trait]
impl GitRefResolver for HttpGitRefResolver {
    async fn resolve_branch_head(
        &self,
        repository_url: &str,
        branch_name: &str,
        auth_token: Option<&str>,
    ) -> Result<String, GitResolveError> {
        let url = format!("{}/info/refs?service=git-upload-pack", repository_url.trim_end_matches('/'));
        let mut request = self.client.get(&url);
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }
        let body = request.send().await?.error_for_status()?.text().await?;
        parse_ref_sha(&body, branch_name).ok_or_else(|| GitResolveError::RefNotFound(branch_name.to_string()))
    }
}

/// The advertisement is pkt-line framed, but the ref name and its 40-hex-char
/// SHA always appear as a contiguous substring regardless of framing, so a
/// direct search is sufficient -- we never need the rest of the protocol.
fn parse_ref_sha(advertisement: &str, branch_name: &str) -> Option<String> {
    let marker = format!("refs/heads/{branch_name}");
    let ref_pos = advertisement.find(&marker)?;
    let preceding = &advertisement[..ref_pos];
    let sha: String = preceding
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if sha.len() == 40 {
        Some(sha)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_sha_preceding_the_ref_name() {
        let advertisement = format!(
            "001e# service=git-upload-pack\n0000{} refs/heads/main\0 report-status\n0000",
            "a".repeat(40)
        );
        assert_eq!(parse_ref_sha(&advertisement, "main"), Some("a".repeat(40)));
    }

    #[test]
    fn returns_none_when_branch_absent() {
        let advertisement = format!("{} refs/heads/main\n0000", "a".repeat(40));
        assert_eq!(parse_ref_sha(&advertisement, "develop"), None);
    }
}
