//! Parses GitHub's `push` and `pull_request` webhook payloads into the
//! normalized [`crate::events`] shapes.

use serde_json::Value;

use crate::error::WebhookError;
use crate::events::{CommitInfo, PullRequestAction, PullRequestEvent, PushEvent};

/// Returns `Ok(None)` for tags and other non-branch refs -- spec.md §4.6
/// discards these silently rather than treating them as malformed.
pub fn parse_push(body: &Value) -> Result<Option<PushEvent>, WebhookError> {
    let git_ref = body["ref"]
        .as_str()
        .ok_or_else(|| WebhookError::MalformedPayload("missing ref".into()))?;
    let Some(branch_name) = git_ref.strip_prefix("refs/heads/") else {
        return Ok(None);
    };
    let branch_name = branch_name.to_string();

    let repository_url = body["repository"]["clone_url"]
        .as_str()
        .ok_or_else(|| WebhookError::MalformedPayload("missing repository.clone_url".into()))?
        .to_string();

    let head_commit = body.get("head_commit").filter(|v| !v.is_null()).map(|commit| CommitInfo {
        sha: commit["id"].as_str().unwrap_or_default().to_string(),
        message: commit["message"].as_str().unwrap_or_default().to_string(),
        author_name: commit["author"]["name"].as_str().unwrap_or_default().to_string(),
    });

    let mut changed_paths = Vec::new();
    if let Some(commits) = body["commits"].as_array() {
        for commit in commits {
            for field in ["added", "modified", "removed"] {
                if let Some(paths) = commit[field].as_array() {
                    changed_paths.extend(paths.iter().filter_map(|p| p.as_str()).map(String::from));
                }
            }
        }
    }

    Ok(Some(PushEvent {
        repository_url,
        branch_name,
        head_commit,
        changed_paths,
    }))
}

pub fn parse_pull_request(body: &Value) -> Result<PullRequestEvent, WebhookError> {
    let action_str = body["action"]
        .as_str()
        .ok_or_else(|| WebhookError::MalformedPayload("missing action".into()))?;
    let pr = &body["pull_request"];

    let action = match action_str {
        "opened" | "reopened" => PullRequestAction::Opened,
        "synchronize" => PullRequestAction::Synchronize,
        "edited" => PullRequestAction::Edited,
        "closed" => PullRequestAction::Closed,
        other => return Err(WebhookError::MalformedPayload(format!("unhandled pull_request action: {other}"))),
    };

    Ok(PullRequestEvent {
        action,
        number: pr["number"].as_u64().ok_or_else(|| WebhookError::MalformedPayload("missing pull_request.number".into()))?,
        title: pr["title"].as_str().unwrap_or_default().to_string(),
        head_repository_url: pr["head"]["repo"]["clone_url"].as_str().unwrap_or_default().to_string(),
        base_repository_url: pr["base"]["repo"]["clone_url"].as_str().unwrap_or_default().to_string(),
        branch_name: pr["head"]["ref"].as_str().unwrap_or_default().to_string(),
        commit_sha: pr["head"]["sha"].as_str().unwrap_or_default().to_string(),
        merged: pr["merged"].as_bool().unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_branch_push_with_head_commit() {
        let body = json!({
            "ref": "refs/heads/main",
            "repository": {"clone_url": "https://github.com/acme/widgets.git"},
            "head_commit": {"id": "abc123", "message": "fix bug", "author": {"name": "Ada"}},
            "commits": [{"added": ["a.rs"], "modified": ["b.rs"], "removed": []}],
        });

        let event = parse_push(&body).unwrap().unwrap();
        assert_eq!(event.branch_name, "main");
        assert_eq!(event.head_commit.unwrap().sha, "abc123");
        assert_eq!(event.changed_paths, vec!["a.rs".to_string(), "b.rs".to_string()]);
    }

    #[test]
    fn a_tag_push_is_silently_ignored() {
        let body = json!({
            "ref": "refs/tags/v1.0.0",
            "repository": {"clone_url": "https://github.com/acme/widgets.git"},
        });
        assert!(parse_push(&body).unwrap().is_none());
    }

    #[test]
    fn parses_an_opened_pull_request() {
        let body = json!({
            "action": "opened",
            "pull_request": {
                "number": 42,
                "title": "Add feature",
                "merged": false,
                "head": {"repo": {"clone_url": "https://github.com/fork/widgets.git"}, "ref": "feature", "sha": "deadbeef"},
                "base": {"repo": {"clone_url": "https://github.com/acme/widgets.git"}},
            },
        });

        let event = parse_pull_request(&body).unwrap();
        assert_eq!(event.action, PullRequestAction::Opened);
        assert_eq!(event.number, 42);
        assert!(event.head_repository_url != event.base_repository_url);
    }
}
