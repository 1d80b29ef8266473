//! Parses GitLab's `Push Hook` and `Merge Request Hook` webhook payloads
//! into the normalized [`crate::events`] shapes.

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

    let repository_url = body["project"]["git_http_url"]
        .as_str()
        .ok_or_else(|| WebhookError::MalformedPayload("missing project.git_http_url".into()))?
        .to_string();

    let head_commit = body["checkout_sha"].as_str().and_then(|sha| {
        body["commits"].as_array().and_then(|commits| {
            commits.iter().find(|c| c["id"].as_str() == Some(sha)).map(|commit| CommitInfo {
                sha: sha.to_string(),
                message: commit["message"].as_str().unwrap_or_default().to_string(),
                author_name: commit["author"]["name"].as_str().unwrap_or_default().to_string(),
            })
        })
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

pub fn parse_merge_request(body: &Value) -> Result<PullRequestEvent, WebhookError> {
    let attrs = &body["object_attributes"];
    let action_str = attrs["action"]
        .as_str()
        .ok_or_else(|| WebhookError::MalformedPayload("missing object_attributes.action".into()))?;

    let action = match action_str {
        "open" | "reopen" => PullRequestAction::Opened,
        "update" => PullRequestAction::Synchronize,
        "close" | "merge" => PullRequestAction::Closed,
        other => return Err(WebhookError::MalformedPayload(format!("unhandled merge_request action: {other}"))),
    };

    Ok(PullRequestEvent {
        action,
        number: attrs["iid"].as_u64().ok_or_else(|| WebhookError::MalformedPayload("missing object_attributes.iid".into()))?,
        title: attrs["title"].as_str().unwrap_or_default().to_string(),
        head_repository_url: attrs["source"]["http_url"].as_str().unwrap_or_default().to_string(),
        base_repository_url: attrs["target"]["http_url"].as_str().unwrap_or_default().to_string(),
        branch_name: attrs["source_branch"].as_str().unwrap_or_default().to_string(),
        commit_sha: attrs["last_commit"]["id"].as_str().unwrap_or_default().to_string(),
        merged: attrs["state"].as_str() == Some("merged"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_branch_push_matching_checkout_sha() {
        let body = json!({
            "ref": "refs/heads/main",
            "checkout_sha": "abc123",
            "project": {"git_http_url": "https://gitlab.com/acme/widgets.git"},
            "commits": [{"id": "abc123", "message": "fix bug", "author": {"name": "Ada"}, "added": ["a.rs"], "modified": [], "removed": []}],
        });

        let event = parse_push(&body).unwrap().unwrap();
        assert_eq!(event.branch_name, "main");
        assert_eq!(event.head_commit.unwrap().message, "fix bug");
        assert_eq!(event.changed_paths, vec!["a.rs".to_string()]);
    }

    #[test]
    fn a_tag_push_is_silently_ignored() {
        let body = json!({
            "ref": "refs/tags/v1.0.0",
            "project": {"git_http_url": "https://gitlab.com/acme/widgets.git"},
        });
        assert!(parse_push(&body).unwrap().is_none());
    }

    #[test]
    fn parses_an_opened_merge_request() {
        let body = json!({
            "object_attributes": {
                "action": "open",
                "iid": 7,
                "title": "Add feature",
                "source_branch": "feature",
                "source": {"http_url": "https://gitlab.com/fork/widgets.git"},
                "target": {"http_url": "https://gitlab.com/acme/widgets.git"},
                "last_commit": {"id": "deadbeef"},
                "state": "opened",
            },
        });

        let event = parse_merge_request(&body).unwrap();
        assert_eq!(event.action, PullRequestAction::Opened);
        assert_eq!(event.number, 7);
        assert!(!event.merged);
    }
}
