//! Provider-neutral event shapes. `github`/`gitlab` each parse their own
//! wire format into these so `push`/`pull_request` only ever reason about
//! one shape (spec.md §4.6).

#[derive(Clone, Debug)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author_name: String,
}

#[derive(Clone, Debug)]
pub struct PushEvent {
    pub repository_url: String,
    pub branch_name: String,
    /// Absent on a force-push edge case the provider doesn't summarize;
    /// callers fall back to resolving the branch head themselves.
    pub head_commit: Option<CommitInfo>,
    /// Union of added ∪ modified ∪ removed paths across every commit in
    /// the push, used for `watch_paths` glob filtering.
    pub changed_paths: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PullRequestAction {
    Opened,
    Synchronize,
    Edited,
    Closed,
}

#[derive(Clone, Debug)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    pub number: u64,
    pub title: String,
    pub head_repository_url: String,
    pub base_repository_url: String,
    pub branch_name: String,
    pub commit_sha: String,
    pub merged: bool,
}
