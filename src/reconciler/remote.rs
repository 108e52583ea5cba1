//! Remote issue tracker client: a `gh`-CLI-backed implementation behind a
//! trait, so `phases.rs` can be tested against a fake.
//!
//! Grounded on `weave_gh/cli.py::gh_cli`/`_run` and `weave_gh/data.py`'s
//! `get_repo`/`get_weave_nodes`-equivalent issue fetch. Retry/backoff and
//! rate-limit classification are shared with the rest of the crate via
//! [`crate::util`].

use crate::error::{QError, QResult};
use crate::models::{RemoteIssue, RemoteState};
use crate::util::retry::{retry_with_backoff, BASE_DELAY};
use crate::util::subprocess::{is_rate_limited, run_with_timeout, SUBPROCESS_TIMEOUT};
use serde::Deserialize;
use std::process::Command;
use std::time::Duration;

pub trait RemoteTracker {
    fn repo(&self) -> QResult<String>;
    fn repo_url(&self) -> QResult<String>;
    fn list_issues(&self, repo: &str) -> QResult<Vec<RemoteIssue>>;
    fn create_issue(&self, repo: &str, title: &str, body: &str, labels: &[String]) -> QResult<i64>;
    fn edit_body(&self, repo: &str, number: i64, body: &str) -> QResult<()>;
    fn close_issue(&self, repo: &str, number: i64, comment: &str) -> QResult<()>;
    fn reopen_issue(&self, repo: &str, number: i64, comment: &str) -> QResult<()>;
    fn add_label(&self, repo: &str, number: i64, label: &str) -> QResult<()>;
    fn remove_label(&self, repo: &str, number: i64, label: &str) -> QResult<()>;
    fn post_comment(&self, repo: &str, number: i64, body: &str) -> QResult<()>;
    fn last_comment_body(&self, repo: &str, number: i64) -> QResult<String>;
    fn view_body(&self, repo: &str, number: i64) -> QResult<String>;
}

pub struct GhCliTracker;

impl GhCliTracker {
    pub fn new() -> GhCliTracker {
        GhCliTracker
    }

    fn run(&self, args: &[&str]) -> QResult<String> {
        retry_with_backoff(
            |_| {
                let mut cmd = Command::new("gh");
                cmd.args(args);
                let out = run_with_timeout(&mut cmd, SUBPROCESS_TIMEOUT)?;
                if out.success {
                    Ok(out.stdout.trim().to_string())
                } else if is_rate_limited(&out.stderr) {
                    Err(QError::RateLimited { retry_after: BASE_DELAY })
                } else {
                    Err(QError::HistoryQueryFailure(format!("gh {args:?} failed: {}", out.stderr)))
                }
            },
            |d: Duration| std::thread::sleep(d),
        )
    }
}

impl Default for GhCliTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct RawIssue {
    number: i64,
    title: String,
    state: String,
    body: String,
    labels: Vec<RawLabel>,
}

#[derive(Deserialize)]
struct RawLabel {
    name: String,
}

impl RemoteTracker for GhCliTracker {
    fn repo(&self) -> QResult<String> {
        self.run(&["repo", "view", "--json", "nameWithOwner", "-q", ".nameWithOwner"])
    }

    fn repo_url(&self) -> QResult<String> {
        self.run(&["repo", "view", "--json", "url", "-q", ".url"])
    }

    fn list_issues(&self, repo: &str) -> QResult<Vec<RemoteIssue>> {
        let raw = self.run(&[
            "issue",
            "list",
            "--repo",
            repo,
            "--state",
            "all",
            "--limit",
            "5000",
            "--json",
            "number,title,state,body,labels",
        ])?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let items: Vec<RawIssue> =
            serde_json::from_str(&raw).map_err(|e| QError::HistoryQueryFailure(format!("parsing issue list: {e}")))?;
        Ok(items
            .into_iter()
            .map(|i| RemoteIssue {
                number: i.number,
                title: i.title,
                state: if i.state.eq_ignore_ascii_case("open") {
                    RemoteState::Open
                } else {
                    RemoteState::Closed
                },
                body: i.body,
                labels: i.labels.into_iter().map(|l| l.name).collect(),
            })
            .collect())
    }

    fn create_issue(&self, repo: &str, title: &str, body: &str, labels: &[String]) -> QResult<i64> {
        let mut args: Vec<&str> = vec!["issue", "create", "--repo", repo, "--title", title, "--body", body];
        for label in labels {
            args.push("--label");
            args.push(label);
        }
        let out = self.run(&args)?;
        out.rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| QError::HistoryQueryFailure(format!("no issue number in: {out}")))
    }

    fn edit_body(&self, repo: &str, number: i64, body: &str) -> QResult<()> {
        let num = number.to_string();
        self.run(&["issue", "edit", &num, "--repo", repo, "--body", body])?;
        Ok(())
    }

    fn close_issue(&self, repo: &str, number: i64, comment: &str) -> QResult<()> {
        let num = number.to_string();
        self.run(&["issue", "close", &num, "--repo", repo, "--comment", comment])?;
        Ok(())
    }

    fn reopen_issue(&self, repo: &str, number: i64, comment: &str) -> QResult<()> {
        let num = number.to_string();
        self.run(&["issue", "reopen", &num, "--repo", repo, "--comment", comment])?;
        Ok(())
    }

    fn add_label(&self, repo: &str, number: i64, label: &str) -> QResult<()> {
        let num = number.to_string();
        self.run(&["issue", "edit", &num, "--repo", repo, "--add-label", label])?;
        Ok(())
    }

    fn remove_label(&self, repo: &str, number: i64, label: &str) -> QResult<()> {
        let num = number.to_string();
        self.run(&["issue", "edit", &num, "--repo", repo, "--remove-label", label])?;
        Ok(())
    }

    fn post_comment(&self, repo: &str, number: i64, body: &str) -> QResult<()> {
        let num = number.to_string();
        self.run(&["issue", "comment", &num, "--repo", repo, "--body", body])?;
        Ok(())
    }

    fn last_comment_body(&self, repo: &str, number: i64) -> QResult<String> {
        let num = number.to_string();
        self.run(&[
            "issue",
            "view",
            &num,
            "--repo",
            repo,
            "--json",
            "comments",
            "--jq",
            ".comments[-1].body // \"\"",
        ])
    }

    fn view_body(&self, repo: &str, number: i64) -> QResult<String> {
        let num = number.to_string();
        self.run(&["issue", "view", &num, "--repo", repo, "--json", "body", "-q", ".body"])
    }
}
