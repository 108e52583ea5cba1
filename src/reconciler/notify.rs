//! Single-node lifecycle notifications posted to the remote tracker as
//! comments, driven by the `--notify` CLI flag.
//!
//! Grounded on `weave_gh/notify.py`. Comment wording is renamed off the
//! original tool's name; the work/done/block event shapes are unchanged.

use crate::error::{QError, QResult};
use crate::graphclient::GraphClient;
use crate::models::NodeStatus;
use crate::reconciler::labels::{ACTIVE_LABEL, BLOCKED_LABEL};
use crate::reconciler::phases::{refresh_parent_body, CLOSE_MARKER};
use crate::reconciler::rendering::build_close_comment;
use crate::reconciler::remote::RemoteTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    Work,
    Done,
    Block,
}

impl NotifyEvent {
    pub fn from_str(s: &str) -> Option<NotifyEvent> {
        match s {
            "work" => Some(NotifyEvent::Work),
            "done" => Some(NotifyEvent::Done),
            "block" => Some(NotifyEvent::Block),
            _ => None,
        }
    }
}

/// Posts a comment (and closes/reopens the remote issue where the event
/// implies it) for a single node, without running a full sync pass.
pub fn notify(
    graph: &dyn GraphClient,
    remote: &dyn RemoteTracker,
    node_id: &str,
    event: NotifyEvent,
    learning: Option<&str>,
    blocker: Option<&str>,
) -> QResult<()> {
    let nodes = graph.list_nodes()?;
    let node = nodes
        .iter()
        .find(|n| n.id == node_id)
        .ok_or_else(|| QError::HistoryQueryFailure(format!("no node {node_id}")))?;

    let Some(remote_id) = node.metadata.remote_issue_id else {
        return Ok(());
    };
    let repo = remote.repo()?;
    let repo_url = remote.repo_url().unwrap_or_default();

    match event {
        NotifyEvent::Work => {
            remote.add_label(&repo, remote_id, ACTIVE_LABEL)?;
            remote.post_comment(&repo, remote_id, "Work started on this node.")?;
        }
        NotifyEvent::Done => {
            let comment = build_close_comment(node, &repo_url);
            let comment = match learning {
                Some(l) if !node.metadata.learning_parts().iter().any(|(_, v)| *v == l) => {
                    format!("{comment}\n\n**Learning:** {l}")
                }
                _ => comment,
            };
            debug_assert!(comment.starts_with(CLOSE_MARKER));
            remote.remove_label(&repo, remote_id, ACTIVE_LABEL)?;
            remote.close_issue(&repo, remote_id, &comment)?;
            if node.status != NodeStatus::Done {
                graph.mark_done(node_id)?;
            }
        }
        NotifyEvent::Block => {
            let mut comment = "Blocked.".to_string();
            if let Some(b) = blocker {
                comment = format!("Blocked by `{b}`.");
            }
            remote.add_label(&repo, remote_id, BLOCKED_LABEL)?;
            remote.post_comment(&repo, remote_id, &comment)?;
        }
    }

    refresh_parent_body(graph, remote, node_id, false)?;
    Ok(())
}
