//! Bidirectional sync between the local issue graph and a remote tracker.
//!
//! Grounded on the `weave_gh` package: `phases.py`'s three-phase sync,
//! `labels.py`/`body.py`/`rendering.py`'s rendering support, and
//! `cli.py`/`notify.py`'s subprocess-backed remote client and notifications.

pub mod body;
pub mod labels;
pub mod notify;
pub mod phases;
pub mod remote;
pub mod rendering;

use crate::error::QResult;
use crate::graphclient::GraphClient;
use phases::SyncStats;
use remote::RemoteTracker;

/// Runs all three sync phases in order, returning aggregate counters.
/// `dry_run` threads through every phase so no write reaches either side.
pub fn run_full_sync(graph: &dyn GraphClient, remote: &dyn RemoteTracker, dry_run: bool) -> QResult<SyncStats> {
    let mut stats = SyncStats::default();

    let repo = remote.repo()?;
    let repo_url = remote.repo_url().unwrap_or_default();
    let mut nodes = graph.list_nodes()?;
    let issues = remote.list_issues(&repo)?;

    let issues = phases::sync_local_to_remote(graph, remote, &mut nodes, issues, &repo, &repo_url, &mut stats, dry_run)?;

    let created = phases::sync_remote_to_local(graph, &issues, &mut stats, dry_run)?;
    let mut all_nodes = nodes;
    all_nodes.extend(created);

    phases::sync_closed_to_local(graph, &all_nodes, &issues, &mut stats, dry_run)?;

    Ok(stats)
}
