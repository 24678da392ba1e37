//! Cross-references a changeset with the CI indices to find the task ids of the
//! required build jobs.

use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::config::{CiConfig, UpstreamConfig};
use crate::contract::{JobRecord, UpstreamClient};
use crate::error::SyncError;

/// Task ids of every configured job role, found within a single push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedTasks {
    pub push_id: u64,
    /// Job role -> task id.
    pub tasks: BTreeMap<String, String>,
}

impl LocatedTasks {
    pub fn task_for(&self, role: &str) -> Option<&str> {
        self.tasks.get(role).map(String::as_str)
    }
}

fn record_matches(record: &JobRecord, pattern: &str) -> bool {
    record
        .iter()
        .filter_map(serde_json::Value::as_str)
        .any(|field| field.contains(pattern))
}

/// Pick task ids out of a push's job rows. All roles must be present; a partial
/// set is never returned. When a role matches several rows (retriggers), the last
/// row listed wins.
pub fn select_tasks(
    push_id: u64,
    jobs: &[JobRecord],
    ci: &CiConfig,
) -> Result<LocatedTasks, SyncError> {
    let mut tasks = BTreeMap::new();
    for (role, pattern) in &ci.jobs {
        let Some(record) = jobs.iter().rev().find(|record| record_matches(record, pattern)) else {
            error!(role = %role, pattern = %pattern, push_id, "[LOCATE][ERROR] Required job not found");
            return Err(SyncError::JobNotFound {
                role: role.clone(),
                pattern: pattern.clone(),
                push_id,
            });
        };
        let task_id = record
            .get(ci.task_id_field)
            .and_then(serde_json::Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::MalformedJob {
                pattern: pattern.clone(),
                field: ci.task_id_field,
            })?;
        info!(role = %role, task_id = %task_id, "[LOCATE] Found task");
        tasks.insert(role.clone(), task_id.to_string());
    }
    Ok(LocatedTasks { push_id, tasks })
}

/// Find the push for `changeset`, then the task ids of all configured jobs in it.
pub async fn locate(
    upstream: &dyn UpstreamClient,
    repo: &UpstreamConfig,
    ci: &CiConfig,
    changeset: &str,
) -> Result<LocatedTasks, SyncError> {
    info!(changeset = %changeset, "[LOCATE] Looking up CI push");
    let pushes = upstream.fetch_pushes(&repo.repo, changeset).await?;
    let Some(push) = pushes.first() else {
        error!(changeset = %changeset, "[LOCATE][ERROR] Changeset not indexed by CI");
        return Err(SyncError::PushNotFound {
            changeset: changeset.to_string(),
        });
    };
    info!(push_id = push.id, "[LOCATE] Found push");

    let jobs = upstream.fetch_jobs(push.id).await?;
    debug!(push_id = push.id, count = jobs.len(), "[LOCATE] Job list received");
    select_tasks(push.id, &jobs, ci)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(name: &str, task_id: &str) -> JobRecord {
        let mut record: JobRecord = vec![json!(null); 15];
        record[3] = json!(name);
        record[14] = json!(task_id);
        record
    }

    #[test]
    fn select_tasks_maps_every_role() {
        let jobs = vec![
            job("build-linux64/opt", "T0"),
            job("spidermonkey-sm-package-linux64/opt", "T1"),
            job("hazard-linux64-haz/debug", "T2"),
        ];
        let located = select_tasks(7, &jobs, &CiConfig::default()).unwrap();
        assert_eq!(located.push_id, 7);
        assert_eq!(located.task_for("packaging"), Some("T1"));
        assert_eq!(located.task_for("hazard"), Some("T2"));
    }

    #[test]
    fn select_tasks_prefers_the_last_listed_retrigger() {
        let jobs = vec![
            job("spidermonkey-sm-package-linux64/opt", "T1"),
            job("hazard-linux64-haz/debug", "T2"),
            job("spidermonkey-sm-package-linux64/opt", "T1-retry"),
        ];
        let located = select_tasks(7, &jobs, &CiConfig::default()).unwrap();
        assert_eq!(located.task_for("packaging"), Some("T1-retry"));
        assert_eq!(located.task_for("hazard"), Some("T2"));
    }

    #[test]
    fn select_tasks_rejects_record_without_task_id() {
        let mut record = job("hazard-linux64-haz/debug", "T2");
        record.truncate(10);
        let jobs = vec![job("spidermonkey-sm-package-linux64/opt", "T1"), record];
        let err = select_tasks(7, &jobs, &CiConfig::default()).unwrap_err();
        assert!(matches!(err, SyncError::MalformedJob { field: 14, .. }));
    }
}
