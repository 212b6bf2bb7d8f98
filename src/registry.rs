use std::collections::HashMap;

use tracing::debug;

use crate::job::{Job, JobSnapshot};

/// Single source of truth for lifecycle state. Owned and mutated only by the
/// engine task, so a plain map is enough; all sequencing comes from the
/// actor's run-to-completion loop.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job. Silently refuses a duplicate id and reports whether the
    /// insert happened.
    pub fn create(&mut self, job: Job) -> bool {
        if self.jobs.contains_key(&job.id) {
            debug!(id = %job.id, "refusing to create duplicate job");
            return false;
        }
        self.jobs.insert(job.id.clone(), job);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Job> {
        self.jobs.remove(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn all_matching(&self, predicate: impl Fn(&Job) -> bool) -> Vec<&Job> {
        self.jobs.values().filter(|j| predicate(j)).collect()
    }

    /// Ids collected separately so the caller can mutate while iterating.
    pub fn ids_matching(&self, predicate: impl Fn(&Job) -> bool) -> Vec<String> {
        self.jobs
            .values()
            .filter(|j| predicate(j))
            .map(|j| j.id.clone())
            .collect()
    }

    /// Immutable views for the pure correlation tiers.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        self.jobs.values().map(Job::snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RecordingControl;
    use crate::job::{DownloadRequest, JobKind, JobState};

    fn job(id: &str) -> Job {
        Job::new(
            id.into(),
            JobKind::Single,
            DownloadRequest::url("https://example.com/x"),
            RecordingControl::shared(),
        )
    }

    #[test]
    fn create_refuses_duplicate_ids() {
        let mut reg = JobRegistry::new();
        assert!(reg.create(job("a")));
        assert!(!reg.create(job("a")));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn all_matching_filters_on_state() {
        let mut reg = JobRegistry::new();
        reg.create(job("a"));
        reg.create(job("b"));
        reg.get_mut("b").unwrap().state = JobState::Downloading;

        let downloading = reg.all_matching(|j| j.state == JobState::Downloading);
        assert_eq!(downloading.len(), 1);
        assert_eq!(downloading[0].id, "b");
    }

    #[test]
    fn remove_then_get_is_none() {
        let mut reg = JobRegistry::new();
        reg.create(job("a"));
        assert!(reg.remove("a").is_some());
        assert!(reg.get("a").is_none());
        assert!(reg.is_empty());
    }
}
