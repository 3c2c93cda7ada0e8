// Table rendering

use chrono::DateTime;
use queuectl_core::application::QueueStatus;
use queuectl_core::domain::{Job, JobState};
use std::collections::BTreeSet;
use tabled::{Table, Tabled};

const COMMAND_WIDTH: usize = 40;
const ERROR_WIDTH: usize = 60;

#[derive(Tabled)]
struct JobLine {
    id: String,
    state: String,
    attempts: String,
    command: String,
    #[tabled(rename = "next retry")]
    next_retry: String,
    updated: String,
}

#[derive(Tabled)]
struct DeadLine {
    id: String,
    attempts: u32,
    command: String,
    #[tabled(rename = "last error")]
    last_error: String,
    updated: String,
}

#[derive(Tabled)]
struct ActiveLine {
    id: String,
    worker: String,
    attempt: u32,
    command: String,
    since: String,
}

#[derive(Tabled)]
struct CountLine {
    state: String,
    jobs: i64,
}

pub fn jobs_table(jobs: &[Job]) -> String {
    let lines = jobs.iter().map(|job| JobLine {
        id: job.id.clone(),
        state: job.state.to_string(),
        attempts: format!("{}/{}", job.attempts, job.max_retries),
        command: truncate(&job.command, COMMAND_WIDTH),
        next_retry: job
            .next_retry_at
            .map(format_millis)
            .unwrap_or_else(|| "-".to_string()),
        updated: format_millis(job.updated_at),
    });
    Table::new(lines).to_string()
}

pub fn dead_table(jobs: &[Job]) -> String {
    let lines = jobs.iter().map(|job| DeadLine {
        id: job.id.clone(),
        attempts: job.attempts,
        command: truncate(&job.command, COMMAND_WIDTH),
        last_error: truncate(job.last_error.as_deref().unwrap_or("-"), ERROR_WIDTH),
        updated: format_millis(job.updated_at),
    });
    Table::new(lines).to_string()
}

pub fn active_table(jobs: &[Job]) -> String {
    let lines = jobs.iter().map(|job| ActiveLine {
        id: job.id.clone(),
        worker: job.worker_id.clone().unwrap_or_else(|| "-".to_string()),
        attempt: job.attempts + 1,
        command: truncate(&job.command, COMMAND_WIDTH),
        since: format_millis(job.updated_at),
    });
    Table::new(lines).to_string()
}

/// One row per state plus active worker and total rows
pub fn counts_table(status: &QueueStatus) -> String {
    let workers: BTreeSet<&str> = status
        .processing
        .iter()
        .filter_map(|j| j.worker_id.as_deref())
        .collect();

    let mut lines: Vec<CountLine> = JobState::ALL
        .iter()
        .map(|state| CountLine {
            state: state.to_string(),
            jobs: status.count(*state),
        })
        .collect();
    lines.push(CountLine {
        state: "total".to_string(),
        jobs: status.total(),
    });
    lines.push(CountLine {
        state: "active workers".to_string(),
        jobs: workers.len() as i64,
    });

    Table::new(lines).to_string()
}

fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn truncate(text: &str, width: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
        assert_eq!(truncate("  padded  ", 10), "padded");
    }

    #[test]
    fn test_jobs_table_shows_attempt_budget() {
        let mut job = Job::new("job-1", "echo hi", 3, 0);
        job.attempts = 2;
        let table = jobs_table(&[job]);
        assert!(table.contains("job-1"));
        assert!(table.contains("2/3"));
        assert!(table.contains("1970-01-01 00:00:00"));
    }

    #[test]
    fn test_counts_table_lists_every_state() {
        let mut counts: BTreeMap<JobState, i64> = JobState::ALL.iter().map(|s| (*s, 0)).collect();
        counts.insert(JobState::Pending, 4);
        let mut active = Job::new("a", "sleep 1", 3, 0);
        active.state = JobState::Processing;
        active.worker_id = Some("w-1".to_string());
        counts.insert(JobState::Processing, 1);

        let table = counts_table(&QueueStatus {
            counts,
            processing: vec![active],
        });
        for state in JobState::ALL {
            assert!(table.contains(state.as_str()));
        }
        assert!(table.contains("active workers"));
    }
}
