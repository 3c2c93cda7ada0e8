//! Unit tests for enqueue validation and defaults

use super::enqueue::{execute, validate_spec};
use crate::domain::{JobSpec, JobState, MAX_RETRIES_KEY};
use crate::error::AppError;
use crate::port::JobStore;
use crate::port::id_provider::mocks::SequentialIdProvider;
use crate::port::job_store::mocks::InMemoryJobStore;
use crate::port::time_provider::mocks::MockTimeProvider;
use serde_json::json;
use std::sync::Arc;

fn fixtures() -> (InMemoryJobStore, SequentialIdProvider, Arc<MockTimeProvider>) {
    let clock = Arc::new(MockTimeProvider::new(5_000));
    let store = InMemoryJobStore::new(clock.clone());
    (store, SequentialIdProvider::new("job"), clock)
}

#[test]
fn test_validate_missing_command() {
    let spec = JobSpec::default();
    let result = validate_spec(&spec);
    assert!(matches!(result, Err(AppError::InvalidSpec(_))));
    assert!(result.unwrap_err().to_string().contains("required"));
}

#[test]
fn test_validate_blank_command() {
    let result = validate_spec(&JobSpec::new("   "));
    assert!(result.unwrap_err().to_string().contains("empty"));
}

#[test]
fn test_validate_blank_id() {
    let result = validate_spec(&JobSpec::new("true").with_id(""));
    assert!(matches!(result, Err(AppError::InvalidSpec(_))));
}

#[test]
fn test_validate_zero_max_retries() {
    let result = validate_spec(&JobSpec::new("true").with_max_retries(0));
    assert!(result.unwrap_err().to_string().contains("at least 1"));
}

#[test]
fn test_validate_valid_spec() {
    assert!(validate_spec(&JobSpec::new("echo hi").with_id("a").with_max_retries(5)).is_ok());
}

#[tokio::test]
async fn test_enqueue_applies_defaults() {
    let (store, ids, clock) = fixtures();

    let job = execute(&store, &ids, clock.as_ref(), JobSpec::new("echo hi"))
        .await
        .unwrap();

    assert_eq!(job.id, "job-1");
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_retries, 3);
    assert_eq!(job.created_at, 5_000);
}

#[tokio::test]
async fn test_enqueue_uses_configured_max_retries() {
    let (store, ids, clock) = fixtures();
    store.set_config(MAX_RETRIES_KEY, &json!(5)).await.unwrap();

    let job = execute(&store, &ids, clock.as_ref(), JobSpec::new("true"))
        .await
        .unwrap();
    assert_eq!(job.max_retries, 5);

    // explicit value wins over config
    let job = execute(
        &store,
        &ids,
        clock.as_ref(),
        JobSpec::new("true").with_max_retries(1),
    )
    .await
    .unwrap();
    assert_eq!(job.max_retries, 1);
}

#[tokio::test]
async fn test_enqueue_duplicate_id_leaves_original() {
    let (store, ids, clock) = fixtures();
    execute(&store, &ids, clock.as_ref(), JobSpec::new("echo one").with_id("a"))
        .await
        .unwrap();

    let result = execute(&store, &ids, clock.as_ref(), JobSpec::new("echo two").with_id("a")).await;
    assert!(matches!(result, Err(AppError::DuplicateId(id)) if id == "a"));

    let stored = store.get(&"a".to_string()).await.unwrap().unwrap();
    assert_eq!(stored.command, "echo one");
}
