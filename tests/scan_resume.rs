//! Scan sessions survive across steps, restarts and lost leases.

mod helpers;

use std::time::Duration;

use helpers::{admin, Site, NONCE};
use link_sentinel::config::keys;
use link_sentinel::ServiceError;

async fn seed_corpus(site: &Site, n: usize) {
    for i in 0..n {
        site.seed(&format!("/post-{i}/"), "<p>no links here</p>").await;
    }
}

#[tokio::test]
async fn test_scan_steps_through_corpus_in_batches() {
    let site = Site::start().await;
    site.set(keys::SCAN_BATCH_SIZE, "5").await;
    seed_corpus(&site, 12).await;

    let start = site.sentinel.start_scan(&admin(), Some(NONCE)).await.unwrap();
    assert_eq!(start.message, "Scan initialized.");
    assert!(!start.resume);
    assert_eq!(start.total, 12);
    assert_eq!(start.batch, 5);
    assert_eq!(start.token.len(), 20);

    let mut token = start.token;
    let mut seen = Vec::new();
    loop {
        let step = site
            .sentinel
            .step_scan(&admin(), Some(NONCE), &token)
            .await
            .unwrap();
        seen.push(step.processed);
        if step.done {
            assert_eq!(step.processed, 12);
            assert_eq!(step.total, 12);
            assert_eq!(step.message, "Scan complete.");
            break;
        }
        token = step.token;
    }
    assert_eq!(seen, vec![5, 10, 12]);

    let status = site.sentinel.scan_status(&admin()).await.unwrap();
    assert!(!status.running);
    assert_eq!(status.message, "No active scans.");
    assert!(status.token.is_empty());
}

#[tokio::test]
async fn test_scan_resumes_after_restart() {
    let site = Site::start().await;
    site.set(keys::SCAN_BATCH_SIZE, "5").await;
    seed_corpus(&site, 8).await;

    let start = site.sentinel.start_scan(&admin(), Some(NONCE)).await.unwrap();
    let first = site
        .sentinel
        .step_scan(&admin(), Some(NONCE), &start.token)
        .await
        .unwrap();
    assert!(!first.done);
    assert_eq!(first.processed, 5);

    let status = site.sentinel.scan_status(&admin()).await.unwrap();
    assert!(status.running);
    assert_eq!(status.remaining, 3);
    assert_eq!(status.in_progress, 3);
    assert_eq!(status.message, "Scanning... 5 of 8 processed");

    let site = site.restart();
    let again = site.sentinel.start_scan(&admin(), Some(NONCE)).await.unwrap();
    assert!(again.resume);
    assert_eq!(again.message, "Resuming existing scan.");
    assert_eq!(again.token, start.token);
    assert_eq!(again.processed, 5);

    let last = site
        .sentinel
        .step_scan(&admin(), Some(NONCE), &again.token)
        .await
        .unwrap();
    assert!(last.done);
    assert_eq!(last.processed, 8);
}

#[tokio::test]
async fn test_wrong_token_is_rejected() {
    let site = Site::start().await;
    seed_corpus(&site, 2).await;
    site.sentinel.start_scan(&admin(), Some(NONCE)).await.unwrap();

    let err = site
        .sentinel
        .step_scan(&admin(), Some(NONCE), "not-the-token")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken(ref m) if m == "Invalid scan token."));
}

#[tokio::test]
async fn test_stale_session_is_replaced_after_lease_expiry() {
    let site = Site::start().await;
    site.set(keys::SCAN_BATCH_SIZE, "5").await;
    seed_corpus(&site, 8).await;

    let abandoned = site.sentinel.start_scan(&admin(), Some(NONCE)).await.unwrap();
    site.clock.advance(Duration::from_secs(16 * 60));

    let fresh = site.sentinel.start_scan(&admin(), Some(NONCE)).await.unwrap();
    assert!(!fresh.resume);
    assert_ne!(fresh.token, abandoned.token);
    assert_eq!(fresh.processed, 0);

    let err = site
        .sentinel
        .step_scan(&admin(), Some(NONCE), &abandoned.token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken(_)));
}

#[tokio::test]
async fn test_reset_abandons_session() {
    let site = Site::start().await;
    seed_corpus(&site, 3).await;
    let start = site.sentinel.start_scan(&admin(), Some(NONCE)).await.unwrap();

    site.sentinel.reset_scan(&admin(), Some(NONCE)).await.unwrap();
    let step = site
        .sentinel
        .step_scan(&admin(), Some(NONCE), &start.token)
        .await
        .unwrap();
    assert!(step.done);
    assert_eq!(step.message, "No active scan.");

    let restarted = site.sentinel.start_scan(&admin(), Some(NONCE)).await.unwrap();
    assert!(!restarted.resume);
}

async fn step_until_done(site: &Site, mut token: String, max_steps: usize) -> Vec<i64> {
    let mut seen = Vec::new();
    for _ in 0..max_steps {
        let step = site
            .sentinel
            .step_scan(&admin(), Some(NONCE), &token)
            .await
            .unwrap();
        seen.push(step.processed);
        if step.done {
            assert_eq!(step.processed, step.total);
            return seen;
        }
        token = step.token;
    }
    panic!("scan not done after {max_steps} steps: {seen:?}");
}

#[tokio::test]
async fn test_step_budget_splits_batch() {
    // Each document read costs 2s against a 3s budget with a floor of 2
    let site = Site::start_with_read_cost(Duration::from_secs(2)).await;
    site.set(keys::SCAN_BATCH_SIZE, "10").await;
    site.set(keys::SCAN_MIN_BATCH, "2").await;
    site.set(keys::SCAN_STEP_BUDGET_SECS, "3").await;
    seed_corpus(&site, 6).await;

    let start = site.sentinel.start_scan(&admin(), Some(NONCE)).await.unwrap();
    assert_eq!(start.total, 6);

    // Two documents per step, so at most 6 / 2 + 1 calls
    let seen = step_until_done(&site, start.token, 4).await;
    assert_eq!(seen, vec![2, 4, 6]);
}

#[tokio::test]
async fn test_minimum_floor_beats_budget() {
    // A single read already overruns the budget; the floor still gets 3 done
    let site = Site::start_with_read_cost(Duration::from_secs(10)).await;
    site.set(keys::SCAN_BATCH_SIZE, "10").await;
    site.set(keys::SCAN_MIN_BATCH, "3").await;
    site.set(keys::SCAN_STEP_BUDGET_SECS, "3").await;
    seed_corpus(&site, 7).await;

    let start = site.sentinel.start_scan(&admin(), Some(NONCE)).await.unwrap();
    let first = site
        .sentinel
        .step_scan(&admin(), Some(NONCE), &start.token)
        .await
        .unwrap();
    assert!(!first.done);
    assert_eq!(first.processed, 3);

    let status = site.sentinel.scan_status(&admin()).await.unwrap();
    assert!(status.running);
    assert_eq!(status.processed, 3);

    let seen = step_until_done(&site, first.token, 4).await;
    assert_eq!(seen, vec![6, 7]);
}
