//! End-to-end scan workflow tests.
//!
//! Trigger scans over HTTP, let the background task run against a scripted
//! source, then check the ledger and the stored repositories.

mod common;

use abandoned::db::{self, RepositoryFilter};
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::*;
use serde_json::json;

async fn trigger(app: &TestApp, session: &str) -> String {
    let response = app.send(post_json("/api/scan", session, json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response).await;
    assert_eq!(body["success"], true);
    body["scan_id"].as_str().expect("scan_id").to_string()
}

async fn stored_ids(app: &TestApp, user_id: &str) -> Vec<i64> {
    let mut ids: Vec<i64> = db::list_repositories(app.db(), user_id, RepositoryFilter::All)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.github_id)
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_scan_stores_repositories_and_completes() {
    let app = setup().await;
    let (user, session) = sign_in(app.db(), "octocat").await;
    app.source.add(1, false, Some(Utc::now() - Duration::days(400)));
    app.source.add(2, false, Some(Utc::now() - Duration::days(2)));
    app.source.add(3, false, None);

    let scan_id = trigger(&app, &session).await;
    let scan = wait_for_scan(app.db(), &scan_id).await;

    assert_eq!(scan.status, "completed");
    assert!(scan.completed_at.is_some());
    assert_eq!(scan.repos_scanned, 3);
    assert_eq!(scan.repos_added, 3);
    assert_eq!(scan.repos_updated, 0);
    assert_eq!(scan.repos_deleted, 0);
    assert_eq!(stored_ids(&app, &user.id).await, vec![1, 2, 3]);

    let response = app
        .send(get_with_session(&format!("/api/scan/{}", scan_id), &session))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response).await;
    assert_eq!(body["id"], scan_id.as_str());
    assert_eq!(body["status"], "completed");
    assert_eq!(body["repos_scanned"], 3);
    assert!(body["progress"].is_null());
    assert!(body["error"].is_null());

    // Abandoned classification is visible through the repositories API
    let body = extract_json(
        app.send(get_with_session("/api/repositories?type=abandoned", &session))
            .await,
    )
    .await;
    let abandoned: Vec<&str> = body["repositories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(abandoned, vec!["repo-1", "repo-3"]);
}

#[tokio::test]
async fn test_second_trigger_conflicts_while_running() {
    let app = setup().await;
    let (user, session) = sign_in(app.db(), "octocat").await;
    app.source.add(1, false, Some(Utc::now()));
    let gate = app.source.hold_listing();

    let scan_id = trigger(&app, &session).await;

    let response = app.send(post_json("/api/scan", &session, json!({}))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response).await;
    assert_eq!(body["scan_id"], scan_id.as_str());
    assert_eq!(body["error"], "Scan already in progress");

    // The conflict created no second ledger record
    let scans = db::list_scans(app.db(), &user.id, 10).await.unwrap();
    assert_eq!(scans.len(), 1);

    // Live progress while the listing is held
    let body = extract_json(
        app.send(get_with_session(&format!("/api/scan/{}", scan_id), &session))
            .await,
    )
    .await;
    assert_eq!(body["status"], "running");
    assert_eq!(body["progress"]["phase"], "fetching");

    gate.notify_one();
    let scan = wait_for_scan(app.db(), &scan_id).await;
    assert_eq!(scan.status, "completed");
}

#[tokio::test]
async fn test_rescan_reconciles_removed_repositories() {
    let app = setup().await;
    let (user, session) = sign_in(app.db(), "octocat").await;
    app.source.add(1, false, Some(Utc::now()));
    app.source.add(2, false, Some(Utc::now()));

    let first = trigger(&app, &session).await;
    wait_for_scan(app.db(), &first).await;

    app.source.remove(2);
    app.source.add(3, false, Some(Utc::now()));

    let second = trigger(&app, &session).await;
    let scan = wait_for_scan(app.db(), &second).await;

    assert_eq!(scan.status, "completed");
    assert_eq!(scan.repos_scanned, 2);
    assert_eq!(scan.repos_added, 1);
    assert_eq!(scan.repos_updated, 1);
    assert_eq!(scan.repos_deleted, 1);
    assert_eq!(stored_ids(&app, &user.id).await, vec![1, 3]);
}

#[tokio::test]
async fn test_empty_listing_keeps_stored_repositories() {
    let app = setup().await;
    let (user, session) = sign_in(app.db(), "octocat").await;
    app.source.add(1, false, Some(Utc::now()));

    let first = trigger(&app, &session).await;
    wait_for_scan(app.db(), &first).await;

    app.source.remove(1);
    let second = trigger(&app, &session).await;
    let scan = wait_for_scan(app.db(), &second).await;

    assert_eq!(scan.status, "completed");
    assert_eq!(scan.repos_scanned, 0);
    assert_eq!(scan.repos_deleted, 0);
    assert_eq!(stored_ids(&app, &user.id).await, vec![1]);
}

#[tokio::test]
async fn test_orphaned_running_scan_does_not_block_trigger() {
    let app = setup().await;
    let (user, session) = sign_in(app.db(), "octocat").await;
    app.source.add(1, false, Some(Utc::now()));

    // Left behind by a task that no longer exists
    let orphan = db::start_scan(app.db(), &user.id).await.unwrap();

    let scan_id = trigger(&app, &session).await;
    assert_ne!(scan_id, orphan.id);

    let scan = wait_for_scan(app.db(), &scan_id).await;
    assert_eq!(scan.status, "completed");

    let body = extract_json(
        app.send(get_with_session(&format!("/api/scan/{}", orphan.id), &session))
            .await,
    )
    .await;
    assert_eq!(body["status"], "failed");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("interrupted"));
}

#[tokio::test]
async fn test_failed_commit_lookup_keeps_stored_record() {
    let app = setup().await;
    let (user, session) = sign_in(app.db(), "octocat").await;
    let stale_commit = Utc::now() - Duration::days(30);
    app.source.add(1, false, Some(stale_commit));
    app.source.add(2, false, Some(Utc::now()));

    let first = trigger(&app, &session).await;
    wait_for_scan(app.db(), &first).await;

    app.source.fail_lookup(1);
    let second = trigger(&app, &session).await;
    let scan = wait_for_scan(app.db(), &second).await;

    assert_eq!(scan.status, "completed");
    assert_eq!(scan.repos_scanned, 1);
    assert_eq!(scan.errors_count, 1);
    assert_eq!(scan.repos_deleted, 0);
    assert_eq!(stored_ids(&app, &user.id).await, vec![1, 2]);

    let kept = db::get_repository_by_github_id(app.db(), &user.id, 1)
        .await
        .unwrap()
        .expect("record survives a failed lookup");
    assert!(kept.last_commit_date.is_some());
}

#[tokio::test]
async fn test_listing_failure_fails_scan() {
    let app = setup().await;
    let (user, session) = sign_in(app.db(), "octocat").await;
    app.source.add(1, false, Some(Utc::now()));

    let first = trigger(&app, &session).await;
    wait_for_scan(app.db(), &first).await;

    app.source.fail_listing("Bad credentials");
    let second = trigger(&app, &session).await;
    let scan = wait_for_scan(app.db(), &second).await;

    assert_eq!(scan.status, "failed");
    assert!(scan.completed_at.is_some());
    let detail = scan.error_detail().expect("structured error detail");
    assert!(detail.message.contains("Bad credentials"));

    // A failed scan leaves stored repositories untouched
    assert_eq!(stored_ids(&app, &user.id).await, vec![1]);

    let body = extract_json(
        app.send(get_with_session(&format!("/api/scan/{}", second), &session))
            .await,
    )
    .await;
    assert_eq!(body["status"], "failed");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Bad credentials"));

    // A new scan may start once the previous one failed
    let third = trigger(&app, &session).await;
    assert_ne!(third, second);
    wait_for_scan(app.db(), &third).await;
}

#[tokio::test]
async fn test_private_repositories_follow_config() {
    let app = setup().await;
    let (user, session) = sign_in(app.db(), "octocat").await;
    app.source.add(1, false, Some(Utc::now()));
    app.source.add(2, true, Some(Utc::now()));

    let first = trigger(&app, &session).await;
    wait_for_scan(app.db(), &first).await;
    assert_eq!(stored_ids(&app, &user.id).await, vec![1]);

    app.send(post_json("/api/config", &session, json!({ "scan_private_repos": true })))
        .await;

    let second = trigger(&app, &session).await;
    wait_for_scan(app.db(), &second).await;
    assert_eq!(stored_ids(&app, &user.id).await, vec![1, 2]);
}

#[tokio::test]
async fn test_scan_status_is_scoped_to_account() {
    let app = setup().await;
    let (_, owner) = sign_in(app.db(), "octocat").await;
    let (_, other) = sign_in(app.db(), "hubot").await;

    let scan_id = trigger(&app, &owner).await;
    wait_for_scan(app.db(), &scan_id).await;

    let response = app
        .send(get_with_session(&format!("/api/scan/{}", scan_id), &other))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send(get_with_session("/api/scan/does-not-exist", &owner))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scan_history_newest_first() {
    let app = setup().await;
    let (_, session) = sign_in(app.db(), "octocat").await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let scan_id = trigger(&app, &session).await;
        wait_for_scan(app.db(), &scan_id).await;
        ids.push(scan_id);
    }

    let body = extract_json(app.send(get_with_session("/api/scans?limit=2", &session)).await).await;
    let listed: Vec<&str> = body["scans"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(listed, vec![ids[2].as_str(), ids[1].as_str()]);
}
