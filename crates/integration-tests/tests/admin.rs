// Admin entry points and their audit trail

mod common;

use common::{release, Harness, ADMIN, T0};
use relsync_core::domain::{JobStatus, JobType};
use relsync_core::error::AppError;
use relsync_core::port::release_provider::mocks::ScriptedReleaseProvider;

#[tokio::test]
async fn test_register_module_and_toggle() {
    let h = Harness::new(ScriptedReleaseProvider::new()).await;

    let config = h
        .admin
        .register_module(ADMIN, 12, " acme/widget ", Some("pat-1".to_string()))
        .await
        .unwrap();
    assert_eq!(config.github_repo, "acme/widget");
    assert!(config.enabled);
    assert_eq!(config.owner_token.as_deref(), Some("pat-1"));

    // Changing the repo without a token keeps the stored one
    let moved = h
        .admin
        .register_module(ADMIN, 12, "acme/widget-ng", None)
        .await
        .unwrap();
    assert_eq!(moved.github_repo, "acme/widget-ng");
    assert_eq!(moved.owner_token.as_deref(), Some("pat-1"));

    let disabled = h.admin.set_module_sync_enabled(ADMIN, 12, false).await.unwrap();
    assert!(!disabled.enabled);

    assert!(matches!(
        h.admin.register_module(ADMIN, 13, "not-a-repo", None).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        h.admin.set_module_sync_enabled(ADMIN, 404, true).await,
        Err(AppError::NotFound(_))
    ));

    let actions: Vec<String> = h
        .admin
        .recent_admin_actions(10)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.action)
        .collect();
    assert_eq!(
        actions,
        vec!["module_sync_toggle", "module_register", "module_register"]
    );
}

#[tokio::test]
async fn test_manual_sync_rules() {
    let h = Harness::new(ScriptedReleaseProvider::new()).await;
    h.add_module(1, "acme/one").await;
    h.add_module(2, "acme/two").await;
    h.admin.set_module_sync_enabled(ADMIN, 2, false).await.unwrap();

    let job_id = h.admin.enqueue_module_sync(ADMIN, 1).await.unwrap();
    let job = h.admin.get_job(job_id).await.unwrap();
    assert_eq!(job.job_type, JobType::SyncModule);
    assert_eq!(job.started_by.as_deref(), Some(ADMIN));

    assert!(matches!(
        h.admin.enqueue_module_sync(ADMIN, 2).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        h.admin.enqueue_module_sync(ADMIN, 3).await,
        Err(AppError::NotFound(_))
    ));

    let action = &h.admin.recent_admin_actions(1).await.unwrap()[0];
    assert_eq!(action.action, "manual_sync");
    assert_eq!(action.target_id, "1");
    assert_eq!(action.new_values.as_ref().unwrap()["jobId"], job_id);
}

#[tokio::test]
async fn test_sync_all_skips_busy_and_disabled() {
    let h = Harness::new(ScriptedReleaseProvider::new()).await;
    for id in 1..=4 {
        h.add_module(id, &format!("acme/m{}", id)).await;
    }
    h.admin.set_module_sync_enabled(ADMIN, 4, false).await.unwrap();
    h.admin.enqueue_module_sync(ADMIN, 2).await.unwrap();

    let queued = h.admin.sync_all_enabled(ADMIN).await.unwrap();
    assert_eq!(queued.len(), 2);

    let mut modules: Vec<i64> = Vec::new();
    for id in &queued {
        let job = h.admin.get_job(*id).await.unwrap();
        modules.push(job.sync_module_params().unwrap().module_id);
    }
    modules.sort();
    assert_eq!(modules, vec![1, 3]);

    // Everything enabled is now busy
    assert!(h.admin.sync_all_enabled(ADMIN).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_and_retry_are_audited() {
    let h = Harness::new(ScriptedReleaseProvider::new()).await;
    let job_id = h.admin.enqueue_batch_sync(ADMIN, 5).await.unwrap();

    let cancelled = h.admin.cancel_job(ADMIN, job_id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    let retry_id = h.admin.retry_job(ADMIN, job_id).await.unwrap();
    assert_ne!(retry_id, job_id);

    let actions = h.admin.recent_admin_actions(10).await.unwrap();
    assert_eq!(actions[0].action, "job_retry");
    assert_eq!(actions[0].new_values.as_ref().unwrap()["jobId"], retry_id);
    assert_eq!(actions[1].action, "job_cancel");
    assert_eq!(actions[1].old_values.as_ref().unwrap()["status"], "pending");
    assert_eq!(actions[1].new_values.as_ref().unwrap()["status"], "cancelled");
    assert_eq!(actions[2].action, "job_start");
    assert!(actions.iter().all(|a| a.admin_id == ADMIN && a.created_at == T0));

    assert!(matches!(
        h.admin.cancel_job(ADMIN, 9_999).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_stats_and_release_listing() {
    let provider = ScriptedReleaseProvider::new()
        .with_releases("acme/one", vec![release("1", "v1", 1), release("2", "v2", 2)]);
    let h = Harness::new(provider).await;
    h.add_module(1, "acme/one").await;
    h.add_module(2, "acme/missing").await;
    h.add_module(3, "acme/idle").await;
    h.admin.set_module_sync_enabled(ADMIN, 3, false).await.unwrap();

    h.admin.enqueue_module_sync(ADMIN, 1).await.unwrap();
    h.admin.enqueue_module_sync(ADMIN, 2).await.unwrap();
    h.drain().await;

    let stats = h.admin.sync_stats().await.unwrap();
    assert_eq!(stats.total_modules, 3);
    assert_eq!(stats.enabled_modules, 2);
    assert_eq!(stats.modules_with_errors, 1);
    assert_eq!(stats.never_synced, 1);
    assert_eq!(stats.jobs_by_status["completed"], 1);
    assert_eq!(stats.jobs_by_status["failed"], 1);
    assert_eq!(stats.jobs_by_status["pending"], 0);

    let releases = h.admin.list_module_releases(1).await.unwrap();
    assert_eq!(releases.len(), 2);
    assert_eq!(releases[0].version, "v2");
    assert!(releases[0].is_latest);

    assert!(matches!(
        h.admin.list_module_releases(99).await,
        Err(AppError::NotFound(_))
    ));

    let configs = h.admin.list_module_configs().await.unwrap();
    assert_eq!(configs.iter().map(|c| c.module_id).collect::<Vec<_>>(), vec![1, 2, 3]);
}
