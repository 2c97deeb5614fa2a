mod common;

// std
use std::time::Duration as StdDuration;
// crates.io
use time::Duration;
// self
use bearer_guard::{
	error::Error,
	executor::RequestOptions,
	refresh::{CoordinatorState, RecoveryOutcome},
};
use common::{ScriptedSessions, ScriptedTransport};

const CALLERS: usize = 10;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_expired_requests_share_one_fetch() {
	let sessions = ScriptedSessions::new(
		Some(common::session("expired", Duration::minutes(-1))),
		Some(common::session("fresh", Duration::hours(1))),
	)
	.with_fresh_delay(StdDuration::from_millis(100));
	let transport = ScriptedTransport::new();
	let (executor, store) =
		common::executor(common::fast_config(), sessions.clone(), transport.clone());
	let handles = (0..CALLERS)
		.map(|idx| {
			let executor = executor.clone();

			tokio::spawn(async move {
				executor.request(&format!("/designs/{idx}"), RequestOptions::get()).await
			})
		})
		.collect::<Vec<_>>();

	for handle in handles {
		handle
			.await
			.expect("Request task should not panic.")
			.expect("Every caller should succeed with the shared fresh token.");
	}

	assert_eq!(sessions.fresh_calls(), 1);
	assert_eq!(executor.refresh_metrics().attempts(), 1);
	assert_eq!(transport.requests().len(), CALLERS);
	assert!(
		transport.bearers().iter().all(|bearer| bearer.as_deref() == Some("Bearer fresh")),
		"Every request must carry the refreshed token."
	);
	assert_eq!(executor.coordinator_state(), CoordinatorState::Idle);
	assert!(!store.is_refreshing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn joiners_observe_the_leader_outcome() {
	let sessions = ScriptedSessions::new(Some(common::session("steady", Duration::hours(1))), None)
		.with_fresh_delay(StdDuration::from_millis(100));
	let (executor, _) =
		common::executor(common::fast_config(), sessions.clone(), ScriptedTransport::new());
	let handles = (0..CALLERS)
		.map(|_| {
			let executor = executor.clone();

			tokio::spawn(async move { executor.refresh_now().await })
		})
		.collect::<Vec<_>>();
	let mut outcomes = Vec::with_capacity(CALLERS);

	for handle in handles {
		outcomes.push(handle.await.expect("Refresh task should not panic."));
	}

	assert!(matches!(outcomes[0], RecoveryOutcome::Invalidated { .. }));
	assert!(outcomes.iter().all(|outcome| *outcome == outcomes[0]));
	assert_eq!(sessions.fresh_calls(), 1);
	assert_eq!(sessions.invalidations(), 1);
	assert_eq!(executor.refresh_metrics().joins(), CALLERS as u64 - 1);
	assert_eq!(executor.refresh_metrics().failures(), 1);
}

#[tokio::test]
async fn hung_session_fetch_times_out_and_unblocks_later_calls() {
	let sessions = ScriptedSessions::new(
		Some(common::session("expired", Duration::minutes(-1))),
		Some(common::session("never", Duration::hours(1))),
	)
	.with_fresh_delay(StdDuration::from_secs(30));
	let transport = ScriptedTransport::new();
	let config = common::fast_config().with_refresh_timeout(Duration::milliseconds(50));
	let (executor, store) = common::executor(config, sessions.clone(), transport.clone());
	let err = tokio::time::timeout(
		StdDuration::from_secs(5),
		executor.request("/designs", RequestOptions::get()),
	)
	.await
	.expect("The refresh timeout should bound the request.")
	.expect_err("A hung fetch should fail the request.");

	match err {
		Error::TokenRefreshFailed { reason } => assert!(reason.contains("timed out")),
		other => panic!("Unexpected error: {other:?}."),
	}

	assert_eq!(executor.coordinator_state(), CoordinatorState::Idle);
	assert!(!store.is_refreshing());
	assert_eq!(store.refresh_attempts(), 1);
	assert!(transport.requests().is_empty());

	let err = executor
		.request("/designs", RequestOptions::get())
		.await
		.expect_err("The invalidated session should not be usable.");

	assert!(matches!(err, Error::NotAuthenticated));
}

#[tokio::test]
async fn manual_refresh_after_failed_background_refresh_invalidates() {
	let sessions =
		ScriptedSessions::new(Some(common::session("expiring", Duration::minutes(2))), None)
			.with_fresh_delay(StdDuration::from_millis(200));
	let transport = ScriptedTransport::new();
	let (executor, store) =
		common::executor(common::fast_config(), sessions.clone(), transport.clone());

	executor
		.request("/designs", RequestOptions::get())
		.await
		.expect("Expiring tokens are still valid.");
	tokio::time::sleep(StdDuration::from_millis(20)).await;

	assert_eq!(executor.coordinator_state(), CoordinatorState::Refreshing);

	let outcome = executor.refresh_now().await;

	assert!(matches!(outcome, RecoveryOutcome::Invalidated { .. }));
	assert_eq!(sessions.fresh_calls(), 2);
	assert_eq!(sessions.invalidations(), 1);
	assert!(store.access_token().is_none());
	assert_eq!(executor.coordinator_state(), CoordinatorState::Idle);
}
