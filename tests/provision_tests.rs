//! End-to-end tests for the provisioned WEDOS range source.
//!
//! Tests verify:
//! - Seeding publishes the first snapshot
//! - Seeding failures (refused connection, error status) leave the cache
//!   empty until a later tick succeeds
//! - Failed refreshes keep the previous snapshot
//! - Reads never wait on an in-flight fetch
//! - Cancellation stops the background task

mod common;

use common::{render, unused_addr, wait_until, StubResponse, StubServer, EXAMPLE_BODY};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wedos_ip::{
    IpRangeSource, ProvisionError, Provisioner, RefreshConfig, RefresherState, RequestContext,
    WedosIpRange,
};

const WAIT: Duration = Duration::from_secs(5);

fn module_for(server: &StubServer, interval: Duration) -> WedosIpRange {
    WedosIpRange::with_config(RefreshConfig {
        interval: Some(interval),
        timeout: Some(Duration::from_secs(2)),
    })
    .with_source_url(server.url())
}

async fn wait_for_state(module: &WedosIpRange, wanted: RefresherState) {
    let mut states = module.subscribe().expect("module is provisioned");
    tokio::time::timeout(WAIT, states.wait_for(|state| *state == wanted))
        .await
        .expect("state change timed out")
        .unwrap();
}

#[tokio::test]
async fn test_seed_and_serve_ranges() {
    let server = StubServer::start(vec![StubResponse::ok(EXAMPLE_BODY)]).await;
    let mut module = module_for(&server, Duration::from_secs(3600));
    let cancel = CancellationToken::new();

    module.provision(cancel.clone()).unwrap();
    wait_for_state(&module, RefresherState::Steady).await;

    let request = RequestContext::new("127.0.0.1:4000".parse().unwrap());
    let ranges = module.get_ip_ranges(&request);
    assert_eq!(render(&ranges), vec!["1.2.3.0/24", "4.5.6.0/16", "7.8.9.0/28"]);
    assert!(module.is_trusted("4.5.200.1".parse().unwrap()));
    assert!(!module.is_trusted("8.8.8.8".parse().unwrap()));
    assert!(module.status().is_seeded());

    cancel.cancel();
    module.wait_terminated().await;
    assert_eq!(module.state(), RefresherState::Terminated);
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_seed_failure_recovers_on_tick() {
    // Nothing listens yet, so seeding fails at the transport level.
    let addr = unused_addr();
    let mut module = WedosIpRange::with_config(RefreshConfig {
        interval: Some(Duration::from_millis(200)),
        timeout: Some(Duration::from_secs(2)),
    })
    .with_source_url(format!("http://{}/ips.txt", addr));
    let cancel = CancellationToken::new();

    module.provision(cancel.clone()).unwrap();
    wait_for_state(&module, RefresherState::Steady).await;
    assert!(module.prefixes().is_empty());
    assert_eq!(module.status().consecutive_failures, 1);
    assert!(module.status().last_error.is_some());

    let server = StubServer::start_on(addr, vec![StubResponse::ok(EXAMPLE_BODY)]).await;

    assert!(wait_until(|| module.prefixes().len() == 3, WAIT).await);
    assert_eq!(module.status().consecutive_failures, 0);
    assert!(server.hits() >= 1);

    cancel.cancel();
    module.wait_terminated().await;
}

#[tokio::test]
async fn test_error_status_recovers_on_tick() {
    let server = StubServer::start(vec![
        StubResponse::status(500),
        StubResponse::ok(EXAMPLE_BODY),
    ])
    .await;
    let mut module = module_for(&server, Duration::from_millis(200));
    let cancel = CancellationToken::new();

    module.provision(cancel.clone()).unwrap();
    wait_for_state(&module, RefresherState::Steady).await;
    assert!(module.prefixes().is_empty());
    assert_eq!(module.status().consecutive_failures, 1);

    assert!(wait_until(|| module.prefixes().len() == 3, WAIT).await);
    assert_eq!(module.status().consecutive_failures, 0);

    cancel.cancel();
    module.wait_terminated().await;
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_snapshot() {
    let server = StubServer::start(vec![
        StubResponse::ok(EXAMPLE_BODY),
        StubResponse::ok("1.2.3.0/24 not-a-cidr"),
    ])
    .await;
    let mut module = module_for(&server, Duration::from_millis(100));
    let cancel = CancellationToken::new();

    module.provision(cancel.clone()).unwrap();
    wait_for_state(&module, RefresherState::Steady).await;
    let seeded = module.prefixes();
    assert_eq!(seeded.len(), 3);

    assert!(wait_until(|| module.status().failed_refreshes >= 2, WAIT).await);

    let current = module.prefixes();
    assert!(Arc::ptr_eq(&seeded, &current));
    assert_eq!(render(&current), vec!["1.2.3.0/24", "4.5.6.0/16", "7.8.9.0/28"]);
    assert!(module.status().last_error.unwrap().contains("not-a-cidr"));

    cancel.cancel();
    module.wait_terminated().await;
}

#[tokio::test]
async fn test_reads_do_not_wait_on_fetch_and_cancel_is_prompt() {
    let server = StubServer::start(vec![
        StubResponse::ok(EXAMPLE_BODY).delayed(Duration::from_secs(10))
    ])
    .await;
    let mut module = WedosIpRange::new().with_source_url(server.url());
    let cancel = CancellationToken::new();

    module.provision(cancel.clone()).unwrap();
    assert!(wait_until(|| server.hits() == 1, WAIT).await);
    assert_eq!(module.state(), RefresherState::Seeding);

    let start = Instant::now();
    for _ in 0..1_000 {
        assert!(module.get_ip_ranges(&RequestContext::default()).is_empty());
    }
    assert!(start.elapsed() < Duration::from_secs(1));

    let start = Instant::now();
    cancel.cancel();
    module.wait_terminated().await;
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(module.state(), RefresherState::Terminated);
    assert_eq!(module.status().failed_refreshes, 0);
}

#[tokio::test]
async fn test_no_fetches_after_cancellation() {
    let server = StubServer::start(vec![StubResponse::ok(EXAMPLE_BODY)]).await;
    let mut module = module_for(&server, Duration::from_millis(50));
    let cancel = CancellationToken::new();

    module.provision(cancel.clone()).unwrap();
    assert!(wait_until(|| server.hits() >= 2, WAIT).await);

    cancel.cancel();
    module.wait_terminated().await;
    let hits = server.hits();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.hits(), hits);
}

#[tokio::test]
async fn test_provision_twice_is_rejected() {
    let server = StubServer::start(vec![StubResponse::ok(EXAMPLE_BODY)]).await;
    let mut module = module_for(&server, Duration::from_secs(3600));
    let cancel = CancellationToken::new();

    module.provision(cancel.clone()).unwrap();
    let err = module.provision(cancel.clone()).unwrap_err();
    assert!(matches!(err, ProvisionError::AlreadyProvisioned));

    cancel.cancel();
    module.wait_terminated().await;

    // Terminated modules stay terminated.
    assert!(matches!(
        module.provision(CancellationToken::new()).unwrap_err(),
        ProvisionError::AlreadyProvisioned
    ));
}

#[tokio::test]
async fn test_instances_do_not_share_state() {
    let full = StubServer::start(vec![StubResponse::ok(EXAMPLE_BODY)]).await;
    let single = StubServer::start(vec![StubResponse::ok("10.0.0.0/8")]).await;
    let mut a = module_for(&full, Duration::from_secs(3600));
    let mut b = module_for(&single, Duration::from_secs(3600));
    let cancel = CancellationToken::new();

    a.provision(cancel.clone()).unwrap();
    b.provision(cancel.clone()).unwrap();
    wait_for_state(&a, RefresherState::Steady).await;
    wait_for_state(&b, RefresherState::Steady).await;

    assert_eq!(a.prefixes().len(), 3);
    assert_eq!(render(&b.prefixes()), vec!["10.0.0.0/8"]);

    // One host token tears down both.
    cancel.cancel();
    a.wait_terminated().await;
    b.wait_terminated().await;
    assert_eq!(a.state(), RefresherState::Terminated);
    assert_eq!(b.state(), RefresherState::Terminated);
}
