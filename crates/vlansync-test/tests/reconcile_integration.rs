//! End-to-end reconciliation passes against the in-memory host

use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use vlansync_common::{ExecResult, VlanError, VlanId};
use vlansync_test::{desired_json, CommandVerifier, FakeHost, HostVerifier};
use vlansyncd::{
    ActionKind, ActionStatus, AddressFamily, DesiredInterface, DesiredState, PassOutcome,
    Reconciler,
};

fn vlan(id: u16) -> VlanId {
    VlanId::new(id).unwrap()
}

fn desired(entries: &[(&str, u16)]) -> DesiredState {
    DesiredState::new(
        entries
            .iter()
            .map(|(parent, id)| DesiredInterface::new(*parent, vlan(*id)))
            .collect(),
    )
    .unwrap()
}

fn reconciler(host: &Arc<FakeHost>) -> Reconciler<Arc<FakeHost>> {
    Reconciler::new(host.clone())
}

#[tokio::test]
async fn test_add_scenario() {
    let host = Arc::new(FakeHost::new().with_parent("eth0").with_vlan("eth0", 5));
    let want = DesiredState::new(vec![
        DesiredInterface::new("eth0", vlan(5)),
        DesiredInterface::new("eth0", vlan(9))
            .with_mtu(1460)
            .with_address("42:01:0a:00:09:09"),
    ])
    .unwrap();

    let outcome = reconciler(&host)
        .reconcile(&want, &CancellationToken::new())
        .await
        .unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.applied_count(), 1);
    assert_eq!(report.failure_count(), 0);
    assert_eq!(report.unchanged.len(), 1);

    let verifier = HostVerifier::new(&host);
    verifier.assert_vlans(&[("eth0", 5), ("eth0", 9)]).unwrap();
    verifier.assert_link_up("eth0.9").unwrap();
    verifier.assert_mtu("eth0.9", 1460).unwrap();
    verifier.assert_address("eth0.9", "42:01:0a:00:09:09").unwrap();
}

#[tokio::test]
async fn test_removal_scenario() {
    let host = Arc::new(
        FakeHost::new()
            .with_parent("eth0")
            .with_vlan("eth0", 5)
            .with_vlan("eth0", 7),
    );

    let outcome = reconciler(&host)
        .reconcile(&desired(&[("eth0", 5)]), &CancellationToken::new())
        .await
        .unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].kind, ActionKind::Remove);
    assert_eq!(report.outcomes[0].child_name, "eth0.7");
    HostVerifier::new(&host).assert_vlans(&[("eth0", 5)]).unwrap();
}

#[tokio::test]
async fn test_child_removed_externally_after_collect() {
    let host = Arc::new(
        FakeHost::new()
            .with_parent("eth0")
            .with_vlan("eth0", 5)
            .with_vlan("eth0", 7),
    );
    host.remove_on("/sbin/ip -d -j -6 link show type vlan", "eth0.7");

    let outcome = reconciler(&host)
        .reconcile(&desired(&[("eth0", 5)]), &CancellationToken::new())
        .await
        .unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.converged_count(), 1);
    assert_eq!(report.applied_count(), 0);
    assert_eq!(report.failure_count(), 0);
    assert!(report.is_clean());
    assert_eq!(report.outcomes[0].kind, ActionKind::Remove);
    assert!(matches!(
        report.outcomes[0].status,
        ActionStatus::AlreadyConverged
    ));
    assert_eq!(host.count("/sbin/ip link delete dev eth0.7"), 1);
    assert_eq!(host.count("/sbin/ip -d -j link show dev eth0.7"), 1);
    HostVerifier::new(&host).assert_vlans(&[("eth0", 5)]).unwrap();
}

#[tokio::test]
async fn test_idempotent_convergence() {
    let host = Arc::new(
        FakeHost::new()
            .with_parent("eth0")
            .with_parent("eth1")
            .with_vlan("eth0", 3)
            .with_vlan("eth1", 4),
    );
    let want = desired(&[("eth0", 3), ("eth0", 10), ("eth1", 10), ("eth1", 4094)]);
    let reconciler = reconciler(&host);
    let cancel = CancellationToken::new();

    let first = reconciler.reconcile(&want, &cancel).await.unwrap();
    assert_eq!(first.report().unwrap().outcomes.len(), 4);
    HostVerifier::new(&host)
        .assert_vlans(&[("eth0", 3), ("eth0", 10), ("eth1", 10), ("eth1", 4094)])
        .unwrap();

    host.clear_calls();
    let second = reconciler.reconcile(&want, &cancel).await.unwrap();
    let report = second.report().unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(report.unchanged.len(), 4);
    CommandVerifier::new(host.calls()).assert_read_only().unwrap();
}

#[tokio::test]
async fn test_failure_isolation() {
    let host = Arc::new(FakeHost::new().with_parent("eth0").with_parent("eth1"));
    host.fail_on(
        "/sbin/ip link add link eth1 name eth1.6 ",
        ExecResult::failed(2, "RTNETLINK answers: Operation not permitted"),
    );
    let want = desired(&[("eth0", 5), ("eth1", 6)]);
    let reconciler = reconciler(&host);

    let outcome = reconciler
        .reconcile(&want, &CancellationToken::new())
        .await
        .unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.to_string(), "completed with 1 failure");
    assert_eq!(report.applied_count(), 1);
    let failed: Vec<String> = report.failures().map(|o| o.key.to_string()).collect();
    assert_eq!(failed, vec!["eth1/6"]);
    HostVerifier::new(&host).assert_vlans(&[("eth0", 5)]).unwrap();

    // The next pass retries only the failed interface
    host.clear_failures();
    let outcome = reconciler
        .reconcile(&want, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.report().unwrap().applied_count(), 1);
    HostVerifier::new(&host)
        .assert_vlans(&[("eth0", 5), ("eth1", 6)])
        .unwrap();
}

#[tokio::test]
async fn test_unsupported_host_is_skipped() {
    let host = Arc::new(FakeHost::unsupported().with_parent("eth0").with_vlan("eth0", 7));

    let outcome = reconciler(&host)
        .reconcile(&desired(&[("eth0", 5)]), &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, PassOutcome::Skipped));
    assert_eq!(host.calls(), vec!["/sbin/modinfo 8021q"]);
    HostVerifier::new(&host).assert_vlans(&[("eth0", 7)]).unwrap();
}

#[tokio::test]
async fn test_both_families_merge_without_duplicates() {
    let host = Arc::new(FakeHost::new().with_parent("eth0").with_vlan("eth0", 5));

    let outcome = reconciler(&host)
        .reconcile(&desired(&[("eth0", 5)]), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.report().unwrap().outcomes.is_empty());
    assert_eq!(host.count("/sbin/ip -d -j -4 link show type vlan"), 1);
    assert_eq!(host.count("/sbin/ip -d -j -6 link show type vlan"), 1);
}

#[tokio::test]
async fn test_inet6_only_family() {
    let host = Arc::new(FakeHost::new().with_parent("eth0"));
    let reconciler = Reconciler::new(host.clone()).with_families(vec![AddressFamily::Inet6]);

    reconciler
        .reconcile(&desired(&[("eth0", 5)]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(host.count("/sbin/ip -d -j -4"), 0);
    HostVerifier::new(&host).assert_vlans(&[("eth0", 5)]).unwrap();
}

#[tokio::test]
async fn test_cancellation_during_apply() {
    let host = Arc::new(
        FakeHost::new()
            .with_parent("eth0")
            .with_vlan("eth0", 7)
            .with_vlan("eth0", 8),
    );
    let cancel = CancellationToken::new();
    host.cancel_on("/sbin/ip link delete dev eth0.7", cancel.clone());

    let outcome = reconciler(&host)
        .reconcile(&desired(&[("eth0", 5)]), &cancel)
        .await
        .unwrap();

    let report = outcome.report().unwrap();
    assert!(report.cancelled);
    assert_eq!(report.applied_count(), 1);
    assert_eq!(report.failure_count(), 0);
    assert_eq!(report.cancelled_count(), 2);
    assert!(matches!(report.outcomes[0].status, ActionStatus::Applied));
    assert!(matches!(report.outcomes[1].status, ActionStatus::Cancelled));
    assert!(matches!(report.outcomes[2].status, ActionStatus::Cancelled));
    HostVerifier::new(&host).assert_vlans(&[("eth0", 8)]).unwrap();
}

#[tokio::test]
async fn test_cancellation_after_last_action_is_clean() {
    let host = Arc::new(FakeHost::new().with_parent("eth0").with_vlan("eth0", 7));
    let cancel = CancellationToken::new();
    host.cancel_on("/sbin/ip link delete dev eth0.7", cancel.clone());

    let outcome = reconciler(&host)
        .reconcile(&desired(&[]), &cancel)
        .await
        .unwrap();

    let report = outcome.report().unwrap();
    assert!(cancel.is_cancelled());
    assert!(!report.cancelled);
    assert!(report.is_clean());
    assert_eq!(report.applied_count(), 1);
    assert_eq!(report.to_string(), "completed with 0 failures");
    HostVerifier::new(&host).assert_vlans(&[]).unwrap();
}

#[tokio::test]
async fn test_cancellation_during_collect_aborts_pass() {
    let host = Arc::new(FakeHost::new().with_parent("eth0").with_vlan("eth0", 7));
    let cancel = CancellationToken::new();
    host.cancel_on("/sbin/ip -d -j -4", cancel.clone());

    let err = reconciler(&host)
        .reconcile(&desired(&[]), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    CommandVerifier::new(host.calls()).assert_read_only().unwrap();
    HostVerifier::new(&host).assert_vlans(&[("eth0", 7)]).unwrap();
}

#[tokio::test]
async fn test_collection_failure_applies_nothing() {
    let host = Arc::new(FakeHost::new().with_parent("eth0").with_vlan("eth0", 7));
    host.fail_on(
        "/sbin/ip -d -j -6",
        ExecResult::failed(255, "Error: invalid argument"),
    );

    let err = reconciler(&host)
        .reconcile(&desired(&[("eth0", 5)]), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VlanError::CommandFailed { exit_code: 255, .. }));
    CommandVerifier::new(host.calls()).assert_read_only().unwrap();
}

#[tokio::test]
async fn test_follow_up_failure_rolls_back() {
    let host = Arc::new(FakeHost::new().with_parent("eth0"));
    host.fail_on(
        "/sbin/ip link set dev eth0.5 mtu",
        ExecResult::failed(2, "Error: mtu greater than device maximum."),
    );
    let want = DesiredState::new(vec![DesiredInterface::new("eth0", vlan(5)).with_mtu(65000)]).unwrap();

    let outcome = reconciler(&host)
        .reconcile(&want, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.report().unwrap().failure_count(), 1);
    assert_eq!(host.count("/sbin/ip link delete dev eth0.5"), 1);
    HostVerifier::new(&host).assert_vlans(&[]).unwrap();
}

#[tokio::test]
async fn test_existing_child_with_custom_name_is_kept() {
    let host = Arc::new(
        FakeHost::new()
            .with_parent("eth0")
            .with_vlan_named("eth0", "vlan5", 5),
    );

    let outcome = reconciler(&host)
        .reconcile(&desired(&[("eth0", 5)]), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.report().unwrap().outcomes.is_empty());
    assert!(host.link("vlan5").is_some());
    assert!(host.link("eth0.5").is_none());
}

#[tokio::test]
async fn test_missing_parent_is_isolated_failure() {
    let host = Arc::new(FakeHost::new().with_parent("eth0"));

    let outcome = reconciler(&host)
        .reconcile(&desired(&[("eth0", 5), ("eth9", 5)]), &CancellationToken::new())
        .await
        .unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.applied_count(), 1);
    HostVerifier::new(&host).assert_vlans(&[("eth0", 5)]).unwrap();
}

#[tokio::test]
async fn test_dry_run_leaves_host_untouched() {
    let host = Arc::new(FakeHost::new().with_parent("eth0").with_vlan("eth0", 7));
    let reconciler = Reconciler::new(host.clone()).with_dry_run(true);

    let outcome = reconciler
        .reconcile(&desired(&[("eth0", 5)]), &CancellationToken::new())
        .await
        .unwrap();

    let PassOutcome::Planned(plan) = outcome else {
        panic!("expected a planned pass");
    };
    assert_eq!(plan.action_count(), 2);
    CommandVerifier::new(host.calls()).assert_read_only().unwrap();
    HostVerifier::new(&host).assert_vlans(&[("eth0", 7)]).unwrap();
}

#[tokio::test]
async fn test_desired_state_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", desired_json(&[("eth0", 5), ("eth0", 6)])).unwrap();
    let want = DesiredState::load(file.path()).unwrap();
    assert_eq!(want.len(), 2);
    assert!(want.interfaces()[0].extra.contains_key("ipv4"));

    let host = Arc::new(FakeHost::new().with_parent("eth0"));
    reconciler(&host)
        .reconcile(&want, &CancellationToken::new())
        .await
        .unwrap();

    let verifier = HostVerifier::new(&host);
    verifier.assert_vlans(&[("eth0", 5), ("eth0", 6)]).unwrap();
    verifier.assert_address("eth0.5", "42:01:0a:00:00:05").unwrap();
}

#[test]
fn test_duplicate_desired_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", desired_json(&[("eth0", 5), ("eth0", 5)])).unwrap();

    let err = DesiredState::load(file.path()).unwrap_err();
    assert!(matches!(err, VlanError::InvalidDesiredState { .. }));
}
