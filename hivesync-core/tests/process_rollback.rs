/*
    Process rollback integration tests

    - a failing second step compensates the first step's put
    - a fork group is all-or-nothing
    - compensation runs in reverse completion order, observed on the overlay
    - a rotating put restores the slot's previous protector on rollback,
      also when the put itself reached too few replicas
    - a compensation that cannot run leaves the process FailedDirty, and so
      does a partial put that cannot be taken back
    - a remove reported as failed puts back what it took
    - an abort cancels the next step and compensates what already ran
*/

use std::sync::Arc;
use std::time::Duration;

use hivesync_core::core_data::{DataConfig, ProtectionKeys, StoredEntry, VersionedEntry};
use hivesync_core::core_dht::{ContentAddress, DhtConfig, DhtService, Target};
use hivesync_core::core_process::{
    DigestExpectation, Process, ProcessBuilder, ProcessStatus, ProcessStep, ProtectionSource,
    PutContent, Slot, StepKind, StepState, ABORT_ORIGIN,
};
use hivesync_core::test_utils::{collect_statuses, test_key_pair, FaultyDht, TestNetwork};

fn slot(name: &str) -> ContentAddress {
    ContentAddress::hashed("location", name)
}

fn put(name: &str) -> ProcessStep {
    ProcessStep::put(
        name,
        slot(name),
        VersionedEntry::new(name.as_bytes().to_vec()),
        ProtectionKeys::unprotected(),
    )
}

/// Cancels unless `name` is empty, which it is not once `put(name)` ran
fn expect_empty(step: &str, name: &str) -> ProcessStep {
    ProcessStep::digest(step, Target::all(slot(name)), DigestExpectation::Empty)
}

#[tokio::test]
async fn test_second_step_failure_compensates_first() {
    let network = TestNetwork::new();
    let mut process = ProcessBuilder::new("put-then-fail")
        .step(put("first"))
        .step(expect_empty("second", "first"))
        .build(network.env());
    let statuses = tokio::spawn(collect_statuses(process.subscribe()));

    let report = process.run().await.unwrap();
    assert_eq!(report.status, ProcessStatus::Failed);
    assert_eq!(report.reason.unwrap().step, "second");
    assert!(report.rollback_failures.is_empty());
    assert_eq!(network.digest_len(Target::all(slot("first"))).await, 0);

    let root = process.root().unwrap();
    assert_eq!(root.find("first").unwrap().state(), StepState::RollbackSucceeded);
    assert_eq!(root.find("second").unwrap().state(), StepState::ExecutionFailed);

    let seen = statuses.await.unwrap();
    assert_eq!(seen.last(), Some(&ProcessStatus::Failed));
    assert!(!seen.contains(&ProcessStatus::Succeeded));
}

/// Network whose overlay calls pass through a `FaultyDht`
fn faulty_network(data_config: DataConfig) -> (TestNetwork, Arc<FaultyDht>) {
    let mut faulty = None;
    let network = TestNetwork::wrapped_with_config(DhtConfig::default(), data_config, |dht| {
        let wrapper = Arc::new(FaultyDht::new(dht));
        faulty = Some(wrapper.clone());
        wrapper as Arc<dyn DhtService>
    });
    match faulty {
        Some(faulty) => (network, faulty),
        None => panic!("wrapper was not installed"),
    }
}

fn composite_order(process: &Process, name: &str) -> Vec<String> {
    match process.root().unwrap().find(name).unwrap().kind() {
        StepKind::Composite(composite) => {
            composite.completion_order().into_iter().map(str::to_string).collect()
        }
        _ => panic!("{} is not a composite", name),
    }
}

fn removed_slots(faulty: &FaultyDht) -> Vec<ContentAddress> {
    faulty.removes().iter().map(Target::address).collect()
}

#[tokio::test]
async fn test_fork_group_is_all_or_nothing() {
    let (network, faulty) = faulty_network(DataConfig::default());
    faulty.fail_puts_to(slot("c"));
    let mut process = ProcessBuilder::new("fork")
        .fork("parallel", vec![put("a"), put("b"), put("c")])
        .build(network.env());

    let report = process.run().await.unwrap();
    assert_eq!(report.status, ProcessStatus::Failed);
    assert_eq!(report.reason.unwrap().step, "c");
    assert!(report.rollback_failures.is_empty());
    for name in ["a", "b", "c"] {
        assert_eq!(network.digest_len(Target::all(slot(name))).await, 0, "{} survived", name);
    }

    let root = process.root().unwrap();
    assert_eq!(root.find("a").unwrap().state(), StepState::RollbackSucceeded);
    assert_eq!(root.find("b").unwrap().state(), StepState::RollbackSucceeded);
    assert_eq!(root.find("c").unwrap().state(), StepState::ExecutionFailed);
}

#[tokio::test]
async fn test_fork_member_failure_keeps_unrelated_slots() {
    let network = TestNetwork::new();
    network.seed_entry(slot("always-there"), b"x").await;
    let mut process = ProcessBuilder::new("fork")
        .fork(
            "parallel",
            vec![put("a"), put("b"), expect_empty("c", "always-there")],
        )
        .build(network.env());

    let report = process.run().await.unwrap();
    assert_eq!(report.status, ProcessStatus::Failed);
    for name in ["a", "b"] {
        assert_eq!(network.digest_len(Target::all(slot(name))).await, 0, "{} survived", name);
    }
    assert_eq!(network.digest_len(Target::all(slot("always-there"))).await, 1);
}

#[tokio::test]
async fn test_fork_success_keeps_every_member() {
    let network = TestNetwork::new();
    let mut process = ProcessBuilder::new("fork")
        .fork("parallel", vec![put("a"), put("b"), put("c")])
        .build(network.env());

    let report = process.run().await.unwrap();
    assert!(report.is_success());
    for name in ["a", "b", "c"] {
        assert_eq!(network.digest_len(Target::all(slot(name))).await, 1);
    }
}

#[tokio::test]
async fn test_rotating_put_rollback_restores_protector() {
    const FETCHED: Slot<StoredEntry> = Slot::new("fetched");
    const KEYS: Slot<ProtectionKeys> = Slot::new("keys");
    let network = TestNetwork::new();
    let old = test_key_pair(1);
    let new = test_key_pair(2);
    let address = slot("guarded");
    network.seed_protected(address, b"v1", &ProtectionKeys::fresh(old.clone())).await;

    let next = |stored: StoredEntry| -> Result<VersionedEntry, String> {
        Ok(stored.entry.successor(b"v2".to_vec()))
    };
    let mut process = ProcessBuilder::new("rotate")
        .seed(KEYS, ProtectionKeys::rotate(old.clone(), new.clone()))
        .step(ProcessStep::get_required("get", Target::all(address), FETCHED, "missing"))
        .step(ProcessStep::put("put", address, PutContent::derived(FETCHED, next), ProtectionSource::Slot(KEYS)))
        .step(expect_empty("fail", "guarded"))
        .build(network.env());

    let report = process.run().await.unwrap();
    assert_eq!(report.status, ProcessStatus::Failed);

    let head = network.data().get_latest(address).await.unwrap().unwrap();
    assert_eq!(head.entry.content, b"v1");
    assert_eq!(head.protector, Some(old.protector()));
    assert_eq!(network.digest_len(Target::all(address)).await, 1);
}

#[tokio::test]
async fn test_failed_compensation_is_dirty() {
    let (network, faulty) = faulty_network(DataConfig::default());
    faulty.fail_puts_to(slot("second"));
    faulty.fail_removes(true);

    let mut process = ProcessBuilder::new("dirty")
        .step(put("first"))
        .step(put("second"))
        .build(network.env());

    let report = process.run().await.unwrap();
    assert_eq!(report.status, ProcessStatus::FailedDirty);
    assert_eq!(report.rollback_failures.len(), 1);
    assert_eq!(report.rollback_failures[0].step, "first");
    assert_eq!(process.root().unwrap().find("first").unwrap().state(), StepState::RollbackFailed);
    assert_eq!(network.digest_len(Target::all(slot("first"))).await, 1);
}

#[tokio::test]
async fn test_sequence_rolls_back_in_reverse_order() {
    let (network, faulty) = faulty_network(DataConfig::default());
    let mut process = ProcessBuilder::new("order")
        .step(put("a"))
        .step(put("b"))
        .step(put("c"))
        .step(expect_empty("fail", "c"))
        .build(network.env());

    let report = process.run().await.unwrap();
    assert_eq!(report.status, ProcessStatus::Failed);
    assert_eq!(removed_slots(&faulty), vec![slot("c"), slot("b"), slot("a")]);
}

#[tokio::test]
async fn test_fork_rolls_back_in_reverse_completion_order() {
    let (network, faulty) = faulty_network(DataConfig::default());
    let mut process = ProcessBuilder::new("order")
        .fork("parallel", vec![put("a"), put("b"), put("c")])
        .step(expect_empty("fail", "a"))
        .build(network.env());

    let report = process.run().await.unwrap();
    assert_eq!(report.status, ProcessStatus::Failed);

    let completed = composite_order(&process, "parallel");
    assert_eq!(completed.len(), 3);
    let expected: Vec<ContentAddress> = completed.iter().rev().map(|name| slot(name)).collect();
    assert_eq!(removed_slots(&faulty), expected);
}

#[tokio::test]
async fn test_underacknowledged_rotation_fails_clean() {
    const FETCHED: Slot<StoredEntry> = Slot::new("fetched");
    const KEYS: Slot<ProtectionKeys> = Slot::new("keys");
    let network = TestNetwork::with_config(DhtConfig::default(), DataConfig::new().with_required_acks(3));
    let old = test_key_pair(1);
    let new = test_key_pair(2);
    let address = slot("guarded");
    network.seed_protected(address, b"v1", &ProtectionKeys::fresh(old.clone())).await;

    let offline = network.dht().responsible(&address.location)[0].id();
    network.dht().set_online(offline, false);

    let next = |stored: StoredEntry| -> Result<VersionedEntry, String> {
        Ok(stored.entry.successor(b"v2".to_vec()))
    };
    let mut process = ProcessBuilder::new("rotate")
        .seed(KEYS, ProtectionKeys::rotate(old.clone(), new))
        .step(ProcessStep::get_required("get", Target::all(address), FETCHED, "missing"))
        .step(ProcessStep::put("put", address, PutContent::derived(FETCHED, next), ProtectionSource::Slot(KEYS)))
        .build(network.env());

    let report = process.run().await.unwrap();
    assert_eq!(report.status, ProcessStatus::Failed);
    assert_eq!(report.reason.unwrap().step, "put");
    assert!(report.rollback_failures.is_empty());

    let head = network.data().get_latest(address).await.unwrap().unwrap();
    assert_eq!(head.entry.content, b"v1");
    assert_eq!(head.protector, Some(old.protector()));
    assert_eq!(network.digest_len(Target::all(address)).await, 1);
}

#[tokio::test]
async fn test_partial_put_left_behind_is_dirty() {
    let (network, faulty) = faulty_network(DataConfig::new().with_required_acks(3));
    let offline = network.dht().responsible(&slot("partial").location)[0].id();
    network.dht().set_online(offline, false);
    faulty.fail_removes(true);

    let mut process = ProcessBuilder::new("partial").step(put("partial")).build(network.env());

    let report = process.run().await.unwrap();
    assert_eq!(report.status, ProcessStatus::FailedDirty);
    assert!(!report.fatal);
    assert_eq!(report.reason.unwrap().step, "partial");
    assert_eq!(report.rollback_failures.len(), 1);
    assert_eq!(report.rollback_failures[0].step, "partial");
    assert_eq!(network.digest_len(Target::all(slot("partial"))).await, 1);
}

#[tokio::test]
async fn test_remove_reported_failed_puts_entries_back() {
    let (network, faulty) = faulty_network(DataConfig::default());
    let address = slot("files");
    network.seed_entry(address, b"v1").await;
    network.seed_entry(address, b"v2").await;
    let before = network.data().digest(Target::all(address)).await.unwrap();

    faulty.lose_remove_replies(true);
    let mut process = ProcessBuilder::new("remove")
        .step(ProcessStep::remove("remove", Target::all(address), ProtectionKeys::unprotected()))
        .build(network.env());

    let report = process.run().await.unwrap();
    assert_eq!(report.status, ProcessStatus::Failed);
    assert_eq!(report.reason.unwrap().step, "remove");
    assert!(report.rollback_failures.is_empty());
    assert_eq!(removed_slots(&faulty), vec![address]);

    assert_eq!(network.data().digest(Target::all(address)).await.unwrap(), before);
    let head = network.data().get_latest(address).await.unwrap().unwrap();
    assert_eq!(head.entry.content, b"v2");
}

#[tokio::test(start_paused = true)]
async fn test_abort_compensates_finished_steps() {
    let network = TestNetwork::with_config(
        DhtConfig::default().with_simulated_latency(Duration::from_secs(1)),
        DataConfig::default(),
    );
    let mut process = ProcessBuilder::new("abortable")
        .step(put("first"))
        .step(put("second"))
        .build(network.env());

    process.start().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    process.abort("user cancelled");
    let report = process.wait().await.unwrap();

    assert_eq!(report.status, ProcessStatus::Failed);
    assert_eq!(report.reason.unwrap().step, ABORT_ORIGIN);
    assert!(!report.fatal);
    assert_eq!(network.digest_len(Target::all(slot("first"))).await, 0);
    assert_eq!(network.digest_len(Target::all(slot("second"))).await, 0);
}
