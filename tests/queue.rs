// tests/queue.rs
// Queue semantics within a single process.

use serde::{Deserialize, Serialize};
use shmq::{MessageQueue, QueueBuilder, QueueError};

fn name(tag: &str) -> String {
    format!("shmq-queue-test-{}-{}", std::process::id(), tag)
}

fn allocated(tag: &str, size: usize) -> MessageQueue {
    let mut queue = MessageQueue::new();
    queue.allocate(name(tag).as_str(), size).unwrap();
    queue
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Job {
    id: u64,
    command: String,
    args: Vec<String>,
}

#[test]
fn test_jobs_scenario() {
    let queue = allocated("jobs-arena", 64 * 1024);
    let jobs = name("jobs");
    queue.register_channel(&jobs).unwrap();

    assert!(queue.write(&jobs, "a"));
    assert!(queue.write(&jobs, "b"));
    assert!(queue.write(&jobs, "c"));

    assert_eq!(queue.next::<String>(&jobs).as_deref(), Some("a"));
    assert_eq!(queue.next::<String>(&jobs).as_deref(), Some("b"));
    assert_eq!(queue.next::<String>(&jobs).as_deref(), Some("c"));
    assert_eq!(queue.next::<String>(&jobs), None);

    queue.close().unwrap();
}

#[test]
fn test_fifo_with_structured_messages() {
    let queue = allocated("fifo-arena", 256 * 1024);
    let channel = name("fifo");
    queue.register_channel(&channel).unwrap();

    let sent: Vec<Job> = (0..50)
        .map(|id| Job {
            id,
            command: format!("cmd-{}", fastrand::u32(..)),
            args: (0..fastrand::usize(0..4)).map(|i| i.to_string()).collect(),
        })
        .collect();

    for job in &sent {
        assert!(queue.write(&channel, job));
    }
    assert_eq!(queue.len(&channel), sent.len());

    let received: Vec<Job> = std::iter::from_fn(|| queue.next::<Job>(&channel)).collect();
    assert_eq!(received, sent);
    assert!(queue.is_empty(&channel));

    queue.close().unwrap();
}

#[test]
fn test_next_on_fresh_and_drained_channel() {
    let queue = allocated("empty-arena", 64 * 1024);
    let channel = name("empty");
    queue.register_channel(&channel).unwrap();

    assert_eq!(queue.next::<u32>(&channel), None);
    assert!(!queue.arena().unwrap().has_variable(&channel));

    assert!(queue.write(&channel, &1u32));
    assert_eq!(queue.next::<u32>(&channel), Some(1));
    assert_eq!(queue.next::<u32>(&channel), None);
    assert_eq!(queue.len(&channel), 0);

    queue.close().unwrap();
}

#[test]
fn test_register_is_idempotent() {
    let queue = allocated("idem-arena", 64 * 1024);
    let channel = name("idem");

    queue.register_channel(&channel).unwrap();
    assert!(queue.write(&channel, &"kept"));
    queue.register_channel(&channel).unwrap();

    assert_eq!(queue.channels(), vec![channel.clone()]);
    assert_eq!(queue.next::<String>(&channel).as_deref(), Some("kept"));

    queue.close().unwrap();
}

#[test]
fn test_unregistered_channel_is_a_no_op() {
    let queue = allocated("unreg-arena", 64 * 1024);
    let registered = name("known");
    let unknown = name("unknown");
    queue.register_channel(&registered).unwrap();
    assert!(queue.write(&registered, &"x"));

    let before = queue.arena().unwrap().variable_names();

    assert!(!queue.write(&unknown, &"y"));
    assert_eq!(queue.next::<String>(&unknown), None);
    assert_eq!(queue.len(&unknown), 0);
    assert!(!queue.is_registered(&unknown));

    assert_eq!(queue.arena().unwrap().variable_names(), before);
    assert!(!queue.arena().unwrap().has_variable(&unknown));
    assert_eq!(queue.len(&registered), 1);

    queue.close().unwrap();
}

#[test]
fn test_full_channel_rejects_write_and_keeps_contents() {
    // Two slots in 8KB leaves a few KB per channel
    let queue = QueueBuilder::new()
        .with_segment(name("full-arena"))
        .with_size(8 * 1024)
        .with_slots(2)
        .with_channel(name("full"))
        .build()
        .unwrap();
    let channel = name("full");

    let payload = "p".repeat(256);
    let mut accepted = 0;
    while queue.write(&channel, &payload) {
        accepted += 1;
        assert!(accepted < 1000, "slot never filled up");
    }
    assert!(accepted > 0);
    assert_eq!(queue.len(&channel), accepted);

    // Draining still works and frees room again
    assert_eq!(queue.next::<String>(&channel), Some(payload.clone()));
    assert!(queue.write(&channel, &payload));
    assert_eq!(queue.len(&channel), accepted);

    queue.close().unwrap();
}

#[test]
fn test_channels_get_separate_queues() {
    let queue = allocated("multi-arena", 64 * 1024);
    let left = name("left");
    let right = name("right");
    queue.register_channel(&left).unwrap();
    queue.register_channel(&right).unwrap();

    assert!(queue.write(&left, &1));
    assert!(queue.write(&right, &100));
    assert!(queue.write(&left, &2));

    assert_eq!(queue.next::<i32>(&right), Some(100));
    assert_eq!(queue.next::<i32>(&right), None);
    assert_eq!(queue.next::<i32>(&left), Some(1));
    assert_eq!(queue.next::<i32>(&left), Some(2));

    queue.close().unwrap();
}

#[test]
fn test_more_channels_than_slots() {
    let queue = QueueBuilder::new()
        .with_segment(name("crowded-arena"))
        .with_size(16 * 1024)
        .with_slots(1)
        .build()
        .unwrap();
    let first = name("crowded-1");
    let second = name("crowded-2");
    queue.register_channel(&first).unwrap();
    queue.register_channel(&second).unwrap();

    assert!(queue.write(&first, &"fits"));
    assert!(!queue.write(&second, &"no slot left"));
    assert_eq!(queue.next::<String>(&second), None);

    queue.close().unwrap();
}

#[test]
fn test_close_destroys_resources() {
    let segment = name("close-arena");
    let channel = name("close");
    let mut queue = MessageQueue::new();
    queue.register_channel(&channel).unwrap();
    queue.allocate(segment.as_str(), 64 * 1024).unwrap();
    assert!(queue.write(&channel, &"stale"));
    queue.close().unwrap();

    // A new owner starts from an empty segment
    let mut again = MessageQueue::new();
    again.register_channel(&channel).unwrap();
    again.allocate(segment.as_str(), 64 * 1024).unwrap();
    assert!(again.arena().unwrap().is_creator());
    assert_eq!(again.next::<String>(&channel), None);
    drop(again);
}

#[test]
fn test_builder_reports_setup_errors() {
    let res = QueueBuilder::new()
        .with_segment(name("tiny-arena"))
        .with_size(128)
        .build();
    assert!(matches!(res, Err(QueueError::SegmentTooSmall { .. })));

    let res = QueueBuilder::new().with_segment(0).build();
    assert!(matches!(res, Err(QueueError::InvalidKey(0))));
}

#[test]
fn test_oversized_segment_reports_os_error() {
    let segment = name("refused-arena");
    let mut queue = MessageQueue::new();

    // Above every SHMMAX the kernel accepts
    match queue.allocate(segment.as_str(), usize::MAX) {
        Err(QueueError::Resource { op, key, .. }) => {
            assert_eq!(op, "shmget");
            assert_eq!(key, shmq::derive_key(&segment).get());
        }
        other => panic!("expected a shmget Resource error, got {:?}", other),
    }
    assert!(!queue.is_allocated());

    // The failed attempt neither poisons the handle nor keeps the segment claimed
    queue.allocate(segment.as_str(), 64 * 1024).unwrap();
    queue.close().unwrap();
}

#[test]
fn test_uninitialized_semaphore_reports_os_error() {
    let queue = allocated("stale-sem-arena", 64 * 1024);
    let channel = name("stale-sem");

    // A semaphore set whose creator died before initializing it
    let key = shmq::derive_key(&channel);
    let semid = unsafe { libc::semget(key.get(), 1, libc::IPC_CREAT | libc::IPC_EXCL | 0o600) };
    assert!(semid >= 0, "semget: {}", std::io::Error::last_os_error());

    match queue.register_channel(&channel) {
        Err(QueueError::Resource { key: failed, .. }) => assert_eq!(failed, key.get()),
        other => panic!("expected a Resource error, got {:?}", other),
    }
    assert!(!queue.is_registered(&channel));
    assert!(!queue.write(&channel, &"dropped"));

    unsafe { libc::semctl(semid, 0, libc::IPC_RMID) };
    queue.close().unwrap();
}

#[test]
fn test_debug_output() {
    let queue = allocated("debug-arena", 64 * 1024);
    queue.register_channel(&name("debug")).unwrap();
    let rendered = format!("{:?}", queue);
    assert!(rendered.contains("MessageQueue"));
    assert!(rendered.contains("SharedArena"));
    assert!(rendered.contains(&name("debug")));
    queue.close().unwrap();
}
