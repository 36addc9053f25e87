#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use rivulet_core::codec::Codec;
use rivulet_core::log::{LogLag, LogPartition};
use rivulet_core::name::Name;
use rivulet_core::record::Record;
use rivulet_core::watermark::Watermark;
use rivulet_log::LogManager;

pub const DEF_TIMEOUT: Duration = Duration::from_secs(1);
pub const SMALL_TIMEOUT: Duration = Duration::from_millis(10);

pub const GROUP: &str = "test/defaultTest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueMessage {
    pub key: String,
    pub value: Vec<u8>,
}

impl KeyValueMessage {
    pub fn of(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: Vec::new(),
        }
    }

    pub fn with_value(key: &str, value: &[u8]) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_vec(),
        }
    }
}

pub fn group() -> Name {
    Name::of_urn(GROUP)
}

/// Append on one partition, tail it, check isolation between partitions and
/// that uncommitted positions are not remembered across tailers.
pub async fn check_basic_append_and_tail(manager: &LogManager, name: &Name) {
    manager.create_if_not_exists(name, 5).await.expect("create");
    let appender = manager
        .get_appender::<KeyValueMessage>(name)
        .await
        .expect("appender");

    let msg1 = KeyValueMessage::of("id1");
    let msg2 = KeyValueMessage::of("id2");
    appender.append(1, &msg1).await.expect("append");

    {
        let mut tailer1 = manager
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 1))
            .await
            .expect("tailer");
        assert_eq!(
            msg1,
            tailer1
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
        );
        assert!(tailer1.read(SMALL_TIMEOUT).await.expect("read").is_none());

        // a message on another partition is invisible to this tailer
        appender.append(2, &msg2).await.expect("append");
        assert!(tailer1.read(SMALL_TIMEOUT).await.expect("read").is_none());

        appender.append(1, &msg2).await.expect("append");
        assert_eq!(
            msg2,
            tailer1
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
        );
    }

    {
        let mut tailer2 = manager
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 2))
            .await
            .expect("tailer");
        assert_eq!(
            msg2,
            tailer2
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
        );
    }

    // nothing was committed, fresh tailers restart from the beginning
    let mut tailer1 = manager
        .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 1))
        .await
        .expect("tailer");
    let mut tailer2 = manager
        .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 2))
        .await
        .expect("tailer");
    assert_eq!(
        msg1,
        tailer1
            .read(DEF_TIMEOUT)
            .await
            .expect("read")
            .expect("record")
            .message
    );
    assert_eq!(
        msg2,
        tailer1
            .read(DEF_TIMEOUT)
            .await
            .expect("read")
            .expect("record")
            .message
    );
    assert!(tailer1.read(SMALL_TIMEOUT).await.expect("read").is_none());
    assert_eq!(
        msg2,
        tailer2
            .read(DEF_TIMEOUT)
            .await
            .expect("read")
            .expect("record")
            .message
    );
    assert!(tailer2.read(SMALL_TIMEOUT).await.expect("read").is_none());

    assert_eq!(
        LogLag::of(3),
        manager.get_lag(name, &group()).await.expect("lag")
    );
}

/// Commit, reposition (start/end/last-committed/seek) and verify positions,
/// using `reopened` for the second phase so file backends can prove
/// persistence.
pub async fn check_commit_and_seek(manager: &LogManager, reopened: &LogManager, name: &Name) {
    manager.create_if_not_exists(name, 5).await.expect("create");
    let appender = manager
        .get_appender::<KeyValueMessage>(name)
        .await
        .expect("appender");

    appender
        .append(1, &KeyValueMessage::of("id1"))
        .await
        .expect("append");
    let offset2 = appender
        .append(1, &KeyValueMessage::of("id2"))
        .await
        .expect("append");
    appender
        .append(1, &KeyValueMessage::of("id3"))
        .await
        .expect("append");
    let offset4 = appender
        .append(2, &KeyValueMessage::of("id4"))
        .await
        .expect("append");
    appender
        .append(2, &KeyValueMessage::of("id5"))
        .await
        .expect("append");

    // process two messages of partition 1 and commit each
    {
        let mut tailer = manager
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 1))
            .await
            .expect("tailer");
        assert_eq!(
            "id1",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
        tailer.commit().await.expect("commit");
        assert_eq!(
            "id2",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
        tailer.commit().await.expect("commit");
    }
    {
        let mut tailer = manager
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 2))
            .await
            .expect("tailer");
        assert_eq!(
            "id4",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
        tailer.commit().await.expect("commit");
        // committing twice is idempotent
        tailer.commit().await.expect("commit");
    }

    {
        let mut tailer = reopened
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 1))
            .await
            .expect("tailer");
        tailer.to_start();
        assert_eq!(
            "id1",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
        tailer.to_end().await.expect("to_end");
        assert!(tailer.read(SMALL_TIMEOUT).await.expect("read").is_none());
        tailer.to_last_committed().await.expect("to_last_committed");
        assert_eq!(
            "id3",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
        tailer.seek(&offset2).expect("seek");
        assert_eq!(
            "id2",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
        // seeking an unassigned partition is refused
        assert!(tailer.seek(&offset4).is_err());
    }
    // a fresh tailer starts on the last committed message
    {
        let mut tailer = reopened
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 2))
            .await
            .expect("tailer");
        assert_eq!(
            "id5",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
        tailer.to_start();
        assert_eq!(
            "id4",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
    }

    assert_eq!(
        LogLag::new(3, 5),
        reopened.get_lag(name, &group()).await.expect("lag")
    );
}

/// Re-committing after a rewind moves the position backwards, and reset
/// clears it entirely.
pub async fn check_more_commit(manager: &LogManager, reopened: &LogManager, name: &Name) {
    manager.create_if_not_exists(name, 5).await.expect("create");
    let appender = manager
        .get_appender::<KeyValueMessage>(name)
        .await
        .expect("appender");
    for key in ["id1", "id2", "id3", "id4"] {
        appender
            .append(1, &KeyValueMessage::of(key))
            .await
            .expect("append");
    }

    assert_eq!(
        LogLag::new(0, 4),
        manager.get_lag(name, &group()).await.expect("lag")
    );
    {
        let mut tailer = manager
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 1))
            .await
            .expect("tailer");
        assert_eq!(
            "id1",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
        tailer.commit().await.expect("commit");
        assert_eq!(
            "id2",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
        tailer.commit().await.expect("commit");

        // rewind and commit right after the first message
        tailer.to_start();
        assert_eq!(
            "id1",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
        tailer.commit().await.expect("commit");
    }

    {
        let mut tailer = reopened
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 1))
            .await
            .expect("tailer");
        tailer.to_last_committed().await.expect("to_last_committed");
        assert_eq!(
            "id2",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
    }
    assert_eq!(
        LogLag::new(1, 4),
        reopened.get_lag(name, &group()).await.expect("lag")
    );

    {
        let mut tailer = reopened
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 1))
            .await
            .expect("tailer");
        tailer.reset().await.expect("reset");
        assert_eq!(
            "id1",
            tailer
                .read(DEF_TIMEOUT)
                .await
                .expect("read")
                .expect("record")
                .message
                .key
        );
    }
    assert_eq!(
        LogLag::new(0, 4),
        reopened.get_lag(name, &group()).await.expect("lag")
    );
}

/// Each consumer group keeps its own committed position.
pub async fn check_commit_with_group(manager: &LogManager, reopened: &LogManager, name: &Name) {
    manager.create_if_not_exists(name, 1).await.expect("create");
    let appender = manager
        .get_appender::<KeyValueMessage>(name)
        .await
        .expect("appender");
    for i in 0..10 {
        appender
            .append(0, &KeyValueMessage::of(&format!("id{}", i)))
            .await
            .expect("append");
    }
    let group_a = Name::of_urn("test/group-a");
    let group_b = Name::of_urn("test/group-b");
    {
        let mut tailer_a = manager
            .create_tailer::<KeyValueMessage>(&group_a, LogPartition::of(name.clone(), 0))
            .await
            .expect("tailer");
        let mut tailer_b = manager
            .create_tailer::<KeyValueMessage>(&group_b, LogPartition::of(name.clone(), 0))
            .await
            .expect("tailer");

        assert_eq!("id0", read_key(&mut tailer_a).await);
        assert_eq!("id1", read_key(&mut tailer_a).await);
        tailer_a.commit().await.expect("commit");
        assert_eq!("id2", read_key(&mut tailer_a).await);
        assert_eq!("id3", read_key(&mut tailer_a).await);
        tailer_a.to_last_committed().await.expect("reposition");
        assert_eq!("id2", read_key(&mut tailer_a).await);
        assert_eq!("id3", read_key(&mut tailer_a).await);

        assert_eq!("id0", read_key(&mut tailer_b).await);
        tailer_b.commit().await.expect("commit");
        assert_eq!("id1", read_key(&mut tailer_b).await);
        assert_eq!("id2", read_key(&mut tailer_b).await);
        tailer_b.to_last_committed().await.expect("reposition");
        assert_eq!("id1", read_key(&mut tailer_b).await);

        tailer_a.to_last_committed().await.expect("reposition");
        assert_eq!("id2", read_key(&mut tailer_a).await);
    }

    {
        let mut tailer = reopened
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 0))
            .await
            .expect("tailer");
        let mut tailer_a = reopened
            .create_tailer::<KeyValueMessage>(&group_a, LogPartition::of(name.clone(), 0))
            .await
            .expect("tailer");
        let mut tailer_b = reopened
            .create_tailer::<KeyValueMessage>(&group_b, LogPartition::of(name.clone(), 0))
            .await
            .expect("tailer");
        assert_eq!("id0", read_key(&mut tailer).await);
        assert_eq!("id2", read_key(&mut tailer_a).await);
        assert_eq!("id1", read_key(&mut tailer_b).await);
    }
    assert_eq!(
        LogLag::new(2, 10),
        reopened.get_lag(name, &group_a).await.expect("lag")
    );
    assert_eq!(
        LogLag::new(1, 10),
        reopened.get_lag(name, &group_b).await.expect("lag")
    );
}

/// Lag against a group that never committed stays at the appended count.
pub async fn check_lag(manager: &LogManager, name: &Name) {
    manager.create_if_not_exists(name, 5).await.expect("create");
    let appender = manager
        .get_appender::<KeyValueMessage>(name)
        .await
        .expect("appender");
    let unknown = Name::of_urn("test/unknownGroup");

    assert_eq!(
        LogLag::of(0),
        manager.get_lag(name, &unknown).await.expect("lag")
    );
    appender
        .append(1, &KeyValueMessage::of("id1"))
        .await
        .expect("append");
    assert_eq!(
        LogLag::of(1),
        manager.get_lag(name, &unknown).await.expect("lag")
    );

    {
        let mut tailer = manager
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 1))
            .await
            .expect("tailer");
        assert_eq!("id1", read_key(&mut tailer).await);
        // reading without committing leaves the lag untouched
        assert_eq!(
            LogLag::of(1),
            manager.get_lag(name, &group()).await.expect("lag")
        );
        tailer.commit().await.expect("commit");
    }
    assert_eq!(
        LogLag::of(1),
        manager.get_lag(name, &unknown).await.expect("lag")
    );
    assert_eq!(
        LogLag::new(1, 1),
        manager.get_lag(name, &group()).await.expect("lag")
    );
    assert_eq!(0, manager.get_lag(name, &group()).await.expect("lag").lag());
}

/// One tailer over partitions of two logs, with commits and replays.
pub async fn check_multi_log_tailer(manager: &LogManager, name1: &Name, name2: &Name) {
    manager.create_if_not_exists(name1, 2).await.expect("create");
    manager.create_if_not_exists(name2, 2).await.expect("create");
    let msg1 = KeyValueMessage::of("id1");
    let msg2 = KeyValueMessage::of("id2");

    let partitions1 = vec![
        LogPartition::of(name1.clone(), 0),
        LogPartition::of(name2.clone(), 0),
    ];
    let partitions2 = vec![
        LogPartition::of(name1.clone(), 1),
        LogPartition::of(name2.clone(), 1),
    ];
    let codec: Arc<dyn Codec<KeyValueMessage>> = Arc::new(rivulet_core::codec::NoCodec);
    let mut tailer1 = manager
        .create_partitions_tailer(&group(), partitions1.clone(), codec.clone())
        .await
        .expect("tailer");
    let mut tailer2 = manager
        .create_partitions_tailer(&group(), partitions2.clone(), codec.clone())
        .await
        .expect("tailer");
    assert_eq!(partitions1, tailer1.assignments());
    assert_eq!(partitions2, tailer2.assignments());

    let appender1 = manager
        .get_appender::<KeyValueMessage>(name1)
        .await
        .expect("appender");
    let appender2 = manager
        .get_appender::<KeyValueMessage>(name2)
        .await
        .expect("appender");

    appender1.append(0, &msg1).await.expect("append");
    appender1.append(0, &msg1).await.expect("append");
    appender2.append(0, &msg1).await.expect("append");

    appender1.append(1, &msg2).await.expect("append");
    appender2.append(1, &msg2).await.expect("append");
    appender2.append(1, &msg2).await.expect("append");

    assert_eq!(msg1, read_message(&mut tailer1).await);
    tailer1.commit().await.expect("commit");

    assert_eq!(msg1, read_message(&mut tailer1).await);
    assert_eq!(msg1, read_message(&mut tailer1).await);
    assert!(tailer1.read(SMALL_TIMEOUT).await.expect("read").is_none());

    // replay from the last commit
    tailer1.to_last_committed().await.expect("reposition");
    assert_eq!(msg1, read_message(&mut tailer1).await);
    assert_eq!(msg1, read_message(&mut tailer1).await);
    assert!(tailer1.read(SMALL_TIMEOUT).await.expect("read").is_none());
    tailer1.commit().await.expect("commit");

    assert_eq!(msg2, read_message(&mut tailer2).await);
    assert_eq!(msg2, read_message(&mut tailer2).await);
    assert_eq!(msg2, read_message(&mut tailer2).await);
    assert!(tailer2.read(SMALL_TIMEOUT).await.expect("read").is_none());
    tailer2.to_start();
    assert_eq!(msg2, read_message(&mut tailer2).await);
    assert_eq!(msg2, read_message(&mut tailer2).await);
    assert_eq!(msg2, read_message(&mut tailer2).await);
    assert!(tailer2.read(SMALL_TIMEOUT).await.expect("read").is_none());
}

/// All messages land in one partition, a tailer over every partition still
/// drains them all.
pub async fn check_unbalanced_partitions(manager: &LogManager, name: &Name) {
    const NB_MSG: usize = 50;
    manager.create_if_not_exists(name, 5).await.expect("create");
    let msg = KeyValueMessage::of("id1");
    let appender = manager
        .get_appender::<KeyValueMessage>(name)
        .await
        .expect("appender");
    for _ in 0..NB_MSG {
        appender.append(1, &msg).await.expect("append");
    }
    let mut tailer = manager
        .create_stream_tailer::<KeyValueMessage>(&group(), name)
        .await
        .expect("tailer");
    assert_eq!(5, tailer.assignments().len());
    let mut count = 0;
    while let Some(record) = tailer.read(DEF_TIMEOUT).await.expect("read") {
        assert_eq!(msg, record.message);
        count += 1;
    }
    assert_eq!(NB_MSG, count);
}

/// Opening a second tailer on the same (group, partition) is refused until
/// the first one is closed; another group is fine.
pub async fn check_tailer_conflict(manager: &LogManager, name: &Name) {
    manager.create_if_not_exists(name, 1).await.expect("create");
    let partition = LogPartition::of(name.clone(), 0);
    let tailer = manager
        .create_tailer::<KeyValueMessage>(&group(), partition.clone())
        .await
        .expect("tailer");
    assert_eq!(&group(), tailer.group());

    assert!(manager
        .create_tailer::<KeyValueMessage>(&group(), partition.clone())
        .await
        .is_err());
    let other = manager
        .create_tailer::<KeyValueMessage>(&Name::of_urn("test/anotherGroup"), partition.clone())
        .await
        .expect("tailer");
    assert_eq!("test/anotherGroup", other.group().urn());

    drop(tailer);
    // released on drop, the group can open it again
    manager
        .create_tailer::<KeyValueMessage>(&group(), partition)
        .await
        .expect("tailer after drop");
}

/// An appender can wait until a group commits past an offset.
pub async fn check_wait_for(manager: &LogManager, name: &Name) {
    manager.create_if_not_exists(name, 1).await.expect("create");
    let appender = manager
        .get_appender::<KeyValueMessage>(name)
        .await
        .expect("appender");
    let mut offset0 = None;
    let mut offset5 = None;
    let mut last = None;
    for i in 0..10 {
        let offset = appender
            .append(0, &KeyValueMessage::of(&format!("id{}", i)))
            .await
            .expect("append");
        if i == 0 {
            offset0 = Some(offset.clone());
        } else if i == 5 {
            offset5 = Some(offset.clone());
        }
        last = Some(offset);
    }
    let offset0 = offset0.expect("offset0");
    let offset5 = offset5.expect("offset5");
    let last = last.expect("last");

    let foo = Name::of_urn("test/foo");
    assert!(!appender
        .wait_for(&last, &foo, SMALL_TIMEOUT)
        .await
        .expect("wait"));
    assert!(!appender
        .wait_for(&offset0, &foo, SMALL_TIMEOUT)
        .await
        .expect("wait"));

    {
        let mut tailer = manager
            .create_tailer::<KeyValueMessage>(&group(), LogPartition::of(name.clone(), 0))
            .await
            .expect("tailer");
        tailer.read(DEF_TIMEOUT).await.expect("read");
        tailer.commit().await.expect("commit");

        assert!(appender
            .wait_for(&offset0, &group(), DEF_TIMEOUT)
            .await
            .expect("wait"));
        assert!(!appender
            .wait_for(&offset5, &group(), SMALL_TIMEOUT)
            .await
            .expect("wait"));
        assert!(!appender
            .wait_for(&last, &group(), SMALL_TIMEOUT)
            .await
            .expect("wait"));

        while tailer.read(DEF_TIMEOUT).await.expect("read").is_some() {
            // drain
        }
        // read but not committed yet
        assert!(!appender
            .wait_for(&last, &group(), SMALL_TIMEOUT)
            .await
            .expect("wait"));
        tailer.commit().await.expect("commit");
    }

    assert!(appender
        .wait_for(&offset0, &group(), DEF_TIMEOUT)
        .await
        .expect("wait"));
    assert!(appender
        .wait_for(&offset5, &group(), DEF_TIMEOUT)
        .await
        .expect("wait"));
    assert!(appender
        .wait_for(&last, &group(), DEF_TIMEOUT)
        .await
        .expect("wait"));
}

/// Round trip through an explicit codec.
pub async fn check_codec(
    manager: &LogManager,
    name: &Name,
    codec: Arc<dyn Codec<KeyValueMessage>>,
) {
    manager.create_if_not_exists(name, 1).await.expect("create");
    let appender = manager
        .get_appender_with_codec(name, codec.clone())
        .await
        .expect("appender");
    let msg1 = KeyValueMessage::with_value("key", b"value");
    let msg2 = KeyValueMessage::with_value("id2", b"foo");
    let msg3 = KeyValueMessage::with_value("1234567890", b"0987654321");
    appender.append(0, &msg1).await.expect("append");
    appender.append(0, &msg2).await.expect("append");
    appender.append(0, &msg3).await.expect("append");
    appender.append(0, &msg1).await.expect("append");

    let mut tailer = manager
        .create_tailer_with_codec(&group(), LogPartition::of(name.clone(), 0), codec)
        .await
        .expect("tailer");
    assert_eq!(msg1, read_message(&mut tailer).await);
    assert_eq!(msg2, read_message(&mut tailer).await);
    assert_eq!(msg3, read_message(&mut tailer).await);
    assert_eq!(msg1, read_message(&mut tailer).await);
    assert!(tailer.read(SMALL_TIMEOUT).await.expect("read").is_none());
}

/// The record watermark and key of the last committed position drive the
/// per-partition latency.
pub async fn check_latencies(manager: &LogManager, name: &Name) {
    manager.create_if_not_exists(name, 5).await.expect("create");
    let group1 = Name::of_urn("test/latGroup");
    let appender = manager
        .get_appender::<Record>(name)
        .await
        .expect("appender");

    appender.append(0, &record("first")).await.expect("append");
    appender.append(0, &record("here")).await.expect("append");
    appender.append(0, &record("end")).await.expect("append");

    appender.append(1, &record("first")).await.expect("append");
    appender.append(1, &record("here")).await.expect("append");

    appender.append(2, &record("here")).await.expect("append");
    appender.append(2, &record("end")).await.expect("append");

    appender.append(3, &record("first")).await.expect("append");
    // partition 4 stays empty

    {
        let mut tailer0 = manager
            .create_tailer::<Record>(&group1, LogPartition::of(name.clone(), 0))
            .await
            .expect("tailer");
        let mut tailer1 = manager
            .create_tailer::<Record>(&group1, LogPartition::of(name.clone(), 1))
            .await
            .expect("tailer");
        let mut tailer2 = manager
            .create_tailer::<Record>(&group1, LogPartition::of(name.clone(), 2))
            .await
            .expect("tailer");
        // partition 0 committed in the middle
        assert_eq!("first", read_record_key(&mut tailer0).await);
        assert_eq!("here", read_record_key(&mut tailer0).await);
        // partition 1 committed on its last record
        assert_eq!("first", read_record_key(&mut tailer1).await);
        assert_eq!("here", read_record_key(&mut tailer1).await);
        // partition 2 committed on its first record
        assert_eq!("here", read_record_key(&mut tailer2).await);
        tailer0.commit().await.expect("commit");
        tailer1.commit().await.expect("commit");
        tailer2.commit().await.expect("commit");
    }

    let latencies = manager
        .get_latency_per_partition(
            name,
            &group1,
            Arc::new(rivulet_core::codec::NoCodec),
            |record: &Record| Watermark::of_value(record.watermark).timestamp(),
            |record: &Record| record.key.clone(),
        )
        .await
        .expect("latencies");
    assert_eq!(5, latencies.len());
    // the latency keys point at the last committed record of each partition
    assert_eq!(Some("here"), latencies[0].key());
    assert_eq!(Some("here"), latencies[1].key());
    assert_eq!(Some("here"), latencies[2].key());
    assert_eq!(None, latencies[3].key());
    assert_eq!(None, latencies[4].key());

    let latency = rivulet_core::log::Latency::of(&latencies);
    // three records remain unread
    assert_eq!(3, latency.lag().lag());
}

fn record(key: &str) -> Record {
    Record::of(key, format!("value{}", key).into_bytes())
}

pub async fn read_key(tailer: &mut rivulet_log::LogTailer<KeyValueMessage>) -> String {
    tailer
        .read(DEF_TIMEOUT)
        .await
        .expect("read")
        .expect("record")
        .message
        .key
}

pub async fn read_message(
    tailer: &mut rivulet_log::LogTailer<KeyValueMessage>,
) -> KeyValueMessage {
    tailer
        .read(DEF_TIMEOUT)
        .await
        .expect("read")
        .expect("record")
        .message
}

pub async fn read_record_key(tailer: &mut rivulet_log::LogTailer<Record>) -> String {
    tailer
        .read(DEF_TIMEOUT)
        .await
        .expect("read")
        .expect("record")
        .message
        .key
        .clone()
}
