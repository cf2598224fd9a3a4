// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{collections::HashSet, sync::Arc, thread, time::Duration};

use bigqueue::{FlushMode, Message, Queue, QueueBuilder, QueueError, QueueOptions};
use bigqueue_common_telemetry::init_default_ut_logging;
use crossbeam::channel::unbounded;
use tempfile::TempDir;
use test_case::test_case;

const SMALL: QueueOptions = QueueOptions {
    data_page_size:       256,
    index_items_per_page: 16,
};

fn open(temp_dir: &TempDir, options: QueueOptions) -> Queue {
    Queue::open(temp_dir.path(), "it", options).unwrap()
}

fn payload(i: usize) -> Vec<u8> { format!("message-{i:04}").into_bytes() }

#[test]
fn test_fifo_order_and_sequences() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();
    let queue = open(&temp_dir, SMALL);

    for i in 0..100 {
        assert_eq!(queue.enqueue(&payload(i)).unwrap(), i as u64);
    }

    for i in 0..100 {
        let message = queue.dequeue().unwrap();
        assert_eq!(message.sequence, i as u64);
        assert_eq!(message.payload.as_ref(), payload(i).as_slice());
    }

    assert!(matches!(queue.dequeue(), Err(QueueError::Empty)));
    queue.close().unwrap();
}

#[test]
fn test_empty_contract() {
    let temp_dir = TempDir::new().unwrap();
    let queue = open(&temp_dir, SMALL);

    assert!(queue.is_empty());
    assert!(matches!(queue.dequeue(), Err(QueueError::Empty)));
    assert!(matches!(queue.peek(0), Err(QueueError::Empty)));
    assert!(matches!(queue.peek_head(), Err(QueueError::Empty)));

    queue.enqueue(b"only").unwrap();
    queue.dequeue().unwrap();
    assert!(matches!(queue.dequeue(), Err(QueueError::Empty)));
    assert_eq!(queue.head(), queue.tail());
}

#[test]
fn test_durability_across_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let queue = open(&temp_dir, SMALL);
        for i in 0..50 {
            queue.enqueue(&payload(i)).unwrap();
        }
        for _ in 0..20 {
            queue.dequeue().unwrap();
        }
        queue.close().unwrap();
    }

    let queue = open(&temp_dir, SMALL);
    assert_eq!(queue.head(), 20);
    assert_eq!(queue.tail(), 50);

    for i in 20..50 {
        assert_eq!(queue.dequeue().unwrap().payload.as_ref(), payload(i).as_slice());
    }
    assert_eq!(queue.enqueue(b"next").unwrap(), 50);
}

#[test]
fn test_reopen_without_close() {
    let temp_dir = TempDir::new().unwrap();

    {
        let queue = open(&temp_dir, SMALL);
        for i in 0..10 {
            queue.enqueue(&payload(i)).unwrap();
        }
        queue.dequeue().unwrap();
    }

    let queue = open(&temp_dir, SMALL);
    assert_eq!(queue.head(), 1);
    assert_eq!(queue.len(), 9);
}

#[test]
fn test_page_rollover_never_spans_pages() {
    let temp_dir = TempDir::new().unwrap();
    let queue = open(&temp_dir, SMALL);

    // 4 + 100 bytes per record: two fit in a 256-byte page, the third rolls.
    for i in 0..5u8 {
        queue.enqueue(&[i; 100]).unwrap();
    }

    assert!(temp_dir.path().join("it_0.dat").exists());
    assert!(temp_dir.path().join("it_1.dat").exists());
    assert!(temp_dir.path().join("it_2.dat").exists());
    assert_eq!(
        std::fs::metadata(temp_dir.path().join("it_1.dat"))
            .unwrap()
            .len(),
        256
    );

    let status = queue.status();
    assert_eq!(status.active_data_page, 2);
    assert_eq!(status.write_offset, 104);

    for i in 0..5u8 {
        assert_eq!(queue.dequeue().unwrap().payload.as_ref(), &[i; 100]);
    }
}

#[test]
fn test_oversized_record_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let queue = open(&temp_dir, SMALL);
    queue.enqueue(b"before").unwrap();

    let err = queue.enqueue(&[0u8; 253]).unwrap_err();
    assert!(matches!(
        err,
        QueueError::RecordTooLarge {
            size: 253,
            max: 252,
            ..
        }
    ));

    assert_eq!(queue.tail(), 1);
    assert_eq!(queue.enqueue(&[1u8; 252]).unwrap(), 1);
    assert_eq!(queue.peek(1).unwrap().len(), 252);
}

#[test]
fn test_subscription_delivers_in_order() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();
    let queue = QueueBuilder::new(temp_dir.path())
        .name("it")
        .options(SMALL)
        .poll_interval(Duration::from_millis(20))
        .build()
        .unwrap();

    queue.enqueue_batch([b"A", b"B", b"C"]).unwrap();

    let (tx, rx) = unbounded();
    let subscription = queue
        .subscribe(move |result: bigqueue::Result<Message>| {
            let _ = tx.send(result.map(|message| (message.sequence, message.payload)));
        })
        .unwrap();

    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap());
    }
    queue.enqueue(b"D").unwrap();
    received.push(rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap());

    let payloads: Vec<&[u8]> = received.iter().map(|(_, p)| p.as_ref()).collect();
    assert_eq!(payloads, vec![&b"A"[..], b"B", b"C", b"D"]);
    let sequences: Vec<u64> = received.iter().map(|(s, _)| *s).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);

    subscription.cancel().unwrap();
    assert_eq!(queue.head(), 0);
}

#[test]
fn test_subscription_resumes_at_head_when_behind() {
    let temp_dir = TempDir::new().unwrap();
    let queue = QueueBuilder::new(temp_dir.path())
        .name("it")
        .options(SMALL)
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();

    let (tx, rx) = unbounded();
    let gate = Arc::new(std::sync::Barrier::new(2));
    let callback_gate = Arc::clone(&gate);
    let subscription = queue
        .subscribe(move |result: bigqueue::Result<Message>| {
            let first = matches!(&result, Ok(message) if message.sequence == 0);
            let _ = tx.send(result.map(|message| message.sequence));
            if first {
                callback_gate.wait();
                callback_gate.wait();
            }
        })
        .unwrap();

    queue.enqueue_batch([b"a", b"b", b"c", b"d"]).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap(), 0);

    // While the callback holds record 0, consume past record 1.
    gate.wait();
    queue.skip(3).unwrap();
    gate.wait();

    assert!(matches!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        Err(QueueError::NotFound { sequence: 1, .. })
    ));
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap(), 3);

    subscription.cancel().unwrap();
}

#[test]
fn test_reclaim_on_close() {
    let temp_dir = TempDir::new().unwrap();

    {
        let queue = QueueBuilder::new(temp_dir.path())
            .name("it")
            .options(SMALL)
            .reclaim_on_close(true)
            .build()
            .unwrap();
        for i in 0..5u8 {
            queue.enqueue(&[i; 100]).unwrap();
        }
        for _ in 0..4 {
            queue.dequeue().unwrap();
        }
        queue.close().unwrap();
    }

    assert!(!temp_dir.path().join("it_0.dat").exists());
    assert!(!temp_dir.path().join("it_1.dat").exists());
    assert!(temp_dir.path().join("it_2.dat").exists());

    let queue = open(&temp_dir, SMALL);
    assert_eq!(queue.dequeue().unwrap().payload.as_ref(), &[4u8; 100]);
}

#[test_case(512, 16 ; "different page size")]
#[test_case(256, 32 ; "different items per page")]
fn test_options_mismatch(data_page_size: u32, index_items_per_page: u32) {
    let temp_dir = TempDir::new().unwrap();
    open(&temp_dir, SMALL).close().unwrap();

    let result = Queue::open(
        temp_dir.path(),
        "it",
        QueueOptions {
            data_page_size,
            index_items_per_page,
        },
    );
    assert!(matches!(
        result,
        Err(QueueError::OptionsMismatch {
            stored_page_size: 256,
            stored_items_per_page: 16,
            ..
        })
    ));
}

#[test]
fn test_recovery_without_control_file() {
    let temp_dir = TempDir::new().unwrap();

    {
        let queue = open(&temp_dir, SMALL);
        for i in 0..40 {
            queue.enqueue(&payload(i)).unwrap();
        }
        queue.close().unwrap();
    }
    std::fs::remove_file(temp_dir.path().join("it.meta")).unwrap();

    let queue = open(&temp_dir, SMALL);
    assert_eq!(queue.head(), 0);
    assert_eq!(queue.tail(), 40);
    for i in 0..40 {
        assert_eq!(queue.dequeue().unwrap().payload.as_ref(), payload(i).as_slice());
    }
    assert_eq!(queue.enqueue(b"after").unwrap(), 40);
}

#[test]
fn test_recovery_without_control_file_after_reclaim() {
    let temp_dir = TempDir::new().unwrap();
    let options = QueueOptions {
        data_page_size:       64,
        index_items_per_page: 4,
    };

    {
        let queue = open(&temp_dir, options);
        // 20-byte records: three per data page, pages 0 to 3.
        for i in 0..12u8 {
            queue.enqueue(&[i; 16]).unwrap();
        }
        for _ in 0..10 {
            queue.dequeue().unwrap();
        }
        let stats = queue.reclaim().unwrap();
        assert_eq!(stats.data_pages, 3);
        assert_eq!(stats.index_pages, 2);
        queue.close().unwrap();
    }
    std::fs::remove_file(temp_dir.path().join("it.meta")).unwrap();

    let queue = open(&temp_dir, options);
    // Record 9 shares a data page with live records and is delivered again.
    assert_eq!(queue.head(), 9);
    assert_eq!(queue.tail(), 12);
    for i in 9..12u8 {
        let message = queue.dequeue().unwrap();
        assert_eq!(message.sequence, u64::from(i));
        assert_eq!(message.payload.as_ref(), &[i; 16]);
    }
    assert_eq!(queue.enqueue(b"after").unwrap(), 12);
}

#[test]
fn test_uncommitted_index_tail_is_ignored() {
    let temp_dir = TempDir::new().unwrap();

    {
        let queue = open(&temp_dir, SMALL);
        for i in 0..3 {
            queue.enqueue(&payload(i)).unwrap();
        }
        queue.close().unwrap();
    }

    // A torn entry at the end of the index page.
    let index_path = temp_dir.path().join("it_0.idx");
    let mut index = std::fs::read(&index_path).unwrap();
    index.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 3, 0, 0]);
    std::fs::write(&index_path, index).unwrap();

    let queue = open(&temp_dir, SMALL);
    assert_eq!(queue.tail(), 3);
    assert_eq!(queue.enqueue(b"fresh").unwrap(), 3);
    assert_eq!(queue.peek(3).unwrap().as_ref(), b"fresh");
}

#[test]
fn test_concurrent_producers_and_consumer() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();
    let queue = QueueBuilder::new(temp_dir.path())
        .name("it")
        .options(QueueOptions {
            data_page_size:       4096,
            index_items_per_page: 64,
        })
        .flush_mode(FlushMode::Async)
        .build()
        .unwrap();

    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 250;

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                (0..PER_PRODUCER)
                    .map(|i| queue.enqueue(format!("{p}-{i}").as_bytes()).unwrap())
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let consumer = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut seen = Vec::with_capacity(PRODUCERS * PER_PRODUCER);
            while seen.len() < PRODUCERS * PER_PRODUCER {
                match queue.dequeue() {
                    Ok(message) => seen.push(message),
                    Err(QueueError::Empty) => thread::yield_now(),
                    Err(e) => panic!("dequeue failed: {e}"),
                }
            }
            seen
        })
    };

    let mut assigned = HashSet::new();
    for producer in producers {
        for sequence in producer.join().unwrap() {
            assert!(assigned.insert(sequence));
        }
    }
    assert_eq!(assigned.len(), PRODUCERS * PER_PRODUCER);

    let seen = consumer.join().unwrap();
    for (expected, message) in seen.iter().enumerate() {
        assert_eq!(message.sequence, expected as u64);
    }

    // Each producer's records come out in the order it enqueued them.
    for p in 0..PRODUCERS {
        let prefix = format!("{p}-");
        let order: Vec<usize> = seen
            .iter()
            .filter_map(|m| std::str::from_utf8(&m.payload).ok())
            .filter_map(|s| s.strip_prefix(&prefix))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(order, (0..PER_PRODUCER).collect::<Vec<_>>());
    }

    queue.close().unwrap();
}

#[test]
fn test_destroy_removes_only_named_queue() {
    let temp_dir = TempDir::new().unwrap();

    let first = open(&temp_dir, SMALL);
    first.enqueue(b"x").unwrap();
    first.close().unwrap();

    let other = Queue::open(temp_dir.path(), "other", SMALL).unwrap();
    other.enqueue(b"y").unwrap();
    other.close().unwrap();

    assert_eq!(Queue::destroy(temp_dir.path(), "it").unwrap(), 3);
    assert!(!temp_dir.path().join("it.meta").exists());
    assert!(temp_dir.path().join("other.meta").exists());
}
