// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use offline_recorder::codec;
use offline_recorder::{RecordStore, RecorderError};
use std::collections::HashMap;
use tempfile::TempDir;

const FILE_NAME: &str = "records.log";

fn open_store(dir: &TempDir, max_size: u64) -> RecordStore {
    RecordStore::open(dir.path(), FILE_NAME, max_size).unwrap()
}

fn read_all(store: &RecordStore) -> Vec<(String, Vec<u8>)> {
    let mut cursor = store.iterator().unwrap();
    let mut records = Vec::new();
    while let Some(record) = cursor.next().unwrap() {
        records.push((record.stream_name, record.payload.to_vec()));
    }
    records
}

#[test]
fn test_open_creates_directory_and_empty_file() {
    let temp_dir = TempDir::new().unwrap();
    let nested = temp_dir.path().join("a").join("b");

    let store = RecordStore::open(&nested, FILE_NAME, 1024).unwrap();
    assert!(store.path().exists());
    assert_eq!(store.size_bytes(), 0);
    assert_eq!(store.max_storage_size(), 1024);
}

#[test]
fn test_size_tracks_encoded_lines_and_order_is_preserved() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 1024 * 1024);

    let inputs = vec![
        ("clicks", b"first".to_vec()),
        ("views", b"second".to_vec()),
        ("clicks", vec![0u8, 1, 2, 255]),
        ("views", Vec::new()),
    ];

    let mut expected_size = 0u64;
    for (stream, payload) in &inputs {
        assert!(store.put(payload, stream).unwrap());
        expected_size += codec::encoded_len(stream, payload.len()) as u64;
        assert_eq!(store.size_bytes(), expected_size);
    }

    let file_len = std::fs::metadata(store.path()).unwrap().len();
    assert_eq!(file_len, expected_size);

    let records = read_all(&store);
    let expected: Vec<(String, Vec<u8>)> = inputs
        .into_iter()
        .map(|(s, p)| (s.to_string(), p))
        .collect();
    assert_eq!(records, expected);
}

#[test]
fn test_put_beyond_capacity_is_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 100);

    // "abcd," + 4 base64 chars + "\n" = 10 bytes per line
    assert_eq!(codec::encoded_len("abcd", 3), 10);
    for i in 0..10u8 {
        assert!(store.put(&[i, i, i], "abcd").unwrap());
    }
    assert_eq!(store.size_bytes(), 100);

    assert!(!store.put(b"xyz", "abcd").unwrap());
    assert_eq!(store.size_bytes(), 100);
    assert_eq!(std::fs::metadata(store.path()).unwrap().len(), 100);

    let records = read_all(&store);
    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|(_, p)| p != b"xyz"));
}

#[test]
fn test_smaller_record_fits_after_large_one_is_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 30);

    assert!(store.put(b"abc", "abcd").unwrap()); // 10 bytes
    assert!(!store.put(&[0u8; 30], "abcd").unwrap());
    assert!(store.put(b"def", "abcd").unwrap()); // 20 bytes
    assert_eq!(store.size_bytes(), 20);
}

#[test]
fn test_invalid_stream_name_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 1024);

    let result = store.put(b"payload", "bad\nstream");
    assert!(matches!(result, Err(RecorderError::InvalidStreamName(_))));
    let result = store.put(b"payload", "");
    assert!(matches!(result, Err(RecorderError::InvalidStreamName(_))));
    assert_eq!(store.size_bytes(), 0);
}

#[test]
fn test_records_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = open_store(&temp_dir, 1024);
        store.put(b"one", "s").unwrap();
        store.put(b"two", "s").unwrap();
    }

    let store = open_store(&temp_dir, 1024);
    assert_eq!(store.size_bytes(), std::fs::metadata(store.path()).unwrap().len());
    let records = read_all(&store);
    assert_eq!(
        records,
        vec![
            ("s".to_string(), b"one".to_vec()),
            ("s".to_string(), b"two".to_vec())
        ]
    );
}

#[test]
fn test_partial_trailing_line_is_truncated_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(FILE_NAME);
    let mut content = codec::encode("s", b"whole").unwrap();
    content.extend_from_slice(b"s,cGFydG");
    std::fs::write(&path, &content).unwrap();

    let store = open_store(&temp_dir, 1024);
    let whole_len = codec::encoded_len("s", 5) as u64;
    assert_eq!(store.size_bytes(), whole_len);

    store.put(b"next", "s").unwrap();
    let records = read_all(&store);
    assert_eq!(
        records,
        vec![
            ("s".to_string(), b"whole".to_vec()),
            ("s".to_string(), b"next".to_vec())
        ]
    );
}

#[test]
fn test_delete_all_empties_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 1024);
    for i in 0..5 {
        store.put(format!("record_{}", i).as_bytes(), "s").unwrap();
    }
    assert!(store.size_bytes() > 0);

    store.delete_all().unwrap();
    assert_eq!(store.size_bytes(), 0);
    assert_eq!(std::fs::metadata(store.path()).unwrap().len(), 0);
    assert!(read_all(&store).is_empty());

    // Store stays usable
    assert!(store.put(b"again", "s").unwrap());
    assert_eq!(read_all(&store).len(), 1);
}

#[test]
fn test_concurrent_puts_keep_every_record() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir, 10 * 1024 * 1024);

    const THREADS: usize = 8;
    const PER_THREAD: usize = 200;

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let store = &store;
            scope.spawn(move || {
                for i in 0..PER_THREAD {
                    let payload = format!("thread_{}_record_{}", t, i);
                    assert!(store.put(payload.as_bytes(), &format!("stream_{}", t)).unwrap());
                }
            });
        }
    });

    assert_eq!(
        store.size_bytes(),
        std::fs::metadata(store.path()).unwrap().len()
    );

    let records = read_all(&store);
    assert_eq!(records.len(), THREADS * PER_THREAD);

    // Per producer, records appear in the order they were put
    let mut next_index: HashMap<String, usize> = HashMap::new();
    for (stream, payload) in records {
        let t: usize = stream.trim_start_matches("stream_").parse().unwrap();
        let index = next_index.entry(stream).or_insert(0);
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            format!("thread_{}_record_{}", t, index)
        );
        *index += 1;
    }
    assert!(next_index.values().all(|count| *count == PER_THREAD));
}

#[test]
fn test_concurrent_puts_never_exceed_capacity() {
    let temp_dir = TempDir::new().unwrap();
    let max_size = 1000;
    let store = open_store(&temp_dir, max_size);

    let accepted: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let store = &store;
                scope.spawn(move || {
                    (0..100)
                        .filter(|_| store.put(b"abc", "abcd").unwrap())
                        .count()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    // Ten bytes per line, so exactly 100 fit
    assert_eq!(accepted, 100);
    assert_eq!(store.size_bytes(), max_size);
    assert_eq!(std::fs::metadata(store.path()).unwrap().len(), max_size);
}
