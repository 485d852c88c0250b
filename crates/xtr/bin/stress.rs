//! Drives the 1024-producer-thread / 100,000-record-per-sink boundary
//! scenario and checks that every sink's records were delivered in
//! per-sink order with none dropped, interleaved, or corrupted.
//!
//! Run with `cargo run --release --bin xtr-stress [num_producers] [records_per_producer]`.
//! Defaults to the full 1024 x 100_000 scenario, which takes a while; pass
//! smaller numbers for a quick smoke run.

use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use xtr::{Config, LogLevel, Logger, WriteTag};

fn main() {
    let mut args = std::env::args().skip(1);
    let num_producers: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(1024);
    let records_per_producer: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(100_000);

    println!("xtr stress: {num_producers} producers x {records_per_producer} records each");

    let path = std::env::temp_dir().join(format!("xtr-stress-{}.log", std::process::id()));

    let logger = Arc::new(Logger::open(&path, Config::high_throughput()).expect("open logger"));

    let start = Instant::now();
    let handles: Vec<_> = (0..num_producers)
        .map(|i| {
            let logger = Arc::clone(&logger);
            let name = format!("sink-{i}");
            thread::spawn(move || {
                let sink = logger.get_sink_with(name, LogLevel::Info, xtr::default_log_level_style).expect("get_sink");
                for seq in 0..records_per_producer {
                    sink.log_with(WriteTag::Blocking, LogLevel::Info, "bin/stress.rs:0", move |buf| {
                        buf.extend_from_slice(seq.to_string().as_bytes());
                    });
                }
                sink.sync();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("producer thread panicked");
    }
    drop(logger);

    let elapsed = start.elapsed();
    let total = num_producers as u64 * records_per_producer;
    println!("produced {total} records in {elapsed:.2?}");

    let file = std::fs::File::open(&path).expect("open log for verification");
    let mut last_seq: Vec<Option<u64>> = vec![None; num_producers];
    let mut seen: Vec<u64> = vec![0; num_producers];
    for line in BufReader::new(file).lines() {
        let line = line.expect("read line");
        let Some(name_start) = line.find("sink-") else { continue };
        let rest = &line[name_start..];
        let name_end = rest.find(' ').unwrap_or(rest.len());
        let sink_name = &rest[..name_end];
        let Ok(idx) = sink_name["sink-".len()..].parse::<usize>() else { continue };
        let seq_text = rest[name_end..].trim().rsplit(' ').next().unwrap_or("");
        let Ok(seq) = seq_text.parse::<u64>() else { continue };

        if let Some(prev) = last_seq[idx] {
            assert!(seq == prev + 1, "sink {idx} out of order: {prev} then {seq}");
        } else {
            assert_eq!(seq, 0, "sink {idx} first record was {seq}, not 0");
        }
        last_seq[idx] = Some(seq);
        seen[idx] += 1;
    }

    for (idx, count) in seen.iter().enumerate() {
        assert_eq!(*count, records_per_producer, "sink {idx} delivered {count} of {records_per_producer} records");
    }

    println!("verified: all {total} records delivered in per-sink order, none dropped");
    let _ = std::fs::remove_file(&path);
}
