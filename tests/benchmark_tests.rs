//! Performance benchmarks for the frame decoding hot path

use shared::{format_bytes, InboundFrame, OutboundFrame, ServerMetrics};
use std::time::Instant;

fn stats_frame(i: u64) -> String {
    let payload = serde_json::json!({
        "cpu_absolute": (i % 400) as f64 / 4.0,
        "memory_bytes": 104_857_600 + i,
        "disk_bytes": 524_288_000 + i,
        "network": { "rx_bytes": i, "tx_bytes": i * 2 },
        "uptime": i * 1000,
        "state": "running",
    });
    serde_json::json!({ "event": "stats", "args": [payload.to_string()] }).to_string()
}

/// Benchmarks decoding of stats frames as they arrive from the daemon
#[test]
fn benchmark_stats_decoding() {
    let frames: Vec<String> = (0..10_000).map(stats_frame).collect();

    let start = Instant::now();
    let mut total_cpu = 0.0;
    for frame in &frames {
        if let Ok(InboundFrame::Stats(metrics)) = InboundFrame::decode(frame) {
            total_cpu += metrics.cpu_percent;
        }
    }
    let duration = start.elapsed();

    println!(
        "Stats decoding: {} frames in {:?} ({:.2} μs/frame)",
        frames.len(),
        duration,
        duration.as_micros() as f64 / frames.len() as f64
    );

    assert!(total_cpu > 0.0);
    // Dashboards with dozens of servers receive a few frames per second each
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks mixed traffic including undecodable frames
#[test]
fn benchmark_mixed_frame_decoding() {
    let frames = [
        r#"{"event":"status","args":["running"]}"#.to_string(),
        r#"{"event":"console output","args":["[Server thread/INFO]: Done (3.2s)!"]}"#.to_string(),
        r#"{"event":"stats","args":["{broken"]}"#.to_string(),
        "not json".to_string(),
        stats_frame(7),
    ];

    let iterations = 5_000;
    let start = Instant::now();
    let mut decoded = 0;
    let mut rejected = 0;

    for _ in 0..iterations {
        for frame in &frames {
            match InboundFrame::decode(frame) {
                Ok(_) => decoded += 1,
                Err(_) => rejected += 1,
            }
        }
    }

    let duration = start.elapsed();
    println!(
        "Mixed decoding: {} frames in {:?}",
        iterations * frames.len(),
        duration
    );

    assert_eq!(decoded, iterations * 3);
    assert_eq!(rejected, iterations * 2);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks encoding of the outbound handshake frames
#[test]
fn benchmark_outbound_encoding() {
    let iterations = 20_000;
    let start = Instant::now();

    for i in 0..iterations {
        let auth = OutboundFrame::Auth {
            token: format!("token-{}", i),
        };
        assert!(auth.encode().is_ok());
        assert!(OutboundFrame::SendStats.encode().is_ok());
    }

    let duration = start.elapsed();
    println!("Outbound encoding: {} pairs in {:?}", iterations, duration);

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks byte formatting used on every snapshot render
#[test]
fn benchmark_byte_formatting() {
    let metrics: Vec<ServerMetrics> = (0..10_000u32)
        .map(|i| ServerMetrics::new(i as f64, i as f64 * 1_048_576.0, i as f64 * 4_096.0))
        .collect();

    let start = Instant::now();
    let mut rendered = 0;
    for m in &metrics {
        rendered += format_bytes(m.memory_bytes).len() + format_bytes(m.disk_bytes).len();
    }
    let duration = start.elapsed();

    println!("Byte formatting: {} rows in {:?}", metrics.len(), duration);

    assert!(rendered > 0);
    assert!(duration.as_millis() < 1000);
}
