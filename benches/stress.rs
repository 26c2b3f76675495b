use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use ulid::Ulid;

use rota::notify::NotifyHub;
use rota::{Engine, Ms};

const HOUR: Ms = 3_600_000; // 1 hour in ms

fn mk_engine(name: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join("rota_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    Arc::new(Engine::new(path, Arc::new(NotifyHub::new())).unwrap())
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential(engine: &Arc<Engine>) {
    let provider = Ulid::new();
    engine.register_provider(provider, None).await.unwrap();

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = (i as Ms) * HOUR;
        let t = Instant::now();
        engine
            .create_slot(provider, s, s + HOUR, None)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!(
        "  {n} slots in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    print_latency("create latency", &mut latencies);
}

async fn phase2_concurrent(engine: &Arc<Engine>) {
    let n_tasks = 10;
    let n_per_task = 200;

    let mut providers = Vec::with_capacity(n_tasks);
    for _ in 0..n_tasks {
        let p = Ulid::new();
        engine.register_provider(p, None).await.unwrap();
        providers.push(p);
    }

    let start = Instant::now();
    let mut handles = Vec::new();

    for &provider in &providers {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                let s = (j as Ms) * HOUR;
                engine
                    .create_slot(provider, s, s + HOUR, None)
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} providers x {n_per_task} slots = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load(engine: &Arc<Engine>) {
    let provider = Ulid::new();
    engine.register_provider(provider, None).await.unwrap();
    for i in 0..200 {
        let s = (i as Ms) * HOUR;
        engine
            .create_slot(provider, s, s + HOUR, None)
            .await
            .unwrap();
    }

    // Writers keep appending slots to their own providers in the background
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for _ in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let wp = Ulid::new();
            engine.register_provider(wp, None).await.unwrap();
            let mut i: Ms = 0;
            while !stop.load(Ordering::Relaxed) {
                let s = i * HOUR;
                let _ = engine.create_slot(wp, s, s + HOUR, None).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for _ in 0..n_readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                engine.list_available(provider).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("list_available", &mut all_latencies);
}

async fn phase4_booking_storm(engine: &Arc<Engine>) {
    let n_slots = 50;
    let bookers_per_slot = 10;

    let provider = Ulid::new();
    engine.register_provider(provider, None).await.unwrap();

    let mut slots = Vec::with_capacity(n_slots);
    for i in 0..n_slots {
        let s = (i as Ms) * HOUR;
        slots.push(
            engine
                .create_slot(provider, s, s + HOUR, None)
                .await
                .unwrap(),
        );
    }

    let mut consumers = Vec::with_capacity(bookers_per_slot);
    for _ in 0..bookers_per_slot {
        let c = Ulid::new();
        engine.register_consumer(c, None).await.unwrap();
        consumers.push(c);
    }

    let confirmed = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for slot in &slots {
        for &consumer in &consumers {
            let engine = engine.clone();
            let slot_id = slot.id;
            let confirmed = confirmed.clone();
            let lost = lost.clone();
            handles.push(tokio::spawn(async move {
                match engine.book(provider, slot_id, consumer).await {
                    Ok(_) => confirmed.fetch_add(1, Ordering::Relaxed),
                    Err(_) => lost.fetch_add(1, Ordering::Relaxed),
                };
            }));
        }
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = confirmed.load(Ordering::Relaxed);
    let no = lost.load(Ordering::Relaxed);
    let total = n_slots * bookers_per_slot;
    println!(
        "  {total} booking attempts over {n_slots} slots: {ok} confirmed, {no} lost in {:.2}s",
        elapsed.as_secs_f64()
    );
    assert_eq!(ok, n_slots, "each slot must be booked exactly once");
}

#[tokio::main]
async fn main() {
    println!("=== rota stress benchmark ===\n");

    println!("[phase 1] sequential create throughput");
    let engine = mk_engine("phase1.wal");
    phase1_sequential(&engine).await;

    println!("\n[phase 2] concurrent create throughput");
    let engine = mk_engine("phase2.wal");
    phase2_concurrent(&engine).await;

    println!("\n[phase 3] read latency under write load");
    let engine = mk_engine("phase3.wal");
    phase3_read_under_load(&engine).await;

    println!("\n[phase 4] booking storm");
    let engine = mk_engine("phase4.wal");
    phase4_booking_storm(&engine).await;

    println!("\n=== benchmark complete ===");
}
