use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use registrar::{Admission, OpenDirectory, ScheduleError, Scheduler, SignalHub, TimeRange};

const HOUR: i64 = 3_600_000; // 1 hour in ms

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
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

async fn setup(scheduler: &Scheduler) -> Vec<Ulid> {
    let capacities: [Option<u32>; 10] = [
        Some(50),
        Some(50),
        Some(50),
        Some(100),
        Some(100),
        Some(200),
        Some(200),
        Some(500),
        None,
        None,
    ];
    let now = now_ms();
    let mut resources = Vec::new();

    for &cap in &capacities {
        let rid = Ulid::new();
        scheduler
            .create_resource(
                rid,
                None,
                cap,
                Some(TimeRange::new(now + 240 * HOUR, now + 241 * HOUR)),
                true,
            )
            .await
            .unwrap();
        scheduler.submit_resource(rid).await.unwrap();
        scheduler.approve_resource(rid).await.unwrap();
        resources.push(rid);
    }

    println!("  created {} resources", resources.len());
    resources
}

/// Hammer one event with concurrent registrations and cancellations.
async fn admission_stress(scheduler: Arc<Scheduler>, resources: &[Ulid], tasks: usize, per_task: usize) {
    let start = Instant::now();
    let mut handles = Vec::new();

    for t in 0..tasks {
        let scheduler = scheduler.clone();
        let rid = resources[t % resources.len()];
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(per_task);
            let mut admitted: Vec<Ulid> = Vec::new();
            for i in 0..per_task {
                let op_start = Instant::now();
                match scheduler.register(rid, Ulid::new()).await {
                    Ok(Admission::Admitted(id)) => admitted.push(id),
                    Ok(Admission::Waitlisted(_)) => {}
                    Err(e) => panic!("register failed: {e}"),
                }
                latencies.push(op_start.elapsed());

                // Churn: every fourth registration cancels an earlier one
                if i % 4 == 3
                    && let Some(victim) = admitted.pop()
                {
                    scheduler.cancel(victim, None).await.unwrap();
                }
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    let elapsed = start.elapsed();
    let total_ops = all.len();
    println!(
        "  {total_ops} registrations in {:.2}s ({:.0} ops/s)",
        elapsed.as_secs_f64(),
        total_ops as f64 / elapsed.as_secs_f64()
    );
    print_latency("register", &mut all);
}

/// Flood one venue with overlapping requests, then serialize approvals.
async fn booking_stress(scheduler: Arc<Scheduler>, tasks: usize, per_task: usize) {
    let vid = Ulid::new();
    scheduler
        .create_resource(vid, None, None, None, true)
        .await
        .unwrap();

    let base = now_ms() + 24 * HOUR;
    let start = Instant::now();
    let mut handles = Vec::new();

    for t in 0..tasks {
        let scheduler = scheduler.clone();
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(per_task);
            let mut mine = Vec::new();
            for i in 0..per_task {
                // Staggered hour slots; neighbors overlap by 30 minutes
                let slot_start = base + (t * per_task + i) as i64 * (HOUR / 2);
                let op_start = Instant::now();
                match scheduler
                    .request_reservation(vid, Ulid::new(), None, slot_start, slot_start + HOUR)
                    .await
                {
                    Ok(id) => mine.push(id),
                    // A neighbor's approval may already hold the slot
                    Err(ScheduleError::SlotConflict(_)) => {}
                    Err(e) => panic!("request failed: {e}"),
                }
                latencies.push(op_start.elapsed());
            }
            let mut approvals = 0usize;
            for id in mine {
                if scheduler.approve_reservation(id).await.is_ok() {
                    approvals += 1;
                }
            }
            (latencies, approvals)
        }));
    }

    let mut all = Vec::new();
    let mut approvals = 0;
    for h in handles {
        let (latencies, a) = h.await.unwrap();
        all.extend(latencies);
        approvals += a;
    }
    let elapsed = start.elapsed();
    println!(
        "  {} requests, {approvals} approvals in {:.2}s",
        all.len(),
        elapsed.as_secs_f64()
    );
    print_latency("request", &mut all);
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let dir = std::env::temp_dir().join(format!("registrar_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let scheduler = Arc::new(
        Scheduler::new(
            dir.join("stress.wal"),
            Arc::new(SignalHub::new()),
            Arc::new(OpenDirectory),
        )
        .unwrap(),
    );

    println!("setup:");
    let resources = setup(&scheduler).await;

    println!("admission stress:");
    admission_stress(scheduler.clone(), &resources, 16, 250).await;

    println!("booking stress:");
    booking_stress(scheduler.clone(), 8, 100).await;

    let _ = std::fs::remove_dir_all(&dir);
}
