// =============================================================================
// FLEETTRACK — Load Test Tool
// =============================================================================
// Generates synthetic vehicle position pings and sends them to the ingest
// server's JSON surface at a configurable rate, tracking accept/throttle/
// reject/error outcomes. Retargeted from the teacher's signed-protobuf
// packet generator at the single/batch JSON push endpoints this spec
// describes (§4.G).
// =============================================================================

use clap::Parser;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "fleettrack-loadtest")]
#[command(about = "Load test tool for the fleet-telemetry ingest server")]
struct Args {
    /// Server base URL
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// Pings per second
    #[arg(long, default_value_t = 100)]
    rate: u32,

    /// Duration in seconds
    #[arg(long, default_value_t = 30)]
    duration: u64,

    /// Number of distinct simulated vehicles
    #[arg(long, default_value_t = 50)]
    vehicles: usize,

    /// Center latitude
    #[arg(long, default_value_t = 12.97)]
    lat: f64,

    /// Center longitude
    #[arg(long, default_value_t = 77.59)]
    lng: f64,
}

#[derive(Serialize)]
struct PushBody {
    lat: f64,
    lng: f64,
    speed: f64,
    heading: f64,
}

struct Counters {
    sent: AtomicU64,
    accepted: AtomicU64,
    no_motion: AtomicU64,
    throttled: AtomicU64,
    rejected: AtomicU64,
    network_error: AtomicU64,
    latency_sum_us: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            no_motion: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            network_error: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
        }
    }
}

fn main() {
    let args = Args::parse();

    println!("=== Fleettrack Load Test ===");
    println!("Target:   {}/api/vehicles/:id/location", args.url);
    println!("Rate:     {} ping/s", args.rate);
    println!("Duration: {}s", args.duration);
    println!("Vehicles: {}", args.vehicles);
    println!("Center:   lat={} lng={}", args.lat, args.lng);
    println!();

    let vehicle_ids: Vec<String> = (0..args.vehicles).map(|i| format!("loadtest_veh_{i}")).collect();

    let health_url = format!("{}/health", args.url);
    match reqwest::blocking::get(&health_url) {
        Ok(r) if r.status().is_success() => println!("Server health: OK"),
        Ok(r) => {
            eprintln!("Server health check failed: {}", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Cannot reach server: {}", e);
            std::process::exit(1);
        }
    }

    let counters = Arc::new(Counters::new());
    let interval = Duration::from_micros(1_000_000 / args.rate.max(1) as u64);
    let deadline = Instant::now() + Duration::from_secs(args.duration);

    println!("\nSending...\n");
    let start = Instant::now();

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();

    let mut rng = rand::thread_rng();
    let mut tick = 0u64;

    while Instant::now() < deadline {
        let vehicle_id = &vehicle_ids[(tick as usize) % vehicle_ids.len()];
        let body = PushBody {
            lat: args.lat + rng.gen_range(-0.02..0.02),
            lng: args.lng + rng.gen_range(-0.02..0.02),
            speed: rng.gen_range(0.0..40.0),
            heading: rng.gen_range(0.0..360.0),
        };
        let url = format!("{}/api/vehicles/{}/location", args.url, vehicle_id);

        let req_start = Instant::now();
        counters.sent.fetch_add(1, Ordering::Relaxed);

        match client.post(&url).json(&body).send() {
            Ok(resp) => {
                let lat = req_start.elapsed().as_micros() as u64;
                counters.latency_sum_us.fetch_add(lat, Ordering::Relaxed);

                match resp.status().as_u16() {
                    200 => {
                        let moved_or_not: serde_json::Value =
                            resp.json().unwrap_or(serde_json::Value::Null);
                        if moved_or_not.get("reason").and_then(|v| v.as_str()) == Some("no_movement")
                        {
                            counters.no_motion.fetch_add(1, Ordering::Relaxed);
                        } else {
                            counters.accepted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    429 => {
                        counters.throttled.fetch_add(1, Ordering::Relaxed);
                    }
                    other => {
                        counters.rejected.fetch_add(1, Ordering::Relaxed);
                        if tick < 5 {
                            eprintln!("Unexpected status: {}", other);
                        }
                    }
                }
            }
            Err(_) => {
                counters.network_error.fetch_add(1, Ordering::Relaxed);
            }
        }

        tick += 1;

        if tick % 500 == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            let sent = counters.sent.load(Ordering::Relaxed);
            println!(
                "  [{:.1}s] sent={} accepted={} no_motion={} throttled={} rejected={} err={} ({:.0} ping/s)",
                elapsed,
                sent,
                counters.accepted.load(Ordering::Relaxed),
                counters.no_motion.load(Ordering::Relaxed),
                counters.throttled.load(Ordering::Relaxed),
                counters.rejected.load(Ordering::Relaxed),
                counters.network_error.load(Ordering::Relaxed),
                sent as f64 / elapsed,
            );
        }

        let target = Duration::from_micros(tick * interval.as_micros() as u64);
        let actual = start.elapsed();
        if actual < target {
            std::thread::sleep(target - actual);
        }
    }

    let elapsed = start.elapsed();
    let sent = counters.sent.load(Ordering::Relaxed);
    let accepted = counters.accepted.load(Ordering::Relaxed);
    let avg_lat = if sent > 0 {
        counters.latency_sum_us.load(Ordering::Relaxed) / sent
    } else {
        0
    };

    println!("\n=== Results ===");
    println!("Duration:     {:.2}s", elapsed.as_secs_f64());
    println!("Total sent:   {}", sent);
    println!("Accepted:     {} ({:.1}%)", accepted, accepted as f64 / sent.max(1) as f64 * 100.0);
    println!("No motion:    {}", counters.no_motion.load(Ordering::Relaxed));
    println!("Throttled:    {}", counters.throttled.load(Ordering::Relaxed));
    println!("Rejected:     {}", counters.rejected.load(Ordering::Relaxed));
    println!("Net errors:   {}", counters.network_error.load(Ordering::Relaxed));
    println!("Avg latency:  {} us", avg_lat);
    println!("Throughput:   {:.1} ping/s", sent as f64 / elapsed.as_secs_f64());
}
