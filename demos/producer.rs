// In demos/producer.rs
// Usage: cargo run --example producer -- <num_messages> [--auto-exit]
use serde::{Deserialize, Serialize};
use shmq::QueueBuilder;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize, Deserialize)]
struct Task {
    seq: usize,
    sender_pid: u32,
    created_ns: u64,
    body: String,
}

fn main() -> shmq::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <num_messages> [--auto-exit]", args[0]);
        std::process::exit(1);
    }

    let num_messages: usize = match args[1].parse() {
        Ok(n) => n,
        Err(_) => {
            eprintln!("Invalid number of messages: {}", args[1]);
            std::process::exit(1);
        }
    };
    let auto_exit = args.get(2).map(|s| s == "--auto-exit").unwrap_or(false);

    // SHMQ_SEGMENT / SHMQ_SIZE / SHMQ_LOCK_TIMEOUT_MS override the defaults
    let queue = QueueBuilder::from_env().with_channel("jobs").build()?;
    println!("Producer: attached {:?}", queue);

    let keep_alive = Arc::new(AtomicBool::new(true));
    let keep_alive_for_handler = Arc::clone(&keep_alive);

    // Handle Ctrl+C to clean up
    if let Err(e) = ctrlc::set_handler(move || {
        keep_alive_for_handler.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {}", e);
    }

    let start_send = std::time::Instant::now();
    let mut sent = 0;

    for seq in 0..num_messages {
        if !keep_alive.load(Ordering::SeqCst) {
            break;
        }
        let task = Task {
            seq,
            sender_pid: std::process::id(),
            created_ns: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64,
            body: format!("task number {}", seq),
        };

        // A full channel drains as the consumer catches up
        let mut delivered = queue.write("jobs", &task);
        while !delivered && keep_alive.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(1));
            delivered = queue.write("jobs", &task);
        }
        if !delivered {
            break;
        }
        sent += 1;
        if sent % 100 == 0 {
            println!("Sent {} messages", sent);
        }
    }

    let send_time = start_send.elapsed();
    println!("Producer: Sent {} messages in {:.2?}", sent, send_time);

    if auto_exit {
        println!("Producer: Auto-exit mode, waiting 2 seconds for consumer...");
        std::thread::sleep(std::time::Duration::from_secs(2));
    } else {
        // The segment is removed when we exit, so stay around until Ctrl+C
        println!("Waiting for consumer to finish processing (press Ctrl+C to exit)...");
        while keep_alive.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }

    println!("Producer: Shutting down ({} still queued)", queue.len("jobs"));
    queue.close()
}
