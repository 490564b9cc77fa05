// In demos/consumer.rs
// Usage: cargo run --example consumer -- <expected_messages>
use serde::{Deserialize, Serialize};
use shmq::{MessageQueue, QueueConfig};
use std::env;
use std::time::Duration;

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
        eprintln!("Usage: {} <expected_messages>", args[0]);
        std::process::exit(1);
    }

    let expected_messages: usize = match args[1].parse() {
        Ok(n) => n,
        Err(_) => {
            eprintln!("Invalid number of messages: {}", args[1]);
            std::process::exit(1);
        }
    };

    let config = QueueConfig::from_env();
    let segment = config.segment.clone();
    let size = config.size;

    let mut queue = MessageQueue::with_config(config);
    queue.register_channel("jobs")?;
    queue.allocate(segment, size)?;

    if queue.arena().map(|a| a.is_creator()).unwrap_or(false) {
        println!("Consumer: no producer yet, created the segment myself");
    }

    let start = std::time::Instant::now();
    let mut received = 0;
    let mut last_seen = start;

    println!("\n{:<10} {:<10} {}", "Seq", "Pid", "Body");
    println!("{}", "=".repeat(60));

    while received < expected_messages {
        match queue.next::<Task>("jobs") {
            Some(task) => {
                println!("{:<10} {:<10} {}", task.seq, task.sender_pid, task.body);
                received += 1;
                last_seen = std::time::Instant::now();
            }
            None => {
                if last_seen.elapsed() > Duration::from_secs(5) {
                    eprintln!("Timeout waiting for messages");
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    let elapsed = start.elapsed();
    println!("\n{}", "=".repeat(60));
    println!("Consumer: Received {} messages in {:.2?}", received, elapsed);

    if received == expected_messages {
        println!("All messages received successfully");
    }

    // Teardown belongs to the producer; dropping here would remove its semaphores
    std::mem::forget(queue);
    Ok(())
}
