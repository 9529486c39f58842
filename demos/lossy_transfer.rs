use std::sync::Arc;
use std::time::{Duration, Instant};
use clap::Parser;
use clap_derive::Parser;
use swp::config::SwpConfig;
use swp::session::Session;
use swp::test_util::lossy_link::{lossy_link, LossyLinkConfig};
use tracing::{info, Level};

/// Transfers packets between two protocol engines over an in-memory link that loses, corrupts,
///  duplicates and reorders frames, and checks that they arrive complete and in order.
#[derive(Parser, Debug)]
struct Args {
    /// number of packets to send in each direction
    #[clap(short, long, default_value_t = 200)]
    count: usize,
    #[clap(long, default_value_t = 0.1)]
    loss: f64,
    #[clap(long, default_value_t = 0.05)]
    corruption: f64,
    #[clap(long, default_value_t = 0.05)]
    duplication: f64,
    #[clap(long, default_value_t = 0.2)]
    reorder: f64,
    /// maximum number of frames overtaking a reordered frame
    #[clap(long, default_value_t = 3)]
    max_overtake: usize,
    /// link latency in milliseconds
    #[clap(long, default_value_t = 5)]
    latency_millis: u64,
    #[clap(long, default_value_t = 0)]
    seed: u64,
    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .try_init()
        .ok();

    let link_config = LossyLinkConfig {
        loss_probability: args.loss,
        corruption_probability: args.corruption,
        duplication_probability: args.duplication,
        reorder_probability: args.reorder,
        max_overtake: args.max_overtake,
        latency: Duration::from_millis(args.latency_millis),
        seed: args.seed,
        ..LossyLinkConfig::default()
    };
    let (link_a, link_b) = lossy_link(&link_config)?;

    let config = Arc::new(SwpConfig::default());
    let mut a = Session::spawn(config.clone(), link_a)?;
    let mut b = Session::spawn(config, link_b)?;

    let start = Instant::now();
    let (from_b, from_a) = tokio::try_join!(
        exchange("A", &mut a, args.count),
        exchange("B", &mut b, args.count),
    )?;

    verify("B", &from_b, args.count)?;
    verify("A", &from_a, args.count)?;
    info!("transferred {} packets in each direction in {:?}", args.count, start.elapsed());
    Ok(())
}

/// sends `count` packets and receives as many from the peer
async fn exchange(name: &str, session: &mut Session, count: usize) -> anyhow::Result<Vec<String>> {
    let mut received = Vec::with_capacity(count);

    for i in 0..count {
        // drain what arrived so far, the delivery queue is bounded
        while let Ok(Some(packet)) = tokio::time::timeout(Duration::ZERO, session.recv()).await {
            received.push(String::from_utf8_lossy(packet.as_bytes()).to_string());
        }
        session.send(format!("{}-{}", name, i)).await?;
    }

    while received.len() < count {
        match session.recv().await {
            Some(packet) => received.push(String::from_utf8_lossy(packet.as_bytes()).to_string()),
            None => anyhow::bail!("{}: engine terminated after receiving {} packets", name, received.len()),
        }
        if received.len() % 50 == 0 {
            info!("{}: received {} of {} packets", name, received.len(), count);
        }
    }
    Ok(received)
}

fn verify(sender: &str, received: &[String], count: usize) -> anyhow::Result<()> {
    for (i, packet) in received.iter().enumerate() {
        let expected = format!("{}-{}", sender, i);
        if *packet != expected {
            anyhow::bail!("expected {}, received {}", expected, packet);
        }
    }
    if received.len() != count {
        anyhow::bail!("expected {} packets from {}, received {}", count, sender, received.len());
    }
    Ok(())
}
