use std::io::{Read, Seek, SeekFrom, Write};
use std::thread;
use std::time::{Duration, Instant};

use streampool::config::Config;
use streampool::monitor::EventLogger;
use streampool::pool::PoolManager;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration
    let config = Config::parse_args();

    // Initialize tracing
    let log_level = match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("streampool v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Workload: {} threads x {} streams of {} bytes",
        config.threads, config.streams, config.stream_size
    );

    let pool = PoolManager::new(config.pool_options()?)?;

    // Start monitoring before the first stream exists
    let logger = EventLogger::spawn(pool.subscribe())?;

    let trimmer = if config.trim_interval_ms > 0 {
        Some(pool.spawn_trimmer(Duration::from_millis(config.trim_interval_ms))?)
    } else {
        None
    };

    let started = Instant::now();
    let workers: Vec<_> = (0..config.threads)
        .map(|worker| {
            let pool = pool.clone();
            let config = config.clone();
            thread::Builder::new()
                .name(format!("worker-{}", worker))
                .spawn(move || run_worker(&pool, &config, worker))
        })
        .collect::<Result<_, _>>()?;

    for worker in workers {
        match worker.join() {
            Ok(result) => result?,
            Err(_) => warn!("Worker thread panicked"),
        }
    }
    info!("Workload finished in {:?}", started.elapsed());

    if config.leak {
        let mut stream = pool.acquire(config.stream_size, "intentional-leak")?;
        stream.write_all(b"never released")?;
        drop(stream);
    }

    for stream in pool.outstanding() {
        warn!(
            "Stream {} (tag {}) still outstanding after {:?}",
            stream.id, stream.tag, stream.age
        );
    }

    if let Some(trimmer) = trimmer {
        trimmer.stop();
    }

    print!("{}", pool.stats().to_info_string(None));

    // Closing the last manager handle disconnects the feed
    drop(pool);
    let logged = logger.join();
    info!("Logged {} events", logged);

    Ok(())
}

/// Build, read back and contiguously view one stream per iteration.
fn run_worker(pool: &PoolManager, config: &Config, worker: usize) -> streampool::Result<()> {
    let payload: Vec<u8> = (0..config.stream_size).map(|i| (i % 251) as u8).collect();
    let tag = format!("worker-{}", worker);

    for _ in 0..config.streams {
        pool.scoped(config.stream_size, tag.as_str(), |stream| {
            stream.write_all(&payload)?;
            stream.seek(SeekFrom::Start(0))?;

            let mut readback = Vec::with_capacity(payload.len());
            stream.read_to_end(&mut readback)?;
            if readback != payload {
                warn!("Stream {} read back different bytes", stream.id());
            }

            stream.contiguous()?;
            Ok::<_, streampool::Error>(())
        })?;
    }
    Ok(())
}
