use clap::{App, Arg, ArgMatches, SubCommand};
use orbit::{
    orb_define, time::frequency_to_interval, Broker, EventLoop, EventMask, OrbError, OrbHandle,
    Publisher, Result,
};
use serde::{Deserialize, Serialize};
use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

orb_define!(ORB_SENSOR_ACCEL, "sensor_accel", 20);
orb_define!(ORB_SENSOR_BARO, "sensor_baro", 16);
orb_define!(ORB_PING, "orb_ping", 16);

#[derive(Debug, Serialize, Deserialize)]
struct SensorAccel {
    timestamp: u64,
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct SensorBaro {
    timestamp: u64,
    pressure: f32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Ping {
    seq: u64,
    sent: u64,
}

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("orb-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Orbit topic broker demo tool")
        .subcommand(
            SubCommand::with_name("listener")
                .about("Print records of a simulated sensor topic")
                .arg(
                    Arg::with_name("topic")
                        .help("Topic name, optionally with instance suffix")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .value_name("COUNT")
                        .help("Number of records to print")
                        .default_value("10")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("rate")
                        .short("r")
                        .long("rate")
                        .value_name("HZ")
                        .help("Subscription rate limit in Hz (0 for unlimited)")
                        .default_value("0")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("instances")
                        .short("i")
                        .long("instances")
                        .value_name("COUNT")
                        .help("Number of simulated instances per sensor")
                        .default_value("2")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("top")
                .about("Run simulated sensors and list topic objects")
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("MS")
                        .help("How long the sensors run")
                        .default_value("500")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("latency")
                .about("Measure publish to wakeup latency")
                .arg(
                    Arg::with_name("count")
                        .short("c")
                        .long("count")
                        .value_name("COUNT")
                        .help("Number of round trips")
                        .default_value("1000")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("queue")
                .about("Show queue overflow behaviour")
                .arg(
                    Arg::with_name("queue_size")
                        .short("q")
                        .long("queue-size")
                        .value_name("SIZE")
                        .help("Ring depth")
                        .default_value("16")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("count")
                        .short("c")
                        .long("count")
                        .value_name("COUNT")
                        .help("Records published before draining")
                        .default_value("20")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("info").about("Show version information"))
        .get_matches();

    match matches.subcommand() {
        ("listener", Some(listener_matches)) => handle_listener(listener_matches),
        ("top", Some(top_matches)) => handle_top(top_matches),
        ("latency", Some(latency_matches)) => handle_latency(latency_matches),
        ("queue", Some(queue_matches)) => handle_queue(queue_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn parse_arg<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    matches
        .value_of(name)
        .ok_or_else(|| OrbError::invalid_parameter(name, "Missing value"))?
        .parse()
        .map_err(|_| OrbError::invalid_parameter(name, "Invalid value"))
}

fn demo_broker() -> Result<Broker> {
    let broker = Broker::new();
    broker.register(&ORB_SENSOR_ACCEL)?;
    broker.register(&ORB_SENSOR_BARO)?;
    broker.register(&ORB_PING)?;
    Ok(broker)
}

/// Simulated sensors publishing until `running` is cleared
fn spawn_sensors(
    broker: &Broker,
    instances: u32,
    running: Arc<AtomicBool>,
) -> Result<Vec<thread::JoinHandle<Result<()>>>> {
    let mut publishers: Vec<(Publisher, u32)> = Vec::new();
    for instance in 0..instances {
        let accel = broker.advertise_multi_queue(&ORB_SENSOR_ACCEL, None, Some(instance), 4)?;
        let baro = broker.advertise_multi(&ORB_SENSOR_BARO, None, Some(instance))?;
        publishers.push((accel, instance));
        publishers.push((baro, instance));
    }

    let mut threads = Vec::new();
    for (publisher, instance) in publishers {
        let running = running.clone();
        threads.push(thread::spawn(move || -> Result<()> {
            let mut tick = 0u32;
            while running.load(Ordering::Relaxed) {
                let timestamp = orbit::absolute_time();
                let phase = tick as f32 * 0.01 + instance as f32;
                if publisher.meta().name() == ORB_SENSOR_ACCEL.name() {
                    publisher.publish_msg(&SensorAccel {
                        timestamp,
                        x: phase.sin(),
                        y: phase.cos(),
                        z: 9.81,
                    })?;
                    thread::sleep(Duration::from_millis(4));
                } else {
                    publisher.publish_msg(&SensorBaro {
                        timestamp,
                        pressure: 1013.25 + phase.sin(),
                        temperature: 20.0 + instance as f32,
                    })?;
                    thread::sleep(Duration::from_millis(20));
                }
                tick = tick.wrapping_add(1);
            }
            Ok(())
        }));
    }
    Ok(threads)
}

fn stop_sensors(
    running: &AtomicBool,
    threads: Vec<thread::JoinHandle<Result<()>>>,
) -> Result<()> {
    running.store(false, Ordering::Relaxed);
    for handle in threads {
        handle
            .join()
            .map_err(|_| OrbError::invalid_parameter("sensor", "Sensor thread panicked"))??;
    }
    Ok(())
}

fn handle_listener(matches: &ArgMatches) -> Result<()> {
    let topic = matches
        .value_of("topic")
        .ok_or_else(|| OrbError::invalid_parameter("topic", "Missing topic"))?;
    let count: usize = parse_arg(matches, "count")?;
    let rate: u32 = parse_arg(matches, "rate")?;
    let instances: u32 = parse_arg(matches, "instances")?;

    let broker = demo_broker()?;
    let running = Arc::new(AtomicBool::new(true));
    let threads = spawn_sensors(&broker, instances.max(1), running.clone())?;

    let subscriber = broker.open(topic, None)?;
    subscriber.set_interval(frequency_to_interval(rate))?;
    println!(
        "Listening on {} ({} records)",
        broker.object_path(subscriber.meta(), subscriber.instance()),
        count
    );

    let mut printed = 0;
    let start = Instant::now();
    while printed < count {
        subscriber.wait(Some(Duration::from_secs(1)))?;
        let sample = subscriber.copy()?;
        let elapsed = start.elapsed().as_millis();
        if subscriber.meta().name() == ORB_SENSOR_ACCEL.name() {
            let accel: SensorAccel = bincode::deserialize(&sample.data)?;
            println!(
                "  [{:>6}ms] gen {:>5} lost {} {:?}",
                elapsed, sample.generation, sample.lost, accel
            );
        } else {
            let baro: SensorBaro = bincode::deserialize(&sample.data)?;
            println!(
                "  [{:>6}ms] gen {:>5} lost {} {:?}",
                elapsed, sample.generation, sample.lost, baro
            );
        }
        printed += 1;
    }

    drop(subscriber);
    stop_sensors(&running, threads)
}

fn handle_top(matches: &ArgMatches) -> Result<()> {
    let duration: u64 = parse_arg(matches, "duration")?;

    let broker = demo_broker()?;
    let running = Arc::new(AtomicBool::new(true));
    let threads = spawn_sensors(&broker, 2, running.clone())?;

    // One rate-limited reader per accel instance
    let readers = (0..2)
        .map(|instance| {
            let subscriber = broker.subscribe_multi(&ORB_SENSOR_ACCEL, instance)?;
            subscriber.set_frequency(50)?;
            Ok(subscriber)
        })
        .collect::<Result<Vec<_>>>()?;

    let deadline = Instant::now() + Duration::from_millis(duration);
    while Instant::now() < deadline {
        for reader in &readers {
            match reader.wait(Some(Duration::from_millis(5))) {
                Ok(()) | Err(OrbError::Timeout { .. }) => {}
                Err(e) => return Err(e),
            }
            while reader.check()? {
                reader.copy()?;
            }
        }
    }

    stop_sensors(&running, threads)?;

    println!(
        "{:<20} {:>4} {:>6} {:>5} {:>5} {:>8} {:>8} {:>6}",
        "TOPIC", "INST", "LIVE", "QUEUE", "SUBS", "PUB", "COPIED", "LOST"
    );
    for summary in broker.objects() {
        println!(
            "{:<20} {:>4} {:>6} {:>5} {:>5} {:>8} {:>8} {:>6}",
            summary.object.meta.name(),
            summary.object.instance,
            summary.live,
            summary.state.queue_size,
            summary.state.nsubscribers,
            summary.stats.published,
            summary.stats.copied,
            summary.stats.lost
        );
    }

    println!("\n{:<20} {:>4} {:>8} {:>8}", "READER", "INST", "WAKEUPS", "WAITS");
    for reader in &readers {
        let wakeups = reader.notification_stats();
        println!(
            "{:<20} {:>4} {:>8} {:>8}",
            reader.meta().name(),
            reader.instance(),
            wakeups.notify_count,
            wakeups.wait_count
        );
    }

    let stats = broker.stats();
    println!(
        "\nnodes created {} advertisements {} subscriptions {}",
        stats.nodes_created, stats.advertisements, stats.subscriptions
    );
    Ok(())
}

fn handle_latency(matches: &ArgMatches) -> Result<()> {
    let count: u64 = parse_arg(matches, "count")?;

    let broker = demo_broker()?;
    let publisher = broker.advertise(&ORB_PING, None)?;
    let subscriber = broker.subscribe(&ORB_PING)?;

    let mut event_loop = EventLoop::new()?;
    let exit = event_loop.exit_handle();

    let mut latencies: Vec<u64> = Vec::with_capacity(count as usize);
    let (tx, rx) = std::sync::mpsc::channel();
    event_loop.register(subscriber, EventMask::DATAIN, move |handle: &OrbHandle, _| {
        if let Some(subscriber) = handle.as_subscriber() {
            while let Ok(ping) = subscriber.copy_msg::<Ping>() {
                let _ = tx.send(orbit::elapsed_time(ping.sent));
            }
        }
    })?;

    let reactor = thread::spawn(move || event_loop.run());

    for seq in 0..count {
        publisher.publish_msg(&Ping {
            seq,
            sent: orbit::absolute_time(),
        })?;
        let latency = rx
            .recv_timeout(Duration::from_secs(1))
            .map_err(|_| OrbError::Timeout { timeout_ms: 1000 })?;
        latencies.push(latency);
    }

    exit.exit()?;
    reactor
        .join()
        .map_err(|_| OrbError::invalid_parameter("reactor", "Event loop thread panicked"))??;

    latencies.sort_unstable();
    let percentile = |p: usize| latencies[(latencies.len() - 1) * p / 100];
    if !latencies.is_empty() {
        println!("Round trips: {}", latencies.len());
        println!("  p50: {}μs", percentile(50));
        println!("  p99: {}μs", percentile(99));
        println!("  max: {}μs", percentile(100));
    }
    Ok(())
}

fn handle_queue(matches: &ArgMatches) -> Result<()> {
    let queue_size: u32 = parse_arg(matches, "queue_size")?;
    let count: u64 = parse_arg(matches, "count")?;

    let broker = demo_broker()?;
    let publisher = broker.advertise_queue(&ORB_PING, None, queue_size)?;
    let subscriber = broker.subscribe(&ORB_PING)?;

    for seq in 0..count {
        publisher.publish_msg(&Ping { seq, sent: 0 })?;
    }

    println!("Published {} records into a queue of {}", count, queue_size);
    let mut received = Vec::new();
    let mut lost = 0;
    while subscriber.check()? {
        let sample = subscriber.copy()?;
        lost += sample.lost;
        let ping: Ping = bincode::deserialize(&sample.data)?;
        received.push(ping.seq);
    }

    println!("  Received: {:?}", received);
    println!("  Lost: {}", lost);
    Ok(())
}

fn show_info() -> Result<()> {
    println!("Orbit Topic Broker");
    println!("Version: {}", orbit::VERSION);

    let config = orbit::BrokerConfig::default();
    println!("\nDefaults:");
    println!("  Max instances per topic: {}", config.max_instances);
    println!("  Default queue size: {}", config.default_queue_size);
    println!("  Max queue size: {}", config.max_queue_size);
    println!("  Object prefix: {}", config.device_prefix);

    println!("\nCapabilities:");
    println!("  - Multi-instance topics with ghost promotion");
    println!("  - Queued, gap-tolerant delivery per subscriber");
    println!("  - eventfd readiness and mio event loop");
    Ok(())
}
