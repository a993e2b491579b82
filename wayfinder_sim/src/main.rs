//! Wayfinder Simulator CLI
//!
//! Run deterministic navigation scenarios, or follow a real device live.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wayfinder_core::{FetchOutcome, SessionConfig, SessionController, SessionUpdate, Viewport};
use wayfinder_env::{
    BackendConfig, DeviceId, HttpBackend, MapId, RouteType, StreamTransport, WayfinderError,
};
use wayfinder_sim::scenarios::ScenarioId;
use wayfinder_sim::{ScenarioResult, ScenarioRunner};

/// Wayfinder navigation simulator
#[derive(Parser, Debug)]
#[command(name = "wayfinder-sim")]
#[command(about = "Run navigation scenarios or track a live device", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (on_route, detour_reroute, map_switch, late_event,
    /// stream_dropout, malformed_stream, crowd_heatmap, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Position samples per route leg
    #[arg(long, default_value = "20")]
    steps: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Track a real device instead of running scenarios
    #[arg(long)]
    live: bool,

    /// REST base URL for --live (default: WAYFINDER_BASE_URL or http://10.0.2.2:8000)
    #[arg(long)]
    base_url: Option<String>,

    /// Device to register for --live
    #[arg(long, env = "WAYFINDER_DEVICE", default_value = "jetson_01")]
    device: String,

    /// Map to register on for --live
    #[arg(long, env = "WAYFINDER_MAP", default_value = "map_01")]
    map: String,

    /// Landmark to route to for --live
    #[arg(long)]
    destination: Option<String>,

    /// Route optimization (fast, less_crowd)
    #[arg(long, default_value = "fast")]
    route_type: RouteType,

    /// Deviation threshold in map pixels
    #[arg(long, default_value = "20")]
    threshold: f64,

    /// Reroute automatically when the visitor leaves the route
    #[arg(long)]
    auto_reroute: bool,

    /// Seconds to track before terminating
    #[arg(short, long, default_value = "60")]
    duration: u64,
}

async fn run_live(args: &Args) -> Result<(), WayfinderError> {
    let mut config = BackendConfig::from_env()?;
    if let Some(url) = &args.base_url {
        config.base_url = url.clone();
    }
    info!(base_url = %config.base_url, stream = ?config.stream_kind, "Connecting to backend");

    let backend = Arc::new(HttpBackend::new(config.clone())?);
    let transport = Arc::new(StreamTransport::from_config(&config)?);
    let session_config = SessionConfig {
        deviation_threshold_px: args.threshold,
        ..SessionConfig::default()
    };
    let mut controller = SessionController::new(backend, transport, session_config);

    let device = DeviceId::new(args.device.as_str())?;
    let map = MapId::new(args.map.as_str())?;
    let outcome = controller.register(device.clone(), map).await?;
    info!(?outcome, "Registered");

    let landmarks = controller.state().metadata().landmark_names().join(", ");
    if !landmarks.is_empty() {
        info!("Landmarks: {}", landmarks);
    }

    if let Some(destination) = &args.destination {
        match controller.request_route(destination.as_str(), args.route_type).await {
            Ok(_) => info!(
                destination = %destination,
                waypoints = controller.state().path().len(),
                "Route loaded"
            ),
            Err(e) => warn!("No route: {}", e),
        }
    }

    match controller.refresh_density().await {
        Ok(_) => info!(
            heat_spots = controller.heatmap(&Viewport::new(360.0, 640.0)).len(),
            "Crowd density loaded"
        ),
        Err(e) => warn!("No crowd density: {}", e),
    }

    let deadline = tokio::time::sleep(Duration::from_secs(args.duration));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            update = controller.step() => match update {
                Some(SessionUpdate::Position { position, evaluation, deviation_raised }) => {
                    info!(
                        x = position.x,
                        y = position.y,
                        distance = evaluation.nearest_distance,
                        deviated = evaluation.deviated,
                        "Position"
                    );
                    if deviation_raised && args.auto_reroute {
                        match controller.reroute().await {
                            Ok(FetchOutcome::Applied) => info!("Rerouted"),
                            Ok(outcome) => info!(?outcome, "Reroute not applied"),
                            Err(e) => warn!("Reroute failed: {}", e),
                        }
                    }
                }
                Some(other) => info!(update = ?other, "Session update"),
                None => {}
            }
        }
    }

    controller.terminate(&device).await
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if args.live {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to build tokio runtime");
        if let Err(e) = runtime.block_on(run_live(&args)) {
            error!("Live session failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if !args.json {
        info!("Wayfinder Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!(
                "Available scenarios: {}, all",
                ScenarioId::all().iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
            );
            std::process::exit(1);
        })]
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed).with_steps(args.steps);

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
