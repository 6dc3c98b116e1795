use std::env;
use std::error::Error;

use chrono::TimeDelta;
use dotenv::dotenv;
use tracing::{info, span, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::RoutingConfig;
use crate::distance::graph::LocationGraph;
use crate::distance::matrix::ShortestPathTable;
use crate::domain::directive::DirectiveParser;
use crate::domain::shipment::ShipmentRegistry;
use crate::domain::vehicle::Fleet;
use crate::error::RoutingError;
use crate::setup::init::setup;
use crate::solver::assignment::{AssignmentEngine, AssignmentOutcome};
use crate::solver::report::{print_snapshot, print_summary, DeliveryLog};
use crate::solver::simulator::Simulator;
use crate::utils::{format_clock, parse_clock};

fn init_tracing_and_env() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            fmt::layer()
                .with_span_events(fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE)
                .pretty(),
        )
        .init();

    dotenv().ok();
    Ok(())
}

/// State of the world once every shipment has been delivered.
#[derive(Debug)]
pub struct DispatchResult {
    pub registry: ShipmentRegistry,
    pub fleet: Fleet,
    pub outcome: AssignmentOutcome,
    pub finished_at: TimeDelta,
}

/// Precompute, assign, build routes and simulate the day for `registry` on `graph`.
pub fn dispatch(
    config: &RoutingConfig,
    graph: &LocationGraph,
    mut registry: ShipmentRegistry,
) -> Result<DispatchResult, RoutingError> {
    config.validate()?;

    let table = {
        let span = span!(Level::INFO, "precompute");
        let _guard = span.enter();
        ShortestPathTable::build(graph, config.distance_precision)?
    };
    info!(
        "Farthest location is {:.1} from {}",
        table.from(&config.depot)?.max_distance(),
        config.depot
    );

    let mut fleet = Fleet::new(
        config.vehicle_count,
        config.operator_count,
        config.vehicle_capacity,
        &config.depot,
        config.start_time,
    );

    let outcome = {
        let span = span!(Level::INFO, "assignment");
        let _guard = span.enter();
        AssignmentEngine::new(config).assign(&mut registry, &mut fleet)?
    };

    let finished_at = {
        let span = span!(Level::INFO, "simulation");
        let _guard = span.enter();
        Simulator::new(&table, config).run(&mut registry, &mut fleet)?
    };

    Ok(DispatchResult {
        registry,
        fleet,
        outcome,
        finished_at,
    })
}

/// Binary entry point. An optional first argument (`"10:30 am"`) prints a status snapshot at that time.
pub fn run() -> Result<(), Box<dyn Error>> {
    init_tracing_and_env()?;
    let config = RoutingConfig::from_env()?;
    let parser = DirectiveParser::default();

    let (graph, registry) = {
        let span = span!(Level::INFO, "setup");
        let _guard = span.enter();
        setup(&config, &parser)?
    };
    info!(
        "Dispatching {} shipments over {} locations with {} vehicles and {} operators",
        registry.len(),
        graph.len(),
        config.vehicle_count,
        config.operator_count
    );

    let result = dispatch(&config, &graph, registry)?;

    let log = DeliveryLog::collect(&result.registry, &result.fleet, result.finished_at);
    log.save_json(&config.report_json)?;
    log.save_status_csv(&config.report_csv)?;
    info!(
        "Saved delivery log to {} and status history to {}",
        config.report_json, config.report_csv
    );

    print_summary(&log);
    if let Some(time) = env::args().nth(1).and_then(|raw| parse_clock(&raw)) {
        info!("Snapshot requested at {}", format_clock(time));
        print_snapshot(&result.registry, &result.fleet, time);
    }
    Ok(())
}
