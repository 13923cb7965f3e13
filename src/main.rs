use std::fs;
use std::io;
use std::process::ExitCode;

use log::{error, info};
use structured_logger::json::new_writer;
use structured_logger::Builder;

use overpass_graph::{load_config, Overpass, Result};

const USAGE: &str = "usage: overpass-graph <config.json> <query-file>";

fn setup_logging() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stderr()))
        .init();
}

fn run(config_path: &str, query_path: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let query = fs::read(query_path)?;

    let client = Overpass::new(&config);
    let graph = client.query(&query)?;

    info!(
        nodes = graph.nodes().count(),
        ways = graph.ways().count(),
        relations = graph.relations().count();
        "Query finished"
    );
    match graph.bounds() {
        Ok(bounds) => {
            let (min_lat, min_lon) = (bounds.min_lat.to_string(), bounds.min_lon.to_string());
            let (max_lat, max_lon) = (bounds.max_lat.to_string(), bounds.max_lon.to_string());
            info!(
                min_lat = min_lat.as_str(),
                min_lon = min_lon.as_str(),
                max_lat = max_lat.as_str(),
                max_lon = max_lon.as_str();
                "Result bounds"
            );
        }
        Err(_) => info!("Result has no nodes"),
    }
    for remark in graph.remarks() {
        info!(remark = remark.as_str(); "Server remark");
    }
    Ok(())
}

fn main() -> ExitCode {
    setup_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [config_path, query_path] = args.as_slice() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    match run(config_path, query_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let msg = err.to_string();
            error!(err = msg.as_str(); "Query failed");
            ExitCode::FAILURE
        }
    }
}
