pub mod config;
pub mod contamination;
pub mod controller;
pub mod db;
pub mod export;
pub mod ingest;
pub mod intake;
pub mod jobs;
pub mod manifest;
pub mod reconcile;
pub mod schema;
pub mod state;
pub mod storage;
pub mod tasks;

#[cfg(test)]
mod tests;

use std::path::Path;

pub fn initialize_logging(log_dir: Option<&Path>) {
    use tracing::Level;
    use tracing_subscriber::{filter::Targets, prelude::*};

    let log_layer = tracing_subscriber::fmt::layer();

    match log_dir {
        None => {
            let dev_log_filter = Targets::new().with_target("genopipe", Level::DEBUG);
            let log_layer = log_layer.pretty().with_filter(dev_log_filter);

            tracing_subscriber::registry().with(log_layer).init();
        }
        Some(path) => {
            let log_writer = tracing_appender::rolling::daily(path, "genopipe.log");
            let prod_log_filter = Targets::new().with_target("genopipe", Level::INFO);
            let log_layer = log_layer
                .json()
                .with_writer(log_writer)
                .with_filter(prod_log_filter);

            tracing_subscriber::registry().with(log_layer).init();
        }
    }
}
