// quote-feed - L5 order book feed handler
//
// Usage: quote-feed [config-path]   (default: config/quote.json)

use std::env;
use std::process::ExitCode;
use tracing::error;

use feed_handler::core::{setup_logging, FeedConfig};
use feed_handler::handler::{install_signal_handlers, QuoteFeedHandler, Shutdown};
use feed_handler::net::{RestClient, TcpTickSink};

const DEFAULT_CONFIG: &str = "config/quote.json";

fn main() -> ExitCode {
    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    let config = match FeedConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config {}: {}", config_path, e);
            return ExitCode::FAILURE;
        }
    };

    setup_logging(&config.log_level, &config.log_file);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let shutdown = Shutdown::new();
        install_signal_handlers(&shutdown);

        let snapshots = match RestClient::new() {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Failed to build snapshot client");
                return ExitCode::FAILURE;
            }
        };

        let sink = match TcpTickSink::connect(&config.sink_host, config.sink_port).await {
            Ok(sink) => sink,
            Err(e) => {
                error!(
                    error = %e,
                    host = %config.sink_host,
                    port = config.sink_port,
                    "Tick sink unreachable"
                );
                return ExitCode::FAILURE;
            }
        };

        QuoteFeedHandler::new(&config, snapshots, sink, shutdown)
            .run()
            .await;
        ExitCode::SUCCESS
    })
}
