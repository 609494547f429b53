//! relaymux - relay board server
//!
//! This is the main entry point for the relay server. It parses flags, sets
//! up logging, opens the relay driver and runs the event loop until SIGINT
//! or SIGTERM.

use clap::Parser;
use relaymux::config::ServerConfig;
use relaymux::server::Server;
use relaymux::telemetry::Telemetry;
use tracing::{error, info};

fn print_banner(config: &ServerConfig, telemetry: &Telemetry) {
    // With a log file the terminal only gets the banner
    println!(
        r#"
relaymux v{} - 4-Channel Relay Server
──────────────────────────────────────
Listening on {} ({:?} driver)
Use Ctrl+C to shutdown gracefully.
"#,
        relaymux::VERSION,
        config.bind_address(),
        config.driver.kind,
    );
    if telemetry.log_to_file() {
        if let Some(path) = &config.log.log_file {
            println!("Logging to {}", path.display());
        }
    }
}

fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    let telemetry = Telemetry::init(&config.log)?;

    let mut server = match Server::setup_with_signals(&config, telemetry.clone()) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start server");
            telemetry.flush();
            return Err(e.into());
        }
    };

    print_banner(&config, &telemetry);

    let result = server.run();
    server.shutdown();

    if let Err(e) = &result {
        error!(error = %e, "Event loop failed");
    }
    info!("Server shutdown complete");
    telemetry.flush();
    result.map_err(Into::into)
}
