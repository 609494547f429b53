//! relayctl - command-line client for the relay server.
//!
//! ```text
//! relayctl --status
//! relayctl 3 on
//! relayctl --host relay-pi --port 65432 1 off
//! ```

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use relaymux::client::{query, Request};
use relaymux::protocol::{RelayIndex, RelayState};
use relaymux::{DEFAULT_HOST, DEFAULT_PORT};

/// Control and query the state of relays on a relay server.
#[derive(Debug, Parser)]
#[command(name = "relayctl", version)]
struct Cli {
    /// Relay number (1-4), required unless querying status
    #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
    relay_num: Option<u8>,

    /// State to set the relay to, required unless querying status
    #[arg(value_enum)]
    state: Option<RelayState>,

    /// The host of the relay server
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// The port of the relay server
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Query the current relay states
    #[arg(short, long)]
    status: bool,
}

impl Cli {
    /// Turns the parsed arguments into a request, enforcing the argument
    /// combinations clap cannot express on its own.
    fn request(&self) -> Result<Request, clap::Error> {
        if self.status {
            if self.relay_num.is_some() || self.state.is_some() {
                return Err(Cli::command().error(
                    ErrorKind::ArgumentConflict,
                    "No other arguments are required when querying status.",
                ));
            }
            return Ok(Request::Status);
        }

        let missing = || {
            Cli::command().error(
                ErrorKind::MissingRequiredArgument,
                "Both relay_num and state are required for setting a relay.",
            )
        };
        let num = self.relay_num.ok_or_else(missing)?;
        let state = self.state.ok_or_else(missing)?;
        let index = RelayIndex::try_from(num).map_err(|e| {
            Cli::command().error(ErrorKind::ValueValidation, e.to_string())
        })?;

        Ok(Request::Set { index, state })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let request = cli.request().unwrap_or_else(|e| e.exit());

    let response = query(&cli.host, cli.port, &request).await?;
    println!("{}", response);
    Ok(())
}
