mod connect;
mod host;

use connect::*;
use host::*;

use clap::{Parser, Subcommand};

#[derive(Parser, Clone)]
pub struct Cli {
	#[command(flatten)]
	log: ocs_native::Log,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
	/// Join a session and drive it from a frame loop, sending synthetic input.
	Connect {
		/// The transport configuration.
		#[command(flatten)]
		config: ocs_native::ClientConfig,

		#[command(flatten)]
		args: ConnectArgs,
	},

	/// Run a loopback host that reflects input to the other members of a subgroup.
	Host {
		#[command(flatten)]
		config: ocs_native::ServerConfig,

		#[command(flatten)]
		args: HostArgs,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	cli.log.init();

	match cli.command {
		Command::Connect { config, args } => connect(config, args).await,
		Command::Host { config, args } => host(config, args).await,
	}
}
