use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use aws_ssh_tunnel::TunnelError;

mod cli;

#[derive(Parser)]
#[command(name = "aws-ssh-tunnel")]
#[command(about = "SSH tunnels and sessions to private AWS instances via SSM Session Manager")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionArgs {
    /// Tag (format: KEY=VALUE) of the (jump) instance that will be used to
    /// set up the SSH (tunneling) session. Omit to use the tag stored in
    /// the local configuration.
    #[arg(short, long)]
    tag: Option<String>,

    /// AWS profile to assume for the session
    #[arg(long)]
    profile: Option<String>,

    /// AWS region to use for the session
    #[arg(long)]
    region: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set AWS configuration and check prerequisites
    Config {
        /// AWS region to use for tunneling sessions
        #[arg(long)]
        region: Option<String>,

        /// AWS profile to assume for tunneling sessions
        #[arg(long)]
        profile: Option<String>,

        /// Default tag (format: KEY=VALUE) identifying the jump instance
        #[arg(short, long)]
        tag: Option<String>,

        /// OS user on the jump instance
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Start a port forwarding session through a jump instance
    StartForwardingSession {
        #[command(flatten)]
        session: SessionArgs,

        /// Remote host endpoint to tunnel to, as seen from the jump
        /// instance. "localhost" tunnels to the instance itself.
        #[arg(short, long)]
        remote_host: Option<String>,

        /// The port on the remote host to forward traffic to
        #[arg(short, long, default_value_t = 22)]
        port: u16,

        /// The port on the local host to route traffic to. Defaults to the
        /// remote port; pass 0 to pick a random free port.
        #[arg(short, long)]
        local_port: Option<u16>,
    },

    /// Start an interactive SSH session on a jump instance
    StartSshSession {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // One cancellation token for the whole session; Ctrl-C fires it and
    // every blocking step unwinds through it
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let outcome = match cli.command {
        Commands::Config {
            region,
            profile,
            tag,
            user,
        } => cli::commands::config::execute(region, profile, tag, user)
            .await
            .map(|_| 0),

        Commands::StartForwardingSession {
            session,
            remote_host,
            port,
            local_port,
        } => {
            cli::commands::forward::execute(
                session.tag,
                session.profile,
                session.region,
                remote_host,
                port,
                local_port,
                cancel,
            )
            .await
        }

        Commands::StartSshSession { session } => {
            cli::commands::ssh::execute(session.tag, session.profile, session.region, cancel).await
        }
    };

    let code = match outcome {
        Ok(code) => code,
        Err(TunnelError::Cancelled) => {
            println!("\nClosing application...");
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    std::process::exit(code);
}
