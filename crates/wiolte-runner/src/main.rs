//! `wiolte`: talk to a Wio LTE module through a TCP serial bridge.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpStream;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wiolte_modem::SocketType;
use wiolte_runner::{RunnerConfig, RunnerResult, Session};

#[derive(Parser, Debug)]
#[command(name = "wiolte", about = "Drive a Wio LTE module through a UART bridge")]
struct Cli {
    /// YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UART bridge address, overriding the configuration file.
    #[arg(long)]
    bridge: Option<String>,

    /// Access point name, overriding the configuration file.
    #[arg(long)]
    apn: Option<String>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the module answers `AT`.
    Ping,
    /// Boot the module and print its identity and signal quality.
    Info,
    /// Register, activate the PDP context and print the local address.
    Activate,
    /// Resolve a host name with the module's DNS client.
    Resolve {
        host: String,
    },
    /// Send a message and print whatever comes back.
    Send {
        host: String,
        port: u16,
        message: String,
        /// Use UDP instead of TCP.
        #[arg(long)]
        udp: bool,
        /// Maximum reply size in bytes.
        #[arg(long, default_value_t = 1024)]
        reply_len: usize,
        /// Seconds to wait for the reply.
        #[arg(long, default_value_t = 10)]
        wait: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();
    wiolte_metrics::describe_metrics();

    let mut config = match RunnerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(bridge) = cli.bridge {
        config.bridge = bridge;
    }
    if let Some(apn) = cli.apn {
        config.access_point.apn = apn;
    }

    tokio::select! {
        result = run(cli.command, &config) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            ExitCode::from(130)
        }
    }
}

async fn run(command: Command, config: &RunnerConfig) -> RunnerResult<()> {
    let mut session = Session::connect(config).await?;
    let result = dispatch(command, &mut session).await;
    let finished = session.finish().await;
    result.and(finished)
}

async fn dispatch(command: Command, session: &mut Session<TcpStream>) -> RunnerResult<()> {
    match command {
        Command::Ping => {
            let alive = session.handle().ping().await?;
            println!("{}", if alive { "OK" } else { "no answer" });
        }
        Command::Info => {
            session.bring_up().await?;
            let status = session.interface().status().await?;
            let number = session.handle().phone_number().await?;
            println!("IMEI:    {}", status.imei.as_deref().unwrap_or("-"));
            println!("IMSI:    {}", status.imsi.as_deref().unwrap_or("-"));
            println!("Number:  {}", number.as_deref().unwrap_or("-"));
            match status.signal {
                Some(signal) => match signal.dbm() {
                    Some(dbm) => println!("Signal:  {} dBm (rssi {})", dbm, signal.rssi),
                    None => println!("Signal:  unknown"),
                },
                None => println!("Signal:  -"),
            }
        }
        Command::Activate => {
            session.attach().await?;
            let address = session.handle().local_address().await?;
            println!("Address: {}", address.as_deref().unwrap_or("-"));
        }
        Command::Resolve { host } => {
            session.attach().await?;
            for address in session.interface().resolve(&host, 0).await? {
                println!("{}", address.ip());
            }
        }
        Command::Send {
            host,
            port,
            message,
            udp,
            reply_len,
            wait,
        } => {
            session.attach().await?;
            let socket_type = if udp { SocketType::Udp } else { SocketType::Tcp };
            let reply = session
                .exchange(
                    &host,
                    port,
                    socket_type,
                    message.as_bytes(),
                    reply_len,
                    Duration::from_secs(wait),
                )
                .await?;
            println!("{}", String::from_utf8_lossy(&reply));
        }
    }
    Ok(())
}
