// originator: drives an ESL engine pool to a configured call rate and
// concurrency, recording per-call CDR metrics (§4.7).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use esl_core::client::OriginateRequest;
use esl_core::pool::Pool;
use originator::cdr::CdrStore;
use originator::config::{Cli, Command, DialConfig};
use originator::{Originator, OriginatorState, Params};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Command::Dial(args) => run_dial(args, cli.password).await,
        Command::Serve(args) => run_serve(args, cli.password).await,
        Command::ListApps => {
            println!("no plug-in apps are discoverable by this binary; register apps via the library API");
            0
        }
    };
    std::process::exit(exit_code);
}

async fn run_dial(args: originator::config::DialArgs, password: String) -> i32 {
    let config = match DialConfig::validate(args, password) {
        Ok(c) => c,
        Err(err) => {
            error!(%err, "invalid configuration");
            return 1;
        }
    };

    let pool = match Pool::connect(&config.hosts, &config.password).await {
        Ok(pool) => Arc::new(pool),
        Err(err) => {
            error!(%err, "failed to connect to any engine");
            return 2;
        }
    };

    let request = OriginateRequest {
        destination: config.destination.clone(),
        profile: config.profile.clone(),
        proxy: config.proxy.clone(),
        post_connect_app: config.app.clone(),
        codecs: None,
        originate_timeout: 30,
        custom_headers: Vec::new(),
    };

    let params = Params {
        rate: config.rate,
        limit: config.limit,
        max_offered: config.max_offered,
        duration: Duration::from_secs(config.duration_secs),
        period: Duration::from_secs(config.period_secs),
        autohangup: config.autohangup,
    };

    let cdr = Arc::new(CdrStore::new());
    let originator = Originator::new(pool.clone(), config.app.clone(), request, params, cdr.clone());

    if let Err(err) = originator.start().await {
        error!(%err, "failed to start originator");
        return 1;
    }

    info!(
        hosts = config.hosts.len(),
        rate = config.rate,
        limit = config.limit,
        max_offered = config.max_offered,
        "originator running; press Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("stop requested; draining in-flight calls");
                originator.stop().await;
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                if originator.state().await == OriginatorState::Stopped {
                    info!("originator reached a terminal state");
                    break;
                }
            }
        }
    }

    for (cause, count) in originator.failed_calls().await {
        info!(%cause, count, "failed calls by cause");
    }

    if let Some(path) = &config.metrics_file {
        if let Err(err) = cdr.write_csv(path) {
            error!(%err, path = %path.display(), "failed to write metrics file");
        } else {
            info!(path = %path.display(), rows = cdr.len(), "wrote CDR metrics");
        }
    }

    0
}

async fn run_serve(args: originator::config::ServeArgs, password: String) -> i32 {
    let hosts = match resolve_serve_hosts(&args.hosts) {
        Ok(hosts) => hosts,
        Err(err) => {
            error!(%err, "invalid configuration");
            return 1;
        }
    };

    let _pool = match Pool::connect(&hosts, &password).await {
        Ok(pool) => pool,
        Err(err) => {
            error!(%err, "failed to connect to any engine");
            return 2;
        }
    };

    info!(app = %args.app, "serving; press Ctrl-C to stop");
    let _ = tokio::signal::ctrl_c().await;
    0
}

fn resolve_serve_hosts(hosts: &[String]) -> Result<Vec<std::net::SocketAddr>, std::io::Error> {
    use std::net::ToSocketAddrs;
    let mut resolved = Vec::with_capacity(hosts.len());
    for host in hosts {
        let with_port = if host.contains(':') {
            host.clone()
        } else {
            format!("{host}:8021")
        };
        let addr = with_port
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"))?;
        resolved.push(addr);
    }
    Ok(resolved)
}
