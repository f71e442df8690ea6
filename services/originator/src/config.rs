//! CLI surface and validated configuration (§6 External interfaces).
//!
//! There is no config file: every parameter arrives as a CLI flag or
//! environment variable, following the `RawConfig`/`Config` split so that
//! clap's permissive `Option<T>` parsing stays separate from the
//! validated, defaulted shape the rest of the crate consumes.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no hosts given")]
    NoHosts,
    #[error("could not resolve host {host:?}: {source}")]
    UnresolvableHost {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("--app is required")]
    MissingApp,
}

#[derive(Debug, Parser)]
#[command(name = "originator", author, version, about = "Drive an ESL engine pool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// ESL shared password. Falls back to `ESL_PASSWORD` if unset.
    #[arg(long, env = "ESL_PASSWORD", global = true, default_value = "ClueCon")]
    pub password: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the Originator against one or more engines.
    Dial(DialArgs),
    /// Run a Router-driven call-control service against one or more engines.
    Serve(ServeArgs),
    /// Enumerate apps discoverable in the current process (diagnostic).
    ListApps,
}

#[derive(Debug, Parser)]
pub struct DialArgs {
    /// `host:port` pairs, one per engine.
    pub hosts: Vec<String>,

    #[arg(long)]
    pub profile: Option<String>,

    #[arg(long)]
    pub proxy: Option<String>,

    /// Target new calls per second.
    #[arg(long, default_value_t = 1)]
    pub rate: u32,

    /// Maximum concurrent calls.
    #[arg(long, default_value_t = 1)]
    pub limit: u32,

    /// Total call count at which to stop originating.
    #[arg(long = "max-offered", default_value_t = u64::MAX)]
    pub max_offered: u64,

    /// Per-call hold time in seconds; auto-derived as `limit / rate` if unset.
    #[arg(long)]
    pub duration: Option<u64>,

    /// Pacing interval in seconds.
    #[arg(long, default_value_t = 1)]
    pub period: u64,

    /// Post-connect application the originated leg runs (e.g. `park`).
    #[arg(long)]
    pub app: Option<String>,

    /// Destination URI rendered for each originate (e.g. `sofia/gateway/1000`).
    #[arg(long, default_value = "sofia/default/9196")]
    pub destination: String,

    #[arg(long = "metrics-file")]
    pub metrics_file: Option<PathBuf>,

    /// Whether the Originator hangs up answered calls at `duration` itself.
    #[arg(long = "autohangup", default_value_t = true)]
    pub autohangup: bool,
}

#[derive(Debug, Parser)]
pub struct ServeArgs {
    pub hosts: Vec<String>,

    /// `module:router` identifier; opaque to the core, forwarded to the
    /// application loader.
    #[arg(long)]
    pub app: String,
}

/// Validated [`DialArgs`] (§4.7 Originator configuration).
#[derive(Debug, Clone)]
pub struct DialConfig {
    pub hosts: Vec<SocketAddr>,
    pub password: String,
    pub profile: Option<String>,
    pub proxy: Option<String>,
    pub rate: u32,
    pub limit: u32,
    pub max_offered: u64,
    pub duration_secs: u64,
    pub period_secs: u64,
    pub app: String,
    pub destination: String,
    pub metrics_file: Option<PathBuf>,
    pub autohangup: bool,
}

impl DialConfig {
    pub fn validate(args: DialArgs, password: String) -> Result<Self, ConfigError> {
        let hosts = resolve_hosts(&args.hosts)?;
        let app = args.app.ok_or(ConfigError::MissingApp)?;

        // §4.7: duration auto-derives as limit/rate when unset and rate > 0.
        let duration_secs = args
            .duration
            .unwrap_or_else(|| if args.rate == 0 { 0 } else { u64::from(args.limit) / u64::from(args.rate) });

        Ok(DialConfig {
            hosts,
            password,
            profile: args.profile,
            proxy: args.proxy,
            rate: args.rate,
            limit: args.limit,
            max_offered: args.max_offered,
            duration_secs,
            period_secs: args.period.max(1),
            app,
            destination: args.destination,
            metrics_file: args.metrics_file,
            autohangup: args.autohangup,
        })
    }
}

fn resolve_hosts(hosts: &[String]) -> Result<Vec<SocketAddr>, ConfigError> {
    if hosts.is_empty() {
        return Err(ConfigError::NoHosts);
    }
    let mut resolved = Vec::with_capacity(hosts.len());
    for host in hosts {
        let with_port = if host.contains(':') {
            host.clone()
        } else {
            format!("{host}:8021")
        };
        let addr = with_port
            .to_socket_addrs()
            .map_err(|source| ConfigError::UnresolvableHost {
                host: host.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| ConfigError::UnresolvableHost {
                host: host.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
            })?;
        resolved.push(addr);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_requires_an_app() {
        let args = DialArgs {
            hosts: vec!["127.0.0.1:8021".to_owned()],
            profile: None,
            proxy: None,
            rate: 10,
            limit: 100,
            max_offered: 1000,
            duration: None,
            period: 1,
            app: None,
            destination: "sofia/default/9196".to_owned(),
            metrics_file: None,
            autohangup: true,
        };
        assert!(matches!(
            DialConfig::validate(args, "ClueCon".to_owned()),
            Err(ConfigError::MissingApp)
        ));
    }

    #[test]
    fn duration_auto_derives_from_limit_over_rate() {
        let args = DialArgs {
            hosts: vec!["127.0.0.1:8021".to_owned()],
            profile: None,
            proxy: None,
            rate: 30,
            limit: 2000,
            max_offered: 100_000,
            duration: None,
            period: 1,
            app: Some("cdr".to_owned()),
            destination: "sofia/default/9196".to_owned(),
            metrics_file: None,
            autohangup: true,
        };
        let cfg = DialConfig::validate(args, "ClueCon".to_owned()).unwrap();
        assert_eq!(cfg.duration_secs, 2000 / 30);
    }

    #[test]
    fn rejects_empty_host_list() {
        let args = DialArgs {
            hosts: vec![],
            profile: None,
            proxy: None,
            rate: 1,
            limit: 1,
            max_offered: 1,
            duration: None,
            period: 1,
            app: Some("cdr".to_owned()),
            destination: "sofia/default/9196".to_owned(),
            metrics_file: None,
            autohangup: true,
        };
        assert!(matches!(
            DialConfig::validate(args, "ClueCon".to_owned()),
            Err(ConfigError::NoHosts)
        ));
    }
}
