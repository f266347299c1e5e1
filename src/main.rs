//! CLI entry point for `mailsink`.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use mailsink::config::{SinkConfig, Verbosity, normalize_listen_addr};
use mailsink::shutdown::{ShutdownCoordinator, spawn_signal_watcher};
use mailsink::sink::MailSink;
use mailsink::smtp::{ListenerHandle, ServerConfig, SmtpServer, load_tls_config};

#[derive(Parser)]
#[command(name = "mailsink", version, about = "SMTP sink for development and testing")]
struct Cli {
    /// Address to listen on
    #[arg(long, value_name = "ADDR", default_value = ":8025", env = "MAILSINK_LISTEN")]
    listen: String,

    /// Application name shown in the greeting and the Received header
    #[arg(long, value_name = "NAME", default_value = "smtpd", env = "MAILSINK_APPNAME")]
    appname: String,

    /// Server name announced to clients [default: host name]
    #[arg(long, value_name = "HOST", env = "MAILSINK_SERVERNAME")]
    servername: Option<String>,

    /// Socket read/write timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 300, env = "MAILSINK_TIMEOUT")]
    timeout: u64,

    /// Serve TLS from the first byte (needs --cert and --key)
    #[arg(long)]
    tlsonly: bool,

    /// Require STARTTLS before any mail transaction
    #[arg(long)]
    tlsrequired: bool,

    /// PEM certificate chain
    #[arg(long, value_name = "PATH", env = "MAILSINK_CERT")]
    cert: Option<PathBuf>,

    /// PEM private key
    #[arg(long, value_name = "PATH", env = "MAILSINK_KEY")]
    key: Option<PathBuf>,

    /// Log the SMTP conversation
    #[arg(long)]
    debug: bool,

    /// Largest accepted message in bytes (0 = unlimited)
    #[arg(long, value_name = "BYTES", default_value_t = 0, env = "MAILSINK_MAXSIZE")]
    maxsize: usize,

    /// Marker logged after the message with --full
    #[arg(long, value_name = "STR", default_value = "", env = "MAILSINK_DATAEND")]
    dataend: String,

    /// Do not log transactions
    #[arg(long)]
    quiet: bool,

    /// Log the whole message with each transaction
    #[arg(long)]
    full: bool,

    /// Save each message to a file named from this template (empty = don't save).
    ///
    /// %h: SHA-256 of the message after the Received header,
    /// %H: SHA-256 of the whole message,
    /// %s: seconds since the Unix epoch,
    /// %N: nanoseconds of the reception time (9 digits),
    /// %%: a literal %
    #[arg(long, value_name = "TEMPLATE", default_value = "", env = "MAILSINK_FILEFORMAT")]
    fileformat: String,

    /// Seconds to wait for open connections on shutdown
    #[arg(long, value_name = "SECS", default_value_t = 30, env = "MAILSINK_SHUTDOWN_TIMEOUT")]
    shutdown_timeout: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(if cli.debug { "debug" } else { "info" });

    let verbosity = Verbosity {
        quiet: cli.quiet,
        full: cli.full,
        debug: cli.debug,
        data_end: cli.dataend.clone(),
    };
    if verbosity.is_ambiguous() {
        warn!("more than one of --debug, --quiet and --full is set; --debug wins, then --quiet");
    }

    let tls = match (&cli.cert, &cli.key) {
        (Some(cert), Some(key)) => Some(load_tls(cert, key)?),
        (None, None) => None,
        _ => anyhow::bail!("--cert and --key must be given together"),
    };
    if cli.tlsonly && tls.is_none() {
        warn!("--tlsonly needs --cert and --key; serving plain SMTP");
    }

    let server_config = ServerConfig {
        appname: cli.appname.clone(),
        hostname: cli.servername.clone().unwrap_or_else(host_name),
        timeout: Duration::from_secs(cli.timeout),
        tls_listener: cli.tlsonly && tls.is_some(),
        tls_required: cli.tlsrequired,
        tls,
        max_size: cli.maxsize,
        debug: cli.debug,
    };

    let sink = MailSink::new(SinkConfig::new(&cli.fileformat, verbosity));
    let server = SmtpServer::new(server_config, Arc::new(sink));

    let addr = normalize_listen_addr(&cli.listen);
    let listener = TcpListener::bind(&addr).with_context(|| format!("cannot listen on {addr}"))?;
    let handle = Arc::new(ListenerHandle::new(&listener).context("cannot read listener address")?);

    let coordinator = Arc::new(ShutdownCoordinator::new());
    spawn_signal_watcher(Arc::clone(&coordinator), server.clone(), Arc::clone(&handle))
        .context("cannot start signal watcher")?;

    info!(
        addr = %handle.local_addr(),
        hostname = %server.config().hostname,
        fileformat = %cli.fileformat,
        "mailsink started"
    );

    let result = server.serve(listener, &handle);
    if let Err(e) = coordinator.finish(result, &server, Duration::from_secs(cli.shutdown_timeout)) {
        error!(error = %e, "server stopped unexpectedly");
        return Err(e).context("accept loop terminated");
    }
    Ok(())
}

fn load_tls(cert: &Path, key: &Path) -> anyhow::Result<Arc<rustls::ServerConfig>> {
    load_tls_config(cert, key).context("cannot load TLS certificate and key")
}

/// The kernel host name, then `$HOSTNAME`, then `localhost`.
fn host_name() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|name| !name.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Set up tracing on stderr; `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
