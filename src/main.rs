use anyhow::{Context, Result};
use census::config::{read_ignore_file, AppConfig};
use census::query;
use census::server::{
    get_socket_path, Daemon, Endpoint, QueryRequest, RemoteClient, Shutdown,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "census")]
#[command(about = "Take census of the files in one or more directories")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    query: QueryArgs,

    /// Log debug output to stderr
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Paths to search (default: current directory)
    roots: Vec<String>,

    /// Path(s) to search through, comma separated or repeated
    #[arg(short = 'p', long = "paths", value_delimiter = ',')]
    paths: Vec<String>,

    /// Directory names to skip, comma separated or repeated
    #[arg(short, long, value_delimiter = ',')]
    ignore: Vec<String>,

    /// File with directory names to skip, one per line
    #[arg(long)]
    ignore_file: Option<PathBuf>,

    /// Include hidden (dot) files and directories
    #[arg(short = 'H', long)]
    hidden: bool,

    /// Return directories only
    #[arg(short, long)]
    dir: bool,

    /// How many nested directories to index (-1 for unbounded)
    #[arg(short = 'D', long, default_value_t = -1, allow_negative_numbers = true)]
    depth: i32,

    /// Keep paths matching this regex (case insensitive)
    #[arg(short, long, default_value = "")]
    grep: String,

    /// Keep paths matching this regex (case sensitive)
    #[arg(short = 'G', long = "grep-case", default_value = "")]
    grep_case: String,

    /// Drop paths matching this regex (case insensitive)
    #[arg(short, long, default_value = "")]
    vgrep: String,

    /// Drop paths matching this regex (case sensitive)
    #[arg(short = 'V', long = "vgrep-case", default_value = "")]
    vgrep_case: String,

    /// Address of a remote census daemon to query instead of the local disk
    #[arg(long)]
    host: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the census daemon in the foreground, or stop a running one
    Server(ServerArgs),
}

#[derive(Args)]
struct ServerArgs {
    /// Address to listen on (or stop); `unix:<path>` for a socket file
    #[arg(short, long)]
    address: Option<String>,

    /// Port to listen on; binds 0.0.0.0
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen on a Unix socket (default path when no value is given)
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    unix: Option<String>,

    /// Stop the daemon at the address instead of starting one
    #[arg(long)]
    stop: bool,

    /// Concurrent connections handled at once (0 for unlimited)
    #[arg(long)]
    max_connections: Option<usize>,

    /// Per-connection timeout in seconds (0 to disable)
    #[arg(long)]
    timeout: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let daemon_mode = matches!(&cli.command, Some(Commands::Server(args)) if !args.stop);
    setup_logging(cli.verbose, daemon_mode);

    let config = AppConfig::load()?;

    match cli.command {
        Some(Commands::Server(args)) => run_server(args, &config),
        None => run_query(cli.query, &config),
    }
}

fn setup_logging(verbose: bool, daemon_mode: bool) {
    let default = if verbose {
        "census=debug,warn"
    } else if daemon_mode {
        "census=info,warn"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_query(args: QueryArgs, config: &AppConfig) -> Result<()> {
    let mut paths = args.paths;
    paths.extend(args.roots);
    if paths.is_empty() {
        let cwd = std::env::current_dir().context("could not load paths")?;
        paths.push(cwd.to_string_lossy().into_owned());
    }

    let mut ignore = args.ignore;
    if let Some(file) = &args.ignore_file {
        ignore.extend(read_ignore_file(file)?);
    }
    for name in &config.default_ignore {
        if !ignore.contains(name) {
            ignore.push(name.clone());
        }
    }

    let request = QueryRequest {
        depth: args.depth,
        dir_mode: args.dir,
        grep: args.grep,
        grep_case: args.grep_case,
        vgrep: args.vgrep,
        vgrep_case: args.vgrep_case,
        ignore_paths: ignore,
        show_hidden: args.hidden,
        paths,
        host: args.host.clone().unwrap_or_default(),
        stop_server: false,
    };

    let results = match args.host.filter(|h| !h.is_empty()) {
        Some(host) => RemoteClient::new(&host).query(&request)?,
        None => query::run(&request)?,
    };

    if !results.is_empty() {
        println!("{}", results);
    }
    Ok(())
}

fn server_endpoint(args: &ServerArgs, config: &AppConfig) -> Endpoint {
    if let Some(path) = &args.unix {
        if path.is_empty() {
            return Endpoint::Unix(get_socket_path());
        }
        return Endpoint::Unix(PathBuf::from(path));
    }
    if let Some(port) = args.port {
        return Endpoint::Tcp(format!("0.0.0.0:{}", port));
    }
    Endpoint::parse(args.address.as_deref().unwrap_or(&config.address))
}

fn run_server(args: ServerArgs, config: &AppConfig) -> Result<()> {
    let endpoint = server_endpoint(&args, config);

    if args.stop {
        let client = RemoteClient::new(&endpoint.to_string()).with_timeout(Some(Duration::from_secs(10)));
        client.stop()?;
        println!("host {} shut down", client.host());
        return Ok(());
    }

    let mut daemon_config = config.daemon_config();
    if let Some(max) = args.max_connections {
        daemon_config.max_connections = max;
    }
    if let Some(secs) = args.timeout {
        daemon_config.connection_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    let daemon = Daemon::bind(&endpoint, daemon_config)
        .with_context(|| format!("unable to start the daemon on {}", endpoint))?;

    // Setup signal handler for graceful shutdown
    let handle = daemon.shutdown_handle();
    ctrlc::set_handler(move || handle.trigger(Shutdown::Signal))
        .context("Failed to set signal handler")?;

    let reason = daemon.run()?;
    info!(?reason, "daemon stopped");
    Ok(())
}
