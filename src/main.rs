use std::thread;

use clap::Parser;
use env_logger::{
    Builder,
    Env,
};
use griddy_exporter::{
    Config,
    Error,
    PriceCollector,
};
use log::{
    debug,
    error,
    info,
    warn,
};

/// Export GoGriddy electricity prices as prometheus metrics.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Turn on debugging output
    #[arg(short, long)]
    debug: bool,

    /// Turn on program status information output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // RUST_LOG still takes precedence over the flags.
    Builder::from_env(Env::default().default_filter_or(cli.log_level())).init();

    if let Err(err) = run() {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Error> {
    match dotenvy::dotenv() {
        Ok(path) => info!("loaded environment from {}", path.display()),
        Err(err) if err.not_found() => {}
        Err(err) => warn!("can not load .env file: {err}"),
    }

    let config = Config::from_env()?;
    let collector = PriceCollector::new(&config)?;

    let exporter = griddy_exporter::start(config.listen_addr(), collector)?;

    // Scrapes drive collection, the interval only paces this liveness check.
    loop {
        thread::sleep(config.collection_interval);

        if !exporter.is_running() {
            return Err(Error::ServerStopped);
        }

        debug!("exporter is still serving");
    }
}
