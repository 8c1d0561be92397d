pub mod alarms;
pub mod audio;
pub mod commands;
pub mod engine;
pub mod service;
pub mod settings;
pub mod sync;
#[cfg(unix)]
pub mod trigger;
pub mod utils;

use clap::Parser;

use commands::Cli;

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    utils::logging::init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("softwake")
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    log::debug!("SoftWake starting up...");

    if let Err(err) = runtime.block_on(commands::run(cli.command)) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
