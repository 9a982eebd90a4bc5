mod app;
mod config;
mod elements;
mod export;
mod heatmap;
mod panel;
mod platform;
mod render;
mod session;
mod store;

use clap::Parser;

fn main() {
    env_logger::init();
    let cli = config::Cli::parse();
    log::info!("cursorheat starting up (page {})", cli.page);

    if let Err(e) = app::run(cli) {
        log::error!("Fatal error: {e}");
        std::process::exit(1);
    }
}
