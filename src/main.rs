mod msv_cache;
mod msv_config;
mod msv_controllers;
mod msv_geo;
mod msv_gui;
mod msv_maps;
mod msv_menu_state;
mod msv_models;
mod msv_tabs;
mod msv_views;
mod msv_wifi;

use anyhow::Context;
use clap::Parser;
use msv_config::{Args, ViewerConfig};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Set up panic hook for better error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n{}", "═".repeat(70));
        eprintln!("❌ APPLICATION PANIC");
        eprintln!("{}", "═".repeat(70));
        eprintln!("\nThe viewer encountered an unexpected error:");
        eprintln!("{}", panic_info);
        eprintln!("\n💡 Troubleshooting:");
        eprintln!("  • Check that the report location contains a valid index.json");
        eprintln!("  • Run with RUST_LOG=debug for details");
        eprintln!("\n{}", "═".repeat(70));
    }));

    let config = ViewerConfig::from_args(Args::parse());
    log::info!(
        "Starting viewer for {} (index: {}, settle delay: {:?})",
        config.report,
        config.index_file,
        config.settle_delay
    );

    match std::panic::catch_unwind(|| msv_gui::run_gui(config)) {
        Ok(result) => result
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("GUI terminated with an error"),
        Err(_) => {
            eprintln!("\n⚠️  Application terminated unexpectedly");
            std::process::exit(1);
        }
    }
}
