// Command-line and environment configuration
use crate::msv_menu_state::MenuState;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Viewer for exported mobility-sensing survey reports")]
pub struct Args {
    /// Report directory or http(s):// base URL
    #[arg(env = "MSV_REPORT", default_value = ".")]
    pub report: String,
    /// Report index file, relative to the report location
    #[arg(long, default_value = "index.json")]
    pub index: String,
    /// Delay before charts and maps are re-fitted after switching sections
    #[arg(long, default_value_t = 150)]
    pub settle_ms: u64,
    /// HTTP request timeout
    #[arg(long, default_value_t = 15)]
    pub timeout_secs: u64,
    /// Where sidebar menu state is kept (defaults to the user config dir)
    #[arg(long)]
    pub menu_state: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub report: String,
    pub index_file: String,
    pub settle_delay: Duration,
    pub request_timeout: Duration,
    pub menu_state_path: PathBuf,
}

impl ViewerConfig {
    pub fn from_args(args: Args) -> Self {
        Self {
            report: args.report,
            index_file: args.index,
            settle_delay: Duration::from_millis(args.settle_ms),
            request_timeout: Duration::from_secs(args.timeout_secs),
            menu_state_path: args.menu_state.unwrap_or_else(MenuState::default_path),
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            report: ".".to_string(),
            index_file: "index.json".to_string(),
            settle_delay: Duration::from_millis(150),
            request_timeout: Duration::from_secs(15),
            menu_state_path: MenuState::default_path(),
        }
    }
}
