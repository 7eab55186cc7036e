mod cmd_settings;
mod platform;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use platform::logging::{self, LogDestination};
use platform::settings::resolve_dir;

#[derive(Parser)]
#[command(
    name = "watcher",
    version,
    about = "Watch store pages and reserve watched items when they come in stock"
)]
struct Cli {
    /// Settings directory (default: the platform config dir)
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch a page until interrupted
    Run {
        /// Site root, overriding site.ron
        #[arg(long)]
        base_url: Option<String>,
        /// Page to watch (default: the first watchlist entry)
        #[arg(long)]
        path: Option<String>,
        /// Treat the watcher as visible: reload only if refreshWhileActive is set
        #[arg(long)]
        foreground: bool,
        /// Also log to watcher.log in the settings directory
        #[arg(long)]
        log_file: bool,
    },
    #[command(flatten)]
    Settings(cmd_settings::SettingsCmd),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let dir = resolve_dir(cli.settings_dir);

    match cli.cmd {
        Command::Run {
            base_url,
            path,
            foreground,
            log_file,
        } => platform::run_app(platform::RunOptions {
            settings_dir: dir,
            base_url,
            path,
            foreground,
            log_file,
        }),
        Command::Settings(cmd) => {
            logging::initialize(LogDestination::Terminal, 1);
            cmd_settings::run(cmd, &dir)
        }
    }
}
