use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use system_pulse::sampler::AppAggregate;
use system_pulse::snapshot::SnapshotFilter;

#[derive(Parser)]
#[command(
    name = "system-pulse",
    about = "Per-application process and connection dashboard",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (defaults: $SYSTEM_PULSE_CONFIG, /etc/system-pulse)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (HTTP API + cache maintenance)
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Take one live snapshot of all applications
    Snapshot {
        /// Minimum summed CPU percent
        #[arg(long, default_value_t = 0.0)]
        min_cpu: f64,

        /// Minimum summed memory in MB
        #[arg(long, default_value_t = 0.0)]
        min_memory: f64,

        /// Case-insensitive substring of the application name
        #[arg(long, default_value = "")]
        search: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show one page of the ranked dashboard
    Top {
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn print_table(apps: &[AppAggregate]) {
    println!(
        "{:<28} | {:>7} | {:>8} | {:>10} | {:>4} | {:>4} | Score",
        "Application", "PID", "CPU %", "Memory MB", "In", "Out"
    );
    println!(
        "{:-<28}-|-{:-<7}-|-{:-<8}-|-{:-<10}-|-{:-<4}-|-{:-<4}-|-{:-<6}",
        "", "", "", "", "", "", ""
    );
    for app in apps {
        println!(
            "{:<28} | {:>7} | {:>8.1} | {:>10.1} | {:>4} | {:>4} | {:.1}",
            app.name,
            app.representative_pid,
            app.cpu_percent,
            app.memory_mb,
            app.incoming_count,
            app.outgoing_count,
            app.relevance_score
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = system_pulse::resolve_config(cli.config.as_deref())?;
    system_pulse::init_logging(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting System Pulse daemon");
            system_pulse::serve(config).await?;
        }
        Commands::Snapshot {
            min_cpu,
            min_memory,
            search,
            json,
        } => {
            let service = system_pulse::build_service(&config);
            // CPU usage is a delta between two refreshes.
            tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;

            let filter = SnapshotFilter {
                min_cpu,
                min_memory,
                search,
            };
            let view = service.get_snapshot(&filter).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!(
                    "\n{} of {} applications match\n",
                    view.filtered, view.total
                );
                print_table(&view.processes);
                println!();
            }
        }
        Commands::Top { page, json } => {
            let service = system_pulse::build_service(&config);
            tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;

            let page = service.get_dashboard_page(page).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                println!(
                    "\nPage {} ({} applications total)\n",
                    page.page, page.total_items
                );
                print_table(&page.items);
                if page.has_more {
                    println!("\n(more on page {})", page.page + 1);
                }
                println!();
            }
        }
    }

    Ok(())
}
