//! permweave CLI
//!
//! Read-only inspection of a permission graph file.

use clap::{Parser, Subcommand};
use permweave::{
    PermissionService,
    config::{AppConfig, LogFormat, load_config},
    graph::JsonFileStore,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// permweave - hierarchical permission resolution
#[derive(Parser, Debug)]
#[command(name = "permweave")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "PERMWEAVE_CONFIG")]
    config: Option<String>,

    /// Path to the permission graph file (overrides store.path)
    #[arg(short, long, env = "PERMWEAVE_GRAPH")]
    graph: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PERMWEAVE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Test whether a user holds a permission node (exit code 1 when denied)
    Check {
        /// User id or last-seen username
        user: String,
        /// Permission node, e.g. server.fly
        node: String,
        /// Print the full resolution as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a user's groups, direct permissions and display attributes
    User {
        /// User id or last-seen username
        user: String,
    },
    /// Show a group's permissions, parents and attributes
    Group {
        /// Group id
        group: String,
    },
    /// List all groups with their priority
    Groups,
}

fn init_logging(config: &AppConfig, level_override: Option<&str>) {
    let level = level_override.unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

/// Accept either a user id or a username
fn resolve_user(service: &PermissionService, user: &str) -> String {
    service
        .user_id_by_name(user)
        .unwrap_or_else(|| user.to_string())
}

fn print_list(title: &str, items: &[String]) {
    println!("{title}:");
    if items.is_empty() {
        println!("  (none)");
    }
    for item in items {
        println!("  - {item}");
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(path) = &args.graph {
        config.store.path = path.clone();
    }
    init_logging(&config, args.log_level.as_deref());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        graph = %config.store.path,
        "Starting permweave"
    );

    let store = Arc::new(JsonFileStore::new(config.store.expanded_path()));
    let service = PermissionService::load(store, &config.cache)
        .inspect_err(|e| error!(error = %e, "Failed to load permission graph"))?;

    match args.command {
        Command::Check { user, node, json } => {
            let user_id = resolve_user(&service, &user);
            let resolution = service.explain(&user_id, &node);
            if json {
                println!("{}", serde_json::to_string_pretty(&resolution)?);
            } else if resolution.allowed {
                println!("'{user}' HAS permission '{node}'");
            } else {
                println!("'{user}' DOES NOT have permission '{node}'");
            }
            return Ok(if resolution.allowed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            });
        }
        Command::User { user } => {
            let user_id = resolve_user(&service, &user);
            let (groups, permissions) = service.with_graph(|graph| {
                graph
                    .user(&user_id)
                    .map(|u| (u.groups.clone(), u.permissions.clone()))
                    .unwrap_or_default()
            });

            println!("User: {user_id}");
            print_list("Groups", &groups);
            print_list("Inherited groups", &service.inherited_groups(&user_id));
            print_list("Direct permissions", &permissions);
            println!(
                "Effective group: {}",
                service.effective_group(&user_id).unwrap_or_default()
            );
            println!("Prefix: {:?}", service.user_prefix(&user_id));
            println!("Suffix: {:?}", service.user_suffix(&user_id));
        }
        Command::Group { group } => {
            let Some(data) = service.with_graph(|graph| graph.group(&group).cloned()) else {
                eprintln!("Group '{group}' does not exist!");
                return Ok(ExitCode::from(2));
            };

            println!("Group: {group}");
            println!("Priority: {}", data.priority);
            print_list("Permissions", &data.permissions);
            print_list("Parents", &data.parents);
            println!("Prefix: {:?}", data.prefix);
            println!("Suffix: {:?}", data.suffix);
        }
        Command::Groups => {
            let listing: Vec<(String, i32)> = service.with_graph(|graph| {
                graph
                    .groups()
                    .iter()
                    .map(|(id, group)| (id.clone(), group.priority))
                    .collect()
            });
            let default_group = service.with_graph(|graph| graph.default_group_id().to_string());

            for (id, priority) in listing {
                let marker = if id == default_group { " (default)" } else { "" };
                println!("{id} (priority: {priority}){marker}");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
