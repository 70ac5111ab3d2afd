//! CLI module
//!
//! This module provides the command-line interface for the prompt-hierarchy tool.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;

use crate::{
    api::{serve, Client, ClientConfig, HttpClientImpl, ServerConfig},
    debounce::spawn_debounced_writer,
    models::ItemDescriptor,
    persist::decode_record,
    projection::{project, ProjectedNode},
    session::Core,
    settings::{JsonFileStore, SettingsStore},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(
        short,
        long,
        env = "PROMPT_HIERARCHY_SERVER",
        default_value = "http://localhost:3000"
    )]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the prompt-hierarchy API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Settings file holding every persisted tree
        #[arg(
            long,
            env = "PROMPT_HIERARCHY_SETTINGS",
            default_value = "prompt-hierarchy.json"
        )]
        settings: PathBuf,

        /// Quiet period before changes are written to the settings file
        #[arg(long, default_value_t = 500)]
        debounce_ms: u64,
    },

    /// List known contexts
    Contexts,

    /// Print a context's hierarchy
    Show {
        /// Context id
        context: String,
    },

    /// Report the host's current item list for a context
    Sync {
        /// Context id
        context: String,

        /// Item identifiers in host order
        ids: Vec<String>,
    },

    /// Switch the active context and report its item list
    Activate {
        /// Context id
        context: String,

        /// Item identifiers in host order
        ids: Vec<String>,
    },

    /// Move a node to a new position
    Move {
        /// Context id
        context: String,

        /// Node to move
        node: String,

        /// Destination index, counted after the node is taken out
        #[arg(long)]
        to: usize,

        /// Destination parent; top level when omitted
        #[arg(long)]
        parent: Option<String>,

        /// Current index of the node, used as a hint
        #[arg(long, default_value_t = 0)]
        from: usize,
    },

    /// Make a node the last child of another
    Nest {
        /// Context id
        context: String,

        /// Node to move
        node: String,

        /// New parent
        target: String,
    },

    /// Collapse or expand a node
    Toggle {
        /// Context id
        context: String,

        /// Node to toggle
        node: String,
    },

    /// Forget a context and its stored tree
    Evict {
        /// Context id
        context: String,
    },

    /// Show recent operations
    History,

    /// Validate every tree stored in a settings file without a server
    Check {
        /// Settings file to check
        path: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays clean
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    match &cli.command {
        Commands::Serve {
            port,
            settings,
            debounce_ms,
        } => {
            println!("Starting prompt-hierarchy API server on port {}...", port);

            let store: Arc<dyn SettingsStore> = Arc::new(JsonFileStore::new(settings.clone()));
            let core = Core::load(store.as_ref())?;
            let writer = spawn_debounced_writer(
                core.clone(),
                store.clone(),
                Duration::from_millis(*debounce_ms),
            );

            // Create a server configuration with the specified port
            let config = ServerConfig {
                address: ([127, 0, 0, 1], *port).into(),
            };

            tokio::select! {
                result = serve(core.clone(), config) => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
            }

            // Pending changes would otherwise be lost with the writer
            writer.abort();
            core.flush_to(store.as_ref())?;
            core.teardown();
            Ok(())
        }

        Commands::Contexts => {
            let client = create_client(&cli.server);
            let listing = client.list_contexts().await?;

            if listing.contexts.is_empty() {
                println!("No contexts yet.");
            }
            for context in &listing.contexts {
                if listing.active.as_ref() == Some(context) {
                    println!("{} {}", "*".green(), context.bold());
                } else {
                    println!("  {}", context);
                }
            }
            Ok(())
        }

        Commands::Show { context } => {
            let client = create_client(&cli.server);
            let rows = client.projection(context).await?;
            print_projection(context, &rows);
            Ok(())
        }

        Commands::Sync { context, ids } => {
            let client = create_client(&cli.server);
            let report = client.sync(context, descriptors(ids)).await?;
            println!(
                "Synced '{}': {} added, {} removed",
                context,
                report.added.len(),
                report.removed.len()
            );
            Ok(())
        }

        Commands::Activate { context, ids } => {
            let client = create_client(&cli.server);
            let report = client.activate(context, descriptors(ids)).await?;
            println!(
                "Activated '{}': {} added, {} removed",
                context,
                report.added.len(),
                report.removed.len()
            );
            Ok(())
        }

        Commands::Move {
            context,
            node,
            to,
            parent,
            from,
        } => {
            let client = create_client(&cli.server);
            client
                .move_node(context, node, *from, *to, parent.clone())
                .await?;
            println!(
                "Moved '{}' to index {} under {}",
                node,
                to,
                parent.as_deref().unwrap_or("the top level")
            );
            print_projection(context, &client.projection(context).await?);
            Ok(())
        }

        Commands::Nest {
            context,
            node,
            target,
        } => {
            let client = create_client(&cli.server);
            client.nest_node(context, node, target).await?;
            println!("Nested '{}' under '{}'", node, target);
            print_projection(context, &client.projection(context).await?);
            Ok(())
        }

        Commands::Toggle { context, node } => {
            let client = create_client(&cli.server);
            let toggled = client.toggle_collapse(context, node).await?;
            let state = if toggled.collapsed {
                "collapsed"
            } else {
                "expanded"
            };
            println!("'{}' is now {}", toggled.node, state);
            Ok(())
        }

        Commands::Evict { context } => {
            let client = create_client(&cli.server);
            client.evict(context).await?;
            println!("Evicted '{}'", context);
            Ok(())
        }

        Commands::History => {
            let client = create_client(&cli.server);
            for entry in client.history().await? {
                println!(
                    "{} {} {}",
                    entry.timestamp.format("%H:%M:%S").to_string().dimmed(),
                    entry.action.bold(),
                    entry.details.unwrap_or_default()
                );
            }
            Ok(())
        }

        Commands::Check { path } => check_settings_file(path),

        Commands::Completions { shell } => {
            // Generate completions for the specified shell
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn create_client(server_url: &str) -> HttpClientImpl {
    let config = ClientConfig {
        base_url: server_url.to_string(),
    };

    HttpClientImpl::with_config(config)
}

/// The CLI only knows identifiers, so they double as display names
fn descriptors(ids: &[String]) -> Vec<ItemDescriptor> {
    ids.iter()
        .map(|id| ItemDescriptor::new(id.clone(), id.clone()))
        .collect()
}

/// Formats one projected row with two spaces of indentation per level
fn format_row(node: &ProjectedNode) -> String {
    let indent = "  ".repeat(node.depth);
    let marker = match (node.has_children, node.collapsed) {
        (true, true) => "▸",
        (true, false) => "▾",
        (false, _) => "•",
    };

    let line = format!("{}{} {}", indent, marker, node.identifier);
    if !node.visible {
        line.dimmed().to_string()
    } else if node.has_children {
        line.bold().to_string()
    } else {
        line
    }
}

fn print_projection(context: &str, rows: &[ProjectedNode]) {
    println!("Hierarchy for '{}':", context);
    if rows.is_empty() {
        println!("  (empty)");
    }
    for row in rows {
        println!("{}", format_row(row));
    }
}

/// Validates each stored tree offline, failing if any is malformed
fn check_settings_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let settings = JsonFileStore::new(path).load()?;
    let mut malformed = 0;

    for (context, record) in &settings.prompt_hierarchy {
        match decode_record(record) {
            Ok(tree) => println!(
                "{} {} ({} nodes)",
                "ok".green(),
                context,
                project(&tree).len()
            ),
            Err(e) => {
                malformed += 1;
                println!("{} {}: {}", "malformed".red(), context, e);
            }
        }
    }

    if malformed > 0 {
        return Err(format!("{} malformed tree(s) in {}", malformed, path.display()).into());
    }
    Ok(())
}
