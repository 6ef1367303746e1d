// ABOUTME: CLI entry point for erp-table-sync
// ABOUTME: Parses commands and environment, builds the run configuration, routes to handlers

use clap::{Args, Parser, Subcommand, ValueEnum};
use erp_table_sync::catalog::Catalog;
use erp_table_sync::commands;
use erp_table_sync::config::{
    self, EndpointConfig, GatewayConfig, RunOptions, SyncConfig, TargetConfig,
};
use erp_table_sync::filters::TableSelection;
use erp_table_sync::migration::{ClearMode, ConflictPolicy};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "erp-table-sync")]
#[command(
    about = "Referentially safe full-table sync between ERP PostgreSQL databases",
    long_about = None
)]
struct Cli {
    /// TOML manifest declaring the tables to sync (defaults to the built-in ERP catalog)
    #[arg(long, global = true)]
    manifest: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    #[arg(long, env = "SOURCE_DB_HOST")]
    source_host: Option<String>,
    #[arg(long, env = "SOURCE_DB_PORT", default_value_t = config::DEFAULT_PORT)]
    source_port: u16,
    #[arg(long, env = "SOURCE_DB_USER")]
    source_user: Option<String>,
    #[arg(long, env = "SOURCE_DB_PASSWORD", hide_env_values = true)]
    source_password: Option<String>,
    #[arg(long, env = "SOURCE_DB_NAME")]
    source_name: Option<String>,
    #[arg(long, env = "SOURCE_DB_SCHEMA", default_value = config::DEFAULT_SCHEMA)]
    source_schema: String,
}

impl From<SourceArgs> for EndpointConfig {
    fn from(args: SourceArgs) -> Self {
        EndpointConfig {
            host: args.source_host,
            port: args.source_port,
            user: args.source_user,
            password: args.source_password,
            database: args.source_name,
            schema: args.source_schema,
        }
    }
}

#[derive(Args)]
struct TargetArgs {
    #[arg(long, env = "TARGET_DB_HOST")]
    target_host: Option<String>,
    #[arg(long, env = "TARGET_DB_PORT", default_value_t = config::DEFAULT_PORT)]
    target_port: u16,
    #[arg(long, env = "TARGET_DB_USER")]
    target_user: Option<String>,
    #[arg(long, env = "TARGET_DB_PASSWORD", hide_env_values = true)]
    target_password: Option<String>,
    #[arg(long, env = "TARGET_DB_NAME")]
    target_name: Option<String>,
    #[arg(long, env = "TARGET_DB_SCHEMA", default_value = config::DEFAULT_SCHEMA)]
    target_schema: String,
}

impl From<TargetArgs> for EndpointConfig {
    fn from(args: TargetArgs) -> Self {
        EndpointConfig {
            host: args.target_host,
            port: args.target_port,
            user: args.target_user,
            password: args.target_password,
            database: args.target_name,
            schema: args.target_schema,
        }
    }
}

#[derive(Args)]
struct SelectionArgs {
    /// Sync only these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    include_tables: Option<Vec<String>>,
    /// Skip these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude_tables: Option<Vec<String>>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ConflictArg {
    /// Keep source primary keys (OVERRIDING SYSTEM VALUE) and skip duplicates
    PreserveIdentity,
    /// Skip rows whose key already exists
    IgnoreDuplicates,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::PreserveIdentity => ConflictPolicy::PreserveIdentity,
            ConflictArg::IgnoreDuplicates => ConflictPolicy::IgnoreDuplicates,
        }
    }
}

#[derive(Args)]
struct TransferArgs {
    /// How inserts treat rows that already exist in the target
    #[arg(long, value_enum, default_value_t = ConflictArg::PreserveIdentity)]
    conflict: ConflictArg,
    /// Fail when no rows at all are extracted
    #[arg(long)]
    require_rows: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print apply and clear order for the catalog (no connection needed)
    Plan {
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Copy all rows from the source into the target database
    Copy {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        #[command(flatten)]
        transfer: TransferArgs,
        /// Empty target tables (children first) before copying
        #[arg(long)]
        clear: bool,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        /// Clear with plain DELETE instead of TRUNCATE ... CASCADE; fails on
        /// tables still referenced by rows outside the transfer set
        #[arg(long)]
        plain_delete: bool,
        /// Skip the row-count comparison after copying
        #[arg(long)]
        no_verify: bool,
        /// Leave serial/identity sequences untouched after copying
        #[arg(long)]
        no_reset_sequences: bool,
    },
    /// Send all rows as one SQL payload to the import gateway
    Push {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        #[command(flatten)]
        transfer: TransferArgs,
        #[arg(long = "gateway-url", env = "IMPORT_GATEWAY_URL")]
        gateway_url: String,
        #[arg(
            long = "gateway-token",
            env = "IMPORT_GATEWAY_TOKEN",
            hide_env_values = true
        )]
        gateway_token: Option<String>,
        /// Request timeout in seconds
        #[arg(long = "gateway-timeout", default_value_t = 300)]
        gateway_timeout: u64,
        /// Schema named in the generated statements
        #[arg(
            long = "target-schema",
            env = "TARGET_DB_SCHEMA",
            default_value = config::DEFAULT_SCHEMA
        )]
        target_schema: String,
    },
    /// Write all rows as one SQL payload to a file
    Export {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        #[command(flatten)]
        transfer: TransferArgs,
        /// Output .sql file
        #[arg(short, long)]
        output: PathBuf,
        /// Schema named in the generated statements
        #[arg(
            long = "target-schema",
            env = "TARGET_DB_SCHEMA",
            default_value = config::DEFAULT_SCHEMA
        )]
        target_schema: String,
    },
    /// Compare per-table row counts of source and target
    Verify {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        selection: SelectionArgs,
    },
}

fn load_catalog(manifest: Option<&str>, selection: SelectionArgs) -> anyhow::Result<Catalog> {
    let catalog = match manifest {
        Some(path) => config::load_catalog_from_file(path)?,
        None => Catalog::erp_default(),
    };
    let selection = TableSelection::new(selection.include_tables, selection.exclude_tables)?;
    if selection.is_empty() {
        return Ok(catalog);
    }

    let selected = catalog.select(&selection);
    if selected.is_empty() {
        anyhow::bail!("No declared tables match the table selection");
    }
    Ok(selected)
}

fn bundled_options(transfer: TransferArgs) -> RunOptions {
    RunOptions {
        conflict_policy: transfer.conflict.into(),
        require_rows: transfer.require_rows,
        verify: false,
        reset_sequences: false,
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let manifest = cli.manifest.as_deref();

    match cli.command {
        Commands::Plan { selection } => {
            let catalog = load_catalog(manifest, selection)?;
            commands::plan(&catalog)
        }
        Commands::Copy {
            source,
            target,
            selection,
            transfer,
            clear,
            yes,
            plain_delete,
            no_verify,
            no_reset_sequences,
        } => {
            let catalog = load_catalog(manifest, selection)?;
            let options = RunOptions {
                clear_target: clear,
                clear_mode: if plain_delete {
                    ClearMode::Delete
                } else {
                    ClearMode::Cascade
                },
                conflict_policy: transfer.conflict.into(),
                require_rows: transfer.require_rows,
                verify: !no_verify,
                reset_sequences: !no_reset_sequences,
            };
            let config = SyncConfig::new(source.into(), TargetConfig::Direct(target.into()))
                .with_options(options);
            commands::copy(config, catalog, yes).await
        }
        Commands::Push {
            source,
            selection,
            transfer,
            gateway_url,
            gateway_token,
            gateway_timeout,
            target_schema,
        } => {
            let catalog = load_catalog(manifest, selection)?;
            let mut gateway = GatewayConfig::new(gateway_url).with_token(gateway_token);
            gateway.timeout = Duration::from_secs(gateway_timeout);

            let mut config = SyncConfig::new(source.into(), TargetConfig::Gateway(gateway))
                .with_options(bundled_options(transfer));
            config.payload_schema = target_schema;
            commands::push(config, catalog).await
        }
        Commands::Export {
            source,
            selection,
            transfer,
            output,
            target_schema,
        } => {
            let catalog = load_catalog(manifest, selection)?;
            let mut config = SyncConfig::new(source.into(), TargetConfig::Export(output))
                .with_options(bundled_options(transfer));
            config.payload_schema = target_schema;
            commands::export(config, catalog).await
        }
        Commands::Verify {
            source,
            target,
            selection,
        } => {
            let catalog = load_catalog(manifest, selection)?;
            commands::verify(&source.into(), &target.into(), &catalog).await
        }
    }
}
