use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use cosmoform::{
    AggregateRequest, BulkOptions, BulkProgress, ClientConfig, ContainerSchema, CosmoClient,
    DeleteManyOptions, Filter, FindManyArgs, SchemaSet, Scope,
};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cosmoform")]
#[command(about = "Query, aggregate and bulk-edit a document database", long_about = None)]
struct Cli {
    /// TOML config file (otherwise COSMOFORM_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured database
    #[arg(short, long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the database is reachable
    Ping,
    /// List containers and their partition keys
    Containers,
    /// Compare a schema file against the live database
    Verify {
        schema: PathBuf,
        /// Create missing containers
        #[arg(long)]
        create: bool,
    },
    /// Run a row query
    Query {
        container: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        take: Option<u64>,
        #[arg(long)]
        skip: Option<u64>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Count matching documents
    Count {
        container: String,
        #[arg(long)]
        filter: Option<String>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Run an aggregate request, e.g. '{"_count": true, "_avg": {"age": true}}'
    Aggregate {
        container: String,
        #[arg(long)]
        request: String,
        #[arg(long)]
        filter: Option<String>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Delete every matching document
    DeleteMany {
        container: String,
        #[arg(long)]
        filter: Option<String>,
        /// Required to delete anything
        #[arg(long)]
        confirm: bool,
        /// Only report how many documents match
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        continue_on_error: bool,
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

#[derive(Args, Debug)]
struct ScopeArgs {
    /// Partition key value (JSON, or a bare string)
    #[arg(long)]
    pk: Option<String>,

    /// Allow queries to fan out over every partition
    #[arg(long)]
    cross_partition: bool,
}

impl ScopeArgs {
    fn partition_key(&self) -> Option<Value> {
        self.pk
            .as_deref()
            .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
    }

    fn scope(&self) -> Scope {
        Scope {
            partition_key: self.partition_key(),
            enable_cross_partition: self.cross_partition,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cosmoform=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::from_env().context("reading COSMOFORM_* environment")?,
    };
    if let Some(database) = cli.database {
        config.database = database;
    }
    let client = CosmoClient::from_config(config)?;

    match cli.command {
        Command::Ping => {
            client.ping().await?;
            println!("ok");
        }
        Command::Containers => {
            for info in client.database().list_containers().await? {
                println!(
                    "{}\t{}",
                    info.id,
                    info.partition_key.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Verify { schema, create } => {
            let schemas = SchemaSet::from_file(&schema)?;
            let database = client.database();
            if create {
                for container in &schemas.containers {
                    database.create_container_if_not_exists(container).await?;
                }
            }
            let report = database.verify(&schemas).await?;
            print_json(&report)?;
            if !report.is_clean() {
                bail!("database does not match {}", schema.display());
            }
        }
        Command::Query {
            container,
            filter,
            take,
            skip,
            scope,
        } => {
            let handle = client.container::<Value>(resolve_schema(&client, &container).await?);
            let mut args = FindManyArgs::new(parse_filter(filter.as_deref())?).scope(scope.scope());
            if let Some(take) = take {
                args = args.take(take);
            }
            if let Some(skip) = skip {
                args = args.skip(skip);
            }
            print_json(&handle.find_many(args).await?)?;
        }
        Command::Count {
            container,
            filter,
            scope,
        } => {
            let handle = client.container::<Value>(resolve_schema(&client, &container).await?);
            let count = handle
                .count(&parse_filter(filter.as_deref())?, &scope.scope())
                .await?;
            println!("{}", count);
        }
        Command::Aggregate {
            container,
            request,
            filter,
            scope,
        } => {
            let request: Value = serde_json::from_str(&request).context("--request is not JSON")?;
            let request = AggregateRequest::from_json(&request)?;
            let handle = client.container::<Value>(resolve_schema(&client, &container).await?);
            let result = handle
                .aggregate(&parse_filter(filter.as_deref())?, &request, &scope.scope())
                .await?;
            print_json(&result.to_value())?;
        }
        Command::DeleteMany {
            container,
            filter,
            confirm,
            dry_run,
            continue_on_error,
            scope,
        } => {
            let observer = Arc::new(|p: &BulkProgress| {
                eprintln!(
                    "{}/{} ({:.1}%) failed={} RU={:.2}",
                    p.processed, p.total, p.percentage, p.failed, p.request_charge
                );
            });
            let client = client.with_progress_observer(observer);
            let handle = client.container::<Value>(resolve_schema(&client, &container).await?);

            let mut options = BulkOptions::new().continue_on_error(continue_on_error);
            options.partition_key = scope.partition_key();
            options.enable_cross_partition = scope.cross_partition;
            if dry_run {
                options = options.dry_run();
            }
            let report = handle
                .delete_many(
                    DeleteManyOptions::new(parse_filter(filter.as_deref())?)
                        .confirm(confirm)
                        .with(options),
                )
                .await?;
            print_json(&report)?;
        }
    }

    Ok(())
}

/// Schema for a live container, using its actual partition key path.
async fn resolve_schema(client: &CosmoClient, name: &str) -> anyhow::Result<ContainerSchema> {
    let containers = client.database().list_containers().await?;
    let info = containers
        .into_iter()
        .find(|c| c.id == name)
        .with_context(|| format!("container '{}' not found", name))?;
    let partition_key = info.partition_key.unwrap_or_else(|| "/id".to_string());
    Ok(ContainerSchema::new(name, &partition_key))
}

fn parse_filter(raw: Option<&str>) -> anyhow::Result<Filter> {
    match raw {
        None => Ok(Filter::new()),
        Some(raw) => {
            let value: Value = serde_json::from_str(raw).context("--filter is not JSON")?;
            Ok(Filter::from_json(&value)?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
