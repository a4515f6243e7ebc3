use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gridline_client::{
    ClientConfig, FetchOutcome, GridController, GridOptions, GridServices, NoopHost,
};
use gridline_core::{
    ColumnDef, ExportFormat, FilterDescriptor, FilterOperator, SortDescriptor, SortDirection,
};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "gridline-cli", version, about = "Exercise a Gridline tabular endpoint")]
struct Cli {
    /// Base URL of the backend
    #[arg(long, env = "GRIDLINE_BASE_URL", default_value = "http://127.0.0.1:3000", global = true)]
    base_url: String,

    /// User id sent as X-User-Id
    #[arg(long, env = "GRIDLINE_USER_ID", global = true)]
    user: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    timeout: u64,

    #[arg(short = 'o', long = "output", value_enum, default_value_t = Output::Human, global = true)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Format {
    Csv,
    Pdf,
}

impl From<Format> for ExportFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Csv => ExportFormat::Csv,
            Format::Pdf => ExportFormat::Pdf,
        }
    }
}

/// Query flags shared by `query` and `export`.
#[derive(clap::Args, Debug)]
struct QueryArgs {
    /// Tabular endpoint, e.g. /api/leads
    #[arg(long)]
    endpoint: String,

    /// Table name used for saved views and export file names
    #[arg(long)]
    table: String,

    /// Column keys to request, comma-separated
    #[arg(long, value_delimiter = ',', required = true)]
    columns: Vec<String>,

    /// Sort as `field` or `field:desc`; repeat for multi-sort
    #[arg(long = "sort")]
    sorts: Vec<SortArg>,

    /// Filter as `field:operator:value`; value is parsed as JSON when possible
    #[arg(long = "filter")]
    filters: Vec<FilterArg>,

    #[arg(long, default_value = "")]
    search: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch one page and print its rows
    Query {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long = "page-size", default_value_t = 25)]
        page_size: u32,
    },
    /// Download the full result set as CSV or PDF
    Export {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,
        /// Directory the file is written into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// List saved views for a table
    Views {
        #[arg(long)]
        table: String,
    },
}

#[derive(Debug, Clone)]
struct SortArg(SortDescriptor);

impl FromStr for SortArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match s.split_once(':') {
            None => (s, SortDirection::Asc),
            Some((field, "asc")) => (field, SortDirection::Asc),
            Some((field, "desc")) => (field, SortDirection::Desc),
            Some((_, other)) => return Err(format!("unknown sort direction: {other}")),
        };
        if field.is_empty() {
            return Err("sort field must not be empty".to_string());
        }
        Ok(Self(SortDescriptor {
            field: field.to_string(),
            direction,
        }))
    }
}

#[derive(Debug, Clone)]
struct FilterArg(FilterDescriptor);

impl FromStr for FilterArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let field = parts.next().unwrap_or_default();
        let op = parts.next().ok_or("expected field:operator[:value]")?;
        let operator: FilterOperator =
            serde_json::from_value(serde_json::Value::String(op.to_string()))
                .map_err(|_| format!("unknown filter operator: {op}"))?;
        let value = match parts.next() {
            Some(raw) => serde_json::from_str(raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
            None if operator.is_unary() => serde_json::Value::Null,
            None => return Err(format!("operator {op} needs a value")),
        };
        Ok(Self(FilterDescriptor::new(field, operator, value)))
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("GRIDLINE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn client_config(cli: &Cli, download_dir: Option<PathBuf>) -> ClientConfig {
    let mut config = ClientConfig {
        base_url: cli.base_url.clone(),
        user_id: cli.user.clone(),
        request_timeout: Duration::from_secs(cli.timeout),
        ..ClientConfig::default()
    };
    if let Some(dir) = download_dir {
        config.download_dir = dir;
    }
    config
}

async fn controller(
    config: &ClientConfig,
    query: &QueryArgs,
    page_size: u32,
) -> Result<GridController> {
    let columns = query.columns.iter().map(|k| ColumnDef::new(k, k)).collect();
    let mut options = GridOptions::new(&query.endpoint, &query.table, columns);
    options.default_page_size = page_size;
    options.enable_multi_sort = true;
    options.enable_saved_views = false;
    options.default_sort = query.sorts.iter().map(|s| s.0.clone()).collect();
    options.strict = true;
    let services = GridServices::http(config, Arc::new(NoopHost))?;
    let grid = GridController::new(options, services, config)?;

    if !query.filters.is_empty() {
        grid.set_filters(query.filters.iter().map(|f| f.0.clone()).collect())
            .await;
    }
    if !query.search.is_empty() {
        grid.set_search(&query.search).await;
    }
    debug!(state = ?grid.state(), "query state prepared");
    Ok(grid)
}

async fn run_query(cli: &Cli, query: &QueryArgs, page: u32, page_size: u32) -> Result<()> {
    let config = client_config(cli, None);
    let grid = controller(&config, query, page_size).await?;
    if page > 1 {
        grid.set_page(page).await;
    }
    if let FetchOutcome::Failed(e) = grid.refresh().await {
        bail!("query failed: {e}");
    }
    let snapshot = grid.fetch_status();
    let Some(resp) = snapshot.data else {
        bail!("no data returned");
    };

    match cli.output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&*resp)?),
        Output::Human => {
            let view = grid.view();
            let labels: Vec<&str> = view.headers.iter().map(|h| h.label.as_str()).collect();
            println!("{}", labels.join("\t"));
            for row in &view.rows {
                let cells: Vec<String> = row.cells.iter().map(gridline_core::Cell::text).collect();
                println!("{}", cells.join("\t"));
            }
            println!(
                "page {} of {} ({} rows)",
                resp.page, resp.total_pages, resp.total_count
            );
        }
    }
    Ok(())
}

async fn run_export(cli: &Cli, query: &QueryArgs, format: Format, out: PathBuf) -> Result<()> {
    let config = client_config(cli, Some(out));
    let grid = controller(&config, query, 25).await?;
    let format = ExportFormat::from(format);
    let receipt = grid
        .export(format)
        .await
        .with_context(|| format!("exporting {} as {format}", query.table))?;
    info!(path = %receipt.path.display(), "export written");
    match cli.output {
        Output::Json => println!(
            "{}",
            serde_json::json!({
                "format": receipt.format,
                "path": receipt.path,
                "bytes": receipt.bytes,
            })
        ),
        Output::Human => println!("{} ({} bytes)", receipt.path.display(), receipt.bytes),
    }
    Ok(())
}

async fn run_views(cli: &Cli, table: &str) -> Result<()> {
    let config = client_config(cli, None);
    let services = GridServices::http(&config, Arc::new(NoopHost))?;
    let views = services
        .views
        .list(table)
        .await
        .with_context(|| format!("listing saved views for {table}"))?;
    match cli.output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&views)?),
        Output::Human => {
            for v in views {
                let marker = if v.is_default { "*" } else { " " };
                println!("{marker} {}\t{}", v.id, v.name);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Query {
            query,
            page,
            page_size,
        } => run_query(&cli, query, *page, *page_size).await,
        Commands::Export { query, format, out } => {
            run_export(&cli, query, *format, out.clone()).await
        }
        Commands::Views { table } => run_views(&cli, table).await,
    }
}
