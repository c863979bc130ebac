use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

use sheetfeed::{CellQuery, Config, RowQuery, ServiceAccountKey, Spreadsheet, SpreadsheetInfo};

/// Get the config directory path (~/.config/sheetfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("sheetfeed"))
}

#[derive(Parser, Debug)]
#[command(
    name = "sheetfeed",
    about = "Read and edit Google Sheets through the legacy feed API"
)]
struct Args {
    /// Spreadsheet key, as found in the sheet URL
    #[arg(long, short)]
    key: String,

    /// Config file (default: ~/.config/sheetfeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Service account key file (JSON). Overrides the config file.
    #[arg(long, value_name = "FILE")]
    service_account: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show title, author and worksheets
    Info,

    /// Print the rows of a worksheet as JSON
    Rows {
        worksheet: String,
        /// 1-based index of the first row
        #[arg(long)]
        start: Option<u32>,
        /// Maximum number of rows
        #[arg(long)]
        num: Option<u32>,
        /// Sort column, e.g. `column:name`
        #[arg(long)]
        orderby: Option<String>,
        #[arg(long)]
        reverse: bool,
        /// Structured query, e.g. `age > 25`
        #[arg(long, short)]
        query: Option<String>,
    },

    /// Print the cells of a worksheet as JSON
    Cells {
        worksheet: String,
        #[arg(long)]
        min_row: Option<u32>,
        #[arg(long)]
        max_row: Option<u32>,
        #[arg(long)]
        min_col: Option<u32>,
        #[arg(long)]
        max_col: Option<u32>,
        /// Include cells without a value
        #[arg(long)]
        return_empty: bool,
    },

    /// Append a row
    AddRow {
        worksheet: String,
        #[arg(value_name = "COLUMN=VALUE", required = true)]
        fields: Vec<String>,
    },

    /// Set one cell's input value
    SetCell {
        worksheet: String,
        row: u32,
        col: u32,
        value: String,
    },
}

fn parse_field(arg: &str) -> Result<(String, String)> {
    let (column, value) = arg
        .split_once('=')
        .with_context(|| format!("Expected COLUMN=VALUE, got '{}'", arg))?;
    if column.trim().is_empty() {
        anyhow::bail!("Empty column name in '{}'", arg);
    }
    Ok((column.trim().to_string(), value.to_string()))
}

fn info_json(info: &SpreadsheetInfo) -> serde_json::Value {
    json!({
        "title": info.title,
        "updated": info.updated.map(|t| t.to_rfc3339()),
        "author": info.author.as_ref().map(|a| json!({"name": a.name, "email": a.email})),
        "worksheets": info.worksheets.iter().map(|ws| json!({
            "id": ws.id,
            "title": ws.title,
            "rowCount": ws.row_count,
            "colCount": ws.col_count,
        })).collect::<Vec<_>>(),
    })
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // SEC-015: Env token wins over the config file so it never has to be written to disk
    if let Ok(token) = std::env::var("SHEETFEED_TOKEN") {
        if !token.trim().is_empty() {
            config.auth_token = Some(token);
        }
    }
    let service_account = args
        .service_account
        .clone()
        .or_else(|| config.service_account.clone());

    let sheet = Spreadsheet::with_config(&args.key, config)
        .context("Failed to create spreadsheet client")?;

    if let Some(path) = service_account {
        let key = ServiceAccountKey::from_file(&path)
            .with_context(|| format!("Failed to load service account key {}", path.display()))?;
        sheet
            .use_service_account_auth(key)
            .await
            .context("Service account authentication failed")?;
    }

    match args.command {
        Command::Info => {
            let info = sheet
                .get_info()
                .await
                .context("Failed to fetch spreadsheet info")?;
            print_json(&info_json(&info))?;
        }
        Command::Rows {
            worksheet,
            start,
            num,
            orderby,
            reverse,
            query,
        } => {
            let query = RowQuery {
                start,
                num,
                orderby,
                reverse,
                query,
            };
            let rows = sheet
                .get_rows(&worksheet, &query)
                .await
                .with_context(|| format!("Failed to fetch rows of worksheet {}", worksheet))?;
            let rows: Vec<_> = rows
                .iter()
                .map(|r| serde_json::Value::Object(r.to_json()))
                .collect();
            print_json(&serde_json::Value::Array(rows))?;
        }
        Command::Cells {
            worksheet,
            min_row,
            max_row,
            min_col,
            max_col,
            return_empty,
        } => {
            let query = CellQuery {
                min_row,
                max_row,
                min_col,
                max_col,
                return_empty: return_empty.then_some(true),
            };
            let cells = sheet
                .get_cells(&worksheet, &query)
                .await
                .with_context(|| format!("Failed to fetch cells of worksheet {}", worksheet))?;
            let cells: Vec<_> = cells.iter().map(|c| c.to_json()).collect();
            print_json(&serde_json::Value::Array(cells))?;
        }
        Command::AddRow { worksheet, fields } => {
            let fields = fields
                .iter()
                .map(|f| parse_field(f))
                .collect::<Result<Vec<_>>>()?;
            let row = sheet
                .add_row(&worksheet, fields)
                .await
                .with_context(|| format!("Failed to add row to worksheet {}", worksheet))?;
            print_json(&serde_json::Value::Object(row.to_json()))?;
        }
        Command::SetCell {
            worksheet,
            row,
            col,
            value,
        } => {
            let query = CellQuery {
                min_row: Some(row),
                max_row: Some(row),
                min_col: Some(col),
                max_col: Some(col),
                return_empty: Some(true),
            };
            let mut cells = sheet
                .get_cells(&worksheet, &query)
                .await
                .with_context(|| format!("Failed to fetch cell R{}C{}", row, col))?;
            let Some(cell) = cells.iter_mut().find(|c| c.row == row && c.col == col) else {
                anyhow::bail!("Cell R{}C{} not found in worksheet {}", row, col, worksheet);
            };
            cell.set_value(value)
                .await
                .with_context(|| format!("Failed to update cell R{}C{}", row, col))?;
            tracing::info!(worksheet = %worksheet, row, col, "Cell updated");
            print_json(&cell.to_json())?;
        }
    }

    Ok(())
}
