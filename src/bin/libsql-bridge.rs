use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use libsql_bridge::{
    Bridge, BridgeConfig, BridgeError, ConnectionHandle, OpenMode, OpenOptions, Value,
};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run SQL against a libsql database through the bridge")]
struct Args {
    /// File path or URL; ignored in memory mode.
    #[arg(default_value = ":memory:")]
    target: String,
    #[arg(long, value_enum, default_value = "memory")]
    mode: OpenMode,
    #[arg(long, env = "LIBSQL_AUTH_TOKEN")]
    auth_token: Option<String>,
    /// Local file for an embedded replica.
    #[arg(long)]
    replica_path: Option<PathBuf>,
    /// Sync the replica before running any SQL.
    #[arg(long)]
    sync: bool,
    /// Open options as JSON; overrides the flags above.
    #[arg(long)]
    options: Option<PathBuf>,
    /// Bridge config as JSON.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Positional parameters for every statement, as JSON scalars.
    #[arg(long = "param", short = 'p')]
    params: Vec<String>,
    #[arg(long)]
    trace: Option<Level>,
    /// Statements to run in order.
    #[arg(short = 'e', long = "execute", required = true)]
    sql: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Some(level) = args.trace {
        libsql_bridge::enable_internal_tracing(level);
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), BridgeError> {
    let config = match &args.config {
        Some(path) => BridgeConfig::from_json_str(&read(path)?)?,
        None => BridgeConfig::default(),
    };
    let bridge = Bridge::with_config(config)?;
    let db = bridge.open_with(open_options(args)?)?;
    let db = bridge.guard(db);
    let conn = bridge.connect(*db)?;
    let params = parse_params(&args.params)?;

    for sql in &args.sql {
        let output = run_statement(&bridge, conn, sql, &params)?;
        println!("{output}");
    }
    Ok(())
}

fn read(path: &Path) -> Result<String, BridgeError> {
    std::fs::read_to_string(path)
        .map_err(|e| BridgeError::ConfigError(format!("cannot read {}: {e}", path.display())))
}

fn open_options(args: &Args) -> Result<OpenOptions, BridgeError> {
    if let Some(path) = &args.options {
        return OpenOptions::from_json_str(&read(path)?);
    }
    let mut builder = OpenOptions::builder(args.target.clone(), args.mode).sync_on_open(args.sync);
    if let Some(token) = &args.auth_token {
        builder = builder.auth_token(token.clone());
    }
    if let Some(path) = &args.replica_path {
        builder = builder.replica_path(path.to_string_lossy());
    }
    Ok(builder.finish())
}

fn parse_params(raw: &[String]) -> Result<Vec<Value>, BridgeError> {
    raw.iter()
        .map(|text| {
            // Bare words are taken as text so `-p hello` works unquoted.
            let json = serde_json::from_str(text)
                .unwrap_or_else(|_| serde_json::Value::String(text.clone()));
            Value::try_from(json)
        })
        .collect()
}

/// Queries print their rows; everything else prints its counters.
fn run_statement(
    bridge: &Bridge,
    conn: ConnectionHandle,
    sql: &str,
    params: &[Value],
) -> Result<serde_json::Value, BridgeError> {
    let stmt = bridge.guard(bridge.prepare(conn, sql)?);
    let count = bridge.parameter_count(*stmt)?;
    let params = params.get(..count).unwrap_or(params);

    if bridge.statement_columns(*stmt)?.is_empty() {
        let affected = bridge.execute_statement(*stmt, params)?;
        return Ok(serde_json::json!({
            "changes": affected,
            "last_insert_rowid": bridge.last_insert_rowid(conn)?,
        }));
    }
    let rows = bridge.query_statement(*stmt, params)?;
    Ok(bridge.fetch_all(rows)?.to_json())
}
