use dblink::config::{default_config_path, ConnectionConfig, Profile, Settings};
use dblink::core::db::{ConnectionManager, QueryExecutor, QueryOptions, TerminateView, Value};
use dblink::logging;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

const USAGE: &str = "usage: dblink [--config PATH | --database PATH] [--profile local|production] \
[--debug] [--no-transaction] SQL [PARAM...]";

/// Parsed command line
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<PathBuf>,
    database: Option<String>,
    profile: Option<Profile>,
    debug: bool,
    no_transaction: bool,
    sql: String,
    params: Vec<Value>,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();
    let mut positional = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                cli.config = Some(PathBuf::from(path));
            }
            "--database" => {
                let path = iter.next().ok_or("--database needs a path")?;
                cli.database = Some(path.clone());
            }
            "--profile" => {
                let name = iter.next().ok_or("--profile needs a name")?;
                cli.profile = Some(Profile::parse(name).ok_or_else(|| format!("unknown profile '{}'", name))?);
            }
            "--debug" => cli.debug = true,
            "--no-transaction" => cli.no_transaction = true,
            _ => positional.push(arg.clone()),
        }
    }

    let mut positional = positional.into_iter();
    cli.sql = positional.next().ok_or("missing SQL statement")?;
    cli.params = positional.map(|p| parse_param(&p)).collect();
    Ok(cli)
}

/// Integers bind as integers, floats as reals, `NULL` as null, anything else as text
fn parse_param(raw: &str) -> Value {
    if raw == "NULL" {
        Value::Null
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Real(f)
    } else {
        Value::Text(raw.to_string())
    }
}

fn connection_config(cli: &CliArgs) -> dblink::Result<ConnectionConfig> {
    if let Some(database) = &cli.database {
        return Ok(ConnectionConfig::sqlite(database.clone()));
    }
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let profile = cli.profile.unwrap_or_else(Profile::from_env);
    info!("Loading {} profile from {}", profile.as_str(), path.display());
    Settings::load(&path)?.select(profile)
}

fn run(cli: &CliArgs) -> dblink::Result<String> {
    let config = connection_config(cli)?;
    let manager = ConnectionManager::new(config).with_failure_view(TerminateView);
    let executor = QueryExecutor::new(&manager);
    let options = QueryOptions::default()
        .debug(cli.debug)
        .transaction(!cli.no_transaction);

    let result = executor.query(&cli.sql, cli.params.clone(), &options)?;
    Ok(serde_json::to_string(&result)?)
}

fn main() -> ExitCode {
    logging::init_stderr_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    match run(&cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
