//! Command-line interface: argument definitions and command dispatch.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;
use tscribe_common::{Transcript, TranscriptInfo, SCHEMA_VERSION};
use tscribe_config::{resolve_config, ConfigError, ConfigPaths, StoreConfig};
use tscribe_crypt::{decrypt_database, encrypt_database, CryptError, EncryptionKey, TransformReport};
use tscribe_query::{Cursor, OrderBy, PageRequest, QueryError};
use tscribe_store::{StoreError, TranscriptStore};

use crate::exit_codes::ExitCode;
use crate::filter::{build_filter, FilterError};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Inspect and maintain tscribe transcript storage locations.
#[derive(Parser, Debug)]
#[command(name = "tscribe", version, about)]
pub struct Cli {
    /// Storage location (directory holding data files and `_index/`)
    #[arg(short, long, global = true, env = "TSCRIBE_LOCATION", default_value = ".")]
    pub location: PathBuf,

    /// Explicit config file (otherwise TSCRIBE_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Filter options shared by `count` and `list`.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Condition `COLUMN OP VALUE` (repeatable, ANDed)
    #[arg(long = "where", value_name = "COND")]
    pub wheres: Vec<String>,

    /// Condition tree as JSON
    #[arg(long, value_name = "JSON")]
    pub filter: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Insert transcripts from a JSON-lines file
    Import {
        /// File with one transcript JSON object per line
        path: PathBuf,
    },
    /// Count transcripts matching a filter
    Count {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// List transcripts (metadata only), one page at a time
    List {
        #[command(flatten)]
        filter: FilterArgs,
        /// Ordering `COLUMN[:asc|:desc]` (repeatable)
        #[arg(long = "order", value_name = "TERM")]
        order: Vec<String>,
        /// Page size
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Resume after this cursor
        #[arg(long, conflicts_with = "before")]
        after: Option<String>,
        /// Page backward from this cursor
        #[arg(long)]
        before: Option<String>,
        /// Start from the last page
        #[arg(long, conflicts_with_all = ["after", "before"])]
        last: bool,
    },
    /// Show one transcript with its messages and events
    Show {
        /// Transcript id
        id: String,
    },
    /// Fold the index into a single manifest
    Compact {
        /// Also delete data files no index row references
        #[arg(long)]
        delete_orphans: bool,
    },
    /// List data files no index row references
    Orphans,
    /// Copy a plain location to an encrypted one
    Encrypt {
        source: PathBuf,
        destination: PathBuf,
        /// Replace a non-empty destination
        #[arg(long)]
        overwrite: bool,
    },
    /// Copy an encrypted location to a plain one
    Decrypt {
        source: PathBuf,
        destination: PathBuf,
        /// Replace a non-empty destination
        #[arg(long)]
        overwrite: bool,
    },
}

/// Failure of one command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypt(#[from] CryptError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("cannot read '{path}': {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: invalid transcript: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("transcript '{0}' not found")]
    NotFound(String),
}

impl CommandError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CommandError::Store(e) => ExitCode::from(e),
            CommandError::Crypt(e) => ExitCode::from(e),
            CommandError::Config(_) => ExitCode::ConfigError,
            CommandError::Query(_) => ExitCode::QueryError,
            CommandError::Filter(_) | CommandError::Parse { .. } => ExitCode::ArgsError,
            CommandError::Input { .. } => ExitCode::IoError,
            CommandError::NotFound(_) => ExitCode::NotFound,
        }
    }
}

/// Run the parsed command line, printing results and errors.
pub fn run(cli: &Cli) -> ExitCode {
    match dispatch(cli) {
        Ok(output) => {
            print_output(cli.format, &output);
            ExitCode::Clean
        }
        Err(err) => {
            let code = err.exit_code();
            match cli.format {
                OutputFormat::Json => {
                    let body = json!({
                        "schema_version": SCHEMA_VERSION,
                        "error": err.to_string(),
                        "exit_code": code.as_i32(),
                    });
                    println!("{body}");
                }
                OutputFormat::Text => eprintln!("error: {err}"),
            }
            code
        }
    }
}

/// A command's result: JSON body plus its text rendering.
struct Output {
    command: &'static str,
    body: Value,
    text: String,
}

fn print_output(format: OutputFormat, output: &Output) {
    match format {
        OutputFormat::Json => {
            let mut envelope = json!({
                "schema_version": SCHEMA_VERSION,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "command": output.command,
            });
            if let (Some(envelope), Value::Object(body)) = (envelope.as_object_mut(), &output.body) {
                envelope.extend(body.clone());
            }
            println!("{envelope}");
        }
        OutputFormat::Text => {
            if !output.text.is_empty() {
                println!("{}", output.text);
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<StoreConfig, CommandError> {
    let resolved = resolve_config(&ConfigPaths::discover(cli.config.as_deref()))?;
    tracing::debug!(source = ?resolved.source, "Resolved configuration");
    Ok(resolved.config)
}

fn dispatch(cli: &Cli) -> Result<Output, CommandError> {
    let config = load_config(cli)?;
    match &cli.command {
        Commands::Import { path } => run_import(&cli.location, config, path),
        Commands::Count { filter } => run_count(&cli.location, config, filter),
        Commands::List {
            filter,
            order,
            limit,
            after,
            before,
            last,
        } => {
            let request = page_request(*limit, after.as_deref(), before.as_deref(), *last)?;
            run_list(&cli.location, config, filter, order, &request)
        }
        Commands::Show { id } => run_show(&cli.location, config, id),
        Commands::Compact { delete_orphans } => run_compact(&cli.location, config, *delete_orphans),
        Commands::Orphans => run_orphans(&cli.location, config),
        Commands::Encrypt {
            source,
            destination,
            overwrite,
        } => {
            let key = EncryptionKey::require_env(&config.encryption_key_env)?;
            let report = encrypt_database(source, destination, &key, *overwrite)?;
            Ok(transform_output("encrypt", destination, &report))
        }
        Commands::Decrypt {
            source,
            destination,
            overwrite,
        } => {
            let key = EncryptionKey::require_env(&config.encryption_key_env)?;
            let report = decrypt_database(source, destination, &key, *overwrite)?;
            Ok(transform_output("decrypt", destination, &report))
        }
    }
}

fn page_request(
    limit: usize,
    after: Option<&str>,
    before: Option<&str>,
    last: bool,
) -> Result<PageRequest, CommandError> {
    Ok(match (after, before) {
        (Some(cursor), _) => PageRequest::after(limit, Cursor::decode(cursor)?),
        (None, Some(cursor)) => PageRequest::before(limit, Cursor::decode(cursor)?),
        (None, None) if last => PageRequest::last(limit),
        (None, None) => PageRequest::first(limit),
    })
}

fn read_transcripts(path: &Path) -> Result<Vec<Transcript>, CommandError> {
    let raw = fs::read_to_string(path).map_err(|source| CommandError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    let mut transcripts = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let transcript = serde_json::from_str(line).map_err(|source| CommandError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        transcripts.push(transcript);
    }
    Ok(transcripts)
}

fn run_import(location: &Path, config: StoreConfig, path: &Path) -> Result<Output, CommandError> {
    let transcripts = read_transcripts(path)?;
    let mut store = TranscriptStore::open(location, config)?;
    let report = store.insert(transcripts)?;
    info!(inserted = report.inserted, duplicates = report.duplicates, "Import finished");
    Ok(Output {
        command: "import",
        text: format!(
            "Inserted {} transcript(s), skipped {} duplicate(s)",
            report.inserted, report.duplicates
        ),
        body: json!({ "report": report }),
    })
}

fn run_count(location: &Path, config: StoreConfig, args: &FilterArgs) -> Result<Output, CommandError> {
    let filter = build_filter(&args.wheres, args.filter.as_deref())?;
    let store = TranscriptStore::open(location, config)?;
    let count = store.count(filter.as_ref())?;
    Ok(Output {
        command: "count",
        text: count.to_string(),
        body: json!({ "count": count }),
    })
}

fn info_line(info: &TranscriptInfo) -> String {
    let mut line = info.transcript_id.clone();
    if let Some(model) = &info.model {
        line.push_str(&format!("  model={model}"));
    }
    if let Some(score) = info.score {
        line.push_str(&format!("  score={score}"));
    }
    if let Some(source) = &info.source_type {
        line.push_str(&format!("  source={source}"));
    }
    line
}

fn run_list(
    location: &Path,
    config: StoreConfig,
    args: &FilterArgs,
    order: &[String],
    request: &PageRequest,
) -> Result<Output, CommandError> {
    let filter = build_filter(&args.wheres, args.filter.as_deref())?;
    let order = order
        .iter()
        .map(|term| OrderBy::parse(term))
        .collect::<Result<Vec<_>, _>>()?;
    let store = TranscriptStore::open(location, config)?;
    let page = store.page(filter.as_ref(), &order, request)?;

    let next = page.next_cursor.as_ref().map(Cursor::encode);
    let mut lines: Vec<String> = page.items.iter().map(info_line).collect();
    lines.push(format!("({} of {} shown)", page.items.len(), page.total_count));
    if let Some(next) = &next {
        lines.push(format!("next: {next}"));
    }
    Ok(Output {
        command: "list",
        text: lines.join("\n"),
        body: json!({
            "transcripts": page.items,
            "total_count": page.total_count,
            "next_cursor": next,
        }),
    })
}

fn run_show(location: &Path, config: StoreConfig, id: &str) -> Result<Output, CommandError> {
    let store = TranscriptStore::open(location, config)?;
    let transcript = store
        .read(id)?
        .ok_or_else(|| CommandError::NotFound(id.to_string()))?;

    let mut lines = vec![format!("# Transcript: {}", info_line(transcript.info()))];
    for message in &transcript.messages {
        lines.push(format!("  [{:?}] {}", message.role, message.content));
    }
    if !transcript.events.is_empty() {
        lines.push(format!("  {} event(s)", transcript.events.len()));
    }
    Ok(Output {
        command: "show",
        text: lines.join("\n"),
        body: json!({ "transcript": transcript }),
    })
}

fn run_compact(location: &Path, config: StoreConfig, delete_orphans: bool) -> Result<Output, CommandError> {
    let mut store = TranscriptStore::open(location, config)?;
    let report = store.compact(delete_orphans)?;
    let mut text = format!(
        "Compacted {} row(s); removed {} index file(s)",
        report.rows, report.index_files_deleted
    );
    if delete_orphans {
        text.push_str(&format!("; deleted {} orphaned data file(s)", report.orphans_deleted.len()));
    }
    Ok(Output {
        command: "compact",
        text,
        body: json!({ "report": report }),
    })
}

fn run_orphans(location: &Path, config: StoreConfig) -> Result<Output, CommandError> {
    let store = TranscriptStore::open(location, config)?;
    let orphans: Vec<String> = store
        .find_orphaned_data_files()?
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    Ok(Output {
        command: "orphans",
        text: orphans.join("\n"),
        body: json!({ "orphans": orphans, "count": orphans.len() }),
    })
}

fn transform_output(command: &'static str, destination: &Path, report: &TransformReport) -> Output {
    Output {
        command,
        text: format!(
            "Wrote {}: {} columnar file(s) rewritten, {} other file(s) copied",
            destination.display(),
            report.files_transformed,
            report.files_copied
        ),
        body: json!({
            "destination": destination.display().to_string(),
            "files_transformed": report.files_transformed,
            "files_copied": report.files_copied,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_list_arguments() {
        let cli = Cli::try_parse_from([
            "tscribe", "--location", "/data", "list", "--where", "model=gpt-4", "--order", "score:desc",
            "--limit", "5",
        ])
        .unwrap();
        assert_eq!(cli.location, PathBuf::from("/data"));
        match cli.command {
            Commands::List {
                filter, order, limit, ..
            } => {
                assert_eq!(filter.wheres, vec!["model=gpt-4"]);
                assert_eq!(order, vec!["score:desc"]);
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_page_request_from_flags() {
        assert_eq!(page_request(3, None, None, false).unwrap(), PageRequest::first(3));
        assert_eq!(page_request(3, None, None, true).unwrap(), PageRequest::last(3));
        let cursor = Cursor::new().with("transcript_id", "a");
        let encoded = cursor.encode();
        assert_eq!(
            page_request(3, Some(&encoded), None, false).unwrap(),
            PageRequest::after(3, cursor)
        );
        assert!(matches!(
            page_request(3, Some("!!"), None, false),
            Err(CommandError::Query(_))
        ));
    }

    #[test]
    fn test_exit_codes_for_command_errors() {
        assert_eq!(CommandError::NotFound("x".into()).exit_code(), ExitCode::NotFound);
        let err = CommandError::from(CryptError::MissingKey { env_var: "K".into() });
        assert_eq!(err.exit_code(), ExitCode::ConfigError);
    }
}
