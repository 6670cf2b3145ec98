use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::io::{self, AsyncBufReadExt};
use tracing_subscriber::EnvFilter;

use hive_sf_translator::config::{
    API_TIMEOUT_MS, DEFAULT_MODEL, RESPONSE_INSTRUCTION, SEARCH_ID_COLUMN, SEARCH_SERVICE,
    SEMANTIC_MODEL_FILE, TURN_SEARCH_LIMIT,
};
use hive_sf_translator::engine::run_query;
use hive_sf_translator::surface::format_table;
use hive_sf_translator::{
    process_turn, AgentClient, AgentSettings, ChatSurface, ConnectionSettings, Conversation,
    SnowflakeEngine, TerminalSurface,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Load environment variables from this file before resolving flags
    #[arg(short, long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct ConnectionArgs {
    #[arg(short, long, env = "SNOWFLAKE_USER")]
    user: String,

    #[arg(short, long, env = "SNOWFLAKE_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(short, long, env = "SNOWFLAKE_ACCOUNT")]
    account: String,

    #[arg(short, long, env = "SNOWFLAKE_ROLE")]
    role: String,

    #[arg(short, long, env = "SNOWFLAKE_WAREHOUSE")]
    warehouse: String,

    #[arg(short, long, env = "SNOWFLAKE_DATABASE")]
    database: String,

    #[arg(short, long, env = "SNOWFLAKE_SCHEMA")]
    schema: String,
}

impl From<ConnectionArgs> for ConnectionSettings {
    fn from(args: ConnectionArgs) -> Self {
        ConnectionSettings {
            user: args.user,
            password: args.password,
            account: args.account,
            role: args.role,
            warehouse: args.warehouse,
            database: args.database,
            schema: args.schema,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct AgentArgs {
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, default_value = SEMANTIC_MODEL_FILE)]
    semantic_model: String,

    #[arg(long, default_value = SEARCH_SERVICE)]
    search_service: String,

    /// Search results requested per question
    #[arg(long, default_value_t = TURN_SEARCH_LIMIT)]
    search_limit: usize,

    #[arg(long, default_value_t = API_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Print generated SQL before running it
    #[arg(long)]
    show_sql: bool,
}

impl From<AgentArgs> for AgentSettings {
    fn from(args: AgentArgs) -> Self {
        AgentSettings {
            model: args.model,
            response_instruction: RESPONSE_INSTRUCTION.to_string(),
            semantic_model_file: args.semantic_model,
            search_service: args.search_service,
            id_column: SEARCH_ID_COLUMN.to_string(),
            turn_limit: args.search_limit,
            timeout: Duration::from_millis(args.timeout_ms),
            show_sql: args.show_sql,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive chat with the function translator
    Chat {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Ask a single question and exit
    Ask {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        agent: AgentArgs,
        /// The question, e.g. "What is the equivalent of GET_JSON_OBJECT?"
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },
}

fn print_chat_help() {
    println!("Commands:");
    println!("  /help                     - Show this command menu");
    println!("  /reset                    - Start a new conversation");
    println!("  /history                  - Show conversation history");
    println!("  /sql                      - Show the last generated SQL");
    println!("  /execute [sql]            - Run SQL inline, or the last generated SQL");
    println!("  /exit                     - Exit chat");
    println!();
}

// Env vars must be loaded before clap resolves `env = ...` fallbacks, so the
// flag is located by hand ahead of parsing.
fn load_env_file() {
    let args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args
        .iter()
        .position(|arg| arg == "--env-file" || arg == "-e")
    {
        if let Some(path) = args.get(pos + 1) {
            if !path.starts_with('-') {
                if let Err(err) = dotenvy::from_path(Path::new(path)) {
                    eprintln!("✗ Failed to load env file {}: {}", path, err);
                }
                return;
            }
        }
    }
    dotenvy::dotenv().ok();
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect(
    connection: ConnectionArgs,
    agent: AgentArgs,
) -> Result<(SnowflakeEngine, AgentClient), String> {
    let connection = ConnectionSettings::from(connection);
    let settings = AgentSettings::from(agent);
    connection.validate().map_err(|e| e.to_string())?;
    settings.validate().map_err(|e| e.to_string())?;

    let engine = SnowflakeEngine::new(&connection)
        .await
        .map_err(|e| e.to_string())?;
    let client = AgentClient::new(&connection, settings).map_err(|e| e.to_string())?;
    Ok((engine, client))
}

async fn execute_inline(
    engine: &SnowflakeEngine,
    sql: &str,
    surface: &mut TerminalSurface<std::io::Stdout>,
) {
    if let Some(table) = run_query(engine, sql, surface).await {
        if table.is_empty() {
            println!("(no rows)\n");
        } else {
            println!("{}", format_table(&table));
        }
    }
}

async fn chat_loop(engine: &SnowflakeEngine, client: &AgentClient) {
    let mut conversation = Conversation::new();
    let mut surface = TerminalSurface::stdout();
    let mut last_sql: Option<String> = None;

    println!("🤖 Hive to Snowflake Function Translator");
    print_chat_help();
    for message in conversation.messages() {
        surface.message(message);
    }

    let mut lines = io::BufReader::new(io::stdin()).lines();

    loop {
        print!("What is your request? ");
        if let Err(err) = std::io::stdout().flush() {
            tracing::warn!("failed to flush stdout: {}", err);
        }

        let input = match lines.next_line().await {
            Ok(Some(line)) => line.trim().to_string(),
            _ => break,
        };

        if input.is_empty() {
            continue;
        }

        match input.as_str() {
            "/exit" => {
                println!("Goodbye!");
                break;
            }
            "/help" => {
                print_chat_help();
                continue;
            }
            "/reset" => {
                conversation.reset();
                last_sql = None;
                println!("✓ New conversation started.\n");
                for message in conversation.messages() {
                    surface.message(message);
                }
                continue;
            }
            "/history" => {
                println!("\n📜 Conversation History:");
                for (idx, message) in conversation.messages().iter().enumerate() {
                    println!("{}. {}: {}", idx + 1, message.role.as_str(), message.rendered());
                }
                println!();
                continue;
            }
            "/sql" => {
                match &last_sql {
                    Some(sql) => surface.code("sql", sql),
                    None => println!("✗ No SQL has been generated in this conversation.\n"),
                }
                continue;
            }
            "/execute" => {
                match last_sql.clone() {
                    Some(sql) => execute_inline(engine, &sql, &mut surface).await,
                    None => println!(
                        "✗ No SQL to execute. Provide input or ask the assistant for SQL first.\n"
                    ),
                }
                continue;
            }
            _ => {}
        }

        if let Some(sql_inline) = input.strip_prefix("/execute ") {
            let trimmed = sql_inline.trim();
            if trimmed.is_empty() {
                println!("✗ Usage: /execute <sql>\n");
            } else {
                execute_inline(engine, trimmed, &mut surface).await;
            }
            continue;
        }

        if input.starts_with('/') {
            println!("✗ Unknown command: {}. Type /help for the list.\n", input);
            continue;
        }

        println!("Processing your request...");
        if let Some(outcome) = process_turn(
            &mut conversation,
            &input,
            client,
            engine,
            &mut surface,
            client.settings(),
        )
        .await
        {
            if let Some(sql) = outcome.generated_sql() {
                last_sql = Some(sql.to_string());
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();
    if let Some(path) = &cli.env_file {
        tracing::debug!(path = %path.display(), "env file loaded");
    }

    match cli.command {
        Commands::Chat { connection, agent } => match connect(connection, agent).await {
            Ok((engine, client)) => {
                chat_loop(&engine, &client).await;
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("✗ {}", e);
                ExitCode::FAILURE
            }
        },
        Commands::Ask {
            connection,
            agent,
            question,
        } => {
            let question = question.join(" ");
            let (engine, client) = match connect(connection, agent).await {
                Ok(pair) => pair,
                Err(e) => {
                    println!("✗ {}", e);
                    return ExitCode::FAILURE;
                }
            };

            let mut conversation = Conversation::new();
            let mut surface = TerminalSurface::stdout();
            let outcome = process_turn(
                &mut conversation,
                &question,
                &client,
                &engine,
                &mut surface,
                client.settings(),
            )
            .await;

            if outcome.is_some() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
