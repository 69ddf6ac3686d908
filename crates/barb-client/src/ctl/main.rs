use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use barb_client::session::{ChatSession, HistoryCache, SessionObserver, SessionState};
use barb_client::{ApiClient, ClientConfig};
use barb_protocol::{ContentSegment, Conversation, Message, segments};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, debug, info};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let config = resolve_config(&cli.common)?;
    init_logging(&cli.common, &config);
    debug!("resolved config: {:#?}", ClientConfig { token: None, ..config.clone() });

    run(cli, config)
}

#[tokio::main]
async fn run(cli: Cli, config: ClientConfig) -> Result<()> {
    let client = ApiClient::from_config(&config).context("building HTTP client")?;
    let json = cli.common.json;

    match cli.command {
        Command::Send(cmd) => handle_send(client, &config, cmd, json).await,
        Command::History { conversation_id } => handle_history(&client, &conversation_id, json).await,
        Command::Conversations { instrument } => {
            handle_conversations(&client, instrument.as_deref(), json).await
        }
        Command::Remove { conversation_id } => {
            client
                .remove_conversation(&conversation_id)
                .await
                .with_context(|| format!("removing conversation {conversation_id}"))?;
            info!("removed conversation {}", conversation_id);
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "barbctl - talk to the Barb trading assistant from the terminal.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Server base URL
    #[arg(long, value_name = "URL", global = true, env = "BARB_API_URL")]
    api_url: Option<String>,
    /// Bearer token
    #[arg(long, value_name = "TOKEN", global = true, env = "BARB_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a message and print the assistant's reply
    Send(SendCommand),
    /// Print the messages of a conversation
    History { conversation_id: String },
    /// List conversations
    Conversations {
        /// Only conversations for this instrument
        #[arg(long)]
        instrument: Option<String>,
    },
    /// Remove a conversation
    Remove { conversation_id: String },
}

#[derive(Debug, Args)]
struct SendCommand {
    /// Message text
    text: String,
    /// Continue an existing conversation instead of starting a new one
    #[arg(long, value_name = "ID")]
    conversation: Option<String>,
    /// Instrument for a new conversation
    #[arg(long, value_name = "SYMBOL")]
    instrument: Option<String>,
    /// Run proposed backtests without asking
    #[arg(long)]
    yes: bool,
}

fn resolve_config(common: &CommonOpts) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(common.config.as_deref()).context("loading configuration")?;
    if let Some(url) = &common.api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(token) = &common.token {
        config.token = Some(token.clone());
    }
    Ok(config)
}

fn effective_log_level(common: &CommonOpts, config: &ClientConfig) -> LevelFilter {
    match common.verbose {
        0 => config.logging.level.parse().unwrap_or(LevelFilter::Info),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn init_logging(common: &CommonOpts, config: &ClientConfig) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    if common.quiet {
        log::set_max_level(LevelFilter::Off);
        return;
    }

    let level = effective_log_level(common, config);
    let directive = level.to_string().to_lowercase();
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("barb_client={directive},barbctl={directive}")));

    if common.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(io::stderr().is_terminal())
                    .with_writer(io::stderr),
            )
            .try_init()
            .ok();
    }

    // Library code logs through the `log` facade
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.filter_level(level);
    builder.try_init().ok();
}

/// Reports session notifications on stderr.
struct CliObserver;

impl SessionObserver for CliObserver {
    fn on_conversation_created(&self, conversation: &Conversation) {
        info!("started conversation {} ({})", conversation.id, conversation.instrument);
    }

    fn on_title_update(&self, conversation_id: &str, title: &str) {
        info!("conversation {} is now titled \"{}\"", conversation_id, title);
    }
}

async fn handle_send(client: ApiClient, config: &ClientConfig, cmd: SendCommand, json: bool) -> Result<()> {
    let instrument = cmd.instrument.unwrap_or_else(|| config.instrument.clone());
    let cache = Arc::new(HistoryCache::new(config.history_cache_capacity));
    let session = ChatSession::new(Arc::new(client), cache, instrument).with_observer(Arc::new(CliObserver));

    if let Some(id) = cmd.conversation.as_deref() {
        session.select_conversation(Some(id)).await;
        if let Some(err) = session.error() {
            bail!("{}: {}", err.kind(), err);
        }
    }
    let before = session.messages().len();

    interruptible(&session, session.send(&cmd.text)).await;

    while session.state() == SessionState::AwaitingToolConfirmation {
        let Some(pending) = session.pending_tool() else {
            break;
        };
        let input = serde_json::to_string_pretty(&pending.input)?;
        if cmd.yes || confirm(&format!("Run {} with\n{}\n", pending.tool_name, input))? {
            interruptible(&session, session.confirm_backtest(None)).await;
        } else {
            session.dismiss_tool_confirmation();
        }
    }

    if let Some(err) = session.error() {
        bail!("{}: {}", err.kind(), err);
    }

    let messages = session.messages();
    let reply = messages.get(before..).unwrap_or_default();
    if json {
        println!("{}", serde_json::to_string_pretty(reply)?);
    } else {
        for message in reply.iter().filter(|m| m.role == barb_protocol::Role::Assistant) {
            print_message(message);
        }
        if let Some(id) = session.conversation_id() {
            eprintln!("conversation: {id}");
        }
    }
    Ok(())
}

/// Run a session operation, cancelling it on Ctrl-C.
async fn interruptible(session: &ChatSession, operation: impl std::future::Future<Output = ()>) {
    tokio::select! {
        _ = operation => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            session.cancel_current_operation();
        }
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}Proceed? [y/N] ");
    io::stderr().flush().ok();
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("reading confirmation")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn handle_history(client: &ApiClient, conversation_id: &str, json: bool) -> Result<()> {
    let messages = client
        .get_messages(conversation_id)
        .await
        .with_context(|| format!("loading history of {conversation_id}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }
    for message in &messages {
        println!("--- {} ({})", message.role, message.created_at.format("%Y-%m-%d %H:%M"));
        print_message(message);
    }
    Ok(())
}

async fn handle_conversations(client: &ApiClient, instrument: Option<&str>, json: bool) -> Result<()> {
    let conversations = client
        .list_conversations(instrument)
        .await
        .context("listing conversations")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&conversations)?);
        return Ok(());
    }
    for conv in &conversations {
        println!(
            "{}  {:<6} {:>4} msgs  ${:.4}  {}",
            conv.id, conv.instrument, conv.usage.message_count, conv.usage.totals.total_cost, conv.title
        );
    }
    Ok(())
}

fn print_message(message: &Message) {
    for segment in segments(message) {
        match segment {
            ContentSegment::Text(text) => println!("{}", text.trim()),
            ContentSegment::Data { block, .. } => match &block.error {
                Some(error) => println!("[{}: failed: {}]", block.title, error),
                None => println!("[{}: {} blocks]", block.title, block.blocks.len()),
            },
        }
    }
}
