mod render;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use client::{
    ApiError, ClientConfig, ConfigError, ConversationApi, ConversationView, CredentialProvider, HttpApi, Reconciler,
    StaticCredential, ViewError, ViewHandle, ViewState, WsAuthMethod,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wire::CreateConversationRequest;

use crate::render::{WatchPrinter, format_conversation_row, format_header, format_transcript};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing API token; pass --token or set CONVO_TOKEN")]
    MissingToken,
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error("timed out waiting for the agent")]
    Timeout,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl CliError {
    fn is_auth(&self) -> bool {
        match self {
            Self::Api(e) | Self::View(ViewError::Load(e) | ViewError::Submit(e) | ViewError::Trigger(e)) => e.is_auth(),
            _ => false,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "convo", about = "Conversation transcript client")]
struct Cli {
    /// Overrides `CONVO_BASE_URL` from the client configuration.
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long, env = "CONVO_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// How the websocket handshake carries the token.
    #[arg(long, value_enum)]
    ws_auth: Option<WsAuthArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WsAuthArg {
    Query,
    Header,
}

impl From<WsAuthArg> for WsAuthMethod {
    fn from(arg: WsAuthArg) -> Self {
        match arg {
            WsAuthArg::Query => Self::QueryParam,
            WsAuthArg::Header => Self::Header,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List conversations.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Create a conversation with an opening message and follow the first
    /// agent turn.
    New {
        #[arg(long)]
        model: String,
        content: String,
        /// Print the new id and exit without following the agent.
        #[arg(long)]
        detach: bool,
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
    /// Print the current transcript once.
    Show {
        conversation_id: String,
        /// Print the raw snapshot messages as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Follow a conversation live until interrupted.
    Watch { conversation_id: String },
    /// Submit a message.
    Send {
        conversation_id: String,
        content: String,
        #[arg(long)]
        image_base64: Option<String>,
        /// Stay attached and print the agent's turn until it finishes.
        #[arg(long)]
        wait: bool,
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
    /// Ask the server to start the first agent turn.
    Trigger { conversation_id: String },
}

struct CliContext {
    config: ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl CliContext {
    fn api(&self) -> Result<Arc<HttpApi>, CliError> {
        Ok(Arc::new(HttpApi::new(self.config.clone(), Arc::clone(&self.credentials))?))
    }

    async fn mount(&self, conversation_id: &str) -> Result<ViewHandle, CliError> {
        let api: Arc<dyn ConversationApi> = self.api()?;
        let view = ConversationView::new(self.config.clone(), conversation_id, api, Arc::clone(&self.credentials));
        Ok(view.mount().await?)
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url.as_deref() {
        let defaults = ClientConfig::new(base_url)?;
        config.base_url = defaults.base_url;
    }
    if let Some(ws_auth) = cli.ws_auth {
        config.ws_auth = ws_auth.into();
    }
    let token = cli.token.filter(|t| !t.trim().is_empty()).ok_or(CliError::MissingToken)?;
    let ctx = CliContext { config, credentials: Arc::new(StaticCredential::new(token)) };

    let result = match cli.command {
        Command::List { json } => run_list(&ctx, json).await,
        Command::New { model, content, detach, timeout_secs } => {
            let timeout = Duration::from_secs(timeout_secs);
            run_new(&ctx, model, content, (!detach).then_some(timeout)).await
        }
        Command::Show { conversation_id, json } => run_show(&ctx, &conversation_id, json).await,
        Command::Watch { conversation_id } => run_watch(&ctx, &conversation_id).await,
        Command::Send { conversation_id, content, image_base64, wait, timeout_secs } => {
            let timeout = Duration::from_secs(timeout_secs);
            run_send(&ctx, &conversation_id, content, image_base64, wait.then_some(timeout)).await
        }
        Command::Trigger { conversation_id } => run_trigger(&ctx, &conversation_id).await,
    };
    if result.as_ref().is_err_and(CliError::is_auth) {
        eprintln!("hint: the server rejected the token; pass --token or set CONVO_TOKEN");
    }
    result
}

async fn run_list(ctx: &CliContext, json: bool) -> Result<(), CliError> {
    let conversations = ctx.api()?.list_conversations().await?;
    if json {
        return print_json(&serde_json::to_value(&conversations)?);
    }
    for conversation in &conversations {
        println!("{}", format_conversation_row(conversation));
    }
    Ok(())
}

async fn run_new(ctx: &CliContext, model: String, content: String, wait: Option<Duration>) -> Result<(), CliError> {
    let request = CreateConversationRequest { model, content };
    let conversation = ctx.api()?.create_conversation(&request).await?;
    println!("{}", conversation.id);
    tracing::info!(conversation_id = %conversation.id, "conversation created");

    let Some(timeout) = wait else {
        return Ok(());
    };
    // Mounting runs the first-turn trigger for a fresh conversation.
    let handle = ctx.mount(&conversation.id).await?;
    follow_turn(handle, WatchPrinter::new(), timeout).await
}

async fn run_show(ctx: &CliContext, conversation_id: &str, json: bool) -> Result<(), CliError> {
    let detail = ctx.api()?.fetch_conversation(conversation_id).await?;
    if json {
        return print_json(&serde_json::to_value(&detail)?);
    }

    let mut reconciler = Reconciler::new(conversation_id, ctx.config.events.clone());
    reconciler.seed(detail);
    println!(
        "{}",
        format_header(reconciler.conversation(), reconciler.message_count(), reconciler.total_cost())
    );
    let transcript = format_transcript(&reconciler.rendered());
    if !transcript.is_empty() {
        println!("{transcript}");
    }
    Ok(())
}

async fn run_watch(ctx: &CliContext, conversation_id: &str) -> Result<(), CliError> {
    let handle = ctx.mount(conversation_id).await?;
    let mut updates = handle.subscribe();
    let mut printer = WatchPrinter::new();

    let initial = updates.borrow_and_update().clone();
    println!("{}", format_header(initial.conversation.as_ref(), initial.message_count, initial.total_cost));
    emit(&mut printer, &initial);

    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::from),
            changed = updates.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = updates.borrow_and_update().clone();
                emit(&mut printer, &state);
                if !state.mounted {
                    break Ok(());
                }
            }
        }
    };

    handle.shutdown().await;
    outcome
}

async fn run_send(
    ctx: &CliContext,
    conversation_id: &str,
    content: String,
    image_base64: Option<String>,
    wait: Option<Duration>,
) -> Result<(), CliError> {
    let handle = ctx.mount(conversation_id).await?;
    let mut printer = WatchPrinter::new();
    printer.skip_existing(&handle.state());

    if let Err(error) = handle.submit(content, image_base64).await {
        handle.shutdown().await;
        return Err(error.into());
    }
    tracing::info!(conversation_id, "message submitted");

    let Some(timeout) = wait else {
        handle.shutdown().await;
        return Ok(());
    };

    follow_turn(handle, printer, timeout).await
}

/// Print the view until the open agent turn closes, then shut it down. A
/// failed first-turn trigger is returned as an error.
async fn follow_turn(handle: ViewHandle, mut printer: WatchPrinter, timeout: Duration) -> Result<(), CliError> {
    let mut updates = handle.subscribe();
    let followed = tokio::time::timeout(timeout, async {
        loop {
            let state = updates.borrow_and_update().clone();
            emit(&mut printer, &state);
            if !state.turn_open || !state.mounted {
                return state;
            }
            if updates.changed().await.is_err() {
                return state;
            }
        }
    })
    .await;

    handle.shutdown().await;
    match followed {
        Ok(ViewState { last_error: Some(error @ ViewError::Trigger(_)), .. }) => Err(error.into()),
        Ok(_) => Ok(()),
        Err(_) => Err(CliError::Timeout),
    }
}

async fn run_trigger(ctx: &CliContext, conversation_id: &str) -> Result<(), CliError> {
    let ack = ctx.api()?.trigger_first_message(conversation_id).await?;
    print_json(&ack)
}

fn emit(printer: &mut WatchPrinter, state: &ViewState) {
    let output = printer.update(state);
    for line in output.status {
        eprintln!("{line}");
    }
    for line in output.transcript {
        println!("{line}");
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
