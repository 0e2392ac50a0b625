//! parley-chat - terminal chat client for a Parley gateway.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use parley_client::interrupt::validate_interrupt;
use parley_client::session::Navigator;
use parley_client::stream::{ControllerSettings, thread_view};
use parley_client::{
    AgentClient, AuthState, ClientConfig, InterruptView, JsonFileStorage, LivenessMonitor, Notice,
    Phase, SessionManager, StreamController, StreamState, ThreadList,
};
use parley_protocol::{ActionRequest, HumanResponse, Message, MessageType};
use uuid::Uuid;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = ChatContext::new(cli.config.as_deref())?;
    match cli.command {
        Command::Login { phone, code } => handle_login(&ctx, &phone, code).await,
        Command::Logout => handle_logout(&ctx).await,
        Command::Status => handle_status(&ctx, cli.json).await,
        Command::Threads => handle_threads(&ctx, cli.json).await,
        Command::Send {
            message,
            thread,
        } => handle_send(&ctx, &message, thread.as_deref(), cli.json).await,
        Command::Resume {
            thread,
            decision,
            text,
        } => handle_resume(&ctx, &thread, decision, text, cli.json).await,
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "parley-chat",
    author,
    version,
    about = "Terminal chat client for a Parley gateway."
)]
struct Cli {
    /// Client config file (TOML)
    #[arg(long, short = 'c', env = "PARLEY_CLIENT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with a one-time code
    Login {
        /// Mobile phone number
        phone: String,
        /// Code already received; prompts for it after sending one otherwise
        #[arg(long)]
        code: Option<String>,
    },
    /// Sign out and forget stored credentials
    Logout,
    /// Show session and agent server status
    Status,
    /// List recent threads
    Threads,
    /// Send a message and stream the reply
    Send {
        message: String,
        /// Continue an existing thread
        #[arg(long, short = 't')]
        thread: Option<String>,
    },
    /// Answer a pending interrupt
    Resume {
        /// Thread waiting for input
        #[arg(long, short = 't')]
        thread: String,
        #[arg(value_enum)]
        decision: Decision,
        /// Reply text, or edited action arguments as JSON
        text: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Decision {
    Accept,
    Ignore,
    Respond,
    Edit,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init()
        .ok();
}

/// Prints instead of navigating.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn hard_redirect(&self, _path: &str) {
        eprintln!("Signed out. Run `parley-chat login <phone>` to sign in again.");
    }
}

struct ChatContext {
    config: ClientConfig,
    session: Arc<SessionManager>,
}

impl ChatContext {
    fn new(config_path: Option<&std::path::Path>) -> Result<Self> {
        let mut config = ClientConfig::load(config_path).context("loading client config")?;
        let path = config
            .resolved_storage_path()
            .ok_or_else(|| anyhow!("unable to determine a data directory for client storage"))?;
        let storage = Arc::new(JsonFileStorage::open(&path)?);
        config.apply_stored(storage.as_ref());

        let session = SessionManager::new(&config.session_url, storage, Arc::new(TerminalNavigator))
            .with_connect_timeout(config.connect_timeout())?;
        session.restore();

        Ok(Self {
            config,
            session: Arc::new(session),
        })
    }

    fn require_login(&self) -> Result<()> {
        if !self.session.is_logged_in() {
            bail!("not logged in; run `parley-chat login <phone>` first");
        }
        Ok(())
    }

    fn agent(&self) -> Result<Arc<AgentClient>> {
        let client = AgentClient::new(&self.config.api_url, self.config.connect_timeout())?
            .with_api_key(self.config.api_key.clone())
            .with_session(self.session.clone());
        Ok(Arc::new(client))
    }

    fn controller(&self) -> Result<StreamController> {
        Ok(StreamController::new(
            self.agent()?,
            None,
            ControllerSettings::from_config(&self.config),
        ))
    }
}

async fn handle_login(ctx: &ChatContext, phone: &str, code: Option<String>) -> Result<()> {
    let code = match code {
        Some(code) => code,
        None => {
            let sent = ctx
                .session
                .request_code(phone)
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            println!("{}", sent.message);
            if let Some(code) = sent.code {
                println!("Code (development only): {code}");
            }
            prompt("Enter code: ")?
        }
    };

    let session = ctx
        .session
        .verify_and_login(phone, &code)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    println!("Logged in as {}", session.user_id);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn handle_logout(ctx: &ChatContext) -> Result<()> {
    ctx.session.logout();
    // let the detached logout notification go out before the runtime stops
    tokio::time::sleep(Duration::from_millis(250)).await;
    Ok(())
}

async fn handle_status(ctx: &ChatContext, json: bool) -> Result<()> {
    let (logged_in, user) = match ctx.session.state() {
        AuthState::LoggedIn(session) => (true, Some(session.user_id)),
        _ => (false, None),
    };
    let valid = if logged_in {
        match ctx.session.check_auth_status().await {
            Ok(status) => Some(status.is_authenticated),
            Err(e) => {
                eprintln!("Session check failed: {}", e.user_message());
                None
            }
        }
    } else {
        None
    };
    let agent_ok = ctx.agent()?.info().await.is_ok();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "logged_in": logged_in,
                "user_id": user,
                "session_valid": valid,
                "agent_reachable": agent_ok,
                "api_url": ctx.config.api_url,
            })
        );
    } else {
        match user {
            Some(user) => println!("Logged in as {user}"),
            None => println!("Not logged in"),
        }
        if let Some(valid) = valid {
            println!("Session valid: {valid}");
        }
        println!(
            "Agent server {}: {}",
            ctx.config.api_url,
            if agent_ok { "ok" } else { "unreachable" }
        );
    }
    Ok(())
}

async fn handle_threads(ctx: &ChatContext, json: bool) -> Result<()> {
    ctx.require_login()?;
    let threads = ThreadList::new(ctx.agent()?, &ctx.config.assistant_id);
    if !threads.refresh().await {
        bail!("could not load threads from {}", ctx.config.api_url);
    }

    let threads = threads.threads();
    if json {
        println!("{}", serde_json::to_string_pretty(&threads)?);
        return Ok(());
    }
    if threads.is_empty() {
        println!("No threads");
    }
    for thread in threads {
        println!(
            "{}  {}",
            thread.thread_id,
            thread.updated_at.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn handle_send(
    ctx: &ChatContext,
    message: &str,
    thread: Option<&str>,
    json: bool,
) -> Result<()> {
    ctx.require_login()?;
    let monitor = LivenessMonitor::spawn(ctx.session.clone(), ctx.config.auth_check_interval());
    let controller = ctx.controller()?;

    if !controller.probe_health().await
        && let Some(warning) = controller.state().health_warning
    {
        eprintln!("Warning: {warning}");
    }
    if let Some(thread) = thread {
        controller
            .load_thread(thread)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;
    }

    let human = Message::human(Uuid::new_v4().to_string(), message);
    let result = run_turn(&controller, json, || controller.submit(vec![human])).await;
    monitor.shutdown().await;
    result
}

async fn handle_resume(
    ctx: &ChatContext,
    thread: &str,
    decision: Decision,
    text: Option<String>,
    json: bool,
) -> Result<()> {
    ctx.require_login()?;
    let controller = ctx.controller()?;
    controller
        .load_thread(thread)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    let response = match decision {
        Decision::Accept => HumanResponse::Accept,
        Decision::Ignore => HumanResponse::Ignore,
        Decision::Respond => HumanResponse::Response(
            text.ok_or_else(|| anyhow!("a reply text is required for `respond`"))?,
        ),
        Decision::Edit => {
            let pending = controller
                .state()
                .interrupt
                .ok_or_else(|| anyhow!("thread {thread} is not waiting for input"))?;
            let interrupt = validate_interrupt(&pending).map_err(|e| anyhow!(e.user_message()))?;
            let args = text.ok_or_else(|| anyhow!("edited arguments are required for `edit`"))?;
            HumanResponse::Edit(ActionRequest {
                action: interrupt.action_request.action,
                args: serde_json::from_str(&args).context("parsing edited arguments as JSON")?,
            })
        }
    };

    run_turn(&controller, json, || controller.resume(response)).await
}

/// Start a run with `start` and print its output until it settles. Ctrl-C
/// stops the run.
async fn run_turn<F, Fut>(controller: &StreamController, json: bool, start: F) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), parley_client::ClientError>>,
{
    let mut states = controller.subscribe();
    let mut notices = controller.notices();
    let mut printed: HashSet<String> = controller
        .state()
        .messages
        .iter()
        .filter_map(|m| m.id.clone())
        .collect();

    start().await.map_err(|e| anyhow!(e.user_message()))?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nStopping...");
                controller.stop().await;
                break;
            }
            notice = notices.recv() => {
                if let Ok(Notice::Error(message)) = notice {
                    eprintln!("Error: {message}");
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if !json {
                    print_new_messages(&state, &mut printed);
                }
                if state.phase != Phase::Streaming {
                    break;
                }
            }
        }
    }

    let state = controller.state();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "thread_id": state.thread_id,
                "messages": state.messages,
                "interrupt": state.interrupt,
                "error": state.error,
            }))?
        );
        return Ok(());
    }

    print_new_messages(&state, &mut printed);
    if let Some(interrupt) = thread_view(&state).interrupt {
        print_interrupt(&interrupt);
    }
    if let Some(thread_id) = &state.thread_id {
        eprintln!("[thread {thread_id}]");
    }
    Ok(())
}

fn print_new_messages(state: &StreamState, printed: &mut HashSet<String>) {
    for message in thread_view(state).messages {
        let Some(id) = &message.id else { continue };
        if message.kind == MessageType::Human || !printed.insert(id.clone()) {
            continue;
        }
        match message.kind {
            MessageType::Tool => println!(
                "[tool {}] {}",
                message.name.as_deref().unwrap_or("?"),
                message.text()
            ),
            _ => {
                if let Some(reasoning) = message.reasoning_content() {
                    println!("\x1b[2m{reasoning}\x1b[0m");
                }
                for call in &message.tool_calls {
                    println!("[calling {}] {}", call.name, call.args);
                }
                let text = message.text();
                if !text.is_empty() {
                    println!("{text}");
                }
            }
        }
    }
}

fn print_interrupt(interrupt: &InterruptView) {
    match interrupt {
        InterruptView::Human(interrupt) => {
            println!(
                "\nThe agent wants to run `{}` with {}",
                interrupt.action_request.action, interrupt.action_request.args
            );
            if let Some(description) = &interrupt.description {
                println!("{description}");
            }
            let config = interrupt.config;
            let allowed: Vec<&str> = [
                (config.allow_accept, "accept"),
                (config.allow_edit, "edit"),
                (config.allow_respond, "respond"),
                (config.allow_ignore, "ignore"),
            ]
            .into_iter()
            .filter_map(|(allowed, name)| allowed.then_some(name))
            .collect();
            println!("Answer with `parley-chat resume -t <thread> <{}>`", allowed.join("|"));
        }
        InterruptView::Generic(value) => {
            println!("\nThe agent paused: {value}");
        }
    }
}
