//! boardsync CLI - follows board notifications from the terminal.
//!
//! This is the main binary entry point. See the `boardsync` library for the
//! core functionality.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use boardsync::auth::{self, FileTokenStore, TokenStore};
use boardsync::channel::pusher::ApiAuthorizer;
use boardsync::feedback::{FeedbackKind, TransientMessage};
use boardsync::notifications::{
    time_ago, AlertPresenter, FileStore, LogAlerts, NotificationCache, NotificationRecord,
};
use boardsync::{
    ApiClient, Config, FeedbackBus, FeedbackSink, NotificationStore, PusherTransport, Session,
};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI
#[derive(Parser)]
#[command(name = "boardsync")]
#[command(version = VERSION)]
#[command(about = "Real-time board notifications in your terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session token
    Login {
        /// Account email
        email: String,
        /// Password (read from BOARDSYNC_PASSWORD or prompted when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the session token and cached notifications
    Logout,
    /// Follow notifications live until interrupted
    Watch,
    /// Print the notification list
    List {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,
    },
    /// Mark one notification read
    Read {
        /// Notification id
        id: String,
    },
    /// Mark every notification read
    ReadAll,
    /// Remove one notification
    Dismiss {
        /// Notification id
        id: String,
    },
    /// Show or change configuration
    Config {
        key: Option<String>,
        value: Option<String>,
    },
}

/// Prints newly arrived notifications to stdout.
struct StdoutAlerts;

impl AlertPresenter for StdoutAlerts {
    fn present(&self, record: &NotificationRecord) {
        println!("* {} [{}]", record.text, record.id);
    }
}

/// Shared wiring for every command that talks to the server.
struct App {
    config: Config,
    tokens: Arc<FileTokenStore>,
    api: ApiClient,
    // Kept alive so feedback stays registered on the bus.
    _feedback: FeedbackSink,
}

impl App {
    fn new() -> Result<Self> {
        let config = Config::load()?;
        let tokens = Arc::new(FileTokenStore::in_config_dir()?);
        let bus = FeedbackBus::global();
        let feedback = FeedbackSink::attach(bus, config.feedback_expiry());
        spawn_feedback_renderer(&feedback);
        let api = ApiClient::new(&config, Arc::clone(&tokens) as Arc<dyn TokenStore>, bus.clone())?;
        Ok(Self {
            config,
            tokens,
            api,
            _feedback: feedback,
        })
    }

    /// Opens the store for `user`, dropping a list cached for anyone else.
    fn store(
        &self,
        user: &auth::User,
        alerts: Arc<dyn AlertPresenter>,
    ) -> Result<NotificationStore<ApiClient>> {
        let cache = NotificationCache::new(Arc::new(FileStore::in_config_dir()?));
        cache.claim(user.id)?;
        Ok(NotificationStore::open(Arc::new(self.api.clone()), cache, alerts))
    }

    fn require_user(&self) -> Result<auth::User> {
        match (self.tokens.get_token(), self.tokens.user()) {
            (Some(_), Some(user)) => Ok(user),
            _ => anyhow::bail!("Not logged in. Run `boardsync login <email>` first."),
        }
    }
}

/// Renders feedback banners on stderr. Loading banners are only logged.
fn spawn_feedback_renderer(sink: &FeedbackSink) {
    let mut rx = sink.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let message: Option<TransientMessage> = rx.borrow_and_update().clone();
            match message {
                Some(m) if m.kind == FeedbackKind::Loading => log::debug!("{}", m.text),
                Some(m) => eprintln!("[{}] {}", m.kind, m.text),
                None => {}
            }
        }
    });
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var("BOARDSYNC_PASSWORD") {
        return Ok(password);
    }
    print!("Password: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_records(records: &[NotificationRecord], unread_only: bool) {
    let now = chrono::Utc::now();
    let mut shown = 0;
    for record in records.iter().filter(|r| !unread_only || !r.read) {
        let marker = if record.read { ' ' } else { '*' };
        println!(
            "{marker} {:<12} {:<16} {}",
            record.id,
            time_ago(record.created_at, now),
            record.text
        );
        shown += 1;
    }
    if shown == 0 {
        println!("No notifications.");
    }
}

async fn run_watch(app: &App) -> Result<()> {
    let user = app.require_user()?;
    if app.config.push.app_key.is_empty() {
        anyhow::bail!("Push app key not configured. Run `boardsync config push.app_key <key>`.");
    }

    let authorizer = ApiAuthorizer::new(app.api.clone(), app.config.push_auth_url());
    let transport = Arc::new(PusherTransport::connect(&app.config.push, Arc::new(authorizer)));
    let mut session = Session::new(transport, app.store(&user, Arc::new(StdoutAlerts))?);

    println!("Watching notifications for {} (Ctrl-C to stop)...", user.name);
    session.start(user.id).await;
    print_records(session.store().records(), false);

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    session.run(shutdown).await;
    session.end(false);
    println!("Stopped.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr, or to BOARDSYNC_LOG_FILE when set so `watch` output stays clean
    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Ok(path) = std::env::var("BOARDSYNC_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        logger.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    logger.format_timestamp_secs().init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Login { email, password } => {
            let app = App::new()?;
            let password = match password {
                Some(p) => p,
                None => read_password()?,
            };
            let user = auth::login(&app.api, &email, &password).await?;
            if NotificationCache::new(Arc::new(FileStore::in_config_dir()?)).claim(user.id)? {
                log::info!("Dropped notifications cached for the previous account");
            }
            println!("Logged in as {} (user {}).", user.name, user.id);
        }
        Commands::Logout => {
            let tokens = FileTokenStore::in_config_dir()?;
            auth::logout(&tokens)?;
            NotificationCache::new(Arc::new(FileStore::in_config_dir()?)).clear()?;
            println!("Logged out.");
        }
        Commands::Watch => {
            let app = App::new()?;
            run_watch(&app).await?;
        }
        Commands::List { unread } => {
            let app = App::new()?;
            let user = app.require_user()?;
            let mut store = app.store(&user, Arc::new(LogAlerts))?;
            if let Err(e) = store.hydrate().await {
                eprintln!("Showing cached notifications: {e}");
            }
            print_records(store.records(), unread);
            println!("{} unread.", store.unread_count());
        }
        Commands::Read { id } => {
            let app = App::new()?;
            let user = app.require_user()?;
            let mut store = app.store(&user, Arc::new(LogAlerts))?;
            store.mark_read(&id).await?;
            println!("Marked {id} read.");
        }
        Commands::ReadAll => {
            let app = App::new()?;
            let user = app.require_user()?;
            let mut store = app.store(&user, Arc::new(LogAlerts))?;
            store.mark_all_read().await?;
            println!("Marked all read.");
        }
        Commands::Dismiss { id } => {
            let app = App::new()?;
            let user = app.require_user()?;
            let mut store = app.store(&user, Arc::new(LogAlerts))?;
            store.dismiss(&id).await?;
            println!("Dismissed {id}.");
        }
        Commands::Config { key, value } => {
            let mut config = Config::load()?;
            match (key, value) {
                (None, _) => println!("{}", serde_json::to_string_pretty(&config)?),
                (Some(k), None) => match config.get(&k) {
                    Some(v) => println!("{v}"),
                    None => println!("Config key '{k}' is not set"),
                },
                (Some(k), Some(v)) => {
                    config.set(&k, &v)?;
                    config.save()?;
                    println!("Set {k} = {v}");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["boardsync", "list", "--unread"]).unwrap();
        assert!(matches!(cli.command, Commands::List { unread: true }));

        let cli = Cli::try_parse_from(["boardsync", "read", "42"]).unwrap();
        assert!(matches!(cli.command, Commands::Read { id } if id == "42"));

        let cli = Cli::try_parse_from(["boardsync", "config", "push.app_key", "k"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config { key: Some(_), value: Some(_) }
        ));

        assert!(Cli::try_parse_from(["boardsync", "dismiss"]).is_err());
    }
}
