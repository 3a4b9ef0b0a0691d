//! Causeboard CLI - browse and edit the dashboard's lists from a terminal.
//!
//! One-shot commands (`list`, `show`, `create`, `update`, `delete`) run a
//! single query or mutation; `browse` keeps a list view open and reads
//! intents line by line from stdin.

mod credentials;
mod render;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use causeboard_core::{
    ApiClient, ApiError, Config, EntityId, EntityKind, FetchCache, FetchScope, ListBackend, ListConfig,
    ListController, MutationCoordinator, MutationError, MutationOutcome, MutationRequest, RawQuery,
    SortDirection, ViewState,
};
use credentials::CredentialStore;

// ============================================================================
// Constants
// ============================================================================

/// Overrides the configured API base URL
const API_URL_ENV: &str = "CAUSEBOARD_API_URL";

/// Bearer token to use instead of the keychain
const TOKEN_ENV: &str = "CAUSEBOARD_TOKEN";

/// Directory for daily-rotated log files; logs go to stderr when unset
const LOG_DIR_ENV: &str = "CAUSEBOARD_LOG_DIR";

/// How often `browse` evicts cache entries nobody is looking at
const JANITOR_INTERVAL_SECS: u64 = 60;

/// Buffered stdin lines for `browse`
const INPUT_BUFFER_SIZE: usize = 16;

const USAGE: &str = "\
Usage: causeboard <command> [options]

Commands:
  list <kind> [--search TEXT] [--filter FACET=VALUE]... [--sort KEY[:asc|desc]]
              [--page N] [--page-size N] [--client]
  browse <kind> [--client]
  show <kind> <id>
  create <kind> <json>
  update <kind> <id> <json>
  delete <kind> <id> [--yes]
  kinds
  login [username]
  logout

Kinds: events, programs, blogs, users, registrations, supporters, join-requests";

const BROWSE_HELP: &str = "\
  /TEXT         search (a lone / clears)
  f FACET=VAL   filter      f FACET   clear one facet      fc   clear all
  s KEY [DIR]   sort by KEY (again to flip), DIR is asc or desc
  n | p | g N   next, previous, go to page      ps N   page size
  o ID          open drawer       c   close drawer        u   reopen
  x ID          delete (asks for confirmation)
  r             refresh           q   quit";

// ============================================================================
// Command Line
// ============================================================================

#[derive(Debug)]
enum Command {
    List {
        kind: EntityKind,
        query: RawQuery,
        client_side: bool,
    },
    Browse {
        kind: EntityKind,
        client_side: bool,
    },
    Show {
        kind: EntityKind,
        id: EntityId,
    },
    Create {
        kind: EntityKind,
        payload: Value,
    },
    Update {
        kind: EntityKind,
        id: EntityId,
        payload: Value,
    },
    Delete {
        kind: EntityKind,
        id: EntityId,
        confirmed: bool,
    },
    Kinds,
    Login {
        username: Option<String>,
    },
    Logout,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match name.as_str() {
        "list" | "ls" => parse_list(rest),
        "browse" => {
            let (kind, rest) = take_kind(rest)?;
            let client_side = match rest {
                [] => false,
                [flag] if flag == "--client" => true,
                [other, ..] => bail!("Unexpected argument: {}", other),
            };
            Ok(Command::Browse { kind, client_side })
        }
        "show" => {
            let (kind, rest) = take_kind(rest)?;
            let (id, _) = take_id(rest)?;
            Ok(Command::Show { kind, id })
        }
        "create" => {
            let (kind, rest) = take_kind(rest)?;
            let payload = parse_payload(rest.first())?;
            Ok(Command::Create { kind, payload })
        }
        "update" => {
            let (kind, rest) = take_kind(rest)?;
            let (id, rest) = take_id(rest)?;
            let payload = parse_payload(rest.first())?;
            Ok(Command::Update { kind, id, payload })
        }
        "delete" | "rm" => {
            let (kind, rest) = take_kind(rest)?;
            let (id, rest) = take_id(rest)?;
            let confirmed = rest.iter().any(|arg| arg == "--yes" || arg == "-y");
            Ok(Command::Delete { kind, id, confirmed })
        }
        "kinds" => Ok(Command::Kinds),
        "login" => Ok(Command::Login {
            username: rest.first().cloned(),
        }),
        "logout" => Ok(Command::Logout),
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => bail!("Unknown command: {}", other),
    }
}

fn parse_list(args: &[String]) -> Result<Command> {
    let (kind, rest) = take_kind(args)?;
    let mut query = RawQuery::default();
    let mut client_side = false;

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--search" | "-s" => query.search = flag_value(&mut iter, arg)?.to_string(),
            "--filter" | "-f" => {
                let value = flag_value(&mut iter, arg)?;
                let (facet, value) = value
                    .split_once('=')
                    .ok_or_else(|| anyhow!("--filter expects FACET=VALUE, got '{}'", value))?;
                query.filters.push((facet.to_string(), value.to_string()));
            }
            "--sort" => {
                let value = flag_value(&mut iter, arg)?;
                let (key, direction) = match value.split_once(':') {
                    Some((key, direction)) => (
                        key,
                        Some(
                            SortDirection::parse(direction)
                                .ok_or_else(|| anyhow!("Unknown sort direction: {}", direction))?,
                        ),
                    ),
                    None => (value, None),
                };
                query.sort_key = Some(key.to_string());
                query.sort_direction = direction;
            }
            "--page" | "-p" => {
                let value = flag_value(&mut iter, arg)?;
                query.page = Some(value.parse().with_context(|| format!("Invalid page: {}", value))?);
            }
            "--page-size" => {
                let value = flag_value(&mut iter, arg)?;
                query.page_size = Some(value.parse().with_context(|| format!("Invalid page size: {}", value))?);
            }
            "--client" => client_side = true,
            other => bail!("Unexpected argument: {}", other),
        }
    }

    Ok(Command::List {
        kind,
        query,
        client_side,
    })
}

fn take_kind(args: &[String]) -> Result<(EntityKind, &[String])> {
    let (name, rest) = args.split_first().ok_or_else(|| anyhow!("Missing list kind"))?;
    let kind = EntityKind::parse(name).ok_or_else(|| anyhow!("Unknown list kind: {}", name))?;
    Ok((kind, rest))
}

fn take_id(args: &[String]) -> Result<(EntityId, &[String])> {
    let (id, rest) = args.split_first().ok_or_else(|| anyhow!("Missing record id"))?;
    Ok((EntityId::new(id.as_str()), rest))
}

fn flag_value<'a>(iter: &mut std::slice::Iter<'a, String>, flag: &str) -> Result<&'a str> {
    iter.next()
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn parse_payload(raw: Option<&String>) -> Result<Value> {
    let raw = raw.ok_or_else(|| anyhow!("Missing JSON payload"))?;
    let payload: Value = serde_json::from_str(raw).context("Payload is not valid JSON")?;
    if !payload.is_object() {
        bail!("Payload must be a JSON object");
    }
    Ok(payload)
}

// ============================================================================
// Startup
// ============================================================================

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the log file on drop.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=causeboard_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "causeboard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
            None
        }
    }
}

fn api_base_url(config: &Config) -> String {
    std::env::var(API_URL_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| config.api_base_url.clone())
}

/// API client carrying the session token, if one is available.
fn connect(config: &Config) -> Result<ApiClient> {
    let mut api = ApiClient::new(&api_base_url(config))?;

    let token = std::env::var(TOKEN_ENV)
        .ok()
        .filter(|token| !token.is_empty())
        .or_else(|| {
            let username = config.last_username.as_deref()?;
            match CredentialStore::get_token(username) {
                Ok(token) => Some(token),
                Err(e) => {
                    debug!(error = %e, "No stored token");
                    None
                }
            }
        });

    if let Some(token) = token {
        api.set_token(token);
    }
    if !api.has_token() {
        warn!("No session token; run 'causeboard login' for dashboard lists");
    }
    debug!(url = %api.base_url(), "API client ready");
    Ok(api)
}

fn list_config(kind: EntityKind, config: &Config, client_side: bool) -> ListConfig {
    let scope = if client_side { FetchScope::CLIENT } else { FetchScope::SERVER };
    ListConfig::from_config(kind, config).scope(scope)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });

    info!(?command, "causeboard starting");
    run(command, config).await
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
        Command::Kinds => {
            render::print_kinds();
            Ok(())
        }
        Command::Login { username } => login(config, username).await,
        Command::Logout => logout(&config),
        Command::List {
            kind,
            query,
            client_side,
        } => {
            let backend: Arc<dyn ListBackend> = Arc::new(connect(&config)?);
            let cache = FetchCache::new(config.cache.clone());
            let mut list = ListController::new(list_config(kind, &config, client_side), backend, cache);

            list.activate_with(query);
            let state = list.settle().await;
            render::print_list(&list);
            match (state, list.error()) {
                (ViewState::Error, Some(error)) => Err(explain(error)),
                _ => Ok(()),
            }
        }
        Command::Browse { kind, client_side } => {
            let backend: Arc<dyn ListBackend> = Arc::new(connect(&config)?);
            let cache = FetchCache::new(config.cache.clone());
            let coordinator = MutationCoordinator::new(Arc::clone(&backend), Arc::clone(&cache));
            let list = ListController::new(list_config(kind, &config, client_side), backend, Arc::clone(&cache));

            let janitor = cache.spawn_janitor(Duration::from_secs(JANITOR_INTERVAL_SECS));
            let result = browse(list, coordinator).await;
            janitor.abort();
            result
        }
        Command::Show { kind, id } => {
            let api = connect(&config)?;
            let item = api.fetch_one(kind, &id).await.map_err(|e| explain(&e))?;
            render::print_item(&item);
            Ok(())
        }
        Command::Create { kind, payload } => {
            mutate(&config, MutationRequest::create(kind, payload)).await
        }
        Command::Update { kind, id, payload } => {
            mutate(&config, MutationRequest::update(kind, id, payload)).await
        }
        Command::Delete { kind, id, confirmed } => {
            let confirmed = confirmed || confirm(&format!("Delete {} {}?", kind, id))?;
            if !confirmed {
                println!("Cancelled.");
                return Ok(());
            }
            mutate(&config, MutationRequest::delete(kind, id).confirm()).await
        }
    }
}

// ============================================================================
// Mutations
// ============================================================================

async fn mutate(config: &Config, request: MutationRequest) -> Result<()> {
    let backend: Arc<dyn ListBackend> = Arc::new(connect(config)?);
    let cache = FetchCache::new(config.cache.clone());
    let coordinator = MutationCoordinator::new(backend, cache);
    let outcome = coordinator.execute(request).await;
    report_mutation(outcome)
}

fn report_mutation(outcome: Result<MutationOutcome, MutationError>) -> Result<()> {
    match outcome {
        Ok(MutationOutcome::Created(item)) => {
            println!("Created {} #{}", item.display_name(), item.id());
            Ok(())
        }
        Ok(MutationOutcome::Updated(item)) => {
            println!("Updated {} #{}", item.display_name(), item.id());
            Ok(())
        }
        Ok(MutationOutcome::Deleted(id)) => {
            println!("Deleted #{}", id);
            Ok(())
        }
        Ok(MutationOutcome::AlreadyInFlight) => {
            println!("A change to this record is already in progress.");
            Ok(())
        }
        Err(e) if e.is_already_removed() => {
            // The list has been refreshed either way
            println!("{}", e);
            Ok(())
        }
        Err(e) => {
            if let Some(api) = e.api_error() {
                return Err(explain(api));
            }
            Err(e.into())
        }
    }
}

/// User-facing wording for API failures.
fn explain(error: &ApiError) -> anyhow::Error {
    match error {
        e if e.is_auth_expired() => anyhow!("Session expired. Run 'causeboard login' to sign in again."),
        ApiError::Network(_) => anyhow!("Unable to connect to server. Check your connection. ({})", error),
        other => anyhow!("{}", other),
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N]: ", question);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

// ============================================================================
// Session
// ============================================================================

async fn login(mut config: Config, username: Option<String>) -> Result<()> {
    println!("\n=== Causeboard Login ===\n");

    let username = match username.or_else(|| config.last_username.clone()) {
        Some(last) => {
            print!("Email [{}]: ", last);
            io::stdout().flush()?;
            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            let input = input.trim();
            if input.is_empty() {
                last
            } else {
                input.to_string()
            }
        }
        None => prompt_username()?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    println!("\nAuthenticating...");
    let api = ApiClient::new(&api_base_url(&config))?;
    let token = api.authenticate(&username, &password).await?;

    CredentialStore::store_token(&username, &token)?;
    config.last_username = Some(username);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Login successful!\n");
    Ok(())
}

fn prompt_username() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;
    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    let username = username.trim().to_string();
    if username.is_empty() {
        bail!("Email required");
    }
    Ok(username)
}

fn logout(config: &Config) -> Result<()> {
    let Some(username) = config.last_username.as_deref() else {
        println!("Not signed in.");
        return Ok(());
    };
    CredentialStore::delete(username)?;
    println!("Signed out {}.", username);
    Ok(())
}

// ============================================================================
// Browse
// ============================================================================

#[derive(Debug, PartialEq)]
enum BrowseAction {
    Search(String),
    Filter(String, String),
    ClearFilter(String),
    ClearFilters,
    Sort(String, Option<SortDirection>),
    PageSize(usize),
    NextPage,
    PrevPage,
    GoTo(usize),
    Open(EntityId),
    Close,
    Reopen,
    Delete(EntityId),
    Refresh,
    Help,
    Quit,
}

impl BrowseAction {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(text) = line.strip_prefix('/') {
            return Some(BrowseAction::Search(text.to_string()));
        }
        let (verb, arg) = match line.trim().split_once(' ') {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line.trim(), ""),
        };
        let action = match (verb, arg) {
            ("f", arg) if !arg.is_empty() => match arg.split_once('=') {
                Some((facet, value)) => BrowseAction::Filter(facet.to_string(), value.to_string()),
                None => BrowseAction::ClearFilter(arg.to_string()),
            },
            ("fc", "") => BrowseAction::ClearFilters,
            ("s", arg) if !arg.is_empty() => match arg.split_once(' ') {
                Some((key, direction)) => {
                    BrowseAction::Sort(key.to_string(), Some(SortDirection::parse(direction.trim())?))
                }
                None => BrowseAction::Sort(arg.to_string(), None),
            },
            ("ps", size) => BrowseAction::PageSize(size.parse().ok().filter(|&n: &usize| n > 0)?),
            ("n", "") => BrowseAction::NextPage,
            ("p", "") => BrowseAction::PrevPage,
            ("g", page) => BrowseAction::GoTo(page.parse().ok()?),
            ("o", id) if !id.is_empty() => BrowseAction::Open(EntityId::new(id)),
            ("c", "") => BrowseAction::Close,
            ("u", "") => BrowseAction::Reopen,
            ("x", id) if !id.is_empty() => BrowseAction::Delete(EntityId::new(id)),
            ("r", "") => BrowseAction::Refresh,
            ("?" | "h", "") => BrowseAction::Help,
            ("q", "") => BrowseAction::Quit,
            _ => return None,
        };
        Some(action)
    }
}

enum Wake {
    Line(Option<String>),
    View(bool),
}

/// Forward stdin lines from a blocking reader thread.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(INPUT_BUFFER_SIZE);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn browse(mut list: ListController, coordinator: MutationCoordinator) -> Result<()> {
    let mut input = spawn_stdin_reader();
    let mut pending_delete: Option<EntityId> = None;

    println!("{}\n", BROWSE_HELP);
    list.activate();
    render::print_list(&list);

    loop {
        let wake = tokio::select! {
            line = input.recv() => Wake::Line(line),
            changed = list.wait() => Wake::View(changed),
        };

        match wake {
            Wake::Line(None) => break,
            Wake::Line(Some(line)) => {
                if let Some(id) = pending_delete.take() {
                    if line.trim().eq_ignore_ascii_case("y") {
                        let request = MutationRequest::delete(list.kind(), id).confirm();
                        if let Err(e) = report_mutation(coordinator.execute(request).await) {
                            println!("{}", e);
                        }
                        list.pump();
                    } else {
                        println!("Cancelled.");
                    }
                    continue;
                }

                let Some(action) = BrowseAction::parse(&line) else {
                    println!("Unknown command. Type ? for help.");
                    continue;
                };
                match action {
                    BrowseAction::Search(text) if text.trim().is_empty() => list.clear_search(),
                    // Rendered once the quiet interval passes
                    BrowseAction::Search(text) => {
                        list.on_search_input(&text);
                        continue;
                    }
                    BrowseAction::Filter(facet, value) => list.set_filter(&facet, &value),
                    BrowseAction::ClearFilter(facet) => list.clear_filter(&facet),
                    BrowseAction::ClearFilters => list.clear_filters(),
                    BrowseAction::Sort(key, _) if !list.kind().has_field(&key) => {
                        println!("{} has no field '{}'.", list.kind().title(), key);
                        continue;
                    }
                    BrowseAction::Sort(key, Some(direction)) => list.set_sort(&key, direction),
                    BrowseAction::Sort(key, None) => list.toggle_sort(&key),
                    BrowseAction::PageSize(size) => list.set_page_size(size),
                    BrowseAction::NextPage => list.next_page(),
                    BrowseAction::PrevPage => list.prev_page(),
                    BrowseAction::GoTo(page) => list.set_page(page),
                    BrowseAction::Open(id) => {
                        if !list.select(&id) {
                            println!("#{} is not in this list.", id);
                            continue;
                        }
                        if let Some(item) = list.selected_item() {
                            render::print_item(item);
                        }
                        continue;
                    }
                    BrowseAction::Close => list.close_drawer(),
                    BrowseAction::Reopen => {
                        match list.reopen_drawer().then(|| list.selected_item()).flatten() {
                            Some(item) => render::print_item(item),
                            None => println!("Nothing selected."),
                        }
                        continue;
                    }
                    BrowseAction::Delete(id) => {
                        println!("Delete {} {}? [y/N]", list.kind(), id);
                        pending_delete = Some(id);
                        continue;
                    }
                    BrowseAction::Refresh => list.refresh(),
                    BrowseAction::Help => {
                        println!("{}", BROWSE_HELP);
                        continue;
                    }
                    BrowseAction::Quit => break,
                }
                render::print_list(&list);
            }
            Wake::View(true) if list.state() != ViewState::Loading => render::print_list(&list),
            Wake::View(_) => {}
        }
    }

    list.dispose();
    Ok(())
}
