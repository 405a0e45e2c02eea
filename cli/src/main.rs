use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use courierhub::api::{ApiClient, ApiError, BookingRequest, Parcel};
use courierhub::config::ClientConfig;
use courierhub::realtime::{Connection, NoticeFeed, TrackingScope, TrackingSubscription, TransportState, get_connection};
use courierhub::session::{self, Role, SessionError};
use courierhub::state::TrackingView;
use courierhub::{ActionError, Actions};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use wire::events::{ParcelStatus, Priority};

/// How long a one-shot command waits for its events to reach the server.
const EMIT_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("not signed in; run `courierhub login` first")]
    NotSignedIn,
    #[error("no parcel with tracking number {0}")]
    ParcelNotFound(String),
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "courierhub", about = "CourierHub parcel tracking client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session.
    Login {
        #[arg(long, env = "COURIER_EMAIL")]
        email: String,
        #[arg(long, env = "COURIER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// List parcels visible to the signed-in role.
    Parcels,
    /// Look a parcel up by tracking number.
    Search { tracking_number: String },
    /// Follow live updates for a parcel.
    Track(TrackArgs),
    /// Book a parcel.
    Book(BookArgs),
    Agent(AgentCommand),
    Admin(AdminCommand),
    /// Raw REST call, e.g. `api GET /parcels/my-parcels`.
    Api {
        method: String,
        endpoint: String,
        #[arg(long)]
        data: Option<String>,
    },
}

#[derive(Args, Debug)]
struct TrackArgs {
    parcel_id: String,
    /// Stop after this many live updates.
    #[arg(long)]
    max_updates: Option<usize>,
    /// Override the event subset derived from the signed-in role.
    #[arg(long, value_enum)]
    scope: Option<ScopeArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Full,
    Status,
}

impl From<ScopeArg> for TrackingScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Full => Self::Full,
            ScopeArg::Status => Self::StatusOnly,
        }
    }
}

#[derive(Args, Debug)]
struct BookArgs {
    #[arg(long)]
    pickup_address: String,
    #[arg(long)]
    pickup_city: String,
    #[arg(long)]
    delivery_address: String,
    #[arg(long)]
    delivery_city: String,
    #[arg(long, default_value = "package")]
    parcel_type: String,
    #[arg(long)]
    weight: f64,
    #[arg(long, default_value = "prepaid")]
    payment_method: String,
    #[arg(long)]
    cod_amount: Option<f64>,
    #[arg(long)]
    shipping_cost: f64,
}

#[derive(Args, Debug)]
struct AgentCommand {
    #[command(subcommand)]
    command: AgentSubcommand,
}

#[derive(Subcommand, Debug)]
enum AgentSubcommand {
    /// Parcels assigned to the signed-in agent, in route order.
    Route,
    /// Share the current position for a parcel.
    Location {
        parcel_id: String,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },
    /// Move a parcel to a new status.
    Status {
        parcel_id: String,
        status: ParcelStatus,
        /// Required when the status is `failed`.
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Args, Debug)]
struct AdminCommand {
    #[command(subcommand)]
    command: AdminSubcommand,
}

#[derive(Subcommand, Debug)]
enum AdminSubcommand {
    Metrics,
    Users,
    /// Announce a message to every connected user.
    Broadcast {
        message: String,
        #[arg(long, value_enum, default_value_t = PriorityArg::Info)]
        priority: PriorityArg,
    },
    Assign {
        parcel_id: String,
        agent_id: String,
    },
    Unassign {
        parcel_id: String,
    },
    /// Print dashboard notices as they arrive.
    Notices {
        #[arg(long)]
        count: Option<usize>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PriorityArg {
    Info,
    Warning,
    Critical,
}

impl From<PriorityArg> for Priority {
    fn from(priority: PriorityArg) -> Self {
        match priority {
            PriorityArg::Info => Self::Info,
            PriorityArg::Warning => Self::Warning,
            PriorityArg::Critical => Self::Critical,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();
    let api = ApiClient::new(&config, session::store())?;

    match cli.command {
        Command::Login { email, password } => run_login(&api, &email, &password).await,
        Command::Logout => {
            api.session().clear()?;
            println!("signed out");
            Ok(())
        }
        Command::Whoami => run_whoami(&api),
        Command::Parcels => run_parcels(&api).await,
        Command::Search { tracking_number } => run_search(&api, &tracking_number).await,
        Command::Track(args) => run_track(&api, args).await,
        Command::Book(args) => run_book(api, args).await,
        Command::Agent(agent) => run_agent(api, agent).await,
        Command::Admin(admin) => run_admin(api, admin).await,
        Command::Api { method, endpoint, data } => run_api(&api, &method, &endpoint, data.as_deref()).await,
    }
}

// =============================================================================
// SESSION
// =============================================================================

async fn run_login(api: &ApiClient, email: &str, password: &str) -> Result<(), CliError> {
    let session = api.login(email, password).await?;
    let user = session.user.ok_or(CliError::NotSignedIn)?;
    println!("signed in as {} ({:?}); landing page {}", user.name, user.role, user.role.landing_path());
    Ok(())
}

fn run_whoami(api: &ApiClient) -> Result<(), CliError> {
    let user = api.session().user().ok_or(CliError::NotSignedIn)?;
    println!("{} <{}> {:?} id={}", user.name, user.email, user.role, user.id);
    Ok(())
}

fn signed_in_role(api: &ApiClient) -> Result<Role, CliError> {
    api.session().user().map(|u| u.role).ok_or(CliError::NotSignedIn)
}

// =============================================================================
// PARCELS
// =============================================================================

async fn run_parcels(api: &ApiClient) -> Result<(), CliError> {
    let parcels = match signed_in_role(api)? {
        Role::Customer => api.my_parcels().await?,
        Role::Agent => api.assigned_parcels().await?,
        Role::Admin => api.admin_parcels().await?,
    };
    print_parcels(&parcels);
    Ok(())
}

async fn run_search(api: &ApiClient, tracking_number: &str) -> Result<(), CliError> {
    let parcel = api
        .search_parcel(tracking_number)
        .await?
        .ok_or_else(|| CliError::ParcelNotFound(tracking_number.to_owned()))?;
    print_parcels(std::slice::from_ref(&parcel));
    Ok(())
}

async fn run_track(api: &ApiClient, args: TrackArgs) -> Result<(), CliError> {
    let scope = match args.scope {
        Some(scope) => scope.into(),
        None => TrackingScope::for_role(api.session().user().map(|u| u.role).unwrap_or_default()),
    };
    let subscription = TrackingSubscription::open(get_connection(), &args.parcel_id, scope);
    if let Err(e) = subscription.refresh(api).await {
        tracing::warn!(parcel_id = %args.parcel_id, error = %e, "could not load parcel; waiting for live updates");
    }
    let snapshot = subscription.view();
    print_snapshot(&snapshot);

    let mut view = subscription.watch();
    let mut printed = view.borrow_and_update().updates.len();
    let mut live = 0_usize;
    let finished = snapshot.status.is_some_and(ParcelStatus::is_terminal);
    while !finished {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                for update in current.updates.iter().skip(printed) {
                    println!("{} [{}] {}", update.timestamp, update.kind, update.message);
                    live += 1;
                }
                printed = current.updates.len();
                if current.status.is_some_and(ParcelStatus::is_terminal) || args.max_updates.is_some_and(|max| live >= max) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(subscription);
    settle(get_connection()).await;
    Ok(())
}

async fn run_book(api: ApiClient, args: BookArgs) -> Result<(), CliError> {
    let booking = BookingRequest {
        pickup_address: args.pickup_address,
        pickup_city: args.pickup_city,
        delivery_address: args.delivery_address,
        delivery_city: args.delivery_city,
        parcel_type: args.parcel_type,
        weight: args.weight,
        payment_method: args.payment_method,
        cod_amount: args.cod_amount,
        shipping_cost: args.shipping_cost,
    };
    let actions = Actions::new(api, get_connection().clone());
    let parcel = actions.book_parcel(&booking).await?;
    println!("booked {} (tracking number {})", parcel.id, parcel.tracking_number);
    settle(actions.connection()).await;
    Ok(())
}

// =============================================================================
// AGENT
// =============================================================================

async fn run_agent(api: ApiClient, agent: AgentCommand) -> Result<(), CliError> {
    match agent.command {
        AgentSubcommand::Route => {
            let parcels = api.assigned_parcels().await?;
            print_parcels(&parcels);
            Ok(())
        }
        AgentSubcommand::Location {
            parcel_id,
            latitude,
            longitude,
        } => {
            let actions = Actions::new(api, get_connection().clone());
            actions.share_location(&parcel_id, latitude, longitude).await?;
            println!("location updated for {parcel_id}: ({latitude:.5}, {longitude:.5})");
            settle(actions.connection()).await;
            Ok(())
        }
        AgentSubcommand::Status {
            parcel_id,
            status,
            reason,
        } => {
            let previous = match api.parcel(&parcel_id).await {
                Ok(parcel) => Some(parcel.status),
                Err(e) => {
                    tracing::warn!(%parcel_id, error = %e, "could not read current status");
                    None
                }
            };
            let actions = Actions::new(api, get_connection().clone());
            actions
                .set_status(&parcel_id, status, previous, reason.as_deref())
                .await?;
            println!("{parcel_id} is now {status}");
            settle(actions.connection()).await;
            Ok(())
        }
    }
}

// =============================================================================
// ADMIN
// =============================================================================

async fn run_admin(api: ApiClient, admin: AdminCommand) -> Result<(), CliError> {
    match admin.command {
        AdminSubcommand::Metrics => print_json(&api.admin_metrics().await?),
        AdminSubcommand::Users => {
            for user in api.admin_users().await? {
                println!("{}\t{:?}\t{}\t{}", user.id, user.role, user.name, user.email);
            }
            Ok(())
        }
        AdminSubcommand::Broadcast { message, priority } => {
            let actions = Actions::new(api, get_connection().clone());
            actions.broadcast(&message, priority.into());
            settle(actions.connection()).await;
            Ok(())
        }
        AdminSubcommand::Assign { parcel_id, agent_id } => {
            let parcel = api.parcel(&parcel_id).await?;
            let agent_name = api
                .admin_users()
                .await?
                .into_iter()
                .find(|user| user.id == agent_id)
                .map_or_else(|| agent_id.clone(), |user| user.name);
            let actions = Actions::new(api, get_connection().clone());
            actions.assign_agent(&parcel, &agent_id, &agent_name).await?;
            println!("assigned {agent_name} to {parcel_id}");
            settle(actions.connection()).await;
            Ok(())
        }
        AdminSubcommand::Unassign { parcel_id } => print_json(&api.remove_assignment(&parcel_id).await?),
        AdminSubcommand::Notices { count } => run_notices(get_connection(), count).await,
    }
}

async fn run_notices(connection: &Connection, count: Option<usize>) -> Result<(), CliError> {
    let feed = NoticeFeed::open(connection);
    let mut notices = feed.watch();
    let mut last_seq = 0_u64;
    let mut seen = 0_usize;
    loop {
        tokio::select! {
            changed = notices.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = notices.borrow_and_update().clone();
                for notice in NoticeFeed::newer_than(&snapshot, last_seq) {
                    println!("{} [{:?}] {}: {}", notice.received_at, notice.priority, notice.event, notice.message);
                    last_seq = notice.seq;
                    seen += 1;
                    if count.is_some_and(|max| seen >= max) {
                        return Ok(());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

// =============================================================================
// RAW API
// =============================================================================

async fn run_api(api: &ApiClient, method: &str, endpoint: &str, data: Option<&str>) -> Result<(), CliError> {
    let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(method.to_owned()))?;
    let body = data.map(serde_json::from_str::<Value>).transpose()?;
    let response = api.request(method, endpoint, body.as_ref()).await?;
    print_json(&response)
}

// =============================================================================
// OUTPUT
// =============================================================================

/// Give queued events a bounded chance to reach the server, then close.
async fn settle(connection: &Connection) {
    match tokio::time::timeout(EMIT_GRACE, connection.flush()).await {
        Ok(true) => {}
        Ok(false) | Err(_) => tracing::warn!("realtime events were not delivered"),
    }
    connection.disconnect();
    let mut state = connection.watch_state();
    let _ = tokio::time::timeout(
        Duration::from_secs(1),
        state.wait_for(|state| *state == TransportState::Disconnected),
    )
    .await;
}

fn print_snapshot(view: &TrackingView) {
    let status = view.status.map_or("unknown", ParcelStatus::as_str);
    match view.location {
        Some(location) => println!(
            "{}: {status} at ({:.5}, {:.5})",
            view.parcel_id, location.latitude, location.longitude
        ),
        None => println!("{}: {status}", view.parcel_id),
    }
}

fn print_parcels(parcels: &[Parcel]) {
    for parcel in parcels {
        println!(
            "{}\t{}\t{}\t{} -> {}",
            parcel.id, parcel.tracking_number, parcel.status, parcel.pickup_city, parcel.delivery_city
        );
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
