use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};

use jersey_studio_config::workspace::format_last_save;
use jersey_studio_config::{JerseyView, StudioConfig, WorkspaceDoc, WorkspaceStore};
use jersey_studio_mod_history::config::canvas_doc_id;
use jersey_studio_mod_history::{CanvasHistory, HistoryConfig, HistoryStore};
use jersey_studio_points::plans::POINTS_PLANS;
use jersey_studio_points::pricing::{estimate_exports, format_currency, format_points};
use jersey_studio_points::{
    AuditStatus, AuthSession, ExportRequest, LedgerConfig, LedgerReceipt, LocalAccountStore,
    PointsAccount, PointsLedger,
};

/// Jersey design studio: export pricing, points accounts and canvas history.
#[derive(Parser, Debug)]
#[command(name = "jersey-studio", version, about)]
struct Cli {
    /// Config file to use instead of jersey-studio.json next to the executable.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Points needed for an export.
    Cost(CostArgs),

    /// Exports a balance pays for.
    Estimate { balance: u64 },

    /// List the points packages.
    Plans,

    /// Show or change a points account in the local store.
    Account(AccountArgs),

    /// Edit or inspect a persisted canvas history.
    Canvas(CanvasArgs),

    /// Show or clear the saved design workspace.
    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },
}

#[derive(Args, Debug)]
struct CostArgs {
    #[arg(long, default_value_t = 0)]
    front: u64,
    #[arg(long, default_value_t = 0)]
    back: u64,
    #[arg(long, default_value_t = 0)]
    sleeves: u64,
    #[arg(long, default_value_t = 0)]
    collars: u64,
    /// Full jerseys (front, back and both sleeves).
    #[arg(long, default_value_t = 0)]
    full: u64,
    /// Full jerseys including the collar.
    #[arg(long, default_value_t = 0)]
    full_with_collar: u64,
    /// Multiply everything by the roster size.
    #[arg(long, default_value_t = 1)]
    players: u64,
}

#[derive(Args, Debug)]
struct AccountArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    email: Option<String>,
    #[command(subcommand)]
    action: AccountAction,
}

#[derive(Subcommand, Debug)]
enum AccountAction {
    Show,
    /// Credit purchased (or, with --bonus, promotional) points.
    Add {
        points: u64,
        #[arg(long)]
        bonus: bool,
        #[arg(short = 'm', long = "message")]
        description: Option<String>,
    },
    /// Spend points.
    Deduct {
        points: u64,
        #[arg(short = 'm', long = "message")]
        description: Option<String>,
    },
    /// Return points spent on a failed export.
    Refund {
        points: u64,
        #[arg(short = 'm', long = "message")]
        description: Option<String>,
    },
    /// List the transaction log, newest first.
    History,
    /// Compare the balance with the transaction log.
    Reconcile,
}

#[derive(Args, Debug)]
struct CanvasArgs {
    /// Document id; defaults to the canvas of --player on --view.
    #[arg(long)]
    doc: Option<String>,
    #[arg(long, default_value_t = 0)]
    player: usize,
    #[arg(long)]
    view: Option<JerseyView>,
    #[command(subcommand)]
    action: CanvasAction,
}

#[derive(Subcommand, Debug)]
enum CanvasAction {
    /// Record a canvas state.
    Push { payload: String },
    Undo,
    Redo,
    Stats,
    /// Drop the document's history.
    Clear,
}

#[derive(Subcommand, Debug)]
enum WorkspaceAction {
    Show,
    /// Remove the saved workspace and every player canvas history.
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(StudioConfig::config_path);
    let config = StudioConfig::load_or_create(&config_path);

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!("Starting jersey-studio");
    let data_dir = config.resolve_data_dir();
    tracing::debug!(
        config = %config_path.display(),
        data_dir = %data_dir.display(),
        "Resolved paths"
    );

    match cli.command {
        Command::Cost(args) => print_cost(&args),
        Command::Estimate { balance } => print_estimate(balance),
        Command::Plans => print_plans(),
        Command::Account(args) => run_account(args, &config, &data_dir)?,
        Command::Canvas(args) => run_canvas(args, &config)?,
        Command::Workspace { action } => run_workspace(action, &data_dir)?,
    }
    Ok(())
}

fn print_cost(args: &CostArgs) {
    let request = ExportRequest {
        front: args.front,
        back: args.back,
        sleeves: args.sleeves,
        collars: args.collars,
        full_jerseys: args.full,
        full_jerseys_with_collar: args.full_with_collar,
    }
    .times(args.players);

    println!("{}", request.describe());
    println!("Cost: {} points", format_points(request.cost()));
}

fn print_estimate(balance: u64) {
    let estimate = estimate_exports(balance);
    println!("With {} points you can export:", format_points(balance));
    println!("  {:>8}  full jerseys", estimate.full_jersey);
    println!("  {:>8}  full jerseys with collar", estimate.full_jersey_with_collar);
    println!("  {:>8}  front images", estimate.front_only);
    println!("  {:>8}  back images", estimate.back_only);
    println!("  {:>8}  sleeves", estimate.sleeves);
    println!("  {:>8}  collars", estimate.collars);
}

fn print_plans() {
    for plan in &POINTS_PLANS {
        let marker = if plan.popular { " (popular)" } else { "" };
        println!("{} - {}{marker}", plan.name, plan.description);
        if plan.is_self_serve() {
            println!(
                "  {:>10}  {:>6} points  {}",
                format_currency(plan.price as f64),
                format_points(plan.total_points()),
                plan.value
            );
            if let Some(savings) = plan.savings_percent().filter(|s| *s > 0) {
                println!("  {savings}% off per point with the bonus");
            }
        } else {
            println!("  {}", plan.value);
        }
    }
}

fn print_account(account: &PointsAccount) {
    println!("User:      {}", account.user_id);
    println!("Balance:   {} points", format_points(account.balance));
    println!("Purchased: {}", format_points(account.total_purchased));
    println!("Used:      {}", format_points(account.total_used));
    if let Some(updated_at) = account.updated_at {
        println!("Updated:   {}", updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

fn print_receipt(receipt: &LedgerReceipt) {
    println!(
        "{} {:+} points: {}",
        receipt.transaction.kind, receipt.transaction.amount, receipt.transaction.description
    );
    println!("Balance: {} points", format_points(receipt.account.balance));
    if let AuditStatus::Pending { reason } = &receipt.audit {
        println!("Transaction log not updated yet: {reason}");
    }
}

fn run_account(args: AccountArgs, config: &StudioConfig, data_dir: &Path) -> Result<()> {
    let store = LocalAccountStore::open(data_dir)?;
    let mut ledger = PointsLedger::new(store, LedgerConfig::from_studio(config));
    ledger
        .sign_in(AuthSession::new(args.user, args.email))
        .context("Failed to open points account")?;

    match args.action {
        AccountAction::Show => {
            if let Some(account) = ledger.account() {
                print_account(account);
            }
            if ledger.is_premium() {
                println!("Premium account");
            }
        }
        AccountAction::Add {
            points,
            bonus,
            description,
        } => {
            let receipt = if bonus {
                ledger.add_bonus(points, description.as_deref().unwrap_or("Bonus points"))?
            } else {
                ledger.add(points, description.as_deref().unwrap_or("Points purchase"))?
            };
            print_receipt(&receipt);
        }
        AccountAction::Deduct {
            points,
            description,
        } => {
            let receipt = ledger.deduct(points, description.as_deref().unwrap_or("Points used"))?;
            print_receipt(&receipt);
        }
        AccountAction::Refund {
            points,
            description,
        } => {
            let receipt = ledger.refund(points, description.as_deref().unwrap_or("Refund"))?;
            print_receipt(&receipt);
        }
        AccountAction::History => {
            for tx in ledger.transactions()? {
                println!(
                    "{}  {:<8} {:>+8}  {}",
                    tx.occurred_at.format("%Y-%m-%d %H:%M"),
                    tx.kind,
                    tx.amount,
                    tx.description
                );
            }
        }
        AccountAction::Reconcile => {
            let report = ledger.reconcile()?;
            println!("Balance:        {}", report.balance);
            println!("Logged total:   {} ({} entries)", report.logged_total, report.logged_count);
            println!("Pending total:  {} ({} entries)", report.pending_total, report.pending_count);
            if report.is_consistent() {
                println!("Consistent");
            } else {
                println!("Drift: {}", report.drift());
            }
        }
    }
    Ok(())
}

fn run_canvas(args: CanvasArgs, config: &StudioConfig) -> Result<()> {
    let doc_id = match (args.doc, args.view) {
        (Some(doc), _) => doc,
        (None, Some(view)) => canvas_doc_id(args.player, view),
        (None, None) => anyhow::bail!("Pass --doc or --view to pick a canvas"),
    };

    let history_config = HistoryConfig::from_studio(config);
    let store = HistoryStore::open(&history_config.data_dir)?;
    let mut history = CanvasHistory::load_or_new(doc_id, &history_config, Some(store))?;

    match args.action {
        CanvasAction::Push { payload } => history.push(payload),
        CanvasAction::Undo => match history.undo() {
            Some(snapshot) => println!("{}", snapshot.payload),
            None => println!("Nothing to undo"),
        },
        CanvasAction::Redo => match history.redo() {
            Some(snapshot) => println!("{}", snapshot.payload),
            None => println!("Nothing to redo"),
        },
        CanvasAction::Stats => {
            let stats = history.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        CanvasAction::Clear => history.clear()?,
    }

    history.flush()?;
    Ok(())
}

fn run_workspace(action: WorkspaceAction, data_dir: &Path) -> Result<()> {
    let workspace = WorkspaceStore::open(&WorkspaceStore::workspace_path(data_dir))?;

    match action {
        WorkspaceAction::Show => match workspace.load_state()? {
            Some(state) => {
                println!("Session:  {}", state.session_id);
                println!("Step:     {}", state.current_step);
                println!("Player:   {}", state.selected_player_index);
                println!("Saved:    {}", format_last_save(state.last_save(), Utc::now()));
                for doc in WorkspaceDoc::ALL {
                    let stored = workspace.load_doc(doc)?.is_some();
                    println!("{doc:?}: {}", if stored { "saved" } else { "missing" });
                }
            }
            None => println!("No saved workspace"),
        },
        WorkspaceAction::Clear => {
            workspace.clear()?;
            let history = HistoryStore::open(data_dir)?;
            let removed = history.clear_canvas_documents()?;
            println!("Workspace cleared ({removed} canvas histories removed)");
        }
    }
    Ok(())
}
