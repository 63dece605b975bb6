//! coinslot - virtual coin casino host
//!
//! Usage:
//!   coinslot verify                        - Check ledger integrity
//!   coinslot balance <user>                - Replayed balance
//!   coinslot spin <user> <wager>           - Play the slot machine
//!   coinslot rtp [wagers...]               - Payout table
//!   coinslot reels show|add|remove|fee     - Reel administration
//!
//! The ledger is verified on start-up and after every write. An invalid
//! chain terminates the process with exit code 1.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;

use cs_casino::{
    BonusRejection, CasinoContext, CasinoError, CasinoSettings, GENERIC_USER_MESSAGE, PlayRejection,
    SlotMachineSession, TransferRejection, claim_starting_bonus, rebuild_transaction_log, spawn_export,
};
use cs_ledger::{TransactionLog, identity_digest};
use cs_slot::{ComboEvent, FeeAmount, FeeKind, FeeTier, RandomSymbols, ReelId};

#[derive(Parser)]
#[command(name = "coinslot", about = "Virtual coin casino")]
struct Cli {
    /// Settings file (JSON); defaults apply when absent
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Data directory, overrides the settings file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check ledger integrity
    Verify,
    /// Show a player's balance
    Balance { user: String },
    /// Send coins to another player
    Transfer { from: String, to: String, amount: u64 },
    /// Play the slot machine
    Spin {
        user: String,
        wager: u64,
        /// Stop the reels one at a time
        #[arg(short, long)]
        step: bool,
    },
    /// Resolve spins without moving coins
    Simulate {
        wager: u64,
        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },
    /// Expected return per wager
    Rtp {
        #[arg(default_values_t = vec![1u64, 2, 10, 100])]
        wagers: Vec<u64>,
        /// Print the piecewise expected-return function
        #[arg(long)]
        pieces: bool,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
    /// Claim the one-time starting bonus
    Bonus { user: String },
    /// Export every transfer as TSV
    Export {
        /// Destination (default: <data-dir>/export.tsv)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Rebuild the live transaction log instead
        #[arg(long)]
        rebuild: bool,
    },
    /// Identities with a positive balance
    Holders {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Who has sent coins to a player
    Sponsors { user: String },
    /// Reel configuration
    Reels {
        #[command(subcommand)]
        command: ReelsCommand,
    },
}

#[derive(Subcommand)]
enum ReelsCommand {
    /// Print stops, combos, fees and the jackpot pool
    Show,
    /// Add stops of a symbol to a reel
    Add { reel: String, symbol: String, count: u64 },
    /// Remove stops of a symbol from a reel
    Remove { reel: String, symbol: String, count: u64 },
    /// Set a fee: integer for fixed coins, decimal for a rate (0.05 = 5%)
    Fee { tier: String, kind: String, amount: String },
    /// Set a combo payout
    Combo { symbol: String, fixed: u64, multiplier: f64 },
    /// Re-read the configuration file
    Reload,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        log::error!("{:#}", e);
        match e.downcast_ref::<CasinoError>() {
            Some(casino) => eprintln!("{}", casino.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = match &cli.settings {
        Some(path) => CasinoSettings::load_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => CasinoSettings::default(),
    };
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }

    let ctx = CasinoContext::open(settings)?;
    require_valid_chain(&ctx)?;

    match cli.command {
        Commands::Verify => {
            println!("Ledger valid: {} block(s)", ctx.chain().len()?);
            Ok(())
        }
        Commands::Balance { user } => show_balance(&ctx, &user),
        Commands::Transfer { from, to, amount } => transfer(&ctx, &from, &to, amount),
        Commands::Spin { user, wager, step } => spin(&ctx, &user, wager, step),
        Commands::Simulate { wager, count } => simulate(&ctx, wager, count),
        Commands::Rtp { wagers, pieces, json } => rtp(&ctx, &wagers, pieces, json),
        Commands::Bonus { user } => bonus(&ctx, &user),
        Commands::Export { out, rebuild } => export(&ctx, out, rebuild),
        Commands::Holders { limit } => holders(&ctx, limit),
        Commands::Sponsors { user } => sponsors(&ctx, &user),
        Commands::Reels { command } => reels(&ctx, command),
    }
}

/// Stop with exit code 1 unless every block verifies
fn require_valid_chain(ctx: &CasinoContext) -> Result<()> {
    if let Err(e) = ctx.ensure_chain_valid() {
        log::error!("Refusing to continue: {}", e);
        eprintln!("{}", GENERIC_USER_MESSAGE);
        process::exit(1);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAYERS
// ═══════════════════════════════════════════════════════════════════════════════

fn show_balance(ctx: &CasinoContext, user: &str) -> Result<()> {
    match ctx.get_balance(&identity_digest(user))? {
        Some(balance) => println!("{}: {} coin(s)", user, balance),
        None => println!("{} has no ledger history", user),
    }
    Ok(())
}

fn transfer(ctx: &CasinoContext, from: &str, to: &str, amount: u64) -> Result<()> {
    match ctx.transfer(from, to, amount)? {
        Ok(block) => {
            require_valid_chain(ctx)?;
            println!("Sent {} coin(s) to {} (block {})", amount, to, block.index);
        }
        Err(TransferRejection::InvalidAmount) => println!("Invalid amount"),
        Err(TransferRejection::UnknownSender) => println!("{} has no coins yet", from),
        Err(TransferRejection::InsufficientFunds { balance, amount }) => {
            println!("Insufficient funds: balance {}, needed {}", balance, amount)
        }
        Err(TransferRejection::SenderBusy) => println!("{} is busy, try again", from),
    }
    Ok(())
}

fn spin(ctx: &CasinoContext, user: &str, wager: u64, step: bool) -> Result<()> {
    let session = SlotMachineSession::new(ctx);
    let source = Box::new(RandomSymbols::from_os_rng());

    let mut active = match session.start(user, wager, source)? {
        Ok(active) => active,
        Err(rejection) => {
            println!("{}", describe_rejection(&rejection));
            return Ok(());
        }
    };

    if step {
        while let Some((reel, symbol)) = active.stop_next_reel()? {
            println!("{}: {}", reel, symbol);
        }
    }

    let report = active.finish()?;
    require_valid_chain(ctx)?;

    let outcome = &report.outcome;
    println!("[ {} ]", outcome.symbols.join(" | "));
    println!(
        "{}: total return {}, net {:+}, fees {:.2}",
        outcome.kind, outcome.total_return, outcome.net_return, outcome.fees
    );
    println!("Balance: {}  Jackpot pool: {}", report.balance, outcome.jackpot_pool);
    Ok(())
}

fn describe_rejection(rejection: &PlayRejection) -> String {
    match rejection {
        PlayRejection::AlreadyPlaying => "A play is already in progress".to_string(),
        PlayRejection::InsufficientFunds { balance, wager } => {
            format!("Insufficient funds: balance {}, wager {}", balance, wager)
        }
        PlayRejection::InvalidWager(wager) => format!("Invalid wager: {}", wager),
        PlayRejection::NewIdentity => "Claim the starting bonus first".to_string(),
    }
}

fn simulate(ctx: &CasinoContext, wager: u64, count: u32) -> Result<()> {
    let mut returned = 0u64;
    for _ in 0..count {
        let outcome = ctx.resolve_spin(wager)?;
        println!("[ {} ] {} -> {}", outcome.symbols.join(" | "), outcome.kind, outcome.total_return);
        returned = returned.saturating_add(outcome.total_return);
    }
    if count > 1 {
        let (staked, percent) = return_ratio(returned, wager, count);
        println!("Returned {} of {} ({:.2}%)", returned, staked, percent);
    }
    Ok(())
}

/// Total staked over `count` spins and the share of it returned, in percent
fn return_ratio(returned: u64, wager: u64, count: u32) -> (u64, f64) {
    let staked = wager.saturating_mul(u64::from(count));
    (staked, returned as f64 * 100.0 / staked as f64)
}

fn bonus(ctx: &CasinoContext, user: &str) -> Result<()> {
    let mut rng = StdRng::from_os_rng();
    match claim_starting_bonus(ctx, user, &mut rng)? {
        Ok(award) => {
            require_valid_chain(ctx)?;
            match award.die {
                Some(face) => println!("Rolled {}: {} coin(s) granted", face, award.amount),
                None => println!("{} coin(s) granted", award.amount),
            }
        }
        Err(BonusRejection::AlreadyRegistered) => println!("{} already has coins", user),
        Err(BonusRejection::Busy) => println!("{} is busy, try again", user),
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPORTS
// ═══════════════════════════════════════════════════════════════════════════════

fn rtp(ctx: &CasinoContext, wagers: &[u64], pieces: bool, json: bool) -> Result<()> {
    let engine = ctx.machine().engine();
    let lines = engine.report(wagers)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
        return Ok(());
    }

    println!("{:>8}  {:<8}  {:>12}  {:>12}  RTP", "wager", "tier", "E[total]", "E[net]");
    for line in &lines {
        println!(
            "{:>8}  {:<8}  {:>12.4}  {:>12.4}  {}",
            line.wager, line.tier.name(), line.expected_total_return, line.expected_return, line.rtp
        );
    }

    if pieces {
        println!();
        for piece in engine.expected_return_function().pieces() {
            println!("{}", piece);
        }
    }
    Ok(())
}

fn export(ctx: &CasinoContext, out: Option<PathBuf>, rebuild: bool) -> Result<()> {
    if rebuild {
        let rows = rebuild_transaction_log(ctx)?;
        println!("Rebuilt {} with {} row(s)", ctx.settings().transactions_path().display(), rows);
        return Ok(());
    }

    let dest = out.unwrap_or_else(|| ctx.settings().data_dir.join("export.tsv"));
    let handle = spawn_export(ctx, &dest)?;
    let rows = handle.join().map_err(|_| anyhow!("Export thread panicked"))??;
    println!("Exported {} row(s) to {}", rows, dest.display());
    Ok(())
}

fn transaction_log(ctx: &CasinoContext) -> Result<&TransactionLog> {
    ctx.chain().transaction_log().context("No transaction log configured")
}

fn holders(ctx: &CasinoContext, limit: usize) -> Result<()> {
    for (digest, balance) in transaction_log(ctx)?.holders()?.into_iter().take(limit) {
        if digest != ctx.house() {
            println!("{}  {}", digest, balance);
        }
    }
    Ok(())
}

fn sponsors(ctx: &CasinoContext, user: &str) -> Result<()> {
    let receiver = identity_digest(user);
    let sponsors = transaction_log(ctx)?.sponsors_of(&receiver)?;
    if sponsors.is_empty() {
        println!("Nobody has sent coins to {}", user);
    }
    for (digest, total) in sponsors {
        let label = if digest == ctx.house() { "house" } else { digest.as_str() };
        println!("{}  {}", label, total);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// REEL ADMINISTRATION
// ═══════════════════════════════════════════════════════════════════════════════

fn reels(ctx: &CasinoContext, command: ReelsCommand) -> Result<()> {
    let machine = ctx.machine();
    match command {
        ReelsCommand::Show => show_reels(ctx),
        ReelsCommand::Add { reel, symbol, count } => {
            machine.add_symbol_count(ReelId::parse(&reel)?, &symbol, count)?;
            println!("Added {} x {} to {}", count, symbol, reel);
            Ok(())
        }
        ReelsCommand::Remove { reel, symbol, count } => {
            machine.remove_symbol_count(ReelId::parse(&reel)?, &symbol, count)?;
            println!("Removed {} x {} from {}", count, symbol, reel);
            Ok(())
        }
        ReelsCommand::Fee { tier, kind, amount } => {
            let tier = FeeTier::parse(&tier).with_context(|| format!("Unknown fee tier: {}", tier))?;
            let kind = FeeKind::parse(&kind).with_context(|| format!("Unknown fee kind: {}", kind))?;
            let amount = parse_fee_amount(&amount)?;
            machine.set_fee(tier, kind, amount)?;
            println!("{} {} fee set to {}", tier, kind.name(), amount);
            Ok(())
        }
        ReelsCommand::Combo { symbol, fixed, multiplier } => {
            machine.set_combo_event(&symbol, ComboEvent::new(fixed, multiplier))?;
            println!("{} pays {} + {} x wager", symbol, fixed, multiplier);
            Ok(())
        }
        ReelsCommand::Reload => {
            machine.reload()?;
            println!("Reloaded {}", machine.path().display());
            Ok(())
        }
    }
}

fn show_reels(ctx: &CasinoContext) -> Result<()> {
    let config = ctx.machine().config();
    let engine = ctx.machine().engine();

    for reel in ReelId::ALL {
        let stops = config.reels.get(reel);
        let listed: Vec<String> = stops.iter().map(|(s, n)| format!("{}={}", s, n)).collect();
        println!("{} ({} stops): {}", reel, config.reels.total_weight(reel), listed.join(" "));
    }

    println!();
    for (symbol, event) in &config.combo_events {
        println!(
            "{:<12} fixed {:>6}  x{:<6}  p = {}",
            symbol,
            event.fixed_amount,
            event.wager_multiplier,
            engine.event_probability(symbol)
        );
    }

    println!();
    for tier in FeeTier::ALL {
        let fees = config.fees.tier(tier);
        println!("{:<8} main {:<8} jackpot {}", tier.name(), fees.main.to_string(), fees.jackpot);
    }

    println!();
    println!("Jackpot pool: {} (seed {})", config.jackpot_pool, config.jackpot_seed());
    println!("Average jackpot: {}", engine.average_jackpot());
    Ok(())
}

fn parse_fee_amount(text: &str) -> Result<FeeAmount> {
    if let Ok(coins) = text.parse::<u64>() {
        return Ok(FeeAmount::Fixed(coins));
    }
    match text.parse::<f64>() {
        Ok(rate) if rate.is_finite() && rate >= 0.0 => Ok(FeeAmount::rate(rate)),
        _ => bail!("Invalid fee amount: {}", text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fee_amount() {
        assert_eq!(parse_fee_amount("3").unwrap(), FeeAmount::Fixed(3));
        assert_eq!(parse_fee_amount("0.05").unwrap(), FeeAmount::rate(0.05));
        assert!(parse_fee_amount("-1.5").is_err());
        assert!(parse_fee_amount("lots").is_err());
    }

    #[test]
    fn test_cli_parses_nested_commands() {
        let cli = Cli::try_parse_from(["coinslot", "--data-dir", "/tmp/x", "reels", "add", "reel2", "high", "3"])
            .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(
            cli.command,
            Commands::Reels {
                command: ReelsCommand::Add { count: 3, .. }
            }
        ));
    }

    #[test]
    fn test_return_ratio_saturates() {
        assert_eq!(return_ratio(150, 10, 20), (200, 75.0));

        let (staked, percent) = return_ratio(u64::MAX, u64::MAX, 3);
        assert_eq!(staked, u64::MAX);
        assert_eq!(percent, 100.0);
    }

    #[test]
    fn test_rtp_default_wagers() {
        let cli = Cli::try_parse_from(["coinslot", "rtp"]).unwrap();
        match cli.command {
            Commands::Rtp { wagers, .. } => assert_eq!(wagers, vec![1, 2, 10, 100]),
            _ => panic!("expected rtp"),
        }
    }
}
