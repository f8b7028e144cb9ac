//! Command implementations for trailctl

use anyhow::{Context as _, Result};
use owo_colors::OwoColorize;
use std::sync::Arc;

use trail_core::config::EngineConfig;
use trail_core::levels::{xp_floor, LevelProgress};
use trail_core::{
    HttpProgressService, ProgressSnapshot, ProgressStore, Rank, StaticTokenProvider, SyncReport,
    UserProfile,
};

const SEPARATOR: &str = "------------------------------------------------------------";
const BAR_WIDTH: usize = 30;

/// Settings shared by every command
pub struct Context {
    pub config: EngineConfig,
    pub token: Option<String>,
    pub lessons: Vec<u64>,
}

async fn open_store(ctx: Context, xp: u64) -> Result<ProgressStore> {
    let remote = HttpProgressService::new(&ctx.config.remote)?;
    let sessions = Arc::new(StaticTokenProvider::new(ctx.token));
    let store = ProgressStore::new(ctx.config, Arc::new(remote), sessions, ctx.lessons);

    let profile = UserProfile {
        user_id: "trailctl".to_string(),
        xp: Some(xp),
        level: None,
    };
    store.start_session(&profile).await;
    Ok(store)
}

pub async fn status(ctx: Context, xp: u64, json: bool) -> Result<()> {
    if ctx.token.is_none() {
        eprintln!("{}", "No token set (TRAIL_TOKEN); showing local state only".yellow());
    }
    let store = open_store(ctx, xp).await?;
    let snapshot = store.snapshot();

    if json {
        let out = serde_json::to_string_pretty(&snapshot).context("Failed to encode snapshot")?;
        println!("{}", out);
        return Ok(());
    }

    print_snapshot(&snapshot);
    Ok(())
}

pub async fn award(ctx: Context, amount: u32, event_key: &str, xp: u64) -> Result<()> {
    let store = open_store(ctx, xp).await?;

    if !store.award_xp(amount, event_key) {
        println!("{} Award ignored (zero amount)", "[SKIP]".yellow());
        return Ok(());
    }

    let snapshot = store.snapshot();
    println!(
        "{} +{} XP for {} (local total {})",
        "[OK]".green(),
        amount,
        event_key.bold(),
        snapshot.xp
    );
    if let Some(level_up) = &snapshot.level_up {
        println!(
            "{} Level {} - {}",
            "[LEVEL UP]".bright_magenta().bold(),
            level_up.level,
            level_up.rank
        );
    }

    let report = store.sync_now().await;
    print_report(&report);
    print_snapshot(&store.snapshot());

    let remaining = store.pending_awards().len();
    store.end_session();
    if remaining > 0 {
        anyhow::bail!("{} award(s) could not be synced", remaining);
    }
    Ok(())
}

pub fn levels(max: u32) -> Result<()> {
    println!();
    println!("{}", "  Level Curve".bold());
    println!("{}", SEPARATOR.dimmed());
    println!("  {:>5}  {:>10}  {:>10}  {}", "LEVEL", "FROM XP", "NEXT AT", "RANK");

    for level in 1..=max.max(1) {
        println!(
            "  {:>5}  {:>10}  {:>10}  {}",
            level,
            xp_floor(level),
            xp_floor(level.saturating_add(1)),
            Rank::from_level(level)
        );
    }
    println!();
    Ok(())
}

pub fn show_config(config: &EngineConfig) -> Result<()> {
    if let Some(path) = EngineConfig::default_path() {
        println!("{} {}", "# default path:".dimmed(), path.display().dimmed());
    }
    print!("{}", config.to_toml()?);
    if config.sync.interval_was_clamped() {
        println!(
            "{} sync.interval_ms is out of range; using {:?}",
            "[WARN]".yellow(),
            config.sync.effective_interval()
        );
    }
    Ok(())
}

fn progress_bar(progress: &LevelProgress) -> String {
    let filled = (usize::from(progress.percent) * BAR_WIDTH) / 100;
    format!(
        "[{}{}]",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH.saturating_sub(filled))
    )
}

fn print_snapshot(snapshot: &ProgressSnapshot) {
    println!();
    println!("{}", "  Trail Progress".bold());
    println!("{}", SEPARATOR.dimmed());
    println!(
        "  Level {} {}  {} XP",
        snapshot.level.to_string().bold(),
        format!("({})", snapshot.rank).cyan(),
        snapshot.xp
    );
    let p = &snapshot.progress;
    println!(
        "  {} {}%  ({}/{} to next level)",
        progress_bar(p),
        p.percent,
        p.xp_into_level,
        p.xp_for_next
    );

    println!();
    println!("{}", "  [LESSONS]".bold());
    for entry in &snapshot.trail {
        let marker = if entry.completed {
            "done".green().to_string()
        } else if entry.unlocked {
            "open".cyan().to_string()
        } else {
            "locked".dimmed().to_string()
        };
        println!("  {:>3}. lesson {:<6} {:<22} {}", entry.index + 1, entry.lesson_id, entry.stage.as_str(), marker);
    }

    let sync = &snapshot.sync;
    println!();
    println!("{}", "  [SYNC]".bold());
    println!("  pending:   {}", sync.pending);
    println!("  confirmed: {}", sync.confirmed_awards);
    if sync.dropped_awards > 0 {
        println!("  dropped:   {}", sync.dropped_awards.to_string().yellow());
    }
    if let Some(at) = sync.last_pass_at {
        println!("  last pass: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if sync.needs_reauth {
        println!("  {}", "Sign in again: the server keeps refusing this token".bright_red().bold());
    }
    println!();
}

fn print_report(report: &SyncReport) {
    if let Some(reason) = report.skipped {
        println!("{} sync skipped: {:?}", "[SYNC]".dimmed(), reason);
        return;
    }
    println!(
        "{} submitted={} confirmed={} replayed={} requeued={} dropped={}",
        "[SYNC]".dimmed(),
        report.submitted,
        report.confirmed,
        report.replayed,
        report.requeued,
        report.dropped
    );
    if report.halted_by_auth {
        println!("{}", "Authorization failed; awards kept for the next sync".yellow());
    }
}
