use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use smokescreen_common::{Config, RunStatus, ScoreList, WeekId};
use smokescreen_pipeline::feed::RssSource;
use smokescreen_pipeline::oracle::{ClaudeOracle, Oracle};
use smokescreen_pipeline::process::judge_event;
use smokescreen_pipeline::sources::ArticleSource;
use smokescreen_pipeline::{IngestPhase, ProcessPhase};
use smokescreen_store::{AuditLedger, InMemoryStore, PgStore, ScoreStore};

#[derive(Parser)]
#[command(name = "smokescreen", about = "Weekly governance-damage vs. manufactured-attention scorer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,
    /// Fetch sources and store new articles
    Ingest {
        /// Run against an in-memory store; nothing is persisted
        #[arg(long)]
        dry_run: bool,
    },
    /// Cluster, score, freeze, and regenerate weekly pairs
    Process {
        #[arg(long)]
        dry_run: bool,
    },
    /// Freeze every scored event in a week (defaults to last week)
    FreezeWeek {
        /// Any date inside the week, YYYY-MM-DD
        #[arg(long)]
        week: Option<WeekId>,
        #[arg(long, default_value = "operator")]
        actor: String,
    },
    /// Lift the freeze on one event
    Unfreeze {
        #[arg(long)]
        event: Uuid,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value = "operator")]
        actor: String,
    },
    /// Re-ask the oracle and rescore one event
    Rescore {
        #[arg(long)]
        event: Uuid,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value = "operator")]
        actor: String,
    },
    /// Set an event's scores by hand
    Override {
        #[arg(long)]
        event: Uuid,
        #[arg(long)]
        a: f64,
        #[arg(long)]
        b: f64,
        /// Force a list (A, B or C) instead of reclassifying
        #[arg(long)]
        list: Option<String>,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value = "operator")]
        actor: String,
    },
    /// Append a public correction notice to an event
    Correct {
        #[arg(long)]
        event: Uuid,
        #[arg(long)]
        notice: String,
        #[arg(long, default_value = "operator")]
        actor: String,
    },
    /// Print an event's audit trail, newest first
    Audit {
        #[arg(long)]
        event: Uuid,
    },
    /// Print recent pipeline runs with their error lists
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print a week's snapshot and smokescreen pairs (defaults to this week)
    Week {
        #[arg(long)]
        week: Option<WeekId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Migrate => {
            let store = PgStore::connect(&config.database_url).await?;
            store.migrate().await?;
            info!("Migrations applied");
        }
        Command::Ingest { dry_run } => {
            let store = open_store(&config, dry_run).await?;
            let sources: Vec<Arc<dyn ArticleSource>> = RssSource::from_urls(&config.feed_urls)?
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn ArticleSource>)
                .collect();
            if sources.is_empty() {
                bail!("No sources configured; set FEED_URLS");
            }

            let report = IngestPhase::builder()
                .store(store)
                .sources(sources)
                .settings(config.settings.clone())
                .build()
                .run()
                .await?;
            print_run_errors(&report.run.errors);
            println!("{}", report.stats);
        }
        Command::Process { dry_run } => {
            config.require_oracle()?;
            let store = open_store(&config, dry_run).await?;
            let report = ProcessPhase::builder()
                .store(store)
                .oracle(oracle(&config))
                .settings(config.settings.clone())
                .build()
                .run()
                .await?;
            print_run_errors(&report.run.errors);
            println!("{}", report.stats);
            if report.run.status == RunStatus::Failed {
                bail!("Process run {} failed", report.run.id);
            }
        }
        Command::FreezeWeek { week, actor } => {
            let week = week.unwrap_or_else(|| WeekId::current().previous());
            let frozen = ledger(&config).await?.freeze_week(week, &actor).await?;
            println!("Week {week} frozen ({frozen} events)");
        }
        Command::Unfreeze {
            event,
            reason,
            actor,
        } => {
            let updated = ledger(&config).await?.unfreeze(event, &actor, &reason).await?;
            println!("Unfrozen {} (version {})", updated.id, updated.score_version);
        }
        Command::Rescore {
            event,
            reason,
            actor,
        } => {
            config.require_oracle()?;
            let store = open_store(&config, false).await?;
            let current = store
                .get_event(event)
                .await?
                .with_context(|| format!("Event {event} not found"))?;
            let oracle = oracle(&config);
            let scored = judge_event(store.as_ref(), oracle.as_ref(), &current).await?;
            let updated = AuditLedger::new(store)
                .rescore(event, &scored, &actor, &reason)
                .await?;
            println!(
                "Rescored {}: A={} B={} list={} (version {})",
                updated.id,
                scored.a.final_score,
                scored.b.final_score,
                scored.classification.list,
                updated.score_version
            );
        }
        Command::Override {
            event,
            a,
            b,
            list,
            reason,
            actor,
        } => {
            let list = match list.as_deref() {
                Some(tag) => Some(
                    ScoreList::from_tag(tag).with_context(|| format!("Unknown list: {tag}"))?,
                ),
                None => None,
            };
            let updated = ledger(&config)
                .await?
                .override_scores(event, a, b, list, &actor, &reason)
                .await?;
            println!("Overridden {} (version {})", updated.id, updated.score_version);
        }
        Command::Correct {
            event,
            notice,
            actor,
        } => {
            let updated = ledger(&config)
                .await?
                .append_correction(event, &notice, &actor)
                .await?;
            println!("Correction recorded on {}", updated.id);
        }
        Command::Audit { event } => {
            let trail = ledger(&config).await?.audit_trail(event).await?;
            if trail.is_empty() {
                println!("No audit records for {event}");
            }
            for change in trail {
                println!(
                    "{} {:<10} v{}→v{} A {}→{} B {}→{} list {}→{} by {}{}",
                    change.created_at.format("%Y-%m-%d %H:%M:%S"),
                    change.change_type,
                    change.version_before,
                    change.version_after,
                    fmt_score(change.old_a),
                    fmt_score(change.new_a),
                    fmt_score(change.old_b),
                    fmt_score(change.new_b),
                    fmt_list(change.old_list),
                    fmt_list(change.new_list),
                    change.actor,
                    change
                        .reason
                        .map(|r| format!(": {r}"))
                        .unwrap_or_default(),
                );
            }
        }
        Command::Runs { limit } => {
            let store = open_store(&config, false).await?;
            for run in store.recent_runs(limit).await? {
                println!(
                    "{} {:<7} {:<9} started {} finished {}",
                    run.id,
                    run.phase,
                    run.status,
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.finished_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                );
                for error in &run.errors {
                    println!("    {error}");
                }
            }
        }
        Command::Week { week } => {
            let week = week.unwrap_or_else(WeekId::current);
            let store = open_store(&config, false).await?;
            match store.get_snapshot(week).await? {
                Some(s) => {
                    println!("Week {} ({})", s.week_id, s.status.as_str());
                    println!(
                        "  events {} scored {} | A {} B {} C {} | mixed {} noise {} frozen {}",
                        s.event_count,
                        s.scored_count,
                        s.list_a_count,
                        s.list_b_count,
                        s.list_c_count,
                        s.mixed_count,
                        s.noise_count,
                        s.frozen_count
                    );
                    println!(
                        "  avg A {} avg B {} pairs {} max index {}",
                        fmt_score(s.avg_a),
                        fmt_score(s.avg_b),
                        s.pair_count,
                        fmt_score(s.max_smokescreen_index)
                    );
                }
                None => println!("Week {week}: no snapshot yet"),
            }
            for pair in store.pairs_for_week(week).await? {
                println!(
                    "  {:>5.1} {:<11} distraction {} / damage {} (conf {:.2}, Δ {:+.1}h)",
                    pair.smokescreen_index,
                    pair.severity.as_str(),
                    pair.distraction_event_id,
                    pair.damage_event_id,
                    pair.displacement_confidence,
                    pair.time_delta_hours
                );
            }
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("smokescreen=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn open_store(config: &Config, dry_run: bool) -> Result<Arc<dyn ScoreStore>> {
    if dry_run {
        info!("Dry run: using in-memory store");
        return Ok(Arc::new(InMemoryStore::new()));
    }
    let store = PgStore::connect(&config.database_url).await?;
    Ok(Arc::new(store))
}

async fn ledger(config: &Config) -> Result<AuditLedger> {
    Ok(AuditLedger::new(open_store(config, false).await?))
}

fn oracle(config: &Config) -> Arc<dyn Oracle> {
    Arc::new(ClaudeOracle::new(
        &config.anthropic_api_key,
        &config.oracle_model,
    ))
}

fn print_run_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!("Errors ({}):", errors.len());
    for error in errors {
        println!("  {error}");
    }
}

fn fmt_score(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.1}")).unwrap_or_else(|| "-".to_string())
}

fn fmt_list(list: Option<ScoreList>) -> &'static str {
    list.map(|l| l.as_str()).unwrap_or("-")
}
