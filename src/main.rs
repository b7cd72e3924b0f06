use std::collections::HashMap;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::{error, info};

use record_linker::backend::{MySqlBackend, QueryBackend};
use record_linker::cli::{Cli, RunArgs};
use record_linker::db::{count_rows, make_pool};
use record_linker::matching::compose;
use record_linker::metrics::memory_stats_mb;
use record_linker::util::envfile::{load_dotenv_if_present, write_env_template};

#[tokio::main]
async fn main() {
    let use_tracing = std::env::var("RECORD_LINKER_TRACING")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_tracing {
        record_linker::logging::init_tracing_from_env();
    } else {
        env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    }

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Utility subcommand: generate .env.template
    let raw: Vec<String> = std::env::args().collect();
    if raw.get(1).map(|s| s.as_str()) == Some("env-template") {
        let path = raw
            .get(2)
            .cloned()
            .unwrap_or_else(|| ".env.template".to_string());
        write_env_template(&path)?;
        println!("Wrote {}. Copy to .env and edit values as needed.", path);
        return Ok(());
    }

    // .env must land in the process environment before clap reads env fallbacks
    load_dotenv_if_present()?;
    let RunArgs {
        db,
        source_a,
        source_b,
        config,
        shape,
        include_no_match,
        dest,
        check_only,
    } = match Cli::parse().to_run_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    // Compose before connecting; configuration failures should not cost a
    // round trip to the server.
    let query = compose(&source_a, &source_b, &config, shape, include_no_match)?;

    if check_only {
        println!("{}", query.sql());
        return Ok(());
    }

    info!(
        "Connecting to MySQL at {}:{} / db {}",
        db.host, db.port, db.database
    );
    let pool = make_pool(&db).await?;
    let backend = MySqlBackend::new(pool.clone());

    backend.verify_source(&source_a).await?;
    backend.verify_source(&source_b).await?;
    let count_a = count_rows(&pool, &source_a.table).await?;
    let count_b = count_rows(&pool, &source_b.table).await?;
    info!(
        "Sources verified: {} has {} rows, {} has {} rows",
        source_a.table, count_a, source_b.table, count_b
    );
    let mem = memory_stats_mb();
    info!(
        "Host memory: {} MB used / {} MB available",
        mem.used_mb, mem.avail_mb
    );

    let started = Instant::now();
    match dest {
        Some(dest) => {
            info!("Materializing linkage into {}", dest);
            let done = query.materialize(&backend, &dest).await?;
            info!(
                "Wrote {} rows to {} in {:.2}s",
                done.rows_written(),
                dest,
                started.elapsed().as_secs_f64()
            );
        }
        None => {
            let rows = query.fetch(&backend).await?;
            info!(
                "Fetched {} result rows in {:.2}s",
                rows.len(),
                started.elapsed().as_secs_f64()
            );
            let mut tally: HashMap<String, usize> = HashMap::new();
            for row in &rows {
                *tally.entry(row.decision.label()).or_default() += 1;
            }
            let mut counts: Vec<(String, usize)> = tally.into_iter().collect();
            counts.sort();
            for (label, n) in &counts {
                info!("  {}: {}", label, n);
            }
            let matched = rows.iter().filter(|r| r.decision.is_match()).count();
            info!("{} of {} rows carry a match", matched, rows.len());
        }
    }
    let mem = memory_stats_mb();
    info!(
        "Host memory after run: {} MB used / {} MB available",
        mem.used_mb, mem.avail_mb
    );
    Ok(())
}
