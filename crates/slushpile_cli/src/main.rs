//! CLI probe for the pipeline core.
//!
//! Usage:
//! - `slushpile_cli` prints ping and version.
//! - `slushpile_cli <db> counts` prints tier counts.
//! - `slushpile_cli <db> export <uuid>...` writes export CSV to stdout.

use log::info;
use slushpile_core::repo::triage_repo::SqliteTriageRepository;
use slushpile_core::{init_from_config, BatchService, Database, PipelineConfig, Tier, TriageService};
use std::collections::BTreeSet;
use std::error::Error;
use std::io::Write;
use std::process::ExitCode;
use uuid::Uuid;

fn main() -> ExitCode {
    match run(std::env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), Box<dyn Error>> {
    let config = PipelineConfig::from_env();
    config.validate()?;
    init_from_config(&config)?;

    let Some(db_path) = args.first() else {
        println!("slushpile_core ping={}", slushpile_core::ping());
        println!("slushpile_core version={}", slushpile_core::core_version());
        return Ok(());
    };
    let db = Database::open_with_timeout(db_path, config.busy_timeout())?;

    match args.get(1).map(String::as_str) {
        Some("counts") | None => print_counts(&db),
        Some("export") => {
            let ids = args[2..]
                .iter()
                .map(|raw| Uuid::parse_str(raw))
                .collect::<Result<BTreeSet<_>, _>>()?;
            let export = BatchService::new(db, config)?.export(&ids)?;
            for (id, failure) in &export.result.failed {
                eprintln!("skipped {id}: {failure}");
            }
            std::io::stdout().write_all(&export.to_csv())?;
            info!(
                "event=cli_export module=cli status=ok rows={}",
                export.snapshot.rows.len()
            );
            Ok(())
        }
        Some(other) => Err(format!("unknown command `{other}`; expected counts|export").into()),
    }
}

fn print_counts(db: &Database) -> Result<(), Box<dyn Error>> {
    let conn = db.connect()?;
    let triage = TriageService::new(SqliteTriageRepository::try_new(&conn)?);
    let counts = triage.tier_counts()?;
    for tier in Tier::ALL {
        println!("{:<16} {}", tier.as_str(), counts.get(tier));
    }
    println!("{:<16} {}", "total_scored", counts.total_scored());
    Ok(())
}
