use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use sentinel::config::Settings;
use sentinel::models::CheckResult;
use sentinel::parser::format_datetime;
use sentinel::registry::Registry;
use sentinel::report::{export_csv, Summary};
use sentinel::storage::StateManager;
use sentinel::verifier::build_verifier;
use sentinel::Sentinel;

pub struct CheckParams {
    pub sources_path: PathBuf,
    pub source: Option<String>,
    pub output: Option<PathBuf>,
    pub verify: bool,
}

pub async fn check(settings: Settings, params: CheckParams) -> Result<()> {
    let verify = params.verify && settings.verification.enabled;
    let verifier = verify.then(|| build_verifier(&settings.verification));

    let state = Arc::new(StateManager::new(&settings.state.path));
    let registry = Registry::from_file(&params.sources_path, settings)?;

    let mut sentinel = Sentinel::new(registry, state);
    if let Some(verifier) = verifier {
        if !verifier.is_available() {
            warn!(verifier = verifier.name(), "Verification unavailable, results will be marked unknown");
        }
        sentinel = sentinel.with_verifier(verifier);
    }

    println!("Checking data sources");
    println!("=====================");

    let results = match params.source {
        Some(id) => vec![sentinel.check_for_updates(&id).await],
        None => sentinel.check_all_sources().await,
    };

    for result in &results {
        print_result(result);
    }

    let summary = Summary::from_results(&results);
    println!("\n{summary}");

    if let Some(output) = params.output {
        export_csv(&results, &output)?;
        println!("Report written to {}", output.display());
    }

    Ok(())
}

fn print_result(result: &CheckResult) {
    let name = result.import_name.as_deref().unwrap_or(&result.id);
    println!("\n[{}] {} ({})", result.status(), name, result.id);

    if let Some(error) = &result.error {
        println!("  Error: {error}");
        return;
    }

    match result.current_timestamp {
        Some(ts) => println!("  Last updated: {}", format_datetime(&ts, None)),
        None => println!("  Last updated: not found"),
    }
    if let Some(ts) = result.previous_timestamp {
        println!("  Previous:     {}", format_datetime(&ts, None));
    }
    if let Some(raw) = &result.raw_value {
        println!("  Raw value:    {raw}");
    }

    if let Some(verification) = &result.verification {
        let verdict = match verification.is_verified {
            Some(true) => "verified",
            Some(false) => "not verified",
            None => "unknown",
        };
        println!(
            "  Verification: {verdict} (confidence {:.2})",
            verification.confidence
        );
        if !verification.reasoning.is_empty() {
            println!("    {}", verification.reasoning);
        }
        if let Some(alternative) = &verification.suggested_alternative {
            println!("    Suggested: {alternative}");
        }
    }
}
