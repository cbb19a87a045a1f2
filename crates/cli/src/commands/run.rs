//! Commande de démultiplexage complet

use crate::create_spinner;
use crate::display::report::{print_report, print_validations};
use anyhow::{bail, Result};
use dmx_core::{context_for, execute, prepare, PipelineConfig, RunOptions};
use std::sync::Arc;

pub async fn run(options: RunOptions, config: PipelineConfig, json: bool) -> Result<()> {
    if !json {
        println!("🧬 Run: {}", options.run_dir.display());
    }

    // 1. Compiler et valider la feuille
    let spinner = create_spinner("Compilation de la feuille d'échantillons...");
    let prepared = prepare(options.clone(), &config)?;
    spinner.finish_with_message(format!(
        "{} couloir(s) retenu(s), {} refusé(s)",
        prepared.runnable_lanes().len(),
        prepared.rejected().count()
    ));
    if !json && prepared.rejected().next().is_some() {
        print_validations(&prepared);
    }

    // 2. Lancer les couloirs
    let ctx = Arc::new(context_for(&options, &config));
    let spinner = create_spinner("Démultiplexage en cours...");
    let report = execute(prepared, ctx).await;
    spinner.finish_and_clear();
    let report = report?;

    // 3. Bilan
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_success() {
        bail!("{} couloir(s) en échec sur {}", report.failed(), report.outcomes.len());
    }
    Ok(())
}
