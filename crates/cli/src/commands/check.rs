//! Commande de vérification à blanc: rien n'est écrit ni lancé

use crate::display::report::print_validations;
use anyhow::{bail, Result};
use console::style;
use dmx_core::{prepare, PipelineConfig, RunOptions};

pub fn run(options: RunOptions, config: PipelineConfig) -> Result<()> {
    println!("🔍 Vérification de: {}", options.sample_sheet_path().display());

    let prepared = prepare(options, &config)?;
    print_validations(&prepared);

    if let Err(e) = config.tools.require() {
        println!("{} {}", style("⚠").yellow(), e);
    }

    let rejected = prepared.rejected().count();
    if rejected > 0 {
        bail!("{} couloir(s) refusé(s) par la validation", rejected);
    }

    println!("{} Feuille valide", style("✓").green());
    Ok(())
}
