//! Tableaux de validation et de bilan

use console::style;
use dmx_core::{LaneStatus, PreparedRun, RunReport};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct ValidationRow {
    #[tabled(rename = "Couloir")]
    lane: u8,
    #[tabled(rename = "Échantillons")]
    samples: usize,
    #[tabled(rename = "Structure")]
    read_structure: String,
    #[tabled(rename = "Statut")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Couloir")]
    lane: u8,
    #[tabled(rename = "Statut")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Affiche le verdict de validation de chaque couloir
pub fn print_validations(prepared: &PreparedRun) {
    let rows: Vec<ValidationRow> = prepared
        .validations
        .iter()
        .map(|v| {
            let lane = prepared.partition.lanes.get(&v.lane);
            ValidationRow {
                lane: v.lane,
                samples: lane.map(|l| l.rows.len()).unwrap_or(0),
                read_structure: lane
                    .and_then(|l| l.read_structure())
                    .unwrap_or("-")
                    .to_string(),
                status: if v.result.passed {
                    style("valide").green().to_string()
                } else {
                    style("refusé").red().to_string()
                },
                message: v.result.message.clone().unwrap_or_default(),
            }
        })
        .collect();

    println!();
    println!("{}", Table::new(rows));

    if !prepared.partition.omitted.is_empty() {
        println!(
            "Couloir(s) omis: {}",
            dmx_utils::format_lane_list(&prepared.partition.omitted)
        );
    }
}

/// Affiche le bilan d'un run
pub fn print_report(report: &RunReport) {
    let rows: Vec<OutcomeRow> = report
        .outcomes
        .iter()
        .map(|outcome| OutcomeRow {
            lane: outcome.lane,
            status: match outcome.status {
                LaneStatus::Succeeded => style("réussi").green().to_string(),
                LaneStatus::Failed => style("échec").red().to_string(),
            },
            message: outcome.message.clone(),
        })
        .collect();

    println!();
    println!("Run {} ({})", style(&report.run_id).bold(), report.timestamp);
    println!("{}", Table::new(rows));
    println!(
        "{} réussi(s), {} en échec, {} feuille(s) projet écrite(s)",
        style(report.succeeded()).green(),
        style(report.failed()).red(),
        report.collection.sample_sheets.len()
    );
    for path in &report.collection.missing {
        println!("{} absent: {}", style("⚠").yellow(), path.display());
    }
}
