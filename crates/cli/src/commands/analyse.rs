//! `erpeto analyse`: Reassemble a recording and discover its dependencies.

use erpeto_analyser::{AnalysisReport, Analyser};
use erpeto_config::AppConfig;
use erpeto_core::Action;
use erpeto_recorder::{RecordedSession, replay_recording};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// The outbound document: the resolved action list and how it was built.
#[derive(Debug, Serialize)]
pub struct AnalysedSession {
    pub report: AnalysisReport,

    /// Exchanges cut short by a protocol violation
    pub violations: Vec<String>,

    pub actions: Vec<Action>,
}

pub async fn run(
    config: &AppConfig,
    recording: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = RecordedSession::load(recording)?;
    info!(
        path = %recording.display(),
        events = session.events.len(),
        bodies = session.bodies.len(),
        "Loaded recording"
    );

    let analysed = analyse(config, session).await?;
    let document = serde_json::to_string_pretty(&analysed)?;

    match output {
        Some(path) => {
            std::fs::write(path, document)?;
            eprintln!("✅ Wrote {} actions to {}", analysed.actions.len(), path.display());
        }
        None => println!("{document}"),
    }

    eprintln!(
        "   Requests: {}  Targets: {}  Violations: {}",
        analysed.report.requests,
        analysed.report.targets,
        analysed.violations.len()
    );
    Ok(())
}

/// Run the whole pipeline over a recording.
pub async fn analyse(
    config: &AppConfig,
    session: RecordedSession,
) -> Result<AnalysedSession, Box<dyn std::error::Error>> {
    let mut reassembly = replay_recording(config, session).await?;
    let report = Analyser::new(&config.analyser).analyse(&mut reassembly.actions);

    Ok(AnalysedSession {
        report,
        violations: reassembly.violations.iter().map(ToString::to_string).collect(),
        actions: reassembly.actions,
    })
}
