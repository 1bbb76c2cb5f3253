//! # Erpeto Recorder
//!
//! Turns the raw event stream of a browser session into the ordered list
//! of [`Action`](erpeto_core::Action)s a replay is built from.
//!
//! The pipeline has two stages:
//! 1. [`Collector`] reads events under a deadline, groups network events
//!    into exchanges and retrieves response bodies while they are still
//!    available.
//! 2. [`reassemble`] expands redirects and runs every exchange through the
//!    reassembly state machine, interleaving user inputs.

pub mod assembler;
pub mod cdp;
pub mod collect;
pub mod filter;
pub mod fragment;
pub mod reassemble;
pub mod recorded;
pub mod redirect;
pub mod session;

pub use assembler::ExchangeAssembler;
pub use cdp::{BrowserEvent, NetworkEvent, RequestId};
pub use collect::{Capture, Collector, Exchange};
pub use filter::{AllowAll, CaptureFilter, UrlFilter};
pub use reassemble::{Reassembly, merge_inputs, reassemble};
pub use recorded::RecordedSession;
pub use session::{
    BodyFetcher, EventSource, ResponseBody, SessionKey, StopHandle, StopSignal, stop_channel,
};

use erpeto_config::AppConfig;
use erpeto_core::ReassemblyError;

/// Collect a whole session and reassemble it.
pub async fn record(
    config: &AppConfig,
    key: SessionKey,
    source: &mut dyn EventSource,
    fetcher: &dyn BodyFetcher,
    stop: StopSignal,
) -> Result<Reassembly, ReassemblyError> {
    let filter = CaptureFilter::from_config(&config.recorder);
    let captures = Collector::new(&config.recorder, &filter, key)
        .with_stop_signal(stop)
        .collect(source, fetcher)
        .await;
    reassemble(captures, &config.reassembly)
}

/// Replay a saved recording through the full pipeline.
pub async fn replay_recording(
    config: &AppConfig,
    mut session: RecordedSession,
) -> Result<Reassembly, ReassemblyError> {
    let key = session.session_key();
    let bodies = RecordedSession {
        bodies: std::mem::take(&mut session.bodies),
        ..RecordedSession::default()
    };
    record(config, key, &mut session, &bodies, StopSignal::never()).await
}
