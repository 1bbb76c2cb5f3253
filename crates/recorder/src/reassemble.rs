//! Turning collected captures into the ordered action list.

use crate::assembler::ExchangeAssembler;
use crate::collect::{Capture, Exchange};
use crate::redirect::expand_redirects;
use erpeto_config::ReassemblyConfig;
use erpeto_core::{Action, ReassemblyError};
use tracing::{info, warn};

/// Outcome of a reassembly run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reassembly {
    /// Actions in replay order
    pub actions: Vec<Action>,

    /// Exchanges cut short by a protocol violation
    pub violations: Vec<ReassemblyError>,
}

/// Reassemble every non-ignored exchange and interleave the inputs.
///
/// A protocol violation ends its exchange early; the actions already
/// completed for it are kept. With `strict` set, the first violation fails
/// the whole run instead.
pub fn reassemble(
    captures: Vec<Capture>,
    config: &ReassemblyConfig,
) -> Result<Reassembly, ReassemblyError> {
    let mut report = Reassembly::default();
    let mut skipped = 0usize;

    for capture in captures {
        match capture {
            Capture::Input(input) => report.actions.push(Action::Input(input)),
            Capture::Exchange(exchange) if exchange.ignored => skipped += 1,
            Capture::Exchange(exchange) => {
                let (actions, violation) = reassemble_exchange(exchange);
                report.actions.extend(actions);
                if let Some(violation) = violation {
                    if config.strict {
                        return Err(violation);
                    }
                    warn!(
                        request_id = %violation.request_id(),
                        error = %violation,
                        "Exchange aborted on protocol violation"
                    );
                    report.violations.push(violation);
                }
            }
        }
    }

    if config.merge_inputs {
        report.actions = merge_inputs(report.actions);
    }

    info!(
        actions = report.actions.len(),
        ignored_exchanges = skipped,
        violations = report.violations.len(),
        "Reassembly finished"
    );
    Ok(report)
}

/// Run one exchange through redirect expansion and the state machine.
pub fn reassemble_exchange(exchange: Exchange) -> (Vec<Action>, Option<ReassemblyError>) {
    let mut assembler = ExchangeAssembler::new(exchange.request_id, exchange.bodies);
    for event in expand_redirects(exchange.events) {
        if let Err(violation) = assembler.push(&event) {
            return (assembler.take_completed(), Some(violation));
        }
    }
    (assembler.finish(), None)
}

/// Collapse consecutive inputs on the same element into the last one.
///
/// An input event carries the whole field value, so only the final state
/// of an edit matters. The surviving input takes the position of the last
/// edit.
pub fn merge_inputs(actions: Vec<Action>) -> Vec<Action> {
    let mut merged = Vec::with_capacity(actions.len());
    let mut pending: Option<(usize, Action)> = None;

    for action in actions {
        if !matches!(action, Action::Input(_)) {
            merged.push(action);
            continue;
        }
        let same_element = match (&pending, &action) {
            (Some((_, Action::Input(prev))), Action::Input(input)) => prev.selector == input.selector,
            _ => false,
        };
        if !same_element && let Some((_, prev)) = pending.take() {
            merged.push(prev);
        }
        pending = Some((merged.len(), action));
    }

    if let Some((position, input)) = pending {
        merged.insert(position, input);
    }
    merged
}
