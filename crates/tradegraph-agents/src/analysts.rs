use std::time::Instant;

use tracing::{error, info, warn};
use tradegraph_models::{AnalystKind, AnalystReport, HaltReason, SharedState};

use crate::agent::AgentEnv;
use crate::error::{DataError, GraphError, StageError, TurnError};
use crate::prompts::analyst_task;
use crate::tools::{tools_for, ToolDispatcher};

enum AnalystResult {
    Report(AnalystReport),
    Unreachable(DataError),
    Halted(HaltReason),
}

fn unavailable(reason: impl Into<String>) -> AnalystResult {
    AnalystResult::Report(AnalystReport::Unavailable {
        reason: reason.into(),
    })
}

fn classify(result: Result<crate::agent::AgentReply, TurnError>) -> AnalystResult {
    match result {
        Ok(reply) if reply.saw_only_empty_data() => {
            unavailable("the data sources returned no data for this window")
        }
        Ok(reply) => AnalystResult::Report(AnalystReport::Available {
            content: reply.content,
        }),
        Err(TurnError::Halt(reason)) => AnalystResult::Halted(reason),
        Err(TurnError::Data(err)) => AnalystResult::Unreachable(err),
        Err(TurnError::Malformed { attempts }) => {
            unavailable(format!("no usable report after {attempts} attempts"))
        }
        Err(TurnError::Llm(err)) => unavailable(format!("analyst failed: {err}")),
    }
}

/// Run the selected analysts concurrently and write their reports.
///
/// Analysts never see each other's output. Reports are written after the join
/// barrier, in analyst order. Empty data and analyst failures degrade to an
/// unavailable marker; connectivity failures are fatal when they hit a
/// required analyst or every analyst that ran.
pub async fn run_analysts(
    env: &AgentEnv,
    dispatcher: &ToolDispatcher,
    analysts: &[AnalystKind],
    required: &[AnalystKind],
    state: &mut SharedState,
) -> Result<(), StageError> {
    let start = Instant::now();
    let mut kinds = analysts.to_vec();
    kinds.sort();
    kinds.dedup();

    let ticker = state.ticker().to_string();
    let trade_date = state.trade_date();

    let mut handles = Vec::new();
    for kind in &kinds {
        let kind = *kind;
        let env = env.clone();
        let dispatcher = dispatcher.clone();
        let task = analyst_task(kind, &ticker, trade_date);
        handles.push((
            kind,
            tokio::spawn(async move {
                env.run(kind.role(), task, tools_for(kind), Some(&dispatcher))
                    .await
            }),
        ));
    }

    let mut unreachable: Vec<(AnalystKind, DataError)> = Vec::new();
    let mut halt: Option<HaltReason> = None;

    for (kind, handle) in handles {
        let result = match handle.await {
            Ok(result) => classify(result),
            Err(e) => {
                error!(analyst = %kind, error = %e, "Analyst task panicked");
                unavailable("analyst task aborted")
            }
        };

        match result {
            AnalystResult::Report(report) => {
                if let AnalystReport::Unavailable { reason } = &report {
                    warn!(ticker = %ticker, analyst = %kind, reason = %reason, "Report unavailable");
                }
                state.set_report(kind, report)?;
            }
            AnalystResult::Unreachable(err) => {
                warn!(ticker = %ticker, analyst = %kind, error = %err, "Data source unreachable");
                state.set_report(
                    kind,
                    AnalystReport::Unavailable {
                        reason: err.to_string(),
                    },
                )?;
                unreachable.push((kind, err));
            }
            AnalystResult::Halted(reason) => {
                warn!(ticker = %ticker, analyst = %kind, reason = %reason, "Analyst halted");
                halt.get_or_insert(reason);
            }
        }
    }

    let blocks_run = !unreachable.is_empty()
        && (unreachable.len() == kinds.len()
            || unreachable.iter().any(|(kind, _)| required.contains(kind)));
    if blocks_run {
        let message = unreachable
            .first()
            .map(|(_, e)| e.to_string())
            .unwrap_or_default();
        return Err(StageError::Fatal(GraphError::DataUnreachable {
            analysts: unreachable.into_iter().map(|(kind, _)| kind).collect(),
            message,
        }));
    }

    if let Some(reason) = halt {
        return Err(StageError::Halt(reason));
    }

    info!(
        ticker = %ticker,
        available = state.reports().values().filter(|r| r.is_available()).count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Analyst stage complete"
    );
    Ok(())
}
