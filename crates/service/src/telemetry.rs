use expenseflow_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use expenseflow_core::config::AppConfig;

pub fn init_logging(config: &AppConfig) {
    use expenseflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

/// Forwards audit events into the tracing pipeline, one structured event per
/// emission.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let expense_id = event.expense_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown");
        match event.outcome {
            AuditOutcome::Success | AuditOutcome::Rejected => {
                tracing::info!(
                    event_name = %event.event_type,
                    audit_event_id = %event.event_id,
                    correlation_id = %event.correlation_id,
                    expense_id,
                    actor = %event.actor,
                    outcome = ?event.outcome,
                    "audit event"
                );
            }
            AuditOutcome::Failed => {
                tracing::warn!(
                    event_name = %event.event_type,
                    audit_event_id = %event.event_id,
                    correlation_id = %event.correlation_id,
                    expense_id,
                    actor = %event.actor,
                    "audit event failed"
                );
            }
        }
    }
}
