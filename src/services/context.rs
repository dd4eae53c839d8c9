//! Shared dependencies handed to every correlator handler.

use std::sync::Arc;

use crate::domain::ports::{
    EventRecordRepository, EventStore, IngressLogRepository, RuleRepository, TicketClient,
};
use crate::services::error_reporter::ErrorReporter;
use crate::services::rule_resolver::RuleResolver;

/// Process-level settings the handlers need.
#[derive(Debug, Clone)]
pub struct CorrelatorSettings {
    /// Environment tag baked into stored document ids.
    pub environment: String,
    /// Ingest pipeline every event document goes through.
    pub main_pipeline: String,
}

/// Everything a handler may touch, behind ports.
pub struct CorrelatorContext {
    pub store: Arc<dyn EventStore>,
    pub tickets: Arc<dyn TicketClient>,
    pub records: Arc<dyn EventRecordRepository>,
    pub ingress: Arc<dyn IngressLogRepository>,
    pub rule_repo: Arc<dyn RuleRepository>,
    pub rules: RuleResolver,
    pub errors: ErrorReporter,
    pub settings: CorrelatorSettings,
}
