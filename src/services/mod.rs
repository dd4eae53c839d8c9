//! Services layer: the correlation state machine and its supporting
//! services.

pub mod context;
pub mod correlator;
pub mod dispatcher;
pub mod error_reporter;
pub mod pipelines;
pub mod purge;
pub mod rule_resolver;
pub mod scheduler;
pub mod templates;
pub mod worker;

pub use context::{CorrelatorContext, CorrelatorSettings};
pub use dispatcher::Dispatcher;
pub use error_reporter::ErrorReporter;
pub use pipelines::PipelineManager;
pub use purge::PurgeService;
pub use rule_resolver::RuleResolver;
pub use scheduler::Scheduler;
pub use worker::Worker;
