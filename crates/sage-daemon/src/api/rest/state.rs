//! Application state for API handlers

use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use sage_audit::AuditRecorder;
use sage_dispatcher::{EntityStore, ExecutionDispatcher, InMemoryStore, PinTotpVerifier};
use sage_evaluator::DecisionEvaluator;
use sage_registry::ActionRegistry;
use sage_situation::SituationTracker;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Execution path; also owns the store and situation tracker
    pub dispatcher: Arc<ExecutionDispatcher>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(dispatcher: Arc<ExecutionDispatcher>) -> Self {
        Self {
            dispatcher,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Wire the engine from configuration, using the built-in catalog and
    /// in-memory storage.
    pub fn from_config(config: &DaemonConfig) -> DaemonResult<Self> {
        if config.engine.token_ttl_secs <= 0 {
            return Err(DaemonError::Config(
                "engine.token_ttl_secs must be positive".to_string(),
            ));
        }
        if config.signing.code_step_secs == 0 {
            return Err(DaemonError::Config(
                "signing.code_step_secs must be positive".to_string(),
            ));
        }

        let registry = Arc::new(ActionRegistry::builtin()?);
        let evaluator = Arc::new(
            DecisionEvaluator::new(registry.clone())
                .with_scoring(config.engine.scoring.policy())
                .with_narrow_margin(config.engine.narrow_margin),
        );
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryStore::new(AuditRecorder::new(registry)));
        let verifier = Arc::new(
            PinTotpVerifier::new(config.signing.credentials.clone()).with_step(
                config.signing.code_step_secs,
                config.signing.code_skew_steps,
            ),
        );

        let dispatcher = ExecutionDispatcher::new(
            evaluator,
            Arc::new(SituationTracker::new()),
            store,
            verifier,
        )
        .with_token_ttl(chrono::Duration::seconds(config.engine.token_ttl_secs));

        Ok(Self::new(Arc::new(dispatcher)))
    }

    pub fn evaluator(&self) -> &DecisionEvaluator {
        self.dispatcher.evaluator()
    }

    pub fn situations(&self) -> &SituationTracker {
        self.dispatcher.situations()
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        self.dispatcher.store()
    }

    pub fn registry(&self) -> &ActionRegistry {
        self.dispatcher.registry()
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds().max(0);
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
