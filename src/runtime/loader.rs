//! Runtime bootstrap with single-flight semantics.
//!
//! The loader owns the process-wide environment cache as explicit state
//! (`Unloaded`/`Loading`/`Ready`/`Failed`), not an ambient variable. A
//! check-then-act race cannot start two bootstraps: leadership is claimed
//! and the attachment channel created under one state lock, and every
//! concurrent caller either becomes the leader or attaches to the in-flight
//! operation and receives its outcome.

use crate::config::presets::EnvironmentEnvelope;
use crate::config::types::{CellError, Result, RuntimeState};
use crate::config::validator::validate_envelope;
use crate::observability::audit::events;
use crate::runtime::interpreter::{Interpreter, RuntimeBootstrap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::watch;

/// Bootstrapped interpreter environment shared by every session in the
/// process. Immutable once created; lives until process exit unless retired
/// by the wall-time deadline or an explicit host teardown.
pub struct RuntimeEnvironment {
    envelope_id: String,
    generation: u64,
    interpreter: Arc<dyn Interpreter>,
    run_lock: tokio::sync::Mutex<()>,
    retired: AtomicBool,
}

impl std::fmt::Debug for RuntimeEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeEnvironment")
            .field("envelope_id", &self.envelope_id)
            .field("generation", &self.generation)
            .field("retired", &self.retired)
            .finish_non_exhaustive()
    }
}

impl RuntimeEnvironment {
    fn new(envelope_id: String, generation: u64, interpreter: Arc<dyn Interpreter>) -> Self {
        RuntimeEnvironment {
            envelope_id,
            generation,
            interpreter,
            run_lock: tokio::sync::Mutex::new(()),
            retired: AtomicBool::new(false),
        }
    }

    pub fn envelope_id(&self) -> &str {
        &self.envelope_id
    }

    /// Monotonic bootstrap counter; distinguishes environments across
    /// retire-and-rebootstrap cycles.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Permanently retire this environment. The loader will bootstrap a
    /// fresh one on the next `ensure_ready`. Retirement loses all
    /// interpreter globals previously defined by any session.
    pub fn retire(&self) {
        if !self.retired.swap(true, Ordering::AcqRel) {
            events::environment_retired(&self.envelope_id, self.generation);
            log::warn!(
                "Retired interpreter environment {} (generation {}); all session globals are lost",
                self.envelope_id,
                self.generation
            );
        }
    }

    pub(crate) fn interpreter(&self) -> &Arc<dyn Interpreter> {
        &self.interpreter
    }

    /// Execution serialization lock; acquired fairly (FIFO) by the engine.
    pub(crate) fn run_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.run_lock
    }
}

/// Outcome shared with every caller attached to one bootstrap flight.
type LoadOutcome = std::result::Result<Arc<RuntimeEnvironment>, String>;

enum LoadPhase {
    Unloaded,
    Loading(watch::Receiver<Option<LoadOutcome>>),
    Ready(Arc<RuntimeEnvironment>),
    Failed(String),
}

enum ClaimOutcome {
    Cached(Arc<RuntimeEnvironment>),
    Leader(watch::Sender<Option<LoadOutcome>>),
    Follower(watch::Receiver<Option<LoadOutcome>>),
}

/// Guarantees the interpreter environment is bootstrapped at most once per
/// process lifetime, regardless of how many sessions request it
/// concurrently, and exposes its readiness to all callers.
pub struct RuntimeLoader {
    envelope: EnvironmentEnvelope,
    bootstrap: Arc<dyn RuntimeBootstrap>,
    phase: Mutex<LoadPhase>,
    generation: AtomicU64,
}

impl RuntimeLoader {
    /// Create a loader for one envelope. The envelope is validated up
    /// front; validation warnings are logged, errors are fatal.
    pub fn new(
        envelope: EnvironmentEnvelope,
        bootstrap: Arc<dyn RuntimeBootstrap>,
    ) -> Result<Self> {
        let report = validate_envelope(&envelope)?;
        for warning in report.warnings {
            log::warn!("Envelope warning: {}", warning);
        }

        Ok(RuntimeLoader {
            envelope,
            bootstrap,
            phase: Mutex::new(LoadPhase::Unloaded),
            generation: AtomicU64::new(0),
        })
    }

    pub fn envelope(&self) -> &EnvironmentEnvelope {
        &self.envelope
    }

    /// Current lifecycle state. A cached environment that has been retired
    /// reads as `Unloaded`: the next `ensure_ready` bootstraps afresh.
    pub fn state(&self) -> RuntimeState {
        match &*self.lock_phase() {
            LoadPhase::Unloaded => RuntimeState::Unloaded,
            LoadPhase::Loading(_) => RuntimeState::Loading,
            LoadPhase::Ready(env) if env.is_retired() => RuntimeState::Unloaded,
            LoadPhase::Ready(_) => RuntimeState::Ready,
            LoadPhase::Failed(_) => RuntimeState::Failed,
        }
    }

    /// Return the ready environment, bootstrapping it if necessary.
    ///
    /// Exactly one underlying bootstrap runs no matter how many callers
    /// arrive during `Loading`; all of them receive the same handle or the
    /// same failure. After a failure, a subsequent call retries from
    /// scratch.
    pub async fn ensure_ready(&self) -> Result<Arc<RuntimeEnvironment>> {
        loop {
            match self.claim() {
                ClaimOutcome::Cached(env) => return Ok(env),
                ClaimOutcome::Leader(tx) => return self.run_bootstrap(tx).await,
                ClaimOutcome::Follower(mut rx) => {
                    events::bootstrap_attached(&self.envelope.id);
                    loop {
                        let published = rx.borrow_and_update().clone();
                        if let Some(outcome) = published {
                            return outcome.map_err(CellError::Load);
                        }
                        if rx.changed().await.is_err() {
                            // Leader dropped mid-flight without publishing;
                            // re-enter the claim loop and take over.
                            break;
                        }
                    }
                }
            }
        }
    }

    fn claim(&self) -> ClaimOutcome {
        let mut phase = self.lock_phase();
        match &*phase {
            LoadPhase::Ready(env) if !env.is_retired() => ClaimOutcome::Cached(env.clone()),
            LoadPhase::Loading(rx) if rx.has_changed().is_ok() => {
                ClaimOutcome::Follower(rx.clone())
            }
            // Unloaded, Failed, retired Ready, or an abandoned flight whose
            // leader dropped the sender before publishing.
            _ => {
                let (tx, rx) = watch::channel(None);
                *phase = LoadPhase::Loading(rx);
                ClaimOutcome::Leader(tx)
            }
        }
    }

    async fn run_bootstrap(
        &self,
        tx: watch::Sender<Option<LoadOutcome>>,
    ) -> Result<Arc<RuntimeEnvironment>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        events::bootstrap_started(&self.envelope.id, generation);
        log::info!(
            "Bootstrapping interpreter environment {} (generation {}, module {})",
            self.envelope.id,
            generation,
            self.envelope.module_url
        );

        let outcome: LoadOutcome = match self.bootstrap.bootstrap(&self.envelope).await {
            Ok(interpreter) => Ok(Arc::new(RuntimeEnvironment::new(
                self.envelope.id.clone(),
                generation,
                interpreter,
            ))),
            Err(err) => Err(err.to_string()),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;

        // Publish phase and outcome under one lock so attached waiters and
        // later callers can never observe them disagreeing.
        {
            let mut phase = self.lock_phase();
            match &outcome {
                Ok(env) => {
                    *phase = LoadPhase::Ready(env.clone());
                    events::bootstrap_succeeded(&self.envelope.id, generation, elapsed_ms);
                    log::info!(
                        "Interpreter environment {} ready in {} ms",
                        self.envelope.id,
                        elapsed_ms
                    );
                }
                Err(message) => {
                    *phase = LoadPhase::Failed(message.clone());
                    events::bootstrap_failed(&self.envelope.id, generation, message);
                    log::error!(
                        "Interpreter environment {} failed to bootstrap: {}",
                        self.envelope.id,
                        message
                    );
                }
            }
            let _ = tx.send(Some(outcome.clone()));
        }

        outcome.map_err(CellError::Load)
    }

    fn lock_phase(&self) -> MutexGuard<'_, LoadPhase> {
        // The lock is only held for state inspection and swaps; a poisoned
        // guard still holds consistent state.
        self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::script::{test_envelope, ScriptedBootstrap};

    #[tokio::test]
    async fn ready_state_is_cached_across_calls() {
        let bootstrap = Arc::new(ScriptedBootstrap::new());
        let loader = RuntimeLoader::new(test_envelope(), bootstrap.clone()).unwrap();
        assert_eq!(loader.state(), RuntimeState::Unloaded);

        let first = loader.ensure_ready().await.unwrap();
        let second = loader.ensure_ready().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(bootstrap.call_count(), 1);
        assert_eq!(loader.state(), RuntimeState::Ready);
    }

    #[tokio::test]
    async fn failed_bootstrap_is_retryable() {
        let bootstrap = Arc::new(ScriptedBootstrap::new().failing_first(1));
        let loader = RuntimeLoader::new(test_envelope(), bootstrap.clone()).unwrap();

        let err = loader.ensure_ready().await.unwrap_err();
        assert!(matches!(err, CellError::Load(_)));
        assert_eq!(loader.state(), RuntimeState::Failed);

        let env = loader.ensure_ready().await.unwrap();
        assert_eq!(env.generation(), 2);
        assert_eq!(bootstrap.call_count(), 2);
        assert_eq!(loader.state(), RuntimeState::Ready);
    }

    #[tokio::test]
    async fn retired_environment_is_replaced_on_next_call() {
        let bootstrap = Arc::new(ScriptedBootstrap::new());
        let loader = RuntimeLoader::new(test_envelope(), bootstrap.clone()).unwrap();

        let first = loader.ensure_ready().await.unwrap();
        first.retire();
        assert_eq!(loader.state(), RuntimeState::Unloaded);

        let second = loader.ensure_ready().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.generation(), 2);
        assert_eq!(bootstrap.call_count(), 2);
    }

    #[tokio::test]
    async fn abandoned_flight_is_taken_over() {
        let bootstrap = Arc::new(ScriptedBootstrap::new().with_delay_ms(200));
        let loader = Arc::new(RuntimeLoader::new(test_envelope(), bootstrap.clone()).unwrap());

        // Leader claims the flight, then is dropped before finishing.
        let leader = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.ensure_ready().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(loader.state(), RuntimeState::Loading);
        leader.abort();
        let _ = leader.await;

        // A fresh, fast bootstrap takes over instead of hanging forever.
        let takeover = Arc::new(ScriptedBootstrap::new());
        let loader2 = RuntimeLoader::new(test_envelope(), takeover.clone()).unwrap();
        let env = loader2.ensure_ready().await.unwrap();
        assert_eq!(env.generation(), 1);

        // The original loader also recovers: the next caller claims the
        // abandoned flight and drives its own bootstrap.
        let env = loader.ensure_ready().await.unwrap();
        assert!(!env.is_retired());
        assert_eq!(bootstrap.call_count(), 2);
    }

    #[tokio::test]
    async fn invalid_envelope_is_rejected_at_construction() {
        let mut envelope = test_envelope();
        envelope.module_url = String::new();
        let result = RuntimeLoader::new(envelope, Arc::new(ScriptedBootstrap::new()));
        assert!(matches!(result, Err(CellError::Config(_))));
    }
}
