//! Double barrier over ephemeral participant nodes.
//!
//! A cohort of `client_count` participants rendezvous at a barrier path:
//!
//! 1. **Await connection**: wait (bounded) for the store session.
//! 2. **Check released**: if `<barrier>/ready` exists the cohort has already
//!    been released and late joiners pass straight through.
//! 3. **Register**: create the barrier path, check `ready` again, then create
//!    an ephemeral sequential participant node `<barrier>/<uuid>-<seq>`.
//! 4. **Await quorum**: list the children; once the participant count reaches
//!    `client_count`, create `ready` (an existing marker counts as success)
//!    and return. Otherwise wait on a children watch and list again.
//!
//! The `ready` marker is the only record that the barrier was released. A
//! participant that loses its session is implicitly gone.
//!
//! An optional deadline races the protocol. Whichever side claims the
//! resolution guard first decides the outcome; once quorum is observed the
//! deadline can no longer fail the attempt.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::time::Duration;

use orca_store::CoordinationStore;
use orca_store::CreateMode;
use orca_store::StoreError;
use orca_store::path;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;
use uuid::Uuid;

use crate::connection::wait_for_connection;
use crate::constants::BARRIER_READY_MARKER;
use crate::error::CoordinationError;
use crate::pure;

/// Protocol stage of a barrier entry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BarrierStage {
    /// Waiting for store connectivity.
    AwaitConnection = 0,
    /// Checking for an existing ready marker.
    CheckReleased = 1,
    /// Creating the barrier path and participant node.
    Register = 2,
    /// Participant registered, waiting for the cohort.
    AwaitQuorum = 3,
    /// The barrier is released for this attempt.
    Released = 4,
}

impl BarrierStage {
    /// Convert the stage to a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BarrierStage::AwaitConnection => "await-connection",
            BarrierStage::CheckReleased => "check-released",
            BarrierStage::Register => "register",
            BarrierStage::AwaitQuorum => "await-quorum",
            BarrierStage::Released => "released",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => BarrierStage::AwaitConnection,
            1 => BarrierStage::CheckReleased,
            2 => BarrierStage::Register,
            3 => BarrierStage::AwaitQuorum,
            _ => BarrierStage::Released,
        }
    }
}

impl fmt::Display for BarrierStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful outcome of [`DoubleBarrier::enter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierEntry {
    /// This caller registered and the cohort assembled.
    Entered {
        /// The caller's participant node; pass it to `leave`.
        participant_path: String,
    },
    /// The barrier had already been released; no node was created.
    AlreadyReleased,
}

impl BarrierEntry {
    /// The participant node, if one was created.
    pub fn participant_path(&self) -> Option<&str> {
        match self {
            BarrierEntry::Entered { participant_path } => Some(participant_path),
            BarrierEntry::AlreadyReleased => None,
        }
    }
}

const PENDING: u8 = 0;
const READY: u8 = 1;
const TIMED_OUT: u8 = 2;

/// One-shot resolution state shared by the protocol and its deadline.
#[derive(Debug)]
struct ResolutionGuard {
    state: AtomicU8,
    stage: AtomicU8,
    participant_path: Mutex<Option<String>>,
}

impl ResolutionGuard {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            stage: AtomicU8::new(BarrierStage::AwaitConnection as u8),
            participant_path: Mutex::new(None),
        }
    }

    /// Claim the outcome for the quorum side. Returns false if the deadline won.
    fn mark_ready(&self) -> bool {
        match self.state.compare_exchange(PENDING, READY, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => true,
            Err(current) => current == READY,
        }
    }

    /// Claim the outcome for the deadline. Returns false if quorum already won.
    fn mark_timed_out(&self) -> bool {
        self.state.compare_exchange(PENDING, TIMED_OUT, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    fn set_stage(&self, stage: BarrierStage) {
        self.stage.store(stage as u8, Ordering::Release);
    }

    fn stage(&self) -> BarrierStage {
        BarrierStage::from_u8(self.stage.load(Ordering::Acquire))
    }
}

/// Double barrier coordinator.
pub struct DoubleBarrier<S: CoordinationStore + ?Sized + 'static> {
    store: Arc<S>,
    connect_timeout: Duration,
}

impl<S: CoordinationStore + ?Sized + 'static> DoubleBarrier<S> {
    /// Create a coordinator. `connect_timeout` bounds the wait for store connectivity.
    pub fn new(store: Arc<S>, connect_timeout: Duration) -> Self {
        Self { store, connect_timeout }
    }

    /// Enter the barrier at `barrier_path` and wait for `client_count` participants.
    ///
    /// With a non-zero `timeout`, fails with `BarrierTimeout` if the cohort
    /// has not been observed in time. A timed-out attempt leaves its participant node
    /// registered; the error carries its path so the caller can `leave`.
    pub async fn enter(
        &self,
        barrier_path: &str,
        client_count: u32,
        timeout: Option<Duration>,
    ) -> Result<BarrierEntry, CoordinationError> {
        if client_count == 0 {
            return Err(CoordinationError::InvalidArgument {
                reason: "barrier client_count must be positive".to_string(),
            });
        }
        path::validate(barrier_path).map_err(|e| CoordinationError::InvalidKey {
            key: barrier_path.to_string(),
            reason: e.to_string(),
        })?;

        let guard = ResolutionGuard::new();
        let protocol = self.run_enter(barrier_path, client_count, &guard);

        let Some(timeout) = timeout.filter(|t| !t.is_zero()) else {
            return protocol.await;
        };

        tokio::pin!(protocol);
        tokio::select! {
            biased;
            result = &mut protocol => result,
            _ = tokio::time::sleep(timeout) => {
                if guard.mark_timed_out() {
                    let stage = guard.stage();
                    let participant_path = guard.participant_path.lock().clone();
                    warn!(barrier = barrier_path, %stage, client_count, "barrier enter timed out");
                    Err(CoordinationError::BarrierTimeout {
                        path: barrier_path.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                        stage: stage.as_str().to_string(),
                        participant_path,
                    })
                } else {
                    // Quorum was observed first; finish releasing.
                    protocol.await
                }
            }
        }
    }

    /// Remove a participant node.
    ///
    /// A node that no longer exists is reported as a store error.
    pub async fn leave(&self, participant_path: &str) -> Result<(), CoordinationError> {
        wait_for_connection(&*self.store, self.connect_timeout).await?;
        self.store.remove(participant_path, None).await?;
        debug!(participant = participant_path, "left barrier");
        Ok(())
    }

    async fn run_enter(
        &self,
        barrier_path: &str,
        client_count: u32,
        guard: &ResolutionGuard,
    ) -> Result<BarrierEntry, CoordinationError> {
        let ready_path = path::join(barrier_path, BARRIER_READY_MARKER);

        guard.set_stage(BarrierStage::AwaitConnection);
        wait_for_connection(&*self.store, self.connect_timeout).await?;

        guard.set_stage(BarrierStage::CheckReleased);
        if self.is_released(&ready_path).await? {
            return Ok(self.pass_through(barrier_path, guard));
        }

        guard.set_stage(BarrierStage::Register);
        self.store.create_recursive(barrier_path).await?;
        // Another participant may have released the barrier since the first check.
        if self.is_released(&ready_path).await? {
            return Ok(self.pass_through(barrier_path, guard));
        }
        let prefix = pure::participant_prefix(barrier_path, &Uuid::new_v4().to_string());
        let participant_path = self.store.create(&prefix, Vec::new(), CreateMode::EphemeralSequential).await?;
        *guard.participant_path.lock() = Some(participant_path.clone());
        debug!(barrier = barrier_path, participant = %participant_path, "registered at barrier");

        guard.set_stage(BarrierStage::AwaitQuorum);
        loop {
            let (children, watch) = self.store.get_children_watch(barrier_path).await?;
            let participants = pure::count_participants(&children);

            if pure::has_ready_marker(&children) || pure::is_quorum_reached(participants, client_count) {
                if !guard.mark_ready() {
                    // The deadline already resolved this attempt.
                    return Ok(BarrierEntry::Entered { participant_path });
                }
                if !pure::has_ready_marker(&children) {
                    self.create_ready_marker(&ready_path).await?;
                }
                guard.set_stage(BarrierStage::Released);
                info!(barrier = barrier_path, participants, client_count, "barrier released");
                return Ok(BarrierEntry::Entered { participant_path });
            }

            trace!(barrier = barrier_path, participants, client_count, "waiting for barrier quorum");
            watch.fired().await;
        }
    }

    fn pass_through(&self, barrier_path: &str, guard: &ResolutionGuard) -> BarrierEntry {
        guard.mark_ready();
        guard.set_stage(BarrierStage::Released);
        debug!(barrier = barrier_path, "barrier already released, passing through");
        BarrierEntry::AlreadyReleased
    }

    async fn is_released(&self, ready_path: &str) -> Result<bool, CoordinationError> {
        Ok(self.store.exists(ready_path).await?.is_some())
    }

    /// Create the ready marker; losing the creation race is success.
    async fn create_ready_marker(&self, ready_path: &str) -> Result<(), CoordinationError> {
        match self.store.create(ready_path, Vec::new(), CreateMode::Ephemeral).await {
            Ok(_) => Ok(()),
            Err(StoreError::NodeExists { .. }) => {
                trace!(ready = ready_path, "ready marker created by another participant");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
