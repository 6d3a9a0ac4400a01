//! Reusable race-safe lifecycle state machine for sandboxes.

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::SandboxError;
use berth_rs_protocol::SandboxStatus;

/// Outcome shared between every caller awaiting the same transition.
type OpResult = Result<(), Arc<SandboxError>>;
type SharedOp = Shared<BoxFuture<'static, OpResult>>;

/// Which transition a shared future belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Start,
    Stop,
    Destroy,
}

/// Decision taken while holding the state lock; awaited after release.
enum Action {
    /// Await the shared transition and return its outcome.
    Join(SharedOp),
    /// Await the shared transition, propagate its failure, then re-evaluate.
    Barrier(SharedOp),
    /// Await the shared transition, ignore its failure, then re-evaluate.
    Swallow(SharedOp),
}

/// Race-safe `start`/`stop`/`destroy` coordinator.
///
/// Each transition kind has at most one in-flight execution; the in-flight
/// future itself is memoized (not just its result), so late-arriving callers
/// await the same completion instead of re-running side effects. The lock is
/// never held across an await.
pub struct LifecycleController {
    inner: Mutex<LifecycleInner>,
}

struct LifecycleInner {
    status: SandboxStatus,
    start: Option<SharedOp>,
    stop: Option<SharedOp>,
    destroy: Option<SharedOp>,
}

impl LifecycleController {
    /// New controller in `pending`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(LifecycleInner {
                status: SandboxStatus::Pending,
                start: None,
                stop: None,
                destroy: None,
            }),
        })
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SandboxStatus {
        self.inner.lock().status
    }

    /// Drive the sandbox to `running`.
    ///
    /// Waits out any in-flight stop/destroy first and propagates their
    /// failure: starting on top of a broken teardown is refused. `on_started`
    /// runs exactly once after the status flips to `running`; it must handle
    /// its own failures (hook errors are not fatal to the start).
    pub async fn start(
        self: &Arc<Self>,
        op: BoxFuture<'static, Result<(), SandboxError>>,
        on_started: BoxFuture<'static, ()>,
    ) -> Result<(), SandboxError> {
        let mut op = Some(op);
        let mut on_started = Some(on_started);
        loop {
            let action = {
                let mut inner = self.inner.lock();
                if inner.status == SandboxStatus::Running {
                    return Ok(());
                }
                if inner.status == SandboxStatus::Destroyed {
                    return Err(SandboxError::NotReady("sandbox is destroyed".to_string()));
                }
                if let Some(fut) = inner.start.clone() {
                    Action::Join(fut)
                } else if let Some(fut) = inner.stop.clone() {
                    Action::Barrier(fut)
                } else if let Some(fut) = inner.destroy.clone() {
                    Action::Barrier(fut)
                } else {
                    let (Some(op), Some(on_started)) = (op.take(), on_started.take()) else {
                        unreachable!("start transition claimed twice by one caller");
                    };
                    debug!("lifecycle starting (from={:?})", inner.status);
                    inner.status = SandboxStatus::Starting;
                    let shared =
                        self.drive(OpKind::Start, op, SandboxStatus::Running, Some(on_started));
                    inner.start = Some(shared.clone());
                    Action::Join(shared)
                }
            };
            match action {
                Action::Join(fut) => return fut.await.map_err(SandboxError::Transition),
                Action::Barrier(fut) => fut.await.map_err(SandboxError::Transition)?,
                Action::Swallow(fut) => {
                    let _ = fut.await;
                }
            }
        }
    }

    /// Drive the sandbox to `stopped`.
    ///
    /// A failed concurrent start is awaited but its error swallowed, so
    /// teardown is never blocked by a broken startup. A `pending` sandbox
    /// jumps straight to `stopped` with no side effects.
    pub async fn stop(
        self: &Arc<Self>,
        op: BoxFuture<'static, Result<(), SandboxError>>,
    ) -> Result<(), SandboxError> {
        let mut op = Some(op);
        loop {
            let action = {
                let mut inner = self.inner.lock();
                match inner.status {
                    SandboxStatus::Stopped | SandboxStatus::Destroyed => return Ok(()),
                    SandboxStatus::Pending => {
                        inner.status = SandboxStatus::Stopped;
                        return Ok(());
                    }
                    _ => {}
                }
                if let Some(fut) = inner.stop.clone() {
                    Action::Join(fut)
                } else if let Some(fut) = inner.destroy.clone() {
                    // A destroy is already tearing the sandbox down; share
                    // its outcome instead of racing a second teardown.
                    Action::Join(fut)
                } else if let Some(fut) = inner.start.clone() {
                    Action::Swallow(fut)
                } else {
                    let Some(op) = op.take() else {
                        unreachable!("stop transition claimed twice by one caller");
                    };
                    debug!("lifecycle stopping (from={:?})", inner.status);
                    inner.status = SandboxStatus::Stopping;
                    let shared = self.drive(OpKind::Stop, op, SandboxStatus::Stopped, None);
                    inner.stop = Some(shared.clone());
                    Action::Join(shared)
                }
            };
            match action {
                Action::Join(fut) => return fut.await.map_err(SandboxError::Transition),
                Action::Barrier(fut) => fut.await.map_err(SandboxError::Transition)?,
                Action::Swallow(fut) => {
                    let _ = fut.await;
                }
            }
        }
    }

    /// Drive the sandbox to the terminal `destroyed` state.
    ///
    /// A never-started sandbox jumps straight to `destroyed`; failures of
    /// concurrent start/stop transitions are swallowed for ordering purposes.
    pub async fn destroy(
        self: &Arc<Self>,
        op: BoxFuture<'static, Result<(), SandboxError>>,
    ) -> Result<(), SandboxError> {
        let mut op = Some(op);
        loop {
            let action = {
                let mut inner = self.inner.lock();
                if inner.status == SandboxStatus::Destroyed {
                    return Ok(());
                }
                if let Some(fut) = inner.destroy.clone() {
                    Action::Join(fut)
                } else if let Some(fut) = inner.start.clone() {
                    Action::Swallow(fut)
                } else if let Some(fut) = inner.stop.clone() {
                    Action::Swallow(fut)
                } else if inner.status == SandboxStatus::Pending {
                    // Never started: nothing to tear down.
                    inner.status = SandboxStatus::Destroyed;
                    return Ok(());
                } else {
                    let Some(op) = op.take() else {
                        unreachable!("destroy transition claimed twice by one caller");
                    };
                    debug!("lifecycle destroying (from={:?})", inner.status);
                    inner.status = SandboxStatus::Destroying;
                    let shared = self.drive(OpKind::Destroy, op, SandboxStatus::Destroyed, None);
                    inner.destroy = Some(shared.clone());
                    Action::Join(shared)
                }
            };
            match action {
                Action::Join(fut) => return fut.await.map_err(SandboxError::Transition),
                Action::Barrier(fut) => fut.await.map_err(SandboxError::Transition)?,
                Action::Swallow(fut) => {
                    let _ = fut.await;
                }
            }
        }
    }

    /// Build the shared future that executes a transition exactly once.
    fn drive(
        self: &Arc<Self>,
        kind: OpKind,
        op: BoxFuture<'static, Result<(), SandboxError>>,
        success_status: SandboxStatus,
        on_success: Option<BoxFuture<'static, ()>>,
    ) -> SharedOp {
        let ctl = Arc::clone(self);
        async move {
            let result = op.await;
            {
                let mut inner = ctl.inner.lock();
                inner.status = match &result {
                    Ok(()) => success_status,
                    Err(_) => SandboxStatus::Error,
                };
            }
            if result.is_ok()
                && let Some(hook) = on_success
            {
                hook.await;
            }
            {
                let mut inner = ctl.inner.lock();
                match kind {
                    OpKind::Start => inner.start = None,
                    OpKind::Stop => inner.stop = None,
                    OpKind::Destroy => inner.destroy = None,
                }
            }
            result.map_err(Arc::new)
        }
        .boxed()
        .shared()
    }
}
