//! Shared application state for the operator API.

use std::sync::Arc;

use checkin_core::{Clock, EventStateStore, Reconciler, Scheduler, SystemClock};

/// State shared by every handler: the scheduler and, through it, the
/// reconciler.
pub struct AppState<S, C = SystemClock> {
    scheduler: Arc<Scheduler<S, C>>,
}

impl<S, C> AppState<S, C>
where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    /// Wrap a scheduler owned by the hosting application.
    pub const fn new(scheduler: Arc<Scheduler<S, C>>) -> Self {
        Self { scheduler }
    }

    /// The background scheduler.
    pub const fn scheduler(&self) -> &Arc<Scheduler<S, C>> {
        &self.scheduler
    }

    /// The reconciler the scheduler drives.
    pub fn reconciler(&self) -> &Reconciler<S, C> {
        self.scheduler.reconciler()
    }
}
