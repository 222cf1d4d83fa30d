//! Observer notifications fired by the kernel.

use super::Kernel;
use crate::storage::VersionRow;
use std::panic::{self, AssertUnwindSafe};

/// Fixed set of notifications a kernel emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelEvent {
    /// A version row was written.
    Saved,
    /// A tombstone was written.
    Deleted,
    /// A row became part of the live drawing.
    Shown,
    /// A row left the live drawing.
    Hidden,
}

/// Outcome of a single handler invocation.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Receives kernel notifications.
///
/// Handlers run synchronously in registration order. A handler that fails or
/// panics is logged and skipped; it never affects the operation that fired
/// the event nor the handlers after it.
pub trait KernelObserver {
    fn notify(&mut self, kernel: &Kernel, event: KernelEvent, row: &VersionRow) -> HandlerResult;
}

impl<F> KernelObserver for F
where
    F: FnMut(&Kernel, KernelEvent, &VersionRow) -> HandlerResult,
{
    fn notify(&mut self, kernel: &Kernel, event: KernelEvent, row: &VersionRow) -> HandlerResult {
        self(kernel, event, row)
    }
}

/// Handle returned by registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

struct Registration {
    id: ObserverId,
    /// `None` receives every event.
    filter: Option<KernelEvent>,
    observer: Box<dyn KernelObserver>,
}

/// Registered observers of one kernel.
#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    registrations: Vec<Registration>,
}

impl Observers {
    pub(crate) fn register(
        &mut self,
        filter: Option<KernelEvent>,
        observer: Box<dyn KernelObserver>,
    ) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.registrations.push(Registration {
            id,
            filter,
            observer,
        });
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|reg| reg.id != id);
        self.registrations.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub(crate) fn dispatch(&mut self, kernel: &Kernel, event: KernelEvent, row: &VersionRow) {
        for reg in self
            .registrations
            .iter_mut()
            .filter(|reg| reg.filter.is_none_or(|f| f == event))
        {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                reg.observer.notify(kernel, event, row)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!(
                    "Observer {:?} failed on {:?} for version {}: {}",
                    reg.id,
                    event,
                    row.version_id,
                    e
                ),
                Err(_) => log::warn!(
                    "Observer {:?} panicked on {:?} for version {}",
                    reg.id,
                    event,
                    row.version_id
                ),
            }
        }
    }
}
