//! The next-free-id algorithm.
//!
//! For a namespace with last issued number `last`, a caller floor `floor` and
//! a store whose highest stored number is `stored`, the next number is
//! `max(last, floor, stored) + step` rounded up to a multiple of `step`. The
//! step is the *initial* distance for the first allocation in a namespace
//! since the allocator was constructed and the *steady* distance afterwards.
//!
//! The counter is advanced durably before the identifier is returned, and
//! the whole computation runs under the counter's exclusive lock, so no
//! number is ever issued twice even across processes.

use std::sync::Arc;

use dashmap::DashMap;
use mdr_store::MetadataStore;
use mdr_types::{Identifier, Namespace};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{CounterError, CounterResult};
use crate::traits::IdCounter;

/// Largest number the allocator will hand out.
pub const MAX_NUMBER: u32 = i32::MAX as u32;

/// Gap applied between allocations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Distance {
    initial: u32,
    steady: u32,
}

impl Distance {
    /// Consecutive numbering.
    pub const CONSECUTIVE: Distance = Distance {
        initial: 1,
        steady: 1,
    };

    /// Both distances must be at least 1.
    pub fn new(initial: u32, steady: u32) -> CounterResult<Self> {
        if initial == 0 || steady == 0 {
            return Err(CounterError::InvalidDistance(format!(
                "distances must be positive, got initial={initial} steady={steady}"
            )));
        }
        Ok(Self { initial, steady })
    }

    /// The same distance for every allocation.
    pub fn uniform(step: u32) -> CounterResult<Self> {
        Self::new(step, step)
    }

    pub fn initial(&self) -> u32 {
        self.initial
    }

    pub fn steady(&self) -> u32 {
        self.steady
    }
}

impl Default for Distance {
    fn default() -> Self {
        Self::CONSECUTIVE
    }
}

/// Smallest multiple of `step` that is at least `base + step`.
fn next_aligned(base: u32, step: u32) -> Option<u32> {
    let step = u64::from(step);
    let candidate = u64::from(base) + step;
    let aligned = candidate.div_ceil(step) * step;
    u32::try_from(aligned).ok().filter(|n| *n <= MAX_NUMBER)
}

/// Per-namespace allocation state. The flag records whether this allocator
/// has issued a number in the namespace yet.
type Slot = Arc<RwLock<bool>>;

/// Issues document identifiers on top of an [`IdCounter`].
pub struct IdAllocator {
    counter: Arc<dyn IdCounter>,
    slots: DashMap<Namespace, Slot>,
}

impl IdAllocator {
    pub fn new(counter: Arc<dyn IdCounter>) -> Self {
        Self {
            counter,
            slots: DashMap::new(),
        }
    }

    /// The backing counter.
    pub fn counter(&self) -> &Arc<dyn IdCounter> {
        &self.counter
    }

    fn slot(&self, namespace: &Namespace) -> Slot {
        Arc::clone(
            self.slots
                .entry(namespace.clone())
                .or_insert_with(|| Arc::new(RwLock::new(false)))
                .value(),
        )
    }

    /// Allocate the next free identifier in `namespace`.
    ///
    /// `floor` is a lower bound the result must exceed. `store` must serve
    /// `namespace`; its highest stored number (including deleted documents)
    /// is never reissued even if the counter was lost.
    pub fn next_free_id(
        &self,
        namespace: &Namespace,
        floor: u32,
        distance: Distance,
        store: &dyn MetadataStore,
    ) -> CounterResult<Identifier> {
        if store.namespace() != namespace {
            return Err(CounterError::NamespaceMismatch {
                expected: namespace.clone(),
                actual: store.namespace().clone(),
            });
        }
        let slot = self.slot(namespace);
        let mut issued = slot.write();
        let step = if *issued {
            distance.steady
        } else {
            distance.initial
        };

        let number = self.counter.advance(namespace, &mut |last| {
            let stored = store.highest_stored_number()?;
            let base = last.max(floor).max(stored);
            let next = next_aligned(base, step)
                .ok_or_else(|| CounterError::Exhausted(namespace.clone()))?;
            debug!(%namespace, last, floor, stored, step, next, "allocating");
            Ok(next)
        })?;
        *issued = true;

        let id = namespace.identifier(number)?;
        info!(%id, "identifier allocated");
        Ok(id)
    }

    /// The highest identifier issued or stored in `namespace`, if any.
    ///
    /// `store` is `None` when the namespace has no storage yet.
    pub fn last_id(
        &self,
        namespace: &Namespace,
        store: Option<&dyn MetadataStore>,
    ) -> CounterResult<Option<Identifier>> {
        let slot = self.slot(namespace);
        let _guard = slot.read();
        let last = self.counter.last_issued(namespace)?;
        let stored = match store {
            Some(store) => store.highest_stored_number()?,
            None => 0,
        };
        match last.max(stored) {
            0 => Ok(None),
            n => Ok(Some(namespace.identifier(n)?)),
        }
    }
}

impl std::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("durable", &self.counter.is_durable())
            .field("namespaces", &self.slots.len())
            .finish()
    }
}
