//! Process-local counter.

use std::collections::HashMap;

use mdr_types::Namespace;
use parking_lot::Mutex;

use crate::error::{CounterError, CounterResult};
use crate::traits::IdCounter;

/// Counter held in memory only.
///
/// Values are lost on restart. The allocator still never reissues a number
/// because it also consults the store's highest stored number.
#[derive(Debug, Default)]
pub struct InMemoryCounter {
    values: Mutex<HashMap<Namespace, u32>>,
}

impl InMemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdCounter for InMemoryCounter {
    fn last_issued(&self, namespace: &Namespace) -> CounterResult<u32> {
        Ok(self.values.lock().get(namespace).copied().unwrap_or(0))
    }

    fn advance(
        &self,
        namespace: &Namespace,
        step: &mut dyn FnMut(u32) -> CounterResult<u32>,
    ) -> CounterResult<u32> {
        let mut values = self.values.lock();
        let current = values.get(namespace).copied().unwrap_or(0);
        let next = step(current)?;
        if next < current {
            return Err(CounterError::Regression {
                namespace: namespace.clone(),
                current,
                requested: next,
            });
        }
        values.insert(namespace.clone(), next);
        Ok(next)
    }

    fn is_durable(&self) -> bool {
        false
    }
}
