use crate::backend::{Mutation, StateBackend};
use crate::error::StoreError;
use crate::snapshot::Snapshot;

/// Process-local backend: nothing survives a restart.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryBackend;

impl StateBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(Snapshot::default())
    }

    fn apply(&self, _mutation: Mutation<'_>, _snapshot: &Snapshot) -> Result<(), StoreError> {
        Ok(())
    }
}
