// core/common/src/coordination.rs
// Process-group primitives: rank, broadcast and barrier

use std::sync::{Arc, Barrier, Mutex};

use crate::error::ArtifactError;

/// Coordination facility shared by the ranks of a run.
pub trait ProcessGroup {
    fn rank(&self) -> usize;
    fn world_size(&self) -> usize;
    /// Replaces `values` on every rank with the contents held by `source`.
    fn broadcast(&self, values: &mut Vec<String>, source: usize) -> Result<(), ArtifactError>;
    /// Blocks until every rank has arrived.
    fn barrier(&self);
}

struct Shared {
    world_size: usize,
    barrier: Barrier,
    slot: Mutex<Option<Vec<String>>>,
}

/// In-process group where each rank is a thread holding one handle.
#[derive(Clone)]
pub struct LocalGroup {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// Creates one handle per rank; `world_size` of zero is treated as one.
    pub fn create(world_size: usize) -> Vec<LocalGroup> {
        let world_size = world_size.max(1);
        let shared = Arc::new(Shared {
            world_size,
            barrier: Barrier::new(world_size),
            slot: Mutex::new(None),
        });

        (0..world_size)
            .map(|rank| LocalGroup {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl std::fmt::Debug for LocalGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalGroup")
            .field("rank", &self.rank)
            .field("world_size", &self.shared.world_size)
            .finish()
    }
}

impl ProcessGroup for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.shared.world_size
    }

    fn broadcast(&self, values: &mut Vec<String>, source: usize) -> Result<(), ArtifactError> {
        // Every rank rejects the same source, so nobody is left waiting.
        if source >= self.shared.world_size {
            return Err(ArtifactError::Coordination(format!(
                "broadcast source {} out of range for world size {}",
                source, self.shared.world_size
            )));
        }

        if self.rank == source {
            let mut slot = self
                .shared
                .slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = Some(values.clone());
        }

        self.shared.barrier.wait();

        let received = if self.rank == source {
            Ok(())
        } else {
            let slot = self
                .shared
                .slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match slot.as_ref() {
                Some(broadcast) => {
                    *values = broadcast.clone();
                    Ok(())
                }
                None => Err(ArtifactError::Coordination(
                    "broadcast slot empty after barrier".to_string(),
                )),
            }
        };

        // Keep the source from reusing the slot until everyone has read it.
        self.shared.barrier.wait();
        received
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}
