use super::{CertificateError, Result, StableId};

/// Hands out fresh [`StableId`]s for one pass.
///
/// Ids are strictly increasing and never reclaimed, whatever happens to the slots of the nodes
/// they name. [`StableId::CONST1`] is never handed out: reaching it is an overflow.
#[derive(Debug, Clone)]
pub struct IdentityManager {
    next: u32,
}

impl IdentityManager {
    /// The first id handed out will be `initial_node_count + 1`.
    ///
    /// Pass the largest stable id already carried by the graph, so that pre-existing nodes keep
    /// theirs and new ones never collide.
    pub fn new(initial_node_count: u32) -> Self {
        IdentityManager {
            next: initial_node_count.saturating_add(1),
        }
    }

    pub fn fresh_id(&mut self) -> Result<StableId> {
        if self.next >= StableId::CONST1.get() {
            return Err(CertificateError::IdOverflow);
        }
        let id = StableId::new(self.next);
        self.next += 1;
        Ok(id)
    }

    /// The id the next call to [`fresh_id`](IdentityManager::fresh_id) would return.
    pub fn peek(&self) -> StableId {
        StableId::new(self.next)
    }
}
