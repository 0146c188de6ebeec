use std::collections::{HashMap, HashSet};

use super::{Aig, AigError, AigNode, NodeId, NodeKind, Result};

impl Aig {
    /// Checking if the AIG structure is correct.
    /// This function was written for debug purposes, as the library is supposed to maintain
    /// integrity of the AIG at any moment (outside of a replacement).
    ///
    /// It checks slots, structural hashing, reference counts, levels, creation order,
    /// fanout sets (if tracked), uniqueness of stable ids and acyclicity.
    pub fn check_integrity(&self) -> Result<()> {
        match self.get_node(0) {
            Some(n) if n.is_false() => {}
            _ => {
                return Err(AigError::InvalidState(
                    "slot 0 does not hold the constant node".to_string(),
                ));
            }
        }

        let mut expected_refs: HashMap<NodeId, u32> = HashMap::new();
        let mut certif_ids = HashSet::new();
        let mut n_ands = 0;
        for (slot, node) in self.nodes.iter().enumerate() {
            let Some(node) = node else {
                continue;
            };
            if node.id != slot as NodeId {
                return Err(AigError::InvalidState(format!(
                    "node {} sits in slot {}",
                    node.id, slot
                )));
            }
            if !certif_ids.insert(node.certif_id) {
                return Err(AigError::InvalidState(format!(
                    "stable id {} is carried by two nodes",
                    node.certif_id
                )));
            }
            if self.order.get(&node.birth) != Some(&node.id) {
                return Err(AigError::InvalidState(format!(
                    "node {} is missing from the creation order",
                    node.id
                )));
            }
            if node.id != 0 && node.is_false() {
                return Err(AigError::InvalidState("invalid false node".to_string()));
            }
            if let NodeKind::And { fanin0, fanin1 } = node.kind {
                n_ands += 1;
                self.check_and_integrity(node)?;
                *expected_refs.entry(fanin0.node).or_default() += 1;
                *expected_refs.entry(fanin1.node).or_default() += 1;
            }
        }
        for output in &self.outputs {
            self.get_node(output.node).ok_or(AigError::InvalidState(format!(
                "output refers to node {} which is not in the aig",
                output.node
            )))?;
            *expected_refs.entry(output.node).or_default() += 1;
        }
        for node in self.nodes.iter().flatten() {
            let expected = expected_refs.get(&node.id).copied().unwrap_or(0);
            if node.refs != expected {
                return Err(AigError::InvalidState(format!(
                    "node {} has {} references, expected {}",
                    node.id, node.refs, expected
                )));
            }
        }

        if n_ands != self.n_ands {
            return Err(AigError::InvalidState(format!(
                "{} and gates counted, {} registered",
                n_ands, self.n_ands
            )));
        }
        if self.order.len() != self.nodes.iter().flatten().count() {
            return Err(AigError::InvalidState(
                "creation order refers to freed nodes".to_string(),
            ));
        }
        for &slot in &self.free_slots {
            if self.get_node(slot).is_some() {
                return Err(AigError::InvalidState(format!(
                    "slot {} is both free and used",
                    slot
                )));
            }
        }
        for (&(fanin0, fanin1), &id) in &self.strash {
            match self.get_node(id).map(|n| n.kind) {
                Some(NodeKind::And { fanin0: f0, fanin1: f1 }) if f0 == fanin0 && f1 == fanin1 => {}
                _ => {
                    return Err(AigError::InvalidState(format!(
                        "structural hash entry for node {} is stale",
                        id
                    )));
                }
            }
        }

        if let Some(fanouts) = &self.fanouts {
            for node in self.nodes.iter().flatten() {
                for fanin in node.get_fanins() {
                    if !fanouts.get(&fanin.node).is_some_and(|s| s.contains(&node.id)) {
                        return Err(AigError::InvalidState(format!(
                            "node {} is missing from the fanouts of {}",
                            node.id, fanin.node
                        )));
                    }
                }
            }
            let n_fanouts: usize = fanouts.values().map(|s| s.len()).sum();
            if n_fanouts != 2 * self.n_ands {
                return Err(AigError::InvalidState(
                    "fanout sets refer to stale nodes".to_string(),
                ));
            }
        }

        // Checks for acyclicity
        self.get_topological_sort()?;

        Ok(())
    }

    /// Checks a single and gate: live canonical non trivial fanins, hashed, right level.
    fn check_and_integrity(&self, node: &AigNode) -> Result<()> {
        let NodeKind::And { fanin0, fanin1 } = node.kind else {
            return Err(AigError::NotAnAnd(node.id));
        };
        let mut level = 0;
        for fanin in [fanin0, fanin1] {
            let child = self.get_node(fanin.node).ok_or(AigError::InvalidState(format!(
                "edge pointing at node {} which is not in the AIG anymore",
                fanin.node
            )))?;
            level = level.max(child.level + 1);
        }
        if fanin0 >= fanin1 || fanin0.node == fanin1.node || fanin0.is_cst() {
            return Err(AigError::InvalidState(format!(
                "node {} has non canonical or trivial fanins {:?} {:?}",
                node.id, fanin0, fanin1
            )));
        }
        if self.strash.get(&(fanin0, fanin1)) != Some(&node.id) {
            return Err(AigError::InvalidState(format!(
                "node {} is not structurally hashed",
                node.id
            )));
        }
        if node.level != level {
            return Err(AigError::InvalidState(format!(
                "node {} has level {}, expected {}",
                node.id, node.level, level
            )));
        }
        Ok(())
    }

    /// Recomputes the phase of every and gate from its fanins and compares it with the stored one.
    ///
    /// Phases are never updated on replacement: a mismatch means a node was replaced by
    /// a signal computing a different function.
    pub fn check_phase(&self) -> Result<()> {
        for node in self.nodes.iter().flatten() {
            if let NodeKind::And { fanin0, fanin1 } = node.kind {
                let phase0 = self.node(fanin0.node)?.phase ^ fanin0.complement;
                let phase1 = self.node(fanin1.node)?.phase ^ fanin1.complement;
                if node.phase != (phase0 & phase1) {
                    return Err(AigError::PhaseMismatch(node.id));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::Aig;

    #[test]
    fn fresh_aig_is_valid() {
        let mut aig = Aig::new();
        aig.check_integrity().unwrap();
        let a = aig.add_input();
        let b = aig.add_input();
        let ab = aig.and(a, !b).unwrap();
        aig.add_output(!ab).unwrap();
        aig.start_fanout();
        aig.check_integrity().unwrap();
        aig.check_phase().unwrap();
    }

    #[test]
    fn corrupted_refs_are_detected() {
        let mut aig = Aig::new();
        let a = aig.add_input();
        let b = aig.add_input();
        let ab = aig.and(a, b).unwrap();
        aig.add_output(ab).unwrap();
        aig.nodes[ab.node as usize].as_mut().unwrap().refs = 3;
        assert!(aig.check_integrity().is_err());
    }

    #[test]
    fn phase_mismatch_after_wrong_replacement() {
        let mut aig = Aig::new();
        let a = aig.add_input();
        let b = aig.add_input();
        let c = aig.add_input();
        let ab = aig.and(a, b).unwrap();
        let top = aig.and(ab, !c).unwrap();
        aig.add_output(top).unwrap();
        // !a & !b is 1 under the all-zero pattern while a & b is 0
        let nor = aig.and(!a, !b).unwrap();
        aig.replace(ab.get_node_id(), nor).unwrap();
        aig.check_integrity().unwrap();
        assert!(aig.check_phase().is_err());
    }
}
