use crate::model::{OutputPointer, UnspentOutput};
use anyhow::anyhow;
use itertools::Itertools;
use std::collections::{HashSet, VecDeque};

/// Outputs already committed to a transaction during one sweep pass.
#[derive(Debug, Default)]
pub struct ClaimedOutputs {
    claimed: HashSet<OutputPointer>,
}

impl ClaimedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, output: &UnspentOutput) -> bool {
        self.claimed.contains(&output.pointer())
    }

    /// Claims all of `outputs` or none of them.
    pub fn claim(&mut self, outputs: &[UnspentOutput]) -> anyhow::Result<()> {
        if let Some(output) = outputs.iter().find(|output| self.is_claimed(output)) {
            return Err(anyhow!("output {} is already claimed", output.pointer()));
        }
        self.claimed
            .extend(outputs.iter().map(UnspentOutput::pointer));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

/// Queue of sweep inputs cut into batches of at most `capacity` outputs.
///
/// Outputs that do not fit a batch stay queued for the next one.
pub struct UTxOAccumulator {
    pending: VecDeque<UnspentOutput>,
    capacity: usize,
}

impl UTxOAccumulator {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Default::default(),
            capacity: capacity.max(1),
        }
    }

    pub fn add_outputs(&mut self, outputs: Vec<UnspentOutput>) {
        self.pending.extend(outputs);
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn take_batch(&mut self) -> Vec<UnspentOutput> {
        let size = self.capacity.min(self.pending.len());
        self.pending.drain(..size).collect()
    }
}

/// Addresses of `outputs` in first-seen order.
pub fn source_addresses(outputs: &[UnspentOutput]) -> Vec<String> {
    outputs
        .iter()
        .map(|output| output.address.clone())
        .unique()
        .collect()
}
