use flotilla_core::{ControlCommand, Simulation, apply_control_command};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Bounded queue of operator commands applied between ticks.
#[derive(Debug)]
pub struct CommandQueue {
    pending: VecDeque<ControlCommand>,
    capacity: usize,
}

impl CommandQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue `command`; returns `false` and drops it when the queue is full.
    pub fn submit(&mut self, command: ControlCommand) -> bool {
        if self.pending.len() >= self.capacity {
            warn!(?command, "control command queue full; dropping command");
            return false;
        }
        self.pending.push_back(command);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every queued command in order, returning how many took effect.
    pub fn drain(&mut self, simulation: &mut Simulation) -> anyhow::Result<usize> {
        let mut applied = 0;
        while let Some(command) = self.pending.pop_front() {
            debug!(?command, "applying control command");
            if apply_control_command(simulation, command)? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}
