//! Simulation parameters and request-time validation.

use crate::error::ConfigError;
use crate::node::NodeId;
use crate::time::VirtualTime;

/// Ticks a node spends in the critical region.
pub const RUNNING_INTERVAL: u64 = 50;

/// Inclusive upper bound on a message's delivery delay.
pub const MAX_MESSAGE_DELAY: u64 = 20;

/// Simulated time after which the loop stops.
pub const DEFAULT_HORIZON: u64 = 1_000;

pub const DEFAULT_SEED: u64 = 1;

/// Configuration for one simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimConfig {
    /// Fixed critical-region occupancy, in ticks.
    pub running_interval: u64,

    /// Message delays are uniform over `[0, max_message_delay]`.
    pub max_message_delay: u64,

    /// Last simulated instant at which events are still dispatched.
    pub horizon: VirtualTime,

    /// Seed for the delay stream.
    pub seed: u64,
}

impl SimConfig {
    pub fn new() -> Self {
        Self {
            running_interval: RUNNING_INTERVAL,
            max_message_delay: MAX_MESSAGE_DELAY,
            horizon: VirtualTime::new(DEFAULT_HORIZON),
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_running_interval(mut self, ticks: u64) -> Self {
        self.running_interval = ticks;
        self
    }

    pub fn with_max_message_delay(mut self, ticks: u64) -> Self {
        self.max_message_delay = ticks;
        self
    }

    pub fn with_horizon(mut self, horizon: VirtualTime) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reject parameters under which the run cannot make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon == VirtualTime::ZERO {
            return Err(ConfigError::ZeroHorizon);
        }
        if self.running_interval == 0 {
            return Err(ConfigError::ZeroRunningInterval);
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// When each node issues its REQUEST. Node `i` requests at `times[i]`,
/// so the node count is the number of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestSchedule {
    times: Vec<VirtualTime>,
}

impl RequestSchedule {
    /// Build a schedule from raw tick values.
    pub fn new(times: impl IntoIterator<Item = u64>) -> Result<Self, ConfigError> {
        let times: Vec<VirtualTime> = times.into_iter().map(VirtualTime::new).collect();
        if times.is_empty() {
            return Err(ConfigError::MissingRequestTimes);
        }
        Ok(RequestSchedule { times })
    }

    /// Parse command-line arguments, one integer time per node.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, ConfigError> {
        let mut ticks = Vec::with_capacity(args.len());
        for (position, arg) in args.iter().enumerate() {
            let raw = arg.as_ref().trim();
            let value = raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidRequestTime {
                    position,
                    value: raw.to_string(),
                })?;
            ticks.push(value);
        }
        Self::new(ticks)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.times.len()
    }

    /// `(node, request time)` pairs in node order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, VirtualTime)> + '_ {
        NodeId::all(self.times.len()).zip(self.times.iter().copied())
    }

    pub fn time_of(&self, node: NodeId) -> Option<VirtualTime> {
        self.times.get(node.index()).copied()
    }
}
