//! Error injection for the mock device.
//!
//! Every proxy call on [`crate::MockRemoteDevice`] consults an [`ErrorConfig`]
//! before doing any work, so tests can make individual operations fail with any
//! [`DeviceErrorKind`], including the "device busy" condition.

use super::rng::MockRng;
use capture_core::{DeviceError, DeviceErrorKind, DeviceResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Error injection configuration
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0); `"*"` matches every operation
    failure_rates: Arc<HashMap<&'static str, f64>>,
    /// Specific failure scenarios
    scenarios: Arc<Vec<ErrorScenario>>,
    /// RNG for failure decisions
    rng: Arc<MockRng>,
    /// State tracking for scenarios
    state: Arc<Mutex<ErrorState>>,
}

/// A scripted failure.
///
/// Operation names match the [`capture_core::RemoteDevice`] method names:
/// `create_stream`, `delete_stream`, `create_default_request`,
/// `submit_request_list`, `cancel_request`, `flush`, `wait_until_idle`,
/// `disconnect`.
#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// Fail after N successful calls of `operation`
    FailAfterN {
        /// Operation name
        operation: &'static str,
        /// Calls that succeed first
        count: u32,
    },
    /// Report the device busy for the next `times` calls of `operation`
    Busy {
        /// Operation name
        operation: &'static str,
        /// Number of calls that fail
        times: u32,
    },
    /// Time out on every call of `operation`
    Timeout {
        /// Operation name
        operation: &'static str,
    },
    /// Lose the link: this and every later call fails
    CommunicationLoss,
}

#[derive(Default, Debug)]
struct ErrorState {
    operation_counts: HashMap<&'static str, u32>,
    busy_remaining: HashMap<&'static str, u32>,
    communication_lost: bool,
}

impl ErrorConfig {
    /// No injected errors (default)
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Uniform random failures on every operation
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::build(rates, Vec::new(), seed)
    }

    /// A single scenario
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scenarios, checked in order
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Custom failure rates per operation
    pub fn with_rates(rates: HashMap<&'static str, f64>) -> Self {
        Self::build(rates, Vec::new(), None)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        let busy_remaining = scenarios
            .iter()
            .filter_map(|s| match s {
                ErrorScenario::Busy { operation, times } => Some((*operation, *times)),
                _ => None,
            })
            .collect();
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState {
                busy_remaining,
                ..ErrorState::default()
            })),
        }
    }

    /// Check whether `operation` should fail and with which error.
    pub fn check_operation(&self, operation: &'static str) -> DeviceResult<()> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(DeviceError::new(
                DeviceErrorKind::Communication,
                "Communication lost",
            ));
        }

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation => {
                    let current = state.operation_counts.entry(operation).or_insert(0);
                    *current += 1;
                    if *current > *count {
                        return Err(DeviceError::new(
                            DeviceErrorKind::Hardware,
                            format!("Injected failure after {} operations", count),
                        ));
                    }
                }
                ErrorScenario::Busy { operation: op, .. } if *op == operation => {
                    if let Some(remaining) = state.busy_remaining.get_mut(operation) {
                        if *remaining > 0 {
                            *remaining -= 1;
                            return Err(DeviceError::in_use(format!(
                                "Device busy, '{}' rejected",
                                operation
                            )));
                        }
                    }
                }
                ErrorScenario::Timeout { operation: op } if *op == operation => {
                    return Err(DeviceError::new(
                        DeviceErrorKind::Timeout,
                        format!("Operation '{}' timed out", operation),
                    ));
                }
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(DeviceError::new(
                        DeviceErrorKind::Communication,
                        "Communication lost",
                    ));
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);
        if self.rng.should_fail(rate) {
            return Err(DeviceError::new(
                DeviceErrorKind::Hardware,
                format!("Random failure on operation '{}'", operation),
            ));
        }

        Ok(())
    }

    /// Clear counters and lost-link state; busy budgets start over.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = ErrorState::default();
        for scenario in self.scenarios.iter() {
            if let ErrorScenario::Busy { operation, times } = scenario {
                state.busy_remaining.insert(*operation, *times);
            }
        }
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}
