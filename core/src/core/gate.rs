/// Pipeline pass/fail decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    /// At least one processed alert matched a fail-on level.
    Fail { matches: usize },
}

impl GateDecision {
    pub fn from_fail_count(fail_count: usize) -> Self {
        if should_fail(fail_count) {
            GateDecision::Fail { matches: fail_count }
        } else {
            GateDecision::Pass
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, GateDecision::Fail { .. })
    }
}

pub fn should_fail(fail_count: usize) -> bool {
    fail_count > 0
}
