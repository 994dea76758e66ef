use agora_core::{AgoraError, Clock};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Tracks model tokens spent by the whole world per day.
#[derive(Clone)]
pub struct TokenBudget {
    state: Arc<RwLock<TokenBudgetState>>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudgetState {
    /// Current day (resets daily).
    pub current_day: String,
    /// Tokens spent today.
    pub daily_tokens: u64,
    /// Daily limit. 0 = unlimited.
    pub daily_limit_tokens: u64,
    /// Total tokens since tracking started.
    pub total_tokens: u64,
}

impl TokenBudget {
    pub fn new(daily_limit_tokens: u64, clock: Arc<dyn Clock>) -> Self {
        let current_day = day_of(clock.as_ref());
        Self {
            state: Arc::new(RwLock::new(TokenBudgetState {
                current_day,
                daily_tokens: 0,
                daily_limit_tokens,
                total_tokens: 0,
            })),
            clock,
        }
    }

    /// Record tokens spent by one model call. Errors once the day's limit is crossed;
    /// the tokens are counted either way.
    pub fn record(&self, tokens: u64) -> agora_core::Result<()> {
        let mut state = self.state.write();
        self.maybe_reset_day(&mut state);

        state.daily_tokens += tokens;
        state.total_tokens += tokens;

        if state.daily_limit_tokens > 0 && state.daily_tokens > state.daily_limit_tokens {
            warn!(
                spent = state.daily_tokens,
                limit = state.daily_limit_tokens,
                "daily token budget exceeded"
            );
            return Err(AgoraError::BudgetExceeded {
                resource: "daily_tokens".into(),
                used: state.daily_tokens,
                limit: state.daily_limit_tokens,
            });
        }
        Ok(())
    }

    /// Whether another agent cycle may start today.
    pub fn has_remaining(&self) -> bool {
        let mut state = self.state.write();
        self.maybe_reset_day(&mut state);
        state.daily_limit_tokens == 0 || state.daily_tokens < state.daily_limit_tokens
    }

    /// Check if we're within budget without recording.
    pub fn check(&self) -> agora_core::Result<()> {
        if self.has_remaining() {
            return Ok(());
        }
        let state = self.state.read();
        Err(AgoraError::BudgetExceeded {
            resource: "daily_tokens".into(),
            used: state.daily_tokens,
            limit: state.daily_limit_tokens,
        })
    }

    /// Zero today's spend (the `token_budget_reset` job).
    pub fn reset(&self) {
        let mut state = self.state.write();
        info!(spent = state.daily_tokens, "resetting daily token budget");
        state.current_day = day_of(self.clock.as_ref());
        state.daily_tokens = 0;
    }

    /// Get the current budget state.
    pub fn snapshot(&self) -> TokenBudgetState {
        self.state.read().clone()
    }

    fn maybe_reset_day(&self, state: &mut TokenBudgetState) {
        let day = day_of(self.clock.as_ref());
        if state.current_day != day {
            state.current_day = day;
            state.daily_tokens = 0;
        }
    }
}

fn day_of(clock: &dyn Clock) -> String {
    clock.now().format("%Y-%m-%d").to_string()
}
