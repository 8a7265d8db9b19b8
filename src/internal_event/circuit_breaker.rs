use metrics::{Counter, counter};

use crate::breaker::State;

registered_event! {
    BreakerStateChanged => {
        opened: Counter = counter!("circuit_breaker_state_changes_total", "state" => "open"),
        closed: Counter = counter!("circuit_breaker_state_changes_total", "state" => "closed"),
    }

    fn emit(&self, state: State) {
        match state {
            State::Open => self.opened.increment(1),
            State::Closed => self.closed.increment(1),
        }

        debug!(message = "Circuit breaker state changed.", ?state);
    }
}

registered_event! {
    BreakerRequestDropped => {
        dropped: Counter = counter!("circuit_breaker_dropped_total"),
    }

    fn emit(&self, drop_ratio: f64) {
        self.dropped.increment(1);

        trace!(message = "Circuit breaker dropped request.", drop_ratio);
    }
}
