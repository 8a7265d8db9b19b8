use metrics::{Counter, Histogram, counter, histogram};

use crate::limiter::Stat;

registered_event! {
    LimiterRequestDropped => {
        dropped: Counter = counter!("bbr_limiter_dropped_total"),
        // Histogram, the in-flight level of every rejection is worth keeping
        // for diagnosis.
        in_flight: Histogram = histogram!("bbr_limiter_in_flight"),
    }

    fn emit(&self, stat: Stat) {
        self.dropped.increment(1);
        self.in_flight.record(stat.in_flight as f64);

        trace!(
            message = "Concurrency limit exceeded, request dropped.",
            cpu = stat.cpu,
            in_flight = stat.in_flight,
            max_in_flight = stat.max_in_flight,
        );
    }
}

registered_event! {
    LimiterDropStarted => {
        drop_windows: Counter = counter!("bbr_limiter_drop_windows_total"),
    }

    fn emit(&self, stat: Stat) {
        self.drop_windows.increment(1);

        warn!(
            message = "Concurrency limiter started dropping requests.",
            cpu = stat.cpu,
            in_flight = stat.in_flight,
            max_in_flight = stat.max_in_flight,
            max_pass = stat.max_pass,
            min_rt_ms = stat.min_rt,
        );
    }
}
