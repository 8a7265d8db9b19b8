use metrics::{Gauge, gauge};

registered_event! {
    CpuSampled => {
        usage: Gauge = gauge!("cpu_usage"),
    }

    fn emit(&self, usage: i64) {
        self.usage.set(usage as f64);

        trace!(message = "CPU usage sampled.", usage);
    }
}
