// CPU Monitor - Tick load tracking
//
// Time spent in a tick versus the tick period. Atomics so the scheduler
// thread writes while anybody reads.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Load of the tick loop
///
/// Only 1 out of `measure_every_n` ticks is timed.
#[derive(Clone)]
pub struct CpuMonitor {
    total_tick_time_ns: Arc<AtomicU64>,
    total_available_time_ns: Arc<AtomicU64>,
    sample_count: Arc<AtomicU64>,
    overruns: Arc<AtomicU64>,

    period_ns: u64,

    measure_every_n: u32,
    current_count: Arc<AtomicU32>,
}

impl CpuMonitor {
    pub fn new(period: Duration, measure_every_n: u32) -> Self {
        Self {
            total_tick_time_ns: Arc::new(AtomicU64::new(0)),
            total_available_time_ns: Arc::new(AtomicU64::new(0)),
            sample_count: Arc::new(AtomicU64::new(0)),
            overruns: Arc::new(AtomicU64::new(0)),
            period_ns: period.as_nanos() as u64,
            measure_every_n: measure_every_n.max(1),
            current_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.period_ns)
    }

    /// `Some` if this tick should be timed
    #[inline]
    pub fn start_measure(&self) -> Option<Instant> {
        let count = self.current_count.fetch_add(1, Ordering::Relaxed);

        if count % self.measure_every_n == 0 {
            Some(Instant::now())
        } else {
            None
        }
    }

    #[inline]
    pub fn end_measure(&self, start_time: Option<Instant>) {
        if let Some(start) = start_time {
            let elapsed_ns = start.elapsed().as_nanos() as u64;

            if elapsed_ns > self.period_ns {
                self.overruns.fetch_add(1, Ordering::Relaxed);
            }

            self.total_tick_time_ns
                .fetch_add(elapsed_ns, Ordering::Relaxed);
            self.total_available_time_ns
                .fetch_add(self.period_ns, Ordering::Relaxed);
            self.sample_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 0.0 to 100.0+ (above 100 when ticks overrun their period)
    pub fn get_cpu_percentage(&self) -> f32 {
        let total_tick = self.total_tick_time_ns.load(Ordering::Relaxed);
        let total_available = self.total_available_time_ns.load(Ordering::Relaxed);

        if total_available == 0 {
            return 0.0;
        }

        (total_tick as f64 / total_available as f64 * 100.0) as f32
    }

    pub fn get_sample_count(&self) -> u64 {
        self.sample_count.load(Ordering::Relaxed)
    }

    /// Measured ticks that took longer than one period
    pub fn get_overrun_count(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.total_tick_time_ns.store(0, Ordering::Relaxed);
        self.total_available_time_ns.store(0, Ordering::Relaxed);
        self.sample_count.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.current_count.store(0, Ordering::Relaxed);
    }

    pub fn get_load_level(&self) -> CpuLoad {
        let cpu = self.get_cpu_percentage();

        if cpu < 50.0 {
            CpuLoad::Low
        } else if cpu < 75.0 {
            CpuLoad::Medium
        } else {
            CpuLoad::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CpuLoad {
    Low,    // < 50%
    Medium, // 50-75%
    High,   // > 75%
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cpu_monitor_creation() {
        let monitor = CpuMonitor::new(Duration::from_millis(10), 10);
        assert_eq!(monitor.get_cpu_percentage(), 0.0);
        assert_eq!(monitor.get_sample_count(), 0);
        assert_eq!(monitor.period(), Duration::from_millis(10));
    }

    #[test]
    fn test_measure_sampling() {
        let monitor = CpuMonitor::new(Duration::from_millis(10), 10);

        let measured = (0..100)
            .filter(|_| monitor.start_measure().is_some())
            .count();
        assert_eq!(measured, 10);
    }

    #[test]
    fn test_cpu_percentage_calculation() {
        let monitor = CpuMonitor::new(Duration::from_millis(50), 1);

        for _ in 0..5 {
            let start = monitor.start_measure();
            thread::sleep(Duration::from_micros(200));
            monitor.end_measure(start);
        }

        let cpu = monitor.get_cpu_percentage();
        assert!(cpu > 0.0);
        assert!(cpu < 100.0);
        assert_eq!(monitor.get_overrun_count(), 0);
    }

    #[test]
    fn test_overrun_and_reset() {
        let monitor = CpuMonitor::new(Duration::from_micros(100), 1);

        let start = monitor.start_measure();
        thread::sleep(Duration::from_millis(2));
        monitor.end_measure(start);

        assert_eq!(monitor.get_overrun_count(), 1);
        assert_eq!(monitor.get_load_level(), CpuLoad::High);

        monitor.reset();
        assert_eq!(monitor.get_cpu_percentage(), 0.0);
        assert_eq!(monitor.get_overrun_count(), 0);
        assert_eq!(monitor.get_load_level(), CpuLoad::Low);
    }
}
