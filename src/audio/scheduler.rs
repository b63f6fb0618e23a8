// Tick scheduler - Drives the engine tick at soundcard rate
//
// Frequency is samplerate / buffer_size, plus the overclock. Sleeps to the
// next deadline; a late tick is not made up, the deadline restarts from now.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::cpu_monitor::CpuMonitor;
use crate::error::{EngineError, EngineResult};

const MEASURE_EVERY_N: u32 = 4;

/// Period of one tick
pub fn period_for(samplerate: u32, buffer_size: u32, overclock: f64) -> Duration {
    let frequency = samplerate as f64 / buffer_size.max(1) as f64 + overclock.max(0.0);
    if !frequency.is_finite() || frequency <= 0.0 {
        return Duration::from_millis(10);
    }
    Duration::from_secs_f64(1.0 / frequency)
}

pub struct TickScheduler {
    name: String,
    period: Duration,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    monitor: CpuMonitor,
    handle: Option<JoinHandle<()>>,
}

impl TickScheduler {
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            running: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
            monitor: CpuMonitor::new(period, MEASURE_EVERY_N),
            handle: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn monitor(&self) -> &CpuMonitor {
        &self.monitor
    }

    /// Run `tick` once per period on a dedicated thread
    pub fn start<F>(&mut self, mut tick: F) -> EngineResult<()>
    where
        F: FnMut() + Send + 'static,
    {
        if self.handle.is_some() {
            return Err(EngineError::AlreadyRunning(self.name.clone()));
        }

        self.running.store(true, Ordering::Release);
        let running = self.running.clone();
        let ticks = self.ticks.clone();
        let monitor = self.monitor.clone();
        let period = self.period;
        let name = self.name.clone();

        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            log::info!("Scheduler '{}' ticking every {:?}", name, period);
            let mut deadline = Instant::now();

            while running.load(Ordering::Acquire) {
                let start = monitor.start_measure();
                tick();
                monitor.end_measure(start);
                ticks.fetch_add(1, Ordering::Relaxed);

                deadline += period;
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                } else {
                    deadline = now;
                }
            }

            log::info!("Scheduler '{}' stopped", name);
        });

        match spawned {
            Ok(join) => {
                self.handle = Some(join);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(EngineError::WorkerSpawn(e))
            }
        }
    }

    pub fn stop(&mut self) -> EngineResult<()> {
        let Some(join) = self.handle.take() else {
            return Err(EngineError::NotRunning(self.name.clone()));
        };

        self.running.store(false, Ordering::Release);
        if join.join().is_err() {
            log::error!("Scheduler '{}' panicked", self.name);
        }
        Ok(())
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_period_for() {
        let period = period_for(44100, 512, 0.0);
        assert!((period.as_secs_f64() - 512.0 / 44100.0).abs() < 1e-9);

        let overclocked = period_for(44100, 512, 10.0);
        assert!(overclocked < period);

        assert_eq!(period_for(0, 512, 0.0), Duration::from_millis(10));
    }

    #[test]
    fn test_start_and_stop() {
        let mut scheduler = TickScheduler::new("test-scheduler", Duration::from_millis(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        scheduler
            .start(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.start(|| {}),
            Err(EngineError::AlreadyRunning(_))
        ));

        thread::sleep(Duration::from_millis(30));
        scheduler.stop().unwrap();

        let ticked = calls.load(Ordering::Relaxed);
        assert!(ticked > 0);
        assert_eq!(scheduler.tick_count(), ticked as u64);
        assert!(!scheduler.is_running());
        assert!(matches!(scheduler.stop(), Err(EngineError::NotRunning(_))));
    }
}
