// Tick counters - Live pair plus the shadow pair committed at the next tick

/// `delay_counter` is the sub-step phase, `offset_counter` the step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterPair {
    pub delay_counter: u64,
    pub offset_counter: u64,
}

/// Two-phase tick counters
///
/// The live pair is what the current tick reads. Counter advance only ever
/// writes the shadow pair, which replaces the live pair at the start of the
/// next tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickCounters {
    live: CounterPair,
    shadow: CounterPair,
}

impl TickCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> CounterPair {
        self.live
    }

    pub fn shadow(&self) -> CounterPair {
        self.shadow
    }

    pub(crate) fn shadow_mut(&mut self) -> &mut CounterPair {
        &mut self.shadow
    }

    /// shadow → live
    pub fn commit(&mut self) {
        self.live = self.shadow;
    }

    /// Force the delay phase of both pairs (hardware-reported phase)
    pub fn override_delay(&mut self, delay_counter: u64) {
        self.live.delay_counter = delay_counter;
        self.shadow.delay_counter = delay_counter;
    }

    /// Move both pairs to `offset` at phase 0
    pub fn jump(&mut self, offset: u64) {
        self.live = CounterPair {
            delay_counter: 0,
            offset_counter: offset,
        };
        self.shadow = self.live;
    }

    pub fn reset(&mut self) {
        self.jump(0);
    }
}
