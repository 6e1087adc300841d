//! Per-frame GPU work counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counted events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Draws,
    Dispatches,
    PipelineBarriers,
    PipelineBindings,
    DescriptorSetBindings,
    VertexBufferBindings,
    IndexBufferBindings,
    RenderPasses,
    MeshesRendered,
    ConstantBufferUpdates,
    Flushes,
}

impl Counter {
    pub const COUNT: usize = 11;

    pub const ALL: [Counter; Counter::COUNT] = [
        Counter::Draws,
        Counter::Dispatches,
        Counter::PipelineBarriers,
        Counter::PipelineBindings,
        Counter::DescriptorSetBindings,
        Counter::VertexBufferBindings,
        Counter::IndexBufferBindings,
        Counter::RenderPasses,
        Counter::MeshesRendered,
        Counter::ConstantBufferUpdates,
        Counter::Flushes,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Atomic counters shared by every command list of a context
#[derive(Debug, Default)]
pub struct Profiler {
    counters: [AtomicU64; Counter::COUNT],
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: Counter) {
        self.counters[counter.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Zero every counter, returning the values they held
    pub fn reset(&self) -> ProfilerSnapshot {
        let mut values = [0; Counter::COUNT];
        for counter in Counter::ALL {
            values[counter.index()] = self.counters[counter.index()].swap(0, Ordering::Relaxed);
        }
        ProfilerSnapshot { values }
    }

    pub fn snapshot(&self) -> ProfilerSnapshot {
        let mut values = [0; Counter::COUNT];
        for counter in Counter::ALL {
            values[counter.index()] = self.get(counter);
        }
        ProfilerSnapshot { values }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfilerSnapshot {
    values: [u64; Counter::COUNT],
}

impl ProfilerSnapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_order_matches_all() {
        for (index, counter) in Counter::ALL.iter().enumerate() {
            assert_eq!(counter.index(), index);
        }
    }

    #[test]
    fn test_reset_returns_previous_values() {
        let profiler = Profiler::new();
        profiler.increment(Counter::Draws);
        profiler.increment(Counter::Draws);
        profiler.increment(Counter::PipelineBarriers);

        let snapshot = profiler.reset();
        assert_eq!(snapshot.get(Counter::Draws), 2);
        assert_eq!(snapshot.get(Counter::PipelineBarriers), 1);
        assert_eq!(profiler.get(Counter::Draws), 0);
    }
}
