//! Result sink
//!
//! Every embedding produced inside a trial ends up here so the optimizer
//! cannot prove the inference call is dead.

use std::hint::black_box;

#[derive(Debug, Default)]
pub struct Sink {
    consumed: u64,
}

impl Sink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observably consume a value and drop it
    #[inline(never)]
    pub fn consume<T>(&mut self, value: T) {
        black_box(value);
        self.consumed = black_box(self.consumed + 1);
    }

    /// Number of values consumed so far
    pub fn consumed(&self) -> u64 {
        black_box(self.consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_consumed_values() {
        let mut sink = Sink::new();
        sink.consume(vec![1.0f32; 512]);
        sink.consume(vec![0.5f32; 512]);
        assert_eq!(sink.consumed(), 2);
    }
}
