//! Iterator adapters for driving a meter from a loop.

use super::{Meter, MeterConfig};

/// Iterator wrapper that advances a [`Meter`] once per yielded item and
/// closes it on exhaustion.
pub struct MeterIter<I> {
    iter: I,
    meter: Meter,
}

impl<I> MeterIter<I> {
    /// Wrap `iter`, tracking it with `meter`.
    pub fn new(iter: I, meter: Meter) -> Self {
        Self { iter, meter }
    }

    /// The wrapped meter, e.g. for [`Meter::write`] calls mid-loop.
    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    /// Mutable access to the wrapped meter.
    pub fn meter_mut(&mut self) -> &mut Meter {
        &mut self.meter
    }
}

impl<I: Iterator> Iterator for MeterIter<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.iter.next();
        if item.is_some() {
            self.meter.update(1);
        } else {
            self.meter.close();
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

/// Extension trait attaching progress tracking to any iterator.
pub trait MeterIterExt: Iterator + Sized {
    /// Track this iterator with an existing meter.
    fn progress_with(self, meter: Meter) -> MeterIter<Self>;

    /// Track this iterator with a default meter; the total is taken from
    /// `size_hint` when it is exact.
    fn progress(self) -> MeterIter<Self>;
}

impl<I: Iterator> MeterIterExt for I {
    fn progress_with(self, meter: Meter) -> MeterIter<Self> {
        MeterIter::new(self, meter)
    }

    fn progress(self) -> MeterIter<Self> {
        let total = match self.size_hint() {
            (lower, Some(upper)) if lower == upper => Some(upper as u64),
            _ => None,
        };
        let meter = Meter::new(MeterConfig {
            total,
            ..MeterConfig::default()
        });
        MeterIter::new(self, meter)
    }
}
