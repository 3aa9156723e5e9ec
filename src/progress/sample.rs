//! Fixed-capacity ring of throughput samples.

/// Cumulative transferred bytes at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Bytes transferred over the network so far in this batch.
    pub downloaded: u64,
    /// Seconds since the progress tracker was created.
    pub timestamp: f64,
}

/// Ring buffer of the most recent samples; the oldest entry is overwritten on overflow.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    slots: Vec<Sample>,
    capacity: usize,
    next: usize,
}

impl SampleWindow {
    /// Creates an empty window holding at most `capacity` samples.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    /// Appends a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: Sample) {
        if self.slots.len() < self.capacity {
            self.slots.push(sample);
        } else {
            self.slots[self.next] = sample;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest retained sample.
    #[must_use]
    pub fn oldest(&self) -> Option<&Sample> {
        if self.slots.len() < self.capacity {
            self.slots.first()
        } else {
            self.slots.get(self.next)
        }
    }

    /// Most recently pushed sample.
    #[must_use]
    pub fn newest(&self) -> Option<&Sample> {
        if self.slots.is_empty() {
            return None;
        }
        self.slots
            .get((self.next + self.capacity - 1) % self.capacity)
    }

    /// Throughput in bytes per second between the oldest and newest sample.
    ///
    /// Needs at least two samples. A zero time span counts as one second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn speed(&self) -> Option<f64> {
        if self.slots.len() < 2 {
            return None;
        }
        let first = self.oldest()?;
        let last = self.newest()?;
        let size = last.downloaded.saturating_sub(first.downloaded);
        let mut duration = last.timestamp - first.timestamp;
        if duration <= 0.0 {
            duration = 1.0;
        }
        Some(size as f64 / duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(downloaded: u64, timestamp: f64) -> Sample {
        Sample {
            downloaded,
            timestamp,
        }
    }

    #[test]
    fn speed_needs_two_samples() {
        let mut window = SampleWindow::new(4);
        assert_eq!(window.speed(), None);
        window.push(sample(100, 0.0));
        assert_eq!(window.speed(), None);
        window.push(sample(300, 2.0));
        assert_eq!(window.speed(), Some(100.0));
    }

    #[test]
    fn same_instant_uses_one_second() {
        let mut window = SampleWindow::new(4);
        window.push(sample(0, 5.0));
        window.push(sample(512, 5.0));
        assert_eq!(window.speed(), Some(512.0));
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut window = SampleWindow::new(3);
        for i in 0..5u32 {
            window.push(sample(u64::from(i) * 10, f64::from(i)));
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.oldest(), Some(&sample(20, 2.0)));
        assert_eq!(window.newest(), Some(&sample(40, 4.0)));
        assert_eq!(window.speed(), Some(10.0));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut window = SampleWindow::new(0);
        window.push(sample(1, 0.0));
        window.push(sample(2, 1.0));
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.len(), 1);
        assert_eq!(window.oldest(), window.newest());
    }
}
