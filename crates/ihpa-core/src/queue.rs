//! The past-prediction queue: a FIFO of previously emitted forecasts,
//! drained as actual data catches up to them. Grounded in
//! `controllers/estimator.go`'s `PastEstimateDatumQueue`.

use std::collections::VecDeque;

use crate::estimate::EstimateDatum;

#[derive(Debug, Default)]
pub struct PastPredictionQueue {
    items: VecDeque<EstimateDatum>,
}

impl PastPredictionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, datum: EstimateDatum) {
        self.items.push_back(datum);
    }

    pub fn dequeue(&mut self) -> Option<EstimateDatum> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&EstimateDatum> {
        self.items.front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Dequeues every datum whose `unix_time` is at most `unix_time`,
    /// returning the last one dequeued (the most recent eligible prediction)
    /// or `None` if nothing in the queue qualifies.
    pub fn seek_by_unix_time(&mut self, unix_time: i64) -> Option<EstimateDatum> {
        let mut last = None;
        while let Some(front) = self.items.front() {
            if front.unix_time <= unix_time {
                last = self.items.pop_front();
            } else {
                break;
            }
        }
        last
    }
}
