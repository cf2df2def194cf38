//! Lock-free SPSC transport between a sink's feeder thread and the device
//! callback. Samples are interleaved f32 at the device rate.

use std::sync::Arc;

use cpal::{FromSample, Sample};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    CachingCons, CachingProd, HeapRb,
};

/// Feeder side of the ring.
pub struct SampleProducer {
    inner: CachingProd<Arc<HeapRb<f32>>>,
}

/// Device callback side of the ring.
pub struct SampleConsumer {
    inner: CachingCons<Arc<HeapRb<f32>>>,
}

impl SampleProducer {
    /// Pushes as many samples as fit, returning how many were taken.
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }

    pub fn vacant_len(&self) -> usize {
        self.inner.vacant_len()
    }
}

impl SampleConsumer {
    /// Fills `data` from the ring, converting to the device sample type.
    /// Whatever the ring cannot supply is written as silence. Returns the
    /// number of samples actually taken from the ring.
    pub fn pop_into<T: Sample + FromSample<f32>>(&mut self, data: &mut [T]) -> usize {
        let mut count = 0;
        for out in data.iter_mut() {
            match self.inner.try_pop() {
                Some(sample) => {
                    *out = T::from_sample(sample);
                    count += 1;
                }
                None => break,
            }
        }
        for out in &mut data[count..] {
            *out = T::from_sample(0.0f32);
        }
        count
    }

    pub fn occupied_len(&self) -> usize {
        self.inner.occupied_len()
    }
}

/// Creates a ring holding `capacity` samples.
pub fn sample_ring(capacity: usize) -> (SampleProducer, SampleConsumer) {
    let rb = HeapRb::<f32>::new(capacity.max(1));
    let (prod, cons) = rb.split();
    (
        SampleProducer { inner: prod },
        SampleConsumer { inner: cons },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ring_pads_with_silence() {
        let (mut prod, mut cons) = sample_ring(8);
        assert_eq!(prod.push_slice(&[0.5, -0.5, 0.25]), 3);
        assert_eq!(cons.occupied_len(), 3);

        let mut out = [1.0f32; 5];
        assert_eq!(cons.pop_into(&mut out), 3);
        assert_eq!(out, [0.5, -0.5, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn push_stops_when_full() {
        let (mut prod, _cons) = sample_ring(4);
        assert_eq!(prod.push_slice(&[0.0; 6]), 4);
        assert_eq!(prod.vacant_len(), 0);
    }
}
