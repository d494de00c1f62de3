//! Per-ray random numbers.
//!
//! Streams are keyed by `(seed, ray id, bounce)` and built from the PCG
//! integer hash, which only needs 32-bit wrapping arithmetic. The WGSL trace
//! kernel carries the same functions, so a ray draws the same numbers no
//! matter which batch, thread or backend traces it.

/// PCG-RXS-M-XS 32-bit hash.
#[inline]
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Counter-based random stream for one interaction of one ray.
#[derive(Debug, Clone)]
pub struct RayRng {
    key: u32,
    counter: u32,
}

impl RayRng {
    /// Stream for interaction `bounce` of ray `ray_id` under `seed`.
    pub fn new(seed: u64, ray_id: u64, bounce: u32) -> Self {
        let mut key = pcg_hash(bounce);
        key = pcg_hash(key ^ ray_id as u32);
        key = pcg_hash(key ^ (ray_id >> 32) as u32);
        key = pcg_hash(key ^ seed as u32);
        key = pcg_hash(key ^ (seed >> 32) as u32);
        Self { key, counter: 0 }
    }

    /// Next 32 random bits.
    pub fn next_u32(&mut self) -> u32 {
        let value = pcg_hash(self.key ^ pcg_hash(self.counter));
        self.counter = self.counter.wrapping_add(1);
        value
    }

    /// Uniform sample in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }
}
