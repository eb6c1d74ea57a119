use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Replayable random-number context threaded through the pipeline.
///
/// Every stochastic operator draws through this context instead of a
/// process-global generator. The context keeps an explicit draw counter so
/// that any point of a run can be saved with [`RngContext::state`] and
/// replayed with [`RngContext::restore`]: restoring rewinds the generator
/// to the saved draw and the subsequent sequence is identical.
///
/// Draw accounting: `uniform` and `below` advance the counter by 1,
/// `normal` by 2, `chi_squared` by `2 * k`.
pub struct RngContext {
    seed: u64,
    rng: ChaCha8Rng,
    state: u64,
}

/// Opaque save point of an [`RngContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngState {
    pub(crate) state: u64,
}

impl RngContext {
    pub fn new(seed: u64) -> Self {
        RngContext {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            state: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of elementary draws consumed so far.
    pub fn state(&self) -> RngState {
        RngState { state: self.state }
    }

    /// Rewind to a previously saved state. The generator is reseeded and
    /// fast-forwarded, so the draws following `restore` repeat the draws
    /// that followed `state()`.
    pub fn restore(&mut self, saved: RngState) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.state = 0;
        for _ in 0..saved.state {
            let _: f64 = self.rng.gen();
            self.state += 1;
        }
    }

    /// One uniform draw in [0, 1). Counter +1.
    pub fn uniform(&mut self) -> f64 {
        self.state += 1;
        self.rng.gen()
    }

    /// One uniform draw in [lo, hi). Counter +1.
    pub fn uniform_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.uniform()
    }

    /// One uniform integer draw in [0, n). Counter +1. `n` must be > 0.
    pub fn below(&mut self, n: usize) -> usize {
        debug_assert!(n > 0, "below() requires a non-empty range");
        let u = self.uniform();
        let idx = (u * n as f64) as usize;
        idx.min(n - 1)
    }

    /// One uniform integer draw in [lo, hi] inclusive. Counter +1.
    pub fn int_range(&mut self, lo: i64, hi: i64) -> i64 {
        debug_assert!(lo <= hi, "int_range() requires lo <= hi");
        let span = (hi - lo + 1) as usize;
        lo + self.below(span) as i64
    }

    /// One normal draw via Box-Muller. Counter +2.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = 1.0 - self.uniform();
        let u2 = self.uniform();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    /// One chi-squared draw with `k` degrees of freedom, as the sum of `k`
    /// squared standard normals. Counter +2k.
    pub fn chi_squared(&mut self, k: u32) -> f64 {
        (0..k).map(|_| self.normal(0.0, 1.0).powi(2)).sum()
    }

    /// Stochastic gate over a [0, 1] probability.
    ///
    /// Returns `true` without consuming a draw when `p >= 1.0` and `false`
    /// without consuming a draw when `p <= 0.0`; otherwise a single uniform
    /// draw decides. The deterministic extremes must not advance the draw
    /// counter, so replayed sequences stay aligned.
    pub fn gate(&mut self, p: f64) -> bool {
        if p >= 1.0 {
            true
        } else if p <= 0.0 {
            false
        } else {
            p > self.uniform()
        }
    }

    /// In-place Fisher-Yates shuffle drawing through the context
    /// (`len - 1` draws for a non-empty slice).
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }
}
