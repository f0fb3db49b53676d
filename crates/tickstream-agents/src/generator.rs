//! Synthetic stock tick generator.
//!
//! Prices follow a geometric Brownian motion random walk:
//!
//! S(t+dt) = S(t) * exp((μ - σ²/2)*dt + σ*sqrt(dt)*Z)
//!
//! The generator is a plain `Iterator`: it only computes a tick when the
//! caller pulls one, and it never ends.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// One minute of a 252-day trading year, in years.
const ONE_MINUTE: f64 = 1.0 / 252.0 / 24.0 / 60.0;
const PRICE_FLOOR: f64 = 0.01;
const VOLUME_RANGE: std::ops::RangeInclusive<u64> = 100..=5_000;

/// A generated tick before the producer labels it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTick {
    /// Position in this generator's sequence, starting at 1.
    pub sequence_number: u64,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume: u64,
}

/// Random walk parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomWalk {
    /// Annual drift rate (μ)
    pub drift: f64,
    /// Annual volatility (σ)
    pub volatility: f64,
    /// Time step in years
    pub dt: f64,
}

impl RandomWalk {
    fn step(&self, price: f64, z: f64) -> f64 {
        let drift_term = (self.drift - 0.5 * self.volatility * self.volatility) * self.dt;
        let diffusion_term = self.volatility * self.dt.sqrt() * z;
        (price * (drift_term + diffusion_term).exp()).max(PRICE_FLOOR)
    }
}

impl Default for RandomWalk {
    fn default() -> Self {
        Self {
            drift: 0.0,
            volatility: 0.30,
            dt: ONE_MINUTE,
        }
    }
}

/// Infinite, pull-based sequence of ticks for one symbol.
pub struct TickGenerator {
    symbol: String,
    price: f64,
    spread_bps: f64,
    walk: RandomWalk,
    rng: StdRng,
    next_sequence: u64,
}

impl TickGenerator {
    /// Generator seeded from OS entropy.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_rng(symbol.into(), StdRng::from_entropy())
    }

    /// Deterministic generator: the same seed yields the same prices and volumes.
    pub fn seeded(symbol: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(symbol.into(), StdRng::seed_from_u64(seed))
    }

    fn with_rng(symbol: String, rng: StdRng) -> Self {
        Self {
            symbol,
            price: 100.0,
            spread_bps: 10.0,
            walk: RandomWalk::default(),
            rng,
            next_sequence: 1,
        }
    }

    /// Starting price of the walk. Non-positive values fall back to the floor.
    pub fn with_initial_price(mut self, price: f64) -> Self {
        self.price = price.max(PRICE_FLOOR);
        self
    }

    pub fn with_random_walk(mut self, walk: RandomWalk) -> Self {
        self.walk = walk;
        self
    }

    pub fn with_spread_bps(mut self, spread_bps: f64) -> Self {
        self.spread_bps = spread_bps.max(0.0);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    fn next_tick(&mut self) -> GeneratedTick {
        let z: f64 = self.rng.sample(StandardNormal);
        self.price = self.walk.step(self.price, z);

        let half_spread = self.price * self.spread_bps / 10_000.0 / 2.0;
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;

        GeneratedTick {
            sequence_number,
            symbol: self.symbol.clone(),
            timestamp: Utc::now(),
            price: to_cents(self.price),
            bid: to_cents((self.price - half_spread).max(PRICE_FLOOR)),
            ask: to_cents(self.price + half_spread),
            volume: self.rng.gen_range(VOLUME_RANGE),
        }
    }
}

impl Iterator for TickGenerator {
    type Item = GeneratedTick;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_tick())
    }
}

fn to_cents(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp(2)
}
