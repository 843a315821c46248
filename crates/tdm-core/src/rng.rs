//! Per-entity random channels.
//!
//! # Determinism strategy
//!
//! Every entity table that acts as choosers (`households`, `persons`,
//! `tours`, `trips`, …) owns a *channel*: the set of canonical ids that may
//! request draws.  At the start of each step a channel derives its step seed
//!
//!   step_seed = blake3(base_seed, channel_name, step_name)
//!
//! and each row lazily gets its own `SmallRng` seeded by
//!
//!   seed = step_seed XOR (id * MIXING_CONSTANT)
//!
//! the same golden-ratio mixing used for per-agent streams.  A row's draws
//! therefore depend only on (base seed, channel, step, id, draws already taken
//! by that id in this step).  Row order, unrelated rows, and how the
//! population is partitioned across workers never change them.

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::{CoreError, CoreResult, IdMap};

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

// ── Draws ─────────────────────────────────────────────────────────────────────

/// Dense row-major block of uniforms: one row per requested id, `n` wide.
#[derive(Clone, Debug, PartialEq)]
pub struct Draws {
    width: usize,
    data:  Vec<f64>,
}

impl Draws {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> usize {
        if self.width == 0 { 0 } else { self.data.len() / self.width }
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    /// All draws, chooser-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}

// ── Channel ───────────────────────────────────────────────────────────────────

struct RowStream {
    rng:    Option<SmallRng>,
    offset: u64,
}

struct Channel {
    rows:      IdMap<i64, RowStream>,
    step_seed: Option<u64>,
}

impl Channel {
    fn new() -> Self {
        Self { rows: IdMap::default(), step_seed: None }
    }

    fn reset_rows(&mut self) {
        for row in self.rows.values_mut() {
            row.rng = None;
            row.offset = 0;
        }
    }
}

fn step_seed(base_seed: u64, channel: &str, step: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&base_seed.to_le_bytes());
    hasher.update(channel.as_bytes());
    hasher.update(&[0]);
    hasher.update(step.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

// ── Random ────────────────────────────────────────────────────────────────────

/// Channel-keyed random number manager owned by one pipeline `State`.
pub struct Random {
    base_seed: u64,
    channels:  BTreeMap<String, Channel>,
    step:      Option<String>,
}

impl Default for Random {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Random {
    pub fn new(base_seed: u64) -> Self {
        Self { base_seed, channels: BTreeMap::new(), step: None }
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Change the base seed.  Only allowed between steps.
    pub fn set_base_seed(&mut self, seed: u64) -> CoreResult<()> {
        if let Some(step) = &self.step {
            return Err(CoreError::StepActive(step.clone()));
        }
        self.base_seed = seed;
        Ok(())
    }

    pub fn step_name(&self) -> Option<&str> {
        self.step.as_deref()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Register `ids` as the domain of channel `name`.
    ///
    /// Calling again on an existing channel extends its domain; ids already in
    /// the domain are rejected.  A channel added mid-step is seeded for the
    /// current step immediately.
    pub fn add_channel(&mut self, name: &str, ids: &[i64]) -> CoreResult<()> {
        let step_seed = self.step.as_deref().map(|s| step_seed(self.base_seed, name, s));
        let channel = self.channels.entry(name.to_owned()).or_insert_with(Channel::new);
        if channel.step_seed.is_none() {
            channel.step_seed = step_seed;
        }
        channel.rows.reserve(ids.len());
        for &id in ids {
            if channel.rows.contains_key(&id) {
                return Err(CoreError::ChannelOverlap { channel: name.to_owned(), id });
            }
            channel.rows.insert(id, RowStream { rng: None, offset: 0 });
        }
        debug!(channel = name, rows = channel.rows.len(), "random channel registered");
        Ok(())
    }

    /// Retire a channel.  Dropping an unknown channel is a no-op.
    pub fn drop_channel(&mut self, name: &str) {
        if self.channels.remove(name).is_some() {
            debug!(channel = name, "random channel dropped");
        }
    }

    /// Start a step: every channel derives a fresh step seed and row offsets
    /// restart at zero.
    pub fn begin_step(&mut self, step: &str) -> CoreResult<()> {
        if let Some(active) = &self.step {
            return Err(CoreError::StepActive(active.clone()));
        }
        for (name, channel) in self.channels.iter_mut() {
            channel.step_seed = Some(step_seed(self.base_seed, name, step));
            channel.reset_rows();
        }
        self.step = Some(step.to_owned());
        Ok(())
    }

    pub fn end_step(&mut self, step: &str) -> CoreResult<()> {
        match &self.step {
            Some(active) if active == step => {}
            Some(active) => return Err(CoreError::StepActive(active.clone())),
            None => return Err(CoreError::NoActiveStep),
        }
        for channel in self.channels.values_mut() {
            channel.step_seed = None;
            channel.reset_rows();
        }
        self.step = None;
        Ok(())
    }

    /// `n` uniforms in `[0, 1)` for each id, one row per id, in the order given.
    ///
    /// Ids must be unique and registered in `channel`.
    pub fn random_for_df(&mut self, channel: &str, ids: &[i64], n: usize) -> CoreResult<Draws> {
        let chan = self
            .channels
            .get_mut(channel)
            .ok_or_else(|| CoreError::UnknownChannel(channel.to_owned()))?;
        let seed = chan.step_seed.ok_or(CoreError::NoActiveStep)?;

        let mut seen = IdMap::default();
        seen.reserve(ids.len());
        let mut data = Vec::with_capacity(ids.len() * n);
        for &id in ids {
            if seen.insert(id, ()).is_some() {
                return Err(CoreError::DuplicateIndex { index: channel.to_owned(), value: id });
            }
            let row = chan
                .rows
                .get_mut(&id)
                .ok_or_else(|| CoreError::UnknownRow { channel: channel.to_owned(), id })?;
            let rng = row
                .rng
                .get_or_insert_with(|| SmallRng::seed_from_u64(seed ^ (id as u64).wrapping_mul(MIXING_CONSTANT)));
            for _ in 0..n {
                data.push(rng.r#gen::<f64>());
            }
            row.offset += n as u64;
        }
        Ok(Draws { width: n, data })
    }

    /// Number of draws `id` has consumed from `channel` in the current step.
    pub fn offset(&self, channel: &str, id: i64) -> Option<u64> {
        self.channels.get(channel)?.rows.get(&id).map(|r| r.offset)
    }
}
