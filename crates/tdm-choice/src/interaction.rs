//! Chooser × alternative sampling and simulation.
//!
//! # `InteractionSample`
//!
//! For every chooser, evaluate the utility of every alternative, turn the
//! utilities into logit probabilities and draw `sample_size` alternatives
//! **with replacement**.  Repeated draws collapse into one row:
//!
//! ```text
//!            <alt_col_name>  prob   pick_count
//! tour_id
//! 100               10       0.25   1
//! 100               11       0.75   3
//! 101               11       0.75   4
//! ```
//!
//! `prob` is the probability of one draw, not scaled by `pick_count`.
//! `sample_size = 0` skips drawing and returns the full alternative set
//! with `pick_count = 1` (estimation mode).
//!
//! # `InteractionSimulate`
//!
//! Takes a sample table like the one above (rows of one chooser
//! contiguous) as each chooser's private alternative set and picks one row
//! per chooser with a single uniform draw.
//!
//! # Determinism
//!
//! Draws are requested from the chooser channel chunk by chunk, in chooser
//! order, before any utility is computed.  With the `parallel` feature the
//! utility and probability work of a chunk runs on Rayon; the picked
//! alternatives do not change.

use std::collections::BTreeMap;

use tracing::{debug, info};

use tdm_core::{Column, IdMap, Random, Table};

use crate::logit::{logsum, make_choice, utils_to_probs};
use crate::spec::{Constants, Term};
use crate::utility::{SkimContext, UtilityEvaluator};
use crate::{ChoiceError, ChoiceResult};

/// Output column of [`InteractionSample`] holding per-draw probabilities.
pub const PROB_COLUMN: &str = "prob";
/// Output column of [`InteractionSample`] holding draw counts.
pub const PICK_COUNT_COLUMN: &str = "pick_count";
/// Output column of [`InteractionSimulate`] holding the chosen key.
pub const CHOICE_COLUMN: &str = "choice";
/// Output column of [`InteractionSimulate`] holding the chooser's logsum.
pub const LOGSUM_COLUMN: &str = "logsum";

/// Split `0..n` into `chunk_size` wide ranges.  `0` means one chunk.
fn chunks(n: usize, chunk_size: usize) -> impl Iterator<Item = (usize, usize)> {
    let width = if chunk_size == 0 { n.max(1) } else { chunk_size };
    (0..n).step_by(width).map(move |start| (start, (start + width).min(n)))
}

fn check_choosers(choosers: &Table) -> ChoiceResult<()> {
    choosers.ensure_unique_index()?;
    if !choosers.is_monotonic_increasing() {
        return Err(ChoiceError::NotMonotonic(choosers.index_name().to_owned()));
    }
    Ok(())
}

// ── Sampling ──────────────────────────────────────────────────────────────────

struct Pick {
    alt:   usize,
    prob:  f64,
    count: i64,
}

/// Builder for one sampling pass.
///
/// ```rust,ignore
/// let sample = InteractionSample::new(&tours, &alts, &terms)
///     .skims(SkimContext::new(&los, ZoneSource::Alt("origin".into()), ZoneSource::AltIndex))
///     .sample_size(30)
///     .alt_col_name("destination")
///     .run(state.rng_mut(), "tours")?;
/// ```
pub struct InteractionSample<'a> {
    choosers:     &'a Table,
    alternatives: &'a Table,
    terms:        &'a [Term],
    constants:    Option<&'a Constants>,
    skims:        Option<SkimContext<'a>>,
    sample_size:  usize,
    alt_col_name: String,
    alt_key:      Option<String>,
    chunk_size:   usize,
}

impl<'a> InteractionSample<'a> {
    pub fn new(choosers: &'a Table, alternatives: &'a Table, terms: &'a [Term]) -> Self {
        Self {
            choosers,
            alternatives,
            terms,
            constants: None,
            skims: None,
            sample_size: 0,
            alt_col_name: alternatives.index_name().to_owned(),
            alt_key: None,
            chunk_size: 0,
        }
    }

    pub fn constants(mut self, constants: &'a Constants) -> Self {
        self.constants = Some(constants);
        self
    }

    pub fn skims(mut self, skims: SkimContext<'a>) -> Self {
        self.skims = Some(skims);
        self
    }

    pub fn sample_size(mut self, n: usize) -> Self {
        self.sample_size = n;
        self
    }

    /// Name of the output column identifying the sampled alternative.
    pub fn alt_col_name(mut self, name: impl Into<String>) -> Self {
        self.alt_col_name = name.into();
        self
    }

    /// Use this alternatives column as the alternative key instead of the
    /// alternatives' index.
    pub fn alt_key(mut self, column: impl Into<String>) -> Self {
        self.alt_key = Some(column.into());
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }

    /// Draw the sample.  `channel` must contain every chooser id.
    pub fn run(&self, rng: &mut Random, channel: &str) -> ChoiceResult<Table> {
        if self.alternatives.is_empty() {
            return Err(ChoiceError::NoAlternatives);
        }
        check_choosers(self.choosers)?;
        let key = match &self.alt_key {
            Some(col) => self.alternatives.require(col)?.clone(),
            None => Column::Int(self.alternatives.index().to_vec()),
        };
        let eval = UtilityEvaluator::new(
            self.terms,
            self.choosers,
            self.alternatives,
            self.constants,
            self.skims.as_ref(),
        )?;

        let ids = self.choosers.index();
        info!(
            choosers = ids.len(),
            alternatives = self.alternatives.len(),
            sample_size = self.sample_size,
            "interaction sample"
        );

        let mut index = Vec::new();
        let mut alt_rows = Vec::new();
        let mut probs = Vec::new();
        let mut counts = Vec::new();
        for (start, end) in chunks(ids.len(), self.chunk_size) {
            let draws = if self.sample_size > 0 {
                Some(rng.random_for_df(channel, &ids[start..end], self.sample_size)?)
            } else {
                None
            };
            let row_draws = |c: usize| draws.as_ref().map(|d| d.row(c - start));

            #[cfg(not(feature = "parallel"))]
            let picks: Vec<Vec<Pick>> = (start..end)
                .map(|c| self.sample_chooser(&eval, c, row_draws(c)))
                .collect::<ChoiceResult<_>>()?;

            #[cfg(feature = "parallel")]
            let picks: Vec<Vec<Pick>> = {
                use rayon::prelude::*;
                (start..end)
                    .into_par_iter()
                    .map(|c| self.sample_chooser(&eval, c, row_draws(c)))
                    .collect::<ChoiceResult<_>>()?
            };

            for (c, chooser_picks) in (start..end).zip(picks) {
                for pick in chooser_picks {
                    index.push(ids[c]);
                    alt_rows.push(pick.alt);
                    probs.push(pick.prob);
                    counts.push(pick.count);
                }
            }
            debug!(start, end, rows = index.len(), "sample chunk done");
        }

        Ok(Table::new(self.choosers.index_name(), index)
            .with_column(self.alt_col_name.clone(), key.take(&alt_rows))?
            .with_column(PROB_COLUMN, probs)?
            .with_column(PICK_COUNT_COLUMN, counts)?)
    }

    fn sample_chooser(&self, eval: &UtilityEvaluator<'_>, c: usize, draws: Option<&[f64]>) -> ChoiceResult<Vec<Pick>> {
        let id = self.choosers.index()[c];
        let mut utils = Vec::with_capacity(self.alternatives.len());
        eval.utilities_into(c, 0..self.alternatives.len(), id, &mut utils)?;
        let mut probs = Vec::with_capacity(utils.len());
        utils_to_probs(id, &utils, &mut probs)?;

        let Some(draws) = draws else {
            return Ok(probs.iter().enumerate().map(|(alt, &prob)| Pick { alt, prob, count: 1 }).collect());
        };
        let mut picked: BTreeMap<usize, i64> = BTreeMap::new();
        for &u in draws {
            let alt = make_choice(&probs, u).ok_or(ChoiceError::NoAvailableAlternatives { chooser: id })?;
            *picked.entry(alt).or_default() += 1;
        }
        Ok(picked.into_iter().map(|(alt, count)| Pick { alt, prob: probs[alt], count }).collect())
    }
}

// ── Simulation over a sample ──────────────────────────────────────────────────

/// Builder for the final pick among each chooser's sampled alternatives.
pub struct InteractionSimulate<'a> {
    choosers:      &'a Table,
    alternatives:  &'a Table,
    terms:         &'a [Term],
    constants:     Option<&'a Constants>,
    skims:         Option<SkimContext<'a>>,
    choice_column: String,
    want_logsums:  bool,
    chunk_size:    usize,
}

impl<'a> InteractionSimulate<'a> {
    /// `alternatives` is indexed by chooser id; `choice_column` names the
    /// alternatives column reported as each chooser's choice.
    pub fn new(
        choosers:      &'a Table,
        alternatives:  &'a Table,
        terms:         &'a [Term],
        choice_column: impl Into<String>,
    ) -> Self {
        Self {
            choosers,
            alternatives,
            terms,
            constants: None,
            skims: None,
            choice_column: choice_column.into(),
            want_logsums: false,
            chunk_size: 0,
        }
    }

    pub fn constants(mut self, constants: &'a Constants) -> Self {
        self.constants = Some(constants);
        self
    }

    pub fn skims(mut self, skims: SkimContext<'a>) -> Self {
        self.skims = Some(skims);
        self
    }

    pub fn want_logsums(mut self, yes: bool) -> Self {
        self.want_logsums = yes;
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }

    /// Row range of each chooser's alternatives.
    fn alt_ranges(&self) -> ChoiceResult<IdMap<i64, (usize, usize)>> {
        let mut ranges: IdMap<i64, (usize, usize)> = IdMap::default();
        let index = self.alternatives.index();
        let mut start = 0;
        while start < index.len() {
            let id = index[start];
            let end = start + index[start..].iter().take_while(|&&x| x == id).count();
            if ranges.insert(id, (start, end)).is_some() {
                return Err(ChoiceError::NonContiguousAlternatives { chooser: id });
            }
            start = end;
        }
        Ok(ranges)
    }

    /// Returns a table indexed like `choosers` with a `choice` column (and
    /// `logsum` when requested).
    pub fn run(&self, rng: &mut Random, channel: &str) -> ChoiceResult<Table> {
        self.choosers.ensure_unique_index()?;
        let key = self.alternatives.require(&self.choice_column)?;
        let ranges = self.alt_ranges()?;
        let ids = self.choosers.index();
        let spans: Vec<(usize, usize)> = ids
            .iter()
            .map(|id| ranges.get(id).copied().ok_or(ChoiceError::MissingAlternatives { chooser: *id }))
            .collect::<ChoiceResult<_>>()?;

        // Alternatives rows are addressed directly; the chooser row of each
        // is the chooser being simulated.
        let eval = UtilityEvaluator::new(
            self.terms,
            self.choosers,
            self.alternatives,
            self.constants,
            self.skims.as_ref(),
        )?;
        info!(choosers = ids.len(), alternatives = self.alternatives.len(), "interaction sample simulate");

        let mut chosen = Vec::with_capacity(ids.len());
        let mut logsums = Vec::with_capacity(if self.want_logsums { ids.len() } else { 0 });
        for (start, end) in chunks(ids.len(), self.chunk_size) {
            let draws = rng.random_for_df(channel, &ids[start..end], 1)?;
            let one = |c: usize| self.simulate_chooser(&eval, c, spans[c], draws.row(c - start)[0]);

            #[cfg(not(feature = "parallel"))]
            let results: Vec<(usize, f64)> = (start..end).map(one).collect::<ChoiceResult<_>>()?;

            #[cfg(feature = "parallel")]
            let results: Vec<(usize, f64)> = {
                use rayon::prelude::*;
                (start..end).into_par_iter().map(one).collect::<ChoiceResult<_>>()?
            };

            for (row, ls) in results {
                chosen.push(row);
                if self.want_logsums {
                    logsums.push(ls);
                }
            }
        }

        let mut out = Table::new(self.choosers.index_name(), ids.to_vec()).with_column(CHOICE_COLUMN, key.take(&chosen))?;
        if self.want_logsums {
            out.set_column(LOGSUM_COLUMN, logsums)?;
        }
        Ok(out)
    }

    fn simulate_chooser(
        &self,
        eval: &UtilityEvaluator<'_>,
        c: usize,
        (start, end): (usize, usize),
        u: f64,
    ) -> ChoiceResult<(usize, f64)> {
        let id = self.choosers.index()[c];
        let mut utils = Vec::with_capacity(end - start);
        eval.utilities_into(c, start..end, id, &mut utils)?;
        let mut probs = Vec::with_capacity(utils.len());
        utils_to_probs(id, &utils, &mut probs)?;
        let pos = make_choice(&probs, u).ok_or(ChoiceError::NoAvailableAlternatives { chooser: id })?;
        Ok((start + pos, logsum(&utils)))
    }
}
