//! OD sampling, with optional TAZ presampling for two-zone systems.
//!
//! Direct sampling draws from every (origin MAZ, destination MAZ) pair.
//! Presampling draws (origin MAZ, destination TAZ) pairs against TAZ-level
//! skims and aggregated size terms, then picks a destination MAZ inside each
//! sampled TAZ in proportion to MAZ size terms
//! ([`choose_maz_for_taz`]).

use std::collections::BTreeMap;

use tracing::{debug, info};

use tdm_choice::{
    ChoiceError, InteractionSample, PICK_COUNT_COLUMN, PROB_COLUMN, SkimContext, Term, ZoneSource,
};
use tdm_core::{Random, Table, ZoneId};
use tdm_los::NetworkLos;

use crate::alternatives::{OdColumns, create_od_alts};
use crate::od_id::{od_id_col, split_od_ids};
use crate::settings::TourOdSettings;
use crate::size_terms::{DEST_TAZ, MazSizeTerms, aggregate_size_terms};
use crate::{OdError, OdResult};

pub const ORIG_MAZ: &str = "orig_MAZ";
pub const ORIG_TAZ: &str = "orig_TAZ";
pub const DEST_MAZ: &str = "dest_MAZ";

/// Everything one segment's sample needs besides the choosers.
#[derive(Clone, Copy)]
pub struct OdSampler<'a> {
    pub settings:    &'a TourOdSettings,
    /// Sample spec terms for the segment being sampled.
    pub terms:       &'a [Term],
    pub los:         &'a NetworkLos,
    pub land_use:    &'a Table,
    /// Number of draws per chooser; zero returns every alternative.
    pub sample_size: usize,
    pub chunk_size:  usize,
}

impl<'a> OdSampler<'a> {
    fn sample_alts(
        &self,
        rng: &mut Random,
        channel: &str,
        choosers: &Table,
        alts: &Table,
        od_col: &str,
        skims: SkimContext<'_>,
    ) -> OdResult<Table> {
        let sample = InteractionSample::new(choosers, alts, self.terms)
            .constants(&self.settings.constants)
            .skims(skims)
            .sample_size(self.sample_size)
            .alt_col_name(od_col)
            .alt_key(od_col)
            .chunk_size(self.chunk_size)
            .run(rng, channel)?;
        Ok(sample)
    }

    /// Sample (origin, destination) pairs directly from MAZ size terms.
    ///
    /// Returns one row per distinct sampled pair, indexed by chooser, with
    /// the OD id column, `prob`, `pick_count`, and the origin and destination
    /// columns parsed back out of the OD id.
    pub fn od_sample(&self, rng: &mut Random, channel: &str, choosers: &Table, dest_size_terms: &Table) -> OdResult<Table> {
        let s = self.settings;
        let od_col = od_id_col(&s.orig_col_name, &s.dest_col_name);
        let cols = OdColumns { origin: &s.orig_col_name, destination: &s.dest_col_name, od_id: &od_col };
        let alts = create_od_alts(
            dest_size_terms,
            self.land_use,
            &cols,
            Some(&s.orig_filter),
            &s.origin_attr_cols_to_use,
        )?;
        info!(choosers = choosers.len(), alternatives = alts.len(), "od sample");

        let skims = SkimContext::new(
            self.los,
            ZoneSource::Alt(s.orig_col_name.clone()),
            ZoneSource::Alt(s.dest_col_name.clone()),
        );
        let mut sample = self.sample_alts(rng, channel, choosers, &alts, &od_col, skims)?;
        let (origins, destinations) = split_od_ids(sample.strs(&od_col)?)?;
        sample.set_column(s.orig_col_name.clone(), origins)?;
        sample.set_column(s.dest_col_name.clone(), destinations)?;
        Ok(sample)
    }

    /// Sample (origin MAZ, destination TAZ) pairs, then a destination MAZ
    /// within each sampled TAZ.
    ///
    /// Returns rows indexed by chooser with the origin and destination
    /// columns, `prob`, and `pick_count`.
    pub fn od_presample(
        &self,
        rng: &mut Random,
        channel: &str,
        choosers: &Table,
        dest_size_terms: &Table,
    ) -> OdResult<Table> {
        let s = self.settings;
        let od_col = od_id_col(ORIG_MAZ, DEST_TAZ);
        let (maz_sizes, taz_sizes) = aggregate_size_terms(dest_size_terms, self.los)?;

        let cols = OdColumns { origin: ORIG_MAZ, destination: DEST_TAZ, od_id: &od_col };
        let mut alts =
            create_od_alts(&taz_sizes, self.land_use, &cols, Some(&s.orig_filter), &s.origin_attr_cols_to_use)?;
        let orig_taz = alts
            .ints(ORIG_MAZ)?
            .iter()
            .map(|&maz| self.los.map_maz_to_taz(ZoneId(maz)).map(|taz| taz.0))
            .collect::<Result<Vec<i64>, _>>()?;
        alts.set_column(ORIG_TAZ, orig_taz)?;
        info!(
            choosers = choosers.len(),
            alternatives = alts.len(),
            mazs = maz_sizes.len(),
            "od presample"
        );

        let skims = SkimContext::new(self.los, ZoneSource::Alt(ORIG_TAZ.into()), ZoneSource::Alt(DEST_TAZ.into()))
            .taz_level(true);
        let mut taz_sample = self.sample_alts(rng, channel, choosers, &alts, &od_col, skims)?;
        let (orig_mazs, dest_tazs) = split_od_ids(taz_sample.strs(&od_col)?)?;
        taz_sample.set_column(ORIG_MAZ, orig_mazs)?;
        taz_sample.set_column(DEST_TAZ, dest_tazs)?;

        let mut maz_choices = choose_maz_for_taz(rng, channel, &taz_sample, &maz_sizes, Some(ORIG_MAZ), DEST_MAZ)?;
        rename(&mut maz_choices, DEST_MAZ, &s.dest_col_name)?;
        rename(&mut maz_choices, ORIG_MAZ, &s.orig_col_name)?;
        Ok(maz_choices)
    }
}

fn rename(table: &mut Table, from: &str, to: &str) -> OdResult<()> {
    if from != to {
        table.rename_column(from, to)?;
    }
    Ok(())
}

/// Choose one MAZ inside each sampled TAZ, in proportion to MAZ size terms.
///
/// `taz_sample` is indexed by chooser (rows of a chooser contiguous) and
/// carries `dest_TAZ`, `prob`, and `pick_count`.  Each TAZ row is expanded
/// to `pick_count` draws, every chooser must end up with the same number of
/// draws, and each draw picks a MAZ with one random number from `channel`.
///
/// The result has one row per distinct (chooser, MAZ, `addtl_col`) with
/// the `prob` of the first draw that produced it (TAZ prob × MAZ prob) and
/// the number of draws as `pick_count`, sorted by those keys.
pub fn choose_maz_for_taz(
    rng: &mut Random,
    channel: &str,
    taz_sample: &Table,
    maz_sizes: &MazSizeTerms,
    addtl_col: Option<&str>,
    dest_maz_col: &str,
) -> OdResult<Table> {
    let ids = taz_sample.index();
    let tazs = taz_sample.ints(DEST_TAZ)?;
    let taz_probs = taz_sample.floats(PROB_COLUMN)?;
    let pick_counts = taz_sample.ints(PICK_COUNT_COLUMN)?;
    let addtl = addtl_col.map(|c| taz_sample.ints(c)).transpose()?;

    // ── Expand to one row per draw ────────────────────────────────────────
    let draws: Vec<usize> = pick_counts
        .iter()
        .enumerate()
        .flat_map(|(row, &n)| std::iter::repeat_n(row, n.max(0) as usize))
        .collect();

    let mut choosers: Vec<i64> = Vec::new();
    let mut per_chooser: Vec<usize> = Vec::new();
    for &row in &draws {
        let id = ids[row];
        if choosers.last() == Some(&id) {
            if let Some(n) = per_chooser.last_mut() {
                *n += 1;
            }
        } else {
            if choosers.contains(&id) {
                return Err(ChoiceError::NonContiguousAlternatives { chooser: id }.into());
            }
            choosers.push(id);
            per_chooser.push(1);
        }
    }
    let taz_sample_size = per_chooser.iter().copied().max().unwrap_or(0);
    if let Some(i) = per_chooser.iter().position(|&n| n != taz_sample_size) {
        return Err(OdError::SampleShape { chooser: choosers[i], expected: taz_sample_size, got: per_chooser[i] });
    }

    // ── Candidate MAZs per draw ───────────────────────────────────────────
    let mut candidates = Vec::with_capacity(draws.len());
    for &row in &draws {
        let (mazs, sizes) = maz_sizes.candidates(tazs[row]).ok_or(OdError::EmptyTaz(tazs[row]))?;
        let total: f64 = sizes.iter().sum();
        if mazs.is_empty() || total <= 0.0 {
            return Err(OdError::EmptyTaz(tazs[row]));
        }
        candidates.push((mazs, sizes, total));
    }
    let max_maz_count = candidates.iter().map(|(m, _, _)| m.len()).max().unwrap_or(0);

    let rands = rng.random_for_df(channel, &choosers, taz_sample_size)?;
    debug!(
        choosers = choosers.len(),
        taz_sample_size,
        max_maz_count,
        "choosing MAZ within sampled TAZ"
    );

    // ── Pick and regroup ──────────────────────────────────────────────────
    let mut grouped: BTreeMap<(i64, i64, i64), (f64, i64)> = BTreeMap::new();
    for (j, (&row, (mazs, sizes, total))) in draws.iter().zip(&candidates).enumerate() {
        let u = rands.as_slice()[j];
        let mut cum = 0.0;
        let mut pos = 0;
        for k in 0..max_maz_count {
            cum += sizes.get(k).map_or(0.0, |s| s / total);
            if cum - u > 0.0 {
                pos = k;
                break;
            }
        }
        if pos >= mazs.len() {
            return Err(OdError::PaddingSelected { chooser: ids[row], taz: tazs[row] });
        }
        let prob = taz_probs[row] * (sizes[pos] / total);
        let key = (ids[row], mazs[pos], addtl.map_or(0, |a| a[row]));
        grouped.entry(key).or_insert((prob, 0)).1 += 1;
    }

    let n = grouped.len();
    let (mut index, mut dest, mut extra, mut probs, mut counts) =
        (Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n));
    for ((chooser, maz, a), (prob, count)) in grouped {
        index.push(chooser);
        dest.push(maz);
        extra.push(a);
        probs.push(prob);
        counts.push(count);
    }
    let mut out = Table::new(taz_sample.index_name(), index).with_column(dest_maz_col, dest)?;
    if let Some(col) = addtl_col {
        out.set_column(col, extra)?;
    }
    Ok(out.with_column(PROB_COLUMN, probs)?.with_column(PICK_COUNT_COLUMN, counts)?)
}

/// Sample OD alternatives for one segment's tours.
///
/// Keeps `SIMULATE_CHOOSER_COLUMNS` (all columns when empty), sorts the
/// choosers by id, and presamples when `presample` is set.
pub fn run_od_sample(
    rng: &mut Random,
    channel: &str,
    sampler: &OdSampler<'_>,
    tours: &Table,
    dest_size_terms: &Table,
    presample: bool,
) -> OdResult<Table> {
    let columns = &sampler.settings.simulate_chooser_columns;
    let mut choosers = if columns.is_empty() {
        tours.clone()
    } else {
        let names: Vec<&str> = columns.iter().map(String::as_str).collect();
        tours.select(&names)?
    };
    if !choosers.is_monotonic_increasing() {
        debug!(choosers = choosers.len(), "sorting choosers by index");
        choosers = choosers.sort_index();
    }

    if presample {
        info!("presampling TAZ destinations");
        sampler.od_presample(rng, channel, &choosers, dest_size_terms)
    } else {
        sampler.od_sample(rng, channel, &choosers, dest_size_terms)
    }
}
