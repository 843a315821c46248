//! Destination size terms.
//!
//! # CSV format
//!
//! One row per (selector, segment); remaining columns are land use columns
//! and their weights:
//!
//! ```csv
//! model_selector,segment,TOTHH,RETEMPN,TOTEMP
//! tour_od,work,0,0,1
//! tour_od,shopping,0,1,0
//! tour_od,othdiscr,0.25,0.5,0
//! ```
//!
//! The size term of zone `z` for a segment is `Σ weight · land_use[col][z]`.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use tdm_core::{Table, ZoneId};
use tdm_los::NetworkLos;

use crate::{OdError, OdResult};

pub const SIZE_TERM: &str = "size_term";
pub const DEST_TAZ: &str = "dest_TAZ";

const SELECTOR: &str = "model_selector";
const SEGMENT: &str = "segment";

// ── Coefficients ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct SizeTermRow {
    selector: String,
    segment:  String,
    weights:  Vec<(String, f64)>,
}

/// Size term weights for every selector and segment.
#[derive(Clone, Debug, Default)]
pub struct SizeTermCoefficients {
    rows: Vec<SizeTermRow>,
}

impl SizeTermCoefficients {
    /// Segments defined for `selector`, in file order.
    pub fn segments<'a>(&'a self, selector: &'a str) -> impl Iterator<Item = &'a str> {
        self.rows.iter().filter(move |r| r.selector == selector).map(|r| r.segment.as_str())
    }

    /// Non-zero weights of one segment.
    pub fn weights(&self, selector: &str, segment: &str) -> Option<&[(String, f64)]> {
        self.rows
            .iter()
            .find(|r| r.selector == selector && r.segment == segment)
            .map(|r| r.weights.as_slice())
    }
}

pub fn load_size_terms_csv(path: &Path) -> OdResult<SizeTermCoefficients> {
    load_size_terms_reader(std::fs::File::open(path)?)
}

/// Like [`load_size_terms_csv`] but accepts any `Read` source.
pub fn load_size_terms_reader<R: Read>(reader: R) -> OdResult<SizeTermCoefficients> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| OdError::Config(format!("size terms file has no '{name}' column")))
    };
    let (sel_col, seg_col) = (position(SELECTOR)?, position(SEGMENT)?);

    let mut out = SizeTermCoefficients::default();
    for record in rdr.records() {
        let record = record?;
        let mut weights = Vec::new();
        for (i, cell) in record.iter().enumerate() {
            if i == sel_col || i == seg_col || cell.trim().is_empty() {
                continue;
            }
            let w: f64 = cell
                .trim()
                .parse()
                .map_err(|_| OdError::Config(format!("size term weight '{cell}' is not a number")))?;
            if w != 0.0 {
                weights.push((headers[i].trim().to_owned(), w));
            }
        }
        out.rows.push(SizeTermRow {
            selector: record[sel_col].trim().to_owned(),
            segment: record[seg_col].trim().to_owned(),
            weights,
        });
    }
    Ok(out)
}

// ── Calculator ────────────────────────────────────────────────────────────────

/// Size terms of one selector for every land use zone, computed once and
/// served per segment.
#[derive(Clone, Debug)]
pub struct SizeTermCalculator {
    selector:   String,
    index_name: String,
    zones:      Vec<i64>,
    segments:   BTreeMap<String, Vec<f64>>,
}

impl SizeTermCalculator {
    pub fn new(land_use: &Table, coefficients: &SizeTermCoefficients, selector: &str) -> OdResult<Self> {
        let mut segments = BTreeMap::new();
        for segment in coefficients.segments(selector) {
            let mut sizes = vec![0.0; land_use.len()];
            for (col, weight) in coefficients.weights(selector, segment).unwrap_or_default() {
                let values = land_use
                    .column(col)
                    .and_then(|c| c.to_f64())
                    .ok_or_else(|| OdError::UnknownLandUseColumn(col.clone()))?;
                sizes.iter_mut().zip(values).for_each(|(s, v)| *s += weight * v);
            }
            if let Some(pos) = sizes.iter().position(|s| s.is_nan()) {
                return Err(OdError::Config(format!(
                    "size term for segment '{segment}' is NaN in zone {}",
                    land_use.index()[pos]
                )));
            }
            segments.insert(segment.to_owned(), sizes);
        }
        if segments.is_empty() {
            return Err(OdError::Config(format!("no size term segments for selector '{selector}'")));
        }
        Ok(Self {
            selector: selector.to_owned(),
            index_name: land_use.index_name().to_owned(),
            zones: land_use.index().to_vec(),
            segments,
        })
    }

    pub fn segment_names(&self) -> impl Iterator<Item = &str> {
        self.segments.keys().map(String::as_str)
    }

    /// One column per segment, every zone.
    pub fn omnibus_size_terms_df(&self) -> OdResult<Table> {
        let mut out = Table::new(self.index_name.clone(), self.zones.clone());
        for (segment, sizes) in &self.segments {
            out.set_column(segment.clone(), sizes.clone())?;
        }
        Ok(out)
    }

    /// Size term of every zone for `segment`.
    pub fn dest_size_terms_series(&self, segment: &str) -> OdResult<&[f64]> {
        self.segments
            .get(segment)
            .map(Vec::as_slice)
            .ok_or_else(|| OdError::UnknownSegment { selector: self.selector.clone(), segment: segment.to_owned() })
    }

    /// Zones with a positive size term for `segment`, as a table with one
    /// `size_term` column.  A negative size term is an error.
    pub fn dest_size_terms_df(&self, segment: &str, trace_label: &str) -> OdResult<Table> {
        let sizes = self.dest_size_terms_series(segment)?;
        if let Some((zone, size)) = self.zones.iter().zip(sizes.iter()).find(|(_, s)| **s < 0.0) {
            return Err(OdError::NegativeSizeTerm { segment: segment.to_owned(), zone: *zone, size: *size });
        }
        let keep: Vec<bool> = sizes.iter().map(|s| *s > 0.0).collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        debug!(segment, dropped, of = sizes.len(), "dropping zones with zero size term");

        let all = Table::new(self.index_name.clone(), self.zones.clone()).with_column(SIZE_TERM, sizes.to_vec())?;
        let out = all.filter(&keep);
        if out.is_empty() {
            warn!(segment, trace_label, "no zones with non-zero size terms");
        }
        Ok(out)
    }
}

// ── MAZ → TAZ aggregation ─────────────────────────────────────────────────────

/// MAZ size terms grouped by parent TAZ.
///
/// Rows are sorted by (`dest_TAZ`, `zone_id`).  `offsets[i]..offsets[i + 1]`
/// is the row range of `tazs[i]`.
#[derive(Clone, Debug, Default)]
pub struct MazSizeTerms {
    pub zone_id:   Vec<i64>,
    pub dest_taz:  Vec<i64>,
    pub size_term: Vec<f64>,
    tazs:          Vec<i64>,
    offsets:       Vec<usize>,
}

impl MazSizeTerms {
    fn from_sorted(rows: Vec<(i64, i64, f64)>) -> Self {
        let mut out = Self::default();
        for (taz, maz, size) in rows {
            if out.tazs.last() != Some(&taz) {
                out.tazs.push(taz);
                out.offsets.push(out.zone_id.len());
            }
            out.zone_id.push(maz);
            out.dest_taz.push(taz);
            out.size_term.push(size);
        }
        out.offsets.push(out.zone_id.len());
        out
    }

    pub fn len(&self) -> usize {
        self.zone_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zone_id.is_empty()
    }

    /// Candidate MAZs of `taz` and their size terms.
    pub fn candidates(&self, taz: i64) -> Option<(&[i64], &[f64])> {
        let i = self.tazs.binary_search(&taz).ok()?;
        let (a, b) = (self.offsets[i], self.offsets[i + 1]);
        Some((&self.zone_id[a..b], &self.size_term[a..b]))
    }

    /// Largest number of MAZs in any TAZ.
    pub fn max_count(&self) -> usize {
        self.offsets.windows(2).map(|w| w[1] - w[0]).max().unwrap_or(0)
    }

    pub fn to_table(&self) -> OdResult<Table> {
        Ok(Table::new("", (0..self.len() as i64).collect())
            .with_column("zone_id", self.zone_id.clone())?
            .with_column(DEST_TAZ, self.dest_taz.clone())?
            .with_column(SIZE_TERM, self.size_term.clone())?)
    }
}

/// Sum MAZ size terms to their TAZ.
///
/// Returns the MAZ rows grouped by TAZ and a TAZ table indexed by
/// `dest_TAZ` in ascending order.
pub fn aggregate_size_terms(dest_size_terms: &Table, los: &NetworkLos) -> OdResult<(MazSizeTerms, Table)> {
    let sizes = dest_size_terms.floats(SIZE_TERM)?;
    let mut rows = Vec::with_capacity(sizes.len());
    for (&maz, &size) in dest_size_terms.index().iter().zip(sizes) {
        rows.push((los.map_maz_to_taz(ZoneId(maz))?.0, maz, size));
    }
    rows.sort_by_key(|&(taz, maz, _)| (taz, maz));

    let mut totals: BTreeMap<i64, f64> = BTreeMap::new();
    for &(taz, _, size) in &rows {
        *totals.entry(taz).or_default() += size;
    }
    let taz = Table::new(DEST_TAZ, totals.keys().copied().collect())
        .with_column(SIZE_TERM, totals.values().copied().collect::<Vec<f64>>())?;
    debug!(mazs = rows.len(), tazs = taz.len(), "aggregated size terms");
    Ok((MazSizeTerms::from_sorted(rows), taz))
}
