//! Dense zone-to-zone skim matrices.
//!
//! # Data layout
//!
//! Each skim is one row-major `n × n` `f32` matrix over the same ordered zone
//! set.  The value for `(o, d)` lives at `offset(o) * n + offset(d)`.
//!
//! # CSV format
//!
//! Long format, one row per OD pair, one column per skim:
//!
//! ```csv
//! origin,destination,DIST,SOV_TIME
//! 1,1,0.4,2.0
//! 1,2,3.1,7.5
//! ```
//!
//! The zone set is the sorted union of origins and destinations.  Pairs
//! absent from the file read as `0.0`.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use tdm_core::{IdMap, ZoneId};

use crate::{LosError, LosResult};

/// Named skim matrices over one zone set.
#[derive(Clone, Debug)]
pub struct SkimDict {
    /// Zones in matrix order.
    pub zone_ids: Vec<ZoneId>,
    offsets:      IdMap<ZoneId, usize>,
    names:        Vec<String>,
    data:         Vec<Vec<f32>>,
}

impl SkimDict {
    pub fn zone_count(&self) -> usize {
        self.zone_ids.len()
    }

    pub fn skim_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn has_skim(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Position of `name`, for repeated lookups through [`get_at`](Self::get_at).
    pub fn skim_index(&self, name: &str) -> LosResult<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| LosError::UnknownSkim(name.to_owned()))
    }

    #[inline]
    pub fn offset(&self, zone: ZoneId) -> LosResult<usize> {
        self.offsets.get(&zone).copied().ok_or(LosError::UnknownZone(zone))
    }

    #[inline]
    pub fn get_at(&self, skim: usize, o: ZoneId, d: ZoneId) -> LosResult<f64> {
        let n = self.zone_ids.len();
        Ok(self.data[skim][self.offset(o)? * n + self.offset(d)?] as f64)
    }

    pub fn get(&self, skim: &str, o: ZoneId, d: ZoneId) -> LosResult<f64> {
        self.get_at(self.skim_index(skim)?, o, d)
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Assembles a [`SkimDict`] from in-memory matrices.
pub struct SkimDictBuilder {
    zone_ids: Vec<ZoneId>,
    names:    Vec<String>,
    data:     Vec<Vec<f32>>,
}

impl SkimDictBuilder {
    pub fn new(zone_ids: Vec<ZoneId>) -> Self {
        Self { zone_ids, names: Vec::new(), data: Vec::new() }
    }

    fn put(&mut self, name: &str, values: Vec<f32>) {
        match self.names.iter().position(|x| x == name) {
            Some(i) => self.data[i] = values,
            None => {
                self.names.push(name.to_owned());
                self.data.push(values);
            }
        }
    }

    /// Add a row-major `n × n` matrix.  Replaces a skim of the same name.
    pub fn matrix(mut self, name: &str, values: Vec<f32>) -> LosResult<Self> {
        let n = self.zone_ids.len();
        if values.len() != n * n {
            return Err(LosError::ShapeMismatch { name: name.to_owned(), expected: n * n, got: values.len() });
        }
        self.put(name, values);
        Ok(self)
    }

    /// Add a skim computed from `(origin, destination)`.
    pub fn skim_fn(mut self, name: &str, f: impl Fn(ZoneId, ZoneId) -> f32) -> Self {
        let mut values = Vec::with_capacity(self.zone_ids.len() * self.zone_ids.len());
        for &o in &self.zone_ids {
            for &d in &self.zone_ids {
                values.push(f(o, d));
            }
        }
        self.put(name, values);
        self
    }

    pub fn build(self) -> LosResult<SkimDict> {
        let mut offsets = IdMap::default();
        for (i, &z) in self.zone_ids.iter().enumerate() {
            if offsets.insert(z, i).is_some() {
                return Err(LosError::Core(tdm_core::CoreError::DuplicateIndex { index: "zone".into(), value: z.0 }));
            }
        }
        Ok(SkimDict { zone_ids: self.zone_ids, offsets, names: self.names, data: self.data })
    }
}

// ── CSV loading ───────────────────────────────────────────────────────────────

/// Load a long-format skim file.  See the module docs for the layout.
pub fn load_skims_csv(path: &Path) -> LosResult<SkimDict> {
    let dict = load_skims_reader(std::fs::File::open(path)?)?;
    info!(path = %path.display(), zones = dict.zone_count(), skims = dict.names.len(), "skims loaded");
    Ok(dict)
}

/// Like [`load_skims_csv`] but accepts any `Read` source.
pub fn load_skims_reader<R: Read>(reader: R) -> LosResult<SkimDict> {
    let mut rdr = csv::Reader::from_reader(reader);
    let names: Vec<String> = rdr.headers()?.iter().skip(2).map(str::to_owned).collect();
    if names.is_empty() {
        return Err(LosError::NoSkims);
    }

    let mut rows: Vec<(ZoneId, ZoneId, Vec<f32>)> = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let parse_zone = |i: usize| -> LosResult<ZoneId> {
            record
                .get(i)
                .and_then(|c| c.trim().parse::<i64>().ok())
                .map(ZoneId)
                .ok_or_else(|| LosError::Core(tdm_core::CoreError::Parse(format!("bad zone in skim row {record:?}"))))
        };
        let (o, d) = (parse_zone(0)?, parse_zone(1)?);
        let mut values = Vec::with_capacity(names.len());
        for i in 0..names.len() {
            let cell = record.get(i + 2).unwrap_or("");
            let v = cell
                .trim()
                .parse::<f32>()
                .map_err(|_| LosError::Core(tdm_core::CoreError::Parse(format!("bad skim value '{cell}'"))))?;
            values.push(v);
        }
        rows.push((o, d, values));
    }

    let zones: BTreeSet<ZoneId> = rows.iter().flat_map(|(o, d, _)| [*o, *d]).collect();
    let zone_ids: Vec<ZoneId> = zones.into_iter().collect();
    let n = zone_ids.len();
    let offsets: IdMap<ZoneId, usize> = zone_ids.iter().enumerate().map(|(i, &z)| (z, i)).collect();

    let mut data = vec![vec![0.0f32; n * n]; names.len()];
    for (o, d, values) in &rows {
        let cell = offsets[o] * n + offsets[d];
        for (k, v) in values.iter().enumerate() {
            data[k][cell] = *v;
        }
    }
    if rows.len() < n * n {
        warn!(missing = n * n - rows.len(), "skim file is sparse; missing OD pairs read as 0");
    }
    Ok(SkimDict { zone_ids, offsets, names, data })
}
