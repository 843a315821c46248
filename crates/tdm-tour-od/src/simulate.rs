//! Final OD choice among each tour's sampled, logsum-annotated pairs.

use tracing::{debug, info};

use tdm_choice::{CHOICE_COLUMN, InteractionSimulate, SkimContext, Term, ZoneSource};
use tdm_core::{Random, Table};
use tdm_los::NetworkLos;

use crate::od_id::{make_od_ids, od_id_col, split_od_ids};
use crate::settings::TourOdSettings;
use crate::size_terms::SIZE_TERM;
use crate::{OdError, OdResult};

/// Inputs of the final simulation besides the random stream.
#[derive(Clone, Copy)]
pub struct OdSimulator<'a> {
    pub settings:        &'a TourOdSettings,
    /// Simulation spec terms for the segment.
    pub terms:           &'a [Term],
    pub los:             &'a NetworkLos,
    pub land_use:        &'a Table,
    /// Positive size terms indexed by destination zone.
    pub dest_size_terms: &'a Table,
    pub chunk_size:      usize,
}

impl OdSimulator<'_> {
    /// Annotate the sample with the OD id, destination size term, and
    /// origin attributes.
    fn alternatives(&self, mut od_sample: Table) -> OdResult<Table> {
        let s = self.settings;
        let od_col = od_id_col(&s.orig_col_name, &s.dest_col_name);
        let origins = od_sample.ints(&s.orig_col_name)?.to_vec();
        let destinations = od_sample.ints(&s.dest_col_name)?.to_vec();
        od_sample.set_column(od_col, make_od_ids(&origins, &destinations))?;

        let size_positions = self.dest_size_terms.positions()?;
        let sizes = self.dest_size_terms.floats(SIZE_TERM)?;
        let size = destinations
            .iter()
            .map(|d| {
                size_positions
                    .get(d)
                    .map(|&p| sizes[p])
                    .ok_or(OdError::MissingZone { what: "destination size terms", zone: *d })
            })
            .collect::<OdResult<Vec<f64>>>()?;
        od_sample.set_column(SIZE_TERM, size)?;

        if !s.origin_attr_cols_to_use.is_empty() {
            let lu_positions = self.land_use.positions()?;
            let rows = origins
                .iter()
                .map(|o| lu_positions.get(o).copied().ok_or(OdError::MissingZone { what: "land use", zone: *o }))
                .collect::<OdResult<Vec<usize>>>()?;
            for attr in &s.origin_attr_cols_to_use {
                od_sample.set_column(attr.clone(), self.land_use.require(attr)?.take(&rows))?;
            }
        }
        Ok(od_sample)
    }

    /// Pick one OD pair per tour.
    ///
    /// Returns a table indexed by tour with `choice` (the OD id), the origin
    /// and destination columns, and `logsum` when `want_logsums` is set.
    pub fn run(
        &self,
        rng: &mut Random,
        channel: &str,
        tours: &Table,
        od_sample: Table,
        want_logsums: bool,
    ) -> OdResult<Table> {
        let s = self.settings;
        let columns = &s.simulate_chooser_columns;
        let mut choosers = if columns.is_empty() {
            tours.clone()
        } else {
            let names: Vec<&str> = columns.iter().map(String::as_str).collect();
            tours.select(&names)?
        };
        if !choosers.is_monotonic_increasing() {
            debug!("sorting simulate choosers by index");
            choosers = choosers.sort_index();
        }

        let alternatives = self.alternatives(od_sample)?;
        info!(choosers = choosers.len(), alternatives = alternatives.len(), "od simulate");

        let od_col = od_id_col(&s.orig_col_name, &s.dest_col_name);
        let skims = SkimContext::new(
            self.los,
            ZoneSource::Alt(s.orig_col_name.clone()),
            ZoneSource::Alt(s.dest_col_name.clone()),
        );
        let mut choices = InteractionSimulate::new(&choosers, &alternatives, self.terms, od_col)
            .constants(&s.constants)
            .skims(skims)
            .want_logsums(want_logsums)
            .chunk_size(self.chunk_size)
            .run(rng, channel)?;

        let (origins, destinations) = split_od_ids(choices.strs(CHOICE_COLUMN)?)?;
        choices.set_column(s.orig_col_name.clone(), origins)?;
        choices.set_column(s.dest_col_name.clone(), destinations)?;
        Ok(choices)
    }
}
