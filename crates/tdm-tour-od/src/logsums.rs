//! Mode-choice logsums for every sampled OD pair.
//!
//! Each sample row is joined with its tour and evaluated by the tour mode
//! choice model; the logsum over modes becomes `tour_mode_choice_logsum`.
//! When the logsum settings ask for it, pseudo trips (one outbound and one
//! inbound per sample row and tour mode) are first run through a trip mode
//! choice model, and the resulting trip logsums are attached as
//! `logsum_{mode}_{outbound|inbound}` columns for the tour model to use.

use std::sync::Arc;

use tracing::{debug, info};

use tdm_choice::{
    Coefficients, LOGSUM_COLUMN, ModeChoiceModel, SkimContext, ZoneSource, load_coefficients_csv, load_spec_csv,
};
use tdm_core::{Column, FileSystem, Table};
use tdm_los::NetworkLos;
use tdm_state::State;

use crate::od_id::{make_od_ids, od_id_col};
use crate::settings::{LogsumSettings, TourOdSettings};
use crate::{OdError, OdResult};

pub const TOUR_MODE_CHOICE_LOGSUM: &str = "tour_mode_choice_logsum";
pub const TRIP_MODE_CHOICE_LOGSUM: &str = "trip_mode_choice_logsum";
pub const TRIPS_TABLE: &str = "trips";

/// The tour mode choice model and, optionally, the trip model feeding it.
#[derive(Clone, Debug)]
pub struct LogsumModels {
    pub settings: LogsumSettings,
    pub tour:     ModeChoiceModel,
    pub trip:     Option<ModeChoiceModel>,
}

fn load_model(fs: &FileSystem, spec: &str, coefficients: Option<&str>) -> OdResult<ModeChoiceModel> {
    let spec = load_spec_csv(&fs.get_config_file_path(spec)?)?;
    let coefficients = match coefficients {
        Some(file) => load_coefficients_csv(&fs.get_config_file_path(file)?)?,
        None => Coefficients::new(),
    };
    Ok(ModeChoiceModel::new(spec, coefficients))
}

impl LogsumModels {
    /// Read `<name>.toml` and the spec files it names.
    pub fn load(fs: &FileSystem, name: &str) -> OdResult<Self> {
        let settings: LogsumSettings = fs.read_model_settings(name)?;
        let tour = load_model(fs, &settings.spec, settings.coefficients.as_deref())?
            .with_constants(settings.constants.clone());
        let trip = match (&settings.trip_mode_choice, settings.compute_trip_mode_choice_logsums) {
            (Some(t), true) => {
                Some(load_model(fs, &t.spec, t.coefficients.as_deref())?.with_constants(t.constants.clone()))
            }
            (None, true) => {
                return Err(OdError::Config(format!(
                    "{name}: COMPUTE_TRIP_MODE_CHOICE_LOGSUMS needs a [TRIP_MODE_CHOICE] section"
                )));
            }
            (_, false) => None,
        };
        Ok(Self { settings, tour, trip })
    }

    pub fn new(settings: LogsumSettings, tour: ModeChoiceModel, trip: Option<ModeChoiceModel>) -> Self {
        Self { settings, tour, trip }
    }
}

/// Left join `right` onto `left` by index.  `left` may repeat ids; every id
/// must exist in `right`.  Columns already in `left` are not overwritten.
pub(crate) fn join_on_index(left: &Table, right: &Table, right_name: &str, columns: &[String]) -> OdResult<Table> {
    let positions = right.positions()?;
    let rows = left
        .index()
        .iter()
        .map(|id| {
            positions.get(id).copied().ok_or_else(|| OdError::MissingRow { table: right_name.to_owned(), id: *id })
        })
        .collect::<OdResult<Vec<usize>>>()?;
    let mut out = left.clone();
    for (name, col) in right.columns() {
        if out.has_column(name) || (!columns.is_empty() && !columns.iter().any(|c| c == name)) {
            continue;
        }
        out.set_column(name, col.take(&rows))?;
    }
    Ok(out)
}

/// Add `tour_mode_choice_logsum` (and trip logsum columns when enabled) to
/// `od_sample`.
pub fn run_od_logsums(
    state: &mut State,
    settings: &TourOdSettings,
    models: &LogsumModels,
    tours: &Table,
    mut od_sample: Table,
    los: &NetworkLos,
) -> OdResult<Table> {
    let (orig, dest) = (settings.orig_col_name.as_str(), settings.dest_col_name.as_str());
    let od_col = od_id_col(orig, dest);

    let mut choosers = join_on_index(&od_sample, tours, "tours", &models.settings.logsum_chooser_columns)?;
    let od_ids = make_od_ids(choosers.ints(orig)?, choosers.ints(dest)?);
    choosers.set_column(od_col.clone(), od_ids)?;
    info!(rows = choosers.len(), "od logsums");

    let skims = SkimContext::new(los, ZoneSource::Chooser(orig.into()), ZoneSource::Chooser(dest.into()));

    if let Some(trip_model) = &models.trip {
        let trips = pseudo_trips(&choosers, settings, models.tour.modes())?;
        let trip_ids = trips.index().to_vec();
        // Every segment re-adds the channel, so its trip ids 0.. repeat the
        // same draws.  Only the logsums are kept, and they do not depend on
        // the draws.
        state.rng_mut().add_channel(TRIPS_TABLE, &trip_ids)?;
        state.add_table(TRIPS_TABLE, trips, None);

        let result = simulate_pseudo_trips(state, trip_model, &skims);
        state.rng_mut().drop_channel(TRIPS_TABLE);
        state.drop_table(TRIPS_TABLE);
        let (trips, chosen) = result?;

        for (name, values) in pivot_trip_logsums(&trips, chosen.floats(LOGSUM_COLUMN)?, choosers.len())? {
            choosers.set_column(name.clone(), values.clone())?;
            od_sample.set_column(name, values)?;
        }
    }

    let logsums = models.tour.logsums(&choosers, Some(&skims))?;
    od_sample.set_column(TOUR_MODE_CHOICE_LOGSUM, logsums)?;
    Ok(od_sample)
}

fn simulate_pseudo_trips(
    state: &mut State,
    model: &ModeChoiceModel,
    skims: &SkimContext<'_>,
) -> OdResult<(Arc<Table>, Table)> {
    let trips = state.get_table(TRIPS_TABLE, None)?;
    let chosen = model.simulate(state.rng_mut(), TRIPS_TABLE, &trips, Some(skims), true)?;
    Ok((trips, chosen))
}

/// Tour purpose for mode choice: university students' school tours are
/// `"univ"`.
fn tour_purpose(tour_type: &str, is_university: bool) -> String {
    if tour_type == "school" && is_university { "univ".into() } else { tour_type.to_owned() }
}

/// Two trips per sample row and tour mode: outbound origin → destination,
/// inbound destination → origin.
///
/// Rows are mode-major, then sample row, then outbound before inbound.  The
/// index is the trip id (`0..`); `unique_id` is the sample row.
fn pseudo_trips(choosers: &Table, settings: &TourOdSettings, tour_modes: &[String]) -> OdResult<Table> {
    let (orig_col, dest_col) = (settings.orig_col_name.as_str(), settings.dest_col_name.as_str());
    let origins = choosers.ints(orig_col)?;
    let destinations = choosers.ints(dest_col)?;
    let n = choosers.len();

    let purposes: Vec<String> = match choosers.column("tour_type") {
        Some(Column::Str(types)) => {
            let univ = choosers.bools("is_university").ok();
            types
                .iter()
                .enumerate()
                .map(|(i, t)| tour_purpose(t, univ.is_some_and(|u| u[i])))
                .collect()
        }
        _ => vec![String::new(); n],
    };
    let times = match (choosers.numeric("start"), choosers.numeric("end")) {
        (Ok(start), Ok(end)) => Some((start, end)),
        _ => None,
    };

    let total = n * 2 * tour_modes.len();
    let mut rows = Vec::with_capacity(total);
    let mut modes = Vec::with_capacity(total);
    let mut outbound = Vec::with_capacity(total);
    let mut trip_orig = Vec::with_capacity(total);
    let mut trip_dest = Vec::with_capacity(total);
    let mut depart = Vec::with_capacity(total);
    for mode in tour_modes {
        for row in 0..n {
            for out in [true, false] {
                rows.push(row);
                modes.push(mode.clone());
                outbound.push(out);
                let (o, d) = if out { (origins[row], destinations[row]) } else { (destinations[row], origins[row]) };
                trip_orig.push(o);
                trip_dest.push(d);
                if let Some((start, end)) = &times {
                    depart.push(if out { start[row] } else { end[row] });
                }
            }
        }
    }

    let tour_ids: Vec<i64> = rows.iter().map(|&r| choosers.index()[r]).collect();
    let purpose: Vec<String> = rows.iter().map(|&r| purposes[r].clone()).collect();
    let mut trips = Table::new("trip_id", (0..total as i64).collect())
        .with_column("unique_id", rows.iter().map(|&r| r as i64).collect::<Vec<_>>())?
        .with_column("tour_id", tour_ids)?
        .with_column("tour_mode", modes)?
        .with_column("outbound", outbound)?
        .with_column(orig_col, trip_orig)?
        .with_column(dest_col, trip_dest)?
        .with_column("tour_destination", rows.iter().map(|&r| destinations[r]).collect::<Vec<_>>())?
        .with_column("tour_purpose", purpose.clone())?
        .with_column("primary_purpose", purpose)?;
    if times.is_some() {
        trips.set_column("depart", depart)?;
    }
    for (name, col) in choosers.columns() {
        if !trips.has_column(name) {
            trips.set_column(name, col.take(&rows))?;
        }
    }
    debug!(trips = trips.len(), modes = tour_modes.len(), "pseudo trips");
    Ok(trips)
}

/// Spread trip logsums into one column per (tour mode, direction), aligned
/// with the sample rows.
fn pivot_trip_logsums(trips: &Table, logsums: &[f64], rows: usize) -> OdResult<Vec<(String, Vec<f64>)>> {
    let unique = trips.ints("unique_id")?;
    let modes = trips.strs("tour_mode")?;
    let outbound = trips.bools("outbound")?;

    let mut columns: Vec<(String, Vec<f64>)> = Vec::new();
    for i in 0..trips.len() {
        let name = format!("logsum_{}_{}", modes[i], if outbound[i] { "outbound" } else { "inbound" });
        let pos = match columns.iter().position(|(n, _)| *n == name) {
            Some(p) => p,
            None => {
                columns.push((name, vec![f64::NAN; rows]));
                columns.len() - 1
            }
        };
        columns[pos].1[unique[i] as usize] = logsums[i];
    }
    Ok(columns)
}
