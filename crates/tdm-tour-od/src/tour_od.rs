//! Segment loop and the `tour_od_choice` step.

use std::collections::HashSet;

use tracing::{info, info_span};

use tdm_choice::{CHOICE_COLUMN, Coefficients, LOGSUM_COLUMN, UtilitySpec, load_coefficients_csv, load_spec_csv};
use tdm_core::{Column, DType, FileSystem, Table};
use tdm_los::NetworkLos;
use tdm_state::{Axis, State, StateError, StateResult, Step, StepInputs};

use crate::logsums::{LogsumModels, run_od_logsums};
use crate::sample::{OdSampler, run_od_sample};
use crate::settings::{OriginScheme, TourOdSettings};
use crate::simulate::OdSimulator;
use crate::size_terms::{SizeTermCalculator, SizeTermCoefficients, load_size_terms_csv};
use crate::{OdError, OdResult};

/// Random channel of the tour choosers.
pub const TOURS_CHANNEL: &str = "tours";

/// Person columns merged onto tours before sampling, when present.
const PERSON_COLUMNS: [&str; 2] = ["is_university", "demographic_segment"];

/// Everything `tour_od_choice` reads from its config files.
#[derive(Clone, Debug)]
pub struct TourOdModel {
    pub settings:     TourOdSettings,
    pub sample_spec:  UtilitySpec,
    pub spec:         UtilitySpec,
    pub coefficients: Option<Coefficients>,
    pub size_terms:   SizeTermCoefficients,
    pub logsums:      LogsumModels,
}

impl TourOdModel {
    /// Read `<name>.toml` and every file it names from the config dirs.
    pub fn load(fs: &FileSystem, name: &str) -> OdResult<Self> {
        let settings: TourOdSettings = fs.read_model_settings(name)?;
        settings.origin_scheme()?;
        let coefficients = match settings.coefficients.as_deref() {
            Some(file) => Some(load_coefficients_csv(&fs.get_config_file_path(file)?)?),
            None => None,
        };
        Ok(Self {
            sample_spec: load_spec_csv(&fs.get_config_file_path(&settings.sample_spec)?)?,
            spec: load_spec_csv(&fs.get_config_file_path(&settings.spec)?)?,
            size_terms: load_size_terms_csv(&fs.get_config_file_path(&settings.size_terms)?)?,
            logsums: LogsumModels::load(fs, &settings.logsum_settings)?,
            coefficients,
            settings,
        })
    }
}

/// Run-level switches taken from the global settings.
#[derive(Copy, Clone, Debug, Default)]
pub struct TourOdOptions {
    pub want_logsums:      bool,
    pub want_sample_table: bool,
    pub presample:         bool,
    pub sample_disabled:   bool,
    pub chunk_size:        usize,
}

/// Tours of `segment`, with person attributes merged in.
fn segment_choosers(
    tours: &Table,
    persons: Option<&Table>,
    segment_col: &str,
    segment: &str,
) -> OdResult<Table> {
    let mask: Vec<bool> = tours.strs(segment_col)?.iter().map(|s| s == segment).collect();
    let choosers = tours.filter(&mask);
    let Some(persons) = persons else {
        return Ok(choosers);
    };
    if !choosers.has_column("person_id") {
        return Ok(choosers);
    }
    let positions = persons.positions()?;
    let rows = choosers
        .ints("person_id")?
        .iter()
        .map(|p| positions.get(p).copied().ok_or_else(|| OdError::MissingRow { table: "persons".into(), id: *p }))
        .collect::<OdResult<Vec<usize>>>()?;
    let mut choosers = choosers;
    for col in PERSON_COLUMNS {
        if persons.has_column(col) && !choosers.has_column(col) {
            choosers.set_column(col, persons.require(col)?.take(&rows))?;
        }
    }
    Ok(choosers)
}

/// Remap sampled origins for the external-TAZ origin scheme.
pub(crate) fn remap_external_origins(od_sample: &mut Table, land_use: &Table, orig_col: &str) -> OdResult<()> {
    let positions = land_use.positions()?;
    let external = land_use
        .numeric(OriginScheme::EXTERNAL_MAZ_COLUMN)
        .map_err(|_| OdError::UnknownLandUseColumn(OriginScheme::EXTERNAL_MAZ_COLUMN.into()))?;
    let remapped = od_sample
        .ints(orig_col)?
        .iter()
        .map(|o| {
            positions
                .get(o)
                .map(|&p| external[p] as i64)
                .ok_or(OdError::MissingZone { what: "land use", zone: *o })
        })
        .collect::<OdResult<Vec<i64>>>()?;
    od_sample.set_column(orig_col, remapped)?;
    Ok(())
}

/// Choose an OD pair for every tour whose segment is listed in `SEGMENTS`.
///
/// Segments run in order; a segment without tours is skipped.  Returns the
/// concatenated choices (indexed by tour) and, when requested, the
/// concatenated logsum-annotated samples.
pub fn run_tour_od(
    state: &mut State,
    model: &TourOdModel,
    tours: &Table,
    persons: Option<&Table>,
    land_use: &Table,
    los: &NetworkLos,
    options: TourOdOptions,
) -> OdResult<(Table, Option<Table>)> {
    let s = &model.settings;
    let scheme = s.origin_scheme()?;
    let calculator = SizeTermCalculator::new(land_use, &model.size_terms, &s.size_term_selector)?;
    let sample_size = if options.sample_disabled { 0 } else { s.sample_size };
    let tours = if tours.is_monotonic_increasing() { tours.clone() } else { tours.sort_index() };

    let mut choices_list = Vec::new();
    let mut sample_list = Vec::new();
    for segment in &s.segments {
        let _span = info_span!("segment", name = segment.as_str()).entered();
        let choosers = segment_choosers(&tours, persons, &s.chooser_segment_column_name, segment)?;
        let dest_size_terms = calculator.dest_size_terms_df(segment, "tour_od_choice")?;
        if choosers.is_empty() {
            info!(segment = segment.as_str(), "skipping segment: no choosers");
            continue;
        }
        info!(segment = segment.as_str(), tours = choosers.len(), "tour od segment");

        let sample_terms = model.sample_spec.terms(segment, model.coefficients.as_ref())?;
        let sampler = OdSampler {
            settings: s,
            terms: &sample_terms,
            los,
            land_use,
            sample_size,
            chunk_size: options.chunk_size,
        };
        let presample = options.presample && los.is_two_zone();
        let mut od_sample =
            run_od_sample(state.rng_mut(), TOURS_CHANNEL, &sampler, &choosers, &dest_size_terms, presample)?;

        if scheme == OriginScheme::ExternalTaz {
            remap_external_origins(&mut od_sample, land_use, &s.orig_col_name)?;
        }

        let od_sample = run_od_logsums(state, s, &model.logsums, &choosers, od_sample, los)?;

        let terms = model.spec.terms(segment, model.coefficients.as_ref())?;
        let simulator = OdSimulator {
            settings: s,
            terms: &terms,
            los,
            land_use,
            dest_size_terms: &dest_size_terms,
            chunk_size: options.chunk_size,
        };
        let choices = simulator.run(state.rng_mut(), TOURS_CHANNEL, &choosers, od_sample.clone(), options.want_logsums)?;
        choices_list.push(choices);

        if options.want_sample_table {
            let mut saved = od_sample;
            if s.alt_dest_col_name != s.dest_col_name {
                saved.rename_column(&s.dest_col_name, s.alt_dest_col_name.clone())?;
            }
            sample_list.push(saved);
        }
    }

    let choices = Table::concat(choices_list)?;
    let samples = if sample_list.is_empty() { None } else { Some(Table::concat(sample_list)?) };
    Ok((choices, samples))
}

/// `choices` re-indexed to `tours`; tours without a choice get missing
/// values.
pub(crate) fn align_to_tours(mut choices: Table, tours: &Table) -> OdResult<Table> {
    if choices.index_name().is_empty() {
        choices.set_index_name(tours.index_name());
    }
    let chosen: HashSet<i64> = choices.index().iter().copied().collect();
    let rest: Vec<i64> = tours.index().iter().copied().filter(|id| !chosen.contains(id)).collect();
    if !rest.is_empty() {
        choices.extend_rows(Table::new(tours.index_name(), rest))?;
    }
    let positions = choices.positions()?;
    let rows: Vec<usize> = tours.index().iter().filter_map(|id| positions.get(id).copied()).collect();
    Ok(choices.take(&rows))
}

// ── Step ──────────────────────────────────────────────────────────────────────

/// The `tour_od_choice` model step.
///
/// Reads `tours`, `land_use`, the `network_los` object, and `persons` when
/// available.  Writes the choice, origin, and destination columns (and the
/// logsum column when configured) onto `tours`, and extends the sample
/// table when sample tables are wanted.
#[derive(Clone, Debug)]
pub struct TourOdChoice {
    name:          String,
    settings_file: String,
}

impl Default for TourOdChoice {
    fn default() -> Self {
        Self { name: "tour_od_choice".into(), settings_file: "tour_od_choice".into() }
    }
}

impl TourOdChoice {
    /// A step named `name` reading `<settings_file>.toml`.
    pub fn new(name: impl Into<String>, settings_file: impl Into<String>) -> Self {
        Self { name: name.into(), settings_file: settings_file.into() }
    }

    fn execute(&self, state: &mut State, inputs: &StepInputs) -> OdResult<()> {
        let tours = inputs.table("tours")?;
        let land_use = inputs.table("land_use")?;
        let los = inputs.get::<NetworkLos>("network_los")?;
        let persons = if state.is_table("persons") || state.registry().table_loader("persons").is_some() {
            Some(state.get_dataframe_shared("persons")?)
        } else {
            None
        };

        let model = TourOdModel::load(state.filesystem()?, &self.settings_file)?;
        let s = &model.settings;
        let global = state.settings()?;
        let sample_table_name = s.dest_choice_sample_table_name.clone().filter(|_| global.want_dest_choice_sample_tables);
        let options = TourOdOptions {
            want_logsums: s.dest_choice_logsum_column_name.is_some(),
            want_sample_table: sample_table_name.is_some(),
            presample: global.want_dest_choice_presampling,
            sample_disabled: global.disable_destination_sampling,
            chunk_size: global.chunk_size,
        };
        state.ensure_channel(TOURS_CHANNEL)?;

        let (choices, sample) = run_tour_od(state, &model, &tours, persons.as_deref(), &land_use, &los, options)?;
        let choices = align_to_tours(choices, &tours)?;

        let mut tours = Table::clone(&tours);
        // Every segment may have been skipped, leaving no choice columns.
        let n_tours = tours.len();
        let take = |name: &str, dtype: DType| {
            choices.column(name).cloned().unwrap_or_else(|| Column::missing(dtype, n_tours))
        };
        tours.set_column(s.dest_choice_column_name.clone(), take(CHOICE_COLUMN, DType::Str))?;
        tours.set_column(s.orig_col_name.clone(), take(&s.orig_col_name, DType::Int))?;
        tours.set_column(s.dest_col_name.clone(), take(&s.dest_col_name, DType::Int))?;
        if let Some(col) = &s.dest_choice_logsum_column_name {
            tours.set_column(col.clone(), take(LOGSUM_COLUMN, DType::Float))?;
        }
        info!(tours = tours.len(), "tour od choices assigned");
        state.add_table("tours", tours, None);

        if let (Some(name), Some(sample)) = (sample_table_name, sample) {
            state.extend_table(&name, sample, Axis::Rows)?;
        }
        Ok(())
    }
}

impl Step for TourOdChoice {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[&str] {
        &["tours", "land_use", "network_los"]
    }

    fn run(&self, state: &mut State, inputs: &StepInputs) -> StateResult<()> {
        self.execute(state, inputs).map_err(|e| match e {
            OdError::State(inner) => inner,
            other => StateError::model(&self.name, other),
        })
    }
}
