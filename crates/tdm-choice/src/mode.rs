//! Multinomial-logit mode choice: one utility column per mode.

use tracing::debug;

use tdm_core::{Random, Table};

use crate::logit::{logsum, make_choice, utils_to_probs};
use crate::spec::{Coefficients, Constants, UtilitySpec};
use crate::utility::{SkimContext, UtilityEvaluator};
use crate::{ChoiceError, ChoiceResult};

/// Output column of [`ModeChoiceModel::simulate`].
pub const MODE_COLUMN: &str = "mode";

/// A simple-simulate mode choice model.
///
/// Every coefficient column of the spec is one mode.  Expressions see the
/// chooser row under both `chooser.` and `alt.` (and bare names), and skims
/// resolve through the zone columns given by the [`SkimContext`], which
/// should use [`ZoneSource::Chooser`](crate::ZoneSource::Chooser) sources.
#[derive(Clone, Debug)]
pub struct ModeChoiceModel {
    spec:         UtilitySpec,
    coefficients: Coefficients,
    constants:    Constants,
}

impl ModeChoiceModel {
    pub fn new(spec: UtilitySpec, coefficients: Coefficients) -> Self {
        Self { spec, coefficients, constants: Constants::new() }
    }

    pub fn with_constants(mut self, constants: Constants) -> Self {
        self.constants = constants;
        self
    }

    pub fn modes(&self) -> &[String] {
        self.spec.columns()
    }

    fn evaluators<'a>(
        &self,
        choosers: &'a Table,
        skims: Option<&SkimContext<'a>>,
    ) -> ChoiceResult<Vec<UtilityEvaluator<'a>>> {
        self.modes()
            .iter()
            .map(|mode| {
                let terms = self.spec.terms(mode, Some(&self.coefficients))?;
                UtilityEvaluator::new(&terms, choosers, choosers, Some(&self.constants), skims)
            })
            .collect()
    }

    /// Row-major utilities: `modes().len()` values per chooser row.
    pub fn utilities(&self, choosers: &Table, skims: Option<&SkimContext<'_>>) -> ChoiceResult<Vec<f64>> {
        if self.modes().is_empty() {
            return Err(ChoiceError::NoAlternatives);
        }
        let evals = self.evaluators(choosers, skims)?;
        let mut out = Vec::with_capacity(choosers.len() * evals.len());
        for (row, &id) in choosers.index().iter().enumerate() {
            for eval in &evals {
                out.push(eval.utility(row, row, id)?);
            }
        }
        debug!(rows = choosers.len(), modes = evals.len(), "mode utilities");
        Ok(out)
    }

    /// Logsum over modes for each chooser row.  Duplicate chooser ids are
    /// fine here; nothing is drawn.
    pub fn logsums(&self, choosers: &Table, skims: Option<&SkimContext<'_>>) -> ChoiceResult<Vec<f64>> {
        let width = self.modes().len();
        let utils = self.utilities(choosers, skims)?;
        Ok(utils.chunks(width).map(logsum).collect())
    }

    /// Choose one mode per chooser with one draw each from `channel`.
    pub fn simulate(
        &self,
        rng: &mut Random,
        channel: &str,
        choosers: &Table,
        skims: Option<&SkimContext<'_>>,
        want_logsums: bool,
    ) -> ChoiceResult<Table> {
        choosers.ensure_unique_index()?;
        let width = self.modes().len();
        let utils = self.utilities(choosers, skims)?;
        let draws = rng.random_for_df(channel, choosers.index(), 1)?;

        let mut modes = Vec::with_capacity(choosers.len());
        let mut logsums = Vec::new();
        let mut probs = Vec::with_capacity(width);
        for (row, (row_utils, &id)) in utils.chunks(width).zip(choosers.index()).enumerate() {
            utils_to_probs(id, row_utils, &mut probs)?;
            let pick = make_choice(&probs, draws.row(row)[0]).ok_or(ChoiceError::NoAvailableAlternatives { chooser: id })?;
            modes.push(self.modes()[pick].clone());
            if want_logsums {
                logsums.push(logsum(row_utils));
            }
        }

        let mut out = Table::new(choosers.index_name(), choosers.index().to_vec()).with_column(MODE_COLUMN, modes)?;
        if want_logsums {
            out.set_column(crate::LOGSUM_COLUMN, logsums)?;
        }
        Ok(out)
    }
}
