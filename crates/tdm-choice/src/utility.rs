//! Binding compiled terms to chooser, alternative, and skim data.

use std::collections::BTreeMap;

use tdm_core::{Column, Table, ZoneId};
use tdm_los::{NetworkLos, SkimView};

use crate::expr::{Env, Expr, Resolver, Slot};
use crate::spec::{Constants, Term};
use crate::{ChoiceError, ChoiceResult};

/// Which table a zone id for skim lookups comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZoneSource {
    Chooser(String),
    Alt(String),
    /// The alternatives' index.
    AltIndex,
}

/// Where `skim.NAME` lookups find their zones.
#[derive(Clone)]
pub struct SkimContext<'a> {
    pub los:       &'a NetworkLos,
    pub orig:      ZoneSource,
    pub dest:      ZoneSource,
    /// Zones are TAZ ids already; skip the MAZ → TAZ mapping.
    pub taz_level: bool,
}

impl<'a> SkimContext<'a> {
    pub fn new(los: &'a NetworkLos, orig: ZoneSource, dest: ZoneSource) -> Self {
        Self { los, orig, dest, taz_level: false }
    }

    pub fn taz_level(mut self, taz_level: bool) -> Self {
        self.taz_level = taz_level;
        self
    }
}

// ── Bound data ────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    Chooser,
    Alt,
}

struct NumVar {
    side:   Side,
    values: Vec<f64>,
}

struct TextVar<'a> {
    side:   Side,
    values: &'a [String],
}

struct ZoneVar {
    side:   Side,
    values: Vec<i64>,
}

impl ZoneVar {
    fn bind(source: &ZoneSource, choosers: &Table, alts: &Table) -> ChoiceResult<Self> {
        let ints = |t: &Table, name: &str| -> ChoiceResult<Vec<i64>> {
            Ok(match t.require(name)? {
                Column::Int(v) => v.clone(),
                _ => t.numeric(name)?.into_iter().map(|x| x as i64).collect(),
            })
        };
        Ok(match source {
            ZoneSource::Chooser(col) => ZoneVar { side: Side::Chooser, values: ints(choosers, col)? },
            ZoneSource::Alt(col) => ZoneVar { side: Side::Alt, values: ints(alts, col)? },
            ZoneSource::AltIndex => ZoneVar { side: Side::Alt, values: alts.index().to_vec() },
        })
    }

    #[inline]
    fn at(&self, chooser: usize, alt: usize) -> ZoneId {
        ZoneId(match self.side {
            Side::Chooser => self.values[chooser],
            Side::Alt => self.values[alt],
        })
    }
}

/// Compiled utility terms bound to one chooser table and one alternatives
/// table.
///
/// Every referenced column is copied out once as a dense vector, so
/// evaluation is a walk over the term trees with positional lookups.
pub struct UtilityEvaluator<'a> {
    terms:  Vec<(Expr, f64)>,
    nums:   Vec<NumVar>,
    texts:  Vec<TextVar<'a>>,
    skims:  Vec<SkimView<'a>>,
    zones:  Option<(ZoneVar, ZoneVar)>,
}

struct Binder<'a, 'b> {
    choosers:  &'a Table,
    alts:      &'a Table,
    constants: Option<&'b Constants>,
    los:       Option<(&'a NetworkLos, bool)>,
    seen:      BTreeMap<String, Slot>,
    nums:      Vec<NumVar>,
    texts:     Vec<TextVar<'a>>,
    skims:     Vec<SkimView<'a>>,
    error:     Option<ChoiceError>,
}

impl<'a> Binder<'a, '_> {
    fn column(&mut self, side: Side, name: &str) -> Option<Slot> {
        let table = match side {
            Side::Chooser => self.choosers,
            Side::Alt => self.alts,
        };
        let Some(col) = table.column(name) else {
            if name != table.index_name() || name.is_empty() {
                return None;
            }
            self.nums.push(NumVar { side, values: table.index().iter().map(|&id| id as f64).collect() });
            return Some(Slot::Num(self.nums.len() - 1));
        };
        match col {
            Column::Str(values) => {
                self.texts.push(TextVar { side, values });
                Some(Slot::Text(self.texts.len() - 1))
            }
            col => {
                self.nums.push(NumVar { side, values: col.to_f64()? });
                Some(Slot::Num(self.nums.len() - 1))
            }
        }
    }

    fn skim(&mut self, name: &str) -> Option<Slot> {
        let (los, taz_level) = self.los?;
        let view = if taz_level { los.taz_skim_view(name) } else { los.skim_view(name) };
        match view {
            Ok(view) => {
                self.skims.push(view);
                Some(Slot::Skim(self.skims.len() - 1))
            }
            Err(e) => {
                self.error.get_or_insert(e.into());
                None
            }
        }
    }

    fn lookup(&mut self, name: &str) -> Option<Slot> {
        if let Some(col) = name.strip_prefix("chooser.") {
            return self.column(Side::Chooser, col);
        }
        if let Some(col) = name.strip_prefix("alt.") {
            return self.column(Side::Alt, col);
        }
        if let Some(skim) = name.strip_prefix("skim.") {
            return self.skim(skim);
        }
        if let Some(v) = self.constants.and_then(|c| c.get(name)) {
            return Some(Slot::Const(*v));
        }
        self.column(Side::Alt, name).or_else(|| self.column(Side::Chooser, name))
    }
}

impl Resolver for Binder<'_, '_> {
    fn resolve(&mut self, name: &str) -> Option<Slot> {
        if let Some(slot) = self.seen.get(name) {
            return Some(*slot);
        }
        let slot = self.lookup(name)?;
        self.seen.insert(name.to_owned(), slot);
        Some(slot)
    }
}

impl<'a> UtilityEvaluator<'a> {
    /// Compile `terms` against `choosers` and `alts`.
    ///
    /// Terms with a zero coefficient are dropped before compiling, so they
    /// may reference names the tables do not carry.
    pub fn new(
        terms:     &[Term],
        choosers:  &'a Table,
        alts:      &'a Table,
        constants: Option<&Constants>,
        skims:     Option<&SkimContext<'a>>,
    ) -> ChoiceResult<Self> {
        let mut binder = Binder {
            choosers,
            alts,
            constants,
            los: skims.map(|s| (s.los, s.taz_level)),
            seen: BTreeMap::new(),
            nums: Vec::new(),
            texts: Vec::new(),
            skims: Vec::new(),
            error: None,
        };
        let mut compiled = Vec::with_capacity(terms.len());
        for term in terms.iter().filter(|t| t.coefficient != 0.0) {
            match Expr::compile(&term.expression, &mut binder) {
                Ok(expr) => compiled.push((expr, term.coefficient)),
                Err(e) => return Err(binder.error.take().unwrap_or(e)),
            }
        }
        let zones = match skims {
            Some(ctx) if !binder.skims.is_empty() => Some((
                ZoneVar::bind(&ctx.orig, choosers, alts)?,
                ZoneVar::bind(&ctx.dest, choosers, alts)?,
            )),
            _ => None,
        };
        Ok(Self { terms: compiled, nums: binder.nums, texts: binder.texts, skims: binder.skims, zones })
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Utility of alternative row `alt` for chooser row `chooser`.
    ///
    /// `chooser_id` only labels errors.
    pub fn utility(&self, chooser: usize, alt: usize, chooser_id: i64) -> ChoiceResult<f64> {
        let env = RowEnv { eval: self, chooser, alt };
        let mut total = 0.0;
        for (expr, coef) in &self.terms {
            total += coef * expr.eval(&env)?;
        }
        if total.is_nan() {
            return Err(ChoiceError::InvalidUtility { chooser: chooser_id });
        }
        Ok(total)
    }

    /// Utilities of `alts` (alternative rows) for one chooser.
    pub fn utilities_into(
        &self,
        chooser: usize,
        alts: impl Iterator<Item = usize>,
        chooser_id: i64,
        out: &mut Vec<f64>,
    ) -> ChoiceResult<()> {
        out.clear();
        for alt in alts {
            out.push(self.utility(chooser, alt, chooser_id)?);
        }
        Ok(())
    }
}

struct RowEnv<'e, 'a> {
    eval:    &'e UtilityEvaluator<'a>,
    chooser: usize,
    alt:     usize,
}

impl RowEnv<'_, '_> {
    #[inline]
    fn row(&self, side: Side) -> usize {
        match side {
            Side::Chooser => self.chooser,
            Side::Alt => self.alt,
        }
    }
}

impl Env for RowEnv<'_, '_> {
    fn num(&self, slot: usize) -> f64 {
        let var = &self.eval.nums[slot];
        var.values[self.row(var.side)]
    }

    fn text(&self, slot: usize) -> &str {
        let var = &self.eval.texts[slot];
        &var.values[self.row(var.side)]
    }

    fn skim(&self, slot: usize) -> ChoiceResult<f64> {
        // Skim slots exist only when a skim context was given.
        let Some((orig, dest)) = &self.eval.zones else {
            return Ok(f64::NAN);
        };
        let o = orig.at(self.chooser, self.alt);
        let d = dest.at(self.chooser, self.alt);
        Ok(self.eval.skims[slot].get(o, d)?)
    }
}
