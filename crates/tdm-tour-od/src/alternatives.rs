//! Origin-destination alternatives: the cross product of candidate origins
//! with destinations that have a size term.

use tracing::debug;

use tdm_choice::{Term, UtilityEvaluator};
use tdm_core::{Column, Table};

use crate::od_id::make_od_ids;
use crate::size_terms::SIZE_TERM;
use crate::{OdError, OdResult};

/// Column names used when building OD alternatives.
#[derive(Clone, Debug)]
pub struct OdColumns<'a> {
    pub origin:      &'a str,
    pub destination: &'a str,
    /// String id column, `"{origin}_{destination}"`.
    pub od_id:       &'a str,
}

/// Land use rows whose `filter` expression evaluates non-zero.
///
/// The expression sees land use columns by bare name and the land use index
/// by its index name.
pub fn filter_origins(land_use: &Table, filter: Option<&str>) -> OdResult<Vec<usize>> {
    let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
        return Ok((0..land_use.len()).collect());
    };
    let term = Term { label: "ORIG_FILTER".into(), expression: filter.to_owned(), coefficient: 1.0 };
    let eval = UtilityEvaluator::new(std::slice::from_ref(&term), land_use, land_use, None, None)?;
    let mut keep = Vec::new();
    for (row, &zone) in land_use.index().iter().enumerate() {
        if eval.utility(row, row, zone)? != 0.0 {
            keep.push(row);
        }
    }
    debug!(filter, origins = keep.len(), of = land_use.len(), "filtered origins");
    Ok(keep)
}

/// Build OD alternatives from destination size terms.
///
/// Rows are destination-major: every origin for the first destination, then
/// every origin for the second, and so on.  The result has a positional
/// index and carries the destination and origin ids, `size_term`, the OD id,
/// and `origin_attr_cols` copied from the origin's land use row.
pub fn create_od_alts(
    dest_size_terms: &Table,
    land_use: &Table,
    cols: &OdColumns<'_>,
    origin_filter: Option<&str>,
    origin_attr_cols: &[String],
) -> OdResult<Table> {
    let origin_rows = filter_origins(land_use, origin_filter)?;
    if origin_rows.is_empty() {
        return Err(OdError::Config(format!(
            "origin filter '{}' selects no land use zones",
            origin_filter.unwrap_or_default()
        )));
    }
    let sizes = dest_size_terms.floats(SIZE_TERM)?;
    let n = dest_size_terms.len() * origin_rows.len();

    let mut dest_rows = Vec::with_capacity(n);
    let mut orig_rows = Vec::with_capacity(n);
    for d in 0..dest_size_terms.len() {
        for &o in &origin_rows {
            dest_rows.push(d);
            orig_rows.push(o);
        }
    }
    let dests: Vec<i64> = dest_rows.iter().map(|&d| dest_size_terms.index()[d]).collect();
    let origins: Vec<i64> = orig_rows.iter().map(|&o| land_use.index()[o]).collect();
    let od_ids = make_od_ids(&origins, &dests);
    let size: Vec<f64> = dest_rows.iter().map(|&d| sizes[d]).collect();

    let mut alts = Table::new("", (0..n as i64).collect())
        .with_column(cols.destination, dests)?
        .with_column(SIZE_TERM, size)?
        .with_column(cols.origin, origins)?
        .with_column(cols.od_id, od_ids)?;
    for attr in origin_attr_cols {
        let col: &Column = land_use.require(attr)?;
        alts.set_column(attr.clone(), col.take(&orig_rows))?;
    }
    debug!(
        destinations = dest_size_terms.len(),
        origins = origin_rows.len(),
        alternatives = alts.len(),
        "created OD alternatives"
    );
    Ok(alts)
}
