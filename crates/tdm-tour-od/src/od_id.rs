//! `"{origin}_{destination}"` alternative ids.

use std::fmt;
use std::str::FromStr;

use tdm_core::ZoneId;

use crate::{OdError, OdResult};

/// One origin-destination pair, written `"{origin}_{destination}"`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OdId {
    pub origin:      ZoneId,
    pub destination: ZoneId,
}

impl OdId {
    pub fn new(origin: impl Into<ZoneId>, destination: impl Into<ZoneId>) -> Self {
        Self { origin: origin.into(), destination: destination.into() }
    }
}

impl fmt::Display for OdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.origin, self.destination)
    }
}

impl FromStr for OdId {
    type Err = OdError;

    fn from_str(s: &str) -> OdResult<Self> {
        let bad = || OdError::BadOdId(s.to_owned());
        let (o, d) = s.split_once('_').ok_or_else(bad)?;
        Ok(Self::new(o.parse::<i64>().map_err(|_| bad())?, d.parse::<i64>().map_err(|_| bad())?))
    }
}

/// Column name of the OD id built from `origin_col` and `dest_col`.
pub fn od_id_col(origin_col: &str, dest_col: &str) -> String {
    format!("{origin_col}_{dest_col}")
}

/// OD id strings for paired origin and destination columns.
pub fn make_od_ids(origins: &[i64], destinations: &[i64]) -> Vec<String> {
    origins.iter().zip(destinations).map(|(&o, &d)| OdId::new(o, d).to_string()).collect()
}

/// Split OD id strings back into origin and destination columns.
pub fn split_od_ids(ids: &[String]) -> OdResult<(Vec<i64>, Vec<i64>)> {
    let mut origins = Vec::with_capacity(ids.len());
    let mut destinations = Vec::with_capacity(ids.len());
    for id in ids {
        let od: OdId = id.parse()?;
        origins.push(od.origin.0);
        destinations.push(od.destination.0);
    }
    Ok((origins, destinations))
}
