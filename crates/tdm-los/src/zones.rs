//! MAZ → TAZ crosswalk for two-zone systems.
//!
//! # CSV format
//!
//! ```csv
//! MAZ,TAZ
//! 101,1
//! 102,1
//! 201,2
//! ```

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use tdm_core::{IdMap, ZoneId};

use crate::{LosError, LosResult};

#[derive(Deserialize)]
struct CrosswalkRecord {
    #[serde(rename = "MAZ")]
    maz: i64,
    #[serde(rename = "TAZ")]
    taz: i64,
}

/// Parent TAZ of every MAZ.
#[derive(Clone, Debug, Default)]
pub struct MazTazCrosswalk {
    maz_to_taz: IdMap<ZoneId, ZoneId>,
    /// MAZs in file order.
    mazs:       Vec<ZoneId>,
}

impl MazTazCrosswalk {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ZoneId, ZoneId)>) -> LosResult<Self> {
        let mut out = Self::default();
        for (maz, taz) in pairs {
            if out.maz_to_taz.insert(maz, taz).is_some() {
                return Err(LosError::DuplicateMaz(maz));
            }
            out.mazs.push(maz);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.mazs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mazs.is_empty()
    }

    pub fn mazs(&self) -> &[ZoneId] {
        &self.mazs
    }

    #[inline]
    pub fn taz_of(&self, maz: ZoneId) -> LosResult<ZoneId> {
        self.maz_to_taz.get(&maz).copied().ok_or(LosError::UnknownMaz(maz))
    }
}

pub fn load_maz_taz_csv(path: &Path) -> LosResult<MazTazCrosswalk> {
    let xwalk = load_maz_taz_reader(std::fs::File::open(path)?)?;
    info!(path = %path.display(), mazs = xwalk.len(), "MAZ→TAZ crosswalk loaded");
    Ok(xwalk)
}

/// Like [`load_maz_taz_csv`] but accepts any `Read` source.
pub fn load_maz_taz_reader<R: Read>(reader: R) -> LosResult<MazTazCrosswalk> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut pairs = Vec::new();
    for row in rdr.deserialize::<CrosswalkRecord>() {
        let row = row?;
        pairs.push((ZoneId(row.maz), ZoneId(row.taz)));
    }
    MazTazCrosswalk::from_pairs(pairs)
}
