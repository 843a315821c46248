//! [`NetworkLos`]: the zone system plus the skims it is measured with.

use tracing::info;

use tdm_core::{FileSystem, NetworkSettings, ZoneId, ZoneSystem};

use crate::skims::{SkimDict, load_skims_csv};
use crate::zones::{MazTazCrosswalk, load_maz_taz_csv};
use crate::{LosError, LosResult};

/// Level-of-service data for one model region.
///
/// Skims are always TAZ-level.  In a two-zone system model zones are MAZs
/// and every skim lookup maps both ends through the crosswalk first.
#[derive(Clone, Debug)]
pub struct NetworkLos {
    pub zone_system: ZoneSystem,
    taz_skims:       SkimDict,
    crosswalk:       Option<MazTazCrosswalk>,
}

impl NetworkLos {
    pub fn new(zone_system: ZoneSystem, taz_skims: SkimDict, crosswalk: Option<MazTazCrosswalk>) -> LosResult<Self> {
        if zone_system == ZoneSystem::TwoZone && crosswalk.is_none() {
            return Err(LosError::MissingCrosswalk);
        }
        Ok(Self { zone_system, taz_skims, crosswalk })
    }

    /// Load skims and crosswalk named by `settings` from the data directories.
    pub fn load(settings: &NetworkSettings, fs: &FileSystem) -> LosResult<Self> {
        let skims = load_skims_csv(&fs.get_data_file_path(&settings.taz_skims)?)?;
        let crosswalk = match (&settings.maz, settings.zone_system) {
            (Some(file), ZoneSystem::TwoZone) => Some(load_maz_taz_csv(&fs.get_data_file_path(file)?)?),
            _ => None,
        };
        let los = Self::new(settings.zone_system, skims, crosswalk)?;
        info!(zone_system = ?los.zone_system, "network LOS ready");
        Ok(los)
    }

    pub fn is_two_zone(&self) -> bool {
        self.zone_system == ZoneSystem::TwoZone
    }

    pub fn crosswalk(&self) -> Option<&MazTazCrosswalk> {
        self.crosswalk.as_ref()
    }

    /// TAZ containing `zone`.  Identity in a one-zone system.
    #[inline]
    pub fn map_maz_to_taz(&self, zone: ZoneId) -> LosResult<ZoneId> {
        match &self.crosswalk {
            Some(xwalk) if self.zone_system == ZoneSystem::TwoZone => xwalk.taz_of(zone),
            _ => Ok(zone),
        }
    }

    /// The TAZ skim dictionary, addressed by TAZ ids.
    pub fn taz_skim_dict(&self) -> &SkimDict {
        &self.taz_skims
    }

    /// Skim lookup addressed by model zones (MAZs in a two-zone system).
    pub fn skim(&self, name: &str, o: ZoneId, d: ZoneId) -> LosResult<f64> {
        self.skim_view(name)?.get(o, d)
    }

    /// Resolve `name` once for repeated lookups.
    pub fn skim_view(&self, name: &str) -> LosResult<SkimView<'_>> {
        Ok(SkimView { los: self, skim: self.taz_skims.skim_index(name)?, map_zones: true })
    }

    /// Like [`skim_view`](Self::skim_view) but addressed by TAZ ids directly.
    pub fn taz_skim_view(&self, name: &str) -> LosResult<SkimView<'_>> {
        Ok(SkimView { los: self, skim: self.taz_skims.skim_index(name)?, map_zones: false })
    }
}

/// One skim of a [`NetworkLos`], resolved by name.
#[derive(Copy, Clone)]
pub struct SkimView<'a> {
    los:       &'a NetworkLos,
    skim:      usize,
    map_zones: bool,
}

impl SkimView<'_> {
    #[inline]
    pub fn get(&self, o: ZoneId, d: ZoneId) -> LosResult<f64> {
        let (o, d) = if self.map_zones {
            (self.los.map_maz_to_taz(o)?, self.los.map_maz_to_taz(d)?)
        } else {
            (o, d)
        };
        self.los.taz_skims.get_at(self.skim, o, d)
    }
}
