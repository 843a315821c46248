//! Unit tests for tdm-los.

use std::io::Cursor;

use tdm_core::{ZoneId, ZoneSystem};

use crate::{LosError, MazTazCrosswalk, NetworkLos, SkimDictBuilder, load_maz_taz_reader, load_skims_reader};

const SKIMS_CSV: &str = "\
origin,destination,DIST,SOV_TIME
1,1,0.5,2
1,2,3.0,8
2,1,3.5,9
2,2,0.25,1.5
";

fn z(n: i64) -> ZoneId {
    ZoneId(n)
}

#[cfg(test)]
mod skims {
    use super::*;

    #[test]
    fn load_long_format() {
        let dict = load_skims_reader(Cursor::new(SKIMS_CSV)).unwrap();
        assert_eq!(dict.zone_ids, [z(1), z(2)]);
        assert_eq!(dict.skim_names().collect::<Vec<_>>(), ["DIST", "SOV_TIME"]);
        assert_eq!(dict.get("DIST", z(1), z(2)).unwrap(), 3.0);
        assert_eq!(dict.get("SOV_TIME", z(2), z(1)).unwrap(), 9.0);
    }

    #[test]
    fn sparse_pairs_read_as_zero() {
        let dict = load_skims_reader(Cursor::new("origin,destination,DIST\n1,2,4\n")).unwrap();
        assert_eq!(dict.get("DIST", z(2), z(1)).unwrap(), 0.0);
        assert_eq!(dict.get("DIST", z(1), z(2)).unwrap(), 4.0);
    }

    #[test]
    fn unknown_zone_and_skim() {
        let dict = load_skims_reader(Cursor::new(SKIMS_CSV)).unwrap();
        assert!(matches!(dict.get("DIST", z(9), z(1)), Err(LosError::UnknownZone(ZoneId(9)))));
        assert!(matches!(dict.get("WALK", z(1), z(1)), Err(LosError::UnknownSkim(_))));
    }

    #[test]
    fn header_without_skims_rejected() {
        assert!(matches!(load_skims_reader(Cursor::new("origin,destination\n1,1\n")), Err(LosError::NoSkims)));
    }

    #[test]
    fn builder_shapes() {
        let zones = vec![z(10), z(11), z(12)];
        assert!(matches!(
            SkimDictBuilder::new(zones.clone()).matrix("DIST", vec![0.0; 4]),
            Err(LosError::ShapeMismatch { expected: 9, got: 4, .. })
        ));
        let dict = SkimDictBuilder::new(zones)
            .skim_fn("DIST", |o, d| (o.0 - d.0).abs() as f32)
            .build()
            .unwrap();
        assert_eq!(dict.get("DIST", z(10), z(12)).unwrap(), 2.0);
    }

    #[test]
    fn duplicate_zone_rejected() {
        assert!(SkimDictBuilder::new(vec![z(1), z(1)]).build().is_err());
    }
}

#[cfg(test)]
mod zones {
    use super::*;

    #[test]
    fn crosswalk_csv() {
        let x = load_maz_taz_reader(Cursor::new("MAZ,TAZ\n101,1\n102,1\n201,2\n")).unwrap();
        assert_eq!(x.len(), 3);
        assert_eq!(x.taz_of(z(102)).unwrap(), z(1));
        assert!(matches!(x.taz_of(z(999)), Err(LosError::UnknownMaz(_))));
    }

    #[test]
    fn duplicate_maz_rejected() {
        let err = MazTazCrosswalk::from_pairs([(z(1), z(1)), (z(1), z(2))]).unwrap_err();
        assert!(matches!(err, LosError::DuplicateMaz(ZoneId(1))));
    }
}

#[cfg(test)]
mod network {
    use super::*;

    fn two_zone() -> NetworkLos {
        let skims = load_skims_reader(Cursor::new(SKIMS_CSV)).unwrap();
        let xwalk = MazTazCrosswalk::from_pairs([(z(101), z(1)), (z(102), z(1)), (z(201), z(2))]).unwrap();
        NetworkLos::new(ZoneSystem::TwoZone, skims, Some(xwalk)).unwrap()
    }

    #[test]
    fn two_zone_requires_crosswalk() {
        let skims = load_skims_reader(Cursor::new(SKIMS_CSV)).unwrap();
        assert!(matches!(NetworkLos::new(ZoneSystem::TwoZone, skims, None), Err(LosError::MissingCrosswalk)));
    }

    #[test]
    fn maz_lookups_map_through_taz() {
        let los = two_zone();
        assert_eq!(los.map_maz_to_taz(z(201)).unwrap(), z(2));
        assert_eq!(los.skim("DIST", z(102), z(201)).unwrap(), 3.0);
        let view = los.taz_skim_view("SOV_TIME").unwrap();
        assert_eq!(view.get(z(2), z(2)).unwrap(), 1.5);
    }

    #[test]
    fn one_zone_is_identity() {
        let skims = load_skims_reader(Cursor::new(SKIMS_CSV)).unwrap();
        let los = NetworkLos::new(ZoneSystem::OneZone, skims, None).unwrap();
        assert_eq!(los.map_maz_to_taz(z(2)).unwrap(), z(2));
        assert!(!los.is_two_zone());
    }

    #[test]
    fn load_from_settings() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let fs = tdm_core::FileSystem::new(dir.path());
        std::fs::create_dir_all(&fs.data_dir[0]).unwrap();
        std::fs::write(fs.data_dir[0].join("skims.csv"), SKIMS_CSV).unwrap();
        std::fs::write(fs.data_dir[0].join("maz.csv"), "MAZ,TAZ\n101,1\n201,2\n").unwrap();
        let settings = tdm_core::NetworkSettings::from_toml_str(
            "zone_system = 2\ntaz_skims = \"skims.csv\"\nmaz = \"maz.csv\"\n",
        )
        .unwrap();
        let los = NetworkLos::load(&settings, &fs).unwrap();
        assert!(los.is_two_zone());
        assert_eq!(los.skim("DIST", z(201), z(101)).unwrap(), 3.5);
    }
}
