//! Unit tests for tdm-core primitives.

#[cfg(test)]
mod ids {
    use crate::ZoneId;

    #[test]
    fn display_is_bare_number() {
        assert_eq!(ZoneId(1234).to_string(), "1234");
    }

    #[test]
    fn default_is_invalid() {
        assert!(!ZoneId::default().is_valid());
        assert!(ZoneId(0).is_valid());
    }
}

#[cfg(test)]
mod table {
    use crate::{Column, CoreError, DType, Table};

    fn tours() -> Table {
        Table::new("tour_id", vec![3, 1, 2])
            .with_column("person_id", vec![30i64, 10, 20])
            .unwrap()
            .with_column("tour_type", vec!["work", "school", "shop"])
            .unwrap()
    }

    #[test]
    fn column_length_checked() {
        let err = Table::new("id", vec![1, 2]).with_column("x", vec![1.0]).unwrap_err();
        assert!(matches!(err, CoreError::LengthMismatch { expected: 2, got: 1, .. }));
    }

    #[test]
    fn sort_index_is_stable() {
        let t = Table::new("id", vec![2, 1, 2])
            .with_column("v", vec![0i64, 1, 2])
            .unwrap()
            .sort_index();
        assert_eq!(t.index(), &[1, 2, 2]);
        assert_eq!(t.ints("v").unwrap(), &[1, 0, 2]);
        assert!(t.is_monotonic_increasing());
    }

    #[test]
    fn duplicate_index_detected() {
        let t = Table::new("tour_id", vec![1, 2, 1]);
        assert!(matches!(t.ensure_unique_index(), Err(CoreError::DuplicateIndex { value: 1, .. })));
        assert!(t.positions().is_err());
    }

    #[test]
    fn select_and_filter() {
        let t = tours();
        let s = t.select(&["tour_type"]).unwrap();
        assert_eq!(s.width(), 1);
        let f = t.filter(&[true, false, true]);
        assert_eq!(f.index(), &[3, 2]);
        assert_eq!(f.strs("tour_type").unwrap(), &["work".to_string(), "shop".to_string()]);
        assert!(t.select(&["nope"]).is_err());
    }

    #[test]
    fn typed_access_reports_mismatch() {
        let t = tours();
        let err = t.floats("person_id").unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { expected: "float", found: "int", .. }));
        assert_eq!(t.numeric("person_id").unwrap(), vec![30.0, 10.0, 20.0]);
    }

    #[test]
    fn extend_rows_rejects_overlap() {
        let mut t = tours();
        let more = Table::new("tour_id", vec![2, 9]).with_column("person_id", vec![1i64, 2]).unwrap();
        let err = t.extend_rows(more).unwrap_err();
        assert!(matches!(err, CoreError::OverlappingIndex { count: 1, first: 2 }));
        assert_eq!(t.len(), 3, "failed extend leaves table untouched");
    }

    #[test]
    fn extend_rows_backfills_strings_and_keeps_order() {
        let mut t = tours();
        let more = Table::new("tour_id", vec![7])
            .with_column("person_id", vec![70i64])
            .unwrap()
            .with_column("extra", vec![1.5])
            .unwrap();
        t.extend_rows(more).unwrap();

        let names: Vec<_> = t.column_names().collect();
        assert_eq!(names, ["person_id", "tour_type", "extra"]);
        assert_eq!(t.strs("tour_type").unwrap()[3], "");
        let extra = t.floats("extra").unwrap();
        assert!(extra[0].is_nan() && extra[3] == 1.5);
        assert_eq!(t.ints("person_id").unwrap(), &[30, 10, 20, 70]);
    }

    #[test]
    fn extend_rows_type_mismatch_leaves_table_intact() {
        let mut t = Table::new("id", vec![1])
            .with_column("x", vec![1i64])
            .unwrap()
            .with_column("s", vec!["a"])
            .unwrap();
        let before = t.clone();
        let more = Table::new("id", vec![2, 3])
            .with_column("x", vec![2i64, 3])
            .unwrap()
            .with_column("s", vec![5i64, 6])
            .unwrap();
        let err = t.extend_rows(more).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { ref column, .. } if column == "s"));
        assert_eq!(t, before);
        assert_eq!(t.require("x").unwrap().len(), t.len());
    }

    #[test]
    fn extend_rows_fills_text_gaps_with_empty_strings() {
        let mut t = Table::new("id", vec![1]).with_column("mode", vec!["walk"]).unwrap();
        let more = Table::new("id", vec![2]).with_column("purpose", vec!["work"]).unwrap();
        t.extend_rows(more).unwrap();
        assert_eq!(t.strs("mode").unwrap(), &["walk", ""]);
        assert_eq!(t.strs("purpose").unwrap(), &["", "work"]);
    }

    #[test]
    fn extend_rows_promotes_missing_ints() {
        let mut t = tours();
        let more = Table::new("tour_id", vec![8]).with_column("tour_type", vec!["eat"]).unwrap();
        t.extend_rows(more).unwrap();
        assert_eq!(t.require("person_id").unwrap().dtype(), DType::Float);
        assert!(t.floats("person_id").unwrap()[3].is_nan());
    }

    #[test]
    fn extend_columns_requires_same_index() {
        let mut t = tours();
        let wrong = Table::new("tour_id", vec![1, 2, 3]).with_column("z", vec![0i64; 3]).unwrap();
        assert!(matches!(t.extend_columns(wrong), Err(CoreError::IndexMismatch)));

        let right = Table::new("tour_id", vec![3, 1, 2])
            .with_column("z", vec![0i64; 3])
            .unwrap()
            .with_column("person_id", vec![0i64; 3])
            .unwrap();
        t.extend_columns(right).unwrap();
        assert_eq!(t.width(), 3);
        assert_eq!(t.ints("person_id").unwrap(), &[30, 10, 20], "existing columns are not replaced");
    }

    #[test]
    fn concat_promotes_numeric() {
        let a = Table::new("id", vec![1]).with_column("x", vec![1i64]).unwrap();
        let b = Table::new("id", vec![2]).with_column("x", vec![2.5]).unwrap();
        let c = Table::concat(vec![a, b]).unwrap();
        assert_eq!(c.floats("x").unwrap(), &[1.0, 2.5]);
        assert_eq!(c.index(), &[1, 2]);
    }

    #[test]
    fn set_and_reset_index() {
        let t = tours().set_index("person_id").unwrap();
        assert_eq!(t.index_name(), "person_id");
        assert_eq!(t.index(), &[30, 10, 20]);
        assert!(!t.has_column("person_id"));

        let r = t.reset_index("row");
        assert_eq!(r.index(), &[0, 1, 2]);
        assert_eq!(r.ints("person_id").unwrap(), &[30, 10, 20]);
    }

    #[test]
    fn parse_cells() {
        let mut c = Column::with_capacity(DType::Bool, 2);
        c.push_parsed("True").unwrap();
        c.push_parsed("0").unwrap();
        assert_eq!(c, Column::Bool(vec![true, false]));
        let mut f = Column::with_capacity(DType::Int, 1);
        assert!(f.push_parsed("x").is_err());
    }
}

#[cfg(test)]
mod rng {
    use crate::{CoreError, Random};

    fn seeded() -> Random {
        let mut rng = Random::new(42);
        rng.add_channel("tours", &[1, 2, 3, 4]).unwrap();
        rng
    }

    #[test]
    fn draws_are_in_unit_interval() {
        let mut rng = seeded();
        rng.begin_step("tour_od").unwrap();
        let d = rng.random_for_df("tours", &[1, 2, 3, 4], 50).unwrap();
        assert_eq!(d.rows(), 4);
        assert!(d.as_slice().iter().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn draws_independent_of_row_order_and_subset() {
        let mut a = seeded();
        a.begin_step("s").unwrap();
        let all = a.random_for_df("tours", &[1, 2, 3, 4], 3).unwrap();

        let mut b = seeded();
        b.begin_step("s").unwrap();
        let some = b.random_for_df("tours", &[4, 2], 3).unwrap();

        assert_eq!(some.row(0), all.row(3));
        assert_eq!(some.row(1), all.row(1));
    }

    #[test]
    fn consecutive_calls_advance_the_stream() {
        let mut rng = seeded();
        rng.begin_step("s").unwrap();
        let first = rng.random_for_df("tours", &[1], 2).unwrap();
        let second = rng.random_for_df("tours", &[1], 2).unwrap();
        assert_ne!(first, second);
        assert_eq!(rng.offset("tours", 1), Some(4));

        let mut fresh = seeded();
        fresh.begin_step("s").unwrap();
        let four = fresh.random_for_df("tours", &[1], 4).unwrap();
        assert_eq!(&four.as_slice()[..2], first.as_slice());
        assert_eq!(&four.as_slice()[2..], second.as_slice());
    }

    #[test]
    fn steps_get_distinct_streams() {
        let mut rng = seeded();
        rng.begin_step("a").unwrap();
        let a = rng.random_for_df("tours", &[1], 1).unwrap();
        rng.end_step("a").unwrap();
        rng.begin_step("b").unwrap();
        let b = rng.random_for_df("tours", &[1], 1).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn adding_rows_does_not_perturb_existing() {
        let mut a = seeded();
        a.begin_step("s").unwrap();
        let before = a.random_for_df("tours", &[2], 5).unwrap();

        let mut b = seeded();
        b.add_channel("tours", &[99, 100]).unwrap();
        b.begin_step("s").unwrap();
        let after = b.random_for_df("tours", &[2], 5).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn errors() {
        let mut rng = seeded();
        assert!(matches!(rng.random_for_df("tours", &[1], 1), Err(CoreError::NoActiveStep)));
        rng.begin_step("s").unwrap();
        assert!(matches!(rng.random_for_df("trips", &[1], 1), Err(CoreError::UnknownChannel(_))));
        assert!(matches!(rng.random_for_df("tours", &[7], 1), Err(CoreError::UnknownRow { id: 7, .. })));
        assert!(matches!(rng.random_for_df("tours", &[1, 1], 1), Err(CoreError::DuplicateIndex { .. })));
        assert!(matches!(rng.add_channel("tours", &[1]), Err(CoreError::ChannelOverlap { id: 1, .. })));
        assert!(matches!(rng.set_base_seed(1), Err(CoreError::StepActive(_))));
        assert!(matches!(rng.begin_step("t"), Err(CoreError::StepActive(_))));
    }

    #[test]
    fn channel_added_mid_step_is_usable() {
        let mut rng = seeded();
        rng.begin_step("s").unwrap();
        rng.add_channel("trips", &[10, 11]).unwrap();
        assert_eq!(rng.random_for_df("trips", &[11, 10], 2).unwrap().rows(), 2);
        rng.drop_channel("trips");
        assert!(!rng.has_channel("trips"));
    }
}

#[cfg(test)]
mod config {
    use std::fs;

    use crate::{CheckpointPolicy, FileSystem, NetworkSettings, Settings, ZoneSystem};

    #[test]
    fn settings_defaults() {
        let s = Settings::from_toml_str("").unwrap();
        assert!(s.want_dest_choice_presampling);
        assert!(!s.disable_destination_sampling);
        assert_eq!(s.checkpoints, CheckpointPolicy::All(true));
    }

    #[test]
    fn checkpoint_list_and_unknown_keys() {
        let s = Settings::from_toml_str(
            r#"
            models = ["initialize", "tour_od_choice"]
            checkpoints = ["initialize"]
            rng_base_seed = 7
            households_sample_size = 100
            "#,
        )
        .unwrap();
        assert!(s.checkpoints.should_save("initialize"));
        assert!(!s.checkpoints.should_save("tour_od_choice"));
        assert_eq!(s.rng_base_seed, 7);
        assert!(s.other_settings.contains_key("households_sample_size"));
    }

    #[test]
    fn two_zone_requires_crosswalk() {
        assert!(NetworkSettings::from_toml_str("zone_system = 2\ntaz_skims = \"skims.csv\"").is_err());
        let net = NetworkSettings::from_toml_str("zone_system = 1\ntaz_skims = \"skims.csv\"").unwrap();
        assert_eq!(net.zone_system, ZoneSystem::OneZone);
        assert!(NetworkSettings::from_toml_str("zone_system = 3\ntaz_skims = \"s\"").is_err());
    }

    #[test]
    fn file_system_search_order() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let first = dir.path().join("override");
        let second = dir.path().join("configs");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(second.join("settings.toml"), "rng_base_seed = 1").unwrap();
        fs::write(first.join("settings.toml"), "rng_base_seed = 2").unwrap();

        let mut files = FileSystem::new(dir.path());
        files.configs_dir = vec![first, second];
        assert_eq!(files.read_settings().unwrap().rng_base_seed, 2);
        assert!(files.get_config_file_path("missing.toml").is_err());
    }
}
