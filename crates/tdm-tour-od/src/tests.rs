//! Unit and end-to-end tests for tdm-tour-od.

use std::path::Path;

use tdm_choice::{Coefficients, ModeChoiceModel, UtilitySpec, load_spec_reader};
use tdm_core::{Random, Table, ZoneId, ZoneSystem};
use tdm_los::{MazTazCrosswalk, NetworkLos, SkimDictBuilder};

use crate::settings::{LogsumSettings, TourOdSettings};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const SETTINGS_TOML: &str = r#"
SAMPLE_SPEC        = "tour_od_choice_sample.csv"
SPEC               = "tour_od_choice.csv"
SAMPLE_SIZE        = 4
SIZE_TERM_SELECTOR = "tour_od"
SEGMENTS           = ["work", "school"]
ORIG_FILTER        = "original_MAZ > 0"
DEST_CHOICE_LOGSUM_COLUMN_NAME = "od_logsum"
DEST_CHOICE_SAMPLE_TABLE_NAME  = "tour_od_choice_sample"
"#;

const SAMPLE_SPEC: &str = "Label,Expression,work,school\nsize,ln(size_term),1,1\n";

const SIMULATE_SPEC: &str = "\
Label,Expression,work,school
size,ln(size_term),1,1
dist,skim.DIST,-0.05,-0.1
logsum,tour_mode_choice_logsum,0.5,0.5
correction,ln(pick_count / prob),1,1
";

const MODE_SPEC: &str = "\
Label,Expression,walk,drive
dist,skim.DIST,-0.5,-0.1
asc,1,,0.5
";

const SIZE_TERMS: &str = "\
model_selector,segment,TOTEMP,TOTHH
tour_od,work,1,0
tour_od,school,1,0
";

fn settings() -> TourOdSettings {
    TourOdSettings::from_toml_str(SETTINGS_TOML).unwrap()
}

fn spec(csv: &str) -> UtilitySpec {
    load_spec_reader(csv.as_bytes()).unwrap()
}

fn mode_model() -> ModeChoiceModel {
    ModeChoiceModel::new(spec(MODE_SPEC), Coefficients::new())
}

fn logsum_settings(extra: &str) -> LogsumSettings {
    toml::from_str(&format!("SPEC = \"tour_mode_choice.csv\"\n{extra}")).unwrap()
}

/// Origins 1, 2, 3 (`original_MAZ > 0`), destinations 10 and 11 with
/// employment 5 and 15.
fn land_use() -> Table {
    Table::new("zone_id", vec![1, 2, 3, 10, 11])
        .with_column("original_MAZ", vec![1i64, 2, 3, 0, 0])
        .unwrap()
        .with_column("external_MAZ", vec![101i64, 102, 103, 0, 0])
        .unwrap()
        .with_column("TOTEMP", vec![0.0, 0.0, 0.0, 5.0, 15.0])
        .unwrap()
        .with_column("TOTHH", vec![10.0, 20.0, 30.0, 0.0, 0.0])
        .unwrap()
}

/// Destination size terms for the one-zone region.
fn dest_sizes() -> Table {
    Table::new("zone_id", vec![10, 11]).with_column("size_term", vec![5.0, 15.0]).unwrap()
}

fn one_zone_los() -> NetworkLos {
    let zones: Vec<ZoneId> = [1, 2, 3, 10, 11].into_iter().map(ZoneId).collect();
    let skims = SkimDictBuilder::new(zones)
        .skim_fn("DIST", |o, d| (o.0 - d.0).abs() as f32)
        .build()
        .unwrap();
    NetworkLos::new(ZoneSystem::OneZone, skims, None).unwrap()
}

/// MAZs 1..3 in TAZ 100; MAZ 10 in TAZ 200; MAZs 11..13 in TAZ 300.
fn two_zone_los() -> NetworkLos {
    let tazs: Vec<ZoneId> = [100, 200, 300].into_iter().map(ZoneId).collect();
    let skims = SkimDictBuilder::new(tazs)
        .skim_fn("DIST", |o, d| ((o.0 - d.0).abs() / 100) as f32)
        .build()
        .unwrap();
    let pairs = [(1, 100), (2, 100), (3, 100), (10, 200), (11, 300), (12, 300), (13, 300)]
        .into_iter()
        .map(|(m, t)| (ZoneId(m), ZoneId(t)));
    NetworkLos::new(ZoneSystem::TwoZone, skims, Some(MazTazCrosswalk::from_pairs(pairs).unwrap())).unwrap()
}

fn two_zone_land_use() -> Table {
    Table::new("zone_id", vec![1, 2, 3, 10, 11, 12, 13])
        .with_column("original_MAZ", vec![1i64, 2, 3, 0, 0, 0, 0])
        .unwrap()
        .with_column("TOTEMP", vec![0.0, 0.0, 0.0, 5.0, 2.0, 3.0, 10.0])
        .unwrap()
}

fn maz_dest_sizes() -> Table {
    Table::new("zone_id", vec![10, 11, 12, 13]).with_column("size_term", vec![5.0, 2.0, 3.0, 10.0]).unwrap()
}

fn tours(n: i64) -> Table {
    let ids: Vec<i64> = (1..=n).collect();
    Table::new("tour_id", ids.clone())
        .with_column("person_id", ids.iter().map(|i| (i + 1) / 2).collect::<Vec<i64>>())
        .unwrap()
        .with_column(
            "tour_type",
            ids.iter().map(|i| if i % 2 == 0 { "school" } else { "work" }).collect::<Vec<&str>>(),
        )
        .unwrap()
}

fn persons(n: i64) -> Table {
    let ids: Vec<i64> = (1..=n).collect();
    Table::new("person_id", ids.clone())
        .with_column("is_university", ids.iter().map(|i| i % 3 == 0).collect::<Vec<bool>>())
        .unwrap()
}

fn rng_for(ids: &[i64]) -> Random {
    let mut rng = Random::new(17);
    rng.add_channel("tours", ids).unwrap();
    rng.begin_step("tour_od_choice").unwrap();
    rng
}

fn write(dir: &Path, name: &str, text: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), text).unwrap();
}

fn write_configs(root: &Path) {
    let configs = root.join("configs");
    write(&configs, "tour_od_choice.toml", SETTINGS_TOML);
    write(&configs, "tour_od_choice_sample.csv", SAMPLE_SPEC);
    write(&configs, "tour_od_choice.csv", SIMULATE_SPEC);
    write(&configs, "destination_choice_size_terms.csv", SIZE_TERMS);
    write(&configs, "tour_mode_choice.toml", "SPEC = \"tour_mode_choice.csv\"\n");
    write(&configs, "tour_mode_choice.csv", MODE_SPEC);
}

// ── OD ids ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod od_ids {
    use crate::{OdError, OdId, make_od_ids, od_id_col, split_od_ids};

    #[test]
    fn format_and_parse() {
        let id = OdId::new(3i64, 11i64);
        assert_eq!(id.to_string(), "3_11");
        assert_eq!("3_11".parse::<OdId>().unwrap(), id);
        assert_eq!(od_id_col("origin", "destination"), "origin_destination");
    }

    #[test]
    fn split_columns() {
        let ids = make_od_ids(&[1, 2], &[10, 11]);
        assert_eq!(ids, ["1_10", "2_11"]);
        assert_eq!(split_od_ids(&ids).unwrap(), (vec![1, 2], vec![10, 11]));
    }

    #[test]
    fn bad_ids() {
        for bad in ["3", "a_1", "1_", "_2"] {
            assert!(matches!(bad.parse::<OdId>(), Err(OdError::BadOdId(_))), "{bad}");
        }
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod settings_tests {
    use super::*;
    use crate::{OdError, OriginScheme};

    #[test]
    fn defaults() {
        let s = settings();
        assert_eq!(s.orig_col_name, "origin");
        assert_eq!(s.dest_col_name, "destination");
        assert_eq!(s.alt_dest_col_name, "destination");
        assert_eq!(s.dest_choice_column_name, "od_choice");
        assert_eq!(s.chooser_segment_column_name, "tour_type");
        assert_eq!(s.size_terms, "destination_choice_size_terms.csv");
        assert_eq!(s.logsum_settings, "tour_mode_choice");
        assert_eq!(s.origin_scheme().unwrap(), OriginScheme::OriginalMaz);
    }

    #[test]
    fn origin_schemes() {
        assert_eq!(OriginScheme::parse("external_TAZ  >  0").unwrap(), OriginScheme::ExternalTaz);
        assert!(matches!(OriginScheme::parse("TOTHH > 0"), Err(OdError::Config(_))));
    }

    #[test]
    fn unknown_filter_rejected() {
        let toml = SETTINGS_TOML.replace("original_MAZ > 0", "is_origin == 1");
        let s = TourOdSettings::from_toml_str(&toml).unwrap();
        assert!(matches!(s.origin_scheme(), Err(OdError::Config(_))));
    }

    #[test]
    fn missing_required_key() {
        assert!(matches!(TourOdSettings::from_toml_str("SAMPLE_SIZE = 3"), Err(OdError::Config(_))));
    }
}

// ── Size terms ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod size_terms {
    use super::*;
    use crate::{OdError, SizeTermCalculator, aggregate_size_terms, load_size_terms_reader};

    const MIXED: &str = "\
model_selector,segment,TOTEMP,TOTHH
tour_od,work,1,0
tour_od,other,0.5,0.1
trip,work,0,1
";

    #[test]
    fn weighted_sum_per_segment() {
        let coefs = load_size_terms_reader(MIXED.as_bytes()).unwrap();
        let calc = SizeTermCalculator::new(&land_use(), &coefs, "tour_od").unwrap();
        assert_eq!(calc.segment_names().collect::<Vec<_>>(), ["other", "work"]);
        assert_eq!(calc.dest_size_terms_series("work").unwrap(), [0.0, 0.0, 0.0, 5.0, 15.0]);
        let other = calc.dest_size_terms_series("other").unwrap();
        assert!((other[0] - 1.0).abs() < 1e-12);
        assert!((other[4] - 7.5).abs() < 1e-12);

        let omnibus = calc.omnibus_size_terms_df().unwrap();
        assert_eq!(omnibus.width(), 2);
        assert_eq!(omnibus.len(), 5);
    }

    #[test]
    fn zero_sizes_pruned() {
        let coefs = load_size_terms_reader(MIXED.as_bytes()).unwrap();
        let calc = SizeTermCalculator::new(&land_use(), &coefs, "tour_od").unwrap();
        let work = calc.dest_size_terms_df("work", "test").unwrap();
        assert_eq!(work, dest_sizes());
    }

    #[test]
    fn negative_size_term_rejected() {
        let coefs = load_size_terms_reader("model_selector,segment,TOTEMP,TOTHH\ntour_od,work,1,-1\n".as_bytes()).unwrap();
        let calc = SizeTermCalculator::new(&land_use(), &coefs, "tour_od").unwrap();
        match calc.dest_size_terms_df("work", "test") {
            Err(OdError::NegativeSizeTerm { segment, zone, size }) => {
                assert_eq!(segment, "work");
                assert_eq!(zone, 1);
                assert_eq!(size, -10.0);
            }
            other => panic!("expected negative size term, got {other:?}"),
        }
    }

    #[test]
    fn unknown_segment_and_column() {
        let coefs = load_size_terms_reader(MIXED.as_bytes()).unwrap();
        let calc = SizeTermCalculator::new(&land_use(), &coefs, "tour_od").unwrap();
        match calc.dest_size_terms_df("shopping", "test") {
            Err(OdError::UnknownSegment { selector, segment }) => {
                assert_eq!(selector, "tour_od");
                assert_eq!(segment, "shopping");
            }
            other => panic!("expected unknown segment, got {other:?}"),
        }

        let bad = load_size_terms_reader("model_selector,segment,RETEMP\ntour_od,work,1\n".as_bytes()).unwrap();
        assert!(matches!(
            SizeTermCalculator::new(&land_use(), &bad, "tour_od"),
            Err(OdError::UnknownLandUseColumn(c)) if c == "RETEMP"
        ));
        assert!(matches!(SizeTermCalculator::new(&land_use(), &bad, "nope"), Err(OdError::Config(_))));
    }

    #[test]
    fn aggregate_to_taz() {
        let (mazs, tazs) = aggregate_size_terms(&maz_dest_sizes(), &two_zone_los()).unwrap();
        assert_eq!(tazs.index_name(), "dest_TAZ");
        assert_eq!(tazs.index(), [200, 300]);
        assert_eq!(tazs.floats("size_term").unwrap(), [5.0, 15.0]);

        assert_eq!(mazs.zone_id, [10, 11, 12, 13]);
        assert_eq!(mazs.dest_taz, [200, 300, 300, 300]);
        assert_eq!(mazs.max_count(), 3);
        let (ids, sizes) = mazs.candidates(300).unwrap();
        assert_eq!(ids, [11, 12, 13]);
        assert_eq!(sizes, [2.0, 3.0, 10.0]);
        assert!(mazs.candidates(100).is_none());
        assert_eq!(mazs.to_table().unwrap().len(), 4);
    }
}

// ── OD alternatives ───────────────────────────────────────────────────────────

#[cfg(test)]
mod alternatives {
    use super::*;
    use crate::{OdColumns, create_od_alts, filter_origins};

    const COLS: OdColumns<'static> = OdColumns { origin: "origin", destination: "destination", od_id: "origin_destination" };

    #[test]
    fn destination_major_cross_product() {
        let alts = create_od_alts(&dest_sizes(), &land_use(), &COLS, Some("original_MAZ > 0"), &[]).unwrap();
        assert_eq!(alts.len(), 6);
        assert_eq!(alts.ints("destination").unwrap(), [10, 10, 10, 11, 11, 11]);
        assert_eq!(alts.ints("origin").unwrap(), [1, 2, 3, 1, 2, 3]);
        assert_eq!(alts.floats("size_term").unwrap(), [5.0, 5.0, 5.0, 15.0, 15.0, 15.0]);
        assert_eq!(alts.strs("origin_destination").unwrap()[4], "2_11");
    }

    #[test]
    fn origin_attributes_follow_the_origin() {
        let attrs = vec!["TOTHH".to_owned()];
        let alts = create_od_alts(&dest_sizes(), &land_use(), &COLS, Some("original_MAZ > 0"), &attrs).unwrap();
        assert_eq!(alts.floats("TOTHH").unwrap(), [10.0, 20.0, 30.0, 10.0, 20.0, 30.0]);
    }

    #[test]
    fn filter_sees_index_and_columns() {
        assert_eq!(filter_origins(&land_use(), None).unwrap().len(), 5);
        assert_eq!(filter_origins(&land_use(), Some("zone_id >= 10")).unwrap(), [3, 4]);
        assert!(create_od_alts(&dest_sizes(), &land_use(), &COLS, Some("TOTHH > 100"), &[]).is_err());
    }
}

// ── Direct sampling ───────────────────────────────────────────────────────────

#[cfg(test)]
mod sampling {
    use std::collections::HashSet;

    use super::*;
    use crate::{OdSampler, run_od_sample};

    fn sampler<'a>(
        settings: &'a TourOdSettings,
        terms: &'a [tdm_choice::Term],
        los: &'a NetworkLos,
        land_use: &'a Table,
        sample_size: usize,
    ) -> OdSampler<'a> {
        OdSampler { settings, terms, los, land_use, sample_size, chunk_size: 0 }
    }

    #[test]
    fn three_origins_two_destinations() {
        let (s, los, lu) = (settings(), one_zone_los(), land_use());
        let terms = spec(SAMPLE_SPEC).terms("work", None).unwrap();
        let choosers = tours(1000);
        let mut rng = rng_for(choosers.index());
        let sample = sampler(&s, &terms, &los, &lu, 4).od_sample(&mut rng, "tours", &choosers, &dest_sizes()).unwrap();

        let known: HashSet<(i64, i64)> = [1, 2, 3].iter().flat_map(|&o| [(o, 10), (o, 11)]).collect();
        let origins = sample.ints("origin").unwrap();
        let dests = sample.ints("destination").unwrap();
        let counts = sample.ints("pick_count").unwrap();
        let probs = sample.floats("prob").unwrap();

        let (mut n10, mut n11) = (0, 0);
        for i in 0..sample.len() {
            assert!(known.contains(&(origins[i], dests[i])));
            assert_eq!(sample.strs("origin_destination").unwrap()[i], format!("{}_{}", origins[i], dests[i]));
            // Per-draw probability, whatever the pick count.
            let expected = if dests[i] == 11 { 0.25 } else { 1.0 / 12.0 };
            assert!((probs[i] - expected).abs() < 1e-9, "prob {} for count {}", probs[i], counts[i]);
            if dests[i] == 11 { n11 += counts[i] } else { n10 += counts[i] }
        }
        assert_eq!(n10 + n11, 4000);
        let ratio = n11 as f64 / n10 as f64;
        assert!((2.6..3.4).contains(&ratio), "ratio {ratio}");
    }

    #[test]
    fn pick_counts_sum_to_sample_size() {
        let (s, los, lu) = (settings(), one_zone_los(), land_use());
        let terms = spec(SAMPLE_SPEC).terms("work", None).unwrap();
        let choosers = tours(20);
        let mut rng = rng_for(choosers.index());
        let sample = sampler(&s, &terms, &los, &lu, 4).od_sample(&mut rng, "tours", &choosers, &dest_sizes()).unwrap();
        for id in choosers.index() {
            let total: i64 = sample
                .index()
                .iter()
                .zip(sample.ints("pick_count").unwrap())
                .filter(|(t, _)| *t == id)
                .map(|(_, c)| c)
                .sum();
            assert_eq!(total, 4);
        }
    }

    #[test]
    fn unsampled_returns_every_pair() {
        let (s, los, lu) = (settings(), one_zone_los(), land_use());
        let terms = spec(SAMPLE_SPEC).terms("work", None).unwrap();
        let choosers = tours(3);
        let mut rng = rng_for(choosers.index());
        let sample = sampler(&s, &terms, &los, &lu, 0).od_sample(&mut rng, "tours", &choosers, &dest_sizes()).unwrap();
        assert_eq!(sample.len(), 18);
        assert!(sample.ints("pick_count").unwrap().iter().all(|&c| c == 1));
        let total: f64 = sample.floats("prob").unwrap()[..6].iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unsorted_choosers_are_sorted() {
        let (s, los, lu) = (settings(), one_zone_los(), land_use());
        let terms = spec(SAMPLE_SPEC).terms("work", None).unwrap();
        let choosers = tours(5).take(&[4, 2, 0, 3, 1]);
        let mut rng = rng_for(&[1, 2, 3, 4, 5]);
        let sample =
            run_od_sample(&mut rng, "tours", &sampler(&s, &terms, &los, &lu, 2), &choosers, &dest_sizes(), false)
                .unwrap();
        assert!(sample.is_monotonic_increasing());
    }

    #[test]
    fn same_seed_same_sample() {
        let (s, los, lu) = (settings(), one_zone_los(), land_use());
        let terms = spec(SAMPLE_SPEC).terms("work", None).unwrap();
        let choosers = tours(50);
        let draw = || {
            let mut rng = rng_for(choosers.index());
            sampler(&s, &terms, &los, &lu, 4).od_sample(&mut rng, "tours", &choosers, &dest_sizes()).unwrap()
        };
        assert_eq!(draw(), draw());
    }
}

// ── MAZ within TAZ ────────────────────────────────────────────────────────────

#[cfg(test)]
mod choose_maz {
    use super::*;
    use crate::{DEST_MAZ, ORIG_MAZ, OdError, aggregate_size_terms, choose_maz_for_taz};

    /// Tour 1 draws TAZ 200 once and TAZ 300 three times; tour 2 draws each
    /// twice.
    fn taz_sample(pick_counts: Vec<i64>) -> Table {
        Table::new("tour_id", vec![1, 1, 2, 2])
            .with_column("dest_TAZ", vec![200i64, 300, 200, 300])
            .unwrap()
            .with_column("prob", vec![0.25, 0.75, 0.25, 0.75])
            .unwrap()
            .with_column("pick_count", pick_counts)
            .unwrap()
            .with_column(ORIG_MAZ, vec![1i64, 2, 3, 3])
            .unwrap()
    }

    fn maz_sizes() -> crate::MazSizeTerms {
        aggregate_size_terms(&maz_dest_sizes(), &two_zone_los()).unwrap().0
    }

    #[test]
    fn chosen_maz_lies_in_its_taz() {
        let mut rng = rng_for(&[1, 2]);
        let out = choose_maz_for_taz(&mut rng, "tours", &taz_sample(vec![1, 3, 2, 2]), &maz_sizes(), Some(ORIG_MAZ), DEST_MAZ)
            .unwrap();
        let los = two_zone_los();
        let dests = out.ints(DEST_MAZ).unwrap();
        let origins = out.ints(ORIG_MAZ).unwrap();
        for i in 0..out.len() {
            let taz = los.map_maz_to_taz(ZoneId(dests[i])).unwrap().0;
            // Origin MAZ 1 and tour 2's first origin only ever drew TAZ 200.
            if origins[i] == 1 {
                assert_eq!(taz, 200);
            }
            if taz == 200 {
                assert_eq!(dests[i], 10);
            }
        }
    }

    #[test]
    fn prob_is_taz_times_maz_share() {
        let mut rng = rng_for(&[1, 2]);
        let out = choose_maz_for_taz(&mut rng, "tours", &taz_sample(vec![1, 3, 2, 2]), &maz_sizes(), Some(ORIG_MAZ), DEST_MAZ)
            .unwrap();
        let share = |maz: i64| match maz {
            10 => 0.25,
            11 => 0.75 * 2.0 / 15.0,
            12 => 0.75 * 3.0 / 15.0,
            13 => 0.75 * 10.0 / 15.0,
            _ => unreachable!(),
        };
        for (maz, prob) in out.ints(DEST_MAZ).unwrap().iter().zip(out.floats("prob").unwrap()) {
            assert!((prob - share(*maz)).abs() < 1e-12, "maz {maz}: {prob}");
        }
    }

    #[test]
    fn regrouped_and_counted() {
        let mut rng = rng_for(&[1, 2]);
        let out = choose_maz_for_taz(&mut rng, "tours", &taz_sample(vec![1, 3, 2, 2]), &maz_sizes(), Some(ORIG_MAZ), DEST_MAZ)
            .unwrap();
        let keys: Vec<(i64, i64, i64)> = (0..out.len())
            .map(|i| (out.index()[i], out.ints(DEST_MAZ).unwrap()[i], out.ints(ORIG_MAZ).unwrap()[i]))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(keys, sorted);

        for tour in [1, 2] {
            let total: i64 = (0..out.len())
                .filter(|&i| out.index()[i] == tour)
                .map(|i| out.ints("pick_count").unwrap()[i])
                .sum();
            assert_eq!(total, 4);
        }
    }

    #[test]
    fn narrow_taz_never_selects_padding() {
        // The last tour draws TAZ 300 (three MAZs), so every TAZ 200 draw
        // is padded to width three.
        let n = 200;
        let tazs: Vec<i64> = (1..=n).map(|i| if i == n { 300 } else { 200 }).collect();
        let sample = Table::new("tour_id", (1..=n).collect())
            .with_column("dest_TAZ", tazs)
            .unwrap()
            .with_column("prob", vec![1.0; n as usize])
            .unwrap()
            .with_column("pick_count", vec![3i64; n as usize])
            .unwrap();
        let ids: Vec<i64> = (1..=n).collect();
        let mut rng = rng_for(&ids);
        let out = choose_maz_for_taz(&mut rng, "tours", &sample, &maz_sizes(), None, DEST_MAZ).unwrap();
        assert!(!out.has_column(ORIG_MAZ));
        for i in 0..out.len() {
            if out.index()[i] < n {
                assert_eq!(out.ints(DEST_MAZ).unwrap()[i], 10);
                assert_eq!(out.ints("pick_count").unwrap()[i], 3);
            } else {
                assert!([11, 12, 13].contains(&out.ints(DEST_MAZ).unwrap()[i]));
            }
        }
    }

    #[test]
    fn unequal_draws_rejected() {
        let mut rng = rng_for(&[1, 2]);
        let err = choose_maz_for_taz(&mut rng, "tours", &taz_sample(vec![1, 3, 2, 1]), &maz_sizes(), None, DEST_MAZ);
        assert!(matches!(err, Err(OdError::SampleShape { chooser: 2, expected: 4, got: 3 })));
    }

    #[test]
    fn unknown_taz_rejected() {
        let mut sample = taz_sample(vec![1, 3, 2, 2]);
        sample.set_column("dest_TAZ", vec![200i64, 999, 200, 300]).unwrap();
        let mut rng = rng_for(&[1, 2]);
        assert!(matches!(
            choose_maz_for_taz(&mut rng, "tours", &sample, &maz_sizes(), None, DEST_MAZ),
            Err(OdError::EmptyTaz(999))
        ));
    }
}

// ── Presampling ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod presample {
    use super::*;
    use crate::{OdSampler, run_od_sample};

    #[test]
    fn two_stage_sample() {
        let (s, los, lu) = (settings(), two_zone_los(), two_zone_land_use());
        let terms = spec(SAMPLE_SPEC).terms("work", None).unwrap();
        let choosers = tours(100);
        let mut rng = rng_for(choosers.index());
        let sampler = OdSampler { settings: &s, terms: &terms, los: &los, land_use: &lu, sample_size: 4, chunk_size: 16 };
        let sample = run_od_sample(&mut rng, "tours", &sampler, &choosers, &maz_dest_sizes(), true).unwrap();

        assert_eq!(sample.column_names().collect::<Vec<_>>(), ["destination", "origin", "prob", "pick_count"]);
        let origins = sample.ints("origin").unwrap();
        let dests = sample.ints("destination").unwrap();
        assert!(origins.iter().all(|o| [1, 2, 3].contains(o)));
        assert!(dests.iter().all(|d| [10, 11, 12, 13].contains(d)));
        let total: i64 = sample.ints("pick_count").unwrap().iter().sum();
        assert_eq!(total, 400);

        // TAZ prob (origin share × TAZ share) times MAZ share.
        for (d, p) in dests.iter().zip(sample.floats("prob").unwrap()) {
            let expected = match d {
                10 => 1.0 / 3.0 * 0.25,
                11 => 1.0 / 3.0 * 0.75 * 2.0 / 15.0,
                12 => 1.0 / 3.0 * 0.75 * 3.0 / 15.0,
                _ => 1.0 / 3.0 * 0.75 * 10.0 / 15.0,
            };
            assert!((p - expected).abs() < 1e-9);
        }
    }
}

// ── Logsums ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod logsums {
    use super::*;
    use crate::{LogsumModels, TOUR_MODE_CHOICE_LOGSUM, TRIPS_TABLE, run_od_logsums};
    use tdm_choice::{SkimContext, ZoneSource};
    use tdm_state::{Registry, State};

    fn sample() -> Table {
        Table::new("tour_id", vec![1, 1, 2])
            .with_column("origin", vec![1i64, 2, 3])
            .unwrap()
            .with_column("destination", vec![10i64, 11, 11])
            .unwrap()
            .with_column("prob", vec![0.1, 0.2, 0.3])
            .unwrap()
            .with_column("pick_count", vec![1i64, 3, 4])
            .unwrap()
    }

    fn state() -> State {
        let mut state = State::new(Registry::builder().temp_table(TRIPS_TABLE).build().unwrap());
        state.rng_mut().add_channel("tours", &[1, 2]).unwrap();
        state.rng_mut().begin_step("tour_od_choice").unwrap();
        state
    }

    #[test]
    fn tour_logsum_matches_mode_model() {
        let los = one_zone_los();
        let models = LogsumModels::new(logsum_settings(""), mode_model(), None);
        let mut state = state();
        let out = run_od_logsums(&mut state, &settings(), &models, &tours(2), sample(), &los).unwrap();

        let skims = SkimContext::new(&los, ZoneSource::Chooser("origin".into()), ZoneSource::Chooser("destination".into()));
        let expected = mode_model().logsums(&sample(), Some(&skims)).unwrap();
        assert_eq!(out.floats(TOUR_MODE_CHOICE_LOGSUM).unwrap(), expected.as_slice());
        assert_eq!(out.index(), sample().index());
    }

    #[test]
    fn trip_logsums_pivoted_and_trips_dropped() {
        let los = one_zone_los();
        let tour_spec = format!("{MODE_SPEC}trip,logsum_walk_outbound + logsum_walk_inbound,0.1,\n");
        let models = LogsumModels::new(
            logsum_settings("COMPUTE_TRIP_MODE_CHOICE_LOGSUMS = true"),
            ModeChoiceModel::new(spec(&tour_spec), Coefficients::new()),
            Some(mode_model()),
        );
        let mut state = state();
        let out = run_od_logsums(&mut state, &settings(), &models, &tours(2), sample(), &los).unwrap();

        for col in ["logsum_walk_outbound", "logsum_walk_inbound", "logsum_drive_outbound", "logsum_drive_inbound"] {
            let values = out.floats(col).unwrap();
            assert_eq!(values.len(), 3);
            assert!(values.iter().all(|v| v.is_finite()), "{col}");
        }
        // Symmetric skims: outbound and inbound trip logsums agree.
        assert_eq!(out.floats("logsum_walk_outbound").unwrap(), out.floats("logsum_walk_inbound").unwrap());
        assert!(out.floats(TOUR_MODE_CHOICE_LOGSUM).unwrap().iter().all(|v| v.is_finite()));

        assert!(!state.is_table(TRIPS_TABLE));
        assert!(!state.rng().has_channel(TRIPS_TABLE));
    }

    #[test]
    fn trips_table_not_left_behind_when_channel_fails() {
        let los = one_zone_los();
        let models = LogsumModels::new(
            logsum_settings("COMPUTE_TRIP_MODE_CHOICE_LOGSUMS = true"),
            mode_model(),
            Some(mode_model()),
        );
        let mut state = state();
        state.rng_mut().add_channel(TRIPS_TABLE, &[0]).unwrap();
        assert!(run_od_logsums(&mut state, &settings(), &models, &tours(2), sample(), &los).is_err());
        assert!(!state.is_table(TRIPS_TABLE));
    }

    #[test]
    fn missing_tour_is_an_error() {
        let los = one_zone_los();
        let models = LogsumModels::new(logsum_settings(""), mode_model(), None);
        let mut state = state();
        assert!(run_od_logsums(&mut state, &settings(), &models, &tours(1), sample(), &los).is_err());
    }
}

// ── Simulate ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod simulate {
    use super::*;
    use crate::{OdSampler, OdSimulator, TOUR_MODE_CHOICE_LOGSUM};

    #[test]
    fn one_choice_per_tour_from_its_sample() {
        let (s, los, lu) = (settings(), one_zone_los(), land_use());
        let sample_terms = spec(SAMPLE_SPEC).terms("work", None).unwrap();
        let choosers = tours(30);
        let mut rng = rng_for(choosers.index());
        let sampler = OdSampler { settings: &s, terms: &sample_terms, los: &los, land_use: &lu, sample_size: 3, chunk_size: 0 };
        let mut sample = sampler.od_sample(&mut rng, "tours", &choosers, &dest_sizes()).unwrap();
        sample.drop_column("origin_destination");
        sample.set_column(TOUR_MODE_CHOICE_LOGSUM, vec![0.0; sample.len()]).unwrap();

        let terms = spec(SIMULATE_SPEC).terms("work", None).unwrap();
        let sim = OdSimulator { settings: &s, terms: &terms, los: &los, land_use: &lu, dest_size_terms: &dest_sizes(), chunk_size: 7 };
        let choices = sim.run(&mut rng, "tours", &choosers, sample.clone(), true).unwrap();

        assert_eq!(choices.index(), choosers.index());
        let od = choices.strs("choice").unwrap();
        for (i, &tour) in choosers.index().iter().enumerate() {
            let o = choices.ints("origin").unwrap()[i];
            let d = choices.ints("destination").unwrap()[i];
            assert_eq!(od[i], format!("{o}_{d}"));
            let sampled = (0..sample.len()).any(|r| {
                sample.index()[r] == tour
                    && sample.ints("origin").unwrap()[r] == o
                    && sample.ints("destination").unwrap()[r] == d
            });
            assert!(sampled, "tour {tour} chose {o}_{d} outside its sample");
        }
        assert!(choices.floats("logsum").unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn destination_without_size_term_rejected() {
        let (s, los, lu) = (settings(), one_zone_los(), land_use());
        let terms = spec(SIMULATE_SPEC).terms("work", None).unwrap();
        let sample = Table::new("tour_id", vec![1])
            .with_column("origin", vec![1i64])
            .unwrap()
            .with_column("destination", vec![3i64])
            .unwrap()
            .with_column("prob", vec![1.0])
            .unwrap()
            .with_column("pick_count", vec![1i64])
            .unwrap();
        let sim = OdSimulator { settings: &s, terms: &terms, los: &los, land_use: &lu, dest_size_terms: &dest_sizes(), chunk_size: 0 };
        let mut rng = rng_for(&[1]);
        assert!(matches!(
            sim.run(&mut rng, "tours", &tours(1), sample, false),
            Err(crate::OdError::MissingZone { zone: 3, .. })
        ));
    }
}

// ── Origin remapping ──────────────────────────────────────────────────────────

#[cfg(test)]
mod external_origins {
    use super::*;
    use crate::tour_od::{align_to_tours, remap_external_origins};

    #[test]
    fn origins_map_through_external_maz() {
        let mut sample = Table::new("tour_id", vec![1, 1]).with_column("origin", vec![1i64, 3]).unwrap();
        remap_external_origins(&mut sample, &land_use(), "origin").unwrap();
        assert_eq!(sample.ints("origin").unwrap(), [101, 103]);
    }

    #[test]
    fn unchosen_tours_get_missing_values() {
        let choices = Table::new("tour_id", vec![3, 1])
            .with_column("choice", vec!["1_10", "2_11"])
            .unwrap()
            .with_column("origin", vec![1i64, 2])
            .unwrap();
        let aligned = align_to_tours(choices, &tours(3)).unwrap();
        assert_eq!(aligned.index(), [1, 2, 3]);
        assert_eq!(aligned.strs("choice").unwrap(), ["2_11", "", "1_10"]);
        assert!(aligned.floats("origin").unwrap()[1].is_nan());
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod pipeline {
    use super::*;
    use crate::TourOdChoice;
    use tdm_core::{FileSystem, Settings};
    use tdm_state::{NoopObserver, Registry, State};

    const MODELS: &[&str] = &["tour_od_choice"];

    fn registry() -> Registry {
        Registry::builder()
            .table("tours", |_| Ok(tours(40)))
            .table("persons", |_| Ok(persons(20)))
            .table("land_use", |_| Ok(land_use()))
            .object("network_los", |_| Ok(one_zone_los()))
            .channel_table("tours")
            .temp_table("trips")
            .step(TourOdChoice::default())
            .build()
            .unwrap()
    }

    fn state(root: &Path) -> State {
        State::builder()
            .registry(registry())
            .settings(Settings {
                rng_base_seed: 42,
                models: MODELS.iter().map(|m| (*m).to_owned()).collect(),
                want_dest_choice_sample_tables: true,
                ..Settings::default()
            })
            .filesystem(FileSystem::new(root))
            .build()
    }

    fn run_fresh() -> (tempfile::TempDir, State) {
        let dir = tempfile::tempdir().expect("create temp dir");
        write_configs(dir.path());
        let mut state = state(dir.path());
        state.run_all(&mut NoopObserver).unwrap();
        (dir, state)
    }

    #[test]
    fn every_tour_gets_an_od_pair() {
        let (_dir, state) = run_fresh();
        let tours = state.get_table("tours", None).unwrap();
        let origins = tours.ints("origin").unwrap();
        let dests = tours.ints("destination").unwrap();
        let choice = tours.strs("od_choice").unwrap();
        for i in 0..tours.len() {
            assert!([1, 2, 3].contains(&origins[i]));
            assert!([10, 11].contains(&dests[i]));
            assert_eq!(choice[i], format!("{}_{}", origins[i], dests[i]));
        }
        assert!(tours.floats("od_logsum").unwrap().iter().all(|v| v.is_finite()));
        assert_eq!(state.checkpoint_names(), ["init", "tour_od_choice"]);
    }

    #[test]
    fn sample_table_saved() {
        let (_dir, state) = run_fresh();
        let sample = state.get_table("tour_od_choice_sample", None).unwrap();
        assert!(sample.has_column("tour_mode_choice_logsum"));
        let total: i64 = sample.ints("pick_count").unwrap().iter().sum();
        assert_eq!(total, 40 * 4);
    }

    /// The `tours` table as written to the checkpoint store, bypassing the
    /// in-memory copy.
    fn stored_tours(state: &mut State) -> std::sync::Arc<Table> {
        state.drop_table("tours");
        state.get_table("tours", Some("tour_od_choice")).unwrap()
    }

    #[test]
    fn same_seed_same_choices() {
        let (_a, mut a) = run_fresh();
        let (_b, mut b) = run_fresh();
        assert_eq!(*a.get_table("tours", None).unwrap(), *b.get_table("tours", None).unwrap());
        assert_eq!(*stored_tours(&mut a), *stored_tours(&mut b));
    }

    #[test]
    fn checkpointed_tours_read_back() {
        let (_dir, mut state) = run_fresh();
        let current = state.get_table("tours", None).unwrap();
        let stored = stored_tours(&mut state);
        assert!(!state.existing_table_names().contains(&"tours".to_owned()));
        assert_eq!(*stored, *current);
        assert_eq!(stored.strs("od_choice").unwrap(), current.strs("od_choice").unwrap());
        assert_eq!(stored.floats("od_logsum").unwrap(), current.floats("od_logsum").unwrap());
    }

    #[test]
    fn resume_reproduces_choices() {
        let (dir, mut first) = run_fresh();
        let expected = first.get_table("tours", None).unwrap();
        first.close_pipeline().unwrap();

        let mut resumed = state(dir.path());
        let models: Vec<String> = MODELS.iter().map(|m| (*m).to_owned()).collect();
        resumed.run(&models, Some("init"), &mut NoopObserver).unwrap();
        assert_eq!(*resumed.get_table("tours", None).unwrap(), *expected);
    }
}
