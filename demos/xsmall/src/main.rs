//! xsmall — smallest end-to-end run of the tour OD choice pipeline.
//!
//! Builds a synthetic two-zone region loosely shaped like Mobile, Alabama
//! (three TAZs, eight MAZs, 30 persons, 45 tours), writes its configs and
//! data under the working directory, and runs `tour_od_choice` with TAZ
//! presampling, trip and tour mode choice logsums, and CSV checkpoints.
//!
//! ```text
//! cargo run -p xsmall -- [working_dir]      # default: output/xsmall
//! RUST_LOG=debug cargo run -p xsmall
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tdm_core::{FileSystem, NetworkSettings, Table, ZoneId};
use tdm_los::NetworkLos;
use tdm_state::{Registry, RunObserver, State, StateError};
use tdm_tour_od::{TRIPS_TABLE, TourOdChoice};

// ── Constants ─────────────────────────────────────────────────────────────────

const PERSON_COUNT: i64 = 30;
const TOUR_COUNT:   i64 = 45;
const SEED:         u64 = 42;

/// TAZ id and centroid (miles east, miles north of downtown).
const TAZS: [(i64, f32, f32); 3] = [
    (1, 0.0, 5.0),  // north residential
    (2, 0.0, 0.0),  // downtown
    (3, 6.0, -2.0), // commerce park
];

/// MAZ, parent TAZ, households, employment, retail employment, enrollment.
const MAZS: [(i64, i64, f64, f64, f64, f64); 8] = [
    (101, 1, 120.0, 5.0, 0.0, 300.0),
    (102, 1, 90.0, 10.0, 4.0, 0.0),
    (103, 1, 60.0, 0.0, 0.0, 0.0),
    (201, 2, 10.0, 400.0, 60.0, 0.0),
    (202, 2, 25.0, 250.0, 120.0, 1_200.0),
    (301, 3, 40.0, 150.0, 10.0, 0.0),
    (302, 3, 0.0, 300.0, 0.0, 0.0),
    (303, 3, 0.0, 0.0, 0.0, 0.0),
];

// ── Config files ──────────────────────────────────────────────────────────────

const SETTINGS_TOML: &str = r#"
models            = ["tour_od_choice"]
checkpoint_format = "csv"
rng_base_seed     = 42
chunk_size        = 16
want_dest_choice_presampling   = true
want_dest_choice_sample_tables = true
"#;

const NETWORK_LOS_TOML: &str = r#"
zone_system = 2
taz_skims   = "taz_skims.csv"
maz         = "maz_taz.csv"
"#;

const TOUR_OD_TOML: &str = r#"
SAMPLE_SPEC        = "tour_od_choice_sample.csv"
SPEC               = "tour_od_choice.csv"
COEFFICIENTS       = "tour_od_choice_coefficients.csv"
SAMPLE_SIZE        = 5
SIZE_TERM_SELECTOR = "tour_od"
SEGMENTS           = ["work", "school"]
ORIG_FILTER        = "original_MAZ > 0"
ORIGIN_ATTR_COLS_TO_USE = ["TOTHH"]
DEST_CHOICE_LOGSUM_COLUMN_NAME = "od_logsum"
DEST_CHOICE_SAMPLE_TABLE_NAME  = "tour_od_choice_sample"

[CONSTANTS]
max_dist = 12.0
"#;

const TOUR_OD_SAMPLE_CSV: &str = "\
Label,Expression,work,school
size,ln(size_term),1,1
dist,skim.DIST,coef_dist_work,coef_dist_school
far,skim.DIST > max_dist,-5,-5
";

const TOUR_OD_CSV: &str = "\
Label,Expression,work,school
size,ln(size_term),1,1
dist,skim.DIST,coef_dist_work,coef_dist_school
households_at_origin,ln(TOTHH + 1),0.3,0.3
logsum,tour_mode_choice_logsum,coef_logsum,coef_logsum
correction,ln(pick_count / prob),1,1
";

const TOUR_OD_COEFFICIENTS_CSV: &str = "\
coefficient_name,value
coef_dist_work,-0.25
coef_dist_school,-0.6
coef_logsum,0.6
";

const SIZE_TERMS_CSV: &str = "\
model_selector,segment,TOTEMP,RETEMP,ENROLL,TOTHH
tour_od,work,1,0.5,0,0
tour_od,school,0,0,1,0.01
";

const TOUR_MODE_TOML: &str = r#"
SPEC = "tour_mode_choice.csv"
COMPUTE_TRIP_MODE_CHOICE_LOGSUMS = true

[TRIP_MODE_CHOICE]
SPEC = "trip_mode_choice.csv"
"#;

const TOUR_MODE_CSV: &str = "\
Label,Expression,DRIVE,WALK,TRANSIT
time,skim.TIME,-0.05,,-0.04
walk_dist,skim.DIST,,-1.2,
asc,1,,-0.5,-1.0
trips_drive,logsum_DRIVE_outbound + logsum_DRIVE_inbound,0.5,,
trips_walk,logsum_WALK_outbound + logsum_WALK_inbound,,0.5,
trips_transit,logsum_TRANSIT_outbound + logsum_TRANSIT_inbound,,,0.5
";

const TRIP_MODE_CSV: &str = "\
Label,Expression,DRIVE,WALK,TRANSIT
time,skim.TIME,-0.06,,-0.05
walk_dist,skim.DIST,,-1.5,
asc,1,,-0.3,-0.8
";

// ── Synthetic region ──────────────────────────────────────────────────────────

fn taz_distance(o: i64, d: i64) -> f32 {
    let at = |id: i64| TAZS.iter().find(|t| t.0 == id).map_or((0.0, 0.0), |t| (t.1, t.2));
    let ((ox, oy), (dx, dy)) = (at(o), at(d));
    if o == d { 0.5 } else { ((ox - dx).powi(2) + (oy - dy).powi(2)).sqrt() }
}

fn skims_csv() -> String {
    let mut out = String::from("origin,destination,DIST,TIME\n");
    for &(o, ..) in &TAZS {
        for &(d, ..) in &TAZS {
            let dist = taz_distance(o, d);
            out.push_str(&format!("{o},{d},{dist:.3},{:.3}\n", dist * 2.0 + 1.0));
        }
    }
    out
}

fn maz_taz_csv() -> String {
    let mut out = String::from("MAZ,TAZ\n");
    for &(maz, taz, ..) in &MAZS {
        out.push_str(&format!("{maz},{taz}\n"));
    }
    out
}

fn write_region(root: &Path) -> Result<()> {
    let write = |dir: &str, name: &str, text: &str| -> Result<()> {
        let dir = root.join(dir);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(name), text).with_context(|| format!("writing {name}"))
    };
    write("configs", "settings.toml", SETTINGS_TOML)?;
    write("configs", "network_los.toml", NETWORK_LOS_TOML)?;
    write("configs", "tour_od_choice.toml", TOUR_OD_TOML)?;
    write("configs", "tour_od_choice_sample.csv", TOUR_OD_SAMPLE_CSV)?;
    write("configs", "tour_od_choice.csv", TOUR_OD_CSV)?;
    write("configs", "tour_od_choice_coefficients.csv", TOUR_OD_COEFFICIENTS_CSV)?;
    write("configs", "destination_choice_size_terms.csv", SIZE_TERMS_CSV)?;
    write("configs", "tour_mode_choice.toml", TOUR_MODE_TOML)?;
    write("configs", "tour_mode_choice.csv", TOUR_MODE_CSV)?;
    write("configs", "trip_mode_choice.csv", TRIP_MODE_CSV)?;
    write("data", "taz_skims.csv", &skims_csv())?;
    write("data", "maz_taz.csv", &maz_taz_csv())?;
    Ok(())
}

fn land_use() -> tdm_core::CoreResult<Table> {
    let col = |f: fn(&(i64, i64, f64, f64, f64, f64)) -> f64| MAZS.iter().map(f).collect::<Vec<f64>>();
    // Residential MAZs are tour origins.
    let original: Vec<i64> = MAZS.iter().map(|m| if m.2 > 30.0 { m.0 } else { 0 }).collect();
    Table::new("zone_id", MAZS.iter().map(|m| m.0).collect())
        .with_column("TAZ", MAZS.iter().map(|m| m.1).collect::<Vec<i64>>())?
        .with_column("original_MAZ", original)?
        .with_column("external_MAZ", vec![0i64; MAZS.len()])?
        .with_column("TOTHH", col(|m| m.2))?
        .with_column("TOTEMP", col(|m| m.3))?
        .with_column("RETEMP", col(|m| m.4))?
        .with_column("ENROLL", col(|m| m.5))
}

fn persons() -> tdm_core::CoreResult<Table> {
    let ids: Vec<i64> = (1..=PERSON_COUNT).collect();
    Table::new("person_id", ids.clone())
        .with_column("is_university", ids.iter().map(|p| p % 7 == 0).collect::<Vec<bool>>())?
        .with_column("age", ids.iter().map(|p| 18 + (p * 3) % 50).collect::<Vec<i64>>())
}

fn tours() -> tdm_core::CoreResult<Table> {
    let ids: Vec<i64> = (1..=TOUR_COUNT).collect();
    Table::new("tour_id", ids.clone())
        .with_column("person_id", ids.iter().map(|t| (t - 1) % PERSON_COUNT + 1).collect::<Vec<i64>>())?
        .with_column(
            "tour_type",
            ids.iter().map(|t| if t % 3 == 0 { "school" } else { "work" }).collect::<Vec<&str>>(),
        )?
        .with_column("start", ids.iter().map(|t| 6 + t % 4).collect::<Vec<i64>>())?
        .with_column("end", ids.iter().map(|t| 15 + t % 5).collect::<Vec<i64>>())
}

fn registry() -> Result<Registry> {
    Ok(Registry::builder()
        .table("land_use", |_| Ok(land_use()?))
        .table("persons", |_| Ok(persons()?))
        .table("tours", |_| Ok(tours()?))
        .object("network_los", |state| {
            NetworkLos::load(state.network_settings()?, state.filesystem()?)
                .map_err(|e| StateError::model("network_los", e))
        })
        .channel_table("tours")
        .temp_table(TRIPS_TABLE)
        .predicate("network_los", "network_settings")
        .step(TourOdChoice::default())
        .build()?)
}

// ── Observer ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct StepTimer {
    steps:       Vec<(String, Duration)>,
    checkpoints: Vec<String>,
}

impl RunObserver for StepTimer {
    fn on_step_start(&mut self, step: &str) {
        println!("running {step} ...");
    }

    fn on_step_end(&mut self, step: &str, elapsed: Duration) {
        self.steps.push((step.to_owned(), elapsed));
    }

    fn on_checkpoint(&mut self, name: &str) {
        self.checkpoints.push(name.to_owned());
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let root = std::env::args().nth(1).map_or_else(|| PathBuf::from("output/xsmall"), PathBuf::from);
    println!("=== xsmall — tour OD choice ===");
    println!("Persons: {PERSON_COUNT}  |  Tours: {TOUR_COUNT}  |  Seed: {SEED}");
    println!("Working dir: {}", root.display());
    println!();

    // 1. Configs and data.
    write_region(&root)?;
    let fs = FileSystem::new(root.clone());
    let settings = fs.read_settings()?;
    let network = NetworkSettings::from_toml_str(&std::fs::read_to_string(fs.get_config_file_path("network_los.toml")?)?)?;
    info!(mazs = MAZS.len(), tazs = TAZS.len(), "synthetic region written");

    // 2. Run.
    let mut state = State::builder()
        .registry(registry()?)
        .settings(settings)
        .filesystem(fs)
        .network_settings(network)
        .build();
    let mut timer = StepTimer::default();
    let t0 = Instant::now();
    state.run_all(&mut timer)?;
    let elapsed = t0.elapsed();

    // 3. Summarize destinations by TAZ.
    let tours = state.get_table("tours", None)?;
    let los = state.get::<NetworkLos>("network_los")?;
    let tour_types = tours.strs("tour_type")?;
    let destinations = tours.ints("destination")?;
    let logsums = tours.floats("od_logsum")?;

    let mut by_taz: BTreeMap<(i64, &str), usize> = BTreeMap::new();
    for (dest, kind) in destinations.iter().zip(tour_types) {
        let taz = los.map_maz_to_taz(ZoneId(*dest))?.0;
        *by_taz.entry((taz, kind.as_str())).or_default() += 1;
    }
    let sample_rows = state.get_table("tour_od_choice_sample", None).map_or(0, |t| t.len());

    println!("Pipeline complete in {:.3} s", elapsed.as_secs_f64());
    for (step, took) in &timer.steps {
        println!("  {step:<16} {:.3} s", took.as_secs_f64());
    }
    println!("  checkpoints    : {}", timer.checkpoints.join(", "));
    println!("  sample rows    : {sample_rows}");
    println!();

    println!("{:<8} {:<8} {:<8}", "TAZ", "Segment", "Tours");
    println!("{}", "-".repeat(26));
    for ((taz, kind), n) in &by_taz {
        println!("{taz:<8} {kind:<8} {n:<8}");
    }
    let mean_logsum = logsums.iter().sum::<f64>() / logsums.len().max(1) as f64;
    println!();
    println!("Mean OD logsum: {mean_logsum:.3}");

    // 4. Machine-readable summary next to the checkpoints.
    let output_dir = state.filesystem()?.get_output_dir().to_path_buf();
    std::fs::create_dir_all(&output_dir)?;
    let summary = json!({
        "tours":        tours.len(),
        "elapsed_secs": elapsed.as_secs_f64(),
        "checkpoints":  timer.checkpoints,
        "sample_rows":  sample_rows,
        "mean_logsum":  mean_logsum,
        "destinations": by_taz
            .iter()
            .map(|((taz, kind), n)| json!({ "taz": taz, "segment": kind, "tours": n }))
            .collect::<Vec<_>>(),
    });
    serde_json::to_writer_pretty(File::create(output_dir.join("summary.json"))?, &summary)?;

    state.close_pipeline()?;
    Ok(())
}
