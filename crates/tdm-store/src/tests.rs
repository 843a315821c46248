//! Backend tests for tdm-store.

#[cfg(test)]
fn sample_table() -> tdm_core::Table {
    tdm_core::Table::new("tour_id", vec![101, 102, 103])
        .with_column("person_id", vec![1i64, 1, 2])
        .unwrap()
        .with_column("tour_type", vec!["work", "", "shop, mall"])
        .unwrap()
        .with_column("size_term", vec![0.125, 15.0, -3.5])
        .unwrap()
        .with_column("is_joint", vec![false, true, false])
        .unwrap()
}

#[cfg(test)]
mod keys {
    use crate::{StoreError, pipeline_table_key};
    use crate::store::validate_key;

    #[test]
    fn key_forms() {
        assert_eq!(pipeline_table_key("tours", Some("init")), "tours/init");
        assert_eq!(pipeline_table_key("tours", None), "/tours");
    }

    #[test]
    fn traversal_rejected() {
        assert!(matches!(validate_key("../etc"), Err(StoreError::InvalidKey(_))));
        assert!(matches!(validate_key("tours//x"), Err(StoreError::InvalidKey(_))));
        assert!(validate_key("/tours").is_ok());
        assert!(validate_key("tours/tour_od_choice").is_ok());
    }
}

#[cfg(test)]
mod memory_tests {
    use super::sample_table;
    use crate::{CheckpointStore, MemoryStore, StoreError};

    #[test]
    fn write_then_read() {
        let mut store = MemoryStore::new();
        store.write_table("tours/init", &sample_table()).unwrap();
        assert!(store.contains("tours/init"));
        assert_eq!(store.read_table("tours/init").unwrap(), sample_table());
        assert!(matches!(store.read_table("tours/other"), Err(StoreError::NotFound(_))));
    }
}

#[cfg(test)]
mod csv_tests {
    use tempfile::TempDir;

    use super::sample_table;
    use crate::{CheckpointStore, CsvStore, StoreError, open_store};

    fn tmp() -> TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    #[test]
    fn layout_on_disk() {
        let dir = tmp();
        let mut store = CsvStore::new(dir.path()).unwrap();
        store.write_table("tours/init", &sample_table()).unwrap();
        store.write_table("/land_use", &sample_table()).unwrap();
        assert!(dir.path().join("tours").join("init.csv").exists());
        assert!(dir.path().join("land_use.csv").exists());
    }

    #[test]
    fn typed_header() {
        let dir = tmp();
        let mut store = CsvStore::new(dir.path()).unwrap();
        store.write_table("tours/init", &sample_table()).unwrap();

        let mut rdr = csv::Reader::from_path(dir.path().join("tours/init.csv")).unwrap();
        let headers: Vec<_> = rdr.headers().unwrap().iter().map(str::to_owned).collect();
        assert_eq!(headers, ["tour_id:index", "person_id:int", "tour_type:str", "size_term:float", "is_joint:bool"]);
    }

    #[test]
    fn read_back_exact() {
        let dir = tmp();
        let mut store = CsvStore::new(dir.path()).unwrap();
        store.write_table("tours/init", &sample_table()).unwrap();
        let back = store.read_table("tours/init").unwrap();
        assert_eq!(back, sample_table());
        assert_eq!(back.index_name(), "tour_id");
    }

    #[test]
    fn nan_survives() {
        let dir = tmp();
        let mut store = CsvStore::new(dir.path()).unwrap();
        let t = tdm_core::Table::new("id", vec![1]).with_column("x", vec![f64::NAN]).unwrap();
        store.write_table("t/a", &t).unwrap();
        assert!(store.read_table("t/a").unwrap().floats("x").unwrap()[0].is_nan());
    }

    #[test]
    fn missing_key() {
        let dir = tmp();
        let store = CsvStore::new(dir.path()).unwrap();
        assert!(!store.contains("tours/init"));
        assert!(matches!(store.read_table("tours/init"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn factory() {
        let dir = tmp();
        let mut store = open_store("csv", dir.path()).unwrap();
        store.write_table("a/b", &sample_table()).unwrap();
        assert!(store.contains("a/b"));
        assert!(matches!(open_store("hdf5", dir.path()), Err(StoreError::UnknownFormat(_))));
    }
}

// ── SQLite tests ──────────────────────────────────────────────────────────────

#[cfg(all(test, feature = "sqlite"))]
mod sqlite_tests {
    use super::sample_table;
    use crate::{CheckpointStore, SqliteStore, StoreError};

    #[test]
    fn db_created_and_round_trips() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut store = SqliteStore::new(dir.path()).unwrap();
        assert!(dir.path().join("pipeline.db").exists());

        store.write_table("tours/init", &sample_table()).unwrap();
        assert_eq!(store.read_table("tours/init").unwrap(), sample_table());
        assert!(store.contains("tours/init"));
        assert!(matches!(store.read_table("tours/x"), Err(StoreError::NotFound(_))));
        store.close().unwrap();
        store.close().unwrap();
    }

    #[test]
    fn rewrite_replaces() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut store = SqliteStore::new(dir.path()).unwrap();
        store.write_table("checkpoints", &sample_table()).unwrap();
        let smaller = sample_table().take(&[0]);
        store.write_table("checkpoints", &smaller).unwrap();
        assert_eq!(store.read_table("checkpoints").unwrap().len(), 1);
    }
}

// ── Parquet tests ─────────────────────────────────────────────────────────────

#[cfg(all(test, feature = "parquet"))]
mod parquet_tests {
    use super::sample_table;
    use crate::{CheckpointStore, ParquetStore};

    #[test]
    fn round_trip_keeps_index_name() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut store = ParquetStore::new(dir.path()).unwrap();
        store.write_table("tours/init", &sample_table()).unwrap();
        assert!(dir.path().join("tours/init.parquet").exists());
        let back = store.read_table("tours/init").unwrap();
        assert_eq!(back, sample_table());
        assert_eq!(back.index_name(), "tour_id");
    }

    #[test]
    fn empty_table() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut store = ParquetStore::new(dir.path()).unwrap();
        let empty = sample_table().take(&[]);
        store.write_table("trips/init", &empty).unwrap();
        let back = store.read_table("trips/init").unwrap();
        assert!(back.is_empty());
        assert_eq!(back.width(), 4);
    }
}
