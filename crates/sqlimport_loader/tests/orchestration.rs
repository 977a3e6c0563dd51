//! End-to-end loads against the in-memory database.

use sqlimport_core::{HeaderMode, LoadError, SqlValue, TableName};
use sqlimport_loader::{
    LoadOptions, LoadOrchestrator, LoadPhase, LoadRequest, LocalTransport, ProgressMode,
    TransportConfig,
};
use sqlimport_test_utils::fixtures::{self, list_files};
use sqlimport_test_utils::{FaultyTransport, MemoryDatabase, SourceFixture};
use tempfile::TempDir;

fn people() -> TableName {
    TableName::with_schema("dbo", "people")
}

fn people_db() -> MemoryDatabase {
    let mut db = MemoryDatabase::new();
    db.create_table(people(), fixtures::columns(&[("id", "int"), ("name", "varchar")]));
    db
}

fn streaming(header_mode: HeaderMode) -> LoadOptions {
    LoadOptions {
        header_mode,
        progress: ProgressMode::Silent,
        ..LoadOptions::row_streaming()
    }
}

fn staged(header_mode: HeaderMode) -> LoadOptions {
    LoadOptions {
        header_mode,
        delimiter: ',',
        progress: ProgressMode::Silent,
        ..LoadOptions::server_staged(TransportConfig::default())
    }
}

struct Dirs {
    work: TempDir,
    stage: TempDir,
}

impl Dirs {
    fn new() -> Self {
        Self {
            work: tempfile::tempdir().unwrap(),
            stage: tempfile::tempdir().unwrap(),
        }
    }

    fn assert_empty(&self) {
        assert!(list_files(self.work.path()).unwrap().is_empty(), "work dir not cleaned");
        assert!(list_files(self.stage.path()).unwrap().is_empty(), "stage dir not cleaned");
    }
}

#[tokio::test]
async fn test_streaming_scenario_a() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "id,name\n1,Alice\n2,Bob\n").unwrap();
    let mut db = people_db();

    let report = LoadOrchestrator::new(&mut db, streaming(HeaderMode::ByName))
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert_eq!(report.stats.rows_processed, 2);
    assert_eq!(report.rows_rejected, 0);
    assert_eq!(report.strategy, "row-streaming");
    assert_eq!(
        db.rows(&people()),
        &[
            vec![SqlValue::Int(1), SqlValue::Text("Alice".to_string())],
            vec![SqlValue::Int(2), SqlValue::Text("Bob".to_string())],
        ]
    );
    assert!(source.exists());
}

#[tokio::test]
async fn test_staged_scenario_a() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "id,name\n1,Alice\n2,Bob\n").unwrap();
    let dirs = Dirs::new();
    let mut db = people_db();

    let report = LoadOrchestrator::new(&mut db, staged(HeaderMode::ByName))
        .with_transport(Box::new(LocalTransport::new(
            Some(dirs.stage.path().to_path_buf()),
            None,
        )))
        .with_work_dir(dirs.work.path())
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert_eq!(report.stats.rows_processed, 2);
    assert!(report.staged_copy);

    let inserts = db.bulk_inserts();
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].records(), vec!["1,Alice", "2,Bob"]);
    let format = inserts[0].format.as_deref().unwrap();
    assert_eq!(format.matches("<FIELD ").count(), 2);
    assert_eq!(format.matches("<COLUMN ").count(), 2);
    assert!(format.contains(r#"NAME="id" xsi:type="SQLINT""#));
    assert!(format.contains(r#"TERMINATOR="\r\n""#));

    let arithabort = db.statements().iter().position(|s| s == "SET ARITHABORT ON");
    let bulk = db.statements().iter().position(|s| s.starts_with("BULK INSERT"));
    assert!(arithabort.unwrap() < bulk.unwrap());

    dirs.assert_empty();
    assert!(source.exists());
}

#[tokio::test]
async fn test_staged_reorders_by_header_name() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture
        .write("people.csv", "NAME,Id,shoe_size\nAlice,1,38\nBob,2,44\n")
        .unwrap();
    let dirs = Dirs::new();
    let mut db = people_db();

    let report = LoadOrchestrator::new(&mut db, staged(HeaderMode::ByName))
        .with_transport(Box::new(LocalTransport::in_place()))
        .with_work_dir(dirs.work.path())
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert_eq!(report.unmatched_headers, vec!["shoe_size".to_string()]);
    assert_eq!(db.bulk_inserts()[0].records(), vec!["1,Alice", "2,Bob"]);
    dirs.assert_empty();
}

#[tokio::test]
async fn test_staged_repairs_row_widths() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("wide.csv", "1,2,3\n1,2,3,4,5,6,7\n").unwrap();
    let dirs = Dirs::new();
    let table = TableName::new("wide");
    let mut db = MemoryDatabase::new();
    db.create_table(
        table.clone(),
        fixtures::columns(&[("a", "int"), ("b", "int"), ("c", "int"), ("d", "int"), ("e", "int")]),
    );

    LoadOrchestrator::new(&mut db, staged(HeaderMode::NoHeader))
        .with_transport(Box::new(LocalTransport::in_place()))
        .with_work_dir(dirs.work.path())
        .run(&LoadRequest::new(&source, table))
        .await
        .unwrap();

    assert_eq!(db.bulk_inserts()[0].records(), vec!["1,2,3,,", "1,2,3,4,5"]);
    dirs.assert_empty();
}

#[tokio::test]
async fn test_clean_source_is_loaded_in_place() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("clean.csv", "1,Alice\r\n2,Bob\r\n").unwrap();
    let dirs = Dirs::new();
    let mut db = people_db();

    let report = LoadOrchestrator::new(&mut db, staged(HeaderMode::NoHeader))
        .with_transport(Box::new(LocalTransport::in_place()))
        .with_work_dir(dirs.work.path())
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert!(!report.staged_copy);
    assert_eq!(db.bulk_inserts()[0].data_path, source.display().to_string());
    assert!(source.exists());
    assert_eq!(fixture.file_names().unwrap(), vec!["clean.csv".to_string()]);
    dirs.assert_empty();
}

#[tokio::test]
async fn test_streaming_batches() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture
        .write("people.csv", "1,a\n2,b\n3,c\n4,d\n5,e\n")
        .unwrap();

    let mut db = people_db();
    let opts = LoadOptions {
        batch_size: 2,
        ..streaming(HeaderMode::NoHeader)
    };
    LoadOrchestrator::new(&mut db, opts)
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();
    assert_eq!(db.batches(), &[2, 2, 1]);

    let mut db = people_db();
    let opts = LoadOptions {
        batch_size: 0,
        ..streaming(HeaderMode::NoHeader)
    };
    LoadOrchestrator::new(&mut db, opts)
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();
    assert_eq!(db.batches(), &[5]);
}

#[tokio::test]
async fn test_streaming_rejects_bad_rows_and_continues() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "1,a\nx,b\n\n3,c\n").unwrap();
    let mut db = people_db();

    let report = LoadOrchestrator::new(&mut db, streaming(HeaderMode::NoHeader))
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert_eq!(report.stats.rows_processed, 2);
    assert_eq!(report.rows_rejected, 1);
}

#[tokio::test]
async fn test_streaming_skips_invalid_utf8_lines() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture
        .write_bytes("people.csv", b"1,a\n2,b\n3,caf\xe9\n4,d\n")
        .unwrap();
    let mut db = people_db();
    let opts = LoadOptions {
        batch_size: 2,
        ..streaming(HeaderMode::NoHeader)
    };

    let report = LoadOrchestrator::new(&mut db, opts)
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert_eq!(report.stats.rows_processed, 3);
    assert_eq!(report.rows_rejected, 1);
    assert_eq!(db.batches(), &[2, 1]);
    assert_eq!(db.rows(&people())[2][0], SqlValue::Int(4));
}

#[tokio::test]
async fn test_streaming_drops_bom_without_header() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture
        .write("people.csv", "\u{feff}1,Alice\n2,Bob\n")
        .unwrap();
    let mut db = people_db();

    let report = LoadOrchestrator::new(&mut db, streaming(HeaderMode::NoHeader))
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert_eq!(report.rows_rejected, 0);
    assert_eq!(
        db.rows(&people())[0],
        vec![SqlValue::Int(1), SqlValue::Text("Alice".to_string())]
    );
}

#[tokio::test]
async fn test_staged_drops_bom_without_header() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture
        .write("people.csv", "\u{feff}1,Alice\r\n2,Bob\r\n")
        .unwrap();
    let dirs = Dirs::new();
    let mut db = people_db();

    let report = LoadOrchestrator::new(&mut db, staged(HeaderMode::NoHeader))
        .with_transport(Box::new(LocalTransport::in_place()))
        .with_work_dir(dirs.work.path())
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert!(report.staged_copy);
    assert_eq!(db.bulk_inserts()[0].records(), vec!["1,Alice", "2,Bob"]);
    dirs.assert_empty();
}

#[tokio::test]
async fn test_mixed_line_endings_are_staged() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture
        .write("people.csv", "1,Alice\r\n2,Bob\n3,Cy\r\n")
        .unwrap();
    let dirs = Dirs::new();
    let mut db = people_db();

    let report = LoadOrchestrator::new(&mut db, staged(HeaderMode::NoHeader))
        .with_transport(Box::new(LocalTransport::in_place()))
        .with_work_dir(dirs.work.path())
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert!(report.staged_copy);
    assert_eq!(
        db.bulk_inserts()[0].records(),
        vec!["1,Alice", "2,Bob", "3,Cy"]
    );
    dirs.assert_empty();
}

#[tokio::test]
async fn test_engine_dir_without_staging_dir_is_rejected() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "1,Alice\r\n").unwrap();
    let mut db = people_db();
    let opts = LoadOptions {
        delimiter: ',',
        progress: ProgressMode::Silent,
        ..LoadOptions::server_staged(TransportConfig::LocalOrMappedPath {
            staging_dir: None,
            engine_dir: Some("/share".to_string()),
        })
    };

    let err = LoadOrchestrator::new(&mut db, opts)
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::InvalidConfig(_)));
    assert!(db.bulk_inserts().is_empty());
}

#[tokio::test]
async fn test_failed_batch_reports_committed_rows() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture
        .write("people.csv", "1,a\n2,b\n3,c\n4,d\n5,e\n")
        .unwrap();
    let mut db = people_db();
    db.fail_bulk_copy_batch(2);

    let opts = LoadOptions {
        batch_size: 2,
        ..streaming(HeaderMode::NoHeader)
    };
    let err = LoadOrchestrator::new(&mut db, opts)
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap_err();

    match err {
        LoadError::Execution { rows_committed, .. } => assert_eq!(rows_committed, 2),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(db.rows(&people()).len(), 2);
}

#[tokio::test]
async fn test_missing_source_fails_before_any_statement() {
    let fixture = SourceFixture::new().unwrap();
    let mut db = people_db();
    let opts = LoadOptions {
        truncate: true,
        ..streaming(HeaderMode::NoHeader)
    };

    let err = LoadOrchestrator::new(&mut db, opts)
        .run(&LoadRequest::new(fixture.path().join("nope.csv"), people()))
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::SourceNotFound { .. }));
    assert!(db.statements().is_empty());
}

#[tokio::test]
async fn test_missing_table() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("x.csv", "1\n").unwrap();
    let mut db = MemoryDatabase::new();

    let err = LoadOrchestrator::new(&mut db, streaming(HeaderMode::NoHeader))
        .run(&LoadRequest::new(&source, TableName::new("ghost")))
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::TableNotFound { .. }));
}

#[tokio::test]
async fn test_strict_header_mismatch() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "id,full_name\n1,Alice\n").unwrap();
    let mut db = people_db();
    let opts = LoadOptions {
        strict_header: true,
        ..streaming(HeaderMode::ByName)
    };

    let err = LoadOrchestrator::new(&mut db, opts)
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap_err();
    match err {
        LoadError::ColumnMismatch {
            position, found, ..
        } => {
            assert_eq!(position, 2);
            assert_eq!(found, "full_name");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_truncate_runs_before_load() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "3,Carol\n").unwrap();
    let mut db = people_db();
    db.insert_rows(
        &people(),
        vec![vec![SqlValue::Int(1), SqlValue::Text("old".to_string())]],
    );
    let opts = LoadOptions {
        truncate: true,
        ..streaming(HeaderMode::NoHeader)
    };

    let report = LoadOrchestrator::new(&mut db, opts)
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert_eq!(
        &report.phases[..3],
        &[
            LoadPhase::ValidateSource,
            LoadPhase::Truncate,
            LoadPhase::ValidateTable
        ]
    );
    assert_eq!(
        db.rows(&people()),
        &[vec![SqlValue::Int(3), SqlValue::Text("Carol".to_string())]]
    );
}

#[tokio::test]
async fn test_maintenance_wraps_the_load() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "1,Alice\n").unwrap();
    let mut db = people_db();
    let opts = streaming(HeaderMode::NoHeader).high_performance();

    let report = LoadOrchestrator::new(&mut db, opts)
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert!(!report.is_degraded());
    assert_eq!(
        report.phases,
        vec![
            LoadPhase::ValidateSource,
            LoadPhase::ValidateTable,
            LoadPhase::DisableConstraints,
            LoadPhase::DisableIndexes,
            LoadPhase::ExecuteLoad,
            LoadPhase::RebuildIndexes,
            LoadPhase::ReenableConstraints,
            LoadPhase::ReportStats,
            LoadPhase::Cleanup,
        ]
    );
    let statements = db.statements();
    assert_eq!(statements.len(), 4);
    assert!(statements[0].contains("NOCHECK CONSTRAINT ALL"));
    assert!(statements[1].contains("NONCLUSTERED"));
    assert_eq!(statements[2], "ALTER INDEX ALL ON [dbo].[people] REBUILD");
    assert_eq!(statements[3], "ALTER TABLE [dbo].[people] CHECK CONSTRAINT ALL");
}

#[tokio::test]
async fn test_maintenance_failures_do_not_abort() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "1,Alice\n").unwrap();
    let mut db = people_db();
    db.fail_statements_containing("NOCHECK");
    db.fail_statements_containing("REBUILD");
    let opts = streaming(HeaderMode::NoHeader).high_performance();

    let report = LoadOrchestrator::new(&mut db, opts)
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert_eq!(report.stats.rows_processed, 1);
    assert!(report.is_degraded());
    assert_eq!(report.maintenance_warnings.len(), 2);
    assert!(report.maintenance_warnings[1].contains("remain disabled"));
    // constraints were never disabled, so nothing to re-enable
    assert!(!db.executed("ALTER TABLE [dbo].[people] CHECK CONSTRAINT ALL"));
}

#[tokio::test]
async fn test_restore_runs_after_failed_load() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "1,Alice\n").unwrap();
    let dirs = Dirs::new();
    let mut db = people_db();
    db.fail_statements_containing("BULK INSERT");
    let opts = staged(HeaderMode::NoHeader).high_performance();

    let err = LoadOrchestrator::new(&mut db, opts)
        .with_transport(Box::new(FaultyTransport::new(dirs.stage.path())))
        .with_work_dir(dirs.work.path())
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::Execution { rows_committed: 0, .. }));
    assert!(db.executed("REBUILD"));
    assert!(db.executed("ALTER TABLE [dbo].[people] CHECK CONSTRAINT ALL"));
    dirs.assert_empty();
    assert!(source.exists());
}

#[tokio::test]
async fn test_cleanup_after_transport_failure() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "id,name\n1,Alice\n").unwrap();
    let dirs = Dirs::new();
    let mut db = people_db();

    // the data file stages, the format file does not
    let err = LoadOrchestrator::new(&mut db, staged(HeaderMode::ByPosition))
        .with_transport(Box::new(
            FaultyTransport::new(dirs.stage.path()).fail_stage_at(2),
        ))
        .with_work_dir(dirs.work.path())
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::Transport { .. }));
    assert!(db.bulk_inserts().is_empty());
    dirs.assert_empty();
    assert!(source.exists());
}

#[tokio::test]
async fn test_cleanup_failures_are_reported_not_raised() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "1,Alice\n").unwrap();
    let dirs = Dirs::new();
    let mut db = people_db();

    let report = LoadOrchestrator::new(&mut db, staged(HeaderMode::NoHeader))
        .with_transport(Box::new(FaultyTransport::new(dirs.stage.path()).fail_remove()))
        .with_work_dir(dirs.work.path())
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();

    assert_eq!(report.cleanup_warnings.len(), 2);
    assert_eq!(report.stats.rows_processed, 1);
    // temp files in the work dir are still removed
    assert!(list_files(dirs.work.path()).unwrap().is_empty());
}

#[tokio::test]
async fn test_report_serializes() {
    let fixture = SourceFixture::new().unwrap();
    let source = fixture.write("people.csv", "1,Alice\n").unwrap();
    let mut db = people_db();

    let report = LoadOrchestrator::new(&mut db, streaming(HeaderMode::NoHeader))
        .run(&LoadRequest::new(&source, people()))
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["table"], "dbo.people");
    assert_eq!(json["stats"]["rows_processed"], 1);
    assert_eq!(json["phases"][0], "validate_source");
}
