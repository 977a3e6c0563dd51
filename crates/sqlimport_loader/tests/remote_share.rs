//! Remote share transport against a scripted SMB client.

#![cfg(unix)]

use sqlimport_core::LoadError;
use sqlimport_loader::{RemoteShareConfig, RemoteShareTransport, StagingTransport};
use sqlimport_test_utils::SourceFixture;
use std::path::Path;

/// The script is passed as the "share" and run through `sh`, so the
/// transport's arguments arrive as `$1..$4`.
fn config(script: &Path) -> RemoteShareConfig {
    RemoteShareConfig {
        share: script.display().to_string(),
        directory: "incoming".to_string(),
        username: "loader".to_string(),
        password: "s3cret".to_string(),
        domain: Some("CORP".to_string()),
        engine_dir: r"\\files\import\incoming".to_string(),
        client: "sh".to_string(),
    }
}

#[tokio::test]
async fn test_stage_and_remove_invoke_client() {
    let fixture = SourceFixture::new().unwrap();
    let log = fixture.path().join("calls.log");
    let script = fixture
        .write(
            "client.sh",
            &format!(
                "printf '%s\\n' \"$@\" >> '{log}'\nprintf 'PASSWD=%s\\n' \"$PASSWD\" >> '{log}'\n",
                log = log.display()
            ),
        )
        .unwrap();
    let data = fixture.write("data.csv", "1|a\r\n").unwrap();

    let transport = RemoteShareTransport::new(config(&script));
    let staged = transport.stage(&data, "load_1.csv").await.unwrap();
    assert_eq!(staged.engine_path, r"\\files\import\incoming\load_1.csv");
    transport.remove(&staged).await.unwrap();

    let calls = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = calls.lines().collect();
    assert_eq!(lines[0], "-U");
    assert_eq!(lines[1], r"CORP\loader");
    assert_eq!(lines[2], "-c");
    assert_eq!(
        lines[3],
        format!("cd \"incoming\"; put \"{}\" \"load_1.csv\"", data.display())
    );
    assert_eq!(lines[4], "PASSWD=s3cret");
    assert_eq!(lines[8], "cd \"incoming\"; del \"load_1.csv\"");
}

#[tokio::test]
async fn test_non_zero_exit_is_transport_error() {
    let fixture = SourceFixture::new().unwrap();
    let script = fixture
        .write("client.sh", "echo NT_STATUS_ACCESS_DENIED >&2\nexit 1\n")
        .unwrap();

    let transport = RemoteShareTransport::new(config(&script));
    let err = transport
        .stage(Path::new("/tmp/whatever.csv"), "x.csv")
        .await
        .unwrap_err();

    match err {
        LoadError::Transport { message, .. } => {
            assert!(message.contains("NT_STATUS_ACCESS_DENIED"), "{message}")
        }
        other => panic!("unexpected error: {other}"),
    }
}
