//! Filesystem and node commands against the simulated device.

use std::time::Duration;

use nodeup::{Error, PollingMode, RemoteFile, Session, SessionConfig};
use nodeup_sim::SimulatedDevice;

fn session_for(device: SimulatedDevice) -> Session<SimulatedDevice> {
    let config = SessionConfig::default()
        .with_timeout_secs(1)
        .with_autobaud_time(Duration::ZERO)
        .with_polling(PollingMode::Fine);
    Session::new(device, &config).unwrap()
}

#[test]
fn test_file_list() {
    let device = SimulatedDevice::new()
        .with_file("init.lua", vec![b'x'; 120])
        .with_file("data.bin", vec![0u8; 4096]);
    let mut session = session_for(device);

    let files = session.file_list().unwrap();
    assert_eq!(
        files,
        vec![
            RemoteFile {
                name: "data.bin".to_string(),
                size: 4096
            },
            RemoteFile {
                name: "init.lua".to_string(),
                size: 120
            },
        ]
    );
}

#[test]
fn test_empty_file_list() {
    let mut session = session_for(SimulatedDevice::new());
    assert!(session.file_list().unwrap().is_empty());
}

#[test]
fn test_node_heap() {
    let mut session = session_for(SimulatedDevice::new().with_heap(21_344));
    assert_eq!(session.node_heap().unwrap(), 21_344);
}

#[test]
fn test_file_format() {
    let device = SimulatedDevice::new().with_file("a.lua", b"x".to_vec());
    let handle = device.handle();
    let mut session = session_for(device);

    let reply = session.file_format().unwrap();
    assert!(reply.is_format_done());
    assert!(handle.file_names().is_empty());
}

#[test]
fn test_file_remove() {
    let device = SimulatedDevice::new()
        .with_file("a.lua", b"a".to_vec())
        .with_file("b.lua", b"b".to_vec())
        .with_file("c.lua", b"c".to_vec());
    let handle = device.handle();
    let mut session = session_for(device);

    session.file_remove("a.lua").unwrap();
    assert_eq!(handle.file_names(), vec!["b.lua", "c.lua"]);

    session.file_remove_all().unwrap();
    assert!(handle.file_names().is_empty());

    assert!(matches!(session.file_remove(""), Err(Error::Validation(_))));
}

#[test]
fn test_file_compile() {
    let device = SimulatedDevice::new().with_file("app.lua", b"print(1)".to_vec());
    let handle = device.handle();
    let mut session = session_for(device);

    session.file_compile("app.lua").unwrap();
    assert!(handle.file("app.lc").is_some());

    let err = session.file_compile("missing.lua").unwrap_err();
    match err {
        Error::RemoteError { command, response } => {
            assert_eq!(command, "node.compile(\"missing.lua\")");
            assert!(response.contains("stdin"));
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[test]
fn test_file_do_and_print() {
    let device = SimulatedDevice::new().with_file("init.lua", b"print('boot')\n".to_vec());
    let handle = device.handle();
    let mut session = session_for(device);

    session.file_do("init.lua").unwrap();
    assert_eq!(handle.stats().files_executed, vec!["init.lua"]);

    let reply = session.file_print("init.lua").unwrap();
    assert!(reply.text().contains("---init.lua---\nprint('boot')\n---\n"));
}

#[test]
fn test_exec_lines() {
    let mut session = session_for(SimulatedDevice::new());

    let replies = session.exec_lines("x = 1\nprint(\"hi\")\nprint(3)").unwrap();
    assert_eq!(replies.len(), 3);
    assert!(!replies[0].has_error_marker());
    assert_eq!(replies[1].body_lines(), vec!["hi"]);
    assert_eq!(replies[2].body_lines(), vec!["3"]);

    let replies = session.exec_lines("1 +").unwrap();
    assert!(replies[0].has_error_marker());
}

#[test]
fn test_exec_file() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("setup.lua");
    std::fs::write(&script, "wifi_ssid = 'home'\nprint('configured')\n").unwrap();

    let device = SimulatedDevice::new();
    let handle = device.handle();
    let mut session = session_for(device);

    let replies = session.exec_file(&script).unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[1].body_lines(), vec!["configured"]);
    let executed = handle.stats().lines_executed;
    assert!(executed.ends_with(&["wifi_ssid = 'home'".to_string(), "print('configured')".to_string()]));
}
