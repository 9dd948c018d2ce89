//! Synchronization, baud negotiation and bootstrap against the simulated
//! device.

use std::time::{Duration, Instant};

use nodeup::{Error, PollingMode, PrepareOutcome, Session, SessionConfig, SyncState, Transport, Verify};
use nodeup_protocol::{CompanionProgram, COMPANION_FUNCTIONS};
use nodeup_sim::{Fault, SimulatedDevice};

fn test_config() -> SessionConfig {
    SessionConfig::default()
        .with_timeout_secs(1)
        .with_autobaud_time(Duration::ZERO)
        .with_polling(PollingMode::Fine)
}

#[test]
fn test_sync_with_autobaud() {
    let device = SimulatedDevice::new();
    let handle = device.handle();
    let config = test_config().with_autobaud_time(Duration::from_millis(20));
    let session = Session::new(device, &config).unwrap();

    assert_eq!(session.state(), SyncState::Synced);
    let lines = handle.stats().lines_executed;
    assert_eq!(lines, vec!["UUUUUUUUUUUU", ";", "print(\"%sync%\");"]);
}

#[test]
fn test_sync_survives_boot_banner() {
    let banners: [&[u8]; 3] = [
        b"\xf8\x00\xfe rl\x0c\r\nNodeMCU 3.0.0.0 built on nodemcu-build.com\r\n lua: cannot open init.lua\r\n> ",
        b"half typed line without prompt",
        b"> > > ",
    ];
    for banner in banners {
        let device = SimulatedDevice::new().with_banner(banner);
        let mut session = Session::new(device, &test_config()).unwrap();
        assert_eq!(session.state(), SyncState::Synced);

        let reply = session.exchange("print(42)").unwrap();
        assert_eq!(reply.text(), "print(42)\r\n42\r\n> ");
    }
}

#[test]
fn test_silent_device_not_found() {
    let timeout = Duration::from_secs(1);
    let start = Instant::now();
    let err = Session::new(SimulatedDevice::silent(), &test_config()).unwrap_err();

    assert!(matches!(err, Error::DeviceNotFound { ref port } if port == "simulated"), "got {:?}", err);
    assert!(start.elapsed() < timeout + Duration::from_millis(500));
}

#[test]
fn test_wrong_baud_not_found() {
    let device = SimulatedDevice::new().with_boot_baud(9600);
    let handle = device.handle();
    let err = Session::new(device, &test_config()).unwrap_err();

    assert!(matches!(err, Error::DeviceNotFound { .. }), "got {:?}", err);
    assert!(handle.stats().garbled_bytes > 0);
}

#[test]
fn test_baud_negotiation_and_restore() {
    let device = SimulatedDevice::new();
    let handle = device.handle();
    let config = test_config().with_baud(230_400);
    let mut session = Session::new(device, &config).unwrap();

    assert_eq!(session.baud(), 230_400);
    assert_eq!(session.start_baud(), 115_200);
    assert_eq!(handle.baud(), 230_400);
    assert_eq!(session.transport().baud_rate().unwrap(), 230_400);

    session.prepare().unwrap();
    session.write_bytes("fast.bin", &[0x5a; 600], Verify::Raw).unwrap();
    assert_eq!(handle.stats().garbled_bytes, 0);

    session.close();
    assert_eq!(handle.baud(), 115_200);
    assert_eq!(session.transport().baud_rate().unwrap(), 115_200);
    assert!(matches!(session.node_heap(), Err(Error::Closed)));

    session.close();
    assert_eq!(handle.baud(), 115_200);
}

#[test]
fn test_set_baudrate_mid_session() {
    let device = SimulatedDevice::new();
    let handle = device.handle();
    let mut session = Session::new(device, &test_config()).unwrap();

    session.set_baudrate(57_600).unwrap();
    assert_eq!(session.state(), SyncState::Synced);
    assert_eq!(handle.baud(), 57_600);
    assert_eq!(session.exchange("print(7)").unwrap().text(), "print(7)\r\n7\r\n> ");
}

#[test]
fn test_failed_resync_after_baud_change() {
    let device = SimulatedDevice::new().with_fault(Fault::IgnoreBaudChange);
    let handle = device.handle();
    let err = Session::new(device, &test_config().with_baud(230_400)).unwrap_err();

    assert!(matches!(err, Error::DeviceNotFound { .. }), "got {:?}", err);
    let stats = handle.stats();
    assert!(stats.lines_executed.contains(&"uart.setup(0,230400,8,0,1,1)".to_string()));
    assert!(stats.garbled_bytes > 0);
    assert_eq!(handle.baud(), 115_200);
}

#[test]
fn test_set_baudrate_fails_when_device_stays() {
    let device = SimulatedDevice::new();
    let handle = device.handle();
    let mut session = Session::new(device, &test_config()).unwrap();
    handle.add_fault(Fault::IgnoreBaudChange);

    let err = session.set_baudrate(57_600).unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound { .. }), "got {:?}", err);
    assert_eq!(handle.baud(), 115_200);
}

#[test]
fn test_set_timeout_zero_is_unbounded() {
    let mut session = Session::new(SimulatedDevice::new(), &test_config()).unwrap();
    session.set_timeout(0);
    assert_eq!(session.timeout(), nodeup::UNBOUNDED_TIMEOUT);
    session.set_timeout(2);
    assert_eq!(session.timeout(), Duration::from_secs(2));
}

#[test]
fn test_prepare_installs_companion() {
    let device = SimulatedDevice::new();
    let handle = device.handle();
    let mut session = Session::new(device, &test_config()).unwrap();

    let expected_lines = CompanionProgram::new(115_200).lines().len();
    assert_eq!(
        session.prepare().unwrap(),
        PrepareOutcome::Installed {
            lines: expected_lines
        }
    );
    for name in COMPANION_FUNCTIONS {
        assert!(handle.has_function(name), "{} not defined", name);
    }
    assert_eq!(handle.stats().definition_lines, expected_lines);
}

#[test]
fn test_prepare_is_idempotent() {
    let device = SimulatedDevice::new();
    let handle = device.handle();
    let mut session = Session::new(device, &test_config()).unwrap();
    session.prepare().unwrap();
    handle.reset_stats();

    assert_eq!(session.prepare().unwrap(), PrepareOutcome::AlreadyPresent);
    let stats = handle.stats();
    assert_eq!(stats.definition_lines, 0);
    assert_eq!(
        stats.lines_executed,
        vec!["print(recv)", "print(shafile)", "print(send)"]
    );
}

#[test]
fn test_prepare_stops_on_rejected_line() {
    let device = SimulatedDevice::new().with_fault(Fault::RejectDefinitions);
    let handle = device.handle();
    let mut session = Session::new(device, &test_config()).unwrap();

    let err = session.prepare().unwrap_err();
    match err {
        Error::Bootstrap { line, response } => {
            assert_eq!(line, "function recv(b)");
            assert!(response.contains("unexpected"));
        }
        other => panic!("expected bootstrap error, got {:?}", other),
    }
    assert!(!handle.has_function("recv"));
}

#[test]
fn test_restart_drops_companion() {
    let device = SimulatedDevice::new();
    let handle = device.handle();
    let mut session = Session::new(device, &test_config()).unwrap();
    session.prepare().unwrap();

    session.node_restart().unwrap();
    session.sync().unwrap();
    assert!(!handle.has_function("recv"));
    assert!(matches!(session.prepare().unwrap(), PrepareOutcome::Installed { .. }));
}
