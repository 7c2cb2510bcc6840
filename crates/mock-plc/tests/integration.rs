//! End-to-end tests: a real server on an ephemeral localhost port, driven
//! through the client.

use std::thread;
use std::time::Duration;

use melsec_frame::Series;
use mock_plc::{ClientError, McClient, Server, ServerConfig};
use plc_device::{CpuMode, DeviceClass};

/// Bind a server on an ephemeral port and connect a client to it.
fn start(series: Series) -> (Server, McClient) {
    let mut config = ServerConfig::for_series(series);
    config.port = 0;
    config.scan_period = Duration::from_millis(1);
    let mut server = Server::bind(config).expect("bind ephemeral port");
    server.start();

    let mut client = McClient::new("127.0.0.1", server.local_addr().port(), series);
    client.connect().expect("connect");
    (server, client)
}

/// Poll until `predicate` holds or ~2 s passes.
fn wait_for(mut predicate: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn write_then_read_word() {
    let (_server, mut client) = start(Series::Q);
    client.write_word(DeviceClass::D, 0, 1234).unwrap();
    assert_eq!(client.read_word(DeviceClass::D, 0).unwrap(), 1234);
}

#[test]
fn bit_batch_round_trip() {
    let (_server, mut client) = start(Series::Q);
    client
        .write_bits(DeviceClass::M, 0, &[true, false, true, true])
        .unwrap();
    assert_eq!(
        client.read_bits(DeviceClass::M, 0, 4).unwrap(),
        vec![true, false, true, true]
    );
}

#[test]
fn word_batch_round_trip() {
    let (_server, mut client) = start(Series::Q);
    client
        .write_words(DeviceClass::D, 100, &[1, 2, 3, 0xFFFF])
        .unwrap();
    assert_eq!(
        client.read_words(DeviceClass::D, 100, 4).unwrap(),
        vec![1, 2, 3, 0xFFFF]
    );
}

#[test]
fn cpu_model_read() {
    let (_server, mut client) = start(Series::Q);
    assert_eq!(client.read_cpu_model().unwrap(), "Q03UDECPU");
}

#[test]
fn ping_reads_d0() {
    let (_server, mut client) = start(Series::Q);
    client.test_connection().unwrap();
}

#[test]
fn bad_address_answers_c056_and_connection_survives() {
    let (_server, mut client) = start(Series::Q);
    let error = client
        .read_words(DeviceClass::D, DeviceClass::D.size() + 100, 1)
        .unwrap_err();
    assert!(matches!(error, ClientError::EndCode(0xC056)));

    // The connection stays usable after an error reply.
    client.write_word(DeviceClass::D, 0, 7).unwrap();
    assert_eq!(client.read_word(DeviceClass::D, 0).unwrap(), 7);
}

#[test]
fn too_many_points_answers_c051() {
    let (_server, mut client) = start(Series::Q);
    let error = client.read_words(DeviceClass::D, 0, 961).unwrap_err();
    assert!(matches!(error, ClientError::EndCode(0xC051)));

    let error = client.read_bits(DeviceClass::M, 0, 3585).unwrap_err();
    assert!(matches!(error, ClientError::EndCode(0xC051)));
}

#[test]
fn width_mismatch_answers_c05c() {
    let (_server, mut client) = start(Series::Q);
    let error = client.read_bits(DeviceClass::D, 0, 1).unwrap_err();
    assert!(matches!(error, ClientError::EndCode(0xC05C)));
}

#[test]
fn remote_control_drives_the_engine() {
    let (server, mut client) = start(Series::Q);
    server
        .load_program("LD X0\nOR Y0\nANI X1\nOUT Y0\nEND\n")
        .unwrap();

    client.remote_run().unwrap();
    assert!(wait_for(|| server.mode().get() == CpuMode::Run));

    // Energize the start contact; the self-holding rung latches Y0.
    client.write_bit(DeviceClass::X, 0, true).unwrap();
    assert!(wait_for(|| {
        server
            .memory()
            .read_bit(DeviceClass::Y, 0)
            .unwrap_or(false)
    }));

    // Releasing X0 holds the latch.
    client.write_bit(DeviceClass::X, 0, false).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert!(client.read_bit(DeviceClass::Y, 0).unwrap());

    // X1 breaks it.
    client.write_bit(DeviceClass::X, 1, true).unwrap();
    assert!(wait_for(|| {
        !server
            .memory()
            .read_bit(DeviceClass::Y, 0)
            .unwrap_or(true)
    }));

    client.remote_stop().unwrap();
    assert!(wait_for(|| server.mode().get() == CpuMode::Stop));
}

#[test]
fn remote_reset_clears_everything() {
    let (server, mut client) = start(Series::Q);
    client.write_word(DeviceClass::D, 10, 555).unwrap();
    client.write_bit(DeviceClass::M, 10, true).unwrap();
    client.remote_run().unwrap();
    assert!(wait_for(|| server.mode().get() == CpuMode::Run));

    client.remote_reset().unwrap();
    assert_eq!(server.mode().get(), CpuMode::Stop);
    assert_eq!(client.read_word(DeviceClass::D, 10).unwrap(), 0);
    assert!(!client.read_bit(DeviceClass::M, 10).unwrap());
}

#[test]
fn timer_program_over_the_wire() {
    let (server, mut client) = start(Series::Q);
    // 1 ms scans, T0 K1 = 100 ms.
    server.load_program("LD X0\nOUT T0 K1\nEND\n").unwrap();
    client.remote_run().unwrap();

    client.write_bit(DeviceClass::X, 0, true).unwrap();
    assert!(wait_for(|| {
        server
            .memory()
            .read_bit(DeviceClass::Tc, 0)
            .unwrap_or(false)
    }));

    // Dropping the input clears contact and current value together.
    client.write_bit(DeviceClass::X, 0, false).unwrap();
    assert!(wait_for(|| {
        !server
            .memory()
            .read_bit(DeviceClass::Tc, 0)
            .unwrap_or(true)
    }));
    assert_eq!(client.read_word(DeviceClass::Tn, 0).unwrap(), 0);
}

#[test]
fn iqr_series_end_to_end() {
    let (_server, mut client) = start(Series::IqR);
    // Several calls in a row exercise the serial increment + echo check.
    client.write_word(DeviceClass::D, 0, 42).unwrap();
    assert_eq!(client.read_word(DeviceClass::D, 0).unwrap(), 42);
    assert_eq!(client.read_cpu_model().unwrap(), "R04CPU");
    client
        .write_bits(DeviceClass::B, 0x10, &[true, true, false])
        .unwrap();
    assert_eq!(
        client.read_bits(DeviceClass::B, 0x10, 3).unwrap(),
        vec![true, true, false]
    );

    let error = client
        .read_words(DeviceClass::D, DeviceClass::D.size(), 1)
        .unwrap_err();
    assert!(matches!(error, ClientError::EndCode(0xC056)));
}

#[test]
fn two_connections_are_served_independently() {
    let (server, mut first) = start(Series::Q);
    let mut second = McClient::new("127.0.0.1", server.local_addr().port(), Series::Q);
    second.connect().unwrap();

    first.write_word(DeviceClass::D, 1, 11).unwrap();
    second.write_word(DeviceClass::D, 2, 22).unwrap();
    assert_eq!(first.read_word(DeviceClass::D, 2).unwrap(), 22);
    assert_eq!(second.read_word(DeviceClass::D, 1).unwrap(), 11);
}

#[test]
fn program_load_is_rejected_while_running() {
    let (server, mut client) = start(Series::Q);
    server.load_program("LD X0\nOUT Y0\nEND\n").unwrap();
    client.remote_run().unwrap();
    assert!(wait_for(|| server.mode().get() == CpuMode::Run));

    assert!(server.load_program("LD X1\nOUT Y1\nEND\n").is_err());

    client.remote_stop().unwrap();
    assert!(wait_for(|| server.mode().get() == CpuMode::Stop));
    assert!(server.load_program("LD X1\nOUT Y1\nEND\n").is_ok());
}

#[test]
fn stopping_the_server_closes_clients() {
    let (mut server, mut client) = start(Series::Q);
    client.write_word(DeviceClass::D, 0, 1).unwrap();
    server.stop();

    // The next call fails: closed, refused, or timed out depending on
    // where the teardown catches it.
    assert!(client.read_word(DeviceClass::D, 0).is_err());
}
