//! NodeService lifecycle: boot ordering, fan-out, fatal handling and pacing.

use sensornode::app::config_store::ConfigStore;
use sensornode::app::connectivity::REASON_WATCHDOG;
use sensornode::app::ports::ChannelError;
use sensornode::app::service::{NodeService, NodeState};
use sensornode::config::NodeConfig;
use sensornode::error::Error;

use crate::mock_hw::{
    DEFAULT_NAME, Journal, MockBoard, NAME_URL, RecordingComm, Script, ScriptedSensor, journal,
};

fn node_on(hw: &MockBoard) -> NodeService {
    NodeService::new(NodeConfig::default(), ConfigStore::load(hw))
}

/// Journal entries without the per-tick service hook.
fn events(log: &Journal) -> Vec<String> {
    log.borrow()
        .iter()
        .filter(|e| !e.ends_with(":service"))
        .cloned()
        .collect()
}

#[test]
fn boot_sets_up_sensors_then_communicators_then_announces_link() {
    let log = journal();
    let mut hw = MockBoard::with_record("Porch", "remote reset request");
    let mut node = node_on(&hw);
    node.add_sensor(ScriptedSensor::new("dht", &log, &[Script::Value(21.5)]).boxed());
    node.add_communicator(RecordingComm::boxed("A", &log));
    node.add_communicator(RecordingComm::boxed("B", &log));

    node.boot(&mut hw, DEFAULT_NAME).unwrap();

    assert_eq!(node.state(), NodeState::Running);
    assert_eq!(hw.watchdog_timeout, Some(15_000));
    assert_eq!(
        events(&log),
        [
            "dht:setup",
            "A:setup",
            "B:setup",
            "A:connected",
            "B:connected",
            "A:hw STARTED: POWERON_RESET:EXT_CPU_RESET remote reset request",
            "B:hw STARTED: POWERON_RESET:EXT_CPU_RESET remote reset request",
        ]
    );
}

#[test]
fn fresh_node_takes_its_name_from_the_name_service() {
    let mut hw = MockBoard::new();
    hw.route(NAME_URL, 200, "Garage");
    let mut node = node_on(&hw);

    node.boot(&mut hw, DEFAULT_NAME).unwrap();

    assert_eq!(node.node_name(), "Garage");
    assert!(
        node.hardware_status(&hw).ends_with("Fresh-reset"),
        "first boot reports the fresh-reset marker"
    );
}

#[test]
fn readings_fan_out_in_registration_order() {
    let log = journal();
    let mut hw = MockBoard::with_record("Porch", "boot");
    let mut node = node_on(&hw);
    node.add_sensor(ScriptedSensor::new("s1", &log, &[Script::Value(1.0)]).boxed());
    node.add_sensor(ScriptedSensor::new("s2", &log, &[Script::Value(2.0)]).boxed());
    for name in ["A", "B", "C"] {
        node.add_communicator(RecordingComm::boxed(name, &log));
    }
    node.boot(&mut hw, DEFAULT_NAME).unwrap();
    log.borrow_mut().clear();

    node.tick(&mut hw).unwrap();

    assert_eq!(
        events(&log),
        [
            "A:reading s1 value=1.00",
            "B:reading s1 value=1.00",
            "C:reading s1 value=1.00",
            "A:reading s2 value=2.00",
            "B:reading s2 value=2.00",
            "C:reading s2 value=2.00",
        ]
    );
    let hooks = log.borrow().iter().filter(|e| e.ends_with(":service")).count();
    assert_eq!(hooks, 3, "one service call per communicator per tick");
}

#[test]
fn warning_status_is_fanned_out_and_loop_continues() {
    let log = journal();
    let mut hw = MockBoard::with_record("Porch", "boot");
    let mut node = node_on(&hw);
    node.add_sensor(
        ScriptedSensor::new("dht", &log, &[Script::Warn("checksum"), Script::Value(3.0)]).boxed(),
    );
    node.add_communicator(RecordingComm::boxed("A", &log));
    node.boot(&mut hw, DEFAULT_NAME).unwrap();
    log.borrow_mut().clear();

    node.tick(&mut hw).unwrap();
    node.tick(&mut hw).unwrap();

    assert_eq!(
        events(&log),
        ["A:status dht checksum", "A:reading dht value=3.00"]
    );
    assert_eq!(node.state(), NodeState::Running);
    assert_eq!(node.tick_count(), 2);
}

#[test]
fn fatal_status_halts_after_the_full_pass() {
    let log = journal();
    let mut hw = MockBoard::with_record("Porch", "boot");
    let mut node = node_on(&hw);
    node.add_sensor(ScriptedSensor::new("bad", &log, &[Script::Fatal("bus stuck")]).boxed());
    node.add_sensor(ScriptedSensor::new("good", &log, &[Script::Value(5.0)]).boxed());
    node.add_communicator(RecordingComm::boxed("A", &log));
    node.boot(&mut hw, DEFAULT_NAME).unwrap();
    log.borrow_mut().clear();

    assert_eq!(node.tick(&mut hw), Err(Error::Halted));

    assert_eq!(
        events(&log),
        ["A:status bad FATAL bus stuck", "A:reading good value=5.00"]
    );
    assert_eq!(node.state(), NodeState::FatalError);
    assert_eq!(node.tick(&mut hw), Err(Error::Halted));
    assert_eq!(hw.restarts, 0, "a fatal sensor halts instead of rebooting");
}

#[test]
fn sensor_setup_failure_halts_boot() {
    let log = journal();
    let mut hw = MockBoard::with_record("Porch", "boot");
    let mut node = node_on(&hw);
    node.add_sensor(
        ScriptedSensor::new("dht", &log, &[])
            .failing_setup("no ack")
            .boxed(),
    );
    node.add_communicator(RecordingComm::boxed("A", &log));

    assert_eq!(node.boot(&mut hw, DEFAULT_NAME), Err(Error::Halted));

    assert_eq!(node.state(), NodeState::FatalError);
    assert!(
        !events(&log).iter().any(|e| e == "A:setup"),
        "communicators are not set up after a sensor failure"
    );
    assert!(!events(&log).iter().any(|e| e == "A:connected"));
}

#[test]
fn watchdog_reset_is_recorded_as_the_reset_reason() {
    let log = journal();
    let mut hw = MockBoard::with_record("Porch", "boot");
    hw.watchdog_fired = true;
    let mut node = node_on(&hw);
    node.add_communicator(RecordingComm::boxed("A", &log));

    node.boot(&mut hw, DEFAULT_NAME).unwrap();

    let stored = hw.stored_record();
    assert!(stored.is_valid());
    assert_eq!(stored.reset_reason(), REASON_WATCHDOG);
    assert!(
        events(&log)
            .iter()
            .any(|e| e == "A:hw STARTED: POWERON_RESET:EXT_CPU_RESET Watchdog triggered")
    );
}

#[test]
fn fatal_error_is_recorded_before_restart() {
    let mut hw = MockBoard::with_record("Porch", "boot");
    let mut node = node_on(&hw);
    node.boot(&mut hw, DEFAULT_NAME).unwrap();

    node.restart_after_fatal(&mut hw, &Error::Channel(ChannelError::Bind));

    assert_eq!(hw.restarts, 1);
    let stored = hw.stored_record();
    assert!(stored.is_valid());
    assert!(stored.reset_reason().starts_with("Fatal: command channel:"));
}

#[test]
fn ticks_are_paced_to_the_loop_interval() {
    let log = journal();
    let mut hw = MockBoard::with_record("Porch", "boot");
    let clock = hw.clock.clone();
    let mut node = node_on(&hw);
    node.add_sensor(
        ScriptedSensor::new("slow", &log, &[Script::Value(0.0)])
            .taking(&clock, 300)
            .boxed(),
    );
    node.boot(&mut hw, DEFAULT_NAME).unwrap();
    hw.delays.clear();

    node.tick(&mut hw).unwrap();

    assert_eq!(hw.delays, [700]);
    assert!((node.average_loop_ms() - 30.0).abs() < 0.01);
}

#[test]
fn overrunning_ticks_are_not_paced() {
    let log = journal();
    let mut hw = MockBoard::with_record("Porch", "boot");
    let clock = hw.clock.clone();
    let mut node = node_on(&hw);
    node.add_sensor(
        ScriptedSensor::new("slow", &log, &[Script::Value(0.0)])
            .taking(&clock, 1500)
            .boxed(),
    );
    node.boot(&mut hw, DEFAULT_NAME).unwrap();
    hw.delays.clear();

    node.tick(&mut hw).unwrap();

    assert!(hw.delays.is_empty());
}

#[test]
fn every_tick_feeds_the_watchdog() {
    let mut hw = MockBoard::with_record("Porch", "boot");
    let mut node = node_on(&hw);
    node.boot(&mut hw, DEFAULT_NAME).unwrap();
    let before = hw.feeds;

    for _ in 0..5 {
        node.tick(&mut hw).unwrap();
    }

    assert!(hw.feeds >= before + 5);
}

#[test]
fn statistics_cover_every_component() {
    let log = journal();
    let mut hw = MockBoard::with_record("Porch", "boot");
    let mut node = node_on(&hw);
    node.add_sensor(ScriptedSensor::new("dht", &log, &[Script::Value(1.0)]).boxed());
    node.add_communicator(RecordingComm::boxed("A", &log));
    node.boot(&mut hw, DEFAULT_NAME).unwrap();
    node.tick(&mut hw).unwrap();

    let stats = node.render_all_statistics();

    for key in [
        "Hardware.connectCount:",
        "Hardware.retryCount:",
        "Hardware.initialConnectTime:",
        "Hardware.commSetupTime:",
        "Hardware.sensorSetupTime:",
        "Hardware.averageSensorLoopDuration:",
        "Hardware.averageConnectDuration:",
        "Hardware.tickCount:1",
        "OTA.updateChecks:0",
        "Protocol.commandsReceived:0",
        "A.events:",
        "dht.reads:1",
    ] {
        assert!(stats.contains(key), "missing {key} in\n{stats}");
    }
}
