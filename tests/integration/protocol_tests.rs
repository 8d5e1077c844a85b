//! Command datagrams end to end: mock inbox → NodeService tick → replies.

use std::net::Ipv4Addr;

use sensornode::app::commands::CommandReply;
use sensornode::app::config_store::{ConfigStore, INVALID_MARKER};
use sensornode::app::connectivity::REASON_FRESH;
use sensornode::app::protocol::{NodeInfo, ProtocolState, REASON_RECONF, REASON_RESET};
use sensornode::app::ports::ChannelError;
use sensornode::app::service::NodeService;
use sensornode::config::NodeConfig;
use sensornode::error::Error;
use sensornode::version::FIRMWARE_VERSION;

use crate::mock_hw::{DEFAULT_NAME, FIRMWARE_URL, MockBoard, NAME_URL, peer};

fn booted() -> (NodeService, MockBoard) {
    let mut hw = MockBoard::with_record("Porch", "UDP RESET request");
    let mut node = NodeService::new(NodeConfig::default(), ConfigStore::load(&hw));
    node.boot(&mut hw, DEFAULT_NAME).unwrap();
    (node, hw)
}

#[test]
fn boot_joins_the_command_group() {
    let (node, hw) = booted();
    assert_eq!(hw.listening, Some((Ipv4Addr::new(239, 1, 23, 42), 2323)));
    assert_eq!(node.protocol().state(), ProtocolState::Listening);
}

#[test]
fn version_replies_to_sender() {
    let (mut node, mut hw) = booted();
    hw.send(b"VERSION");

    node.tick(&mut hw).unwrap();

    assert_eq!(hw.replies.len(), 1);
    assert_eq!(hw.replies[0].0, peer());
    assert_eq!(
        hw.replies[0].1,
        format!("OK VERSION:Porch\nVersion:{FIRMWARE_VERSION}")
    );
}

#[test]
fn info_reports_identity_and_statistics() {
    let (mut node, mut hw) = booted();
    hw.send(b"INFO");

    node.tick(&mut hw).unwrap();

    let reply = hw.last_reply().unwrap();
    let lines: Vec<&str> = reply.lines().collect();
    assert_eq!(lines[0], "OK INFO:Porch");
    assert_eq!(lines[1], format!("Version:{FIRMWARE_VERSION}"));
    assert_eq!(lines[2], "ResetReason:UDP RESET request");
    assert!(lines[3].starts_with("RunTimeInMillis:"));
    assert_eq!(lines[4], "ResetSource:POWERON_RESET:EXT_CPU_RESET");
    assert_eq!(lines[5], "LocalIP:10.0.0.7");
    assert_eq!(lines[6], "Mac:24:0A:C4:00:11:22");
    assert!(lines.contains(&"Hardware.tickCount:1"));
    assert!(lines.contains(&"Protocol.commandsReceived:1"));
    assert!(lines.iter().any(|l| l.starts_with("OTA.updateChecks:")));
}

#[test]
fn unknown_and_oversized_datagrams_are_dropped() {
    let (mut node, mut hw) = booted();
    hw.send(b"HELLO");
    hw.send(b"VERSIONXYZ");
    hw.send(b"UPDATE-NOW-PLEASE-AND-THEN-SOME-MORE");
    hw.send(&[0xFF, 0xFE]);

    node.tick(&mut hw).unwrap();

    assert!(hw.replies.is_empty());
    let stats = node.protocol().statistics();
    assert_eq!(stats[0].1, "4");
    assert_eq!(stats[1].1, "4");
}

#[test]
fn reset_replies_then_restarts_with_reason() {
    let (mut node, mut hw) = booted();
    hw.send(b"RESET");

    assert_eq!(node.tick(&mut hw), Err(Error::Restarted));

    assert_eq!(hw.last_reply(), Some("OK RESET:Porch"));
    assert_eq!(hw.restarts, 1);
    let stored = hw.stored_record();
    assert_eq!(stored.reset_reason(), REASON_RESET);
    assert!(stored.is_valid());
}

#[test]
fn reconf_invalidates_record_then_restarts() {
    let (mut node, mut hw) = booted();
    hw.send(b"RECONF");

    assert_eq!(node.tick(&mut hw), Err(Error::Restarted));

    assert_eq!(hw.last_reply(), Some("OK RECONF:Porch"));
    let stored = hw.stored_record();
    assert_eq!(stored.record().marker, INVALID_MARKER);
    assert_eq!(stored.reset_reason(), REASON_RECONF);
}

#[test]
fn reconf_after_reconfiguration_invalidates_again() {
    let (mut node, mut hw) = booted();
    hw.send(b"RECONF");
    assert_eq!(node.tick(&mut hw), Err(Error::Restarted));

    // Next boot runs first-time configuration from the invalidated record.
    hw.route(NAME_URL, 200, "Porch\n");
    let mut node = NodeService::new(NodeConfig::default(), ConfigStore::load(&hw));
    node.boot(&mut hw, DEFAULT_NAME).unwrap();
    assert_eq!(hw.begins.last(), Some(&(DEFAULT_NAME.to_string(), None)));
    let stored = hw.stored_record();
    assert!(stored.is_valid());
    assert_eq!(stored.reset_reason(), REASON_FRESH);

    hw.send(b"RECONF");
    assert_eq!(node.tick(&mut hw), Err(Error::Restarted));

    assert_eq!(hw.last_reply(), Some("OK RECONF:Porch"));
    let stored = hw.stored_record();
    assert_eq!(stored.record().marker, INVALID_MARKER);
    assert_eq!(stored.reset_reason(), REASON_RECONF);
    assert_eq!(hw.restarts, 2);
}

#[test]
fn update_is_serviced_on_the_next_tick() {
    let (mut node, mut hw) = booted();
    hw.route(&format!("{FIRMWARE_URL}Porch.version"), 200, "0.0.1");
    hw.send(b"UPDATE");

    node.tick(&mut hw).unwrap();
    assert_eq!(hw.last_reply(), Some("OK UPDATE:Porch"));
    assert!(hw.broadcasts.is_empty());

    node.tick(&mut hw).unwrap();
    assert_eq!(hw.broadcasts, ["OK UPDATE:Porch No update available"]);
}

#[test]
fn repeated_update_requests_coalesce() {
    let (mut node, mut hw) = booted();
    hw.route(&format!("{FIRMWARE_URL}Porch.version"), 200, "0.0.1");
    hw.send(b"UPDATE");
    hw.send(b"UPDATE");

    node.tick(&mut hw).unwrap();
    node.tick(&mut hw).unwrap();

    assert_eq!(hw.replies.len(), 2);
    assert_eq!(hw.broadcasts.len(), 1);
}

#[test]
fn registered_commands_extend_the_protocol() {
    let (mut node, mut hw) = booted();
    assert!(node.register_command(
        "PING",
        Box::new(|info: &NodeInfo| CommandReply::text(format!("PONG:{}", info.name)))
    ));
    assert!(!node.register_command("TOOLONGTOKEN", Box::new(|_: &NodeInfo| CommandReply::silent())));
    hw.send(b"PING");

    node.tick(&mut hw).unwrap();

    assert_eq!(hw.last_reply(), Some("PONG:Porch"));
}

#[test]
fn channel_failure_at_boot_is_retried() {
    let mut hw = MockBoard::with_record("Porch", "boot");
    hw.listen_error = Some(ChannelError::Join);
    let mut node = NodeService::new(NodeConfig::default(), ConfigStore::load(&hw));

    node.boot(&mut hw, DEFAULT_NAME).unwrap();
    assert_eq!(node.protocol().state(), ProtocolState::Idle);

    hw.listen_error = None;
    node.tick(&mut hw).unwrap();
    assert_eq!(node.protocol().state(), ProtocolState::Listening);
}
