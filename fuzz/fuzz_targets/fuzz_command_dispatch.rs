//! Fuzz target: `CommandProtocol::handle_datagram`
//!
//! Feeds arbitrary datagrams through the command table and checks that
//! only registered tokens of at most nine bytes ever produce a reply, and
//! that every datagram is counted.
//!
//! cargo fuzz run fuzz_command_dispatch

#![no_main]

use std::net::Ipv4Addr;

use libfuzzer_sys::fuzz_target;
use sensornode::app::commands::{CommandAction, CommandReply};
use sensornode::app::protocol::{CommandProtocol, MAX_COMMAND_LEN, NodeInfo};
use sensornode::events::UpdateFlag;

fn info() -> NodeInfo {
    NodeInfo {
        name: "fuzz".into(),
        version: "0.0.0",
        reset_reason: "boot".into(),
        uptime_ms: 0,
        reset_causes: ["POWERON_RESET", "POWERON_RESET"],
        local_ip: Ipv4Addr::UNSPECIFIED,
        mac: "00:00:00:00:00:00".into(),
        statistics: String::new(),
    }
}

fuzz_target!(|data: &[u8]| {
    let flag = UpdateFlag::new();
    let mut protocol = CommandProtocol::new(flag.clone());
    protocol.register("PING", Box::new(|_: &NodeInfo| CommandReply::text("PONG")));
    let info = info();

    // Split the input into datagrams at newlines.
    let mut handled = 0;
    for datagram in data.split(|&b| b == b'\n') {
        handled += 1;
        let Some(reply) = protocol.handle_datagram(datagram, &info) else {
            continue;
        };
        assert!(datagram.len() <= MAX_COMMAND_LEN);
        let token = core::str::from_utf8(datagram).expect("accepted tokens are UTF-8");
        match token {
            "RESET" | "RECONF" => assert_ne!(reply.action, CommandAction::None),
            "UPDATE" => assert!(flag.is_pending()),
            "INFO" | "VERSION" | "PING" => assert!(reply.reply.is_some()),
            other => panic!("unregistered token {other:?} dispatched"),
        }
    }

    let stats = protocol.statistics();
    assert_eq!(stats[0].1, handled.to_string());
});
