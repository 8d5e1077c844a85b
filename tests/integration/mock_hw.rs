//! Mock board for integration tests.
//!
//! Implements every port trait with scripted inputs (connection polls,
//! HTTP responses and streams, inbound datagrams) and records every
//! external effect (restarts, watchdog feeds, delays, replies, broadcasts,
//! flash writes) so tests can assert on the full history without touching
//! real hardware.  The clock only moves on `delay_ms` or when a test
//! advances the shared [`Clock`].

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

use sensornode::app::components::{
    Communicator, NetworkAware, Readable, SensorReading, SensorStatus, SensorValue,
};
use sensornode::app::config_store::ConfigStore;
use sensornode::app::ports::{
    ChannelError, CommandChannelPort, FlashError, FlashPort, HttpError, HttpPort, HttpResponse,
    NetworkAssignment, NetworkError, NetworkPort, StorageError, StoragePort, StreamHead,
    SystemPort, WatchdogPort,
};
use sensornode::diagnostics::{Statistics, StatisticsProvider, StatsBuilder};
use sensornode::events::LinkEvent;

pub const MAC: [u8; 6] = [0x24, 0x0A, 0xC4, 0x00, 0x11, 0x22];
pub const DEFAULT_NAME: &str = "node-001122";
pub const NAME_URL: &str = "http://192.168.188.250/esp/24_0A_C4_00_11_22";
pub const FIRMWARE_URL: &str = "http://192.168.188.250/esp/firmware/";

pub const DHCP_LEASE: NetworkAssignment = NetworkAssignment {
    address: Ipv4Addr::new(192, 168, 188, 42),
    gateway: Ipv4Addr::new(192, 168, 188, 1),
    mask: Ipv4Addr::new(255, 255, 255, 0),
};

pub const STATIC_ASSIGNMENT: NetworkAssignment = NetworkAssignment {
    address: Ipv4Addr::new(10, 0, 0, 7),
    gateway: Ipv4Addr::new(10, 0, 0, 1),
    mask: Ipv4Addr::new(255, 255, 255, 0),
};

/// Milliseconds since boot, shared with test sensors that take time.
pub type Clock = Rc<Cell<u64>>;

pub fn peer() -> SocketAddr {
    "192.168.188.10:40000".parse().unwrap()
}

// ── Scripted HTTP stream ──────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MockStream {
    pub status: u16,
    pub content_length: Option<usize>,
    pub body: Vec<u8>,
}

impl MockStream {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_length: Some(body.len()),
            body,
        }
    }
}

// ── MockBoard ─────────────────────────────────────────────────

pub struct MockBoard {
    // storage
    pub kv: HashMap<String, Vec<u8>>,
    // network
    pub connected: Cell<bool>,
    /// Failed polls left before the link comes up; `None` never comes up.
    pub online_after: Cell<Option<u32>>,
    pub begins: Vec<(String, Option<NetworkAssignment>)>,
    pub radio_restarts: u32,
    pub lease: Option<NetworkAssignment>,
    pub link_events: VecDeque<LinkEvent>,
    // http
    pub routes: HashMap<String, Result<HttpResponse, HttpError>>,
    pub streams: HashMap<String, MockStream>,
    pub gets: Vec<String>,
    open: Option<(Vec<u8>, usize)>,
    pub streams_closed: u32,
    // flash
    pub slot_size: usize,
    pub finalize_error: Option<FlashError>,
    flashing: Option<(usize, Vec<u8>)>,
    pub installed: Option<Vec<u8>>,
    pub flash_aborts: u32,
    // command channel
    pub listen_error: Option<ChannelError>,
    pub listening: Option<(Ipv4Addr, u16)>,
    pub inbox: VecDeque<(Vec<u8>, SocketAddr)>,
    pub replies: Vec<(SocketAddr, String)>,
    pub broadcasts: Vec<String>,
    // system
    pub clock: Clock,
    pub delays: Vec<u32>,
    pub restarts: u32,
    pub blinks: u32,
    // watchdog
    pub watchdog_timeout: Option<u32>,
    pub feeds: u64,
    pub watchdog_fired: bool,
}

#[allow(dead_code)]
impl MockBoard {
    /// A board whose link comes up on the first poll.
    pub fn new() -> Self {
        Self {
            kv: HashMap::new(),
            connected: Cell::new(false),
            online_after: Cell::new(Some(0)),
            begins: Vec::new(),
            radio_restarts: 0,
            lease: None,
            link_events: VecDeque::new(),
            routes: HashMap::new(),
            streams: HashMap::new(),
            gets: Vec::new(),
            open: None,
            streams_closed: 0,
            slot_size: 0x18_0000,
            finalize_error: None,
            flashing: None,
            installed: None,
            flash_aborts: 0,
            listen_error: None,
            listening: None,
            inbox: VecDeque::new(),
            replies: Vec::new(),
            broadcasts: Vec::new(),
            clock: Rc::new(Cell::new(0)),
            delays: Vec::new(),
            restarts: 0,
            blinks: 0,
            watchdog_timeout: None,
            feeds: 0,
            watchdog_fired: false,
        }
    }

    /// A board that already holds a valid record for `name`.
    pub fn with_record(name: &str, reason: &str) -> Self {
        let mut board = Self::new();
        let mut store = ConfigStore::default();
        store.set_name(name);
        store.set_reset_reason(reason);
        store.set_assignment(STATIC_ASSIGNMENT);
        store.mark_valid();
        store.save(&mut board).unwrap();
        board
    }

    pub fn route(&mut self, url: &str, status: u16, body: &str) {
        self.routes.insert(
            url.to_string(),
            Ok(HttpResponse {
                status,
                body: body.as_bytes().to_vec(),
            }),
        );
    }

    pub fn stream(&mut self, url: &str, stream: MockStream) {
        self.streams.insert(url.to_string(), stream);
    }

    /// Lose the link; it returns after `polls` failed connection polls.
    pub fn drop_link(&mut self, polls: Option<u32>) {
        self.connected.set(false);
        self.online_after.set(polls);
        self.link_events.push_back(LinkEvent::Down);
    }

    pub fn send(&mut self, payload: &[u8]) {
        self.inbox.push_back((payload.to_vec(), peer()));
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.replies.last().map(|(_, text)| text.as_str())
    }

    pub fn now(&self) -> u64 {
        self.clock.get()
    }

    /// The device record as the next boot would see it.
    pub fn stored_record(&self) -> ConfigStore {
        ConfigStore::load(self)
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

fn key(ns: &str, key: &str) -> String {
    format!("{ns}::{key}")
}

impl StoragePort for MockBoard {
    fn read(&self, namespace: &str, k: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let value = self.kv.get(&key(namespace, k)).ok_or(StorageError::NotFound)?;
        let n = value.len().min(buf.len());
        buf[..n].copy_from_slice(&value[..n]);
        Ok(n)
    }

    fn write(&mut self, namespace: &str, k: &str, data: &[u8]) -> Result<(), StorageError> {
        self.kv.insert(key(namespace, k), data.to_vec());
        Ok(())
    }
}

impl NetworkPort for MockBoard {
    fn begin(
        &mut self,
        hostname: &str,
        assignment: Option<&NetworkAssignment>,
    ) -> Result<(), NetworkError> {
        self.begins.push((hostname.to_string(), assignment.copied()));
        self.lease = Some(assignment.copied().unwrap_or(DHCP_LEASE));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        if self.connected.get() {
            return true;
        }
        match self.online_after.get() {
            Some(0) => {
                self.connected.set(true);
                true
            }
            Some(n) => {
                self.online_after.set(Some(n - 1));
                false
            }
            None => false,
        }
    }

    fn restart_radio(&mut self) -> Result<(), NetworkError> {
        self.radio_restarts += 1;
        Ok(())
    }

    fn assignment(&self) -> Option<NetworkAssignment> {
        if self.connected.get() { self.lease } else { None }
    }

    fn mac_address(&self) -> [u8; 6] {
        MAC
    }

    fn poll_link_event(&mut self) -> Option<LinkEvent> {
        self.link_events.pop_front()
    }
}

impl HttpPort for MockBoard {
    fn get(&mut self, url: &str, max_body: usize) -> Result<HttpResponse, HttpError> {
        self.gets.push(url.to_string());
        let mut response = self.routes.get(url).cloned().unwrap_or(Err(HttpError::Connect))?;
        response.body.truncate(max_body);
        Ok(response)
    }

    fn open_stream(&mut self, url: &str) -> Result<StreamHead, HttpError> {
        self.gets.push(url.to_string());
        let stream = self.streams.get(url).cloned().ok_or(HttpError::Connect)?;
        self.open = Some((stream.body, 0));
        Ok(StreamHead {
            status: stream.status,
            content_length: stream.content_length,
        })
    }

    fn read_stream(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        let (body, pos) = self.open.as_mut().ok_or(HttpError::NoStream)?;
        let n = (body.len() - *pos).min(buf.len());
        buf[..n].copy_from_slice(&body[*pos..*pos + n]);
        *pos += n;
        Ok(n)
    }

    fn close_stream(&mut self) {
        if self.open.take().is_some() {
            self.streams_closed += 1;
        }
    }
}

impl FlashPort for MockBoard {
    fn begin_update(&mut self, size: usize) -> Result<(), FlashError> {
        if size > self.slot_size {
            return Err(FlashError::NoSpace);
        }
        self.flashing = Some((size, Vec::with_capacity(size)));
        Ok(())
    }

    fn write_update(&mut self, data: &[u8]) -> Result<(), FlashError> {
        let (size, image) = self.flashing.as_mut().ok_or(FlashError::NotStarted)?;
        if image.len() + data.len() > *size {
            return Err(FlashError::WriteFailed);
        }
        image.extend_from_slice(data);
        Ok(())
    }

    fn finalize_update(&mut self) -> Result<(), FlashError> {
        let (_, image) = self.flashing.take().ok_or(FlashError::NotStarted)?;
        if let Some(e) = self.finalize_error.clone() {
            return Err(e);
        }
        self.installed = Some(image);
        Ok(())
    }

    fn abort_update(&mut self) {
        if self.flashing.take().is_some() {
            self.flash_aborts += 1;
        }
    }
}

impl CommandChannelPort for MockBoard {
    fn listen(&mut self, group: Ipv4Addr, port: u16) -> Result<(), ChannelError> {
        if let Some(e) = self.listen_error {
            return Err(e);
        }
        self.listening = Some((group, port));
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
        let (payload, from) = self.inbox.pop_front()?;
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Some((n, from))
    }

    fn reply(&mut self, peer: SocketAddr, message: &str) {
        self.replies.push((peer, message.to_string()));
    }

    fn broadcast(&mut self, message: &str) {
        self.broadcasts.push(message.to_string());
    }
}

impl SystemPort for MockBoard {
    fn uptime_ms(&self) -> u64 {
        self.clock.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
        self.clock.set(self.clock.get() + u64::from(ms));
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }

    fn reset_causes(&self) -> [&'static str; 2] {
        ["POWERON_RESET", "EXT_CPU_RESET"]
    }

    fn error_blink(&mut self) {
        self.blinks += 1;
    }
}

impl WatchdogPort for MockBoard {
    fn arm(&mut self, timeout_ms: u32) {
        self.watchdog_timeout = Some(timeout_ms);
    }

    fn feed(&mut self) {
        self.feeds += 1;
    }

    fn fired_last_boot(&self) -> bool {
        self.watchdog_fired
    }
}

// ── Recording components ──────────────────────────────────────

/// Shared, ordered record of every component callback.
pub type Journal = Rc<RefCell<Vec<String>>>;

pub fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

/// Communicator that writes `<name>:<event>` into the journal.
pub struct RecordingComm {
    name: String,
    journal: Journal,
}

impl RecordingComm {
    pub fn boxed(name: &str, journal: &Journal) -> Box<Self> {
        Box::new(Self {
            name: name.to_string(),
            journal: journal.clone(),
        })
    }

    fn log(&self, event: String) {
        self.journal
            .borrow_mut()
            .push(format!("{}:{}", self.name, event));
    }
}

impl NetworkAware for RecordingComm {
    fn network_connected(&mut self) {
        self.log("connected".into());
    }

    fn network_disconnected(&mut self) {
        self.log("disconnected".into());
    }
}

impl StatisticsProvider for RecordingComm {
    fn name(&self) -> &str {
        &self.name
    }

    fn statistics(&self) -> Statistics {
        StatsBuilder::new().add("events", self.journal.borrow().len()).build()
    }
}

impl Communicator for RecordingComm {
    fn setup(&mut self) {
        self.log("setup".into());
    }

    fn new_reading(&mut self, sensor: &str, reading: &SensorReading) {
        let values: Vec<String> = reading.present().map(|(k, v)| format!("{k}={v}")).collect();
        self.log(format!("reading {} {}", sensor, values.join(",")));
    }

    fn new_status(&mut self, sensor: &str, status: &SensorStatus) {
        self.log(format!("status {} {}", sensor, status));
    }

    fn new_hardware_status(&mut self, message: &str) {
        self.log(format!("hw {}", message));
    }

    fn service(&mut self) {
        self.log("service".into());
    }
}

/// Outcome a scripted sensor produces.
#[derive(Clone)]
pub enum Script {
    Value(f32),
    Warn(&'static str),
    Fatal(&'static str),
}

/// Sensor that replays a script (repeating the last entry) and may take time.
pub struct ScriptedSensor {
    name: String,
    journal: Journal,
    setup_error: Option<SensorStatus>,
    script: VecDeque<Script>,
    last: Script,
    clock: Option<(Clock, u64)>,
    reads: u32,
}

#[allow(dead_code)]
impl ScriptedSensor {
    pub fn new(name: &str, journal: &Journal, script: &[Script]) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            setup_error: None,
            script: script.iter().cloned().collect(),
            last: script.last().cloned().unwrap_or(Script::Value(0.0)),
            clock: None,
            reads: 0,
        }
    }

    pub fn failing_setup(mut self, message: &str) -> Self {
        self.setup_error = Some(SensorStatus::fatal(message));
        self
    }

    /// Advance `clock` by `cost_ms` on every read.
    pub fn taking(mut self, clock: &Clock, cost_ms: u64) -> Self {
        self.clock = Some((clock.clone(), cost_ms));
        self
    }

    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }
}

impl StatisticsProvider for ScriptedSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn statistics(&self) -> Statistics {
        StatsBuilder::new().add("reads", self.reads).build()
    }
}

impl Readable for ScriptedSensor {
    fn setup(&mut self) -> Result<(), SensorStatus> {
        self.journal
            .borrow_mut()
            .push(format!("{}:setup", self.name));
        match &self.setup_error {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }

    fn read(&mut self, timestamp_ms: u64) -> Result<SensorReading, SensorStatus> {
        self.reads += 1;
        if let Some((clock, cost)) = &self.clock {
            clock.set(clock.get() + cost);
        }
        let step = self.script.pop_front().unwrap_or_else(|| self.last.clone());
        match step {
            Script::Value(v) => Ok(SensorReading::new(timestamp_ms)
                .with("value", SensorValue::Float(v))
                .with("spare", SensorValue::NoData)),
            Script::Warn(m) => Err(SensorStatus::warning(m)),
            Script::Fatal(m) => Err(SensorStatus::fatal(m)),
        }
    }
}
