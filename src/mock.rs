//! Scripted register transport and broker used by the unit tests.

use std::{collections::HashMap, time::Duration};

use crate::{
    clock::EmiClock,
    error::{PublishError, TransportError},
    publish::Broker,
    scaling::Scaler,
    transport::RegisterTransport,
    types::{DataLoadDescriptor, DataLoadType},
};

/// Build a descriptor with sensible defaults for tests.
pub fn descriptor(name: &str, data_type: DataLoadType, address: u16) -> DataLoadDescriptor {
    DataLoadDescriptor {
        name: name.to_string(),
        address,
        data_type,
        unit: "V".to_string(),
        scaler: 0,
        string_length: 0,
        topic: format!("emi/{name}"),
        polling_interval: Duration::from_secs(1),
    }
}

impl DataLoadDescriptor {
    pub fn with_scaler(mut self, scaler: i32) -> Self {
        self.scaler = scaler;
        self
    }

    pub fn with_string_length(mut self, length: u16) -> Self {
        self.string_length = length;
        self
    }

    pub fn with_interval(mut self, seconds: u64) -> Self {
        self.polling_interval = Duration::from_secs(seconds);
        self
    }
}

/// A meter whose registers are set up front. Unknown registers fail to read.
#[derive(Default)]
pub struct MockTransport {
    registers: HashMap<u16, u16>,
    strings: HashMap<u16, Vec<u8>>,
    clock: Option<EmiClock>,
    /// Addresses of every read attempted, in order.
    log: Vec<u16>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_register(mut self, address: u16, value: u16) -> Self {
        self.registers.insert(address, value);
        self
    }

    pub fn with_bytes(mut self, address: u16, bytes: &[u8]) -> Self {
        self.strings.insert(address, bytes.to_vec());
        self
    }

    pub fn with_clock(mut self, clock: EmiClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn reads(&self) -> usize {
        self.log.len()
    }

    pub fn read_log(&self) -> &[u16] {
        &self.log
    }

    fn register(&mut self, address: u16) -> Result<u16, TransportError> {
        self.log.push(address);
        self.registers
            .get(&address)
            .copied()
            .ok_or(TransportError::InvalidResponse)
    }
}

impl RegisterTransport for MockTransport {
    fn read_float16(&mut self, address: u16, scaler: Scaler) -> Result<f64, TransportError> {
        Ok(scaler.apply(f64::from(self.register(address)?)))
    }

    fn read_float32(&mut self, address: u16) -> Result<f64, TransportError> {
        let high = self.register(address)?;
        let low = self.register(address.wrapping_add(1))?;
        Ok(f64::from((u32::from(high) << 16) | u32::from(low)))
    }

    fn read_unsigned(&mut self, address: u16) -> Result<u16, TransportError> {
        self.register(address)
    }

    fn read_octet_string(&mut self, address: u16, length: u16) -> Result<Vec<u8>, TransportError> {
        if length == 0 {
            return Ok(Vec::new());
        }
        self.log.push(address);
        let mut bytes = self
            .strings
            .get(&address)
            .cloned()
            .ok_or(TransportError::InvalidResponse)?;
        bytes.truncate(usize::from(length));
        Ok(bytes)
    }

    fn read_clock(&mut self) -> Result<EmiClock, TransportError> {
        self.log.push(crate::register::CLOCK_REGISTER);
        self.clock.ok_or(TransportError::InvalidResponse)
    }
}

/// Everything that happened to a [`MockBroker`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    Connect,
    Publish { topic: String, payload: String },
    Disconnect,
}

/// A broker that records traffic and fails on request.
#[derive(Default)]
pub struct MockBroker {
    pub events: Vec<BrokerEvent>,
    /// Number of upcoming connects that fail.
    pub failing_connects: usize,
    /// Topics whose publish fails.
    pub failing_topics: Vec<String>,
    connected: bool,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                BrokerEvent::Publish { topic, payload } => Some((topic.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &BrokerEvent) -> usize {
        self.events.iter().filter(|event| *event == wanted).count()
    }
}

impl Broker for MockBroker {
    fn connect(&mut self) -> Result<(), PublishError> {
        if self.failing_connects > 0 {
            self.failing_connects -= 1;
            return Err(PublishError::Connect("connection refused".to_string()));
        }
        self.connected = true;
        self.events.push(BrokerEvent::Connect);
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if !self.connected {
            return Err(PublishError::NotConnected);
        }
        if self.failing_topics.iter().any(|t| t == topic) {
            return Err(PublishError::Send(format!("rejected {topic}")));
        }
        self.events.push(BrokerEvent::Publish {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.events.push(BrokerEvent::Disconnect);
    }
}
