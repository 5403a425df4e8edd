//! PTP/IP session - handshake, transactions and teardown.
//!
//! A session owns two connections to the responder. The command connection
//! carries strictly sequential request/response cycles on the caller's
//! thread; the event connection is handed to an [`EventDispatcher`].

use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::codec::DataReader;
use crate::datasets::{Dataset, DeviceInfo, ObjectInfo, StorageInfo};
use crate::error::PtpError;
use crate::events::{EventDispatcher, EventListener, ListenerSet};
use crate::protocol::{
    init_fail_reason, Cancel, DataPacket, DataPhase, EndData, Guid, InitCommandAck,
    InitCommandRequest, InitEventAck, InitEventRequest, InitFail, OperationCode, OperationParams,
    OperationRequest, OperationResponse, Packet, PacketType, Payload, ProbeRequest, ProbeResponse,
    ProtocolError, ResponseCode, StartData, PTPIP_PORT, PTPIP_PROTOCOL_VERSION,
};
use crate::state::{DataPhaseAssembler, SessionState, TransactionIds};
use crate::transport::{Connector, PtpStream, TcpConnector};

/// Configuration for a PTP/IP session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Responder host name or address.
    pub host: String,
    pub port: u16,
    /// Initiator GUID presented during the handshake.
    pub guid: Guid,
    /// Initiator friendly name.
    pub name: String,
    pub protocol_version: u32,
    /// TCP connect timeout; 0 uses the OS default.
    pub connect_timeout_ms: u64,
    /// Decoded events buffered between the reader and the listeners.
    pub event_queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.1".to_string(),
            port: PTPIP_PORT,
            guid: Guid::default(),
            name: "ptpip".to_string(),
            protocol_version: PTPIP_PROTOCOL_VERSION,
            connect_timeout_ms: 5000,
            event_queue_depth: 64,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `host:port`, bracketing bare IPv6 literals.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    pub fn connector(&self) -> TcpConnector {
        TcpConnector::new(self.addr()).with_connect_timeout(self.connect_timeout())
    }
}

/// Responder identity from the InitCommandAck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderInfo {
    pub connection_number: u32,
    pub guid: Guid,
    pub name: String,
    pub protocol_version: u32,
}

/// Outcome of one request/response cycle.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub operation: OperationCode,
    pub transaction_id: u32,
    pub response: OperationResponse,
    /// Inbound data phase, if the responder sent one.
    pub data: Option<Vec<u8>>,
}

/// Everything read from the command connection for one transaction.
struct Cycle {
    response: OperationResponse,
    data: Option<Vec<u8>>,
    data_error: Option<ProtocolError>,
}

impl Transaction {
    pub fn code(&self) -> ResponseCode {
        self.response.code
    }

    pub fn is_ok(&self) -> bool {
        self.response.code.is_ok()
    }

    /// Turn a non-OK response code into an error.
    pub fn into_ok(self) -> Result<Self, PtpError> {
        if !self.is_ok() {
            return Err(PtpError::ResponseNotOk {
                operation: self.operation,
                code: self.response.code,
            });
        }
        Ok(self)
    }

    /// Response parameter `index`.
    pub fn param(&self, index: usize) -> Result<u32, ProtocolError> {
        self.response
            .params
            .get(index)
            .ok_or(ProtocolError::MissingResponseParameter { index })
    }

    /// Inbound data, empty when there was no data phase.
    pub fn into_data(self) -> Vec<u8> {
        self.data.unwrap_or_default()
    }
}

/// An initiator session with one responder.
pub struct PtpIpSession<S: PtpStream = TcpStream> {
    command: S,
    events: Option<EventDispatcher<S>>,
    listeners: Arc<ListenerSet>,
    state: SessionState,
    transactions: TransactionIds,
    /// Open PTP session, 0 when none. Shared with the event reader.
    session_id: Arc<AtomicU32>,
    responder: ResponderInfo,
}

impl PtpIpSession<TcpStream> {
    /// Connect over TCP to the responder named in `config`.
    pub fn open(config: &SessionConfig) -> Result<Self, PtpError> {
        Self::connect(config, &config.connector())
    }
}

impl<S: PtpStream> PtpIpSession<S> {
    pub fn connect<C>(config: &SessionConfig, connector: &C) -> Result<Self, PtpError>
    where
        C: Connector<Stream = S>,
    {
        Self::connect_with_listeners(config, connector, Arc::new(ListenerSet::new()))
    }

    /// Run both handshakes and start event dispatch.
    ///
    /// Any failure shuts down the connections opened so far; there is no
    /// retry.
    #[instrument(skip_all, fields(initiator = %config.name))]
    pub fn connect_with_listeners<C>(
        config: &SessionConfig,
        connector: &C,
        listeners: Arc<ListenerSet>,
    ) -> Result<Self, PtpError>
    where
        C: Connector<Stream = S>,
    {
        let mut state = SessionState::default();

        state.goto(SessionState::CommandConnecting);
        let mut command = connector.connect()?;
        let ack = command_handshake(&mut command, config)
            .inspect_err(|_| shutdown_quietly(&command))?;
        state.goto(SessionState::CommandOpen);
        info!(
            connection = ack.connection_number,
            responder = %ack.name,
            guid = %ack.guid,
            "Command connection accepted"
        );

        state.goto(SessionState::EventConnecting);
        let mut event = connector
            .connect()
            .inspect_err(|_| shutdown_quietly(&command))?;
        event_handshake(&mut event, ack.connection_number).inspect_err(|_| {
            shutdown_quietly(&event);
            shutdown_quietly(&command);
        })?;

        let session_id = Arc::new(AtomicU32::new(0));
        let events = EventDispatcher::start(
            event,
            Arc::clone(&listeners),
            Arc::clone(&session_id),
            config.event_queue_depth,
        )
        .inspect_err(|_| shutdown_quietly(&command))?;

        state.goto(SessionState::Ready);
        info!(peer = %command.peer(), "Session ready");

        Ok(Self {
            command,
            events: Some(events),
            listeners,
            state,
            transactions: TransactionIds::new(),
            session_id,
            responder: ResponderInfo {
                connection_number: ack.connection_number,
                guid: ack.guid,
                name: ack.name,
                protocol_version: ack.protocol_version,
            },
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn responder(&self) -> &ResponderInfo {
        &self.responder
    }

    pub fn connection_number(&self) -> u32 {
        self.responder.connection_number
    }

    /// Currently open PTP session, 0 when none.
    pub fn session_id(&self) -> u32 {
        self.session_id.load(Ordering::Acquire)
    }

    pub fn last_transaction_id(&self) -> Option<u32> {
        self.transactions.last()
    }

    /// Returns `false` if the listener was already registered.
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) -> bool {
        self.listeners.add(listener)
    }

    /// Returns `false` if the listener was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn EventListener>) -> bool {
        self.listeners.remove(listener)
    }

    fn require_ready(&self) -> Result<(), PtpError> {
        if !self.state.is_ready() {
            return Err(PtpError::InvalidState {
                actual: self.state,
                required: SessionState::Ready,
            });
        }
        Ok(())
    }

    /// Run one operation: request, optional data phase, response.
    ///
    /// The response code is returned as-is; use [`Transaction::into_ok`] to
    /// treat non-OK codes as errors. A failed data phase is reported after the
    /// response has been read, so the session stays usable. Any other failure
    /// mid-cycle leaves the command connection out of step and closes the
    /// session.
    #[instrument(level = "debug", skip_all, fields(code = %code))]
    pub fn transact(
        &mut self,
        code: OperationCode,
        params: &[u32],
        data_out: Option<&[u8]>,
    ) -> Result<Transaction, PtpError> {
        self.require_ready()?;
        let params = OperationParams::new(params)?;
        let transaction_id = self.transactions.next_id();

        let cycle = match self.run_cycle(code, transaction_id, params, data_out) {
            Ok(cycle) => cycle,
            Err(err) => {
                warn!(
                    tx_id = transaction_id,
                    error = %err,
                    "Command connection out of step, closing session"
                );
                self.close();
                return Err(err);
            }
        };

        if let Some(err) = cycle.data_error {
            warn!(tx_id = transaction_id, error = %err, "Data phase failed");
            return Err(err.into());
        }

        let response = cycle.response;
        if response.code.is_ok() {
            debug!(tx_id = transaction_id, "Response OK");
        } else {
            warn!(tx_id = transaction_id, response = %response.code, "Operation not OK");
        }

        Ok(Transaction {
            operation: code,
            transaction_id,
            response,
            data: cycle.data,
        })
    }

    fn run_cycle(
        &mut self,
        code: OperationCode,
        transaction_id: u32,
        params: OperationParams,
        data_out: Option<&[u8]>,
    ) -> Result<Cycle, PtpError> {
        let data_phase = match data_out {
            Some(_) => DataPhase::DataOut,
            None => DataPhase::NoDataOrDataIn,
        };
        OperationRequest {
            data_phase,
            code,
            transaction_id,
            params,
        }
        .to_packet()
        .write_to(&mut self.command)?;
        debug!(tx_id = transaction_id, "Request sent");

        if let Some(data) = data_out {
            DataPacket {
                transaction_id,
                chunk: data.to_vec(),
            }
            .to_packet()
            .write_to(&mut self.command)?;
            debug!(tx_id = transaction_id, len = data.len(), "Data sent");
        }

        // After a data phase error the remaining data packets are discarded
        // until the response arrives.
        let mut inbound = DataPhaseAssembler::new(transaction_id);
        let mut data_error: Option<ProtocolError> = None;
        let mut has_data = false;
        let response = loop {
            let packet = Packet::read_from(&mut self.command)?;
            match packet.packet_type() {
                PacketType::StartData => {
                    let start = StartData::from_packet(&packet)?;
                    if data_error.is_none() {
                        data_error = inbound
                            .start(start.transaction_id, start.total_length)
                            .err();
                    }
                    has_data = true;
                }
                PacketType::Data => {
                    let data = DataPacket::from_packet(&packet)?;
                    if data_error.is_none() {
                        data_error = inbound
                            .push(data.transaction_id, &data.chunk, false)
                            .err();
                    }
                    has_data = true;
                }
                PacketType::EndData => {
                    let end = EndData::from_packet(&packet)?;
                    if data_error.is_none() {
                        data_error = inbound
                            .push(end.transaction_id, &end.chunk, true)
                            .err();
                    }
                    has_data = true;
                }
                PacketType::OperationResponse => {
                    break OperationResponse::from_packet(&packet)?;
                }
                PacketType::ProbeRequest => {
                    ProbeRequest::from_packet(&packet)?;
                    ProbeResponse.to_packet().write_to(&mut self.command)?;
                }
                other => {
                    return Err(ProtocolError::UnexpectedPacket {
                        expected: "OperationResponse",
                        actual: other,
                    }
                    .into());
                }
            }
        };

        if response.transaction_id != transaction_id {
            return Err(ProtocolError::TransactionMismatch {
                expected: transaction_id,
                actual: response.transaction_id,
            }
            .into());
        }

        Ok(Cycle {
            response,
            data: has_data.then(|| inbound.into_data()),
            data_error,
        })
    }

    fn data_in(&mut self, code: OperationCode, params: &[u32]) -> Result<Vec<u8>, PtpError> {
        Ok(self.transact(code, params, None)?.into_ok()?.into_data())
    }

    fn no_data(&mut self, code: OperationCode, params: &[u32]) -> Result<Transaction, PtpError> {
        self.transact(code, params, None)?.into_ok()
    }

    pub fn open_session(&mut self, session_id: u32) -> Result<(), PtpError> {
        self.no_data(OperationCode::OpenSession, &[session_id])?;
        self.session_id.store(session_id, Ordering::Release);
        info!(session_id, "PTP session opened");
        Ok(())
    }

    pub fn close_session(&mut self) -> Result<(), PtpError> {
        self.no_data(OperationCode::CloseSession, &[])?;
        let session_id = self.session_id.swap(0, Ordering::AcqRel);
        info!(session_id, "PTP session closed");
        Ok(())
    }

    pub fn get_device_info(&mut self) -> Result<DeviceInfo, PtpError> {
        let data = self.data_in(OperationCode::GetDeviceInfo, &[])?;
        Ok(DeviceInfo::decode(&data)?)
    }

    pub fn get_storage_ids(&mut self) -> Result<Vec<u32>, PtpError> {
        let data = self.data_in(OperationCode::GetStorageIds, &[])?;
        Ok(DataReader::new(&data).read_u32_array()?)
    }

    pub fn get_storage_info(&mut self, storage_id: u32) -> Result<StorageInfo, PtpError> {
        let data = self.data_in(OperationCode::GetStorageInfo, &[storage_id])?;
        Ok(StorageInfo::decode(&data)?)
    }

    /// Count objects; 0 for `format` or `parent` means "any".
    pub fn get_num_objects(
        &mut self,
        storage_id: u32,
        format: u16,
        parent: u32,
    ) -> Result<u32, PtpError> {
        let tx = self.no_data(
            OperationCode::GetNumObjects,
            &[storage_id, u32::from(format), parent],
        )?;
        Ok(tx.param(0)?)
    }

    /// List object handles; `storage_id` 0xFFFFFFFF means all storages.
    pub fn get_object_handles(
        &mut self,
        storage_id: u32,
        format: u16,
        parent: u32,
    ) -> Result<Vec<u32>, PtpError> {
        let data = self.data_in(
            OperationCode::GetObjectHandles,
            &[storage_id, u32::from(format), parent],
        )?;
        Ok(DataReader::new(&data).read_u32_array()?)
    }

    pub fn get_object_info(&mut self, handle: u32) -> Result<ObjectInfo, PtpError> {
        let data = self.data_in(OperationCode::GetObjectInfo, &[handle])?;
        Ok(ObjectInfo::decode(&data)?)
    }

    pub fn get_object(&mut self, handle: u32) -> Result<Vec<u8>, PtpError> {
        self.data_in(OperationCode::GetObject, &[handle])
    }

    pub fn get_thumb(&mut self, handle: u32) -> Result<Vec<u8>, PtpError> {
        self.data_in(OperationCode::GetThumb, &[handle])
    }

    pub fn delete_object(&mut self, handle: u32, format: u16) -> Result<(), PtpError> {
        self.no_data(OperationCode::DeleteObject, &[handle, u32::from(format)])?;
        Ok(())
    }

    /// Start a capture. Completion arrives as a CaptureComplete event.
    pub fn initiate_capture(&mut self, storage_id: u32, format: u16) -> Result<u32, PtpError> {
        let tx = self.no_data(
            OperationCode::InitiateCapture,
            &[storage_id, u32::from(format)],
        )?;
        Ok(tx.transaction_id)
    }

    pub fn get_device_prop_value(&mut self, prop_code: u16) -> Result<Vec<u8>, PtpError> {
        self.data_in(OperationCode::GetDevicePropValue, &[u32::from(prop_code)])
    }

    pub fn set_device_prop_value(&mut self, prop_code: u16, value: &[u8]) -> Result<(), PtpError> {
        self.transact(
            OperationCode::SetDevicePropValue,
            &[u32::from(prop_code)],
            Some(value),
        )?
        .into_ok()?;
        Ok(())
    }

    /// Ask the responder to cancel `transaction_id`. The responder may
    /// ignore it; nothing is cancelled locally.
    pub fn send_cancel(&mut self, transaction_id: u32) -> Result<(), PtpError> {
        self.require_ready()?;
        Cancel { transaction_id }
            .to_packet()
            .write_to(&mut self.command)?;
        info!(tx_id = transaction_id, "Cancel sent");
        Ok(())
    }

    /// Keep-alive round trip on the command connection.
    pub fn probe(&mut self) -> Result<(), PtpError> {
        self.require_ready()?;
        ProbeRequest.to_packet().write_to(&mut self.command)?;
        let reply = Packet::read_from(&mut self.command)?;
        ProbeResponse::from_packet(&reply)?;
        debug!("Probe answered");
        Ok(())
    }

    /// Shut down the event connection, then the command connection, and
    /// wait for the event threads. Queued events are still delivered.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(events) = &self.events {
            events.close_stream();
        }
        shutdown_quietly(&self.command);
        if let Some(mut events) = self.events.take() {
            events.join();
        }
        self.state.goto(SessionState::Closed);
        info!("Session closed");
    }
}

impl<S: PtpStream> Drop for PtpIpSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn command_handshake<S: PtpStream>(
    stream: &mut S,
    config: &SessionConfig,
) -> Result<InitCommandAck, PtpError> {
    InitCommandRequest {
        guid: config.guid,
        name: config.name.clone(),
        protocol_version: config.protocol_version,
    }
    .to_packet()
    .write_to(stream)?;

    let reply = Packet::read_from(stream)?;
    match reply.packet_type() {
        PacketType::InitCommandAck => Ok(InitCommandAck::from_packet(&reply)?),
        PacketType::InitFail => Err(rejected(&reply)),
        other => Err(ProtocolError::UnexpectedPacket {
            expected: "InitCommandAck",
            actual: other,
        }
        .into()),
    }
}

fn event_handshake<S: PtpStream>(stream: &mut S, connection_number: u32) -> Result<(), PtpError> {
    InitEventRequest { connection_number }
        .to_packet()
        .write_to(stream)?;

    let reply = Packet::read_from(stream)?;
    match reply.packet_type() {
        PacketType::InitEventAck => {
            InitEventAck::from_packet(&reply)?;
            debug!(connection = connection_number, "Event connection accepted");
            Ok(())
        }
        PacketType::InitFail => Err(rejected(&reply)),
        other => Err(ProtocolError::UnexpectedPacket {
            expected: "InitEventAck",
            actual: other,
        }
        .into()),
    }
}

fn rejected(packet: &Packet) -> PtpError {
    match InitFail::from_packet(packet) {
        Ok(InitFail { reason }) => {
            warn!(reason, "Responder rejected the handshake");
            ProtocolError::HandshakeRejected {
                reason,
                text: init_fail_reason(reason),
            }
            .into()
        }
        Err(err) => err.into(),
    }
}

fn shutdown_quietly<S: PtpStream>(stream: &S) {
    if let Err(err) = stream.shutdown() {
        debug!(error = %err, "Shutdown failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DataWriter;
    use crate::events::Event;
    use crate::protocol::{EventCode, EventPacket, EventParams, Params};
    use crate::transport::{MockConnector, MockStream};
    use std::sync::Mutex;
    use std::sync::mpsc;

    const GUID: &str = "00112233-4455-6677-8899-aabbccddeeff";

    fn config() -> SessionConfig {
        SessionConfig {
            guid: GUID.parse().unwrap(),
            name: "test".into(),
            ..Default::default()
        }
    }

    fn ack(connection_number: u32) -> Packet {
        InitCommandAck {
            connection_number,
            guid: Guid::new([0xAB; 16]),
            name: "camera".into(),
            protocol_version: PTPIP_PROTOCOL_VERSION,
        }
        .to_packet()
    }

    struct Responder {
        command: MockStream,
        event: MockStream,
    }

    impl Responder {
        fn send(&mut self, packet: impl Payload) {
            packet.to_packet().write_to(&mut self.command).unwrap();
        }

        fn respond(&mut self, code: ResponseCode, transaction_id: u32, params: &[u32]) {
            self.send(OperationResponse {
                code,
                transaction_id,
                params: Params::new(params).unwrap(),
            });
        }

        fn next_request(&mut self) -> OperationRequest {
            OperationRequest::from_packet(&Packet::read_from(&mut self.command).unwrap()).unwrap()
        }
    }

    /// Session over mock connections with both handshakes already answered.
    fn connected() -> (PtpIpSession<MockStream>, Responder) {
        let (cmd_ours, mut cmd_theirs) = MockStream::pair();
        let (ev_ours, mut ev_theirs) = MockStream::pair();
        ack(7).write_to(&mut cmd_theirs).unwrap();
        InitEventAck.to_packet().write_to(&mut ev_theirs).unwrap();

        let connector = MockConnector::new([cmd_ours, ev_ours]);
        let session = PtpIpSession::connect(&config(), &connector).unwrap();

        let mut responder = Responder {
            command: cmd_theirs,
            event: ev_theirs,
        };
        // Drain the handshake requests.
        Packet::read_from(&mut responder.command).unwrap();
        Packet::read_from(&mut responder.event).unwrap();
        (session, responder)
    }

    #[test]
    fn test_handshake_extracts_connection_number() {
        let (cmd_ours, mut cmd_theirs) = MockStream::pair();
        let (ev_ours, mut ev_theirs) = MockStream::pair();
        ack(7).write_to(&mut cmd_theirs).unwrap();
        InitEventAck.to_packet().write_to(&mut ev_theirs).unwrap();

        let connector = MockConnector::new([cmd_ours, ev_ours]);
        let session = PtpIpSession::connect(&config(), &connector).unwrap();
        assert_eq!(session.connection_number(), 7);
        assert_eq!(session.responder().name, "camera");
        assert_eq!(session.state(), SessionState::Ready);

        let request =
            InitCommandRequest::from_packet(&Packet::read_from(&mut cmd_theirs).unwrap()).unwrap();
        assert_eq!(request.guid, GUID.parse().unwrap());
        assert_eq!(request.name, "test");
        assert_eq!(request.protocol_version, 0x0001_0000);

        let event_request =
            InitEventRequest::from_packet(&Packet::read_from(&mut ev_theirs).unwrap()).unwrap();
        assert_eq!(event_request.connection_number, 7);
    }

    #[test]
    fn test_init_fail_tears_down_command_connection() {
        let (cmd_ours, mut cmd_theirs) = MockStream::pair();
        let (ev_ours, _ev_theirs) = MockStream::pair();
        InitFail { reason: 2 }
            .to_packet()
            .write_to(&mut cmd_theirs)
            .unwrap();

        let connector = MockConnector::new([cmd_ours, ev_ours]);
        let err = PtpIpSession::connect(&config(), &connector)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PtpError::Protocol(ProtocolError::HandshakeRejected {
                reason: 2,
                text: "busy"
            })
        ));
        assert!(cmd_theirs.is_closed());
        assert_eq!(connector.remaining(), 1);
    }

    #[test]
    fn test_wrong_handshake_reply_is_protocol_error() {
        let (cmd_ours, mut cmd_theirs) = MockStream::pair();
        ProbeResponse.to_packet().write_to(&mut cmd_theirs).unwrap();

        let connector = MockConnector::new([cmd_ours]);
        let err = PtpIpSession::connect(&config(), &connector)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PtpError::Protocol(ProtocolError::UnexpectedPacket {
                expected: "InitCommandAck",
                actual: PacketType::ProbeResponse
            })
        ));
        assert!(cmd_theirs.is_closed());
    }

    #[test]
    fn test_event_handshake_failure_closes_both() {
        let (cmd_ours, mut cmd_theirs) = MockStream::pair();
        let (ev_ours, mut ev_theirs) = MockStream::pair();
        ack(3).write_to(&mut cmd_theirs).unwrap();
        InitFail { reason: 1 }
            .to_packet()
            .write_to(&mut ev_theirs)
            .unwrap();

        let connector = MockConnector::new([cmd_ours, ev_ours]);
        assert!(PtpIpSession::connect(&config(), &connector).is_err());
        assert!(cmd_theirs.is_closed());
        assert!(ev_theirs.is_closed());
    }

    fn device_info() -> DeviceInfo {
        DeviceInfo {
            standard_version: 100,
            vendor_extension_desc: "ext".into(),
            operations_supported: vec![0x1001, 0x1002],
            events_supported: vec![0x4002],
            manufacturer: "Example".into(),
            model: "M1".into(),
            device_version: "1.0".into(),
            serial_number: "0001".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_device_info_single_data_packet() {
        let (mut session, mut responder) = connected();
        let info = device_info();
        responder.send(DataPacket {
            transaction_id: 1,
            chunk: info.encode().unwrap(),
        });
        responder.respond(ResponseCode::Ok, 1, &[]);

        assert_eq!(session.get_device_info().unwrap(), info);
        let request = responder.next_request();
        assert_eq!(request.code, OperationCode::GetDeviceInfo);
        assert_eq!(request.transaction_id, 1);
        assert_eq!(request.data_phase, DataPhase::NoDataOrDataIn);
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_multi_chunk_data_phase() {
        let (mut session, mut responder) = connected();
        responder.send(StartData {
            transaction_id: 1,
            total_length: 6,
        });
        responder.send(DataPacket {
            transaction_id: 1,
            chunk: vec![1, 2],
        });
        responder.send(DataPacket {
            transaction_id: 1,
            chunk: vec![3, 4],
        });
        responder.send(EndData {
            transaction_id: 1,
            chunk: vec![5, 6],
        });
        responder.respond(ResponseCode::Ok, 1, &[]);

        assert_eq!(session.get_object(0x10).unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(responder.next_request().params.as_slice(), &[0x10]);
    }

    #[test]
    fn test_response_transaction_mismatch() {
        let (mut session, mut responder) = connected();
        responder.respond(ResponseCode::Ok, 99, &[]);
        let err = session
            .transact(OperationCode::GetStorageIds, &[], None)
            .unwrap_err();
        assert!(matches!(
            err,
            PtpError::Protocol(ProtocolError::TransactionMismatch {
                expected: 1,
                actual: 99
            })
        ));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_non_ok_response_keeps_session_usable() {
        let (mut session, mut responder) = connected();
        responder.respond(ResponseCode::DeviceBusy, 1, &[]);
        let tx = session
            .transact(OperationCode::InitiateCapture, &[0, 0], None)
            .unwrap();
        assert_eq!(tx.code(), ResponseCode::DeviceBusy);
        assert!(matches!(
            tx.into_ok().unwrap_err(),
            PtpError::ResponseNotOk {
                operation: OperationCode::InitiateCapture,
                code: ResponseCode::DeviceBusy
            }
        ));

        responder.respond(ResponseCode::Ok, 2, &[3]);
        assert_eq!(session.get_num_objects(0xFFFF_FFFF, 0, 0).unwrap(), 3);
        assert_eq!(session.last_transaction_id(), Some(2));
    }

    #[test]
    fn test_data_overrun_drains_to_response() {
        let (mut session, mut responder) = connected();
        responder.send(StartData {
            transaction_id: 1,
            total_length: 2,
        });
        responder.send(EndData {
            transaction_id: 1,
            chunk: vec![0; 4],
        });
        responder.respond(ResponseCode::Ok, 1, &[]);
        let err = session.get_object(1).unwrap_err();
        assert!(matches!(
            err,
            PtpError::Protocol(ProtocolError::DataOverrun {
                expected: 2,
                received: 4
            })
        ));
        assert_eq!(session.state(), SessionState::Ready);

        responder.respond(ResponseCode::Ok, 2, &[]);
        session.close_session().unwrap();
        assert_eq!(session.last_transaction_id(), Some(2));
    }

    #[test]
    fn test_unexpected_packet_mid_cycle_closes_session() {
        let (mut session, mut responder) = connected();
        responder.send(InitEventAck);
        responder.respond(ResponseCode::Ok, 1, &[]);
        let err = session.get_object(1).unwrap_err();
        assert!(matches!(
            err,
            PtpError::Protocol(ProtocolError::UnexpectedPacket {
                expected: "OperationResponse",
                actual: PacketType::InitEventAck
            })
        ));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(responder.command.is_closed());
        assert!(matches!(
            session.close_session().unwrap_err(),
            PtpError::InvalidState {
                actual: SessionState::Closed,
                ..
            }
        ));
    }

    #[test]
    fn test_outbound_data_follows_request() {
        let (mut session, mut responder) = connected();
        responder.respond(ResponseCode::Ok, 1, &[]);
        session.set_device_prop_value(0x5001, &[0x64, 0x00]).unwrap();

        let request = responder.next_request();
        assert_eq!(request.code, OperationCode::SetDevicePropValue);
        assert_eq!(request.data_phase, DataPhase::DataOut);
        let data = DataPacket::from_packet(&Packet::read_from(&mut responder.command).unwrap())
            .unwrap();
        assert_eq!(data.transaction_id, 1);
        assert_eq!(data.chunk, vec![0x64, 0x00]);
    }

    #[test]
    fn test_storage_ids_and_info() {
        let (mut session, mut responder) = connected();
        let mut ids = DataWriter::new();
        ids.put_u32_array(&[0x0001_0001, 0x0002_0001]).unwrap();
        responder.send(DataPacket {
            transaction_id: 1,
            chunk: ids.into_bytes(),
        });
        responder.respond(ResponseCode::Ok, 1, &[]);
        assert_eq!(
            session.get_storage_ids().unwrap(),
            vec![0x0001_0001, 0x0002_0001]
        );

        let info = StorageInfo {
            storage_type: 4,
            max_capacity: 1 << 34,
            storage_description: "SD1".into(),
            ..Default::default()
        };
        responder.send(DataPacket {
            transaction_id: 2,
            chunk: info.encode().unwrap(),
        });
        responder.respond(ResponseCode::Ok, 2, &[]);
        assert_eq!(session.get_storage_info(0x0001_0001).unwrap(), info);
    }

    #[test]
    fn test_probe_and_cancel_on_command_connection() {
        let (mut session, mut responder) = connected();
        ProbeResponse
            .to_packet()
            .write_to(&mut responder.command)
            .unwrap();
        session.probe().unwrap();
        assert_eq!(
            Packet::read_from(&mut responder.command)
                .unwrap()
                .packet_type(),
            PacketType::ProbeRequest
        );

        session.send_cancel(5).unwrap();
        let cancel = Cancel::from_packet(&Packet::read_from(&mut responder.command).unwrap())
            .unwrap();
        assert_eq!(cancel.transaction_id, 5);
    }

    struct Capture {
        events: Mutex<mpsc::Sender<Event>>,
    }

    impl EventListener for Capture {
        fn on_vendor_event(&self, event: &Event) {
            let _ = self.events.lock().unwrap().send(event.clone());
        }
    }

    #[test]
    fn test_events_carry_open_session_id() {
        let (mut session, mut responder) = connected();
        let (tx, rx) = mpsc::channel();
        let listener: Arc<dyn EventListener> = Arc::new(Capture {
            events: Mutex::new(tx),
        });
        assert!(session.add_listener(listener.clone()));
        assert!(!session.add_listener(listener.clone()));

        responder.respond(ResponseCode::Ok, 1, &[]);
        session.open_session(5).unwrap();
        assert_eq!(session.session_id(), 5);

        EventPacket {
            code: EventCode::from_code(0xC001),
            transaction_id: 0,
            params: EventParams::new(&[1]).unwrap(),
        }
        .to_packet()
        .write_to(&mut responder.event)
        .unwrap();
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.session_id, 5);
        assert_eq!(event.param(0), Some(1));

        assert!(session.remove_listener(&listener));
    }

    #[test]
    fn test_close_shuts_down_both_connections() {
        let (mut session, responder) = connected();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(responder.command.is_closed());
        assert!(responder.event.is_closed());

        let err = session
            .transact(OperationCode::GetDeviceInfo, &[], None)
            .unwrap_err();
        assert!(matches!(
            err,
            PtpError::InvalidState {
                actual: SessionState::Closed,
                ..
            }
        ));
        session.close();
    }

    #[test]
    fn test_too_many_params_rejected_before_sending() {
        let (mut session, _responder) = connected();
        let err = session
            .transact(OperationCode::GetObjectHandles, &[1, 2, 3, 4, 5, 6], None)
            .unwrap_err();
        assert!(matches!(
            err,
            PtpError::Protocol(ProtocolError::TooManyParameters { count: 6, max: 5 })
        ));
        assert_eq!(session.last_transaction_id(), None);
    }

    #[test]
    fn test_config_defaults_and_toml() {
        let config: SessionConfig =
            toml::from_str("host = \"10.0.0.1\"\nguid = \"00112233445566778899aabbccddeeff\"")
                .unwrap();
        assert_eq!(config.port, 15740);
        assert_eq!(config.protocol_version, 0x0001_0000);
        assert_eq!(config.addr(), "10.0.0.1:15740");
        assert_eq!(config.guid, GUID.parse().unwrap());

        let path = std::env::temp_dir().join(format!("ptpip-config-{}.toml", std::process::id()));
        config.save_to_file(&path).unwrap();
        let loaded = SessionConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);

        let v6 = SessionConfig {
            host: "fe80::1".into(),
            ..Default::default()
        };
        assert_eq!(v6.addr(), "[fe80::1]:15740");
        let no_timeout = SessionConfig {
            connect_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(no_timeout.connect_timeout(), None);
    }
}
