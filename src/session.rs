//! Session actor - state machine, client operations, inbound routing.
//!
//! All mutable state lives in a single spawned task. The cloneable
//! [`Session`] handle sends commands over an mpsc channel and awaits
//! oneshot replies, so callers never share locks with the task.
//!
//! ```text
//! Session ──► mpsc::Sender<Msg> ──► session task ──► Channel
//!                   ▲                      │
//!        inbound forwarder ◄── transport ◄─┘
//! ```
//!
//! The task owns the connection lifecycle: `Disconnected` →
//! `Connecting` → `Connected`, with at most one request outstanding at
//! any time.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::advert::{AddressKind, BdAddr};
use crate::att::{
    decode_error_resp, decode_mtu_resp, decode_read_by_type_resp, decode_read_resp,
    encode_mtu_req, encode_read_by_type_req, encode_read_req, encode_write_cmd, encode_write_req,
    is_write_ack, opcodes, structural_min_len, AttUuid, TypedValue, DEFAULT_LE_MTU, MAX_LE_MTU,
};
use crate::dispatch::Registry;
use crate::error::{BluewireError, Result};
use crate::event::{SessionEvent, SessionState, Status};
use crate::transport::{Channel, ConnectParams, SecurityLevel, Transport};

/// Capacity of the command/inbound message queue.
const MSG_CHANNEL_CAPACITY: usize = 32;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for each request; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Receive MTU hint handed to the transport at connect.
    pub mtu_hint: u16,
    /// Security level for new connections.
    pub security: SecurityLevel,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            mtu_hint: MAX_LE_MTU,
            security: SecurityLevel::Low,
        }
    }
}

/// Commands the handle sends to the task.
enum Command {
    Connect {
        remote: BdAddr,
        addr_kind: AddressKind,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<Status>,
    },
    SetSecurityLevel {
        level: SecurityLevel,
        reply: oneshot::Sender<Result<()>>,
    },
    ExchangeMtu {
        requested: u16,
        reply: oneshot::Sender<Result<u16>>,
    },
    ReadByHandle {
        handle: u16,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    ReadByUuid {
        start: u16,
        end: u16,
        uuid: AttUuid,
        reply: oneshot::Sender<Result<Vec<TypedValue>>>,
    },
    WriteWithResponse {
        handle: u16,
        value: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    WriteWithoutResponse {
        handle: u16,
        value: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Everything flowing into the session task: handle commands plus
/// traffic forwarded from the live connection. The generation counter
/// fences out traffic from connections already torn down.
enum Msg {
    Command(Command),
    Inbound { generation: u64, pdu: Bytes },
    ChannelClosed { generation: u64 },
}

/// The pending request, resolved exactly once.
struct PendingOp {
    request_opcode: u8,
    deadline: Option<Instant>,
    kind: PendingKind,
}

enum PendingKind {
    Mtu {
        requested: u16,
        reply: oneshot::Sender<Result<u16>>,
    },
    Read {
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    ReadByType {
        reply: oneshot::Sender<Result<Vec<TypedValue>>>,
    },
    Write {
        reply: oneshot::Sender<Result<()>>,
    },
}

impl PendingKind {
    /// Whether `opcode` is the response this request awaits.
    fn awaits(&self, opcode: u8) -> bool {
        match self {
            Self::Mtu { .. } => opcode == opcodes::MTU_RESP,
            Self::Read { .. } => opcode == opcodes::READ_RESP,
            Self::ReadByType { .. } => opcode == opcodes::READ_BY_TYPE_RESP,
            Self::Write { .. } => is_write_ack(&[opcode]),
        }
    }

    /// Resolve with an error.
    fn fail(self, err: BluewireError) {
        match self {
            Self::Mtu { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Self::Read { reply } => {
                let _ = reply.send(Err(err));
            }
            Self::ReadByType { reply } => {
                let _ = reply.send(Err(err));
            }
            Self::Write { reply } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// Opcodes that only ever resolve a pending request.
fn is_response_opcode(opcode: u8) -> bool {
    matches!(
        opcode,
        opcodes::MTU_RESP
            | opcodes::READ_RESP
            | opcodes::READ_BY_TYPE_RESP
            | opcodes::WRITE_RESP
            | opcodes::EXEC_WRITE_RESP
    )
}

/// Cloneable handle to a spawned session task.
#[derive(Clone)]
pub struct Session {
    tx: mpsc::Sender<Msg>,
}

impl Session {
    /// Spawn a session task over `transport`, delivering events on
    /// `events`. Returns the handle and the task's join handle; the task
    /// exits once every handle clone is dropped and no channel is live.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        events: mpsc::Sender<SessionEvent>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(MSG_CHANNEL_CAPACITY);
        let task = SessionTask {
            transport,
            config: config.clone(),
            events,
            msg_tx: tx.downgrade(),
            state: SessionState::Disconnected,
            remote: None,
            addr_kind: AddressKind::Public,
            security: config.security,
            mtu: 0,
            generation: 0,
            channel: None,
            registry: None,
            forwarder: None,
            pending: None,
        };
        let join = tokio::spawn(task.run(rx));
        (Self { tx }, join)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Msg::Command(build(reply_tx)))
            .await
            .map_err(|_| BluewireError::Disconnected)?;
        reply_rx.await.map_err(|_| BluewireError::Disconnected)
    }

    /// Connect to `remote`. A no-op returning `Ok` when the session is
    /// not `Disconnected`.
    pub async fn connect(&self, remote: BdAddr, addr_kind: AddressKind) -> Result<()> {
        self.request(|reply| Command::Connect {
            remote,
            addr_kind,
            reply,
        })
        .await?
    }

    /// Tear down the connection, if any. Any pending request resolves
    /// with `Disconnected`.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Snapshot of the session's observable state.
    pub async fn status(&self) -> Result<Status> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Store the security level for future connections; when connected,
    /// also apply it to the live channel.
    pub async fn set_security_level(&self, level: SecurityLevel) -> Result<()> {
        self.request(|reply| Command::SetSecurityLevel { level, reply })
            .await?
    }

    /// Negotiate the MTU. `requested` must lie in `[23, 517]`; allowed at
    /// most once per connection. Returns the negotiated value,
    /// `min(requested, peer_offered)`.
    pub async fn exchange_mtu(&self, requested: u16) -> Result<u16> {
        self.request(|reply| Command::ExchangeMtu { requested, reply })
            .await?
    }

    /// Read the value of the attribute at `handle`.
    pub async fn read_by_handle(&self, handle: u16) -> Result<Vec<u8>> {
        self.request(|reply| Command::ReadByHandle { handle, reply })
            .await?
    }

    /// Read every attribute of type `uuid` within `[start, end]`.
    pub async fn read_by_uuid(
        &self,
        start: u16,
        end: u16,
        uuid: AttUuid,
    ) -> Result<Vec<TypedValue>> {
        self.request(|reply| Command::ReadByUuid {
            start,
            end,
            uuid,
            reply,
        })
        .await?
    }

    /// Write `value` to `handle` and wait for the peer's acknowledgement.
    pub async fn write_with_response(&self, handle: u16, value: Bytes) -> Result<()> {
        self.request(|reply| Command::WriteWithResponse {
            handle,
            value,
            reply,
        })
        .await?
    }

    /// Write `value` to `handle` with no acknowledgement; completes once
    /// the frame is handed to the transport.
    pub async fn write_without_response(&self, handle: u16, value: Bytes) -> Result<()> {
        self.request(|reply| Command::WriteWithoutResponse {
            handle,
            value,
            reply,
        })
        .await?
    }
}

struct SessionTask {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    events: mpsc::Sender<SessionEvent>,
    /// Weak so that the task itself never keeps its queue alive; the
    /// forwarder upgrades it for the lifetime of a connection.
    msg_tx: mpsc::WeakSender<Msg>,

    state: SessionState,
    remote: Option<BdAddr>,
    addr_kind: AddressKind,
    security: SecurityLevel,
    /// Negotiated MTU; 0 until the exchange completes, reset on
    /// disconnect.
    mtu: u16,

    /// Bumped on every connect and disconnect to fence stale traffic.
    generation: u64,
    channel: Option<Box<dyn Channel>>,
    registry: Option<Registry>,
    forwarder: Option<JoinHandle<()>>,
    pending: Option<PendingOp>,
}

impl SessionTask {
    async fn run(mut self, mut rx: mpsc::Receiver<Msg>) {
        loop {
            let deadline = self.pending.as_ref().and_then(|p| p.deadline);

            let msg = if let Some(at) = deadline {
                tokio::select! {
                    msg = rx.recv() => msg,
                    _ = sleep_until(at) => {
                        self.on_request_timeout();
                        continue;
                    }
                }
            } else {
                rx.recv().await
            };

            match msg {
                Some(Msg::Command(cmd)) => self.handle_command(cmd).await,
                Some(Msg::Inbound { generation, pdu }) => {
                    if generation == self.generation {
                        self.handle_inbound(pdu).await;
                    }
                }
                Some(Msg::ChannelClosed { generation }) => {
                    if generation == self.generation && self.state == SessionState::Connected {
                        debug!("channel closed by peer");
                        self.teardown(BluewireError::Disconnected).await;
                    }
                }
                None => {
                    debug!("all session handles dropped, task exiting");
                    break;
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect {
                remote,
                addr_kind,
                reply,
            } => {
                let result = self.connect(remote, addr_kind).await;
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                if self.state != SessionState::Disconnected {
                    self.teardown(BluewireError::Disconnected).await;
                }
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::SetSecurityLevel { level, reply } => {
                let result = self.set_security_level(level).await;
                let _ = reply.send(result);
            }
            Command::ExchangeMtu { requested, reply } => {
                if let Err(err) = self.exchange_mtu(requested, reply).await {
                    self.teardown(err).await;
                }
            }
            Command::ReadByHandle { handle, reply } => {
                if let Err(err) = self.read_by_handle(handle, reply).await {
                    self.teardown(err).await;
                }
            }
            Command::ReadByUuid {
                start,
                end,
                uuid,
                reply,
            } => {
                if let Err(err) = self.read_by_uuid(start, end, uuid, reply).await {
                    self.teardown(err).await;
                }
            }
            Command::WriteWithResponse {
                handle,
                value,
                reply,
            } => {
                if let Err(err) = self.write_with_response(handle, value, reply).await {
                    self.teardown(err).await;
                }
            }
            Command::WriteWithoutResponse {
                handle,
                value,
                reply,
            } => {
                if let Err(err) = self.write_without_response(handle, value, reply).await {
                    self.teardown(err).await;
                }
            }
        }
    }

    fn status(&self) -> Status {
        Status {
            state: self.state,
            remote: self.remote,
            addr_kind: self.addr_kind,
            mtu: self.mtu,
            security: self.security,
        }
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event).await;
    }

    async fn emit_status(&self) {
        self.emit(SessionEvent::StatusChanged(self.status())).await;
    }

    async fn connect(&mut self, remote: BdAddr, addr_kind: AddressKind) -> Result<()> {
        if self.state != SessionState::Disconnected {
            debug!(state = %self.state, "connect ignored");
            return Ok(());
        }

        self.state = SessionState::Connecting;
        self.remote = Some(remote);
        self.addr_kind = addr_kind;
        self.emit_status().await;

        let params = ConnectParams {
            remote,
            addr_kind,
            security: self.security,
            mtu_hint: self.config.mtu_hint,
        };

        match self.transport.connect(params).await {
            Ok(connection) => {
                self.generation += 1;
                self.channel = Some(connection.channel);
                self.registry = Some(Registry::for_client());
                self.mtu = 0;
                self.state = SessionState::Connected;
                // A handle sent this command, so the upgrade holds.
                self.forwarder = self.msg_tx.upgrade().map(|tx| {
                    spawn_inbound_forwarder(connection.inbound, tx, self.generation)
                });
                debug!(remote = %remote, "connected");
                self.emit_status().await;
                Ok(())
            }
            Err(err) => {
                warn!(remote = %remote, %err, "connect failed");
                self.state = SessionState::Disconnected;
                self.remote = None;
                self.emit(SessionEvent::ConnectFailed {
                    reason: err.to_string(),
                })
                .await;
                self.emit_status().await;
                Err(err)
            }
        }
    }

    /// Tear the connection down: resolve the pending request with `err`,
    /// drop registry and channel, reset the MTU, emit `StatusChanged`.
    async fn teardown(&mut self, err: BluewireError) {
        if let Some(pending) = self.pending.take() {
            pending.kind.fail(err);
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.generation += 1;
        self.channel = None;
        self.registry = None;
        self.mtu = 0;
        self.state = SessionState::Disconnected;
        self.remote = None;
        self.emit_status().await;
    }

    async fn set_security_level(&mut self, level: SecurityLevel) -> Result<()> {
        self.security = level;
        if self.state == SessionState::Connected {
            if let Some(channel) = &self.channel {
                channel.set_security_level(level).await?;
                self.emit_status().await;
            }
        }
        Ok(())
    }

    /// Reject unless connected with no request outstanding.
    fn ensure_ready(&self) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(BluewireError::BadState("not connected"));
        }
        if self.pending.is_some() {
            return Err(BluewireError::BadState("another request is pending"));
        }
        Ok(())
    }

    fn deadline(&self) -> Option<Instant> {
        self.config
            .request_timeout
            .map(|timeout| Instant::now() + timeout)
    }

    /// Send `pdu` on the live channel. An `Err` return means the channel
    /// is gone and the caller must tear the session down.
    async fn send_pdu(&self, pdu: Vec<u8>) -> Result<()> {
        match &self.channel {
            Some(channel) => channel.send(Bytes::from(pdu)).await,
            None => Err(BluewireError::Disconnected),
        }
    }

    /// Run the request prologue shared by every operation: state guard,
    /// parameter validation, send. Guard failures resolve the caller
    /// synchronously with zero bytes sent and leave the session alone;
    /// only a send failure propagates, forcing teardown.
    async fn submit_request(
        &mut self,
        validation: Result<()>,
        pdu: Vec<u8>,
        request_opcode: u8,
        kind: PendingKind,
    ) -> Result<()> {
        if let Err(err) = self.ensure_ready().and(validation) {
            kind.fail(err);
            return Ok(());
        }

        if let Err(err) = self.send_pdu(pdu).await {
            kind.fail(BluewireError::Disconnected);
            return Err(err);
        }

        self.pending = Some(PendingOp {
            request_opcode,
            deadline: self.deadline(),
            kind,
        });
        Ok(())
    }

    async fn exchange_mtu(
        &mut self,
        requested: u16,
        reply: oneshot::Sender<Result<u16>>,
    ) -> Result<()> {
        let validation = if !(DEFAULT_LE_MTU..=MAX_LE_MTU).contains(&requested) {
            Err(BluewireError::BadParam(format!(
                "requested MTU {requested} outside [{DEFAULT_LE_MTU}, {MAX_LE_MTU}]"
            )))
        } else if self.mtu != 0 {
            Err(BluewireError::BadState("MTU already negotiated"))
        } else {
            Ok(())
        };

        self.submit_request(
            validation,
            encode_mtu_req(requested),
            opcodes::MTU_REQ,
            PendingKind::Mtu { requested, reply },
        )
        .await
    }

    async fn read_by_handle(
        &mut self,
        handle: u16,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    ) -> Result<()> {
        let validation = if handle == 0 {
            Err(BluewireError::BadParam("handle 0 is invalid".into()))
        } else {
            Ok(())
        };

        self.submit_request(
            validation,
            encode_read_req(handle),
            opcodes::READ_REQ,
            PendingKind::Read { reply },
        )
        .await
    }

    async fn read_by_uuid(
        &mut self,
        start: u16,
        end: u16,
        uuid: AttUuid,
        reply: oneshot::Sender<Result<Vec<TypedValue>>>,
    ) -> Result<()> {
        let validation = if start == 0 || start > end {
            Err(BluewireError::BadParam(format!(
                "handle range [{start:#06x}, {end:#06x}] is invalid"
            )))
        } else {
            Ok(())
        };

        self.submit_request(
            validation,
            encode_read_by_type_req(start, end, uuid),
            opcodes::READ_BY_TYPE_REQ,
            PendingKind::ReadByType { reply },
        )
        .await
    }

    async fn write_with_response(
        &mut self,
        handle: u16,
        value: Bytes,
        reply: oneshot::Sender<Result<()>>,
    ) -> Result<()> {
        let validation = if handle == 0 {
            Err(BluewireError::BadParam("handle 0 is invalid".into()))
        } else {
            Ok(())
        };

        self.submit_request(
            validation,
            encode_write_req(handle, &value),
            opcodes::WRITE_REQ,
            PendingKind::Write { reply },
        )
        .await
    }

    async fn write_without_response(
        &mut self,
        handle: u16,
        value: Bytes,
        reply: oneshot::Sender<Result<()>>,
    ) -> Result<()> {
        let result = if let Err(err) = self.ensure_ready() {
            let _ = reply.send(Err(err));
            return Ok(());
        } else if handle == 0 {
            let _ = reply.send(Err(BluewireError::BadParam("handle 0 is invalid".into())));
            return Ok(());
        } else {
            self.send_pdu(encode_write_cmd(handle, &value)).await
        };

        match result {
            Ok(()) => {
                let _ = reply.send(Ok(()));
                Ok(())
            }
            Err(err) => {
                let _ = reply.send(Err(BluewireError::Disconnected));
                Err(err)
            }
        }
    }

    fn on_request_timeout(&mut self) {
        if let Some(pending) = self.pending.take() {
            warn!(
                request = format_args!("{:#04x}", pending.request_opcode),
                "request timed out"
            );
            pending.kind.fail(BluewireError::Timeout);
        }
    }

    async fn handle_inbound(&mut self, pdu: Bytes) {
        let Some(opcode) = pdu.first().copied() else {
            self.protocol_violation("empty PDU".into()).await;
            return;
        };

        // Structural check ahead of everything: too-short frames
        // disconnect this session, whatever they would have matched.
        if let Some(min) = structural_min_len(opcode) {
            if pdu.len() < min {
                self.protocol_violation(format!(
                    "PDU for opcode {opcode:#04x} is {} bytes, minimum is {min}",
                    pdu.len()
                ))
                .await;
                return;
            }
        }

        if self.resolve_pending(opcode, &pdu).await {
            return;
        }

        if is_response_opcode(opcode) || opcode == opcodes::ERROR_RESP {
            // Unsolicited or late response; nothing awaits it.
            warn!(
                opcode = format_args!("{opcode:#04x}"),
                "unexpected response dropped"
            );
            return;
        }

        let outcome = match &self.registry {
            Some(registry) => registry.dispatch(&pdu),
            None => return,
        };

        match outcome {
            Ok(Some(outcome)) => {
                if let Some(reply) = outcome.reply {
                    let sent = match &self.channel {
                        Some(channel) => channel.send(reply).await,
                        None => Err(BluewireError::Disconnected),
                    };
                    if let Err(err) = sent {
                        self.teardown(err).await;
                        return;
                    }
                }
                if let Some(event) = outcome.event {
                    self.emit(event).await;
                }
            }
            Ok(None) => {}
            Err(err) => self.protocol_violation(err.to_string()).await,
        }
    }

    /// Try to resolve the pending request with `pdu`. Returns true when
    /// the PDU was consumed.
    async fn resolve_pending(&mut self, opcode: u8, pdu: &Bytes) -> bool {
        let Some(pending) = &self.pending else {
            return false;
        };

        if opcode == opcodes::ERROR_RESP {
            // Only an error naming our request resolves it.
            let resp = match decode_error_resp(pdu) {
                Ok(resp) => resp,
                Err(err) => {
                    self.protocol_violation(err.to_string()).await;
                    return true;
                }
            };
            if resp.request != pending.request_opcode {
                return false;
            }
            if let Some(pending) = self.pending.take() {
                pending.kind.fail(BluewireError::Rejected {
                    request: resp.request,
                    handle: resp.handle,
                    code: resp.code,
                });
            }
            return true;
        }

        if !pending.kind.awaits(opcode) {
            // A response of the wrong kind while we wait is a peer bug;
            // the request cannot complete any more.
            if is_response_opcode(opcode) {
                if let Some(pending) = self.pending.take() {
                    pending.kind.fail(BluewireError::protocol(format!(
                        "response {opcode:#04x} does not answer request {:#04x}",
                        pending.request_opcode
                    )));
                }
                return true;
            }
            return false;
        }

        let Some(pending) = self.pending.take() else {
            return false;
        };

        match pending.kind {
            PendingKind::Mtu { requested, reply } => {
                let result = decode_mtu_resp(pdu).and_then(|peer| {
                    if peer < DEFAULT_LE_MTU {
                        Err(BluewireError::protocol(format!(
                            "peer offered MTU {peer}, below the minimum {DEFAULT_LE_MTU}"
                        )))
                    } else {
                        Ok(requested.min(peer))
                    }
                });
                let negotiated = result.as_ref().ok().copied();
                let _ = reply.send(result);
                if let Some(mtu) = negotiated {
                    self.mtu = mtu;
                    debug!(mtu, "MTU negotiated");
                    self.emit_status().await;
                }
            }
            PendingKind::Read { reply } => {
                let _ = reply.send(decode_read_resp(pdu));
            }
            PendingKind::ReadByType { reply } => {
                let _ = reply.send(decode_read_by_type_resp(pdu));
            }
            PendingKind::Write { reply } => {
                let _ = reply.send(Ok(()));
            }
        }
        true
    }

    /// Recoverable protocol violation: surface it and disconnect this
    /// session only.
    async fn protocol_violation(&mut self, reason: String) {
        warn!(%reason, "protocol violation, disconnecting");
        self.emit(SessionEvent::ProtocolViolation { reason }).await;
        self.teardown(BluewireError::Disconnected).await;
    }
}

/// Forwards inbound PDUs from the connection into the session's message
/// queue. Stream closure becomes `ChannelClosed`.
fn spawn_inbound_forwarder(
    mut inbound: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<Msg>,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(pdu) = inbound.recv().await {
            if tx.send(Msg::Inbound { generation, pdu }).await.is_err() {
                return;
            }
        }
        let _ = tx.send(Msg::ChannelClosed { generation }).await;
    })
}
