//! C2 — Secure Channel: an encrypted UDP datagram link to one robot.
//!
//! Framing is adapted from the teacher's length-prefixed bincode framing
//! over TCP (`communication::network::direct`): UDP already preserves
//! datagram boundaries, so each datagram is exactly one encoded+encrypted
//! `Frame` with no length prefix needed.

use crate::error::{CoreError, CoreResult};
use crate::shared_state::SharedState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;

/// Transmitted to the robot every 200 ms (`spec.md` §3). `Stop` is initial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenchmarkState {
    Stop,
    Prepare,
    GoalTx,
    WaitingResult,
}

impl Default for BenchmarkState {
    fn default() -> Self {
        BenchmarkState::Stop
    }
}

impl fmt::Display for BenchmarkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BenchmarkState::Stop => "STOP",
            BenchmarkState::Prepare => "PREPARE",
            BenchmarkState::GoalTx => "GOAL_TX",
            BenchmarkState::WaitingResult => "WAITING_RESULT",
        };
        write!(f, "{s}")
    }
}

/// Observed via beacons; the core never authors this locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotState {
    Stop,
    Preparing,
    WaitingGoal,
    Executing,
    ResultTx,
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RobotState::Stop => "STOP",
            RobotState::Preparing => "PREPARING",
            RobotState::WaitingGoal => "WAITING_GOAL",
            RobotState::Executing => "EXECUTING",
            RobotState::ResultTx => "RESULT_TX",
        };
        write!(f, "{s}")
    }
}

/// One of the four repeated/dedupe bundle kinds carried in a beacon
/// (`spec.md` §4.2; original `ReceiverRepeated` sinks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatedBundle {
    pub id: u64,
    pub payload: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkStateFrame {
    pub benchmark_type: String,
    pub benchmark_state: BenchmarkState,
    /// Echoes the robot's last reported time.
    pub acknowledgement: i64,
    /// Present only when `benchmark_state == GoalTx`.
    pub generic_goal: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotStateFrame {
    pub time: i64,
    pub robot_state: RobotState,
    pub messages_saved: u64,
    pub notifications: Option<RepeatedBundle>,
    pub activation_event: Option<RepeatedBundle>,
    pub visitor: Option<RepeatedBundle>,
    pub final_command: Option<RepeatedBundle>,
    pub generic_result: Option<String>,
    // HCFGAC device-mirroring fields; `None` when the robot doesn't report them.
    pub switch_1: Option<bool>,
    pub switch_2: Option<bool>,
    pub switch_3: Option<bool>,
    pub blinds: Option<u8>,
    pub dimmer: Option<u8>,
    pub tablet_display_map: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgType {
    BenchmarkState,
    RobotState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameHeader {
    pub comp_id: u32,
    pub msg_type: MsgType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    BenchmarkState(FrameHeader, BenchmarkStateFrame),
    RobotState(FrameHeader, RobotStateFrame),
}

/// Black-box datagram cipher seam (`spec.md` §1 Out of scope: "the datagram
/// cipher implementation itself"). A host linking this crate for a real
/// deployment supplies a real AES-CBC implementation behind this trait;
/// `XorCipher` below exists only so the channel is exercisable in tests.
pub trait CipherSuite: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8>;
    fn decrypt(&self, ciphertext: &[u8]) -> CoreResult<Vec<u8>>;
}

/// Not a security boundary. Stands in for "aes-128-cbc" until a host
/// supplies a real `CipherSuite`.
pub struct XorCipher {
    key: Vec<u8>,
}

impl XorCipher {
    pub fn from_password(password: &str) -> Self {
        let key = if password.is_empty() {
            vec![0u8]
        } else {
            password.as_bytes().to_vec()
        };
        Self { key }
    }

    fn xor(&self, data: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, b)| b ^ self.key[i % self.key.len()])
            .collect()
    }
}

impl CipherSuite for XorCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        self.xor(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> CoreResult<Vec<u8>> {
        Ok(self.xor(ciphertext))
    }
}

/// Resolves `event.cipher_suite` (default "aes-128-cbc") to an
/// implementation. See `CipherSuite` doc for why this is a placeholder.
pub fn cipher_suite_for(name: &str, password: &str) -> CoreResult<Box<dyn CipherSuite>> {
    match name {
        "" | "aes-128-cbc" | "none" => Ok(Box::new(XorCipher::from_password(password))),
        other => Err(CoreError::config(format!(
            "unsupported cipher suite: {other}"
        ))),
    }
}

/// Per-beacon bookkeeping shared by every single-robot executor (Simple and
/// Externally Controlled). Exactly one field holds the skew — the original
/// implementation's `last_skew_` shadowing bug (`spec.md` §9) is
/// structurally impossible here.
#[derive(Debug, Default, Clone)]
pub struct BeaconTracker {
    pub last_beacon: Option<Instant>,
    pub last_skew_ms: i64,
    pub messages_saved: u64,
}

impl BeaconTracker {
    pub fn record(&mut self, now: Instant, now_wall_ms: i64, frame: &RobotStateFrame) {
        self.last_beacon = Some(now);
        self.last_skew_ms = frame.time - now_wall_ms;
        self.messages_saved = frame.messages_saved;
    }

    pub fn skew_warning(&self) -> Option<String> {
        if self.last_skew_ms.unsigned_abs() > 500 {
            Some(format!("WARNING: last skew {} ms", self.last_skew_ms))
        } else {
            None
        }
    }

    pub fn staleness_warning(&self, now: Instant) -> Option<String> {
        match self.last_beacon {
            None => Some("WARNING: Not connected".to_string()),
            Some(t) if now.saturating_duration_since(t) > Duration::from_secs(5) => {
                Some("WARNING: no beacon for over 5s".to_string())
            }
            _ => None,
        }
    }
}

/// Dedupes one of the four repeated bundle kinds: only a strictly new
/// bundle id is forwarded (`spec.md` §4.2).
#[derive(Debug, Default, Clone)]
pub struct DedupeSink {
    last_id: Option<u64>,
}

impl DedupeSink {
    pub fn offer(&mut self, bundle: &RepeatedBundle) -> bool {
        if self.last_id == Some(bundle.id) {
            false
        } else {
            self.last_id = Some(bundle.id);
            true
        }
    }
}

/// Events delivered to the owning executor's reaction handler.
pub enum ChannelEvent {
    RobotState(RobotStateFrame),
    /// A BenchmarkStateFrame arrived on our own channel: a second RefBox is
    /// transmitting for this team (`spec.md` §4.2, §7 protocol-error-remote).
    ForeignTransmitter,
}

/// Owns one UDP endpoint and the shared symmetric key derived from the
/// event password.
pub struct SecureChannel {
    socket: Arc<UdpSocket>,
    peer_addr: parking_lot::Mutex<Option<SocketAddr>>,
    cipher: Box<dyn CipherSuite>,
    comp_id: u32,
    port: u16,
}

impl SecureChannel {
    /// Binds a socket on a port drawn from `shared`'s monotonic allocator,
    /// retrying on bind failure (a resource-transient, expected condition
    /// per `spec.md` §4.2) up to `max_attempts` times.
    pub async fn bind(
        shared: &SharedState,
        cipher_name: &str,
        password: &str,
        comp_id: u32,
        max_attempts: u32,
    ) -> CoreResult<Self> {
        let cipher = cipher_suite_for(cipher_name, password)?;
        let mut last_err = None;
        for _ in 0..max_attempts.max(1) {
            let port = shared.alloc_port();
            let addr: SocketAddr = format!("0.0.0.0:{port}").parse().expect("valid socket addr");
            match UdpSocket::bind(addr).await {
                Ok(socket) => {
                    return Ok(Self {
                        socket: Arc::new(socket),
                        peer_addr: parking_lot::Mutex::new(None),
                        cipher,
                        comp_id,
                        port,
                    })
                }
                Err(e) => last_err = Some(CoreError::resource_transient(e.to_string())),
            }
        }
        Err(last_err.unwrap_or_else(|| CoreError::resource_transient("no ports available")))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_peer(&self, addr: SocketAddr) {
        *self.peer_addr.lock() = Some(addr);
    }

    fn encode(&self, frame: &Frame) -> CoreResult<Vec<u8>> {
        let plaintext = bincode::serialize(frame)?;
        Ok(self.cipher.encrypt(&plaintext))
    }

    fn decode(&self, bytes: &[u8]) -> CoreResult<Frame> {
        let plaintext = self.cipher.decrypt(bytes)?;
        Ok(bincode::deserialize(&plaintext)?)
    }

    /// Sends the current BenchmarkState frame. Called every 200 ms
    /// regardless of whether the robot is silent.
    pub async fn send_benchmark_state(&self, frame: &BenchmarkStateFrame) -> CoreResult<()> {
        let peer = self
            .peer_addr
            .lock()
            .ok_or_else(|| CoreError::resource_transient("no peer address known yet"))?;
        let header = FrameHeader {
            comp_id: self.comp_id,
            msg_type: MsgType::BenchmarkState,
        };
        let bytes = self.encode(&Frame::BenchmarkState(header, frame.clone()))?;
        self.socket.send_to(&bytes, peer).await?;
        Ok(())
    }

    /// Receives and decodes one datagram, recording the sender as the peer
    /// if none is known yet, and classifying it per `spec.md` §4.2.
    pub async fn recv_one(&self) -> CoreResult<ChannelEvent> {
        let mut buf = vec![0u8; 65536];
        let (len, addr) = self.socket.recv_from(&mut buf).await?;
        if self.peer_addr.lock().is_none() {
            self.set_peer(addr);
        }
        match self.decode(&buf[..len])? {
            Frame::RobotState(_, frame) => Ok(ChannelEvent::RobotState(frame)),
            Frame::BenchmarkState(_, _) => Ok(ChannelEvent::ForeignTransmitter),
        }
    }

    /// Runs the receive loop until the socket errors or the task is
    /// dropped, forwarding decoded events to `tx`.
    pub async fn run_recv_loop(self: Arc<Self>, tx: UnboundedSender<ChannelEvent>) {
        loop {
            match self.recv_one().await {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("[SecureChannel] recv error: {e}");
                }
            }
        }
    }
}
