//! The streaming hub engine.
//!
//! [`Hub`] owns a duplex transport and mediates between host-initiated
//! commands and the asynchronous event traffic the modem produces. The
//! lifecycle:
//!
//! 1. The transport is split; a spawned receive pump owns the read half and
//!    is the only reader. It appends everything to the rolling
//!    [`ParseBuffer`] and routes decoded output.
//! 2. Acknowledgements go to the internal events channel where exactly one
//!    in-flight request is waiting. Event frames additionally fan out to
//!    every registered listener.
//! 3. Public operations serialize on an internal mutex, so ack routing is
//!    never ambiguous between racing callers.
//!
//! On a transport error the pump notifies the in-flight request and every
//! listener, then exits; the hub is unusable afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::categories::{Category, SubCategory};
use crate::error::{InsteonError, Result};
use crate::protocol::constants::{host, NAK, START};
use crate::protocol::{
    build_ext_plm_command, build_group_plm_command, build_plm_command, Address, AllLinkCompleted,
    AllLinkRecord, AllLinkRecordFlags, DatabaseRecord, Event, ExtResponse, LinkCode,
    ManageAllLinkCommand, ModemConfiguration, ParseBuffer, StdResponse,
};
use crate::transport::{self, Transport};
use crate::x10::{X10Flags, X10Raw};

/// Default deadline for every acknowledgement or follow-on wait.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a standard/extended response before the operation returns.
///
/// Back-to-back commands faster than this make the modem reply with
/// spurious double NAKs.
pub const COMMAND_PAUSE: Duration = Duration::from_millis(200);

/// Capacity of the internal events and errors channels.
const CHANNEL_BUFFER: usize = 10;

/// Capacity of each listener's notification queue.
const LISTENER_BUFFER: usize = 16;

/// Transport read chunk size.
const READ_CHUNK: usize = 255;

/// Direction tag passed to a comm logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommDirection {
    HostToModem,
    ModemToHost,
}

/// Callback receiving every raw chunk crossing the transport.
pub type CommLogger = Arc<dyn Fn(CommDirection, &[u8]) + Send + Sync>;

/// Identifier handed out by [`Hub::add_event_listener`].
pub type ListenerId = u64;

/// What a listener receives: every decoded event frame, and the terminal
/// transport error if the pump dies.
#[derive(Debug, Clone)]
pub enum Notification {
    Event(Event),
    Error(Arc<InsteonError>),
}

/// Modem identification returned by [`Hub::get_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemInfo {
    pub address: Address,
    pub category: Category,
    pub sub_category: SubCategory,
    pub firmware: u8,
}

impl ModemInfo {
    fn from_bytes(buf: &[u8]) -> Self {
        Self {
            address: Address::from_bytes(&buf[..3]),
            category: Category::from_byte(buf[3]),
            sub_category: SubCategory(buf[4]),
            firmware: buf[5],
        }
    }
}

/// State shared between the pump and the request engine.
struct Shared {
    parser: StdMutex<ParseBuffer>,
    listeners: StdMutex<Vec<(ListenerId, mpsc::Sender<Notification>)>>,
    logger: StdMutex<Option<CommLogger>>,
}

impl Shared {
    fn log_comm(&self, direction: CommDirection, bytes: &[u8]) {
        let logger = self.logger.lock().expect("logger lock").clone();
        if let Some(logger) = logger {
            logger(direction, bytes);
        }
    }

    /// Fire-and-forget fan-out. A listener whose queue is full loses this
    /// notification; a listener whose receiver is gone is unregistered.
    fn notify_listeners(&self, notification: Notification) {
        let mut listeners = self.listeners.lock().expect("listeners lock");
        listeners.retain(|(id, tx)| match tx.try_send(notification.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(listener = *id, "slow listener, notification dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

/// The single logical requestor: the write half plus the receiving ends of
/// the pump's channels. Operations lock this for their whole duration.
struct Requester {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    events: mpsc::Receiver<Event>,
    errors: mpsc::Receiver<InsteonError>,
}

/// A hub bridging the host to the Insteon network through a PLM.
pub struct Hub {
    shared: Arc<Shared>,
    requester: Mutex<Requester>,
    next_listener_id: AtomicU64,
    response_timeout: Duration,
    pump: JoinHandle<()>,
}

impl Hub {
    /// Construct a hub over any duplex transport and start the receive
    /// pump. Must be called within a tokio runtime.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_response_timeout(transport, DEFAULT_RESPONSE_TIMEOUT)
    }

    /// Like [`Hub::new`] with a custom acknowledgement/response deadline.
    pub fn with_response_timeout(transport: impl Transport + 'static, timeout: Duration) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);

        let shared = Arc::new(Shared {
            parser: StdMutex::new(ParseBuffer::new()),
            listeners: StdMutex::new(Vec::new()),
            logger: StdMutex::new(None),
        });
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(CHANNEL_BUFFER);

        let pump = tokio::spawn(run_pump(read_half, shared.clone(), events_tx, errors_tx));

        Self {
            shared,
            requester: Mutex::new(Requester {
                writer: Box::new(write_half),
                events: events_rx,
                errors: errors_rx,
            }),
            next_listener_id: AtomicU64::new(0),
            response_timeout: timeout,
            pump,
        }
    }

    /// Open a hub on a local PLM serial device.
    pub fn open_serial(path: &str) -> Result<Self> {
        Ok(Self::new(transport::serial::open(path)?))
    }

    /// Connect to a first-generation network hub at `host:port`.
    pub async fn connect_tcp(addr: &str) -> Result<Self> {
        Ok(Self::new(transport::tcp::connect(addr).await?))
    }

    /// Connect to a second-generation (HTTP) hub.
    pub fn connect_http(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(transport::HttpTransport::new(address, username, password))
    }

    /// Query the modem's identity (opcode 0x60).
    pub async fn get_info(&self) -> Result<ModemInfo> {
        let mut req = self.requester.lock().await;
        let rsp = self
            .direct_command(&mut req, &[START, host::GET_INFO], 9)
            .await?;
        Ok(ModemInfo::from_bytes(&rsp[2..]))
    }

    /// Read the modem configuration byte (opcode 0x73).
    pub async fn get_modem_config(&self) -> Result<ModemConfiguration> {
        let mut req = self.requester.lock().await;
        let rsp = self
            .direct_command(&mut req, &[START, host::GET_CONFIG], 6)
            .await?;
        Ok(ModemConfiguration(rsp[2]))
    }

    /// Write the modem configuration byte (opcode 0x6B).
    pub async fn set_modem_config(&self, cfg: ModemConfiguration) -> Result<()> {
        let mut req = self.requester.lock().await;
        self.direct_command(&mut req, &[START, host::SET_CONFIG, cfg.0], 4)
            .await?;
        Ok(())
    }

    /// Put the modem into linking mode and wait for a device to enroll.
    pub async fn start_all_link(&self, code: LinkCode, group: u8) -> Result<AllLinkCompleted> {
        let mut req = self.requester.lock().await;
        self.direct_command(
            &mut req,
            &[START, host::START_ALL_LINK, code as u8, group],
            5,
        )
        .await?;
        self.wait_for_event(&mut req, |event| match event {
            Event::AllLinkCompleted(done) => Some(done),
            _ => None,
        })
        .await
    }

    /// Leave linking mode without enrolling (opcode 0x65).
    pub async fn cancel_all_link(&self) -> Result<()> {
        let mut req = self.requester.lock().await;
        self.direct_command(&mut req, &[START, host::CANCEL_ALL_LINK], 3)
            .await?;
        Ok(())
    }

    /// Enumerate the modem's all-link database.
    ///
    /// Issues first/next record commands until the modem NAKs the next
    /// request, which signals the end of the list.
    pub async fn get_all_link_database(&self) -> Result<Vec<AllLinkRecord>> {
        let mut req = self.requester.lock().await;
        self.direct_command(&mut req, &[START, host::FIRST_ALL_LINK_RECORD], 3)
            .await?;

        let mut records = Vec::new();
        loop {
            let record = self
                .wait_for_event(&mut req, |event| match event {
                    Event::AllLinkRecord(record) => Some(record),
                    _ => None,
                })
                .await?;
            records.push(record);

            match self
                .direct_command(&mut req, &[START, host::NEXT_ALL_LINK_RECORD], 3)
                .await
            {
                Ok(_) => {}
                Err(InsteonError::NotReady) => return Ok(records),
                Err(err) => return Err(err),
            }
        }
    }

    /// Ask for the all-link record of the last device heard from.
    pub async fn get_last_sender(&self) -> Result<AllLinkRecord> {
        let mut req = self.requester.lock().await;
        self.direct_command(&mut req, &[START, host::LAST_SENDER_RECORD], 3)
            .await?;
        self.wait_for_event(&mut req, |event| match event {
            Event::AllLinkRecord(record) => Some(record),
            _ => None,
        })
        .await
    }

    /// Modify the modem's own all-link database (opcode 0x6F).
    pub async fn manage_all_link_record(
        &self,
        command: ManageAllLinkCommand,
        flags: AllLinkRecordFlags,
        group: u8,
        addr: Address,
        data: [u8; 3],
    ) -> Result<()> {
        let mut req = self.requester.lock().await;
        let cmd = [
            START,
            host::MANAGE_ALL_LINK_RECORD,
            command as u8,
            flags.0,
            group,
            addr.0[0],
            addr.0[1],
            addr.0[2],
            data[0],
            data[1],
            data[2],
        ];
        self.direct_command(&mut req, &cmd, cmd.len() + 1).await?;
        Ok(())
    }

    /// Make the modem beep (opcode 0x77).
    pub async fn beep(&self) -> Result<()> {
        let mut req = self.requester.lock().await;
        self.direct_command(&mut req, &[START, host::BEEP], 3)
            .await?;
        Ok(())
    }

    /// Put the modem's RF side to sleep (opcode 0x72).
    pub async fn sleep(&self) -> Result<()> {
        let mut req = self.requester.lock().await;
        self.direct_command(&mut req, &[START, host::RF_SLEEP], 3)
            .await?;
        Ok(())
    }

    /// Factory-reset the modem, clearing its all-link database.
    pub async fn reset(&self) -> Result<()> {
        let mut req = self.requester.lock().await;
        self.direct_command(&mut req, &[START, host::RESET], 3)
            .await?;
        Ok(())
    }

    /// Drive the modem LED. Requires auto-LED to be disabled in the modem
    /// configuration.
    pub async fn set_led(&self, on: bool) -> Result<()> {
        let opcode = if on { host::LED_ON } else { host::LED_OFF };
        let mut req = self.requester.lock().await;
        self.direct_command(&mut req, &[START, opcode], 3).await?;
        Ok(())
    }

    /// Read one raw record from the modem database (opcode 0x75).
    ///
    /// `addr` must be aligned to an 8-byte record boundary.
    pub async fn read_db(&self, addr: u16) -> Result<DatabaseRecord> {
        check_db_alignment(addr)?;
        let mut req = self.requester.lock().await;
        let cmd = [START, host::READ_DB, (addr >> 8) as u8, addr as u8];
        self.direct_command(&mut req, &cmd, 5).await?;
        self.wait_for_event(&mut req, |event| match event {
            Event::DatabaseRecord(record) => Some(record),
            _ => None,
        })
        .await
    }

    /// Write one raw record into the modem database (opcode 0x76).
    pub async fn write_db(&self, addr: u16, record: &AllLinkRecord) -> Result<()> {
        check_db_alignment(addr)?;
        let mut req = self.requester.lock().await;
        let mut cmd = vec![START, host::WRITE_DB, (addr >> 8) as u8, addr as u8];
        cmd.extend_from_slice(&record.to_bytes());
        let expected = cmd.len() + 1;
        self.direct_command(&mut req, &cmd, expected).await?;
        Ok(())
    }

    /// Set the category the modem reports for itself (opcode 0x66).
    pub async fn set_device_category(
        &self,
        category: Category,
        sub_category: SubCategory,
        firmware: u8,
    ) -> Result<()> {
        let mut req = self.requester.lock().await;
        let cmd = [
            START,
            host::SET_DEVICE_CATEGORY,
            category as u8,
            sub_category.0,
            firmware,
        ];
        self.direct_command(&mut req, &cmd, 6).await?;
        Ok(())
    }

    /// Send a standard message to a device and wait for its response.
    pub async fn send_message(
        &self,
        addr: Address,
        cmd1: u8,
        cmd2: u8,
    ) -> Result<StdResponse> {
        let mut req = self.requester.lock().await;
        let cmd = build_plm_command(addr, cmd1, cmd2);
        let expected = cmd.len() + 1;
        self.direct_command(&mut req, &cmd, expected).await?;
        self.wait_for_std_response(&mut req).await
    }

    /// Send an extended message carrying 14 bytes of user data and wait for
    /// the device's (standard) acknowledgement response.
    pub async fn send_extended_message(
        &self,
        addr: Address,
        cmd1: u8,
        cmd2: u8,
        user_data: [u8; 14],
    ) -> Result<StdResponse> {
        let mut req = self.requester.lock().await;
        let cmd = build_ext_plm_command(addr, cmd1, cmd2, user_data);
        let expected = cmd.len() + 1;
        self.direct_command(&mut req, &cmd, expected).await?;
        self.wait_for_std_response(&mut req).await
    }

    /// Broadcast a command to an all-link group.
    pub async fn send_group_command(&self, cmd1: u8, group: u8) -> Result<()> {
        let mut req = self.requester.lock().await;
        let cmd = build_group_plm_command(group, cmd1, 0);
        let expected = cmd.len() + 1;
        self.direct_command(&mut req, &cmd, expected).await?;
        Ok(())
    }

    /// Tunnel a raw X10 frame onto the powerline (opcode 0x63).
    pub async fn send_x10(&self, raw: X10Raw, flags: X10Flags) -> Result<()> {
        let mut req = self.requester.lock().await;
        self.direct_command(&mut req, &[START, host::SEND_X10, raw.0, flags.0], 5)
            .await?;
        Ok(())
    }

    /// Wait for the next extended response from the network.
    ///
    /// Used by follow-on protocols (such as reading a device's link
    /// database) where one command produces a stream of extended messages.
    pub async fn expect_extended_response(&self) -> Result<ExtResponse> {
        let mut req = self.requester.lock().await;
        self.wait_for_event(&mut req, |event| match event {
            Event::ExtResponse(rsp) => Some(rsp),
            _ => None,
        })
        .await
    }

    /// Register an event sink. Every decoded event frame (and a terminal
    /// transport error, should one occur) is delivered to the returned
    /// receiver. Delivery is fire-and-forget: a listener that stops reading
    /// loses whatever overflows its queue.
    pub fn add_event_listener(&self) -> (ListenerId, mpsc::Receiver<Notification>) {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER);
        self.shared
            .listeners
            .lock()
            .expect("listeners lock")
            .push((id, tx));
        (id, rx)
    }

    /// Unregister a listener by id.
    pub fn remove_event_listener(&self, id: ListenerId) {
        self.shared
            .listeners
            .lock()
            .expect("listeners lock")
            .retain(|(listener, _)| *listener != id);
    }

    /// Install (or clear) a raw traffic logger.
    pub fn set_comm_logger(&self, logger: Option<CommLogger>) {
        *self.shared.logger.lock().expect("logger lock") = logger;
    }

    /// Issue one command and wait for its acknowledgement.
    ///
    /// `expected_len` is the echoed command length plus the trailing ack
    /// byte. Returns the full echo slice on ACK. Unsolicited events arriving
    /// first are consumed and ignored here; listeners have already seen
    /// them. On timeout the stale pending-ack entry is withdrawn so a late
    /// echo cannot satisfy a later command.
    async fn direct_command(
        &self,
        req: &mut Requester,
        cmd: &[u8],
        expected_len: usize,
    ) -> Result<Bytes> {
        self.shared
            .parser
            .lock()
            .expect("parser lock")
            .expect_ack(cmd.to_vec(), expected_len);

        self.shared.log_comm(CommDirection::HostToModem, cmd);
        trace!(cmd = ?cmd, "sending command");

        let written = async {
            req.writer.write_all(cmd).await?;
            req.writer.flush().await
        }
        .await;
        if let Err(err) = written {
            self.shared
                .parser
                .lock()
                .expect("parser lock")
                .cancel_ack(cmd);
            return Err(err.into());
        }

        let wait = async {
            loop {
                tokio::select! {
                    event = req.events.recv() => match event {
                        Some(Event::Ack(ack)) => {
                            return if ack.is_ack() {
                                Ok(ack.response)
                            } else if ack.kind == NAK {
                                Err(InsteonError::NotReady)
                            } else {
                                Err(InsteonError::UnexpectedAckByte(ack.kind))
                            };
                        }
                        Some(event) => debug!(?event, "event before ack, ignored by requestor"),
                        None => return Err(InsteonError::Closed),
                    },
                    err = req.errors.recv() => {
                        return Err(err.unwrap_or(InsteonError::Closed));
                    }
                }
            }
        };

        match tokio::time::timeout(self.response_timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                self.shared
                    .parser
                    .lock()
                    .expect("parser lock")
                    .cancel_ack(cmd);
                Err(InsteonError::AckTimeout)
            }
        }
    }

    /// Consume events until `pick` accepts one, or the deadline passes.
    async fn wait_for_event<T>(
        &self,
        req: &mut Requester,
        mut pick: impl FnMut(Event) -> Option<T>,
    ) -> Result<T> {
        let wait = async {
            loop {
                tokio::select! {
                    event = req.events.recv() => match event {
                        Some(event) => {
                            if let Some(value) = pick(event) {
                                return Ok(value);
                            }
                        }
                        None => return Err(InsteonError::Closed),
                    },
                    err = req.errors.recv() => {
                        return Err(err.unwrap_or(InsteonError::Closed));
                    }
                }
            }
        };

        match tokio::time::timeout(self.response_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(InsteonError::AckTimeout),
        }
    }

    /// Wait for a standard response, then pace before returning.
    async fn wait_for_std_response(&self, req: &mut Requester) -> Result<StdResponse> {
        let rsp = self
            .wait_for_event(req, |event| match event {
                Event::StdResponse(rsp) => Some(rsp),
                _ => None,
            })
            .await?;
        tokio::time::sleep(COMMAND_PAUSE).await;
        Ok(rsp)
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn check_db_alignment(addr: u16) -> Result<()> {
    if addr & 0xF != 0x0 && addr & 0xF != 0x8 {
        return Err(InsteonError::AddressMisaligned(addr));
    }
    Ok(())
}

/// The receive pump: sole reader of the transport.
async fn run_pump<R>(
    mut reader: R,
    shared: Arc<Shared>,
    events_tx: mpsc::Sender<Event>,
    errors_tx: mpsc::Sender<InsteonError>,
) where
    R: AsyncRead + Send + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                fail(&shared, &errors_tx, InsteonError::Closed);
                return;
            }
            Ok(n) => n,
            Err(err) => {
                fail(&shared, &errors_tx, err.into());
                return;
            }
        };

        shared.log_comm(CommDirection::ModemToHost, &chunk[..n]);
        trace!(bytes = n, "transport read");

        let decoded = shared
            .parser
            .lock()
            .expect("parser lock")
            .push(&chunk[..n]);
        for event in decoded {
            if !matches!(event, Event::Ack(_)) {
                shared.notify_listeners(Notification::Event(event.clone()));
            }
            if let Err(err) = events_tx.try_send(event) {
                match err {
                    mpsc::error::TrySendError::Full(event) => {
                        debug!(?event, "no waiter consuming events, dropped")
                    }
                    mpsc::error::TrySendError::Closed(_) => return,
                }
            }
        }
    }
}

/// Terminal error: surface it to the in-flight request and every listener.
fn fail(shared: &Shared, errors_tx: &mpsc::Sender<InsteonError>, err: InsteonError) {
    warn!(%err, "receive pump exiting");
    let broadcast = Arc::new(clone_transport_error(&err));
    let _ = errors_tx.try_send(err);
    shared.notify_listeners(Notification::Error(broadcast));
}

/// Transport errors are not `Clone`; recreate an equivalent for fan-out.
fn clone_transport_error(err: &InsteonError) -> InsteonError {
    match err {
        InsteonError::Io(io) => InsteonError::Io(std::io::Error::new(io.kind(), io.to_string())),
        _ => InsteonError::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_alignment_accepts_record_boundaries() {
        assert!(check_db_alignment(0x0FF8).is_ok());
        assert!(check_db_alignment(0x0FF0).is_ok());
        assert!(matches!(
            check_db_alignment(0x0FF4),
            Err(InsteonError::AddressMisaligned(0x0FF4))
        ));
    }

    #[test]
    fn modem_info_from_ack_payload() {
        // GetInfo ack payload after the echoed opcode: address, category,
        // subcategory, firmware (trailing ack byte is ignored).
        let info = ModemInfo::from_bytes(&[0x01, 0x02, 0x03, 0x03, 0x37, 0x9C, 0x06]);
        assert_eq!(info.address, Address::new(0x01, 0x02, 0x03));
        assert_eq!(info.category, Category::NetworkBridge);
        assert_eq!(info.sub_category, SubCategory(0x37));
        assert_eq!(info.firmware, 0x9C);
    }
}
