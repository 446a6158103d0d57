//! # MCTP Control State Machine
//!
//! The handler for message type 0, per DSP0236 v1.3.1. Implements Set/Get
//! Endpoint ID, Get Endpoint UUID, Get Version Support, and Get Message
//! Type Support (commands 0x01-0x05); commands 0x06-0x14 are recognized but
//! not serviced, per spec Non-goals (routing/bridging, discovery, EID pool
//! allocation, rate limiting all live in that unserviced range).

use crate::action::Action;
use crate::endpoint::{EndpointState, EID_BROADCAST, EID_NULL};
use crate::message::Message;
use crate::pool::ObjectPool;
use crate::version::VersionRegistry;
use std::sync::Mutex;
use tracing::{trace, warn};

/// MCTP Control Command IDs (Table 12).
pub mod cmd {
    pub const RESERVED: u8 = 0x00;
    pub const SET_ENDPOINT_ID: u8 = 0x01;
    pub const GET_ENDPOINT_ID: u8 = 0x02;
    pub const GET_ENDPOINT_UUID: u8 = 0x03;
    pub const GET_VERSION_SUPPORT: u8 = 0x04;
    pub const GET_MESSAGE_TYPE_SUPPORT: u8 = 0x05;
    /// Highest command code recognized by DSP0236 Table 12; 0x06-0x14 are
    /// accepted as valid commands but this endpoint generates no response.
    pub const MAX_RECOGNIZED: u8 = 0x14;
}

/// MCTP Control Completion Codes (Table 13).
pub mod cc {
    pub const SUCCESS: u8 = 0x00;
    pub const ERROR: u8 = 0x01;
    pub const INVALID_DATA: u8 = 0x02;
    #[allow(dead_code)]
    pub const INVALID_LENGTH: u8 = 0x03;
    #[allow(dead_code)]
    pub const NOT_READY: u8 = 0x04;
    #[allow(dead_code)]
    pub const UNSUPPORTED_CMD: u8 = 0x05;
    /// Used by Get Version Support when no versions are registered for the
    /// requested type.
    pub const NO_VERSIONS: u8 = 0x80;
}

/// Endpoint Type (Table 15).
pub mod endpoint_type {
    pub const SIMPLE_ENDPOINT: u8 = 0;
    #[allow(dead_code)]
    pub const BRIDGE: u8 = 1;
}

/// Endpoint ID Type (Table 15).
pub mod id_type {
    pub const DYNAMIC: u8 = 0;
}

/// Set Endpoint ID operation field (Table 14).
pub mod set_eid_op {
    pub const SET: u8 = 0;
    #[allow(dead_code)]
    pub const FORCE: u8 = 1;
    pub const RESET: u8 = 2;
    pub const DISCOVER: u8 = 3;
}

/// Set Endpoint ID assignment status (Table 14).
pub mod assignment {
    pub const ACCEPTED: u8 = 0;
    pub const REJECTED: u8 = 1;
}

/// Fixed response-payload lengths (control-header length `MCLN_CTRL` = 2
/// bytes is added by the caller), per command, from DSP0236 Table 12/14-18.
pub mod len {
    pub const CTRL_HDR: usize = 2;
    pub const SET_EID_RESP: usize = 4;
    pub const GET_EID_RESP: usize = 4;
    pub const GET_UUID_RESP: usize = 17;
    pub const GET_VER_SUPPORT_RESP: usize = 2;
    pub const GET_MSG_TYPE_SUPPORT_RESP: usize = 2;
}

/// Message types this endpoint advertises via Get Message Type Support.
pub const SUPPORTED_MESSAGE_TYPES: [u8; 2] = [crate::MSG_TYPE_CXL_FM_API, crate::MSG_TYPE_CXL_CCI];

/// The 2-byte MCTP Control message header, unpacked.
#[derive(Debug, Clone, Copy)]
pub struct CtrlHeader {
    pub inst: u8,
    pub datagram: bool,
    pub req: bool,
    pub cmd: u8,
}

impl CtrlHeader {
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let b0 = bytes[0];
        Self {
            inst: b0 & 0x1F,
            datagram: (b0 >> 6) & 0x01 != 0,
            req: (b0 >> 7) & 0x01 != 0,
            cmd: bytes[1],
        }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        let b0 = (self.inst & 0x1F) | ((self.datagram as u8) << 6) | ((self.req as u8) << 7);
        [b0, self.cmd]
    }

    /// A response header: same instance/datagram/cmd as the request, with
    /// the request bit cleared.
    pub fn response_to(req: CtrlHeader) -> Self {
        Self {
            inst: req.inst,
            datagram: req.datagram,
            req: false,
            cmd: req.cmd,
        }
    }
}

/// Outcome of handling one Control request: whether a response was
/// produced (it may legitimately not be, for 0x06-0x14) and, if this
/// request is being rejected outright, how.
pub enum CtrlOutcome {
    /// A response was written into `action.rsp` and is ready for TMQ.
    Responded,
    /// The request was well-formed for an unimplemented/unrecognized
    /// command; no response is generated (not an error).
    Unserviced,
    /// The request failed validation before any command dispatch (wrong
    /// request bit, EID filtering) and must be silently dropped.
    Dropped,
}

/// Shared Control-layer state: endpoint identity and the version registry
/// consulted by Get Version Support.
pub struct ControlState {
    pub endpoint: Mutex<EndpointState>,
    pub versions: Mutex<VersionRegistry>,
}

impl ControlState {
    pub fn new(endpoint: EndpointState, versions: VersionRegistry) -> Self {
        Self {
            endpoint: Mutex::new(endpoint),
            versions: Mutex::new(versions),
        }
    }
}

/// Handle one inbound Control request, filling `action.rsp` from
/// `msg_pool` when a response is warranted.
///
/// Matches the original `mctp_ctrl_handler` dispatch exactly, but resolves
/// the documented rv=0/rv=1 inversion in its `default` arm: here, success
/// (a response was produced, or the command is legitimately unserviced) is
/// `Ok`, and a dropped/invalid request is signaled through
/// [`CtrlOutcome::Dropped`] rather than an inconsistent return code.
pub fn handle_request(state: &ControlState, action: &mut Action, msg_pool: &ObjectPool<Box<Message>>) -> CtrlOutcome {
    let req = match action.req.as_ref() {
        Some(r) => r,
        None => return CtrlOutcome::Dropped,
    };

    if !req.owner {
        trace!("control: dropping message with owner=0 (not a request)");
        return CtrlOutcome::Dropped;
    }

    let payload = req.payload_bytes();
    if payload.len() < len::CTRL_HDR {
        warn!("control: request shorter than control header, dropping");
        return CtrlOutcome::Dropped;
    }
    let mut hdr_bytes = [0u8; 2];
    hdr_bytes.copy_from_slice(&payload[..2]);
    let req_hdr = CtrlHeader::from_bytes(hdr_bytes);

    if !req_hdr.req {
        trace!("control: request bit clear, dropping");
        return CtrlOutcome::Dropped;
    }

    {
        let endpoint = state.endpoint.lock().unwrap();
        if req.dst != EID_NULL && req.dst != EID_BROADCAST && endpoint.is_eid_set() && req.dst != endpoint.eid {
            trace!(dst = req.dst, local_eid = endpoint.eid, "control: EID filter mismatch, dropping");
            return CtrlOutcome::Dropped;
        }
    }

    if req_hdr.cmd > cmd::MAX_RECOGNIZED {
        warn!(cmd = req_hdr.cmd, "control: unrecognized command, dropping");
        return CtrlOutcome::Dropped;
    }

    match req_hdr.cmd {
        cmd::RESERVED => CtrlOutcome::Unserviced,
        cmd::SET_ENDPOINT_ID => set_eid(state, action, msg_pool, req_hdr, &payload[2..]),
        cmd::GET_ENDPOINT_ID => get_eid(state, action, msg_pool, req_hdr),
        cmd::GET_ENDPOINT_UUID => get_uuid(state, action, msg_pool, req_hdr),
        cmd::GET_VERSION_SUPPORT => get_ver_support(state, action, msg_pool, req_hdr, &payload[2..]),
        cmd::GET_MESSAGE_TYPE_SUPPORT => get_type_support(state, action, msg_pool, req_hdr),
        _ => CtrlOutcome::Unserviced,
    }
}

/// Fill in the MCTP envelope fields of a Control response from its request:
/// swap src/dst, copy type and tag so the peer can correlate the reply.
/// `owner` (the Tag Owner bit) is left at the fresh response message's
/// default of `false`: the responder never sets TO, only the original
/// requester did.
fn fill_envelope(rsp: &mut Message, req: &Message, payload_len: usize) {
    rsp.dst = req.src;
    rsp.src = req.dst;
    rsp.msg_type = req.msg_type;
    rsp.tag = req.tag;
    rsp.len = len::CTRL_HDR + payload_len;
}

fn acquire_response(action: &mut Action, msg_pool: &ObjectPool<Box<Message>>) -> Option<()> {
    let mut rsp = msg_pool.try_acquire_sync()?;
    rsp.reset();
    action.rsp = Some(rsp);
    Some(())
}

fn set_eid(state: &ControlState, action: &mut Action, msg_pool: &ObjectPool<Box<Message>>, req_hdr: CtrlHeader, body: &[u8]) -> CtrlOutcome {
    let req = action.req.as_ref().unwrap();
    let req_src = req.src;
    if body.len() < 2 {
        return CtrlOutcome::Dropped;
    }
    let operation = body[0] & 0x03;
    let eid = body[1];

    if acquire_response(action, msg_pool).is_none() {
        warn!("control: message pool exhausted handling Set Endpoint ID");
        return CtrlOutcome::Dropped;
    }

    let (comp_code, assignment_status, resulting_eid) = if operation == set_eid_op::RESET || operation == set_eid_op::DISCOVER {
        let eid = state.endpoint.lock().unwrap().eid;
        (cc::INVALID_DATA, assignment::REJECTED, eid)
    } else if eid == EID_NULL || eid == EID_BROADCAST {
        let eid = state.endpoint.lock().unwrap().eid;
        (cc::INVALID_DATA, assignment::REJECTED, eid)
    } else {
        let mut endpoint = state.endpoint.lock().unwrap();
        endpoint.eid = eid;
        endpoint.bus_owner_eid = req_src;
        (cc::SUCCESS, assignment::ACCEPTED, eid)
    };

    let req = action.req.as_ref().unwrap();
    let rsp = action.rsp.as_mut().unwrap();
    let mut body = [0u8; len::SET_EID_RESP];
    body[0] = comp_code;
    body[1] = (assignment_status & 0x03) << 4; // allocation=0, rsvd=0
    body[2] = resulting_eid;
    body[3] = 0; // pool_size
    write_response(rsp, req, req_hdr, &body);
    CtrlOutcome::Responded
}

fn get_eid(state: &ControlState, action: &mut Action, msg_pool: &ObjectPool<Box<Message>>, req_hdr: CtrlHeader) -> CtrlOutcome {
    if acquire_response(action, msg_pool).is_none() {
        return CtrlOutcome::Dropped;
    }
    let eid = state.endpoint.lock().unwrap().eid;
    let req = action.req.as_ref().unwrap();
    let rsp = action.rsp.as_mut().unwrap();
    let body = [
        cc::SUCCESS,
        eid,
        (endpoint_type::SIMPLE_ENDPOINT << 2) | id_type::DYNAMIC,
        0, // medium_specific
    ];
    write_response(rsp, req, req_hdr, &body);
    CtrlOutcome::Responded
}

fn get_uuid(state: &ControlState, action: &mut Action, msg_pool: &ObjectPool<Box<Message>>, req_hdr: CtrlHeader) -> CtrlOutcome {
    if acquire_response(action, msg_pool).is_none() {
        return CtrlOutcome::Dropped;
    }
    let uuid = state.endpoint.lock().unwrap().uuid;
    let req = action.req.as_ref().unwrap();
    let rsp = action.rsp.as_mut().unwrap();
    let mut body = [0u8; len::GET_UUID_RESP];
    body[0] = cc::SUCCESS;
    body[1..].copy_from_slice(&uuid);
    write_response(rsp, req, req_hdr, &body);
    CtrlOutcome::Responded
}

fn get_type_support(state: &ControlState, action: &mut Action, msg_pool: &ObjectPool<Box<Message>>, req_hdr: CtrlHeader) -> CtrlOutcome {
    let _ = state;
    if acquire_response(action, msg_pool).is_none() {
        return CtrlOutcome::Dropped;
    }
    let req = action.req.as_ref().unwrap();
    let rsp = action.rsp.as_mut().unwrap();
    let mut body = vec![cc::SUCCESS, SUPPORTED_MESSAGE_TYPES.len() as u8];
    body.extend_from_slice(&SUPPORTED_MESSAGE_TYPES);
    write_response(rsp, req, req_hdr, &body);
    CtrlOutcome::Responded
}

fn get_ver_support(state: &ControlState, action: &mut Action, msg_pool: &ObjectPool<Box<Message>>, req_hdr: CtrlHeader, body: &[u8]) -> CtrlOutcome {
    if body.is_empty() {
        return CtrlOutcome::Dropped;
    }
    let requested_type = body[0];
    if acquire_response(action, msg_pool).is_none() {
        return CtrlOutcome::Dropped;
    }
    let versions = {
        let registry = state.versions.lock().unwrap();
        registry.versions_for(requested_type).to_vec()
    };
    let req = action.req.as_ref().unwrap();
    let rsp = action.rsp.as_mut().unwrap();

    let comp_code = if versions.is_empty() { cc::NO_VERSIONS } else { cc::SUCCESS };
    let mut out = vec![comp_code, versions.len() as u8];
    for ver in &versions {
        out.push(ver.major);
        out.push(ver.minor);
        out.push(ver.update);
        out.push(ver.alpha);
    }
    write_response(rsp, req, req_hdr, &out);
    CtrlOutcome::Responded
}

fn write_response(rsp: &mut Message, req: &Message, req_hdr: CtrlHeader, body: &[u8]) {
    let rsp_hdr = CtrlHeader::response_to(req_hdr);
    let hdr_bytes = rsp_hdr.to_bytes();
    rsp.payload[0] = hdr_bytes[0];
    rsp.payload[1] = hdr_bytes[1];
    rsp.payload[2..2 + body.len()].copy_from_slice(body);
    fill_envelope(rsp, req, body.len());
}

/// Binds [`handle_request`] to the runtime-replaceable handler registry as
/// the default handler for message type 0.
pub struct ControlHandler;

#[async_trait::async_trait]
impl crate::handler::Handler for ControlHandler {
    async fn handle(&self, core: &crate::core::Core, mut action: Box<Action>) {
        match handle_request(&core.control, &mut action, &core.msg_pool) {
            CtrlOutcome::Responded => {
                if core.tmq.push(action).is_err() {
                    warn!("control: TMQ closed, dropping response");
                }
            }
            CtrlOutcome::Unserviced | CtrlOutcome::Dropped => {
                if let Some(req) = action.req.take() {
                    core.msg_pool.release(req);
                }
                if let Some(rsp) = action.rsp.take() {
                    core.msg_pool.release(rsp);
                }
                action.reset();
                core.action_pool.release(action);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionEntry;

    fn make_pool() -> ObjectPool<Box<Message>> {
        ObjectPool::new(4, || Box::new(Message::empty()))
    }

    fn make_request(dst: u8, src: u8, cmd: u8, inst: u8, body: &[u8]) -> Box<Message> {
        let mut msg = Box::new(Message::empty());
        msg.src = src;
        msg.dst = dst;
        msg.msg_type = 0;
        msg.owner = true;
        let hdr = CtrlHeader {
            inst,
            datagram: false,
            req: true,
            cmd,
        };
        let hb = hdr.to_bytes();
        msg.payload[0] = hb[0];
        msg.payload[1] = hb[1];
        msg.payload[2..2 + body.len()].copy_from_slice(body);
        msg.len = len::CTRL_HDR + body.len();
        msg
    }

    #[test]
    fn set_eid_accepts_valid_request_s1() {
        let state = ControlState::new(EndpointState::new(Default::default()), VersionRegistry::new());
        let pool = make_pool();
        let mut action = Action::empty();
        action.req = Some(make_request(EID_NULL, 0x10, cmd::SET_ENDPOINT_ID, 3, &[set_eid_op::SET, 0x02]));

        let outcome = handle_request(&state, &mut action, &pool);
        assert!(matches!(outcome, CtrlOutcome::Responded));

        let endpoint = state.endpoint.lock().unwrap();
        assert_eq!(endpoint.eid, 0x02);
        assert_eq!(endpoint.bus_owner_eid, 0x10);

        let rsp = action.rsp.as_ref().unwrap();
        assert_eq!(rsp.payload[2], cc::SUCCESS);
        assert_eq!((rsp.payload[3] >> 4) & 0x03, assignment::ACCEPTED);
        assert_eq!(rsp.payload[4], 0x02);
        // Envelope must be the plain req src/dst swap, never overwritten by
        // the freshly assigned EID (spec §4.6's closing sentence).
        assert_eq!(rsp.src, EID_NULL);
        assert_eq!(rsp.dst, 0x10);
    }

    #[test]
    fn set_eid_rejects_reset_operation_s2() {
        let state = ControlState::new(EndpointState::new(Default::default()), VersionRegistry::new());
        let pool = make_pool();
        let mut action = Action::empty();
        action.req = Some(make_request(EID_NULL, 0x10, cmd::SET_ENDPOINT_ID, 1, &[set_eid_op::RESET, 0x02]));

        handle_request(&state, &mut action, &pool);

        let endpoint = state.endpoint.lock().unwrap();
        assert_eq!(endpoint.eid, EID_NULL);

        let rsp = action.rsp.as_ref().unwrap();
        assert_eq!(rsp.payload[2], cc::INVALID_DATA);
        assert_eq!((rsp.payload[3] >> 4) & 0x03, assignment::REJECTED);
    }

    #[test]
    fn get_version_support_returns_single_entry_s3() {
        let mut registry = VersionRegistry::new();
        registry.insert(0xFF, VersionEntry { major: 0xF1, minor: 0xF3, update: 0xF1, alpha: 0x00 });
        let state = ControlState::new(EndpointState::new(Default::default()), registry);
        let pool = make_pool();
        let mut action = Action::empty();
        action.req = Some(make_request(EID_NULL, 0x10, cmd::GET_VERSION_SUPPORT, 0, &[0xFF]));

        handle_request(&state, &mut action, &pool);

        let rsp = action.rsp.as_ref().unwrap();
        assert_eq!(rsp.payload[2], cc::SUCCESS);
        assert_eq!(rsp.payload[3], 1);
        assert_eq!(&rsp.payload[4..8], &[0xF1, 0xF3, 0xF1, 0x00]);
    }

    #[test]
    fn unrecognized_high_command_is_unserviced() {
        let state = ControlState::new(EndpointState::new(Default::default()), VersionRegistry::new());
        let pool = make_pool();
        let mut action = Action::empty();
        action.req = Some(make_request(EID_NULL, 0x10, 0x06, 0, &[]));
        let outcome = handle_request(&state, &mut action, &pool);
        assert!(matches!(outcome, CtrlOutcome::Unserviced));
        assert!(action.rsp.is_none());
    }

    #[test]
    fn non_request_message_is_dropped() {
        let state = ControlState::new(EndpointState::new(Default::default()), VersionRegistry::new());
        let pool = make_pool();
        let mut action = Action::empty();
        let mut msg = make_request(EID_NULL, 0x10, cmd::GET_ENDPOINT_ID, 0, &[]);
        msg.owner = false;
        action.req = Some(msg);
        let outcome = handle_request(&state, &mut action, &pool);
        assert!(matches!(outcome, CtrlOutcome::Dropped));
    }
}
