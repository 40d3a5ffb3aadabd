//! Messages passed between distributed nodes.
//!
//! Reference: [12.3 Protocol between Connected Nodes]
//! (http://erlang.org/doc/apps/erts/erl_dist_protocol.html#id105440).
//!
//! Note that distribution headers are not supported in the current version.
use crate::codec;
use crate::term::{Pid, Reference, Term};

pub use crate::channel::{channel, Receiver, Sender};

/// Errors raised while decoding a control tuple into a [`Message`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MessageError {
    #[error("control tuple must have at least one element (the opcode)")]
    EmptyControlTuple,

    #[error("unsupported distribution operation code {op}")]
    UnsupportedOp { op: i64 },

    #[error("control tuple for op {op} must have {expected} elements, got {actual}")]
    WrongArity {
        op: i64,
        expected: usize,
        actual: usize,
    },

    #[error("a payload-bearing message is missing its payload term")]
    MissingPayload,

    #[error(transparent)]
    WrongKind(#[from] crate::term::WrongKind),

    #[error(transparent)]
    Decode(#[from] codec::DecodeError),

    #[error(transparent)]
    Encode(#[from] codec::EncodeError),
}

fn expect_arity(op: i64, elements: &[Term], expected: usize) -> Result<(), MessageError> {
    if elements.len() != expected {
        Err(MessageError::WrongArity {
            op,
            expected,
            actual: elements.len(),
        })
    } else {
        Ok(())
    }
}

fn pid_at(elements: &[Term], i: usize) -> Result<Pid, MessageError> {
    Ok(elements[i].as_pid()?.clone())
}

fn reference_at(elements: &[Term], i: usize) -> Result<Reference, MessageError> {
    match &elements[i] {
        Term::Reference(r) => Ok(r.clone()),
        other => Err(other.wrong_kind(crate::term::TermKind::Reference).into()),
    }
}

macro_rules! control_message {
    (
        $(#[$attr:meta])*
        struct $name:ident { $($field:ident : $ty:ty),* $(,)? }
        op = $op:expr;
        encode($self_:ident) -> $encode_body:expr;
        decode($op_var:ident, $elements:ident) -> $decode_body:expr;
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl $name {
            pub const OP: i64 = $op;

            fn control(&$self_) -> Term {
                $encode_body
            }

            fn from_elements($op_var: i64, $elements: &[Term]) -> Result<Self, MessageError> {
                $decode_body
            }
        }
    };
}

control_message! {
    struct Link { from_pid: Pid, to_pid: Pid }
    op = 1;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), Term::Pid(self.from_pid.clone()), Term::Pid(self.to_pid.clone())]);
    decode(op, e) -> {
        expect_arity(op, e, 3)?;
        Ok(Self { from_pid: pid_at(e, 1)?, to_pid: pid_at(e, 2)? })
    };
}

control_message! {
    struct Unlink { from_pid: Pid, to_pid: Pid }
    op = 4;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), Term::Pid(self.from_pid.clone()), Term::Pid(self.to_pid.clone())]);
    decode(op, e) -> {
        expect_arity(op, e, 3)?;
        Ok(Self { from_pid: pid_at(e, 1)?, to_pid: pid_at(e, 2)? })
    };
}

control_message! {
    struct GroupLeader { from_pid: Pid, to_pid: Pid }
    op = 7;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), Term::Pid(self.from_pid.clone()), Term::Pid(self.to_pid.clone())]);
    decode(op, e) -> {
        expect_arity(op, e, 3)?;
        Ok(Self { from_pid: pid_at(e, 1)?, to_pid: pid_at(e, 2)? })
    };
}

control_message! {
    struct NodeLink {}
    op = 5;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP)]);
    decode(op, e) -> {
        expect_arity(op, e, 1)?;
        Ok(Self {})
    };
}

control_message! {
    struct Exit { from_pid: Pid, to_pid: Pid, reason: Term }
    op = 3;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), Term::Pid(self.from_pid.clone()), Term::Pid(self.to_pid.clone()), self.reason.clone()]);
    decode(op, e) -> {
        expect_arity(op, e, 4)?;
        Ok(Self { from_pid: pid_at(e, 1)?, to_pid: pid_at(e, 2)?, reason: e[3].clone() })
    };
}

control_message! {
    struct Exit2 { from_pid: Pid, to_pid: Pid, reason: Term }
    op = 8;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), Term::Pid(self.from_pid.clone()), Term::Pid(self.to_pid.clone()), self.reason.clone()]);
    decode(op, e) -> {
        expect_arity(op, e, 4)?;
        Ok(Self { from_pid: pid_at(e, 1)?, to_pid: pid_at(e, 2)?, reason: e[3].clone() })
    };
}

control_message! {
    struct ExitTt { from_pid: Pid, to_pid: Pid, trace_token: Term, reason: Term }
    op = 13;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), Term::Pid(self.from_pid.clone()), Term::Pid(self.to_pid.clone()), self.trace_token.clone(), self.reason.clone()]);
    decode(op, e) -> {
        expect_arity(op, e, 5)?;
        Ok(Self { from_pid: pid_at(e, 1)?, to_pid: pid_at(e, 2)?, trace_token: e[3].clone(), reason: e[4].clone() })
    };
}

control_message! {
    struct Exit2Tt { from_pid: Pid, to_pid: Pid, trace_token: Term, reason: Term }
    op = 18;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), Term::Pid(self.from_pid.clone()), Term::Pid(self.to_pid.clone()), self.trace_token.clone(), self.reason.clone()]);
    decode(op, e) -> {
        expect_arity(op, e, 5)?;
        Ok(Self { from_pid: pid_at(e, 1)?, to_pid: pid_at(e, 2)?, trace_token: e[3].clone(), reason: e[4].clone() })
    };
}

control_message! {
    struct MonitorP { from_pid: Pid, to_proc: Term, monitor_ref: Reference }
    op = 19;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), Term::Pid(self.from_pid.clone()), self.to_proc.clone(), Term::Reference(self.monitor_ref.clone())]);
    decode(op, e) -> {
        expect_arity(op, e, 4)?;
        Ok(Self { from_pid: pid_at(e, 1)?, to_proc: e[2].clone(), monitor_ref: reference_at(e, 3)? })
    };
}

control_message! {
    struct DemonitorP { from_pid: Pid, to_proc: Term, monitor_ref: Reference }
    op = 20;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), Term::Pid(self.from_pid.clone()), self.to_proc.clone(), Term::Reference(self.monitor_ref.clone())]);
    decode(op, e) -> {
        expect_arity(op, e, 4)?;
        Ok(Self { from_pid: pid_at(e, 1)?, to_proc: e[2].clone(), monitor_ref: reference_at(e, 3)? })
    };
}

control_message! {
    struct MonitorPExit { from_proc: Term, to_pid: Pid, monitor_ref: Reference, reason: Term }
    op = 21;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), self.from_proc.clone(), Term::Pid(self.to_pid.clone()), Term::Reference(self.monitor_ref.clone()), self.reason.clone()]);
    decode(op, e) -> {
        expect_arity(op, e, 5)?;
        Ok(Self { from_proc: e[1].clone(), to_pid: pid_at(e, 2)?, monitor_ref: reference_at(e, 3)?, reason: e[4].clone() })
    };
}

control_message! {
    struct UnlinkId { id: i64, from_pid: Pid, to_pid: Pid }
    op = 35;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), Term::long(self.id), Term::Pid(self.from_pid.clone()), Term::Pid(self.to_pid.clone())]);
    decode(op, e) -> {
        expect_arity(op, e, 4)?;
        Ok(Self { id: e[1].as_long()?, from_pid: pid_at(e, 2)?, to_pid: pid_at(e, 3)? })
    };
}

control_message! {
    struct UnlinkIdAck { id: i64, from_pid: Pid, to_pid: Pid }
    op = 36;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), Term::long(self.id), Term::Pid(self.from_pid.clone()), Term::Pid(self.to_pid.clone())]);
    decode(op, e) -> {
        expect_arity(op, e, 4)?;
        Ok(Self { id: e[1].as_long()?, from_pid: pid_at(e, 2)?, to_pid: pid_at(e, 3)? })
    };
}

control_message! {
    struct SpawnReply { req_id: Term, to_pid: Pid, flags: i64, result: Term }
    op = 31;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), self.req_id.clone(), Term::Pid(self.to_pid.clone()), Term::long(self.flags), self.result.clone()]);
    decode(op, e) -> {
        expect_arity(op, e, 5)?;
        Ok(Self { req_id: e[1].clone(), to_pid: pid_at(e, 2)?, flags: e[3].as_long()?, result: e[4].clone() })
    };
}

control_message! {
    struct SpawnReplyTt { req_id: Term, to_pid: Pid, flags: i64, result: Term, trace_token: Term }
    op = 32;
    encode(self) -> Term::tuple(vec![Term::long(Self::OP), self.req_id.clone(), Term::Pid(self.to_pid.clone()), Term::long(self.flags), self.result.clone(), self.trace_token.clone()]);
    decode(op, e) -> {
        expect_arity(op, e, 6)?;
        Ok(Self { req_id: e[1].clone(), to_pid: pid_at(e, 2)?, flags: e[3].as_long()?, result: e[4].clone(), trace_token: e[5].clone() })
    };
}

/// A control tuple that is followed on the wire by a separate payload term (e.g. the message
/// body of a `SEND`, or the reason of a `PAYLOAD_EXIT`).
trait PayloadMessage: Sized {
    const OP: i64;
    fn control_without_payload(&self) -> Vec<Term>;
    fn from_elements_and_payload(elements: &[Term], payload: Term) -> Result<Self, MessageError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Send {
    pub to_pid: Pid,
    pub message: Term,
}

impl PayloadMessage for Send {
    const OP: i64 = 2;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::atom("unused"),
            Term::Pid(self.to_pid.clone()),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 3)?;
        Ok(Self {
            to_pid: pid_at(e, 2)?,
            message: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendTt {
    pub to_pid: Pid,
    pub trace_token: Term,
    pub message: Term,
}

impl PayloadMessage for SendTt {
    const OP: i64 = 12;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::atom("unused"),
            Term::Pid(self.to_pid.clone()),
            self.trace_token.clone(),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 4)?;
        Ok(Self {
            to_pid: pid_at(e, 2)?,
            trace_token: e[3].clone(),
            message: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendSender {
    pub from_pid: Pid,
    pub to_pid: Pid,
    pub message: Term,
}

impl PayloadMessage for SendSender {
    const OP: i64 = 22;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::Pid(self.from_pid.clone()),
            Term::Pid(self.to_pid.clone()),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 3)?;
        Ok(Self {
            from_pid: pid_at(e, 1)?,
            to_pid: pid_at(e, 2)?,
            message: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendSenderTt {
    pub from_pid: Pid,
    pub to_pid: Pid,
    pub trace_token: Term,
    pub message: Term,
}

impl PayloadMessage for SendSenderTt {
    const OP: i64 = 23;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::Pid(self.from_pid.clone()),
            Term::Pid(self.to_pid.clone()),
            self.trace_token.clone(),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 4)?;
        Ok(Self {
            from_pid: pid_at(e, 1)?,
            to_pid: pid_at(e, 2)?,
            trace_token: e[3].clone(),
            message: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegSend {
    pub from_pid: Pid,
    pub to_name: crate::atom::Atom,
    pub message: Term,
}

impl PayloadMessage for RegSend {
    const OP: i64 = 6;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::Pid(self.from_pid.clone()),
            Term::atom("unused"),
            Term::Atom(self.to_name),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 4)?;
        Ok(Self {
            from_pid: pid_at(e, 1)?,
            to_name: e[3].as_atom()?,
            message: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegSendTt {
    pub from_pid: Pid,
    pub to_name: crate::atom::Atom,
    pub trace_token: Term,
    pub message: Term,
}

impl PayloadMessage for RegSendTt {
    const OP: i64 = 16;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::Pid(self.from_pid.clone()),
            Term::atom("unused"),
            Term::Atom(self.to_name),
            self.trace_token.clone(),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 5)?;
        Ok(Self {
            from_pid: pid_at(e, 1)?,
            to_name: e[3].as_atom()?,
            trace_token: e[4].clone(),
            message: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadExit {
    pub from_pid: Pid,
    pub to_pid: Pid,
    pub reason: Term,
}

impl PayloadMessage for PayloadExit {
    const OP: i64 = 24;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::Pid(self.from_pid.clone()),
            Term::Pid(self.to_pid.clone()),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 3)?;
        Ok(Self {
            from_pid: pid_at(e, 1)?,
            to_pid: pid_at(e, 2)?,
            reason: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadExitTt {
    pub from_pid: Pid,
    pub to_pid: Pid,
    pub trace_token: Term,
    pub reason: Term,
}

impl PayloadMessage for PayloadExitTt {
    const OP: i64 = 25;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::Pid(self.from_pid.clone()),
            Term::Pid(self.to_pid.clone()),
            self.trace_token.clone(),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 4)?;
        Ok(Self {
            from_pid: pid_at(e, 1)?,
            to_pid: pid_at(e, 2)?,
            trace_token: e[3].clone(),
            reason: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadExit2 {
    pub from_pid: Pid,
    pub to_pid: Pid,
    pub reason: Term,
}

impl PayloadMessage for PayloadExit2 {
    const OP: i64 = 26;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::Pid(self.from_pid.clone()),
            Term::Pid(self.to_pid.clone()),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 3)?;
        Ok(Self {
            from_pid: pid_at(e, 1)?,
            to_pid: pid_at(e, 2)?,
            reason: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadExit2Tt {
    pub from_pid: Pid,
    pub to_pid: Pid,
    pub trace_token: Term,
    pub reason: Term,
}

impl PayloadMessage for PayloadExit2Tt {
    const OP: i64 = 27;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::Pid(self.from_pid.clone()),
            Term::Pid(self.to_pid.clone()),
            self.trace_token.clone(),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 4)?;
        Ok(Self {
            from_pid: pid_at(e, 1)?,
            to_pid: pid_at(e, 2)?,
            trace_token: e[3].clone(),
            reason: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadMonitorPExit {
    pub from_proc: Term,
    pub to_pid: Pid,
    pub monitor_ref: Reference,
    pub reason: Term,
}

impl PayloadMessage for PayloadMonitorPExit {
    const OP: i64 = 28;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            self.from_proc.clone(),
            Term::Pid(self.to_pid.clone()),
            Term::Reference(self.monitor_ref.clone()),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 4)?;
        Ok(Self {
            from_proc: e[1].clone(),
            to_pid: pid_at(e, 2)?,
            monitor_ref: reference_at(e, 3)?,
            reason: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasSend {
    pub from_pid: Pid,
    pub alias: Reference,
    pub message: Term,
}

impl PayloadMessage for AliasSend {
    const OP: i64 = 33;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::Pid(self.from_pid.clone()),
            Term::Reference(self.alias.clone()),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 3)?;
        Ok(Self {
            from_pid: pid_at(e, 1)?,
            alias: reference_at(e, 2)?,
            message: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasSendTt {
    pub from_pid: Pid,
    pub alias: Reference,
    pub trace_token: Term,
    pub message: Term,
}

impl PayloadMessage for AliasSendTt {
    const OP: i64 = 34;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            Term::Pid(self.from_pid.clone()),
            Term::Reference(self.alias.clone()),
            self.trace_token.clone(),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 4)?;
        Ok(Self {
            from_pid: pid_at(e, 1)?,
            alias: reference_at(e, 2)?,
            trace_token: e[3].clone(),
            message: payload,
        })
    }
}

/// A spawn request. `mfa` is `{Module, Function, Arity}`; `args` is the payload term (the
/// argument list).
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub req_id: Term,
    pub from: Pid,
    pub group_leader: Pid,
    pub mfa: Term,
    pub opt_list: Term,
    pub args: Term,
}

impl PayloadMessage for SpawnRequest {
    const OP: i64 = 29;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            self.req_id.clone(),
            Term::Pid(self.from.clone()),
            Term::Pid(self.group_leader.clone()),
            self.mfa.clone(),
            self.opt_list.clone(),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 6)?;
        Ok(Self {
            req_id: e[1].clone(),
            from: pid_at(e, 2)?,
            group_leader: pid_at(e, 3)?,
            mfa: e[4].clone(),
            opt_list: e[5].clone(),
            args: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequestTt {
    pub req_id: Term,
    pub from: Pid,
    pub group_leader: Pid,
    pub mfa: Term,
    pub opt_list: Term,
    pub trace_token: Term,
    pub args: Term,
}

impl PayloadMessage for SpawnRequestTt {
    const OP: i64 = 30;

    fn control_without_payload(&self) -> Vec<Term> {
        vec![
            Term::long(Self::OP),
            self.req_id.clone(),
            Term::Pid(self.from.clone()),
            Term::Pid(self.group_leader.clone()),
            self.mfa.clone(),
            self.opt_list.clone(),
            self.trace_token.clone(),
        ]
    }

    fn from_elements_and_payload(e: &[Term], payload: Term) -> Result<Self, MessageError> {
        expect_arity(Self::OP, e, 7)?;
        Ok(Self {
            req_id: e[1].clone(),
            from: pid_at(e, 2)?,
            group_leader: pid_at(e, 3)?,
            mfa: e[4].clone(),
            opt_list: e[5].clone(),
            trace_token: e[6].clone(),
            args: payload,
        })
    }
}

/// Every distribution message this crate understands, tagged by its control-tuple opcode.
///
/// `Tick` is special: it carries no control tuple and is represented on the wire as a
/// zero-length frame (see [`crate::connection`]).
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Message {
    Tick,
    Link(Link),
    Unlink(Unlink),
    NodeLink(NodeLink),
    GroupLeader(GroupLeader),
    Exit(Exit),
    Exit2(Exit2),
    ExitTt(ExitTt),
    Exit2Tt(Exit2Tt),
    MonitorP(MonitorP),
    DemonitorP(DemonitorP),
    MonitorPExit(MonitorPExit),
    UnlinkId(UnlinkId),
    UnlinkIdAck(UnlinkIdAck),
    SpawnReply(SpawnReply),
    SpawnReplyTt(SpawnReplyTt),
    Send(Send),
    SendTt(SendTt),
    SendSender(SendSender),
    SendSenderTt(SendSenderTt),
    RegSend(RegSend),
    RegSendTt(RegSendTt),
    PayloadExit(PayloadExit),
    PayloadExitTt(PayloadExitTt),
    PayloadExit2(PayloadExit2),
    PayloadExit2Tt(PayloadExit2Tt),
    PayloadMonitorPExit(PayloadMonitorPExit),
    AliasSend(AliasSend),
    AliasSendTt(AliasSendTt),
    SpawnRequest(SpawnRequest),
    SpawnRequestTt(SpawnRequestTt),
}

impl Message {
    /// Encodes this message's control tuple (and optional payload) into `out`, NOT including the
    /// outer frame length or the [`codec::PASS_THROUGH`] byte — those are the transport's job.
    pub fn write_into(&self, out: &mut Vec<u8>) -> Result<(), MessageError> {
        macro_rules! plain {
            ($m:expr) => {{
                out.extend(codec::encode(&$m.control())?);
                Ok(())
            }};
        }
        match self {
            Message::Tick => Ok(()),
            Message::Link(m) => plain!(m),
            Message::Unlink(m) => plain!(m),
            Message::NodeLink(m) => plain!(m),
            Message::GroupLeader(m) => plain!(m),
            Message::Exit(m) => plain!(m),
            Message::Exit2(m) => plain!(m),
            Message::ExitTt(m) => plain!(m),
            Message::Exit2Tt(m) => plain!(m),
            Message::MonitorP(m) => plain!(m),
            Message::DemonitorP(m) => plain!(m),
            Message::MonitorPExit(m) => plain!(m),
            Message::UnlinkId(m) => plain!(m),
            Message::UnlinkIdAck(m) => plain!(m),
            Message::SpawnReply(m) => plain!(m),
            Message::SpawnReplyTt(m) => plain!(m),
            Message::Send(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.message)?);
                Ok(())
            }
            Message::SendTt(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.message)?);
                Ok(())
            }
            Message::SendSender(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.message)?);
                Ok(())
            }
            Message::SendSenderTt(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.message)?);
                Ok(())
            }
            Message::RegSend(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.message)?);
                Ok(())
            }
            Message::RegSendTt(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.message)?);
                Ok(())
            }
            Message::PayloadExit(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.reason)?);
                Ok(())
            }
            Message::PayloadExitTt(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.reason)?);
                Ok(())
            }
            Message::PayloadExit2(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.reason)?);
                Ok(())
            }
            Message::PayloadExit2Tt(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.reason)?);
                Ok(())
            }
            Message::PayloadMonitorPExit(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.reason)?);
                Ok(())
            }
            Message::AliasSend(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.message)?);
                Ok(())
            }
            Message::AliasSendTt(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.message)?);
                Ok(())
            }
            Message::SpawnRequest(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.args)?);
                Ok(())
            }
            Message::SpawnRequestTt(m) => {
                out.extend(codec::encode(&Term::tuple(m.control_without_payload()))?);
                out.extend(codec::encode(&m.args)?);
                Ok(())
            }
        }
    }

    /// Decodes a message from a frame body that has already had its leading
    /// [`codec::PASS_THROUGH`] byte stripped.
    pub fn read_from(bytes: &[u8]) -> Result<Self, MessageError> {
        let (ctrl, rest) = codec::decode_prefixed(bytes)?;
        let elements = ctrl.as_tuple()?;
        let op = elements
            .first()
            .ok_or(MessageError::EmptyControlTuple)?
            .as_long()?;

        macro_rules! plain {
            ($variant:ident, $ty:ty) => {
                Ok(Message::$variant(<$ty>::from_elements(op, elements)?))
            };
        }
        macro_rules! with_payload {
            ($variant:ident, $ty:ty) => {{
                let (payload, rest2) = codec::decode_prefixed(rest)?;
                let _ = rest2;
                Ok(Message::$variant(<$ty>::from_elements_and_payload(
                    elements, payload,
                )?))
            }};
        }

        match op {
            1 => plain!(Link, Link),
            4 => plain!(Unlink, Unlink),
            5 => plain!(NodeLink, NodeLink),
            7 => plain!(GroupLeader, GroupLeader),
            3 => plain!(Exit, Exit),
            8 => plain!(Exit2, Exit2),
            13 => plain!(ExitTt, ExitTt),
            18 => plain!(Exit2Tt, Exit2Tt),
            19 => plain!(MonitorP, MonitorP),
            20 => plain!(DemonitorP, DemonitorP),
            21 => plain!(MonitorPExit, MonitorPExit),
            35 => plain!(UnlinkId, UnlinkId),
            36 => plain!(UnlinkIdAck, UnlinkIdAck),
            31 => plain!(SpawnReply, SpawnReply),
            32 => plain!(SpawnReplyTt, SpawnReplyTt),
            2 => with_payload!(Send, Send),
            12 => with_payload!(SendTt, SendTt),
            22 => with_payload!(SendSender, SendSender),
            23 => with_payload!(SendSenderTt, SendSenderTt),
            6 => with_payload!(RegSend, RegSend),
            16 => with_payload!(RegSendTt, RegSendTt),
            24 => with_payload!(PayloadExit, PayloadExit),
            25 => with_payload!(PayloadExitTt, PayloadExitTt),
            26 => with_payload!(PayloadExit2, PayloadExit2),
            27 => with_payload!(PayloadExit2Tt, PayloadExit2Tt),
            28 => with_payload!(PayloadMonitorPExit, PayloadMonitorPExit),
            33 => with_payload!(AliasSend, AliasSend),
            34 => with_payload!(AliasSendTt, AliasSendTt),
            29 => with_payload!(SpawnRequest, SpawnRequest),
            30 => with_payload!(SpawnRequestTt, SpawnRequestTt),
            op => Err(MessageError::UnsupportedOp { op }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;

    fn pid(n: u32) -> Pid {
        Pid {
            node: Atom::new("a@localhost"),
            id: n,
            serial: 0,
            creation: 1,
        }
    }

    #[test]
    fn send_round_trips_with_its_payload() {
        let msg = Message::Send(Send {
            to_pid: pid(1),
            message: Term::atom("hello"),
        });
        let mut buf = Vec::new();
        msg.write_into(&mut buf).unwrap();
        assert_eq!(Message::read_from(&buf).unwrap(), msg);
    }

    #[test]
    fn send_tt_round_trips_with_its_payload() {
        let msg = Message::SendTt(SendTt {
            to_pid: pid(1),
            trace_token: Term::atom("token"),
            message: Term::atom("hello"),
        });
        let mut buf = Vec::new();
        msg.write_into(&mut buf).unwrap();
        assert_eq!(Message::read_from(&buf).unwrap(), msg);
    }

    #[test]
    fn link_round_trips_without_a_payload() {
        let msg = Message::Link(Link {
            from_pid: pid(1),
            to_pid: pid(2),
        });
        let mut buf = Vec::new();
        msg.write_into(&mut buf).unwrap();
        assert_eq!(Message::read_from(&buf).unwrap(), msg);
    }

    #[test]
    fn exit_round_trips_with_an_arbitrary_reason_term() {
        let msg = Message::Exit(Exit {
            from_pid: pid(1),
            to_pid: pid(2),
            reason: Term::tuple(vec![Term::atom("killed"), Term::long(9)]),
        });
        let mut buf = Vec::new();
        msg.write_into(&mut buf).unwrap();
        assert_eq!(Message::read_from(&buf).unwrap(), msg);
    }

    #[test]
    fn unsupported_op_is_rejected() {
        let ctrl = Term::tuple(vec![Term::long(999)]);
        let bytes = codec::encode(&ctrl).unwrap();
        assert!(matches!(
            Message::read_from(&bytes),
            Err(MessageError::UnsupportedOp { op: 999 })
        ));
    }
}
