//! A scriptable in-memory stack for tests
//!
//! [`MockStack`] is a cheap handle onto shared state, so a test can keep a
//! clone around after handing the stack to a registry (or a registry to the
//! service task) and still script and inspect it.

use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    net::Ipv6Addr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    SocketId,
    address::IpAddressKind,
    options::{OptionData, SocketOptionCode},
};

use super::{Accepted, Received, SocketProtocol, StackOp, Status, WisunStack};

/// One call made on the stack, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(SocketProtocol),
    Bind {
        id: SocketId,
        address: Ipv6Addr,
        port: u16,
    },
    Connect {
        id: SocketId,
        address: Ipv6Addr,
        port: u16,
    },
    Listen(SocketId),
    Accept(SocketId),
    Send {
        id: SocketId,
        data: Vec<u8>,
    },
    SendTo {
        id: SocketId,
        address: Ipv6Addr,
        port: u16,
        data: Vec<u8>,
    },
    Receive(SocketId),
    Close(SocketId),
    SetOption {
        id: SocketId,
        code: SocketOptionCode,
        data: OptionData,
    },
    GetOption {
        id: SocketId,
        code: SocketOptionCode,
    },
    ResolveAddress(IpAddressKind),
}

impl Call {
    fn op(&self) -> StackOp {
        match self {
            Call::Open(_) => StackOp::Open,
            Call::Bind { .. } => StackOp::Bind,
            Call::Connect { .. } => StackOp::Connect,
            Call::Listen(_) => StackOp::Listen,
            Call::Accept(_) => StackOp::Accept,
            Call::Send { .. } | Call::SendTo { .. } => StackOp::Send,
            Call::Receive(_) => StackOp::Receive,
            Call::Close(_) => StackOp::Close,
            Call::SetOption { .. } => StackOp::SetOption,
            Call::GetOption { .. } => StackOp::GetOption,
            Call::ResolveAddress(_) => StackOp::ResolveAddress,
        }
    }
}

/// A datagram or chunk waiting to be received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub remote_address: Ipv6Addr,
    pub remote_port: u16,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct MockState {
    next_id: u32,
    /// Handed out by `open_socket`/`accept` before falling back to `next_id`
    pub id_queue: VecDeque<SocketId>,
    /// Each entry fails the next call of that kind
    pub failures: Vec<(StackOp, Status)>,
    pub calls: Vec<Call>,
    pub open: BTreeSet<SocketId>,
    pub ticks: u32,
    pub ms_per_tick: u32,
    pub pending_rx: HashMap<SocketId, VecDeque<Pending>>,
    pub pending_accepts: VecDeque<(Ipv6Addr, u16)>,
    pub options: HashMap<(SocketId, SocketOptionCode), OptionData>,
    pub addresses: HashMap<IpAddressKind, Ipv6Addr>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_id: 1,
            id_queue: VecDeque::new(),
            failures: Vec::new(),
            calls: Vec::new(),
            open: BTreeSet::new(),
            ticks: 0,
            ms_per_tick: 1,
            pending_rx: HashMap::new(),
            pending_accepts: VecDeque::new(),
            options: HashMap::new(),
            addresses: HashMap::new(),
        }
    }
}

impl MockState {
    fn record(&mut self, call: Call) -> Result<(), Status> {
        let op = call.op();
        self.calls.push(call);
        match self.failures.iter().position(|(fop, _)| *fop == op) {
            Some(idx) => Err(self.failures.remove(idx).1),
            None => Ok(()),
        }
    }

    fn new_id(&mut self) -> SocketId {
        let id = self.id_queue.pop_front().unwrap_or_else(|| {
            let id = SocketId(self.next_id);
            self.next_id += 1;
            id
        });
        self.open.insert(id);
        id
    }

    fn check_open(&self, id: SocketId) -> Result<(), Status> {
        if self.open.contains(&id) {
            Ok(())
        } else {
            Err(Status::InvalidParameter)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockStack {
    state: Arc<Mutex<MockState>>,
}

impl MockStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the shared state locked.
    pub fn manage<F: FnOnce(&mut MockState) -> R, R>(&self, f: F) -> R {
        f(&mut self.lock())
    }

    /// Fail the next call of kind `op` with `status`.
    pub fn fail_next(&self, op: StackOp, status: Status) {
        self.lock().failures.push((op, status));
    }

    /// Hand out `id` on the next open or accept.
    pub fn queue_id(&self, id: SocketId) {
        self.lock().id_queue.push_back(id);
    }

    pub fn queue_accept(&self, address: Ipv6Addr, port: u16) {
        self.lock().pending_accepts.push_back((address, port));
    }

    pub fn queue_receive(&self, id: SocketId, remote_address: Ipv6Addr, remote_port: u16, data: &[u8]) {
        self.lock()
            .pending_rx
            .entry(id)
            .or_default()
            .push_back(Pending {
                remote_address,
                remote_port,
                data: data.to_vec(),
            });
    }

    pub fn set_address(&self, kind: IpAddressKind, address: Ipv6Addr) {
        self.lock().addresses.insert(kind, address);
    }

    pub fn set_ticks(&self, ticks: u32) {
        self.lock().ticks = ticks;
    }

    pub fn advance_ticks(&self, ticks: u32) {
        let mut state = self.lock();
        state.ticks = state.ticks.wrapping_add(ticks);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Sockets opened (or accepted) and not yet closed.
    pub fn open_sockets(&self) -> Vec<SocketId> {
        self.lock().open.iter().copied().collect()
    }

    pub fn assert_no_pending_failures(&self) {
        let state = self.lock();
        assert!(
            state.failures.is_empty(),
            "unused failures: {:?}",
            state.failures
        );
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WisunStack for MockStack {
    fn open_socket(&mut self, protocol: SocketProtocol) -> Result<SocketId, Status> {
        let mut state = self.lock();
        state.record(Call::Open(protocol))?;
        Ok(state.new_id())
    }

    fn bind(&mut self, id: SocketId, address: &Ipv6Addr, port: u16) -> Result<(), Status> {
        let mut state = self.lock();
        state.record(Call::Bind {
            id,
            address: *address,
            port,
        })?;
        state.check_open(id)
    }

    fn connect(&mut self, id: SocketId, address: &Ipv6Addr, port: u16) -> Result<(), Status> {
        let mut state = self.lock();
        state.record(Call::Connect {
            id,
            address: *address,
            port,
        })?;
        state.check_open(id)
    }

    fn listen(&mut self, id: SocketId) -> Result<(), Status> {
        let mut state = self.lock();
        state.record(Call::Listen(id))?;
        state.check_open(id)
    }

    fn accept(&mut self, listener: SocketId) -> Result<Accepted, Status> {
        let mut state = self.lock();
        state.record(Call::Accept(listener))?;
        state.check_open(listener)?;
        let (remote_address, remote_port) =
            state.pending_accepts.pop_front().ok_or(Status::WouldBlock)?;
        Ok(Accepted {
            id: state.new_id(),
            remote_address,
            remote_port,
        })
    }

    fn send(&mut self, id: SocketId, data: &[u8]) -> Result<(), Status> {
        let mut state = self.lock();
        state.record(Call::Send {
            id,
            data: data.to_vec(),
        })?;
        state.check_open(id)
    }

    fn send_to(
        &mut self,
        id: SocketId,
        address: &Ipv6Addr,
        port: u16,
        data: &[u8],
    ) -> Result<(), Status> {
        let mut state = self.lock();
        state.record(Call::SendTo {
            id,
            address: *address,
            port,
            data: data.to_vec(),
        })?;
        state.check_open(id)
    }

    fn receive(&mut self, id: SocketId, buf: &mut [u8]) -> Result<Received, Status> {
        let mut state = self.lock();
        state.record(Call::Receive(id))?;
        state.check_open(id)?;
        let pending = state
            .pending_rx
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
            .ok_or(Status::WouldBlock)?;
        let len = pending.data.len().min(buf.len());
        buf[..len].copy_from_slice(&pending.data[..len]);
        Ok(Received {
            remote_address: pending.remote_address,
            remote_port: pending.remote_port,
            len,
        })
    }

    fn close(&mut self, id: SocketId) -> Result<(), Status> {
        let mut state = self.lock();
        state.record(Call::Close(id))?;
        if state.open.remove(&id) {
            state.pending_rx.remove(&id);
            Ok(())
        } else {
            Err(Status::InvalidParameter)
        }
    }

    fn set_option(
        &mut self,
        id: SocketId,
        code: SocketOptionCode,
        data: &OptionData,
    ) -> Result<(), Status> {
        let mut state = self.lock();
        state.record(Call::SetOption {
            id,
            code,
            data: *data,
        })?;
        state.check_open(id)?;
        state.options.insert((id, code), *data);
        Ok(())
    }

    fn get_option(&mut self, id: SocketId, code: SocketOptionCode) -> Result<OptionData, Status> {
        let mut state = self.lock();
        state.record(Call::GetOption { id, code })?;
        state.check_open(id)?;
        state
            .options
            .get(&(id, code))
            .copied()
            .ok_or(Status::NotSupported)
    }

    fn get_ip_address(&mut self, kind: IpAddressKind) -> Result<Ipv6Addr, Status> {
        let mut state = self.lock();
        state.record(Call::ResolveAddress(kind))?;
        state.addresses.get(&kind).copied().ok_or(Status::InvalidState)
    }

    fn tick_count(&self) -> u32 {
        self.lock().ticks
    }

    fn tick_to_ms(&self, ticks: u32) -> u32 {
        ticks.wrapping_mul(self.lock().ms_per_tick)
    }
}
