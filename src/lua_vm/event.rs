use std::collections::VecDeque;

/// Tagged record emitted by the VM (spec.md §3, "Event"). `drain_events`
/// returns and clears the buffer; with nobody draining, emission is a
/// bounded push that silently drops the oldest entry once full, so an
/// unobserved run never grows without bound.
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp_tick: u64,
    pub coroutine_id: u64,
    pub pc: usize,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    InstructionStep { opcode: &'static str },
    CoroutineCreated,
    CoroutineResumed,
    CoroutineYielded,
    CoroutineCompleted { ok: bool },
}

pub struct EventBuffer {
    events: VecDeque<Event>,
    capacity: usize,
    tick: u64,
    /// Becomes true the first time `drain_events` is called, after which
    /// emission stops being a no-op; mirrors the "when nobody observes,
    /// emission is a near-no-op" note in spec.md §3.
    observed: bool,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        EventBuffer { events: VecDeque::new(), capacity, tick: 0, observed: false }
    }

    pub fn emit(&mut self, coroutine_id: u64, pc: usize, kind: EventKind) {
        self.tick += 1;
        if !self.observed {
            return;
        }
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(Event { timestamp_tick: self.tick, coroutine_id, pc, kind });
    }

    pub fn drain(&mut self) -> Vec<Event> {
        self.observed = true;
        self.events.drain(..).collect()
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        EventBuffer::new(4096)
    }
}
