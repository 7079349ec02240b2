//! Background task bookkeeping
//!
//! - `TaskStatus`: lifecycle of a one-shot request (preview, health)
//! - `RequestTicket`: identity of an issued request, so a late response can
//!   be recognised as stale and dropped

/// Lifecycle of a one-shot request whose answer is only wanted while it is
/// still the latest one asked for
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TaskStatus<T, E> {
    #[default]
    Idle,
    /// Waiting for the answer to this ticket
    InProgress(RequestTicket),
    Finished(Result<T, E>),
}

impl<T, E> TaskStatus<T, E> {
    pub fn is_idle(&self) -> bool {
        matches!(self, TaskStatus::Idle)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, TaskStatus::InProgress(_))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Finished(_))
    }

    /// Finished value, if it succeeded
    pub fn value(&self) -> Option<&T> {
        match self {
            TaskStatus::Finished(Ok(v)) => Some(v),
            _ => None,
        }
    }

    /// Finished error, if it failed
    pub fn error(&self) -> Option<&E> {
        match self {
            TaskStatus::Finished(Err(e)) => Some(e),
            _ => None,
        }
    }

    /// Wait for `ticket`, superseding whatever was pending
    pub fn start(&mut self, ticket: RequestTicket) {
        *self = TaskStatus::InProgress(ticket);
    }

    /// Record the answer to `ticket`. Dropped (returns false) unless that
    /// ticket is the one being waited for.
    pub fn finish(&mut self, ticket: RequestTicket, result: Result<T, E>) -> bool {
        match self {
            TaskStatus::InProgress(waiting) if *waiting == ticket => {
                *self = TaskStatus::Finished(result);
                true
            }
            _ => false,
        }
    }
}

/// Identity of one issued request. Later tickets compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn seq(self) -> u64 {
        self.0
    }
}

/// Hands out strictly increasing tickets
#[derive(Debug, Clone, Default)]
pub struct TicketCounter {
    last: u64,
}

impl TicketCounter {
    pub fn next(&mut self) -> RequestTicket {
        self.last += 1;
        RequestTicket(self.last)
    }
}
