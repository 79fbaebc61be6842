//! Wire-level command vocabulary.

use std::fmt;
use std::str::FromStr;

use crate::QueueError;

/// Server-side operation tags. Wire values are case-sensitive.
///
/// Report and management commands chosen by the caller travel as plain
/// strings in [`Envelope::command`](crate::Envelope::command) and are not
/// represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueCommand {
    Enqueue,
    Dequeue,
    DequeuePriority,
    Consume,
    Peek,
    Commit,
    Abort,
    AddQueue,
    RemoveQueue,
    Exists,
}

impl QueueCommand {
    pub const ALL: [QueueCommand; 10] = [
        QueueCommand::Enqueue,
        QueueCommand::Dequeue,
        QueueCommand::DequeuePriority,
        QueueCommand::Consume,
        QueueCommand::Peek,
        QueueCommand::Commit,
        QueueCommand::Abort,
        QueueCommand::AddQueue,
        QueueCommand::RemoveQueue,
        QueueCommand::Exists,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueCommand::Enqueue => "Enqueue",
            QueueCommand::Dequeue => "Dequeue",
            QueueCommand::DequeuePriority => "DequeuePriority",
            QueueCommand::Consume => "Consume",
            QueueCommand::Peek => "Peek",
            QueueCommand::Commit => "Commit",
            QueueCommand::Abort => "Abort",
            QueueCommand::AddQueue => "AddQueue",
            QueueCommand::RemoveQueue => "RemoveQueue",
            QueueCommand::Exists => "Exists",
        }
    }
}

impl fmt::Display for QueueCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueCommand {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueCommand::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| QueueError::Config(format!("unknown queue command: {s}")))
    }
}
