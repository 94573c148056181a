//! Roster change feed and the client-side view it keeps current.
//!
//! The API publishes a [`StudentEvent`] after every successful mutation and streams
//! them on `/students/events`. The server itself never applies events;
//! [`RosterCache`] is the subscriber-side helper, for a Rust client of that stream
//! that keeps one year's roster current instead of reloading it.

use crate::entities::StudentModel;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

const FEED_CAPACITY: usize = 256;

/// A change to the student table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudentEvent {
    /// A student was added
    Created {
        /// The inserted record
        student: StudentModel,
    },
    /// Fields or coupon flags changed
    Updated {
        /// The record after the change
        student: StudentModel,
    },
    /// A student was removed
    Deleted {
        /// Id of the removed record
        id: String,
    },
}

/// Fan-out of [`StudentEvent`]s. Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct StudentFeed {
    sender: broadcast::Sender<StudentEvent>,
}

impl Default for StudentFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl StudentFeed {
    /// Opens a feed with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    /// Sends an event to current subscribers. Having none is not an error.
    pub fn publish(&self, event: StudentEvent) {
        if let Ok(receivers) = self.sender.send(event) {
            debug!(receivers, "Published roster event");
        }
    }

    /// Receives every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StudentEvent> {
        self.sender.subscribe()
    }
}

/// The roster for one year, kept in step with [`StudentEvent`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterCache {
    /// Stored year value this view is restricted to; `None` shows everyone
    pub year: Option<String>,
    /// Current view, in arrival order
    pub students: Vec<StudentModel>,
}

impl RosterCache {
    /// Starts from an initial listing, already filtered to `year`.
    #[must_use]
    pub const fn new(year: Option<String>, students: Vec<StudentModel>) -> Self {
        Self { year, students }
    }

    fn in_scope(&self, student: &StudentModel) -> bool {
        self.year.as_ref().is_none_or(|year| *year == student.year)
    }

    /// Applies one event.
    ///
    /// An update for a student that moved into this year adds them, and one that
    /// moved out removes them.
    pub fn apply(&mut self, event: StudentEvent) {
        match event {
            StudentEvent::Created { student } => {
                if self.in_scope(&student) && !self.students.iter().any(|s| s.id == student.id) {
                    self.students.push(student);
                }
            }
            StudentEvent::Updated { student } => {
                let position = self.students.iter().position(|s| s.id == student.id);
                match (position, self.in_scope(&student)) {
                    (Some(index), true) => self.students[index] = student,
                    (Some(index), false) => {
                        self.students.remove(index);
                    }
                    (None, true) => self.students.push(student),
                    (None, false) => {}
                }
            }
            StudentEvent::Deleted { id } => self.students.retain(|s| s.id != id),
        }
    }
}
