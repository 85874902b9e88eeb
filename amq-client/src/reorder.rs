//! Drag-reorder coordination
//!
//! A drag gesture produces many intermediate orders but must emit at most one
//! `MOVE_QUEUE_ITEM`. The coordinator records where the dragged row started (its index
//! in the order rendered before the gesture) and where it ended (its index in the
//! finalized order), and only emits a move when the two differ.
//!
//! While a committed move is waiting for the server, new gestures are refused so that a
//! second move cannot be computed against a queue the server is about to replace.

use amq_common::protocol::MoveQueueItemParams;
use tracing::debug;
use uuid::Uuid;

/// Render-only wrapper of a queue entry
///
/// `id` is the entry's position in the last canonical queue. It is recomputed on every
/// snapshot and must not be used as a persistent identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayItem {
    pub id: usize,
    pub name: String,
}

/// Result of feeding an intermediate order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsiderOutcome {
    /// Render this order now
    Render(Vec<DisplayItem>),
    /// A move is being committed; keep the current order
    Locked,
    /// The dragged item is not part of the rendered order
    Ignored,
}

/// Result of dropping the dragged item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    /// Order to render
    pub order: Vec<DisplayItem>,
    /// Move to send, if the item actually changed position
    pub command: Option<MoveQueueItemParams>,
}

#[derive(Debug, Clone)]
struct Gesture {
    dragged_id: usize,
    old_pos: usize,
    new_pos: Option<usize>,
}

/// Drag gesture state machine: Idle -> Dragging -> Idle
#[derive(Debug, Default)]
pub struct ReorderCoordinator {
    gesture: Option<Gesture>,
    commit: Option<Uuid>,
}

impl ReorderCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.gesture.is_some()
    }

    /// True while a committed move is in flight
    pub fn is_locked(&self) -> bool {
        self.commit.is_some()
    }

    /// Feed an intermediate order proposed by the drag library
    ///
    /// `rendered` is the order on screen before this call. On the first call of a
    /// gesture it fixes `old_pos`.
    pub fn consider(
        &mut self,
        rendered: &[DisplayItem],
        proposed: Vec<DisplayItem>,
        dragged_id: usize,
    ) -> ConsiderOutcome {
        if self.is_locked() {
            debug!("Refusing drag of item {} while a move is in flight", dragged_id);
            return ConsiderOutcome::Locked;
        }

        let continuing = matches!(&self.gesture, Some(g) if g.dragged_id == dragged_id);
        if !continuing {
            let Some(old_pos) = position_of(rendered, dragged_id) else {
                return ConsiderOutcome::Ignored;
            };
            debug!("Drag started for item {} at {}", dragged_id, old_pos);
            self.gesture = Some(Gesture {
                dragged_id,
                old_pos,
                new_pos: None,
            });
        }

        if let (Some(gesture), Some(pos)) =
            (self.gesture.as_mut(), position_of(&proposed, dragged_id))
        {
            gesture.new_pos = Some(pos);
        }

        ConsiderOutcome::Render(proposed)
    }

    /// Drop the dragged item and end the gesture
    pub fn finalize(&mut self, order: Vec<DisplayItem>) -> Finalized {
        let Some(gesture) = self.gesture.take() else {
            return Finalized {
                order,
                command: None,
            };
        };

        let new_pos = position_of(&order, gesture.dragged_id).or(gesture.new_pos);
        let command = match new_pos {
            Some(new_pos) if new_pos != gesture.old_pos => Some(MoveQueueItemParams {
                old_pos: gesture.old_pos,
                new_pos,
            }),
            _ => None,
        };

        debug!(
            "Drag finished for item {}: {:?}",
            gesture.dragged_id, command
        );
        Finalized { order, command }
    }

    /// Forget the current gesture
    pub fn abort(&mut self) {
        if let Some(gesture) = self.gesture.take() {
            debug!("Drag of item {} aborted", gesture.dragged_id);
        }
    }

    /// Take the commit lock for an outgoing move
    pub fn begin_commit(&mut self) -> Uuid {
        let token = Uuid::new_v4();
        self.commit = Some(token);
        token
    }

    /// Release the commit lock if `token` still holds it
    pub fn end_commit(&mut self, token: Uuid) -> bool {
        if self.commit == Some(token) {
            self.commit = None;
            true
        } else {
            false
        }
    }
}

fn position_of(order: &[DisplayItem], id: usize) -> Option<usize> {
    order.iter().position(|item| item.id == id)
}
