//! In-memory board and the controller that drives it.
//!
//! The board is the rendered state: four columns of cards, each kept in
//! priority order. `BoardController` applies every change to the board
//! first and only then hands the resulting task to the sync coordinator.

use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info, instrument, warn};

use crate::ordering::insert_by_priority;
use crate::sync::{LoadSource, SubmitOutcome, SyncCoordinator, SyncError};
use crate::task::{Priority, Status, Task, TaskId};

const SUMMARY_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

impl Card {
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
        }
    }

    pub fn to_task(&self, status: Status) -> Task {
        Task {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            status,
        }
    }

    /// First fifty characters of the description, ellipsized.
    pub fn summary(&self) -> Option<String> {
        if self.description.is_empty() {
            return None;
        }
        let mut out: String = self.description.chars().take(SUMMARY_CHARS).collect();
        if self.description.chars().count() > SUMMARY_CHARS {
            out.push_str("...");
        }
        Some(out)
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    status: Status,
    cards: Vec<Card>,
}

impl Column {
    fn new(status: Status) -> Self {
        Self {
            status,
            cards: Vec::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    fn insert(&mut self, card: Card) -> usize {
        let priority = card.priority;
        insert_by_priority(&mut self.cards, card, priority, |c| c.priority)
    }

    fn position(&self, id: &TaskId) -> Option<usize> {
        self.cards.iter().position(|c| &c.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct Board {
    columns: Vec<Column>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            columns: Status::ALL.into_iter().map(Column::new).collect(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, status: Status) -> &Column {
        &self.columns[status.index()]
    }

    pub fn clear(&mut self) {
        for column in &mut self.columns {
            column.cards.clear();
        }
    }

    /// Builds a card for `task` and inserts it in its status column.
    pub fn place(&mut self, task: &Task) -> usize {
        self.columns[task.status.index()].insert(Card::from_task(task))
    }

    pub fn locate(&self, id: &TaskId) -> Option<(Status, usize)> {
        self.columns
            .iter()
            .find_map(|column| column.position(id).map(|idx| (column.status, idx)))
    }

    pub fn card(&self, id: &TaskId) -> Option<(&Card, Status)> {
        let (status, idx) = self.locate(id)?;
        Some((&self.columns[status.index()].cards[idx], status))
    }

    /// The task as currently rendered.
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.card(id).map(|(card, status)| card.to_task(status))
    }

    pub fn len(&self) -> usize {
        self.columns.iter().map(|c| c.cards.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&mut self, id: &TaskId) -> Option<(Card, Status)> {
        let (status, idx) = self.locate(id)?;
        Some((self.columns[status.index()].cards.remove(idx), status))
    }

    /// Takes the card out and reinserts it into `status` by priority.
    fn relocate(&mut self, id: &TaskId, status: Status) -> Option<usize> {
        let (card, _) = self.remove(id)?;
        Some(self.columns[status.index()].insert(card))
    }
}

/// Edit form state, filled from the card as currently rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
}

impl From<EditSession> for Task {
    fn from(session: EditSession) -> Self {
        Task {
            id: session.id,
            title: session.title,
            description: session.description,
            priority: session.priority,
            status: session.status,
        }
    }
}

impl From<Task> for EditSession {
    fn from(task: Task) -> Self {
        EditSession {
            id: task.id,
            title: task.title,
            description: task.description,
            priority: task.priority,
            status: task.status,
        }
    }
}

/// What was picked up when a drag started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragSession {
    id: TaskId,
    origin: Status,
}

impl DragSession {
    pub fn origin(&self) -> Status {
        self.origin
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Discarded,
    Applied { moved: bool, sync: SubmitOutcome },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    Unchanged,
    Moved { index: usize, sync: SubmitOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    NotConfirmed,
    Deleted,
}

pub struct BoardController {
    board: Board,
    sync: Arc<SyncCoordinator>,
}

impl BoardController {
    pub fn new(sync: Arc<SyncCoordinator>) -> Self {
        Self {
            board: Board::new(),
            sync,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Replaces every column with the current task list.
    #[instrument(skip(self))]
    pub async fn load(&mut self) -> LoadSource {
        let loaded = self.sync.load().await;
        self.board.clear();
        for task in &loaded.tasks {
            self.board.place(task);
        }
        info!(count = loaded.tasks.len(), source = ?loaded.source, "board loaded");
        loaded.source
    }

    #[instrument(skip(self, title, description))]
    pub async fn create(
        &mut self,
        title: String,
        description: String,
        priority: Priority,
        status: Status,
    ) -> anyhow::Result<SubmitOutcome> {
        let mut task = Task::new_local(title, priority, status);
        task.description = description;
        if !task.has_title() {
            return Err(anyhow!("task title is required"));
        }

        let outcome = self.sync.submit(&task, false).await;
        match &outcome {
            SubmitOutcome::Created(server_task) => {
                self.board.place(server_task);
            }
            SubmitOutcome::Queued { task, .. } => {
                self.board.place(task);
            }
            SubmitOutcome::Updated(_) => {}
        }
        Ok(outcome)
    }

    pub fn open_edit(&self, id: &TaskId) -> Option<EditSession> {
        let (card, status) = self.board.card(id)?;
        Some(EditSession {
            id: card.id.clone(),
            title: card.title.clone(),
            description: card.description.clone(),
            priority: card.priority,
            status,
        })
    }

    /// Closing the edit form commits it. A blank title drops the edit.
    #[instrument(skip(self, session), fields(id = %session.id))]
    pub async fn commit_edit(&mut self, session: EditSession) -> EditOutcome {
        if session.title.trim().is_empty() {
            debug!("empty title; edit discarded");
            return EditOutcome::Discarded;
        }

        let task = Task::from(session);

        let mut moved = false;
        if let Some((status, idx)) = self.board.locate(&task.id) {
            let card = &mut self.board.columns[status.index()].cards[idx];
            let old_priority = card.priority;
            card.title = task.title.clone();
            card.description = task.description.clone();
            card.priority = task.priority;

            if status != task.status || old_priority != task.priority {
                self.board.relocate(&task.id, task.status);
                moved = true;
            }
        } else {
            warn!("edited card is no longer on the board");
        }

        let sync = self.sync.submit(&task, true).await;
        EditOutcome::Applied { moved, sync }
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete(
        &mut self,
        id: &TaskId,
        confirmed: bool,
    ) -> Result<DeleteOutcome, SyncError> {
        if !confirmed {
            return Ok(DeleteOutcome::NotConfirmed);
        }

        self.sync.delete(id).await?;
        self.board.remove(id);
        Ok(DeleteOutcome::Deleted)
    }

    pub fn begin_drag(&self, id: &TaskId) -> Option<DragSession> {
        let (card, origin) = self.board.card(id)?;
        Some(DragSession {
            id: card.id.clone(),
            origin,
        })
    }

    /// Drops the dragged card on `target`. Same column is a no-op. The
    /// submitted task is the card as reinserted, so an edit that landed
    /// mid-drag is what the server sees.
    #[instrument(skip(self, session), fields(id = %session.id, origin = ?session.origin))]
    pub async fn drop_on(&mut self, session: DragSession, target: Status) -> DropOutcome {
        if session.origin == target {
            return DropOutcome::Unchanged;
        }

        let Some(index) = self.board.relocate(&session.id, target) else {
            warn!("dragged card is no longer on the board");
            return DropOutcome::Unchanged;
        };

        let Some(task) = self.board.task(&session.id) else {
            return DropOutcome::Unchanged;
        };

        let sync = self.sync.submit(&task, true).await;
        DropOutcome::Moved { index, sync }
    }
}
