//! Task storage: a generational arena of active tasks plus the pending list.
//!
//! A registered task reserves an arena slot immediately (so its id is stable)
//! but sits in `pending` until [`Registry::promote`] moves it into the slot.
//! Slots are released by [`Registry::sweep`], by cancelling a pending task,
//! or by [`Registry::cancel_all`]; releasing bumps the slot generation so
//! stale ids stop resolving.
//!
//! Slot indices are `u32`, so at most [`MAX_SLOTS`] tasks can be alive at
//! once. Registering past that limit fails with
//! [`SchedulerError::CapacityExhausted`].

use crate::error::{Result, SchedulerError};
use crate::scheduler::id::TaskId;
use crate::scheduler::tasks::{Task, TaskKind, TaskStatus};

/// Upper bound on simultaneously live tasks (pending plus active).
pub(crate) const MAX_SLOTS: usize = u32::MAX as usize;

struct Slot {
    generation: u32,
    entry: Entry,
}

enum Entry {
    Vacant,
    /// Id handed out, task waiting in `pending`.
    Reserved,
    Active(ActiveEntry),
}

struct ActiveEntry {
    status: TaskStatus,
    /// Set when the task's update failed; swept regardless of status.
    faulted: bool,
    /// `None` while the task is checked out for its update.
    task: Option<Task>,
}

pub(crate) struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    pending: Vec<(TaskId, Task)>,
    active: usize,
    max_slots: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl Registry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            pending: Vec::with_capacity(capacity),
            active: 0,
            max_slots: MAX_SLOTS,
        }
    }

    #[cfg(test)]
    fn with_max_slots(max_slots: usize) -> Self {
        Self {
            max_slots: max_slots.min(MAX_SLOTS),
            ..Self::default()
        }
    }

    /// Register a task as pending and hand out its id.
    ///
    /// Fails once every slot up to the limit is occupied. The task is
    /// dropped in that case.
    pub(crate) fn insert(&mut self, task: Task) -> Result<TaskId> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                if self.slots.len() >= self.max_slots {
                    return Err(SchedulerError::CapacityExhausted(self.max_slots));
                }
                let index = u32::try_from(self.slots.len())
                    .map_err(|_| SchedulerError::CapacityExhausted(self.max_slots))?;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Entry::Vacant,
                });
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.entry = Entry::Reserved;
        let id = TaskId::new(index, slot.generation);
        self.pending.push((id, task));
        Ok(id)
    }

    /// Move every pending task into its slot as `Running`.
    pub(crate) fn promote(&mut self) -> usize {
        let promoted = self.pending.len();
        for (id, task) in std::mem::take(&mut self.pending) {
            let slot = &mut self.slots[id.slot()];
            slot.entry = Entry::Active(ActiveEntry {
                status: TaskStatus::Running,
                faulted: false,
                task: Some(task),
            });
        }
        self.active += promoted;
        promoted
    }

    /// Ids of all active tasks, in slot order.
    pub(crate) fn active_ids(&self) -> Vec<TaskId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot.entry, Entry::Active(_)))
            .map(|(index, slot)| TaskId::new(index as u32, slot.generation))
            .collect()
    }

    /// Check a task out of its slot for an update.
    pub(crate) fn checkout(&mut self, id: TaskId) -> Option<Task> {
        match self.entry_mut(id)? {
            Entry::Active(entry) if !entry.faulted => entry.task.take(),
            _ => None,
        }
    }

    /// Return a task checked out with [`Registry::checkout`].
    pub(crate) fn checkin(&mut self, id: TaskId, task: Task) {
        if let Some(Entry::Active(entry)) = self.entry_mut(id) {
            entry.task = Some(task);
        }
    }

    pub(crate) fn mark_faulted(&mut self, id: TaskId) {
        if let Some(Entry::Active(entry)) = self.entry_mut(id) {
            entry.faulted = true;
        }
    }

    /// Remove terminal and faulted tasks. Returns how many were removed.
    pub(crate) fn sweep(&mut self) -> usize {
        let mut swept = 0;
        for index in 0..self.slots.len() {
            let done = match &self.slots[index].entry {
                Entry::Active(entry) => entry.faulted || entry.status.is_terminal(),
                _ => false,
            };
            if done {
                self.release(index);
                self.active -= 1;
                swept += 1;
            }
        }
        swept
    }

    pub(crate) fn status(&self, id: TaskId) -> Option<TaskStatus> {
        match self.entry(id)? {
            Entry::Active(entry) => Some(entry.status),
            Entry::Reserved => Some(TaskStatus::Pending),
            Entry::Vacant => None,
        }
    }

    /// Cancel a task. Pending tasks get `on_cancel` and are dropped on the
    /// spot; active tasks are marked `Cancelled` and swept at the end of the
    /// next tick.
    pub(crate) fn cancel(&mut self, id: TaskId) -> bool {
        match self.entry_mut(id) {
            Some(Entry::Reserved) => {
                let position = self.pending.iter().position(|(pending, _)| *pending == id);
                if let Some(position) = position {
                    let (_, mut task) = self.pending.remove(position);
                    task.on_cancel();
                }
                self.release(id.slot());
                true
            }
            Some(Entry::Active(entry)) if !entry.status.is_terminal() => {
                entry.status = TaskStatus::Cancelled;
                if let Some(task) = entry.task.as_mut() {
                    task.on_cancel();
                }
                true
            }
            _ => false,
        }
    }

    pub(crate) fn pause(&mut self, id: TaskId) -> bool {
        self.transition(id, TaskStatus::Running, TaskStatus::Paused)
    }

    pub(crate) fn resume(&mut self, id: TaskId) -> bool {
        self.transition(id, TaskStatus::Paused, TaskStatus::Running)
    }

    /// Set a terminal status on an active task unless it is already terminal.
    pub(crate) fn finish(&mut self, id: TaskId, status: TaskStatus) {
        if let Some(Entry::Active(entry)) = self.entry_mut(id)
            && !entry.status.is_terminal()
        {
            entry.status = status;
        }
    }

    /// Cancel and drop every task. Returns how many were dropped.
    pub(crate) fn cancel_all(&mut self) -> usize {
        let dropped = self.len();
        for (_, mut task) in self.pending.drain(..) {
            task.on_cancel();
        }
        for index in 0..self.slots.len() {
            match &mut self.slots[index].entry {
                Entry::Vacant => continue,
                Entry::Reserved => {}
                Entry::Active(entry) => {
                    if let Some(task) = entry.task.as_mut() {
                        task.on_cancel();
                    }
                }
            }
            self.release(index);
        }
        self.active = 0;
        dropped
    }

    /// Active plus pending tasks.
    pub(crate) fn len(&self) -> usize {
        self.active + self.pending.len()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Every known task as `(id, kind, status)`: active slots first, then
    /// pending registrations.
    pub(crate) fn entries(&self) -> Vec<(TaskId, Option<TaskKind>, TaskStatus)> {
        let mut out = Vec::with_capacity(self.len());
        for (index, slot) in self.slots.iter().enumerate() {
            if let Entry::Active(entry) = &slot.entry {
                out.push((
                    TaskId::new(index as u32, slot.generation),
                    entry.task.as_ref().map(Task::kind),
                    entry.status,
                ));
            }
        }
        for (id, task) in &self.pending {
            out.push((*id, Some(task.kind()), TaskStatus::Pending));
        }
        out
    }

    fn transition(&mut self, id: TaskId, from: TaskStatus, to: TaskStatus) -> bool {
        match self.entry_mut(id) {
            Some(Entry::Active(entry)) if entry.status == from => {
                entry.status = to;
                true
            }
            _ => false,
        }
    }

    fn release(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.entry = Entry::Vacant;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index as u32);
    }

    fn entry(&self, id: TaskId) -> Option<&Entry> {
        self.slots
            .get(id.slot())
            .filter(|slot| slot.generation == id.generation())
            .map(|slot| &slot.entry)
    }

    fn entry_mut(&mut self, id: TaskId) -> Option<&mut Entry> {
        self.slots
            .get_mut(id.slot())
            .filter(|slot| slot.generation == id.generation())
            .map(|slot| &mut slot.entry)
    }
}
