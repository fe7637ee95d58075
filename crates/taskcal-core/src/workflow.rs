//! Bulk import as an explicit state machine.
//!
//! ```text
//! Input ──parse──> Configured ──begin_submit──> Submitting ──finish──> Done
//!   ^                  |                            |
//!   +──────back────────+                            +──fail──> Failed
//! ```
//!
//! The flow owns the pasted text and the per-task settings; it never
//! touches the network or the store. Callers drive the side effects between
//! `begin_submit` and `finish`/`fail`.

use chrono::NaiveDate;
use thiserror::Error;

use crate::error::ValidationError;
use crate::parser::parse_task_text;
use crate::schedule::{build_schedule, ClockTime, Schedule, ScheduleEntry};
use crate::sync::SyncReport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportState {
    Input,
    Configured,
    Submitting,
    Done(SyncReport),
    Failed(String),
}

impl ImportState {
    fn name(&self) -> &'static str {
        match self {
            ImportState::Input => "input",
            ImportState::Configured => "configured",
            ImportState::Submitting => "submitting",
            ImportState::Done(_) => "done",
            ImportState::Failed(_) => "failed",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    #[error("No task at position {0}")]
    NoSuchTask(usize),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// One import session.
#[derive(Debug, Clone)]
pub struct ImportFlow {
    state: ImportState,
    text: String,
    date: NaiveDate,
    start_time: ClockTime,
    entries: Vec<ScheduleEntry>,
}

impl ImportFlow {
    pub fn new(date: NaiveDate, start_time: ClockTime) -> Self {
        Self {
            state: ImportState::Input,
            text: String::new(),
            date,
            start_time,
            entries: Vec::new(),
        }
    }

    pub fn state(&self) -> &ImportState {
        &self.state
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    fn expect_state(&self, wanted: &ImportState, action: &'static str) -> Result<(), WorkflowError> {
        if std::mem::discriminant(&self.state) != std::mem::discriminant(wanted) {
            return Err(WorkflowError::InvalidTransition {
                state: self.state.name(),
                action,
            });
        }
        Ok(())
    }

    /// Parse `text` into entries that all get `break_after` and
    /// `calendar_id`. Stays in `Input` when nothing matches.
    pub fn parse(
        &mut self,
        text: &str,
        break_after: u32,
        calendar_id: &str,
    ) -> Result<usize, WorkflowError> {
        self.expect_state(&ImportState::Input, "parse")?;
        self.text = text.to_string();

        let lines = parse_task_text(text);
        if lines.is_empty() {
            return Err(ValidationError::ParseEmpty.into());
        }
        self.entries = lines
            .into_iter()
            .map(|line| ScheduleEntry {
                calendar_id: Some(calendar_id.to_string()),
                ..ScheduleEntry::new(line.title, line.duration_minutes, break_after)
            })
            .collect();
        self.state = ImportState::Configured;
        Ok(self.entries.len())
    }

    pub fn set_start(&mut self, date: NaiveDate, start_time: ClockTime) -> Result<(), WorkflowError> {
        self.expect_state(&ImportState::Configured, "change the start")?;
        self.date = date;
        self.start_time = start_time;
        Ok(())
    }

    fn entry_mut(&mut self, index: usize, action: &'static str) -> Result<&mut ScheduleEntry, WorkflowError> {
        self.expect_state(&ImportState::Configured, action)?;
        self.entries
            .get_mut(index)
            .ok_or(WorkflowError::NoSuchTask(index))
    }

    pub fn set_break(&mut self, index: usize, minutes: u32) -> Result<(), WorkflowError> {
        self.entry_mut(index, "edit a break")?.break_after = minutes;
        Ok(())
    }

    pub fn set_calendar(&mut self, index: usize, calendar_id: &str) -> Result<(), WorkflowError> {
        self.entry_mut(index, "edit a calendar")?.calendar_id = Some(calendar_id.to_string());
        Ok(())
    }

    pub fn set_description(&mut self, index: usize, description: Option<String>) -> Result<(), WorkflowError> {
        self.entry_mut(index, "edit a description")?.description =
            description.filter(|d| !d.trim().is_empty());
        Ok(())
    }

    pub fn apply_break_to_all(&mut self, minutes: u32) -> Result<(), WorkflowError> {
        self.expect_state(&ImportState::Configured, "edit breaks")?;
        for entry in &mut self.entries {
            entry.break_after = minutes;
        }
        Ok(())
    }

    pub fn apply_calendar_to_all(&mut self, calendar_id: &str) -> Result<(), WorkflowError> {
        self.expect_state(&ImportState::Configured, "edit calendars")?;
        for entry in &mut self.entries {
            entry.calendar_id = Some(calendar_id.to_string());
        }
        Ok(())
    }

    /// Schedule for the current settings, without changing state.
    pub fn preview(&self) -> Result<Schedule, WorkflowError> {
        self.expect_state(&ImportState::Configured, "preview")?;
        Ok(build_schedule(&self.entries, self.date, self.start_time))
    }

    /// Return to text input, keeping the text.
    pub fn back(&mut self) -> Result<(), WorkflowError> {
        self.expect_state(&ImportState::Configured, "go back")?;
        self.entries.clear();
        self.state = ImportState::Input;
        Ok(())
    }

    /// Lock the settings and hand out the schedule to submit.
    pub fn begin_submit(&mut self) -> Result<Schedule, WorkflowError> {
        let schedule = self.preview()?;
        self.state = ImportState::Submitting;
        Ok(schedule)
    }

    pub fn finish(&mut self, report: SyncReport) -> Result<(), WorkflowError> {
        self.expect_state(&ImportState::Submitting, "finish")?;
        self.state = ImportState::Done(report);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), WorkflowError> {
        self.expect_state(&ImportState::Submitting, "fail")?;
        self.state = ImportState::Failed(error.into());
        Ok(())
    }

    /// Start over from an empty input.
    pub fn reset(&mut self) {
        self.state = ImportState::Input;
        self.text.clear();
        self.entries.clear();
    }
}
