//! # taskcal Core Library
//!
//! Turns a pasted checklist into a sequential day schedule and pushes the
//! resulting tasks to Google Calendar. The `taskcal` CLI and the HTTP
//! surface in [`server`] are thin layers over the same core.
//!
//! ## Architecture
//!
//! - **Parser**: checklist text to `(title, minutes)` lines
//! - **Schedule**: walks a running clock to assign start times
//! - **Task store**: ordered local task list persisted as JSON
//! - **Auth**: OAuth2 session that hands out valid access tokens
//! - **Calendar**: Google Calendar REST client and calendar catalog
//! - **Sync**: sequential, partial-failure-tolerant event creation
//!
//! ## Key Components
//!
//! - [`AuthSession`]: token owner, refreshes on demand
//! - [`TaskStore`]: single source of truth for local tasks
//! - [`CalendarSyncEngine`]: pushes tasks and reports per-task outcomes
//! - [`Config`]: application configuration management

pub mod auth;
pub mod calendar;
pub mod error;
pub mod parser;
pub mod schedule;
pub mod server;
pub mod storage;
pub mod sync;
pub mod task;
pub mod workflow;

pub use auth::{AuthSession, AuthToken, OAuthClient, ProviderGrant, TokenRefresher};
pub use calendar::{CalendarApi, CalendarCatalog, CalendarItem, GoogleCalendarClient};
pub use error::{ApiError, AuthError, ConfigError, CoreError, StoreError, ValidationError};
pub use parser::{format_task_line, parse_task_text, ParsedTaskLine};
pub use schedule::{build_schedule, ClockTime, Schedule, ScheduleEntry};
pub use storage::{Config, JsonFileStore, KeyValueStore, MemoryStore};
pub use sync::{CalendarSyncEngine, SyncError, SyncOutcome, SyncReport};
pub use task::{SyncState, Task, TaskDraft, TaskStore};
pub use workflow::{ImportFlow, ImportState};
