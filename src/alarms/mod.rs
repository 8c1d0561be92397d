pub mod book;
pub mod model;
pub mod recurrence;
pub mod repository;

pub use book::{AlarmBook, ListenerId};
pub use model::{Alarm, AlarmPatch, DaySet, NewAlarm};
pub use recurrence::{describe_recurrence, parse_days};
pub use repository::{AlarmRepository, JsonFileRepository, MemoryRepository, Revision};
