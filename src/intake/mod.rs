//! Intake pipeline - language detection, classification, replies.

pub mod chunk;
pub mod classifier;
pub mod composer;
pub mod controller;
pub mod language;
pub mod record;

pub use classifier::{classify, Outcome};
pub use composer::{Reply, ResponseComposer};
pub use controller::IntakeController;
pub use language::{detect, Locale};
pub use record::QuestionRecord;
