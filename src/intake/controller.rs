//! Intake controller - classifies messages, stores questions, builds replies.

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use tracing::info;

use crate::intake::chunk::{split_chunks, MAX_CHUNK_CHARS};
use crate::intake::classifier::{classify, Outcome};
use crate::intake::composer::{Reply, ResponseComposer};
use crate::intake::language::{detect, Locale};
use crate::intake::record::{QuestionRecord, UNKNOWN_SENDER};
use crate::report::ErrorReporter;
use crate::store::{file::FILE_HEADER, QuestionStore};

pub struct IntakeController {
    store: Arc<dyn QuestionStore>,
    composer: ResponseComposer,
    reporter: Arc<ErrorReporter>,
    timezone: Tz,
}

impl IntakeController {
    pub fn new(
        store: Arc<dyn QuestionStore>,
        composer: ResponseComposer,
        reporter: Arc<ErrorReporter>,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            composer,
            reporter,
            timezone,
        }
    }

    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.reporter
    }

    /// Handle one inbound text message.
    ///
    /// Questions are appended to the store exactly once; a store failure is
    /// reported and turned into the failure reply, never returned.
    pub async fn handle(&self, sender_id: i64, sender_name: Option<&str>, raw_text: &str) -> Reply {
        let text = raw_text.trim();
        let outcome = classify(text);
        let locale = detect(text);
        let name = sender_name.unwrap_or(UNKNOWN_SENDER);

        let record = if outcome == Outcome::Question {
            let now = Utc::now().with_timezone(&self.timezone).naive_local();
            QuestionRecord::new(now, sender_id, name, text)
        } else {
            None
        };

        let store_result = match record {
            Some(record) => {
                let result = self.store.append(&record).await;
                match result {
                    Ok(()) => info!("Saved question from {name} ({sender_id})"),
                    Err(ref e) => {
                        self.reporter.store("append", e);
                    }
                }
                Some(result)
            }
            None => None,
        };

        let preview: String = text.chars().take(100).collect();
        info!("Message from {name} ({sender_id}): \"{preview}\" → {outcome:?}/{}", locale.as_str());

        self.composer.compose(outcome, locale, store_result.as_ref())
    }

    /// Welcome text for the `/start` command.
    pub fn greet(&self, locale: Locale) -> Reply {
        self.composer.welcome(locale)
    }

    /// Every stored question as transport-sized text chunks.
    pub async fn handle_dump(&self, locale: Locale) -> Vec<String> {
        let records = match self.store.all().await {
            Ok(records) => records,
            Err(e) => {
                self.reporter.store("all", &e);
                return vec![self.composer.dump_failed(locale)];
            }
        };

        info!("Dumping {} question(s)", records.len());
        split_chunks(&format_listing(&records), MAX_CHUNK_CHARS)
    }
}

/// Human-readable listing: header, blank line, one line per record.
pub fn format_listing(records: &[QuestionRecord]) -> String {
    let mut listing = format!("{FILE_HEADER}\n\n");
    for record in records {
        listing.push_str(&record.to_string());
        listing.push('\n');
    }
    listing
}
