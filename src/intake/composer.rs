//! Localized reply texts.

use crate::intake::classifier::Outcome;
use crate::intake::language::Locale;
use crate::store::StoreError;

/// Caption sent with the special-trigger image.
pub const TRIGGER_CAPTION: &str = "🤔 Доколе?!";

const WELCOME_RU: &str = "👋 Привет! Я бот для учителей Тондираба.\n\n\
Меня зовут Тондик 😊\n\
Моя задача — собрать ваши вопросы, чтобы команда школы могла подготовить ответы \
и проанализировать, какие моменты вызывают трудности.\n\n\
⚠️ Обратите внимание: чтобы вопрос был сохранён в базу, он должен заканчиваться на знак вопроса (?)";

const WELCOME_ET: &str = "👋 Tere! Ma olen Tondiraba õpetajate bot.\n\n\
Minu nimi on Tondik 😊\n\
Minu ülesanne on koguda teie küsimusi, et kooli meeskond saaks ette valmistada vastused \
ja analüüsida, millised teemad on õpetajatele ebaselged.\n\n\
⚠️ Palun pange tähele: et küsimus salvestataks, peab see lõppema küsimärgiga (?)";

const SAVED_RU: &str = "✅ Вопрос сохранён!";
const SAVED_ET: &str = "✅ Küsimus on salvestatud!";

const SAVE_FAILED_RU: &str = "⚠️ Не удалось сохранить вопрос. Пожалуйста, попробуйте ещё раз позже.";
const SAVE_FAILED_ET: &str = "⚠️ Küsimust ei õnnestunud salvestada. Palun proovige hiljem uuesti.";

const NOT_A_QUESTION_RU: &str = "⛔ Сейчас в мои функции входит сбор вопросов от учителей.\n\
Пожалуйста, сформулируйте сообщение в виде вопроса и завершите его знаком вопроса (?).";
const NOT_A_QUESTION_ET: &str = "⛔ Praegu on minu ülesanne koguda õpetajatelt küsimusi.\n\
Palun sõnastage oma sõnum küsimusena ja lõpetage see küsimärgiga (?).";

const DUMP_FAILED_RU: &str = "❌ Не удалось загрузить вопросы.";
const DUMP_FAILED_ET: &str = "❌ Küsimusi ei õnnestunud laadida.";

/// What to send back to the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// `image_url` is an http(s) URL or a local file path.
    Image { image_url: String, caption: String },
}

impl Reply {
    pub fn text(&self) -> Option<&str> {
        match self {
            Reply::Text(t) => Some(t.as_str()),
            Reply::Image { .. } => None,
        }
    }
}

fn localized(locale: Locale, ru: &str, et: &str) -> String {
    match locale {
        Locale::Ru => ru.to_string(),
        Locale::Et => et.to_string(),
    }
}

pub struct ResponseComposer {
    trigger_image: String,
}

impl ResponseComposer {
    pub fn new(trigger_image: impl Into<String>) -> Self {
        Self {
            trigger_image: trigger_image.into(),
        }
    }

    pub fn compose(
        &self,
        outcome: Outcome,
        locale: Locale,
        store_result: Option<&Result<(), StoreError>>,
    ) -> Reply {
        match outcome {
            Outcome::Greeting => self.welcome(locale),
            Outcome::SpecialTrigger => Reply::Image {
                image_url: self.trigger_image.clone(),
                caption: TRIGGER_CAPTION.to_string(),
            },
            Outcome::Question => match store_result {
                Some(Ok(())) => Reply::Text(localized(locale, SAVED_RU, SAVED_ET)),
                Some(Err(_)) | None => Reply::Text(localized(locale, SAVE_FAILED_RU, SAVE_FAILED_ET)),
            },
            Outcome::Unrecognized => Reply::Text(localized(locale, NOT_A_QUESTION_RU, NOT_A_QUESTION_ET)),
        }
    }

    pub fn welcome(&self, locale: Locale) -> Reply {
        Reply::Text(localized(locale, WELCOME_RU, WELCOME_ET))
    }

    pub fn dump_failed(&self, locale: Locale) -> String {
        localized(locale, DUMP_FAILED_RU, DUMP_FAILED_ET)
    }
}
