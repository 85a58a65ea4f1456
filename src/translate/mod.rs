//! Text translation: Vietnamese to English.

pub mod marian;
pub mod translator;

pub use marian::{MarianConfig, MarianTranslator};
pub use translator::{MockTranslator, TranslationResult, Translator, validate_input};
