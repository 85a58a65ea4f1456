//! Speech synthesis: English text to audio.

pub mod cloud;
pub mod executor;
pub mod local;
pub mod synthesizer;

pub use cloud::{ArtifactStore, CloudSynthesizer, HttpSpeechFetcher, SpeechFetcher};
pub use local::LocalSynthesizer;
pub use synthesizer::{
    ArtifactLocation, AudioContentType, MockSynthesizer, SynthesisArtifact, Synthesizer,
    VoiceConfig,
};

use crate::config::{TtsConfig, TtsEngine};
use std::sync::Arc;
use std::time::Duration;

/// Build the synthesizer selected by `[tts] engine`.
pub fn build_synthesizer(config: &TtsConfig) -> Arc<dyn Synthesizer> {
    match config.engine {
        TtsEngine::Local => Arc::new(LocalSynthesizer::system()),
        TtsEngine::Cloud => {
            let fetcher = HttpSpeechFetcher::new(&config.endpoint, Duration::from_secs(30));
            let store = ArtifactStore::new(&config.media_root, &config.base_url);
            Arc::new(CloudSynthesizer::new(fetcher, store))
        }
    }
}
