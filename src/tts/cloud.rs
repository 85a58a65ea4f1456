//! Cloud speech: MP3 from a remote TTS endpoint, persisted for download.
//!
//! Text is sent in short chunks (the Google Translate TTS endpoint refuses
//! long queries) and the returned MP3 frames are appended to one file under
//! `<media_root>/tts/<uuid>.mp3`. MP3 streams concatenate cleanly, so no
//! re-encoding is needed.

use crate::defaults;
use crate::error::{PipelineError, Result};
use crate::tts::synthesizer::{
    ArtifactLocation, AudioContentType, SynthesisArtifact, Synthesizer, VoiceConfig, require_text,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Subdirectory of the media root holding synthesized files.
pub const TTS_SUBDIR: &str = "tts";

/// Fetches encoded speech for one text chunk.
pub trait SpeechFetcher: Send + Sync {
    /// Return MP3 bytes for `chunk`, which is piece `index` of `total`.
    fn fetch_chunk(&self, chunk: &str, language: &str, index: usize, total: usize)
    -> Result<Vec<u8>>;
}

/// Google Translate TTS over blocking HTTP.
#[derive(Debug, Clone)]
pub struct HttpSpeechFetcher {
    endpoint: String,
    timeout: Duration,
}

impl HttpSpeechFetcher {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            timeout,
        }
    }

    /// Request URL for one chunk.
    pub fn chunk_url(
        &self,
        chunk: &str,
        language: &str,
        index: usize,
        total: usize,
    ) -> Result<reqwest::Url> {
        let total = total.to_string();
        let index = index.to_string();
        let textlen = chunk.chars().count().to_string();
        reqwest::Url::parse_with_params(
            &self.endpoint,
            &[
                ("ie", "UTF-8"),
                ("q", chunk),
                ("tl", language),
                ("total", total.as_str()),
                ("idx", index.as_str()),
                ("textlen", textlen.as_str()),
                ("client", "tw-ob"),
            ],
        )
        .map_err(|e| PipelineError::SynthesisFailure {
            message: format!("invalid TTS endpoint {}: {}", self.endpoint, e),
        })
    }
}

impl Default for HttpSpeechFetcher {
    fn default() -> Self {
        Self::new(defaults::TTS_ENDPOINT, Duration::from_secs(30))
    }
}

impl SpeechFetcher for HttpSpeechFetcher {
    fn fetch_chunk(
        &self,
        chunk: &str,
        language: &str,
        index: usize,
        total: usize,
    ) -> Result<Vec<u8>> {
        let url = self.chunk_url(chunk, language, index, total)?;
        let failure = |e: reqwest::Error| PipelineError::SynthesisFailure {
            message: format!("TTS request failed: {}", e),
        };

        // Built per call: a blocking client must not be dropped inside an
        // async context, and fetches run on pipeline worker threads.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("vitrans/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(failure)?;
        let bytes = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .map_err(failure)?;
        Ok(bytes.to_vec())
    }
}

/// Split `text` into pieces of at most `max_chars` characters.
///
/// Cuts prefer sentence punctuation, then whitespace; a single word longer
/// than the limit is split mid-word.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();

        if current_len > 0 && current_len + 1 + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
        }

        if word_len > max_chars {
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);

        if word.ends_with(['.', '!', '?', ';']) {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Location and public naming of synthesized files.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactStore {
    media_root: PathBuf,
    base_url: String,
}

impl ArtifactStore {
    pub fn new(media_root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            media_root: media_root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn tts_dir(&self) -> PathBuf {
        self.media_root.join(TTS_SUBDIR)
    }

    /// Public URL of a file in the TTS directory.
    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}/media/{}/{}", self.base_url, TTS_SUBDIR, file_name)
    }

    /// Fresh unique file name with the given extension.
    pub fn new_file_name(extension: &str) -> String {
        format!("{}.{}", Uuid::new_v4(), extension)
    }
}

/// Deletes its file on drop unless [`PartialFile::keep`] was called.
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove partial TTS file");
        }
    }
}

/// Cloud speech engine writing MP3 files into an [`ArtifactStore`].
pub struct CloudSynthesizer<F: SpeechFetcher = HttpSpeechFetcher> {
    fetcher: F,
    store: ArtifactStore,
    chunk_chars: usize,
}

impl<F: SpeechFetcher> CloudSynthesizer<F> {
    pub fn new(fetcher: F, store: ArtifactStore) -> Self {
        Self {
            fetcher,
            store,
            chunk_chars: defaults::TTS_CHUNK_CHARS,
        }
    }

    /// Longest chunk sent in one request.
    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    fn write_speech(&self, file: &mut File, text: &str, language: &str) -> Result<usize> {
        let chunks = split_text(text, self.chunk_chars);
        let total = chunks.len();
        let mut written = 0;
        for (index, chunk) in chunks.iter().enumerate() {
            let bytes = self.fetcher.fetch_chunk(chunk, language, index, total)?;
            if bytes.is_empty() {
                return Err(PipelineError::SynthesisFailure {
                    message: format!("TTS endpoint returned no audio for chunk {}", index),
                });
            }
            file.write_all(&bytes)?;
            written += bytes.len();
        }
        file.sync_all()?;
        Ok(written)
    }
}

impl<F: SpeechFetcher> Synthesizer for CloudSynthesizer<F> {
    fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<SynthesisArtifact> {
        let text = require_text(text)?;
        let as_failure = |e: PipelineError| match e {
            PipelineError::SynthesisFailure { .. } => e,
            other => PipelineError::SynthesisFailure {
                message: other.to_string(),
            },
        };

        let dir = self.store.tts_dir();
        std::fs::create_dir_all(&dir).map_err(|e| as_failure(e.into()))?;

        let file_name = ArtifactStore::new_file_name(AudioContentType::Mpeg.extension());
        let path = dir.join(&file_name);
        let mut file = File::create(&path).map_err(|e| as_failure(e.into()))?;
        let guard = PartialFile { path, keep: false };

        let bytes = self
            .write_speech(&mut file, text, &voice.language)
            .map_err(as_failure)?;
        drop(file);
        let path = guard.keep();

        tracing::info!(file = %file_name, bytes, "synthesized speech stored");
        Ok(SynthesisArtifact {
            location: ArtifactLocation::File(path),
            content_type: AudioContentType::Mpeg,
            access_locator: Some(self.store.url_for(&file_name)),
        })
    }

    fn engine_name(&self) -> &str {
        "cloud"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns `b"ID3<index>"` per chunk, failing at `fail_at` if set.
    struct ScriptedFetcher {
        fail_at: Option<usize>,
        seen: Mutex<Vec<(String, usize, usize)>>,
    }

    impl ScriptedFetcher {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                fail_at,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl SpeechFetcher for ScriptedFetcher {
        fn fetch_chunk(
            &self,
            chunk: &str,
            _language: &str,
            index: usize,
            total: usize,
        ) -> Result<Vec<u8>> {
            self.seen
                .lock()
                .unwrap()
                .push((chunk.to_string(), index, total));
            if self.fail_at == Some(index) {
                return Err(PipelineError::SynthesisFailure {
                    message: "503 from endpoint".to_string(),
                });
            }
            Ok(format!("ID3{}", index).into_bytes())
        }
    }

    fn dir_entries(dir: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(rd) => rd.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_split_short_text_is_single_chunk() {
        assert_eq!(split_text("Hello world", 100), vec!["Hello world"]);
    }

    #[test]
    fn test_split_respects_limit_and_sentences() {
        let chunks = split_text("I am a student. I love Vietnam very much indeed", 20);
        assert_eq!(chunks[0], "I am a student.");
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        assert_eq!(chunks.join(" "), "I am a student. I love Vietnam very much indeed");
    }

    #[test]
    fn test_split_breaks_long_words() {
        let chunks = split_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_split_whitespace_only_is_empty() {
        assert!(split_text("   ", 10).is_empty());
    }

    #[test]
    fn test_chunk_url_carries_query() {
        let fetcher = HttpSpeechFetcher::default();
        let url = fetcher.chunk_url("good morning", "en", 0, 1).unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(url.as_str().starts_with("https://translate.google.com/translate_tts?"));
        assert!(query.contains(&("q".to_string(), "good morning".to_string())));
        assert!(query.contains(&("tl".to_string(), "en".to_string())));
        assert!(query.contains(&("client".to_string(), "tw-ob".to_string())));
    }

    #[test]
    fn test_store_url_trims_trailing_slash() {
        let store = ArtifactStore::new("/srv/media", "http://10.0.0.2:8000/");
        assert_eq!(
            store.url_for("a.mp3"),
            "http://10.0.0.2:8000/media/tts/a.mp3"
        );
        assert_eq!(store.tts_dir(), PathBuf::from("/srv/media/tts"));
    }

    #[test]
    fn test_synthesize_persists_mp3_and_returns_url() {
        let media = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(media.path(), "http://localhost:8000");
        let synth = CloudSynthesizer::new(ScriptedFetcher::new(None), store);

        let artifact = synth
            .synthesize("Good morning everyone", &VoiceConfig::default())
            .unwrap();

        let ArtifactLocation::File(path) = &artifact.location else {
            panic!("expected a file artifact");
        };
        assert_eq!(std::fs::read(path).unwrap(), b"ID30");
        assert_eq!(artifact.content_type, AudioContentType::Mpeg);

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with(".mp3"));
        assert_eq!(
            artifact.access_locator.as_deref(),
            Some(format!("http://localhost:8000/media/tts/{}", name).as_str())
        );
    }

    #[test]
    fn test_each_call_gets_unique_file() {
        let media = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(media.path(), "http://localhost:8000");
        let synth = CloudSynthesizer::new(ScriptedFetcher::new(None), store);

        let a = synth.synthesize("one", &VoiceConfig::default()).unwrap();
        let b = synth.synthesize("one", &VoiceConfig::default()).unwrap();

        assert_ne!(a.location, b.location);
        assert_eq!(dir_entries(&media.path().join("tts")).len(), 2);
    }

    #[test]
    fn test_failed_chunk_removes_partial_file() {
        let media = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(media.path(), "http://localhost:8000");
        let synth =
            CloudSynthesizer::new(ScriptedFetcher::new(Some(1)), store).with_chunk_chars(10);

        let result = synth.synthesize("first part. second part.", &VoiceConfig::default());

        assert!(matches!(result, Err(PipelineError::SynthesisFailure { .. })));
        assert_eq!(synth.fetcher.seen.lock().unwrap().len(), 2);
        assert!(dir_entries(&media.path().join("tts")).is_empty());
    }

    #[test]
    fn test_empty_text_creates_nothing() {
        let media = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(media.path(), "http://localhost:8000");
        let synth = CloudSynthesizer::new(ScriptedFetcher::new(None), store);

        assert!(matches!(
            synth.synthesize(" ", &VoiceConfig::default()),
            Err(PipelineError::EmptyInput)
        ));
        assert!(!media.path().join("tts").exists());
    }
}
