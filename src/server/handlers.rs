use crate::error::PipelineError;
use crate::history::HistoryRecord;
use crate::pipeline::{AudioInput, CancelToken, PipelineOutcome, Stage, StageFailure, StageTimings};
use crate::server::error::{ApiError, status_for_fault};
use crate::server::state::AppState;
use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

const AUDIO_FIELD: &str = "audio";
const SPEAK_FIELD: &str = "speak";
const EMPTY_TEXT: &str = "Text is required and cannot be empty";

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub transcription: String,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub translation: String,
}

#[derive(Debug, Serialize)]
pub struct TtsResponse {
    pub url: String,
}

/// Body of `/api/v1/pipeline/`, including partial results on failure.
#[derive(Debug, Serialize)]
pub struct PipelineResponse<'a> {
    pub transcription: Option<&'a str>,
    pub translation: Option<&'a str>,
    pub url: Option<&'a str>,
    pub failure: Option<&'a StageFailure>,
    pub synthesis_error: Option<&'a StageFailure>,
    pub audio_ms: Option<u64>,
    pub timings: &'a StageTimings,
}

impl<'a> PipelineResponse<'a> {
    pub fn from_outcome(outcome: &'a PipelineOutcome) -> Self {
        Self {
            transcription: outcome.transcript.as_ref().map(|t| t.text.as_str()),
            translation: outcome
                .translation
                .as_ref()
                .map(|t| t.translated_text.as_str()),
            url: outcome
                .synthesis
                .as_ref()
                .and_then(|s| s.access_locator.as_deref()),
            failure: outcome.failure.as_ref(),
            synthesis_error: outcome.synthesis_error.as_ref(),
            audio_ms: outcome.audio_duration.map(|d| d.as_millis() as u64),
            timings: &outcome.timings,
        }
    }
}

/// Uploaded audio plus form options.
struct Upload {
    data: Vec<u8>,
    file_name: String,
    speak: bool,
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::bad_request(format!("Invalid multipart body: {}", e.body_text()))
}

fn too_large(limit: usize) -> ApiError {
    const MIB: usize = 1024 * 1024;
    if limit >= MIB && limit % MIB == 0 {
        ApiError::bad_request(format!("File too large, maximum size is {}MB", limit / MIB))
    } else {
        ApiError::bad_request(format!("File too large, maximum size is {} bytes", limit))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Read the `audio` field, stopping as soon as it exceeds `limit`.
async fn read_upload(multipart: &mut Multipart, limit: usize) -> Result<Upload, ApiError> {
    let mut audio: Option<(Vec<u8>, String)> = None;
    let mut speak = false;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(AUDIO_FIELD) => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                if !file_name.to_ascii_lowercase().ends_with(".wav") {
                    return Err(ApiError::bad_request("Only WAV files are supported"));
                }
                let mut data = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if data.len() + chunk.len() > limit {
                        tracing::warn!(received = data.len() + chunk.len(), limit, "upload too large");
                        return Err(too_large(limit));
                    }
                    data.extend_from_slice(&chunk);
                }
                audio = Some((data, file_name));
            }
            Some(SPEAK_FIELD) => {
                speak = is_truthy(&field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (data, file_name) = audio.ok_or_else(|| ApiError::bad_request("No audio file provided"))?;
    Ok(Upload {
        data,
        file_name,
        speak,
    })
}

fn require_text(payload: Result<Json<TextRequest>, JsonRejection>) -> Result<String, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    match request.text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ApiError::bad_request(EMPTY_TEXT)),
    }
}

pub async fn ping() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let upload = read_upload(&mut multipart, state.max_upload_bytes).await?;
    tracing::info!(bytes = upload.data.len(), file = %upload.file_name, "transcribe request");

    let transcript = state
        .pool
        .submit(move |pipeline| pipeline.transcribe_only(AudioInput::bytes(upload.data, Some("wav"))))
        .await??;

    Ok(Json(TranscribeResponse {
        transcription: transcript.text,
    }))
}

pub async fn translate(
    State(state): State<AppState>,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let text = require_text(payload)?;
    tracing::info!(chars = text.chars().count(), "translate request");

    let history = state.history.clone();
    let translation = state
        .pool
        .submit(move |pipeline| {
            let result = pipeline.translate_text(&text);
            if let (Ok(translation), Some(history)) = (&result, &history) {
                history.record(&HistoryRecord::new(
                    &translation.source_text,
                    &translation.translated_text,
                    None,
                ));
            }
            result
        })
        .await??;

    Ok(Json(TranslateResponse {
        translation: translation.translated_text,
    }))
}

pub async fn tts(
    State(state): State<AppState>,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<TtsResponse>, ApiError> {
    let text = require_text(payload)?;
    tracing::info!(chars = text.chars().count(), "tts request");

    let artifact = state
        .pool
        .submit(move |pipeline| pipeline.synthesize_text(&text))
        .await??;

    let url = artifact.access_locator.ok_or_else(|| {
        ApiError::from(PipelineError::SynthesisFailure {
            message: "speech engine produced no downloadable file".to_string(),
        })
    })?;
    Ok(Json(TtsResponse { url }))
}

pub async fn pipeline(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_upload(&mut multipart, state.max_upload_bytes).await?;
    let last = if upload.speak {
        Stage::Synthesizing
    } else {
        Stage::Translating
    };
    tracing::info!(bytes = upload.data.len(), file = %upload.file_name, speak = upload.speak, "pipeline request");

    let history = state.history.clone();
    let outcome = state
        .pool
        .submit(move |pipeline| {
            let input = AudioInput::bytes(upload.data, Some("wav"));
            let outcome = pipeline.run_until(input, &CancelToken::new(), last);
            if let (Some(transcript), Some(translation), Some(history)) =
                (&outcome.transcript, &outcome.translation, &history)
            {
                let url = outcome
                    .synthesis
                    .as_ref()
                    .and_then(|s| s.access_locator.clone());
                history.record(&HistoryRecord::new(
                    &transcript.text,
                    &translation.translated_text,
                    url,
                ));
            }
            outcome
        })
        .await?;

    let status = outcome
        .failure
        .as_ref()
        .map_or(StatusCode::OK, |f| status_for_fault(f.fault()));
    Ok((status, Json(PipelineResponse::from_outcome(&outcome))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_message() {
        let error = too_large(10 * 1024 * 1024);
        assert!(matches!(
            error,
            ApiError::BadRequest { ref message } if message == "File too large, maximum size is 10MB"
        ));
        assert!(matches!(
            too_large(1000),
            ApiError::BadRequest { ref message } if message.ends_with("1000 bytes")
        ));
    }

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("true"));
        assert!(is_truthy(" Yes "));
        assert!(is_truthy("1"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn test_require_text() {
        let ok = require_text(Ok(Json(TextRequest {
            text: Some("xin chào".to_string()),
        })));
        assert_eq!(ok.unwrap(), "xin chào");

        for text in [None, Some(String::new()), Some("   ".to_string())] {
            let result = require_text(Ok(Json(TextRequest { text })));
            assert!(matches!(
                result,
                Err(ApiError::BadRequest { ref message }) if message == EMPTY_TEXT
            ));
        }
    }
}
