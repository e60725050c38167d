//! Audio channel: speech-to-text and text-to-speech against the agent
//! service. Driven directly by the presentation layer; the dispatcher is
//! not involved.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::collections::HashMap;

use crate::api::backend::{ApiResult, HttpBackend};

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Transcription {
    pub transcript: String,
    /// Effective language tag, echoed (possibly corrected) by the service.
    pub language_code: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SupportedLanguages {
    /// Language tag to default speaker.
    #[serde(default)]
    pub supported_languages: HashMap<String, String>,
    #[serde(default)]
    pub valid_speakers: Vec<String>,
}

impl HttpBackend {
    /// Transcribe an audio recording.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        language_code: &str,
    ) -> ApiResult<Transcription> {
        let form = Form::new()
            .part("file", Part::bytes(audio).file_name(file_name.to_string()))
            .text("language_code", language_code.to_string());
        let response = self.post("/transcribe").multipart(form).send().await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    /// Synthesize speech and return the raw audio bytes (WAV).
    ///
    /// Omitted language and speaker are detected server-side.
    pub async fn synthesize(
        &self,
        text: &str,
        language_code: Option<&str>,
        speaker: Option<&str>,
    ) -> ApiResult<Bytes> {
        let mut query: Vec<(&str, &str)> = vec![("text", text)];
        if let Some(language_code) = language_code {
            query.push(("target_language_code", language_code));
        }
        if let Some(speaker) = speaker {
            query.push(("speaker", speaker));
        }
        let response = self
            .post("/text-to-speech/")
            .query(&query)
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.bytes().await?)
    }

    /// Languages and speakers the synthesis endpoint accepts.
    pub async fn supported_languages(&self) -> ApiResult<SupportedLanguages> {
        let response = self.get("/supported-languages/").send().await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcription_echoes_language_tag() {
        let payload: Transcription =
            serde_json::from_str(r#"{"transcript":"hello there","language_code":"hi-IN"}"#)
                .unwrap();
        assert_eq!(payload.transcript, "hello there");
        assert_eq!(payload.language_code, "hi-IN");
    }

    #[test]
    fn supported_languages_ignores_extra_fields() {
        let payload: SupportedLanguages = serde_json::from_str(
            r#"{"supported_languages":{"en-IN":"arya"},"language_detection_mapping":{"en":"en-IN"},"valid_speakers":["arya"]}"#,
        )
        .unwrap();
        assert_eq!(payload.supported_languages["en-IN"], "arya");
        assert_eq!(payload.valid_speakers, vec!["arya".to_string()]);
    }
}
