//! Leonardo AI: queued generation jobs.
//!
//! Submission returns a generation id immediately; the image appears later
//! and has to be fetched by polling. Wire format:
//!
//! ```text
//! POST {base}/generations                     GET {base}/generations/{id}
//! Authorization: Bearer …                     Authorization: Bearer …
//! {                                           200 {"generations_by_pk": {
//!   "prompt": "...",                                "status": "PENDING" | "COMPLETE" | "FAILED",
//!   "negative_prompt": "...",   (optional)          "generated_images": [{"url": "https://…"}]
//!   "imageData": "<base64 JPEG>",                 }}
//!   "modelId": "6bef9f1b-…",
//!   "num_images": 1,
//!   "alchemy": true             (optional)
//! }
//! 200 {"sdGenerationJob": {"generationId": "…"}}
//! ```
//!
//! Older gateway deployments answer with a flat `{"generationId": …}` and
//! a `{"generations": [{"status", "imageUrl"}]}` status body; both shapes
//! are accepted.

use crate::config::{Provider, StyleParams};
use crate::error::TransformError;
use crate::output::GeneratedImage;
use crate::pipeline::preprocess::PreparedImage;
use crate::pipeline::provider::{
    error_from_response, network_error, PollStatus, ProviderClient, Submission,
};
use crate::request::Credential;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const PROVIDER: Provider = Provider::Leonardo;

/// JSON body of a generation submission. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeonardoSubmission {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    #[serde(rename = "imageData")]
    image_data: String,
    #[serde(rename = "modelId")]
    model_id: String,
    num_images: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    alchemy: Option<bool>,
}

impl LeonardoSubmission {
    pub fn build(image: &PreparedImage, style: &StyleParams) -> Self {
        Self {
            prompt: style.prompt.clone(),
            negative_prompt: style
                .negative_prompt
                .clone()
                .filter(|n| !n.trim().is_empty()),
            image_data: image.to_base64(),
            model_id: style.model_id.clone(),
            num_images: 1,
            alchemy: style.alchemy,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    sd_generation_job: Option<JobRef>,
    #[serde(default)]
    generation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobRef {
    generation_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    generations_by_pk: Option<GenerationJob>,
    #[serde(default)]
    generations: Vec<GenerationJob>,
}

#[derive(Debug, Deserialize)]
struct GenerationJob {
    status: String,
    #[serde(default)]
    generated_images: Vec<ImageRef>,
    #[serde(default, rename = "imageUrl")]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageRef {
    url: String,
}

/// Client for the Leonardo AI REST API.
#[derive(Debug, Clone)]
pub struct LeonardoClient {
    http: reqwest::Client,
    base_url: String,
}

impl LeonardoClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn generations_url(&self) -> String {
        format!("{}/generations", self.base_url)
    }

    fn status_url(&self, session_id: &str) -> Result<reqwest::Url, TransformError> {
        let mut url = reqwest::Url::parse(&self.generations_url())
            .map_err(|e| TransformError::InvalidConfig(format!("Invalid Leonardo URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| TransformError::InvalidConfig("Leonardo URL cannot take a path".into()))?
            .push(session_id);
        Ok(url)
    }
}

#[async_trait]
impl ProviderClient for LeonardoClient {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    async fn submit(
        &self,
        image: &PreparedImage,
        style: &StyleParams,
        credential: &Credential,
    ) -> Result<Submission, TransformError> {
        let body = LeonardoSubmission::build(image, style);
        info!(
            "Submitting generation job to {} (model {})",
            PROVIDER, style.model_id
        );

        let response = self
            .http
            .post(self.generations_url())
            .bearer_auth(credential.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;
        let session_id = parse_submit_response(&bytes)?;
        info!("{} queued generation {}", PROVIDER, session_id);
        Ok(Submission::Queued { session_id })
    }

    async fn check_status(
        &self,
        session_id: &str,
        credential: &Credential,
    ) -> Result<PollStatus, TransformError> {
        let response = self
            .http
            .get(self.status_url(session_id)?)
            .bearer_auth(credential.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;
        let status = parse_status_response(&bytes)?;
        debug!("Generation {}: {:?}", session_id, status);
        Ok(status)
    }
}

fn malformed(detail: impl Into<String>) -> TransformError {
    TransformError::MalformedResponse {
        provider: PROVIDER,
        detail: detail.into(),
    }
}

fn parse_submit_response(body: &[u8]) -> Result<String, TransformError> {
    let parsed: SubmitResponse =
        serde_json::from_slice(body).map_err(|e| malformed(e.to_string()))?;
    parsed
        .sd_generation_job
        .map(|job| job.generation_id)
        .or(parsed.generation_id)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| malformed("response carried no generation id"))
}

fn parse_status_response(body: &[u8]) -> Result<PollStatus, TransformError> {
    let parsed: StatusResponse =
        serde_json::from_slice(body).map_err(|e| malformed(e.to_string()))?;
    let job = parsed
        .generations_by_pk
        .or_else(|| parsed.generations.into_iter().next())
        .ok_or_else(|| malformed("status response carried no generation"))?;

    match job.status.to_ascii_uppercase().as_str() {
        "COMPLETE" => {
            let url = job
                .generated_images
                .into_iter()
                .map(|img| img.url)
                .next()
                .or(job.image_url)
                .filter(|u| !u.is_empty())
                .ok_or_else(|| malformed("generation is COMPLETE but has no image URL"))?;
            Ok(PollStatus::Complete(GeneratedImage::Remote { url }))
        }
        "FAILED" => Ok(PollStatus::Failed {
            status: job.status,
            detail: "generation failed upstream".into(),
        }),
        _ => Ok(PollStatus::Pending { status: job.status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::preprocess::{prepare_image, ImageSpec};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn prepared() -> PreparedImage {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        prepare_image(&buf, ImageSpec { width: 8, height: 8, jpeg_quality: 90 }).unwrap()
    }

    #[test]
    fn submission_body_shape() {
        let image = prepared();
        let style = StyleParams::for_provider(Provider::Leonardo);
        let json = serde_json::to_value(LeonardoSubmission::build(&image, &style)).unwrap();

        assert_eq!(json["prompt"], style.prompt);
        assert_eq!(json["imageData"], image.to_base64());
        assert_eq!(json["modelId"], "6bef9f1b-29cb-40c7-b9df-32b51c1f67d3");
        assert_eq!(json["num_images"], 1);
        assert!(json.get("negative_prompt").is_none());
        assert!(json.get("alchemy").is_none());
    }

    #[test]
    fn submission_body_optional_fields() {
        let style = StyleParams::for_provider(Provider::Leonardo)
            .with_default_negative()
            .alchemy(true);
        let json = serde_json::to_value(LeonardoSubmission::build(&prepared(), &style)).unwrap();
        assert!(json["negative_prompt"].as_str().unwrap().contains("photorealistic"));
        assert_eq!(json["alchemy"], true);
    }

    #[test]
    fn submit_response_both_shapes() {
        assert_eq!(
            parse_submit_response(br#"{"sdGenerationJob":{"generationId":"gen-123","apiCreditCost":8}}"#).unwrap(),
            "gen-123"
        );
        assert_eq!(
            parse_submit_response(br#"{"generationId":"gen-456"}"#).unwrap(),
            "gen-456"
        );
        assert!(parse_submit_response(br#"{"sdGenerationJob":null}"#).is_err());
        assert!(parse_submit_response(br#"{"generationId":""}"#).is_err());
    }

    #[test]
    fn status_pending_complete_failed() {
        assert_eq!(
            parse_status_response(br#"{"generations_by_pk":{"status":"PENDING","generated_images":[]}}"#).unwrap(),
            PollStatus::Pending { status: "PENDING".into() }
        );
        assert_eq!(
            parse_status_response(
                br#"{"generations_by_pk":{"status":"COMPLETE","generated_images":[{"url":"https://cdn/x.jpg","id":"i1"}]}}"#
            )
            .unwrap(),
            PollStatus::Complete(GeneratedImage::Remote { url: "https://cdn/x.jpg".into() })
        );
        assert!(matches!(
            parse_status_response(br#"{"generations_by_pk":{"status":"FAILED"}}"#).unwrap(),
            PollStatus::Failed { .. }
        ));
    }

    #[test]
    fn status_flat_shape_with_image_url() {
        assert_eq!(
            parse_status_response(br#"{"generations":[{"status":"COMPLETE","imageUrl":"https://cdn/y.png"}]}"#)
                .unwrap(),
            PollStatus::Complete(GeneratedImage::Remote { url: "https://cdn/y.png".into() })
        );
    }

    #[test]
    fn complete_without_url_is_malformed() {
        let err = parse_status_response(br#"{"generations_by_pk":{"status":"COMPLETE","generated_images":[]}}"#)
            .unwrap_err();
        assert!(matches!(err, TransformError::MalformedResponse { .. }));
    }

    #[test]
    fn status_url_escapes_id() {
        let client = LeonardoClient::new(reqwest::Client::new(), "https://cloud.leonardo.ai/api/rest/v1");
        assert_eq!(
            client.status_url("abc/def").unwrap().as_str(),
            "https://cloud.leonardo.ai/api/rest/v1/generations/abc%2Fdef"
        );
    }
}
