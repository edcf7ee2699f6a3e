//! Stability AI: synchronous SDXL image-to-image.
//!
//! One multipart POST; the 200 response already contains the generated
//! image as base64 inside `artifacts[0]`. Wire format:
//!
//! ```text
//! POST {base}/v1/generation/stable-diffusion-xl-1024-v1-0/image-to-image
//! Authorization: Bearer sk-…
//! Accept: application/json
//!
//! init_image               <1024×1024 JPEG>
//! text_prompts[0][text]    <style prompt>
//! text_prompts[0][weight]  1
//! text_prompts[1][text]    <negative prompt>     (optional)
//! text_prompts[1][weight]  -1                    (optional)
//! image_strength           0.35
//! init_image_mode          IMAGE_STRENGTH
//! cfg_scale                7
//! steps                    40
//! style_preset             anime                 (optional)
//! seed                     1234                  (optional)
//! ```

use crate::config::{Provider, StyleParams};
use crate::error::TransformError;
use crate::output::{sniff_mime, GeneratedImage};
use crate::pipeline::preprocess::PreparedImage;
use crate::pipeline::provider::{
    error_from_response, network_error, PollStatus, ProviderClient, Submission,
};
use crate::prompts::STABILITY_ENGINE;
use crate::request::Credential;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

const PROVIDER: Provider = Provider::Stability;

/// The text fields and image of one image-to-image request.
///
/// Built once from a [`PreparedImage`] and [`StyleParams`]; nothing mutates
/// it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityForm {
    fields: Vec<(String, String)>,
    image: Vec<u8>,
}

impl StabilityForm {
    pub fn build(image: &PreparedImage, style: &StyleParams) -> Self {
        let mut fields = vec![
            ("text_prompts[0][text]".to_string(), style.prompt.clone()),
            ("text_prompts[0][weight]".to_string(), "1".to_string()),
        ];
        if let Some(negative) = style.negative_prompt.as_deref().filter(|n| !n.trim().is_empty()) {
            fields.push(("text_prompts[1][text]".to_string(), negative.to_string()));
            fields.push((
                "text_prompts[1][weight]".to_string(),
                style.negative_weight.clamp(-1.0, -0.5).to_string(),
            ));
        }
        fields.push((
            "image_strength".to_string(),
            style.image_strength.clamp(0.0, 1.0).to_string(),
        ));
        fields.push(("init_image_mode".to_string(), "IMAGE_STRENGTH".to_string()));
        fields.push(("cfg_scale".to_string(), style.cfg_scale.to_string()));
        fields.push(("steps".to_string(), style.steps.to_string()));
        if let Some(ref preset) = style.style_preset {
            fields.push(("style_preset".to_string(), preset.clone()));
        }
        if let Some(seed) = style.seed {
            fields.push(("seed".to_string(), seed.to_string()));
        }

        Self {
            fields,
            image: image.bytes().to_vec(),
        }
    }

    /// Value of a text field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    fn into_multipart(self) -> Result<Form, TransformError> {
        let part = Part::bytes(self.image)
            .file_name("init_image.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| network_error(PROVIDER, e))?;
        let form = self
            .fields
            .into_iter()
            .fold(Form::new().part("init_image", part), |form, (k, v)| {
                form.text(k, v)
            });
        Ok(form)
    }
}

#[derive(Debug, Deserialize)]
struct ImageToImageResponse {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    base64: String,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    seed: Option<u64>,
}

/// Client for the Stability AI v1 REST API.
#[derive(Debug, Clone)]
pub struct StabilityClient {
    http: reqwest::Client,
    base_url: String,
}

impl StabilityClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/generation/{}/image-to-image",
            self.base_url, STABILITY_ENGINE
        )
    }
}

#[async_trait]
impl ProviderClient for StabilityClient {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    async fn submit(
        &self,
        image: &PreparedImage,
        style: &StyleParams,
        credential: &Credential,
    ) -> Result<Submission, TransformError> {
        let form = StabilityForm::build(image, style);
        info!(
            "Submitting {} byte init image to {}",
            image.bytes().len(),
            PROVIDER
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(credential.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form.into_multipart()?)
            .send()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;
        parse_response(&body).map(Submission::Complete)
    }

    async fn check_status(
        &self,
        session_id: &str,
        _credential: &Credential,
    ) -> Result<PollStatus, TransformError> {
        Err(TransformError::Internal(format!(
            "{PROVIDER} answers synchronously; there is no job '{session_id}' to poll"
        )))
    }
}

/// Extract the first artifact of a 200 response as an image.
fn parse_response(body: &[u8]) -> Result<GeneratedImage, TransformError> {
    let malformed = |detail: String| TransformError::MalformedResponse {
        provider: PROVIDER,
        detail,
    };

    let parsed: ImageToImageResponse =
        serde_json::from_slice(body).map_err(|e| malformed(e.to_string()))?;
    let artifact = parsed
        .artifacts
        .into_iter()
        .next()
        .ok_or_else(|| malformed("response contained no artifacts".into()))?;

    match artifact.finish_reason.as_deref() {
        Some("ERROR") => {
            return Err(TransformError::GenerationFailed {
                provider: PROVIDER,
                detail: "artifact finished with ERROR".into(),
            })
        }
        Some("CONTENT_FILTERED") => {
            return Err(TransformError::GenerationFailed {
                provider: PROVIDER,
                detail: "result was blocked by the content filter".into(),
            })
        }
        _ => {}
    }

    let bytes = STANDARD
        .decode(artifact.base64.trim())
        .map_err(|e| malformed(format!("artifact is not valid base64: {e}")))?;
    let mime = sniff_mime(&bytes)
        .ok_or_else(|| malformed("artifact is not a PNG, JPEG or WebP image".into()))?;

    debug!(
        "Artifact decoded: {} bytes {} (seed {:?})",
        bytes.len(),
        mime,
        artifact.seed
    );

    Ok(GeneratedImage::Inline {
        bytes,
        mime: mime.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::preprocess::{prepare_image, ImageSpec};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn prepared() -> PreparedImage {
        prepare_image(&png_bytes(), ImageSpec { width: 8, height: 8, jpeg_quality: 90 }).unwrap()
    }

    #[test]
    fn form_carries_fixed_generation_parameters() {
        let style = StyleParams::for_provider(Provider::Stability);
        let form = StabilityForm::build(&prepared(), &style);

        assert_eq!(form.field("text_prompts[0][text]"), Some(style.prompt.as_str()));
        assert_eq!(form.field("text_prompts[0][weight]"), Some("1"));
        assert_eq!(form.field("image_strength"), Some("0.35"));
        assert_eq!(form.field("init_image_mode"), Some("IMAGE_STRENGTH"));
        assert_eq!(form.field("cfg_scale"), Some("7"));
        assert_eq!(form.field("steps"), Some("40"));
        assert_eq!(form.field("text_prompts[1][text]"), None);
        assert_eq!(form.field("style_preset"), None);
        assert_eq!(form.field("seed"), None);
    }

    #[test]
    fn form_includes_optional_fields_when_set() {
        let style = StyleParams::for_provider(Provider::Stability)
            .negative_prompt("photorealistic", -0.7)
            .style_preset("anime")
            .seed(42);
        let form = StabilityForm::build(&prepared(), &style);

        assert_eq!(form.field("text_prompts[1][text]"), Some("photorealistic"));
        assert_eq!(form.field("text_prompts[1][weight]"), Some("-0.7"));
        assert_eq!(form.field("style_preset"), Some("anime"));
        assert_eq!(form.field("seed"), Some("42"));
    }

    #[test]
    fn blank_negative_prompt_is_dropped() {
        let mut style = StyleParams::for_provider(Provider::Stability);
        style.negative_prompt = Some("  ".into());
        let form = StabilityForm::build(&prepared(), &style);
        assert_eq!(form.field("text_prompts[1][text]"), None);
    }

    #[test]
    fn parse_uses_first_artifact() {
        let b64 = STANDARD.encode(png_bytes());
        let body = format!(
            r#"{{"artifacts":[{{"base64":"{b64}","seed":7,"finishReason":"SUCCESS"}},{{"base64":"AAAA","finishReason":"SUCCESS"}}]}}"#
        );
        let img = parse_response(body.as_bytes()).unwrap();
        assert_eq!(
            img,
            GeneratedImage::Inline {
                bytes: png_bytes(),
                mime: "image/png".into()
            }
        );
    }

    #[test]
    fn parse_rejects_empty_artifacts() {
        let err = parse_response(br#"{"artifacts":[]}"#).unwrap_err();
        assert!(matches!(err, TransformError::MalformedResponse { .. }), "got: {err:?}");
    }

    #[test]
    fn parse_rejects_filtered_artifact() {
        let b64 = STANDARD.encode(png_bytes());
        let body = format!(r#"{{"artifacts":[{{"base64":"{b64}","finishReason":"CONTENT_FILTERED"}}]}}"#);
        let err = parse_response(body.as_bytes()).unwrap_err();
        assert!(matches!(err, TransformError::GenerationFailed { .. }), "got: {err:?}");
    }

    #[test]
    fn parse_rejects_non_image_payload() {
        let body = format!(r#"{{"artifacts":[{{"base64":"{}"}}]}}"#, STANDARD.encode("hello"));
        let err = parse_response(body.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("not a PNG"), "got: {err}");
    }

    #[tokio::test]
    async fn check_status_is_not_supported() {
        let client = StabilityClient::new(reqwest::Client::new(), "http://localhost");
        let err = client
            .check_status("job", &Credential::new("sk-x"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Internal(_)));
    }
}
