//! Labeler Client — HTTP implementation of `LabelPublisher`.
//!
//! Talks to the moderation labeler that signs and emits labels on posts. Every
//! call is a single POST carrying the label values to create and to negate for
//! one post, so publishing one annotation strength atomically retracts the other.
//!
//! No retries here: a failed call is counted by the run, and a later run sees
//! the note's label still lagging and calls again.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::labels::{LabelAction, LabelPublisher, LabelerError};
use crate::models::note::NoteStatus;

const EMIT_PATH: &str = "/labels/emit";

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct EmitLabelsRequest<'a> {
    subject_uri: &'a str,
    create_label_vals: Vec<&'static str>,
    negate_label_vals: Vec<&'static str>,
    comment: String,
}

#[derive(Debug, Deserialize)]
struct LabelerErrorBody {
    message: String,
}

fn build_request(note_id: Uuid, post_uri: &str, action: LabelAction) -> EmitLabelsRequest<'_> {
    let (create_label_vals, negate_label_vals) = action.label_vals();
    let comment = match action {
        LabelAction::Publish(status) => {
            format!("community note {note_id} is {}", status.as_str())
        }
        LabelAction::Negate => format!("community note {note_id} retracted"),
    };
    EmitLabelsRequest {
        subject_uri: post_uri,
        create_label_vals,
        negate_label_vals,
        comment,
    }
}

#[derive(Clone)]
pub struct LabelerClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl LabelerClient {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self, LabelerError> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(LabelerError::Config(format!(
                "labeler URL must be http(s), got '{base_url}'"
            )));
        }
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: format!("{base_url}{EMIT_PATH}"),
            token,
        })
    }

    async fn emit(
        &self,
        note_id: Uuid,
        post_uri: &str,
        action: LabelAction,
    ) -> Result<(), LabelerError> {
        let body = build_request(note_id, post_uri, action);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<LabelerErrorBody>(&raw)
                .map(|e| e.message)
                .unwrap_or(raw);
            return Err(LabelerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!(%note_id, post_uri, ?action, "Label emitted");
        Ok(())
    }
}

#[async_trait]
impl LabelPublisher for LabelerClient {
    async fn publish_label(
        &self,
        note_id: Uuid,
        post_uri: &str,
        status: NoteStatus,
    ) -> Result<(), LabelerError> {
        self.emit(note_id, post_uri, LabelAction::Publish(status)).await
    }

    async fn negate_label(&self, note_id: Uuid, post_uri: &str) -> Result<(), LabelerError> {
        self.emit(note_id, post_uri, LabelAction::Negate).await
    }
}
