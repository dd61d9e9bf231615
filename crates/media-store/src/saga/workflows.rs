//! The canonical `media_upload` workflow definition (spec.md section
//! 4.3's table). This is the only registry entry the system ships with;
//! adding another workflow means adding another function here and
//! registering it alongside this one — engine code never changes.

use std::sync::Arc;
use std::time::Duration;

use media_core::config::CollaboratorConfig;

use crate::events::EventType;
use crate::saga::collaborators::HttpAction;
use crate::saga::registry::{StepDefinition, WorkflowDefinition};

pub fn media_upload_workflow(collaborators: &CollaboratorConfig, call_timeout: Duration) -> WorkflowDefinition {
    WorkflowDefinition {
        saga_type: "media_upload",
        start_trigger: EventType::MediaUploaded,
        failure_triggers: vec![EventType::MediaProcessingFailed],
        steps: vec![
            StepDefinition {
                name: "process_media",
                forward_action: Arc::new(HttpAction::new(
                    format!("{}/process", collaborators.media_command_url),
                    call_timeout,
                )),
                success_trigger: EventType::MediaProcessed,
                compensating_action: Some(Arc::new(HttpAction::new(
                    format!("{}/compensate", collaborators.media_command_url),
                    call_timeout,
                ))),
            },
            StepDefinition {
                name: "add_to_album",
                forward_action: Arc::new(HttpAction::new(
                    format!("{}/add-media", collaborators.album_service_url),
                    call_timeout,
                )),
                success_trigger: EventType::MediaAddedToAlbum,
                compensating_action: Some(Arc::new(HttpAction::new(
                    format!("{}/remove-media", collaborators.album_service_url),
                    call_timeout,
                ))),
            },
            StepDefinition {
                name: "send_notification",
                forward_action: Arc::new(HttpAction::new(
                    format!("{}/send", collaborators.notification_service_url),
                    call_timeout,
                )),
                success_trigger: EventType::NotificationSent,
                // Terminal non-reversible (spec.md section 4.3's table).
                compensating_action: None,
            },
        ],
    }
}
