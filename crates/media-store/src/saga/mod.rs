//! The saga engine and its static registry (spec.md sections 4.3-4.4).

pub mod collaborators;
pub mod engine;
pub mod registry;
pub mod stuck_detector;
pub mod types;
pub mod workflows;

pub use collaborators::{HttpAction, NoopAction, StepAction};
pub use engine::SagaEngine;
pub use registry::{SagaRegistry, StepDefinition, WorkflowDefinition};
pub use stuck_detector::StuckSagaDetector;
pub use types::{SagaRow, SagaStatus, SagaStepRow, StepStatus};
