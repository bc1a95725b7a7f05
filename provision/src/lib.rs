//! Client-side provisioning orchestrator.
//!
//! Sequences the GitOps-controller bootstrap over a shell channel: wire the
//! kubeconfig, create the target namespace, detect or install the
//! controller, extract its service endpoint and initial admin credential
//! from command output, and drive the two operator-triggered follow-ups
//! (login, repository registration + application creation).
//!
//! Everything here is transport-agnostic: commands go through the
//! [`channel::CommandChannel`] trait, so the pipeline is tested against a
//! scripted channel and runs in production over the WebSocket client.

pub mod channel;
pub mod commands;
mod context;
mod error;
pub mod extract;
mod pipeline;
pub mod registry;

pub use context::GitCredentials;
pub use context::ProvisioningContext;
pub use error::ProvisionError;
pub use pipeline::PipelineOutcome;
pub use pipeline::PipelineRun;
pub use pipeline::PipelineStep;
pub use pipeline::Provisioner;
pub use pipeline::ReadinessPoll;
