// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Staged convergence of the objects backing an EKSPodIdentityWebhook.

pub mod drift;
pub mod engine;
pub mod stage;

pub use engine::{SyncEngine, SyncOutcome};
pub use stage::Stage;
