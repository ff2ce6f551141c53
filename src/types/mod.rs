// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types owned by the installer.

pub mod webhook;

pub use webhook::{
    EksPodIdentityWebhook, EksPodIdentityWebhookSpec, EksPodIdentityWebhookStatus, ResourceRef,
};
