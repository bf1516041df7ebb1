// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod breadcrumb;
pub mod circular_buffer;
pub mod recorder;

pub use breadcrumb::{Breadcrumb, BreadcrumbType};
pub use circular_buffer::CircularBuffer;
pub use recorder::Recorder;
