// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

pub use self::config::{Plugins, PluginsConfig, PluginsData};
pub use self::lock::{LockFile, PluginsLock};
pub use self::package::{BareAsset, BareModule, Dep, DepAsset, DepModule};
pub use self::plan::UpdatePlan;
pub use self::profile::Profile;
pub use self::resolver::Resolution;
pub use self::variant::Variant;

pub mod cache;
pub mod channel;
pub mod config;
pub mod extract;
pub mod lock;
pub mod package;
pub mod plan;
pub mod profile;
pub mod prompt;
pub mod publish;
pub mod resolver;
pub mod stage;
pub mod store;
pub mod update;
pub mod variant;
