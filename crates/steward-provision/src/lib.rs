// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle handlers for developer workspace provisioning.
//!
//! Two handler sets built on [`steward_core`]:
//!
//! - [`disk_resize`]: grows a workspace instance's root volume and its
//!   filesystem.
//! - [`host_setup`]: attaches an instance profile to a workspace host and
//!   runs a bootstrap script on it.
//!
//! Both talk to the outside world through the collaborator traits in
//! [`clients`], so the handlers themselves carry no SDK bindings and are
//! fully testable in memory.

pub mod clients;
pub mod disk_resize;
pub mod host_setup;

pub use clients::{
    CommandError, CommandHandle, CommandPoll, CommandRunner, HostDescription, HostInventory,
    InventoryError,
};
