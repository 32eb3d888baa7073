// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Role-based visibility of UI fragments.
//!
//! Used inside an already authorized screen to hide menu entries, buttons and
//! table columns. It never redirects; navigation is the gate's job.

use super::roles::RoleSet;

/// True if a fragment restricted to `allowed` may be shown to `current`.
///
/// An empty allow-list means the fragment is unrestricted.
pub fn is_visible(current: &RoleSet, allowed: &RoleSet) -> bool {
    allowed.is_empty() || current.intersects(allowed)
}

/// Something that carries its own allow-list.
pub trait RoleRestricted {
    fn allowed_roles(&self) -> &RoleSet;

    fn visible_to(&self, current: &RoleSet) -> bool {
        is_visible(current, self.allowed_roles())
    }
}

/// Keep only the items `current` may see, in their original order.
pub fn filter_visible<'a, T, I>(items: I, current: &RoleSet) -> Vec<&'a T>
where
    T: RoleRestricted + 'a,
    I: IntoIterator<Item = &'a T>,
{
    items.into_iter().filter(|item| item.visible_to(current)).collect()
}
