use std::collections::{HashMap, HashSet};
use log::{info, warn};

use crate::device::driver::RadioDriver;
use crate::device::types::{Notification, Permission, RequestId, REQUIRED_PERMISSIONS};
use crate::error::ProbeError;

/// A prompt that the consent collaborator has to show. The answer must carry the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Permissions {
        id: RequestId,
        permissions: Vec<Permission>,
    },
    Enable {
        id: RequestId,
    },
}

impl From<Prompt> for Notification {
    fn from(prompt: Prompt) -> Self {
        match prompt {
            Prompt::Permissions { id, permissions } => Notification::PermissionRequested { id, permissions },
            Prompt::Enable { id } => Notification::EnableRequested { id },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingPrompt {
    Permissions,
    Enable,
}

/// Tracks permission grants and outstanding prompts. Performs no radio I/O itself.
#[derive(Debug, Default)]
pub struct AdapterGate {
    granted: HashSet<Permission>,
    pending: HashMap<RequestId, PendingPrompt>,
    next_request: u64,
}

impl AdapterGate {
    pub fn new() -> Self {
        AdapterGate::default()
    }

    pub fn permissions_granted(&self) -> bool {
        REQUIRED_PERMISSIONS.iter().all(|permission| self.granted.contains(permission))
    }

    /// True iff the radio is powered and every required permission is granted.
    pub fn is_ready(&self, driver: &dyn RadioDriver) -> bool {
        self.permissions_granted() && driver.radio_powered()
    }

    /// Asks for the missing permissions, unless they are granted or already being asked for.
    pub fn ensure_permissions(&mut self) -> Option<Prompt> {
        if self.permissions_granted() || self.is_pending(PendingPrompt::Permissions) {
            return None;
        }

        let permissions: Vec<Permission> = REQUIRED_PERMISSIONS
            .iter()
            .filter(|permission| !self.granted.contains(permission))
            .copied()
            .collect();

        let id = self.issue(PendingPrompt::Permissions);
        info!("Requesting permissions {:?} ({})", permissions, id);
        Some(Prompt::Permissions { id, permissions })
    }

    /// Asks the user to power on the radio, unless such a prompt is already open.
    pub fn request_enable(&mut self) -> Option<Prompt> {
        if self.is_pending(PendingPrompt::Enable) {
            return None;
        }

        let id = self.issue(PendingPrompt::Enable);
        info!("Requesting the radio to be enabled ({})", id);
        Some(Prompt::Enable { id })
    }

    /// Returns `None` when `id` does not belong to an outstanding permission prompt.
    pub fn on_permission_result(&mut self, id: RequestId, grants: &[(Permission, bool)]) -> Option<Result<(), ProbeError>> {
        if !self.resolve(id, PendingPrompt::Permissions) {
            warn!("Ignoring permission result for unknown {}", id);
            return None;
        }

        for (permission, granted) in grants {
            if *granted {
                self.granted.insert(*permission);
            } else {
                self.granted.remove(permission);
            }
        }

        if self.permissions_granted() {
            info!("Permissions granted");
            Some(Ok(()))
        } else {
            warn!("Permissions denied");
            Some(Err(ProbeError::PermissionDenied))
        }
    }

    /// Returns `None` when `id` does not belong to an outstanding enable prompt.
    pub fn on_enable_result(&mut self, id: RequestId, accepted: bool) -> Option<Result<(), ProbeError>> {
        if !self.resolve(id, PendingPrompt::Enable) {
            warn!("Ignoring enable result for unknown {}", id);
            return None;
        }

        if accepted {
            Some(Ok(()))
        } else {
            warn!("Enabling the radio was declined");
            Some(Err(ProbeError::RadioDisabled))
        }
    }

    /// The platform refused an operation for lack of permission.
    pub fn revoke_permissions(&mut self) {
        self.granted.clear();
    }

    fn is_pending(&self, kind: PendingPrompt) -> bool {
        self.pending.values().any(|pending| *pending == kind)
    }

    fn issue(&mut self, kind: PendingPrompt) -> RequestId {
        self.next_request += 1;
        let id = RequestId(self.next_request);
        self.pending.insert(id, kind);
        id
    }

    fn resolve(&mut self, id: RequestId, kind: PendingPrompt) -> bool {
        match self.pending.get(&id) {
            Some(pending) if *pending == kind => {
                self.pending.remove(&id);
                true
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeDriver;

    fn grant_all(gate: &mut AdapterGate) {
        let Some(Prompt::Permissions { id, permissions }) = gate.ensure_permissions() else {
            panic!("expected a permission prompt");
        };
        let grants: Vec<(Permission, bool)> = permissions.into_iter().map(|p| (p, true)).collect();
        assert_eq!(gate.on_permission_result(id, &grants), Some(Ok(())));
    }

    #[test]
    fn not_ready_without_permissions_even_when_powered() {
        let driver = FakeDriver::new(true);
        let gate = AdapterGate::new();

        assert!(!gate.is_ready(&driver));
    }

    #[test]
    fn ready_once_granted_and_powered() {
        let driver = FakeDriver::new(false);
        let mut gate = AdapterGate::new();
        grant_all(&mut gate);

        assert!(!gate.is_ready(&driver));
        driver.set_powered(true);
        assert!(gate.is_ready(&driver));
    }

    #[test]
    fn permission_prompt_is_not_repeated_while_outstanding() {
        let mut gate = AdapterGate::new();

        let first = gate.ensure_permissions();
        assert!(matches!(first, Some(Prompt::Permissions { .. })));
        assert_eq!(gate.ensure_permissions(), None);
    }

    #[test]
    fn partial_denial_is_a_permission_failure() {
        let mut gate = AdapterGate::new();
        let Some(Prompt::Permissions { id, .. }) = gate.ensure_permissions() else {
            panic!("expected a permission prompt");
        };

        let result = gate.on_permission_result(id, &[(Permission::Scan, true), (Permission::Connect, false)]);
        assert_eq!(result, Some(Err(ProbeError::PermissionDenied)));
        assert!(!gate.permissions_granted());

        // a new prompt can be issued after the answer
        assert!(gate.ensure_permissions().is_some());
    }

    #[test]
    fn answers_are_correlated_by_id_and_kind() {
        let mut gate = AdapterGate::new();
        let Some(Prompt::Permissions { id: permission_id, .. }) = gate.ensure_permissions() else {
            panic!("expected a permission prompt");
        };
        let Some(Prompt::Enable { id: enable_id }) = gate.request_enable() else {
            panic!("expected an enable prompt");
        };
        assert_ne!(permission_id, enable_id);

        // wrong kind for the id
        assert_eq!(gate.on_enable_result(permission_id, true), None);
        assert_eq!(gate.on_permission_result(enable_id, &[(Permission::Scan, true)]), None);
        // unknown id
        assert_eq!(gate.on_enable_result(RequestId(999), true), None);

        assert_eq!(gate.on_enable_result(enable_id, false), Some(Err(ProbeError::RadioDisabled)));
        // answered twice
        assert_eq!(gate.on_enable_result(enable_id, true), None);
    }

    #[test]
    fn revoking_drops_readiness() {
        let driver = FakeDriver::new(true);
        let mut gate = AdapterGate::new();
        grant_all(&mut gate);
        assert!(gate.is_ready(&driver));

        gate.revoke_permissions();
        assert!(!gate.is_ready(&driver));
    }
}
