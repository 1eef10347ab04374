//! Provider/subscriber role assignment.

use crate::options::SyncOptions;
use std::fmt;
use tracing::debug;

/// The role an execution context plays for one synchronized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Owns the full, unredacted state and manages child windows.
    Provider,
    /// Only ever holds the redacted view read from the shared medium.
    Subscriber,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Provider => f.write_str("provider"),
            Role::Subscriber => f.write_str("subscriber"),
        }
    }
}

/// The outcome of [`assign_role`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub role: Role,
    /// The identity the context should carry from now on.
    pub identity: String,
    /// True when a non-empty incoming identity was overwritten.
    pub reassigned: bool,
}

/// Decides the role of a context from its current identity.
///
/// A context whose identity is one of the subscribers becomes a subscriber.
/// Every other context, including one with no identity or a stale identity
/// left over from earlier navigation, becomes the provider and takes the
/// provider identity.
pub fn assign_role(identity: Option<&str>, options: &SyncOptions) -> RoleAssignment {
    let provider = options.effective_provider();

    match identity {
        Some(id) if id == provider => RoleAssignment {
            role: Role::Provider,
            identity: provider.to_string(),
            reassigned: false,
        },
        Some(id) if !id.is_empty() && options.is_subscriber(id) => RoleAssignment {
            role: Role::Subscriber,
            identity: id.to_string(),
            reassigned: false,
        },
        other => {
            let reassigned = other.is_some_and(|id| !id.is_empty());
            if reassigned {
                debug!(
                    "identity {:?} is neither provider nor subscriber of {}; assuming provider {}",
                    other, options.name, provider
                );
            }
            RoleAssignment {
                role: Role::Provider,
                identity: provider.to_string(),
                reassigned,
            }
        }
    }
}
