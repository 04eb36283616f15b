use parking_lot::RwLock;
use tracing::{debug, info};
use verdict_core::Context;

use crate::error::{PolicyError, PolicyResult};
use crate::node::Evaluable;
use crate::response::Response;

/// Owner of the canonical policy tree.
///
/// Readers take a handle to the current root once per request and evaluate
/// without holding any lock; evaluation is pure and runs to completion on
/// the calling thread. Writers build a new tree copy-on-write and swap the
/// root under the write lock. Old roots stay valid for in-flight readers
/// until their handles drop.
pub struct PolicyStorage {
    root: RwLock<Evaluable>,
}

impl PolicyStorage {
    /// The root must be a policy or a policy set; a bare rule cannot own a
    /// tree.
    pub fn new(root: Evaluable) -> PolicyResult<Self> {
        if matches!(root, Evaluable::Rule(_)) {
            return Err(PolicyError::Validation(
                "storage root must be a policy or policy set".into(),
            ));
        }
        Ok(PolicyStorage {
            root: RwLock::new(root),
        })
    }

    /// Handle to the current tree version. Each call observes exactly one
    /// version; later swaps do not affect it.
    pub fn root(&self) -> Evaluable {
        self.root.read().clone()
    }

    pub fn calculate(&self, ctx: &Context) -> Response {
        self.root().calculate(ctx)
    }

    /// Applies an insert-or-replace against the current root and publishes
    /// the result. Concurrent mutations are serialized by the write lock
    /// but otherwise unordered.
    pub fn append(&self, path: &[&str], child: &Evaluable) -> PolicyResult<Evaluable> {
        let mut guard = self.root.write();
        match guard.append(path, child) {
            Ok(next) => {
                *guard = next.clone();
                info!(?path, "policy tree updated by append");
                Ok(next)
            }
            Err(err) => {
                debug!(?path, %err, "append rejected");
                Err(err)
            }
        }
    }

    /// Applies a removal against the current root and publishes the result.
    pub fn delete(&self, path: &[&str]) -> PolicyResult<Evaluable> {
        let mut guard = self.root.write();
        match guard.delete(path) {
            Ok(next) => {
                *guard = next.clone();
                info!(?path, "policy tree updated by delete");
                Ok(next)
            }
            Err(err) => {
                debug!(?path, %err, "delete rejected");
                Err(err)
            }
        }
    }

    /// Resolves a node for the debug surface by walking visible ids from
    /// the root. The empty path addresses the root itself. Hidden nodes are
    /// unreachable.
    pub fn get_at_path(&self, path: &[&str]) -> PolicyResult<Evaluable> {
        let not_found = || PolicyError::PathNotFound(path.join("/"));
        let mut node = self.root();
        if node.is_hidden() {
            return Err(not_found());
        }
        for segment in path {
            node = node.child(segment).ok_or_else(not_found)?;
        }
        Ok(node)
    }
}
