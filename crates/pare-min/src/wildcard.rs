//! Bottom-up removal of `decreases *`.
//!
//! A loop may only drop its wildcard once no loop nested in it still needs
//! one, so nodes are tried in post-order and each exactly once.

use crate::error::{MinimizeError, MinimizeResult};
use crate::minimizer::{Minimizer, Status};
use pare_oracle::Oracle;
use tracing::debug;

impl<O: Oracle> Minimizer<O> {
    pub(crate) fn run_wildcard_pass(&mut self) -> MinimizeResult<()> {
        let order = self.inventory.wildcards.post_order();
        if order.is_empty() {
            return Ok(());
        }
        debug!(wildcards = order.len(), "wildcard pass");
        for node in order {
            if self.should_stop() {
                return Ok(());
            }
            let forest = &self.inventory.wildcards;
            let id = forest.nodes[node].candidate;
            let scope = self.inventory.get(id).scope();
            if self.is_aborted(scope) || self.status(id) != Status::Untried {
                continue;
            }
            let unresolved = forest.nodes[node]
                .children
                .iter()
                .map(|&child| forest.nodes[child].candidate)
                .find(|&child| self.status(child) == Status::Untried);
            let result = match unresolved {
                Some(child) => Err(MinimizeError::UnresolvedWildcardChild {
                    candidate: id,
                    child,
                }),
                None => self.try_remove(id).map(|_| ()),
            };
            self.contain(scope, result)?;
        }
        Ok(())
    }
}
