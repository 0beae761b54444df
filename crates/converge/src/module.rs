//! Bundles of configuration applied together.

use crate::context::Context;
use crate::error::Result;

/// A reusable piece of host configuration, e.g. "consul server".
///
/// [`Context::run_modules`] installs the packages of every registered module
/// in one package call, then applies each module in registration order.
pub trait Module {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Package constraints this module needs installed first.
    fn packages(&self) -> Vec<String> {
        Vec::new()
    }

    /// Converge this module's resources.
    fn apply(&self, ctx: &mut Context) -> Result<()>;
}

/// Union of every module's packages, first mention first.
pub fn package_union(modules: &[Box<dyn Module>]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    modules
        .iter()
        .flat_map(|m| m.packages())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
